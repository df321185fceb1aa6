/*!
Forecast closing prices to a chosen date, recommend whether to buy, and answer prediction requests
*/

use anyhow::{format_err, Context};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use log::LevelFilter;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rustyline::error::ReadlineError;
use rustyline::Editor;
use std::fs::File;
use std::io::{stdin, stdout, Read, Stdin, Stdout};
use std::path::Path;
use stockcast::config::{ForecastConfig, ScalerPolicy};
use stockcast::data::fake::{PriceRandomWalk, SeriesGen};
use stockcast::data::history::{
    write_blended, write_history, CsvHistory, HistorySource, DATE_FORMAT,
};
use stockcast::data::scale::MinMaxScaler;
use stockcast::forecast::ForecastSession;
use stockcast::predictor::{MeanPredictor, NaivePredictor, Predictor};
use stockcast::service::PredictionService;
#[cfg(feature = "lstm")]
use {
    stockcast::data::train_test_split,
    stockcast::lstm::{CloseLstmDesc, LstmPredictor, TrainConfig},
    tch::Device,
};

const DEFAULT_ASSET: &str = "^BVSP";

#[derive(Debug, io_enum::Read)]
enum Input {
    Stdin(Stdin),
    File(File),
}

#[derive(Debug, io_enum::Write)]
enum Output {
    Stdout(Stdout),
    File(File),
}

fn open_input(path: Option<&str>) -> anyhow::Result<Input> {
    Ok(match path {
        Some(path) => Input::File(
            File::open(Path::new(path)).with_context(|| format!("Failed to open {}", path))?,
        ),
        None => Input::Stdin(stdin()),
    })
}

fn open_output(path: Option<&str>) -> anyhow::Result<Output> {
    Ok(match path {
        Some(path) => Output::File(
            File::create(Path::new(path)).with_context(|| format!("Failed to create {}", path))?,
        ),
        None => Output::Stdout(stdout()),
    })
}

fn init_logging(verbosity: u64) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn load_config(matches: &ArgMatches, base: ForecastConfig) -> anyhow::Result<ForecastConfig> {
    let mut config = match matches.value_of("config") {
        Some(path) => ForecastConfig::load(path)?,
        None => base,
    };
    if let Some(len) = matches.value_of("sequence-length") {
        config.sequence_length = len
            .parse()
            .map_err(|_| format_err!("Invalid sequence length: {:?}", len))?;
    }
    config.validate()?;
    Ok(config)
}

fn history_path<'a>(matches: &'a ArgMatches) -> anyhow::Result<&'a str> {
    matches
        .value_of("history")
        .ok_or_else(|| format_err!("A history file is needed"))
}

#[cfg_attr(not(feature = "lstm"), allow(unused_variables))]
fn build_predictor(
    matches: &ArgMatches,
    sequence_length: usize,
    training: Option<&[f64]>,
) -> anyhow::Result<Box<dyn Predictor>> {
    match matches.value_of("model").unwrap_or("mean") {
        "mean" => Ok(Box::new(MeanPredictor)),
        "naive" => Ok(Box::new(NaivePredictor)),
        #[cfg(feature = "lstm")]
        "lstm" => {
            let weights = matches
                .value_of("weights")
                .ok_or_else(|| format_err!("The lstm model needs --weights"))?;
            let mut predictor =
                LstmPredictor::new(&CloseLstmDesc::default(), sequence_length, Device::cuda_if_available());
            match training {
                Some(series) => predictor.load_or_train(weights, series, &TrainConfig::default())?,
                None => predictor.load(weights)?,
            }
            Ok(Box::new(predictor))
        }
        model => Err(format_err!("Invalid value for model: {:?}", model)),
    }
}

fn prompt_target(targets: &[NaiveDate]) -> anyhow::Result<Option<NaiveDate>> {
    let (first, last) = match (targets.first(), targets.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(format_err!("No future dates are available to forecast")),
    };
    let mut rl = Editor::<()>::new();
    loop {
        match rl.readline(&format!("Target date ({} to {}) [{}]: ", first, last, first)) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    return Ok(Some(first));
                }
                match NaiveDate::parse_from_str(line, DATE_FORMAT) {
                    Ok(date) if targets.contains(&date) => return Ok(Some(date)),
                    Ok(date) => eprintln!("{} is outside the forecast range", date),
                    Err(_) => eprintln!("Invalid date: {:?}", line),
                }
            }
            Err(ReadlineError::Interrupted) => {
                eprintln!("CTRL-C");
                return Ok(None);
            }
            Err(ReadlineError::Eof) => {
                eprintln!("CTRL-D");
                return Ok(None);
            }
            Err(err) => return Err(format_err!("Error reading target date: {}", err)),
        }
    }
}

fn run_forecast(matches: &ArgMatches) -> anyhow::Result<()> {
    let config = load_config(matches, ForecastConfig::default())?;
    let asset = matches.value_of("asset").unwrap_or(DEFAULT_ASSET);
    let history = CsvHistory::new(history_path(matches)?);
    let series = history.load(asset)?;
    log::info!("Loaded {} observations of {}", series.len(), asset);

    let session = match matches.value_of("scaler") {
        Some(path) => ForecastSession::with_scaler(series, MinMaxScaler::load(path)?, config)?,
        None => ForecastSession::new(series, config)?,
    };
    let predictor = build_predictor(
        matches,
        session.config().sequence_length,
        Some(session.normalized()),
    )?;

    let target = match matches.value_of("target") {
        Some(target) => NaiveDate::parse_from_str(target, DATE_FORMAT)
            .map_err(|_| format_err!("Invalid target date: {:?}", target))?,
        None => match prompt_target(&session.allowed_targets()?)? {
            Some(target) => target,
            None => return Ok(()),
        },
    };

    let report = session.report(&predictor, target)?;
    println!("Result for {}", report.target);
    println!("Predicted price: {:.2}", report.predicted_price);
    println!("{}", report.recommendation);

    if let Some(path) = matches.value_of("out") {
        let rows = write_blended(open_output(Some(path))?, &report.blended)?;
        log::info!("Wrote {} rows of history and forecast to {}", rows, path);
    }
    Ok(())
}

fn build_service(
    matches: &ArgMatches,
    reference: Option<&[f64]>,
) -> anyhow::Result<PredictionService<Box<dyn Predictor>>> {
    let config = load_config(matches, ForecastConfig::service())?;
    let predictor = build_predictor(matches, config.sequence_length, None)?;
    let scaler = match (matches.value_of("scaler"), reference) {
        (Some(path), _) => Some(MinMaxScaler::load(path)?),
        (None, Some(reference)) if config.scaler_policy == ScalerPolicy::Reuse => {
            Some(MinMaxScaler::fit(reference)?)
        }
        _ => None,
    };
    Ok(match scaler {
        Some(scaler) => PredictionService::new(predictor, scaler, config),
        None => {
            if config.scaler_policy == ScalerPolicy::Reuse {
                log::warn!("No fitted scaler given, fitting one per request instead");
            }
            PredictionService::refitting(predictor, config)
        }
    })
}

fn run_predict(matches: &ArgMatches) -> anyhow::Result<()> {
    let mut body = String::new();
    open_input(matches.value_of("INPUT"))?.read_to_string(&mut body)?;
    let service = build_service(matches, None)?;
    let (status, response) = service.handle_json(&body);
    println!("{}", response);
    if status != 200 {
        return Err(format_err!("Prediction request failed with status {}", status));
    }
    Ok(())
}

fn run_predict_auto(matches: &ArgMatches) -> anyhow::Result<()> {
    let asset = matches.value_of("asset").unwrap_or(DEFAULT_ASSET);
    let history = CsvHistory::new(history_path(matches)?);
    let reference = history.load(asset).ok().map(|series| series.closes());
    let service = build_service(matches, reference.as_deref())?;
    match service.predict_auto(&history, asset) {
        Ok(response) => {
            println!("{}", serde_json::to_string(&response)?);
            Ok(())
        }
        Err(err) => {
            println!("{}", serde_json::to_string(&err)?);
            Err(format_err!(
                "Prediction request failed with status {}",
                err.category.status()
            ))
        }
    }
}

fn run_fakegen(matches: &ArgMatches) -> anyhow::Result<()> {
    let asset = matches.value_of("asset").unwrap_or(DEFAULT_ASSET);
    let days: usize = matches
        .value_of("days")
        .unwrap_or("365")
        .parse()
        .map_err(|_| format_err!("Invalid number of days"))?;
    let price: f64 = matches
        .value_of("price")
        .unwrap_or("100000")
        .parse()
        .map_err(|_| format_err!("Invalid starting price"))?;
    let start = matches.value_of("start").unwrap_or("2020-01-01");
    let start: NaiveDateTime = NaiveDate::parse_from_str(start, DATE_FORMAT)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| format_err!("Invalid start date: {:?}", start))?;
    let rng = match matches.value_of("seed") {
        Some(seed) => StdRng::seed_from_u64(
            seed.parse()
                .map_err(|_| format_err!("Invalid seed: {:?}", seed))?,
        ),
        None => StdRng::from_entropy(),
    };
    let walk = PriceRandomWalk::new(rng, price, 0.0003, 0.015)
        .map_err(|err| format_err!("Invalid random walk: {:?}", err))?;
    let observations: Vec<_> = SeriesGen::daily(start, walk).take(days).collect();
    let written = write_history(open_output(matches.value_of("out"))?, asset, observations.iter())?;
    log::info!("Generated {} observations of {}", written, asset);
    Ok(())
}

#[cfg(feature = "lstm")]
fn run_train(matches: &ArgMatches) -> anyhow::Result<()> {
    const TRAIN_TEST_RATIO: f64 = 0.7;

    let config = load_config(matches, ForecastConfig::default())?;
    let asset = matches.value_of("asset").unwrap_or(DEFAULT_ASSET);
    let series = CsvHistory::new(history_path(matches)?).load(asset)?;
    let closes = series.closes();
    let scaler = MinMaxScaler::fit(&closes)?;
    let normalized = scaler.normalize_all(&closes);
    let (train, test) = train_test_split(&normalized, TRAIN_TEST_RATIO);

    let mut train_config = TrainConfig::default();
    if let Some(epochs) = matches.value_of("epochs") {
        train_config.epochs = epochs
            .parse()
            .map_err(|_| format_err!("Invalid number of epochs: {:?}", epochs))?;
    }
    let device = Device::cuda_if_available();
    log::info!("Device: {:?}", device);
    let mut predictor = LstmPredictor::new(&CloseLstmDesc::default(), config.sequence_length, device);
    let losses = predictor.train(train, &train_config)?;
    if let Some(loss) = losses.last() {
        eprintln!("Final training loss = {}", loss);
    }

    let (xs, ys) = stockcast::data::create_sequences(test, config.sequence_length);
    if !ys.is_empty() {
        let mut sum_loss = 0.0;
        for (x, y) in xs.iter().zip(ys.iter()) {
            let yhat = predictor.predict(x)?;
            sum_loss += (yhat - y) * (yhat - y);
        }
        eprintln!("Testing loss = {}", sum_loss / ys.len() as f64);
    }

    let weights = matches
        .value_of("weights")
        .ok_or_else(|| format_err!("Training needs --weights to save the model to"))?;
    predictor.save(weights)?;
    if let Some(path) = matches.value_of("scaler") {
        scaler.save(path)?;
    }
    log::info!("Saved model weights to {}", weights);
    Ok(())
}

fn model_args<'a, 'b>() -> Vec<Arg<'a, 'b>> {
    vec![
        Arg::with_name("model")
            .short("m")
            .long("model")
            .help("Predictor to use: mean, naive or lstm. Defaults to mean")
            .takes_value(true),
        Arg::with_name("weights")
            .short("w")
            .long("weights")
            .help("Saved LSTM weights, for the lstm model")
            .takes_value(true),
        Arg::with_name("scaler")
            .short("s")
            .long("scaler")
            .help("A normalization transform saved at training time, to reuse instead of refitting")
            .takes_value(true),
        Arg::with_name("config")
            .short("c")
            .long("config")
            .help("JSON forecasting configuration")
            .takes_value(true),
        Arg::with_name("sequence-length")
            .short("l")
            .long("sequence-length")
            .help("Number of past closes fed to the predictor")
            .takes_value(true),
    ]
}

fn history_args<'a, 'b>() -> Vec<Arg<'a, 'b>> {
    vec![
        Arg::with_name("history")
            .short("H")
            .long("history")
            .help("History file with asset,date,close records")
            .takes_value(true)
            .required(true),
        Arg::with_name("asset")
            .short("a")
            .long("asset")
            .help("Asset to load. Defaults to ^BVSP")
            .takes_value(true),
    ]
}

pub fn main() -> anyhow::Result<()> {
    let app = App::new("stockcast")
        .version("0.1")
        .about("Forecasts closing prices with a one-step-ahead predictor and a moving-average crossover")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .subcommand(
            SubCommand::with_name("forecast")
                .about("Forecast to a target date, decide, and optionally write the blended series")
                .args(&history_args())
                .args(&model_args())
                .arg(
                    Arg::with_name("target")
                        .short("t")
                        .long("target")
                        .help("Target date, YYYY-MM-DD. Prompts if absent")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("out")
                        .short("o")
                        .long("out")
                        .help("Write history, forecast and moving averages to this CSV file")
                        .takes_value(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("predict")
                .about("Answer a JSON prediction request of the form {\"history\": [...]}")
                .args(&model_args())
                .arg(
                    Arg::with_name("INPUT")
                        .help("Request file. Reads standard input if absent")
                        .index(1),
                ),
        )
        .subcommand(
            SubCommand::with_name("predict-auto")
                .about("Predict the next close of an asset from its stored history")
                .args(&history_args())
                .args(&model_args()),
        )
        .subcommand(
            SubCommand::with_name("fakegen")
                .about("Generate a synthetic history file")
                .arg(
                    Arg::with_name("asset")
                        .short("a")
                        .long("asset")
                        .takes_value(true),
                )
                .arg(Arg::with_name("days").short("n").long("days").takes_value(true))
                .arg(Arg::with_name("price").short("p").long("price").takes_value(true))
                .arg(Arg::with_name("start").long("start").takes_value(true))
                .arg(Arg::with_name("seed").long("seed").takes_value(true))
                .arg(Arg::with_name("out").short("o").long("out").takes_value(true)),
        );
    #[cfg(feature = "lstm")]
    let app = app.subcommand(
        SubCommand::with_name("train")
            .about("Train an LSTM on an asset's history and save its weights")
            .args(&history_args())
            .args(&model_args())
            .arg(
                Arg::with_name("epochs")
                    .short("e")
                    .long("epochs")
                    .takes_value(true),
            ),
    );
    let matches = app.get_matches();

    init_logging(matches.occurrences_of("verbose"));

    match matches.subcommand() {
        ("forecast", Some(sub)) => run_forecast(sub),
        ("predict", Some(sub)) => run_predict(sub),
        ("predict-auto", Some(sub)) => run_predict_auto(sub),
        ("fakegen", Some(sub)) => run_fakegen(sub),
        #[cfg(feature = "lstm")]
        ("train", Some(sub)) => run_train(sub),
        (name, _) => Err(format_err!("Unknown command: {:?}", name)),
    }
}

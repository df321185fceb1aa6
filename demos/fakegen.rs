/*!
Generate and sample some fake closing price data, then forecast from it
*/
use chrono::NaiveDate;
use rand::thread_rng;
use rustyline::error::ReadlineError;
use rustyline::Editor;
use stockcast::config::ForecastConfig;
use stockcast::data::fake::*;
use stockcast::data::ObservationSeries;
use stockcast::forecast::ForecastSession;
use stockcast::predictor::MeanPredictor;

fn main() -> anyhow::Result<()> {
    let start = NaiveDate::from_ymd_opt(2020, 10, 10)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| anyhow::format_err!("Invalid start date"))?;
    let walk = PriceRandomWalk::new(thread_rng(), 40.0, 0.0005, 0.02)
        .map_err(|err| anyhow::format_err!("Invalid random walk: {:?}", err))?;
    let mut series_gen = SeriesGen::daily(start, walk);
    let mut rl = Editor::<()>::new();
    let points = loop {
        match rl.readline("Points to generate: ") {
            Ok(line) => match usize::from_str_radix(line.trim(), 10) {
                Ok(points) => break points,
                Err(_) => eprintln!("Invalid input: {:?}", line),
            },
            Err(ReadlineError::Interrupted) => {
                eprintln!("CTRL-C");
                return Ok(());
            }
            Err(ReadlineError::Eof) => {
                eprintln!("CTRL-D");
                return Ok(());
            }
            Err(err) => eprintln!("Error: {:?}", err),
        }
    };
    let observations: Vec<_> = series_gen.by_ref().take(points).collect();
    for obs in observations.iter() {
        println!("{} {:.4}", obs.t.date(), obs.c);
    }

    let session = ForecastSession::new(ObservationSeries::new(observations)?, ForecastConfig::default())?;
    let target = session.last_date()? + chrono::Duration::days(7);
    let report = session.report(&MeanPredictor, target)?;
    println!(
        "Mean forecast for {}: {:.4} ({})",
        report.target, report.predicted_price, report.recommendation
    );
    Ok(())
}

/*!
A recurrent closing price predictor: a single-feature LSTM with a linear head, run through PyTorch bindings
*/

use crate::data::create_sequences;
use crate::predictor::{Predictor, PredictorError};
use crate::GpuFloat;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tch::nn::{self, Linear, Module, OptimizerConfig, RNNConfig, VarStore, LSTM, RNN};
use tch::{Device, Reduction, TchError, Tensor};

/// The default size of the hidden LSTM layer
pub const HIDDEN_SIZE: usize = 64;
/// The default number of epochs to train for
pub const EPOCHS: usize = 50;
/// The default training batch size
pub const BATCH_SIZE: usize = 32;
/// The default Adam learning rate
pub const LEARNING_RATE: f64 = 1e-3;

/// An LSTM over a window of normalized closes, predicting the next normalized close from its final hidden state
#[derive(Debug)]
pub struct CloseLstm {
    /// This model's LSTM layer
    pub lstm_layer: LSTM,
    /// This model's linear layer
    pub linear_layer: Linear,
}

impl Module for CloseLstm {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let (hidden, _state) = self.lstm_layer.seq(xs);
        let last = hidden.select(1, -1);
        self.linear_layer.forward(&last)
    }
}

/// A descriptor for an instance of the CloseLstm model
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct CloseLstmDesc {
    /// The size of the hidden LSTM layers to use
    pub hidden: usize,
    /// The number of hidden LSTM layers to use
    pub layers: usize,
}

impl Default for CloseLstmDesc {
    fn default() -> CloseLstmDesc {
        CloseLstmDesc {
            hidden: HIDDEN_SIZE,
            layers: 1,
        }
    }
}

impl CloseLstmDesc {
    /// Build a `CloseLstm` over a given `VarStore`
    pub fn build(&self, vs: &VarStore) -> CloseLstm {
        let lstm_layer = nn::lstm(
            &vs.root(),
            1,
            self.hidden as i64,
            RNNConfig {
                has_biases: true,
                num_layers: self.layers as i64,
                dropout: 0.,
                train: true,
                bidirectional: false,
                batch_first: true,
            },
        );
        let linear_layer = nn::linear(&vs.root(), self.hidden as i64, 1, Default::default());
        CloseLstm {
            lstm_layer,
            linear_layer,
        }
    }
}

/// Training parameters
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TrainConfig {
    /// The number of passes over the training windows
    pub epochs: usize,
    /// The number of windows per optimizer step
    pub batch_size: usize,
    /// The Adam learning rate
    pub learning_rate: f64,
}

impl Default for TrainConfig {
    fn default() -> TrainConfig {
        TrainConfig {
            epochs: EPOCHS,
            batch_size: BATCH_SIZE,
            learning_rate: LEARNING_RATE,
        }
    }
}

/// A `CloseLstm` together with its weights, usable as a one-step-ahead predictor
pub struct LstmPredictor {
    /// The weights of the model
    pub vs: VarStore,
    /// The model
    pub model: CloseLstm,
    /// The window length the model is fed
    pub sequence_length: usize,
}

fn backend(err: TchError) -> PredictorError {
    PredictorError::Backend(Box::new(err))
}

/// Pack windows and their targets into `[n, sequence_length, 1]` and `[n, 1]` tensors
fn pack(xs: &[Vec<f64>], ys: &[f64], sequence_length: usize) -> Result<(Tensor, Tensor), TchError> {
    let flat: Vec<GpuFloat> = xs.iter().flatten().map(|&v| v as GpuFloat).collect();
    let targets: Vec<GpuFloat> = ys.iter().map(|&v| v as GpuFloat).collect();
    let n = ys.len() as i64;
    let inputs = Tensor::from_slice(&flat).f_view([n, sequence_length as i64, 1])?;
    let outputs = Tensor::from_slice(&targets).f_view([n, 1])?;
    Ok((inputs, outputs))
}

impl LstmPredictor {
    /// Build a freshly initialized model on a device
    pub fn new(desc: &CloseLstmDesc, sequence_length: usize, device: Device) -> LstmPredictor {
        let vs = VarStore::new(device);
        let model = desc.build(&vs);
        LstmPredictor {
            vs,
            model,
            sequence_length,
        }
    }
    /// Load weights saved by `save`
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), TchError> {
        self.vs.load(path)
    }
    /// Save the model's weights
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TchError> {
        self.vs.save(path)
    }
    /// Load weights from `path` if it exists; otherwise train on `series` and save the result there
    pub fn load_or_train<P: AsRef<Path>>(
        &mut self,
        path: P,
        series: &[f64],
        config: &TrainConfig,
    ) -> Result<(), TchError> {
        let path = path.as_ref();
        if path.exists() {
            log::info!("Loading model weights from {}", path.display());
            return self.load(path);
        }
        log::info!("No model at {}, training a new one", path.display());
        self.train(series, config)?;
        self.save(path)
    }
    /// Train on every window of a normalized series, returning the average loss of each epoch
    pub fn train(&mut self, series: &[f64], config: &TrainConfig) -> Result<Vec<f64>, TchError> {
        let (xs, ys) = create_sequences(series, self.sequence_length);
        if ys.is_empty() {
            log::warn!(
                "Cannot train on {} values with a window of {}",
                series.len(),
                self.sequence_length
            );
            return Ok(Vec::new());
        }
        let device = self.vs.device();
        let (inputs, outputs) = pack(&xs, &ys, self.sequence_length)?;
        let (inputs, outputs) = (inputs.to_device(device), outputs.to_device(device));
        let samples = ys.len() as i64;
        let batch_size = config.batch_size.max(1) as i64;
        let mut opt = nn::Adam::default().build(&self.vs, config.learning_rate)?;

        let epochs_progress = ProgressBar::new(config.epochs as u64);
        epochs_progress.set_style(
            ProgressStyle::default_bar().template("Training: {wide_bar} {pos}/{len} epochs: {msg}"),
        );
        let mut losses = Vec::with_capacity(config.epochs);
        for epoch in 0..config.epochs {
            let mut sum_loss = 0.0;
            let mut batches = 0;
            let mut start = 0;
            while start < samples {
                let len = batch_size.min(samples - start);
                let input_batch = inputs.narrow(0, start, len);
                let output_batch = outputs.narrow(0, start, len);
                let loss = self
                    .model
                    .forward(&input_batch)
                    .mse_loss(&output_batch, Reduction::Mean);
                opt.backward_step(&loss);
                sum_loss += loss.f_double_value(&[])?;
                batches += 1;
                start += len;
            }
            let average = sum_loss / batches as f64;
            log::debug!("Epoch {}: average training loss = {}", epoch, average);
            epochs_progress.set_message(&format!("loss = {:.6}", average));
            epochs_progress.inc(1);
            losses.push(average);
        }
        epochs_progress.finish_and_clear();
        Ok(losses)
    }
}

impl Predictor for LstmPredictor {
    fn predict(&self, window: &[f64]) -> Result<f64, PredictorError> {
        if window.len() != self.sequence_length {
            return Err(PredictorError::WindowLength {
                expected: self.sequence_length,
                got: window.len(),
            });
        }
        let input: Vec<GpuFloat> = window.iter().map(|&v| v as GpuFloat).collect();
        let xs = Tensor::from_slice(&input)
            .f_view([1, self.sequence_length as i64, 1])
            .map_err(backend)?
            .to_device(self.vs.device());
        let ys = tch::no_grad(|| self.model.forward(&xs));
        ys.f_double_value(&[0, 0]).map_err(backend)
    }
    fn window_length(&self) -> Option<usize> {
        Some(self.sequence_length)
    }
}

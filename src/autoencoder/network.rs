use crate::{Error, Matrix, Result};
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Activation, AdamW, Linear, Optimizer, ParamsAdamW, VarBuilder, VarMap};
use rand::prelude::*;
use std::fmt;

/// Hidden layer widths of the encoder; the decoder mirrors them.
pub(crate) const HIDDEN_UNITS: [usize; 2] = [128, 64];

/// Fully connected layer followed by its activation.
#[derive(Clone, Debug)]
struct Dense {
    linear: Linear,
    activation: Activation,
}
impl Module for Dense {
    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.linear.forward(xs)?.apply(&self.activation)
    }
}

/// Create the layers for **widths** under the **prefix** namespace of the var-map. Weights are drawn
/// Glorot-uniform from **rnd** so that training is reproducible from the caller's seed; biases start at zero.
fn dense_stack(varmap: &mut VarMap, prefix: &str, widths: &[usize], output: Activation, device: &Device, rnd: &mut dyn RngCore) -> Result<Vec<Dense>> {
    let last = widths.len().saturating_sub(2);
    let layers = {
        let vb = VarBuilder::from_varmap(varmap, DType::F64, device);
        widths.windows(2).enumerate()
            .map(|(i, w)| -> Result<Dense> {
                let linear = candle_nn::linear(w[0], w[1], vb.pp(format!("{prefix}.{i}")))?;
                let activation = if i == last { output } else { Activation::Relu };
                Ok(Dense { linear, activation })
            })
            .collect::<Result<Vec<_>>>()?
    };

    for (i, w) in widths.windows(2).enumerate() {
        let (inputs, units) = (w[0], w[1]);
        let limit = (6.0 / (inputs + units) as f64).sqrt();
        let weights: Vec<f64> = (0..units * inputs).map(|_| rnd.gen_range(-limit..limit)).collect();
        varmap.set_one(format!("{prefix}.{i}.weight"), Tensor::from_vec(weights, (units, inputs), device)?)?;
        varmap.set_one(format!("{prefix}.{i}.bias"), Tensor::zeros(units, DType::F64, device)?)?;
    }
    Ok(layers)
}

/// Dense autoencoder `input → 128 → 64 → bottleneck → 64 → 128 → input` with ReLU hidden layers and a
/// sigmoid output, trained with Adam on the mean squared reconstruction error.
pub struct Autoencoder {
    input_dim: usize,
    device: Device,
    varmap: VarMap,
    encoder: Vec<Dense>,
    decoder: Vec<Dense>,
    optimizer: AdamW,
}
impl fmt::Debug for Autoencoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Autoencoder")
            .field("input_dim", &self.input_dim)
            .field("layers", &(self.encoder.len() + self.decoder.len()))
            .field("learning_rate", &self.optimizer.learning_rate())
            .finish()
    }
}

fn to_tensor(m: &Matrix<f64>, device: &Device) -> Result<Tensor> {
    Ok(Tensor::from_slice(m.as_slice(), (m.rows(), m.cols()), device)?)
}

fn from_tensor(t: &Tensor) -> Result<Matrix<f64>> {
    let (rows, cols) = t.dims2()?;
    Matrix::new(t.flatten_all()?.to_vec1::<f64>()?, rows, cols)
}

impl Autoencoder {
    pub fn new(input_dim: usize, bottleneck: usize, learning_rate: f64, rnd: &mut dyn RngCore) -> Result<Self> {
        Self::with_hidden_units(input_dim, &HIDDEN_UNITS, bottleneck, learning_rate, rnd)
    }

    pub(crate) fn with_hidden_units(input_dim: usize, hidden: &[usize], bottleneck: usize, learning_rate: f64, rnd: &mut dyn RngCore) -> Result<Self> {
        if input_dim == 0 {
            return Err(Error::Training("input dimension must be positive".to_string()));
        }
        if bottleneck == 0 {
            return Err(Error::invalid("bottleneck", "must be positive"));
        }
        if !(learning_rate > 0.0 && learning_rate.is_finite()) {
            return Err(Error::invalid("learning_rate", format!("{learning_rate} is not a positive number")));
        }

        let device = Device::Cpu;
        let mut varmap = VarMap::new();
        let encoder_widths: Vec<usize> = std::iter::once(input_dim).chain(hidden.iter().copied()).chain([bottleneck]).collect();
        let decoder_widths: Vec<usize> = encoder_widths.iter().rev().copied().collect();
        let encoder = dense_stack(&mut varmap, "encoder", &encoder_widths, Activation::Relu, &device, rnd)?;
        let decoder = dense_stack(&mut varmap, "decoder", &decoder_widths, Activation::Sigmoid, &device, rnd)?;

        // Plain Adam
        let params = ParamsAdamW { lr: learning_rate, beta1: 0.9, beta2: 0.999, eps: 1e-7, weight_decay: 0.0 };
        let optimizer = AdamW::new(varmap.all_vars(), params)?;
        Ok(Self { input_dim, device, varmap, encoder, decoder, optimizer })
    }

    pub fn input_dim(&self) -> usize { self.input_dim }

    fn check_shape(&self, data: &Matrix<f64>) -> Result<()> {
        if data.cols() != self.input_dim {
            return Err(Error::ShapeMismatch {
                expected: format!("{} columns", self.input_dim),
                actual: format!("{} columns", data.cols()),
            });
        }
        Ok(())
    }

    fn encode_tensor(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        self.encoder.iter().try_fold(xs.clone(), |a, layer| a.apply(layer))
    }

    fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let codes = self.encode_tensor(xs)?;
        self.decoder.iter().try_fold(codes, |a, layer| a.apply(layer))
    }

    /// Bottleneck codes of every row.
    pub fn encode(&self, data: &Matrix<f64>) -> Result<Matrix<f64>> {
        self.check_shape(data)?;
        from_tensor(&self.encode_tensor(&to_tensor(data, &self.device)?)?)
    }

    /// Reconstruction of every row.
    pub fn reconstruct(&self, data: &Matrix<f64>) -> Result<Matrix<f64>> {
        self.check_shape(data)?;
        from_tensor(&self.forward(&to_tensor(data, &self.device)?)?)
    }

    /// Mean squared reconstruction error of the batch, still attached to the graph.
    fn loss(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        candle_nn::loss::mse(&self.forward(xs)?, xs)
    }

    /// One pass over **data** in shuffled mini-batches. Returns the sample-weighted mean batch loss,
    /// each batch measured before its update.
    pub(crate) fn fit_epoch(&mut self, data: &Matrix<f64>, batch_size: usize, rnd: &mut dyn RngCore) -> Result<f64> {
        self.check_shape(data)?;
        if data.is_empty() {
            return Err(Error::EmptyInput);
        }
        let mut order: Vec<usize> = (0..data.rows()).collect();
        order.shuffle(rnd);

        let mut weighted_loss = 0.0;
        for batch in order.chunks(batch_size.max(1)) {
            let xs = to_tensor(&data.select_rows(batch.iter().copied()), &self.device)?;
            let loss = self.loss(&xs)?;
            self.optimizer.backward_step(&loss)?;
            weighted_loss += loss.to_scalar::<f64>()? * batch.len() as f64;
        }
        Ok(weighted_loss / data.rows() as f64)
    }
}

//! Predictor topologies
//!
//! Each [`ModelType`] maps to one builder function in a closed table. A
//! builder turns the model section of a [`ModelConfig`] into the hidden
//! layer stack; [`Topology::resolve`] adds the input shape and the dense
//! output head. Resolution runs before any data is touched, so an
//! unbuildable configuration fails fast.

use serde::{Deserialize, Serialize};

use crate::config::{ModelConfig, ModelType};
use crate::{Error, Result};

/// Sizes of the dense encoder/decoder funnel.
const AUTOENCODER_UNITS: [usize; 7] = [128, 64, 32, 16, 32, 64, 128];
const CONV_FILTERS: usize = 64;
const CONV_KERNEL: usize = 2;
const POOL_SIZE: usize = 2;

/// Activation function of a dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    /// max(0, x)
    Relu,
    /// 1 / (1 + e^-x)
    Sigmoid,
}

/// One layer of a predictor topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Layer {
    Dense { units: usize, activation: Activation },
    Flatten,
    Conv1d { filters: usize, kernel_size: usize },
    MaxPool1d { pool_size: usize },
    Tcn { return_sequences: bool },
    Gru { units: usize },
    Lstm { units: usize, return_sequences: bool },
    Bidirectional(Box<Layer>),
    SelfAttention,
    RepeatVector { times: usize },
    BatchNormalization,
    Dropout { rate: f64 },
}

/// Builds the hidden layers for one model family.
pub type TopologyBuilder = fn(&ModelConfig) -> Result<Vec<Layer>>;

impl ModelType {
    /// The topology builder registered for this family.
    #[must_use]
    pub const fn builder(self) -> TopologyBuilder {
        match self {
            Self::Mlp => mlp,
            Self::AutoencoderMlp => autoencoder_mlp,
            Self::Conv1d => conv1d,
            Self::Tcn => tcn,
            Self::StackedTcn => stacked_tcn,
            Self::Gru => gru,
            Self::Lstm => lstm,
            Self::BidirectLstm => bidirect_lstm,
            Self::AttentionLstm => attention_lstm,
            Self::Seq2seqLstm => seq2seq_lstm,
            Self::StackedLstm => stacked_lstm,
        }
    }
}

/// A fully resolved predictor shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    model_type: ModelType,
    sequence_len: usize,
    width: usize,
    layers: Vec<Layer>,
}

impl Topology {
    /// Resolve the topology for a configuration with a known multivariate width.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the width is unknown, or `ConfigResolution`
    /// if the family cannot be built with these hyperparameters
    pub fn resolve(config: &ModelConfig) -> Result<Self> {
        let width = config.multivariate().ok_or_else(|| {
            Error::InvalidConfig("multivariate width is not set".to_string())
        })?;
        let mut layers = (config.model_type().builder())(config)?;
        layers.push(Layer::Dense {
            units: width,
            activation: Activation::Sigmoid,
        });
        Ok(Self {
            model_type: config.model_type(),
            sequence_len: config.sequence_len(),
            width,
            layers,
        })
    }

    /// Family this topology was built for.
    #[must_use]
    pub const fn model_type(&self) -> ModelType {
        self.model_type
    }

    /// Input window length.
    #[must_use]
    pub const fn sequence_len(&self) -> usize {
        self.sequence_len
    }

    /// Input and output width.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Layers from input to output head.
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }
}

fn mlp(config: &ModelConfig) -> Result<Vec<Layer>> {
    let width = config.multivariate().unwrap_or(1);
    Ok(vec![
        Layer::Dense {
            units: width,
            activation: Activation::Relu,
        },
        Layer::Flatten,
    ])
}

fn autoencoder_mlp(_config: &ModelConfig) -> Result<Vec<Layer>> {
    let mut layers: Vec<Layer> = AUTOENCODER_UNITS
        .iter()
        .map(|&units| Layer::Dense {
            units,
            activation: Activation::Relu,
        })
        .collect();
    layers.push(Layer::Flatten);
    Ok(layers)
}

fn conv1d(config: &ModelConfig) -> Result<Vec<Layer>> {
    // conv (valid padding) then pooling must leave at least one step
    let min_len = CONV_KERNEL - 1 + POOL_SIZE;
    if config.sequence_len() < min_len {
        return Err(Error::ConfigResolution {
            model_type: ModelType::Conv1d,
            reason: format!(
                "sequence_len {} is shorter than the {min_len} steps convolution and pooling need",
                config.sequence_len()
            ),
        });
    }
    Ok(vec![
        Layer::Conv1d {
            filters: CONV_FILTERS,
            kernel_size: CONV_KERNEL,
        },
        Layer::MaxPool1d {
            pool_size: POOL_SIZE,
        },
        Layer::Flatten,
    ])
}

fn tcn(_config: &ModelConfig) -> Result<Vec<Layer>> {
    Ok(vec![Layer::Tcn {
        return_sequences: false,
    }])
}

fn stacked_tcn(config: &ModelConfig) -> Result<Vec<Layer>> {
    let depth = stack_depth(config)?;
    let mut layers = vec![
        Layer::Tcn {
            return_sequences: true
        };
        depth - 1
    ];
    layers.push(Layer::Tcn {
        return_sequences: false,
    });
    Ok(layers)
}

fn gru(config: &ModelConfig) -> Result<Vec<Layer>> {
    Ok(vec![Layer::Gru {
        units: config.blocks(),
    }])
}

fn lstm(config: &ModelConfig) -> Result<Vec<Layer>> {
    Ok(vec![Layer::Lstm {
        units: config.blocks(),
        return_sequences: false,
    }])
}

fn bidirect_lstm(config: &ModelConfig) -> Result<Vec<Layer>> {
    Ok(vec![Layer::Bidirectional(Box::new(Layer::Lstm {
        units: config.blocks(),
        return_sequences: false,
    }))])
}

fn attention_lstm(config: &ModelConfig) -> Result<Vec<Layer>> {
    Ok(vec![
        Layer::Bidirectional(Box::new(Layer::Lstm {
            units: config.blocks(),
            return_sequences: true,
        })),
        Layer::SelfAttention,
        Layer::Flatten,
    ])
}

fn seq2seq_lstm(config: &ModelConfig) -> Result<Vec<Layer>> {
    let encoder = Layer::Lstm {
        units: config.blocks(),
        return_sequences: false,
    };
    let decoder = encoder.clone();
    let regularizer = if config.batch_normalization() {
        Some(Layer::BatchNormalization)
    } else if config.dropout_rate() > 0.0 {
        Some(Layer::Dropout {
            rate: config.dropout_rate(),
        })
    } else {
        None
    };

    let mut layers = vec![encoder];
    layers.extend(regularizer.clone());
    layers.push(Layer::RepeatVector {
        times: config.sequence_len(),
    });
    layers.push(decoder);
    layers.extend(regularizer);
    Ok(layers)
}

fn stacked_lstm(config: &ModelConfig) -> Result<Vec<Layer>> {
    let depth = stack_depth(config)?;
    let units = config.blocks();
    let mut layers = vec![
        Layer::Lstm {
            units,
            return_sequences: true
        };
        depth - 1
    ];
    layers.push(Layer::Lstm {
        units,
        return_sequences: false,
    });
    Ok(layers)
}

fn stack_depth(config: &ModelConfig) -> Result<usize> {
    let depth = config.stacked_blocks();
    if depth < 2 {
        return Err(Error::ConfigResolution {
            model_type: config.model_type(),
            reason: format!("stacked_blocks must be at least 2, got {depth}"),
        });
    }
    Ok(depth)
}

//! Model-type catalogue
//!
//! The set of predictor families is closed. Tags are the names used in
//! manifests and API requests; unknown tags are rejected when parsed, never
//! deep inside training.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Predictor family selected by the `model_type` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    /// Dense layer over each step, flattened.
    #[serde(rename = "MLP")]
    Mlp,
    /// Dense encoder/decoder funnel, flattened.
    #[serde(rename = "autoencoderMLP")]
    AutoencoderMlp,
    /// 1-D convolution with max pooling.
    #[serde(rename = "Conv1D")]
    Conv1d,
    /// Temporal convolutional network.
    #[serde(rename = "TCN")]
    Tcn,
    /// Stack of temporal convolutional networks (needs `stacked_blocks > 1`).
    #[serde(rename = "stackedTCN")]
    StackedTcn,
    /// Gated recurrent unit.
    #[serde(rename = "GRU", alias = "CuDNNGRU")]
    Gru,
    /// Long short-term memory.
    #[serde(rename = "LSTM", alias = "CuDNNLSTM")]
    Lstm,
    /// Bidirectional LSTM.
    #[serde(rename = "bidirectLSTM", alias = "BidirectLSTM")]
    BidirectLstm,
    /// Bidirectional LSTM followed by self-attention.
    #[serde(rename = "attentionLSTM")]
    AttentionLstm,
    /// Encoder/decoder LSTM.
    #[serde(rename = "seq2seqLSTM")]
    Seq2seqLstm,
    /// Stack of LSTMs (needs `stacked_blocks > 1`).
    #[serde(rename = "stackedLSTM")]
    StackedLstm,
}

impl ModelType {
    /// Every catalogue entry, in declaration order.
    pub const ALL: [Self; 11] = [
        Self::Mlp,
        Self::AutoencoderMlp,
        Self::Conv1d,
        Self::Tcn,
        Self::StackedTcn,
        Self::Gru,
        Self::Lstm,
        Self::BidirectLstm,
        Self::AttentionLstm,
        Self::Seq2seqLstm,
        Self::StackedLstm,
    ];

    /// Canonical tag as written to manifests.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Mlp => "MLP",
            Self::AutoencoderMlp => "autoencoderMLP",
            Self::Conv1d => "Conv1D",
            Self::Tcn => "TCN",
            Self::StackedTcn => "stackedTCN",
            Self::Gru => "GRU",
            Self::Lstm => "LSTM",
            Self::BidirectLstm => "bidirectLSTM",
            Self::AttentionLstm => "attentionLSTM",
            Self::Seq2seqLstm => "seq2seqLSTM",
            Self::StackedLstm => "stackedLSTM",
        }
    }

    /// Whether the family is built from repeated blocks (`stacked_blocks`).
    #[must_use]
    pub const fn is_stacked(self) -> bool {
        matches!(self, Self::StackedTcn | Self::StackedLstm)
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for ModelType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // GPU-specific spellings from older manifests map onto their CPU family
        let resolved = match s.trim() {
            "CuDNNLSTM" => Self::Lstm,
            "CuDNNGRU" => Self::Gru,
            "BidirectLSTM" => Self::BidirectLstm,
            other => Self::ALL
                .into_iter()
                .find(|ty| ty.tag() == other)
                .ok_or_else(|| Error::UnknownModelType(s.to_string()))?,
        };
        Ok(resolved)
    }
}

//! # flowcast: short-horizon network-traffic forecasting
//!
//! flowcast trains multivariate time-series forecasters on aggregated
//! network-flow features and packages each trained model, with everything
//! needed to reproduce its predictions, into one portable zip archive.
//!
//! ## Pipeline
//!
//! ```text
//! frame -> repair -> transform(delta) -> normalize -> windows -> predictor
//!                                                                   |
//! forecast <- inverse_transform <- inverse_normalize <--------------+
//! ```
//!
//! - [`frame`]: named numeric columns with Arrow/Parquet I/O
//! - [`transform`]: gap repair, differencing and min-max scaling
//! - [`window`]: sliding input/target windows in batches
//! - [`predictor`]: topology catalogue and the [`Predictor`](predictor::Predictor) seam
//! - [`artifact`]: the zip container (manifest, predictor, scaler, sample, metrics)
//! - [`forecaster`]: lifecycle orchestration
//! - [`service`]: train / predict / evaluate on named models
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use flowcast::config::Hyperparams;
//! use flowcast::frame::TimeSeriesFrame;
//! use flowcast::Forecaster;
//!
//! let frame = TimeSeriesFrame::read_parquet("data/train.parquet", None)?;
//!
//! let mut forecaster: Forecaster = Forecaster::new("ssh-load");
//! forecaster.train(&frame, &Hyperparams { epochs: Some(20), ..Hyperparams::default() })?;
//! let archive = forecaster.save("models/ssh-load")?;
//!
//! let restored: Forecaster = Forecaster::load(&archive)?;
//! let forecast = restored.predict(&frame)?;
//! println!("{} forecast rows", forecast.nrows());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod artifact;
pub mod config;
pub mod error;
pub mod forecaster;
pub mod frame;
pub mod metrics;
pub mod predictor;
pub mod service;
pub mod transform;
pub mod window;

pub use config::{Hyperparams, ModelConfig, ModelType};
pub use error::{Error, Result};
pub use forecaster::{Forecaster, ForecasterState};
pub use frame::TimeSeriesFrame;
pub use service::ForecastService;

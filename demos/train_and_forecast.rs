//! Train and Forecast: end-to-end walk through one model
//!
//! This example trains a model on synthetic hourly connection counts,
//! saves it as an archive, reloads it and forecasts the next hour.
//!
//! Pipeline: repair -> delta -> min-max -> windows -> predictor
//!
//! Run with: cargo run --example train_and_forecast
//! Logs:     RUST_LOG=flowcast=debug cargo run --example train_and_forecast

use anyhow::Context;
use flowcast::service::{ForecastService, PredictOverrides, TrainRequest};
use flowcast::{Hyperparams, ModelType, TimeSeriesFrame};
use ndarray::Array2;
use rand::Rng;

/// Daily-periodic traffic with noise and a few missing hours
fn synthetic_traffic(hours: usize, offset: usize) -> anyhow::Result<TimeSeriesFrame> {
    let mut rng = rand::thread_rng();
    let values = Array2::from_shape_fn((hours, 2), |(h, c)| {
        let t = (h + offset) as f64 * std::f64::consts::TAU / 24.0;
        let base = if c == 0 { 250_000.0 } else { 900.0 };
        base * (1.0 + 0.4 * t.sin()) * rng.gen_range(0.95..1.05)
    });
    let gaps: Vec<(usize, usize)> = (0..hours).step_by(53).skip(1).map(|h| (h, 1)).collect();

    let frame = TimeSeriesFrame::new(
        vec!["conn_in_sum_orig_bytes".into(), "conn_in_count_uid".into()],
        values,
    )?
    .with_sentinels(gaps)?;
    Ok(frame)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("flowcast=info".parse()?),
        )
        .init();

    println!("=== flowcast: Train and Forecast ===\n");

    let models_dir = std::env::temp_dir().join("flowcast-demo");
    std::fs::create_dir_all(&models_dir)
        .with_context(|| format!("creating {}", models_dir.display()))?;
    let service = ForecastService::new(&models_dir);

    let train = synthetic_traffic(24 * 21, 0)?;
    let test = synthetic_traffic(24 * 5, 24 * 21)?;
    println!("Training frame: {} rows x {} columns", train.len(), train.width());
    println!("Test frame:     {} rows x {} columns\n", test.len(), test.width());

    let mut request = TrainRequest::new("conn-hourly");
    request.hyperparams = Hyperparams {
        model_type: Some(ModelType::Gru),
        sequence_len: Some(24),
        epochs: Some(40),
        batch_size: Some(16),
        ..Hyperparams::default()
    };
    request.sample_rows = Some(48);

    let trained = service.train(&request, &train, &test).context("training")?;
    println!("=== Training ===");
    println!("  Archive: {}", trained.archive.display());
    println!("  Model type: {}", trained.config.model_type());
    for (name, value) in &trained.metrics {
        if !name.contains('_') || name == "training_time" {
            println!("  {name:>13}: {value:.4}");
        }
    }

    service.warm("conn-hourly").context("warm check")?;

    println!("\n=== Forecast ===");
    let recent = test.tail(72);
    let forecast = service
        .predict("conn-hourly", &recent, &PredictOverrides { batch_size: Some(64) })
        .context("prediction")?;
    if let Some(next) = forecast.predictions.last() {
        println!("  Next hour bytes:       {:.0}", next[0]);
        println!("  Next hour connections: {:.0}", next[1]);
    }

    let evaluated = service.evaluate("conn-hourly", &test).context("evaluation")?;
    println!("\n=== Evaluation (normalized space) ===");
    for (name, value) in &evaluated.loss_metrics {
        println!("  {name:>6}: {value:.6}");
    }

    Ok(())
}

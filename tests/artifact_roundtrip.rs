//! Archive persistence tests against real files

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flowcast::artifact::{self, LoadWarning};
use flowcast::config::{MANIFEST_VERSION, METRICS_MEMBER};
use flowcast::{Error, Forecaster, Hyperparams, TimeSeriesFrame};
use ndarray::Array2;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

fn scratch_dir(test: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("flowcast-{test}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn traffic(rows: usize) -> TimeSeriesFrame {
    let values = Array2::from_shape_fn((rows, 2), |(r, c)| {
        let t = r as f64;
        if c == 0 {
            1000.0 + 200.0 * (t * 0.4).sin()
        } else {
            40.0 + 5.0 * (t * 0.4).cos()
        }
    });
    TimeSeriesFrame::new(
        vec!["in_sum_orig_bytes".into(), "in_count_uid".into()],
        values,
    )
    .unwrap()
}

fn trained() -> Forecaster {
    let mut forecaster: Forecaster = Forecaster::new("traffic");
    forecaster
        .train(
            &traffic(30),
            &Hyperparams {
                epochs: Some(5),
                ..Hyperparams::default()
            },
        )
        .unwrap();
    forecaster
}

/// Copy an archive, letting `edit` drop or replace members.
fn rewrite(path: &Path, edit: impl Fn(&str, Vec<u8>) -> Option<Vec<u8>>) {
    let mut source = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut members = Vec::new();
    for i in 0..source.len() {
        let mut member = source.by_index(i).unwrap();
        let mut bytes = Vec::new();
        member.read_to_end(&mut bytes).unwrap();
        members.push((member.name().to_string(), bytes));
    }
    drop(source);

    let mut out = ZipWriter::new(File::create(path).unwrap());
    for (name, bytes) in members {
        if let Some(bytes) = edit(&name, bytes) {
            out.start_file(name.as_str(), SimpleFileOptions::default()).unwrap();
            out.write_all(&bytes).unwrap();
        }
    }
    out.finish().unwrap();
}

#[test]
fn test_save_appends_zip_suffix() {
    let dir = scratch_dir("suffix");
    let mut forecaster = trained();

    let saved = forecaster.save(dir.join("traffic")).unwrap();
    assert_eq!(saved, dir.join("traffic.zip"));
    assert!(saved.exists());
    assert!(forecaster.is_persisted());
    assert!(!dir.join("traffic.zip.tmp").exists());

    // an explicit suffix is kept as is
    let explicit = forecaster.save(dir.join("copy.zip")).unwrap();
    assert_eq!(explicit, dir.join("copy.zip"));
}

#[test]
fn test_file_round_trip_preserves_predictions() {
    let dir = scratch_dir("roundtrip");
    let mut forecaster = trained();
    forecaster.set_sample_data(Some(traffic(30).tail(12)));
    let saved = forecaster.save(dir.join("traffic")).unwrap();

    let restored: Forecaster = Forecaster::load(&saved).unwrap();
    assert_eq!(restored.name(), "traffic");
    assert_eq!(restored.config(), forecaster.config());
    assert_eq!(restored.scaler(), forecaster.scaler());
    assert_eq!(restored.metrics(), forecaster.metrics());
    assert_eq!(restored.sample_data(), forecaster.sample_data());
    assert!(restored.load_warnings().is_empty());

    let frame = traffic(24);
    assert_eq!(
        restored.predict(&frame).unwrap(),
        forecaster.predict(&frame).unwrap()
    );
    restored.warm().unwrap();
}

#[test]
fn test_load_accepts_path_without_suffix() {
    let dir = scratch_dir("nosuffix");
    trained().save(dir.join("traffic.zip")).unwrap();

    let restored: Forecaster = Forecaster::load(dir.join("traffic")).unwrap();
    assert_eq!(restored.name(), "traffic");
    assert_eq!(artifact::load_config(dir.join("traffic")).unwrap(), *restored.config());
}

#[test]
fn test_missing_metrics_loads_with_warning() {
    let dir = scratch_dir("nometrics");
    let saved = trained().save(dir.join("traffic")).unwrap();
    rewrite(&saved, |name, bytes| (name != METRICS_MEMBER).then_some(bytes));

    let restored: Forecaster = Forecaster::load(&saved).unwrap();
    assert!(restored.metrics().is_empty());
    assert!(restored.training_time().is_none());
    assert!(matches!(
        restored.load_warnings(),
        [LoadWarning::MetricsUnavailable(_)]
    ));
    // the model itself is intact
    assert_eq!(restored.predict(&traffic(20)).unwrap().nrows(), 14);
}

#[test]
fn test_malformed_metrics_loads_with_warning() {
    let dir = scratch_dir("badmetrics");
    let saved = trained().save(dir.join("traffic")).unwrap();
    rewrite(&saved, |name, bytes| {
        Some(if name == METRICS_MEMBER { b"[1,2]".to_vec() } else { bytes })
    });

    let restored: Forecaster = Forecaster::load(&saved).unwrap();
    assert!(restored.metrics().is_empty());
    assert!(matches!(
        restored.load_warnings(),
        [LoadWarning::MetricsUnavailable(_)]
    ));
    assert_eq!(restored.predict(&traffic(20)).unwrap().nrows(), 14);
}

#[test]
fn test_corrupt_sample_data_loads_without_it() {
    let dir = scratch_dir("badsample");
    let mut forecaster = trained();
    forecaster.set_sample_data(Some(traffic(30).tail(12)));
    let saved = forecaster.save(dir.join("traffic")).unwrap();
    let member = forecaster.config().sample_data_file().unwrap().to_string();
    rewrite(&saved, |name, bytes| {
        Some(if name == member { vec![0xde, 0xad, 0xbe, 0xef] } else { bytes })
    });

    let restored: Forecaster = Forecaster::load(&saved).unwrap();
    assert!(restored.sample_data().is_none());
    assert!(matches!(
        restored.load_warnings(),
        [LoadWarning::SampleDataUnavailable(_)]
    ));
    // warm is a no-op without sample data
    assert!(restored.warm().is_ok());
    assert_eq!(restored.predict(&traffic(20)).unwrap().nrows(), 14);
}

#[test]
fn test_legacy_manifest_migrates_training_time() {
    let dir = scratch_dir("legacy");
    let saved = trained().save(dir.join("traffic")).unwrap();
    rewrite(&saved, |name, bytes| match name {
        "config.json" => {
            let mut manifest: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
            let object = manifest.as_object_mut().unwrap();
            object.remove("version");
            object["model"]["training_time"] = serde_json::json!(12.5);
            Some(serde_json::to_vec(&manifest).unwrap())
        }
        METRICS_MEMBER => None,
        _ => Some(bytes),
    });

    let mut restored: Forecaster = Forecaster::load(&saved).unwrap();
    assert_eq!(restored.config().version(), 1);
    assert_eq!(restored.training_time(), Some(12.5));
    assert!(restored
        .load_warnings()
        .contains(&LoadWarning::MetricsMigrated { training_time: 12.5 }));

    // saving writes the current manifest format with training_time in metrics
    let upgraded = restored.save(dir.join("upgraded")).unwrap();
    let config = artifact::load_config(&upgraded).unwrap();
    assert_eq!(config.version(), MANIFEST_VERSION);

    let reloaded: Forecaster = Forecaster::load(&upgraded).unwrap();
    assert_eq!(reloaded.training_time(), Some(12.5));
    assert!(reloaded.load_warnings().is_empty());
}

#[test]
fn test_missing_model_member_is_corrupt() {
    let dir = scratch_dir("nomodel");
    let saved = trained().save(dir.join("traffic")).unwrap();
    rewrite(&saved, |name, bytes| (name != "model.bin").then_some(bytes));

    let err = Forecaster::<flowcast::predictor::LinearPredictor>::load(&saved).unwrap_err();
    assert!(matches!(err, Error::ArtifactCorrupt { ref member, .. } if member == "model.bin"));
}

#[test]
fn test_missing_manifest_is_corrupt() {
    let dir = scratch_dir("nomanifest");
    let saved = trained().save(dir.join("traffic")).unwrap();
    rewrite(&saved, |name, bytes| (name != "config.json").then_some(bytes));

    assert!(matches!(
        artifact::load_config(&saved),
        Err(Error::ArtifactCorrupt { .. })
    ));
}

#[test]
fn test_missing_archive_is_io_error() {
    let dir = scratch_dir("absent");
    let result: flowcast::Result<Forecaster> = Forecaster::load(dir.join("nothing"));
    assert!(matches!(result, Err(Error::Io(_))));
}

#[test]
fn test_failed_save_keeps_existing_archive() {
    let dir = scratch_dir("failedsave");
    let saved = trained().save(dir.join("traffic")).unwrap();
    let before = std::fs::read(&saved).unwrap();

    let mut untrained: Forecaster = Forecaster::new("traffic");
    assert!(matches!(untrained.save(&saved), Err(Error::NotTrained)));
    assert_eq!(std::fs::read(&saved).unwrap(), before);
    assert!(!dir.join("traffic.zip.tmp").exists());
}

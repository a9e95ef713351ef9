use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use super::{normalize_archive_path, LoadWarning, ModelArtifact};
use crate::config::{ModelConfig, MANIFEST_MEMBER, METRICS_MEMBER};
use crate::frame::TimeSeriesFrame;
use crate::metrics::{Metrics, TRAINING_TIME};
use crate::predictor::Predictor;
use crate::transform::MinMaxScaler;
use crate::{Error, Result};

fn member_options() -> SimpleFileOptions {
    // fixed timestamp keeps archive bytes reproducible
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
}

fn read_member<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>> {
    let mut member = archive.by_name(name)?;
    let mut bytes = Vec::new();
    member.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn corrupt(member: &str, err: impl std::fmt::Display) -> Error {
    Error::ArtifactCorrupt {
        member: member.to_string(),
        reason: err.to_string(),
    }
}

impl<P: Predictor> ModelArtifact<P> {
    /// Save to `path` (`.zip` appended if missing), returning the final path.
    ///
    /// The archive is written to a sibling temporary file and renamed into
    /// place; on failure the temporary file is removed and any existing
    /// archive at the target is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `NotTrained` without a predictor, `ScalerNotFitted` with an
    /// unfitted scaler, or an IO/archive error
    pub fn save<Q: AsRef<Path>>(&mut self, path: Q) -> Result<PathBuf> {
        let target = normalize_archive_path(path.as_ref());
        let mut tmp_name = target.as_os_str().to_os_string();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let written = File::create(&tmp)
            .map_err(Error::from)
            .and_then(|file| self.write_archive(BufWriter::new(file)))
            .and_then(|()| fs::rename(&tmp, &target).map_err(Error::from));

        if let Err(err) = written {
            // best effort: the temp file may not exist
            let _ = fs::remove_file(&tmp);
            return Err(err);
        }

        info!(path = %target.display(), "Saved model artifact");
        Ok(target)
    }

    /// Write the archive members to `sink`.
    ///
    /// Brings the manifest up to date first: current format version and a
    /// `sample_data` section exactly when sample data is present.
    ///
    /// # Errors
    ///
    /// Same as [`save`](Self::save)
    pub fn write_archive<W: Write + Seek>(&mut self, sink: W) -> Result<()> {
        let predictor = self.predictor.as_ref().ok_or(Error::NotTrained)?;
        if !self.scaler.is_fitted() {
            return Err(Error::ScalerNotFitted);
        }

        if self.sample_data.is_some() {
            self.config.ensure_sample_data_section();
        } else {
            self.config.set_sample_data_file(None);
        }
        self.config.mark_current_version();
        self.config.validate()?;

        let mut members: Vec<(String, Vec<u8>)> = vec![
            (MANIFEST_MEMBER.to_string(), self.config.to_json()?),
            (self.config.model_file().to_string(), predictor.serialize()?),
            (self.config.scaler_file().to_string(), self.scaler.to_json()?),
        ];
        if let (Some(frame), Some(file)) = (&self.sample_data, self.config.sample_data_file()) {
            members.push((file.to_string(), frame.to_parquet_bytes()?));
        }
        members.push((METRICS_MEMBER.to_string(), self.metrics.to_json()?));

        let mut zip = ZipWriter::new(sink);
        for (name, bytes) in &members {
            debug!(member = %name, bytes = bytes.len(), "Writing archive member");
            zip.start_file(name.as_str(), member_options())?;
            zip.write_all(bytes)?;
        }
        zip.finish()?.flush()?;
        Ok(())
    }

    /// Load an archive (`.zip` appended if missing).
    ///
    /// Manifest, predictor and scaler are mandatory. Sample data and metrics
    /// are best effort: problems are logged and recorded in
    /// [`load_warnings`](Self::load_warnings).
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be opened, or `ArtifactCorrupt`
    /// if a mandatory member is missing or invalid
    pub fn load<Q: AsRef<Path>>(path: Q) -> Result<Self> {
        let path = normalize_archive_path(path.as_ref());
        let file = File::open(&path)?;
        let artifact = Self::read_archive(BufReader::new(file))?;
        info!(
            path = %path.display(),
            warnings = artifact.warnings.len(),
            "Loaded model artifact"
        );
        Ok(artifact)
    }

    /// Read an archive from any seekable source.
    ///
    /// # Errors
    ///
    /// Same as [`load`](Self::load)
    pub fn read_archive<R: Read + Seek>(source: R) -> Result<Self> {
        let mut archive =
            ZipArchive::new(source).map_err(|e| corrupt("<archive>", e))?;
        let mut config = read_manifest(&mut archive)?;

        let predictor_bytes = read_member(&mut archive, config.model_file())
            .map_err(|e| corrupt(config.model_file(), e))?;
        let predictor =
            P::deserialize(&predictor_bytes).map_err(|e| corrupt(config.model_file(), e))?;

        let scaler = read_member(&mut archive, config.scaler_file())
            .and_then(|bytes| MinMaxScaler::from_json(&bytes))
            .map_err(|e| corrupt(config.scaler_file(), e))?;
        if !scaler.is_fitted() {
            return Err(corrupt(config.scaler_file(), "scaler state is not fitted"));
        }

        let mut warnings = Vec::new();

        let sample_data = match config.sample_data_file().map(str::to_string) {
            Some(file) => match read_member(&mut archive, &file)
                .and_then(TimeSeriesFrame::from_parquet_bytes)
            {
                Ok(frame) => Some(frame),
                Err(err) => {
                    warn!(member = %file, error = %err, "Sample data unavailable");
                    warnings.push(LoadWarning::SampleDataUnavailable(err.to_string()));
                    None
                }
            },
            None => None,
        };

        let mut metrics = match read_member(&mut archive, METRICS_MEMBER)
            .and_then(|bytes| Metrics::from_json(&bytes))
        {
            Ok(metrics) => metrics,
            Err(err) => {
                warn!(error = %err, "Could not load model metrics, starting empty");
                warnings.push(LoadWarning::MetricsUnavailable(err.to_string()));
                Metrics::new()
            }
        };

        if let Some(training_time) = config.take_legacy_training_time() {
            if !metrics.contains(TRAINING_TIME) {
                warn!(training_time, "Migrating training_time from legacy manifest into metrics");
                metrics.insert(TRAINING_TIME, training_time);
                warnings.push(LoadWarning::MetricsMigrated { training_time });
            }
        }

        Ok(Self {
            config,
            predictor: Some(predictor),
            scaler,
            sample_data,
            metrics,
            warnings,
        })
    }
}

fn read_manifest<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<ModelConfig> {
    read_member(archive, MANIFEST_MEMBER)
        .and_then(|bytes| ModelConfig::from_json(&bytes))
        .map_err(|e| corrupt(MANIFEST_MEMBER, e))
}

/// Read only the manifest of an archive (`.zip` appended if missing).
///
/// # Errors
///
/// Returns an IO error if the file cannot be opened, or `ArtifactCorrupt`
/// if the manifest is missing or invalid
pub fn load_config<Q: AsRef<Path>>(path: Q) -> Result<ModelConfig> {
    let path = normalize_archive_path(path.as_ref());
    let file = File::open(&path)?;
    let mut archive =
        ZipArchive::new(BufReader::new(file)).map_err(|e| corrupt("<archive>", e))?;
    read_manifest(&mut archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Hyperparams;
    use crate::predictor::{LinearPredictor, Topology};
    use ndarray::array;
    use std::io::Cursor;

    fn trained() -> ModelArtifact<LinearPredictor> {
        let mut config = ModelConfig::default();
        config.merge(&Hyperparams {
            sequence_len: Some(2),
            ..Hyperparams::default()
        });
        config.set_multivariate(2);
        let predictor = LinearPredictor::build(&Topology::resolve(&config).unwrap()).unwrap();

        let mut artifact = ModelArtifact::new(config);
        artifact.set_predictor(predictor);
        artifact
            .scaler_mut()
            .fit(&array![[0.0, 1.0], [2.0, 3.0]])
            .unwrap();
        let mut metrics = Metrics::new();
        metrics.insert(TRAINING_TIME, 1.5);
        artifact.update_metrics(&metrics);
        artifact
    }

    fn to_bytes(artifact: &mut ModelArtifact<LinearPredictor>) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        artifact.write_archive(&mut buf).unwrap();
        buf.into_inner()
    }

    /// Rebuild an archive from `bytes`, dropping or replacing members.
    fn rewrite(bytes: &[u8], edit: impl Fn(&str, Vec<u8>) -> Option<Vec<u8>>) -> Vec<u8> {
        let mut source = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut out = ZipWriter::new(Cursor::new(Vec::new()));
        let names: Vec<String> = source.file_names().map(str::to_string).collect();
        for name in names {
            let content = read_member(&mut source, &name).unwrap();
            if let Some(content) = edit(&name, content) {
                out.start_file(name.as_str(), member_options()).unwrap();
                out.write_all(&content).unwrap();
            }
        }
        out.finish().unwrap().into_inner()
    }

    #[test]
    fn test_untrained_artifact_cannot_be_written() {
        let mut artifact: ModelArtifact<LinearPredictor> = ModelArtifact::default();
        let err = artifact.write_archive(Cursor::new(Vec::new())).unwrap_err();
        assert!(matches!(err, Error::NotTrained));
    }

    #[test]
    fn test_unfitted_scaler_cannot_be_written() {
        let mut artifact = trained();
        *artifact.scaler_mut() = MinMaxScaler::new();
        let err = artifact.write_archive(Cursor::new(Vec::new())).unwrap_err();
        assert!(matches!(err, Error::ScalerNotFitted));
    }

    #[test]
    fn test_archive_bytes_are_deterministic() {
        let mut artifact = trained();
        assert_eq!(to_bytes(&mut artifact), to_bytes(&mut artifact));
    }

    #[test]
    fn test_round_trip_in_memory() {
        let mut artifact = trained();
        let bytes = to_bytes(&mut artifact);
        let restored = ModelArtifact::<LinearPredictor>::read_archive(Cursor::new(bytes)).unwrap();

        assert_eq!(restored.config(), artifact.config());
        assert_eq!(restored.metrics(), artifact.metrics());
        assert_eq!(restored.scaler(), artifact.scaler());
        assert_eq!(restored.predictor(), artifact.predictor());
        assert!(restored.load_warnings().is_empty());
        assert!(restored.sample_data().is_none());
    }

    #[test]
    fn test_missing_metrics_member_is_a_warning() {
        let bytes = rewrite(&to_bytes(&mut trained()), |name, content| {
            (name != METRICS_MEMBER).then_some(content)
        });
        let restored = ModelArtifact::<LinearPredictor>::read_archive(Cursor::new(bytes)).unwrap();
        assert!(restored.metrics().is_empty());
        assert!(matches!(
            restored.load_warnings(),
            [LoadWarning::MetricsUnavailable(_)]
        ));
    }

    #[test]
    fn test_malformed_metrics_member_is_a_warning() {
        let bytes = rewrite(&to_bytes(&mut trained()), |name, content| {
            Some(if name == METRICS_MEMBER { b"[1,2]".to_vec() } else { content })
        });
        let restored = ModelArtifact::<LinearPredictor>::read_archive(Cursor::new(bytes)).unwrap();
        assert!(restored.metrics().is_empty());
        assert!(restored.predictor().is_some());
        assert!(matches!(
            restored.load_warnings(),
            [LoadWarning::MetricsUnavailable(_)]
        ));
    }

    #[test]
    fn test_missing_scaler_member_is_fatal() {
        let bytes = rewrite(&to_bytes(&mut trained()), |name, content| {
            (name != "scaler.json").then_some(content)
        });
        let err = ModelArtifact::<LinearPredictor>::read_archive(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Error::ArtifactCorrupt { ref member, .. } if member == "scaler.json"));
    }

    #[test]
    fn test_corrupt_predictor_member_is_fatal() {
        let bytes = rewrite(&to_bytes(&mut trained()), |name, content| {
            Some(if name == "model.bin" { b"garbage".to_vec() } else { content })
        });
        let err = ModelArtifact::<LinearPredictor>::read_archive(Cursor::new(bytes)).unwrap_err();
        assert!(matches!(err, Error::ArtifactCorrupt { ref member, .. } if member == "model.bin"));
    }

    #[test]
    fn test_missing_sample_member_is_a_warning() {
        let mut artifact = trained();
        artifact.set_sample_data(Some(
            TimeSeriesFrame::new(vec!["a".into(), "b".into()], array![[1.0, 2.0]]).unwrap(),
        ));
        let bytes = rewrite(&to_bytes(&mut artifact), |name, content| {
            (name != "sample_data.parquet").then_some(content)
        });
        let restored = ModelArtifact::<LinearPredictor>::read_archive(Cursor::new(bytes)).unwrap();
        assert!(restored.sample_data().is_none());
        assert!(matches!(
            restored.load_warnings(),
            [LoadWarning::SampleDataUnavailable(_)]
        ));
    }

    #[test]
    fn test_corrupt_sample_member_is_a_warning() {
        let mut artifact = trained();
        artifact.set_sample_data(Some(
            TimeSeriesFrame::new(vec!["a".into(), "b".into()], array![[1.0, 2.0]]).unwrap(),
        ));
        let bytes = rewrite(&to_bytes(&mut artifact), |name, content| {
            Some(if name == "sample_data.parquet" { b"not parquet".to_vec() } else { content })
        });
        let restored = ModelArtifact::<LinearPredictor>::read_archive(Cursor::new(bytes)).unwrap();
        assert!(restored.sample_data().is_none());
        assert_eq!(restored.metrics(), artifact.metrics());
        assert!(matches!(
            restored.load_warnings(),
            [LoadWarning::SampleDataUnavailable(_)]
        ));
    }

    #[test]
    fn test_sample_section_follows_data() {
        let mut artifact = trained();
        artifact.set_sample_data(Some(
            TimeSeriesFrame::new(vec!["a".into(), "b".into()], array![[1.0, 2.0]]).unwrap(),
        ));
        to_bytes(&mut artifact);
        assert_eq!(artifact.config().sample_data_file(), Some("sample_data.parquet"));

        artifact.set_sample_data(None);
        to_bytes(&mut artifact);
        assert_eq!(artifact.config().sample_data_file(), None);
    }
}

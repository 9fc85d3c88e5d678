//! File-by-file diagnosis for the command line front end.

use crate::diagnosis::DiagnosisService;
use serde_json::{json, Value};
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    /// At least one image was diagnosed.
    Completed,
    AllFailed,
    ModelUnavailable,
}

impl From<BatchStatus> for ExitCode {
    fn from(status: BatchStatus) -> Self {
        match status {
            BatchStatus::Completed => ExitCode::SUCCESS,
            BatchStatus::AllFailed | BatchStatus::ModelUnavailable => ExitCode::FAILURE,
        }
    }
}

/// One JSON object describing the outcome for `path`, and whether it failed.
pub fn diagnose_file(service: &DiagnosisService, path: &Path) -> (Value, bool) {
    match std::fs::read(path) {
        Ok(bytes) => match service.diagnose(&bytes) {
            Ok(diagnosis) => (json!({ "file": path, "diagnosis": diagnosis }), false),
            Err(e) => (
                json!({ "file": path, "error": e.kind(), "message": e.to_string() }),
                true,
            ),
        },
        Err(e) => (
            json!({ "file": path, "error": "io", "message": e.to_string() }),
            true,
        ),
    }
}

/// Writes one JSON line per image to `out`. Nothing is written when the model
/// could not be loaded.
pub fn run_batch(
    service: &DiagnosisService,
    paths: &[PathBuf],
    out: &mut impl Write,
) -> io::Result<BatchStatus> {
    if !service.is_model_available() {
        return Ok(BatchStatus::ModelUnavailable);
    }

    let mut failures = 0;
    for path in paths {
        let (line, failed) = diagnose_file(service, path);
        if failed {
            failures += 1;
        }
        writeln!(out, "{}", line)?;
    }

    tracing::info!("Diagnosed {} images, {} failed", paths.len(), failures);
    if failures == paths.len() {
        Ok(BatchStatus::AllFailed)
    } else {
        Ok(BatchStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        admission::PlantFilter,
        classifier::{Classifier, ClassifierError},
        config::{AdmissionConfig, ModelConfig},
        model_service::ModelService,
    };
    use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
    use ndarray::{Array, Ix4};
    use std::io::Cursor;
    use tempfile::TempDir;

    struct EarlyBlightModel;

    impl ModelService for EarlyBlightModel {
        fn predict(&self, _input: &Array<f32, Ix4>) -> Result<Vec<f32>, ClassifierError> {
            let mut scores = vec![0.02; 10];
            scores[1] = 0.82;
            Ok(scores)
        }
    }

    fn service() -> DiagnosisService {
        let config = ModelConfig::from_path("models/tomato.onnx");
        DiagnosisService::new(
            PlantFilter::default(),
            Classifier::with_model(EarlyBlightModel, &config),
            config.min_probability,
        )
    }

    fn write_leaf(dir: &TempDir) -> PathBuf {
        let img: RgbImage = ImageBuffer::from_fn(128, 128, |x, y| {
            if (x / 8 + y / 8) % 2 == 0 {
                Rgb([70, 220, 70])
            } else {
                Rgb([15, 80, 15])
            }
        });
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();
        let path = dir.path().join("leaf.png");
        std::fs::write(&path, buffer.into_inner()).unwrap();
        path
    }

    fn lines(out: &[u8]) -> Vec<Value> {
        std::str::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_one_line_per_image() {
        let dir = tempfile::tempdir().unwrap();
        let leaf = write_leaf(&dir);
        let blob = dir.path().join("broken.jpg");
        std::fs::write(&blob, b"not really a jpeg").unwrap();
        let missing = dir.path().join("missing.png");

        let mut out = Vec::new();
        let paths = [leaf.clone(), missing.clone(), blob];
        let status = run_batch(&service(), &paths, &mut out).unwrap();

        assert_eq!(status, BatchStatus::Completed);
        let lines = lines(&out);
        assert_eq!(lines.len(), 3);

        assert_eq!(lines[0]["file"], leaf.to_str().unwrap());
        assert_eq!(lines[0]["diagnosis"]["label"], "early_blight");
        assert_eq!(lines[0]["diagnosis"]["disease_name"], "Early blight");
        assert!(lines[0].get("error").is_none());

        assert_eq!(lines[1]["file"], missing.to_str().unwrap());
        assert_eq!(lines[1]["error"], "io");
        assert!(lines[1]["message"].is_string());

        assert_eq!(lines[2]["error"], "image_decode");
        assert!(lines[2].get("diagnosis").is_none());
    }

    #[test]
    fn test_all_failures_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.png");

        let mut out = Vec::new();
        let status = run_batch(&service(), &[missing], &mut out).unwrap();

        assert_eq!(status, BatchStatus::AllFailed);
        assert_eq!(lines(&out).len(), 1);
    }

    #[test]
    fn test_unavailable_model_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let leaf = write_leaf(&dir);
        let service = DiagnosisService::from_config(
            &ModelConfig::from_path(dir.path().join("tomato.onnx")),
            &AdmissionConfig::default(),
        );

        let mut out = Vec::new();
        let status = run_batch(&service, &[leaf], &mut out).unwrap();

        assert_eq!(status, BatchStatus::ModelUnavailable);
        assert!(out.is_empty());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            format!("{:?}", ExitCode::from(BatchStatus::Completed)),
            format!("{:?}", ExitCode::SUCCESS)
        );
        assert_eq!(
            format!("{:?}", ExitCode::from(BatchStatus::ModelUnavailable)),
            format!("{:?}", ExitCode::FAILURE)
        );
    }
}

use crate::{
    admission::{PlantFilter, PlantStatistics},
    classifier::{Classifier, ClassifierError},
    config::{AdmissionConfig, ModelConfig},
    decode::decode_image,
    labels::DiseaseLabel,
};
use serde::Serialize;
use thiserror::Error;

const TOP_PREDICTIONS: usize = 3;

#[derive(Error, Debug)]
pub enum DiagnosisError {
    #[error("Model is not available")]
    ModelUnavailable,
    #[error("Could not decode image: {0}")]
    ImageDecode(String),
    #[error("{0}")]
    NotPlantMaterial(String),
    #[error("Confidence {:.1}% is below the {:.1}% threshold", .confidence * 100.0, .threshold * 100.0)]
    LowConfidence { confidence: f32, threshold: f32 },
    #[error("Inference failed: {0}")]
    Inference(String),
}

impl DiagnosisError {
    /// Stable identifier of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            DiagnosisError::ModelUnavailable => "model_unavailable",
            DiagnosisError::ImageDecode(_) => "image_decode",
            DiagnosisError::NotPlantMaterial(_) => "not_plant_material",
            DiagnosisError::LowConfidence { .. } => "low_confidence",
            DiagnosisError::Inference(_) => "inference",
        }
    }
}

impl From<ClassifierError> for DiagnosisError {
    fn from(err: ClassifierError) -> Self {
        match err {
            ClassifierError::ModelUnavailable => DiagnosisError::ModelUnavailable,
            ClassifierError::ImageDecode(e) => DiagnosisError::ImageDecode(e.to_string()),
            other => DiagnosisError::Inference(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub label: String,
    /// Percentage, 0..100.
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    pub label: DiseaseLabel,
    pub disease_name: String,
    /// Percentage, 0..100.
    pub confidence: f32,
    pub treatment: String,
    pub top_predictions: Vec<Prediction>,
    pub statistics: PlantStatistics,
}

/// Plant check, classifier and confidence policy, built once per process.
#[derive(Clone)]
pub struct DiagnosisService {
    filter: PlantFilter,
    classifier: Classifier,
    min_probability: f32,
}

impl DiagnosisService {
    pub fn new(filter: PlantFilter, classifier: Classifier, min_probability: f32) -> Self {
        Self {
            filter,
            classifier,
            min_probability,
        }
    }

    pub fn from_config(model: &ModelConfig, admission: &AdmissionConfig) -> Self {
        Self::new(
            PlantFilter::new(admission.clone()),
            Classifier::load(model),
            model.min_probability,
        )
    }

    pub fn is_model_available(&self) -> bool {
        self.classifier.is_available()
    }

    pub fn filter(&self) -> &PlantFilter {
        &self.filter
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn diagnose(&self, bytes: &[u8]) -> Result<Diagnosis, DiagnosisError> {
        if !self.classifier.is_available() {
            return Err(DiagnosisError::ModelUnavailable);
        }

        let image = decode_image(bytes).map_err(|e| DiagnosisError::ImageDecode(e.to_string()))?;

        let verdict = self.filter.evaluate(&image);
        let statistics = match verdict.statistics {
            Some(statistics) if verdict.accepted => statistics,
            _ => {
                tracing::info!("Upload rejected by plant check");
                return Err(DiagnosisError::NotPlantMaterial(verdict.reason));
            }
        };

        let result = self.classifier.classify(&image)?;
        if result.confidence < self.min_probability {
            tracing::info!(
                "Prediction {} below confidence threshold: {:.3}",
                result.label.class_name(),
                result.confidence
            );
            return Err(DiagnosisError::LowConfidence {
                confidence: result.confidence,
                threshold: self.min_probability,
            });
        }

        let top_predictions = result
            .top(TOP_PREDICTIONS)
            .iter()
            .map(|ranked| Prediction {
                label: ranked.label.display_name().to_string(),
                confidence: ranked.probability * 100.0,
            })
            .collect();

        Ok(Diagnosis {
            label: result.label,
            disease_name: result.label.display_name().to_string(),
            confidence: result.confidence * 100.0,
            treatment: result.label.treatment().to_string(),
            top_predictions,
            statistics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{labels::NUM_CLASSES, model_service::ModelService};
    use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
    use ndarray::{Array, Ix4};
    use std::io::Cursor;

    struct FixedModel(Vec<f32>);

    impl ModelService for FixedModel {
        fn predict(&self, _input: &Array<f32, Ix4>) -> Result<Vec<f32>, ClassifierError> {
            Ok(self.0.clone())
        }
    }

    struct FailingModel;

    impl ModelService for FailingModel {
        fn predict(&self, _input: &Array<f32, Ix4>) -> Result<Vec<f32>, ClassifierError> {
            Err(ClassifierError::Inference("session exploded".to_string()))
        }
    }

    fn one_hot(index: usize, confidence: f32) -> Vec<f32> {
        let rest = (1.0 - confidence) / (NUM_CLASSES - 1) as f32;
        (0..NUM_CLASSES)
            .map(|i| if i == index { confidence } else { rest })
            .collect()
    }

    fn service(model: impl ModelService) -> DiagnosisService {
        let config = ModelConfig::from_path("models/tomato.onnx");
        DiagnosisService::new(
            PlantFilter::default(),
            Classifier::with_model(model, &config),
            config.min_probability,
        )
    }

    fn leaf_png() -> Vec<u8> {
        let img: RgbImage = ImageBuffer::from_fn(256, 256, |x, y| {
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
        buffer.into_inner()
    }

    #[test]
    fn test_diagnose_leaf() {
        let diagnosis = service(FixedModel(one_hot(0, 0.82))).diagnose(&leaf_png()).unwrap();

        assert_eq!(diagnosis.label, DiseaseLabel::BacterialSpot);
        assert_eq!(diagnosis.disease_name, "Bacterial spot");
        assert!((diagnosis.confidence - 82.0).abs() < 1e-3);
        assert_eq!(diagnosis.treatment, DiseaseLabel::BacterialSpot.treatment());
        assert_eq!(diagnosis.top_predictions.len(), 3);
        assert_eq!(diagnosis.top_predictions[0].label, "Bacterial spot");
        assert!(diagnosis.statistics.green_fraction > 0.9);
    }

    #[test]
    fn test_low_confidence_is_rejected() {
        let err = service(FixedModel(one_hot(4, 0.25)))
            .diagnose(&leaf_png())
            .unwrap_err();

        match err {
            DiagnosisError::LowConfidence {
                confidence,
                threshold,
            } => {
                assert!((confidence - 0.25).abs() < 1e-6);
                assert!((threshold - 0.30).abs() < 1e-6);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let diagnosis = service(FixedModel(one_hot(9, 0.30))).diagnose(&leaf_png());
        assert!(diagnosis.is_ok());
    }

    #[test]
    fn test_undecodable_upload() {
        let err = service(FixedModel(one_hot(0, 0.9)))
            .diagnose(b"GIF89a but truncated")
            .unwrap_err();

        assert!(matches!(err, DiagnosisError::ImageDecode(_)));
        assert_eq!(err.kind(), "image_decode");
    }

    #[test]
    fn test_oversized_upload_is_a_decode_error() {
        let img: RgbImage = ImageBuffer::new(crate::decode::MAX_IMAGE_DIMENSION + 1, 1);
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();

        let err = service(FixedModel(one_hot(0, 0.9)))
            .diagnose(buffer.get_ref())
            .unwrap_err();
        assert!(matches!(err, DiagnosisError::ImageDecode(_)));
    }

    #[test]
    fn test_unavailable_model() {
        let service = DiagnosisService::from_config(
            &ModelConfig::from_path("nowhere/tomato.onnx"),
            &AdmissionConfig::default(),
        );

        assert!(!service.is_model_available());
        for _ in 0..2 {
            assert!(matches!(
                service.diagnose(&leaf_png()),
                Err(DiagnosisError::ModelUnavailable)
            ));
        }
    }

    #[test]
    fn test_inference_failure_is_distinct() {
        let err = service(FailingModel).diagnose(&leaf_png()).unwrap_err();

        assert!(matches!(err, DiagnosisError::Inference(_)));
        assert_eq!(err.kind(), "inference");
    }

    #[test]
    fn test_error_messages() {
        let err = DiagnosisError::LowConfidence {
            confidence: 0.2512,
            threshold: 0.3,
        };
        assert_eq!(err.to_string(), "Confidence 25.1% is below the 30.0% threshold");
    }
}

mod ort_service;

pub mod admission;
pub mod batch;
pub mod classifier;
pub mod config;
pub mod decode;
pub mod diagnosis;
pub mod labels;
pub mod model_service;

pub use admission::{AdmissibilityVerdict, PlantFilter, PlantStatistics};
pub use classifier::{ClassificationResult, Classifier, ClassifierError};
pub use diagnosis::{Diagnosis, DiagnosisError, DiagnosisService, Prediction};
pub use labels::DiseaseLabel;
pub use model_service::ModelService;

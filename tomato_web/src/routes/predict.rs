use crate::{
    server::SharedState,
    upload::{validate_filename, UploadError},
};
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinError;
use tomato_diagnosis::{Diagnosis, DiagnosisError};
use tracing::instrument;

const ROUTE: &str = "/predict";
const FILE_FIELD: &str = "file";

#[derive(Error, Debug)]
pub enum PredictImageError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("Multipart upload failed: {0}")]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Diagnosis(#[from] DiagnosisError),
    #[error("Diagnosis worker failed: {0}")]
    Worker(#[from] JoinError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl PredictImageError {
    fn kind(&self) -> &'static str {
        match self {
            PredictImageError::Upload(UploadError::NoFile) => "no_file",
            PredictImageError::Upload(UploadError::InvalidType) => "invalid_file_type",
            PredictImageError::Upload(UploadError::Io(_)) => "storage",
            PredictImageError::Multipart(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                "file_too_large"
            }
            PredictImageError::Multipart(_) => "malformed_upload",
            PredictImageError::Diagnosis(e) => e.kind(),
            PredictImageError::Worker(_) => "inference",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            PredictImageError::Upload(UploadError::NoFile) => StatusCode::BAD_REQUEST,
            PredictImageError::Upload(UploadError::InvalidType) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            PredictImageError::Upload(UploadError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            PredictImageError::Multipart(e) => e.status(),
            PredictImageError::Diagnosis(e) => match e {
                DiagnosisError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                DiagnosisError::ImageDecode(_) => StatusCode::BAD_REQUEST,
                DiagnosisError::NotPlantMaterial(_) | DiagnosisError::LowConfidence { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                DiagnosisError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            PredictImageError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text shown to the person who uploaded the photo.
    fn user_message(&self) -> String {
        match self {
            PredictImageError::Upload(UploadError::Io(_)) => "Error saving file".to_string(),
            PredictImageError::Upload(e) => e.to_string(),
            PredictImageError::Multipart(e) if e.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                "File too large. Maximum size is 5MB.".to_string()
            }
            PredictImageError::Multipart(_) => "No file selected".to_string(),
            PredictImageError::Diagnosis(e) => match e {
                DiagnosisError::ModelUnavailable => {
                    "Model not available. Please contact administrator.".to_string()
                }
                DiagnosisError::ImageDecode(_) => {
                    "The uploaded file could not be read as an image. Please upload a JPG or PNG photo."
                        .to_string()
                }
                DiagnosisError::NotPlantMaterial(reason) => reason.clone(),
                DiagnosisError::LowConfidence { .. } => {
                    "The image quality is too low for reliable disease detection. Please upload a clearer image of a tomato leaf."
                        .to_string()
                }
                DiagnosisError::Inference(_) => "Error processing image.".to_string(),
            },
            PredictImageError::Worker(_) => "Error processing image.".to_string(),
        }
    }
}

impl IntoResponse for PredictImageError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Prediction failed: {}", self);
        } else {
            tracing::info!("Prediction refused: {}", self);
        }

        let body = ErrorBody {
            error: self.kind(),
            message: self.user_message(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Serialize)]
pub struct PredictResponse {
    #[serde(flatten)]
    diagnosis: Diagnosis,
    image_filename: String,
}

async fn read_upload(multipart: &mut Multipart) -> Result<(String, Vec<u8>), PredictImageError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = validate_filename(field.file_name())?;
        let data = field.bytes().await?;
        if data.is_empty() {
            return Err(UploadError::NoFile.into());
        }
        return Ok((filename, data.to_vec()));
    }

    Err(UploadError::NoFile.into())
}

async fn diagnose_upload(
    state: &SharedState,
    multipart: &mut Multipart,
) -> Result<PredictResponse, PredictImageError> {
    let (filename, data) = read_upload(multipart).await?;

    let service = state.diagnosis.clone();
    let started = Instant::now();
    let (result, data) = tokio::task::spawn_blocking(move || {
        let result = service.diagnose(&data);
        (result, data)
    })
    .await?;
    state
        .metrics
        .record_prediction_duration(started.elapsed().as_millis() as u64, ROUTE);

    let diagnosis = result?;
    let image_filename = state.uploads.save(&filename, &data).await?;

    tracing::info!(
        "Diagnosed {} as {} ({:.1}%)",
        image_filename,
        diagnosis.disease_name,
        diagnosis.confidence
    );

    Ok(PredictResponse {
        diagnosis,
        image_filename,
    })
}

#[instrument(skip(state, multipart))]
pub async fn predict_image(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<PredictResponse>, PredictImageError> {
    state.metrics.record_request(ROUTE);

    let result = diagnose_upload(&state, &mut multipart).await;
    state.metrics.record_outcome(match &result {
        Ok(_) => "diagnosed",
        Err(e) => e.kind(),
    });

    result.map(Json)
}

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use shared::ErrorResponse;

use crate::model::{InferenceError, LoadError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("No image provided")]
    NoImage,
    #[error("Invalid request payload: {0}")]
    Payload(String),
    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),
    #[error("Invalid base64 image: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("Could not decode image: {0}")]
    ImageDecode(#[from] image::ImageError),
    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("Model unavailable: {0}")]
    ModelLoad(#[from] LoadError),
    #[error("Background task failed: {0}")]
    Blocking(#[from] actix_web::error::BlockingError),
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NoImage | ServiceError::Payload(_) => StatusCode::BAD_REQUEST,
            ServiceError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::InvalidBase64(_) | ServiceError::ImageDecode(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServiceError::ModelLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Inference(_) | ServiceError::Blocking(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{}", self);
        } else {
            log::warn!("Rejected request: {}", self);
        }
        HttpResponse::build(status).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

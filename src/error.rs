use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Model not loaded")]
    ModelNotReady,

    #[error("{0}")]
    InvalidInput(String),

    #[error("Synthesis failed: {0}")]
    SynthesisFailed(String),

    #[error("Model load failed: {0}")]
    ModelLoad(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("WAV error: {0}")]
    WavError(#[from] hound::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ModelNotReady | AppError::ModelLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::SynthesisFailed(_) | AppError::IoError(_) | AppError::WavError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message sent to clients. Load failures only ever show up as "not loaded".
    pub fn detail(&self) -> String {
        match self {
            AppError::ModelLoad(_) => AppError::ModelNotReady.to_string(),
            AppError::IoError(e) => format!("Synthesis failed: {}", e),
            AppError::WavError(e) => format!("Synthesis failed: {}", e),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let detail = self.detail();

        tracing::error!("Request failed: {} - {}", status.as_u16(), self);

        (status, Json(ErrorResponse { detail })).into_response()
    }
}

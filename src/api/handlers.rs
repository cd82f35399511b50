use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    Json,
};
use base64::{engine::general_purpose, Engine as _};

use super::form;
use super::{HealthResponse, StatusResponse, SynthesizeResponse, TestSynthesisResponse};
use crate::api::routes::AppState;
use crate::error::AppError;
use crate::tts::{self, audio::SAMPLE_RATE};

const TEST_TEXT: &str = "Hola, esta es una prueba de síntesis de voz.";

pub async fn root(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        message: "F5-Spanish TTS API running".to_string(),
        model_loaded: state.model.is_ready(),
        device: state
            .model
            .device()
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unavailable".to_string()),
    })
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();

    Json(HealthResponse {
        status: "healthy".to_string(),
        model_ready: state.model.is_ready(),
        timestamp,
    })
}

pub async fn synthesize(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<SynthesizeResponse>, AppError> {
    // Readiness comes first: a request that arrives too early is 503
    // whatever its contents.
    let model = state.model.model()?;

    let multipart = multipart
        .map_err(|e| AppError::InvalidInput(format!("Invalid multipart form: {}", e)))?;
    let request = form::read_synthesis_form(multipart).await?;
    form::validate(&request)?;

    let preview: String = request.text.chars().take(50).collect();
    tracing::info!("Processing synthesis: '{}...'", preview);

    let scratch_dir = state.scratch_dir.clone();
    let request = Arc::new(request);
    let job = Arc::clone(&request);
    let synthesis = tokio::task::spawn_blocking(move || {
        tts::synthesize(model.as_ref(), &scratch_dir, &job)
    })
    .await
    .map_err(|e| AppError::SynthesisFailed(format!("Synthesis task failed: {}", e)))??;

    tracing::info!(
        "Synthesis completed in {:.2} seconds",
        synthesis.processing_time
    );

    Ok(Json(SynthesizeResponse {
        success: true,
        audio_base64: general_purpose::STANDARD.encode(&synthesis.wav),
        format: "wav".to_string(),
        sample_rate: SAMPLE_RATE,
        processing_time: synthesis.processing_time,
        text_length: request.text.chars().count(),
        ref_text: request.ref_text.clone(),
    }))
}

/// Readiness probe shaped like a synthesis result. Does not run the model.
pub async fn test_synthesis(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TestSynthesisResponse>, AppError> {
    state.model.model()?;

    tracing::info!("Running synthesis self-test...");
    let start = Instant::now();
    let processing_time = start.elapsed().as_secs_f64();

    Ok(Json(TestSynthesisResponse {
        success: true,
        message: "Model working correctly".to_string(),
        processing_time,
        test_text: TEST_TEXT.to_string(),
        model_ready: true,
    }))
}

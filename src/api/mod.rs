pub mod form;
pub mod handlers;
pub mod routes;

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub message: String,
    pub model_loaded: bool,
    pub device: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_ready: bool,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

#[derive(Debug, Serialize)]
pub struct SynthesizeResponse {
    pub success: bool,
    pub audio_base64: String,
    pub format: String,
    pub sample_rate: u32,
    pub processing_time: f64,
    pub text_length: usize,
    pub ref_text: String,
}

#[derive(Debug, Serialize)]
pub struct TestSynthesisResponse {
    pub success: bool,
    pub message: String,
    pub processing_time: f64,
    pub test_text: String,
    pub model_ready: bool,
}

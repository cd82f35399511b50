pub mod audio;
pub mod f5;
pub mod loader;
pub mod text;
pub mod vocab;

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::error::AppError;

pub use f5::F5Engine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
        }
    }
}

/// Arguments handed to the model for one synthesis.
#[derive(Debug, Clone, Copy)]
pub struct InferenceRequest<'a> {
    /// Reference clip on disk, any WAV layout.
    pub ref_audio: &'a Path,
    pub ref_text: &'a str,
    pub gen_text: &'a str,
    pub speed: f32,
    pub remove_silence: bool,
}

/// A loaded voice-cloning model. Returns mono samples at `audio::SAMPLE_RATE`.
pub trait SpeechModel: Send + Sync {
    fn infer(&self, request: &InferenceRequest<'_>) -> Result<Vec<f32>, AppError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    Loading,
    Ready,
    Unavailable,
}

struct HandleState {
    status: ModelStatus,
    model: Option<Arc<dyn SpeechModel>>,
    device: Option<Device>,
}

/// Load state of the model, shared between the loader and the handlers.
///
/// Leaves `Loading` at most once, either to `Ready` or `Unavailable`.
pub struct ModelHandle {
    state: RwLock<HandleState>,
}

impl ModelHandle {
    pub fn loading() -> Self {
        Self {
            state: RwLock::new(HandleState {
                status: ModelStatus::Loading,
                model: None,
                device: None,
            }),
        }
    }

    #[cfg(test)]
    pub fn ready(model: Arc<dyn SpeechModel>, device: Device) -> Self {
        let handle = Self::loading();
        handle.select_device(device);
        handle.set_ready(model);
        handle
    }

    pub fn select_device(&self, device: Device) {
        self.write().device = Some(device);
    }

    pub fn set_ready(&self, model: Arc<dyn SpeechModel>) {
        let mut state = self.write();
        if state.status != ModelStatus::Loading {
            tracing::warn!("Ignoring model publish, handle is {:?}", state.status);
            return;
        }
        state.model = Some(model);
        state.status = ModelStatus::Ready;
    }

    pub fn set_unavailable(&self) {
        let mut state = self.write();
        if state.status != ModelStatus::Loading {
            tracing::warn!("Ignoring load failure, handle is {:?}", state.status);
            return;
        }
        state.status = ModelStatus::Unavailable;
    }

    pub fn status(&self) -> ModelStatus {
        self.read().status
    }

    pub fn is_ready(&self) -> bool {
        self.status() == ModelStatus::Ready
    }

    pub fn device(&self) -> Option<Device> {
        self.read().device
    }

    pub fn model(&self) -> Result<Arc<dyn SpeechModel>, AppError> {
        self.read().model.clone().ok_or(AppError::ModelNotReady)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HandleState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HandleState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub text: String,
    pub ref_audio: Vec<u8>,
    pub ref_text: String,
    pub speed: f32,
    pub remove_silence: bool,
}

#[derive(Debug, Clone)]
pub struct Synthesis {
    /// WAV container at `audio::SAMPLE_RATE`.
    pub wav: Vec<u8>,
    /// Seconds spent in inference and encoding.
    pub processing_time: f64,
}

/// Run one synthesis. Blocking.
///
/// The reference clip is written to a private scratch file in `scratch_dir`
/// which is removed on every return path. Every failure is reported as
/// `AppError::SynthesisFailed`.
pub fn synthesize(
    model: &dyn SpeechModel,
    scratch_dir: &Path,
    request: &SynthesisRequest,
) -> Result<Synthesis, AppError> {
    run_synthesis(model, scratch_dir, request).map_err(|e| match e {
        AppError::SynthesisFailed(_) => e,
        other => AppError::SynthesisFailed(other.to_string()),
    })
}

fn run_synthesis(
    model: &dyn SpeechModel,
    scratch_dir: &Path,
    request: &SynthesisRequest,
) -> Result<Synthesis, AppError> {
    let mut scratch = tempfile::Builder::new()
        .prefix("ref-")
        .suffix(".wav")
        .tempfile_in(scratch_dir)?;
    scratch.write_all(&request.ref_audio)?;
    scratch.flush()?;

    tracing::info!("Starting synthesis...");
    let start = Instant::now();

    let samples = model.infer(&InferenceRequest {
        ref_audio: scratch.path(),
        ref_text: &request.ref_text,
        gen_text: &request.text,
        speed: request.speed,
        remove_silence: request.remove_silence,
    })?;
    let wav = audio::encode_wav(&samples, audio::SAMPLE_RATE)?;

    let processing_time = start.elapsed().as_secs_f64();

    // Cleanup failures are not the caller's problem.
    let _ = scratch.close();

    Ok(Synthesis {
        wav,
        processing_time,
    })
}

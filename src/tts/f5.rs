use std::fs::File;
use std::io::BufReader;
use std::sync::Mutex;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;

use super::audio::{self, SAMPLE_RATE};
use super::text;
use super::vocab::{ModelAssets, Vocab};
use super::{Device, InferenceRequest, SpeechModel};
use crate::error::AppError;

/// Samples per mel frame.
const HOP_LENGTH: usize = 256;
/// Loudness the reference is raised to before conditioning.
const TARGET_RMS: f32 = 0.1;
/// Longer references are cut to this length.
const MAX_REF_SECONDS: u32 = 12;
/// Declared rates below this are rejected.
const MIN_REF_SAMPLE_RATE: u32 = 8_000;
/// Reference plus one generated chunk must fit in this window.
const MAX_WINDOW_SECONDS: f32 = 22.0;
const CROSS_FADE_SECONDS: f32 = 0.15;

/// F5-TTS exported to a single ONNX graph.
///
/// Graph inputs, in order: `audio` f32 `[1, 1, samples]` (reference at
/// 24 kHz), `text_ids` i32 `[1, tokens]` (reference transcript followed by
/// the text to speak), `max_duration` i64 `[1]` (total mel frames).
/// The output holds the generated speech without the reference.
pub struct F5Engine {
    session: Mutex<Session>,
    vocab: Vocab,
}

impl F5Engine {
    pub fn new(assets: &ModelAssets, device: Device, intra_threads: usize) -> Result<Self, AppError> {
        tracing::info!(
            "Building ONNX session for {} on {}",
            assets.model_path.display(),
            device
        );

        let session = Session::builder()
            .map_err(|e| AppError::ModelLoad(format!("Failed to create session builder: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| AppError::ModelLoad(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(intra_threads)
            .map_err(|e| AppError::ModelLoad(format!("Failed to set threads: {}", e)))?
            .commit_from_file(&assets.model_path)
            .map_err(|e| AppError::ModelLoad(format!("Failed to load model: {}", e)))?;

        let vocab = Vocab::load(&assets.vocab_path)?;
        tracing::info!("Vocabulary loaded ({} tokens)", vocab.len());

        Ok(Self {
            session: Mutex::new(session),
            vocab,
        })
    }

    fn generate(
        &self,
        reference: &Reference,
        ref_text: &str,
        gen_text: &str,
        speed: f32,
    ) -> Result<Vec<f32>, AppError> {
        let ref_frames = reference.samples.len() / HOP_LENGTH;
        let duration = plan_duration(ref_frames, ref_text, gen_text, speed);
        let text_ids = self.vocab.encode(&format!("{}{}", ref_text, gen_text));

        tracing::debug!(
            "Generating chunk: {} tokens, {} frames",
            text_ids.len(),
            duration
        );

        // audio: [batch, channels, samples] = [1, 1, n]
        let audio_value = Value::from_array((
            vec![1, 1, reference.samples.len()],
            reference.samples.clone(),
        ))
        .map_err(|e| AppError::SynthesisFailed(format!("Failed to create audio tensor: {}", e)))?;

        // text_ids: [batch, tokens] = [1, n]
        let ids_value = Value::from_array((vec![1, text_ids.len()], text_ids))
            .map_err(|e| AppError::SynthesisFailed(format!("Failed to create text tensor: {}", e)))?;

        // max_duration: [1]
        let duration_value = Value::from_array((vec![1], vec![duration]))
            .map_err(|e| {
                AppError::SynthesisFailed(format!("Failed to create duration tensor: {}", e))
            })?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| AppError::SynthesisFailed("ONNX session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![audio_value, ids_value, duration_value])
            .map_err(|e| AppError::SynthesisFailed(format!("Inference failed: {}", e)))?;

        let output = outputs
            .get("generated_signal")
            .or_else(|| outputs.get("audio"))
            .ok_or_else(|| AppError::SynthesisFailed("Missing output tensor".to_string()))?;

        let output_view = output.try_extract_tensor::<f32>().map_err(|e| {
            AppError::SynthesisFailed(format!("Failed to extract output tensor: {}", e))
        })?;

        Ok(output_view.1.to_vec())
    }
}

impl SpeechModel for F5Engine {
    fn infer(&self, request: &InferenceRequest<'_>) -> Result<Vec<f32>, AppError> {
        render(request, |reference, ref_text, chunk, speed| {
            self.generate(reference, ref_text, chunk, speed)
        })
    }
}

/// Everything around the model call: reference conditioning, chunking,
/// crossfade, loudness restore and optional silence removal. `generate`
/// runs the model on one chunk.
fn render<G>(request: &InferenceRequest<'_>, mut generate: G) -> Result<Vec<f32>, AppError>
where
    G: FnMut(&Reference, &str, &str, f32) -> Result<Vec<f32>, AppError>,
{
    let (samples, sample_rate) =
        audio::decode_wav(BufReader::new(File::open(request.ref_audio)?))?;
    let reference = Reference::prepare(&samples, sample_rate)?;

    let ref_text = text::prepare_ref_text(request.ref_text);
    let max_bytes = reference.max_chunk_bytes(&ref_text);
    let chunks = text::chunk_text(request.gen_text, max_bytes);

    tracing::debug!(
        "Reference {:.2}s, {} chunk(s) of at most {} bytes",
        reference.seconds(),
        chunks.len(),
        max_bytes
    );

    let mut generated = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        generated.push(generate(&reference, &ref_text, chunk, request.speed)?);
    }

    let fade = (CROSS_FADE_SECONDS * SAMPLE_RATE as f32) as usize;
    let mut wave = audio::crossfade_concat(&generated, fade);
    reference.restore_loudness(&mut wave);

    if request.remove_silence {
        wave = audio::remove_long_silences(&wave, SAMPLE_RATE);
    }

    Ok(wave)
}

/// Reference clip conditioned for the model.
struct Reference {
    samples: Vec<f32>,
    /// Loudness of the clip before it was raised, when it was raised.
    original_rms: Option<f32>,
}

impl Reference {
    fn prepare(samples: &[f32], sample_rate: u32) -> Result<Self, AppError> {
        if sample_rate < MIN_REF_SAMPLE_RATE {
            return Err(AppError::SynthesisFailed(format!(
                "Reference sample rate {} Hz is below {} Hz",
                sample_rate, MIN_REF_SAMPLE_RATE
            )));
        }

        // Cut before resampling so the work is bounded by the clip limit.
        let keep = (MAX_REF_SECONDS as u64 * sample_rate as u64).min(samples.len() as u64) as usize;
        let mut samples = audio::resample(&samples[..keep], sample_rate, SAMPLE_RATE)?;
        samples.truncate(MAX_REF_SECONDS as usize * SAMPLE_RATE as usize);

        let rms = audio::rms(&samples);
        let original_rms = if rms > 0.0 && rms < TARGET_RMS {
            let gain = TARGET_RMS / rms;
            samples.iter_mut().for_each(|s| *s *= gain);
            Some(rms)
        } else {
            None
        };

        Ok(Self {
            samples,
            original_rms,
        })
    }

    fn seconds(&self) -> f32 {
        self.samples.len() as f32 / SAMPLE_RATE as f32
    }

    /// Largest chunk of text, in UTF-8 bytes, that fits next to this
    /// reference at the reference's speaking rate.
    fn max_chunk_bytes(&self, ref_text: &str) -> usize {
        let seconds = self.seconds();
        if seconds <= 0.0 {
            return ref_text.len().max(1);
        }
        let budget = ref_text.len() as f32 / seconds * (MAX_WINDOW_SECONDS - seconds);
        (budget as usize).max(1)
    }

    fn restore_loudness(&self, wave: &mut [f32]) {
        if let Some(rms) = self.original_rms {
            let gain = rms / TARGET_RMS;
            wave.iter_mut().for_each(|s| *s *= gain);
        }
    }
}

/// Total mel frames for reference plus generated speech. The generated
/// part is scaled from the reference's frames-per-byte rate.
fn plan_duration(ref_frames: usize, ref_text: &str, gen_text: &str, speed: f32) -> i64 {
    let ref_bytes = ref_text.len().max(1) as f32;
    let gen_bytes = gen_text.len() as f32;
    let speed = if speed > 0.0 { speed } else { 1.0 };
    let generated = (ref_frames as f32 / ref_bytes * gen_bytes / speed) as usize;
    (ref_frames + generated) as i64
}

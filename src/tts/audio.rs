use std::io::{Cursor, Read};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use ndarray::{Array2, Axis};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::AppError;

/// Output rate of the F5 vocoder. Every response is encoded at this rate.
pub const SAMPLE_RATE: u32 = 24_000;

/// Convert audio samples to a 16-bit mono WAV container
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AppError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut buffer = Vec::new();
    {
        let cursor = Cursor::new(&mut buffer);
        let mut writer = WavWriter::new(cursor, spec)?;

        for sample in samples {
            let scaled = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
            writer.write_sample(scaled)?;
        }

        writer.finalize()?;
    }

    Ok(buffer)
}

/// Decode a WAV stream into mono f32 samples in [-1.0, 1.0] plus its sample rate
pub fn decode_wav<R: Read>(reader: R) -> Result<(Vec<f32>, u32), AppError> {
    let mut reader = WavReader::new(reader)?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    Ok((downmix(samples, spec.channels as usize), spec.sample_rate))
}

/// Average interleaved channels down to mono
pub fn downmix(mut interleaved: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved;
    }

    let frames = interleaved.len() / channels;
    interleaved.truncate(frames * channels);

    Array2::from_shape_vec((frames, channels), interleaved)
        .ok()
        .and_then(|frames| frames.mean_axis(Axis(1)))
        .map(|mono| mono.to_vec())
        .unwrap_or_default()
}

/// Band-limited resampling of a mono signal. Content above the lower of
/// the two Nyquist frequencies is filtered out instead of folding back.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AppError> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(AppError::SynthesisFailed(format!(
            "Cannot resample from {} Hz to {} Hz",
            from_rate, to_rate
        )));
    }

    let ratio = to_rate as f64 / from_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, samples.len(), 1)
        .map_err(|e| AppError::SynthesisFailed(format!("Failed to create resampler: {}", e)))?;

    let delay = resampler.output_delay();
    let expected = (samples.len() as f64 * ratio).round() as usize;

    let mut output = resampler
        .process(&[samples], None)
        .map_err(|e| AppError::SynthesisFailed(format!("Resampling failed: {}", e)))?
        .remove(0);

    // Flush the filter tail so the delayed output covers the whole input.
    while output.len() < delay + expected {
        let tail = resampler
            .process_partial(None::<&[Vec<f32>]>, None)
            .map_err(|e| AppError::SynthesisFailed(format!("Resampling failed: {}", e)))?;
        match tail.into_iter().next() {
            Some(tail) if !tail.is_empty() => output.extend(tail),
            _ => break,
        }
    }

    Ok(output.into_iter().skip(delay).take(expected).collect())
}

pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Join chunks end to end, blending each boundary with a linear crossfade
/// of at most `fade_samples` samples.
pub fn crossfade_concat(chunks: &[Vec<f32>], fade_samples: usize) -> Vec<f32> {
    let mut output: Vec<f32> = Vec::new();

    for chunk in chunks {
        let overlap = fade_samples.min(output.len()).min(chunk.len());
        if overlap == 0 {
            output.extend_from_slice(chunk);
            continue;
        }

        let start = output.len() - overlap;
        let denom = (overlap - 1).max(1) as f32;
        for (i, (prev, &next)) in output[start..].iter_mut().zip(&chunk[..overlap]).enumerate() {
            let fade_in = if overlap == 1 { 0.5 } else { i as f32 / denom };
            *prev = *prev * (1.0 - fade_in) + next * fade_in;
        }
        output.extend_from_slice(&chunk[overlap..]);
    }

    output
}

/// Analysis window for silence detection.
const SILENCE_WINDOW_MS: usize = 10;
/// Anything quieter than this is silence.
const SILENCE_THRESHOLD_DBFS: f32 = -50.0;
/// Silent stretches shorter than this are left alone.
const MIN_SILENCE_MS: usize = 1000;
/// Silence kept next to speech when a long stretch is cut.
const KEEP_SILENCE_MS: usize = 500;

/// Shorten silent stretches of a second or more, keeping half a second of
/// silence against each neighbouring stretch of speech.
pub fn remove_long_silences(samples: &[f32], sample_rate: u32) -> Vec<f32> {
    let window = (sample_rate as usize * SILENCE_WINDOW_MS / 1000).max(1);
    let min_windows = MIN_SILENCE_MS / SILENCE_WINDOW_MS;
    let keep = sample_rate as usize * KEEP_SILENCE_MS / 1000;
    let threshold = 10f32.powf(SILENCE_THRESHOLD_DBFS / 20.0);

    let silent: Vec<bool> = samples.chunks(window).map(|w| rms(w) < threshold).collect();

    let mut output = Vec::with_capacity(samples.len());
    let mut i = 0;
    while i < silent.len() {
        let mut j = i;
        while j < silent.len() && silent[j] == silent[i] {
            j += 1;
        }

        let start = i * window;
        let end = (j * window).min(samples.len());

        if !silent[i] || j - i < min_windows {
            output.extend_from_slice(&samples[start..end]);
        } else {
            // Leading and trailing stretches only border speech on one side.
            let head = if start > 0 { keep.min(end - start) } else { 0 };
            let tail = if end < samples.len() { keep.min(end - start) } else { 0 };
            output.extend_from_slice(&samples[start..start + head]);
            output.extend_from_slice(&samples[end - tail..end]);
        }

        i = j;
    }

    output
}

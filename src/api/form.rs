use axum::extract::multipart::Field;
use axum::extract::Multipart;

use crate::error::AppError;
use crate::tts::SynthesisRequest;

const DEFAULT_SPEED: f32 = 1.0;
const DEFAULT_REMOVE_SILENCE: bool = true;

/// Read the `/synthesize` multipart form.
///
/// Missing or malformed fields are `InvalidInput`. Emptiness of the text
/// fields is checked separately by `validate`.
pub async fn read_synthesis_form(mut multipart: Multipart) -> Result<SynthesisRequest, AppError> {
    let mut text = None;
    let mut ref_audio = None;
    let mut ref_text = None;
    let mut speed = DEFAULT_SPEED;
    let mut remove_silence = DEFAULT_REMOVE_SILENCE;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Invalid multipart form: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "text" => text = Some(field_text(field, "text").await?),
            "ref_text" => ref_text = Some(field_text(field, "ref_text").await?),
            "ref_audio" => {
                let bytes = field.bytes().await.map_err(|e| {
                    AppError::InvalidInput(format!("Failed to read ref_audio: {}", e))
                })?;
                ref_audio = Some(bytes.to_vec());
            }
            "speed" => {
                let value = field_text(field, "speed").await?;
                speed = value.trim().parse().map_err(|_| {
                    AppError::InvalidInput(format!("speed must be a number, got '{}'", value))
                })?;
            }
            "remove_silence" => {
                let value = field_text(field, "remove_silence").await?;
                remove_silence = parse_bool(&value).ok_or_else(|| {
                    AppError::InvalidInput(format!(
                        "remove_silence must be a boolean, got '{}'",
                        value
                    ))
                })?;
            }
            _ => {}
        }
    }

    Ok(SynthesisRequest {
        text: text.ok_or_else(|| missing("text"))?,
        ref_audio: ref_audio.ok_or_else(|| missing("ref_audio"))?,
        ref_text: ref_text.ok_or_else(|| missing("ref_text"))?,
        speed,
        remove_silence,
    })
}

/// Reject whitespace-only text fields.
pub fn validate(request: &SynthesisRequest) -> Result<(), AppError> {
    if request.text.trim().is_empty() {
        return Err(AppError::InvalidInput("Text is required".into()));
    }

    if request.ref_text.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "Reference audio transcript is required".into(),
        ));
    }

    Ok(())
}

async fn field_text(field: Field<'_>, name: &str) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Failed to read {}: {}", name, e)))
}

fn missing(name: &str) -> AppError {
    AppError::InvalidInput(format!("Missing form field: {}", name))
}

/// Form booleans: true/false, 1/0, yes/no, on/off, any case.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" | "t" | "y" => Some(true),
        "false" | "0" | "no" | "off" | "f" | "n" => Some(false),
        _ => None,
    }
}

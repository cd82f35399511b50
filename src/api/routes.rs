use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use crate::tts::ModelHandle;

/// Reference clips can be long uncompressed WAVs.
const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

pub struct AppState {
    pub model: Arc<ModelHandle>,
    pub scratch_dir: PathBuf,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    // Any origin, method and header, with credentials. Mirroring the request
    // is how a wildcard is expressed once credentials are allowed.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/synthesize", post(handlers::synthesize))
        .route("/test-synthesis", post(handlers::test_synthesis))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use base64::{engine::general_purpose, Engine as _};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::path::Path;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::tts::testing::FakeModel;
    use crate::tts::{Device, ModelHandle, SpeechModel};

    const BOUNDARY: &str = "f5-test-boundary";

    struct TestApp {
        router: Router,
        scratch: TempDir,
    }

    fn app_with(handle: ModelHandle) -> TestApp {
        let scratch = tempfile::tempdir().unwrap();
        let state = Arc::new(AppState {
            model: Arc::new(handle),
            scratch_dir: scratch.path().to_path_buf(),
        });
        TestApp {
            router: create_router(state),
            scratch,
        }
    }

    fn ready_app(model: Arc<FakeModel>) -> TestApp {
        app_with(ModelHandle::ready(model as Arc<dyn SpeechModel>, Device::Cpu))
    }

    fn loading_app() -> TestApp {
        app_with(ModelHandle::loading())
    }

    /// Two seconds of a quiet 16 kHz tone.
    fn reference_wav() -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut buffer = Vec::new();
        {
            let mut writer =
                hound::WavWriter::new(std::io::Cursor::new(&mut buffer), spec).unwrap();
            for i in 0..32_000 {
                let sample = ((i as f32 * 0.07).sin() * 3000.0) as i16;
                writer.write_sample(sample).unwrap();
            }
            writer.finalize().unwrap();
        }
        buffer
    }

    fn multipart_body(fields: &[(&str, &str)], ref_audio: Option<&[u8]>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some(audio) = ref_audio {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"ref_audio\"; filename=\"ref.wav\"\r\nContent-Type: audio/wav\r\n\r\n",
                    BOUNDARY
                )
                .as_bytes(),
            );
            body.extend_from_slice(audio);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn synthesize_request(fields: &[(&str, &str)], ref_audio: Option<&[u8]>) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/synthesize")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(fields, ref_audio)))
            .unwrap()
    }

    fn valid_request() -> Request<Body> {
        synthesize_request(
            &[
                ("text", "Hola mundo"),
                ("ref_text", "prueba"),
                ("speed", "1.0"),
                ("remove_silence", "true"),
            ],
            Some(&reference_wav()),
        )
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn scratch_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_root_while_loading() {
        let app = loading_app();
        let (status, body) = send(&app.router, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model_loaded"], false);
        assert_eq!(body["device"], "unavailable");
        assert!(body["message"].as_str().unwrap().contains("F5-Spanish"));
    }

    #[tokio::test]
    async fn test_root_when_ready() {
        let app = ready_app(Arc::new(FakeModel::returning(vec![])));
        let (status, body) = send(&app.router, get("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model_loaded"], true);
        assert_eq!(body["device"], "cpu");
    }

    #[tokio::test]
    async fn test_health_reflects_load_state() {
        let app = loading_app();
        let (status, body) = send(&app.router, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["model_ready"], false);
        assert!(body["timestamp"].as_f64().unwrap() > 0.0);

        let app = ready_app(Arc::new(FakeModel::returning(vec![])));
        let (_, body) = send(&app.router, get("/health")).await;
        assert_eq!(body["model_ready"], true);
    }

    #[tokio::test]
    async fn test_synthesize_success() {
        let model = Arc::new(FakeModel::returning(vec![0.1; 2400]));
        let app = ready_app(Arc::clone(&model));

        let (status, body) = send(&app.router, valid_request()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["format"], "wav");
        assert_eq!(body["sample_rate"], 24000);
        assert_eq!(body["text_length"], 10);
        assert_eq!(body["ref_text"], "prueba");
        assert!(body["processing_time"].as_f64().unwrap() >= 0.0);

        let wav = general_purpose::STANDARD
            .decode(body["audio_base64"].as_str().unwrap())
            .unwrap();
        let reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, 24_000);
        assert_eq!(reader.len(), 2400);

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].gen_text, "Hola mundo");
        assert_eq!(calls[0].ref_text, "prueba");
        assert_eq!(calls[0].ref_audio_bytes, reference_wav());
        assert!(calls[0].remove_silence);
        assert!(scratch_is_empty(app.scratch.path()));
    }

    #[tokio::test]
    async fn test_synthesize_defaults() {
        let model = Arc::new(FakeModel::returning(vec![0.0; 10]));
        let app = ready_app(Arc::clone(&model));

        let request = synthesize_request(
            &[("text", "Buenos días"), ("ref_text", "prueba")],
            Some(&reference_wav()),
        );
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["text_length"], 11);

        let calls = model.calls();
        assert_eq!(calls[0].speed, 1.0);
        assert!(calls[0].remove_silence);
    }

    #[tokio::test]
    async fn test_synthesize_passes_options() {
        let model = Arc::new(FakeModel::returning(vec![0.0; 10]));
        let app = ready_app(Arc::clone(&model));

        let request = synthesize_request(
            &[
                ("text", "Hola"),
                ("ref_text", "prueba"),
                ("speed", "1.5"),
                ("remove_silence", "false"),
            ],
            Some(&reference_wav()),
        );
        let (status, _) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::OK);

        let calls = model.calls();
        assert_eq!(calls[0].speed, 1.5);
        assert!(!calls[0].remove_silence);
    }

    #[tokio::test]
    async fn test_synthesize_before_load_is_503() {
        let app = loading_app();
        let (status, body) = send(&app.router, valid_request()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["detail"], "Model not loaded");

        // Even an invalid form gets 503 first.
        let request = synthesize_request(&[("text", "")], None);
        let (status, _) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        // So does a body that is not a form at all.
        let request = Request::builder()
            .method(Method::POST)
            .uri("/synthesize")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"text": "Hola"}"#))
            .unwrap();
        let (status, _) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_synthesize_non_multipart_is_400_when_ready() {
        let app = ready_app(Arc::new(FakeModel::returning(vec![])));
        let request = Request::builder()
            .method(Method::POST)
            .uri("/synthesize")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"text": "Hola"}"#))
            .unwrap();
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("multipart"));
    }

    #[tokio::test]
    async fn test_synthesize_after_failed_load_is_503() {
        let handle = ModelHandle::loading();
        handle.select_device(Device::Cpu);
        handle.set_unavailable();
        let app = app_with(handle);

        let (status, body) = send(&app.router, valid_request()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["detail"], "Model not loaded");
    }

    #[tokio::test]
    async fn test_synthesize_empty_text_is_400() {
        let model = Arc::new(FakeModel::returning(vec![]));
        let app = ready_app(Arc::clone(&model));

        let request = synthesize_request(
            &[("text", ""), ("ref_text", "prueba")],
            Some(&reference_wav()),
        );
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Text is required");
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_synthesize_whitespace_ref_text_is_400() {
        let model = Arc::new(FakeModel::returning(vec![]));
        let app = ready_app(Arc::clone(&model));

        let request = synthesize_request(
            &[("text", "Hola"), ("ref_text", "   ")],
            Some(&reference_wav()),
        );
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("transcript"));
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_synthesize_missing_audio_is_400() {
        let app = ready_app(Arc::new(FakeModel::returning(vec![])));

        let request = synthesize_request(&[("text", "Hola"), ("ref_text", "prueba")], None);
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("ref_audio"));
    }

    #[tokio::test]
    async fn test_synthesize_bad_speed_is_400() {
        let app = ready_app(Arc::new(FakeModel::returning(vec![])));

        let request = synthesize_request(
            &[("text", "Hola"), ("ref_text", "prueba"), ("speed", "fast")],
            Some(&reference_wav()),
        );
        let (status, _) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_synthesize_model_failure_is_500() {
        let app = ready_app(Arc::new(FakeModel::failing("tensor shape mismatch")));

        let (status, body) = send(&app.router, valid_request()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["detail"], "Synthesis failed: tensor shape mismatch");
        assert!(scratch_is_empty(app.scratch.path()));
    }

    #[tokio::test]
    async fn test_test_synthesis() {
        let model = Arc::new(FakeModel::returning(vec![]));
        let app = ready_app(Arc::clone(&model));

        let request = Request::builder()
            .method(Method::POST)
            .uri("/test-synthesis")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["model_ready"], true);
        assert_eq!(body["test_text"], "Hola, esta es una prueba de síntesis de voz.");
        assert!(body["processing_time"].as_f64().unwrap() >= 0.0);
        assert!(model.calls().is_empty());
    }

    #[tokio::test]
    async fn test_test_synthesis_before_load_is_503() {
        let app = loading_app();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/test-synthesis")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app.router, request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin_with_credentials() {
        let app = loading_app();
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/synthesize")
            .header(header::ORIGIN, "https://game.example")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "x-unity-version")
            .body(Body::empty())
            .unwrap();

        let response = app.router.clone().oneshot(request).await.unwrap();
        let headers = response.headers();
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://game.example"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "x-unity-version"
        );
    }
}

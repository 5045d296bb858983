//! HTTP routes

pub mod health;
pub mod predict;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::state::SharedState;

/// Build the application router
pub fn router(state: SharedState) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Inference
        .route("/predict", post(predict::predict))
        .layer(DefaultBodyLimit::max(upload_limit))
        // Add state
        .with_state(state)
        // Add middleware
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::Value;
    use tower::ServiceExt;

    use imagefolder_classifier::backend::{default_device, InferenceBackend};
    use imagefolder_classifier::model::{Arch, ResNet, ResNetConfig};
    use imagefolder_classifier::{ClassNameTable, Predictor};

    use crate::state::{AppState, ServerConfig};

    const BOUNDARY: &str = "classifier-test-boundary";

    fn test_router(max_upload_bytes: usize) -> Router {
        let device = default_device();
        let config = ResNetConfig::new(Arch::ResNet18, 3);
        let model: ResNet<InferenceBackend> = config.init(&device);
        let classes = ClassNameTable::new(vec!["bird".into(), "cat".into(), "dog".into()]);
        let predictor = Predictor::new(model, config, Some(classes), 32, &device);

        let server_config = ServerConfig {
            image_size: 32,
            max_upload_bytes,
            ..Default::default()
        };
        router(Arc::new(AppState::new(server_config, predictor)))
    }

    fn multipart_request(field: &str, data: &[u8]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"upload.bin\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([90, 140, 30])))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_non_image_is_rejected_then_valid_image_succeeds() {
        let app = test_router(1024 * 1024);

        let response = app
            .clone()
            .oneshot(multipart_request("file", b"this is not an image"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"].is_string());

        let response = app.oneshot(multipart_request("file", &png(1, 1))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        let class = body["predicted_class"].as_u64().unwrap();
        assert!(class < 3);
        let confidence = body["confidence"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&confidence));
        assert!(body["class_name"].is_string());
    }

    #[tokio::test]
    async fn test_first_field_used_when_file_field_absent() {
        let app = test_router(1024 * 1024);
        let response = app.oneshot(multipart_request("image", &png(20, 10))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_non_multipart_request_is_bad_request() {
        let app = test_router(1024 * 1024);
        let request = Request::builder()
            .method("POST")
            .uri("/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_oversized_upload_is_rejected() {
        let app = test_router(64);
        let response = app
            .oneshot(multipart_request("file", &[0u8; 4096]))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_health_reports_class_count() {
        let app = test_router(1024);
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["num_classes"], 3);
    }
}

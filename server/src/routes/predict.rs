//! Prediction endpoint

use axum::{
    body::Bytes,
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{debug, error};

use imagefolder_classifier::PredictionResult;

use crate::state::SharedState;

/// Multipart field carrying the image
pub const UPLOAD_FIELD: &str = "file";

/// Error answered as `{"error": "..."}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// POST /predict - Classify an uploaded image
pub async fn predict(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResult>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let bytes = read_upload(&mut multipart).await?;
    debug!("Received upload of {} bytes", bytes.len());

    let task_state = state.clone();
    let result = tokio::task::spawn_blocking(move || task_state.predictor.predict(&bytes))
        .await
        .map_err(|e| {
            error!("Prediction task failed: {}", e);
            ApiError::internal("prediction failed")
        })?;

    match result {
        Ok(prediction) => Ok(Json(prediction)),
        Err(e) if e.is_client_error() => Err(ApiError::bad_request(e.to_string())),
        Err(e) => {
            error!("Prediction failed: {}", e);
            Err(ApiError::internal(e.to_string()))
        }
    }
}

/// The `file` field if present, otherwise the first field of the form
async fn read_upload(multipart: &mut Multipart) -> Result<Bytes, ApiError> {
    let mut first = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return Err(ApiError {
                    status: e.status(),
                    message: e.body_text(),
                })
            }
        };

        let is_upload = field.name() == Some(UPLOAD_FIELD);
        let data = field.bytes().await.map_err(|e| ApiError {
            status: e.status(),
            message: e.body_text(),
        })?;

        if is_upload {
            return Ok(data);
        }
        if first.is_none() {
            first = Some(data);
        }
    }

    first.ok_or_else(|| ApiError::bad_request("no file uploaded"))
}

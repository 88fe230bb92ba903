//! HTTP surface: `GET /health` and `POST /generateAvis`.

use crate::capture::{capture_async, PosterRenderer};
use crate::embed::AssetEmbedder;
use crate::fields::{PosterFields, PHOTO_FIELD};
use crate::resolver::ImageResolver;
use crate::{debug_sink, template, Error, PosterConfig};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;

pub const HEALTH_MESSAGE: &str =
    "Server running. Use the /generateAvis endpoint to generate a poster image.";

/// Everything a request needs, shared across requests.
pub struct AppState {
    pub config: PosterConfig,
    pub template_path: PathBuf,
    pub debug_output: Option<PathBuf>,
    pub embedder: AssetEmbedder,
    pub resolver: ImageResolver,
    pub renderer: Arc<dyn PosterRenderer>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/generateAvis", post(generate_avis))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, HEALTH_MESSAGE)
}

async fn generate_avis(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let fields = match parse_fields(&body) {
        Ok(fields) => fields,
        Err(err) => return err.into_response(),
    };
    match render_poster(&state, fields).await {
        Ok(response) => response,
        Err(err) => {
            error!("generateAvis failed: {}", err);
            ApiError::from(err).into_response()
        }
    }
}

fn parse_fields(body: &[u8]) -> Result<PosterFields, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(PosterFields::new());
    }
    serde_json::from_slice(body).map_err(|e| {
        warn!("Rejected request body: {}", e);
        ApiError::new(StatusCode::BAD_REQUEST, &format!("invalid JSON body: {}", e))
    })
}

/// Run the full pipeline for one request: embed local assets, resolve the
/// photo, substitute fields, capture.
pub async fn render_poster(state: &AppState, mut fields: PosterFields) -> crate::Result<Response> {
    let path = &state.template_path;
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| Error::Template {
            path: path.display().to_string(),
            source,
        })?;

    let html = state.embedder.embed_local_assets(&raw).await;

    let photo_ref = fields.non_empty(PHOTO_FIELD).map(str::to_string);
    if let Some(photo_ref) = photo_ref {
        match state.resolver.resolve(Some(photo_ref.as_str())).await {
            Some(image) => fields.set(PHOTO_FIELD, image.data_uri()),
            None => info!("Photo not embedded, keeping raw reference {}", photo_ref),
        }
    }

    let html = template::render(&html, &fields, state.config.substitution);

    let limit = state.config.render_timeout * 3;
    let captured = capture_async(state.renderer.clone(), html, limit).await?;

    if let Some(path) = state.debug_output.clone() {
        debug_sink::persist_in_background(path, captured.bytes.clone());
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(captured.format.mime()),
    );
    let disposition = format!(
        "attachment; filename=\"avis.{}\"",
        captured.format.extension()
    );
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(captured.bytes.len()));

    Ok((StatusCode::OK, headers, captured.bytes).into_response())
}

/// JSON error envelope: `{ "error": true, "message": ... }`
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            message: message.to_string(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": true,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_body_means_no_fields() {
        assert_eq!(parse_fields(b"").unwrap(), PosterFields::new());
        assert_eq!(parse_fields(b" \n").unwrap(), PosterFields::new());
    }

    #[test]
    fn malformed_body_is_a_bad_request() {
        let err = parse_fields(b"{not json").unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn pipeline_errors_become_500() {
        let err = ApiError::from(Error::Launch("no chrome".into()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.message.contains("no chrome"));
    }
}

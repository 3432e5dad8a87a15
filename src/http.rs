//! HTTP surface: the watermark endpoint, the gallery, and a health probe.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::error::WmError;
use crate::gallery::{GalleryError, GalleryStore, NewGalleryEntry};
use crate::overlay::RenderMode;
use crate::pipeline::RenderPipeline;
use crate::source::{ImageSource, SourceResolver};

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<SourceResolver>,
    pub pipeline: Arc<RenderPipeline>,
    pub gallery: GalleryStore,
    pub trusted_suffix: String,
    pub thumb_max_age: u64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/wm", get(watermark))
        .route("/gallery", get(list_gallery).post(create_gallery))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct WmQuery {
    pub path: Option<String>,
    pub url: Option<String>,
    pub mode: Option<String>,
}

async fn watermark(
    State(state): State<AppState>,
    Query(query): Query<WmQuery>,
) -> Result<Response, WmError> {
    let source = ImageSource::from_params(
        query.path.as_deref(),
        query.url.as_deref(),
        &state.trusted_suffix,
    )?;
    let mode = RenderMode::from_param(query.mode.as_deref());

    let bytes = state.resolver.resolve(&source).await?;

    // Decode and composite off the async runtime; a large image can hold a
    // worker thread for tens of milliseconds.
    let pipeline = state.pipeline.clone();
    let body = tokio::task::spawn_blocking(move || pipeline.render(&bytes, mode))
        .await
        .map_err(|e| WmError::render_failed(anyhow::anyhow!("render task aborted: {e}")))??;

    Ok((StatusCode::OK, response_headers(mode, state.thumb_max_age), body).into_response())
}

/// Watermarked output is never a cacheable derivative of the original:
/// full and tile responses forbid caching outright, thumbs get a short
/// public lifetime.
fn response_headers(mode: RenderMode, thumb_max_age: u64) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("inline; filename=\"wm.jpg\""),
    );
    match mode {
        RenderMode::Thumb => {
            let value = format!("public, max-age={thumb_max_age}");
            headers.insert(
                header::CACHE_CONTROL,
                HeaderValue::from_str(&value)
                    .unwrap_or_else(|_| HeaderValue::from_static("no-store")),
            );
        }
        RenderMode::Full | RenderMode::Tile => {
            headers.insert(
                header::CACHE_CONTROL,
                HeaderValue::from_static("no-store, no-cache, must-revalidate"),
            );
            headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
            headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
        }
    }
    headers
}

async fn list_gallery(State(state): State<AppState>) -> Result<Response, GalleryError> {
    let entries = state.gallery.list().await?;
    Ok(Json(entries).into_response())
}

async fn create_gallery(
    State(state): State<AppState>,
    Json(new): Json<NewGalleryEntry>,
) -> Result<Response, GalleryError> {
    let entry = state.gallery.insert(new).await?;
    Ok((StatusCode::CREATED, Json(entry)).into_response())
}

async fn health() -> Response {
    Json(json!({ "status": "ok" })).into_response()
}

impl IntoResponse for GalleryError {
    fn into_response(self) -> Response {
        let status = match &self {
            GalleryError::InvalidPath | GalleryError::UnsupportedExtension => {
                StatusCode::BAD_REQUEST
            }
            GalleryError::Database(e) => {
                tracing::error!(error = %e, "gallery database error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match &self {
            GalleryError::Database(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_mode_headers_forbid_caching() {
        let headers = response_headers(RenderMode::Full, 600);
        assert_eq!(headers[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "inline; filename=\"wm.jpg\""
        );
        assert_eq!(
            headers[header::CACHE_CONTROL],
            "no-store, no-cache, must-revalidate"
        );
        assert_eq!(headers[header::PRAGMA], "no-cache");
        assert_eq!(headers[header::EXPIRES], "0");
    }

    #[test]
    fn test_tile_mode_headers_match_full() {
        let headers = response_headers(RenderMode::Tile, 600);
        assert_eq!(
            headers[header::CACHE_CONTROL],
            "no-store, no-cache, must-revalidate"
        );
    }

    #[test]
    fn test_thumb_mode_headers_allow_short_caching() {
        let headers = response_headers(RenderMode::Thumb, 600);
        assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=600");
        assert!(!headers.contains_key(header::PRAGMA));
    }

    #[test]
    fn test_gallery_validation_errors_are_bad_request() {
        let resp = GalleryError::InvalidPath.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = GalleryError::UnsupportedExtension.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_gallery_database_error_hides_detail() {
        let resp = GalleryError::Database(sqlx::Error::PoolClosed).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

//! Watermark service error types.
//!
//! Provides structured error handling with HTTP status mapping. Every error
//! is terminal for the request; nothing is retried internally.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Errors that can occur while resolving and rendering a watermarked image.
#[derive(Debug, Error)]
pub enum WmError {
    /// Neither an object path nor a source URL was supplied.
    #[error("path or url required")]
    MissingInput,

    /// The object path failed the filename-safety pattern.
    #[error("invalid object path")]
    InvalidPath,

    /// The source URL is not a well-formed absolute URL.
    #[error("invalid url")]
    InvalidUrl,

    /// The URL's hostname is outside the trusted domain suffix.
    #[error("forbidden origin")]
    ForbiddenOrigin,

    /// Object storage returned an error or an empty object.
    #[error("download failed: {0}")]
    DownloadFailed(String),

    /// The upstream fetch returned a non-success status.
    #[error("fetch failed ({status})")]
    UpstreamFetchFailed { status: u16 },

    /// Unexpected decode/composite/encode failure. The detail is logged
    /// server-side only; callers see the generic message.
    #[error("render failed")]
    RenderFailed(#[source] anyhow::Error),
}

impl WmError {
    /// Maps service errors to HTTP status codes.
    ///
    /// Status mapping:
    /// - MissingInput, InvalidPath, InvalidUrl, DownloadFailed → 400
    /// - ForbiddenOrigin → 403
    /// - UpstreamFetchFailed → 502
    /// - RenderFailed → 500
    pub fn to_http_status(&self) -> StatusCode {
        match self {
            WmError::MissingInput
            | WmError::InvalidPath
            | WmError::InvalidUrl
            | WmError::DownloadFailed(_) => StatusCode::BAD_REQUEST,
            WmError::ForbiddenOrigin => StatusCode::FORBIDDEN,
            WmError::UpstreamFetchFailed { .. } => StatusCode::BAD_GATEWAY,
            WmError::RenderFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn render_failed(err: impl Into<anyhow::Error>) -> Self {
        WmError::RenderFailed(err.into())
    }
}

impl IntoResponse for WmError {
    fn into_response(self) -> Response {
        if let WmError::RenderFailed(ref source) = self {
            tracing::error!(error = %source, "render pipeline failure");
        }

        let body = Json(json!({ "error": self.to_string() }));
        (self.to_http_status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_errors_map_to_400() {
        assert_eq!(
            WmError::MissingInput.to_http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WmError::InvalidPath.to_http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(WmError::InvalidUrl.to_http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            WmError::DownloadFailed("missing".into()).to_http_status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_forbidden_origin_maps_to_403() {
        assert_eq!(
            WmError::ForbiddenOrigin.to_http_status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_upstream_failure_maps_to_502() {
        let err = WmError::UpstreamFetchFailed { status: 404 };
        assert_eq!(err.to_http_status(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.to_string(), "fetch failed (404)");
    }

    #[test]
    fn test_render_failed_maps_to_500_without_detail() {
        let err = WmError::render_failed(anyhow::anyhow!("jpeg encoder exploded"));
        assert_eq!(err.to_http_status(), StatusCode::INTERNAL_SERVER_ERROR);
        // Internal detail never reaches the response message.
        assert_eq!(err.to_string(), "render failed");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WmError>();
    }
}

//! Input resolution: turn a `path=` or `url=` query into raw source bytes.
//!
//! Validation happens before any network or decode work. The object path is
//! used to address the private store without further escaping, so the
//! character set is restrictive and anchored; the URL branch is gated by a
//! trusted hostname suffix to keep the service from becoming an open proxy.

use crate::error::WmError;
use crate::storage::ObjectStorage;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Validated reference to a source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Key into the private object store.
    ObjectPath(String),
    /// Absolute URL within the trusted domain suffix.
    RemoteUrl(Url),
}

impl ImageSource {
    /// Resolve the raw query parameters into a validated source.
    ///
    /// Exactly one of `path` or `url` must be present; `path` wins when both
    /// are supplied.
    pub fn from_params(
        path: Option<&str>,
        url: Option<&str>,
        trusted_suffix: &str,
    ) -> Result<Self, WmError> {
        if let Some(path) = path {
            if !is_safe_object_path(path) {
                return Err(WmError::InvalidPath);
            }
            return Ok(ImageSource::ObjectPath(path.to_string()));
        }

        if let Some(raw) = url {
            let parsed = Url::parse(raw).map_err(|_| WmError::InvalidUrl)?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(WmError::InvalidUrl);
            }
            let host = parsed.host_str().ok_or(WmError::InvalidUrl)?;
            if !host_in_trusted_suffix(host, trusted_suffix) {
                return Err(WmError::ForbiddenOrigin);
            }
            return Ok(ImageSource::RemoteUrl(parsed));
        }

        Err(WmError::MissingInput)
    }
}

/// Anchored filename-safety check: the entire string must consist of
/// letters, digits, `/`, `_`, `-`, `.` and must not contain `..`.
///
/// `..` is rejected on top of the character-set check because `.` and `/`
/// are individually legal and would otherwise compose into traversal.
pub fn is_safe_object_path(path: &str) -> bool {
    if path.is_empty() || path.contains("..") {
        return false;
    }
    path.bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'/' | b'_' | b'-' | b'.'))
}

/// True when `host` equals the trusted suffix minus its leading dot, or ends
/// with the suffix itself. `.example.com` admits `example.com` and any
/// subdomain, but never `evilexample.com`.
pub fn host_in_trusted_suffix(host: &str, suffix: &str) -> bool {
    if let Some(apex) = suffix.strip_prefix('.') {
        host == apex || host.ends_with(suffix)
    } else {
        host == suffix || host.ends_with(&format!(".{suffix}"))
    }
}

/// Resolves a validated [`ImageSource`] into raw bytes.
pub struct SourceResolver {
    storage: Arc<dyn ObjectStorage>,
    http: reqwest::Client,
    max_body_bytes: usize,
}

impl SourceResolver {
    /// Build a resolver around a storage backend and fetch limits.
    ///
    /// The upstream fetch carries an explicit timeout so a slow or hostile
    /// origin cannot hold the request open indefinitely.
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        timeout: Duration,
        max_body_bytes: usize,
    ) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        Ok(Self {
            storage,
            http,
            max_body_bytes,
        })
    }

    /// Fetch the source bytes. No format validation happens here; the bytes
    /// go to the decoder as-is.
    pub async fn resolve(&self, source: &ImageSource) -> Result<Bytes, WmError> {
        match source {
            ImageSource::ObjectPath(key) => {
                let bytes = self
                    .storage
                    .download(key)
                    .await
                    .map_err(|e| WmError::DownloadFailed(e.to_string()))?;
                self.check_size(bytes.len())?;
                Ok(bytes)
            }
            ImageSource::RemoteUrl(url) => {
                let response = self
                    .http
                    .get(url.as_str())
                    .header(reqwest::header::CACHE_CONTROL, "no-cache")
                    .send()
                    .await
                    .map_err(|e| {
                        let status = e.status().map(|s| s.as_u16()).unwrap_or(502);
                        tracing::warn!(url = %url, error = %e, "upstream fetch failed");
                        WmError::UpstreamFetchFailed { status }
                    })?;

                if !response.status().is_success() {
                    return Err(WmError::UpstreamFetchFailed {
                        status: response.status().as_u16(),
                    });
                }

                if let Some(len) = response.content_length() {
                    self.check_size(len as usize)?;
                }

                let bytes = response.bytes().await.map_err(|e| {
                    tracing::warn!(url = %url, error = %e, "upstream body read failed");
                    WmError::UpstreamFetchFailed { status: 502 }
                })?;
                self.check_size(bytes.len())?;
                Ok(bytes)
            }
        }
    }

    fn check_size(&self, len: usize) -> Result<(), WmError> {
        if len > self.max_body_bytes {
            return Err(WmError::DownloadFailed(format!(
                "source exceeds {} byte limit",
                self.max_body_bytes
            )));
        }
        Ok(())
    }
}

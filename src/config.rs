// Configuration module

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level service configuration, loaded from a YAML file at startup and
/// injected into the request state. There is no ambient mutable global.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub fetch: FetchConfig,
    #[serde(default)]
    pub overlay: OverlayConfig,
    #[serde(default)]
    pub gallery: GalleryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Object storage holding the original uploads. Credentials come from the
/// standard AWS environment/credential chain, never from this file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible stores (MinIO, Supabase, localstack).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Remote-URL fetch policy. The trusted suffix gates the url= branch so the
/// service cannot be used as an open image proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    pub trusted_suffix: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Overlay tuning. Rotation is intentionally not configurable: the -30°
/// diagonal is part of the anti-cropping design.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// Phrase composited onto every served image.
    #[serde(default = "default_phrase")]
    pub phrase: String,
    /// Single-centered mark width as a fraction of the shorter image axis.
    #[serde(default = "default_mark_ratio")]
    pub mark_ratio: f32,
    /// Tiled-mode cell size as a fraction of the shorter image axis.
    #[serde(default = "default_tile_ratio")]
    pub tile_ratio: f32,
    /// Dark fill opacity (0.0 to 1.0).
    #[serde(default = "default_fill_alpha")]
    pub fill_alpha: f32,
    /// Light stroke opacity (0.0 to 1.0).
    #[serde(default = "default_stroke_alpha")]
    pub stroke_alpha: f32,
    /// Mark rendering strategy.
    #[serde(default)]
    pub renderer: RendererStrategy,
    /// Maximum output width for thumb mode.
    #[serde(default = "default_thumb_max_width")]
    pub thumb_max_width: u32,
    /// Cache lifetime in seconds for thumb mode responses.
    #[serde(default = "default_thumb_max_age")]
    pub thumb_max_age: u64,
}

/// How the phrase is turned into a renderable layer.
///
/// The block-glyph strategy is the default because it has zero external font
/// dependency: every other strategy in this pipeline's history failed under
/// some deployment condition (missing system font, unparseable embedded
/// font). The font strategy falls back to block glyphs on any failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum RendererStrategy {
    #[default]
    BlockGlyph,
    EmbeddedFont {
        path: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryConfig {
    #[serde(default = "default_gallery_db")]
    pub database_url: String,
    #[serde(default = "default_gallery_limit")]
    pub list_limit: i64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            phrase: default_phrase(),
            mark_ratio: default_mark_ratio(),
            tile_ratio: default_tile_ratio(),
            fill_alpha: default_fill_alpha(),
            stroke_alpha: default_stroke_alpha(),
            renderer: RendererStrategy::default(),
            thumb_max_width: default_thumb_max_width(),
            thumb_max_age: default_thumb_max_age(),
        }
    }
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            database_url: default_gallery_db(),
            list_limit: default_gallery_limit(),
        }
    }
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_max_body_bytes() -> usize {
    25 * 1024 * 1024
}

fn default_phrase() -> String {
    "DO NOT USE".to_string()
}

fn default_mark_ratio() -> f32 {
    0.6
}

fn default_tile_ratio() -> f32 {
    0.32
}

fn default_fill_alpha() -> f32 {
    0.42
}

fn default_stroke_alpha() -> f32 {
    0.45
}

fn default_thumb_max_width() -> u32 {
    600
}

fn default_thumb_max_age() -> u64 {
    600
}

fn default_gallery_db() -> String {
    "sqlite://./data/gallery.db".to_string()
}

fn default_gallery_limit() -> i64 {
    60
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        let config: Config =
            serde_yaml::from_str(yaml).map_err(|e| format!("Invalid configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if self.storage.bucket.is_empty() {
            return Err("storage.bucket cannot be empty".to_string());
        }
        if self.fetch.trusted_suffix.is_empty() {
            return Err("fetch.trusted_suffix cannot be empty".to_string());
        }
        if !(0.05..=1.0).contains(&self.overlay.mark_ratio) {
            return Err(format!(
                "overlay.mark_ratio {} out of range (0.05..=1.0)",
                self.overlay.mark_ratio
            ));
        }
        if !(0.05..=1.0).contains(&self.overlay.tile_ratio) {
            return Err(format!(
                "overlay.tile_ratio {} out of range (0.05..=1.0)",
                self.overlay.tile_ratio
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_YAML: &str = r#"
server:
  address: 127.0.0.1
  port: 9090
storage:
  bucket: images
  region: eu-central-1
fetch:
  trusted_suffix: .supabase.co
"#;

    #[test]
    fn test_minimal_config_parses_with_defaults() {
        let config = Config::from_yaml(MINIMAL_YAML).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.storage.bucket, "images");
        assert_eq!(config.fetch.trusted_suffix, ".supabase.co");
        assert_eq!(config.fetch.timeout_secs, 10);
        assert_eq!(config.overlay.phrase, "DO NOT USE");
        assert!((config.overlay.mark_ratio - 0.6).abs() < f32::EPSILON);
        assert_eq!(config.overlay.thumb_max_width, 600);
        assert!(matches!(
            config.overlay.renderer,
            RendererStrategy::BlockGlyph
        ));
    }

    #[test]
    fn test_embedded_font_strategy_parses() {
        let yaml = r#"
server: {}
storage:
  bucket: images
  region: us-east-1
fetch:
  trusted_suffix: .example.com
overlay:
  renderer:
    strategy: embedded-font
    path: fonts/DejaVuSans.ttf
"#;
        let config = Config::from_yaml(yaml).unwrap();
        match config.overlay.renderer {
            RendererStrategy::EmbeddedFont { path } => {
                assert_eq!(path, "fonts/DejaVuSans.ttf")
            }
            _ => panic!("expected embedded-font strategy"),
        }
    }

    #[test]
    fn test_empty_bucket_rejected() {
        let yaml = r#"
server: {}
storage:
  bucket: ""
  region: us-east-1
fetch:
  trusted_suffix: .example.com
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_empty_trusted_suffix_rejected() {
        let yaml = r#"
server: {}
storage:
  bucket: images
  region: us-east-1
fetch:
  trusted_suffix: ""
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_out_of_range_ratio_rejected() {
        let yaml = r#"
server: {}
storage:
  bucket: images
  region: us-east-1
fetch:
  trusted_suffix: .example.com
overlay:
  mark_ratio: 1.5
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_missing_file_errors() {
        let result = Config::from_file(Path::new("/nonexistent/config.yaml"));
        assert!(result.is_err());
    }
}

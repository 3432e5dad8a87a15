//! Community gallery records backed by SQLite.
//!
//! The gallery stores object-store paths, never image bytes; listings are
//! served newest-first with a hard limit so the endpoint never degrades into
//! an unbounded scan.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use crate::source::is_safe_object_path;

/// Only these extensions may be published to the gallery, regardless of what
/// the object store would accept at fetch time.
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

#[derive(Debug, thiserror::Error)]
pub enum GalleryError {
    #[error("invalid object path")]
    InvalidPath,
    #[error("unsupported image extension")]
    UnsupportedExtension,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct GalleryEntry {
    pub id: Uuid,
    pub username: Option<String>,
    pub image_path: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct NewGalleryEntry {
    pub username: Option<String>,
    pub image_path: String,
}

#[derive(Clone)]
pub struct GalleryStore {
    pool: SqlitePool,
    list_limit: i64,
}

impl GalleryStore {
    /// Open (creating if missing) the SQLite database at `url` and ensure
    /// the schema exists.
    pub async fn connect(url: &str, list_limit: i64) -> Result<Self, GalleryError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(GalleryError::Database)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Self::with_pool(pool, list_limit).await
    }

    pub async fn with_pool(pool: SqlitePool, list_limit: i64) -> Result<Self, GalleryError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS gallery_entries (
                id TEXT PRIMARY KEY,
                username TEXT,
                image_path TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;
        Ok(Self { pool, list_limit })
    }

    /// Insert a new entry after validating the path the same way the
    /// watermark endpoint would, plus the extension allow-list.
    pub async fn insert(&self, new: NewGalleryEntry) -> Result<GalleryEntry, GalleryError> {
        if !is_safe_object_path(&new.image_path) {
            return Err(GalleryError::InvalidPath);
        }
        if !has_allowed_extension(&new.image_path) {
            return Err(GalleryError::UnsupportedExtension);
        }

        let entry = GalleryEntry {
            id: Uuid::new_v4(),
            username: new.username,
            image_path: new.image_path,
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO gallery_entries (id, username, image_path, created_at) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(entry.id.to_string())
        .bind(&entry.username)
        .bind(&entry.image_path)
        // Fixed-width UTC timestamps so the TEXT column sorts chronologically.
        .bind(entry.created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
        .execute(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Newest entries first, capped at the configured limit.
    pub async fn list(&self) -> Result<Vec<GalleryEntry>, GalleryError> {
        let rows = sqlx::query(
            "SELECT id, username, image_path, created_at FROM gallery_entries \
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(self.list_limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let id: String = row.get("id");
                let created_at: String = row.get("created_at");
                Ok(GalleryEntry {
                    id: Uuid::from_str(&id).map_err(|_| sqlx::Error::Decode("bad uuid".into()))?,
                    username: row.get("username"),
                    image_path: row.get("image_path"),
                    created_at: DateTime::parse_from_rfc3339(&created_at)
                        .map_err(|_| sqlx::Error::Decode("bad timestamp".into()))?
                        .with_timezone(&Utc),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(GalleryError::Database)
    }
}

fn has_allowed_extension(path: &str) -> bool {
    path.rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> GalleryStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        GalleryStore::with_pool(pool, 60).await.unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_list_roundtrip() {
        let store = memory_store().await;
        let entry = store
            .insert(NewGalleryEntry {
                username: Some("ayu".to_string()),
                image_path: "gen/abc123.jpg".to_string(),
            })
            .await
            .unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, entry.id);
        assert_eq!(listed[0].username.as_deref(), Some("ayu"));
        assert_eq!(listed[0].image_path, "gen/abc123.jpg");
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_capped() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = GalleryStore::with_pool(pool, 2).await.unwrap();

        for i in 0..3 {
            store
                .insert(NewGalleryEntry {
                    username: None,
                    image_path: format!("gen/item-{i}.png"),
                })
                .await
                .unwrap();
            // Distinct timestamps so the DESC ordering is deterministic.
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].image_path, "gen/item-2.png");
        assert_eq!(listed[1].image_path, "gen/item-1.png");
    }

    #[tokio::test]
    async fn test_insert_rejects_traversal_path() {
        let store = memory_store().await;
        let err = store
            .insert(NewGalleryEntry {
                username: None,
                image_path: "../../etc/passwd.jpg".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GalleryError::InvalidPath));
    }

    #[tokio::test]
    async fn test_insert_rejects_disallowed_extension() {
        let store = memory_store().await;
        let err = store
            .insert(NewGalleryEntry {
                username: None,
                image_path: "gen/archive.zip".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, GalleryError::UnsupportedExtension));
    }

    #[tokio::test]
    async fn test_extension_check_is_case_insensitive() {
        let store = memory_store().await;
        assert!(store
            .insert(NewGalleryEntry {
                username: None,
                image_path: "gen/photo.JPG".to_string(),
            })
            .await
            .is_ok());
    }
}

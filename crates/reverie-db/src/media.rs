//! Media blob repository implementation.
//!
//! Blobs (images, audio) are stored inline in Postgres. Upload sizes are
//! capped at the API layer, so inline storage stays within sane row sizes.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use reverie_core::{new_v7, Error, Media, MediaKind, MediaRepository, Result};

/// PostgreSQL implementation of MediaRepository.
#[derive(Clone)]
pub struct PgMediaRepository {
    pool: Pool<Postgres>,
}

impl PgMediaRepository {
    /// Create a new PgMediaRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_media_row(row: sqlx::postgres::PgRow) -> Media {
        let kind: String = row.get("kind");
        Media {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            kind: if kind == "audio" {
                MediaKind::Audio
            } else {
                MediaKind::Image
            },
            mime_type: row.get("mime_type"),
            data: row.get("data"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl MediaRepository for PgMediaRepository {
    async fn insert(
        &self,
        owner_id: Uuid,
        kind: MediaKind,
        mime_type: &str,
        data: &[u8],
    ) -> Result<Uuid> {
        let id = new_v7();

        sqlx::query(
            "INSERT INTO media (id, owner_id, kind, mime_type, data)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(owner_id)
        .bind(kind.as_str())
        .bind(mime_type)
        .bind(data)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Media>> {
        let row = sqlx::query(
            "SELECT id, owner_id, kind, mime_type, data, created_at FROM media WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_media_row))
    }
}

//! Dream repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use reverie_core::{
    new_v7, AnalysisFailure, CreateDreamRequest, Dream, DreamRepository, DreamStatus, Error,
    Result,
};

/// PostgreSQL implementation of DreamRepository.
#[derive(Clone)]
pub struct PgDreamRepository {
    pool: Pool<Postgres>,
}

const DREAM_COLUMNS: &str =
    "id, owner_id, content, status, position, generation, story, story_title, failure, created_at";

impl PgDreamRepository {
    /// Create a new PgDreamRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Map a database row to a Dream.
    fn parse_dream_row(row: sqlx::postgres::PgRow) -> Result<Dream> {
        let status: String = row.get("status");
        let failure: Option<serde_json::Value> = row.get("failure");

        Ok(Dream {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            content: row.get("content"),
            status: DreamStatus::from_str_lossy(&status),
            position: row.get("position"),
            generation: row.get("generation"),
            story: row.get("story"),
            story_title: row.get("story_title"),
            failure: failure.map(serde_json::from_value).transpose()?,
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl DreamRepository for PgDreamRepository {
    async fn insert(&self, req: CreateDreamRequest) -> Result<Uuid> {
        let id = new_v7();
        let position = chrono::Utc::now().timestamp_millis() as f64;

        sqlx::query(
            "INSERT INTO dreams (id, owner_id, content, status, position)
             VALUES ($1, $2, $3, 'pending', $4)",
        )
        .bind(id)
        .bind(req.owner_id)
        .bind(&req.content)
        .bind(position)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Dream>> {
        let row = sqlx::query(&format!("SELECT {DREAM_COLUMNS} FROM dreams WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_dream_row).transpose()
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Dream>> {
        let rows = sqlx::query(&format!(
            "SELECT {DREAM_COLUMNS} FROM dreams WHERE owner_id = $1 ORDER BY position DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_dream_row).collect()
    }

    async fn reset_content(&self, id: Uuid, content: &str) -> Result<i64> {
        let generation: Option<i64> = sqlx::query_scalar(
            "UPDATE dreams
             SET content = $2, status = 'pending', story = NULL, story_title = NULL,
                 failure = NULL, generation = generation + 1
             WHERE id = $1
             RETURNING generation",
        )
        .bind(id)
        .bind(content)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        generation.ok_or(Error::DreamNotFound(id))
    }

    async fn complete_story(
        &self,
        id: Uuid,
        story: &str,
        title: Option<&str>,
        generation: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE dreams
             SET status = 'storified', story = $2, story_title = $3, failure = NULL
             WHERE id = $1 AND generation = $4",
        )
        .bind(id)
        .bind(story)
        .bind(title)
        .bind(generation)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn fail_story(
        &self,
        id: Uuid,
        failure: &AnalysisFailure,
        generation: i64,
    ) -> Result<bool> {
        let cause = serde_json::to_value(failure)?;
        let result = sqlx::query(
            "UPDATE dreams
             SET status = 'failed', failure = $2
             WHERE id = $1 AND generation = $3",
        )
        .bind(id)
        .bind(cause)
        .bind(generation)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM dreams WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}

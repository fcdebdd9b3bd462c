//! Idea repository implementation.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use reverie_core::{
    new_v7, AnalysisFailure, CreateIdeaRequest, Error, Idea, IdeaAnalysis, IdeaRepository,
    IdeaStatus, Result,
};

/// PostgreSQL implementation of IdeaRepository.
#[derive(Clone)]
pub struct PgIdeaRepository {
    pool: Pool<Postgres>,
}

const IDEA_COLUMNS: &str = "id, owner_id, content, image_id, audio_id, transcription, \
     status, position, generation, analysis, failure, created_at";

impl PgIdeaRepository {
    /// Create a new PgIdeaRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Map a database row to an Idea.
    fn parse_idea_row(row: sqlx::postgres::PgRow) -> Result<Idea> {
        let status: String = row.get("status");
        let analysis: Option<serde_json::Value> = row.get("analysis");
        let failure: Option<serde_json::Value> = row.get("failure");

        Ok(Idea {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            content: row.get("content"),
            image_id: row.get("image_id"),
            audio_id: row.get("audio_id"),
            transcription: row.get("transcription"),
            status: IdeaStatus::from_str_lossy(&status),
            position: row.get("position"),
            generation: row.get("generation"),
            analysis: analysis.map(serde_json::from_value).transpose()?,
            failure: failure.map(serde_json::from_value).transpose()?,
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait]
impl IdeaRepository for PgIdeaRepository {
    async fn insert(&self, req: CreateIdeaRequest) -> Result<Uuid> {
        let id = new_v7();
        // Creation-timestamp ordering key, same convention as the client UI.
        let position = chrono::Utc::now().timestamp_millis() as f64;

        sqlx::query(
            "INSERT INTO ideas (id, owner_id, content, image_id, audio_id, status, position)
             VALUES ($1, $2, $3, $4, $5, 'pending', $6)",
        )
        .bind(id)
        .bind(req.owner_id)
        .bind(&req.content)
        .bind(req.image_id)
        .bind(req.audio_id)
        .bind(position)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Idea>> {
        let row = sqlx::query(&format!("SELECT {IDEA_COLUMNS} FROM ideas WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_idea_row).transpose()
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<Idea>> {
        let rows = sqlx::query(&format!(
            "SELECT {IDEA_COLUMNS} FROM ideas WHERE owner_id = $1 ORDER BY position DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.into_iter().map(Self::parse_idea_row).collect()
    }

    async fn update_content(&self, id: Uuid, content: &str) -> Result<()> {
        let result = sqlx::query("UPDATE ideas SET content = $2 WHERE id = $1")
            .bind(id)
            .bind(content)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::IdeaNotFound(id));
        }
        Ok(())
    }

    async fn set_position(&self, id: Uuid, position: f64) -> Result<()> {
        let result = sqlx::query("UPDATE ideas SET position = $2 WHERE id = $1")
            .bind(id)
            .bind(position)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::IdeaNotFound(id));
        }
        Ok(())
    }

    async fn begin_reanalysis(&self, id: Uuid) -> Result<i64> {
        let generation: Option<i64> = sqlx::query_scalar(
            "UPDATE ideas
             SET status = 'analyzing', analysis = NULL, failure = NULL,
                 generation = generation + 1
             WHERE id = $1
             RETURNING generation",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        generation.ok_or(Error::IdeaNotFound(id))
    }

    async fn set_transcription(&self, id: Uuid, text: &str, generation: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE ideas SET transcription = $2 WHERE id = $1 AND generation = $3",
        )
        .bind(id)
        .bind(text)
        .bind(generation)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete_analysis(
        &self,
        id: Uuid,
        analysis: &IdeaAnalysis,
        generation: i64,
    ) -> Result<bool> {
        let payload = serde_json::to_value(analysis)?;
        let result = sqlx::query(
            "UPDATE ideas
             SET status = 'analyzed', analysis = $2, failure = NULL
             WHERE id = $1 AND generation = $3",
        )
        .bind(id)
        .bind(payload)
        .bind(generation)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn complete_empty(&self, id: Uuid, generation: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE ideas
             SET status = 'analyzed', analysis = NULL, failure = NULL
             WHERE id = $1 AND generation = $2",
        )
        .bind(id)
        .bind(generation)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn fail_analysis(
        &self,
        id: Uuid,
        failure: &AnalysisFailure,
        generation: i64,
    ) -> Result<bool> {
        let cause = serde_json::to_value(failure)?;
        let result = sqlx::query(
            "UPDATE ideas
             SET status = 'failed', analysis = NULL, failure = $2
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

    async fn force_analysis(&self, id: Uuid, analysis: &IdeaAnalysis) -> Result<bool> {
        let payload = serde_json::to_value(analysis)?;
        let result = sqlx::query(
            "UPDATE ideas
             SET status = 'analyzed', analysis = $2, failure = NULL
             WHERE id = $1",
        )
        .bind(id)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM ideas WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}

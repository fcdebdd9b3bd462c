//! Job queue repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use reverie_core::{new_v7, Error, Job, JobRepository, JobStatus, JobType, Result};

/// PostgreSQL implementation of JobRepository.
#[derive(Clone)]
pub struct PgJobRepository {
    pool: Pool<Postgres>,
}

impl PgJobRepository {
    /// Create a new PgJobRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Convert string from database to JobType.
    fn str_to_job_type(s: &str) -> JobType {
        match s {
            "idea_transcription" => JobType::IdeaTranscription,
            "dream_story" => JobType::DreamStory,
            _ => JobType::IdeaAnalysis,
        }
    }

    /// Parse a job row into a Job struct.
    fn parse_job_row(row: sqlx::postgres::PgRow) -> Job {
        let job_type: String = row.get("job_type");
        let status: String = row.get("status");
        Job {
            id: row.get("id"),
            record_id: row.get("record_id"),
            job_type: Self::str_to_job_type(&job_type),
            status: JobStatus::from_str_lossy(&status),
            generation: row.get("generation"),
            payload: row.get("payload"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        }
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn queue(
        &self,
        record_id: Uuid,
        job_type: JobType,
        generation: i64,
        payload: Option<JsonValue>,
    ) -> Result<Uuid> {
        let job_id = new_v7();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO job_queue (id, record_id, job_type, status, generation, payload, created_at)
             VALUES ($1, $2, $3, 'pending', $4, $5, $6)",
        )
        .bind(job_id)
        .bind(record_id)
        .bind(job_type.as_str())
        .bind(generation)
        .bind(&payload)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(job_id)
    }

    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>> {
        let now = Utc::now();
        let type_strings: Vec<String> = job_types
            .iter()
            .map(|jt| jt.as_str().to_string())
            .collect();

        // FOR UPDATE SKIP LOCKED lets concurrent workers claim without
        // contending. Filter by type before locking; empty array = any type.
        let row = sqlx::query(
            "UPDATE job_queue
             SET status = 'running', started_at = $1
             WHERE id = (
                 SELECT id FROM job_queue
                 WHERE status = 'pending'
                   AND (cardinality($2::text[]) = 0 OR job_type = ANY($2))
                 ORDER BY created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, record_id, job_type, status, generation, payload,
                       error_message, created_at, started_at, completed_at",
        )
        .bind(now)
        .bind(&type_strings)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_job_row))
    }

    async fn complete(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE job_queue SET status = 'completed', completed_at = $2 WHERE id = $1",
        )
        .bind(id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn fail(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE job_queue
             SET status = 'failed', error_message = $2, completed_at = $3
             WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(
            "SELECT id, record_id, job_type, status, generation, payload,
                    error_message, created_at, started_at, completed_at
             FROM job_queue WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_job_row))
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM job_queue WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_str_to_job_type_round_trip() {
        for jt in [
            JobType::IdeaTranscription,
            JobType::IdeaAnalysis,
            JobType::DreamStory,
        ] {
            assert_eq!(PgJobRepository::str_to_job_type(jt.as_str()), jt);
        }
    }
}

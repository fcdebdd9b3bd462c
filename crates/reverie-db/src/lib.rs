//! # reverie-db
//!
//! PostgreSQL database layer for reverie.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for ideas, dreams, media, and the job queue
//! - Generation-guarded pipeline writes (stale jobs update zero rows)
//!
//! ## Example
//!
//! ```rust,ignore
//! use reverie_db::Database;
//! use reverie_core::{CreateIdeaRequest, IdeaRepository};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/reverie").await?;
//!
//!     let id = db.ideas.insert(CreateIdeaRequest {
//!         owner_id: uuid::Uuid::new_v4(),
//!         content: "Uber for dogs".to_string(),
//!         image_id: None,
//!         audio_id: None,
//!     }).await?;
//!
//!     println!("Created idea: {}", id);
//!     Ok(())
//! }
//! ```

pub mod dreams;
pub mod ideas;
pub mod jobs;
pub mod media;
pub mod pool;

// Re-export core types
pub use reverie_core::*;

// Re-export repository implementations
pub use dreams::PgDreamRepository;
pub use ideas::PgIdeaRepository;
pub use jobs::PgJobRepository;
pub use media::PgMediaRepository;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};

/// Facade over the per-entity repositories sharing one connection pool.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Idea repository.
    pub ideas: PgIdeaRepository,
    /// Dream repository.
    pub dreams: PgDreamRepository,
    /// Media blob repository.
    pub media: PgMediaRepository,
    /// Job queue repository.
    pub jobs: PgJobRepository,
}

impl Database {
    /// Create a Database from an existing pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            ideas: PgIdeaRepository::new(pool.clone()),
            dreams: PgDreamRepository::new(pool.clone()),
            media: PgMediaRepository::new(pool.clone()),
            jobs: PgJobRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }
}

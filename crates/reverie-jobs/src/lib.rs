//! # reverie-jobs
//!
//! Background job queue system for reverie.
//!
//! This crate provides:
//! - Async job processing with concurrent workers
//! - Worker lifecycle notifications via broadcast channels
//! - The three pipeline handlers (idea transcription, idea analysis,
//!   dream story)
//!
//! ## Example
//!
//! ```ignore
//! use reverie_jobs::{JobWorker, WorkerConfig, WorkerBuilder, NoOpHandler};
//! use reverie_db::Database;
//! use reverie_core::JobType;
//!
//! let db = Database::connect("postgres://...").await?;
//!
//! // Create worker with handlers
//! let worker = WorkerBuilder::new(db)
//!     .with_config(WorkerConfig::default().with_poll_interval(1000))
//!     .with_handler(NoOpHandler::new(JobType::IdeaAnalysis))
//!     .build()
//!     .await;
//!
//! // Start worker and get handle
//! let handle = worker.start();
//!
//! // Graceful shutdown
//! handle.shutdown().await?;
//! ```

pub mod dream_story;
pub mod handler;
pub mod idea_analysis;
pub mod idea_transcription;
pub mod worker;

// Re-export core types
pub use reverie_core::*;

pub use dream_story::DreamStoryHandler;
pub use handler::{JobContext, JobHandler, JobResult, NoOpHandler};
pub use idea_analysis::IdeaAnalysisHandler;
pub use idea_transcription::IdeaTranscriptionHandler;
pub use worker::{JobWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};

/// Default polling interval for job processing (milliseconds).
pub const DEFAULT_POLL_INTERVAL_MS: u64 = reverie_core::defaults::JOB_POLL_INTERVAL_MS;

//! Centralized default constants for the reverie system.
//!
//! **This module is the single source of truth** for shared default values.
//! All crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// ANALYSIS
// =============================================================================

/// Minimum valid idea score (inclusive).
pub const SCORE_MIN: f64 = 1.0;

/// Maximum valid idea score (inclusive).
pub const SCORE_MAX: f64 = 10.0;

/// Maximum characters of an error message preserved in a failure cause.
pub const FAILURE_MESSAGE_MAX_CHARS: usize = 500;

/// Exact transcript the speech-to-text prompt asks for when audio is silent.
/// Stored verbatim, but treated as empty input by the analysis step.
pub const NO_SPEECH_SENTINEL: &str = "[no speech detected]";

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Google Generative Language API endpoint.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default generation model.
pub const GEMINI_MODEL: &str = "gemini-2.5-flash";

/// Timeout for generation requests (seconds).
pub const GEN_TIMEOUT_SECS: u64 = 120;

/// Timeout for transcription requests (seconds). Longer than generation
/// because audio uploads dominate the request time.
pub const TRANSCRIBE_TIMEOUT_SECS: u64 = 300;

/// Environment variable holding the required API key.
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";

/// Environment variable overriding the API endpoint (used by tests).
pub const ENV_GEMINI_BASE_URL: &str = "GEMINI_BASE_URL";

/// Environment variable overriding the generation model.
pub const ENV_GEMINI_MODEL: &str = "GEMINI_MODEL";

// =============================================================================
// JOBS
// =============================================================================

/// Polling interval when the job queue is empty (milliseconds).
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Maximum concurrent jobs per worker.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Hard timeout for a single job execution (seconds).
pub const JOB_TIMEOUT_SECS: u64 = 300;

/// Capacity of the worker event broadcast channel.
pub const WORKER_EVENT_CAPACITY: usize = 256;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Maximum accepted media upload size in bytes (10 MiB).
pub const MEDIA_MAX_BYTES: usize = 10 * 1024 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_bounds_ordered() {
        assert!(SCORE_MIN < SCORE_MAX);
    }

    #[test]
    fn test_no_speech_sentinel_shape() {
        assert!(NO_SPEECH_SENTINEL.starts_with('['));
        assert!(NO_SPEECH_SENTINEL.ends_with(']'));
    }
}

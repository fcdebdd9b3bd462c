//! # reverie-core
//!
//! Core types, traits, and abstractions for the reverie journaling service.
//!
//! This crate provides the foundational data structures and trait definitions
//! that the other reverie crates depend on: the record models (ideas, dreams,
//! media), the analysis pipeline job types, repository traits, and the
//! inference backend traits.

pub mod defaults;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use traits::*;

/// Generate a new time-ordered UUIDv7.
///
/// All record and job ids are v7 so they sort chronologically, which keeps
/// index pages hot and makes ids usable for log correlation.
pub fn new_v7() -> uuid::Uuid {
    uuid::Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_v7_is_v7() {
        let id = new_v7();
        assert_eq!(id.get_version_num(), 7);
    }

    #[test]
    fn test_new_v7_sorts_chronologically() {
        let a = new_v7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_v7();
        assert!(a < b);
    }
}

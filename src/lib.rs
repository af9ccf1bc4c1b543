//! # persag
//!
//! A durable, multi-user personal agent runtime.
//!
//! `persag` mediates between a large language model, a dual-backend memory
//! subsystem (a local semantic store plus a remote knowledge graph
//! service), and a fleet of external specialist tools. It is organized as a
//! small set of independently testable components:
//!
//! - [`config`] — process-wide configuration registry with change callbacks
//! - [`identity`] — the persisted active user and its derived storage paths
//! - [`memory`] — the local semantic memory store
//! - [`graph`] — the HTTP client for the remote knowledge graph service
//! - [`coordinator`] — dual-write memory coordination and fact restatement
//! - [`knowledge`] — unified knowledge-base query routing
//! - [`docker`] — keeps containerized dependencies in sync with the active user
//! - [`tools`] — the registry of callable tools exposed to the agent loop
//! - [`agent`] — the streaming, tool-calling agent loop
//! - [`team`] — optional multi-agent delegation
//! - [`clearing`] — coordinated cross-system memory clearing
//! - [`llm`] — LLM provider adapters
//! - [`observability`] — logging and tracing initialization

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

pub mod agent;
pub mod cli;
pub mod clearing;
pub mod config;
pub mod coordinator;
pub mod docker;
pub mod graph;
pub mod identity;
pub mod knowledge;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod team;
pub mod tools;

pub use config::{ConfigRegistry, ConfigSnapshot, RuntimeConfig};
pub use identity::{UserIdentityStore, UserStoragePaths};
pub use memory::{MemoryRecord, MemoryStats};

/// Error type for persag operations.
///
/// Every variant carries a bracketed category marker in its `Display`
/// output (e.g. `[duplicate]`) so log scraping and tests can match on a
/// stable prefix regardless of the human-readable tail.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Caller passed malformed or missing data.
    #[error("[invalid-input] {0}")]
    InvalidInput(String),

    /// A lookup found nothing with the given identity.
    #[error("[not-found] {0}")]
    NotFound(String),

    /// A write was rejected because a near-duplicate already exists.
    #[error("[duplicate] rejected as duplicate of existing record {existing_id}")]
    Duplicate {
        /// The id of the record this write collided with.
        existing_id: String,
    },

    /// A retryable failure: timeout, HTTP 5xx, or a "busy" response.
    #[error("[transient] {0}")]
    Transient(String),

    /// A non-retryable failure from an external system: HTTP 4xx or a
    /// subprocess exiting non-zero.
    #[error("[external] {0}")]
    External {
        /// HTTP status code, if the failure came from an HTTP response.
        status: Option<u16>,
        /// Response or process output describing the failure.
        body: String,
    },

    /// Two systems that are expected to agree have diverged (e.g. a
    /// Docker-managed service's pinned user id, or a clear that did not
    /// verify as empty).
    #[error("[consistency] {0}")]
    Consistency(String),

    /// Initialization failed in a way no caller can recover from.
    #[error("[fatal] {0}")]
    Fatal(String),
}

/// Result type alias for persag operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_carries_category_marker() {
        let err = Error::InvalidInput("missing text".to_string());
        assert_eq!(err.to_string(), "[invalid-input] missing text");

        let err = Error::Duplicate {
            existing_id: "abc-123".to_string(),
        };
        assert!(err.to_string().starts_with("[duplicate]"));
        assert!(err.to_string().contains("abc-123"));

        let err = Error::External {
            status: Some(404),
            body: "not found".to_string(),
        };
        assert!(err.to_string().starts_with("[external]"));
    }

    #[test]
    fn current_timestamp_is_reasonable() {
        let ts = current_timestamp();
        assert!(ts > 1_700_000_000);
    }
}

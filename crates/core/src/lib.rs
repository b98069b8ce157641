//! Core types shared across the coldstart crates.
//!
//! This crate defines the pieces every phase of a cold start agrees on:
//! - Configuration for the database, the application service and its collaborators
//! - The bounded-retry combinator used by every readiness wait
//! - The best-effort warning ledger and the failure taxonomy
//! - Codecs for the connection-configuration file and the local env file

pub mod config;
pub mod connection;
pub mod envfile;
pub mod error;
pub mod outcome;
pub mod retry;

pub use config::AppConfig;
pub use connection::ConnectionConfig;
pub use error::{Error, ErrorClass, Result};
pub use outcome::{Warning, Warnings};
pub use retry::{RetryOutcome, RetryPolicy, poll_until};

/// Shorten a credential for log output.
///
/// Keeps the first eight characters so operators can correlate values
/// across log lines without the full secret ever being written.
pub fn redact(value: &str) -> String {
    const VISIBLE: usize = 8;
    match value.char_indices().nth(VISIBLE) {
        Some((idx, _)) => format!("{}…", &value[..idx]),
        None if value.is_empty() => "<empty>".to_string(),
        None => value.to_string(),
    }
}

//! Error types for the threatdoc library.
//!
//! The taxonomy follows the failure surfaces of the pipeline:
//!
//! * [`ThreatDocError::Validation`] — a required input is missing; rejected
//!   before any model call is made.
//! * [`ThreatDocError::Transport`] — the model gateway failed with a
//!   non-retryable error; surfaced verbatim after a single attempt.
//! * [`ThreatDocError::CapacityExceeded`] — every retry of a transient
//!   capacity error failed; the user may try the same stage again.
//! * [`ThreatDocError::MalformedOutput`] — the model replied, but no strict
//!   JSON object could be recovered from the text.
//!
//! A stage that fails with any of these leaves the pipeline state exactly as
//! it was: the controller either fully advances or does not move at all.

use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// All errors returned by the threatdoc library.
#[derive(Debug, Error)]
pub enum ThreatDocError {
    // ── Input validation ──────────────────────────────────────────────────
    /// A required input is missing or empty; no model call was attempted.
    #[error("Invalid input: {reason}")]
    Validation { reason: String },

    // ── Invocation errors ─────────────────────────────────────────────────
    /// The transport failed with a non-retryable error (bad credentials,
    /// malformed request, unreachable gateway). Surfaced after one attempt.
    #[error("Model transport error: {message}")]
    Transport { message: String },

    /// Every attempt hit a transient capacity error and the retry budget
    /// ran out. The stage is unchanged and can be retried by the caller.
    #[error("Model capacity exceeded after {attempts} attempts: {last_error}")]
    CapacityExceeded { attempts: u32, last_error: String },

    /// The model reply contained no parseable JSON object.
    ///
    /// `excerpt` holds the offending substring (bounded) for diagnostics.
    #[error("Model returned malformed structured output: {detail}\nOffending text: {excerpt}")]
    MalformedOutput { detail: String, excerpt: String },

    // ── Image errors ──────────────────────────────────────────────────────
    /// The supplied architecture diagram could not be decoded or re-encoded.
    #[error("Could not process architecture image: {detail}")]
    ImageUnsupported { detail: String },

    // ── Store errors ──────────────────────────────────────────────────────
    /// No record with the given id exists in the store.
    #[error("Analysis record not found: {id}")]
    RecordNotFound { id: Uuid },

    /// The record store backend failed.
    #[error("Record store error: {message}")]
    Store { message: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the exported report file.
    #[error("Failed to write report file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ThreatDocError {
    /// Shorthand for a [`ThreatDocError::Validation`] error.
    pub fn validation(reason: impl Into<String>) -> Self {
        ThreatDocError::Validation {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_exceeded_display() {
        let e = ThreatDocError::CapacityExceeded {
            attempts: 5,
            last_error: "throttled".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("5 attempts"), "got: {msg}");
        assert!(msg.contains("throttled"));
    }

    #[test]
    fn malformed_output_carries_excerpt() {
        let e = ThreatDocError::MalformedOutput {
            detail: "expected value at line 1".into(),
            excerpt: "{broken".into(),
        };
        assert!(e.to_string().contains("{broken"));
    }

    #[test]
    fn validation_display() {
        let e = ThreatDocError::validation("a title is required");
        assert!(e.to_string().contains("a title is required"));
    }

    #[test]
    fn record_not_found_display() {
        let id = Uuid::nil();
        let e = ThreatDocError::RecordNotFound { id };
        assert!(e.to_string().contains(&id.to_string()));
    }
}

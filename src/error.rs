//! Error types for the edgequake-pdfseal library.
//!
//! Three error types cover three distinct failure modes:
//!
//! * [`RegistryError`] (**fatal**): the registration cannot proceed at all
//!   (no PDF supplied, upload directory not writable, every code attempt
//!   collided). Returned as `Err(RegistryError)` from the [`crate::Registrar`]
//!   entry points.
//!
//! * [`StampError`] (**non-fatal**): the QR could not be composited onto the
//!   PDF. The pipeline keeps the unstamped upload as the final artifact and
//!   reports the failure inside [`crate::record::StampOutcome::Degraded`].
//!
//! * [`StoreError`]: returned by [`crate::store::RecordStore`]
//!   implementations. A [`StoreError::Conflict`] is retried by the pipeline
//!   with a fresh code; anything else becomes [`RegistryError::Store`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdfseal library.
#[derive(Debug, Error)]
pub enum RegistryError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The request is missing something the pipeline requires.
    #[error("Invalid registration request: {0}")]
    Validation(String),

    // ── Storage errors ────────────────────────────────────────────────────
    /// Every generated code collided with an existing record.
    #[error("Code '{code}' already registered; gave up after {attempts} attempt(s)")]
    StorageConflict { code: String, attempts: u32 },

    /// The record store failed for a reason other than a duplicate code.
    #[error("Record store error: {0}")]
    Store(String),

    /// Reading or writing a PDF, XML or QR file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── QR errors ─────────────────────────────────────────────────────────
    /// The validation URL could not be encoded as a QR symbol.
    #[error("Failed to encode QR for '{url}': {detail}")]
    QrEncoding { url: String, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RegistryError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A non-fatal stamping failure.
///
/// Stored in [`crate::record::StampOutcome::Degraded`] when the QR overlay
/// could not be applied. The registration still succeeds with the unstamped
/// PDF as its final artifact.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum StampError {
    /// The source PDF could not be parsed.
    #[error("could not load source PDF: {detail}")]
    Load { detail: String },

    /// The source PDF has no pages to stamp.
    #[error("source PDF has no pages")]
    NoPages,

    /// The QR image could not be read or decoded.
    #[error("could not read QR image: {detail}")]
    QrImage { detail: String },

    /// The page tree could not be updated with the overlay.
    #[error("could not compose overlay: {detail}")]
    Compose { detail: String },

    /// The stamped PDF could not be written.
    #[error("could not write stamped PDF: {detail}")]
    Write { detail: String },
}

/// Errors returned by [`crate::store::RecordStore`] implementations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// A record with this code already exists.
    #[error("a document with code '{code}' is already registered")]
    Conflict { code: String },

    /// The backend failed (database error, poisoned lock, bad row).
    #[error("{0}")]
    Backend(String),
}

impl From<StoreError> for RegistryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { code } => RegistryError::StorageConflict { code, attempts: 1 },
            StoreError::Backend(msg) => RegistryError::Store(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_conflict_display() {
        let e = RegistryError::StorageConflict {
            code: "1660.abcdefabcdef".into(),
            attempts: 3,
        };
        let msg = e.to_string();
        assert!(msg.contains("1660.abcdefabcdef"), "got: {msg}");
        assert!(msg.contains("3 attempt"), "got: {msg}");
    }

    #[test]
    fn io_error_keeps_source() {
        use std::error::Error as _;
        let e = RegistryError::io(
            "/tmp/x.pdf",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(e.to_string().contains("/tmp/x.pdf"));
        assert!(e.source().is_some());
    }

    #[test]
    fn stamp_error_serialises() {
        let e = StampError::QrImage {
            detail: "bad png".into(),
        };
        let json = serde_json::to_string(&e).unwrap();
        let back: StampError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn conflict_display_names_code() {
        let e = StoreError::Conflict {
            code: "7.000000000000".into(),
        };
        assert!(e.to_string().contains("7.000000000000"));
    }
}

//! Output types: the persisted document record and the registration receipt.

use crate::error::StampError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Content type of the final PDF when streamed back to a client.
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Content type of the QR image when streamed back to a client.
pub const PNG_CONTENT_TYPE: &str = "image/png";

/// A registered document, keyed by its unique `code`.
///
/// Created once by the registration pipeline; never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Unique identifier, `{institution_id}.{random_hex}`.
    pub code: String,
    /// Institution that issued the document.
    pub institution_id: String,
    /// Free-text name shown on the validation page.
    pub display_name: String,
    /// Final PDF: the stamped copy, or the stored upload when stamping degraded.
    pub pdf_path: PathBuf,
    /// Accompanying XML metadata, if one was uploaded.
    pub xml_path: Option<PathBuf>,
    /// QR image encoding the validation URL.
    pub qr_path: PathBuf,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
}

/// Result of the stamping step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StampOutcome {
    /// The QR was composited onto the final page.
    Stamped,
    /// Stamping failed; `pdf_path` points at the unstamped upload.
    Degraded(StampError),
}

impl StampOutcome {
    pub fn is_stamped(&self) -> bool {
        matches!(self, StampOutcome::Stamped)
    }
}

/// What [`crate::Registrar::register`] hands back to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    /// The record as inserted into the store.
    pub record: DocumentRecord,
    /// URL encoded into the QR image.
    pub validation_url: String,
    /// Whether the QR made it onto the PDF.
    pub stamp: StampOutcome,
    /// Number of codes tried before the insert succeeded (1 unless a collision occurred).
    pub attempts: u32,
}

impl Registration {
    /// The unique code assigned to the document.
    pub fn code(&self) -> &str {
        &self.record.code
    }
}

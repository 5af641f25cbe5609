//! # edgequake-pdfseal
//!
//! Register academic documents (diplomas, transcripts) under a unique code,
//! stamp a validation QR onto the last page of the PDF, and look them up
//! again by code.
//!
//! ## Why this crate?
//!
//! A printed diploma is easy to forge. A QR on the document that points to
//! the issuing institution's own validation page is not: whoever holds the
//! paper can scan it and compare against the copy the institution keeps.
//! This crate is the registration half of that loop. The web page that
//! renders the validation view lives elsewhere and calls [`Registrar::lookup`],
//! [`Registrar::file_path_for`] and [`Registrar::qr_path_for`].
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF (+ optional XML)
//!  │
//!  ├─ 1. Validate  a non-empty PDF is required; blank fields get defaults
//!  ├─ 2. Code      <institution>.<12 hex chars>
//!  ├─ 3. Store     write uploads under collision-free timestamped names
//!  ├─ 4. URL       <base_url>/<prefix>/<code>
//!  ├─ 5. QR        PNG of the validation URL
//!  ├─ 6. Stamp     QR onto the last page (degrades to the unstamped PDF)
//!  └─ 7. Record    insert; a duplicate code retries from step 2
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfseal::{Registrar, RegistrationRequest, RegistryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // BASE_URL, UPLOAD_DIR, DATABASE_PATH … are read from the environment
//!     let registrar = Registrar::open(RegistryConfig::from_env().build()?)?;
//!     let request = RegistrationRequest::new("Maria Silva", "1660")
//!         .with_pdf(std::fs::read("diploma.pdf")?);
//!     let registration = registrar.register(request).await?;
//!     println!("{}", registration.validation_url);
//!     if !registration.stamp.is_stamped() {
//!         eprintln!("warning: PDF stored without QR");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfseal` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdfseal = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod access;
pub mod config;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod record;
pub mod register;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use access::{AccessPolicy, AdminCredentials, AdminSession};
pub use config::{RegistryConfig, RegistryConfigBuilder, StampLayout};
pub use error::{RegistryError, StampError, StoreError};
pub use events::{NoopRegistrationCallback, RegistrationCallback};
pub use pipeline::code::{generate_code, parse_code, CodeGenerator, RandomCodes};
pub use pipeline::qr::{generate_qr, QrWriteMode};
pub use pipeline::stamp::{PdfStamper, QrStamper};
pub use record::{DocumentRecord, Registration, StampOutcome, PDF_CONTENT_TYPE, PNG_CONTENT_TYPE};
pub use register::{Registrar, RegistrationRequest};
pub use store::{MemoryStore, RecordStore, SqliteStore};

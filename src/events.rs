//! Callback trait for registration events.
//!
//! Inject an [`Arc<dyn RegistrationCallback>`] via
//! [`crate::config::RegistryConfigBuilder::callback`] to observe the
//! pipeline as it runs: which code was assigned, whether a code collided,
//! and whether stamping degraded to the unstamped PDF.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfseal::{RegistrationCallback, RegistryConfig, StampError};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct DegradeCounter(AtomicUsize);
//!
//! impl RegistrationCallback for DegradeCounter {
//!     fn on_stamp_degraded(&self, code: &str, error: &StampError) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{code}: serving unstamped PDF ({error})");
//!     }
//! }
//!
//! let config = RegistryConfig::builder()
//!     .callback(Arc::new(DegradeCounter(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::StampError;
use crate::record::DocumentRecord;
use std::sync::Arc;

/// Called by the registration pipeline at each notable step.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync`: the async
/// entry point runs the pipeline on tokio's blocking pool.
pub trait RegistrationCallback: Send + Sync {
    /// Called once the request passed validation, before any file is written.
    fn on_registration_start(&self, display_name: &str, institution_id: &str) {
        let _ = (display_name, institution_id);
    }

    /// Called when a code has been generated for an attempt (1-indexed).
    fn on_code_assigned(&self, code: &str, attempt: u32) {
        let _ = (code, attempt);
    }

    /// Called when the store rejected `code` as a duplicate. The pipeline
    /// discards the attempt's files and retries with a fresh code.
    fn on_code_conflict(&self, code: &str, attempt: u32) {
        let _ = (code, attempt);
    }

    /// Called when the QR could not be stamped and the unstamped upload
    /// becomes the final artifact.
    fn on_stamp_degraded(&self, code: &str, error: &StampError) {
        let _ = (code, error);
    }

    /// Called after the record has been inserted and is visible to lookups.
    fn on_registered(&self, record: &DocumentRecord) {
        let _ = record;
    }
}

/// A no-op implementation of [`RegistrationCallback`].
pub struct NoopRegistrationCallback;

impl RegistrationCallback for NoopRegistrationCallback {}

/// Type alias for an optional shared callback.
pub type SharedCallback = Option<Arc<dyn RegistrationCallback>>;

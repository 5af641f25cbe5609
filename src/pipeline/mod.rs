//! Pipeline stages for document registration.
//!
//! Each submodule implements exactly one step; [`crate::register`] drives
//! them in order.
//!
//! ## Data Flow
//!
//! ```text
//! code ──▶ storage ──▶ qr ──▶ stamp ──▶ (record store)
//! (id)     (uploads)   (PNG)  (lopdf)
//! ```
//!
//! 1. [`code`]   : `{institution_id}.{12 hex}` from 6 random bytes
//! 2. [`storage`]: code-derived, timestamped, no-clobber file names in the
//!    upload directory, and cleanup of abandoned attempts
//! 3. [`qr`]     : encode the validation URL as a PNG
//! 4. [`stamp`]  : overlay the PNG on the last page of the PDF; failures
//!    here are non-fatal

pub mod code;
pub mod qr;
pub mod stamp;
pub mod storage;

//! The registration pipeline and the lookups the validation surface needs.
//!
//! [`Registrar::register`] runs, in order:
//!
//! ```text
//! validate ─▶ code ─▶ store upload(s) ─▶ QR ─▶ stamp ─▶ insert record
//!                ▲                                          │
//!                └──────── duplicate code: discard, retry ◀─┘
//! ```
//!
//! A record is inserted only after every file it references is on disk.
//! Files written by an attempt that does not end in an insert are removed.

use crate::config::RegistryConfig;
use crate::error::{RegistryError, StoreError};
use crate::pipeline::code::{CodeGenerator, RandomCodes};
use crate::pipeline::qr::{self, QrWriteMode};
use crate::pipeline::stamp::{PdfStamper, QrStamper};
use crate::pipeline::storage::{self, StagedFiles, UploadDir};
use crate::record::{DocumentRecord, Registration, StampOutcome};
use crate::store::{MemoryStore, RecordStore, SqliteStore};
use chrono::Utc;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What an upload handler passes to [`Registrar::register`].
#[derive(Debug, Clone, Default)]
pub struct RegistrationRequest {
    /// Name shown on the validation page. Blank falls back to the configured default.
    pub display_name: String,
    /// Issuing institution. Blank falls back to the configured default.
    pub institution_id: String,
    /// The PDF to register. Required.
    pub pdf: Option<Vec<u8>>,
    /// Optional XML metadata stored alongside the PDF.
    pub xml: Option<Vec<u8>>,
}

impl RegistrationRequest {
    pub fn new(display_name: impl Into<String>, institution_id: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            institution_id: institution_id.into(),
            pdf: None,
            xml: None,
        }
    }

    pub fn with_pdf(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.pdf = Some(bytes.into());
        self
    }

    pub fn with_xml(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.xml = Some(bytes.into());
        self
    }
}

/// Registers documents and answers lookups by code.
///
/// Cheap to clone; every clone shares the same store, code source and stamper.
///
/// # Example
/// ```rust,no_run
/// use edgequake_pdfseal::{Registrar, RegistrationRequest, RegistryConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let registrar = Registrar::open(RegistryConfig::from_env().build()?)?;
/// let request = RegistrationRequest::new("Maria Silva", "1660")
///     .with_pdf(std::fs::read("diploma.pdf")?);
/// let registration = registrar.register(request).await?;
/// println!("{} → {}", registration.code(), registration.validation_url);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Registrar {
    config: Arc<RegistryConfig>,
    uploads: UploadDir,
    store: Arc<dyn RecordStore>,
    codes: Arc<dyn CodeGenerator>,
    stamper: Arc<dyn PdfStamper>,
}

/// Everything an attempt produced before the insert.
struct Staged {
    record: DocumentRecord,
    validation_url: String,
    stamp: StampOutcome,
    files: StagedFiles,
}

impl Registrar {
    /// Build a registrar over an explicit store. Creates the upload directory.
    pub fn new(config: RegistryConfig, store: Arc<dyn RecordStore>) -> Result<Self, RegistryError> {
        let uploads = UploadDir::open(&config.upload_dir)?;
        let stamper = Arc::new(QrStamper::new(config.stamp_layout));
        Ok(Self {
            config: Arc::new(config),
            uploads,
            store,
            codes: Arc::new(RandomCodes),
            stamper,
        })
    }

    /// Build a registrar with the store selected by `config.database_path`:
    /// SQLite when set, in-memory otherwise.
    pub fn open(config: RegistryConfig) -> Result<Self, RegistryError> {
        let store: Arc<dyn RecordStore> = match &config.database_path {
            Some(path) => {
                info!("Using record database {}", path.display());
                Arc::new(SqliteStore::open(path)?)
            }
            None => {
                warn!("No database configured; records are kept in memory only");
                Arc::new(MemoryStore::new())
            }
        };
        Self::new(config, store)
    }

    /// Replace the code source.
    pub fn with_code_generator(mut self, codes: Arc<dyn CodeGenerator>) -> Self {
        self.codes = codes;
        self
    }

    /// Replace the stamper.
    pub fn with_stamper(mut self, stamper: Arc<dyn PdfStamper>) -> Self {
        self.stamper = stamper;
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a document.
    ///
    /// Runs [`Registrar::register_blocking`] on tokio's blocking pool; the
    /// steps still execute strictly one after another.
    ///
    /// # Errors
    /// - [`RegistryError::Validation`] when no PDF was supplied (nothing is written)
    /// - [`RegistryError::Io`] when an upload or the QR image cannot be written
    /// - [`RegistryError::StorageConflict`] when every code attempt collided
    /// - [`RegistryError::Store`] when the record store fails
    ///
    /// A stamping failure is not an error: the result carries
    /// [`StampOutcome::Degraded`] and the record points at the unstamped PDF.
    pub async fn register(
        &self,
        request: RegistrationRequest,
    ) -> Result<Registration, RegistryError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.register_blocking(request))
            .await
            .map_err(|e| RegistryError::Internal(format!("Registration task panicked: {}", e)))?
    }

    /// Synchronous form of [`Registrar::register`], run on the calling thread.
    pub fn register_blocking(
        &self,
        request: RegistrationRequest,
    ) -> Result<Registration, RegistryError> {
        let started = Instant::now();

        // ── Step 1: Validate ─────────────────────────────────────────────
        let pdf = match request.pdf.as_deref() {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => {
                return Err(RegistryError::Validation(
                    "a PDF file is required".to_string(),
                ))
            }
        };
        if !pdf.starts_with(b"%PDF") {
            warn!("Uploaded PDF does not start with %PDF; stamping will likely degrade");
        }
        let xml = request.xml.as_deref().filter(|b| !b.is_empty());
        let display_name = or_default(&request.display_name, &self.config.default_display_name);
        let institution_id =
            or_default(&request.institution_id, &self.config.default_institution_id);

        if let Some(ref cb) = self.config.callback {
            cb.on_registration_start(&display_name, &institution_id);
        }

        // ── Steps 2–7: one attempt per code until the insert sticks ─────
        let max_attempts = self.config.max_code_attempts.max(1);
        let mut last_code = String::new();
        for attempt in 1..=max_attempts {
            let code = self.codes.next_code(&institution_id);
            debug!("Attempt {}/{}: code {}", attempt, max_attempts, code);
            if let Some(ref cb) = self.config.callback {
                cb.on_code_assigned(&code, attempt);
            }

            let staged = match self.stage(&code, &display_name, &institution_id, pdf, xml) {
                Ok(staged) => staged,
                // Same code within the same second: the no-clobber upload write refuses.
                Err(RegistryError::Io { ref source, .. })
                    if source.kind() == io::ErrorKind::AlreadyExists =>
                {
                    self.note_conflict(&code, attempt, max_attempts);
                    last_code = code;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match self.store.insert(staged.record.clone()) {
                Ok(()) => {
                    let Staged {
                        record,
                        validation_url,
                        stamp,
                        files,
                    } = staged;
                    files.keep();
                    info!(
                        "Registered {} ('{}') in {}ms{}",
                        record.code,
                        record.display_name,
                        started.elapsed().as_millis(),
                        if stamp.is_stamped() { "" } else { " [unstamped]" }
                    );
                    if let Some(ref cb) = self.config.callback {
                        cb.on_registered(&record);
                    }
                    return Ok(Registration {
                        record,
                        validation_url,
                        stamp,
                        attempts: attempt,
                    });
                }
                Err(StoreError::Conflict { code }) => {
                    self.note_conflict(&code, attempt, max_attempts);
                    last_code = code;
                    // `staged` drops here and removes the attempt's files.
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RegistryError::StorageConflict {
            code: last_code,
            attempts: max_attempts,
        })
    }

    fn note_conflict(&self, code: &str, attempt: u32, max_attempts: u32) {
        warn!(
            "Code {} is already registered (attempt {}/{}); retrying with a fresh code",
            code, attempt, max_attempts
        );
        if let Some(ref cb) = self.config.callback {
            cb.on_code_conflict(code, attempt);
        }
    }

    /// Write the attempt's files and build (but do not insert) its record.
    fn stage(
        &self,
        code: &str,
        display_name: &str,
        institution_id: &str,
        pdf: &[u8],
        xml: Option<&[u8]>,
    ) -> Result<Staged, RegistryError> {
        let created_at = Utc::now();
        let names = self.uploads.attempt_files(code, created_at);
        let mut files = StagedFiles::new();

        // ── Step 3: Persist uploads ──────────────────────────────────────
        storage::write_new(&names.upload_pdf, pdf)?;
        files.track(&names.upload_pdf);
        let xml_path = match xml {
            Some(bytes) => {
                storage::write_new(&names.upload_xml, bytes)?;
                files.track(&names.upload_xml);
                Some(names.upload_xml.clone())
            }
            None => None,
        };

        // ── Steps 4–5: Validation URL and QR ─────────────────────────────
        let validation_url = self.config.validation_url(code);
        qr::generate_qr(&validation_url, &names.qr_png, QrWriteMode::Overwrite)?;
        files.track(&names.qr_png);

        // ── Step 6: Stamp, or fall back to the upload ────────────────────
        let (pdf_path, stamp) =
            match self
                .stamper
                .stamp(&names.upload_pdf, &names.qr_png, &names.final_pdf)
            {
                Ok(()) => {
                    files.track(&names.final_pdf);
                    (names.final_pdf.clone(), StampOutcome::Stamped)
                }
                Err(e) => {
                    warn!(
                        "Could not stamp QR onto {} ({}); serving the unstamped PDF",
                        code, e
                    );
                    if names.final_pdf.exists() {
                        match std::fs::remove_file(&names.final_pdf) {
                            Ok(()) => debug!(
                                "Removed partial stamped PDF {}",
                                names.final_pdf.display()
                            ),
                            Err(e) => debug!(
                                "Could not remove {}: {}",
                                names.final_pdf.display(),
                                e
                            ),
                        }
                    }
                    if let Some(ref cb) = self.config.callback {
                        cb.on_stamp_degraded(code, &e);
                    }
                    (names.upload_pdf.clone(), StampOutcome::Degraded(e))
                }
            };

        Ok(Staged {
            record: DocumentRecord {
                code: code.to_string(),
                institution_id: institution_id.to_string(),
                display_name: display_name.to_string(),
                pdf_path,
                xml_path,
                qr_path: names.qr_png.clone(),
                created_at,
            },
            validation_url,
            stamp,
            files,
        })
    }

    /// Fetch the record for `code`. `Ok(None)` means "document not found".
    pub fn lookup(&self, code: &str) -> Result<Option<DocumentRecord>, RegistryError> {
        Ok(self.store.get_by_code(code)?)
    }

    /// Path of the final PDF for `code`, if the record exists and the file is on disk.
    pub fn file_path_for(&self, code: &str) -> Result<Option<PathBuf>, RegistryError> {
        let Some(record) = self.lookup(code)? else {
            return Ok(None);
        };
        if record.pdf_path.is_file() {
            Ok(Some(record.pdf_path))
        } else {
            warn!(
                "Record {} points at missing PDF {}",
                code,
                record.pdf_path.display()
            );
            Ok(None)
        }
    }

    /// Path of the QR image for `code`, if the record exists.
    ///
    /// A QR image removed from disk is regenerated at its recorded path.
    pub fn qr_path_for(&self, code: &str) -> Result<Option<PathBuf>, RegistryError> {
        let Some(record) = self.lookup(code)? else {
            return Ok(None);
        };
        if !record.qr_path.is_file() {
            info!("Regenerating missing QR for {}", code);
        }
        let url = self.config.validation_url(&record.code);
        qr::generate_qr(&url, &record.qr_path, QrWriteMode::ReuseExisting).map(Some)
    }

    /// The public validation URL for `code`.
    pub fn validation_url(&self, code: &str) -> String {
        self.config.validation_url(code)
    }
}

fn or_default(value: &str, default: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

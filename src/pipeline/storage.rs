//! Upload directory handling: code-derived file names, no-clobber writes,
//! and cleanup of files belonging to an abandoned attempt.

use crate::error::RegistryError;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Replace anything outside `[A-Za-z0-9._-]` so a code is safe as a flat file name.
pub fn file_stem(code: &str) -> String {
    let stem: String = code
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    // A leading dot would hide the file; "." and ".." are not file names.
    match stem.strip_prefix('.') {
        Some(rest) => format!("_{rest}"),
        None => stem,
    }
}

/// File names for one registration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFiles {
    pub upload_pdf: PathBuf,
    pub upload_xml: PathBuf,
    pub qr_png: PathBuf,
    pub final_pdf: PathBuf,
}

/// The directory all registration artifacts live in.
#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
}

impl UploadDir {
    /// Open `root`, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| RegistryError::io(&root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Derive the attempt's file names from the code and a UTC timestamp.
    pub fn attempt_files(&self, code: &str, at: DateTime<Utc>) -> AttemptFiles {
        let stem = file_stem(code);
        let ts = at.format("%Y%m%d%H%M%S");
        AttemptFiles {
            upload_pdf: self.root.join(format!("{stem}_{ts}.pdf")),
            upload_xml: self.root.join(format!("{stem}_{ts}.xml")),
            qr_png: self.root.join(format!("qr_{stem}_{ts}.png")),
            final_pdf: self.root.join(format!("final_{stem}_{ts}.pdf")),
        }
    }
}

/// Write `bytes` to `path` atomically, failing if `path` already exists.
///
/// The data goes to a temp file in the same directory first, so readers
/// never observe a half-written file.
pub fn write_new(path: &Path, bytes: &[u8]) -> Result<(), RegistryError> {
    let mut tmp = temp_beside(path)?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| RegistryError::io(path, e))?;
    tmp.persist_noclobber(path)
        .map_err(|e| RegistryError::io(path, e.error))?;
    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

/// Create a named temp file in the directory that will hold `path`.
pub fn temp_beside(path: &Path) -> Result<NamedTempFile, RegistryError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    NamedTempFile::new_in(dir).map_err(|e| RegistryError::io(dir, e))
}

/// Files written for a registration attempt that are removed on drop
/// unless [`StagedFiles::keep`] is called.
#[derive(Debug, Default)]
pub struct StagedFiles {
    paths: Vec<PathBuf>,
}

impl StagedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a file that now exists on disk.
    pub fn track(&mut self, path: impl Into<PathBuf>) {
        self.paths.push(path.into());
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// The attempt succeeded; leave every tracked file in place.
    pub fn keep(mut self) {
        self.paths.clear();
    }
}

impl Drop for StagedFiles {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Removed abandoned file {}", path.display()),
                Err(e) => debug!("Could not remove {}: {}", path.display(), e),
            }
        }
    }
}

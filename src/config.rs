//! Configuration types for document registration.
//!
//! All registration behaviour is controlled through [`RegistryConfig`], built
//! via its [`RegistryConfigBuilder`] or read from the process environment
//! with [`RegistryConfig::from_env`].

use crate::error::RegistryError;
use crate::events::{RegistrationCallback, SharedCallback};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Environment variable holding the public base URL encoded into QR codes.
pub const ENV_BASE_URL: &str = "BASE_URL";
/// Environment variable holding the path segment of the validation route.
pub const ENV_VALIDATION_PREFIX: &str = "VALIDATION_PREFIX";
/// Environment variable holding the upload directory.
pub const ENV_UPLOAD_DIR: &str = "UPLOAD_DIR";
/// Environment variable holding the SQLite database path.
pub const ENV_DATABASE_PATH: &str = "DATABASE_PATH";
/// Environment variable holding the institution id used for blank requests.
pub const ENV_DEFAULT_INSTITUTION_ID: &str = "DEFAULT_INSTITUTION_ID";

/// Configuration for a [`crate::Registrar`].
///
/// # Example
/// ```rust
/// use edgequake_pdfseal::RegistryConfig;
///
/// let config = RegistryConfig::builder()
///     .base_url("https://diplomas.example.edu")
///     .upload_dir("/var/lib/pdfseal/uploads")
///     .in_memory()
///     .build()
///     .unwrap();
/// assert_eq!(config.validation_url("1660.0123456789ab"),
///            "https://diplomas.example.edu/hed/1660.0123456789ab");
/// ```
#[derive(Clone)]
pub struct RegistryConfig {
    /// Public base URL of the validation site. Default: `http://localhost:5000`.
    pub base_url: String,

    /// Route segment placed between the base URL and the code. Default: `hed`.
    pub validation_prefix: String,

    /// Directory receiving uploads, QR images and stamped PDFs. Default: `uploads`.
    pub upload_dir: PathBuf,

    /// SQLite database file. `None` keeps records in memory. Default: `database.db`.
    pub database_path: Option<PathBuf>,

    /// Institution id used when a request leaves it blank. Default: `1660`.
    pub default_institution_id: String,

    /// Display name used when a request leaves it blank. Default: `---`.
    pub default_display_name: String,

    /// How many fresh codes to try when the store reports a duplicate. Default: 3.
    pub max_code_attempts: u32,

    /// Where the QR lands on the final page.
    pub stamp_layout: StampLayout,

    /// Optional observer for registration events.
    pub callback: SharedCallback,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            validation_prefix: "hed".to_string(),
            upload_dir: PathBuf::from("uploads"),
            database_path: Some(PathBuf::from("database.db")),
            default_institution_id: "1660".to_string(),
            default_display_name: "---".to_string(),
            max_code_attempts: 3,
            stamp_layout: StampLayout::default(),
            callback: None,
        }
    }
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("base_url", &self.base_url)
            .field("validation_prefix", &self.validation_prefix)
            .field("upload_dir", &self.upload_dir)
            .field("database_path", &self.database_path)
            .field("default_institution_id", &self.default_institution_id)
            .field("default_display_name", &self.default_display_name)
            .field("max_code_attempts", &self.max_code_attempts)
            .field("stamp_layout", &self.stamp_layout)
            .field(
                "callback",
                &self.callback.as_ref().map(|_| "<dyn RegistrationCallback>"),
            )
            .finish()
    }
}

impl RegistryConfig {
    /// Create a new builder for `RegistryConfig`.
    pub fn builder() -> RegistryConfigBuilder {
        RegistryConfigBuilder {
            config: Self::default(),
        }
    }

    /// Start a builder pre-filled from the process environment.
    ///
    /// Unset variables keep their defaults; an empty `DATABASE_PATH`
    /// selects the in-memory store.
    pub fn from_env() -> RegistryConfigBuilder {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`RegistryConfig::from_env`] but reading from an arbitrary source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> RegistryConfigBuilder {
        let mut builder = Self::builder();
        if let Some(url) = lookup(ENV_BASE_URL) {
            builder = builder.base_url(url);
        }
        if let Some(prefix) = lookup(ENV_VALIDATION_PREFIX) {
            builder = builder.validation_prefix(prefix);
        }
        if let Some(dir) = lookup(ENV_UPLOAD_DIR) {
            builder = builder.upload_dir(dir);
        }
        match lookup(ENV_DATABASE_PATH) {
            Some(path) if path.trim().is_empty() => builder = builder.in_memory(),
            Some(path) => builder = builder.database_path(path),
            None => {}
        }
        if let Some(id) = lookup(ENV_DEFAULT_INSTITUTION_ID) {
            builder = builder.default_institution_id(id);
        }
        builder
    }

    /// Build the public validation URL for `code`: `{base_url}/{prefix}/{code}`.
    pub fn validation_url(&self, code: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.validation_prefix.trim_matches('/'),
            code
        )
    }
}

/// Builder for [`RegistryConfig`].
#[derive(Debug)]
pub struct RegistryConfigBuilder {
    config: RegistryConfig,
}

impl RegistryConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn validation_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.validation_prefix = prefix.into();
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_path = Some(path.into());
        self
    }

    /// Keep records in memory only (test mode).
    pub fn in_memory(mut self) -> Self {
        self.config.database_path = None;
        self
    }

    pub fn default_institution_id(mut self, id: impl Into<String>) -> Self {
        self.config.default_institution_id = id.into();
        self
    }

    pub fn default_display_name(mut self, name: impl Into<String>) -> Self {
        self.config.default_display_name = name.into();
        self
    }

    pub fn max_code_attempts(mut self, n: u32) -> Self {
        self.config.max_code_attempts = n.max(1);
        self
    }

    pub fn stamp_layout(mut self, layout: StampLayout) -> Self {
        self.config.stamp_layout = layout;
        self
    }

    pub fn callback(mut self, callback: Arc<dyn RegistrationCallback>) -> Self {
        self.config.callback = Some(callback);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RegistryConfig, RegistryError> {
        let c = &self.config;
        let url = c.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(RegistryError::InvalidConfig(format!(
                "base URL must start with http:// or https://, got '{}'",
                c.base_url
            )));
        }
        if c.validation_prefix.trim_matches('/').trim().is_empty() {
            return Err(RegistryError::InvalidConfig(
                "validation prefix must not be empty".into(),
            ));
        }
        if c.default_institution_id.trim().is_empty() {
            return Err(RegistryError::InvalidConfig(
                "default institution id must not be empty".into(),
            ));
        }
        if c.stamp_layout.size <= 0.0 {
            return Err(RegistryError::InvalidConfig(format!(
                "QR size must be positive, got {}",
                c.stamp_layout.size
            )));
        }
        let mut config = self.config;
        config.base_url = config.base_url.trim().to_string();
        Ok(config)
    }
}

// ── Layout ───────────────────────────────────────────────────────────────

/// Position of the QR square on the final page, in PDF points.
///
/// The default places a 120 pt square 40 pt in from the bottom-right corner
/// of an A4 page (595 × 842 pt). The offsets are absolute, so pages of other
/// sizes receive the QR at the same coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StampLayout {
    /// Edge length of the QR square.
    pub size: f32,
    /// Distance of the left edge from the page origin.
    pub x: f32,
    /// Distance of the bottom edge from the page origin.
    pub y: f32,
}

/// Width of an A4 page in points.
pub const A4_WIDTH_PT: f32 = 595.0;

impl Default for StampLayout {
    fn default() -> Self {
        Self::bottom_right(A4_WIDTH_PT, 120.0, 40.0)
    }
}

impl StampLayout {
    /// Place a `size` square `margin` points from the right and bottom edges
    /// of a page `page_width` points wide.
    pub fn bottom_right(page_width: f32, size: f32, margin: f32) -> Self {
        Self {
            size,
            x: page_width - size - margin,
            y: margin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_layout_matches_a4_offsets() {
        let layout = StampLayout::default();
        assert_eq!(layout.size, 120.0);
        assert_eq!(layout.x, 435.0);
        assert_eq!(layout.y, 40.0);
    }

    #[test]
    fn validation_url_joins_segments() {
        let config = RegistryConfig::builder()
            .base_url("https://example.org/")
            .validation_prefix("/hed/")
            .build()
            .unwrap();
        assert_eq!(
            config.validation_url("1660.aabbccddeeff"),
            "https://example.org/hed/1660.aabbccddeeff"
        );
    }

    #[test]
    fn build_rejects_non_http_base_url() {
        let err = RegistryConfig::builder()
            .base_url("ftp://example.org")
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidConfig(_)));
    }

    #[test]
    fn build_rejects_empty_prefix() {
        let err = RegistryConfig::builder()
            .validation_prefix("//")
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidConfig(_)));
    }

    #[test]
    fn max_code_attempts_is_at_least_one() {
        let config = RegistryConfig::builder()
            .max_code_attempts(0)
            .build()
            .unwrap();
        assert_eq!(config.max_code_attempts, 1);
    }

    #[test]
    fn from_lookup_reads_variables() {
        let vars: HashMap<&str, &str> = [
            (ENV_BASE_URL, "https://docs.example.edu"),
            (ENV_UPLOAD_DIR, "/srv/uploads"),
            (ENV_DATABASE_PATH, "/srv/docs.db"),
            (ENV_DEFAULT_INSTITUTION_ID, "42"),
        ]
        .into_iter()
        .collect();
        let config = RegistryConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()))
            .build()
            .unwrap();
        assert_eq!(config.base_url, "https://docs.example.edu");
        assert_eq!(config.upload_dir, PathBuf::from("/srv/uploads"));
        assert_eq!(config.database_path, Some(PathBuf::from("/srv/docs.db")));
        assert_eq!(config.default_institution_id, "42");
        assert_eq!(config.validation_prefix, "hed");
    }

    #[test]
    fn empty_database_path_selects_memory() {
        let config = RegistryConfig::from_lookup(|k| {
            (k == ENV_DATABASE_PATH).then(String::new)
        })
        .build()
        .unwrap();
        assert!(config.database_path.is_none());
    }
}

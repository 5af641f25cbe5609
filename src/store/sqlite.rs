use super::RecordStore;
use crate::error::StoreError;
use crate::record::DocumentRecord;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    code           TEXT NOT NULL UNIQUE,
    institution_id TEXT NOT NULL,
    display_name   TEXT NOT NULL,
    pdf_path       TEXT NOT NULL,
    xml_path       TEXT,
    qr_path        TEXT NOT NULL,
    created_at     TEXT NOT NULL
);
";

/// Records persisted in a single SQLite `documents` table.
///
/// Code uniqueness is enforced by the table's `UNIQUE` constraint, so a
/// racing duplicate insert is rejected by the database itself.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Backend(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path).map_err(backend)?;
        debug!("Opened record database {}", path.display());
        Self::with_connection(conn)
    }

    /// A private in-memory database; useful in tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory().map_err(backend)?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Backend("sqlite connection lock poisoned".into()))
    }
}

impl RecordStore for SqliteStore {
    fn insert(&self, record: DocumentRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO documents
                (code, institution_id, display_name, pdf_path, xml_path, qr_path, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.code,
                record.institution_id,
                record.display_name,
                path_text(&record.pdf_path),
                record.xml_path.as_deref().map(path_text),
                path_text(&record.qr_path),
                record.created_at.to_rfc3339(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Conflict { code: record.code })
            }
            Err(err) => Err(backend(err)),
        }
    }

    fn get_by_code(&self, code: &str) -> Result<Option<DocumentRecord>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT code, institution_id, display_name, pdf_path, xml_path, qr_path, created_at
                 FROM documents WHERE code = ?1",
                params![code],
                |row| {
                    Ok(RecordRow {
                        code: row.get(0)?,
                        institution_id: row.get(1)?,
                        display_name: row.get(2)?,
                        pdf_path: row.get(3)?,
                        xml_path: row.get(4)?,
                        qr_path: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                },
            )
            .optional()
            .map_err(backend)?;
        row.map(RecordRow::into_record).transpose()
    }
}

/// Raw column values before conversion.
struct RecordRow {
    code: String,
    institution_id: String,
    display_name: String,
    pdf_path: String,
    xml_path: Option<String>,
    qr_path: String,
    created_at: String,
}

impl RecordRow {
    fn into_record(self) -> Result<DocumentRecord, StoreError> {
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| {
                StoreError::Backend(format!(
                    "bad created_at '{}' for {}: {}",
                    self.created_at, self.code, e
                ))
            })?
            .with_timezone(&Utc);
        Ok(DocumentRecord {
            code: self.code,
            institution_id: self.institution_id,
            display_name: self.display_name,
            pdf_path: PathBuf::from(self.pdf_path),
            xml_path: self.xml_path.map(PathBuf::from),
            qr_path: PathBuf::from(self.qr_path),
            created_at,
        })
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn backend(err: rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

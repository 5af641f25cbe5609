//! End-to-end integration tests for edgequake-pdfseal.
//!
//! Every test runs the full registration pipeline against a fresh
//! `TempDir` workspace and PDFs built on the fly with `lopdf`, so nothing
//! here needs network access or fixture files.
//!
//! Run with:
//!   cargo test --test e2e -- --nocapture

use edgequake_pdfseal::{
    parse_code, CodeGenerator, DocumentRecord, MemoryStore, RecordStore, Registrar,
    RegistrationCallback, RegistrationRequest, RegistryConfig, RegistryError, SqliteStore,
    StampError, StampOutcome,
};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route library logs to the test output; `RUST_LOG=debug` shows every step.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A PDF with `pages` A4 pages, each showing "Page N".
fn fixture_pdf(pages: usize) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = (0..pages)
        .map(|i| {
            let content = format!("BT /F1 12 Tf 72 770 Td (Page {}) Tj ET", i + 1);
            let content_id = doc.add_object(Stream::new(Dictionary::new(), content.into_bytes()));
            doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(595),
                    Object::Integer(842),
                ],
                "Contents" => content_id,
            })
            .into()
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("serialise fixture PDF");
    bytes
}

fn config_in(dir: &TempDir) -> edgequake_pdfseal::RegistryConfigBuilder {
    RegistryConfig::builder()
        .base_url("https://validate.example.edu/")
        .upload_dir(dir.path().join("uploads"))
        .in_memory()
}

fn registrar_in(dir: &TempDir) -> Registrar {
    init_tracing();
    Registrar::open(config_in(dir).build().unwrap()).unwrap()
}

fn uploads(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir.path().join("uploads"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn page_count(path: &Path) -> usize {
    Document::load(path).unwrap().get_pages().len()
}

/// Repeats one code forever.
struct StuckCodes(&'static str);

impl CodeGenerator for StuckCodes {
    fn next_code(&self, _institution_id: &str) -> String {
        self.0.to_string()
    }
}

/// Returns `first` for the first two calls, then a distinct code per call.
struct CollideOnce {
    first: &'static str,
    calls: AtomicU32,
}

impl CodeGenerator for CollideOnce {
    fn next_code(&self, institution_id: &str) -> String {
        match self.calls.fetch_add(1, Ordering::SeqCst) {
            0 | 1 => self.first.to_string(),
            n => format!("{institution_id}.{:012x}", n),
        }
    }
}

// ── Registration ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_register_returns_well_formed_code() {
    let dir = TempDir::new().unwrap();
    let registrar = registrar_in(&dir);

    let reg = registrar
        .register(RegistrationRequest::new("Maria Silva", "1660").with_pdf(fixture_pdf(1)))
        .await
        .unwrap();

    let parts = parse_code(reg.code()).expect("code must parse");
    assert_eq!(parts.institution_id, "1660");
    assert_eq!(parts.suffix.len(), 12);
    assert_eq!(
        reg.validation_url,
        format!("https://validate.example.edu/hed/{}", reg.code())
    );
}

#[tokio::test]
async fn test_lookup_round_trip() {
    let dir = TempDir::new().unwrap();
    let registrar = registrar_in(&dir);

    let reg = registrar
        .register(
            RegistrationRequest::new("João Pereira", "2001")
                .with_pdf(fixture_pdf(2))
                .with_xml(b"<registro/>".to_vec()),
        )
        .await
        .unwrap();

    let rec = registrar.lookup(reg.code()).unwrap().expect("registered");
    assert_eq!(rec.display_name, "João Pereira");
    assert_eq!(rec.institution_id, "2001");
    assert!(rec.pdf_path.is_file());
    assert!(rec.qr_path.is_file());
    assert_eq!(std::fs::read(rec.xml_path.unwrap()).unwrap(), b"<registro/>");
}

#[tokio::test]
async fn test_lookup_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let registrar = registrar_in(&dir);
    let reg = registrar
        .register(RegistrationRequest::new("Ana", "1660").with_pdf(fixture_pdf(1)))
        .await
        .unwrap();

    let a = registrar.lookup(reg.code()).unwrap();
    let b = registrar.lookup(reg.code()).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.unwrap(), reg.record);
}

#[tokio::test]
async fn test_codes_are_unique_across_registrations() {
    let dir = TempDir::new().unwrap();
    let registrar = registrar_in(&dir);

    let mut seen = HashSet::new();
    for i in 0..20 {
        let reg = registrar
            .register(RegistrationRequest::new(format!("Student {i}"), "1660").with_pdf(fixture_pdf(1)))
            .await
            .unwrap();
        assert!(seen.insert(reg.code().to_string()), "duplicate {}", reg.code());
    }
}

#[tokio::test]
async fn test_concurrent_registrations_all_land() {
    let dir = TempDir::new().unwrap();
    let registrar = registrar_in(&dir);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let registrar = registrar.clone();
            tokio::spawn(async move {
                registrar
                    .register(RegistrationRequest::new(format!("P{i}"), "77").with_pdf(fixture_pdf(1)))
                    .await
            })
        })
        .collect();

    for h in handles {
        let reg = h.await.unwrap().unwrap();
        assert!(registrar.lookup(reg.code()).unwrap().is_some());
    }
}

// ── Collisions ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_forced_collision_retries_with_fresh_code() {
    let dir = TempDir::new().unwrap();
    let registrar = registrar_in(&dir).with_code_generator(Arc::new(CollideOnce {
        first: "1660.000000000001",
        calls: AtomicU32::new(0),
    }));

    let first = registrar
        .register(RegistrationRequest::new("First", "1660").with_pdf(fixture_pdf(1)))
        .await
        .unwrap();
    let second = registrar
        .register(RegistrationRequest::new("Second", "1660").with_pdf(fixture_pdf(1)))
        .await
        .unwrap();

    assert_eq!(first.code(), "1660.000000000001");
    assert_ne!(second.code(), first.code());
    assert_eq!(second.attempts, 2);
    assert_eq!(
        registrar.lookup(first.code()).unwrap().unwrap().display_name,
        "First"
    );
}

#[tokio::test]
async fn test_exhausted_collisions_fail_without_leftovers() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir).max_code_attempts(2).build().unwrap();
    let registrar = Registrar::open(config)
        .unwrap()
        .with_code_generator(Arc::new(StuckCodes("9.abcabcabcabc")));

    registrar
        .register(RegistrationRequest::new("Kept", "9").with_pdf(fixture_pdf(1)))
        .await
        .unwrap();
    let before = uploads(&dir);

    let err = registrar
        .register(RegistrationRequest::new("Lost", "9").with_pdf(fixture_pdf(1)))
        .await
        .unwrap_err();
    assert!(
        matches!(err, RegistryError::StorageConflict { attempts: 2, .. }),
        "got: {err:?}"
    );
    assert_eq!(uploads(&dir), before);
}

// ── Stamping ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_stamped_pdf_keeps_page_count() {
    let dir = TempDir::new().unwrap();
    let registrar = registrar_in(&dir);

    let reg = registrar
        .register(RegistrationRequest::new("Ana", "1660").with_pdf(fixture_pdf(4)))
        .await
        .unwrap();

    assert_eq!(reg.stamp, StampOutcome::Stamped);
    assert_eq!(page_count(&reg.record.pdf_path), 4);

    let doc = Document::load(&reg.record.pdf_path).unwrap();
    let pages: Vec<_> = doc.get_pages().into_values().collect();
    let last = doc.get_page_content(*pages.last().unwrap()).unwrap();
    let first = doc.get_page_content(pages[0]).unwrap();
    assert!(String::from_utf8_lossy(&last).contains("Do"));
    assert!(!String::from_utf8_lossy(&first).contains("Do"));
}

#[tokio::test]
async fn test_invalid_pdf_degrades_to_upload() {
    let dir = TempDir::new().unwrap();
    let registrar = registrar_in(&dir);
    let junk = b"%PDF-1.4 this is not really a pdf".to_vec();

    let reg = registrar
        .register(RegistrationRequest::new("Ana", "1660").with_pdf(junk.clone()))
        .await
        .unwrap();

    assert!(matches!(reg.stamp, StampOutcome::Degraded(_)));
    let path = registrar.file_path_for(reg.code()).unwrap().unwrap();
    assert_eq!(std::fs::read(path).unwrap(), junk);
    assert!(uploads(&dir).iter().all(|n| !n.starts_with("final_")));
}

// ── Validation and lookups ───────────────────────────────────────────────────

#[tokio::test]
async fn test_missing_pdf_is_rejected_cleanly() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let registrar =
        Registrar::new(config_in(&dir).build().unwrap(), store.clone()).unwrap();

    let err = registrar
        .register(RegistrationRequest::new("Ana", "1660").with_xml(b"<x/>".to_vec()))
        .await
        .unwrap_err();

    assert!(matches!(err, RegistryError::Validation(_)));
    assert!(store.is_empty());
    assert!(uploads(&dir).is_empty());
}

#[tokio::test]
async fn test_unknown_code_is_not_found() {
    let dir = TempDir::new().unwrap();
    let registrar = registrar_in(&dir);

    assert!(registrar.lookup("1660.ffffffffffff").unwrap().is_none());
    assert!(registrar.file_path_for("1660.ffffffffffff").unwrap().is_none());
    assert!(registrar.qr_path_for("nonsense").unwrap().is_none());
}

#[tokio::test]
async fn test_qr_path_regenerates_deleted_image() {
    let dir = TempDir::new().unwrap();
    let registrar = registrar_in(&dir);
    let reg = registrar
        .register(RegistrationRequest::new("Ana", "1660").with_pdf(fixture_pdf(1)))
        .await
        .unwrap();

    std::fs::remove_file(&reg.record.qr_path).unwrap();
    let qr = registrar.qr_path_for(reg.code()).unwrap().unwrap();
    assert_eq!(qr, reg.record.qr_path);
    assert!(qr.is_file());
}

// ── Persistence ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sqlite_records_survive_restart() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("database.db");
    let config = || {
        RegistryConfig::builder()
            .upload_dir(dir.path().join("uploads"))
            .database_path(&db)
            .build()
            .unwrap()
    };

    let code = {
        let registrar = Registrar::open(config()).unwrap();
        registrar
            .register(RegistrationRequest::new("Ana", "1660").with_pdf(fixture_pdf(1)))
            .await
            .unwrap()
            .code()
            .to_string()
    };

    let registrar = Registrar::open(config()).unwrap();
    let rec = registrar.lookup(&code).unwrap().expect("persisted");
    assert_eq!(rec.display_name, "Ana");

    let store = SqliteStore::open(&db).unwrap();
    assert_eq!(store.get_by_code(&code).unwrap(), Some(rec));
}

// ── Events ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl RegistrationCallback for Recorder {
    fn on_registration_start(&self, display_name: &str, _institution_id: &str) {
        self.0.lock().unwrap().push(format!("start:{display_name}"));
    }
    fn on_code_assigned(&self, _code: &str, attempt: u32) {
        self.0.lock().unwrap().push(format!("code:{attempt}"));
    }
    fn on_stamp_degraded(&self, _code: &str, _error: &StampError) {
        self.0.lock().unwrap().push("degraded".into());
    }
    fn on_registered(&self, record: &DocumentRecord) {
        self.0.lock().unwrap().push(format!("done:{}", record.display_name));
    }
}

#[tokio::test]
async fn test_callback_sees_pipeline_events() {
    let dir = TempDir::new().unwrap();
    let recorder = Arc::new(Recorder::default());
    let config = config_in(&dir).callback(recorder.clone()).build().unwrap();
    let registrar = Registrar::open(config).unwrap();

    registrar
        .register(RegistrationRequest::new("Ana", "1660").with_pdf(b"%PDF-junk".to_vec()))
        .await
        .unwrap();

    let events = recorder.0.lock().unwrap().clone();
    assert_eq!(events, vec!["start:Ana", "code:1", "degraded", "done:Ana"]);
}

#[test]
fn test_registrar_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Registrar>();
}

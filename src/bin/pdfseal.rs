//! CLI binary for edgequake-pdfseal.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `RegistryConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_pdfseal::{
    parse_code, AccessPolicy, AdminCredentials, DocumentRecord, Registrar, RegistrationCallback,
    RegistrationRequest, RegistryConfig, StampError, StampOutcome,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI registration callback using indicatif ────────────────────────────────

/// Spinner plus one log line per pipeline event.
struct CliRegistrationCallback {
    bar: ProgressBar,
}

impl CliRegistrationCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Registering");
        bar.set_message("Validating upload…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    /// Remove the spinner if the run ended without `on_registered`.
    fn clear(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl RegistrationCallback for CliRegistrationCallback {
    fn on_registration_start(&self, display_name: &str, institution_id: &str) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Registering '{display_name}' for institution {institution_id}"))
        ));
    }

    fn on_code_assigned(&self, code: &str, attempt: u32) {
        self.bar.set_message(format!("code {code} (attempt {attempt})"));
    }

    fn on_code_conflict(&self, code: &str, attempt: u32) {
        self.bar.println(format!(
            "  {} {} already taken  {}",
            cyan("⚠"),
            code,
            dim(&format!("attempt {attempt}"))
        ));
    }

    fn on_stamp_degraded(&self, code: &str, error: &StampError) {
        self.bar.println(format!(
            "  {} QR not stamped on {}  {}",
            red("✗"),
            code,
            red(&error.to_string())
        ));
    }

    fn on_registered(&self, record: &DocumentRecord) {
        self.bar.finish_and_clear();
        eprintln!("{} Registered {}", green("✔"), bold(&record.code));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Register a diploma (credentials checked against ADMIN_USER / ADMIN_PASS)
  pdfseal register --name "Maria Silva" --institution 1660 \
      --pdf diploma.pdf --xml diploma.xml --user admin --password "$PASS"

  # Look a code up
  pdfseal lookup 1660.3fa9c01b7e2d

  # Paths for a validation page
  pdfseal file 1660.3fa9c01b7e2d
  pdfseal qr   1660.3fa9c01b7e2d

  # Throwaway run without a database file
  pdfseal --in-memory --upload-dir /tmp/seal register ...

ENVIRONMENT VARIABLES:
  BASE_URL                Public base URL encoded in QR codes (default http://localhost:5000)
  VALIDATION_PREFIX       Route segment before the code (default hed)
  UPLOAD_DIR              Where uploads, QR images and stamped PDFs go (default uploads)
  DATABASE_PATH           SQLite file (default database.db)
  DEFAULT_INSTITUTION_ID  Institution used when --institution is blank (default 1660)
  ADMIN_USER              Admin login (default admin)
  ADMIN_PASS              Admin password (required for register)
  RUST_LOG                Overrides the log filter
"#;

/// Register academic PDFs under a validation code and stamp a QR onto them.
#[derive(Parser, Debug)]
#[command(
    name = "pdfseal",
    version,
    about = "Register academic PDFs, stamp a validation QR, and look them up by code",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Public base URL encoded into QR codes.
    #[arg(long, global = true, env = "BASE_URL")]
    base_url: Option<String>,

    /// Directory for uploads, QR images and stamped PDFs.
    #[arg(long, global = true, env = "UPLOAD_DIR")]
    upload_dir: Option<PathBuf>,

    /// SQLite database file.
    #[arg(long, global = true, env = "DATABASE_PATH")]
    database: Option<PathBuf>,

    /// Keep records in memory only (overrides --database).
    #[arg(long, global = true)]
    in_memory: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFSEAL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFSEAL_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a PDF (and optional XML) and print its code.
    Register(RegisterArgs),
    /// Show the record for a code.
    Lookup {
        code: String,
        /// Output the record as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print the path of the final PDF for a code.
    File { code: String },
    /// Print the path of the QR image for a code.
    Qr { code: String },
}

#[derive(Args, Debug)]
struct RegisterArgs {
    /// Name shown on the validation page.
    #[arg(long, default_value = "")]
    name: String,

    /// Issuing institution id.
    #[arg(long, default_value = "")]
    institution: String,

    /// The PDF to register.
    #[arg(long)]
    pdf: PathBuf,

    /// Optional XML metadata stored alongside the PDF.
    #[arg(long)]
    xml: Option<PathBuf>,

    /// Admin user name.
    #[arg(long, env = "PDFSEAL_USER")]
    user: String,

    /// Admin password.
    #[arg(long, env = "PDFSEAL_PASSWORD", hide_env_values = true)]
    password: String,

    /// Output the registration receipt as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner covers the info-level story during `register`.
    let registering = matches!(cli.command, Command::Register(_));
    let show_progress = registering && !cli.quiet && !wants_json(&cli.command);
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let callback = show_progress.then(CliRegistrationCallback::new);
    let outcome = match open_authorized(&cli, |key| std::env::var(key).ok(), callback.clone()) {
        Ok(Some(registrar)) => run(&cli, &registrar).await,
        Ok(None) => {
            eprintln!("{} Invalid admin credentials", red("✘"));
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e),
    };
    if let Some(ref cb) = callback {
        cb.clear();
    }
    outcome
}

async fn run(cli: &Cli, registrar: &Registrar) -> Result<ExitCode> {
    match cli.command {
        Command::Register(ref args) => register(registrar, args, cli.quiet).await,
        Command::Lookup { ref code, json } => lookup(registrar, code, json),
        Command::File { ref code } => print_path(
            registrar.file_path_for(code).context("Lookup failed")?,
            code,
        ),
        Command::Qr { ref code } => {
            print_path(registrar.qr_path_for(code).context("Lookup failed")?, code)
        }
    }
}

/// Open the registrar, checking the admin login first for `register`.
///
/// Returns `Ok(None)` on a failed login; nothing is created on disk then.
fn open_authorized(
    cli: &Cli,
    env: impl Fn(&str) -> Option<String>,
    callback: Option<Arc<CliRegistrationCallback>>,
) -> Result<Option<Registrar>> {
    if let Command::Register(ref args) = cli.command {
        let credentials =
            AdminCredentials::from_lookup(env).context("Admin login is not configured")?;
        if !credentials
            .login(&args.user, &args.password)
            .is_authorized()
        {
            return Ok(None);
        }
    }
    build_registrar(cli, callback).map(Some)
}

fn wants_json(command: &Command) -> bool {
    match command {
        Command::Register(args) => args.json,
        Command::Lookup { json, .. } => *json,
        _ => false,
    }
}

/// Map global flags to a `Registrar`.
fn build_registrar(
    cli: &Cli,
    callback: Option<Arc<CliRegistrationCallback>>,
) -> Result<Registrar> {
    let mut builder = RegistryConfig::from_env();
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url);
    }
    if let Some(ref dir) = cli.upload_dir {
        builder = builder.upload_dir(dir);
    }
    if let Some(ref db) = cli.database {
        builder = builder.database_path(db);
    }
    if cli.in_memory {
        builder = builder.in_memory();
    }
    if let Some(cb) = callback {
        builder = builder.callback(cb);
    }

    let config = builder.build().context("Invalid configuration")?;
    Registrar::open(config).context("Failed to open registry")
}

async fn register(registrar: &Registrar, args: &RegisterArgs, quiet: bool) -> Result<ExitCode> {
    // ── Read inputs ──────────────────────────────────────────────────────
    let pdf = tokio::fs::read(&args.pdf)
        .await
        .with_context(|| format!("Failed to read PDF from {:?}", args.pdf))?;
    let mut request = RegistrationRequest::new(&args.name, &args.institution).with_pdf(pdf);
    if let Some(ref path) = args.xml {
        let xml = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read XML from {:?}", path))?;
        request = request.with_xml(xml);
    }

    // ── Run registration ─────────────────────────────────────────────────
    let registration = registrar
        .register(request)
        .await
        .context("Registration failed")?;

    if args.json {
        let json = serde_json::to_string_pretty(&registration)
            .context("Failed to serialise registration")?;
        println!("{json}");
        return Ok(ExitCode::SUCCESS);
    }

    println!("{}", registration.code());
    if !quiet {
        eprintln!(
            "   {}  →  {}",
            dim("validation"),
            cyan(&registration.validation_url)
        );
        eprintln!(
            "   {}  →  {}",
            dim("pdf"),
            bold(&registration.record.pdf_path.display().to_string())
        );
        if let StampOutcome::Degraded(ref e) = registration.stamp {
            eprintln!("   {} stored without QR: {}", cyan("⚠"), e);
        }
        if registration.attempts > 1 {
            eprintln!("   {}", dim(&format!("{} code attempts", registration.attempts)));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn lookup(registrar: &Registrar, code: &str, json: bool) -> Result<ExitCode> {
    let Some(record) = registrar.lookup(code).context("Lookup failed")? else {
        report_unknown(code);
        return Ok(ExitCode::FAILURE);
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&record).context("Failed to serialise record")?
        );
        return Ok(ExitCode::SUCCESS);
    }

    println!("Code:         {}", record.code);
    println!("Name:         {}", record.display_name);
    println!("Institution:  {}", record.institution_id);
    println!("Registered:   {}", record.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("PDF:          {}", record.pdf_path.display());
    if let Some(ref xml) = record.xml_path {
        println!("XML:          {}", xml.display());
    }
    println!("QR:           {}", record.qr_path.display());
    println!("Validation:   {}", registrar.validation_url(&record.code));
    Ok(ExitCode::SUCCESS)
}

fn print_path(path: Option<PathBuf>, code: &str) -> Result<ExitCode> {
    match path {
        Some(path) => {
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        None => {
            report_unknown(code);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn report_unknown(code: &str) {
    if parse_code(code).is_some() {
        eprintln!("{} Document not found: {}", red("✘"), code);
    } else {
        eprintln!(
            "{} Document not found: {}  {}",
            red("✘"),
            code,
            dim("(codes look like <institution>.<12 hex chars>)")
        );
    }
}

//! CLI binary for edgequake-pdf2xlsx.
//!
//! `pdf2xlsx serve` runs the HTTP endpoint; `pdf2xlsx convert` runs one
//! local file through the same pipeline. Both map flags (and their
//! environment fallbacks) onto `ConversionConfig`.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_pdf2xlsx::config::{provider_credential_var, DEFAULT_PROVIDER};
use edgequake_pdf2xlsx::server::{self, ServerConfig};
use edgequake_pdf2xlsx::{
    convert_to_file, ArtifactStore, ConversionConfig, ConversionProgressCallback, Pipeline,
    ProgressCallback, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner showing the running stage, with one log line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_prefix(stage_label(stage));
        self.bar.set_message(match stage {
            Stage::Extract => "reading PDF text…",
            Stage::Prompt => "building prompt…",
            Stage::Model => "waiting for the model…",
            Stage::Parse => "recovering records…",
            Stage::Tabulate => "writing workbook…",
        });
    }

    fn on_stage_complete(&self, stage: Stage, detail: &str) {
        self.bar
            .println(format!("  {} {:<9} {}", green("✓"), stage_label(stage), dim(detail)));
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        let msg = if error.chars().count() > 100 {
            format!("{}\u{2026}", error.chars().take(99).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<9} {}", red("✗"), stage_label(stage), red(&msg)));
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Extract => "Extract",
        Stage::Prompt => "Prompt",
        Stage::Model => "Model",
        Stage::Parse => "Parse",
        Stage::Tabulate => "Tabulate",
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the HTTP service on port 8000
  API_KEY=... pdf2xlsx serve

  # Upload a document
  curl -F "file=@invoice.pdf;type=application/pdf" \
       -o output.xlsx http://localhost:8000/convert-to-excel/

  # Convert a local file
  pdf2xlsx convert invoice.pdf -o invoice.xlsx

  # Print the extracted records as JSON as well
  pdf2xlsx convert --json invoice.pdf

ENVIRONMENT VARIABLES:
  API_KEY                 Model API key (required); copied to the provider's
                          own variable (e.g. GEMINI_API_KEY) when that is unset
  EDGEQUAKE_LLM_PROVIDER  Provider (gemini, openai, anthropic, ...). Default: gemini
  EDGEQUAKE_MODEL         Model ID. Default: gemini-2.5-flash
  PDFIUM_LIB_PATH         Path to libpdfium (else ./ then system paths)
  RUST_LOG                Log filter, overrides -v / -q

A .env file in the working directory is loaded at startup.
"#;

/// Extract key/value records from PDFs with an LLM and export them to Excel.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2xlsx",
    version,
    about = "Extract key/value records from PDFs with an LLM and export them to Excel",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2XLSX_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2XLSX_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve POST /convert-to-excel/ over HTTP.
    Serve(ServeArgs),
    /// Convert one local PDF to an .xlsx file.
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "PDF2XLSX_ADDR", default_value = "0.0.0.0:8000")]
    addr: SocketAddr,

    /// Largest accepted upload, in MiB.
    #[arg(long, env = "PDF2XLSX_MAX_UPLOAD_MB", default_value_t = 25)]
    max_upload_mb: usize,

    /// Directory for per-request scratch files (default: a fresh temp dir).
    #[arg(long, env = "PDF2XLSX_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Local PDF file.
    input: PathBuf,

    /// Workbook path. Default: the input path with an .xlsx extension.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Also print the extracted records as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "PDF2XLSX_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(Args, Debug)]
struct ModelArgs {
    /// Model API key.
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// LLM provider: gemini, openai, anthropic, mistral, openrouter, xai, ollama.
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID (e.g. gemini-2.5-flash, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2XLSX_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max LLM output tokens.
    #[arg(long, env = "PDF2XLSX_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Retries on model failure.
    #[arg(long, env = "PDF2XLSX_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-attempt model call timeout in seconds.
    #[arg(long, env = "PDF2XLSX_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2XLSX_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Worksheet name.
    #[arg(long, env = "PDF2XLSX_SHEET_NAME", default_value = "Sheet1")]
    sheet_name: String,
}

impl Command {
    fn model_args(&self) -> &ModelArgs {
        match self {
            Command::Serve(a) => &a.model,
            Command::Convert(a) => &a.model,
        }
    }
}

fn main() -> Result<()> {
    // Before parsing, so `.env` values feed the `env = ...` fallbacks.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback a `convert` run needs, so library
    // INFO logs are hidden while it is active.
    let spinner = matches!(&cli.command, Command::Convert(a) if !a.no_progress && !cli.quiet);
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || spinner {
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

    // ── Credentials ──────────────────────────────────────────────────────
    // Done before the runtime exists: the environment is only written while
    // the process is still single-threaded.
    bridge_credentials(cli.command.model_args())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    runtime.block_on(async move {
        match cli.command {
            Command::Serve(args) => serve(args).await,
            Command::Convert(args) => convert(args, cli.quiet).await,
        }
    })
}

/// Require a model key and expose it under the variable the provider reads.
fn bridge_credentials(args: &ModelArgs) -> Result<()> {
    let provider = args.provider.as_deref().unwrap_or(DEFAULT_PROVIDER);
    let Some(var) = provider_credential_var(provider) else {
        // Local providers (ollama, lmstudio) need no key.
        return Ok(());
    };

    match args.api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(key) => {
            if std::env::var_os(var).is_none() {
                std::env::set_var(var, key);
            }
        }
        None if std::env::var(var).is_ok_and(|v| !v.is_empty()) => {}
        None => bail!(
            "No API key configured for provider '{}'. Set API_KEY (or {}) in the environment or .env",
            provider,
            var
        ),
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
fn build_config(args: &ModelArgs, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .temperature(args.temperature)
        .max_tokens(args.max_tokens)
        .max_retries(args.max_retries)
        .api_timeout_secs(args.api_timeout)
        .sheet_name(args.sheet_name.clone());

    if let Some(ref p) = args.provider {
        builder = builder.provider_name(p.clone());
    }
    if let Some(ref m) = args.model {
        builder = builder.model(m.clone());
    }
    if let Some(ref pwd) = args.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = build_config(&args.model, None)?;
    let store = match args.scratch_dir {
        Some(ref dir) => ArtifactStore::new(dir),
        None => ArtifactStore::ephemeral(),
    }
    .context("Failed to prepare scratch directory")?;

    let pipeline =
        Arc::new(Pipeline::from_config(&config, store).context("Failed to configure the model")?);

    tracing::info!("Starting pdf2xlsx v{}", env!("CARGO_PKG_VERSION"));
    server::serve(
        pipeline,
        ServerConfig {
            addr: args.addr,
            max_upload_bytes: args.max_upload_mb * 1024 * 1024,
        },
    )
    .await
    .context("Server failed")
}

async fn convert(args: ConvertArgs, quiet: bool) -> Result<()> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.input));

    let spinner = (!quiet && !args.no_progress).then(CliProgressCallback::new);
    let progress = spinner
        .clone()
        .map(|cb| cb as Arc<dyn ConversionProgressCallback>);

    let config = build_config(&args.model, progress)?;
    let store = ArtifactStore::ephemeral().context("Failed to prepare scratch directory")?;
    let pipeline = Pipeline::from_config(&config, store).context("Failed to configure the model")?;

    let outcome = convert_to_file(&pipeline, &args.input, &output).await;
    if let Some(ref s) = spinner {
        s.finish();
    }
    let (result, stats) = outcome.context("Conversion failed")?;

    if args.json {
        let json =
            serde_json::to_string_pretty(result.records()).context("Failed to serialise records")?;
        println!("{json}");
    }

    if !quiet {
        eprintln!(
            "{}  {} records ({} dropped) from {} pages  {}ms  →  {}",
            green("✔"),
            stats.records,
            stats.dropped_records,
            stats.pages,
            stats.total_duration_ms,
            bold(&output.display().to_string()),
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&stats.input_tokens.to_string()),
            dim(&stats.output_tokens.to_string()),
        );
    }
    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    input.with_extension("xlsx")
}

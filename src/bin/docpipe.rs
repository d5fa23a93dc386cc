//! CLI binary for ai-document-pipeline.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig` and prints results.

use anyhow::{Context, Result};
use ai_document_pipeline::pipeline::encode::jpeg_bytes;
use ai_document_pipeline::pipeline::render::{PageRenderer, PdfiumRenderer};
use ai_document_pipeline::pipeline::tiling::tile_pages;
use ai_document_pipeline::prompts::DEFAULT_PAGES_PROMPT;
use ai_document_pipeline::workflow::{
    CheckpointStore, FileCheckpointStore, InvoiceBatchRequest, InvoiceBatchService,
    MemoryCheckpointStore,
};
use ai_document_pipeline::{
    build_extractor_as, extract_as, validate_invoice, BatchProgressCallback, DocumentSource,
    ExtractorKind, FsBlobStore, InvoiceData, PipelineConfig, ProgressCallback,
};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Progress bar over the documents of a batch. Documents complete out of
/// order when the batch runs concurrently.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(spinner_style);
        bar.set_prefix("Discovering");
        bar.set_message("Listing container…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        self.bar.set_length(total_documents as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Processing");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_documents} documents…"))
        ));
    }

    fn on_document_start(&self, _index: usize, _total: usize, document: &str) {
        self.bar.set_message(document.to_string());
    }

    fn on_document_complete(&self, index: usize, total: usize, document: &str, is_valid: bool) {
        let mark = if is_valid { green("✓") } else { red("✗") };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}",
            mark,
            index,
            total,
            dim(document)
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_documents: usize, valid_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_documents.saturating_sub(valid_count);
        if failed == 0 {
            eprintln!(
                "{} {} documents valid",
                green("✔"),
                bold(&valid_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents valid  ({} need review)",
                if failed == total_documents {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&valid_count.to_string()),
                total_documents,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process every document of a container (./storage/<account>/invoices/...)
  docpipe --storage-account acme run --container invoices

  # Same, with the Markdown step and a persistent journal
  docpipe run --container invoices --markdown-step --journal .docpipe/journal

  # Continue that run after a crash; journaled steps are not repeated
  docpipe run --container invoices --journal .docpipe/journal --instance-id <id>

  # Extract one file with a given strategy
  docpipe extract invoice.pdf --strategy vision

  # Re-run the rules on a stored record
  docpipe validate storage/acme/invoices/march/a.pdf.Data.json

  # Look at the composite images the vision strategy would send
  docpipe tile scan.pdf --out tiles/

ENVIRONMENT VARIABLES:
  INVOICES_STORAGE_ACCOUNT_NAME        Storage account (required for `run`)
  DOCPIPE_STORAGE_ROOT                 Root of the filesystem blob store
  DOCPIPE_EXTRACTOR                    direct | markdown | vision
  DOCPIPE_CONCURRENCY                  Documents processed at once
  DOCPIPE_MARKDOWN_STEP                Convert to Markdown before extraction
  DOCPIPE_JOURNAL_DIR                  Directory of the activity journal
  DOCPIPE_INSTANCE_ID                  Instance to continue (`run`)
  DOCUMENT_INTELLIGENCE_ENDPOINT       Layout service endpoint
  DOCUMENT_INTELLIGENCE_KEY            Layout service key
  EDGEQUAKE_LLM_PROVIDER               openai, azure, anthropic, gemini, ollama
  OPENAI_COMPLETION_DEPLOYMENT         Model for text extraction
  OPENAI_VISION_COMPLETION_DEPLOYMENT  Model for vision extraction
  OPENAI_API_KEY                       OpenAI API key
  PDFIUM_LIB_PATH                      Path to libpdfium
"#;

/// Extract, validate and store invoice data from scanned documents.
#[derive(Parser, Debug)]
#[command(
    name = "docpipe",
    version,
    about = "Extract, validate and store invoice data from scanned documents",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Storage account the batch reads from and writes to.
    #[arg(long, global = true, env = "INVOICES_STORAGE_ACCOUNT_NAME")]
    storage_account: Option<String>,

    /// Root directory of the filesystem blob store.
    #[arg(long, global = true, env = "DOCPIPE_STORAGE_ROOT", default_value = "storage")]
    storage_root: PathBuf,

    /// Extraction strategy.
    #[arg(long, global = true, env = "DOCPIPE_EXTRACTOR", value_enum, default_value = "vision")]
    extractor: ExtractorArg,

    /// LLM provider: openai, azure, anthropic, gemini, ollama.
    #[arg(long, global = true, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Model / deployment for text extraction.
    #[arg(long, global = true, env = "OPENAI_COMPLETION_DEPLOYMENT")]
    model: Option<String>,

    /// Model / deployment for vision extraction. Defaults to --model.
    #[arg(long, global = true, env = "OPENAI_VISION_COMPLETION_DEPLOYMENT")]
    vision_model: Option<String>,

    /// Layout service endpoint (markdown extractor and --markdown-step).
    #[arg(long, global = true, env = "DOCUMENT_INTELLIGENCE_ENDPOINT")]
    layout_endpoint: Option<String>,

    /// Layout service key.
    #[arg(long, global = true, env = "DOCUMENT_INTELLIGENCE_KEY", hide_env_values = true)]
    layout_key: Option<String>,

    /// Max LLM output tokens per request.
    #[arg(long, global = true, env = "DOCPIPE_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "DOCPIPE_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max composite images per vision request (1–10).
    #[arg(long, global = true, env = "DOCPIPE_MAX_TILES", default_value_t = 10,
          value_parser = clap::value_parser!(u8).range(1..=10))]
    max_tiles: u8,

    /// PDF password for encrypted documents.
    #[arg(long, global = true, env = "DOCPIPE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCPIPE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCPIPE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process every document of a container.
    Run {
        /// Container holding the documents.
        #[arg(long, env = "DOCPIPE_CONTAINER")]
        container: String,

        /// Documents processed at once.
        #[arg(short, long, env = "DOCPIPE_CONCURRENCY", default_value_t = 4)]
        concurrency: usize,

        /// Convert each document to Markdown and store it before extraction.
        #[arg(long, env = "DOCPIPE_MARKDOWN_STEP")]
        markdown_step: bool,

        /// Per-activity timeout in seconds.
        #[arg(long, env = "DOCPIPE_ACTIVITY_TIMEOUT", default_value_t = 300)]
        activity_timeout: u64,

        /// Directory for the activity journal. In memory when unset.
        #[arg(long, env = "DOCPIPE_JOURNAL_DIR")]
        journal: Option<PathBuf>,

        /// Continue an earlier instance: activities it journaled are not run
        /// again. Needs the same --journal directory, where `<id>.json` is
        /// that instance's journal.
        #[arg(long, env = "DOCPIPE_INSTANCE_ID", requires = "journal")]
        instance_id: Option<String>,

        /// Print the result tree as JSON.
        #[arg(long)]
        json: bool,

        /// Disable the progress bar.
        #[arg(long, env = "DOCPIPE_NO_PROGRESS")]
        no_progress: bool,
    },

    /// Extract one document and print the invoice JSON.
    Extract {
        /// Local file, file:// URI or HTTP/HTTPS URL.
        input: String,

        /// Strategy for this call; overrides --extractor.
        #[arg(long, value_enum)]
        strategy: Option<ExtractorArg>,
    },

    /// Validate a stored invoice JSON record.
    Validate {
        /// Path to a `*.Data.json` file.
        file: PathBuf,
    },

    /// Render and tile a document, writing the JPEG tiles to a directory.
    Tile {
        /// PDF or image file.
        file: PathBuf,

        /// Output directory.
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ExtractorArg {
    Direct,
    Markdown,
    Vision,
}

impl From<ExtractorArg> for ExtractorKind {
    fn from(v: ExtractorArg) -> Self {
        match v {
            ExtractorArg::Direct => ExtractorKind::Direct,
            ExtractorArg::Markdown => ExtractorKind::Markdown,
            ExtractorArg::Vision => ExtractorKind::Vision,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
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

    match &cli.command {
        Command::Run {
            container,
            concurrency,
            markdown_step,
            activity_timeout,
            journal,
            instance_id,
            json,
            no_progress,
        } => {
            let account = cli
                .storage_account
                .clone()
                .context("--storage-account (or INVOICES_STORAGE_ACCOUNT_NAME) is required")?;
            let config = base_config(&cli, &account, cli.extractor.into())
                .concurrency(*concurrency)
                .markdown_step(*markdown_step)
                .activity_timeout_secs(*activity_timeout)
                .build()
                .context("Invalid configuration")?;

            let store = Arc::new(FsBlobStore::new(&config.storage_root));
            let checkpoints: Arc<dyn CheckpointStore> = match journal {
                Some(dir) => Arc::new(FileCheckpointStore::new(dir)),
                None => Arc::new(MemoryCheckpointStore::new()),
            };
            let mut service = InvoiceBatchService::from_config(&config, store, checkpoints)
                .context("Failed to set up the batch service")?;

            let show_progress = !cli.quiet && !*no_progress && !*json;
            if show_progress {
                let cb: ProgressCallback = CliProgressCallback::new();
                service = service.with_progress(cb);
            }

            let request = InvoiceBatchRequest::new(container.as_str());
            let batch = match instance_id {
                Some(id) => service
                    .rerun(id, request)
                    .await
                    .with_context(|| format!("Cannot continue instance {id}"))?,
                None => service
                    .run_to_completion(request)
                    .await
                    .context("Failed to start the batch")?,
            };

            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&batch.result)
                        .context("Failed to serialise result")?
                );
            } else {
                print!("{}", batch.result.render_tree());
            }
            if !cli.quiet {
                eprintln!("   {}", dim(&format!("instance {}", batch.instance_id)));
            }

            Ok(if batch.result.is_valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }

        Command::Extract { input, strategy } => {
            let kind: ExtractorKind = strategy.unwrap_or(cli.extractor).into();
            let account = cli.storage_account.as_deref().unwrap_or("local");
            let config = base_config(&cli, account, ExtractorKind::Vision)
                .build()
                .context("Invalid configuration")?;
            let extractor =
                build_extractor_as(&config, kind, None).context("Failed to build extractor")?;

            let source = if input.contains("://") {
                DocumentSource::Uri(input.clone())
            } else {
                let bytes = tokio::fs::read(input)
                    .await
                    .with_context(|| format!("Failed to read {input}"))?;
                DocumentSource::Bytes(bytes)
            };

            let data = extract_as(
                extractor.as_ref(),
                source,
                &InvoiceData::template(),
                Some(DEFAULT_PAGES_PROMPT),
            )
            .await
            .context("Extraction failed")?;

            match data {
                Some(data) => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&data).context("Failed to serialise data")?
                    );
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!("{} no data extracted from {}", red("✘"), input);
                    Ok(ExitCode::from(2))
                }
            }
        }

        Command::Validate { file } => {
            let bytes = tokio::fs::read(file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let data: InvoiceData = serde_json::from_slice(&bytes)
                .with_context(|| format!("{} is not an invoice record", file.display()))?;
            let name = document_name(file);
            let outcome = validate_invoice(&name, Some(&data));
            println!(
                "{}",
                serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?
            );
            if !cli.quiet {
                eprintln!(
                    "{} {}  {}",
                    if outcome.is_valid { green("✔") } else { red("✘") },
                    bold(&name),
                    dim(&outcome.status.to_string())
                );
            }
            Ok(if outcome.is_valid {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }

        Command::Tile { file, out } => {
            let config = base_config(&cli, "local", ExtractorKind::Vision)
                .build()
                .context("Invalid configuration")?;
            let bytes = tokio::fs::read(file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;

            let pages = PdfiumRenderer::new(&config.tiling)
                .render(bytes)
                .await
                .context("Rendering failed")?;
            let page_count = pages.len();
            let tiles = tile_pages(pages, config.tiling.max_tiles);

            tokio::fs::create_dir_all(out)
                .await
                .with_context(|| format!("Failed to create {}", out.display()))?;
            for (i, tile) in tiles.iter().enumerate() {
                let jpeg = jpeg_bytes(tile, config.tiling.jpeg_quality, i)
                    .with_context(|| format!("Failed to encode tile {}", i + 1))?;
                let path = out.join(format!("tile-{:02}.jpg", i + 1));
                tokio::fs::write(&path, jpeg)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
            }
            if !cli.quiet {
                eprintln!(
                    "{} {} pages → {} tiles  →  {}",
                    green("✔"),
                    page_count,
                    tiles.len(),
                    bold(&out.display().to_string())
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Builder pre-filled from the global flags.
fn base_config(
    cli: &Cli,
    account: &str,
    extractor: ExtractorKind,
) -> ai_document_pipeline::PipelineConfigBuilder {
    let mut builder = PipelineConfig::builder()
        .storage_account(account)
        .storage_root(cli.storage_root.clone())
        .extractor(extractor)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_tiles(usize::from(cli.max_tiles));

    if let Some(ref p) = cli.provider {
        builder = builder.provider_name(p.clone());
    }
    if let Some(ref m) = cli.model {
        builder = builder.model(m.clone());
    }
    if let Some(ref m) = cli.vision_model {
        builder = builder.vision_model(m.clone());
    }
    if let Some(ref e) = cli.layout_endpoint {
        builder = builder.layout_endpoint(e.clone());
    }
    if let Some(ref k) = cli.layout_key {
        builder = builder.layout_api_key(k.clone());
    }
    if let Some(ref p) = cli.password {
        builder = builder.password(p.clone());
    }
    builder
}

/// `march/a.pdf.Data.json` → `a.pdf`.
fn document_name(file: &Path) -> String {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.strip_suffix(".Data.json")
        .map(str::to_string)
        .unwrap_or(name)
}

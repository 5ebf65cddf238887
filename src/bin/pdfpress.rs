//! CLI binary for edgequake-pdfpress.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `PipelineConfig`, writes artifacts and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_pdfpress::{
    compress, inspect, merge, split, write_artifacts, CancelFlag, PageImageFormat, PageSelection,
    Phase, PipelineConfig, PipelineProgressCallback, ProgressCallback, RunOutput,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live progress bar plus one log line per page.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Wall-clock start of the page currently in flight.
    page_started: Mutex<Option<Instant>>,
}

impl CliProgressCallback {
    /// Starts as a spinner; becomes a bar once `on_run_start` reports the total.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            page_started: Mutex::new(None),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.reset_eta();
    }

    fn page_elapsed(&self) -> f64 {
        self.page_started
            .lock()
            .ok()
            .and_then(|mut started| started.take())
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_pages} pages…"))
        ));
    }

    fn on_phase(&self, phase: Phase) {
        let prefix = match phase {
            Phase::Reading => "Reading",
            Phase::Rendering => "Compressing",
            Phase::Copying => "Copying",
            Phase::Finalizing => "Writing",
            _ => return,
        };
        self.bar.set_prefix(prefix);
    }

    fn on_progress(&self, _phase: Phase, current: usize, _total: usize) {
        if let Ok(mut started) = self.page_started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_message(format!("page {current}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, output_bytes: usize) {
        let elapsed = self.page_elapsed();
        let size = if output_bytes > 0 {
            human_bytes(output_bytes as u64)
        } else {
            "copied".to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            total,
            dim(&size),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let elapsed = self.page_elapsed();

        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} pages processed successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages processed  ({} failed)",
                cyan("⚠"),
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Shrink a scanned form below an upload limit
  pdfpress compress scan.pdf

  # Harder compression, narrower pages
  pdfpress compress --quality 0.4 --max-width 1000 scan.pdf -o out/

  # Lossless page images (larger, no JPEG artefacts)
  pdfpress compress --format lossless drawing.pdf

  # One PDF per page, or only some pages
  pdfpress split report.pdf
  pdfpress split --pages 2-4 report.pdf

  # Merge in a chosen order
  pdfpress merge a.pdf b.pdf c.pdf --order c.pdf,a.pdf,b.pdf

  # From a URL, JSON summary
  pdfpress compress --json https://example.com/form.pdf

  # Metadata only
  pdfpress inspect report.pdf

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory); compress only
  PDFPRESS_*              Every flag has an environment variable, e.g.
                          PDFPRESS_QUALITY=0.5, PDFPRESS_OUT_DIR=out
  RUST_LOG                Override log filtering (e.g. RUST_LOG=debug)

SETUP:
  split, merge and inspect work out of the box. compress rasterises pages
  with pdfium: place libpdfium in the working directory, install it system
  wide, or point PDFIUM_LIB_PATH at it.
"#;

/// Compress, split and merge PDF files.
#[derive(Parser, Debug)]
#[command(
    name = "pdfpress",
    version,
    about = "Compress, split and merge PDF files",
    long_about = "Compress PDFs by rasterising every page at a capped width and re-encoding it \
as JPEG, split them into single pages, or merge several into one. Inputs may be local files \
or HTTP/HTTPS URLs.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// PDF user password for encrypted documents.
    #[arg(long, global = true, env = "PDFPRESS_PASSWORD")]
    password: Option<String>,

    /// Output structured JSON instead of a human summary.
    #[arg(long, global = true, env = "PDFPRESS_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "PDFPRESS_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFPRESS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFPRESS_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "PDFPRESS_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Largest accepted input, in MiB.
    #[arg(long, global = true, env = "PDFPRESS_MAX_INPUT_MB", default_value_t = 200)]
    max_input_mb: u64,
}

#[derive(Args, Debug)]
struct OutArgs {
    /// Directory to write output PDFs into.
    #[arg(short = 'o', long = "out-dir", env = "PDFPRESS_OUT_DIR", default_value = ".")]
    out_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rasterise and re-encode every page into a smaller PDF.
    Compress {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// JPEG quality in (0, 1].
        #[arg(long, env = "PDFPRESS_QUALITY", default_value_t = 0.6)]
        quality: f32,

        /// Maximum rendered page width in pixels; narrower pages are not upscaled.
        #[arg(long, env = "PDFPRESS_MAX_WIDTH", default_value_t = 1400,
              value_parser = clap::value_parser!(u32).range(1..))]
        max_width: u32,

        /// Page image encoding.
        #[arg(long, env = "PDFPRESS_FORMAT", value_enum, default_value = "jpeg")]
        format: FormatArg,

        #[command(flatten)]
        out: OutArgs,
    },

    /// Write one PDF per page.
    Split {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// Page selection: all, 5, 3-15, or 1,3,5,7.
        #[arg(long, env = "PDFPRESS_PAGES", default_value = "all")]
        pages: String,

        #[command(flatten)]
        out: OutArgs,
    },

    /// Concatenate PDFs into merged.pdf.
    Merge {
        /// Local PDF file paths or HTTP/HTTPS URLs, in merge order.
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<String>,

        /// Explicit order, as a comma-separated list of the inputs as given.
        #[arg(long, env = "PDFPRESS_ORDER", value_delimiter = ',')]
        order: Option<Vec<String>>,

        /// Maximum number of documents accepted.
        #[arg(long, env = "PDFPRESS_MAX_DOCUMENTS", default_value_t = 50)]
        max_documents: usize,

        #[command(flatten)]
        out: OutArgs,
    },

    /// Print PDF metadata only.
    Inspect {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Jpeg,
    Lossless,
}

impl From<FormatArg> for PageImageFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Jpeg => PageImageFormat::Jpeg,
            FormatArg::Lossless => PageImageFormat::Lossless,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let global = &cli.global;

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let is_inspect = matches!(cli.command, Command::Inspect { .. });
    let show_progress = !global.quiet && !global.no_progress && !global.json && !is_inspect;
    let filter = if global.verbose {
        "debug"
    } else if global.quiet || show_progress {
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

    // ── Inspect mode ─────────────────────────────────────────────────────
    if let Command::Inspect { ref input } = cli.command {
        let config = base_config(global).build().context("Invalid configuration")?;
        let meta = inspect(input, &config).await.context("Failed to inspect PDF")?;

        if global.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&meta).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", input);
            if let Some(ref t) = meta.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = meta.author {
                println!("Author:       {}", a);
            }
            if let Some(ref s) = meta.subject {
                println!("Subject:      {}", s);
            }
            println!("Pages:        {}", meta.page_count);
            println!("Size:         {}", human_bytes(meta.byte_len as u64));
            println!("PDF Version:  {}", meta.pdf_version);
            println!("Encrypted:    {}", meta.is_encrypted);
            if let Some(ref p) = meta.producer {
                println!("Producer:     {}", p);
            }
            if let Some(ref c) = meta.creator {
                println!("Creator:      {}", c);
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let cli_cb = show_progress.then(CliProgressCallback::new_dynamic);
    let cancel = CancelFlag::new();

    let mut builder = base_config(global).cancel(cancel.clone());
    if let Some(ref cb) = cli_cb {
        builder = builder.progress_callback(Arc::clone(cb) as ProgressCallback);
    }

    // Ctrl-C stops the run at the next page boundary.
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    // ── Run ──────────────────────────────────────────────────────────────
    let (result, out_dir) = match cli.command {
        Command::Compress {
            ref input,
            quality,
            max_width,
            format,
            ref out,
        } => {
            let config = builder
                .quality(quality)
                .target_max_width_px(max_width)
                .image_format(format.into())
                .build()
                .context("Invalid configuration")?;
            (compress(input, &config).await, &out.out_dir)
        }
        Command::Split {
            ref input,
            ref pages,
            ref out,
        } => {
            let selection: PageSelection = pages.parse().context("Invalid --pages")?;
            let config = builder
                .pages(selection)
                .build()
                .context("Invalid configuration")?;
            (split(input, &config).await, &out.out_dir)
        }
        Command::Merge {
            ref inputs,
            ref order,
            max_documents,
            ref out,
        } => {
            let mut builder = builder.max_documents(max_documents);
            if let Some(order) = order {
                builder = builder.order(order.iter().cloned());
            }
            let config = builder.build().context("Invalid configuration")?;
            (merge(inputs, &config).await, &out.out_dir)
        }
        Command::Inspect { .. } => return Ok(()),
    };

    if let Some(ref cb) = cli_cb {
        cb.bar.finish_and_clear();
    }
    let output = result.context("Processing failed")?;

    // ── Write artifacts ──────────────────────────────────────────────────
    let written = write_artifacts(&output.artifacts, out_dir)
        .await
        .context("Failed to write output")?;

    if global.json {
        let json = serde_json::json!({
            "output": &output,
            "written": written,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).context("Failed to serialise output")?
        );
    } else if !global.quiet {
        print_summary(&output, &written);
    }

    Ok(())
}

/// Config fields shared by every subcommand.
fn base_config(global: &GlobalArgs) -> edgequake_pdfpress::PipelineConfigBuilder {
    let mut builder = PipelineConfig::builder()
        .download_timeout_secs(global.download_timeout)
        .max_input_bytes(global.max_input_mb.saturating_mul(1024 * 1024));
    if let Some(ref pwd) = global.password {
        builder = builder.password(pwd.clone());
    }
    builder
}

fn print_summary(output: &RunOutput, written: &[PathBuf]) {
    let stats = &output.stats;
    for (artifact, path) in output.artifacts.iter().zip(written) {
        eprintln!(
            "  {}  {:<10}  {}",
            green("→"),
            dim(&human_bytes(artifact.byte_len() as u64)),
            bold(&path.display().to_string()),
        );
    }
    for failure in &output.failures {
        eprintln!("  {}  {}", red("✗"), failure);
    }

    let ratio = if stats.input_bytes > 0 {
        format!(
            "  ({:.0}% of input)",
            stats.output_bytes as f64 * 100.0 / stats.input_bytes as f64
        )
    } else {
        String::new()
    };
    eprintln!(
        "{}  {} {}/{} pages  {} → {}{}  {}ms",
        if output.is_complete() {
            green("✔")
        } else {
            cyan("⚠")
        },
        stats.mode,
        stats.processed_pages,
        stats.total_pages,
        human_bytes(stats.input_bytes),
        human_bytes(stats.output_bytes),
        ratio,
        stats.duration_ms,
    );
}

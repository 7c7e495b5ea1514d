//! CLI binary for menu2dish.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs one menu photo through the pipeline, and prints
//! the recommended dishes.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use menu2dish::{
    resolve_image, MenuPipeline, OcrBackend, PipelineConfig, PipelineObserver,
    PipelineState, ProgressObserver, RunId, Stage,
};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
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

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Terminal observer: a spinner while OCR and parsing run, then a bar over
/// the image slots. Slots may finish out of order.
struct CliObserver {
    bar: ProgressBar,
    /// Per-slot request start times for elapsed reporting.
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Reading");
        bar.set_message("Recognizing menu text…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:30.green/238}] {pos}/{len} images  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Plating");
    }

    fn elapsed(&self, index: usize) -> String {
        let ms = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut t| t.remove(&index))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        dim(&format!("{:.1}s", ms as f64 / 1000.0))
    }
}

impl PipelineObserver for CliObserver {
    fn on_text_extracted(&self, _run: RunId, chars: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Read {chars} characters of menu text"))
        ));
        self.bar.set_prefix("Thinking");
        self.bar.set_message("Choosing dishes…");
    }

    fn on_dishes_parsed(&self, _run: RunId, names: Vec<String>) {
        for (i, name) in names.iter().enumerate() {
            self.bar.println(format!("  {} {}", dim(&format!("{}.", i + 1)), name));
        }
        self.activate_bar(names.len());
        self.bar.set_message(String::new());
    }

    fn on_slot_start(&self, _run: RunId, index: usize) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(index, Instant::now());
        }
    }

    fn on_slot_complete(&self, _run: RunId, index: usize, _url: String) {
        self.bar.println(format!(
            "  {} Image {}  {}",
            green("✓"),
            index + 1,
            self.elapsed(index)
        ));
        self.bar.inc(1);
    }

    fn on_slot_error(&self, _run: RunId, index: usize, error: String) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error
        };
        self.bar.println(format!(
            "  {} Image {}  {}  {}",
            red("✗"),
            index + 1,
            red(&msg),
            self.elapsed(index)
        ));
        self.bar.inc(1);
    }

    fn on_stage_failed(&self, _run: RunId, stage: Stage, message: String) {
        self.bar.finish_and_clear();
        eprintln!("{} {:?}: {}", red("✘"), stage, message);
    }

    fn on_run_complete(&self, _run: RunId, images: usize, dishes: usize) {
        self.bar.finish_and_clear();
        if images == dishes {
            eprintln!("{} {} dishes plated", green("✔"), bold(&dishes.to_string()));
        } else {
            eprintln!(
                "{} {}/{} images generated  ({} failed)",
                if images == 0 { red("✘") } else { cyan("⚠") },
                bold(&images.to_string()),
                dishes,
                red(&self.errors.load(Ordering::SeqCst).to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Recommend dishes from a photo
  menu2dish menu.jpg

  # From a URL, JSON snapshot to a file
  menu2dish https://example.com/menu.png -o dishes.json

  # Let a vision model read the menu instead of tesseract
  menu2dish --ocr vision --provider openai --model gpt-4.1-mini menu.jpg

  # Show the demonstration set (no API key needed)
  menu2dish --examples

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY            Chat and image API key
  MENU2DISH_LLM_PROVIDER    Override chat provider (openai, anthropic, gemini, ollama)
  MENU2DISH_MODEL           Override chat model ID
  MENU2DISH_IMAGE_API_BASE  OpenAI-compatible image endpoint base URL

SETUP:
  1. Install tesseract:  apt install tesseract-ocr   (or brew install tesseract)
  2. Set API key:        export OPENAI_API_KEY=sk-...
  3. Run:                menu2dish menu.jpg
"#;

/// Turn a menu photo into five recommended dishes with generated images.
#[derive(Parser, Debug)]
#[command(
    name = "menu2dish",
    version,
    about = "Turn a menu photo into recommended dishes with generated images",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local image path or HTTP/HTTPS URL.
    #[arg(required_unless_present = "examples")]
    input: Option<String>,

    /// Write the JSON snapshot to this file.
    #[arg(short, long, env = "MENU2DISH_OUTPUT")]
    output: Option<PathBuf>,

    /// Chat model ID used to pick dishes.
    #[arg(long, env = "MENU2DISH_MODEL")]
    model: Option<String>,

    /// Chat provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "MENU2DISH_LLM_PROVIDER")]
    provider: Option<String>,

    /// Text recognition engine.
    #[arg(long, env = "MENU2DISH_OCR", value_enum, default_value = "tesseract")]
    ocr: OcrArg,

    /// Tesseract language hint.
    #[arg(long, env = "MENU2DISH_OCR_LANG", default_value = "eng")]
    ocr_lang: String,

    /// Delay between staggered image requests, in milliseconds.
    #[arg(long, env = "MENU2DISH_STAGGER_MS", default_value_t = 500)]
    stagger_ms: u64,

    /// Generated image size (WIDTHxHEIGHT).
    #[arg(long, env = "MENU2DISH_IMAGE_SIZE", default_value = "512x512")]
    image_size: String,

    /// Image-generation endpoint base URL.
    #[arg(long, env = "MENU2DISH_IMAGE_API_BASE")]
    image_api_base: Option<String>,

    /// Image-generation model, if the endpoint requires one.
    #[arg(long, env = "MENU2DISH_IMAGE_MODEL")]
    image_model: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "MENU2DISH_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "MENU2DISH_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Print the demonstration set instead of processing an image.
    #[arg(long)]
    examples: bool,

    /// Print the JSON snapshot instead of a dish list.
    #[arg(long, env = "MENU2DISH_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "MENU2DISH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MENU2DISH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "MENU2DISH_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum OcrArg {
    Tesseract,
    Vision,
}

impl From<OcrArg> for OcrBackend {
    fn from(v: OcrArg) -> Self {
        match v {
            OcrArg::Tesseract => OcrBackend::Tesseract,
            OcrArg::Vision => OcrBackend::Vision,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.examples;
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

    // ── Examples mode ────────────────────────────────────────────────────
    let state = if cli.examples {
        let pipeline = MenuPipeline::examples_only(&PipelineConfig::default());
        pipeline.view_examples();
        pipeline.snapshot()
    } else {
        let input = cli.input.as_deref().context("No input image given")?;

        let observer: Option<ProgressObserver> = if show_progress {
            Some(CliObserver::new() as Arc<dyn PipelineObserver>)
        } else {
            None
        };
        let config = build_config(&cli, observer)?;
        let pipeline = MenuPipeline::from_config(&config).context("Failed to set up pipeline")?;

        let image = resolve_image(input, cli.download_timeout)
            .await
            .with_context(|| format!("Failed to load image '{input}'"))?;
        pipeline.run(image).await
    };

    // ── Output ───────────────────────────────────────────────────────────
    if let Some(ref path) = cli.output {
        write_snapshot(path, &state).await?;
        if !cli.quiet {
            eprintln!("{}  →  {}", green("✔"), bold(&path.display().to_string()));
        }
    } else if cli.json {
        let json = serde_json::to_string_pretty(&state).context("Failed to serialise state")?;
        println!("{json}");
    } else {
        print_dishes(&state);
    }

    if let Some(message) = state.ocr_error().or(state.process_error()) {
        anyhow::bail!("{message}");
    }
    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, observer: Option<ProgressObserver>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .ocr_backend(cli.ocr.clone().into())
        .ocr_language(cli.ocr_lang.clone())
        .stagger_ms(cli.stagger_ms)
        .image_size(cli.image_size.clone())
        .request_timeout_secs(cli.timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.chat_model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref base) = cli.image_api_base {
        builder = builder.image_api_base(base.clone());
    }
    if let Some(ref model) = cli.image_model {
        builder = builder.image_model(model.clone());
    }
    if let Some(observer) = observer {
        builder = builder.observer(observer);
    }

    builder.build().context("Invalid configuration")
}

fn print_dishes(state: &PipelineState) {
    for (i, slot) in state.slots().iter().enumerate() {
        let Some(ref dish) = slot.dish else {
            continue;
        };
        println!("{}. {}", i + 1, bold(&dish.name));
        if !dish.description.is_empty() {
            println!("   {}", dish.description);
        }
        match (&slot.image, slot.errored) {
            (Some(url), _) => println!("   {}", cyan(url)),
            (None, true) => println!("   {}", red("image failed")),
            (None, false) => println!("   {}", dim("no image")),
        }
    }
}

/// Atomic write (temp file + rename) so a crash never leaves a partial file.
async fn write_snapshot(path: &Path, state: &PipelineState) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {:?}", parent))?;
    }

    let json = serde_json::to_string_pretty(state).context("Failed to serialise state")?;
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, json)
        .await
        .with_context(|| format!("Failed to write {:?}", tmp_path))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to move output into place at {:?}", path))?;
    Ok(())
}

//! Pipeline orchestrator: owns the [`PipelineState`] and drives one run per
//! submitted image through OCR, parsing, and image synthesis.
//!
//! ## Run identity
//!
//! Each [`MenuPipeline::submit`] bumps the [`RunId`] and resets the state
//! under the same lock. The previous run keeps going (nothing is cancelled)
//! but every one of its writes goes through a [`RunWriter`] that carries its
//! own `RunId`, and [`PipelineState`] rejects writes from any run but the
//! active one. Observer events are emitted only for writes that landed, so a
//! presentation layer never sees a superseded run's slots.
//!
//! ## Locking
//!
//! The state mutex is held for a single write (plus the observer event it
//! triggers) or a snapshot clone, never across an `.await`. Emitting under
//! the lock orders every event of a superseded run before the next run's
//! `on_run_start`.

use crate::config::PipelineConfig;
use crate::error::{MenuError, SynthesisError};
use crate::menu::{DishRecord, ExtractedText, MenuImage};
use crate::pipeline::images::{ImageGenerator, OpenAiImageClient};
use crate::pipeline::llm::{ChatCompletion, LlmChat};
use crate::pipeline::ocr::{TextExtractor, TextRecognizer};
use crate::pipeline::parse::DishParser;
use crate::pipeline::synthesize::{ImageSynthesizer, SlotOutcome, SlotSink};
use crate::progress::{NoopObserver, PipelineObserver, ProgressObserver};
use crate::showcase;
use crate::state::{PipelineState, RunId, Stage, SLOT_COUNT};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info, warn};

/// The menu-to-recommendation pipeline.
///
/// Cheap to clone; clones share the same state.
///
/// # Example
/// ```rust,no_run
/// use menu2dish::{MenuImage, MenuPipeline, PipelineConfig};
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let pipeline = MenuPipeline::from_config(&PipelineConfig::default())?;
/// let image = MenuImage::from_path("menu.jpg").await?;
/// let state = pipeline.run(image).await;
/// for dish in state.dishes() {
///     println!("{}: {}", dish.name, dish.description);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MenuPipeline {
    inner: Arc<Inner>,
}

struct Inner {
    state: Arc<Mutex<PipelineState>>,
    extractor: TextExtractor,
    parser: DishParser,
    synthesizer: ImageSynthesizer,
    observer: ProgressObserver,
}

/// Handle to a submitted run.
pub struct RunHandle {
    run: RunId,
    task: JoinHandle<()>,
}

impl RunHandle {
    pub fn run(&self) -> RunId {
        self.run
    }

    /// Wait until the run reaches a terminal stage (or gives up because it
    /// was superseded).
    pub async fn finished(self) -> Result<(), MenuError> {
        self.task
            .await
            .map_err(|e| MenuError::Internal(format!("pipeline task failed: {}", e)))
    }
}

impl MenuPipeline {
    /// Build the production backends selected by `config`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, MenuError> {
        let recognizer = TextExtractor::from_config(config)?;
        let chat: Arc<dyn ChatCompletion> = Arc::new(LlmChat::from_config(config)?);
        let generator: Arc<dyn ImageGenerator> = Arc::new(OpenAiImageClient::from_config(config)?);
        Ok(Self::assemble(config, recognizer, chat, generator))
    }

    /// Build with caller-supplied backends.
    pub fn with_backends(
        config: &PipelineConfig,
        recognizer: Arc<dyn TextRecognizer>,
        chat: Arc<dyn ChatCompletion>,
        generator: Arc<dyn ImageGenerator>,
    ) -> Self {
        Self::assemble(config, TextExtractor::new(recognizer), chat, generator)
    }

    /// A pipeline with no backends: [`MenuPipeline::view_examples`] works,
    /// every submitted image fails at extraction. Needs no credentials.
    pub fn examples_only(config: &PipelineConfig) -> Self {
        let offline = Arc::new(Offline);
        Self::with_backends(config, offline.clone(), offline.clone(), offline)
    }

    fn assemble(
        config: &PipelineConfig,
        extractor: TextExtractor,
        chat: Arc<dyn ChatCompletion>,
        generator: Arc<dyn ImageGenerator>,
    ) -> Self {
        // Fields are public, so a config may skip the builder's validation.
        let max_dishes = config.max_dishes.clamp(1, SLOT_COUNT);
        if max_dishes != config.max_dishes {
            warn!(
                "max_dishes {} out of range, using {}",
                config.max_dishes, max_dishes
            );
        }

        let mut parser = DishParser::new(chat, max_dishes);
        if let Some(ref prompt) = config.system_prompt {
            parser = parser.with_system_prompt(prompt.clone());
        }

        let synthesizer = ImageSynthesizer::new(
            generator,
            Duration::from_millis(config.stagger_ms),
            Duration::from_secs(config.request_timeout_secs),
        );

        let observer = config
            .observer
            .clone()
            .unwrap_or_else(|| Arc::new(NoopObserver));

        Self {
            inner: Arc::new(Inner {
                state: Arc::new(Mutex::new(PipelineState::default())),
                extractor,
                parser,
                synthesizer,
                observer,
            }),
        }
    }

    /// Read-only copy of the current state.
    pub fn snapshot(&self) -> PipelineState {
        lock(&self.inner.state).clone()
    }

    /// Accept a new image: reset the state and start a run in the background.
    ///
    /// Must be called within a tokio runtime.
    pub fn submit(&self, image: MenuImage) -> RunHandle {
        let run = self.inner.start_run();
        info!("{}: accepted {} ({} bytes)", run, image.media_type(), image.bytes().len());

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move { inner.drive(run, image).await });
        RunHandle { run, task }
    }

    /// Submit `image`, wait for its run to finish, and return the final state.
    ///
    /// If another image is submitted meanwhile, the returned state belongs to
    /// that newer run.
    pub async fn run(&self, image: MenuImage) -> PipelineState {
        let handle = self.submit(image);
        let run = handle.run();
        if let Err(e) = handle.finished().await {
            warn!("{}: {}", run, e);
        }
        self.snapshot()
    }

    /// Load the fixed demonstration set straight into `Complete`.
    ///
    /// Supersedes any in-flight run and leaves every progress and error flag
    /// cleared.
    pub fn view_examples(&self) -> RunId {
        let entries = showcase::example_entries();
        let mut state = lock(&self.inner.state);
        let run = state.run().next();
        state.load_complete(run, &entries);
        info!("{}: loaded {} example dishes", run, entries.len());
        self.inner
            .observer
            .on_run_complete(run, entries.len(), entries.len());
        run
    }
}

impl Inner {
    /// Bump the run identity and reset the state.
    fn start_run(&self) -> RunId {
        let mut state = lock(&self.state);
        let run = state.run().next();
        state.begin_run(run);
        self.observer.on_run_start(run);
        run
    }

    fn writer(&self, run: RunId) -> RunWriter {
        RunWriter {
            state: Arc::clone(&self.state),
            run,
            observer: Arc::clone(&self.observer),
        }
    }

    async fn drive(&self, run: RunId, image: MenuImage) {
        let start = Instant::now();
        let writer = self.writer(run);

        let Some(text) = self.extract_stage(&writer, &image).await else {
            return;
        };
        let Some(dishes) = self.parse_stage(&writer, &text).await else {
            return;
        };

        if !writer.apply("start synthesis", |s, run| s.start_synthesis(run)) {
            return;
        }
        let urls = self.synthesizer.synthesize(&dishes, &writer).await;

        let images = urls.iter().filter(|u| u.is_some()).count();
        let completed = writer.apply_and_notify(
            "complete",
            |s, run| s.complete(run),
            |o, run| o.on_run_complete(run, images, dishes.len()),
        );
        if completed {
            info!(
                "{}: complete, {}/{} images in {:?}",
                run,
                images,
                dishes.len(),
                start.elapsed()
            );
        }
    }

    async fn extract_stage(&self, writer: &RunWriter, image: &MenuImage) -> Option<ExtractedText> {
        let run = writer.run;
        match self.extractor.extract(image).await {
            Ok(text) => {
                let chars = text.as_str().chars().count();
                let recorded = text.clone();
                writer
                    .apply_and_notify(
                        "record text",
                        move |s, run| s.record_text(run, recorded),
                        |o, run| o.on_text_extracted(run, chars),
                    )
                    .then_some(text)
            }
            Err(e) => {
                warn!("{}: text extraction failed: {}", run, e);
                writer.apply_and_notify(
                    "extraction failure",
                    |s, run| s.fail_extraction(run, &e),
                    |o, run| o.on_stage_failed(run, Stage::ExtractionFailed, e.to_string()),
                );
                None
            }
        }
    }

    async fn parse_stage(&self, writer: &RunWriter, text: &ExtractedText) -> Option<Vec<DishRecord>> {
        let run = writer.run;
        if !writer.apply("start parsing", |s, run| s.start_parsing(run)) {
            return None;
        }

        match self.parser.parse_dishes(text).await {
            Ok(mut dishes) => {
                dishes.truncate(SLOT_COUNT);
                let names: Vec<String> = dishes.iter().map(|d| d.name.clone()).collect();
                writer
                    .apply_and_notify(
                        "record dishes",
                        |s, run| s.record_dishes(run, &dishes),
                        |o, run| o.on_dishes_parsed(run, names),
                    )
                    .then_some(dishes)
            }
            Err(e) => {
                let stage = match e {
                    MenuError::NotAMenu => Stage::NotAMenu,
                    _ => Stage::ParseFailed,
                };
                warn!("{}: dish parsing failed ({:?}): {}", run, stage, e);
                writer.apply_and_notify(
                    "parse failure",
                    |s, run| s.fail_parse(run, &e),
                    |o, run| o.on_stage_failed(run, stage, e.to_string()),
                );
                None
            }
        }
    }
}

/// Write access to the shared state on behalf of one run.
///
/// Every write is guarded by the run's identity; a rejected write means the
/// run was superseded and is logged at debug level.
struct RunWriter {
    state: Arc<Mutex<PipelineState>>,
    run: RunId,
    observer: ProgressObserver,
}

impl RunWriter {
    fn apply<W>(&self, what: &str, write: W) -> bool
    where
        W: FnOnce(&mut PipelineState, RunId) -> bool,
    {
        self.apply_and_notify(what, write, |_, _| {})
    }

    /// Apply `write` and, if it landed, emit `notify` before the lock drops.
    fn apply_and_notify<W, N>(&self, what: &str, write: W, notify: N) -> bool
    where
        W: FnOnce(&mut PipelineState, RunId) -> bool,
        N: FnOnce(&dyn PipelineObserver, RunId),
    {
        let mut state = lock(&self.state);
        let applied = write(&mut state, self.run);
        if applied {
            notify(self.observer.as_ref(), self.run);
        } else {
            debug!("{}: dropped stale write ({})", self.run, what);
        }
        applied
    }

    fn notify_slot(&self, index: usize, outcome: &SlotOutcome) {
        match outcome {
            Ok(url) => self.observer.on_slot_complete(self.run, index, url.clone()),
            Err(e) => self.observer.on_slot_error(self.run, index, e.to_string()),
        }
    }
}

impl SlotSink for RunWriter {
    fn on_request_start(&self, index: usize) {
        let state = lock(&self.state);
        if state.run() == self.run {
            self.observer.on_slot_start(self.run, index);
        }
    }

    fn on_slot(&self, index: usize, outcome: &SlotOutcome) {
        self.apply_and_notify(
            "slot",
            |s, run| s.apply_slot(run, index, outcome),
            |_, _| self.notify_slot(index, outcome),
        );
    }

    fn on_batch(&self, outcomes: &[SlotOutcome]) {
        self.apply_and_notify(
            "slot batch",
            |s, run| s.apply_all_slots(run, outcomes),
            |_, _| {
                for (index, outcome) in outcomes.iter().enumerate() {
                    self.notify_slot(index, outcome);
                }
            },
        );
    }
}

/// A panicking observer must not wedge the pipeline, so poisoning is ignored.
fn lock(state: &Mutex<PipelineState>) -> MutexGuard<'_, PipelineState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Backends for [`MenuPipeline::examples_only`].
struct Offline;

impl Offline {
    fn not_configured() -> MenuError {
        MenuError::ProviderNotConfigured {
            provider: "offline".to_string(),
            hint: "This pipeline only serves the demonstration set.".to_string(),
        }
    }
}

#[async_trait]
impl TextRecognizer for Offline {
    async fn recognize(&self, _image: &MenuImage) -> Result<String, MenuError> {
        Err(Self::not_configured())
    }
}

#[async_trait]
impl ChatCompletion for Offline {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, MenuError> {
        Err(Self::not_configured())
    }
}

#[async_trait]
impl ImageGenerator for Offline {
    async fn generate(&self, _prompt: &str, _n: usize) -> Result<Vec<String>, SynthesisError> {
        Err(SynthesisError::RequestFailed {
            detail: Self::not_configured().to_string(),
        })
    }
}

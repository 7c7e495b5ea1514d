//! Integration tests for the full pipeline with scripted in-memory backends.
//!
//! Every backend is a test double, so these run offline and deterministic.
//! Tests that go through the staggered strategy run on tokio's paused clock.

use async_trait::async_trait;
use menu2dish::{
    ChatCompletion, ImageGenerator, MenuError, MenuImage, MenuPipeline, PipelineConfig,
    PipelineObserver, RunId, Stage, SynthesisError, TextRecognizer, PROCESSING_ERROR_MESSAGE,
    SLOT_COUNT,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{Duration, Instant};

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Reads the image bytes back as the menu text.
struct EchoOcr;

#[async_trait]
impl TextRecognizer for EchoOcr {
    async fn recognize(&self, image: &MenuImage) -> Result<String, MenuError> {
        Ok(String::from_utf8_lossy(image.bytes()).into_owned())
    }
}

/// Replies with a canned answer per menu text.
struct ScriptedChat {
    replies: Vec<(&'static str, String)>,
    calls: AtomicUsize,
}

impl ScriptedChat {
    fn new(replies: Vec<(&'static str, String)>) -> Arc<Self> {
        Arc::new(Self {
            replies,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ChatCompletion for ScriptedChat {
    async fn complete(&self, _system: &str, user: &str) -> Result<String, MenuError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .iter()
            .find(|(text, _)| *text == user)
            .map(|(_, reply)| reply.clone())
            .ok_or_else(|| MenuError::LlmApiError {
                message: format!("no scripted reply for {user:?}"),
            })
    }
}

#[derive(Debug, Clone)]
struct Call {
    prompt: String,
    n: usize,
    at: Duration,
}

/// Records every request; fails prompts mentioning `fail_on`.
struct RecordingGenerator {
    origin: Instant,
    fail_on: Option<&'static str>,
    calls: Mutex<Vec<Call>>,
}

impl RecordingGenerator {
    fn new(fail_on: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            origin: Instant::now(),
            fail_on,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenerator for RecordingGenerator {
    async fn generate(&self, prompt: &str, n: usize) -> Result<Vec<String>, SynthesisError> {
        let call_no = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call {
                prompt: prompt.to_string(),
                n,
                at: self.origin.elapsed(),
            });
            calls.len()
        };
        if self.fail_on.is_some_and(|f| prompt.contains(f)) {
            return Err(SynthesisError::RequestFailed {
                detail: "HTTP 500".into(),
            });
        }
        Ok((0..n)
            .map(|i| format!("https://img.test/{call_no}/{i}.png"))
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Event {
    SlotComplete(RunId, usize),
    SlotError(RunId, usize),
    StageFailed(RunId, Stage),
    RunComplete(RunId, usize, usize),
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl PipelineObserver for Recorder {
    fn on_slot_complete(&self, run: RunId, index: usize, _url: String) {
        self.events.lock().unwrap().push(Event::SlotComplete(run, index));
    }

    fn on_slot_error(&self, run: RunId, index: usize, _error: String) {
        self.events.lock().unwrap().push(Event::SlotError(run, index));
    }

    fn on_stage_failed(&self, run: RunId, stage: Stage, _message: String) {
        self.events.lock().unwrap().push(Event::StageFailed(run, stage));
    }

    fn on_run_complete(&self, run: RunId, images: usize, dishes: usize) {
        self.events
            .lock()
            .unwrap()
            .push(Event::RunComplete(run, images, dishes));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn dishes_json(names: &[&str]) -> String {
    let items: Vec<serde_json::Value> = names
        .iter()
        .map(|n| serde_json::json!({"name": n, "description": format!("{n}, freshly made")}))
        .collect();
    serde_json::Value::Array(items).to_string()
}

fn menu(text: &str) -> MenuImage {
    MenuImage::new(text.as_bytes().to_vec(), "image/jpeg")
}

fn build(
    chat: Arc<dyn ChatCompletion>,
    generator: Arc<dyn ImageGenerator>,
    recorder: Arc<Recorder>,
) -> MenuPipeline {
    let config = PipelineConfig::builder()
        .observer(recorder as Arc<dyn PipelineObserver>)
        .build()
        .unwrap();
    MenuPipeline::with_backends(&config, Arc::new(EchoOcr), chat, generator)
}

const FIVE: [&str; 5] = ["Ramen", "Gyoza", "Takoyaki", "Karaage", "Mochi"];

// ── Parsing outcomes ─────────────────────────────────────────────────────────

#[tokio::test]
async fn non_menu_yields_no_dishes_and_no_images() {
    let chat = ScriptedChat::new(vec![("Terms and conditions", "ERROR".into())]);
    let generator = RecordingGenerator::new(None);
    let recorder = Arc::new(Recorder::default());
    let p = build(chat, generator.clone(), recorder.clone());

    let state = p.run(menu("Terms and conditions")).await;

    assert_eq!(state.stage(), Stage::NotAMenu);
    assert!(state.dishes().is_empty());
    assert_eq!(state.process_error(), Some(PROCESSING_ERROR_MESSAGE));
    assert!(!state.processing());
    assert!(generator.calls().is_empty());
    assert_eq!(
        recorder.events(),
        vec![Event::StageFailed(state.run(), Stage::NotAMenu)]
    );
}

#[tokio::test]
async fn blank_text_never_reaches_the_model() {
    let chat = ScriptedChat::new(vec![]);
    let p = build(
        chat.clone(),
        RecordingGenerator::new(None),
        Arc::new(Recorder::default()),
    );

    let state = p.run(menu("  \n\t ")).await;

    assert_eq!(state.stage(), Stage::NotAMenu);
    assert!(state.has_text());
    assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn populated_slots_match_parsed_count() {
    let chat = ScriptedChat::new(vec![("short menu", dishes_json(&["Soup", "Bread", "Pie"]))]);
    let generator = RecordingGenerator::new(None);
    let p = build(chat, generator.clone(), Arc::new(Recorder::default()));

    let state = p.run(menu("short menu")).await;

    assert_eq!(state.stage(), Stage::Complete);
    assert_eq!(state.dishes().len(), 3);
    assert_eq!(generator.calls().len(), 3);
    for slot in &state.slots()[3..] {
        assert!(slot.dish.is_none());
        assert!(slot.image.is_none());
        assert!(!slot.errored);
    }
}

#[tokio::test(start_paused = true)]
async fn long_lists_are_cut_to_five() {
    let seven = ["A1", "B2", "C3", "D4", "E5", "F6", "G7"];
    let chat = ScriptedChat::new(vec![("big menu", dishes_json(&seven))]);
    let generator = RecordingGenerator::new(None);
    let p = build(chat, generator.clone(), Arc::new(Recorder::default()));

    let state = p.run(menu("big menu")).await;

    let names: Vec<&str> = state.dishes().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, &seven[..SLOT_COUNT]);
    assert_eq!(generator.calls().len(), SLOT_COUNT);
}

#[tokio::test(start_paused = true)]
async fn fenced_reply_is_accepted() {
    let reply = format!("```json\n{}\n```", dishes_json(&FIVE));
    let chat = ScriptedChat::new(vec![("menu", reply)]);
    let p = build(chat, RecordingGenerator::new(None), Arc::new(Recorder::default()));

    let state = p.run(menu("menu")).await;
    assert_eq!(state.stage(), Stage::Complete);
    assert_eq!(state.dishes().len(), 5);
    assert_eq!(state.dishes()[0].description, "Ramen, freshly made");
}

// ── Uniform strategy ─────────────────────────────────────────────────────────

#[tokio::test]
async fn uniform_batch_is_one_request_for_five() {
    let chat = ScriptedChat::new(vec![("pho only", dishes_json(&["Pho"; 5]))]);
    let generator = RecordingGenerator::new(None);
    let recorder = Arc::new(Recorder::default());
    let p = build(chat, generator.clone(), recorder.clone());

    let state = p.run(menu("pho only")).await;

    let calls = generator.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].n, 5);
    assert!(calls[0].prompt.contains("Pho"));

    let images: Vec<Option<&str>> = state.images();
    let expected: Vec<String> = (0..5).map(|i| format!("https://img.test/1/{i}.png")).collect();
    assert_eq!(
        images,
        expected.iter().map(|s| Some(s.as_str())).collect::<Vec<_>>()
    );
    assert!(state.slots().iter().all(|s| !s.errored));
    assert!(recorder
        .events()
        .contains(&Event::RunComplete(state.run(), 5, 5)));
}

#[tokio::test]
async fn uniform_failure_errors_every_slot() {
    let chat = ScriptedChat::new(vec![("pho only", dishes_json(&["Pho"; 5]))]);
    let generator = RecordingGenerator::new(Some("Pho"));
    let recorder = Arc::new(Recorder::default());
    let p = build(chat, generator.clone(), recorder.clone());

    let state = p.run(menu("pho only")).await;

    assert_eq!(generator.calls().len(), 1);
    assert_eq!(state.stage(), Stage::Complete);
    assert!(state.slots().iter().all(|s| s.errored && s.image.is_none()));
    let errors = recorder
        .events()
        .iter()
        .filter(|e| matches!(e, Event::SlotError(..)))
        .count();
    assert_eq!(errors, 5);
}

// ── Staggered strategy ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn staggered_requests_are_spaced_and_isolated() {
    let chat = ScriptedChat::new(vec![("izakaya", dishes_json(&FIVE))]);
    let generator = RecordingGenerator::new(Some("Takoyaki"));
    let recorder = Arc::new(Recorder::default());
    let p = build(chat, generator.clone(), recorder.clone());

    let state = p.run(menu("izakaya")).await;

    let calls = generator.calls();
    assert_eq!(calls.len(), 5);
    for (i, name) in FIVE.iter().enumerate() {
        let call = calls
            .iter()
            .find(|c| c.prompt.contains(name))
            .expect("one request per dish");
        assert_eq!(call.n, 1);
        assert!(
            call.at >= Duration::from_millis(500 * i as u64),
            "request {i} started at {:?}",
            call.at
        );
    }

    assert_eq!(state.stage(), Stage::Complete);
    for (i, slot) in state.slots().iter().enumerate() {
        if i == 2 {
            assert!(slot.errored);
            assert!(slot.image.is_none());
        } else {
            assert!(!slot.errored);
            assert!(slot.image.is_some(), "slot {i} should have an image");
        }
    }
    assert!(recorder.events().contains(&Event::SlotError(state.run(), 2)));
    assert!(recorder
        .events()
        .contains(&Event::RunComplete(state.run(), 4, 5)));
}

#[tokio::test(start_paused = true)]
async fn staggered_slots_reveal_progressively() {
    let chat = ScriptedChat::new(vec![("izakaya", dishes_json(&FIVE))]);
    let p = build(
        chat,
        RecordingGenerator::new(None),
        Arc::new(Recorder::default()),
    );

    let handle = p.submit(menu("izakaya"));
    // Past the first request, well before the last one.
    tokio::time::sleep(Duration::from_millis(750)).await;
    let mid = p.snapshot();
    assert_eq!(mid.stage(), Stage::SynthesizingImages);
    assert!(mid.slots()[0].image.is_some());
    assert!(mid.slots()[4].is_pending());

    handle.finished().await.unwrap();
    assert!(p.snapshot().slots().iter().all(|s| s.image.is_some()));
}

/// Never answers for dishes named "Slow"; answers at once otherwise.
struct StallingGenerator;

#[async_trait]
impl ImageGenerator for StallingGenerator {
    async fn generate(&self, prompt: &str, n: usize) -> Result<Vec<String>, SynthesisError> {
        if prompt.contains("Slow") {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(vec!["https://img.test/ok.png".into(); n])
    }
}

#[tokio::test(start_paused = true)]
async fn hung_image_requests_time_out_per_slot() {
    let names = ["Slow Stew", "Slow Roast", "Salad", "Soup", "Sorbet"];
    let chat = ScriptedChat::new(vec![("bistro", dishes_json(&names))]);
    let recorder = Arc::new(Recorder::default());
    let config = PipelineConfig::builder()
        .request_timeout_secs(2)
        .observer(recorder.clone() as Arc<dyn PipelineObserver>)
        .build()
        .unwrap();
    let p = MenuPipeline::with_backends(
        &config,
        Arc::new(EchoOcr),
        chat,
        Arc::new(StallingGenerator),
    );

    let state = p.run(menu("bistro")).await;

    assert_eq!(state.stage(), Stage::Complete);
    assert!(!state.processing());
    for (i, slot) in state.slots().iter().enumerate() {
        if i < 2 {
            assert!(slot.errored, "slot {i} should have timed out");
            assert!(slot.image.is_none());
        } else {
            assert!(!slot.errored);
            assert!(slot.image.is_some(), "slot {i} should have an image");
        }
    }
    let events = recorder.events();
    assert!(events.contains(&Event::SlotError(state.run(), 0)));
    assert!(events.contains(&Event::SlotError(state.run(), 1)));
    assert!(events.contains(&Event::RunComplete(state.run(), 3, 5)));
}

// ── Run identity ─────────────────────────────────────────────────────────────

/// Holds every request for the old menu until released.
struct GatedGenerator {
    gate: Semaphore,
    started: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl ImageGenerator for GatedGenerator {
    async fn generate(&self, prompt: &str, n: usize) -> Result<Vec<String>, SynthesisError> {
        let _ = self.started.send(prompt.to_string());
        if prompt.contains("Old") {
            let _permit = self.gate.acquire().await.map_err(|e| {
                SynthesisError::RequestFailed {
                    detail: e.to_string(),
                }
            })?;
            return Ok(vec!["https://img.test/stale.png".into(); n]);
        }
        Ok(vec!["https://img.test/fresh.png".into(); n])
    }
}

#[tokio::test]
async fn superseded_run_never_writes_into_new_slots() {
    let old = ["Old Curry", "Old Naan", "Old Dal", "Old Lassi", "Old Kulfi"];
    let new = ["New Taco", "New Elote", "New Mole", "New Pozole", "New Flan"];
    let chat = ScriptedChat::new(vec![
        ("first menu", dishes_json(&old)),
        ("second menu", dishes_json(&new)),
    ]);
    let (tx, mut started) = mpsc::unbounded_channel();
    let generator = Arc::new(GatedGenerator {
        gate: Semaphore::new(0),
        started: tx,
    });
    let recorder = Arc::new(Recorder::default());
    let config = PipelineConfig::builder()
        .stagger_ms(0)
        .observer(recorder.clone() as Arc<dyn PipelineObserver>)
        .build()
        .unwrap();
    let p = MenuPipeline::with_backends(&config, Arc::new(EchoOcr), chat, generator.clone());

    let first = p.submit(menu("first menu"));
    let prompt = started.recv().await.unwrap();
    assert!(prompt.contains("Old"));

    let second = p.submit(menu("second menu"));
    second.finished().await.unwrap();

    // Release the stale requests and let the old run drain.
    generator.gate.add_permits(SLOT_COUNT);
    first.finished().await.unwrap();

    let state = p.snapshot();
    assert_eq!(state.run(), RunId(2));
    assert_eq!(state.stage(), Stage::Complete);
    let names: Vec<&str> = state.dishes().iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, new);
    assert!(state
        .images()
        .iter()
        .all(|i| *i == Some("https://img.test/fresh.png")));

    assert!(recorder.events().iter().all(|e| match e {
        Event::SlotComplete(run, _) | Event::SlotError(run, _) => *run == RunId(2),
        Event::RunComplete(run, ..) => *run == RunId(2),
        Event::StageFailed(..) => false,
    }));
}

// ── Demonstration set ────────────────────────────────────────────────────────

#[tokio::test]
async fn view_examples_is_fixed_and_flag_free() {
    let chat = ScriptedChat::new(vec![("not food", "ERROR".into())]);
    let p = build(
        chat,
        RecordingGenerator::new(None),
        Arc::new(Recorder::default()),
    );

    p.view_examples();
    let fresh = p.snapshot();

    let failed = p.run(menu("not food")).await;
    assert_eq!(failed.stage(), Stage::NotAMenu);

    p.view_examples();
    let after_failure = p.snapshot();

    for state in [&fresh, &after_failure] {
        assert_eq!(state.stage(), Stage::Complete);
        assert!(!state.ocr_in_progress());
        assert!(!state.processing());
        assert!(state.ocr_error().is_none());
        assert!(state.process_error().is_none());
        assert!(state.text().is_none());
        assert_eq!(state.dishes().len(), SLOT_COUNT);
    }
    assert_eq!(fresh.slots(), after_failure.slots());
}

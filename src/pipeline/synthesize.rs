//! Image synthesis: one generated photo per dish, revealed slot by slot.
//!
//! ## Strategies
//!
//! [`SynthesisStrategy`] is chosen once per batch:
//!
//! - **Uniform** — every dish has the same name, so a single request with
//!   `n = dishes.len()` covers them all. Success fills every slot in service
//!   order; failure marks every slot errored in one write.
//! - **Staggered** — one `n = 1` request per dish. Request `i` starts
//!   `i × stagger` after the batch start so a rate-limited endpoint never sees
//!   a burst. Completions arrive in any order and each is applied to its own
//!   slot immediately.
//!
//! In both cases a failure is scoped to its slot(s); [`ImageSynthesizer::synthesize`]
//! itself never fails.

use crate::error::SynthesisError;
use crate::menu::DishRecord;
use crate::pipeline::images::ImageGenerator;
use crate::prompts::dish_image_prompt;
use futures::future::join_all;
use std::sync::Arc;
use tokio::time::{sleep_until, timeout, Duration, Instant};
use tracing::{debug, info, warn};

/// Result for one slot: an image URL or the reason there is none.
pub type SlotOutcome = Result<String, SynthesisError>;

/// Receives slot results as they settle.
///
/// Any `Fn(usize, &SlotOutcome)` closure is a sink. The orchestrator's sink
/// also overrides [`SlotSink::on_batch`] so the uniform strategy lands as a
/// single state write.
pub trait SlotSink: Send + Sync {
    /// The request covering `index` was sent.
    fn on_request_start(&self, index: usize) {
        let _ = index;
    }

    /// Slot `index` settled.
    fn on_slot(&self, index: usize, outcome: &SlotOutcome);

    /// Slots `0..outcomes.len()` settled together.
    fn on_batch(&self, outcomes: &[SlotOutcome]) {
        for (index, outcome) in outcomes.iter().enumerate() {
            self.on_slot(index, outcome);
        }
    }
}

impl<F> SlotSink for F
where
    F: Fn(usize, &SlotOutcome) + Send + Sync,
{
    fn on_slot(&self, index: usize, outcome: &SlotOutcome) {
        self(index, outcome)
    }
}

/// How a batch of dishes is turned into image requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisStrategy {
    /// One request for `n` images of the single repeated dish.
    Uniform,
    /// One delayed request per dish.
    Staggered,
}

impl SynthesisStrategy {
    /// Uniform when every dish name is identical, staggered otherwise.
    pub fn select(dishes: &[DishRecord]) -> Self {
        match dishes.split_first() {
            Some((first, rest)) if rest.iter().all(|d| d.name == first.name) => {
                SynthesisStrategy::Uniform
            }
            _ => SynthesisStrategy::Staggered,
        }
    }
}

/// Drives an [`ImageGenerator`] for a batch of dishes.
pub struct ImageSynthesizer {
    generator: Arc<dyn ImageGenerator>,
    stagger: Duration,
    timeout: Duration,
}

impl ImageSynthesizer {
    pub fn new(generator: Arc<dyn ImageGenerator>, stagger: Duration, timeout: Duration) -> Self {
        Self {
            generator,
            stagger,
            timeout,
        }
    }

    /// Generate one image per dish, reporting each slot to `sink` as soon as
    /// it settles. Resolves after every request has settled and returns the
    /// final URL (or `None`) per slot, in dish order.
    pub async fn synthesize(
        &self,
        dishes: &[DishRecord],
        sink: &dyn SlotSink,
    ) -> Vec<Option<String>> {
        if dishes.is_empty() {
            return Vec::new();
        }

        let strategy = SynthesisStrategy::select(dishes);
        info!(
            "Synthesizing {} images ({:?} strategy)",
            dishes.len(),
            strategy
        );

        match strategy {
            SynthesisStrategy::Uniform => self.uniform(dishes, sink).await,
            SynthesisStrategy::Staggered => self.staggered(dishes, sink).await,
        }
    }

    async fn uniform(&self, dishes: &[DishRecord], sink: &dyn SlotSink) -> Vec<Option<String>> {
        let n = dishes.len();
        let prompt = dish_image_prompt(&dishes[0].name);
        for index in 0..n {
            sink.on_request_start(index);
        }

        let outcomes: Vec<SlotOutcome> = match self.request(&prompt, n).await {
            Ok(urls) => {
                let mut urls = urls.into_iter();
                (0..n)
                    .map(|slot| urls.next().ok_or(SynthesisError::MissingImage { slot }))
                    .collect()
            }
            Err(e) => {
                warn!("Uniform image request failed for all {} slots: {}", n, e);
                vec![Err(e); n]
            }
        };

        sink.on_batch(&outcomes);
        outcomes.into_iter().map(Result::ok).collect()
    }

    async fn staggered(&self, dishes: &[DishRecord], sink: &dyn SlotSink) -> Vec<Option<String>> {
        let batch_start = Instant::now();

        let slots = dishes.iter().enumerate().map(|(index, dish)| async move {
            sleep_until(batch_start + self.stagger * index as u32).await;
            sink.on_request_start(index);
            debug!("Slot {}: requesting image for '{}'", index, dish.name);

            let outcome = self
                .request(&dish_image_prompt(&dish.name), 1)
                .await
                .and_then(|urls| {
                    urls.into_iter()
                        .next()
                        .ok_or(SynthesisError::MissingImage { slot: index })
                });

            if let Err(ref e) = outcome {
                warn!("Slot {}: image for '{}' failed — {}", index, dish.name, e);
            }
            sink.on_slot(index, &outcome);
            outcome.ok()
        });

        join_all(slots).await
    }

    async fn request(&self, prompt: &str, n: usize) -> Result<Vec<String>, SynthesisError> {
        timeout(self.timeout, self.generator.generate(prompt, n))
            .await
            .map_err(|_| SynthesisError::Timeout {
                secs: self.timeout.as_secs(),
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn dish(name: &str) -> DishRecord {
        DishRecord::new(name, "")
    }

    #[test]
    fn identical_names_select_uniform() {
        let same = vec![dish("Pho"), dish("Pho"), dish("Pho")];
        assert_eq!(SynthesisStrategy::select(&same), SynthesisStrategy::Uniform);
    }

    #[test]
    fn differing_names_select_staggered() {
        let mixed = vec![dish("Pho"), dish("Banh Mi"), dish("Pho")];
        assert_eq!(SynthesisStrategy::select(&mixed), SynthesisStrategy::Staggered);
    }

    struct Fails;

    #[async_trait]
    impl ImageGenerator for Fails {
        async fn generate(&self, _prompt: &str, _n: usize) -> Result<Vec<String>, SynthesisError> {
            Err(SynthesisError::RequestFailed {
                detail: "503".into(),
            })
        }
    }

    struct Short;

    #[async_trait]
    impl ImageGenerator for Short {
        async fn generate(&self, _prompt: &str, _n: usize) -> Result<Vec<String>, SynthesisError> {
            Ok(vec!["https://img/0".into(), "https://img/1".into()])
        }
    }

    #[tokio::test]
    async fn empty_batch_makes_no_requests() {
        let synth = ImageSynthesizer::new(Arc::new(Fails), Duration::ZERO, Duration::from_secs(1));
        let sink = |_: usize, _: &SlotOutcome| panic!("no slot expected");
        assert!(synth.synthesize(&[], &sink).await.is_empty());
    }

    #[tokio::test]
    async fn uniform_short_response_errors_missing_slots() {
        let synth = ImageSynthesizer::new(Arc::new(Short), Duration::ZERO, Duration::from_secs(1));
        let seen = Mutex::new(Vec::new());
        let sink = |i: usize, o: &SlotOutcome| seen.lock().unwrap().push((i, o.is_ok()));
        let dishes = vec![dish("Pho"); 3];

        let urls = synth.synthesize(&dishes, &sink).await;
        assert_eq!(
            urls,
            vec![Some("https://img/0".into()), Some("https://img/1".into()), None]
        );
        assert_eq!(*seen.lock().unwrap(), vec![(0, true), (1, true), (2, false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn staggered_failures_return_none() {
        let synth = ImageSynthesizer::new(
            Arc::new(Fails),
            Duration::from_millis(500),
            Duration::from_secs(5),
        );
        let errors = Mutex::new(0usize);
        let sink = |_: usize, o: &SlotOutcome| {
            if o.is_err() {
                *errors.lock().unwrap() += 1;
            }
        };
        let urls = synth
            .synthesize(&[dish("a"), dish("b")], &sink)
            .await;
        assert_eq!(urls, vec![None, None]);
        assert_eq!(*errors.lock().unwrap(), 2);
    }

    struct Hangs;

    #[async_trait]
    impl ImageGenerator for Hangs {
        async fn generate(&self, _prompt: &str, _n: usize) -> Result<Vec<String>, SynthesisError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(vec!["https://img/late".into()])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_request_settles_slot_as_timeout() {
        let synth = ImageSynthesizer::new(Arc::new(Hangs), Duration::ZERO, Duration::from_secs(2));
        let seen = Mutex::new(Vec::new());
        let sink = |i: usize, o: &SlotOutcome| seen.lock().unwrap().push((i, o.clone()));

        let urls = synth.synthesize(&[dish("Pho"), dish("Laksa")], &sink).await;
        assert_eq!(urls, vec![None, None]);

        let mut seen = seen.into_inner().unwrap();
        seen.sort_by_key(|(i, _)| *i);
        assert_eq!(
            seen,
            vec![
                (0, Err(SynthesisError::Timeout { secs: 2 })),
                (1, Err(SynthesisError::Timeout { secs: 2 })),
            ]
        );
    }
}

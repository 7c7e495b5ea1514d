//! Pipeline state: run identity, stage machine, and the five dish slots.
//!
//! [`PipelineState`] is owned by [`crate::orchestrator::MenuPipeline`] behind a
//! mutex. Every mutation takes the [`RunId`] of the writer and is applied only
//! if that run is still the active one, so results from a superseded image are
//! dropped instead of leaking into the new run's slots.
//!
//! Writes are crate-private: only the orchestrator mutates the state, and
//! callers read it through snapshots. Writers touch only the slot or stage
//! they own. The two whole-collection writes are `begin_run` (reset on a new
//! image) and `apply_all_slots` (uniform-strategy outcome).

use crate::error::{MenuError, SynthesisError};
use crate::menu::{DishRecord, ExtractedText};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of dish slots shown to the user.
pub const SLOT_COUNT: usize = 5;

/// Identity of one end-to-end pipeline run. Strictly increasing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl RunId {
    pub fn next(self) -> Self {
        RunId(self.0 + 1)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run#{}", self.0)
    }
}

/// Where a run currently stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    ExtractingText,
    ExtractionFailed,
    TextExtracted,
    ParsingDishes,
    NotAMenu,
    ParseFailed,
    DishesParsed,
    SynthesizingImages,
    Complete,
}

impl Stage {
    /// Terminal stages: nothing further happens until a new image arrives.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Stage::ExtractionFailed | Stage::NotAMenu | Stage::ParseFailed | Stage::Complete
        )
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Stage::ExtractionFailed | Stage::NotAMenu | Stage::ParseFailed
        )
    }
}

/// One of the fixed result positions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DishSlot {
    pub dish: Option<DishRecord>,
    pub image: Option<String>,
    pub errored: bool,
}

impl DishSlot {
    /// Neither an image nor an error yet.
    pub fn is_pending(&self) -> bool {
        self.image.is_none() && !self.errored
    }

    fn settle(&mut self, outcome: &Result<String, SynthesisError>) {
        match outcome {
            Ok(url) => {
                self.image = Some(url.clone());
                self.errored = false;
            }
            Err(_) => {
                self.image = None;
                self.errored = true;
            }
        }
    }
}

/// Everything the presentation layer reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    run: RunId,
    stage: Stage,
    text: Option<ExtractedText>,
    slots: [DishSlot; SLOT_COUNT],
    ocr_in_progress: bool,
    ocr_error: Option<String>,
    processing: bool,
    process_error: Option<String>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            run: RunId::default(),
            stage: Stage::Idle,
            text: None,
            slots: Default::default(),
            ocr_in_progress: false,
            ocr_error: None,
            processing: false,
            process_error: None,
        }
    }
}

impl PipelineState {
    // ── Read access ──────────────────────────────────────────────────────

    pub fn run(&self) -> RunId {
        self.run
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn text(&self) -> Option<&ExtractedText> {
        self.text.as_ref()
    }

    pub fn has_text(&self) -> bool {
        self.text.is_some()
    }

    pub fn slots(&self) -> &[DishSlot; SLOT_COUNT] {
        &self.slots
    }

    pub fn ocr_in_progress(&self) -> bool {
        self.ocr_in_progress
    }

    pub fn ocr_error(&self) -> Option<&str> {
        self.ocr_error.as_deref()
    }

    pub fn processing(&self) -> bool {
        self.processing
    }

    pub fn process_error(&self) -> Option<&str> {
        self.process_error.as_deref()
    }

    /// Dish records currently held by the slots, in slot order.
    pub fn dishes(&self) -> Vec<&DishRecord> {
        self.slots.iter().filter_map(|s| s.dish.as_ref()).collect()
    }

    /// Image URLs (or `None`) for every slot that holds a dish.
    pub fn images(&self) -> Vec<Option<&str>> {
        self.slots
            .iter()
            .filter(|s| s.dish.is_some())
            .map(|s| s.image.as_deref())
            .collect()
    }

    // ── Whole-state writes ───────────────────────────────────────────────

    /// Reset everything for a fresh run and enter `ExtractingText`.
    pub(crate) fn begin_run(&mut self, run: RunId) {
        *self = PipelineState {
            run,
            stage: Stage::ExtractingText,
            ocr_in_progress: true,
            ..PipelineState::default()
        };
    }

    /// Replace the state with a finished demonstration set under a new run.
    pub(crate) fn load_complete(&mut self, run: RunId, entries: &[(DishRecord, String)]) {
        *self = PipelineState {
            run,
            stage: Stage::Complete,
            ..PipelineState::default()
        };
        for (slot, (dish, url)) in self.slots.iter_mut().zip(entries) {
            slot.dish = Some(dish.clone());
            slot.image = Some(url.clone());
        }
    }

    // ── Per-stage writes (guarded by run identity) ───────────────────────

    pub(crate) fn record_text(&mut self, run: RunId, text: ExtractedText) -> bool {
        if run != self.run {
            return false;
        }
        self.text = Some(text);
        self.ocr_in_progress = false;
        self.stage = Stage::TextExtracted;
        true
    }

    pub(crate) fn fail_extraction(&mut self, run: RunId, error: &MenuError) -> bool {
        if run != self.run {
            return false;
        }
        self.ocr_in_progress = false;
        self.ocr_error = Some(error.user_message());
        self.stage = Stage::ExtractionFailed;
        true
    }

    pub(crate) fn start_parsing(&mut self, run: RunId) -> bool {
        if run != self.run {
            return false;
        }
        self.processing = true;
        self.process_error = None;
        self.stage = Stage::ParsingDishes;
        true
    }

    /// Place parsed dishes into slots `0..dishes.len()`.
    ///
    /// Callers truncate to [`SLOT_COUNT`] beforehand; extra records are
    /// ignored here as well.
    pub(crate) fn record_dishes(&mut self, run: RunId, dishes: &[DishRecord]) -> bool {
        if run != self.run {
            return false;
        }
        for (slot, dish) in self.slots.iter_mut().zip(dishes) {
            slot.dish = Some(dish.clone());
            slot.image = None;
            slot.errored = false;
        }
        self.stage = Stage::DishesParsed;
        true
    }

    pub(crate) fn fail_parse(&mut self, run: RunId, error: &MenuError) -> bool {
        if run != self.run {
            return false;
        }
        self.processing = false;
        self.process_error = Some(error.user_message());
        self.stage = match error {
            MenuError::NotAMenu => Stage::NotAMenu,
            _ => Stage::ParseFailed,
        };
        true
    }

    pub(crate) fn start_synthesis(&mut self, run: RunId) -> bool {
        if run != self.run {
            return false;
        }
        self.stage = Stage::SynthesizingImages;
        true
    }

    /// Read-modify-write of one slot; siblings are left untouched.
    pub(crate) fn apply_slot(
        &mut self,
        run: RunId,
        index: usize,
        outcome: &Result<String, SynthesisError>,
    ) -> bool {
        if run != self.run {
            return false;
        }
        match self.slots.get_mut(index) {
            Some(slot) => {
                slot.settle(outcome);
                true
            }
            None => false,
        }
    }

    /// Settle several slots in one write (uniform strategy).
    pub(crate) fn apply_all_slots(
        &mut self,
        run: RunId,
        outcomes: &[Result<String, SynthesisError>],
    ) -> bool {
        if run != self.run {
            return false;
        }
        for (slot, outcome) in self.slots.iter_mut().zip(outcomes) {
            slot.settle(outcome);
        }
        true
    }

    pub(crate) fn complete(&mut self, run: RunId) -> bool {
        if run != self.run {
            return false;
        }
        self.processing = false;
        self.stage = Stage::Complete;
        true
    }
}

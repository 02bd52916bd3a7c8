use std::collections::VecDeque;

use crate::canvas::{LayerId, PixelBuffer};
use crate::error::EditError;
use crate::events::{EditEvent, EventSink};
use crate::selection::SelectedArea;
use crate::settings::EditorSettings;
use crate::workspace::Workspace;
use crate::{log_err, log_info};

// ============================================================================
// HISTORY STEP TRAIT
// ============================================================================

/// A reversible record of one edit.
///
/// `undo` and `redo` must be exact inverses: applying either one restores the
/// workspace state observed on the other side of the step, and applying the
/// same one twice in a row is not something `History` ever does.
pub trait HistoryStep: Send + Sync {
    fn undo(&self, workspace: &mut Workspace);
    fn redo(&self, workspace: &mut Workspace);
    fn description(&self) -> String;
    fn memory_size(&self) -> usize;
}

type StepFn = Box<dyn Fn(&mut Workspace) + Send + Sync>;

// ============================================================================
// GENERIC STEP - caller-supplied forward/backward actions
// ============================================================================

/// Step built from two closures, used for structural edits (layer add,
/// delete, reorder, rename...) where the state to restore is small.
pub struct GenericStep {
    description: String,
    redo: StepFn,
    undo: StepFn,
    memory: usize,
}

impl GenericStep {
    pub fn new<R, U>(description: impl Into<String>, redo: R, undo: U) -> Self
    where
        R: Fn(&mut Workspace) + Send + Sync + 'static,
        U: Fn(&mut Workspace) + Send + Sync + 'static,
    {
        Self {
            description: description.into(),
            redo: Box::new(redo),
            undo: Box::new(undo),
            memory: 0,
        }
    }

    /// Report the bytes captured by the closures so the history memory cap
    /// accounts for them.
    pub fn with_memory_size(mut self, bytes: usize) -> Self {
        self.memory = bytes;
        self
    }
}

impl HistoryStep for GenericStep {
    fn undo(&self, workspace: &mut Workspace) {
        (self.undo)(workspace);
    }

    fn redo(&self, workspace: &mut Workspace) {
        (self.redo)(workspace);
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.description.len() + self.memory
    }
}

// ============================================================================
// EDIT LAYER STEP - before/after pixels of one layer
// ============================================================================

pub struct EditLayerStep {
    description: String,
    layer: LayerId,
    before: PixelBuffer,
    after: PixelBuffer,
}

impl EditLayerStep {
    pub fn new(description: impl Into<String>, layer: LayerId, before: PixelBuffer, after: PixelBuffer) -> Self {
        Self {
            description: description.into(),
            layer,
            before,
            after,
        }
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn before(&self) -> &PixelBuffer {
        &self.before
    }

    pub fn after(&self) -> &PixelBuffer {
        &self.after
    }

    /// True when the edit left the layer unchanged (e.g. an empty selection).
    pub fn is_noop(&self) -> bool {
        self.before == self.after
    }

    fn restore(&self, workspace: &mut Workspace, pixels: &PixelBuffer) {
        if let Err(e) = workspace.replace_layer_pixels(self.layer, pixels.clone()) {
            log_err!("History: cannot restore '{}' on layer {}: {}", self.description, self.layer, e);
            debug_assert!(false, "edit step replayed against a missing layer: {}", e);
        }
    }
}

impl HistoryStep for EditLayerStep {
    fn undo(&self, workspace: &mut Workspace) {
        self.restore(workspace, &self.before);
    }

    fn redo(&self, workspace: &mut Workspace) {
        self.restore(workspace, &self.after);
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.before.memory_bytes() + self.after.memory_bytes()
    }
}

// ============================================================================
// EDIT SELECTION STEP - before/after selection masks
// ============================================================================

pub struct EditSelectionStep {
    description: String,
    before: SelectedArea,
    after: SelectedArea,
}

impl EditSelectionStep {
    pub fn new(description: impl Into<String>, before: SelectedArea, after: SelectedArea) -> Self {
        Self {
            description: description.into(),
            before,
            after,
        }
    }

    pub fn before(&self) -> &SelectedArea {
        &self.before
    }

    pub fn after(&self) -> &SelectedArea {
        &self.after
    }

    fn restore(&self, workspace: &mut Workspace, area: &SelectedArea) {
        // A fresh clone carries no cached frontier, so the restored selection
        // always recomputes it on demand.
        if let Err(e) = workspace.set_selection(area.clone()) {
            log_err!("History: cannot restore selection for '{}': {}", self.description, e);
            debug_assert!(false, "selection step replayed with a mismatched mask: {}", e);
        }
    }
}

impl HistoryStep for EditSelectionStep {
    fn undo(&self, workspace: &mut Workspace) {
        self.restore(workspace, &self.before);
    }

    fn redo(&self, workspace: &mut Workspace) {
        self.restore(workspace, &self.after);
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.before.as_raw().len() + self.after.as_raw().len()
    }
}

// ============================================================================
// HISTORY - ordered steps with a cursor
// ============================================================================

/// Steps `[0, cursor)` are applied, steps `[cursor, len)` are undone and
/// available for redo.  Pushing a step discards everything at or past the
/// cursor.
pub struct History {
    steps: VecDeque<Box<dyn HistoryStep>>,
    cursor: usize,
    max_steps: usize,
    /// Optional memory cap in bytes.
    max_memory_bytes: Option<usize>,
    /// Running memory total across all steps.
    total_memory: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(50)
    }
}

impl std::fmt::Debug for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("History")
            .field("len", &self.steps.len())
            .field("cursor", &self.cursor)
            .field("total_memory", &self.total_memory)
            .finish()
    }
}

impl History {
    pub fn new(max_steps: usize) -> Self {
        Self {
            steps: VecDeque::new(),
            cursor: 0,
            max_steps: max_steps.max(1),
            max_memory_bytes: Some(100 * 1024 * 1024), // 100 MB default limit
            total_memory: 0,
        }
    }

    /// `max_history_mb = 0` disables the memory cap.
    pub fn from_settings(settings: &EditorSettings) -> Self {
        let mut history = Self::new(settings.max_undo_steps);
        history.max_memory_bytes = match settings.max_history_mb {
            0 => None,
            mb => Some(mb.saturating_mul(1024 * 1024)),
        };
        history
    }

    pub fn with_memory_limit(mut self, bytes: Option<usize>) -> Self {
        self.max_memory_bytes = bytes;
        self
    }

    /// Record a step that has already been applied to the workspace.
    pub fn push_step(&mut self, step: Box<dyn HistoryStep>) {
        for dropped in self.steps.drain(self.cursor..) {
            self.total_memory = self.total_memory.saturating_sub(dropped.memory_size());
        }

        log_info!("History: push '{}'", step.description());
        self.total_memory += step.memory_size();
        self.steps.push_back(step);
        self.cursor = self.steps.len();

        self.prune();
    }

    /// Revert the step just before the cursor and return its description.
    pub fn undo(&mut self, workspace: &mut Workspace) -> Result<String, EditError> {
        if self.cursor == 0 {
            return Err(EditError::NothingToUndo);
        }
        self.cursor -= 1;
        let step = &self.steps[self.cursor];
        let description = step.description();
        step.undo(workspace);
        log_info!("History: undo '{}'", description);
        Ok(description)
    }

    /// Re-apply the step at the cursor and return its description.
    pub fn redo(&mut self, workspace: &mut Workspace) -> Result<String, EditError> {
        let Some(step) = self.steps.get(self.cursor) else {
            return Err(EditError::NothingToRedo);
        };
        let description = step.description();
        step.redo(workspace);
        self.cursor += 1;
        log_info!("History: redo '{}'", description);
        Ok(description)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.steps.len()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.cursor.checked_sub(1).map(|i| self.steps[i].description())
    }

    pub fn redo_description(&self) -> Option<String> {
        self.steps.get(self.cursor).map(|s| s.description())
    }

    /// Get all undo descriptions (most recent first)
    pub fn undo_history(&self) -> Vec<String> {
        self.steps.iter().take(self.cursor).rev().map(|s| s.description()).collect()
    }

    /// Descriptions of every recorded step, oldest first.
    pub fn descriptions(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.description()).collect()
    }

    /// Undo `count` steps, stopping early at the start of history.  Returns
    /// how many were actually undone.
    pub fn undo_to(&mut self, count: usize, workspace: &mut Workspace) -> usize {
        let mut undone = 0;
        while undone < count && self.undo(workspace).is_ok() {
            undone += 1;
        }
        undone
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.cursor
    }

    pub fn redo_count(&self) -> usize {
        self.steps.len() - self.cursor
    }

    /// Get the current memory usage of the history (O(1) via cached total)
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    pub fn clear(&mut self) {
        self.steps.clear();
        self.cursor = 0;
        self.total_memory = 0;
    }

    /// Drop the oldest steps to stay within limits.  Only runs right after a
    /// push, when the cursor sits at the end, so only applied steps go.
    fn prune(&mut self) {
        while self.steps.len() > self.max_steps {
            self.pop_oldest();
        }

        if let Some(max_bytes) = self.max_memory_bytes {
            while self.total_memory > max_bytes && self.steps.len() > 1 {
                self.pop_oldest();
            }
        }
    }

    fn pop_oldest(&mut self) {
        if let Some(removed) = self.steps.pop_front() {
            log_info!("History: pruned '{}'", removed.description());
            self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            self.cursor = self.cursor.saturating_sub(1);
        }
    }
}

/// A history listens for `HistorySaveStep` and records the step; other
/// notifications are display concerns it ignores.
impl EventSink for History {
    fn emit(&mut self, event: EditEvent) {
        if let EditEvent::HistorySaveStep(step) = event {
            self.push_step(step);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Layer;
    use image::Rgba;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counter_step(counter: &Arc<AtomicI32>, label: &str) -> Box<dyn HistoryStep> {
        let up = Arc::clone(counter);
        let down = Arc::clone(counter);
        Box::new(GenericStep::new(
            label,
            move |_: &mut Workspace| {
                up.fetch_add(1, Ordering::SeqCst);
            },
            move |_: &mut Workspace| {
                down.fetch_sub(1, Ordering::SeqCst);
            },
        ))
    }

    #[test]
    fn empty_history_signals_both_boundaries() {
        let mut ws = Workspace::new(2, 2).unwrap();
        let mut history = History::default();
        assert!(matches!(history.undo(&mut ws), Err(EditError::NothingToUndo)));
        assert!(matches!(history.redo(&mut ws), Err(EditError::NothingToRedo)));
    }

    #[test]
    fn cursor_moves_through_steps() {
        let mut ws = Workspace::new(2, 2).unwrap();
        let counter = Arc::new(AtomicI32::new(0));
        let mut history = History::default();
        history.push_step(counter_step(&counter, "a"));
        history.push_step(counter_step(&counter, "b"));
        assert_eq!(history.cursor(), 2);

        assert_eq!(history.undo(&mut ws).unwrap(), "b");
        assert_eq!(history.undo(&mut ws).unwrap(), "a");
        assert_eq!(counter.load(Ordering::SeqCst), -2);
        assert!(history.undo(&mut ws).unwrap_err().is_history_boundary());

        assert_eq!(history.redo(&mut ws).unwrap(), "a");
        assert_eq!(history.redo_description().as_deref(), Some("b"));
        assert_eq!(counter.load(Ordering::SeqCst), -1);
    }

    #[test]
    fn push_after_undo_discards_redo_tail() {
        let mut ws = Workspace::new(2, 2).unwrap();
        let counter = Arc::new(AtomicI32::new(0));
        let mut history = History::default();
        history.push_step(counter_step(&counter, "a"));
        history.push_step(counter_step(&counter, "b"));
        history.undo(&mut ws).unwrap();
        history.push_step(counter_step(&counter, "c"));

        assert_eq!(history.descriptions(), vec!["a", "c"]);
        assert!(!history.can_redo());
        assert_eq!(history.undo_history(), vec!["c", "a"]);
    }

    #[test]
    fn count_limit_drops_oldest() {
        let counter = Arc::new(AtomicI32::new(0));
        let mut history = History::new(3);
        for label in ["a", "b", "c", "d", "e"] {
            history.push_step(counter_step(&counter, label));
        }
        assert_eq!(history.descriptions(), vec!["c", "d", "e"]);
        assert_eq!(history.cursor(), 3);
    }

    #[test]
    fn memory_limit_keeps_at_least_one_step() {
        let mut history = History::new(50).with_memory_limit(Some(1));
        let layer = LayerId::new();
        let px = PixelBuffer::new(8, 8).unwrap();
        history.push_step(Box::new(EditLayerStep::new("one", layer, px.clone(), px.clone())));
        history.push_step(Box::new(EditLayerStep::new("two", layer, px.clone(), px)));
        assert_eq!(history.descriptions(), vec!["two"]);
        assert!(history.memory_usage() > 0);
    }

    #[test]
    fn edit_layer_step_round_trips_pixels() {
        let mut ws = Workspace::new(3, 3).unwrap();
        let id = ws.selected_layer_id().unwrap();
        let before = ws.layer(id).unwrap().pixels.clone();
        let after = PixelBuffer::new_filled(3, 3, Rgba([9, 9, 9, 255])).unwrap();
        ws.replace_layer_pixels(id, after.clone()).unwrap();

        let step = EditLayerStep::new("Paint", id, before.clone(), after.clone());
        step.undo(&mut ws);
        assert_eq!(ws.layer(id).unwrap().pixels, before);
        step.undo(&mut ws);
        assert_eq!(ws.layer(id).unwrap().pixels, before);
        step.redo(&mut ws);
        assert_eq!(ws.layer(id).unwrap().pixels, after);
    }

    #[test]
    fn edit_selection_step_restores_mask_without_stale_frontier() {
        let mut ws = Workspace::new(4, 4).unwrap();
        let before = ws.selection().clone();
        let mut after = before.clone();
        after.select_none();
        after.set(1, 1, 255).unwrap();
        ws.set_selection(after.clone()).unwrap();
        ws.selection_mut().compute_frontier();

        let step = EditSelectionStep::new("Select", before.clone(), after.clone());
        step.undo(&mut ws);
        assert_eq!(ws.selection(), &before);
        assert!(!ws.selection().frontier_is_cached());
        step.redo(&mut ws);
        assert_eq!(ws.selection(), &after);
    }

    #[test]
    fn history_collects_steps_from_events() {
        let mut ws = Workspace::new(2, 2).unwrap();
        let mut history = History::default();
        history.emit(EditEvent::LayersChanged);
        assert!(history.is_empty());

        let layer = Layer::new("Extra", 2, 2, Rgba([0, 0, 0, 0])).unwrap();
        let id = layer.id();
        let redo_layer = layer.clone();
        history.emit(EditEvent::HistorySaveStep(Box::new(GenericStep::new(
            "Add Layer",
            move |ws: &mut Workspace| {
                let _ = ws.insert_layer(1, redo_layer.clone());
            },
            move |ws: &mut Workspace| {
                let _ = ws.remove_layer(id);
            },
        ))));
        assert_eq!(history.len(), 1);

        history.undo(&mut ws).unwrap();
        history.redo(&mut ws).unwrap();
        assert_eq!(ws.layers().len(), 2);
        assert_eq!(ws.layers()[1].id(), id);
    }
}

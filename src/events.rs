// ============================================================================
// EVENT EMISSION — how operations publish finished edits
// ============================================================================

use crate::components::history::HistoryStep;

/// Notifications fired by operations.  There may be zero listeners.
pub enum EditEvent {
    /// A completed, already-applied edit ready to be recorded.
    HistorySaveStep(Box<dyn HistoryStep>),
    SelectionChanged,
    LayersChanged,
}

impl EditEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            EditEvent::HistorySaveStep(_) => "historySaveStep",
            EditEvent::SelectionChanged => "selectionChanged",
            EditEvent::LayersChanged => "layersChanged",
        }
    }
}

impl std::fmt::Debug for EditEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditEvent::HistorySaveStep(step) => f.debug_tuple("HistorySaveStep").field(&step.description()).finish(),
            EditEvent::SelectionChanged => f.write_str("SelectionChanged"),
            EditEvent::LayersChanged => f.write_str("LayersChanged"),
        }
    }
}

pub trait EventSink {
    fn emit(&mut self, event: EditEvent);
}

/// Collects events in order, for hosts that dispatch them later.
impl EventSink for Vec<EditEvent> {
    fn emit(&mut self, event: EditEvent) {
        self.push(event);
    }
}

/// Drops every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: EditEvent) {}
}

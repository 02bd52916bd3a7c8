// ============================================================================
// OPERATIONS — stateless tools and effects applied to a workspace
// ============================================================================
//
// Every operation validates its parameters and the workspace before touching
// anything, so a failed `apply` leaves the workspace and the event stream
// exactly as they were.

pub mod filters;
pub mod kernel;
pub mod layers;
pub mod tools;

use crate::canvas::PixelBuffer;
use crate::components::history::EditSelectionStep;
use crate::error::EditError;
use crate::events::{EditEvent, EventSink};
use crate::params::Parameters;
use crate::selection::SelectedArea;
use crate::workspace::Workspace;
use crate::{log_info, log_warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    /// Pixel effect applied to the selected layer.
    Effect,
    /// Direct manipulation: painting, shapes, selections.
    Tool,
    /// Layer stack management.
    Layer,
}

impl Category {
    pub fn name(&self) -> &'static str {
        match self {
            Category::Effect => "effect",
            Category::Tool => "tool",
            Category::Layer => "layer",
        }
    }
}

pub trait Operation: Send + Sync {
    /// Identifier used on the command line and by hosts.
    fn name(&self) -> &'static str;
    /// Human-readable label, also used as the history description.
    fn label(&self) -> &'static str;
    fn category(&self) -> Category;
    /// Parameter descriptors with their default values.
    fn parameters(&self) -> Parameters;
    /// Read the workspace and `params`, mutate the workspace, and publish the
    /// resulting history step (if any) through `events`.
    fn apply(&self, workspace: &mut Workspace, params: &Parameters, events: &mut dyn EventSink) -> Result<(), EditError>;
}

/// Every built-in operation in menu order.
pub fn all_operations() -> Vec<Box<dyn Operation>> {
    vec![
        Box::new(filters::GaussianBlur),
        Box::new(filters::MeanBlur),
        Box::new(filters::InvertColors),
        Box::new(filters::Desaturate),
        Box::new(tools::Fill),
        Box::new(tools::DrawShape),
        Box::new(tools::SelectShape),
        Box::new(tools::SelectAll),
        Box::new(tools::SelectNone),
        Box::new(tools::InvertSelection),
        Box::new(layers::AddLayer),
        Box::new(layers::DeleteLayer),
        Box::new(layers::DuplicateLayer),
        Box::new(layers::MoveLayer),
        Box::new(layers::SetLayerVisibility),
        Box::new(layers::RenameLayer),
    ]
}

pub fn find_operation(name: &str) -> Result<Box<dyn Operation>, EditError> {
    all_operations()
        .into_iter()
        .find(|op| op.name() == name)
        .ok_or_else(|| EditError::UnknownOperation(name.to_string()))
}

/// Run `edit` on a working copy of the selected layer and commit it through
/// the selection mask.  An edit that ends up changing nothing is not
/// recorded.
pub(crate) fn edit_active_layer<F>(
    workspace: &mut Workspace,
    events: &mut dyn EventSink,
    description: &str,
    edit: F,
) -> Result<(), EditError>
where
    F: FnOnce(&mut PixelBuffer) -> Result<(), EditError>,
{
    let working = workspace.begin_gesture()?;
    if let Err(e) = edit(working) {
        workspace.cancel_gesture();
        log_warn!("{} aborted: {}", description, e);
        return Err(e);
    }
    let step = workspace.commit_working_buffer(description)?;
    if step.is_noop() {
        log_info!("{}: nothing changed, not recorded", description);
        return Ok(());
    }
    events.emit(EditEvent::HistorySaveStep(Box::new(step)));
    Ok(())
}

/// Mutate the workspace selection and publish an `EditSelectionStep` when
/// the mask actually changed.
pub(crate) fn edit_selection<F>(workspace: &mut Workspace, events: &mut dyn EventSink, description: &str, edit: F)
where
    F: FnOnce(&mut SelectedArea),
{
    let before = workspace.selection().clone();
    edit(workspace.selection_mut());
    if workspace.selection() == &before {
        log_info!("{}: selection unchanged", description);
        return;
    }
    let after = workspace.selection().clone();
    events.emit(EditEvent::HistorySaveStep(Box::new(EditSelectionStep::new(description, before, after))));
    events.emit(EditEvent::SelectionChanged);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn operation_names_are_unique_and_resolvable() {
        let ops = all_operations();
        let names: HashSet<_> = ops.iter().map(|op| op.name()).collect();
        assert_eq!(names.len(), ops.len());
        for name in names {
            assert_eq!(find_operation(name).unwrap().name(), name);
        }
        assert!(matches!(find_operation("sharpen"), Err(EditError::UnknownOperation(_))));
    }

    #[test]
    fn default_parameters_pass_their_own_bounds() {
        for op in all_operations() {
            for p in op.parameters().iter() {
                p.validate(&p.value).unwrap_or_else(|e| panic!("{}.{}: {}", op.name(), p.name, e));
            }
        }
    }
}

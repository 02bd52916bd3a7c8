// ============================================================================
// LAYER OPERATIONS — stack edits recorded as generic history steps
// ============================================================================
//
// Each operation performs the edit once, then publishes a `GenericStep`
// whose closures replay it against whatever workspace the history hands in.

use super::{Category, Operation};
use crate::canvas::{Layer, LayerId, TRANSPARENT};
use crate::components::history::GenericStep;
use crate::error::EditError;
use crate::events::{EditEvent, EventSink};
use crate::params::{Parameter, Parameters};
use crate::workspace::Workspace;
use crate::{log_err, log_info};

fn publish(events: &mut dyn EventSink, step: GenericStep) {
    events.emit(EditEvent::HistorySaveStep(Box::new(step)));
    events.emit(EditEvent::LayersChanged);
}

/// Replay results are logged, never propagated.
fn replayed<T>(what: &str, result: Result<T, EditError>) {
    if let Err(e) = result {
        log_err!("Replay of '{}' failed: {}", what, e);
    }
}

fn insert_and_select(ws: &mut Workspace, index: usize, layer: &Layer) {
    let id = layer.id();
    replayed("insert layer", ws.insert_layer(index, layer.clone()));
    ws.set_selected_layer(Some(id));
}

fn remove_and_select(ws: &mut Workspace, id: LayerId, select: Option<LayerId>) {
    replayed("remove layer", ws.remove_layer(id));
    ws.set_selected_layer(select);
}

/// New transparent layer above the selected one (or on top).
pub struct AddLayer;

impl Operation for AddLayer {
    fn name(&self) -> &'static str {
        "add-layer"
    }

    fn label(&self) -> &'static str {
        "Add Layer"
    }

    fn category(&self) -> Category {
        Category::Layer
    }

    fn parameters(&self) -> Parameters {
        // Empty name means "Layer N".
        Parameters::new().with(Parameter::text("name", "", 0, 64))
    }

    fn apply(&self, workspace: &mut Workspace, params: &Parameters, events: &mut dyn EventSink) -> Result<(), EditError> {
        params.validate_all()?;
        let name = match params.text("name")? {
            "" => format!("Layer {}", workspace.layers().len() + 1),
            n => n.to_string(),
        };
        let (w, h) = workspace.dimensions();
        let layer = Layer::new(name, w, h, TRANSPARENT)?;
        let id = layer.id();
        let index = workspace
            .selected_layer_index()
            .map_or(workspace.layers().len(), |i| i + 1);
        let previous = workspace.selected_layer_id();

        workspace.insert_layer(index, layer.clone())?;
        workspace.set_selected_layer(Some(id));

        let bytes = layer.pixels.memory_bytes();
        let step = GenericStep::new(
            self.label(),
            move |ws: &mut Workspace| insert_and_select(ws, index, &layer),
            move |ws: &mut Workspace| remove_and_select(ws, id, previous),
        )
        .with_memory_size(bytes);
        publish(events, step);
        Ok(())
    }
}

/// Remove the selected layer.  The last remaining layer cannot be deleted.
pub struct DeleteLayer;

impl Operation for DeleteLayer {
    fn name(&self) -> &'static str {
        "delete-layer"
    }

    fn label(&self) -> &'static str {
        "Delete Layer"
    }

    fn category(&self) -> Category {
        Category::Layer
    }

    fn parameters(&self) -> Parameters {
        Parameters::new()
    }

    fn apply(&self, workspace: &mut Workspace, _params: &Parameters, events: &mut dyn EventSink) -> Result<(), EditError> {
        let layer = workspace.active_layer()?.clone();
        if workspace.layers().len() <= 1 {
            return Err(EditError::invalid_param("layer", "cannot delete the only layer"));
        }
        let id = layer.id();
        let (index, _) = workspace.remove_layer(id)?;
        let now_selected = workspace.selected_layer_id();

        let bytes = layer.pixels.memory_bytes();
        let step = GenericStep::new(
            self.label(),
            move |ws: &mut Workspace| remove_and_select(ws, id, now_selected),
            move |ws: &mut Workspace| insert_and_select(ws, index, &layer),
        )
        .with_memory_size(bytes);
        publish(events, step);
        Ok(())
    }
}

/// Copy of the selected layer placed directly above it.
pub struct DuplicateLayer;

impl Operation for DuplicateLayer {
    fn name(&self) -> &'static str {
        "duplicate-layer"
    }

    fn label(&self) -> &'static str {
        "Duplicate Layer"
    }

    fn category(&self) -> Category {
        Category::Layer
    }

    fn parameters(&self) -> Parameters {
        Parameters::new()
    }

    fn apply(&self, workspace: &mut Workspace, _params: &Parameters, events: &mut dyn EventSink) -> Result<(), EditError> {
        let source = workspace.active_layer()?;
        let previous = source.id();
        let copy = source.duplicate(format!("{} Copy", source.name));
        let id = copy.id();
        let index = workspace.layer_index(previous).map_or(0, |i| i + 1);

        workspace.insert_layer(index, copy.clone())?;
        workspace.set_selected_layer(Some(id));

        let bytes = copy.pixels.memory_bytes();
        let step = GenericStep::new(
            self.label(),
            move |ws: &mut Workspace| insert_and_select(ws, index, &copy),
            move |ws: &mut Workspace| remove_and_select(ws, id, Some(previous)),
        )
        .with_memory_size(bytes);
        publish(events, step);
        Ok(())
    }
}

/// Move the selected layer to a new stack position (0 = bottom).
pub struct MoveLayer;

impl Operation for MoveLayer {
    fn name(&self) -> &'static str {
        "move-layer"
    }

    fn label(&self) -> &'static str {
        "Move Layer"
    }

    fn category(&self) -> Category {
        Category::Layer
    }

    fn parameters(&self) -> Parameters {
        Parameters::new().with(Parameter::number("position", 0.0, 0.0, 65535.0, 1.0))
    }

    fn apply(&self, workspace: &mut Workspace, params: &Parameters, events: &mut dyn EventSink) -> Result<(), EditError> {
        params.validate_all()?;
        let position = params.coord("position")? as usize;
        let id = workspace.active_layer()?.id();
        let to = position.min(workspace.layers().len() - 1);
        let from = workspace.layer_index(id).ok_or(EditError::UnknownLayer(id))?;
        if from == to {
            log_info!("Move Layer: layer {} already at {}", id, to);
            return Ok(());
        }
        workspace.move_layer(id, to)?;

        let step = GenericStep::new(
            self.label(),
            move |ws: &mut Workspace| replayed("move layer", ws.move_layer(id, to)),
            move |ws: &mut Workspace| replayed("move layer", ws.move_layer(id, from)),
        );
        publish(events, step);
        Ok(())
    }
}

/// Show, hide or toggle the selected layer.
pub struct SetLayerVisibility;

impl Operation for SetLayerVisibility {
    fn name(&self) -> &'static str {
        "layer-visibility"
    }

    fn label(&self) -> &'static str {
        "Layer Visibility"
    }

    fn category(&self) -> Category {
        Category::Layer
    }

    fn parameters(&self) -> Parameters {
        Parameters::new().with(Parameter::options("visible", "toggle", &["toggle", "show", "hide"]))
    }

    fn apply(&self, workspace: &mut Workspace, params: &Parameters, events: &mut dyn EventSink) -> Result<(), EditError> {
        params.validate_all()?;
        let layer = workspace.active_layer()?;
        let (id, was) = (layer.id(), layer.visible);
        let visible = match params.text("visible")? {
            "toggle" => !was,
            "show" => true,
            "hide" => false,
            other => return Err(EditError::invalid_param("visible", format!("unknown choice '{}'", other))),
        };
        if visible == was {
            return Ok(());
        }
        workspace.set_layer_visible(id, visible)?;

        let step = GenericStep::new(
            if visible { "Show Layer" } else { "Hide Layer" },
            move |ws: &mut Workspace| replayed("set visibility", ws.set_layer_visible(id, visible)),
            move |ws: &mut Workspace| replayed("set visibility", ws.set_layer_visible(id, was)),
        );
        publish(events, step);
        Ok(())
    }
}

pub struct RenameLayer;

impl Operation for RenameLayer {
    fn name(&self) -> &'static str {
        "rename-layer"
    }

    fn label(&self) -> &'static str {
        "Rename Layer"
    }

    fn category(&self) -> Category {
        Category::Layer
    }

    fn parameters(&self) -> Parameters {
        Parameters::new().with(Parameter::text("name", "Layer", 1, 64))
    }

    fn apply(&self, workspace: &mut Workspace, params: &Parameters, events: &mut dyn EventSink) -> Result<(), EditError> {
        params.validate_all()?;
        let name = params.text("name")?.to_string();
        if name.is_empty() {
            return Err(EditError::invalid_param("name", "layer names cannot be empty"));
        }
        let id = workspace.active_layer()?.id();
        let old = workspace.rename_layer(id, name.clone())?;
        if old == name {
            return Ok(());
        }

        let step = GenericStep::new(
            self.label(),
            move |ws: &mut Workspace| replayed("rename layer", ws.rename_layer(id, name.clone())),
            move |ws: &mut Workspace| replayed("rename layer", ws.rename_layer(id, old.clone())),
        );
        publish(events, step);
        Ok(())
    }
}

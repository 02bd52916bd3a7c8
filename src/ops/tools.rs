// ============================================================================
// TOOLS — fill, shape drawing and selection tools
// ============================================================================

use super::{Category, Operation, edit_active_layer, edit_selection};
use crate::error::EditError;
use crate::events::EventSink;
use crate::params::{Parameter, Parameters};
use crate::selection::{SelectionMode, SelectionShape};
use crate::workspace::{Workspace, alpha_over};
use image::Rgba;

const SHAPES: &[&str] = &["rectangle", "ellipse"];

/// Corner parameters shared by every shape tool.
fn corner_params(params: Parameters) -> Parameters {
    params
        .with(Parameter::number("x0", 0.0, 0.0, 65535.0, 1.0))
        .with(Parameter::number("y0", 0.0, 0.0, 65535.0, 1.0))
        .with(Parameter::number("x1", 0.0, 0.0, 65535.0, 1.0))
        .with(Parameter::number("y1", 0.0, 0.0, 65535.0, 1.0))
}

fn read_shape(params: &Parameters) -> Result<SelectionShape, EditError> {
    let (x0, y0) = (params.coord("x0")?, params.coord("y0")?);
    let (x1, y1) = (params.coord("x1")?, params.coord("y1")?);
    match params.text("shape")? {
        "rectangle" => Ok(SelectionShape::rectangle(x0, y0, x1, y1)),
        "ellipse" => Ok(SelectionShape::ellipse_in(x0, y0, x1, y1)),
        other => Err(EditError::invalid_param("shape", format!("unknown shape '{}'", other))),
    }
}

// ============================================================================
// PAINTING
// ============================================================================

/// Fill the selected part of the active layer with one colour.
pub struct Fill;

impl Operation for Fill {
    fn name(&self) -> &'static str {
        "fill"
    }

    fn label(&self) -> &'static str {
        "Fill"
    }

    fn category(&self) -> Category {
        Category::Tool
    }

    fn parameters(&self) -> Parameters {
        Parameters::new().with(Parameter::color("color", Rgba([0, 0, 0, 255])))
    }

    fn apply(&self, workspace: &mut Workspace, params: &Parameters, events: &mut dyn EventSink) -> Result<(), EditError> {
        params.validate_all()?;
        let color = params.color("color")?;
        edit_active_layer(workspace, events, self.label(), |buf| {
            buf.fill(color);
            Ok(())
        })
    }
}

/// Rectangle or ellipse, filled or outlined, painted over the layer.
pub struct DrawShape;

impl Operation for DrawShape {
    fn name(&self) -> &'static str {
        "shape"
    }

    fn label(&self) -> &'static str {
        "Draw Shape"
    }

    fn category(&self) -> Category {
        Category::Tool
    }

    fn parameters(&self) -> Parameters {
        corner_params(
            Parameters::new()
                .with(Parameter::options("shape", "rectangle", SHAPES))
                .with(Parameter::options("style", "fill", &["fill", "outline"])),
        )
        .with(Parameter::number("width", 1.0, 1.0, 100.0, 1.0))
        .with(Parameter::color("color", Rgba([0, 0, 0, 255])))
    }

    fn apply(&self, workspace: &mut Workspace, params: &Parameters, events: &mut dyn EventSink) -> Result<(), EditError> {
        params.validate_all()?;
        let shape = read_shape(params)?;
        let outline = match params.text("style")? {
            "fill" => false,
            "outline" => true,
            other => return Err(EditError::invalid_param("style", format!("unknown style '{}'", other))),
        };
        let stroke = params.coord("width")?.max(1);
        let color = params.color("color")?;
        let hole = if outline { shape.inset(stroke) } else { None };

        edit_active_layer(workspace, events, self.label(), |buf| {
            let Some((x0, y0, x1, y1)) = shape.bounds(buf.width(), buf.height()) else {
                return Ok(());
            };
            for y in y0..=y1 {
                for x in x0..=x1 {
                    if shape.contains(x, y) == 0 {
                        continue;
                    }
                    if hole.as_ref().is_some_and(|h| h.contains(x, y) > 0) {
                        continue;
                    }
                    let base = buf.pixel(x, y);
                    buf.put(x, y, alpha_over(base, color));
                }
            }
            Ok(())
        })
    }
}

// ============================================================================
// SELECTION TOOLS
// ============================================================================

/// Combine a rectangle or ellipse with the current selection.
pub struct SelectShape;

impl Operation for SelectShape {
    fn name(&self) -> &'static str {
        "select"
    }

    fn label(&self) -> &'static str {
        "Select"
    }

    fn category(&self) -> Category {
        Category::Tool
    }

    fn parameters(&self) -> Parameters {
        let modes: Vec<&str> = SelectionMode::all().iter().map(|m| m.name()).collect();
        corner_params(
            Parameters::new()
                .with(Parameter::options("shape", "rectangle", SHAPES))
                .with(Parameter::options("mode", SelectionMode::Replace.name(), &modes)),
        )
    }

    fn apply(&self, workspace: &mut Workspace, params: &Parameters, events: &mut dyn EventSink) -> Result<(), EditError> {
        params.validate_all()?;
        let shape = read_shape(params)?;
        let mode_name = params.text("mode")?;
        let mode = SelectionMode::from_name(mode_name)
            .ok_or_else(|| EditError::invalid_param("mode", format!("unknown mode '{}'", mode_name)))?;
        edit_selection(workspace, events, self.label(), |area| area.apply_shape(&shape, mode));
        Ok(())
    }
}

pub struct SelectAll;

impl Operation for SelectAll {
    fn name(&self) -> &'static str {
        "select-all"
    }

    fn label(&self) -> &'static str {
        "Select All"
    }

    fn category(&self) -> Category {
        Category::Tool
    }

    fn parameters(&self) -> Parameters {
        Parameters::new()
    }

    fn apply(&self, workspace: &mut Workspace, _params: &Parameters, events: &mut dyn EventSink) -> Result<(), EditError> {
        edit_selection(workspace, events, self.label(), |area| area.select_all());
        Ok(())
    }
}

pub struct SelectNone;

impl Operation for SelectNone {
    fn name(&self) -> &'static str {
        "select-none"
    }

    fn label(&self) -> &'static str {
        "Deselect"
    }

    fn category(&self) -> Category {
        Category::Tool
    }

    fn parameters(&self) -> Parameters {
        Parameters::new()
    }

    fn apply(&self, workspace: &mut Workspace, _params: &Parameters, events: &mut dyn EventSink) -> Result<(), EditError> {
        edit_selection(workspace, events, self.label(), |area| area.select_none());
        Ok(())
    }
}

pub struct InvertSelection;

impl Operation for InvertSelection {
    fn name(&self) -> &'static str {
        "invert-selection"
    }

    fn label(&self) -> &'static str {
        "Invert Selection"
    }

    fn category(&self) -> Category {
        Category::Tool
    }

    fn parameters(&self) -> Parameters {
        Parameters::new()
    }

    fn apply(&self, workspace: &mut Workspace, _params: &Parameters, events: &mut dyn EventSink) -> Result<(), EditError> {
        edit_selection(workspace, events, self.label(), |area| area.invert());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::history::History;
    use crate::events::EditEvent;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn select_rect(ws: &mut Workspace, history: &mut History, coords: [&str; 4], mode: &str) {
        let mut p = SelectShape.parameters();
        for (name, v) in ["x0", "y0", "x1", "y1"].into_iter().zip(coords) {
            p.set_from_str(name, v).unwrap();
        }
        p.set_from_str("mode", mode).unwrap();
        SelectShape.apply(ws, &p, history).unwrap();
    }

    #[test]
    fn fill_only_touches_the_selection() {
        let mut ws = Workspace::new(6, 6).unwrap();
        let mut history = History::default();
        select_rect(&mut ws, &mut history, ["1", "1", "2", "2"], "replace");

        let mut p = Fill.parameters();
        p.set_from_str("color", "#ff0000").unwrap();
        Fill.apply(&mut ws, &p, &mut history).unwrap();

        let px = &ws.active_layer().unwrap().pixels;
        assert_eq!(px.get(1, 1).unwrap(), RED);
        assert_eq!(px.get(2, 2).unwrap(), RED);
        assert_eq!(px.get(3, 3).unwrap(), WHITE);
        assert_eq!(history.descriptions(), vec!["Select", "Fill"]);
    }

    #[test]
    fn selection_modes_combine_and_undo() {
        let mut ws = Workspace::new(8, 8).unwrap();
        let mut history = History::default();
        select_rect(&mut ws, &mut history, ["0", "0", "3", "3"], "replace");
        select_rect(&mut ws, &mut history, ["2", "2", "5", "5"], "add");
        assert_eq!(ws.selection().get(5, 5).unwrap(), 255);
        select_rect(&mut ws, &mut history, ["0", "0", "1", "1"], "subtract");
        assert_eq!(ws.selection().get(0, 0).unwrap(), 0);
        assert_eq!(ws.selection().bounds(), Some((0, 0, 5, 5)));

        history.undo(&mut ws).unwrap();
        assert_eq!(ws.selection().get(0, 0).unwrap(), 255);
        history.undo(&mut ws).unwrap();
        assert_eq!(ws.selection().get(5, 5).unwrap(), 0);
    }

    #[test]
    fn unchanged_selection_records_nothing() {
        let mut ws = Workspace::new(3, 3).unwrap();
        let mut events: Vec<EditEvent> = Vec::new();
        SelectAll.apply(&mut ws, &Parameters::new(), &mut events).unwrap();
        assert!(events.is_empty());

        SelectNone.apply(&mut ws, &Parameters::new(), &mut events).unwrap();
        let names: Vec<_> = events.iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["historySaveStep", "selectionChanged"]);

        InvertSelection.apply(&mut ws, &Parameters::new(), &mut events).unwrap();
        assert!(ws.selection().is_full());
    }

    #[test]
    fn outlined_rectangle_leaves_the_interior() {
        let mut ws = Workspace::new(7, 7).unwrap();
        let mut history = History::default();
        let mut p = DrawShape.parameters();
        for (name, v) in [("x0", "1"), ("y0", "1"), ("x1", "5"), ("y1", "5"), ("style", "outline"), ("color", "#ff0000")] {
            p.set_from_str(name, v).unwrap();
        }
        DrawShape.apply(&mut ws, &p, &mut history).unwrap();

        let px = &ws.active_layer().unwrap().pixels;
        assert_eq!(px.get(1, 1).unwrap(), RED);
        assert_eq!(px.get(5, 3).unwrap(), RED);
        assert_eq!(px.get(3, 3).unwrap(), WHITE);
        assert_eq!(px.get(0, 0).unwrap(), WHITE);
    }

    #[test]
    fn filled_ellipse_covers_centre_not_corners() {
        let mut ws = Workspace::new(9, 9).unwrap();
        let mut history = History::default();
        let mut p = DrawShape.parameters();
        for (name, v) in [("shape", "ellipse"), ("x0", "0"), ("y0", "0"), ("x1", "8"), ("y1", "8")] {
            p.set_from_str(name, v).unwrap();
        }
        DrawShape.apply(&mut ws, &p, &mut history).unwrap();

        let px = &ws.active_layer().unwrap().pixels;
        assert_eq!(px.get(4, 4).unwrap(), Rgba([0, 0, 0, 255]));
        assert_eq!(px.get(4, 0).unwrap(), Rgba([0, 0, 0, 255]));
        assert_eq!(px.get(0, 0).unwrap(), WHITE);
    }
}

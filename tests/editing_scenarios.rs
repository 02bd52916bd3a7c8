use image::Rgba;
use paintfe_core::ops::filters::{GaussianBlur, InvertColors, MeanBlur};
use paintfe_core::ops::kernel::{Kernel, convolve};
use paintfe_core::ops::tools::{Fill, SelectNone, SelectShape};
use paintfe_core::ops::{Operation, find_operation};
use paintfe_core::params::Parameters;
use paintfe_core::{
    EditError, EditEvent, EditLayerStep, EditSelectionStep, GenericStep, History, HistoryStep, PixelBuffer,
    SelectedArea, Workspace,
};

const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

fn layer_bytes(ws: &Workspace) -> Vec<u8> {
    ws.active_layer().unwrap().pixels.as_raw().to_vec()
}

#[test]
fn mean_blur_of_single_white_pixel() {
    let mut buf = PixelBuffer::new_filled(5, 5, BLACK).unwrap();
    buf.set(2, 2, WHITE).unwrap();

    let out = convolve(&Kernel::mean(3, 3).unwrap(), &buf);
    assert_eq!(out.get(2, 2).unwrap(), Rgba([28, 28, 28, 255]));
    for (x, y) in [(0, 0), (4, 0), (0, 4), (4, 4)] {
        assert_eq!(out.get(x, y).unwrap(), BLACK);
    }
    // The input buffer is untouched.
    assert_eq!(buf.get(2, 2).unwrap(), WHITE);
}

#[test]
fn frontier_of_single_selected_cell() {
    let mut area = SelectedArea::new(4, 4).unwrap();
    area.set(1, 1, 255).unwrap();
    let frontier = area.compute_frontier().to_vec();
    assert_eq!(
        frontier,
        vec![(0, 0), (1, 0), (2, 0), (0, 1), (2, 1), (0, 2), (1, 2), (2, 2)]
    );
}

#[test]
fn uniform_masks_have_no_frontier() {
    let mut area = SelectedArea::new(5, 3).unwrap();
    area.select_all();
    assert!(area.compute_frontier().is_empty());
    area.select_none();
    assert!(area.frontier().is_none());
    assert!(area.compute_frontier().is_empty());
}

#[test]
fn commit_under_empty_selection_leaves_layer_unchanged() {
    let mut ws = Workspace::new(4, 4).unwrap();
    let mut history = History::default();
    SelectNone.apply(&mut ws, &Parameters::new(), &mut history).unwrap();
    let before = layer_bytes(&ws);

    let mut params = Fill.parameters();
    params.set_from_str("color", "#00ff00").unwrap();
    Fill.apply(&mut ws, &params, &mut history).unwrap();

    assert_eq!(layer_bytes(&ws), before);
    // Only the deselect was recorded.
    assert_eq!(history.descriptions(), vec!["Deselect"]);
}

#[test]
fn empty_history_boundaries_leave_state_alone() {
    let mut ws = Workspace::new(3, 3).unwrap();
    let mut history = History::default();
    let before = layer_bytes(&ws);
    assert!(matches!(history.undo(&mut ws), Err(EditError::NothingToUndo)));
    assert!(matches!(history.redo(&mut ws), Err(EditError::NothingToRedo)));
    assert_eq!(layer_bytes(&ws), before);
}

#[test]
fn redo_at_end_signals_nothing_to_redo() {
    let mut ws = Workspace::new(3, 3).unwrap();
    let mut history = History::default();
    InvertColors.apply(&mut ws, &Parameters::new(), &mut history).unwrap();
    let after = layer_bytes(&ws);
    assert!(history.redo(&mut ws).unwrap_err().is_history_boundary());
    assert_eq!(layer_bytes(&ws), after);
}

#[test]
fn undo_then_redo_restores_exact_bytes_for_every_step_kind() {
    let mut ws = Workspace::new(6, 6).unwrap();
    let mut history = History::default();

    // EditSelectionStep
    let mut select = SelectShape.parameters();
    for (k, v) in [("x0", "1"), ("y0", "1"), ("x1", "3"), ("y1", "4")] {
        select.set_from_str(k, v).unwrap();
    }
    SelectShape.apply(&mut ws, &select, &mut history).unwrap();
    // EditLayerStep
    Fill.apply(&mut ws, &Fill.parameters(), &mut history).unwrap();
    GaussianBlur.apply(&mut ws, &GaussianBlur.parameters(), &mut history).unwrap();
    InvertColors.apply(&mut ws, &Parameters::new(), &mut history).unwrap();
    // GenericStep
    let add = find_operation("add-layer").unwrap();
    add.apply(&mut ws, &add.parameters(), &mut history).unwrap();

    assert_eq!(history.len(), 5);
    while history.can_undo() {
        let layers: Vec<Vec<u8>> = ws.layers().iter().map(|l| l.pixels.as_raw().to_vec()).collect();
        let selection = ws.selection().as_raw().to_vec();

        history.undo(&mut ws).unwrap();
        history.redo(&mut ws).unwrap();

        let layers_again: Vec<Vec<u8>> = ws.layers().iter().map(|l| l.pixels.as_raw().to_vec()).collect();
        assert_eq!(layers_again, layers);
        assert_eq!(ws.selection().as_raw(), selection.as_slice());

        history.undo(&mut ws).unwrap();
    }
    assert_eq!(ws.layers().len(), 1);
    assert!(ws.selection().is_full());
    assert_eq!(ws.composite().get(0, 0).unwrap(), WHITE);
}

#[test]
fn failed_apply_is_atomic() {
    let mut ws = Workspace::empty(4, 4).unwrap();
    let mut events: Vec<EditEvent> = Vec::new();
    let err = MeanBlur.apply(&mut ws, &MeanBlur.parameters(), &mut events).unwrap_err();
    assert!(matches!(err, EditError::NoActiveLayer));
    assert!(events.is_empty());
    assert!(!ws.has_gesture());
    assert!(ws.layers().is_empty());
}

#[test]
fn steps_can_be_built_and_pushed_by_hand() {
    let mut ws = Workspace::new(2, 2).unwrap();
    let mut history = History::default();
    let id = ws.selected_layer_id().unwrap();

    let before = ws.layer(id).unwrap().pixels.clone();
    let after = PixelBuffer::new_filled(2, 2, BLACK).unwrap();
    ws.replace_layer_pixels(id, after.clone()).unwrap();
    history.push_step(Box::new(EditLayerStep::new("Paint", id, before.clone(), after)));

    let sel_before = ws.selection().clone();
    ws.selection_mut().invert();
    history.push_step(Box::new(EditSelectionStep::new("Invert", sel_before, ws.selection().clone())));

    history.push_step(Box::new(GenericStep::new(
        "Rename",
        move |ws: &mut Workspace| {
            let _ = ws.rename_layer(id, "Ink");
        },
        move |ws: &mut Workspace| {
            let _ = ws.rename_layer(id, "Background");
        },
    )));
    ws.rename_layer(id, "Ink").unwrap();

    assert_eq!(history.undo_to(10, &mut ws), 3);
    assert_eq!(ws.layer(id).unwrap().pixels, before);
    assert_eq!(ws.layer(id).unwrap().name, "Background");
    assert!(ws.selection().is_full());
    assert!(history.memory_usage() > 0);
    let boxed: &dyn HistoryStep = &EditLayerStep::new("x", id, before.clone(), before);
    assert!(boxed.memory_size() >= 2 * 2 * 4 * 2);
}

#[test]
fn out_of_range_numbers_are_rejected_by_every_operation() {
    use paintfe_core::ops::all_operations;
    use paintfe_core::params::{ParamKind, Parameter};

    let mut ws = Workspace::new(4, 4).unwrap();
    for op in all_operations() {
        let declared = op.parameters();
        for param in declared.iter() {
            let ParamKind::Number { min, max, step } = param.kind else {
                continue;
            };
            let params = declared.clone().with(Parameter::number(&param.name, max * 10.0 + 1.0, min, max, step));
            let layers_before: Vec<Vec<u8>> = ws.layers().iter().map(|l| l.pixels.as_raw().to_vec()).collect();
            let mut events: Vec<EditEvent> = Vec::new();

            let err = op.apply(&mut ws, &params, &mut events).unwrap_err();
            assert!(matches!(err, EditError::InvalidParameter { .. }), "{}: {}", op.name(), err);
            assert!(events.is_empty());
            assert!(!ws.has_gesture());
            let layers_after: Vec<Vec<u8>> = ws.layers().iter().map(|l| l.pixels.as_raw().to_vec()).collect();
            assert_eq!(layers_after, layers_before);
        }
    }
}

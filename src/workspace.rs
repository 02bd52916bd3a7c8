// ============================================================================
// WORKSPACE — layer stack, active selection, working buffer, composition
// ============================================================================
//
// Layers are owned here and addressed by `LayerId`; nothing outside holds a
// reference into the stack across calls.  Index 0 is the bottom of the stack.

use image::Rgba;
use rayon::prelude::*;

use crate::canvas::{Layer, LayerId, PixelBuffer, TRANSPARENT};
use crate::components::history::EditLayerStep;
use crate::error::EditError;
use crate::selection::SelectedArea;
use crate::settings::EditorSettings;
use crate::{log_info, log_warn};

/// Zoom step used by `zoom_in` / `zoom_out`.
const ZOOM_STEP: f32 = 1.2;

/// In-flight edit: a scratch copy of one layer's pixels.
#[derive(Clone, Debug)]
struct WorkingBuffer {
    layer: LayerId,
    pixels: PixelBuffer,
}

/// One open document.
pub struct Workspace {
    width: u32,
    height: u32,
    layers: Vec<Layer>,
    /// Always `None` or the id of a layer in `layers`.
    selected: Option<LayerId>,
    selection: SelectedArea,
    working: Option<WorkingBuffer>,
    zoom: f32,
    min_zoom: f32,
    max_zoom: f32,
    /// Bumped on every change that affects the composite.
    generation: u64,
}

impl Workspace {
    /// New document with a single white "Background" layer, selected, and
    /// everything selected.
    pub fn new(width: u32, height: u32) -> Result<Self, EditError> {
        let mut ws = Self::empty(width, height)?;
        let background = Layer::new("Background", width, height, Rgba([255, 255, 255, 255]))?;
        ws.push_initial_layer(background);
        Ok(ws)
    }

    /// New document sized and filled from the settings.
    pub fn with_settings(settings: &EditorSettings) -> Result<Self, EditError> {
        let mut ws = Self::empty(settings.default_width, settings.default_height)?;
        (ws.min_zoom, ws.max_zoom) = settings.zoom_range();
        ws.zoom = ws.zoom.clamp(ws.min_zoom, ws.max_zoom);
        let background = Layer::new(
            "Background",
            settings.default_width,
            settings.default_height,
            settings.background,
        )?;
        ws.push_initial_layer(background);
        Ok(ws)
    }

    /// Document whose single layer is `pixels` (e.g. an imported image).
    pub fn from_pixels(pixels: PixelBuffer) -> Result<Self, EditError> {
        let mut ws = Self::empty(pixels.width(), pixels.height())?;
        ws.push_initial_layer(Layer::from_pixels("Background", pixels));
        Ok(ws)
    }

    /// Document with no layers at all.
    pub fn empty(width: u32, height: u32) -> Result<Self, EditError> {
        Ok(Self {
            width,
            height,
            layers: Vec::new(),
            selected: None,
            selection: SelectedArea::new_all(width, height)?,
            working: None,
            zoom: 1.0,
            min_zoom: 0.1,
            max_zoom: 100.0,
            generation: 0,
        })
    }

    fn push_initial_layer(&mut self, layer: Layer) {
        self.selected = Some(layer.id());
        self.layers.push(layer);
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    fn check_dimensions(&self, found: (u32, u32)) -> Result<(), EditError> {
        if found == (self.width, self.height) {
            Ok(())
        } else {
            Err(EditError::DimensionMismatch {
                expected: (self.width, self.height),
                found,
            })
        }
    }

    // ---- layer collection ---------------------------------------------------

    /// Layers bottom to top.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer(&self, id: LayerId) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id() == id)
    }

    /// Stack position (z-order) of a layer.
    pub fn layer_index(&self, id: LayerId) -> Option<usize> {
        self.layers.iter().position(|l| l.id() == id)
    }

    fn layer_mut(&mut self, id: LayerId) -> Result<&mut Layer, EditError> {
        self.layers
            .iter_mut()
            .find(|l| l.id() == id)
            .ok_or(EditError::UnknownLayer(id))
    }

    pub fn selected_layer_id(&self) -> Option<LayerId> {
        self.selected
    }

    pub fn selected_layer_index(&self) -> Option<usize> {
        self.selected.and_then(|id| self.layer_index(id))
    }

    pub fn selected_layer(&self) -> Option<&Layer> {
        self.selected.and_then(|id| self.layer(id))
    }

    /// The selected layer, or `NoActiveLayer`.
    pub fn active_layer(&self) -> Result<&Layer, EditError> {
        self.selected_layer().ok_or(EditError::NoActiveLayer)
    }

    pub fn select_layer(&mut self, id: LayerId) -> Result<(), EditError> {
        if self.layer_index(id).is_none() {
            return Err(EditError::UnknownLayer(id));
        }
        self.selected = Some(id);
        Ok(())
    }

    /// Restore a previously recorded layer selection.  Ids that are no longer
    /// live resolve to "no selected layer".
    pub fn set_selected_layer(&mut self, id: Option<LayerId>) {
        self.selected = match id {
            Some(id) if self.layer_index(id).is_some() => Some(id),
            Some(id) => {
                log_warn!("set_selected_layer: layer {} is not in the stack", id);
                None
            }
            None => None,
        };
    }

    /// Insert a layer at `index` (clamped to the stack size) and return its
    /// id.  The layer must match the document size.
    pub fn insert_layer(&mut self, index: usize, layer: Layer) -> Result<LayerId, EditError> {
        self.check_dimensions(layer.pixels.dimensions())?;
        if self.layer_index(layer.id()).is_some() {
            return Err(EditError::InvalidParameter {
                name: "layer".to_string(),
                reason: format!("layer {} is already in the stack", layer.id()),
            });
        }
        let id = layer.id();
        let index = index.min(self.layers.len());
        log_info!("Insert layer '{}' ({}) at {}", layer.name, id, index);
        self.layers.insert(index, layer);
        self.touch();
        Ok(id)
    }

    /// Remove a layer and hand it back with its former index.  If it was the
    /// selected layer, the layer below it (or the new bottom) becomes
    /// selected.  A gesture on that layer is discarded.
    pub fn remove_layer(&mut self, id: LayerId) -> Result<(usize, Layer), EditError> {
        let index = self.layer_index(id).ok_or(EditError::UnknownLayer(id))?;
        let layer = self.layers.remove(index);
        if self.selected == Some(id) {
            self.selected = if self.layers.is_empty() {
                None
            } else {
                Some(self.layers[index.saturating_sub(1).min(self.layers.len() - 1)].id())
            };
        }
        if self.working.as_ref().is_some_and(|w| w.layer == id) {
            log_warn!("Layer {} removed mid-gesture; working buffer discarded", id);
            self.working = None;
        }
        log_info!("Remove layer '{}' ({}) from {}", layer.name, id, index);
        self.touch();
        Ok((index, layer))
    }

    /// Move a layer to `to` (clamped) and return its previous index.
    pub fn move_layer(&mut self, id: LayerId, to: usize) -> Result<usize, EditError> {
        let from = self.layer_index(id).ok_or(EditError::UnknownLayer(id))?;
        let layer = self.layers.remove(from);
        let to = to.min(self.layers.len());
        self.layers.insert(to, layer);
        self.touch();
        Ok(from)
    }

    /// Set visibility and return the previous value.
    pub fn set_layer_visible(&mut self, id: LayerId, visible: bool) -> Result<bool, EditError> {
        let layer = self.layer_mut(id)?;
        let was = std::mem::replace(&mut layer.visible, visible);
        self.touch();
        Ok(was)
    }

    /// Rename and return the previous name.
    pub fn rename_layer(&mut self, id: LayerId, name: impl Into<String>) -> Result<String, EditError> {
        let layer = self.layer_mut(id)?;
        Ok(std::mem::replace(&mut layer.name, name.into()))
    }

    /// Swap in new pixels for a layer and return the old ones.
    pub fn replace_layer_pixels(&mut self, id: LayerId, pixels: PixelBuffer) -> Result<PixelBuffer, EditError> {
        self.check_dimensions(pixels.dimensions())?;
        let layer = self.layer_mut(id)?;
        let old = std::mem::replace(&mut layer.pixels, pixels);
        self.touch();
        Ok(old)
    }

    // ---- selection ----------------------------------------------------------

    pub fn selection(&self) -> &SelectedArea {
        &self.selection
    }

    /// Direct access to the mask; every `SelectedArea` mutator invalidates
    /// its own frontier.
    pub fn selection_mut(&mut self) -> &mut SelectedArea {
        self.touch();
        &mut self.selection
    }

    /// Replace the selection and return the previous one.
    pub fn set_selection(&mut self, selection: SelectedArea) -> Result<SelectedArea, EditError> {
        self.check_dimensions(selection.dimensions())?;
        self.touch();
        Ok(std::mem::replace(&mut self.selection, selection))
    }

    // ---- gestures -----------------------------------------------------------

    /// Start an edit on the selected layer: the working buffer becomes a
    /// copy of its pixels.  Any previous uncommitted gesture is discarded.
    pub fn begin_gesture(&mut self) -> Result<&mut PixelBuffer, EditError> {
        let layer = self.active_layer()?;
        let working = WorkingBuffer {
            layer: layer.id(),
            pixels: layer.pixels.clone(),
        };
        if self.working.is_some() {
            log_warn!("begin_gesture: discarding uncommitted working buffer");
        }
        Ok(&mut self.working.insert(working).pixels)
    }

    pub fn has_gesture(&self) -> bool {
        self.working.is_some()
    }

    pub fn working_buffer(&self) -> Option<&PixelBuffer> {
        self.working.as_ref().map(|w| &w.pixels)
    }

    pub fn working_buffer_mut(&mut self) -> Option<&mut PixelBuffer> {
        self.working.as_mut().map(|w| &mut w.pixels)
    }

    /// Abandon the gesture.  Neither the layer nor the history is touched.
    pub fn cancel_gesture(&mut self) -> bool {
        self.working.take().is_some()
    }

    /// Merge the working buffer into its layer through the selection mask
    /// and return the reversible record of the change.  The caller decides
    /// whether to publish the step.
    pub fn commit_working_buffer(&mut self, description: impl Into<String>) -> Result<EditLayerStep, EditError> {
        let layer_id = match &self.working {
            Some(w) => w.layer,
            None => return Err(EditError::NoActiveLayer),
        };
        let index = self.layer_index(layer_id).ok_or(EditError::UnknownLayer(layer_id))?;
        let Some(working) = self.working.take() else {
            return Err(EditError::NoActiveLayer);
        };

        let before = self.layers[index].pixels.clone();
        let after = blend_through_mask(&before, &working.pixels, &self.selection);
        self.layers[index].pixels = after.clone();
        self.touch();

        let description = description.into();
        log_info!("Commit '{}' on layer {}", description, layer_id);
        Ok(EditLayerStep::new(description, layer_id, before, after))
    }

    // ---- composition --------------------------------------------------------

    /// Flatten visible layers bottom to top with alpha-over onto a
    /// transparent canvas.
    pub fn composite(&self) -> PixelBuffer {
        self.composite_layers(None)
    }

    /// Like `composite`, but an in-flight working buffer is shown in place
    /// of its layer (through the selection mask).
    pub fn composite_with_preview(&self) -> PixelBuffer {
        let preview = self.working.as_ref().and_then(|w| {
            let layer = self.layer(w.layer)?;
            Some((w.layer, blend_through_mask(&layer.pixels, &w.pixels, &self.selection)))
        });
        self.composite_layers(preview.as_ref().map(|(id, px)| (*id, px)))
    }

    fn composite_layers(&self, substitute: Option<(LayerId, &PixelBuffer)>) -> PixelBuffer {
        let w = self.width as usize;
        let sources: Vec<&PixelBuffer> = self
            .layers
            .iter()
            .filter(|l| l.visible)
            .map(|l| match substitute {
                Some((id, px)) if id == l.id() => px,
                _ => &l.pixels,
            })
            .collect();

        let mut out = vec![0u8; w * self.height as usize * 4];
        out.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
            let y = y as u32;
            for x in 0..w {
                let mut acc = TRANSPARENT;
                for src in &sources {
                    acc = alpha_over(acc, src.pixel(x as u32, y));
                }
                row[x * 4..x * 4 + 4].copy_from_slice(&acc.0);
            }
        });

        // Dimensions come from a validated workspace, so this cannot fail.
        match PixelBuffer::from_raw(self.width, self.height, out) {
            Ok(buf) => buf,
            Err(e) => unreachable!("composite buffer: {}", e),
        }
    }

    // ---- zoom ---------------------------------------------------------------

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        if zoom.is_finite() {
            self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
        }
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom * ZOOM_STEP);
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom / ZOOM_STEP);
    }

    pub fn reset_zoom(&mut self) {
        self.zoom = 1.0;
    }
}

/// Straight-alpha "over": `top` painted onto `base`.
pub fn alpha_over(base: Rgba<u8>, top: Rgba<u8>) -> Rgba<u8> {
    if top[3] == 0 {
        return base;
    }
    if top[3] == 255 || base[3] == 0 {
        return top;
    }
    let ta = top[3] as f32 / 255.0;
    let ba = base[3] as f32 / 255.0;
    let oa = ta + ba * (1.0 - ta);
    let ch = |t: u8, b: u8| {
        let v = (t as f32 * ta + b as f32 * ba * (1.0 - ta)) / oa;
        v.round().clamp(0.0, 255.0) as u8
    };
    Rgba([
        ch(top[0], base[0]),
        ch(top[1], base[1]),
        ch(top[2], base[2]),
        (oa * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

/// Per-pixel blend of `new` over `old` weighted by the mask:
/// 0 keeps `old`, 255 takes `new`, anything between interpolates every
/// channel by `mask / 255`.
pub fn blend_through_mask(old: &PixelBuffer, new: &PixelBuffer, mask: &SelectedArea) -> PixelBuffer {
    debug_assert_eq!(old.dimensions(), new.dimensions());
    debug_assert_eq!(old.dimensions(), mask.dimensions());

    let mut out = old.clone();
    let new_raw = new.as_raw();
    let mask_raw = mask.as_raw();
    out.as_raw_mut()
        .par_chunks_mut(4)
        .zip(new_raw.par_chunks(4))
        .zip(mask_raw.par_iter())
        .for_each(|((px, src), &m)| match m {
            0 => {}
            255 => px.copy_from_slice(src),
            _ => {
                let t = m as f32 / 255.0;
                for c in 0..4 {
                    let o = px[c] as f32;
                    px[c] = (o + (src[c] as f32 - o) * t).round().clamp(0.0, 255.0) as u8;
                }
            }
        });
    out
}

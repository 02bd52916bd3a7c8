// ============================================================================
// SELECTION SYSTEM — per-pixel intensity mask with a cached boundary trace
// ============================================================================

use image::{GrayImage, Luma};

use crate::error::EditError;

/// How a new selection shape interacts with the existing mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// Clear any existing selection, then set the new shape.
    #[default]
    Replace,
    /// Union – add to the existing mask.
    Add,
    /// Difference – subtract from the existing mask.
    Subtract,
    /// Keep only cells present in both the existing mask AND the new shape.
    Intersect,
}

impl SelectionMode {
    pub fn name(&self) -> &'static str {
        match self {
            SelectionMode::Replace => "replace",
            SelectionMode::Add => "add",
            SelectionMode::Subtract => "subtract",
            SelectionMode::Intersect => "intersect",
        }
    }

    pub fn all() -> &'static [SelectionMode] {
        &[
            SelectionMode::Replace,
            SelectionMode::Add,
            SelectionMode::Subtract,
            SelectionMode::Intersect,
        ]
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|m| m.name() == name)
    }
}

/// Shape used for a selection gesture.  Rectangle bounds are inclusive.
#[derive(Clone, Debug, PartialEq)]
pub enum SelectionShape {
    Rectangle { min_x: u32, min_y: u32, max_x: u32, max_y: u32 },
    Ellipse { cx: f32, cy: f32, rx: f32, ry: f32 },
}

impl SelectionShape {
    /// Returns 255 if the cell (x, y) is inside the shape, 0 otherwise.
    pub fn contains(&self, x: u32, y: u32) -> u8 {
        match self {
            SelectionShape::Rectangle { min_x, min_y, max_x, max_y } => {
                if x >= *min_x && x <= *max_x && y >= *min_y && y <= *max_y {
                    255
                } else {
                    0
                }
            }
            SelectionShape::Ellipse { cx, cy, rx, ry } => {
                if *rx <= 0.0 || *ry <= 0.0 {
                    return 0;
                }
                let dx = (x as f32 - cx) / rx;
                let dy = (y as f32 - cy) / ry;
                if dx * dx + dy * dy <= 1.0 { 255 } else { 0 }
            }
        }
    }

    /// Rectangle spanning two corners given in any order.
    pub fn rectangle(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        SelectionShape::Rectangle {
            min_x: x0.min(x1),
            min_y: y0.min(y1),
            max_x: x0.max(x1),
            max_y: y0.max(y1),
        }
    }

    /// Ellipse inscribed in the inclusive box spanned by two corners.
    pub fn ellipse_in(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        let (min_x, max_x) = (x0.min(x1) as f32, x0.max(x1) as f32);
        let (min_y, max_y) = (y0.min(y1) as f32, y0.max(y1) as f32);
        SelectionShape::Ellipse {
            cx: (min_x + max_x) / 2.0,
            cy: (min_y + max_y) / 2.0,
            rx: (max_x - min_x + 1.0) / 2.0,
            ry: (max_y - min_y + 1.0) / 2.0,
        }
    }

    /// The same shape shrunk by `by` cells on every side, or `None` when
    /// nothing would remain.
    pub fn inset(&self, by: u32) -> Option<Self> {
        match self {
            SelectionShape::Rectangle { min_x, min_y, max_x, max_y } => {
                let (x0, y0) = (min_x.checked_add(by)?, min_y.checked_add(by)?);
                let (x1, y1) = (max_x.checked_sub(by)?, max_y.checked_sub(by)?);
                (x0 <= x1 && y0 <= y1).then_some(SelectionShape::Rectangle {
                    min_x: x0,
                    min_y: y0,
                    max_x: x1,
                    max_y: y1,
                })
            }
            SelectionShape::Ellipse { cx, cy, rx, ry } => {
                let (rx, ry) = (rx - by as f32, ry - by as f32);
                (rx > 0.0 && ry > 0.0).then_some(SelectionShape::Ellipse { cx: *cx, cy: *cy, rx, ry })
            }
        }
    }

    /// Inclusive bounding box clipped to the mask, or `None` when the shape
    /// lies entirely outside it.
    pub fn bounds(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let (min_x, min_y, max_x, max_y) = match self {
            SelectionShape::Rectangle { min_x, min_y, max_x, max_y } => {
                (*min_x, *min_y, (*max_x).min(width - 1), (*max_y).min(height - 1))
            }
            SelectionShape::Ellipse { cx, cy, rx, ry } => {
                if cx + rx < 0.0 || cy + ry < 0.0 {
                    return None;
                }
                let min_x = (cx - rx).max(0.0).floor() as u32;
                let min_y = (cy - ry).max(0.0).floor() as u32;
                let max_x = ((cx + rx).ceil() as u32).min(width - 1);
                let max_y = ((cy + ry).ceil() as u32).min(height - 1);
                (min_x, min_y, max_x, max_y)
            }
        };
        if min_x > max_x || min_y > max_y {
            None
        } else {
            Some((min_x, min_y, max_x, max_y))
        }
    }
}

/// Selection mask – 0 = unselected, 255 = fully selected, anything in
/// between is a partial (anti-aliased) selection.
///
/// The frontier is cached: `None` until `compute_frontier` runs, and reset
/// to `None` by every mutator, so a stale frontier can never be observed.
#[derive(Clone, Debug)]
pub struct SelectedArea {
    mask: GrayImage,
    frontier: Option<Vec<(u32, u32)>>,
}

impl PartialEq for SelectedArea {
    /// Two selections are equal when their masks are; the frontier cache is
    /// derived state.
    fn eq(&self, other: &Self) -> bool {
        self.mask == other.mask
    }
}

impl Eq for SelectedArea {}

impl SelectedArea {
    /// Create an empty (nothing selected) mask.
    pub fn new(width: u32, height: u32) -> Result<Self, EditError> {
        if width == 0 || height == 0 {
            return Err(EditError::InvalidDimensions { width, height });
        }
        Ok(Self {
            mask: GrayImage::new(width, height),
            frontier: None,
        })
    }

    /// Create a mask with every cell selected.
    pub fn new_all(width: u32, height: u32) -> Result<Self, EditError> {
        let mut area = Self::new(width, height)?;
        area.select_all();
        Ok(area)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.mask.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.mask.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    pub fn get(&self, x: u32, y: u32) -> Result<u8, EditError> {
        self.check_bounds(x, y)?;
        Ok(self.mask.get_pixel(x, y).0[0])
    }

    pub fn set(&mut self, x: u32, y: u32, value: u8) -> Result<(), EditError> {
        self.check_bounds(x, y)?;
        self.mask.put_pixel(x, y, Luma([value]));
        self.invalidate();
        Ok(())
    }

    /// Unchecked read for loops that already clipped their coordinates.
    #[inline]
    pub(crate) fn value(&self, x: u32, y: u32) -> u8 {
        self.mask.get_pixel(x, y).0[0]
    }

    pub fn as_raw(&self) -> &[u8] {
        self.mask.as_raw()
    }

    pub fn select_all(&mut self) {
        self.fill(255);
    }

    pub fn select_none(&mut self) {
        self.fill(0);
    }

    fn fill(&mut self, value: u8) {
        for p in self.mask.pixels_mut() {
            *p = Luma([value]);
        }
        self.invalidate();
    }

    /// Swap selected and unselected intensity (v → 255 − v).
    pub fn invert(&mut self) {
        for p in self.mask.pixels_mut() {
            p.0[0] = 255 - p.0[0];
        }
        self.invalidate();
    }

    /// `true` when no cell carries any selection.
    pub fn is_empty(&self) -> bool {
        self.mask.as_raw().iter().all(|&v| v == 0)
    }

    /// `true` when every cell is fully selected.
    pub fn is_full(&self) -> bool {
        self.mask.as_raw().iter().all(|&v| v == 255)
    }

    /// Inclusive bounding box of all nonzero cells.
    pub fn bounds(&self) -> Option<(u32, u32, u32, u32)> {
        let (w, h) = self.dimensions();
        let raw = self.mask.as_raw();
        let mut min_x = w;
        let mut min_y = h;
        let mut max_x = 0u32;
        let mut max_y = 0u32;
        for y in 0..h {
            let row = &raw[(y * w) as usize..((y + 1) * w) as usize];
            for (x, &v) in row.iter().enumerate() {
                if v > 0 {
                    let x = x as u32;
                    min_x = min_x.min(x);
                    min_y = min_y.min(y);
                    max_x = max_x.max(x);
                    max_y = max_y.max(y);
                }
            }
        }
        if min_x > max_x { None } else { Some((min_x, min_y, max_x, max_y)) }
    }

    /// Shift the mask by (dx, dy).  Cells moved off the mask are dropped and
    /// newly exposed cells are unselected.
    pub fn translate(&mut self, dx: i32, dy: i32) {
        if dx == 0 && dy == 0 {
            return;
        }
        let (w, h) = self.dimensions();
        let mut shifted = GrayImage::new(w, h);
        for y in 0..h {
            for x in 0..w {
                let sx = x as i64 - dx as i64;
                let sy = y as i64 - dy as i64;
                if sx >= 0 && sx < w as i64 && sy >= 0 && sy < h as i64 {
                    shifted.put_pixel(x, y, *self.mask.get_pixel(sx as u32, sy as u32));
                }
            }
        }
        self.mask = shifted;
        self.invalidate();
    }

    /// Combine a shape with the mask according to `mode`.
    pub fn apply_shape(&mut self, shape: &SelectionShape, mode: SelectionMode) {
        let (w, h) = self.dimensions();
        let bounds = shape.bounds(w, h);

        match mode {
            SelectionMode::Replace => {
                for p in self.mask.pixels_mut() {
                    *p = Luma([0]);
                }
                if let Some((bx0, by0, bx1, by1)) = bounds {
                    for y in by0..=by1 {
                        for x in bx0..=bx1 {
                            let v = shape.contains(x, y);
                            if v > 0 {
                                self.mask.put_pixel(x, y, Luma([v]));
                            }
                        }
                    }
                }
            }
            SelectionMode::Add => {
                if let Some((bx0, by0, bx1, by1)) = bounds {
                    for y in by0..=by1 {
                        for x in bx0..=bx1 {
                            let new_val = shape.contains(x, y);
                            if new_val > 0 {
                                let old = self.value(x, y);
                                self.mask.put_pixel(x, y, Luma([old.max(new_val)]));
                            }
                        }
                    }
                }
            }
            SelectionMode::Subtract => {
                if let Some((bx0, by0, bx1, by1)) = bounds {
                    for y in by0..=by1 {
                        for x in bx0..=bx1 {
                            let sub_val = shape.contains(x, y);
                            if sub_val > 0 {
                                let old = self.value(x, y);
                                self.mask.put_pixel(x, y, Luma([old.saturating_sub(sub_val)]));
                            }
                        }
                    }
                }
            }
            SelectionMode::Intersect => {
                let old_mask = std::mem::replace(&mut self.mask, GrayImage::new(w, h));
                if let Some((bx0, by0, bx1, by1)) = bounds {
                    for y in by0..=by1 {
                        for x in bx0..=bx1 {
                            let shape_val = shape.contains(x, y);
                            let old_val = old_mask.get_pixel(x, y).0[0];
                            if shape_val > 0 && old_val > 0 {
                                self.mask.put_pixel(x, y, Luma([shape_val.min(old_val)]));
                            }
                        }
                    }
                }
            }
        }
        self.invalidate();
    }

    // ---- frontier ----------------------------------------------------------

    /// The cached frontier, or `None` if it has not been computed since the
    /// last mutation.
    pub fn frontier(&self) -> Option<&[(u32, u32)]> {
        self.frontier.as_deref()
    }

    pub fn frontier_is_cached(&self) -> bool {
        self.frontier.is_some()
    }

    /// Recompute the boundary trace: every unselected cell that has at
    /// least one nonzero cell in its clipped 3×3 neighbourhood, in row-major
    /// scan order (y outer, x inner), each cell recorded once.
    pub fn compute_frontier(&mut self) -> &[(u32, u32)] {
        let (w, h) = self.dimensions();
        let raw = self.mask.as_raw();
        let mut points = Vec::new();

        for y in 0..h {
            let y0 = y.saturating_sub(1);
            let y1 = (y + 1).min(h - 1);
            for x in 0..w {
                if raw[(y * w + x) as usize] != 0 {
                    continue;
                }
                let x0 = x.saturating_sub(1);
                let x1 = (x + 1).min(w - 1);
                'neighbours: for ny in y0..=y1 {
                    let row = (ny * w) as usize;
                    for nx in x0..=x1 {
                        if raw[row + nx as usize] != 0 {
                            points.push((x, y));
                            break 'neighbours;
                        }
                    }
                }
            }
        }

        self.frontier.insert(points)
    }

    #[inline]
    fn invalidate(&mut self) {
        self.frontier = None;
    }

    fn check_bounds(&self, x: u32, y: u32) -> Result<(), EditError> {
        if x < self.width() && y < self.height() {
            Ok(())
        } else {
            Err(EditError::OutOfBounds {
                x,
                y,
                width: self.width(),
                height: self.height(),
            })
        }
    }
}

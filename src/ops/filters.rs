// ============================================================================
// FILTERS — blur and colour effects for the selected layer
// ============================================================================
//
// Each effect is a pure function from one buffer to a new one; the operation
// wrappers run it on a working copy and commit through the selection mask,
// so pixels outside the selection are never modified.

use rayon::prelude::*;

use super::kernel::{Kernel, KernelAxis, convolve_separable, quantize};
use super::{Category, Operation, edit_active_layer};
use crate::canvas::PixelBuffer;
use crate::error::EditError;
use crate::events::EventSink;
use crate::params::{Parameter, Parameters};
use crate::workspace::Workspace;

// ============================================================================
// PURE EFFECTS
// ============================================================================

/// Separable Gaussian blur.  The kernel spans `ceil(3·sigma)` pixels on each
/// side of the centre.
pub fn gaussian_blur(src: &PixelBuffer, sigma: f32) -> Result<PixelBuffer, EditError> {
    let horizontal = Kernel::gaussian_for_sigma(sigma, KernelAxis::Horizontal)?;
    let vertical = Kernel::gaussian_for_sigma(sigma, KernelAxis::Vertical)?;
    Ok(convolve_separable(&horizontal, &vertical, src))
}

/// Box blur over a `size`×`size` window (odd `size`).
pub fn mean_blur(src: &PixelBuffer, size: u32) -> Result<PixelBuffer, EditError> {
    let horizontal = Kernel::mean(size, 1)?;
    let vertical = Kernel::mean(1, size)?;
    Ok(convolve_separable(&horizontal, &vertical, src))
}

/// Apply a per-pixel transform.  `transform` receives (r, g, b, a) as f32
/// and returns (r, g, b, a) as f32.
fn apply_pixel_transform<F>(src: &PixelBuffer, transform: F) -> PixelBuffer
where
    F: Fn(f32, f32, f32, f32) -> (f32, f32, f32, f32) + Sync,
{
    let mut out = src.clone();
    out.as_raw_mut().par_chunks_mut(4).for_each(|px| {
        let (r, g, b, a) = transform(px[0] as f32, px[1] as f32, px[2] as f32, px[3] as f32);
        px[0] = quantize(r);
        px[1] = quantize(g);
        px[2] = quantize(b);
        px[3] = quantize(a);
    });
    out
}

/// Invert RGB; alpha is preserved.
pub fn invert_colors(src: &PixelBuffer) -> PixelBuffer {
    apply_pixel_transform(src, |r, g, b, a| (255.0 - r, 255.0 - g, 255.0 - b, a))
}

/// Convert to greyscale with the BT.709 luminance weights:
/// 0.2126 R + 0.7152 G + 0.0722 B.
pub fn desaturate(src: &PixelBuffer) -> PixelBuffer {
    apply_pixel_transform(src, |r, g, b, a| {
        let lum = 0.2126 * r + 0.7152 * g + 0.0722 * b;
        (lum, lum, lum, a)
    })
}

// ============================================================================
// OPERATIONS
// ============================================================================

pub struct GaussianBlur;

impl Operation for GaussianBlur {
    fn name(&self) -> &'static str {
        "gaussian-blur"
    }

    fn label(&self) -> &'static str {
        "Gaussian Blur"
    }

    fn category(&self) -> Category {
        Category::Effect
    }

    fn parameters(&self) -> Parameters {
        Parameters::new().with(Parameter::number("sigma", 2.0, 0.1, 100.0, 0.1))
    }

    fn apply(&self, workspace: &mut Workspace, params: &Parameters, events: &mut dyn EventSink) -> Result<(), EditError> {
        params.validate_all()?;
        let sigma = params.number("sigma")? as f32;
        // Build the kernels up front so a bad sigma fails before the gesture.
        let horizontal = Kernel::gaussian_for_sigma(sigma, KernelAxis::Horizontal)?;
        let vertical = Kernel::gaussian_for_sigma(sigma, KernelAxis::Vertical)?;
        edit_active_layer(workspace, events, self.label(), |buf| {
            *buf = convolve_separable(&horizontal, &vertical, buf);
            Ok(())
        })
    }
}

pub struct MeanBlur;

impl Operation for MeanBlur {
    fn name(&self) -> &'static str {
        "mean-blur"
    }

    fn label(&self) -> &'static str {
        "Mean Blur"
    }

    fn category(&self) -> Category {
        Category::Effect
    }

    fn parameters(&self) -> Parameters {
        Parameters::new().with(Parameter::number("size", 3.0, 1.0, 99.0, 2.0))
    }

    fn apply(&self, workspace: &mut Workspace, params: &Parameters, events: &mut dyn EventSink) -> Result<(), EditError> {
        params.validate_all()?;
        let size = params.number("size")?;
        if size.fract() != 0.0 || size < 1.0 {
            return Err(EditError::invalid_param("size", format!("{} is not a positive whole number", size)));
        }
        let size = size as u32;
        let horizontal = Kernel::mean(size, 1)?;
        let vertical = Kernel::mean(1, size)?;
        edit_active_layer(workspace, events, self.label(), |buf| {
            *buf = convolve_separable(&horizontal, &vertical, buf);
            Ok(())
        })
    }
}

pub struct InvertColors;

impl Operation for InvertColors {
    fn name(&self) -> &'static str {
        "invert-colors"
    }

    fn label(&self) -> &'static str {
        "Invert Colors"
    }

    fn category(&self) -> Category {
        Category::Effect
    }

    fn parameters(&self) -> Parameters {
        Parameters::new()
    }

    fn apply(&self, workspace: &mut Workspace, _params: &Parameters, events: &mut dyn EventSink) -> Result<(), EditError> {
        edit_active_layer(workspace, events, self.label(), |buf| {
            *buf = invert_colors(buf);
            Ok(())
        })
    }
}

pub struct Desaturate;

impl Operation for Desaturate {
    fn name(&self) -> &'static str {
        "desaturate"
    }

    fn label(&self) -> &'static str {
        "Desaturate"
    }

    fn category(&self) -> Category {
        Category::Effect
    }

    fn parameters(&self) -> Parameters {
        Parameters::new()
    }

    fn apply(&self, workspace: &mut Workspace, _params: &Parameters, events: &mut dyn EventSink) -> Result<(), EditError> {
        edit_active_layer(workspace, events, self.label(), |buf| {
            *buf = desaturate(buf);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::history::History;
    use crate::events::EditEvent;
    use image::Rgba;

    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    fn dot_workspace() -> Workspace {
        let mut ws = Workspace::new(5, 5).unwrap();
        let id = ws.selected_layer_id().unwrap();
        let mut px = PixelBuffer::new_filled(5, 5, BLACK).unwrap();
        px.set(2, 2, WHITE).unwrap();
        ws.replace_layer_pixels(id, px).unwrap();
        ws
    }

    #[test]
    fn mean_blur_spreads_a_single_dot() {
        let mut ws = dot_workspace();
        let mut history = History::default();
        MeanBlur.apply(&mut ws, &MeanBlur.parameters(), &mut history).unwrap();

        let px = &ws.active_layer().unwrap().pixels;
        assert_eq!(px.get(1, 1).unwrap(), Rgba([28, 28, 28, 255]));
        assert_eq!(px.get(2, 2).unwrap(), Rgba([28, 28, 28, 255]));
        assert_eq!(px.get(0, 0).unwrap(), BLACK);
        assert_eq!(px.get(4, 4).unwrap(), BLACK);
        assert_eq!(history.undo_description().as_deref(), Some("Mean Blur"));
    }

    #[test]
    fn even_mean_size_is_rejected_without_side_effects() {
        let mut ws = dot_workspace();
        let before = ws.active_layer().unwrap().pixels.clone();
        let mut events: Vec<EditEvent> = Vec::new();
        let mut params = MeanBlur.parameters();
        params.set_from_str("size", "4").unwrap();
        let err = MeanBlur.apply(&mut ws, &params, &mut events).unwrap_err();
        assert!(matches!(err, EditError::InvalidKernelSize { width: 4, .. }));
        assert_eq!(ws.active_layer().unwrap().pixels, before);
        assert!(events.is_empty());
        assert!(!ws.has_gesture());
    }

    #[test]
    fn out_of_range_parameters_fail_before_touching_the_layer() {
        let mut ws = dot_workspace();
        let before = ws.active_layer().unwrap().pixels.clone();
        let mut events: Vec<EditEvent> = Vec::new();

        let sigma = Parameters::new().with(Parameter::number("sigma", 1e9, 0.1, 100.0, 0.1));
        let err = GaussianBlur.apply(&mut ws, &sigma, &mut events).unwrap_err();
        assert!(matches!(err, EditError::InvalidParameter { .. }));

        let size = Parameters::new().with(Parameter::number("size", 1e12, 1.0, 99.0, 2.0));
        let err = MeanBlur.apply(&mut ws, &size, &mut events).unwrap_err();
        assert!(matches!(err, EditError::InvalidParameter { .. }));

        assert_eq!(ws.active_layer().unwrap().pixels, before);
        assert!(events.is_empty());
        assert!(!ws.has_gesture());
    }

    #[test]
    fn blur_respects_the_selection() {
        let mut ws = dot_workspace();
        ws.selection_mut().select_none();
        ws.selection_mut().set(1, 1, 255).unwrap();
        let mut events: Vec<EditEvent> = Vec::new();
        GaussianBlur.apply(&mut ws, &GaussianBlur.parameters(), &mut events).unwrap();

        let px = &ws.active_layer().unwrap().pixels;
        assert_ne!(px.get(1, 1).unwrap(), BLACK);
        assert_eq!(px.get(2, 2).unwrap(), WHITE);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn effects_without_a_layer_report_no_active_layer() {
        let mut ws = Workspace::empty(3, 3).unwrap();
        let mut events: Vec<EditEvent> = Vec::new();
        for op in [&InvertColors as &dyn Operation, &Desaturate, &GaussianBlur] {
            let err = op.apply(&mut ws, &op.parameters(), &mut events).unwrap_err();
            assert!(matches!(err, EditError::NoActiveLayer));
        }
        assert!(events.is_empty());
    }

    #[test]
    fn invert_and_desaturate_keep_alpha() {
        let src = PixelBuffer::new_filled(1, 1, Rgba([255, 0, 0, 90])).unwrap();
        assert_eq!(invert_colors(&src).get(0, 0).unwrap(), Rgba([0, 255, 255, 90]));
        // 0.2126 * 255 = 54.2
        assert_eq!(desaturate(&src).get(0, 0).unwrap(), Rgba([54, 54, 54, 90]));
    }

    #[test]
    fn gaussian_blur_of_flat_colour_is_flat() {
        let src = PixelBuffer::new_filled(6, 4, Rgba([120, 60, 30, 255])).unwrap();
        assert_eq!(gaussian_blur(&src, 1.5).unwrap(), src);
        assert!(mean_blur(&src, 0).is_err());
    }
}

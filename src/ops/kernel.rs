// ============================================================================
// KERNELS & CONVOLUTION — clamp-to-edge, RGB convolved, alpha passed through
// ============================================================================
//
// Rounding: each output channel is `round()`ed (half away from zero, i.e.
// half-up for the non-negative values produced here) and clamped to 0..=255.
// Separable passes keep the intermediate in f32 and round once at the end.

use rayon::prelude::*;

use crate::canvas::PixelBuffer;
use crate::error::EditError;

/// Which axes a Gaussian kernel spans.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelAxis {
    /// 1-D kernel laid out as `width × 1`.
    Horizontal,
    /// 1-D kernel laid out as `1 × height`.
    Vertical,
    /// Full 2-D kernel.
    Both,
}

/// Odd-sized weight matrix, row-major.  The centre cell is at
/// `(width / 2, height / 2)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    width: u32,
    height: u32,
    weights: Vec<f32>,
}

/// Radius of the Gaussian kernel used for `sigma`: `ceil(3·sigma)`.
pub fn gaussian_radius(sigma: f32) -> u32 {
    (sigma * 3.0).ceil().max(0.0) as u32
}

/// Side length of the Gaussian kernel used for `sigma`: `2·radius + 1`.
/// `None` when the side does not fit in a `u32`.
pub fn gaussian_kernel_size(sigma: f32) -> Option<u32> {
    gaussian_radius(sigma).checked_mul(2)?.checked_add(1)
}

/// Largest side length accepted by `Kernel::new`.
pub const MAX_KERNEL_SIDE: u32 = 4095;

impl Kernel {
    /// Build a `width × height` kernel.  `generator` receives the offset
    /// `(dx, dy)` of each cell from the kernel centre.
    pub fn new<F>(width: u32, height: u32, generator: F) -> Result<Self, EditError>
    where
        F: Fn(i32, i32) -> f32,
    {
        if width == 0 || height == 0 || width % 2 == 0 || height % 2 == 0 {
            return Err(EditError::InvalidKernelSize { width, height });
        }
        if width > MAX_KERNEL_SIDE || height > MAX_KERNEL_SIDE {
            return Err(EditError::InvalidKernelSize { width, height });
        }
        let cells = (width as usize)
            .checked_mul(height as usize)
            .ok_or(EditError::InvalidKernelSize { width, height })?;
        let cx = (width / 2) as i32;
        let cy = (height / 2) as i32;
        let mut weights = Vec::with_capacity(cells);
        for j in 0..height as i32 {
            for i in 0..width as i32 {
                weights.push(generator(i - cx, j - cy));
            }
        }
        Ok(Self { width, height, weights })
    }

    /// Box kernel: every weight is `1 / (width·height)`.
    pub fn mean(width: u32, height: u32) -> Result<Self, EditError> {
        let w = 1.0 / (width as f64 * height as f64);
        Self::new(width, height, |_, _| w as f32)
    }

    /// Gaussian density sampled at integer offsets, normalised to sum 1.
    ///
    /// `Horizontal` needs `height == 1`, `Vertical` needs `width == 1`.
    /// Use `gaussian_kernel_size(sigma)` for the matching side length.
    pub fn gaussian(sigma: f32, width: u32, height: u32, axis: KernelAxis) -> Result<Self, EditError> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(EditError::invalid_param("sigma", "must be a positive number"));
        }
        let shape_ok = match axis {
            KernelAxis::Horizontal => height == 1,
            KernelAxis::Vertical => width == 1,
            KernelAxis::Both => true,
        };
        if !shape_ok {
            return Err(EditError::InvalidKernelSize { width, height });
        }
        let s2 = 2.0 * (sigma as f64) * (sigma as f64);
        let density = |d: i32| (-(d as f64 * d as f64) / s2).exp();
        let raw = Self::new(width, height, |dx, dy| (density(dx) * density(dy)) as f32)?;
        Ok(raw.normalized())
    }

    /// Gaussian kernel sized by the `ceil(3·sigma)` rule.
    pub fn gaussian_for_sigma(sigma: f32, axis: KernelAxis) -> Result<Self, EditError> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(EditError::invalid_param("sigma", "must be a positive number"));
        }
        let size = gaussian_kernel_size(sigma).ok_or(match axis {
            KernelAxis::Horizontal => EditError::InvalidKernelSize { width: u32::MAX, height: 1 },
            KernelAxis::Vertical => EditError::InvalidKernelSize { width: 1, height: u32::MAX },
            KernelAxis::Both => EditError::InvalidKernelSize {
                width: u32::MAX,
                height: u32::MAX,
            },
        })?;
        match axis {
            KernelAxis::Horizontal => Self::gaussian(sigma, size, 1, axis),
            KernelAxis::Vertical => Self::gaussian(sigma, 1, size, axis),
            KernelAxis::Both => Self::gaussian(sigma, size, size, axis),
        }
    }

    /// Scale the weights so they sum to 1 (no-op for an all-zero kernel).
    pub fn normalized(mut self) -> Self {
        let sum: f64 = self.weights.iter().map(|&w| w as f64).sum();
        if sum != 0.0 {
            for w in &mut self.weights {
                *w = (*w as f64 / sum) as f32;
            }
        }
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    /// Weight at column `i`, row `j` (not offsets).
    pub fn weight(&self, i: u32, j: u32) -> f32 {
        self.weights[(j * self.width + i) as usize]
    }

    pub fn sum(&self) -> f32 {
        self.weights.iter().sum()
    }
}

// ---------------------------------------------------------------------------
//  Convolution
// ---------------------------------------------------------------------------

/// Convolve `src` with `kernel` and return a new buffer.
///
/// Out-of-range taps read the nearest edge pixel.  Only R, G and B are
/// convolved; alpha is copied from the source.
pub fn convolve(kernel: &Kernel, src: &PixelBuffer) -> PixelBuffer {
    let planes = to_f32(src);
    let out = convolve_planes(kernel, &planes, src.width() as usize, src.height() as usize);
    from_f32(&out, src)
}

/// Apply `horizontal` then `vertical` as two passes.  Equivalent to one 2-D
/// convolution with their outer product when the kernel is separable.
pub fn convolve_separable(horizontal: &Kernel, vertical: &Kernel, src: &PixelBuffer) -> PixelBuffer {
    let w = src.width() as usize;
    let h = src.height() as usize;
    let planes = to_f32(src);
    let first = convolve_planes(horizontal, &planes, w, h);
    let second = convolve_planes(vertical, &first, w, h);
    from_f32(&second, src)
}

fn to_f32(src: &PixelBuffer) -> Vec<f32> {
    src.as_raw().iter().map(|&b| b as f32).collect()
}

/// Write the convolved RGB channels back as bytes, alpha from `src`.
fn from_f32(buf: &[f32], src: &PixelBuffer) -> PixelBuffer {
    let mut out = src.clone();
    let raw = out.as_raw_mut();
    raw.par_chunks_mut(4)
        .zip(buf.par_chunks(4))
        .for_each(|(px, v)| {
            px[0] = quantize(v[0]);
            px[1] = quantize(v[1]);
            px[2] = quantize(v[2]);
        });
    out
}

#[inline]
pub(crate) fn quantize(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Core loop over interleaved RGBA f32 data (alpha lane is carried along
/// unchanged), parallel by row.
fn convolve_planes(kernel: &Kernel, input: &[f32], w: usize, h: usize) -> Vec<f32> {
    let kw = kernel.width as isize;
    let kh = kernel.height as isize;
    let cx = kw / 2;
    let cy = kh / 2;
    let weights = &kernel.weights;

    let mut output = vec![0.0f32; w * h * 4];
    output
        .par_chunks_mut(w * 4)
        .enumerate()
        .for_each(|(y, row_out)| {
            for x in 0..w {
                let mut r = 0.0f32;
                let mut g = 0.0f32;
                let mut b = 0.0f32;
                for j in 0..kh {
                    let sy = (y as isize + j - cy).clamp(0, h as isize - 1) as usize;
                    let row_in = sy * w * 4;
                    let krow = (j * kw) as usize;
                    for i in 0..kw {
                        let kv = weights[krow + i as usize];
                        if kv == 0.0 {
                            continue;
                        }
                        let sx = (x as isize + i - cx).clamp(0, w as isize - 1) as usize;
                        let idx = row_in + sx * 4;
                        r += input[idx] * kv;
                        g += input[idx + 1] * kv;
                        b += input[idx + 2] * kv;
                    }
                }
                let oi = x * 4;
                row_out[oi] = r;
                row_out[oi + 1] = g;
                row_out[oi + 2] = b;
                row_out[oi + 3] = input[y * w * 4 + oi + 3];
            }
        });
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use proptest::prelude::*;

    const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

    #[test]
    fn even_or_zero_sizes_are_rejected() {
        assert!(matches!(Kernel::mean(2, 3), Err(EditError::InvalidKernelSize { .. })));
        assert!(matches!(Kernel::mean(3, 0), Err(EditError::InvalidKernelSize { .. })));
        assert!(Kernel::new(4, 1, |_, _| 1.0).is_err());
    }

    #[test]
    fn generator_sees_centre_offsets() {
        let k = Kernel::new(3, 1, |dx, _| dx as f32).unwrap();
        assert_eq!(k.weights(), &[-1.0, 0.0, 1.0]);
    }

    #[test]
    fn gaussian_axis_shape_is_checked() {
        assert!(Kernel::gaussian(1.0, 7, 3, KernelAxis::Horizontal).is_err());
        assert!(Kernel::gaussian(1.0, 3, 7, KernelAxis::Vertical).is_err());
        assert!(Kernel::gaussian(0.0, 7, 1, KernelAxis::Horizontal).is_err());
    }

    #[test]
    fn kernel_size_rule_matches_generated_kernel() {
        for &sigma in &[0.4f32, 1.0, 1.5, 2.0, 3.3] {
            let k = Kernel::gaussian_for_sigma(sigma, KernelAxis::Horizontal).unwrap();
            assert_eq!(Some(k.width()), gaussian_kernel_size(sigma));
            assert_eq!(k.width() % 2, 1);
        }
        assert_eq!(gaussian_kernel_size(1.0), Some(7));
    }

    #[test]
    fn huge_kernels_are_rejected_without_overflow() {
        assert_eq!(gaussian_kernel_size(1.0e9), None);
        for axis in [KernelAxis::Horizontal, KernelAxis::Vertical, KernelAxis::Both] {
            assert!(matches!(
                Kernel::gaussian_for_sigma(1.0e9, axis),
                Err(EditError::InvalidKernelSize { .. })
            ));
        }
        assert!(Kernel::gaussian_for_sigma(1.0e6, KernelAxis::Horizontal).is_err());
        assert!(matches!(
            Kernel::new(65537, 65537, |_, _| 1.0),
            Err(EditError::InvalidKernelSize { width: 65537, height: 65537 })
        ));
        assert!(Kernel::mean(MAX_KERNEL_SIDE, 1).is_ok());
        assert!(Kernel::mean(MAX_KERNEL_SIDE + 2, 1).is_err());
    }

    #[test]
    fn mean_blur_of_single_white_pixel() {
        let mut buf = PixelBuffer::new_filled(5, 5, BLACK).unwrap();
        buf.set(2, 2, WHITE).unwrap();
        let out = convolve(&Kernel::mean(3, 3).unwrap(), &buf);

        // 255 / 9 = 28.33 → 28
        assert_eq!(out.get(2, 2).unwrap(), Rgba([28, 28, 28, 255]));
        assert_eq!(out.get(1, 1).unwrap(), Rgba([28, 28, 28, 255]));
        for &(x, y) in &[(0, 0), (4, 0), (0, 4), (4, 4), (0, 2), (2, 4)] {
            assert_eq!(out.get(x, y).unwrap(), BLACK, "pixel ({}, {})", x, y);
        }
        // Input untouched.
        assert_eq!(buf.get(2, 2).unwrap(), WHITE);
    }

    #[test]
    fn alpha_is_passed_through() {
        let mut buf = PixelBuffer::new_filled(3, 3, Rgba([100, 100, 100, 0])).unwrap();
        buf.set(1, 1, Rgba([100, 100, 100, 255])).unwrap();
        let out = convolve(&Kernel::mean(3, 3).unwrap(), &buf);
        assert_eq!(out.get(1, 1).unwrap()[3], 255);
        assert_eq!(out.get(0, 0).unwrap()[3], 0);
    }

    #[test]
    fn edges_clamp_instead_of_darkening() {
        let buf = PixelBuffer::new_filled(4, 3, Rgba([200, 10, 50, 255])).unwrap();
        let out = convolve(&Kernel::mean(5, 5).unwrap(), &buf);
        assert_eq!(out, buf);
    }

    #[test]
    fn separable_matches_full_gaussian() {
        let mut buf = PixelBuffer::new_filled(9, 7, BLACK).unwrap();
        buf.set(4, 3, WHITE).unwrap();
        buf.set(0, 0, Rgba([255, 0, 0, 255])).unwrap();
        let sigma = 1.2;
        let full = convolve(&Kernel::gaussian_for_sigma(sigma, KernelAxis::Both).unwrap(), &buf);
        let sep = convolve_separable(
            &Kernel::gaussian_for_sigma(sigma, KernelAxis::Horizontal).unwrap(),
            &Kernel::gaussian_for_sigma(sigma, KernelAxis::Vertical).unwrap(),
            &buf,
        );
        for (a, b) in full.as_raw().iter().zip(sep.as_raw()) {
            assert!((*a as i16 - *b as i16).abs() <= 1);
        }
    }

    proptest! {
        #[test]
        fn mean_weights_sum_to_one(w in 0u32..8, h in 0u32..8) {
            let k = Kernel::mean(w * 2 + 1, h * 2 + 1).unwrap();
            prop_assert!((k.sum() - 1.0).abs() < 1e-4);
        }

        #[test]
        fn gaussian_sums_to_one_and_is_symmetric(sigma in 1.0f32..6.0) {
            for axis in [KernelAxis::Horizontal, KernelAxis::Vertical, KernelAxis::Both] {
                let k = Kernel::gaussian_for_sigma(sigma, axis).unwrap();
                prop_assert!((k.sum() - 1.0).abs() < 1e-4);
                let (w, h) = (k.width(), k.height());
                for j in 0..h {
                    for i in 0..w {
                        let a = k.weight(i, j);
                        prop_assert!((a - k.weight(w - 1 - i, j)).abs() < 1e-6);
                        prop_assert!((a - k.weight(i, h - 1 - j)).abs() < 1e-6);
                    }
                }
            }
        }
    }
}

//! Image statistics behind the skin metrics
//!
//! Every intermediate buffer is registered with the compute backend and
//! released when it goes out of scope, on success and on early return alike.

use image::{GrayImage, Luma, RgbImage};
use imageproc::filter::{box_filter, gaussian_blur_f32};
use imageproc::gradients::{horizontal_prewitt, horizontal_sobel, vertical_prewitt, vertical_sobel};
use model_manager::ComputeBackend;
use ndarray::{Array2, Array3};

use crate::SkinMetrics;

// Rec.601 luma weights
const LUMA_R: f32 = 0.2989;
const LUMA_G: f32 = 0.5870;
const LUMA_B: f32 = 0.1140;

const HYDRATION_SCALE: f32 = 150.0;
const BRIGHTNESS_SCALE: f32 = 160.0;
const TEXTURE_BLUR_SIGMA: f32 = 1.0;
const TEXTURE_VARIANCE_GAIN: f32 = 25.0;
const SOBEL_NORM: f32 = 8.0;
const PORE_BOX_RADIUS: u32 = 2;
const PORE_SCALE: f32 = 130.0;
const PREWITT_NORM: f32 = 6.0;
const WRINKLE_SCALE: f32 = 110.0;
const SPOT_SCALE: f32 = 140.0;

/// Compute all eight metrics for a face crop
pub(crate) fn compute_metrics(backend: &ComputeBackend, face: &RgbImage) -> SkinMetrics {
    let gray = backend.track(luma_plane(face));
    let gray8 = backend.track(quantize(&gray));
    let mean_luma = mean(gray.iter().copied());

    SkinMetrics {
        hydration: clamp_score(mean_luma * HYDRATION_SCALE),
        elasticity: elasticity(backend, &gray8),
        texture: texture(backend, &gray8),
        pores: pores(backend, &gray8),
        wrinkles: wrinkles(backend, &gray8),
        spots: spots(backend, face),
        uniformity: uniformity(&gray, mean_luma),
        brightness: clamp_score(mean_luma * BRIGHTNESS_SCALE),
    }
}

/// Luminance in [0, 1], indexed `[y, x]`
fn luma_plane(face: &RgbImage) -> Array2<f32> {
    let (w, h) = face.dimensions();
    Array2::from_shape_fn((h as usize, w as usize), |(y, x)| {
        let [r, g, b] = face.get_pixel(x as u32, y as u32).0;
        (LUMA_R * r as f32 + LUMA_G * g as f32 + LUMA_B * b as f32) / 255.0
    })
}

fn quantize(gray: &Array2<f32>) -> GrayImage {
    let (h, w) = gray.dim();
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        Luma([(gray[[y as usize, x as usize]] * 255.0).round().clamp(0.0, 255.0) as u8])
    })
}

/// Smoothness: low local variance after a light blur scores high
fn texture(backend: &ComputeBackend, gray: &GrayImage) -> f32 {
    let smoothed = backend.track(gaussian_blur_f32(gray, TEXTURE_BLUR_SIGMA));
    let (w, h) = smoothed.dimensions();
    if w < 3 || h < 3 {
        return 100.0;
    }

    let local = backend.track(Array2::from_shape_fn(
        (h as usize - 2, w as usize - 2),
        |(y, x)| {
            let window = (0..3).flat_map(|dy| (0..3).map(move |dx| (dx, dy))).map(|(dx, dy)| {
                smoothed.get_pixel(x as u32 + dx, y as u32 + dy).0[0] as f32 / 255.0
            });
            variance(window)
        },
    ));

    clamp_score((1.0 - TEXTURE_VARIANCE_GAIN * mean(local.iter().copied())) * 100.0)
}

/// Firmness: fewer strong edges scores high
fn elasticity(backend: &ComputeBackend, gray: &GrayImage) -> f32 {
    let gx = backend.track(horizontal_sobel(gray));
    let gy = backend.track(vertical_sobel(gray));
    let scale = SOBEL_NORM * 255.0;

    let magnitude = mean(gx.pixels().zip(gy.pixels()).map(|(x, y)| {
        let (x, y) = (x.0[0] as f32 / scale, y.0[0] as f32 / scale);
        (x * x + y * y).sqrt()
    }));

    clamp_score((1.0 - magnitude) * 100.0)
}

/// Pore visibility: distance from a 5x5 box-filtered copy
fn pores(backend: &ComputeBackend, gray: &GrayImage) -> f32 {
    let blurred = backend.track(box_filter(gray, PORE_BOX_RADIUS, PORE_BOX_RADIUS));

    let detail = mean(
        gray.pixels()
            .zip(blurred.pixels())
            .map(|(a, b)| (a.0[0] as f32 - b.0[0] as f32).abs() / 255.0),
    );

    clamp_score((1.0 - detail) * PORE_SCALE)
}

/// Line density: strongest directional Prewitt response per pixel
fn wrinkles(backend: &ComputeBackend, gray: &GrayImage) -> f32 {
    let gx = backend.track(horizontal_prewitt(gray));
    let gy = backend.track(vertical_prewitt(gray));
    let scale = PREWITT_NORM * 255.0;

    let response = mean(
        gx.pixels()
            .zip(gy.pixels())
            .map(|(x, y)| (x.0[0].unsigned_abs().max(y.0[0].unsigned_abs())) as f32 / scale),
    );

    clamp_score((1.0 - response) * WRINKLE_SCALE)
}

/// Pigmentation: per-channel color variance around each channel mean
fn spots(backend: &ComputeBackend, face: &RgbImage) -> f32 {
    let (w, h) = face.dimensions();
    let rgb = backend.track(Array3::from_shape_fn(
        (h as usize, w as usize, 3),
        |(y, x, c)| face.get_pixel(x as u32, y as u32).0[c] as f32 / 255.0,
    ));

    let mut total = 0.0;
    let mut count = 0usize;
    for channel in rgb.axis_iter(ndarray::Axis(2)) {
        let channel_mean = mean(channel.iter().copied());
        total += channel.iter().map(|v| (v - channel_mean).powi(2)).sum::<f32>();
        count += channel.len();
    }
    let var = if count > 0 { total / count as f32 } else { 0.0 };

    clamp_score((1.0 - var) * SPOT_SCALE)
}

/// Tone evenness: luminance standard deviation
fn uniformity(gray: &Array2<f32>, mean_luma: f32) -> f32 {
    let var = mean(gray.iter().map(|v| (v - mean_luma).powi(2)));
    clamp_score((1.0 - var.sqrt()) * 100.0)
}

fn mean(values: impl Iterator<Item = f32>) -> f32 {
    let (sum, n) = values.fold((0.0f32, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f32
    }
}

fn variance(values: impl Iterator<Item = f32> + Clone) -> f32 {
    let m = mean(values.clone());
    mean(values.map(|v| (v - m).powi(2)))
}

fn clamp_score(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use proptest::prelude::*;

    fn flat(w: u32, h: u32, rgb: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb(rgb))
    }

    #[test]
    fn test_flat_image_is_perfectly_smooth() {
        let backend = ComputeBackend::new();
        let metrics = compute_metrics(&backend, &flat(32, 32, [128, 128, 128]));

        assert!(metrics.texture > 99.9);
        assert!(metrics.uniformity > 99.9);
        assert!((metrics.hydration - 128.0 / 255.0 * 150.0).abs() < 0.5);
        // Brightness uses the steeper scale
        assert!(metrics.brightness > metrics.hydration);
    }

    #[test]
    fn test_white_image_clamps_to_ceiling() {
        let backend = ComputeBackend::new();
        let metrics = compute_metrics(&backend, &flat(16, 16, [255, 255, 255]));
        assert_eq!(metrics.hydration, 100.0);
        assert_eq!(metrics.brightness, 100.0);
        assert_eq!(metrics.spots, 100.0);
    }

    #[test]
    fn test_stripes_lower_edge_metrics() {
        let backend = ComputeBackend::new();
        let smooth = compute_metrics(&backend, &flat(32, 32, [150, 120, 100]));
        let striped = RgbImage::from_fn(32, 32, |x, _| {
            if x % 4 < 2 {
                Rgb([230, 200, 180])
            } else {
                Rgb([60, 40, 30])
            }
        });
        let striped = compute_metrics(&backend, &striped);

        assert!(striped.wrinkles < smooth.wrinkles);
        assert!(striped.elasticity < smooth.elasticity);
        assert!(striped.uniformity < smooth.uniformity);
        // Channel variance of [0, 1] values never exceeds 0.25, so spots saturates
        assert_eq!(striped.spots, 100.0);
    }

    #[test]
    fn test_tiny_crop_does_not_panic() {
        let backend = ComputeBackend::new();
        let metrics = compute_metrics(&backend, &flat(1, 2, [10, 200, 30]));
        assert!(metrics.in_bounds());
    }

    #[test]
    fn test_buffers_released_after_computation() {
        let backend = ComputeBackend::new();
        compute_metrics(&backend, &flat(24, 24, [90, 80, 70]));
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_bytes(), 0);
    }

    proptest! {
        #[test]
        fn prop_scores_stay_in_bounds(
            w in 1u32..24,
            h in 1u32..24,
            seed in any::<u64>(),
        ) {
            let image = RgbImage::from_fn(w, h, |x, y| {
                let v = seed
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add((y * w + x) as u64 * 1442695040888963407);
                Rgb([(v >> 16) as u8, (v >> 32) as u8, (v >> 48) as u8])
            });
            let metrics = compute_metrics(&ComputeBackend::new(), &image);
            prop_assert!(metrics.in_bounds());
        }
    }
}

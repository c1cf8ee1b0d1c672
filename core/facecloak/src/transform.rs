//! Per-zone perturbation: bilateral smoothing, luminance-only noise, a small
//! asymmetric shift, and a feathered composite back into the image.

use image::{Rgb, RgbImage};
use rand::Rng;

use crate::color::{lab_to_rgb, rgb_to_lab, LIGHTNESS_TO_8BIT};
use crate::geometry::BoundingBox;
use crate::locator::{Zone, ZoneKind};
use crate::profile::PrivacyProfile;

/// Margin added around every zone before it is processed.
pub const ZONE_PADDING: u32 = 5;

/// Width of the blend ramp at each edge of a padded zone.
pub const FEATHER_WIDTH: u32 = 3;

const SIGMA_COLOR: f64 = 75.0;
const SIGMA_SPACE: f64 = 75.0;

/// Apply the profile's perturbation to every zone and return the result.
///
/// The input image is left untouched. Zones are processed in order, each
/// reading the image as left by the previous ones, so where padded regions
/// overlap the later zone's pixels win.
pub fn transform<R: Rng + ?Sized>(
    image: &RgbImage,
    zones: &[Zone],
    profile: &PrivacyProfile,
    rng: &mut R,
) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut out = image.clone();

    for zone in zones {
        let Some(region) = zone.bbox.pad(ZONE_PADDING, width, height) else {
            tracing::debug!(kind = ?zone.kind, bbox = ?zone.bbox, "zone outside image, skipped");
            continue;
        };

        let original = crop(&out, &region);
        let transformed = transform_crop(&original, zone.kind, profile, rng);
        let blended = feather_composite(&original, &transformed, FEATHER_WIDTH);
        image::imageops::replace(&mut out, &blended, region.x as i64, region.y as i64);

        tracing::debug!(kind = ?zone.kind, region = ?region, "zone perturbed");
    }

    out
}

fn crop(image: &RgbImage, region: &BoundingBox) -> RgbImage {
    image::imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image()
}

/// Smoothing, noise and shift for one padded crop, before feathering.
pub(crate) fn transform_crop<R: Rng + ?Sized>(
    crop: &RgbImage,
    kind: ZoneKind,
    profile: &PrivacyProfile,
    rng: &mut R,
) -> RgbImage {
    let smoothed = bilateral_filter(crop, profile.kernel_diameter(), SIGMA_COLOR, SIGMA_SPACE);
    let noisy = add_luminance_noise(&smoothed, profile.noise_strength, rng);
    let (dx, dy) = match kind {
        ZoneKind::Eye => (profile.shift_amount, 0),
        ZoneKind::NoseBridge => (0, profile.shift_amount),
    };
    translate_reflect(&noisy, dx, dy)
}

/// Edge-preserving smoothing.
///
/// Each output pixel is the average of its neighbors within a disc of radius
/// `diameter / 2`, weighted by spatial distance and by the sum of
/// absolute channel differences to the center pixel. Samples beyond the crop
/// are mirrored without repeating the edge pixel.
pub fn bilateral_filter(
    src: &RgbImage,
    diameter: u32,
    sigma_color: f64,
    sigma_space: f64,
) -> RgbImage {
    let (w, h) = src.dimensions();
    let radius = (diameter / 2) as i64;

    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let color_weights: Vec<f64> = (0..=255 * 3)
        .map(|d| ((d * d) as f64 * color_coeff).exp())
        .collect();

    let mut taps: Vec<(i64, i64, f64)> = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let dist2 = (dx * dx + dy * dy) as f64;
            if dist2.sqrt() <= radius as f64 {
                taps.push((dx, dy, (dist2 * space_coeff).exp()));
            }
        }
    }

    RgbImage::from_fn(w, h, |x, y| {
        let center = src.get_pixel(x, y).0;
        let mut acc = [0.0f64; 3];
        let mut total = 0.0f64;

        for &(dx, dy, space_weight) in &taps {
            let sx = reflect_101(x as i64 + dx, w);
            let sy = reflect_101(y as i64 + dy, h);
            let sample = src.get_pixel(sx, sy).0;
            let distance: usize = (0..3)
                .map(|c| (sample[c] as i32 - center[c] as i32).unsigned_abs() as usize)
                .sum();
            let weight = space_weight * color_weights[distance];
            for c in 0..3 {
                acc[c] += weight * sample[c] as f64;
            }
            total += weight;
        }

        Rgb(acc.map(|v| (v / total).round().clamp(0.0, 255.0) as u8))
    })
}

/// Add zero-mean Gaussian noise to L\* only, with a standard deviation of
/// `strength × 255` on the 8-bit lightness scale. a\*/b\* are carried through
/// unchanged.
pub fn add_luminance_noise<R: Rng + ?Sized>(
    src: &RgbImage,
    strength: f64,
    rng: &mut R,
) -> RgbImage {
    if strength <= 0.0 {
        return src.clone();
    }
    let sigma = (strength * 255.0) as f32;

    let mut out = src.clone();
    for pixel in out.pixels_mut() {
        let [l, a, b] = rgb_to_lab(pixel.0);
        let lightness = (l * LIGHTNESS_TO_8BIT + sigma * standard_normal(rng)).clamp(0.0, 255.0);
        pixel.0 = lab_to_rgb([lightness / LIGHTNESS_TO_8BIT, a, b]);
    }
    out
}

/// One sample from N(0, 1) by the Box-Muller transform.
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    // 1 - [0, 1) keeps the logarithm finite.
    let u1: f64 = 1.0 - rng.random::<f64>();
    let u2: f64 = rng.random::<f64>();
    ((-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()) as f32
}

/// Translate by whole pixels, filling uncovered pixels by mirroring the crop
/// edge (`cba|abc`).
pub fn translate_reflect(src: &RgbImage, dx: u32, dy: u32) -> RgbImage {
    if dx == 0 && dy == 0 {
        return src.clone();
    }
    let (w, h) = src.dimensions();
    RgbImage::from_fn(w, h, |x, y| {
        let sx = reflect(x as i64 - dx as i64, w);
        let sy = reflect(y as i64 - dy as i64, h);
        *src.get_pixel(sx, sy)
    })
}

/// Mirror index including the edge pixel: `cba|abcd|dcb`.
fn reflect(mut i: i64, n: u32) -> u32 {
    let n = n as i64;
    if n == 1 {
        return 0;
    }
    while i < 0 || i >= n {
        i = if i < 0 { -i - 1 } else { 2 * n - i - 1 };
    }
    i as u32
}

/// Mirror index excluding the edge pixel: `dcb|abcd|cba`.
fn reflect_101(mut i: i64, n: u32) -> u32 {
    let n = n as i64;
    if n == 1 {
        return 0;
    }
    while i < 0 || i >= n {
        i = if i < 0 { -i } else { 2 * n - 2 - i };
    }
    i as u32
}

/// Blend weight of pixel `(x, y)` in a `width` × `height` crop.
///
/// Each edge contributes a ramp `min(d / feather, 1)`, where `d` is the
/// distance in pixels from that edge (0 on the edge itself). The weight is
/// the product of all four ramps.
pub fn feather_weight(x: u32, y: u32, width: u32, height: u32, feather: u32) -> f32 {
    let ramp = |d: u32| {
        if feather == 0 || d >= feather {
            1.0
        } else {
            d as f32 / feather as f32
        }
    };
    ramp(x) * ramp(width - 1 - x) * ramp(y) * ramp(height - 1 - y)
}

/// `weight × transformed + (1 − weight) × original` per channel.
pub fn feather_composite(original: &RgbImage, transformed: &RgbImage, feather: u32) -> RgbImage {
    let (w, h) = original.dimensions();
    RgbImage::from_fn(w, h, |x, y| {
        let weight = feather_weight(x, y, w, h, feather);
        let o = original.get_pixel(x, y).0;
        let t = transformed.get_pixel(x, y).0;
        Rgb(std::array::from_fn(|c| {
            (weight * t[c] as f32 + (1.0 - weight) * o[c] as f32)
                .round()
                .clamp(0.0, 255.0) as u8
        }))
    })
}

use image::{DynamicImage, GrayImage, Luma};
use imageproc::filter::median_filter;
use log::{debug, warn};
use std::panic::{catch_unwind, AssertUnwindSafe};

pub const CONTRAST_FACTOR: f32 = 2.0;
pub const SHARPNESS_FACTOR: f32 = 1.5;

/// 3x3 median window
const MEDIAN_RADIUS: u32 = 1;

const SMOOTH_KERNEL: [f32; 9] = [1.0, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0];
const SMOOTH_WEIGHT: f32 = 13.0;

/// Normalize a rendered page before recognition.
///
/// With `enhance` off the image is handed back untouched. Otherwise it is
/// converted to grayscale, contrast-boosted, sharpened and, when `denoise` is
/// set, median filtered. A stage that fails stops the chain and the last good
/// image is returned; this function never fails.
pub fn preprocess_image(image: DynamicImage, enhance: bool, denoise: bool) -> DynamicImage {
    if !enhance {
        return image;
    }

    let Some(gray) = run_stage("grayscale", || image.to_luma8()) else {
        return image;
    };

    DynamicImage::ImageLuma8(apply_stages(gray, &enhancement_stages(denoise)))
}

type StageFn = fn(&GrayImage) -> GrayImage;

fn enhancement_stages(denoise: bool) -> Vec<(&'static str, StageFn)> {
    let mut stages = vec![
        ("contrast", contrast_stage as StageFn),
        ("sharpness", sharpness_stage as StageFn),
    ];
    if denoise {
        stages.push(("median", median_stage as StageFn));
    }
    stages
}

/// Run `stages` in order, stopping at the first one that panics.
fn apply_stages(mut current: GrayImage, stages: &[(&'static str, StageFn)]) -> GrayImage {
    for (name, stage) in stages {
        match run_stage(name, || stage(&current)) {
            Some(next) => current = next,
            None => break,
        }
    }
    current
}

fn contrast_stage(image: &GrayImage) -> GrayImage {
    adjust_contrast(image, CONTRAST_FACTOR)
}

fn sharpness_stage(image: &GrayImage) -> GrayImage {
    adjust_sharpness(image, SHARPNESS_FACTOR)
}

fn median_stage(image: &GrayImage) -> GrayImage {
    median_filter(image, MEDIAN_RADIUS, MEDIAN_RADIUS)
}

fn run_stage<T>(name: &str, stage: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(stage)) {
        Ok(out) => {
            debug!("Preprocessing stage '{}' applied", name);
            Some(out)
        }
        Err(_) => {
            warn!("Preprocessing stage '{}' failed, keeping previous image", name);
            None
        }
    }
}

/// Blend every pixel away from the image's mean gray level by `factor`.
pub fn adjust_contrast(image: &GrayImage, factor: f32) -> GrayImage {
    let pixels = image.as_raw();
    if pixels.is_empty() {
        return image.clone();
    }

    let sum: u64 = pixels.iter().map(|&p| p as u64).sum();
    let mean = (sum as f32 / pixels.len() as f32).round();

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        pixel.0[0] = blend(mean, pixel.0[0] as f32, factor);
    }
    out
}

/// Blend every pixel away from a smoothed copy of the image by `factor`.
/// Border pixels have no full neighbourhood and are left as they are.
pub fn adjust_sharpness(image: &GrayImage, factor: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut out = image.clone();
    if width < 3 || height < 3 {
        return out;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut acc = 0.0f32;
            for (i, weight) in SMOOTH_KERNEL.iter().enumerate() {
                let nx = x + (i as u32 % 3) - 1;
                let ny = y + (i as u32 / 3) - 1;
                acc += weight * image.get_pixel(nx, ny).0[0] as f32;
            }
            let smooth = (acc / SMOOTH_WEIGHT).round();
            let original = image.get_pixel(x, y).0[0] as f32;
            out.put_pixel(x, y, Luma([blend(smooth, original, factor)]));
        }
    }
    out
}

fn blend(degenerate: f32, original: f32, factor: f32) -> u8 {
    (degenerate + factor * (original - degenerate)).round().clamp(0.0, 255.0) as u8
}

//! Letterbox formatting of frames for the action classifier.

use crate::error::{AssistError, Result};
use crate::vision::Frame;
use image::RgbImage;
use image::imageops::{self, FilterType};

/// Square model input: RGB, row-major, values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedFrame {
    pub resolution: u32,
    /// `resolution * resolution * 3` floats.
    pub data: Vec<f32>,
}

/// Resize `frame` to fit a `resolution`-sided square, preserving aspect
/// ratio, centering it, and zero-padding the borders.
///
/// # Errors
///
/// Returns an error for empty frames, a zero resolution, or a pixel buffer
/// that does not match the frame dimensions.
pub fn letterbox(frame: &Frame, resolution: u32) -> Result<NormalizedFrame> {
    if resolution == 0 {
        return Err(AssistError::Classification(
            "model resolution must be non-zero".into(),
        ));
    }
    if frame.width == 0 || frame.height == 0 {
        return Err(AssistError::Classification("empty frame".into()));
    }

    let img = RgbImage::from_raw(frame.width, frame.height, frame.pixels.clone()).ok_or_else(
        || {
            AssistError::Classification(format!(
                "pixel buffer does not match {}x{} frame",
                frame.width, frame.height
            ))
        },
    )?;

    let target = f64::from(resolution);
    let scale = f64::min(
        target / f64::from(frame.width),
        target / f64::from(frame.height),
    );
    let scaled_w = scaled_side(frame.width, scale, resolution);
    let scaled_h = scaled_side(frame.height, scale, resolution);

    let resized = if scaled_w == frame.width && scaled_h == frame.height {
        img
    } else {
        imageops::resize(&img, scaled_w, scaled_h, FilterType::Triangle)
    };

    let mut canvas = RgbImage::new(resolution, resolution);
    let x = (resolution - scaled_w) / 2;
    let y = (resolution - scaled_h) / 2;
    imageops::overlay(&mut canvas, &resized, i64::from(x), i64::from(y));

    let data = canvas
        .into_raw()
        .into_iter()
        .map(|v| f32::from(v) / 255.0)
        .collect();

    Ok(NormalizedFrame { resolution, data })
}

fn scaled_side(side: u32, scale: f64, resolution: u32) -> u32 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let scaled = (f64::from(side) * scale).round() as u32;
    scaled.clamp(1, resolution)
}

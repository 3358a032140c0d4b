//! Crop geometry and rendering.
//!
//! A crop rectangle is declared against the coordinate space the user saw
//! when drawing it (`declared` dimensions). The base reference may decode to
//! a different size (commonly a downscaled preview), so the rectangle is
//! rescaled by `decoded / declared` per axis before sampling, then clamped
//! to the decoded bounds. Output pixels are capped at [`MAX_OUTPUT_PIXELS`];
//! larger samples are downscaled proportionally.
//!
//! The math lives in pure functions so the size formula
//! `round(w·W/Ws) × round(h·H/Hs)` is testable without any image bytes.

use image::ImageFormat;
use image::imageops::FilterType;
use miette::Diagnostic;
use std::io::Cursor;
use thiserror::Error;

use crate::media::CropRect;

/// Upper bound on rendered crop output, in pixels.
pub const MAX_OUTPUT_PIXELS: u32 = 4_194_304; // 2048 × 2048

/// Errors while decoding or rendering a crop.
#[derive(Debug, Error, Diagnostic)]
pub enum CropError {
    /// The base reference did not decode as an image.
    #[error("failed to decode base image: {source}")]
    #[diagnostic(code(musegraph::crop::decode))]
    Decode {
        #[source]
        source: image::ImageError,
    },

    /// Re-encoding the rendered crop failed.
    #[error("failed to encode cropped image: {source}")]
    #[diagnostic(code(musegraph::crop::encode))]
    Encode {
        #[source]
        source: image::ImageError,
    },

    /// The rectangle samples no pixels once clamped to the image.
    #[error("crop rectangle {rect:?} is empty against a {width}x{height} image")]
    #[diagnostic(
        code(musegraph::crop::empty_region),
        help("The declared rectangle lies outside the decoded image or has zero area.")
    )]
    EmptyRegion {
        rect: CropRect,
        width: u32,
        height: u32,
    },
}

/// A sampled region in decoded-image coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SampleRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Transfer `rect` from the declared space into the decoded space and clamp
/// it to the image bounds.
///
/// Scale factors are computed per axis (`decoded / declared`), so a
/// rectangle drawn against a full-resolution preview samples the right
/// pixels of a downscaled decode and vice versa. Returns `None` when the
/// clamped region has zero area.
#[must_use]
pub fn sample_region(
    declared: (u32, u32),
    decoded: (u32, u32),
    rect: CropRect,
) -> Option<SampleRegion> {
    let (declared_w, declared_h) = declared;
    let (decoded_w, decoded_h) = decoded;
    if declared_w == 0 || declared_h == 0 || decoded_w == 0 || decoded_h == 0 {
        return None;
    }
    if !rect.is_positive() {
        return None;
    }

    let scale_x = f64::from(decoded_w) / f64::from(declared_w);
    let scale_y = f64::from(decoded_h) / f64::from(declared_h);

    let x = (rect.x * scale_x).round().max(0.0) as u32;
    let y = (rect.y * scale_y).round().max(0.0) as u32;
    if x >= decoded_w || y >= decoded_h {
        return None;
    }

    let width = ((rect.width * scale_x).round() as u32).min(decoded_w - x);
    let height = ((rect.height * scale_y).round() as u32).min(decoded_h - y);
    if width == 0 || height == 0 {
        return None;
    }

    Some(SampleRegion {
        x,
        y,
        width,
        height,
    })
}

/// Shrink `(width, height)` proportionally until it fits the pixel budget.
#[must_use]
pub fn budgeted_size(width: u32, height: u32, max_pixels: u32) -> (u32, u32) {
    let pixels = u64::from(width) * u64::from(height);
    if pixels <= u64::from(max_pixels) {
        return (width, height);
    }
    let scale = (f64::from(max_pixels) / pixels as f64).sqrt();
    let w = ((f64::from(width) * scale) as u32).max(1);
    let h = ((f64::from(height) * scale) as u32).max(1);
    (w, h)
}

/// Decode `bytes`, sample `rect` (declared against `declared` dimensions),
/// cap the output at [`MAX_OUTPUT_PIXELS`], and re-encode as PNG.
pub fn render_crop(
    bytes: &[u8],
    rect: CropRect,
    declared: (u32, u32),
) -> Result<Vec<u8>, CropError> {
    let base = image::load_from_memory(bytes).map_err(|source| CropError::Decode { source })?;
    let decoded = (base.width(), base.height());

    let region = sample_region(declared, decoded, rect).ok_or(CropError::EmptyRegion {
        rect,
        width: decoded.0,
        height: decoded.1,
    })?;

    let mut out = base
        .crop_imm(region.x, region.y, region.width, region.height);

    let (budget_w, budget_h) = budgeted_size(region.width, region.height, MAX_OUTPUT_PIXELS);
    if (budget_w, budget_h) != (region.width, region.height) {
        out = out.resize_exact(budget_w, budget_h, FilterType::Triangle);
    }

    let mut encoded = Cursor::new(Vec::new());
    out.write_to(&mut encoded, ImageFormat::Png)
        .map_err(|source| CropError::Encode { source })?;
    Ok(encoded.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_scales_with_decoded_size() {
        // Declared against 1000x500, decoded at 200x100: scale 0.2 both axes.
        let region = sample_region(
            (1000, 500),
            (200, 100),
            CropRect::new(100.0, 50.0, 500.0, 250.0),
        )
        .unwrap();
        assert_eq!(
            region,
            SampleRegion {
                x: 20,
                y: 10,
                width: 100,
                height: 50
            }
        );
    }

    #[test]
    fn region_is_clamped_to_bounds() {
        // Rectangle overhangs the right/bottom edges.
        let region = sample_region(
            (100, 100),
            (100, 100),
            CropRect::new(80.0, 90.0, 50.0, 50.0),
        )
        .unwrap();
        assert_eq!(region.width, 20);
        assert_eq!(region.height, 10);
    }

    #[test]
    fn degenerate_rects_yield_no_region() {
        assert!(sample_region((100, 100), (100, 100), CropRect::new(0.0, 0.0, 0.0, 10.0)).is_none());
        assert!(
            sample_region((100, 100), (100, 100), CropRect::new(200.0, 0.0, 10.0, 10.0)).is_none()
        );
        assert!(sample_region((0, 100), (100, 100), CropRect::new(0.0, 0.0, 10.0, 10.0)).is_none());
    }

    #[test]
    fn budget_preserves_small_sizes() {
        assert_eq!(budgeted_size(640, 480, MAX_OUTPUT_PIXELS), (640, 480));
    }

    #[test]
    fn budget_downscales_proportionally() {
        let (w, h) = budgeted_size(8192, 4096, MAX_OUTPUT_PIXELS);
        assert!(u64::from(w) * u64::from(h) <= u64::from(MAX_OUTPUT_PIXELS));
        // Aspect ratio approximately preserved.
        let ratio = f64::from(w) / f64::from(h);
        assert!((ratio - 2.0).abs() < 0.01);
    }

    #[test]
    fn render_crop_produces_expected_dimensions() {
        // 40x20 solid image; crop declared against a 80x40 space.
        let mut img = image::RgbaImage::new(40, 20);
        for p in img.pixels_mut() {
            *p = image::Rgba([10, 20, 30, 255]);
        }
        let mut bytes = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut bytes, ImageFormat::Png)
            .unwrap();

        // Declared rect 20x10 at (10,5) in an 80x40 space → scale 0.5 → 10x5 at (5,2|3).
        let out = render_crop(
            bytes.get_ref(),
            CropRect::new(10.0, 5.0, 20.0, 10.0),
            (80, 40),
        )
        .unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (10, 5));
    }

    #[test]
    fn render_crop_rejects_garbage_bytes() {
        let err = render_crop(b"not an image", CropRect::new(0.0, 0.0, 1.0, 1.0), (1, 1));
        assert!(matches!(err, Err(CropError::Decode { .. })));
    }
}

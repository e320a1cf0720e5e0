//! Preview derivation
//!
//! A preview is a marked copy of a real raster. Standard codes get a
//! translucent watermark that leaves the code readable; AI art is defaced so
//! the free preview can never be scanned on its own.
//!
//! Labels need a font. Font loading is non-fatal by design: when no font is
//! available the preview is produced without its text.

use crate::artifact::{ArtifactVariant, RasterAsset};
use crate::error::{Error, Result};
use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage, imageops};
use imageproc::drawing::{draw_filled_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use imageproc::rect::Rect;
use std::f32::consts::FRAC_PI_4;
use std::path::Path;
use std::sync::Arc;

const WATERMARK_TEXT: &str = "PREVIEW";
const WATERMARK_COLOR: Rgba<u8> = Rgba([255, 0, 0, 128]);
const WATERMARK_SCALE: f32 = 30.0;
const CROSS_COLOR: Rgba<u8> = Rgba([255, 0, 0, 100]);
const CROSS_WIDTH: i32 = 5;

const DEFACE_COLOR: Rgb<u8> = Rgb([10, 10, 10]);
const BADGE_TEXT: &str = "SAMPLE";
const BADGE_COLOR: Rgb<u8> = Rgb([0, 255, 255]);
const BADGE_TEXT_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const BADGE_WIDTH: u32 = 100;
const BADGE_HEIGHT: u32 = 30;
const BADGE_SCALE: f32 = 16.0;

/// Load a TrueType/OpenType font for preview labels.
pub fn load_font(path: &Path) -> Result<FontVec> {
    let data = std::fs::read(path)?;
    FontVec::try_from_vec(data)
        .map_err(|e| Error::Image(format!("Invalid font {}: {e}", path.display())))
}

/// Derives preview rasters from real rasters
#[derive(Clone, Default)]
pub struct PreviewTransform {
    font: Option<Arc<FontVec>>,
}

impl std::fmt::Debug for PreviewTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewTransform")
            .field("font_loaded", &self.font.is_some())
            .finish()
    }
}

impl PreviewTransform {
    /// Build a transform, trying to load the label font from `font_path`.
    ///
    /// A missing or unreadable font only disables the labels.
    pub fn new(font_path: Option<&Path>) -> Self {
        let font = font_path.and_then(|path| match load_font(path) {
            Ok(font) => Some(Arc::new(font)),
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "Preview font unavailable, labels disabled"
                );
                None
            }
        });
        Self { font }
    }

    /// Transform without any labels
    pub fn without_font() -> Self {
        Self { font: None }
    }

    /// Whether labels will be drawn
    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Produce the preview for `real`. The input raster is not modified.
    pub fn derive(&self, real: &RasterAsset, variant: ArtifactVariant) -> RasterAsset {
        let image = match variant {
            ArtifactVariant::Standard => DynamicImage::ImageRgba8(self.watermark(&real.image)),
            ArtifactVariant::Ai => DynamicImage::ImageRgb8(self.deface(&real.image)),
        };
        RasterAsset {
            image,
            format: real.format,
        }
    }

    fn watermark(&self, source: &DynamicImage) -> RgbaImage {
        let mut base = source.to_rgba8();
        let (w, h) = base.dimensions();
        let mut overlay = RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 0]));

        if let Some(font) = &self.font {
            let mut label = RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 0]));
            draw_text_mut(
                &mut label,
                WATERMARK_COLOR,
                (w / 4) as i32,
                (h / 2) as i32,
                PxScale::from(WATERMARK_SCALE),
                &**font,
                WATERMARK_TEXT,
            );
            let label = rotate_about_center(
                &label,
                -FRAC_PI_4,
                Interpolation::Bilinear,
                Rgba([0, 0, 0, 0]),
            );
            imageops::overlay(&mut overlay, &label, 0, 0);
        }

        let (wf, hf) = (w as f32, h as f32);
        for offset in -(CROSS_WIDTH / 2)..=(CROSS_WIDTH / 2) {
            let d = offset as f32;
            draw_line_segment_mut(&mut overlay, (d, 0.0), (wf + d, hf), CROSS_COLOR);
            draw_line_segment_mut(&mut overlay, (d, hf), (wf + d, 0.0), CROSS_COLOR);
        }

        imageops::overlay(&mut base, &overlay, 0, 0);
        base
    }

    fn deface(&self, source: &DynamicImage) -> RgbImage {
        let mut base = source.to_rgb8();
        let (w, h) = base.dimensions();

        draw_filled_rect_mut(&mut base, deface_region(w, h), DEFACE_COLOR);

        let badge_x = w.saturating_sub(BADGE_WIDTH);
        let badge = Rect::at(badge_x as i32, 0).of_size(BADGE_WIDTH.min(w), BADGE_HEIGHT.min(h));
        draw_filled_rect_mut(&mut base, badge, BADGE_COLOR);

        if let Some(font) = &self.font {
            draw_text_mut(
                &mut base,
                BADGE_TEXT_COLOR,
                (badge_x + 10) as i32,
                5,
                PxScale::from(BADGE_SCALE),
                &**font,
                BADGE_TEXT,
            );
        }

        base
    }
}

/// Block painted over the top-left of AI art.
///
/// Spans from 1/40 to 2/5 of each side, which swallows the top-left finder
/// pattern of any code filling the frame.
fn deface_region(w: u32, h: u32) -> Rect {
    let x0 = w / 40;
    let y0 = h / 40;
    let x1 = (w * 2 / 5).max(x0 + 1);
    let y1 = (h * 2 / 5).max(y0 + 1);
    Rect::at(x0 as i32, y0 as i32).of_size(x1 - x0, y1 - y0)
}

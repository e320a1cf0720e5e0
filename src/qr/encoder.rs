//! Standard QR rendering

use crate::artifact::RasterAsset;
use crate::error::{Error, Result};
use image::{DynamicImage, Luma, Rgb, RgbImage, imageops};
use qrcode::{EcLevel, QrCode};
use serde::{Deserialize, Serialize};

/// Error correction level of rendered codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCorrection {
    /// ~7% recovery
    L,
    /// ~15% recovery
    M,
    /// ~25% recovery
    Q,
    /// ~30% recovery
    H,
}

impl ErrorCorrection {
    /// Parse a level letter (case-insensitive)
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "L" => Some(Self::L),
            "M" => Some(Self::M),
            "Q" => Some(Self::Q),
            "H" => Some(Self::H),
            _ => None,
        }
    }

    fn as_ec_level(self) -> EcLevel {
        match self {
            Self::L => EcLevel::L,
            Self::M => EcLevel::M,
            Self::Q => EcLevel::Q,
            Self::H => EcLevel::H,
        }
    }
}

/// Rendering parameters for standard codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Error correction level
    pub error_correction: ErrorCorrection,
    /// Edge length of one module in pixels
    pub module_size: u32,
    /// Quiet zone width in modules
    pub border: u32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            error_correction: ErrorCorrection::M,
            module_size: 12,
            border: 4,
        }
    }
}

/// Renders URLs into black-on-white QR rasters
#[derive(Debug, Clone, Default)]
pub struct QrRenderer {
    options: RenderOptions,
}

impl QrRenderer {
    /// Create a renderer with fixed options
    pub fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    /// Render `url` with the configured options.
    pub fn render_url(&self, url: &str) -> Result<RasterAsset> {
        let RenderOptions {
            error_correction,
            module_size,
            border,
        } = self.options;
        Self::render(url, error_correction, module_size, border)
    }

    /// Encode `url` into an RGB raster. The smallest QR version holding the
    /// data is chosen.
    pub fn render(
        url: &str,
        error_correction: ErrorCorrection,
        module_size: u32,
        border: u32,
    ) -> Result<RasterAsset> {
        if url.is_empty() {
            return Err(Error::Encoding("URL must not be empty".to_string()));
        }
        if module_size == 0 {
            return Err(Error::Encoding("module size must be at least 1".to_string()));
        }

        let code =
            QrCode::with_error_correction_level(url.as_bytes(), error_correction.as_ec_level())
                .map_err(|e| Error::Encoding(format!("Failed to create QR code: {}", e)))?;

        let modules = code
            .render::<Luma<u8>>()
            .quiet_zone(false)
            .module_dimensions(module_size, module_size)
            .build();
        let modules = DynamicImage::ImageLuma8(modules).to_rgb8();

        let margin = border * module_size;
        let mut canvas = RgbImage::from_pixel(
            modules.width() + 2 * margin,
            modules.height() + 2 * margin,
            Rgb([255, 255, 255]),
        );
        imageops::replace(&mut canvas, &modules, margin as i64, margin as i64);

        Ok(RasterAsset::png(DynamicImage::ImageRgb8(canvas)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr::QrDecoder;

    #[test]
    fn rendered_url_decodes_exactly() {
        let renderer = QrRenderer::default();
        let decoder = QrDecoder::new();

        for url in [
            "https://example.com",
            "https://example.com/path?query=1&other=two#frag",
            "http://localhost:5001/",
        ] {
            let raster = renderer.render_url(url).unwrap();
            let decoded = decoder.decode(&raster.image).unwrap();
            assert_eq!(decoded.as_str(), Some(url));
        }
    }

    #[test]
    fn border_and_module_size_shape_the_raster() {
        // "https://example.com" fits version 2 at level M: 25 modules
        let raster =
            QrRenderer::render("https://example.com", ErrorCorrection::M, 10, 2).unwrap();
        assert_eq!(raster.dimensions(), (290, 290));

        let corner = raster.image.to_rgb8().get_pixel(5, 5).0;
        assert_eq!(corner, [255, 255, 255]);
    }

    #[test]
    fn empty_url_is_rejected() {
        let result = QrRenderer::default().render_url("");
        assert!(matches!(result, Err(Error::Encoding(_))));
    }

    #[test]
    fn over_length_url_is_rejected() {
        let long = format!("https://example.com/{}", "a".repeat(4000));
        let result = QrRenderer::render(&long, ErrorCorrection::H, 4, 4);
        assert!(matches!(result, Err(Error::Encoding(_))));
    }

    #[test]
    fn error_correction_parses_letters() {
        assert_eq!(ErrorCorrection::parse("h"), Some(ErrorCorrection::H));
        assert_eq!(ErrorCorrection::parse("x"), None);
    }
}

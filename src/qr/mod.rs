//! QR code rendering and decoding
//!
//! The renderer turns a URL into the base raster of a standard artifact. The
//! decoder is the reference check that a rendered raster reads back as the
//! exact URL; it is never run against synthesized art in the request path.

mod decoder;
mod encoder;

pub use decoder::QrDecoder;
pub use encoder::{ErrorCorrection, QrRenderer, RenderOptions};

use serde::{Deserialize, Serialize};

/// A decoded QR code payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrPayload {
    /// The raw decoded data
    pub data: Vec<u8>,
    /// String representation if valid UTF-8
    pub text: Option<String>,
}

impl QrPayload {
    /// Create a new QR payload from raw bytes
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let text = String::from_utf8(data.clone()).ok();
        Self { data, text }
    }

    /// Get the payload as a string, if valid UTF-8
    pub fn as_str(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qr_payload_from_bytes() {
        let payload = QrPayload::from_bytes(b"https://example.com".to_vec());
        assert_eq!(payload.as_str(), Some("https://example.com"));

        let binary = QrPayload::from_bytes(vec![0xFF, 0xFE]);
        assert!(binary.as_str().is_none());
        assert_eq!(binary.as_bytes(), &[0xFF, 0xFE]);
    }
}

//! Error types for qrgate operations

use thiserror::Error;

/// Result type alias using qrgate's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for qrgate operations
#[derive(Error, Debug)]
pub enum Error {
    /// The URL could not be encoded as a QR code (empty, over-length, ...)
    #[error("Failed to encode QR code: {0}")]
    Encoding(String),

    /// The remote AI synthesis call failed for any reason
    #[error("AI synthesis failed: {0}")]
    Synthesis(String),

    /// Upload to, or addressing of, the artifact store failed
    #[error("Artifact store error: {0}")]
    Store(String),

    /// Payment proof did not match the gateway signature
    #[error("Payment signature verification failed")]
    SignatureInvalid,

    /// Payment gateway rejected or failed an order request
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    /// QR code decoding failed
    #[error("Failed to decode QR code: {0}")]
    QrDecode(String),

    /// No QR code found in image
    #[error("No QR code found in image")]
    NoQrCodeFound,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image processing error
    #[error("Image processing error: {0}")]
    Image(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Short machine-friendly label used in logs and metrics.
    ///
    /// Not exposed over HTTP; responses only carry the display message.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Encoding(_) => "encoding",
            Error::Synthesis(_) => "synthesis",
            Error::Store(_) => "store",
            Error::SignatureInvalid => "signature_invalid",
            Error::Gateway(_) => "gateway",
            Error::QrDecode(_) | Error::NoQrCodeFound => "decode",
            Error::Io(_) => "io",
            Error::Image(_) => "image",
            Error::Config(_) => "config",
            Error::Other(_) => "other",
        }
    }
}

// Implement From conversions for common error types

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Image(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Other(format!("JSON error: {}", e))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Other(format!("Background task failed: {}", e))
    }
}

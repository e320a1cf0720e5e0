//! qrgate - QR code generation with free previews and paid originals
//!
//! A request for a QR code (plain or AI-stylized) produces an artifact pair:
//! a full-resolution *real* image and a marked *preview*. Both are uploaded to
//! object storage under keys derived from an anonymous artifact id, and only
//! the preview URL is handed out. The real URL is released after a payment
//! proof for that id verifies.
//!
//! # Features
//!
//! - **Standard codes**: local, deterministic rendering with `qrcode`
//! - **AI codes**: remote diffusion model behind a Gradio API
//! - **Previews**: watermark or defacement depending on the variant
//! - **Stateless storage**: `real_{id}.png` / `preview_{id}.png`, no database
//! - **Payments**: Razorpay order creation and signature verification
//!
//! # Example
//!
//! ```no_run
//! use qrgate::{Pipeline, QrGateConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = QrGateConfig::load(None)?;
//!     config.validate()?;
//!
//!     let pipeline = Pipeline::from_config(&config)?;
//!     let generated = pipeline.generate_standard("https://example.com").await?;
//!
//!     println!("{} -> {}", generated.art_id, generated.preview_url);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs, rust_2024_compatibility)]

pub mod artifact;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod payment;
pub mod pipeline;
pub mod preview;
pub mod qr;
pub mod server;
pub mod staging;
pub mod store;
pub mod synth;

// Re-exports for convenience
pub use error::{Error, Result};

pub use artifact::{ArtifactId, ArtifactVariant, ObjectKey, RasterAsset, StoredObject};
pub use config::{LogRotation, LoggingOptions, QrGateConfig};
pub use payment::{EntitlementProof, OrderGateway, RazorpayGateway, SignatureVerifier};
pub use pipeline::{Generated, Pipeline};
pub use preview::PreviewTransform;
pub use qr::{QrDecoder, QrPayload, QrRenderer};
pub use staging::StagingArea;
pub use store::{ArtifactStore, LocalStore, SupabaseStore};
pub use synth::{SynthesisResult, Synthesizer};

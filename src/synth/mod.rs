//! AI art synthesis
//!
//! Stylized codes come from a remote diffusion model conditioned on the URL's
//! QR code and a prompt. The call is slow, random and fallible. Every failure
//! is reported as one [`Error::Synthesis`](crate::Error::Synthesis) and is
//! never retried here; a new request draws a new seed anyway.
//!
//! Nothing checks that the synthesized art still scans. Results carry
//! [`Scannability::Unknown`] to make that explicit.

mod gradio;

pub use gradio::GradioSynthesizer;

use crate::artifact::RasterAsset;
use crate::error::Result;
use async_trait::async_trait;
use rand::Rng;

/// Appended to every caller prompt
pub const QUALITY_SUFFIX: &str = "masterpiece, trending on artstation, highly detailed, 8k resolution, vibrant, sharp focus, rich texture, neon lights, cyberpunk";

/// Sent as the negative prompt of every call
pub const NEGATIVE_PROMPT: &str =
    "ugly, blurry, low quality, distorted, pixelated, grainy, dull, plain, text, watermark, broken";

/// Classifier-free guidance scale
pub const GUIDANCE_SCALE: f64 = 7.5;

/// ControlNet conditioning scale; higher favours readability over art
pub const CONTROLNET_SCALE: f64 = 1.5;

/// Denoising strength
pub const STRENGTH: f64 = 0.9;

/// Sampler name understood by the remote model
pub const SAMPLER: &str = "DPM++ Karras SDE";

/// Largest seed drawn (inclusive)
pub const MAX_SEED: u32 = 999_999_999;

/// Whether a synthesized raster is known to decode as a QR code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scannability {
    /// Never verified
    Unknown,
}

/// Output of a successful synthesis
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    /// The stylized image
    pub raster: RasterAsset,
    /// Seed the remote model ran with
    pub seed: u32,
    /// Scannability of `raster`
    pub scannable: Scannability,
}

/// Fully parameterised synthesis call
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    /// URL the code encodes
    pub url: String,
    /// Caller prompt with the quality suffix applied
    pub prompt: String,
    /// Negative prompt
    pub negative_prompt: &'static str,
    /// Guidance scale
    pub guidance_scale: f64,
    /// ControlNet conditioning scale
    pub controlnet_scale: f64,
    /// Denoising strength
    pub strength: f64,
    /// Random seed
    pub seed: u32,
    /// Sampler name
    pub sampler: &'static str,
}

impl SynthesisRequest {
    /// Build a request with a freshly drawn seed.
    pub fn new(url: &str, prompt: &str) -> Self {
        let seed = rand::thread_rng().gen_range(0..=MAX_SEED);
        Self::with_seed(url, prompt, seed)
    }

    /// Build a request with an explicit seed.
    pub fn with_seed(url: &str, prompt: &str, seed: u32) -> Self {
        Self {
            url: url.to_string(),
            prompt: format!("{prompt}, {QUALITY_SUFFIX}"),
            negative_prompt: NEGATIVE_PROMPT,
            guidance_scale: GUIDANCE_SCALE,
            controlnet_scale: CONTROLNET_SCALE,
            strength: STRENGTH,
            seed,
            sampler: SAMPLER,
        }
    }
}

/// Produces stylized QR art for a URL and prompt
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Run one synthesis. Long-running; never retried.
    async fn synthesize(&self, url: &str, prompt: &str) -> Result<SynthesisResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_is_augmented_with_fixed_constants() {
        let request = SynthesisRequest::with_seed("https://example.com", "sunset", 42);
        assert!(request.prompt.starts_with("sunset, masterpiece"));
        assert!(request.prompt.ends_with("cyberpunk"));
        assert_eq!(request.negative_prompt, NEGATIVE_PROMPT);
        assert_eq!(request.guidance_scale, 7.5);
        assert_eq!(request.controlnet_scale, 1.5);
        assert_eq!(request.strength, 0.9);
        assert_eq!(request.sampler, "DPM++ Karras SDE");
        assert_eq!(request.seed, 42);
    }

    #[test]
    fn seeds_are_drawn_per_request() {
        let seeds: std::collections::HashSet<u32> = (0..16)
            .map(|_| SynthesisRequest::new("https://example.com", "sunset").seed)
            .collect();
        assert!(seeds.len() > 1);
        assert!(seeds.iter().all(|seed| *seed <= MAX_SEED));
    }
}

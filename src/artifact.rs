//! Artifact identity and the stateless naming convention
//!
//! An artifact is the logical pair of images (real, preview) produced by one
//! generation request. No index of artifacts exists anywhere: the remote key of
//! each half is derived from the [`ArtifactId`] alone.

use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque identifier of a generated artifact pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(Uuid);

impl ArtifactId {
    /// Issue a fresh identifier (random v4 UUID).
    pub fn allocate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for ArtifactId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Which generation mode produced an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactVariant {
    /// Plain QR code rendered locally
    Standard,
    /// QR code stylized by the remote synthesizer
    Ai,
}

impl ArtifactVariant {
    /// Label used in API responses and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Ai => "ai",
        }
    }
}

impl fmt::Display for ArtifactVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half of an artifact pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Full-fidelity image, gated behind payment
    Real,
    /// Degraded derivative shown for free
    Preview,
}

impl Tier {
    fn prefix(&self) -> &'static str {
        match self {
            Self::Real => "real",
            Self::Preview => "preview",
        }
    }
}

/// Remote object key, always `{real|preview}_{id}.png`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Derive the key for one tier of an artifact.
    pub fn new(tier: Tier, id: &ArtifactId) -> Self {
        Self(format!("{}_{}.png", tier.prefix(), id))
    }

    /// Key of the payment-gated image
    pub fn real(id: &ArtifactId) -> Self {
        Self::new(Tier::Real, id)
    }

    /// Key of the free preview image
    pub fn preview(id: &ArtifactId) -> Self {
        Self::new(Tier::Preview, id)
    }

    /// Key for an id supplied by a caller that was never parsed.
    ///
    /// Unlock requests carry the id as free text; the key is derived without
    /// checking that the id was ever issued.
    pub fn real_for_raw(raw_id: &str) -> Self {
        Self(format!("{}_{}.png", Tier::Real.prefix(), raw_id))
    }

    /// Key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An image in flight between generation and upload
#[derive(Debug, Clone)]
pub struct RasterAsset {
    /// Pixel buffer
    pub image: DynamicImage,
    /// Encoding used when the raster is written out
    pub format: ImageFormat,
}

impl RasterAsset {
    /// Wrap an image that will be stored as PNG
    pub fn png(image: DynamicImage) -> Self {
        Self {
            image,
            format: ImageFormat::Png,
        }
    }

    /// Width and height in pixels
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// Encode the raster to `path` in its format.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        self.image.save_with_format(path, self.format)?;
        Ok(())
    }

    /// Load a raster previously written to disk.
    pub fn open(path: &Path) -> crate::Result<Self> {
        let image = image::open(path)?;
        Ok(Self::png(image))
    }
}

/// A durably stored object and the URL it is served from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    /// Remote key inside the bucket
    pub key: String,
    /// Publicly reachable URL
    pub public_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_naming_convention() {
        let id: ArtifactId = "6f1c2a9e-4b7d-4e2a-9c1f-0a1b2c3d4e5f".parse().unwrap();
        assert_eq!(
            ObjectKey::real(&id).as_str(),
            "real_6f1c2a9e-4b7d-4e2a-9c1f-0a1b2c3d4e5f.png"
        );
        assert_eq!(
            ObjectKey::preview(&id).as_str(),
            "preview_6f1c2a9e-4b7d-4e2a-9c1f-0a1b2c3d4e5f.png"
        );
        assert_eq!(
            ObjectKey::real_for_raw(&id.to_string()),
            ObjectKey::real(&id)
        );
    }

    #[test]
    fn allocated_ids_are_distinct() {
        let a = ArtifactId::allocate();
        let b = ArtifactId::allocate();
        assert_ne!(a, b);
    }

    #[test]
    fn variant_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&ArtifactVariant::Ai).unwrap(),
            "\"ai\""
        );
        assert_eq!(ArtifactVariant::Standard.to_string(), "standard");
    }
}

//! Generation and unlock flows
//!
//! A generation request allocates an id, produces the real raster (locally or
//! through the synthesizer), derives the preview next to it in staging,
//! uploads both under the derived keys and hands back the preview URL only.
//! Staged files are purged when the request finishes, successful or not.
//!
//! Uploads are not transactional. If the real object lands and the preview
//! upload fails, the real object stays behind and the request fails.

use crate::artifact::{ArtifactId, ArtifactVariant, ObjectKey, RasterAsset, StoredObject};
use crate::config::QrGateConfig;
use crate::error::{Error, Result};
use crate::metrics;
use crate::payment::{EntitlementProof, SignatureVerifier};
use crate::preview::PreviewTransform;
use crate::qr::QrRenderer;
use crate::staging::{StagedArtifact, StagingArea};
use crate::store::{self, ArtifactStore};
use crate::synth::{GradioSynthesizer, Synthesizer};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// What a caller receives after a successful generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Generated {
    /// Identifier to present when paying
    pub art_id: ArtifactId,
    /// Public URL of the preview image
    pub preview_url: String,
    /// Variant that was generated
    #[serde(rename = "type")]
    pub variant: ArtifactVariant,
}

/// Orchestrates generation and entitlement checks
pub struct Pipeline {
    renderer: QrRenderer,
    preview: PreviewTransform,
    staging: StagingArea,
    store: Arc<dyn ArtifactStore>,
    synthesizer: Arc<dyn Synthesizer>,
    verifier: SignatureVerifier,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("renderer", &self.renderer)
            .field("preview", &self.preview)
            .field("staging", &self.staging)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Assemble a pipeline with default rendering and an unlabelled preview.
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        synthesizer: Arc<dyn Synthesizer>,
        verifier: SignatureVerifier,
        staging: StagingArea,
    ) -> Self {
        Self {
            renderer: QrRenderer::default(),
            preview: PreviewTransform::without_font(),
            staging,
            store,
            synthesizer,
            verifier,
        }
    }

    /// Build every adapter from validated configuration.
    pub fn from_config(config: &QrGateConfig) -> Result<Self> {
        let store = store::from_options(&config.storage)?;

        let synthesizer = GradioSynthesizer::new(
            &config.synthesis.endpoint,
            &config.synthesis.api_prefix,
            config.synthesis.token.clone(),
            config.synthesis.timeout(),
        )?;

        let secret = config
            .payment
            .key_secret
            .as_deref()
            .ok_or_else(|| Error::Config("RAZORPAY_KEY_SECRET is not set".to_string()))?;

        let staging = StagingArea::open(&config.staging.dir)?;

        Ok(Self::new(
            store,
            Arc::new(synthesizer),
            SignatureVerifier::new(secret),
            staging,
        )
        .with_renderer(QrRenderer::new(config.render))
        .with_preview(PreviewTransform::new(config.preview.font_path.as_deref())))
    }

    /// Replace the standard renderer
    pub fn with_renderer(mut self, renderer: QrRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Replace the preview transform
    pub fn with_preview(mut self, preview: PreviewTransform) -> Self {
        self.preview = preview;
        self
    }

    /// Render a plain QR code for `url` and publish it with its watermarked
    /// preview.
    pub async fn generate_standard(&self, url: &str) -> Result<Generated> {
        let id = ArtifactId::allocate();
        let staged = Arc::new(self.staging.lease(&id));
        let started = Instant::now();
        info!(art_id = %id, "Generating standard QR");

        let result = self.standard_flow(&id, &staged, url).await;
        self.finish(id, ArtifactVariant::Standard, started, result)
    }

    /// Synthesize QR art for `url` and `prompt` and publish it with its
    /// defaced preview. Nothing is uploaded when synthesis fails.
    pub async fn generate_ai(&self, url: &str, prompt: &str) -> Result<Generated> {
        let id = ArtifactId::allocate();
        let staged = Arc::new(self.staging.lease(&id));
        let started = Instant::now();
        info!(art_id = %id, "Starting AI generation");

        let result = self.ai_flow(&id, &staged, url, prompt).await;
        self.finish(id, ArtifactVariant::Ai, started, result)
    }

    /// Verify a payment proof and return the URL of the real asset for
    /// `art_id`.
    ///
    /// The id is taken as given: it is neither checked against the paid order
    /// nor against the store.
    pub fn unlock(&self, proof: &EntitlementProof, art_id: &str) -> Result<String> {
        let outcome = self.verifier.verify(proof);
        metrics::record_verification(outcome.is_ok());
        if let Err(err) = outcome {
            warn!(order_id = %proof.order_id, art_id, "Payment signature rejected");
            return Err(err);
        }

        info!(order_id = %proof.order_id, art_id, "Payment verified, releasing real asset");
        Ok(self.store.public_url_for(&ObjectKey::real_for_raw(art_id)))
    }

    async fn standard_flow(
        &self,
        id: &ArtifactId,
        staged: &Arc<StagedArtifact>,
        url: &str,
    ) -> Result<StoredObject> {
        let renderer = self.renderer.clone();
        let url = url.to_string();
        let transform = self.preview.clone();
        // The blocking task keeps the lease alive if the request is dropped mid-write.
        let lease = Arc::clone(staged);

        tokio::task::spawn_blocking(move || -> Result<()> {
            let raster = renderer.render_url(&url)?;
            stage(&transform, &raster, ArtifactVariant::Standard, &lease)
        })
        .await??;

        self.publish(id, staged).await
    }

    async fn ai_flow(
        &self,
        id: &ArtifactId,
        staged: &Arc<StagedArtifact>,
        url: &str,
        prompt: &str,
    ) -> Result<StoredObject> {
        let call_started = Instant::now();
        let outcome = self.synthesizer.synthesize(url, prompt).await;
        metrics::record_synthesis(call_started.elapsed(), outcome.is_ok());

        let synthesized = outcome.map_err(|err| match err {
            Error::Synthesis(_) => err,
            other => Error::Synthesis(other.to_string()),
        })?;
        info!(
            art_id = %id,
            seed = synthesized.seed,
            scannable = ?synthesized.scannable,
            "Synthesis returned"
        );

        let transform = self.preview.clone();
        let lease = Arc::clone(staged);
        tokio::task::spawn_blocking(move || {
            stage(&transform, &synthesized.raster, ArtifactVariant::Ai, &lease)
        })
        .await??;

        self.publish(id, staged).await
    }

    /// Upload the real object, then the preview. Returns the preview object.
    async fn publish(&self, id: &ArtifactId, staged: &StagedArtifact) -> Result<StoredObject> {
        let real = self.upload(staged.real_path(), &ObjectKey::real(id)).await?;

        match self.upload(staged.preview_path(), &ObjectKey::preview(id)).await {
            Ok(preview) => Ok(preview),
            Err(err) => {
                warn!(
                    art_id = %id,
                    stored = %real.key,
                    "Preview upload failed after the real asset was stored"
                );
                Err(err)
            }
        }
    }

    async fn upload(&self, path: &Path, key: &ObjectKey) -> Result<StoredObject> {
        let outcome = self.store.put(path, key).await;
        metrics::record_upload(outcome.is_ok());
        outcome
    }

    fn finish(
        &self,
        id: ArtifactId,
        variant: ArtifactVariant,
        started: Instant,
        result: Result<StoredObject>,
    ) -> Result<Generated> {
        let elapsed = started.elapsed();
        metrics::record_generation(variant, elapsed, result.as_ref().err());

        match result {
            Ok(preview) => {
                info!(
                    art_id = %id,
                    variant = %variant,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Artifact published"
                );
                Ok(Generated {
                    art_id: id,
                    preview_url: preview.public_url,
                    variant,
                })
            }
            Err(err) => {
                warn!(
                    art_id = %id,
                    variant = %variant,
                    kind = err.kind(),
                    error = %err,
                    "Generation failed"
                );
                Err(err)
            }
        }
    }
}

/// Write the real raster and its preview into staging.
fn stage(
    transform: &PreviewTransform,
    real: &RasterAsset,
    variant: ArtifactVariant,
    staged: &StagedArtifact,
) -> Result<()> {
    real.save(staged.real_path())?;
    transform.derive(real, variant).save(staged.preview_path())
}

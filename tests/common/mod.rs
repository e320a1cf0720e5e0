#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tempfile::TempDir;

use qrgate::artifact::{ObjectKey, StoredObject};
use qrgate::payment::OrderGateway;
use qrgate::qr::{ErrorCorrection, QrDecoder, QrRenderer};
use qrgate::synth::{Scannability, SynthesisResult, Synthesizer};
use qrgate::{
    ArtifactStore, Error, LocalStore, Pipeline, RasterAsset, Result, SignatureVerifier,
    StagingArea,
};

pub const PUBLIC_BASE: &str = "http://assets.test";
pub const SECRET: &str = "rzp_test_secret";

/// Pipeline wired to a temp-dir store and staging area
pub struct Harness {
    pub pipeline: Arc<Pipeline>,
    pub store: LocalStore,
    pub staging: StagingArea,
    _dirs: TempDir,
}

impl Harness {
    pub fn new(synthesizer: Arc<dyn Synthesizer>) -> Self {
        let dirs = tempfile::tempdir().expect("tempdir");
        let store = LocalStore::open(dirs.path().join("store"), PUBLIC_BASE).expect("open store");
        Self::with_store(dirs, store.clone(), Arc::new(store), synthesizer)
    }

    pub fn with_store(
        dirs: TempDir,
        local: LocalStore,
        store: Arc<dyn ArtifactStore>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        let staging = StagingArea::open(dirs.path().join("staging")).expect("open staging");
        let pipeline = Pipeline::new(
            store,
            synthesizer,
            SignatureVerifier::new(SECRET),
            staging.clone(),
        );
        Self {
            pipeline: Arc::new(pipeline),
            store: local,
            staging,
            _dirs: dirs,
        }
    }

    pub fn standard() -> Self {
        Self::new(Arc::new(FailingSynthesizer))
    }

    /// Decode the stored object with `key`.
    pub fn decode_object(&self, key: &ObjectKey) -> Result<String> {
        let raster = RasterAsset::open(&self.store.object_path(key))?;
        let payload = QrDecoder::new().decode(&raster.image)?;
        Ok(payload.as_str().unwrap_or_default().to_string())
    }

    pub fn staged_files(&self) -> usize {
        staged_files(self.staging.dir())
    }
}

pub fn staged_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).count())
        .unwrap_or(0)
}

/// Remote model that is always down
pub struct FailingSynthesizer;

#[async_trait]
impl Synthesizer for FailingSynthesizer {
    async fn synthesize(&self, _url: &str, _prompt: &str) -> Result<SynthesisResult> {
        Err(Error::Synthesis("model offline".to_string()))
    }
}

/// Remote model that "stylizes" by returning a plain high-redundancy code
#[derive(Default)]
pub struct EchoSynthesizer {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Synthesizer for EchoSynthesizer {
    async fn synthesize(&self, url: &str, _prompt: &str) -> Result<SynthesisResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SynthesisResult {
            raster: QrRenderer::render(url, ErrorCorrection::H, 12, 4)?,
            seed: 42,
            scannable: Scannability::Unknown,
        })
    }
}

/// Store that accepts real objects and rejects previews
pub struct PreviewRejectingStore(pub LocalStore);

#[async_trait]
impl ArtifactStore for PreviewRejectingStore {
    async fn put(&self, local_path: &Path, key: &ObjectKey) -> Result<StoredObject> {
        if key.as_str().starts_with("preview_") {
            return Err(Error::Store("bucket quota exceeded".to_string()));
        }
        self.0.put(local_path, key).await
    }

    fn public_url_for(&self, key: &ObjectKey) -> String {
        self.0.public_url_for(key)
    }
}

/// Order gateway answering like the sandbox API
pub struct StubGateway;

#[async_trait]
impl OrderGateway for StubGateway {
    async fn create_order(&self, amount: u64) -> Result<Value> {
        Ok(json!({
            "id": "order_stub_1",
            "entity": "order",
            "amount": amount,
            "currency": "INR",
            "status": "created",
        }))
    }
}

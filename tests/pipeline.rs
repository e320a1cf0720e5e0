mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{
    EchoSynthesizer, FailingSynthesizer, Harness, PUBLIC_BASE, PreviewRejectingStore, SECRET,
};
use qrgate::artifact::ObjectKey;
use qrgate::{ArtifactVariant, EntitlementProof, Error, LocalStore, SignatureVerifier};

#[tokio::test]
async fn standard_generation_publishes_pair_and_hides_real_url() {
    let harness = Harness::standard();
    let url = "https://example.com";

    let generated = harness
        .pipeline
        .generate_standard(url)
        .await
        .expect("generate standard");

    assert_eq!(generated.variant, ArtifactVariant::Standard);
    assert_eq!(
        generated.preview_url,
        format!("{PUBLIC_BASE}/preview_{}.png", generated.art_id)
    );
    assert!(!generated.preview_url.contains("real_"));

    let real = ObjectKey::real(&generated.art_id);
    assert!(harness.store.contains(&real));
    assert!(harness.store.contains(&ObjectKey::preview(&generated.art_id)));
    assert_eq!(harness.decode_object(&real).expect("decode real"), url);

    assert_eq!(harness.staged_files(), 0, "staging must be purged");
}

#[tokio::test]
async fn generated_payload_serializes_with_type_field() {
    let harness = Harness::standard();
    let generated = harness
        .pipeline
        .generate_standard("https://example.com/menu")
        .await
        .expect("generate");

    let json = serde_json::to_value(&generated).expect("serialize");
    assert_eq!(json["type"], "standard");
    assert_eq!(json["art_id"], generated.art_id.to_string());
    assert!(json.get("variant").is_none());
}

#[tokio::test]
async fn empty_url_is_rejected_without_uploads() {
    let harness = Harness::standard();

    let err = harness
        .pipeline
        .generate_standard("")
        .await
        .expect_err("empty url");

    assert!(matches!(err, Error::Encoding(_)), "got {err:?}");
    assert!(harness.store.is_empty());
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn oversized_url_is_an_encoding_error() {
    let harness = Harness::standard();
    let url = format!("https://example.com/{}", "a".repeat(4000));

    let err = harness
        .pipeline
        .generate_standard(&url)
        .await
        .expect_err("too long for any version");

    assert_eq!(err.kind(), "encoding");
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn ai_synthesis_failure_uploads_nothing() {
    let harness = Harness::new(Arc::new(FailingSynthesizer));

    let err = harness
        .pipeline
        .generate_ai("https://example.com", "a dragon")
        .await
        .expect_err("synthesis is down");

    assert!(matches!(err, Error::Synthesis(_)), "got {err:?}");
    assert!(harness.store.is_empty(), "no objects after failed synthesis");
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn ai_generation_publishes_defaced_preview() {
    let synth = Arc::new(EchoSynthesizer::default());
    let harness = Harness::new(synth.clone());
    let url = "https://example.com/ai";

    let generated = harness
        .pipeline
        .generate_ai(url, "a koi pond at dusk")
        .await
        .expect("generate ai");

    assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
    assert_eq!(generated.variant, ArtifactVariant::Ai);
    assert_eq!(harness.store.len(), 2);

    let real = ObjectKey::real(&generated.art_id);
    let preview = ObjectKey::preview(&generated.art_id);
    assert_eq!(harness.decode_object(&real).expect("decode real"), url);
    assert!(
        harness.decode_object(&preview).is_err(),
        "defaced preview must not scan"
    );
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn preview_upload_failure_leaves_real_object() {
    let dirs = tempfile::tempdir().expect("tempdir");
    let local = LocalStore::open(dirs.path().join("store"), PUBLIC_BASE).expect("store");
    let harness = Harness::with_store(
        dirs,
        local.clone(),
        Arc::new(PreviewRejectingStore(local)),
        Arc::new(FailingSynthesizer),
    );

    let err = harness
        .pipeline
        .generate_standard("https://example.com")
        .await
        .expect_err("preview upload rejected");

    assert!(matches!(err, Error::Store(_)), "got {err:?}");
    assert_eq!(harness.store.len(), 1, "real object is not rolled back");
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_generations_do_not_collide() {
    let harness = Harness::standard();
    let mut handles = Vec::new();

    for n in 0..8 {
        let pipeline = harness.pipeline.clone();
        handles.push(tokio::spawn(async move {
            let url = format!("https://example.com/item/{n}");
            let generated = pipeline.generate_standard(&url).await.expect("generate");
            (url, generated)
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        let (url, generated) = handle.await.expect("join");
        assert!(ids.insert(generated.art_id));
        let decoded = harness
            .decode_object(&ObjectKey::real(&generated.art_id))
            .expect("decode");
        assert_eq!(decoded, url);
    }

    assert_eq!(harness.store.len(), 16);
    assert_eq!(harness.staged_files(), 0);
}

#[tokio::test]
async fn valid_proof_unlocks_real_url() {
    let harness = Harness::standard();
    let generated = harness
        .pipeline
        .generate_standard("https://example.com")
        .await
        .expect("generate");

    let signature = SignatureVerifier::new(SECRET)
        .sign("order_9A33XWu170gUtm", "pay_29QQoUBi66xm2f")
        .expect("sign");
    let proof = EntitlementProof {
        order_id: "order_9A33XWu170gUtm".to_string(),
        payment_id: "pay_29QQoUBi66xm2f".to_string(),
        signature,
    };

    let art_id = generated.art_id.to_string();
    let download = harness.pipeline.unlock(&proof, &art_id).expect("unlock");
    assert_eq!(download, format!("{PUBLIC_BASE}/real_{art_id}.png"));
}

#[tokio::test]
async fn forged_proof_is_rejected() {
    let harness = Harness::standard();
    let proof = EntitlementProof {
        order_id: "order_1".to_string(),
        payment_id: "pay_1".to_string(),
        signature: "00".repeat(32),
    };

    let err = harness
        .pipeline
        .unlock(&proof, "6f1c1f0e-4c1b-4c55-9f8e-0d6f2c1f7a10")
        .expect_err("forged");
    assert!(matches!(err, Error::SignatureInvalid));
}

#[tokio::test]
async fn unlock_does_not_bind_art_id_to_order() {
    let harness = Harness::standard();
    let signature = SignatureVerifier::new(SECRET)
        .sign("order_1", "pay_1")
        .expect("sign");
    let proof = EntitlementProof {
        order_id: "order_1".to_string(),
        payment_id: "pay_1".to_string(),
        signature,
    };

    let url = harness
        .pipeline
        .unlock(&proof, "never-generated")
        .expect("any id is accepted");
    assert_eq!(url, format!("{PUBLIC_BASE}/real_never-generated.png"));
    assert!(!harness.store.contains(&ObjectKey::real_for_raw("never-generated")));
    assert!(harness.store.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abandoned_request_leaves_staging_empty() {
    let harness = Harness::standard();
    let url = format!("https://example.com/{}", "b".repeat(1500));

    let _ = tokio::time::timeout(
        Duration::from_micros(1),
        harness.pipeline.generate_standard(&url),
    )
    .await;

    // Let any render still running on the blocking pool finish.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(harness.staged_files(), 0);
}

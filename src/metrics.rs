//! Lightweight runtime metrics aggregation for the qrgate service
//!
//! Counters are process-wide and cumulative. They are read by `GET /metrics`
//! and, when enabled, summarised periodically over tracing.

use crate::artifact::ArtifactVariant;
use crate::config::MetricsFormat;
use crate::error::Error;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, Instant};
use tokio::time::{self, MissedTickBehavior};
use tracing::info;

static METRICS: OnceLock<Arc<MetricsInner>> = OnceLock::new();

fn inner() -> &'static Arc<MetricsInner> {
    METRICS.get_or_init(|| Arc::new(MetricsInner::new()))
}

/// Enable periodic metrics logging with the provided interval in seconds.
pub fn enable(interval_secs: u64) {
    let inner = inner();
    inner
        .interval_secs
        .store(interval_secs.max(5), Ordering::Relaxed);
    inner.ensure_task();
}

/// Record the outcome of one generation request.
pub fn record_generation(variant: ArtifactVariant, duration: Duration, error: Option<&Error>) {
    let mut guard = inner().lock();
    let state = &mut *guard;
    let counters = match variant {
        ArtifactVariant::Standard => &mut state.standard,
        ArtifactVariant::Ai => &mut state.ai,
    };
    match error {
        None => {
            counters.successes += 1;
            counters.success_duration += duration;
        }
        Some(err) => {
            counters.failures += 1;
            *state.failures_by_kind.entry(err.kind()).or_insert(0) += 1;
        }
    }
}

/// Record how long a remote synthesis call took.
pub fn record_synthesis(duration: Duration, success: bool) {
    let mut state = inner().lock();
    state.synthesis_calls += 1;
    if !success {
        state.synthesis_failures += 1;
    }
    state.synthesis_duration += duration;
    if duration > state.synthesis_max {
        state.synthesis_max = duration;
    }
}

/// Record one object upload attempt.
pub fn record_upload(success: bool) {
    let mut state = inner().lock();
    if success {
        state.uploads += 1;
    } else {
        state.upload_failures += 1;
    }
}

/// Record one payment verification.
pub fn record_verification(valid: bool) {
    let mut state = inner().lock();
    if valid {
        state.verifications_ok += 1;
    } else {
        state.verifications_invalid += 1;
    }
}

/// Current cumulative snapshot
pub fn snapshot() -> Snapshot {
    inner().lock().snapshot()
}

/// Render the current snapshot, returning the content type and body.
pub fn render(format: MetricsFormat) -> (&'static str, String) {
    let snapshot = snapshot();
    match format {
        MetricsFormat::Json => (
            "application/json",
            serde_json::to_string(&snapshot).unwrap_or_else(|_| "{}".to_string()),
        ),
        MetricsFormat::Prometheus => ("text/plain; version=0.0.4", render_prometheus(&snapshot)),
    }
}

struct MetricsInner {
    state: Mutex<MetricsState>,
    interval_secs: AtomicU64,
    task_spawned: AtomicBool,
}

impl MetricsInner {
    fn new() -> Self {
        Self {
            state: Mutex::new(MetricsState::new()),
            interval_secs: AtomicU64::new(60),
            task_spawned: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MetricsState> {
        // Counters stay usable even if a holder panicked
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_task(self: &Arc<Self>) {
        if self
            .task_spawned
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let runner = Arc::clone(self);
            tokio::spawn(async move {
                runner.run().await;
            });
        }
    }

    async fn run(self: Arc<Self>) {
        let mut current_secs = self.interval_secs.load(Ordering::Relaxed).max(5);
        loop {
            let mut ticker = time::interval(Duration::from_secs(current_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick fires immediately; report after a full interval
            ticker.tick().await;

            loop {
                ticker.tick().await;
                log_snapshot(&self.lock().snapshot());

                let next_secs = self.interval_secs.load(Ordering::Relaxed).max(5);
                if next_secs != current_secs {
                    current_secs = next_secs;
                    break;
                }
            }
        }
    }
}

#[derive(Default, Clone, Copy)]
struct VariantCounters {
    successes: u64,
    failures: u64,
    success_duration: Duration,
}

impl VariantCounters {
    fn snapshot(&self) -> VariantSnapshot {
        VariantSnapshot {
            successes: self.successes,
            failures: self.failures,
            avg_latency_ms: avg_ms(self.success_duration, self.successes),
        }
    }
}

struct MetricsState {
    started: Instant,
    standard: VariantCounters,
    ai: VariantCounters,
    failures_by_kind: BTreeMap<&'static str, u64>,
    synthesis_calls: u64,
    synthesis_failures: u64,
    synthesis_duration: Duration,
    synthesis_max: Duration,
    uploads: u64,
    upload_failures: u64,
    verifications_ok: u64,
    verifications_invalid: u64,
}

impl MetricsState {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            standard: VariantCounters::default(),
            ai: VariantCounters::default(),
            failures_by_kind: BTreeMap::new(),
            synthesis_calls: 0,
            synthesis_failures: 0,
            synthesis_duration: Duration::ZERO,
            synthesis_max: Duration::ZERO,
            uploads: 0,
            upload_failures: 0,
            verifications_ok: 0,
            verifications_invalid: 0,
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            generations: GenerationSnapshot {
                standard: self.standard.snapshot(),
                ai: self.ai.snapshot(),
                failures_by_kind: self
                    .failures_by_kind
                    .iter()
                    .map(|(kind, count)| ((*kind).to_string(), *count))
                    .collect(),
            },
            synthesis: SynthesisSnapshot {
                calls: self.synthesis_calls,
                failures: self.synthesis_failures,
                avg_latency_ms: avg_ms(self.synthesis_duration, self.synthesis_calls),
                max_latency_ms: self.synthesis_max.as_secs_f64() * 1_000.0,
            },
            uploads: UploadSnapshot {
                successes: self.uploads,
                failures: self.upload_failures,
            },
            verifications: VerificationSnapshot {
                valid: self.verifications_ok,
                invalid: self.verifications_invalid,
            },
        }
    }
}

fn avg_ms(total: Duration, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total.as_secs_f64() * 1_000.0 / count as f64
    }
}

/// Cumulative metrics since process start
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    /// Seconds since metrics were first touched
    pub uptime_secs: u64,
    /// Generation requests
    pub generations: GenerationSnapshot,
    /// Remote synthesis calls
    pub synthesis: SynthesisSnapshot,
    /// Object uploads
    pub uploads: UploadSnapshot,
    /// Payment verifications
    pub verifications: VerificationSnapshot,
}

/// Generation counters
#[derive(Debug, Clone, Serialize)]
pub struct GenerationSnapshot {
    /// Standard codes
    pub standard: VariantSnapshot,
    /// AI codes
    pub ai: VariantSnapshot,
    /// Failed generations by error kind
    pub failures_by_kind: BTreeMap<String, u64>,
}

/// Counters of one artifact variant
#[derive(Debug, Clone, Copy, Serialize)]
pub struct VariantSnapshot {
    /// Completed generations
    pub successes: u64,
    /// Failed generations
    pub failures: u64,
    /// Mean latency of completed generations
    pub avg_latency_ms: f64,
}

/// Synthesis counters
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SynthesisSnapshot {
    /// Calls issued
    pub calls: u64,
    /// Calls that failed
    pub failures: u64,
    /// Mean call latency
    pub avg_latency_ms: f64,
    /// Slowest call
    pub max_latency_ms: f64,
}

/// Upload counters
#[derive(Debug, Clone, Copy, Serialize)]
pub struct UploadSnapshot {
    /// Stored objects
    pub successes: u64,
    /// Rejected uploads
    pub failures: u64,
}

/// Verification counters
#[derive(Debug, Clone, Copy, Serialize)]
pub struct VerificationSnapshot {
    /// Proofs accepted
    pub valid: u64,
    /// Proofs rejected
    pub invalid: u64,
}

fn log_snapshot(snapshot: &Snapshot) {
    let generations = &snapshot.generations;
    info!(
        target: "qrgate::metrics",
        uptime_secs = snapshot.uptime_secs,
        standard_ok = generations.standard.successes,
        standard_err = generations.standard.failures,
        standard_avg_ms = generations.standard.avg_latency_ms,
        ai_ok = generations.ai.successes,
        ai_err = generations.ai.failures,
        ai_avg_ms = generations.ai.avg_latency_ms,
        synthesis_max_ms = snapshot.synthesis.max_latency_ms,
        upload_failures = snapshot.uploads.failures,
        verifications_valid = snapshot.verifications.valid,
        verifications_invalid = snapshot.verifications.invalid,
        "Service metrics"
    );

    if !generations.failures_by_kind.is_empty() {
        let breakdown = generations
            .failures_by_kind
            .iter()
            .map(|(kind, count)| format!("{kind}: {count}"))
            .collect::<Vec<_>>()
            .join(", ");
        info!(target: "qrgate::metrics", breakdown, "Generation failures by kind");
    }
}

fn render_prometheus(snapshot: &Snapshot) -> String {
    let mut output = String::new();

    let mut metric = |name: &str, kind: &str, help: &str, samples: &[(String, String)]| {
        let _ = writeln!(&mut output, "# HELP {name} {help}");
        let _ = writeln!(&mut output, "# TYPE {name} {kind}");
        for (labels, value) in samples {
            let _ = writeln!(&mut output, "{name}{labels} {value}");
        }
    };

    metric(
        "qrgate_uptime_seconds",
        "gauge",
        "Seconds since the service started recording",
        &[(String::new(), snapshot.uptime_secs.to_string())],
    );

    let generations = &snapshot.generations;
    let mut generation_samples = Vec::new();
    for (variant, counters) in [("standard", generations.standard), ("ai", generations.ai)] {
        generation_samples.push((
            format!("{{variant=\"{variant}\",result=\"success\"}}"),
            counters.successes.to_string(),
        ));
        generation_samples.push((
            format!("{{variant=\"{variant}\",result=\"failure\"}}"),
            counters.failures.to_string(),
        ));
    }
    metric(
        "qrgate_generations_total",
        "counter",
        "Generation requests by variant and result",
        &generation_samples,
    );

    metric(
        "qrgate_generation_latency_avg_seconds",
        "gauge",
        "Mean latency of completed generations",
        &[
            (
                "{variant=\"standard\"}".to_string(),
                format!("{:.6}", generations.standard.avg_latency_ms / 1_000.0),
            ),
            (
                "{variant=\"ai\"}".to_string(),
                format!("{:.6}", generations.ai.avg_latency_ms / 1_000.0),
            ),
        ],
    );

    if !generations.failures_by_kind.is_empty() {
        let samples: Vec<_> = generations
            .failures_by_kind
            .iter()
            .map(|(kind, count)| {
                (
                    format!("{{kind=\"{}\"}}", escape_label(kind)),
                    count.to_string(),
                )
            })
            .collect();
        metric(
            "qrgate_generation_failures_total",
            "counter",
            "Failed generations by error kind",
            &samples,
        );
    }

    metric(
        "qrgate_synthesis_calls_total",
        "counter",
        "Remote synthesis calls by result",
        &[
            (
                "{result=\"success\"}".to_string(),
                (snapshot.synthesis.calls - snapshot.synthesis.failures).to_string(),
            ),
            (
                "{result=\"failure\"}".to_string(),
                snapshot.synthesis.failures.to_string(),
            ),
        ],
    );

    metric(
        "qrgate_synthesis_latency_seconds",
        "gauge",
        "Remote synthesis latency statistics",
        &[
            (
                "{stat=\"avg\"}".to_string(),
                format!("{:.6}", snapshot.synthesis.avg_latency_ms / 1_000.0),
            ),
            (
                "{stat=\"max\"}".to_string(),
                format!("{:.6}", snapshot.synthesis.max_latency_ms / 1_000.0),
            ),
        ],
    );

    metric(
        "qrgate_uploads_total",
        "counter",
        "Object uploads by result",
        &[
            (
                "{result=\"success\"}".to_string(),
                snapshot.uploads.successes.to_string(),
            ),
            (
                "{result=\"failure\"}".to_string(),
                snapshot.uploads.failures.to_string(),
            ),
        ],
    );

    metric(
        "qrgate_verifications_total",
        "counter",
        "Payment verifications by result",
        &[
            (
                "{result=\"valid\"}".to_string(),
                snapshot.verifications.valid.to_string(),
            ),
            (
                "{result=\"invalid\"}".to_string(),
                snapshot.verifications.invalid.to_string(),
            ),
        ],
    );

    output
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('"', "\\\"")
}

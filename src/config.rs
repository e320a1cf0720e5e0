//! qrgate runtime configuration handling

use crate::error::{Error, Result};
use crate::qr::{ErrorCorrection, RenderOptions};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Top-level configuration structure persisted to disk or environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QrGateConfig {
    /// HTTP listener configuration
    pub server: ServerOptions,
    /// Logging configuration
    pub logging: LoggingOptions,
    /// Standard QR rendering parameters
    pub render: RenderOptions,
    /// Preview derivation
    pub preview: PreviewOptions,
    /// Local scratch space
    pub staging: StagingOptions,
    /// Object storage
    pub storage: StorageOptions,
    /// Payment gateway credentials
    pub payment: PaymentOptions,
    /// Remote AI synthesis
    pub synthesis: SynthesisOptions,
}

impl QrGateConfig {
    /// Load configuration from an explicit path or fall back to discovered defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = explicit_path {
            Self::from_file(path)?
        } else if let Some(path) = Self::discover_file()? {
            tracing::info!("Using configuration file: {}", path.display());
            Self::from_file(&path)?
        } else {
            tracing::debug!("No qrgate.toml / qrgate.yaml found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Attempt to locate a configuration file in common locations.
    fn discover_file() -> Result<Option<PathBuf>> {
        let cwd =
            env::current_dir().map_err(|e| Error::Config(format!("Failed to read cwd: {e}")))?;
        for candidate in ["qrgate.toml", "qrgate.yaml", "qrgate.yml"] {
            let path = cwd.join(candidate);
            if path.exists() {
                return Ok(Some(path));
            }
        }

        if let Some(xdg_config) = env::var_os("XDG_CONFIG_HOME") {
            let base = PathBuf::from(xdg_config).join("qrgate");
            for candidate in ["config.toml", "config.yaml"] {
                let path = base.join(candidate);
                if path.exists() {
                    return Ok(Some(path));
                }
            }
        }

        Ok(None)
    }

    /// Read configuration from a concrete file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;

        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_ascii_lowercase()
            .as_str()
        {
            "toml" => toml::from_str(&contents).map_err(|e| {
                Error::Config(format!("Failed to parse TOML {}: {e}", path.display()))
            }),
            "yaml" | "yml" => serde_yaml::from_str(&contents).map_err(|e| {
                Error::Config(format!("Failed to parse YAML {}: {e}", path.display()))
            }),
            other => Err(Error::Config(format!(
                "Unsupported config format '{}', expected toml/yaml",
                other
            ))),
        }
    }

    /// Apply environment variable overrides after file/default loading.
    fn apply_env_overrides(&mut self) {
        self.server.apply_env_overrides();
        self.logging.apply_env_overrides();
        apply_render_env_overrides(&mut self.render);
        self.preview.apply_env_overrides();
        self.staging.apply_env_overrides();
        self.storage.apply_env_overrides();
        self.payment.apply_env_overrides();
        self.synthesis.apply_env_overrides();
    }

    /// Check that every secret the service needs at startup is present.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.storage.backend == StorageBackend::Supabase {
            if self.storage.url.is_none() {
                missing.push("SUPABASE_URL");
            }
            if self.storage.key.is_none() {
                missing.push("SUPABASE_KEY");
            }
        }
        if self.payment.key_id.is_none() {
            missing.push("RAZORPAY_KEY_ID");
        }
        if self.payment.key_secret.is_none() {
            missing.push("RAZORPAY_KEY_SECRET");
        }
        if self.synthesis.token.is_none() {
            missing.push("HF_API_TOKEN");
        }

        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "Missing required secrets: {}",
                missing.join(", ")
            )));
        }
        if self.render.module_size == 0 {
            return Err(Error::Config("render.module_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Read an environment variable, treating blank values as unset.
fn env_value(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn apply_render_env_overrides(render: &mut RenderOptions) {
    if let Some(level) = env_value("QRGATE_RENDER_ECC") {
        if let Some(parsed) = ErrorCorrection::parse(&level) {
            render.error_correction = parsed;
        }
    }
    if let Some(size) = env_value("QRGATE_RENDER_MODULE_SIZE") {
        if let Ok(parsed) = size.parse::<u32>() {
            render.module_size = parsed;
        }
    }
    if let Some(border) = env_value("QRGATE_RENDER_BORDER") {
        if let Ok(parsed) = border.parse::<u32>() {
            render.border = parsed;
        }
    }
}

/// HTTP listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerOptions {
    /// Bind address for the HTTP server
    pub bind_address: String,
    /// Bind port for the HTTP server
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5001,
        }
    }
}

impl ServerOptions {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Some(addr) = env_value("QRGATE_BIND_ADDRESS") {
            self.bind_address = addr;
        }
        if let Some(port) = env_value("QRGATE_BIND_PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                self.port = parsed;
            }
        }
    }

    /// Socket address helper for binding servers
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

/// Structured logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingOptions {
    /// Default log level (overridable via `QRGATE_LOG_LEVEL`)
    pub level: String,
    /// Optional log file path for teeing structured logs
    pub file: Option<PathBuf>,
    /// Force ANSI colors in stdout logging
    pub color: bool,
    /// Enable periodic metrics summaries over tracing
    pub metrics: bool,
    /// Interval in seconds for emitting aggregated metrics when enabled
    pub metrics_interval_secs: u64,
    /// Optional log rotation strategy applied to `file`
    pub rotation: Option<LogRotation>,
    /// Output format of `GET /metrics`
    pub metrics_format: MetricsFormat,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            color: true,
            metrics: false,
            metrics_interval_secs: 60,
            rotation: None,
            metrics_format: MetricsFormat::Json,
        }
    }
}

impl LoggingOptions {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Some(level) = env_value("QRGATE_LOG_LEVEL") {
            self.level = level;
        }
        if let Some(file) = env_value("QRGATE_LOG_FILE") {
            self.file = Some(PathBuf::from(file));
        }
        if let Some(color) = env_value("QRGATE_LOG_COLOR") {
            if let Some(flag) = parse_flag(&color) {
                self.color = flag;
            }
        }
        if let Some(metrics) = env_value("QRGATE_LOG_METRICS") {
            if let Some(flag) = parse_flag(&metrics) {
                self.metrics = flag;
            }
        }
        if let Some(interval) = env_value("QRGATE_LOG_METRICS_INTERVAL") {
            if let Ok(value) = interval.parse::<u64>() {
                self.metrics_interval_secs = value.max(5);
            }
        }
        if let Some(rotation) = env_value("QRGATE_LOG_ROTATION") {
            if let Some(parsed) = LogRotation::parse(&rotation) {
                self.rotation = Some(parsed);
            }
        }
        if let Some(format) = env_value("QRGATE_METRICS_FORMAT") {
            if let Ok(parsed) = format.parse::<MetricsFormat>() {
                self.metrics_format = parsed;
            }
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Some(true),
        "0" | "false" | "off" => Some(false),
        _ => None,
    }
}

/// Supported log rotation policies for file sinks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    /// Rotate log files once per hour
    Hourly,
    /// Rotate log files once per day
    Daily,
}

impl LogRotation {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            _ => None,
        }
    }
}

/// Supported serialization formats for the metrics endpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MetricsFormat {
    /// Emit metrics as structured JSON
    Json,
    /// Emit metrics in Prometheus text exposition format
    Prometheus,
}

impl MetricsFormat {
    /// Parse a metrics format identifier (case-insensitive) from a string slice.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "prometheus" => Some(Self::Prometheus),
            _ => None,
        }
    }
}

impl FromStr for MetricsFormat {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| {
            format!("Unsupported metrics format '{value}', expected 'json' or 'prometheus'")
        })
    }
}

/// Preview derivation options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewOptions {
    /// TrueType/OpenType font used for preview labels; labels are skipped
    /// when unset or unreadable
    pub font_path: Option<PathBuf>,
}

impl PreviewOptions {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Some(path) = env_value("QRGATE_PREVIEW_FONT") {
            self.font_path = Some(PathBuf::from(path));
        }
    }
}

/// Local scratch space options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingOptions {
    /// Directory for rasters between generation and upload
    pub dir: PathBuf,
}

impl Default for StagingOptions {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("generated").join("temp"),
        }
    }
}

impl StagingOptions {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Some(dir) = env_value("QRGATE_STAGING_DIR") {
            self.dir = PathBuf::from(dir);
        }
    }
}

/// Object storage backends
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Supabase Storage bucket
    Supabase,
    /// Local directory (development)
    Local,
}

/// Object storage options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    /// Which backend to use
    pub backend: StorageBackend,
    /// Project URL (`SUPABASE_URL`); public base URL for the local backend
    pub url: Option<String>,
    /// Service key (`SUPABASE_KEY`)
    #[serde(skip_serializing)]
    pub key: Option<String>,
    /// Bucket holding artifacts
    pub bucket: String,
    /// Directory used by the local backend
    pub local_dir: PathBuf,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Supabase,
            url: None,
            key: None,
            bucket: "qr-assets".to_string(),
            local_dir: PathBuf::from("generated").join("store"),
        }
    }
}

impl StorageOptions {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Some(url) = env_value("SUPABASE_URL") {
            self.url = Some(url);
        }
        if let Some(key) = env_value("SUPABASE_KEY") {
            self.key = Some(key);
        }
        if let Some(bucket) = env_value("QRGATE_STORAGE_BUCKET") {
            self.bucket = bucket;
        }
        if let Some(backend) = env_value("QRGATE_STORAGE_BACKEND") {
            match backend.to_ascii_lowercase().as_str() {
                "supabase" => self.backend = StorageBackend::Supabase,
                "local" => self.backend = StorageBackend::Local,
                _ => {}
            }
        }
        if let Some(dir) = env_value("QRGATE_STORAGE_DIR") {
            self.local_dir = PathBuf::from(dir);
        }
    }
}

/// Payment gateway options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentOptions {
    /// Key id (`RAZORPAY_KEY_ID`)
    pub key_id: Option<String>,
    /// Key secret (`RAZORPAY_KEY_SECRET`)
    #[serde(skip_serializing)]
    pub key_secret: Option<String>,
    /// Override of the gateway API base URL
    pub api_base: Option<String>,
}

impl PaymentOptions {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Some(id) = env_value("RAZORPAY_KEY_ID") {
            self.key_id = Some(id);
        }
        if let Some(secret) = env_value("RAZORPAY_KEY_SECRET") {
            self.key_secret = Some(secret);
        }
        if let Some(base) = env_value("QRGATE_PAYMENT_API_BASE") {
            self.api_base = Some(base);
        }
    }
}

/// Remote AI synthesis options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisOptions {
    /// Base URL of the Gradio app
    pub endpoint: String,
    /// Path prefix of the Gradio API (`gradio_api` on Gradio 5)
    pub api_prefix: String,
    /// Access token (`HF_API_TOKEN`)
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Per-request transport timeout; `0` disables it
    pub timeout_secs: u64,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            endpoint: "https://huggingface-projects-qr-code-ai-art-generator.hf.space".to_string(),
            api_prefix: "gradio_api".to_string(),
            token: None,
            timeout_secs: 180,
        }
    }
}

impl SynthesisOptions {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Some(token) = env_value("HF_API_TOKEN") {
            self.token = Some(token);
        }
        if let Some(endpoint) = env_value("QRGATE_SYNTHESIS_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Ok(prefix) = env::var("QRGATE_SYNTHESIS_API_PREFIX") {
            self.api_prefix = prefix.trim().to_string();
        }
        if let Some(timeout) = env_value("QRGATE_SYNTHESIS_TIMEOUT") {
            if let Ok(parsed) = timeout.parse::<u64>() {
                self.timeout_secs = parsed;
            }
        }
    }

    /// Transport timeout, if enabled
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> QrGateConfig {
        let mut config = QrGateConfig::default();
        config.storage.url = Some("https://proj.supabase.co".into());
        config.storage.key = Some("service".into());
        config.payment.key_id = Some("rzp_test".into());
        config.payment.key_secret = Some("secret".into());
        config.synthesis.token = Some("hf_token".into());
        config
    }

    #[test]
    fn defaults_match_original_service() {
        let config = QrGateConfig::default();
        assert_eq!(config.server.socket_address(), "0.0.0.0:5001");
        assert_eq!(config.storage.bucket, "qr-assets");
        assert_eq!(config.render.module_size, 12);
        assert_eq!(config.render.border, 4);
        assert_eq!(config.synthesis.timeout(), Some(Duration::from_secs(180)));
    }

    #[test]
    fn missing_secrets_are_configuration_errors() {
        let err = QrGateConfig::default().validate().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("SUPABASE_URL"));
        assert!(message.contains("RAZORPAY_KEY_SECRET"));
        assert!(message.contains("HF_API_TOKEN"));

        assert!(complete().validate().is_ok());
    }

    #[test]
    fn local_backend_does_not_need_supabase() {
        let mut config = complete();
        config.storage.backend = StorageBackend::Local;
        config.storage.url = None;
        config.storage.key = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qrgate.toml");
        fs::write(
            &path,
            r#"
[server]
port = 8080

[render]
error_correction = "H"
module_size = 8

[storage]
backend = "local"
bucket = "assets"
"#,
        )
        .unwrap();

        let config = QrGateConfig::from_file(&path).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.render.error_correction, ErrorCorrection::H);
        assert_eq!(config.render.module_size, 8);
        assert_eq!(config.render.border, 4);
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert_eq!(config.storage.bucket, "assets");
    }

    #[test]
    fn yaml_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qrgate.yaml");
        fs::write(&path, "synthesis:\n  timeout_secs: 0\nlogging:\n  level: debug\n").unwrap();

        let config = QrGateConfig::from_file(&path).unwrap();
        assert_eq!(config.synthesis.timeout(), None);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qrgate.ini");
        fs::write(&path, "").unwrap();
        assert!(matches!(
            QrGateConfig::from_file(&path),
            Err(Error::Config(_))
        ));
    }
}

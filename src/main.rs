//! qrgate service entrypoint

use clap::{Parser, Subcommand};
use qrgate::artifact::RasterAsset;
use qrgate::config::MetricsFormat;
use qrgate::qr::{ErrorCorrection, QrDecoder, QrRenderer};
use qrgate::server::{self, AppState};
use qrgate::{
    ArtifactVariant, Error, Pipeline, PreviewTransform, QrGateConfig, RazorpayGateway, Result,
    logging, metrics,
};
use serde_json::json;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "qrgate",
    version,
    about = "QR code generator with free previews and payment-gated originals"
)]
struct Cli {
    /// Optional configuration file (toml/yaml). Defaults to qrgate.{toml,yaml} in cwd/XDG config.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (default)
    Serve(ServeArgs),

    /// Render a standard QR code to disk without uploading it
    Render {
        /// URL to encode
        url: String,

        /// Output path of the real image
        #[arg(long, value_name = "PNG")]
        out: PathBuf,

        /// Also write the watermarked preview here
        #[arg(long, value_name = "PNG")]
        preview: Option<PathBuf>,

        /// Error correction level (L, M, Q or H)
        #[arg(long, value_name = "LEVEL")]
        ecc: Option<String>,

        /// Module edge length in pixels
        #[arg(long, value_name = "PX")]
        module_size: Option<u32>,

        /// Quiet zone width in modules
        #[arg(long, value_name = "MODULES")]
        border: Option<u32>,
    },

    /// Decode the QR code contained in an image file
    Decode {
        /// Image to scan
        path: PathBuf,

        /// Output results as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args, Debug, Default)]
struct ServeArgs {
    /// Override bind address (takes precedence over config file)
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Override bind port
    #[arg(long, value_name = "PORT")]
    port: Option<u16>,

    /// Enable periodic metrics summaries regardless of configuration file settings
    #[arg(long)]
    metrics: bool,

    /// Override `GET /metrics` format (`json` or `prometheus`)
    #[arg(long, value_name = "FORMAT")]
    metrics_format: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None => serve(cli.config.as_deref(), ServeArgs::default()).await,
        Some(Command::Serve(args)) => serve(cli.config.as_deref(), args).await,
        Some(Command::Render {
            url,
            out,
            preview,
            ecc,
            module_size,
            border,
        }) => render(
            cli.config.as_deref(),
            &url,
            &out,
            preview.as_deref(),
            ecc.as_deref(),
            module_size,
            border,
        ),
        Some(Command::Decode { path, json }) => decode(&path, json),
    }
}

async fn serve(config_path: Option<&Path>, args: ServeArgs) -> Result<()> {
    let mut config = QrGateConfig::load(config_path)?;

    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if args.metrics {
        config.logging.metrics = true;
    }
    if let Some(ref format) = args.metrics_format {
        config.logging.metrics_format = format.parse::<MetricsFormat>().map_err(Error::Config)?;
    }

    logging::init(&config.logging)?;
    config.validate()?;

    if config.logging.metrics {
        metrics::enable(config.logging.metrics_interval_secs);
    }

    let endpoint = config.server.socket_address();
    let addr = SocketAddr::from_str(&endpoint)
        .map_err(|e| Error::Config(format!("Invalid bind address '{endpoint}': {e}")))?;

    let pipeline = Pipeline::from_config(&config)?;
    let gateway = RazorpayGateway::new(
        config.payment.key_id.as_deref().unwrap_or_default(),
        config.payment.key_secret.as_deref().unwrap_or_default(),
        config.payment.api_base.as_deref(),
    )?;

    info!(
        backend = ?config.storage.backend,
        synthesis = %config.synthesis.endpoint,
        "Starting qrgate"
    );

    let state = AppState::new(
        Arc::new(pipeline),
        Arc::new(gateway),
        config.logging.metrics_format,
    );
    server::serve(addr, state).await
}

fn render(
    config_path: Option<&Path>,
    url: &str,
    out: &Path,
    preview: Option<&Path>,
    ecc: Option<&str>,
    module_size: Option<u32>,
    border: Option<u32>,
) -> Result<()> {
    let config = QrGateConfig::load(config_path)?;
    let mut options = config.render;

    if let Some(level) = ecc {
        options.error_correction = ErrorCorrection::parse(level)
            .ok_or_else(|| Error::Config(format!("Unknown error correction level '{level}'")))?;
    }
    if let Some(size) = module_size {
        options.module_size = size;
    }
    if let Some(border) = border {
        options.border = border;
    }

    let real = QrRenderer::new(options).render_url(url)?;
    real.save(out)?;
    let (width, height) = real.dimensions();
    println!("Wrote {} ({width}x{height})", out.display());

    if let Some(path) = preview {
        let transform = PreviewTransform::new(config.preview.font_path.as_deref());
        transform
            .derive(&real, ArtifactVariant::Standard)
            .save(path)?;
        println!("Wrote preview {}", path.display());
    }

    Ok(())
}

fn decode(path: &Path, json: bool) -> Result<()> {
    let raster = RasterAsset::open(path)?;
    let payload = QrDecoder::new().decode(&raster.image)?;

    if json {
        let root = json!({
            "text": payload.as_str(),
            "bytes_hex": hex::encode(payload.as_bytes()),
            "byte_length": payload.as_bytes().len(),
        });
        println!("{}", serde_json::to_string_pretty(&root)?);
    } else if let Some(text) = payload.as_str() {
        println!("QR text: {text}");
    } else {
        println!("QR binary payload ({} bytes)", payload.as_bytes().len());
    }

    Ok(())
}

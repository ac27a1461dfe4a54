//! Background removal web server entry point
//!
//! Parses flags (each also readable from a `BGREMOVE_*` environment
//! variable), sets up tracing, loads the model and serves the page.

use super::config::CliConfigBuilder;
use crate::{
    processor::{BackendFactory, BackendType, BackgroundRemovalProcessor, DefaultBackendFactory},
    remover::{BackgroundRemover, ProcessorRemover},
    tracing_config::{TracingConfig, TracingFormat},
    web,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Single-page background removal web app
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-web")]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "BGREMOVE_BIND", default_value = "127.0.0.1:8501")]
    pub bind: SocketAddr,

    /// Page layout and copy
    #[arg(long, env = "BGREMOVE_VARIANT", value_enum, default_value_t = CliVariant::Studio)]
    pub variant: CliVariant,

    /// Inference backend
    #[arg(long, env = "BGREMOVE_BACKEND", value_enum, default_value_t = CliBackend::Onnx)]
    pub backend: CliBackend,

    /// Execution provider for the ONNX backend
    #[arg(
        short,
        long,
        env = "BGREMOVE_EXECUTION_PROVIDER",
        value_enum,
        default_value_t = CliExecutionProvider::Auto
    )]
    pub execution_provider: CliExecutionProvider,

    /// Path to an .onnx file or a directory containing model.json
    #[arg(short, long, env = "BGREMOVE_MODEL", value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Preprocessing preset used when the model has no model.json
    #[arg(long, env = "BGREMOVE_PRESET", value_enum, default_value_t = CliPreset::Isnet)]
    pub preset: CliPreset,

    /// Number of inference threads (0 = auto-detect)
    #[arg(short, long, env = "BGREMOVE_THREADS", default_value_t = 0)]
    pub threads: usize,

    /// Maximum upload size in megabytes
    #[arg(long, env = "BGREMOVE_MAX_UPLOAD_MB", default_value_t = 200)]
    pub max_upload_mb: usize,

    /// Maximum decoded image size in megapixels
    #[arg(long, env = "BGREMOVE_MAX_MEGAPIXELS", default_value_t = 64)]
    pub max_megapixels: u64,

    /// Idle seconds before a browser session is forgotten
    #[arg(long, env = "BGREMOVE_SESSION_TTL_SECS", default_value_t = 3600)]
    pub session_ttl_secs: u64,

    /// Maximum number of live browser sessions
    #[arg(long, env = "BGREMOVE_MAX_SESSIONS", default_value_t = 256)]
    pub max_sessions: usize,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, env = "BGREMOVE_LOG_FORMAT", value_enum, default_value_t = CliLogFormat::Console)]
    pub log_format: CliLogFormat,

    /// Also write logs to this file (daily rotation)
    #[cfg(feature = "tracing-files")]
    #[arg(long, env = "BGREMOVE_LOG_FILE", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Show backend and execution provider diagnostics and exit
    #[arg(long)]
    pub show_providers: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliVariant {
    Studio,
    Classic,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliBackend {
    Onnx,
    Tract,
    Mock,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliExecutionProvider {
    Auto,
    Cpu,
    Cuda,
    #[value(name = "coreml")]
    CoreMl,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliPreset {
    Isnet,
    U2net,
    Inspyrenet,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    Json,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _tracing_guard = init_tracing(&cli).context("Failed to initialize tracing")?;

    if cli.show_providers {
        show_provider_diagnostics();
        return Ok(());
    }

    CliConfigBuilder::validate_cli(&cli).context("Invalid CLI arguments")?;
    let processor_config =
        CliConfigBuilder::processor_config(&cli).context("Failed to build processor configuration")?;
    let server_config =
        CliConfigBuilder::server_config(&cli).context("Failed to build server configuration")?;

    info!(
        backend = %processor_config.backend_type,
        provider = %processor_config.removal.execution_provider,
        model = %processor_config.removal.model_spec.display_name(),
        "Starting background removal server"
    );

    if processor_config.backend_type == BackendType::Mock {
        warn!("Using the mock backend; results are synthetic");
    }
    let processor = BackgroundRemovalProcessor::new(processor_config);

    let remover = ProcessorRemover::new(processor);
    remover
        .warm_up()
        .await
        .context("Failed to load the background removal model")?;
    info!(remover = %remover.describe(), "Model ready");

    let remover: Arc<dyn BackgroundRemover> = Arc::new(remover);
    web::serve(server_config, remover)
        .await
        .context("Web server failed")?;

    Ok(())
}

fn init_tracing(cli: &Cli) -> Result<crate::tracing_config::TracingGuard> {
    let format = match cli.log_format {
        CliLogFormat::Console => TracingFormat::Console,
        CliLogFormat::Compact => TracingFormat::Compact,
        #[cfg(feature = "tracing-json")]
        CliLogFormat::Json => TracingFormat::Json,
        #[cfg(not(feature = "tracing-json"))]
        CliLogFormat::Json => {
            eprintln!("JSON logging requires the tracing-json feature, using compact output");
            TracingFormat::Compact
        },
    };

    let mut config = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(format);

    #[cfg(feature = "tracing-files")]
    if let Some(path) = &cli.log_file {
        config = config.with_output(crate::tracing_config::TracingOutput::Both(path.clone()));
    }

    if let Ok(filter) = std::env::var("RUST_LOG") {
        if !filter.trim().is_empty() {
            config = config.with_env_filter(filter);
        }
    }

    config.init()
}

fn show_provider_diagnostics() {
    println!("Backend and Execution Provider Diagnostics");
    println!("==========================================");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    println!("System: {cpu_count} CPU cores detected");

    println!("\nAvailable backends:");
    for backend in DefaultBackendFactory.available_backends() {
        let description = match backend {
            BackendType::Onnx => "ONNX Runtime backend (default), hardware acceleration support",
            BackendType::Tract => "pure Rust backend, CPU only",
            BackendType::Mock => "synthetic mask, no model file needed",
        };
        println!("  - {backend}: {description}");
    }

    #[cfg(feature = "onnx")]
    {
        println!("\nONNX Runtime execution providers:");
        for (name, available, description) in crate::backends::OnnxBackend::list_providers() {
            let status = if available { "available" } else { "not available" };
            println!("  - {name}: {status} ({description})");
        }
    }

    println!("\nExamples:");
    println!("  bgremove-web --model isnet.onnx                       # ONNX, auto provider");
    println!("  bgremove-web --model isnet.onnx -e cuda               # force CUDA");
    println!("  bgremove-web --backend tract --model u2net.onnx --preset u2net");
    println!("  bgremove-web --backend mock --variant classic         # no model needed");
}

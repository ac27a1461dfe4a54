//! Conversion of parsed CLI arguments into library configuration

use super::main_impl::{Cli, CliBackend, CliExecutionProvider, CliPreset, CliVariant};
use crate::{
    config::{ExecutionProvider, RemovalConfig, ServerConfig},
    models::{ModelPreset, ModelSpec},
    processor::{BackendType, ProcessorConfig},
    web::AppVariant,
};
use anyhow::{Context, Result};
use std::time::Duration;

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Reject argument combinations clap cannot express
    pub(crate) fn validate_cli(cli: &Cli) -> Result<()> {
        if cli.backend != CliBackend::Mock && cli.model.is_none() {
            anyhow::bail!(
                "--model is required for the {} backend (or use --backend mock)",
                Self::backend_type(cli.backend)
            );
        }
        if cli.backend == CliBackend::Tract
            && !matches!(
                cli.execution_provider,
                CliExecutionProvider::Auto | CliExecutionProvider::Cpu
            )
        {
            anyhow::bail!("the tract backend only supports the cpu execution provider");
        }
        if let Some(model) = &cli.model {
            if !model.exists() {
                anyhow::bail!("model path does not exist: {}", model.display());
            }
        }
        Ok(())
    }

    pub(crate) fn processor_config(cli: &Cli) -> Result<ProcessorConfig> {
        let model_spec = ModelSpec {
            path: cli.model.clone(),
            preset: Self::preset(cli.preset),
        };

        let removal = RemovalConfig::builder()
            .execution_provider(Self::execution_provider(cli.execution_provider))
            .num_threads(cli.threads)
            .debug(cli.verbose >= 2)
            .model_spec(model_spec)
            .build()
            .context("Invalid removal configuration")?;

        ProcessorConfig::builder()
            .backend_type(Self::backend_type(cli.backend))
            .removal_config(removal)
            .build()
            .context("Invalid processor configuration")
    }

    pub(crate) fn server_config(cli: &Cli) -> Result<ServerConfig> {
        ServerConfig::builder()
            .bind_addr(cli.bind)
            .variant(Self::variant(cli.variant))
            .max_upload_mb(cli.max_upload_mb)
            .max_megapixels(cli.max_megapixels)
            .session_ttl(Duration::from_secs(cli.session_ttl_secs))
            .max_sessions(cli.max_sessions)
            .build()
            .context("Invalid server limits")
    }

    fn backend_type(backend: CliBackend) -> BackendType {
        match backend {
            CliBackend::Onnx => BackendType::Onnx,
            CliBackend::Tract => BackendType::Tract,
            CliBackend::Mock => BackendType::Mock,
        }
    }

    fn execution_provider(provider: CliExecutionProvider) -> ExecutionProvider {
        match provider {
            CliExecutionProvider::Auto => ExecutionProvider::Auto,
            CliExecutionProvider::Cpu => ExecutionProvider::Cpu,
            CliExecutionProvider::Cuda => ExecutionProvider::Cuda,
            CliExecutionProvider::CoreMl => ExecutionProvider::CoreMl,
        }
    }

    fn preset(preset: CliPreset) -> ModelPreset {
        match preset {
            CliPreset::Isnet => ModelPreset::Isnet,
            CliPreset::U2net => ModelPreset::U2net,
            CliPreset::Inspyrenet => ModelPreset::Inspyrenet,
        }
    }

    fn variant(variant: CliVariant) -> AppVariant {
        match variant {
            CliVariant::Studio => AppVariant::Studio,
            CliVariant::Classic => AppVariant::Classic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("bgremove-web").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_model_required_for_real_backends() {
        assert!(CliConfigBuilder::validate_cli(&parse(&[])).is_err());
        assert!(CliConfigBuilder::validate_cli(&parse(&["--backend", "mock"])).is_ok());
    }

    #[test]
    fn test_missing_model_path_rejected() {
        let cli = parse(&["--model", "/definitely/not/here.onnx"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());
    }

    #[test]
    fn test_tract_rejects_gpu_provider() {
        let model = tempfile::NamedTempFile::new().unwrap();
        let path = model.path().to_str().unwrap();
        let cli = parse(&["--backend", "tract", "--model", path, "-e", "cuda"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_err());
        let cli = parse(&["--backend", "tract", "--model", path, "-e", "cpu"]);
        assert!(CliConfigBuilder::validate_cli(&cli).is_ok());
    }

    #[test]
    fn test_processor_config_mapping() {
        let cli = parse(&["--backend", "mock", "-e", "cpu", "--preset", "inspyrenet", "-t", "4"]);
        let config = CliConfigBuilder::processor_config(&cli).unwrap();
        assert_eq!(config.backend_type, BackendType::Mock);
        assert_eq!(config.removal.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.removal.model_spec.preset, ModelPreset::Inspyrenet);
        assert!(config.removal.model_spec.path.is_none());
        assert_eq!(config.removal.intra_threads, 4);
    }

    #[test]
    fn test_server_config_mapping() {
        let cli = parse(&[
            "--variant",
            "classic",
            "--max-upload-mb",
            "5",
            "--max-megapixels",
            "2",
            "--session-ttl-secs",
            "60",
            "--max-sessions",
            "8",
        ]);
        let config = CliConfigBuilder::server_config(&cli).unwrap();
        assert_eq!(config.variant, AppVariant::Classic);
        assert_eq!(config.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.max_pixels, 2_000_000);
        assert_eq!(config.session_ttl, Duration::from_secs(60));
        assert_eq!(config.max_sessions, 8);
    }

    #[test]
    fn test_zero_limits_rejected() {
        let cli = parse(&["--max-sessions", "0"]);
        assert!(CliConfigBuilder::server_config(&cli).is_err());
    }
}

//! Configuration types for inference and for the web server

use crate::error::{BgRemovalError, Result};
use crate::models::ModelSpec;
use crate::services::InputFormat;
use crate::web::AppVariant;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Configuration for background removal inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalConfig {
    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Enable debug mode (additional logging)
    pub debug: bool,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,

    /// Model file and preprocessing preset
    pub model_spec: ModelSpec,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            execution_provider: ExecutionProvider::default(),
            debug: false,
            intra_threads: 0,
            inter_threads: 0,
            model_spec: ModelSpec::default(),
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    /// ```rust
    /// use bgremove_web::{ExecutionProvider, RemovalConfig};
    ///
    /// let config = RemovalConfig::builder()
    ///     .execution_provider(ExecutionProvider::Cpu)
    ///     .num_threads(4)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.intra_threads, 4);
    /// assert_eq!(config.inter_threads, 2);
    /// ```
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::default()
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    /// Set execution provider
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    /// Enable debug mode
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Set number of intra-op threads
    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    /// Set number of inter-op threads
    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    /// Set both thread counts from a single total
    ///
    /// Intra-op gets `threads`, inter-op gets `threads / 2` (at least 1).
    /// Zero leaves both on auto-detect.
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        if threads == 0 {
            self.config.intra_threads = 0;
            self.config.inter_threads = 0;
        } else {
            self.config.intra_threads = threads;
            self.config.inter_threads = (threads / 2).max(1);
        }
        self
    }

    /// Set model specification
    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = model_spec;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Invalid thread combination (inter-op threads without intra-op threads)
    pub fn build(self) -> Result<RemovalConfig> {
        if self.config.intra_threads == 0 && self.config.inter_threads > 0 {
            return Err(BgRemovalError::invalid_config(
                "inter-op threads require an explicit intra-op thread count",
            ));
        }
        Ok(self.config)
    }
}

/// Web server settings
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to
    pub bind_addr: SocketAddr,
    /// Which of the two page layouts to serve
    pub variant: AppVariant,
    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: usize,
    /// Maximum decoded pixel count (width * height)
    pub max_pixels: u64,
    /// Idle time after which a session is dropped
    pub session_ttl: Duration,
    /// Upper bound on live sessions
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8501)),
            variant: AppVariant::default(),
            max_upload_bytes: 200 * 1024 * 1024,
            max_pixels: 64 * 1_000_000,
            session_ttl: Duration::from_secs(3600),
            max_sessions: 256,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Formats the variant lets users upload
    #[must_use]
    pub fn accepted_formats(&self) -> &'static [InputFormat] {
        self.variant.accepted_formats()
    }

    /// Validate server limits
    ///
    /// # Errors
    /// - Zero upload size, pixel limit, session TTL or session capacity
    pub fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            return Err(BgRemovalError::config_value_error(
                "max upload size (bytes)",
                self.max_upload_bytes,
                ">= 1",
                Some(200 * 1024 * 1024),
            ));
        }
        if self.max_pixels == 0 {
            return Err(BgRemovalError::config_value_error(
                "max pixels",
                self.max_pixels,
                ">= 1",
                Some(64 * 1_000_000),
            ));
        }
        if self.session_ttl.is_zero() {
            return Err(BgRemovalError::invalid_config(
                "session TTL must be greater than zero",
            ));
        }
        if self.max_sessions == 0 {
            return Err(BgRemovalError::config_value_error(
                "max sessions",
                self.max_sessions,
                ">= 1",
                Some(256),
            ));
        }
        Ok(())
    }
}

/// Builder for `ServerConfig`
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    #[must_use]
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    #[must_use]
    pub fn variant(mut self, variant: AppVariant) -> Self {
        self.config.variant = variant;
        self
    }

    #[must_use]
    pub fn max_upload_mb(mut self, megabytes: usize) -> Self {
        self.config.max_upload_bytes = megabytes.saturating_mul(1024 * 1024);
        self
    }

    #[must_use]
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    #[must_use]
    pub fn max_megapixels(mut self, megapixels: u64) -> Self {
        self.config.max_pixels = megapixels.saturating_mul(1_000_000);
        self
    }

    #[must_use]
    pub fn session_ttl(mut self, ttl: Duration) -> Self {
        self.config.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn max_sessions(mut self, max_sessions: usize) -> Self {
        self.config.max_sessions = max_sessions;
        self
    }

    /// Build and validate the server configuration
    ///
    /// # Errors
    /// - Any limit rejected by [`ServerConfig::validate`]
    pub fn build(self) -> Result<ServerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

//! Backend implementations for different inference engines
//!
//! - ONNX Runtime backend (GPU acceleration)
//! - Tract backend (pure Rust, no external dependencies)
//! - Mock backend (deterministic mask, no model file)

pub mod mock;

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

pub use self::mock::MockBackend;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxBackend;

#[cfg(feature = "tract")]
pub use self::tract::TractBackend;

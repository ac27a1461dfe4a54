//! Shared utilities for the processing pipeline

pub mod preprocessing;

pub use preprocessing::{ImagePreprocessor, Letterbox};

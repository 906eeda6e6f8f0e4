//! Error taxonomy for the detection pipeline.
//!
//! Per-frame errors (`EncodingError`, `InferenceError`, `DecodingError`) are
//! recovered inside `DetectionPipeline::run`. `ConfigurationError` is fatal to
//! pipeline construction.

use thiserror::Error;

/// The frame could not be turned into a model input tensor.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EncodingError {
    #[error("frame has zero size: {width}x{height}")]
    ZeroSized { width: u32, height: u32 },

    #[error("frame dimensions overflow: {width}x{height}")]
    DimensionOverflow { width: u32, height: u32 },

    #[error("{format} frame length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        format: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("NV12 frames need even dimensions, got {width}x{height}")]
    OddNv12Dimensions { width: u32, height: u32 },
}

/// The inference backend failed to load or to run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InferenceError {
    #[error("failed to load model {path}: {reason}")]
    Load { path: String, reason: String },

    #[error("inference backend not initialized")]
    NotInitialized,

    #[error("input shape {got:?} does not match model input {expected:?}")]
    InputShape { expected: Vec<usize>, got: Vec<usize> },

    #[error("inference failed: {0}")]
    Run(String),
}

/// The raw model output could not be interpreted.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodingError {
    #[error("unsupported {layout} output shape {shape:?}: {reason}")]
    UnsupportedShape {
        layout: &'static str,
        shape: Vec<usize>,
        reason: &'static str,
    },

    #[error("output shape {got:?} does not match declared shape {declared:?}")]
    ShapeMismatch { declared: Vec<usize>, got: Vec<usize> },

    #[error("output buffer holds {actual} values, shape {shape:?} needs {expected}")]
    LengthMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("box coordinates look {found}, model configured for {configured} units")]
    UnitMismatch {
        configured: &'static str,
        found: &'static str,
    },
}

/// Invalid configuration. Fatal to pipeline creation.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("{field} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { field: &'static str, value: f32 },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("invalid normalization: {0}")]
    Normalization(String),

    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("class name source {path} contains no class names")]
    EmptyClassNames { path: String },

    #[error("invalid font {path}")]
    Font { path: String },
}

/// Umbrella error for callers that handle every kind the same way.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error(transparent)]
    Decoding(#[from] DecodingError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

//! SmartSign live-video object detection.
//!
//! Frames from a source go through one `DetectionPipeline` per stream:
//!
//! 1. `detect::FrameTensorEncoder` converts, resizes and normalizes the frame
//!    into a planar `[1, 3, H, W]` tensor.
//! 2. An `InferenceBackend` runs the model.
//! 3. `detect::DetectionDecoder` turns the raw output (transposed or
//!    row-major layout) into candidates.
//! 4. Boxes are rescaled to frame pixels and `detect::NonMaxSuppressor`
//!    removes per-class duplicates.
//! 5. `annotate::Annotator` draws the overlay and the text summary.
//!
//! # Module Structure
//!
//! - `frame`: decoded frames and pixel formats
//! - `detect`: encoder, decoder, suppression, class names, backends
//! - `pipeline`: per-frame orchestration and state machine
//! - `annotate`: overlay drawing and summaries
//! - `advisory`: class counts and the roadside sign state
//! - `ingest`: frame sources
//! - `capture`: paced capture loop with cooperative stop
//! - `config`: file and environment configuration

pub mod advisory;
pub mod annotate;
pub mod capture;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod ui;

pub use advisory::{AdvisoryRules, ClassCounts, SignAdvisor, SignState};
pub use annotate::Annotator;
pub use capture::{CaptureLoop, DisplaySink, LogSink, LoopStats, StopHandle};
pub use config::SmartsignConfig;
pub use detect::{
    BoundingBox, ClassNameTable, DetectionResult, InferenceBackend, OutputLayout, StubBackend,
};
pub use error::{ConfigurationError, DecodingError, EncodingError, InferenceError, PipelineError};
pub use frame::{Frame, PixelFormat};
pub use ingest::{open_source, FrameSource};
pub use pipeline::{DetectionPipeline, FrameOutcome, FrameStatus, PipelineConfig, PipelineState};

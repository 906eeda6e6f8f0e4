//! Per-frame detection pipeline.
//!
//! `DetectionPipeline` owns the encoder scratch buffer, the backend, the
//! decoder and the annotator for one frame stream. The state machine is
//!
//! ```text
//! Uninitialized --initialize(ok)--> Ready --run--> Running --> Ready
//!       \--initialize(err)--> Disabled (permanent)
//! ```
//!
//! `run` never fails: encode, inference and decode errors are logged, kept
//! as the last error and reported in the outcome status while the original
//! frame passes through with no detections.

use std::fmt;
use std::time::{Duration, Instant};

use crate::annotate::{Annotator, DEFAULT_TOP_N};
use crate::detect::{
    BoxUnits, ClassNameTable, DetectionDecoder, DetectionResult, FrameTensorEncoder,
    InferenceBackend, Normalization, NonMaxSuppressor, OutputLayout, DEFAULT_MAX_DETECTIONS,
};
use crate::error::{ConfigurationError, InferenceError, PipelineError};
use crate::frame::Frame;

/// Settings fixed for the lifetime of a pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    pub input_width: u32,
    pub input_height: u32,
    pub normalization: Normalization,
    pub layout: OutputLayout,
    pub box_units: BoxUnits,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    pub top_n: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_width: 640,
            input_height: 640,
            normalization: Normalization::Scale,
            layout: OutputLayout::Transposed,
            box_units: BoxUnits::Pixels,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: DEFAULT_MAX_DETECTIONS,
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigurationError::ThresholdOutOfRange {
                field: "thresholds.confidence",
                value: self.confidence_threshold,
            });
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return Err(ConfigurationError::ThresholdOutOfRange {
                field: "thresholds.iou",
                value: self.iou_threshold,
            });
        }
        if self.input_width == 0 {
            return Err(ConfigurationError::Zero {
                field: "model.input_width",
            });
        }
        if self.input_height == 0 {
            return Err(ConfigurationError::Zero {
                field: "model.input_height",
            });
        }
        if self.max_detections == 0 {
            return Err(ConfigurationError::Zero {
                field: "thresholds.max_detections",
            });
        }
        self.normalization.validate()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    Ready,
    Running,
    Disabled,
}

/// How a frame went through the pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Ok,
    NotInitialized,
    Disabled,
    /// A per-frame error was recovered; holds its message.
    Failed(String),
}

impl FrameStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, FrameStatus::Ok)
    }
}

impl fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameStatus::Ok => write!(f, "ok"),
            FrameStatus::NotInitialized => write!(f, "detector not initialized"),
            FrameStatus::Disabled => write!(f, "detector disabled"),
            FrameStatus::Failed(reason) => write!(f, "detection failed: {}", reason),
        }
    }
}

/// Time spent in each stage of one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub encode: Duration,
    pub infer: Duration,
    /// Decode, rescale, suppression and naming.
    pub postprocess: Duration,
    pub annotate: Duration,
}

/// Everything `run` hands back for one frame.
#[derive(Clone, Debug)]
pub struct FrameOutcome {
    pub annotated: Frame,
    pub results: Vec<DetectionResult>,
    pub elapsed: Duration,
    pub timings: StageTimings,
    pub status: FrameStatus,
    pub summary: String,
}

struct Engine {
    backend: Box<dyn InferenceBackend>,
    decoder: DetectionDecoder,
}

pub struct DetectionPipeline {
    config: PipelineConfig,
    classes: ClassNameTable,
    encoder: FrameTensorEncoder,
    suppressor: NonMaxSuppressor,
    annotator: Annotator,
    engine: Option<Engine>,
    state: PipelineState,
    last_error: Option<String>,
}

impl DetectionPipeline {
    pub fn new(config: PipelineConfig, classes: ClassNameTable) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let encoder =
            FrameTensorEncoder::new(config.input_width, config.input_height, config.normalization)?;
        let suppressor =
            NonMaxSuppressor::new(config.iou_threshold)?.with_max_detections(config.max_detections);
        let annotator = Annotator::new(config.top_n);

        Ok(Self {
            config,
            classes,
            encoder,
            suppressor,
            annotator,
            engine: None,
            state: PipelineState::Uninitialized,
            last_error: None,
        })
    }

    /// Replaces the annotator, e.g. one with a label font.
    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    /// Attaches the backend produced by a model load attempt.
    ///
    /// A failed load, a failed warm-up or an output shape that does not fit
    /// the configured layout disables the pipeline for good.
    pub fn initialize(
        &mut self,
        backend: Result<Box<dyn InferenceBackend>, InferenceError>,
    ) -> PipelineState {
        if self.state != PipelineState::Uninitialized {
            log::warn!("pipeline already initialized (state {:?})", self.state);
            return self.state;
        }

        match self.attach(backend) {
            Ok(engine) => {
                log::info!(
                    "detector ready: backend={} layout={} classes={} detections={}",
                    engine.backend.name(),
                    engine.decoder.layout().name(),
                    engine.decoder.num_classes(),
                    engine.decoder.num_detections()
                );
                self.engine = Some(engine);
                self.state = PipelineState::Ready;
            }
            Err(err) => {
                log::error!("detector disabled: {}", err);
                self.last_error = Some(err.to_string());
                self.state = PipelineState::Disabled;
            }
        }
        self.state
    }

    fn attach(
        &self,
        backend: Result<Box<dyn InferenceBackend>, InferenceError>,
    ) -> Result<Engine, PipelineError> {
        let mut backend = backend?;
        let decoder = DetectionDecoder::new(
            self.config.layout,
            self.config.box_units,
            backend.output_shape(),
            (self.config.input_width, self.config.input_height),
        )?;
        backend.warm_up()?;

        if !self.classes.is_uniform() && self.classes.len() != decoder.num_classes() {
            log::warn!(
                "class name table lists {} names but the model scores {} classes",
                self.classes.len(),
                decoder.num_classes()
            );
        }
        Ok(Engine { backend, decoder })
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Message of the most recent error, if any occurred.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn classes(&self) -> &ClassNameTable {
        &self.classes
    }

    pub fn annotator(&self) -> &Annotator {
        &self.annotator
    }

    /// Runs one frame through encode, inference, decode, suppression and
    /// annotation. The input frame is never modified.
    pub fn run(&mut self, frame: &Frame) -> FrameOutcome {
        let started = Instant::now();
        match self.state {
            PipelineState::Disabled => return self.pass_through(frame, FrameStatus::Disabled, started),
            PipelineState::Uninitialized => {
                return self.pass_through(frame, FrameStatus::NotInitialized, started)
            }
            PipelineState::Ready | PipelineState::Running => {}
        }

        self.state = PipelineState::Running;
        let mut timings = StageTimings::default();
        let detected = self.detect(frame, &mut timings);
        self.state = PipelineState::Ready;

        let results = match detected {
            Ok(results) => results,
            Err(err) => return self.recover(frame, err, started),
        };

        let annotate_started = Instant::now();
        let annotated = match self.annotator.annotate(frame, &results) {
            Ok(annotated) => annotated,
            Err(err) => return self.recover(frame, err.into(), started),
        };
        let summary = self.annotator.summarize(&results);
        timings.annotate = annotate_started.elapsed();

        log::debug!(
            "frame {}x{} (age {:?}): {} detections, encode={:?} infer={:?} post={:?} annotate={:?}",
            frame.width,
            frame.height,
            frame.age(),
            results.len(),
            timings.encode,
            timings.infer,
            timings.postprocess,
            timings.annotate
        );

        FrameOutcome {
            annotated,
            results,
            elapsed: started.elapsed(),
            timings,
            status: FrameStatus::Ok,
            summary,
        }
    }

    fn detect(
        &mut self,
        frame: &Frame,
        timings: &mut StageTimings,
    ) -> Result<Vec<DetectionResult>, PipelineError> {
        let engine = self.engine.as_mut().ok_or(InferenceError::NotInitialized)?;

        let stage = Instant::now();
        let input = self.encoder.encode(frame)?;
        timings.encode = stage.elapsed();

        let stage = Instant::now();
        let raw = engine.backend.run(input)?;
        timings.infer = stage.elapsed();

        let stage = Instant::now();
        let candidates = engine
            .decoder
            .decode(&raw, self.config.confidence_threshold)?;

        let sx = frame.width as f32 / self.config.input_width as f32;
        let sy = frame.height as f32 / self.config.input_height as f32;
        let (frame_w, frame_h) = (frame.width as f32, frame.height as f32);
        let rescaled = candidates
            .into_iter()
            .filter_map(|candidate| {
                let bbox = candidate.bbox.scaled(sx, sy).clamped(frame_w, frame_h);
                bbox.is_valid().then(|| candidate.with_bbox(bbox))
            })
            .collect();

        let results = self
            .suppressor
            .suppress(rescaled)
            .into_iter()
            .map(|candidate| DetectionResult {
                class_id: candidate.class_id,
                class_name: self.classes.name(candidate.class_id),
                confidence: candidate.confidence,
                bbox: candidate.bbox,
            })
            .collect();
        timings.postprocess = stage.elapsed();

        Ok(results)
    }

    fn recover(&mut self, frame: &Frame, err: PipelineError, started: Instant) -> FrameOutcome {
        log::warn!("frame dropped: {}", err);
        let reason = err.to_string();
        self.last_error = Some(reason.clone());
        self.pass_through(frame, FrameStatus::Failed(reason), started)
    }

    fn pass_through(&self, frame: &Frame, status: FrameStatus, started: Instant) -> FrameOutcome {
        let summary = format!("{}\nStatus: {}", self.annotator.summarize(&[]), status);
        FrameOutcome {
            annotated: frame.clone(),
            results: Vec::new(),
            elapsed: started.elapsed(),
            timings: StageTimings::default(),
            status,
            summary,
        }
    }
}

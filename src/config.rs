//! Daemon configuration: optional file, environment overrides, validation.
//!
//! The file named by `SMARTSIGN_CONFIG` is read as TOML when its extension
//! is `.toml` and as JSON otherwise. Every field is optional.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::advisory::{AdvisoryRules, SignAdvisor};
use crate::annotate::{load_font, Annotator, DEFAULT_TOP_N};
use crate::detect::{
    load_backend, BoxUnits, ClassNameTable, Normalization, OutputLayout, DEFAULT_LABEL,
    DEFAULT_MAX_DETECTIONS,
};
use crate::error::ConfigurationError;
use crate::pipeline::{DetectionPipeline, PipelineConfig};

const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE: f32 = 0.25;
const DEFAULT_IOU: f32 = 0.45;
const DEFAULT_SOURCE_URL: &str = "stub://";
const DEFAULT_TARGET_FPS: u32 = 10;

#[derive(Debug, Deserialize, Default)]
struct SmartsignConfigFile {
    model: Option<ModelConfigFile>,
    thresholds: Option<ThresholdsConfigFile>,
    classes: Option<ClassesConfigFile>,
    source: Option<SourceConfigFile>,
    annotate: Option<AnnotateConfigFile>,
    advisory: Option<AdvisoryRules>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    layout: Option<OutputLayout>,
    box_units: Option<BoxUnits>,
    normalization: Option<Normalization>,
}

#[derive(Debug, Deserialize, Default)]
struct ThresholdsConfigFile {
    confidence: Option<f32>,
    iou: Option<f32>,
    max_detections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ClassesConfigFile {
    path: Option<PathBuf>,
    default_label: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    loop_playback: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct AnnotateConfigFile {
    font_path: Option<PathBuf>,
    top_n: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SmartsignConfig {
    pub model: ModelSettings,
    pub thresholds: ThresholdSettings,
    pub classes: ClassSettings,
    pub source: SourceSettings,
    pub annotate: AnnotateSettings,
    pub advisory: AdvisoryRules,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    /// ONNX model file. Without one the daemon runs a stub detector.
    pub path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub layout: OutputLayout,
    pub box_units: BoxUnits,
    pub normalization: Normalization,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSettings {
    pub confidence: f32,
    pub iou: f32,
    pub max_detections: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassSettings {
    pub path: Option<PathBuf>,
    pub default_label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    pub url: String,
    pub target_fps: u32,
    pub loop_playback: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotateSettings {
    pub font_path: Option<PathBuf>,
    pub top_n: usize,
}

impl Default for SmartsignConfig {
    fn default() -> Self {
        Self::from_file(SmartsignConfigFile::default())
    }
}

impl SmartsignConfig {
    pub fn load() -> Result<Self, ConfigurationError> {
        let config_path = std::env::var("SMARTSIGN_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parses a config file without consulting the environment.
    pub fn from_path(path: &Path) -> Result<Self, ConfigurationError> {
        let cfg = Self::from_file(read_config_file(path)?);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: SmartsignConfigFile) -> Self {
        let model = file.model.unwrap_or_default();
        let thresholds = file.thresholds.unwrap_or_default();
        let classes = file.classes.unwrap_or_default();
        let source = file.source.unwrap_or_default();
        let annotate = file.annotate.unwrap_or_default();

        Self {
            model: ModelSettings {
                path: model.path,
                input_width: model.input_width.unwrap_or(DEFAULT_INPUT_SIZE),
                input_height: model.input_height.unwrap_or(DEFAULT_INPUT_SIZE),
                layout: model.layout.unwrap_or(OutputLayout::Transposed),
                box_units: model.box_units.unwrap_or_default(),
                normalization: model.normalization.unwrap_or_default(),
            },
            thresholds: ThresholdSettings {
                confidence: thresholds.confidence.unwrap_or(DEFAULT_CONFIDENCE),
                iou: thresholds.iou.unwrap_or(DEFAULT_IOU),
                max_detections: thresholds.max_detections.unwrap_or(DEFAULT_MAX_DETECTIONS),
            },
            classes: ClassSettings {
                path: classes.path,
                default_label: classes
                    .default_label
                    .unwrap_or_else(|| DEFAULT_LABEL.to_string()),
            },
            source: SourceSettings {
                url: source.url.unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
                target_fps: source.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
                loop_playback: source.loop_playback.unwrap_or(false),
            },
            annotate: AnnotateSettings {
                font_path: annotate.font_path,
                top_n: annotate.top_n.unwrap_or(DEFAULT_TOP_N),
            },
            advisory: file.advisory.unwrap_or_default(),
        }
    }

    fn apply_env(&mut self) -> Result<(), ConfigurationError> {
        if let Some(path) = env_value("SMARTSIGN_MODEL_PATH") {
            self.model.path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_value("SMARTSIGN_CLASSES_PATH") {
            self.classes.path = Some(PathBuf::from(path));
        }
        if let Some(url) = env_value("SMARTSIGN_SOURCE_URL") {
            self.source.url = url;
        }
        if let Some(value) = env_value("SMARTSIGN_CONFIDENCE") {
            self.thresholds.confidence = parse_env("SMARTSIGN_CONFIDENCE", &value)?;
        }
        if let Some(value) = env_value("SMARTSIGN_IOU") {
            self.thresholds.iou = parse_env("SMARTSIGN_IOU", &value)?;
        }
        if let Some(value) = env_value("SMARTSIGN_LAYOUT") {
            self.model.layout = match value.trim().to_ascii_lowercase().as_str() {
                "transposed" => OutputLayout::Transposed,
                "row-major" | "row_major" | "rowmajor" => OutputLayout::RowMajor,
                _ => {
                    return Err(ConfigurationError::InvalidValue {
                        field: "SMARTSIGN_LAYOUT",
                        value,
                    })
                }
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.pipeline_config().validate()?;
        if self.annotate.top_n == 0 {
            return Err(ConfigurationError::Zero {
                field: "annotate.top_n",
            });
        }
        if self.source.url.trim().is_empty() {
            return Err(ConfigurationError::InvalidValue {
                field: "source.url",
                value: self.source.url.clone(),
            });
        }
        if self.classes.default_label.trim().is_empty() {
            return Err(ConfigurationError::InvalidValue {
                field: "classes.default_label",
                value: self.classes.default_label.clone(),
            });
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            input_width: self.model.input_width,
            input_height: self.model.input_height,
            normalization: self.model.normalization,
            layout: self.model.layout,
            box_units: self.model.box_units,
            confidence_threshold: self.thresholds.confidence,
            iou_threshold: self.thresholds.iou,
            max_detections: self.thresholds.max_detections,
            top_n: self.annotate.top_n,
        }
    }

    pub fn sign_advisor(&self) -> SignAdvisor {
        SignAdvisor::new(self.advisory.clone())
    }

    /// Builds and initializes the pipeline described by this config.
    ///
    /// Configuration problems are returned as errors. A model that fails to
    /// load leaves the pipeline `Disabled` instead.
    pub fn build_pipeline(&self) -> Result<DetectionPipeline, ConfigurationError> {
        let classes = ClassNameTable::load_or_default(
            self.classes.path.as_deref(),
            &self.classes.default_label,
        )?;
        let mut annotator = Annotator::new(self.annotate.top_n);
        if let Some(path) = &self.annotate.font_path {
            annotator = annotator.with_font(load_font(path)?);
        }

        let num_classes = classes.len();
        let mut pipeline =
            DetectionPipeline::new(self.pipeline_config(), classes)?.with_annotator(annotator);
        pipeline.initialize(load_backend(
            self.model.path.as_deref(),
            (self.model.input_width, self.model.input_height),
            self.model.layout,
            num_classes,
        ));
        Ok(pipeline)
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env(field: &'static str, value: &str) -> Result<f32, ConfigurationError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigurationError::InvalidValue {
            field,
            value: value.to_string(),
        })
}

fn read_config_file(path: &Path) -> Result<SmartsignConfigFile, ConfigurationError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let parse_err = |reason: String| ConfigurationError::Parse {
        path: path.display().to_string(),
        reason,
    };
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_toml {
        toml::from_str(&raw).map_err(|e| parse_err(e.to_string()))
    } else {
        serde_json::from_str(&raw).map_err(|e| parse_err(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let cfg = SmartsignConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.source.url, "stub://");
        assert_eq!(cfg.pipeline_config(), PipelineConfig::default());
    }

    #[test]
    fn reads_toml_with_mean_std_normalization() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[model]
input_width = 320
input_height = 320
layout = "row-major"
box_units = "normalized"

[model.normalization]
kind = "mean-std"
mean = [0.485, 0.456, 0.406]
std = [0.229, 0.224, 0.225]

[thresholds]
confidence = 0.4

[advisory]
busy_vehicle_count = 8
"#
        )
        .unwrap();

        let cfg = SmartsignConfig::from_path(file.path()).unwrap();
        assert_eq!(cfg.model.layout, OutputLayout::RowMajor);
        assert_eq!(cfg.model.box_units, BoxUnits::Normalized);
        assert_eq!(cfg.model.normalization, Normalization::imagenet());
        assert_eq!(cfg.thresholds.confidence, 0.4);
        assert_eq!(cfg.thresholds.iou, DEFAULT_IOU);
        assert_eq!(cfg.advisory.busy_vehicle_count, 8);
        assert_eq!(cfg.advisory.vehicle_class, "car");
    }

    #[test]
    fn default_config_builds_a_ready_stub_pipeline() {
        let pipeline = SmartsignConfig::default().build_pipeline().unwrap();
        assert_eq!(pipeline.state(), crate::pipeline::PipelineState::Ready);
    }

    #[test]
    fn empty_class_file_fails_the_build() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut cfg = SmartsignConfig::default();
        cfg.classes.path = Some(file.path().to_path_buf());
        assert!(matches!(
            cfg.build_pipeline(),
            Err(ConfigurationError::EmptyClassNames { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_iou() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"thresholds": {{"iou": 1.2}}}}"#).unwrap();
        assert!(matches!(
            SmartsignConfig::from_path(file.path()),
            Err(ConfigurationError::ThresholdOutOfRange { field: "thresholds.iou", .. })
        ));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            SmartsignConfig::from_path(file.path()),
            Err(ConfigurationError::Parse { .. })
        ));
    }
}

//! Detection core: encode, decode, suppress.

mod backend;
pub mod backends;
mod classes;
mod decoder;
mod encoder;
mod nms;
mod result;

pub use backend::InferenceBackend;
pub use backends::{load_backend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use classes::{ClassNameTable, DEFAULT_LABEL};
pub use decoder::{BoxUnits, DetectionDecoder, OutputLayout, RawOutput};
pub use encoder::{FrameTensorEncoder, InputTensor, Normalization, IMAGENET_MEAN, IMAGENET_STD};
pub use nms::{NonMaxSuppressor, DEFAULT_MAX_DETECTIONS};
pub use result::{BoundingBox, DetectionCandidate, DetectionResult};

pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

use std::path::Path;

use crate::detect::backend::InferenceBackend;
use crate::detect::decoder::OutputLayout;
use crate::error::InferenceError;

pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

/// Loads the backend for `model_path`.
///
/// Without a model path a stub backend that never detects anything is
/// returned, shaped for `layout` and `num_classes`. A model path in a build
/// without `backend-tract` is a load error.
pub fn load_backend(
    model_path: Option<&Path>,
    input_size: (u32, u32),
    layout: OutputLayout,
    num_classes: usize,
) -> Result<Box<dyn InferenceBackend>, InferenceError> {
    let Some(path) = model_path else {
        let classes = num_classes.max(1);
        let shape = match layout {
            OutputLayout::Transposed => vec![1, 4 + classes, 1],
            OutputLayout::RowMajor => vec![1, 1, 5 + classes],
        };
        log::warn!("no model configured, running the stub detector");
        return Ok(Box::new(StubBackend::empty(input_size, shape)));
    };

    #[cfg(feature = "backend-tract")]
    {
        let backend = TractBackend::load(path, input_size.0, input_size.1)?;
        Ok(Box::new(backend))
    }
    #[cfg(not(feature = "backend-tract"))]
    {
        Err(InferenceError::Load {
            path: path.display().to_string(),
            reason: "built without the backend-tract feature".to_string(),
        })
    }
}

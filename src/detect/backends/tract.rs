#![cfg(feature = "backend-tract")]

use std::path::Path;

use tract_onnx::prelude::*;

use crate::detect::backend::InferenceBackend;
use crate::detect::decoder::RawOutput;
use crate::detect::encoder::InputTensor;
use crate::error::InferenceError;

/// Tract-based backend for ONNX detectors.
///
/// Loads a local model file with a fixed `[1, 3, H, W]` f32 input and reads
/// the declared output shape from the optimized graph.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_shape: [usize; 4],
    output_shape: Vec<usize>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn load<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self, InferenceError> {
        let model_path = model_path.as_ref();
        let load_err = |reason: String| InferenceError::Load {
            path: model_path.display().to_string(),
            reason,
        };

        let input_shape = [1, 3, height as usize, width as usize];
        let optimized = tract_onnx::onnx()
            .model_for_path(model_path)
            .map_err(|e| load_err(format!("failed to read ONNX model: {e}")))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, height as usize, width as usize)),
            )
            .map_err(|e| load_err(format!("failed to set input fact: {e}")))?
            .into_optimized()
            .map_err(|e| load_err(format!("failed to optimize ONNX model: {e}")))?;

        let output_shape = optimized
            .output_fact(0)
            .map_err(|e| load_err(format!("model has no output: {e}")))?
            .shape
            .as_concrete()
            .map(|dims| dims.to_vec())
            .ok_or_else(|| load_err("model output shape is not concrete".to_string()))?;

        let model = optimized
            .into_runnable()
            .map_err(|e| load_err(format!("failed to build runnable ONNX model: {e}")))?;

        log::info!(
            "loaded ONNX model {} (input {:?}, output {:?})",
            model_path.display(),
            input_shape,
            output_shape
        );

        Ok(Self {
            model,
            input_shape,
            output_shape,
        })
    }

    fn build_input(&self, input: &InputTensor) -> Result<Tensor, InferenceError> {
        if input.shape() != self.input_shape {
            return Err(InferenceError::InputShape {
                expected: self.input_shape.to_vec(),
                got: input.shape().to_vec(),
            });
        }
        Tensor::from_shape(&self.input_shape, input.as_slice())
            .map_err(|e| InferenceError::Run(format!("failed to build input tensor: {e}")))
    }
}

impl InferenceBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    fn run(&mut self, input: &InputTensor) -> Result<RawOutput, InferenceError> {
        let tensor = self.build_input(input)?;
        let outputs = self
            .model
            .run(tvec!(tensor.into()))
            .map_err(|e| InferenceError::Run(format!("ONNX inference failed: {e}")))?;

        let output = outputs
            .first()
            .ok_or_else(|| InferenceError::Run("model produced no outputs".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| InferenceError::Run(format!("model output tensor was not f32: {e}")))?;

        Ok(RawOutput::new(
            output.shape().to_vec(),
            view.iter().copied().collect(),
        ))
    }
}

use crate::detect::decoder::RawOutput;
use crate::detect::encoder::InputTensor;
use crate::error::InferenceError;

/// Model inference backend.
///
/// The pipeline treats a backend as a black box: it hands over a planar
/// `[1, 3, H, W]` input tensor and receives a flat output buffer with its
/// shape. A backend is owned by exactly one pipeline and is never called
/// re-entrantly.
pub trait InferenceBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Output shape declared by the loaded model.
    fn output_shape(&self) -> &[usize];

    /// Run the model on an encoded input.
    fn run(&mut self, input: &InputTensor) -> Result<RawOutput, InferenceError>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<(), InferenceError> {
        Ok(())
    }
}

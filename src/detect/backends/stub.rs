use crate::detect::backend::InferenceBackend;
use crate::detect::decoder::RawOutput;
use crate::detect::encoder::InputTensor;
use crate::error::InferenceError;

/// Stub backend for tests and `stub://` runs.
///
/// Replays a scripted sequence of outputs, repeating the last one once the
/// script is exhausted. Inputs are checked against the expected input shape.
pub struct StubBackend {
    input_shape: [usize; 4],
    output_shape: Vec<usize>,
    script: Vec<Result<RawOutput, InferenceError>>,
    cursor: usize,
    calls: u64,
}

impl StubBackend {
    pub fn new(input_size: (u32, u32), output: RawOutput) -> Self {
        Self {
            input_shape: [1, 3, input_size.1 as usize, input_size.0 as usize],
            output_shape: output.shape.clone(),
            script: vec![Ok(output)],
            cursor: 0,
            calls: 0,
        }
    }

    /// Backend whose model produced no detections.
    pub fn empty(input_size: (u32, u32), output_shape: Vec<usize>) -> Self {
        let len = output_shape.iter().product();
        Self::new(input_size, RawOutput::new(output_shape, vec![0.0; len]))
    }

    /// Appends a scripted result to replay after the current ones.
    pub fn then(mut self, next: Result<RawOutput, InferenceError>) -> Self {
        self.script.push(next);
        self
    }

    /// Number of `run` calls so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl InferenceBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn output_shape(&self) -> &[usize] {
        &self.output_shape
    }

    fn run(&mut self, input: &InputTensor) -> Result<RawOutput, InferenceError> {
        self.calls += 1;
        if input.shape() != self.input_shape {
            return Err(InferenceError::InputShape {
                expected: self.input_shape.to_vec(),
                got: input.shape().to_vec(),
            });
        }

        let step = self.cursor.min(self.script.len() - 1);
        self.cursor += 1;
        self.script[step].clone()
    }
}

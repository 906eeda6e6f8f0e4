//! Frame to input-tensor conversion.
//!
//! The detector reads its input by fixed channel-stride arithmetic, so the
//! buffer is planar: the whole R plane, then G, then B, each `height * width`
//! values, behind a leading batch dimension of one.

use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, EncodingError};
use crate::frame::Frame;

/// ImageNet channel means (RGB).
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet channel standard deviations (RGB).
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Pixel normalization expected by the trained model.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Normalization {
    /// `value / 255`
    Scale,
    /// `(value / 255 - mean[c]) / std[c]`
    MeanStd { mean: [f32; 3], std: [f32; 3] },
}

impl Normalization {
    pub fn imagenet() -> Self {
        Normalization::MeanStd {
            mean: IMAGENET_MEAN,
            std: IMAGENET_STD,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if let Normalization::MeanStd { mean, std } = self {
            if mean.iter().any(|m| !m.is_finite()) {
                return Err(ConfigurationError::Normalization(format!(
                    "mean values must be finite, got {:?}",
                    mean
                )));
            }
            if std.iter().any(|s| !s.is_finite() || *s <= 0.0) {
                return Err(ConfigurationError::Normalization(format!(
                    "std values must be finite and positive, got {:?}",
                    std
                )));
            }
        }
        Ok(())
    }

    #[inline]
    fn apply(&self, value: u8, channel: usize) -> f32 {
        let scaled = f32::from(value) / 255.0;
        match self {
            Normalization::Scale => scaled,
            Normalization::MeanStd { mean, std } => (scaled - mean[channel]) / std[channel],
        }
    }
}

impl Default for Normalization {
    fn default() -> Self {
        Normalization::Scale
    }
}

/// Planar `[1, 3, height, width]` input buffer.
///
/// Reused across frames. `is_ready` is false until an encode call has
/// written every value of the current frame.
#[derive(Debug)]
pub struct InputTensor {
    data: Vec<f32>,
    width: usize,
    height: usize,
    ready: bool,
}

impl InputTensor {
    fn new(width: usize, height: usize) -> Self {
        Self {
            data: vec![0.0; 3 * width * height],
            width,
            height,
            ready: false,
        }
    }

    pub fn shape(&self) -> [usize; 4] {
        [1, 3, self.height, self.width]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// One channel plane (0 = R, 1 = G, 2 = B).
    pub fn channel(&self, channel: usize) -> &[f32] {
        let plane = self.width * self.height;
        &self.data[channel * plane..(channel + 1) * plane]
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }
}

/// Converts frames into the detector's input layout.
#[derive(Debug)]
pub struct FrameTensorEncoder {
    width: u32,
    height: u32,
    normalization: Normalization,
    buffer: InputTensor,
}

impl FrameTensorEncoder {
    pub fn new(
        width: u32,
        height: u32,
        normalization: Normalization,
    ) -> Result<Self, ConfigurationError> {
        if width == 0 {
            return Err(ConfigurationError::Zero {
                field: "model.input_width",
            });
        }
        if height == 0 {
            return Err(ConfigurationError::Zero {
                field: "model.input_height",
            });
        }
        normalization.validate()?;
        Ok(Self {
            width,
            height,
            normalization,
            buffer: InputTensor::new(width as usize, height as usize),
        })
    }

    pub fn target_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    /// Converts `frame` to RGB, resizes it bilinearly to the target size and
    /// writes the normalized planar tensor.
    pub fn encode(&mut self, frame: &Frame) -> Result<&InputTensor, EncodingError> {
        self.buffer.ready = false;

        let rgb = frame.to_rgb_image()?;
        let resized = if rgb.dimensions() == (self.width, self.height) {
            rgb
        } else {
            imageops::resize(&rgb, self.width, self.height, FilterType::Triangle)
        };

        let plane = self.buffer.width * self.buffer.height;
        let data = &mut self.buffer.data;
        for (i, px) in resized.pixels().enumerate() {
            for channel in 0..3 {
                data[channel * plane + i] = self.normalization.apply(px[channel], channel);
            }
        }

        self.buffer.ready = true;
        Ok(&self.buffer)
    }

    pub fn buffer(&self) -> &InputTensor {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn writes_planar_channel_major_layout() {
        let mut encoder = FrameTensorEncoder::new(2, 1, Normalization::Scale).unwrap();
        let frame = Frame::new(vec![10, 20, 30, 40, 50, 60], 2, 1, PixelFormat::Rgb24);

        let tensor = encoder.encode(&frame).unwrap();
        assert_eq!(tensor.shape(), [1, 3, 1, 2]);
        let expected = [10.0, 40.0, 20.0, 50.0, 30.0, 60.0].map(|v: f32| v / 255.0);
        for (got, want) in tensor.as_slice().iter().zip(expected.iter()) {
            assert!(approx(*got, *want), "{got} != {want}");
        }
    }

    #[test]
    fn bgr_frames_land_in_rgb_planes() {
        let mut encoder = FrameTensorEncoder::new(1, 1, Normalization::Scale).unwrap();
        let frame = Frame::new(vec![255, 0, 51], 1, 1, PixelFormat::Bgr24);

        let tensor = encoder.encode(&frame).unwrap();
        assert!(approx(tensor.channel(0)[0], 0.2));
        assert!(approx(tensor.channel(1)[0], 0.0));
        assert!(approx(tensor.channel(2)[0], 1.0));
    }

    #[test]
    fn mean_std_normalization_per_channel() {
        let mut encoder = FrameTensorEncoder::new(1, 1, Normalization::imagenet()).unwrap();
        let frame = Frame::new(vec![255, 255, 255], 1, 1, PixelFormat::Rgb24);

        let tensor = encoder.encode(&frame).unwrap();
        for c in 0..3 {
            let want = (1.0 - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
            assert!(approx(tensor.channel(c)[0], want));
        }
    }

    #[test]
    fn resizes_to_target_size() {
        let mut encoder = FrameTensorEncoder::new(2, 2, Normalization::Scale).unwrap();
        let frame = Frame::new([51u8, 102, 153].repeat(16), 4, 4, PixelFormat::Rgb24);

        let tensor = encoder.encode(&frame).unwrap();
        assert_eq!(tensor.as_slice().len(), 12);
        assert!(tensor.channel(0).iter().all(|v| approx(*v, 0.2)));
        assert!(tensor.channel(1).iter().all(|v| approx(*v, 0.4)));
        assert!(tensor.channel(2).iter().all(|v| approx(*v, 0.6)));
    }

    #[test]
    fn downscale_interpolates_gradients() {
        let mut encoder = FrameTensorEncoder::new(2, 2, Normalization::Scale).unwrap();
        let row: Vec<u8> = [0u8, 60, 120, 180]
            .iter()
            .flat_map(|&r| [r, 10, 10])
            .collect();
        let frame = Frame::new(row.repeat(2), 4, 2, PixelFormat::Rgb24);

        // Triangle weights (0.75, 0.75, 0.25) / 1.75 give 42.86 and 137.14,
        // rounded to 43 and 137. Nearest sampling would pick source pixels.
        let tensor = encoder.encode(&frame).unwrap();
        let expected = [43.0 / 255.0, 137.0 / 255.0, 43.0 / 255.0, 137.0 / 255.0];
        for (got, want) in tensor.channel(0).iter().zip(expected) {
            assert!(approx(*got, want), "{} != {}", got, want);
        }
        assert!(tensor.channel(1).iter().all(|v| approx(*v, 10.0 / 255.0)));
    }

    #[test]
    fn scratch_buffer_is_reused_across_frames() {
        let mut encoder = FrameTensorEncoder::new(2, 2, Normalization::Scale).unwrap();
        let first = encoder
            .encode(&Frame::new(vec![0u8; 12], 2, 2, PixelFormat::Rgb24))
            .unwrap()
            .as_slice()
            .as_ptr();
        let second = encoder
            .encode(&Frame::new(vec![9u8; 48], 4, 4, PixelFormat::Rgb24))
            .unwrap()
            .as_slice()
            .as_ptr();
        assert_eq!(first, second);
    }

    #[test]
    fn malformed_frame_leaves_buffer_not_ready() {
        let mut encoder = FrameTensorEncoder::new(2, 2, Normalization::Scale).unwrap();
        encoder
            .encode(&Frame::new(vec![0u8; 12], 2, 2, PixelFormat::Rgb24))
            .unwrap();
        assert!(encoder.buffer().is_ready());

        let err = encoder
            .encode(&Frame::new(Vec::new(), 0, 0, PixelFormat::Rgb24))
            .unwrap_err();
        assert!(matches!(err, EncodingError::ZeroSized { .. }));
        assert!(!encoder.buffer().is_ready());
    }

    #[test]
    fn rejects_invalid_configuration() {
        assert!(FrameTensorEncoder::new(0, 640, Normalization::Scale).is_err());
        let bad = Normalization::MeanStd {
            mean: IMAGENET_MEAN,
            std: [0.2, 0.0, 0.2],
        };
        assert!(matches!(
            FrameTensorEncoder::new(640, 640, bad),
            Err(ConfigurationError::Normalization(_))
        ));
    }
}

//! Raw detector output to candidate detections.
//!
//! Two output layouts are supported, selected by configuration and checked
//! against the model's declared output shape when the decoder is built:
//!
//! - `Transposed` (`[1, 4 + C, N]`): rows 0..4 hold `(cx, cy, w, h)` for every
//!   detection, followed by one score row per class.
//! - `RowMajor` (`[1, N, 5 + C]`): one row per detection,
//!   `[cx, cy, w, h, objectness, class scores...]`.
//!
//! A leading batch dimension of one is optional. Decoded boxes are always in
//! model-input pixel space; `BoxUnits` states how the model reports them.

use serde::{Deserialize, Serialize};

use crate::detect::result::{BoundingBox, DetectionCandidate};
use crate::error::DecodingError;

/// Raw values above this in a normalized-unit model mean pixel units.
const NORMALIZED_LIMIT: f32 = 1.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputLayout {
    Transposed,
    RowMajor,
}

impl OutputLayout {
    pub fn name(self) -> &'static str {
        match self {
            OutputLayout::Transposed => "transposed",
            OutputLayout::RowMajor => "row-major",
        }
    }

    /// Non-class values per detection.
    fn box_fields(self) -> usize {
        match self {
            OutputLayout::Transposed => 4,
            OutputLayout::RowMajor => 5,
        }
    }
}

/// Units of the raw `(cx, cy, w, h)` values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoxUnits {
    /// Model-input pixels.
    #[default]
    Pixels,
    /// Fractions of the model input size.
    Normalized,
}

impl BoxUnits {
    fn name(self) -> &'static str {
        match self {
            BoxUnits::Pixels => "pixel",
            BoxUnits::Normalized => "normalized",
        }
    }
}

/// Flat model output with its runtime shape.
#[derive(Clone, Debug, PartialEq)]
pub struct RawOutput {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl RawOutput {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }
}

/// Interprets raw output buffers for one model.
#[derive(Clone, Debug)]
pub struct DetectionDecoder {
    layout: OutputLayout,
    units: BoxUnits,
    declared_shape: Vec<usize>,
    features: usize,
    detections: usize,
    input_width: f32,
    input_height: f32,
}

impl DetectionDecoder {
    pub fn new(
        layout: OutputLayout,
        units: BoxUnits,
        declared_shape: &[usize],
        input_size: (u32, u32),
    ) -> Result<Self, DecodingError> {
        let unsupported = |reason| DecodingError::UnsupportedShape {
            layout: layout.name(),
            shape: declared_shape.to_vec(),
            reason,
        };

        let dims = match declared_shape {
            [1, a, b] | [a, b] => [*a, *b],
            _ => return Err(unsupported("expected [1, a, b] or [a, b]")),
        };
        if dims.contains(&0) {
            return Err(unsupported("zero-sized dimension"));
        }

        let (features, detections) = match layout {
            OutputLayout::Transposed => (dims[0], dims[1]),
            OutputLayout::RowMajor => (dims[1], dims[0]),
        };
        if features <= layout.box_fields() {
            return Err(unsupported("no class scores after the box fields"));
        }

        Ok(Self {
            layout,
            units,
            declared_shape: declared_shape.to_vec(),
            features,
            detections,
            input_width: input_size.0 as f32,
            input_height: input_size.1 as f32,
        })
    }

    pub fn layout(&self) -> OutputLayout {
        self.layout
    }

    pub fn num_classes(&self) -> usize {
        self.features - self.layout.box_fields()
    }

    pub fn num_detections(&self) -> usize {
        self.detections
    }

    /// Decodes every detection whose confidence clears `confidence_threshold`.
    ///
    /// Candidates come back in raw index order.
    pub fn decode(
        &self,
        output: &RawOutput,
        confidence_threshold: f32,
    ) -> Result<Vec<DetectionCandidate>, DecodingError> {
        if output.shape != self.declared_shape {
            return Err(DecodingError::ShapeMismatch {
                declared: self.declared_shape.clone(),
                got: output.shape.clone(),
            });
        }
        let expected = self.features * self.detections;
        if output.data.len() != expected {
            return Err(DecodingError::LengthMismatch {
                shape: output.shape.clone(),
                expected,
                actual: output.data.len(),
            });
        }

        let data = &output.data;
        let (features, detections) = (self.features, self.detections);
        let value = |det: usize, field: usize| match self.layout {
            OutputLayout::Transposed => data[field * detections + det],
            OutputLayout::RowMajor => data[det * features + field],
        };

        let mut candidates = Vec::new();
        let mut kept = 0usize;
        let mut normalized_looking = 0usize;
        let mut dropped_boxes = 0usize;

        for det in 0..detections {
            let Some((class_id, confidence)) = self.score(det, &value, confidence_threshold)
            else {
                continue;
            };

            let raw = [value(det, 0), value(det, 1), value(det, 2), value(det, 3)];
            if raw.iter().any(|v| !v.is_finite()) {
                dropped_boxes += 1;
                continue;
            }

            kept += 1;
            if raw.iter().all(|v| v.abs() <= 1.0) {
                normalized_looking += 1;
            }
            if self.units == BoxUnits::Normalized && raw.iter().any(|v| *v > NORMALIZED_LIMIT) {
                return Err(DecodingError::UnitMismatch {
                    configured: self.units.name(),
                    found: BoxUnits::Pixels.name(),
                });
            }

            let [cx, cy, w, h] = match self.units {
                BoxUnits::Pixels => raw,
                BoxUnits::Normalized => [
                    raw[0] * self.input_width,
                    raw[1] * self.input_height,
                    raw[2] * self.input_width,
                    raw[3] * self.input_height,
                ],
            };
            let bbox = BoundingBox::from_center(cx, cy, w, h);
            if !bbox.is_valid() {
                dropped_boxes += 1;
                continue;
            }

            candidates.push(DetectionCandidate {
                index: det,
                class_id: class_id as u32,
                confidence,
                bbox,
            });
        }

        if self.units == BoxUnits::Pixels && kept > 0 && normalized_looking == kept {
            return Err(DecodingError::UnitMismatch {
                configured: self.units.name(),
                found: BoxUnits::Normalized.name(),
            });
        }

        if dropped_boxes > 0 {
            log::debug!("decoder dropped {} degenerate boxes", dropped_boxes);
        }
        Ok(candidates)
    }

    /// Best class and its confidence, if it clears the threshold.
    fn score<F>(&self, det: usize, value: &F, threshold: f32) -> Option<(usize, f32)>
    where
        F: Fn(usize, usize) -> f32,
    {
        let first_class = self.layout.box_fields();
        let objectness = match self.layout {
            OutputLayout::Transposed => 1.0,
            OutputLayout::RowMajor => {
                let objectness = value(det, 4);
                if !objectness.is_finite() || objectness < threshold {
                    return None;
                }
                objectness
            }
        };

        let (best_class, best_score) = (first_class..self.features)
            .map(|field| objectness * value(det, field))
            .enumerate()
            .fold(
                (0usize, f32::NEG_INFINITY),
                |(best_idx, best_score), (idx, score)| {
                    if score > best_score {
                        (idx, score)
                    } else {
                        (best_idx, best_score)
                    }
                },
            );

        if !best_score.is_finite() || best_score < threshold {
            return None;
        }
        Some((best_class, best_score))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a `[1, 4 + C, N]` buffer from per-detection rows.
    fn transposed(rows: &[Vec<f32>]) -> RawOutput {
        let features = rows[0].len();
        let n = rows.len();
        let mut data = vec![0.0; features * n];
        for (det, row) in rows.iter().enumerate() {
            for (field, v) in row.iter().enumerate() {
                data[field * n + det] = *v;
            }
        }
        RawOutput::new(vec![1, features, n], data)
    }

    fn row_major(rows: &[Vec<f32>]) -> RawOutput {
        let features = rows[0].len();
        RawOutput::new(vec![1, rows.len(), features], rows.concat())
    }

    fn decoder_for(output: &RawOutput, layout: OutputLayout, units: BoxUnits) -> DetectionDecoder {
        DetectionDecoder::new(layout, units, &output.shape, (640, 640)).unwrap()
    }

    #[test]
    fn transposed_layout_takes_arg_max_class() {
        let output = transposed(&[
            vec![100.0, 100.0, 50.0, 40.0, 0.1, 0.8],
            vec![300.0, 200.0, 20.0, 20.0, 0.2, 0.1],
            vec![500.0, 500.0, 60.0, 60.0, 0.7, 0.3],
        ]);
        let decoder = decoder_for(&output, OutputLayout::Transposed, BoxUnits::Pixels);
        assert_eq!(decoder.num_classes(), 2);

        let candidates = decoder.decode(&output, 0.5).unwrap();
        assert_eq!(candidates.len(), 2);

        assert_eq!(candidates[0].index, 0);
        assert_eq!(candidates[0].class_id, 1);
        assert_eq!(candidates[0].confidence, 0.8);
        assert_eq!(candidates[0].bbox, BoundingBox::new(75.0, 80.0, 125.0, 120.0));

        assert_eq!(candidates[1].index, 2);
        assert_eq!(candidates[1].class_id, 0);
        assert_eq!(candidates[1].confidence, 0.7);
    }

    #[test]
    fn row_major_confidence_is_objectness_times_class_score() {
        let output = row_major(&[vec![320.0, 320.0, 64.0, 64.0, 0.5, 0.5]]);
        let decoder = decoder_for(&output, OutputLayout::RowMajor, BoxUnits::Pixels);

        assert!(decoder.decode(&output, 0.3).unwrap().is_empty());

        let kept = decoder.decode(&output, 0.2).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.25);
    }

    #[test]
    fn row_major_requires_objectness_above_threshold() {
        let output = row_major(&[
            vec![320.0, 320.0, 64.0, 64.0, 0.1, 1.0],
            vec![100.0, 100.0, 30.0, 30.0, 0.9, 0.2, 0.6],
        ]
        .map(|mut row| {
            row.resize(7, 0.0);
            row
        }));
        let decoder = decoder_for(&output, OutputLayout::RowMajor, BoxUnits::Pixels);

        let kept = decoder.decode(&output, 0.2).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].index, 1);
        assert_eq!(kept[0].class_id, 1);
        assert!((kept[0].confidence - 0.54).abs() < 1e-6);
    }

    #[test]
    fn normalized_boxes_decode_to_corners() {
        let output = transposed(&[vec![0.5, 0.5, 0.2, 0.4, 0.9]]);
        let decoder =
            DetectionDecoder::new(OutputLayout::Transposed, BoxUnits::Normalized, &output.shape, (1, 1))
                .unwrap();

        let candidates = decoder.decode(&output, 0.5).unwrap();
        assert_eq!(candidates[0].bbox, BoundingBox::new(0.4, 0.3, 0.6, 0.7));
    }

    #[test]
    fn normalized_boxes_scale_to_input_pixels() {
        let output = transposed(&[vec![0.5, 0.5, 0.2, 0.4, 0.9]]);
        let decoder = decoder_for(&output, OutputLayout::Transposed, BoxUnits::Normalized);

        let bbox = decoder.decode(&output, 0.5).unwrap()[0].bbox;
        for (got, want) in [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max]
            .iter()
            .zip([256.0, 192.0, 384.0, 448.0])
        {
            assert!((got - want).abs() < 1e-3, "{got} != {want}");
        }
    }

    #[test]
    fn pixel_model_with_normalized_boxes_is_a_unit_mismatch() {
        let output = transposed(&[vec![0.5, 0.5, 0.2, 0.4, 0.9]]);
        let decoder = decoder_for(&output, OutputLayout::Transposed, BoxUnits::Pixels);
        assert_eq!(
            decoder.decode(&output, 0.5).unwrap_err(),
            DecodingError::UnitMismatch {
                configured: "pixel",
                found: "normalized"
            }
        );
    }

    #[test]
    fn normalized_model_with_pixel_boxes_is_a_unit_mismatch() {
        let output = transposed(&[vec![320.0, 320.0, 64.0, 64.0, 0.9]]);
        let decoder = decoder_for(&output, OutputLayout::Transposed, BoxUnits::Normalized);
        assert!(matches!(
            decoder.decode(&output, 0.5),
            Err(DecodingError::UnitMismatch { .. })
        ));
    }

    #[test]
    fn degenerate_and_non_finite_boxes_are_dropped() {
        let output = transposed(&[
            vec![100.0, 100.0, 0.0, 40.0, 0.9],
            vec![100.0, f32::NAN, 10.0, 40.0, 0.9],
            vec![100.0, 100.0, 10.0, 40.0, 0.9],
        ]);
        let decoder = decoder_for(&output, OutputLayout::Transposed, BoxUnits::Pixels);

        let candidates = decoder.decode(&output, 0.5).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].index, 2);
    }

    #[test]
    fn unsupported_shapes_are_rejected() {
        let cases: [(OutputLayout, &[usize]); 5] = [
            (OutputLayout::Transposed, &[84]),
            (OutputLayout::Transposed, &[2, 84, 8400]),
            (OutputLayout::Transposed, &[1, 4, 8400]),
            (OutputLayout::RowMajor, &[1, 25200, 5]),
            (OutputLayout::RowMajor, &[1, 0, 85]),
        ];
        for (layout, shape) in cases {
            assert!(
                matches!(
                    DetectionDecoder::new(layout, BoxUnits::Pixels, shape, (640, 640)),
                    Err(DecodingError::UnsupportedShape { .. })
                ),
                "{shape:?} accepted for {layout:?}"
            );
        }

        assert!(
            DetectionDecoder::new(OutputLayout::Transposed, BoxUnits::Pixels, &[84, 8400], (640, 640))
                .is_ok()
        );
    }

    #[test]
    fn runtime_shape_must_match_declared_shape() {
        let decoder = DetectionDecoder::new(
            OutputLayout::Transposed,
            BoxUnits::Pixels,
            &[1, 6, 3],
            (640, 640),
        )
        .unwrap();

        let wrong_shape = RawOutput::new(vec![1, 6, 4], vec![0.0; 24]);
        assert!(matches!(
            decoder.decode(&wrong_shape, 0.5),
            Err(DecodingError::ShapeMismatch { .. })
        ));

        let short = RawOutput::new(vec![1, 6, 3], vec![0.0; 17]);
        assert!(matches!(
            decoder.decode(&short, 0.5),
            Err(DecodingError::LengthMismatch { expected: 18, actual: 17, .. })
        ));
    }
}

use std::cmp::Ordering;

use crate::detect::result::DetectionCandidate;
use crate::error::ConfigurationError;

/// Default cap on detections kept after suppression.
pub const DEFAULT_MAX_DETECTIONS: usize = 300;

/// Greedy per-class non-max suppression.
///
/// Candidates are ranked by confidence (descending), ties broken by raw
/// decode index (ascending). A candidate is discarded when its IoU with an
/// already kept candidate of the same class exceeds the threshold. Boxes of
/// different classes never suppress each other.
#[derive(Clone, Debug)]
pub struct NonMaxSuppressor {
    iou_threshold: f32,
    max_detections: usize,
}

impl NonMaxSuppressor {
    pub fn new(iou_threshold: f32) -> Result<Self, ConfigurationError> {
        if !(0.0..=1.0).contains(&iou_threshold) {
            return Err(ConfigurationError::ThresholdOutOfRange {
                field: "thresholds.iou",
                value: iou_threshold,
            });
        }
        Ok(Self {
            iou_threshold,
            max_detections: DEFAULT_MAX_DETECTIONS,
        })
    }

    /// Caps how many detections `suppress` returns. Every candidate still
    /// takes part in the greedy pass.
    pub fn with_max_detections(mut self, max_detections: usize) -> Self {
        self.max_detections = max_detections.max(1);
        self
    }

    pub fn iou_threshold(&self) -> f32 {
        self.iou_threshold
    }

    pub fn suppress(&self, mut candidates: Vec<DetectionCandidate>) -> Vec<DetectionCandidate> {
        if candidates.is_empty() {
            return candidates;
        }

        candidates.sort_by(rank);

        let mut kept: Vec<DetectionCandidate> = Vec::with_capacity(candidates.len().min(100));
        for candidate in candidates {
            if kept.len() == self.max_detections {
                log::debug!("suppression output capped at {} detections", self.max_detections);
                break;
            }
            let overlaps = kept.iter().any(|k| {
                k.class_id == candidate.class_id
                    && k.bbox.iou(&candidate.bbox) > self.iou_threshold
            });
            if !overlaps {
                kept.push(candidate);
            }
        }
        kept
    }
}

fn rank(a: &DetectionCandidate, b: &DetectionCandidate) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.index.cmp(&b.index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    fn candidate(index: usize, class_id: u32, confidence: f32, bbox: [f32; 4]) -> DetectionCandidate {
        DetectionCandidate {
            index,
            class_id,
            confidence,
            bbox: BoundingBox::new(bbox[0], bbox[1], bbox[2], bbox[3]),
        }
    }

    fn scattered() -> Vec<DetectionCandidate> {
        vec![
            candidate(0, 0, 0.60, [0.0, 0.0, 10.0, 10.0]),
            candidate(1, 0, 0.90, [1.0, 1.0, 11.0, 11.0]),
            candidate(2, 1, 0.75, [0.0, 0.0, 10.0, 10.0]),
            candidate(3, 0, 0.90, [50.0, 50.0, 60.0, 60.0]),
            candidate(4, 1, 0.40, [2.0, 2.0, 12.0, 12.0]),
            candidate(5, 0, 0.90, [51.0, 51.0, 61.0, 61.0]),
            candidate(6, 2, 0.30, [100.0, 100.0, 120.0, 130.0]),
        ]
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let nms = NonMaxSuppressor::new(0.45).unwrap();
        assert!(nms.suppress(Vec::new()).is_empty());
    }

    #[test]
    fn same_class_overlap_keeps_highest_confidence() {
        let nms = NonMaxSuppressor::new(0.45).unwrap();
        // IoU of the two boxes is 60 / 100 = 0.6.
        let kept = nms.suppress(vec![
            candidate(0, 0, 0.8, [0.0, 0.0, 10.0, 6.0]),
            candidate(1, 0, 0.9, [0.0, 0.0, 10.0, 10.0]),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn different_classes_never_suppress_each_other() {
        let nms = NonMaxSuppressor::new(0.45).unwrap();
        let kept = nms.suppress(vec![
            candidate(0, 0, 0.9, [0.0, 0.0, 10.0, 10.0]),
            candidate(1, 1, 0.8, [0.0, 0.0, 10.0, 6.0]),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].class_id, 0);
        assert_eq!(kept[1].class_id, 1);
    }

    #[test]
    fn iou_equal_to_threshold_is_kept() {
        let nms = NonMaxSuppressor::new(0.6).unwrap();
        let kept = nms.suppress(vec![
            candidate(0, 0, 0.9, [0.0, 0.0, 10.0, 10.0]),
            candidate(1, 0, 0.8, [0.0, 0.0, 10.0, 6.0]),
        ]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn ties_are_broken_by_decode_index() {
        let nms = NonMaxSuppressor::new(0.45).unwrap();
        let kept = nms.suppress(scattered());
        let order: Vec<usize> = kept.iter().map(|c| c.index).collect();
        assert_eq!(order, vec![1, 3, 2, 6]);
    }

    #[test]
    fn suppression_is_deterministic() {
        let nms = NonMaxSuppressor::new(0.45).unwrap();
        let expected = nms.suppress(scattered());
        for _ in 0..10 {
            let mut shuffled = scattered();
            shuffled.reverse();
            assert_eq!(nms.suppress(shuffled), expected);
            assert_eq!(nms.suppress(scattered()), expected);
        }
    }

    #[test]
    fn suppression_is_idempotent() {
        let nms = NonMaxSuppressor::new(0.45).unwrap();
        let once = nms.suppress(scattered());
        let twice = nms.suppress(once.clone());
        assert_eq!(once, twice);

        for (i, a) in once.iter().enumerate() {
            for b in &once[i + 1..] {
                if a.class_id == b.class_id {
                    assert!(a.bbox.iou(&b.bbox) <= 0.45);
                }
            }
        }
    }

    #[test]
    fn low_confidence_object_survives_behind_many_duplicates() {
        let nms = NonMaxSuppressor::new(0.45).unwrap();
        let mut candidates: Vec<DetectionCandidate> = (0..DEFAULT_MAX_DETECTIONS + 20)
            .map(|i| {
                let shift = (i % 3) as f32 * 0.1;
                candidate(i, 2, 0.9 - i as f32 * 0.0001, [shift, shift, 20.0 + shift, 20.0 + shift])
            })
            .collect();
        candidates.push(candidate(
            DEFAULT_MAX_DETECTIONS + 20,
            0,
            0.5,
            [100.0, 100.0, 120.0, 120.0],
        ));

        let kept = nms.suppress(candidates);
        let classes: Vec<u32> = kept.iter().map(|c| c.class_id).collect();
        assert_eq!(classes, vec![2, 0]);
        assert_eq!(kept[1].confidence, 0.5);
    }

    #[test]
    fn detection_cap_keeps_the_best_ranked() {
        let nms = NonMaxSuppressor::new(0.45).unwrap().with_max_detections(2);
        let kept = nms.suppress(scattered());
        let order: Vec<usize> = kept.iter().map(|c| c.index).collect();
        assert_eq!(order, vec![1, 3]);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        assert!(NonMaxSuppressor::new(-0.1).is_err());
        assert!(NonMaxSuppressor::new(1.5).is_err());
        assert!(NonMaxSuppressor::new(f32::NAN).is_err());
        assert!(NonMaxSuppressor::new(0.0).is_ok());
        assert!(NonMaxSuppressor::new(1.0).is_ok());
    }
}

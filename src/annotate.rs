//! Box overlays and the per-frame text summary.

use std::fmt::Write as _;
use std::path::Path;

use ab_glyph::{FontArc, FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::advisory::ClassCounts;
use crate::detect::DetectionResult;
use crate::error::{ConfigurationError, EncodingError};
use crate::frame::Frame;

/// Box colours indexed by class id.
pub const PALETTE: [Rgb<u8>; 8] = [
    Rgb([230, 25, 75]),
    Rgb([60, 180, 75]),
    Rgb([0, 130, 200]),
    Rgb([245, 130, 48]),
    Rgb([145, 30, 180]),
    Rgb([70, 240, 240]),
    Rgb([240, 50, 230]),
    Rgb([210, 245, 60]),
];

/// Colour for class ids outside the palette.
pub const FALLBACK_COLOR: Rgb<u8> = Rgb([128, 128, 128]);

pub const DEFAULT_TOP_N: usize = 5;

const LINE_THICKNESS: u32 = 2;
const LABEL_HEIGHT: u32 = 16;
/// Plate width per character when no font is loaded.
const GLYPH_WIDTH: u32 = 8;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

static EMBEDDED_FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");

pub fn class_color(class_id: u32) -> Rgb<u8> {
    PALETTE
        .get(class_id as usize)
        .copied()
        .unwrap_or(FALLBACK_COLOR)
}

/// Loads a TrueType/OpenType font for label text.
pub fn load_font(path: &Path) -> Result<FontVec, ConfigurationError> {
    let bytes = std::fs::read(path).map_err(|source| ConfigurationError::Read {
        path: path.display().to_string(),
        source,
    })?;
    FontVec::try_from_vec(bytes).map_err(|_| ConfigurationError::Font {
        path: path.display().to_string(),
    })
}

pub struct Annotator {
    top_n: usize,
    font: Option<FontArc>,
    font_scale: PxScale,
}

impl Annotator {
    /// Labels are drawn with the embedded DejaVu Sans Mono.
    pub fn new(top_n: usize) -> Self {
        let font = match FontArc::try_from_slice(EMBEDDED_FONT) {
            Ok(font) => Some(font),
            Err(err) => {
                log::warn!("embedded label font unusable, drawing plates only: {}", err);
                None
            }
        };
        Self {
            top_n,
            font,
            font_scale: PxScale::from(14.0),
        }
    }

    /// Replaces the embedded label font.
    pub fn with_font(mut self, font: FontVec) -> Self {
        self.font = Some(FontArc::new(font));
        self
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Returns an RGB copy of `frame` with one box and label per result.
    pub fn annotate(
        &self,
        frame: &Frame,
        results: &[DetectionResult],
    ) -> Result<Frame, EncodingError> {
        let mut img = frame.to_rgb_image()?;
        for result in results {
            self.draw_result(&mut img, result);
        }
        Ok(Frame::from_rgb_image(img))
    }

    fn draw_result(&self, img: &mut RgbImage, result: &DetectionResult) {
        let (img_w, img_h) = img.dimensions();
        let color = class_color(result.class_id);

        let [x1, y1, x2, y2] = result.bbox.rounded();
        let x = x1.clamp(0, img_w as i64) as u32;
        let y = y1.clamp(0, img_h as i64) as u32;
        let w = (x2.clamp(0, img_w as i64) as u32).saturating_sub(x);
        let h = (y2.clamp(0, img_h as i64) as u32).saturating_sub(y);
        if w == 0 || h == 0 {
            return;
        }

        for t in 0..LINE_THICKNESS {
            let inner_w = w.saturating_sub(2 * t);
            let inner_h = h.saturating_sub(2 * t);
            if inner_w > 0 && inner_h > 0 {
                let rect = Rect::at((x + t) as i32, (y + t) as i32).of_size(inner_w, inner_h);
                draw_hollow_rect_mut(img, rect, color);
            }
        }

        let label = format!("{} {:.0}%", result.class_name, result.confidence * 100.0);
        let text_w = match &self.font {
            Some(font) => text_size(self.font_scale, font, &label).0 + 4,
            None => label.chars().count() as u32 * GLYPH_WIDTH,
        };
        // Above the box, or just inside it when the box touches the top edge.
        let label_y = if y >= LABEL_HEIGHT { y - LABEL_HEIGHT } else { y };
        let plate_w = text_w.min(img_w - x);
        let plate_h = LABEL_HEIGHT.min(img_h - label_y);
        if plate_w == 0 || plate_h == 0 {
            return;
        }
        draw_filled_rect_mut(
            img,
            Rect::at(x as i32, label_y as i32).of_size(plate_w, plate_h),
            color,
        );

        if let Some(font) = &self.font {
            draw_text_mut(
                img,
                TEXT_COLOR,
                x as i32 + 2,
                label_y as i32 + 1,
                self.font_scale,
                font,
                &label,
            );
        }
    }

    /// Deterministic text summary: total, per-class counts in first-seen
    /// order, then the most confident detections.
    pub fn summarize(&self, results: &[DetectionResult]) -> String {
        let mut out = format!("Detections: {}", results.len());
        if results.is_empty() {
            return out;
        }

        for (name, count) in ClassCounts::from_results(results).iter() {
            let _ = write!(out, "\n  {}: {}", name, count);
        }

        let mut ranked: Vec<&DetectionResult> = results.iter().collect();
        // Stable sort keeps input order among equal confidences.
        ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        ranked.truncate(self.top_n);
        if ranked.is_empty() {
            return out;
        }

        let _ = write!(out, "\nTop {}:", ranked.len());
        for (rank, result) in ranked.iter().enumerate() {
            let [x1, y1, x2, y2] = result.bbox.rounded();
            let _ = write!(
                out,
                "\n  {}. {} {:.1}% [{}, {}, {}, {}]",
                rank + 1,
                result.class_name,
                result.confidence * 100.0,
                x1,
                y1,
                x2,
                y2
            );
        }
        out
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_N)
    }
}

//! Drawing match outcomes onto images

use ab_glyph::{FontVec, PxScale};
use image::{ImageResult, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::fs;
use std::io;
use std::path::Path;

use crate::geometry::BBox;
use crate::matcher::MatchResult;
use crate::types::Annotation;

pub const GT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
pub const MATCHED_PRED_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const UNMATCHED_PRED_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
pub const MISSED_GT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const OVERLAY_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const OVERLAY_SCALE: f32 = 12.0;
const OVERLAY_ORIGIN: (i32, i32) = (5, 5);
const OVERLAY_LINE_HEIGHT: i32 = 15;

fn to_rect(bbox: &BBox) -> Rect {
    // imageproc rejects empty rectangles
    let width = (bbox.width as i64).max(1) as u32;
    let height = (bbox.height as i64).max(1) as u32;
    Rect::at(bbox.x as i32, bbox.y as i32).of_size(width, height)
}

/// Draw ground truth and predictions colour-coded by match outcome.
///
/// Missed ground truth is drawn last so prediction outlines never cover it.
pub fn draw_matches(
    image: &mut RgbImage,
    ground_truths: &[Annotation],
    predictions: &[Annotation],
    result: &MatchResult,
) {
    for gt in ground_truths {
        draw_hollow_rect_mut(image, to_rect(&gt.bbox), GT_COLOR);
    }

    for (pred_idx, pred) in predictions.iter().enumerate() {
        let color = if result.is_pred_matched(pred_idx) {
            MATCHED_PRED_COLOR
        } else {
            UNMATCHED_PRED_COLOR
        };
        draw_hollow_rect_mut(image, to_rect(&pred.bbox), color);
    }

    for gt_idx in result.unmatched_gt() {
        draw_hollow_rect_mut(image, to_rect(&ground_truths[gt_idx].bbox), MISSED_GT_COLOR);
    }
}

/// Load a TrueType/OpenType font for the per-image text overlay
pub fn load_overlay_font(path: &Path) -> io::Result<FontVec> {
    let data = fs::read(path)?;
    FontVec::try_from_vec(data).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("invalid font {}: {}", path.display(), e),
        )
    })
}

/// Per-image text: file name, ground-truth count and missed count
pub fn overlay_lines(file_name: &str, result: &MatchResult) -> Vec<String> {
    vec![
        format!("Image: {}", file_name),
        format!("Total GT Boxes: {}", result.gt_count()),
        format!("Missed Boxes: {}", result.missed_count()),
    ]
}

/// Draw `lines` top to bottom from the top-left corner
pub fn draw_overlay(image: &mut RgbImage, font: &FontVec, lines: &[String]) {
    let (x, mut y) = OVERLAY_ORIGIN;
    for line in lines {
        draw_text_mut(
            image,
            OVERLAY_COLOR,
            x,
            y,
            PxScale::from(OVERLAY_SCALE),
            font,
            line,
        );
        y += OVERLAY_LINE_HEIGHT;
    }
}

/// Load `image_path`, draw the match outcome and save it to `output_path`.
/// With a font, the per-image counts are written in the corner.
pub fn render_image(
    image_path: &Path,
    output_path: &Path,
    ground_truths: &[Annotation],
    predictions: &[Annotation],
    result: &MatchResult,
    font: Option<&FontVec>,
) -> ImageResult<()> {
    let mut image = image::open(image_path)?.to_rgb8();
    draw_matches(&mut image, ground_truths, predictions, result);
    if let Some(font) = font {
        let file_name = image_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        draw_overlay(&mut image, font, &overlay_lines(&file_name, result));
    }
    image.save(output_path)
}

//! COCO-style bounding-box average precision.
//!
//! Detections are matched to ground truth of the same category in score
//! order, independently for each IoU threshold in `0.50:0.05:0.95`.
//! Precision is interpolated at 101 recall points and averaged over
//! categories that have ground truth.

use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::geometry::iou;
use crate::types::{Annotation, CategoryMap};

pub const NUM_THRESHOLDS: usize = 10;

pub const IOU_THRESHOLDS: [f64; NUM_THRESHOLDS] = [
    0.50, 0.55, 0.60, 0.65, 0.70, 0.75, 0.80, 0.85, 0.90, 0.95,
];

/// Number of evenly spaced recall points, `0.00..=1.00`
pub const RECALL_POINTS: usize = 101;

/// Highest-scoring detections kept per image and category
pub const MAX_DETECTIONS: usize = 100;

const AP50_INDEX: usize = 0;
const AP75_INDEX: usize = 5;

/// A detection after matching: its score and whether it was a true positive
/// at each IoU threshold
#[derive(Debug, Clone, Copy)]
struct ScoredDetection {
    score: f64,
    matched: [bool; NUM_THRESHOLDS],
}

#[derive(Debug, Clone, Default)]
struct CategoryTally {
    num_gt: usize,
    detections: Vec<ScoredDetection>,
}

fn by_score_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Match one image's detections of one category against its ground truth
fn match_category(ground_truths: &[&Annotation], predictions: &[&Annotation]) -> CategoryTally {
    let mut order: Vec<usize> = (0..predictions.len()).collect();
    order.sort_by(|&a, &b| by_score_desc(score_of(predictions[a]), score_of(predictions[b])));
    order.truncate(MAX_DETECTIONS);

    let ious: Vec<Vec<f64>> = order
        .iter()
        .map(|&pred_idx| {
            ground_truths
                .iter()
                .map(|gt| iou(&gt.bbox, &predictions[pred_idx].bbox))
                .collect()
        })
        .collect();

    let mut detections: Vec<ScoredDetection> = order
        .iter()
        .map(|&pred_idx| ScoredDetection {
            score: score_of(predictions[pred_idx]),
            matched: [false; NUM_THRESHOLDS],
        })
        .collect();

    for (t_idx, &threshold) in IOU_THRESHOLDS.iter().enumerate() {
        let mut gt_taken = vec![false; ground_truths.len()];
        for (det_idx, row) in ious.iter().enumerate() {
            let mut best_iou = threshold;
            let mut best_gt = None;
            for (gt_idx, &value) in row.iter().enumerate() {
                if gt_taken[gt_idx] || value < best_iou {
                    continue;
                }
                best_iou = value;
                best_gt = Some(gt_idx);
            }
            if let Some(gt_idx) = best_gt {
                gt_taken[gt_idx] = true;
                detections[det_idx].matched[t_idx] = true;
            }
        }
    }

    CategoryTally {
        num_gt: ground_truths.len(),
        detections,
    }
}

fn score_of(annotation: &Annotation) -> f64 {
    annotation.score.unwrap_or(1.0)
}

/// Per-category tallies for one image, restricted to `categories`
fn evaluate_image(
    ground_truths: &[Annotation],
    predictions: &[Annotation],
    categories: &CategoryMap,
) -> BTreeMap<u32, CategoryTally> {
    let mut tallies = BTreeMap::new();
    for (category_id, _) in categories.iter() {
        let gts: Vec<&Annotation> = ground_truths
            .iter()
            .filter(|gt| gt.category_id == category_id)
            .collect();
        let preds: Vec<&Annotation> = predictions
            .iter()
            .filter(|pred| pred.category_id == category_id)
            .collect();
        if gts.is_empty() && preds.is_empty() {
            continue;
        }
        tallies.insert(category_id, match_category(&gts, &preds));
    }
    tallies
}

/// Interpolated precision averaged over the recall points.
///
/// `detections` must already be sorted by descending score.
fn average_precision(detections: &[ScoredDetection], t_idx: usize, num_gt: usize) -> f64 {
    let mut recall = Vec::with_capacity(detections.len());
    let mut precision = Vec::with_capacity(detections.len());
    let (mut tp, mut fp) = (0usize, 0usize);
    for detection in detections {
        if detection.matched[t_idx] {
            tp += 1;
        } else {
            fp += 1;
        }
        recall.push(tp as f64 / num_gt as f64);
        precision.push(tp as f64 / (tp + fp) as f64);
    }

    // precision envelope, non-increasing in recall
    for d in (1..precision.len()).rev() {
        precision[d - 1] = precision[d - 1].max(precision[d]);
    }

    let mut total = 0.0;
    let mut cursor = 0;
    for r_idx in 0..RECALL_POINTS {
        let recall_point = r_idx as f64 / (RECALL_POINTS - 1) as f64;
        while cursor < recall.len() && recall[cursor] < recall_point {
            cursor += 1;
        }
        if cursor < recall.len() {
            total += precision[cursor];
        }
    }
    total / RECALL_POINTS as f64
}

/// AP of one category at every IoU threshold
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryAp {
    pub category_id: u32,
    pub name: String,
    /// One value per entry of [`IOU_THRESHOLDS`]
    pub ap: Vec<f64>,
}

impl CategoryAp {
    /// Mean over all IoU thresholds
    pub fn mean(&self) -> f64 {
        self.ap.iter().sum::<f64>() / self.ap.len() as f64
    }
}

/// Dataset-wide average precision. Every value is `None` when no category
/// has ground truth.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ApMetrics {
    /// AP averaged over IoU 0.50:0.95 and categories
    pub map: Option<f64>,
    pub ap50: Option<f64>,
    pub ap75: Option<f64>,
    /// Categories with ground truth, in category map order
    pub per_category: Vec<CategoryAp>,
}

impl ApMetrics {
    fn from_categories(per_category: Vec<CategoryAp>) -> Self {
        if per_category.is_empty() {
            return Self::default();
        }
        let n = per_category.len() as f64;
        let at = |t_idx: usize| per_category.iter().map(|c| c.ap[t_idx]).sum::<f64>() / n;
        Self {
            map: Some(per_category.iter().map(CategoryAp::mean).sum::<f64>() / n),
            ap50: Some(at(AP50_INDEX)),
            ap75: Some(at(AP75_INDEX)),
            per_category,
        }
    }
}

/// Compute COCO bbox AP over `images`, each given as its ground truth and
/// predictions. Images are matched in parallel; results merge in slice order.
pub fn evaluate_ap(
    images: &[(&[Annotation], &[Annotation])],
    categories: &CategoryMap,
) -> ApMetrics {
    let per_image: Vec<BTreeMap<u32, CategoryTally>> = images
        .par_iter()
        .map(|&(ground_truths, predictions)| {
            evaluate_image(ground_truths, predictions, categories)
        })
        .collect();

    let mut merged: BTreeMap<u32, CategoryTally> = BTreeMap::new();
    for tallies in per_image {
        for (category_id, tally) in tallies {
            let entry = merged.entry(category_id).or_default();
            entry.num_gt += tally.num_gt;
            entry.detections.extend(tally.detections);
        }
    }

    let per_category = categories
        .iter()
        .filter_map(|(category_id, name)| {
            let mut tally = merged.remove(&category_id)?;
            if tally.num_gt == 0 {
                return None;
            }
            // stable, so equal scores keep image order
            tally
                .detections
                .sort_by(|a, b| by_score_desc(a.score, b.score));
            let ap = (0..NUM_THRESHOLDS)
                .map(|t_idx| average_precision(&tally.detections, t_idx, tally.num_gt))
                .collect();
            Some(CategoryAp {
                category_id,
                name: name.to_string(),
                ap,
            })
        })
        .collect();

    ApMetrics::from_categories(per_category)
}

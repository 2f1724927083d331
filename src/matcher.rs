//! Greedy one-to-one matching of predictions to ground truth within one image

use clap::ValueEnum;
use std::collections::BTreeSet;

use crate::types::Annotation;

/// Whether a prediction must share the ground truth's category to be a candidate
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum MatchPolicy {
    /// Match on geometry alone, categories are only looked at during aggregation
    #[default]
    CategoryAgnostic,
    /// Only predictions with the same category id are candidates
    SameCategory,
}

/// Outcome of matching one image
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchResult {
    matched_gt: BTreeSet<usize>,
    matched_pred: BTreeSet<usize>,
    gt_count: usize,
    pred_count: usize,
}

impl MatchResult {
    pub fn matched_gt(&self) -> &BTreeSet<usize> {
        &self.matched_gt
    }

    pub fn matched_pred(&self) -> &BTreeSet<usize> {
        &self.matched_pred
    }

    pub fn is_gt_matched(&self, gt_idx: usize) -> bool {
        self.matched_gt.contains(&gt_idx)
    }

    pub fn is_pred_matched(&self, pred_idx: usize) -> bool {
        self.matched_pred.contains(&pred_idx)
    }

    pub fn match_count(&self) -> usize {
        self.matched_gt.len()
    }

    pub fn gt_count(&self) -> usize {
        self.gt_count
    }

    pub fn pred_count(&self) -> usize {
        self.pred_count
    }

    pub fn missed_count(&self) -> usize {
        self.gt_count - self.matched_gt.len()
    }

    pub fn unmatched_gt(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.gt_count).filter(|idx| !self.matched_gt.contains(idx))
    }

    pub fn unmatched_pred(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.pred_count).filter(|idx| !self.matched_pred.contains(idx))
    }
}

/// Category-agnostic greedy matching.
///
/// Ground truths are visited in the given order and each takes the unmatched
/// prediction with the highest IoU, provided it reaches `iou_threshold`. On a
/// tie the earlier prediction wins.
pub fn match_boxes(
    ground_truths: &[Annotation],
    predictions: &[Annotation],
    iou_threshold: f64,
) -> MatchResult {
    match_with_policy(
        ground_truths,
        predictions,
        iou_threshold,
        MatchPolicy::CategoryAgnostic,
    )
}

pub fn match_with_policy(
    ground_truths: &[Annotation],
    predictions: &[Annotation],
    iou_threshold: f64,
    policy: MatchPolicy,
) -> MatchResult {
    let mut result = MatchResult {
        gt_count: ground_truths.len(),
        pred_count: predictions.len(),
        ..MatchResult::default()
    };

    for (gt_idx, gt) in ground_truths.iter().enumerate() {
        let mut best_iou = 0.0;
        let mut best_pred_idx = None;

        for (pred_idx, pred) in predictions.iter().enumerate() {
            if result.matched_pred.contains(&pred_idx) {
                continue;
            }
            if policy == MatchPolicy::SameCategory && pred.category_id != gt.category_id {
                continue;
            }

            let iou = gt.bbox.iou(&pred.bbox);
            if iou > best_iou {
                best_iou = iou;
                best_pred_idx = Some(pred_idx);
            }
        }

        if let Some(pred_idx) = best_pred_idx {
            if best_iou >= iou_threshold {
                result.matched_gt.insert(gt_idx);
                result.matched_pred.insert(pred_idx);
            }
        }
    }

    result
}

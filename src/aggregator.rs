//! Folding per-image match results into dataset-wide detection statistics

use clap::ValueEnum;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::matcher::MatchResult;
use crate::types::{Annotation, CategoryMap};

/// Coarse object size classes used for stratified reporting
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeBucket {
    Small,
    Medium,
    Large,
}

impl SizeBucket {
    /// Reporting order
    pub const ALL: [SizeBucket; 3] = [SizeBucket::Small, SizeBucket::Medium, SizeBucket::Large];

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeBucket::Small => "small",
            SizeBucket::Medium => "medium",
            SizeBucket::Large => "large",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SizeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a ground-truth box is assigned to a size bucket.
///
/// `Area` takes thresholds in square pixels, `Side` takes them as side
/// lengths of an equivalent square. The two defaults describe the same
/// boundaries (32² = 1024, 96² = 9216).
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SizePolicy {
    Area { small_below: f64, medium_below: f64 },
    Side { small_side: f64, medium_side: f64 },
}

impl SizePolicy {
    /// `area < 1024` is small, `area < 9216` is medium
    pub const fn area_default() -> Self {
        SizePolicy::Area {
            small_below: 1024.0,
            medium_below: 9216.0,
        }
    }

    /// `area < 32²` is small, `area < 96²` is medium
    pub const fn side_default() -> Self {
        SizePolicy::Side {
            small_side: 32.0,
            medium_side: 96.0,
        }
    }

    /// Bucket for a `width` x `height` box; negative extents count as zero
    pub fn classify(&self, width: f64, height: f64) -> SizeBucket {
        self.classify_area(width.max(0.0) * height.max(0.0))
    }

    pub fn classify_area(&self, area: f64) -> SizeBucket {
        let (small, medium) = match *self {
            SizePolicy::Area {
                small_below,
                medium_below,
            } => (small_below, medium_below),
            SizePolicy::Side {
                small_side,
                medium_side,
            } => (small_side * small_side, medium_side * medium_side),
        };

        if area < small {
            SizeBucket::Small
        } else if area < medium {
            SizeBucket::Medium
        } else {
            SizeBucket::Large
        }
    }
}

impl Default for SizePolicy {
    fn default() -> Self {
        Self::area_default()
    }
}

/// Whether ground truth with an unmapped category counts toward the overall tally
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum UnknownCategoryPolicy {
    /// Count in overall total and missed, leave out of class and size rows
    #[default]
    CountInTotals,
    /// Leave out of every tally
    Exclude,
}

/// A `(total, matched)` pair
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub total: usize,
    pub matched: usize,
}

impl Counts {
    pub fn missed(&self) -> usize {
        self.total - self.matched
    }

    /// Detection rate in percent, 0 when there is nothing to detect
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.matched as f64 / self.total as f64 * 100.0
        }
    }

    fn record(&mut self, matched: bool) {
        self.total += 1;
        if matched {
            self.matched += 1;
        }
    }

    fn add(&mut self, other: &Counts) {
        self.total += other.total;
        self.matched += other.matched;
    }
}

/// Dataset-wide detection statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionStats {
    pub overall: Counts,
    pub per_category: BTreeMap<u32, Counts>,
    pub per_bucket: [Counts; 3],
    /// Ground-truth boxes whose category is not in the category map
    pub unknown_category: usize,
}

impl DetectionStats {
    pub fn total_gt(&self) -> usize {
        self.overall.total
    }

    pub fn total_matched(&self) -> usize {
        self.overall.matched
    }

    pub fn total_missed(&self) -> usize {
        self.overall.missed()
    }

    /// Missed ground truth in percent, `None` when there is no ground truth
    pub fn miss_ratio(&self) -> Option<f64> {
        if self.overall.total == 0 {
            None
        } else {
            Some(self.overall.missed() as f64 / self.overall.total as f64 * 100.0)
        }
    }

    pub fn category(&self, category_id: u32) -> Counts {
        self.per_category
            .get(&category_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn bucket(&self, bucket: SizeBucket) -> Counts {
        self.per_bucket[bucket.index()]
    }

    /// Combine statistics from disjoint sets of images
    pub fn merge(&mut self, other: &DetectionStats) {
        self.overall.add(&other.overall);
        for (category_id, counts) in &other.per_category {
            self.per_category
                .entry(*category_id)
                .or_default()
                .add(counts);
        }
        for (mine, theirs) in self.per_bucket.iter_mut().zip(other.per_bucket.iter()) {
            mine.add(theirs);
        }
        self.unknown_category += other.unknown_category;
    }
}

/// Running totals for one evaluation run
#[derive(Debug, Clone)]
pub struct Aggregator {
    categories: CategoryMap,
    size_policy: SizePolicy,
    unknown_policy: UnknownCategoryPolicy,
    stats: DetectionStats,
}

impl Aggregator {
    pub fn new(
        categories: CategoryMap,
        size_policy: SizePolicy,
        unknown_policy: UnknownCategoryPolicy,
    ) -> Self {
        Self {
            categories,
            size_policy,
            unknown_policy,
            stats: DetectionStats::default(),
        }
    }

    /// Fold one image. `ground_truths` must be the list `result` was computed from.
    pub fn fold(&mut self, result: &MatchResult, ground_truths: &[Annotation]) {
        for (gt_idx, gt) in ground_truths.iter().enumerate() {
            let matched = result.is_gt_matched(gt_idx);

            if !self.categories.contains(gt.category_id) {
                self.stats.unknown_category += 1;
                if self.unknown_policy == UnknownCategoryPolicy::CountInTotals {
                    self.stats.overall.record(matched);
                }
                continue;
            }

            self.stats.overall.record(matched);
            self.stats
                .per_category
                .entry(gt.category_id)
                .or_default()
                .record(matched);

            let bucket = self.size_policy.classify_area(gt.bbox.area());
            self.stats.per_bucket[bucket.index()].record(matched);
        }
    }

    pub fn categories(&self) -> &CategoryMap {
        &self.categories
    }

    pub fn stats(&self) -> &DetectionStats {
        &self.stats
    }

    pub fn finish(self) -> DetectionStats {
        self.stats
    }
}

//! PCB component detection evaluation
//!
//! This library matches detector output against ground-truth boxes with a
//! greedy IoU assignment and reports detection rates overall, per class and
//! per object size, along with COCO-style average precision.

pub mod aggregator;
pub mod ap;
pub mod coco;
pub mod config;
pub mod dataset;
pub mod evaluation;
pub mod geometry;
pub mod io;
pub mod matcher;
pub mod render;
pub mod report;
pub mod types;
pub mod utils;

// Re-export commonly used types and functions
pub use aggregator::{
    Aggregator, Counts, DetectionStats, SizeBucket, SizePolicy, UnknownCategoryPolicy,
};
pub use ap::{evaluate_ap, ApMetrics};
pub use config::{Args, EvalConfig};
pub use dataset::EvalDataset;
pub use evaluation::{evaluate_dataset, run, DatasetEvaluation};
pub use geometry::{iou, BBox};
pub use matcher::{match_boxes, match_with_policy, MatchPolicy, MatchResult};
pub use report::Summary;
pub use types::{Annotation, CategoryMap, ImageInfo, ProcessingStats};

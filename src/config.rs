use clap::{ArgGroup, Parser, ValueEnum};
use std::path::PathBuf;
use std::str::FromStr;

use crate::aggregator::{SizePolicy, UnknownCategoryPolicy};
use crate::matcher::MatchPolicy;
use crate::types::CategoryMap;

/// Command-line arguments for evaluating detections against ground truth.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
#[command(group(
    ArgGroup::new("ground_truth")
        .required(true)
        .args(["gt_json", "yolo_dir"])
))]
pub struct Args {
    /// COCO ground-truth JSON file
    #[arg(long = "gt_json")]
    pub gt_json: Option<PathBuf>,

    /// YOLO dataset directory with images/ and labels/ used as ground truth
    #[arg(long = "yolo_dir")]
    pub yolo_dir: Option<PathBuf>,

    /// COCO results JSON file with the detector's predictions
    #[arg(short = 'p', long = "pred_json")]
    pub pred_json: PathBuf,

    /// Directory holding the images; images missing from it are skipped
    #[arg(long = "images_dir")]
    pub images_dir: Option<PathBuf>,

    /// Write annotated images to this directory
    #[arg(short = 'o', long = "output_dir")]
    pub output_dir: Option<PathBuf>,

    /// TrueType/OpenType font for the per-image text on rendered images
    #[arg(long = "overlay_font")]
    pub overlay_font: Option<PathBuf>,

    /// Minimum IoU for a prediction to count as a detection
    #[arg(long = "iou_threshold", default_value_t = 0.5, value_parser = validate_threshold)]
    pub iou_threshold: f64,

    /// How ground-truth boxes are split into small/medium/large.
    /// With the built-in thresholds both policies give the same buckets
    /// (32² = 1024 and 96² = 9216 px²)
    #[arg(long = "size_policy", value_enum, default_value = "area")]
    pub size_policy: SizePolicyKind,

    /// Whether matching requires equal category ids
    #[arg(long = "match_policy", value_enum, default_value = "category-agnostic")]
    pub match_policy: MatchPolicy,

    /// Whether ground truth outside the class list counts in the overall tally
    #[arg(long = "unknown_category", value_enum, default_value = "count-in-totals")]
    pub unknown_category: UnknownCategoryPolicy,

    /// Prediction boxes are normalized [cx, cy, w, h] instead of pixel [x, y, w, h]
    #[arg(long = "normalized_predictions")]
    pub normalized_predictions: bool,

    /// Also write the summary as JSON to this file
    #[arg(long = "summary_json")]
    pub summary_json: Option<PathBuf>,

    /// Number of worker threads (0 = one per CPU)
    #[arg(long = "workers", default_value_t = 0)]
    pub workers: usize,

    /// Ordered class names; ids are assigned from 0
    #[arg(use_value_delimiter = true)]
    pub label_list: Vec<String>,
}

// Size bucket strategy selectable from the command line
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
pub enum SizePolicyKind {
    /// Area thresholds of 1024 and 9216 px²
    Area,
    /// Side thresholds of 32 and 96 px, compared as squared area; same buckets as `area`
    Side,
}

impl From<SizePolicyKind> for SizePolicy {
    fn from(kind: SizePolicyKind) -> Self {
        match kind {
            SizePolicyKind::Area => SizePolicy::area_default(),
            SizePolicyKind::Side => SizePolicy::side_default(),
        }
    }
}

// Validate that the threshold is between 0.0 and 1.0
pub fn validate_threshold(s: &str) -> Result<f64, String> {
    match f64::from_str(s) {
        Ok(val) if (0.0..=1.0).contains(&val) => Ok(val),
        _ => Err("THRESHOLD must be between 0.0 and 1.0".to_string()),
    }
}

/// Settings for one evaluation run
#[derive(Debug, Clone)]
pub struct EvalConfig {
    pub iou_threshold: f64,
    pub match_policy: MatchPolicy,
    pub size_policy: SizePolicy,
    pub unknown_category: UnknownCategoryPolicy,
    pub categories: CategoryMap,
    /// When set, images whose file is absent here are skipped
    pub images_dir: Option<PathBuf>,
    /// When set, annotated images are written here
    pub output_dir: Option<PathBuf>,
    /// When set, rendered images carry per-image counts in this font
    pub overlay_font: Option<PathBuf>,
    pub workers: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.5,
            match_policy: MatchPolicy::default(),
            size_policy: SizePolicy::default(),
            unknown_category: UnknownCategoryPolicy::default(),
            categories: CategoryMap::pcb_default(),
            images_dir: None,
            output_dir: None,
            overlay_font: None,
            workers: 0,
        }
    }
}

impl Args {
    /// Class list precedence: `label_list`, then the ground-truth file, then the PCB classes
    pub fn category_map(&self, from_ground_truth: &CategoryMap) -> CategoryMap {
        if !self.label_list.is_empty() {
            CategoryMap::from_names(self.label_list.iter().cloned())
        } else if !from_ground_truth.is_empty() {
            from_ground_truth.clone()
        } else {
            CategoryMap::pcb_default()
        }
    }

    /// Images are looked up in `images_dir`, or `<yolo_dir>/images` for YOLO ground truth
    pub fn resolved_images_dir(&self) -> Option<PathBuf> {
        self.images_dir
            .clone()
            .or_else(|| self.yolo_dir.as_ref().map(|dir| dir.join("images")))
    }

    pub fn to_eval_config(&self, from_ground_truth: &CategoryMap) -> EvalConfig {
        EvalConfig {
            iou_threshold: self.iou_threshold,
            match_policy: self.match_policy,
            size_policy: self.size_policy.into(),
            unknown_category: self.unknown_category,
            categories: self.category_map(from_ground_truth),
            images_dir: self.resolved_images_dir(),
            output_dir: self.output_dir.clone(),
            overlay_font: self.overlay_font.clone(),
            workers: self.workers,
        }
    }
}

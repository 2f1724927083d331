//! Human-readable and JSON summaries of an evaluation run

use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::aggregator::{Counts, DetectionStats, SizeBucket};
use crate::ap::ApMetrics;
use crate::types::CategoryMap;

/// One line of the per-size or per-class breakdown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RateRow {
    pub name: String,
    pub total: usize,
    pub matched: usize,
    pub missed: usize,
    /// Detection rate in percent
    pub rate: f64,
}

impl RateRow {
    fn new(name: impl Into<String>, counts: Counts) -> Self {
        Self {
            name: name.into(),
            total: counts.total,
            matched: counts.matched,
            missed: counts.missed(),
            rate: counts.rate(),
        }
    }
}

/// Final report for a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_gt: usize,
    pub total_missed: usize,
    /// `None` when the dataset had no ground truth
    pub miss_ratio: Option<f64>,
    pub sizes: Vec<RateRow>,
    pub classes: Vec<RateRow>,
    pub unknown_category_boxes: usize,
    /// COCO bbox average precision, same-category and score ordered
    pub ap: ApMetrics,
}

impl Summary {
    /// Sizes are listed small, medium, large; classes in category map order
    pub fn new(stats: &DetectionStats, categories: &CategoryMap) -> Self {
        let sizes = SizeBucket::ALL
            .iter()
            .map(|bucket| RateRow::new(bucket.as_str(), stats.bucket(*bucket)))
            .collect();

        let classes = categories
            .iter()
            .map(|(id, name)| RateRow::new(name, stats.category(id)))
            .collect();

        Self {
            total_gt: stats.total_gt(),
            total_missed: stats.total_missed(),
            miss_ratio: stats.miss_ratio(),
            sizes,
            classes,
            unknown_category_boxes: stats.unknown_category,
            ap: ApMetrics::default(),
        }
    }

    pub fn with_ap(mut self, ap: ApMetrics) -> Self {
        self.ap = ap;
        self
    }

    pub fn miss_ratio_label(&self) -> String {
        match self.miss_ratio {
            Some(ratio) => format!("{:.2}%", ratio),
            None => "N/A".to_string(),
        }
    }

    /// Emit the report through the logger, one line per entry
    pub fn log_summary(&self) {
        for line in self.to_string().lines() {
            log::info!("{}", line);
        }
        if self.unknown_category_boxes > 0 {
            log::warn!(
                "{} ground-truth boxes had a category outside the class list",
                self.unknown_category_boxes
            );
        }
    }
}

fn ap_label(value: Option<f64>) -> String {
    match value {
        Some(value) => format!("{:.3}", value),
        None => "N/A".to_string(),
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "==== Evaluation Results ====")?;
        writeln!(f, "Total GT boxes: {}", self.total_gt)?;
        writeln!(f, "Missed boxes: {}", self.total_missed)?;
        writeln!(f, "Miss ratio: {}", self.miss_ratio_label())?;

        writeln!(f)?;
        writeln!(f, "==== Results by Size ====")?;
        for row in &self.sizes {
            writeln!(
                f,
                "{} - total: {}, detected: {}, rate: {:.2}%",
                capitalize(&row.name),
                row.total,
                row.matched,
                row.rate
            )?;
        }

        writeln!(f)?;
        writeln!(f, "==== Results by Class ====")?;
        for row in &self.classes {
            writeln!(
                f,
                "{} - total: {}, detected: {}, rate: {:.2}%",
                row.name, row.total, row.matched, row.rate
            )?;
        }

        writeln!(f)?;
        writeln!(f, "==== COCO Evaluation ====")?;
        writeln!(f, "mAP (IoU=0.50:0.95): {}", ap_label(self.ap.map))?;
        writeln!(f, "mAP (IoU=0.50): {}", ap_label(self.ap.ap50))?;
        writeln!(f, "mAP (IoU=0.75): {}", ap_label(self.ap.ap75))?;
        for category in &self.ap.per_category {
            writeln!(f, "{} - AP: {:.3}", category.name, category.mean())?;
        }
        Ok(())
    }
}

/// Write the summary as pretty-printed JSON
pub fn write_summary_json(summary: &Summary, path: &Path) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, summary)?;
    writer.write_all(b"\n")?;
    writer.flush()
}

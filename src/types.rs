use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::geometry::BBox;

// Supported image formats
pub const IMG_FORMATS: &[&str] = &[
    "bmp", "dng", "jpeg", "jpg", "mpo", "png", "tif", "tiff", "webp", "pfm",
];

// Precomputed HashSet of image extensions for fast lookup
pub static IMAGE_EXTENSIONS_SET: OnceLock<HashSet<String>> = OnceLock::new();

/// Get the image extensions set
pub fn get_image_extensions_set() -> &'static HashSet<String> {
    IMAGE_EXTENSIONS_SET.get_or_init(|| IMG_FORMATS.iter().map(|ext| ext.to_lowercase()).collect())
}

/// The eleven PCB component classes, in category id order starting at 0
pub const PCB_CLASSES: &[&str] = &[
    "Chip", "CSolder", "2sideIC", "SOD", "Circle", "4sideIC", "Tantalum", "BGA", "MELF",
    "Crystal", "Array",
];

/// A ground-truth or predicted box owned by one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub image_id: u64,
    pub category_id: u32,
    pub bbox: BBox,
    /// Detector confidence, only present on predictions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Annotation {
    pub fn ground_truth(image_id: u64, category_id: u32, bbox: BBox) -> Self {
        Self {
            image_id,
            category_id,
            bbox,
            score: None,
        }
    }

    pub fn prediction(image_id: u64, category_id: u32, bbox: BBox, score: f64) -> Self {
        Self {
            image_id,
            category_id,
            bbox,
            score: Some(score),
        }
    }
}

/// An image known to the evaluation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub id: u64,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

/// Category id to name mapping that remembers insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryMap {
    entries: Vec<(u32, String)>,
}

impl CategoryMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign ids `0..n` to the given names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        names
            .into_iter()
            .enumerate()
            .map(|(id, name)| (id as u32, name.into()))
            .collect()
    }

    pub fn pcb_default() -> Self {
        Self::from_names(PCB_CLASSES.iter().copied())
    }

    /// Insert or rename a category. A renamed id keeps its original position.
    pub fn insert(&mut self, id: u32, name: impl Into<String>) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = name,
            None => self.entries.push((id, name)),
        }
    }

    pub fn name(&self, id: u32) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, name)| name.as_str())
    }

    pub fn contains(&self, id: u32) -> bool {
        self.name(id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> {
        self.entries.iter().map(|(id, name)| (*id, name.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(u32, String)> for CategoryMap {
    fn from_iter<T: IntoIterator<Item = (u32, String)>>(iter: T) -> Self {
        let mut map = Self::new();
        for (id, name) in iter {
            map.insert(id, name);
        }
        map
    }
}

// Struct to hold processing statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessingStats {
    pub images_evaluated: usize,
    pub skipped_missing_image: usize,
    pub skipped_missing_labels: usize,
    pub skipped_unreadable_image: usize,
    pub malformed_records: usize,
    pub dropped_predictions: usize,
    pub render_failures: usize,
}

impl ProcessingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_skipped(&self) -> usize {
        self.skipped_missing_image + self.skipped_missing_labels + self.skipped_unreadable_image
    }

    pub fn print_summary(&self) {
        log::info!("=== Processing Summary ===");
        log::info!("Images evaluated: {}", self.images_evaluated);
        log::info!("Skipped (missing image file): {}", self.skipped_missing_image);
        log::info!("Skipped (missing label file): {}", self.skipped_missing_labels);
        log::info!(
            "Skipped (unreadable image): {}",
            self.skipped_unreadable_image
        );

        if self.total_skipped() > 0 {
            log::warn!("Total skipped images: {}", self.total_skipped());
        }
        if self.malformed_records > 0 {
            log::warn!("Malformed label records dropped: {}", self.malformed_records);
        }
        if self.dropped_predictions > 0 {
            log::warn!(
                "Predictions dropped (unresolved image reference): {}",
                self.dropped_predictions
            );
        }
        if self.render_failures > 0 {
            log::warn!("Images that failed to render: {}", self.render_failures);
        }
    }
}

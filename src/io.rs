use glob::{glob_with, MatchOptions};
use log::warn;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::coco::{CocoFile, Detection, ImageRef};
use crate::geometry::BBox;
use crate::types::{Annotation, ImageInfo, ProcessingStats, IMG_FORMATS};
use crate::utils::read_json;

/// Extensions tried for a prediction that names its image without one
const FALLBACK_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Load a COCO ground-truth file
pub fn load_coco_ground_truth(path: &Path) -> io::Result<CocoFile> {
    read_json(path)
}

/// Load a COCO results file: a JSON array of detections
pub fn load_predictions(path: &Path) -> io::Result<Vec<Detection>> {
    read_json(path)
}

fn strip_extension(name: &str) -> String {
    Path::new(name).with_extension("").to_string_lossy().into_owned()
}

/// Resolves the image references found in detection files to image ids
#[derive(Debug, Default)]
pub struct ImageResolver {
    by_name: HashMap<String, u64>,
    sizes: HashMap<u64, (u32, u32)>,
}

impl ImageResolver {
    pub fn new(images: &[ImageInfo]) -> Self {
        let mut by_name = HashMap::with_capacity(images.len() * 2);
        let mut sizes = HashMap::with_capacity(images.len());
        for image in images {
            let lower = image.file_name.to_lowercase();
            by_name.insert(strip_extension(&lower), image.id);
            by_name.insert(lower, image.id);
            sizes.insert(image.id, (image.width, image.height));
        }
        Self { by_name, sizes }
    }

    /// Ids must be known; names match case-insensitively on the full name or the stem
    pub fn resolve(&self, image_ref: &ImageRef) -> Option<u64> {
        match image_ref {
            ImageRef::Id(id) => self.sizes.contains_key(id).then_some(*id),
            ImageRef::FileName(name) => {
                let lower = name.to_lowercase();
                if let Some(id) = self.by_name.get(&lower) {
                    return Some(*id);
                }
                if Path::new(&lower).extension().is_some() {
                    return None;
                }
                FALLBACK_EXTENSIONS
                    .iter()
                    .find_map(|ext| self.by_name.get(&format!("{}.{}", lower, ext)))
                    .copied()
            }
        }
    }

    pub fn image_size(&self, image_id: u64) -> Option<(u32, u32)> {
        self.sizes.get(&image_id).copied()
    }
}

/// Turn raw detections into prediction annotations in absolute pixels.
///
/// Detections whose image cannot be resolved are dropped with a warning. When
/// `normalized` is set, `bbox` is read as `[cx, cy, w, h]` relative to the
/// image size.
pub fn resolve_predictions(
    detections: Vec<Detection>,
    images: &[ImageInfo],
    normalized: bool,
    stats: &mut ProcessingStats,
) -> Vec<Annotation> {
    let resolver = ImageResolver::new(images);
    let mut predictions = Vec::with_capacity(detections.len());

    for detection in detections {
        let Some(image_id) = resolver.resolve(&detection.image_id) else {
            warn!(
                "No ground-truth image matches prediction reference {:?}",
                detection.image_id
            );
            stats.dropped_predictions += 1;
            continue;
        };

        let bbox = if normalized {
            let (width, height) = resolver.image_size(image_id).unwrap_or_default();
            let [cx, cy, w, h] = detection.bbox;
            BBox::from_normalized_center(cx, cy, w, h, width, height)
        } else {
            BBox::from_xywh(detection.bbox)
        };

        predictions.push(Annotation::prediction(
            image_id,
            detection.category_id,
            bbox,
            detection.score.unwrap_or(1.0),
        ));
    }

    predictions
}

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn parse_class_id(field: &str) -> io::Result<u32> {
    if let Ok(id) = field.parse::<u32>() {
        return Ok(id);
    }
    match field.parse::<f64>() {
        Ok(value) if value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 => {
            Ok(value as u32)
        }
        _ => Err(invalid_data(format!("invalid class id: {:?}", field))),
    }
}

/// Parse one `class cx cy w h` label line into an annotation in absolute pixels
pub fn parse_yolo_line(line: &str, image: &ImageInfo) -> io::Result<Annotation> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 5 {
        return Err(invalid_data(format!(
            "expected 5 fields, found {}",
            parts.len()
        )));
    }

    let category_id = parse_class_id(parts[0])?;
    let mut values = [0.0f64; 4];
    for (value, field) in values.iter_mut().zip(&parts[1..5]) {
        *value = field
            .parse::<f64>()
            .map_err(|e| invalid_data(format!("invalid coordinate {:?}: {}", field, e)))?;
        // `f64::from_str` accepts "nan" and "inf"
        if !value.is_finite() {
            return Err(invalid_data(format!("non-finite coordinate {:?}", field)));
        }
    }

    let [cx, cy, w, h] = values;
    Ok(Annotation::ground_truth(
        image.id,
        category_id,
        BBox::from_normalized_center(cx, cy, w, h, image.width, image.height),
    ))
}

/// Read a YOLO label file. Malformed lines are logged and dropped.
pub fn load_yolo_labels(
    label_path: &Path,
    image: &ImageInfo,
    stats: &mut ProcessingStats,
) -> io::Result<Vec<Annotation>> {
    let content = fs::read_to_string(label_path)?;
    let mut annotations = Vec::new();

    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_yolo_line(line, image) {
            Ok(annotation) => annotations.push(annotation),
            Err(e) => {
                warn!(
                    "Dropping malformed record at {}:{}: {}",
                    label_path.display(),
                    line_no + 1,
                    e
                );
                stats.malformed_records += 1;
            }
        }
    }

    Ok(annotations)
}

/// Find image files directly inside `images_dir`, sorted by file name
pub fn collect_image_files(images_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let options = MatchOptions {
        case_sensitive: false,
        ..MatchOptions::default()
    };

    let mut files = Vec::new();
    for ext in IMG_FORMATS {
        let pattern = format!(
            "{}/*.{}",
            glob::Pattern::escape(&images_dir.to_string_lossy()),
            ext
        );
        let entries = glob_with(&pattern, options)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        files.extend(entries.filter_map(|entry| entry.ok()));
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    files.dedup();
    Ok(files)
}

/// Load a YOLO dataset laid out as `images/` and `labels/` under `dataset_dir`.
///
/// Images get ids `1..` in file name order. An image without a label file, or
/// whose size cannot be read, is skipped with a warning.
pub fn load_yolo_dataset(
    dataset_dir: &Path,
    stats: &mut ProcessingStats,
) -> io::Result<(Vec<ImageInfo>, Vec<Annotation>)> {
    let images_dir = dataset_dir.join("images");
    let labels_dir = dataset_dir.join("labels");
    if !images_dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("images directory not found: {}", images_dir.display()),
        ));
    }

    let mut images = Vec::new();
    let mut annotations = Vec::new();

    for (index, image_path) in collect_image_files(&images_dir)?.into_iter().enumerate() {
        let (Some(file_name), Some(stem)) = (image_path.file_name(), image_path.file_stem()) else {
            continue;
        };

        let label_path = labels_dir.join(format!("{}.txt", stem.to_string_lossy()));
        if !label_path.exists() {
            warn!("Label file not found for image: {}", image_path.display());
            stats.skipped_missing_labels += 1;
            continue;
        }

        let (width, height) = match image::image_dimensions(&image_path) {
            Ok(dims) => dims,
            Err(e) => {
                warn!("Failed to read image {}: {}", image_path.display(), e);
                stats.skipped_unreadable_image += 1;
                continue;
            }
        };

        let image = ImageInfo {
            id: (index + 1) as u64,
            file_name: file_name.to_string_lossy().into_owned(),
            width,
            height,
        };

        match load_yolo_labels(&label_path, &image, stats) {
            Ok(labels) => annotations.extend(labels),
            Err(e) => {
                warn!("Failed to read label file {}: {}", label_path.display(), e);
                stats.skipped_missing_labels += 1;
                continue;
            }
        }
        images.push(image);
    }

    Ok((images, annotations))
}

use std::collections::HashMap;

use crate::types::{Annotation, ImageInfo};

/// Images with their ground truth and predictions grouped per image id.
///
/// Within an image, annotations keep the order they were supplied in; the
/// matcher's tie-break depends on it.
#[derive(Debug, Clone, Default)]
pub struct EvalDataset {
    images: Vec<ImageInfo>,
    ground_truths: HashMap<u64, Vec<Annotation>>,
    predictions: HashMap<u64, Vec<Annotation>>,
}

fn group_by_image(annotations: Vec<Annotation>) -> HashMap<u64, Vec<Annotation>> {
    let mut grouped: HashMap<u64, Vec<Annotation>> = HashMap::new();
    for annotation in annotations {
        grouped
            .entry(annotation.image_id)
            .or_default()
            .push(annotation);
    }
    grouped
}

impl EvalDataset {
    pub fn new(
        images: Vec<ImageInfo>,
        ground_truths: Vec<Annotation>,
        predictions: Vec<Annotation>,
    ) -> Self {
        Self {
            images,
            ground_truths: group_by_image(ground_truths),
            predictions: group_by_image(predictions),
        }
    }

    pub fn images(&self) -> &[ImageInfo] {
        &self.images
    }

    pub fn ground_truths(&self, image_id: u64) -> &[Annotation] {
        self.ground_truths
            .get(&image_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn predictions(&self, image_id: u64) -> &[Annotation] {
        self.predictions
            .get(&image_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn total_ground_truths(&self) -> usize {
        self.ground_truths.values().map(Vec::len).sum()
    }

    pub fn total_predictions(&self) -> usize {
        self.predictions.values().map(Vec::len).sum()
    }
}

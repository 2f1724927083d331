//! COCO format data structures
//!
//! Only the fields the evaluation needs are modelled; everything else in a
//! COCO file is ignored on read.

use serde::{Deserialize, Serialize};

use crate::geometry::BBox;
use crate::types::{Annotation as EvalAnnotation, CategoryMap, ImageInfo};

/// COCO category information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supercategory: Option<String>,
}

/// COCO image information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: u64,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

impl Image {
    pub fn new(id: u64, file_name: String, width: u32, height: u32) -> Self {
        Self {
            id,
            file_name,
            width,
            height,
        }
    }
}

impl From<Image> for ImageInfo {
    fn from(image: Image) -> Self {
        ImageInfo {
            id: image.id,
            file_name: image.file_name,
            width: image.width,
            height: image.height,
        }
    }
}

/// COCO annotation information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub id: u64,
    pub image_id: u64,
    pub category_id: u32,
    pub bbox: [f64; 4], // [x, y, width, height]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<f64>,
    #[serde(default)]
    pub iscrowd: u32,
}

impl From<&Annotation> for EvalAnnotation {
    fn from(annotation: &Annotation) -> Self {
        EvalAnnotation::ground_truth(
            annotation.image_id,
            annotation.category_id,
            BBox::from_xywh(annotation.bbox),
        )
    }
}

/// Ground-truth COCO file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CocoFile {
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl CocoFile {
    /// Categories in file order
    pub fn category_map(&self) -> CategoryMap {
        self.categories
            .iter()
            .map(|category| (category.id, category.name.clone()))
            .collect()
    }
}

/// Reference to an image in a detection record, either its id or its file name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageRef {
    Id(u64),
    FileName(String),
}

/// One entry of a COCO results (detections) file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub image_id: ImageRef,
    pub category_id: u32,
    pub bbox: [f64; 4],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

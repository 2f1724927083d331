//! End-to-end evaluation: load, match per image, fold, report

use ab_glyph::FontVec;
use image::ImageError;
use log::{info, warn};
use rayon::prelude::*;
use std::error::Error;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};

use crate::aggregator::{Aggregator, DetectionStats};
use crate::ap::{evaluate_ap, ApMetrics};
use crate::config::{Args, EvalConfig};
use crate::dataset::EvalDataset;
use crate::io::{load_coco_ground_truth, load_predictions, load_yolo_dataset, resolve_predictions};
use crate::matcher::{match_with_policy, MatchResult};
use crate::render::{load_overlay_font, render_image};
use crate::report::{write_summary_json, Summary};
use crate::types::{Annotation, CategoryMap, ImageInfo, ProcessingStats};
use crate::utils::{create_output_directory, create_progress_bar, create_thread_pool};

/// Match outcome for one image
#[derive(Debug, Clone)]
pub struct ImageEvaluation<'a> {
    pub image: &'a ImageInfo,
    pub result: MatchResult,
}

/// Outcome of evaluating a dataset
#[derive(Debug, Clone)]
pub struct DatasetEvaluation {
    pub detection: DetectionStats,
    pub ap: ApMetrics,
}

/// Images that can be evaluated; with an image directory configured, images
/// whose file is missing are skipped
fn select_images<'a>(
    dataset: &'a EvalDataset,
    images_dir: Option<&Path>,
    stats: &mut ProcessingStats,
) -> Vec<&'a ImageInfo> {
    let Some(images_dir) = images_dir else {
        return dataset.images().iter().collect();
    };

    dataset
        .images()
        .iter()
        .filter(|image| {
            let image_path = images_dir.join(&image.file_name);
            if image_path.exists() {
                true
            } else {
                warn!("Image file not found: {}", image_path.display());
                stats.skipped_missing_image += 1;
                false
            }
        })
        .collect()
}

/// Match every image in parallel. Results come back in image order.
pub fn match_images<'a>(
    dataset: &'a EvalDataset,
    images: &[&'a ImageInfo],
    config: &EvalConfig,
) -> Vec<ImageEvaluation<'a>> {
    let pb = create_progress_bar(images.len() as u64, "Match");
    let evaluations = images
        .par_iter()
        .map(|&image| {
            let result = match_with_policy(
                dataset.ground_truths(image.id),
                dataset.predictions(image.id),
                config.iou_threshold,
                config.match_policy,
            );
            pb.inc(1);
            ImageEvaluation { image, result }
        })
        .collect();
    pb.finish_with_message("Matching complete");
    evaluations
}

/// Fold match results one image at a time
pub fn aggregate(
    dataset: &EvalDataset,
    evaluations: &[ImageEvaluation<'_>],
    config: &EvalConfig,
) -> DetectionStats {
    let mut aggregator = Aggregator::new(
        config.categories.clone(),
        config.size_policy,
        config.unknown_category,
    );
    for evaluation in evaluations {
        aggregator.fold(&evaluation.result, dataset.ground_truths(evaluation.image.id));
    }
    aggregator.finish()
}

/// COCO bbox AP over the evaluated images
pub fn average_precision(
    dataset: &EvalDataset,
    images: &[&ImageInfo],
    config: &EvalConfig,
) -> ApMetrics {
    let pairs: Vec<(&[Annotation], &[Annotation])> = images
        .iter()
        .map(|image| (dataset.ground_truths(image.id), dataset.predictions(image.id)))
        .collect();
    evaluate_ap(&pairs, &config.categories)
}

/// Write one annotated image per evaluation; returns the number of failures
fn render_all(
    dataset: &EvalDataset,
    evaluations: &[ImageEvaluation<'_>],
    images_dir: &Path,
    output_dir: &Path,
    font: Option<&FontVec>,
) -> usize {
    let failures = AtomicUsize::new(0);
    let pb = create_progress_bar(evaluations.len() as u64, "Render");

    evaluations.par_iter().for_each(|evaluation| {
        let image_info = evaluation.image;
        let output_path = output_dir.join(&image_info.file_name);
        let rendered = match output_path.parent() {
            Some(parent) => std::fs::create_dir_all(parent).map_err(ImageError::IoError),
            None => Ok(()),
        }
        .and_then(|_| {
            render_image(
                &images_dir.join(&image_info.file_name),
                &output_path,
                dataset.ground_truths(image_info.id),
                dataset.predictions(image_info.id),
                &evaluation.result,
                font,
            )
        });

        if let Err(e) = rendered {
            warn!("Failed to render {}: {}", image_info.file_name, e);
            failures.fetch_add(1, Relaxed);
        }
        pb.inc(1);
    });

    pb.finish_with_message("Rendering complete");
    failures.into_inner()
}

/// Evaluate a dataset and optionally render annotated images
pub fn evaluate_dataset(
    dataset: &EvalDataset,
    config: &EvalConfig,
    stats: &mut ProcessingStats,
) -> Result<DatasetEvaluation, Box<dyn Error>> {
    let images = select_images(dataset, config.images_dir.as_deref(), stats);
    let thread_pool = create_thread_pool(config.workers)?;

    let evaluations = thread_pool.install(|| match_images(dataset, &images, config));
    stats.images_evaluated += evaluations.len();

    let detection_stats = aggregate(dataset, &evaluations, config);
    let ap = thread_pool.install(|| average_precision(dataset, &images, config));

    match (&config.output_dir, &config.images_dir) {
        (Some(output_dir), Some(images_dir)) => {
            let font = config
                .overlay_font
                .as_deref()
                .map(load_overlay_font)
                .transpose()?;
            let output_dir = create_output_directory(output_dir)?;
            info!("Rendering annotated images to {}", output_dir.display());
            stats.render_failures += thread_pool.install(|| {
                render_all(
                    dataset,
                    &evaluations,
                    images_dir,
                    &output_dir,
                    font.as_ref(),
                )
            });
        }
        (Some(_), None) => {
            warn!("No image directory configured; skipping rendering");
        }
        _ => {}
    }

    Ok(DatasetEvaluation {
        detection: detection_stats,
        ap,
    })
}

/// Run a full evaluation from command-line arguments
pub fn run(args: &Args) -> Result<Summary, Box<dyn Error>> {
    let mut stats = ProcessingStats::new();

    let (images, ground_truths, file_categories): (Vec<ImageInfo>, Vec<Annotation>, CategoryMap) =
        if let Some(gt_json) = &args.gt_json {
            info!("Loading COCO ground truth from {}", gt_json.display());
            let coco = load_coco_ground_truth(gt_json)?;
            let categories = coco.category_map();
            let ground_truths = coco.annotations.iter().map(Annotation::from).collect();
            let images = coco.images.into_iter().map(ImageInfo::from).collect();
            (images, ground_truths, categories)
        } else if let Some(yolo_dir) = &args.yolo_dir {
            info!("Loading YOLO ground truth from {}", yolo_dir.display());
            let (images, ground_truths) = load_yolo_dataset(yolo_dir, &mut stats)?;
            (images, ground_truths, CategoryMap::new())
        } else {
            return Err("either --gt_json or --yolo_dir must be given".into());
        };

    info!("Loading predictions from {}", args.pred_json.display());
    let detections = load_predictions(&args.pred_json)?;
    let total_detections = detections.len();
    let predictions =
        resolve_predictions(detections, &images, args.normalized_predictions, &mut stats);
    info!(
        "Resolved {} of {} predictions",
        predictions.len(),
        total_detections
    );

    let dataset = EvalDataset::new(images, ground_truths, predictions);
    info!(
        "Evaluating {} images with {} ground-truth boxes",
        dataset.images().len(),
        dataset.total_ground_truths()
    );

    let config = args.to_eval_config(&file_categories);
    let evaluation = evaluate_dataset(&dataset, &config, &mut stats)?;
    stats.print_summary();

    let summary = Summary::new(&evaluation.detection, &config.categories).with_ap(evaluation.ap);
    summary.log_summary();

    if let Some(path) = &args.summary_json {
        write_summary_json(&summary, path)?;
        info!("Wrote {}", path.display());
    }

    Ok(summary)
}

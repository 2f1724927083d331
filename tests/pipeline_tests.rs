use image::{Rgb, RgbImage};
use pcb_eval::aggregator::{SizeBucket, SizePolicy, UnknownCategoryPolicy};
use pcb_eval::config::{Args, EvalConfig, SizePolicyKind};
use pcb_eval::dataset::EvalDataset;
use pcb_eval::evaluation::{evaluate_dataset, run};
use pcb_eval::geometry::BBox;
use pcb_eval::io::load_yolo_dataset;
use pcb_eval::matcher::{match_with_policy, MatchPolicy};
use pcb_eval::render::{
    draw_matches, load_overlay_font, overlay_lines, GT_COLOR, MATCHED_PRED_COLOR, MISSED_GT_COLOR,
    UNMATCHED_PRED_COLOR,
};
use pcb_eval::types::{Annotation, CategoryMap, ImageInfo, ProcessingStats};
use std::fs;
use std::path::Path;

const GT_JSON: &str = r#"{
    "info": {"description": "fixture"},
    "images": [
        {"id": 1, "file_name": "a.png", "width": 64, "height": 64},
        {"id": 2, "file_name": "b.png", "width": 64, "height": 64},
        {"id": 3, "file_name": "c.png", "width": 64, "height": 64}
    ],
    "annotations": [
        {"id": 1, "image_id": 1, "category_id": 0, "bbox": [0, 0, 10, 10], "area": 100, "iscrowd": 0},
        {"id": 2, "image_id": 1, "category_id": 1, "bbox": [20, 20, 30, 30], "area": 900, "iscrowd": 0},
        {"id": 3, "image_id": 2, "category_id": 0, "bbox": [5, 5, 40, 40], "area": 1600, "iscrowd": 0},
        {"id": 4, "image_id": 3, "category_id": 0, "bbox": [0, 0, 5, 5], "area": 25, "iscrowd": 0}
    ],
    "categories": [
        {"id": 0, "name": "Chip"},
        {"id": 1, "name": "SOD"}
    ]
}"#;

const PRED_JSON: &str = r#"[
    {"image_id": "a.png", "category_id": 0, "bbox": [1, 1, 10, 10], "score": 0.9},
    {"image_id": 2, "category_id": 1, "bbox": [5, 5, 40, 40], "score": 0.8},
    {"image_id": 1, "category_id": 1, "bbox": [40, 40, 5, 5], "score": 0.3},
    {"image_id": "unknown.png", "category_id": 1, "bbox": [0, 0, 5, 5]}
]"#;

fn write_image(path: &Path, width: u32, height: u32) {
    RgbImage::new(width, height).save(path).unwrap();
}

fn write_fixture(root: &Path) {
    let images_dir = root.join("images");
    fs::create_dir_all(&images_dir).unwrap();
    write_image(&images_dir.join("a.png"), 64, 64);
    write_image(&images_dir.join("b.png"), 64, 64);
    fs::write(root.join("gt.json"), GT_JSON).unwrap();
    fs::write(root.join("pred.json"), PRED_JSON).unwrap();
}

fn args_for(root: &Path) -> Args {
    Args {
        gt_json: Some(root.join("gt.json")),
        yolo_dir: None,
        pred_json: root.join("pred.json"),
        images_dir: Some(root.join("images")),
        output_dir: None,
        overlay_font: None,
        iou_threshold: 0.5,
        size_policy: SizePolicyKind::Area,
        match_policy: MatchPolicy::CategoryAgnostic,
        unknown_category: UnknownCategoryPolicy::CountInTotals,
        normalized_predictions: false,
        summary_json: Some(root.join("summary.json")),
        workers: 2,
        label_list: vec![],
    }
}

#[test]
fn test_run_coco_dataset() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write_fixture(root);

    let mut args = args_for(root);
    args.output_dir = Some(root.join("visualization"));
    let summary = run(&args).unwrap();

    // c.png has no file, so its box never enters the tally
    assert_eq!(summary.total_gt, 3);
    assert_eq!(summary.total_missed, 1);
    let ratio = summary.miss_ratio.unwrap();
    assert!((ratio - 100.0 / 3.0).abs() < 1e-9);

    let chip = &summary.classes[0];
    assert_eq!((chip.name.as_str(), chip.total, chip.matched), ("Chip", 2, 2));
    let sod = &summary.classes[1];
    assert_eq!((sod.name.as_str(), sod.total, sod.matched), ("SOD", 1, 0));

    let small = &summary.sizes[0];
    assert_eq!((small.total, small.matched), (2, 1));
    let medium = &summary.sizes[1];
    assert_eq!((medium.total, medium.matched), (1, 1));

    // Chip: one hit at IoU 0.68 among two boxes; SOD: two false positives
    let chip_ap50 = 51.0 / 101.0;
    assert!((summary.ap.ap50.unwrap() - chip_ap50 / 2.0).abs() < 1e-9);
    assert_eq!(summary.ap.ap75, Some(0.0));
    assert!((summary.ap.map.unwrap() - 4.0 * chip_ap50 / 10.0 / 2.0).abs() < 1e-9);
    assert_eq!(summary.ap.per_category.len(), 2);
    assert!(summary.to_string().contains("mAP (IoU=0.50): 0.252"));

    assert!(root.join("visualization/a.png").exists());
    assert!(root.join("visualization/b.png").exists());
    assert!(!root.join("visualization/c.png").exists());

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(root.join("summary.json")).unwrap()).unwrap();
    assert_eq!(written["total_gt"], 3);
    assert_eq!(written["classes"][1]["name"], "SOD");
    assert_eq!(written["ap"]["per_category"][0]["name"], "Chip");
}

#[test]
fn test_run_same_category_and_label_list() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write_fixture(root);

    let mut args = args_for(root);
    args.match_policy = MatchPolicy::SameCategory;
    args.label_list = vec!["Chip".to_string()];
    args.summary_json = None;
    let summary = run(&args).unwrap();

    // b.png's prediction has the wrong class; the SOD box is outside the label list
    assert_eq!(summary.total_gt, 3);
    assert_eq!(summary.total_missed, 2);
    assert_eq!(summary.classes.len(), 1);
    assert_eq!((summary.classes[0].total, summary.classes[0].matched), (2, 1));
    assert_eq!(summary.unknown_category_boxes, 1);
}

#[test]
fn test_evaluate_dataset_counts_skips() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    write_fixture(root);

    let images = vec![
        ImageInfo {
            id: 1,
            file_name: "a.png".to_string(),
            width: 64,
            height: 64,
        },
        ImageInfo {
            id: 9,
            file_name: "gone.png".to_string(),
            width: 64,
            height: 64,
        },
    ];
    let ground_truths = vec![
        Annotation::ground_truth(1, 0, BBox::new(0.0, 0.0, 10.0, 10.0)),
        Annotation::ground_truth(9, 0, BBox::new(0.0, 0.0, 10.0, 10.0)),
    ];
    let dataset = EvalDataset::new(images, ground_truths, vec![]);

    let config = EvalConfig {
        categories: CategoryMap::from_names(["Chip"]),
        images_dir: Some(root.join("images")),
        ..EvalConfig::default()
    };
    let mut stats = ProcessingStats::new();
    let detection_stats = evaluate_dataset(&dataset, &config, &mut stats)
        .unwrap()
        .detection;

    assert_eq!(stats.images_evaluated, 1);
    assert_eq!(stats.skipped_missing_image, 1);
    assert_eq!(detection_stats.total_gt(), 1);
    assert_eq!(detection_stats.miss_ratio(), Some(100.0));

    // headless runs keep every image
    let headless = EvalConfig {
        images_dir: None,
        ..config
    };
    let mut stats = ProcessingStats::new();
    let detection_stats = evaluate_dataset(&dataset, &headless, &mut stats)
        .unwrap()
        .detection;
    assert_eq!(stats.images_evaluated, 2);
    assert_eq!(detection_stats.total_gt(), 2);
}

#[test]
fn test_run_yolo_dataset_with_normalized_predictions() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let images_dir = root.join("images");
    let labels_dir = root.join("labels");
    fs::create_dir_all(&images_dir).unwrap();
    fs::create_dir_all(&labels_dir).unwrap();

    write_image(&images_dir.join("board_1.png"), 200, 100);
    write_image(&images_dir.join("board_2.png"), 100, 100);
    write_image(&images_dir.join("board_3.png"), 100, 100);
    fs::write(
        labels_dir.join("board_1.txt"),
        "0 0.5 0.5 0.5 0.5\n1 0.1 0.1\n7 0.9 0.9 0.1 0.1\n",
    )
    .unwrap();
    fs::write(labels_dir.join("board_2.txt"), "3 0.5 0.5 0.2 0.2\n").unwrap();
    fs::write(
        root.join("pred.json"),
        r#"[{"image_id": "board_1", "category_id": 0, "bbox": [0.5, 0.5, 0.5, 0.5], "score": 0.7}]"#,
    )
    .unwrap();

    let mut stats = ProcessingStats::new();
    let (images, ground_truths) = load_yolo_dataset(root, &mut stats).unwrap();
    let ids: Vec<u64> = images.iter().map(|image| image.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(images[0].width, 200);
    assert_eq!(ground_truths.len(), 3);
    assert_eq!(ground_truths[0].bbox, BBox::new(50.0, 25.0, 100.0, 50.0));
    assert_eq!(stats.malformed_records, 1);
    assert_eq!(stats.skipped_missing_labels, 1);

    let args = Args {
        gt_json: None,
        yolo_dir: Some(root.to_path_buf()),
        images_dir: None,
        summary_json: None,
        normalized_predictions: true,
        size_policy: SizePolicyKind::Side,
        ..args_for(root)
    };
    let summary = run(&args).unwrap();

    // class 7 is not a PCB class but still counts in the overall tally
    assert_eq!(summary.total_gt, 3);
    assert_eq!(summary.total_missed, 2);
    assert_eq!(summary.unknown_category_boxes, 1);
    assert_eq!(summary.classes.len(), 11);
    assert_eq!((summary.classes[0].total, summary.classes[0].matched), (1, 1));
    assert_eq!((summary.classes[3].total, summary.classes[3].matched), (1, 0));
}

#[test]
fn test_draw_matches_colors() {
    let mut image = RgbImage::from_pixel(64, 64, Rgb([0, 0, 0]));
    let ground_truths = vec![
        Annotation::ground_truth(1, 0, BBox::new(0.0, 0.0, 10.0, 10.0)),
        Annotation::ground_truth(1, 0, BBox::new(20.0, 20.0, 20.0, 20.0)),
        Annotation::ground_truth(1, 0, BBox::new(50.0, 2.0, 8.0, 8.0)),
    ];
    let predictions = vec![
        Annotation::prediction(1, 0, BBox::new(0.0, 0.0, 10.0, 10.0), 0.9),
        Annotation::prediction(1, 1, BBox::new(20.0, 20.0, 20.0, 20.0), 0.8),
        Annotation::prediction(1, 0, BBox::new(2.0, 50.0, 6.0, 6.0), 0.5),
    ];
    let result = match_with_policy(
        &ground_truths,
        &predictions,
        0.5,
        MatchPolicy::SameCategory,
    );
    assert_eq!(result.match_count(), 1);

    draw_matches(&mut image, &ground_truths, &predictions, &result);

    assert_eq!(*image.get_pixel(0, 0), MATCHED_PRED_COLOR);
    // missed ground truth is drawn over the unmatched prediction sharing its outline
    assert_eq!(*image.get_pixel(20, 20), MISSED_GT_COLOR);
    assert_eq!(*image.get_pixel(50, 2), MISSED_GT_COLOR);
    assert_eq!(*image.get_pixel(2, 50), UNMATCHED_PRED_COLOR);
    assert_eq!(*image.get_pixel(30, 30), Rgb([0, 0, 0]));
    assert_ne!(GT_COLOR, MISSED_GT_COLOR);
}

#[test]
fn test_size_policy_kind_conversion() {
    assert_eq!(SizePolicy::from(SizePolicyKind::Area), SizePolicy::area_default());
    assert_eq!(SizePolicy::from(SizePolicyKind::Side), SizePolicy::side_default());
    assert_eq!(
        SizePolicy::from(SizePolicyKind::Side).classify(40.0, 40.0),
        SizeBucket::Medium
    );
}

#[test]
fn test_overlay_lines() {
    let ground_truths = vec![
        Annotation::ground_truth(1, 0, BBox::new(0.0, 0.0, 10.0, 10.0)),
        Annotation::ground_truth(1, 0, BBox::new(20.0, 20.0, 10.0, 10.0)),
    ];
    let predictions = vec![Annotation::prediction(
        1,
        0,
        BBox::new(0.0, 0.0, 10.0, 10.0),
        0.9,
    )];
    let result = match_with_policy(
        &ground_truths,
        &predictions,
        0.5,
        MatchPolicy::CategoryAgnostic,
    );

    assert_eq!(
        overlay_lines("board_7.jpg", &result),
        vec![
            "Image: board_7.jpg".to_string(),
            "Total GT Boxes: 2".to_string(),
            "Missed Boxes: 1".to_string(),
        ]
    );
}

#[test]
fn test_invalid_overlay_font() {
    let temp_dir = tempfile::tempdir().unwrap();
    let root = temp_dir.path();
    let font_path = root.join("broken.ttf");
    fs::write(&font_path, b"not a font").unwrap();

    assert!(load_overlay_font(&font_path).is_err());
    assert!(load_overlay_font(&root.join("missing.ttf")).is_err());

    // rendering with an unusable font fails the run before any output is written
    write_fixture(root);
    let mut args = args_for(root);
    args.output_dir = Some(root.join("visualization"));
    args.overlay_font = Some(font_path);
    args.summary_json = None;
    assert!(run(&args).is_err());
    assert!(!root.join("visualization").exists());
}

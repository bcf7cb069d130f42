// 该文件是 Huashan （华山花识） 项目的一部分。
// tests/pipeline.rs - 检测流水线集成测试
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::sync::Arc;

use image::{Rgb, RgbImage};

use huashan::annotate::Annotator;
use huashan::colors::ColorTable;
use huashan::context::{DetectContext, DetectError};
use huashan::decoder::DecoderConfig;
use huashan::labels::LabelTable;
use huashan::model::{ForwardPass, InferenceError, RawHead};
use huashan::summary::NO_OBJECTS;

/// 回放固定输出张量的推理替身
struct FixtureEngine {
  heads: Vec<RawHead>,
}

impl ForwardPass for FixtureEngine {
  fn forward(&self, _image: &RgbImage) -> Result<Vec<RawHead>, InferenceError> {
    Ok(self.heads.clone())
  }
}

/// 构造一行候选: 归一化几何 + 指定类别的分数 (3 个类别)
fn row(cx: f32, cy: f32, w: f32, h: f32, class_id: usize, score: f32) -> Vec<f32> {
  let mut row = vec![cx, cy, w, h, 1.0, 0.0, 0.0, 0.0];
  row[5 + class_id] = score;
  row
}

fn context_with(rows: Vec<Vec<f32>>, nms_threshold: f32) -> DetectContext {
  let row_len = 8;
  let count = rows.len();
  let head = RawHead::new(
    vec![1, count, row_len],
    rows.into_iter().flatten().collect(),
  );
  let labels = Arc::new(LabelTable::from_names(["rose", "tulip", "daisy"]).unwrap());
  let colors = ColorTable::generate(labels.len(), 0);
  DetectContext::from_parts(
    Arc::new(FixtureEngine { heads: vec![head] }),
    labels,
    Annotator::new(colors),
    DecoderConfig { nms_threshold },
    None,
  )
}

fn source_image() -> RgbImage {
  RgbImage::from_pixel(320, 240, Rgb([40, 80, 40]))
}

#[test]
fn single_rose_yields_one_detection_and_annotated_file() {
  let context = context_with(vec![row(0.5, 0.5, 0.3, 0.3, 0, 0.9)], 0.45);
  let dir = tempfile::tempdir().unwrap();
  let output = dir.path().join("yolo_flower.png");

  let image = source_image();
  let outcome = context.detect_and_annotate(&image, 0.3, &output).unwrap();

  assert_eq!(outcome.detections.len(), 1);
  assert_eq!(outcome.detections[0].class_name, "rose");
  assert!((outcome.detections[0].confidence - 0.9).abs() < 1e-6);
  assert_eq!(outcome.summary.labels, "Rose");
  assert_eq!(outcome.summary.confidences, "90%");
  assert_eq!(outcome.annotated_path.as_deref(), Some(output.as_path()));

  // 标注文件存在且确实画了框
  let annotated = image::open(&output).unwrap().to_rgb8();
  assert_ne!(annotated.as_raw(), image.as_raw());
}

#[test]
fn below_threshold_is_no_objects_and_no_file() {
  let context = context_with(vec![row(0.5, 0.5, 0.3, 0.3, 1, 0.2)], 0.45);
  let dir = tempfile::tempdir().unwrap();
  let output = dir.path().join("yolo_flower.png");

  let outcome = context
    .detect_and_annotate(&source_image(), 0.3, &output)
    .unwrap();

  assert!(outcome.detections.is_empty());
  assert_eq!(outcome.summary.labels, NO_OBJECTS);
  assert!(outcome.annotated_path.is_none());
  assert!(!output.exists(), "空结果不得写出标注文件");
}

#[test]
fn overlapping_same_class_candidates_leave_one_survivor() {
  // IoU 约 0.8 的同类候选，抑制阈值 0.5
  let context = context_with(
    vec![
      row(0.5, 0.5, 0.4, 0.4, 0, 0.9),
      row(0.5, 0.54, 0.4, 0.4, 0, 0.4),
    ],
    0.5,
  );

  let detections = context.detect(&source_image(), 0.3).unwrap();
  assert_eq!(detections.len(), 1);
  assert!((detections[0].confidence - 0.9).abs() < 1e-6);
}

#[test]
fn annotated_output_is_reproducible() {
  let context = context_with(
    vec![
      row(0.3, 0.4, 0.2, 0.3, 0, 0.8),
      row(0.7, 0.6, 0.2, 0.2, 2, 0.6),
    ],
    0.45,
  );
  let dir = tempfile::tempdir().unwrap();
  let first = dir.path().join("a.png");
  let second = dir.path().join("b.png");

  let image = source_image();
  context.detect_and_annotate(&image, 0.3, &first).unwrap();
  context.detect_and_annotate(&image, 0.3, &second).unwrap();

  assert_eq!(
    std::fs::read(&first).unwrap(),
    std::fs::read(&second).unwrap(),
    "同样输入的标注输出必须逐字节一致"
  );
}

#[test]
fn render_failure_still_returns_detections() {
  use std::io::Write;

  let context = context_with(vec![row(0.5, 0.5, 0.3, 0.3, 0, 0.9)], 0.45);

  // 以普通文件为输出路径的父目录，写盘必然失败
  let mut file = tempfile::NamedTempFile::new().unwrap();
  file.write_all(b"x").unwrap();
  let output = file.path().join("sub").join("yolo_flower.png");

  let result = context.detect_and_annotate(&source_image(), 0.3, &output);
  match result {
    Err(DetectError::Render { detections, .. }) => {
      // 标注失败不吞掉解码结果
      assert_eq!(detections.len(), 1);
      assert_eq!(detections[0].class_name, "rose");
      assert!((detections[0].confidence - 0.9).abs() < 1e-6);
    }
    other => panic!("期望标注错误并携带检测结果, 实际: {:?}", other.map(|o| o.detections.len())),
  }
}

#[test]
fn detections_stay_inside_image_bounds() {
  // 贴边候选
  let context = context_with(
    vec![
      row(0.02, 0.5, 0.2, 0.4, 1, 0.7),
      row(0.98, 0.97, 0.3, 0.3, 2, 0.7),
    ],
    0.45,
  );

  let image = source_image();
  let detections = context.detect(&image, 0.3).unwrap();
  assert_eq!(detections.len(), 2);
  for det in &detections {
    assert!(det.x >= 0.0 && det.y >= 0.0);
    assert!(det.x + det.width <= image.width() as f32);
    assert!(det.y + det.height <= image.height() as f32);
  }
}

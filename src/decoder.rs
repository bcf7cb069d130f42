// 该文件是 Huashan （华山花识） 项目的一部分。
// src/decoder.rs - 检测结果解码与非极大值抑制
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::labels::LabelTable;
use crate::model::RawHead;

/// 默认 NMS IoU 阈值
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.45;

/// 每行的边界框几何字段数 (cx, cy, w, h) 加 objectness
const BOX_FIELDS: usize = 5;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error(
    "检测头 {head} 输出形状不匹配: 维度 {dims:?}, 共 {len} 个元素, 期望每行 {row_len} (5 + {num_classes} 个类别)"
  )]
  ShapeMismatch {
    head: usize,
    dims: Vec<usize>,
    len: usize,
    row_len: usize,
    num_classes: usize,
  },
}

/// 解码器配置
#[derive(Debug, Clone, Copy)]
pub struct DecoderConfig {
  /// 同类候选框的 IoU 超过该阈值时被抑制
  pub nms_threshold: f32,
}

impl Default for DecoderConfig {
  fn default() -> Self {
    DecoderConfig {
      nms_threshold: DEFAULT_NMS_THRESHOLD,
    }
  }
}

/// 一条检测结果
///
/// 边界框为原图像素坐标系下的左上角坐标加宽高，
/// 坐标保持浮点精度，取整留到渲染阶段。
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
  /// 类别索引（标签表下标）
  pub class_id: usize,
  /// 类别名称
  pub class_name: String,
  /// 边界框左上角 x 坐标
  pub x: f32,
  /// 边界框左上角 y 坐标
  pub y: f32,
  /// 边界框宽度
  pub width: f32,
  /// 边界框高度
  pub height: f32,
  /// 置信度 [0,1]
  pub confidence: f32,
}

/// 解码原始输出张量
///
/// 每行按 [cx, cy, w, h, objectness, 各类别分数…] 解释，
/// 几何量为归一化 [0,1] 的中心点加宽高。流程:
/// 1. 对每行取类别分数的 argmax 作为该候选的类别与置信度，
///    低于 confidence_threshold 的直接丢弃;
/// 2. 乘以原图尺寸转为像素坐标，并裁剪到图像范围内;
/// 3. 逐类别做 NMS，返回幸存者（按抑制顺序，不保证按置信度排序）。
///
/// 张量元素数无法按 (行数 × (5 + 类别数)) 解释时报 DecodeError，
/// 这说明模型与标签表不匹配，属于部署错误。
pub fn decode(
  heads: &[RawHead],
  labels: &LabelTable,
  image_width: u32,
  image_height: u32,
  confidence_threshold: f32,
  config: &DecoderConfig,
) -> Result<Vec<Detection>, DecodeError> {
  let num_classes = labels.len();
  let row_len = BOX_FIELDS + num_classes;
  let (w, h) = (image_width as f32, image_height as f32);

  let mut candidates = Vec::new();

  for (head_idx, head) in heads.iter().enumerate() {
    let trailing_mismatch = head.dims.last().is_some_and(|&last| last != row_len);
    if head.data.len() % row_len != 0 || trailing_mismatch {
      error!(
        "检测头 {} 形状与标签表不匹配: 维度 {:?}, {} 个元素, 期望每行 {}",
        head_idx,
        head.dims,
        head.data.len(),
        row_len
      );
      return Err(DecodeError::ShapeMismatch {
        head: head_idx,
        dims: head.dims.clone(),
        len: head.data.len(),
        row_len,
        num_classes,
      });
    }

    for row in head.data.chunks_exact(row_len) {
      // argmax 取最高类别分数作为该候选的类别与置信度
      let scores = &row[BOX_FIELDS..];
      let mut class_id = 0usize;
      let mut confidence = scores[0];
      for (idx, &score) in scores.iter().enumerate().skip(1) {
        if score > confidence {
          confidence = score;
          class_id = idx;
        }
      }

      if confidence < confidence_threshold {
        continue;
      }

      // 归一化中心点/宽高 -> 像素左上角坐标，浮点裁剪到图像范围
      let bw = row[2] * w;
      let bh = row[3] * h;
      let x1 = (row[0] * w - bw / 2.0).clamp(0.0, w);
      let y1 = (row[1] * h - bh / 2.0).clamp(0.0, h);
      let x2 = (row[0] * w + bw / 2.0).clamp(0.0, w);
      let y2 = (row[1] * h + bh / 2.0).clamp(0.0, h);

      candidates.push(Detection {
        class_id,
        class_name: labels
          .get(class_id)
          .expect("类别索引由标签表长度推出，必然有效")
          .to_string(),
        x: x1,
        y: y1,
        width: x2 - x1,
        height: y2 - y1,
        confidence,
      });
    }
  }

  debug!("阈值过滤后剩余 {} 个候选", candidates.len());
  let survivors = nms(candidates, config.nms_threshold);
  debug!("NMS 后剩余 {} 个检测", survivors.len());
  Ok(survivors)
}

/// 逐类别非极大值抑制
///
/// 不同类别的框可以合法重叠，只有同类框之间互相抑制。
fn nms(mut detections: Vec<Detection>, nms_threshold: f32) -> Vec<Detection> {
  detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

  let mut survivors = Vec::new();
  while !detections.is_empty() {
    let best = detections.remove(0);
    detections.retain(|det| det.class_id != best.class_id || iou(&best, det) < nms_threshold);
    survivors.push(best);
  }

  survivors
}

/// 计算两个边界框的 IoU
pub fn iou(a: &Detection, b: &Detection) -> f32 {
  let x1 = a.x.max(b.x);
  let y1 = a.y.max(b.y);
  let x2 = (a.x + a.width).min(b.x + b.width);
  let y2 = (a.y + a.height).min(b.y + b.height);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = a.width * a.height + b.width * b.height - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

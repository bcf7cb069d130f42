// 该文件是 Huashan （华山花识） 项目的一部分。
// src/context.rs - 进程级检测上下文与请求入口
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::annotate::{Annotator, RenderError};
use crate::colors::{ColorTable, DEFAULT_COLOR_SEED};
use crate::decoder::{self, DecodeError, DecoderConfig, Detection};
use crate::labels::{LabelError, LabelTable};
use crate::model::{self, ForwardPass, InferenceError, ModelLoadError, NetworkGraph};
use crate::summary::{self, DetectSummary};

/// 默认置信度阈值
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;

#[derive(Error, Debug)]
pub enum ContextError {
  #[error("模型加载失败: {0}")]
  Model(#[from] ModelLoadError),
  #[error("标签表加载失败: {0}")]
  Labels(#[from] LabelError),
}

#[derive(Error, Debug)]
pub enum DetectError {
  #[error("推理失败: {0}")]
  Inference(#[from] InferenceError),
  #[error("解码失败: {0}")]
  Decode(#[from] DecodeError),
  /// 标注失败时解码结果仍然有效，随错误一起返回给调用方
  #[error("标注输出失败: {source}")]
  Render {
    #[source]
    source: RenderError,
    detections: Vec<Detection>,
  },
}

/// 一次检测请求的完整结果
///
/// annotated_path 仅在至少有一个检测幸存并成功写出标注图像时为 Some。
/// 空结果不写任何文件，由调用方继续展示原始上传图。
#[derive(Debug, Serialize)]
pub struct DetectOutcome {
  pub detections: Vec<Detection>,
  pub summary: DetectSummary,
  pub annotated_path: Option<PathBuf>,
}

/// 进程级检测上下文
///
/// 持有加载一次、此后不可变的模型图、标签表和颜色表。
/// 所有字段只读，整个上下文可放入 Arc 被并发请求处理线程共享；
/// 每个请求自带图像缓冲与检测列表，互不影响。
pub struct DetectContext {
  graph: Arc<dyn ForwardPass + Send + Sync>,
  labels: Arc<LabelTable>,
  annotator: Annotator,
  decoder_config: DecoderConfig,
  infer_timeout: Option<Duration>,
}

/// 上下文构建器
///
/// 进程启动时调用一次，此后不再加载模型。
pub struct DetectContextBuilder {
  model_path: PathBuf,
  labels_path: PathBuf,
  input_width: u32,
  input_height: u32,
  nms_threshold: f32,
  color_seed: u64,
  infer_timeout: Option<Duration>,
}

impl DetectContextBuilder {
  pub fn new<M: Into<PathBuf>, L: Into<PathBuf>>(model_path: M, labels_path: L) -> Self {
    DetectContextBuilder {
      model_path: model_path.into(),
      labels_path: labels_path.into(),
      input_width: model::DEFAULT_INPUT_WIDTH,
      input_height: model::DEFAULT_INPUT_HEIGHT,
      nms_threshold: decoder::DEFAULT_NMS_THRESHOLD,
      color_seed: DEFAULT_COLOR_SEED,
      infer_timeout: None,
    }
  }

  /// 模型的固定输入分辨率
  pub fn input_size(mut self, width: u32, height: u32) -> Self {
    self.input_width = width;
    self.input_height = height;
    self
  }

  pub fn nms_threshold(mut self, threshold: f32) -> Self {
    self.nms_threshold = threshold;
    self
  }

  pub fn color_seed(mut self, seed: u64) -> Self {
    self.color_seed = seed;
    self
  }

  /// 单次推理的时间上限，超过则请求以超时错误终止
  pub fn infer_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.infer_timeout = timeout;
    self
  }

  pub fn build(self) -> Result<DetectContext, ContextError> {
    let labels = LabelTable::from_path(&self.labels_path)?;
    let graph = NetworkGraph::load(&self.model_path, self.input_width, self.input_height)?;
    let colors = ColorTable::generate(labels.len(), self.color_seed);
    info!(
      "检测上下文就绪: {} 个类别, 输入 {}x{}, NMS 阈值 {}",
      labels.len(),
      self.input_width,
      self.input_height,
      self.nms_threshold
    );

    let graph: Arc<dyn ForwardPass + Send + Sync> = Arc::new(graph);
    Ok(DetectContext::from_parts(
      graph,
      Arc::new(labels),
      Annotator::new(colors),
      DecoderConfig {
        nms_threshold: self.nms_threshold,
      },
      self.infer_timeout,
    ))
  }
}

impl DetectContext {
  /// 由现成的组件装配上下文，测试可借此替换推理引擎
  pub fn from_parts(
    graph: Arc<dyn ForwardPass + Send + Sync>,
    labels: Arc<LabelTable>,
    annotator: Annotator,
    decoder_config: DecoderConfig,
    infer_timeout: Option<Duration>,
  ) -> Self {
    DetectContext {
      graph,
      labels,
      annotator,
      decoder_config,
      infer_timeout,
    }
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn annotator(&self) -> &Annotator {
    &self.annotator
  }

  /// 对一张图像运行检测，返回 NMS 幸存者列表（可能为空）
  pub fn detect(
    &self,
    image: &RgbImage,
    confidence_threshold: f32,
  ) -> Result<Vec<Detection>, DetectError> {
    debug!(
      "检测请求: {}x{}, 置信度阈值 {}",
      image.width(),
      image.height(),
      confidence_threshold
    );
    let heads = model::forward_with_timeout(&self.graph, image, self.infer_timeout)?;
    let detections = decoder::decode(
      &heads,
      &self.labels,
      image.width(),
      image.height(),
      confidence_threshold,
      &self.decoder_config,
    )?;
    Ok(detections)
  }

  /// 检测并写出标注图像
  ///
  /// 空结果是合法结局: 不写文件，摘要给出 "no objects found" 文案。
  /// 标注或写盘失败时检测结果随 DetectError::Render 一起返回。
  pub fn detect_and_annotate<P: AsRef<Path>>(
    &self,
    image: &RgbImage,
    confidence_threshold: f32,
    output_path: P,
  ) -> Result<DetectOutcome, DetectError> {
    let detections = self.detect(image, confidence_threshold)?;
    let summary = summary::summarize(&detections);

    if detections.is_empty() {
      info!("未检测到任何对象，不写标注文件");
      return Ok(DetectOutcome {
        detections,
        summary,
        annotated_path: None,
      });
    }

    let canvas = match self.annotator.render(image, &detections) {
      Ok(canvas) => canvas,
      Err(source) => return Err(DetectError::Render { source, detections }),
    };
    let output_path = output_path.as_ref();
    if let Err(source) = self.annotator.save(&canvas, output_path) {
      return Err(DetectError::Render { source, detections });
    }

    info!(
      "检测完成: {} 个对象, 标注图像 {}",
      detections.len(),
      output_path.display()
    );
    Ok(DetectOutcome {
      detections,
      summary,
      annotated_path: Some(output_path.to_path_buf()),
    })
  }
}

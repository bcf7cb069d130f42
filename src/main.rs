// 该文件是 Huashan （华山花识） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use huashan::annotate::annotated_file_name;
use huashan::context::{DetectContextBuilder, DetectError};
use huashan::summary;

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型文件路径: {}", args.model.display());
  info!("标签文件路径: {}", args.labels.display());
  info!("输入图片: {}", args.input.display());
  info!("置信度阈值: {}", args.confidence);
  info!("NMS 阈值: {}", args.nms_threshold);

  // 上下文在进程启动时构建一次，模型加载失败直接退出
  let context = DetectContextBuilder::new(&args.model, &args.labels)
    .input_size(args.input_width, args.input_height)
    .nms_threshold(args.nms_threshold)
    .color_seed(args.color_seed)
    .infer_timeout(args.timeout_ms.map(Duration::from_millis))
    .build()
    .context("检测上下文构建失败")?;

  let image = image::open(&args.input)
    .with_context(|| format!("无法读取输入图片: {}", args.input.display()))?
    .to_rgb8();
  info!("输入图片已读取: {}x{}", image.width(), image.height());

  let file_name = args
    .input
    .file_name()
    .and_then(|name| name.to_str())
    .context("输入路径没有合法的文件名")?;
  let output_path = args.output_dir.join(annotated_file_name(file_name));

  let now = std::time::Instant::now();
  let outcome = match context.detect_and_annotate(&image, args.confidence, &output_path) {
    Ok(outcome) => outcome,
    Err(DetectError::Render { source, detections }) => {
      // 标注失败不吞掉检测结果，照常向调用方报告
      warn!("标注输出失败: {}", source);
      for det in &detections {
        info!(
          "  - {}: {:.2}% at ({:.0}, {:.0}, {:.0}x{:.0})",
          det.class_name,
          det.confidence * 100.0,
          det.x,
          det.y,
          det.width,
          det.height
        );
      }
      let summary = summary::summarize(&detections);
      info!("检测摘要: {} ({})", summary.labels, summary.confidences);
      return Err(source).context("标注输出失败");
    }
    Err(err) => return Err(err).context("检测失败"),
  };
  info!("检测完成, 耗时: {:.2?}", now.elapsed());

  for det in &outcome.detections {
    info!(
      "  - {}: {:.2}% at ({:.0}, {:.0}, {:.0}x{:.0})",
      det.class_name,
      det.confidence * 100.0,
      det.x,
      det.y,
      det.width,
      det.height
    );
  }

  match &outcome.annotated_path {
    Some(path) => info!(
      "检测摘要: {} ({}), 标注图像: {}",
      outcome.summary.labels,
      outcome.summary.confidences,
      path.display()
    ),
    None => info!("{}", outcome.summary.labels),
  }

  if args.json {
    println!("{}", serde_json::to_string_pretty(&outcome)?);
  }

  Ok(())
}

// 该文件是 Huashan （华山花识） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;

/// Huashan 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型文件路径
  #[arg(long, value_name = "FILE")]
  pub model: PathBuf,

  /// 标签文件路径，每行一个类别名称
  #[arg(long, value_name = "FILE")]
  pub labels: PathBuf,

  /// 输入图片路径 (*.jpg, *.jpeg, *.png, *.bmp)
  #[arg(long, value_name = "IMAGE")]
  pub input: PathBuf,

  /// 标注图像输出目录
  #[arg(long, default_value = "images", value_name = "DIR")]
  pub output_dir: PathBuf,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.3", value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IoU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.45", value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 模型输入宽度
  #[arg(long, default_value = "416", value_name = "PIXELS")]
  pub input_width: u32,

  /// 模型输入高度
  #[arg(long, default_value = "416", value_name = "PIXELS")]
  pub input_height: u32,

  /// 类别颜色种子，相同种子得到相同的调色板
  #[arg(long, default_value = "0", value_name = "SEED")]
  pub color_seed: u64,

  /// 单次推理超时（毫秒），不设置则不限时
  #[arg(long, value_name = "MS")]
  pub timeout_ms: Option<u64>,

  /// 以 JSON 输出完整检测结果
  #[arg(long)]
  pub json: bool,
}

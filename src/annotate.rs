// 该文件是 Huashan （华山花识） 项目的一部分。
// src/annotate.rs - 检测结果标注与图像输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::debug;

use crate::colors::ColorTable;
use crate::decoder::Detection;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_HEIGHT: i32 = 20;
const LABEL_CHAR_WIDTH: f32 = 9.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const TEXT_COLOR: [u8; 3] = [255, 255, 255]; // 白色文本

/// 标注输出文件名前缀约定
pub const ANNOTATED_PREFIX: &str = "yolo_";

#[derive(Error, Debug)]
pub enum RenderError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("源图像为空")]
  EmptyImage,
}

/// 检测结果标注器
///
/// 在原图副本上按类别颜色绘制边界框与 `名称 置信度` 标签。
/// 同样的图像、检测列表和颜色表得到逐字节相同的像素缓冲。
pub struct Annotator {
  font: FontArc,
  font_scale: PxScale,
  colors: ColorTable,
}

impl Annotator {
  pub fn new(colors: ColorTable) -> Self {
    let font_data = include_bytes!("../assets/DejaVuSans.ttf");
    let font = FontArc::try_from_slice(font_data).expect("无法加载嵌入的字体文件");

    Annotator {
      font,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
      colors,
    }
  }

  pub fn colors(&self) -> &ColorTable {
    &self.colors
  }

  /// 在原图副本上绘制全部检测结果
  pub fn render(
    &self,
    image: &RgbImage,
    detections: &[Detection],
  ) -> Result<RgbImage, RenderError> {
    if image.width() == 0 || image.height() == 0 {
      return Err(RenderError::EmptyImage);
    }

    let mut canvas = image.clone();
    for detection in detections {
      self.draw_detection(&mut canvas, detection);
    }
    debug!("标注完成: {} 个检测框", detections.len());
    Ok(canvas)
  }

  /// 把标注后的图像写入文件，按扩展名编码，必要时创建父目录
  pub fn save<P: AsRef<Path>>(&self, image: &RgbImage, path: P) -> Result<(), RenderError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    image.save(path)?;
    debug!("保存标注图像: {}", path.display());
    Ok(())
  }

  fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
    let color = self.colors.get(detection.class_id);
    let (img_w, img_h) = (image.width() as i32, image.height() as i32);

    // 像素坐标取整留到此处，之前全程浮点
    let x = (detection.x.round() as i32).clamp(0, img_w - 1);
    let y = (detection.y.round() as i32).clamp(0, img_h - 1);
    let width = (detection.width.round() as i32).clamp(0, img_w - x) as u32;
    let height = (detection.height.round() as i32).clamp(0, img_h - y) as u32;

    if width == 0 || height == 0 {
      return;
    }

    // 绘制边界框（双线加粗）
    draw_hollow_rect_mut(image, Rect::at(x, y).of_size(width, height), color);
    if width > 2 && height > 2 {
      let inner = Rect::at(x + 1, y + 1).of_size(width - 2, height - 2);
      draw_hollow_rect_mut(image, inner, color);
    }

    // 标签放在框上沿，贴边时压进图像内
    let label = format!("{} {:.2}", detection.class_name, detection.confidence);
    let text_width = (label.len() as f32 * LABEL_CHAR_WIDTH) as i32;
    let label_x = x.min((img_w - text_width).max(0));
    let label_y = (y - LABEL_TEXT_HEIGHT).max(0);
    let label_width = text_width.min(img_w - label_x) as u32;
    let label_height = (LABEL_TEXT_HEIGHT.min(img_h - label_y)) as u32;

    if label_width > 0 && label_height > 0 {
      let backdrop = Rect::at(label_x, label_y).of_size(label_width, label_height);
      draw_filled_rect_mut(image, backdrop, color);
      draw_text_mut(
        image,
        Rgb(TEXT_COLOR),
        label_x,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        self.font_scale,
        &self.font,
        &label,
      );
    }
  }
}

/// 按前缀约定派生标注输出文件名，如 `flower.jpg` -> `yolo_flower.jpg`
pub fn annotated_file_name(original: &str) -> String {
  format!("{}{}", ANNOTATED_PREFIX, original)
}

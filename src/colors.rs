// 该文件是 Huashan （华山花识） 项目的一部分。
// src/colors.rs - 类别颜色表
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::Rgb;
use tracing::debug;

/// 默认颜色种子
pub const DEFAULT_COLOR_SEED: u64 = 0;

/// 空颜色表的兜底颜色
const FALLBACK_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

/// 类别颜色表
///
/// 为每个类别分配一个固定的 RGB 颜色。生成由显式种子决定，
/// 同一 (类别数, 种子) 组合在任何进程中都得到相同的颜色，
/// 以保证标注输出可用于回归对比。
#[derive(Debug, Clone)]
pub struct ColorTable {
  colors: Vec<Rgb<u8>>,
  seed: u64,
}

impl ColorTable {
  /// 为 num_classes 个类别生成颜色
  pub fn generate(num_classes: usize, seed: u64) -> Self {
    let colors = (0..num_classes)
      .map(|i| {
        // 用混合函数打散 (种子, 类别) 得到伪随机但可复现的色相
        let bits = mix64(seed ^ (i as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let hue = (bits % 3600) as f32 / 10.0;
        let sat = 0.65 + ((bits >> 16) % 30) as f32 / 100.0;
        let val = 0.75 + ((bits >> 32) % 20) as f32 / 100.0;
        hsv_to_rgb(hue, sat, val)
      })
      .collect();
    debug!("颜色表生成完成: {} 个类别, 种子 {}", num_classes, seed);
    ColorTable { colors, seed }
  }

  pub fn get(&self, class_id: usize) -> Rgb<u8> {
    if self.colors.is_empty() {
      return FALLBACK_COLOR;
    }
    self.colors[class_id % self.colors.len()]
  }

  pub fn len(&self) -> usize {
    self.colors.len()
  }

  pub fn is_empty(&self) -> bool {
    self.colors.is_empty()
  }

  pub fn seed(&self) -> u64 {
    self.seed
  }
}

/// SplitMix64 的有限步混合
fn mix64(mut x: u64) -> u64 {
  x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
  x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
  x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
  x ^ (x >> 31)
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

// 该文件是 Huashan （华山花识） 项目的一部分。
// src/summary.rs - 检测结果的人类可读摘要
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use serde::Serialize;

use crate::decoder::Detection;

/// 空结果的文案
pub const NO_OBJECTS: &str = "No objects found";

/// 供结果页展示的摘要
///
/// labels 为去重并首字母大写的类别名，confidences 为取整的百分比，
/// 两者都用英文 and 语法连接。去重保持检测结果的先后顺序，
/// 同样的检测列表总是得到同样的摘要文本。
#[derive(Debug, Clone, Serialize)]
pub struct DetectSummary {
  pub labels: String,
  pub confidences: String,
  pub count: usize,
}

/// 汇总检测列表
pub fn summarize(detections: &[Detection]) -> DetectSummary {
  if detections.is_empty() {
    return DetectSummary {
      labels: NO_OBJECTS.to_string(),
      confidences: String::new(),
      count: 0,
    };
  }

  let mut seen = Vec::new();
  for det in detections {
    if !seen.iter().any(|name| name == &det.class_name) {
      seen.push(det.class_name.clone());
    }
  }
  let labels: Vec<String> = seen.iter().map(|name| capitalize(name)).collect();

  let confidences: Vec<String> = detections
    .iter()
    .map(|det| format!("{}%", (det.confidence * 100.0).round() as u32))
    .collect();

  DetectSummary {
    labels: and_syntax(&labels),
    confidences: and_syntax(&confidences),
    count: detections.len(),
  }
}

/// 英文列举语法: `a` / `a and b` / `a, b, and c`
fn and_syntax(items: &[String]) -> String {
  match items {
    [] => String::new(),
    [only] => only.clone(),
    [first, second] => format!("{} and {}", first, second),
    [init @ .., last] => format!("{}, and {}", init.join(", "), last),
  }
}

fn capitalize(name: &str) -> String {
  let mut chars = name.chars();
  match chars.next() {
    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    None => String::new(),
  }
}

// 该文件是 Huashan （华山花识） 项目的一部分。
// src/labels.rs - 类别标签表
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("标签文件读取失败: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签表为空: {0}")]
  Empty(String),
}

/// 类别标签表
///
/// 按顺序保存类别名称，索引 i 即检测器第 i 类的语义名称。
/// 加载后不可变，可在多个请求之间只读共享。
#[derive(Debug, Clone)]
pub struct LabelTable {
  names: Vec<String>,
}

impl LabelTable {
  /// 从标签文件加载，每行一个类别名称
  pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, LabelError> {
    let path = path.as_ref();
    info!("加载标签文件: {}", path.display());
    let file = std::fs::File::open(path)?;
    let table = Self::from_reader(file)?;
    info!("标签表加载完成, 共 {} 个类别", table.len());
    Ok(table)
  }

  pub fn from_reader<R: Read>(reader: R) -> Result<Self, LabelError> {
    let reader = BufReader::new(reader);
    let mut names = Vec::new();
    for line in reader.lines() {
      let line = line?;
      let name = line.trim();
      if !name.is_empty() {
        names.push(name.to_string());
      }
    }
    Self::from_names(names)
  }

  /// 从内存中的名称列表构造
  pub fn from_names<I, S>(names: I) -> Result<Self, LabelError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let names: Vec<String> = names.into_iter().map(Into::into).collect();
    if names.is_empty() {
      return Err(LabelError::Empty("标签表至少需要一个类别".to_string()));
    }
    Ok(LabelTable { names })
  }

  pub fn get(&self, class_id: usize) -> Option<&str> {
    self.names.get(class_id).map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.names.iter().map(String::as_str)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_one_name_per_line() {
    let table = LabelTable::from_reader("rose\ntulip\ndaisy\n".as_bytes()).unwrap();
    assert_eq!(table.len(), 3);
    assert_eq!(table.get(0), Some("rose"));
    assert_eq!(table.get(2), Some("daisy"));
    assert_eq!(table.get(3), None);
  }

  #[test]
  fn skips_blank_lines_and_trims() {
    let table = LabelTable::from_reader("  rose \n\n\ttulip\n \n".as_bytes()).unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.get(1), Some("tulip"));
  }

  #[test]
  fn rejects_empty_table() {
    assert!(matches!(
      LabelTable::from_reader("\n \n".as_bytes()),
      Err(LabelError::Empty(_))
    ));
  }

  #[test]
  fn loads_from_file() {
    use std::io::Write;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "rose\ntulip").unwrap();
    let table = LabelTable::from_path(file.path()).unwrap();
    assert_eq!(table.iter().collect::<Vec<_>>(), vec!["rose", "tulip"]);
  }
}

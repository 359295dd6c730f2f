// 该文件是 Beifeng （北风） 项目的一部分。
// src/label.rs - 类别标签
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

use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

const UNKNOWN_LABEL: &str = "unknown";

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签文件为空")]
  Empty,
}

/// 类别标签表，下标即类别编号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
  names: Vec<String>,
}

impl Labels {
  /// 每行一个标签，行号即类别编号
  pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let labels: Labels = content.parse()?;
    info!("从 {} 加载了 {} 个标签", path.display(), labels.len());
    Ok(labels)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn name(&self, class_id: usize) -> &str {
    self
      .names
      .get(class_id)
      .map(String::as_str)
      .unwrap_or(UNKNOWN_LABEL)
  }

  /// 标签数量与模型类别数量不一致时给出警告
  pub fn check_class_count(&self, class_count: usize) {
    if self.len() != class_count {
      warn!(
        "标签数量 {} 与模型类别数量 {} 不一致",
        self.len(),
        class_count
      );
    }
  }
}

impl std::str::FromStr for Labels {
  type Err = LabelError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    // lines() 会去掉 "\r\n" 以及末尾的空行
    let names: Vec<String> = s.lines().map(|line| line.trim_end().to_string()).collect();
    if names.is_empty() {
      return Err(LabelError::Empty);
    }
    Ok(Labels { names })
  }
}

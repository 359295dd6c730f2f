// 该文件是 Beifeng （北风） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::ImageFrame,
  label::Labels,
  model::DetectResult,
  output::{
    Render,
    draw::{Draw, Record},
  },
};

/// 在原始图像上绘制检测框并保存，同时在同名 `.json` 文件中记录检测结果
pub struct SaveImageFileOutput {
  path: String,
  draw: Draw,
  labels: Option<Labels>,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("记录序列化错误: {0}")]
  RecordError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput {
      path: uri.path().to_string(),
      draw: Draw::default(),
      labels: None,
    })
  }
}

impl SaveImageFileOutput {
  /// 设置标签后才会写出 JSON 记录
  pub fn with_labels(mut self, labels: Labels) -> Self {
    self.labels = Some(labels);
    self
  }

  fn save_image(&self, image: &image::RgbImage) -> Result<(), SaveImageFileError> {
    let path = Path::new(&self.path);
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(path)?;
    info!("保存检测结果到文件: {}", self.path);

    Ok(())
  }
}

impl Render<ImageFrame, DetectResult> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &ImageFrame, result: &DetectResult) -> Result<(), Self::Error> {
    let mut image = frame.original.clone();
    self.draw.draw_detections(&mut image, &result.items);
    self.save_image(&image)?;

    if let Some(labels) = &self.labels {
      let record_path = Path::new(&self.path).with_extension("json");
      let json = Record { labels }.to_json(&result.items)?;
      std::fs::write(&record_path, json)?;
      info!("保存检测记录到文件: {}", record_path.display());
    }

    Ok(())
  }
}

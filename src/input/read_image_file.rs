// 该文件是 Beifeng （北风） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::{ImageReader, Rgb, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{AsNhwcFrame, LetterboxedFrame, PreparedFrame, RgbNhwcFrame},
  input::ResizeMode,
  postprocess::{ConfigError, Letterbox},
};

const LETTERBOX_FILL: Rgb<u8> = Rgb([114, 114, 114]);

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemaMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("缩放参数错误: {0}")]
  ResizeError(String),
  #[error("预处理参数错误: {0}")]
  ConfigError(#[from] ConfigError),
}

/// 读入的图像文件，按需缩放成模型输入
pub struct ImageFileInput {
  image: RgbImage,
  mode: ResizeMode,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  /// `image:///path/to/bus.jpg?letterbox=fit`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let mode = match url.query_pairs().find(|(key, _)| key == "letterbox") {
      Some((_, value)) => value.parse().map_err(ImageFileInputError::ResizeError)?,
      None => ResizeMode::default(),
    };

    let path = url.path();
    let image = ImageReader::open(path)?.decode()?.into_rgb8();
    debug!("读取图像 {}: {}x{}", path, image.width(), image.height());

    Ok(ImageFileInput { image, mode })
  }
}

impl ImageFileInput {
  pub fn new(image: RgbImage, mode: ResizeMode) -> Self {
    ImageFileInput { image, mode }
  }

  /// 缩放到模型输入尺寸，得到只含一帧的迭代器
  pub fn into_frames(
    self,
    width: u32,
    height: u32,
  ) -> Result<std::iter::Once<ImageFrame>, ImageFileInputError> {
    let frame = prepare_image(self.image, self.mode, width, height)?;
    Ok(std::iter::once(frame))
  }
}

/// 原始图像与对应的模型输入
#[derive(Debug, Clone)]
pub struct ImageFrame {
  pub original: RgbImage,
  pub prepared: LetterboxedFrame,
}

impl AsNhwcFrame for ImageFrame {
  fn as_nhwc(&self) -> &[u8] {
    self.prepared.as_nhwc()
  }
}

impl PreparedFrame for ImageFrame {
  fn letterbox(&self) -> &Letterbox {
    &self.prepared.letterbox
  }
}

/// 按 `mode` 缩放图像；返回的 `Letterbox` 与实际缩放完全一致
pub fn prepare_image(
  original: RgbImage,
  mode: ResizeMode,
  width: u32,
  height: u32,
) -> Result<ImageFrame, ImageFileInputError> {
  let (src_width, src_height) = original.dimensions();

  let (resized, letterbox) = match mode {
    ResizeMode::Stretch => {
      let letterbox = Letterbox::stretch(src_width, src_height, width, height)?;
      let resized = image::imageops::resize(&original, width, height, FilterType::Triangle);
      (resized, letterbox)
    }
    ResizeMode::Fit => {
      let letterbox = Letterbox::fit(src_width, src_height, width, height)?;
      let scaled = image::imageops::resize(
        &original,
        letterbox.resized_width,
        letterbox.resized_height,
        FilterType::Triangle,
      );
      let mut canvas = RgbImage::from_pixel(width, height, LETTERBOX_FILL);
      image::imageops::overlay(
        &mut canvas,
        &scaled,
        letterbox.pad_x as i64,
        letterbox.pad_y as i64,
      );
      (canvas, letterbox)
    }
  };

  debug!(
    "预处理 {}x{} -> {}x{}, {:?}",
    src_width, src_height, width, height, letterbox
  );

  // RgbImage 的内存排列即为 HWC
  let frame = RgbNhwcFrame::from_raw(height as usize, width as usize, resized.into_raw())
    .ok_or_else(|| ImageFileInputError::ResizeError("缩放后的数据长度不正确".to_string()))?;

  Ok(ImageFrame {
    original,
    prepared: LetterboxedFrame { frame, letterbox },
  })
}

// 该文件是 Beifeng （北风） 项目的一部分。
// src/postprocess/rescale.rs - 坐标还原
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

use super::{BBox, PixelBox, params::ConfigError};

/// 预处理时从原始图像到模型输入的变换：`model = original * scale + pad`。
///
/// 预处理与坐标还原必须使用同一个 `Letterbox`，否则框会整体偏移。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub src_width: u32,
  pub src_height: u32,
  pub resized_width: u32,
  pub resized_height: u32,
  pub scale_x: f32,
  pub scale_y: f32,
  pub pad_x: f32,
  pub pad_y: f32,
}

impl Letterbox {
  /// 直接拉伸到模型输入尺寸，无填充
  pub fn stretch(
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
  ) -> Result<Self, ConfigError> {
    check_sizes(src_width, src_height, dst_width, dst_height)?;
    Ok(Letterbox {
      src_width,
      src_height,
      resized_width: dst_width,
      resized_height: dst_height,
      scale_x: dst_width as f32 / src_width as f32,
      scale_y: dst_height as f32 / src_height as f32,
      pad_x: 0.0,
      pad_y: 0.0,
    })
  }

  /// 保持长宽比缩放，居中放置，四周以整数像素填充
  pub fn fit(
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
  ) -> Result<Self, ConfigError> {
    check_sizes(src_width, src_height, dst_width, dst_height)?;
    let ratio = f32::min(
      dst_width as f32 / src_width as f32,
      dst_height as f32 / src_height as f32,
    );
    let resized_width = ((src_width as f32 * ratio).round() as u32).clamp(1, dst_width);
    let resized_height = ((src_height as f32 * ratio).round() as u32).clamp(1, dst_height);

    Ok(Letterbox {
      src_width,
      src_height,
      resized_width,
      resized_height,
      scale_x: resized_width as f32 / src_width as f32,
      scale_y: resized_height as f32 / src_height as f32,
      pad_x: ((dst_width - resized_width) / 2) as f32,
      pad_y: ((dst_height - resized_height) / 2) as f32,
    })
  }

  /// 原始图像坐标 -> 模型输入坐标
  pub fn forward(&self, bbox: &BBox) -> BBox {
    BBox {
      left: bbox.left * self.scale_x + self.pad_x,
      top: bbox.top * self.scale_y + self.pad_y,
      right: bbox.right * self.scale_x + self.pad_x,
      bottom: bbox.bottom * self.scale_y + self.pad_y,
    }
  }

  /// 模型输入坐标 -> 原始图像整数像素坐标。
  /// 结果截断到图像范围内；截断后面积为 0 时返回 `None`。
  pub fn restore(&self, bbox: &BBox) -> Option<PixelBox> {
    let max_x = self.src_width as f32;
    let max_y = self.src_height as f32;
    let x = |v: f32| ((v - self.pad_x) / self.scale_x).clamp(0.0, max_x).round() as i32;
    let y = |v: f32| ((v - self.pad_y) / self.scale_y).clamp(0.0, max_y).round() as i32;

    let restored = PixelBox {
      left: x(bbox.left),
      top: y(bbox.top),
      right: x(bbox.right),
      bottom: y(bbox.bottom),
    };

    (restored.width() > 0 && restored.height() > 0).then_some(restored)
  }
}

fn check_sizes(
  src_width: u32,
  src_height: u32,
  dst_width: u32,
  dst_height: u32,
) -> Result<(), ConfigError> {
  if src_width == 0 || src_height == 0 {
    return Err(ConfigError::ImageSize {
      width: src_width,
      height: src_height,
    });
  }
  if dst_width == 0 || dst_height == 0 {
    return Err(ConfigError::InputSize {
      width: dst_width,
      height: dst_height,
    });
  }
  Ok(())
}

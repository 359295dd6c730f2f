// 该文件是 Beifeng （北风） 项目的一部分。
// src/frame.rs - NHWC 帧定义
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

use crate::postprocess::Letterbox;

const RGB_CHANNELS: usize = 3;

pub trait AsNhwcFrame {
  fn as_nhwc(&self) -> &[u8];
}

/// 已经缩放到模型输入尺寸的帧，附带预处理变换用于还原坐标
pub trait PreparedFrame: AsNhwcFrame {
  fn letterbox(&self) -> &Letterbox;
}

/// 按 HWC 排列的 RGB 数据
#[derive(Debug, Clone)]
pub struct RgbNhwcFrame {
  data: Box<[u8]>,
}

impl RgbNhwcFrame {
  pub fn with_shape(height: usize, width: usize) -> Self {
    Self {
      data: vec![0u8; RGB_CHANNELS * width * height].into_boxed_slice(),
    }
  }

  /// 数据长度必须为 `height * width * 3`
  pub fn from_raw(height: usize, width: usize, data: Vec<u8>) -> Option<Self> {
    (data.len() == RGB_CHANNELS * width * height).then(|| Self {
      data: data.into_boxed_slice(),
    })
  }
}

impl AsNhwcFrame for RgbNhwcFrame {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

#[derive(Debug, Clone)]
pub struct LetterboxedFrame {
  pub frame: RgbNhwcFrame,
  pub letterbox: Letterbox,
}

impl AsNhwcFrame for LetterboxedFrame {
  fn as_nhwc(&self) -> &[u8] {
    self.frame.as_nhwc()
  }
}

impl PreparedFrame for LetterboxedFrame {
  fn letterbox(&self) -> &Letterbox {
    &self.letterbox
  }
}

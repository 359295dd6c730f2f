// 该文件是 Beifeng （北风） 项目的一部分。
// src/postprocess/tensor.rs - 原始输出张量
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

use serde::{Deserialize, Serialize};

/// 反量化参数：`real = (raw - zero_point) * scale`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantization {
  pub scale: f32,
  pub zero_point: i32,
}

impl Default for Quantization {
  fn default() -> Self {
    Quantization {
      scale: 1.0,
      zero_point: 0,
    }
  }
}

impl Quantization {
  pub fn new(scale: f32, zero_point: i32) -> Self {
    Quantization { scale, zero_point }
  }

  #[inline]
  pub fn dequantize(&self, raw: i32) -> f32 {
    (raw - self.zero_point) as f32 * self.scale
  }
}

/// 张量数据，借用自推理运行时的输出缓冲区
#[derive(Debug, Clone, Copy)]
pub enum TensorData<'a> {
  I8(&'a [i8]),
  U8(&'a [u8]),
  F32(&'a [f32]),
}

impl TensorData<'_> {
  pub fn len(&self) -> usize {
    match self {
      TensorData::I8(data) => data.len(),
      TensorData::U8(data) => data.len(),
      TensorData::F32(data) => data.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn is_quantized(&self) -> bool {
    !matches!(self, TensorData::F32(_))
  }
}

/// 单个检测头的原始输出
#[derive(Debug, Clone)]
pub struct RawOutputTensor<'a> {
  pub shape: Vec<usize>,
  pub data: TensorData<'a>,
  /// 仅对整数数据生效
  pub quantization: Quantization,
}

impl<'a> RawOutputTensor<'a> {
  pub fn float(shape: Vec<usize>, data: &'a [f32]) -> Self {
    RawOutputTensor {
      shape,
      data: TensorData::F32(data),
      quantization: Quantization::default(),
    }
  }

  /// 运行时只给出数据、不给出维度时使用，形状记为 `[len]`
  pub fn flat(data: &'a [f32]) -> Self {
    RawOutputTensor::float(vec![data.len()], data)
  }

  pub fn int8(shape: Vec<usize>, data: &'a [i8], quantization: Quantization) -> Self {
    RawOutputTensor {
      shape,
      data: TensorData::I8(data),
      quantization,
    }
  }

  pub fn uint8(shape: Vec<usize>, data: &'a [u8], quantization: Quantization) -> Self {
    RawOutputTensor {
      shape,
      data: TensorData::U8(data),
      quantization,
    }
  }

  pub fn element_count(&self) -> usize {
    self.shape.iter().product()
  }

  /// 将整个张量一次性转换为浮点数，写入 `out`（会先清空）
  pub fn dequantize_into(&self, out: &mut Vec<f32>) {
    out.clear();
    out.reserve(self.data.len());
    let q = self.quantization;
    match self.data {
      TensorData::I8(data) => out.extend(data.iter().map(|&v| q.dequantize(i32::from(v)))),
      TensorData::U8(data) => out.extend(data.iter().map(|&v| q.dequantize(i32::from(v)))),
      TensorData::F32(data) => out.extend_from_slice(data),
    }
  }
}

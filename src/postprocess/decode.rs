// 该文件是 Beifeng （北风） 项目的一部分。
// src/postprocess/decode.rs - 张量解码
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

use thiserror::Error;
use tracing::{debug, error};

use super::{
  params::{HeadParams, PipelineParams, TensorLayout},
  tensor::RawOutputTensor,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
  #[error("输出张量数量不匹配: 期望 {expected}, 实际 {actual}")]
  TensorCount { expected: usize, actual: usize },
  #[error(
    "检测头 {head}: 输出大小不匹配, 期望形状 {expected_shape:?} ({expected} 个元素), 实际形状 {actual_shape:?} ({actual} 个元素)"
  )]
  ElementCount {
    head: usize,
    expected_shape: Vec<usize>,
    actual_shape: Vec<usize>,
    expected: usize,
    actual: usize,
  },
}

/// 一个检测头解码后的平行数组，下标为 `cell * slots + slot`
#[derive(Debug, Clone)]
pub struct DecodedHead {
  pub head: usize,
  pub grid_width: usize,
  pub slots: usize,
  pub class_count: usize,
  pub box_deltas: Vec<[f32; 4]>,
  /// 没有 objectness 通道时全部为 1.0
  pub objectness: Vec<f32>,
  /// 长度为 `entries * class_count`
  pub class_scores: Vec<f32>,
}

impl DecodedHead {
  pub fn entries(&self) -> usize {
    self.objectness.len()
  }

  pub fn class_scores_of(&self, entry: usize) -> &[f32] {
    &self.class_scores[entry * self.class_count..(entry + 1) * self.class_count]
  }

  /// 返回 `(row, col, slot)`
  pub fn position(&self, entry: usize) -> (usize, usize, usize) {
    let cell = entry / self.slots;
    (cell / self.grid_width, cell % self.grid_width, entry % self.slots)
  }
}

/// 解码单个检测头。`scratch` 用于存放反量化后的整张量，可在多个检测头之间复用。
pub fn decode_head(
  head_index: usize,
  head: &HeadParams,
  params: &PipelineParams,
  tensor: &RawOutputTensor,
  scratch: &mut Vec<f32>,
) -> Result<DecodedHead, DecodeError> {
  let arch = &params.architecture;
  let class_count = params.class_count;
  let channels = arch.channels(class_count);
  let slots = head.slots();
  let cells = head.cells();
  let depth = slots * channels;
  let expected = cells * depth;
  let actual = tensor.data.len();

  if actual != expected || tensor.element_count() != actual {
    let expected_shape = params.head_shape(head);
    error!(
      "检测头 {}: 输出大小不匹配 - 期望形状 {:?}, 实际形状 {:?}, 数据长度 {}",
      head_index, expected_shape, tensor.shape, actual
    );
    return Err(DecodeError::ElementCount {
      head: head_index,
      expected_shape,
      actual_shape: tensor.shape.clone(),
      expected,
      actual,
    });
  }

  debug!(
    "检测头 {}: 网格 {}x{}, 槽位 {}, 通道 {}, 量化 {}",
    head_index,
    head.grid_height,
    head.grid_width,
    slots,
    channels,
    tensor.data.is_quantized()
  );

  // 先整体反量化一次，后面只处理浮点数
  tensor.dequantize_into(scratch);
  let values = scratch.as_slice();

  let index_of = |cell: usize, slot: usize, channel: usize| -> usize {
    let k = slot * channels + channel;
    match arch.layout {
      TensorLayout::ChannelsFirst => k * cells + cell,
      TensorLayout::ChannelsLast => cell * depth + k,
    }
  };

  let entries = cells * slots;
  let class_offset = 4 + usize::from(arch.objectness);
  let mut box_deltas = Vec::with_capacity(entries);
  let mut objectness = Vec::with_capacity(entries);
  let mut class_scores = Vec::with_capacity(entries * class_count);

  for cell in 0..cells {
    for slot in 0..slots {
      box_deltas.push([
        values[index_of(cell, slot, 0)],
        values[index_of(cell, slot, 1)],
        values[index_of(cell, slot, 2)],
        values[index_of(cell, slot, 3)],
      ]);
      objectness.push(if arch.objectness {
        values[index_of(cell, slot, 4)]
      } else {
        1.0
      });
      class_scores.extend((0..class_count).map(|c| values[index_of(cell, slot, class_offset + c)]));
    }
  }

  Ok(DecodedHead {
    head: head_index,
    grid_width: head.grid_width,
    slots,
    class_count,
    box_deltas,
    objectness,
    class_scores,
  })
}

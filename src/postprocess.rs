// 该文件是 Beifeng （北风） 项目的一部分。
// src/postprocess.rs - YOLO 输出后处理
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

//! 原始输出张量 -> 解码 -> 候选框 -> 置信度过滤 -> NMS -> 坐标还原

use serde::Serialize;
use tracing::debug;

pub mod decode;
pub mod filter;
pub mod nms;
pub mod params;
pub mod rescale;
pub mod synth;
pub mod tensor;

pub use self::{
  decode::{DecodeError, DecodedHead},
  params::{
    Activation, Architecture, BoxEncoding, ConfigError, HeadParams, ParamsFileError, PipelineParams,
    TensorLayout,
  },
  rescale::Letterbox,
  synth::Candidate,
  tensor::{Quantization, RawOutputTensor, TensorData},
};

/// 浮点边界框 `[left, top, right, bottom]`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BBox {
  pub left: f32,
  pub top: f32,
  pub right: f32,
  pub bottom: f32,
}

impl BBox {
  pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
    BBox {
      left: cx - w / 2.0,
      top: cy - h / 2.0,
      right: cx + w / 2.0,
      bottom: cy + h / 2.0,
    }
  }

  pub fn width(&self) -> f32 {
    (self.right - self.left).max(0.0)
  }

  pub fn height(&self) -> f32 {
    (self.bottom - self.top).max(0.0)
  }

  pub fn area(&self) -> f32 {
    self.width() * self.height()
  }
}

/// 原始图像中的整数像素边界框
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixelBox {
  pub left: i32,
  pub top: i32,
  pub right: i32,
  pub bottom: i32,
}

impl PixelBox {
  pub fn width(&self) -> i32 {
    self.right - self.left
  }

  pub fn height(&self) -> i32 {
    self.bottom - self.top
  }
}

/// 最终检测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  pub bbox: PixelBox,
  pub class_id: usize,
  pub score: f32,
}

/// 后处理器。参数在构造时校验一次，之后只读，可在多个线程之间共享；
/// 每次调用 [`PostProcessor::process`] 都使用独立分配的工作缓冲区。
#[derive(Debug, Clone)]
pub struct PostProcessor {
  params: PipelineParams,
}

impl PostProcessor {
  pub fn new(params: PipelineParams) -> Result<Self, ConfigError> {
    params.validate()?;
    Ok(PostProcessor { params })
  }

  pub fn params(&self) -> &PipelineParams {
    &self.params
  }

  /// 解码并激活所有检测头，张量数量必须与检测头数量一致
  pub fn decode(&self, tensors: &[RawOutputTensor]) -> Result<Vec<DecodedHead>, DecodeError> {
    let params = &self.params;
    if tensors.len() != params.heads.len() {
      return Err(DecodeError::TensorCount {
        expected: params.heads.len(),
        actual: tensors.len(),
      });
    }

    let mut scratch = Vec::new();
    params
      .heads
      .iter()
      .zip(tensors)
      .enumerate()
      .map(|(index, (head, tensor))| {
        let mut decoded = decode::decode_head(index, head, params, tensor, &mut scratch)?;
        synth::activate(&mut decoded, &params.architecture);
        Ok(decoded)
      })
      .collect()
  }

  /// 为所有检测头生成候选框，序号按 (检测头, 行, 列, 锚框) 递增
  pub fn candidates<'a>(&self, decoded: &'a [DecodedHead]) -> Vec<Candidate<'a>> {
    let mut candidates = Vec::with_capacity(decoded.iter().map(DecodedHead::entries).sum());
    let mut order_base = 0;
    for (head, params) in decoded.iter().zip(&self.params.heads) {
      synth::synthesize(
        head,
        params,
        self.params.architecture.encoding,
        order_base,
        &mut candidates,
      );
      order_base += head.entries();
    }
    candidates
  }

  /// 置信度过滤 + NMS + 数量上限，结果按分数降序
  pub fn select<'a>(&self, candidates: Vec<Candidate<'a>>) -> Vec<Candidate<'a>> {
    let total = candidates.len();
    let filtered = filter::filter_by_confidence(candidates, self.params.confidence_threshold);
    let filtered_len = filtered.len();
    let mut kept = nms::non_max_suppression(
      filtered,
      self.params.iou_threshold,
      self.params.class_agnostic,
    );
    if let Some(max) = self.params.max_detections {
      kept.truncate(max);
    }
    debug!(
      "候选框 {} 个, 过滤后 {} 个, NMS 后 {} 个",
      total,
      filtered_len,
      kept.len()
    );
    kept
  }

  /// 完整后处理流程
  pub fn process(
    &self,
    tensors: &[RawOutputTensor],
    letterbox: &Letterbox,
  ) -> Result<Vec<Detection>, DecodeError> {
    let decoded = self.decode(tensors)?;
    let kept = self.select(self.candidates(&decoded));

    let detections: Vec<Detection> = kept
      .iter()
      .filter_map(|candidate| {
        letterbox.restore(&candidate.bbox).map(|bbox| Detection {
          bbox,
          class_id: candidate.class_id,
          score: candidate.score,
        })
      })
      .collect();

    debug!("检测到 {} 个物体", detections.len());
    Ok(detections)
  }
}

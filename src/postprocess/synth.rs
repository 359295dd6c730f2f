// 该文件是 Beifeng （北风） 项目的一部分。
// src/postprocess/synth.rs - 由网格预测生成候选框
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

use super::{
  BBox,
  decode::DecodedHead,
  params::{Activation, Architecture, BoxEncoding, HeadParams},
};

/// 过滤与 NMS 之前的单个候选框
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<'a> {
  /// 模型输入像素坐标
  pub bbox: BBox,
  pub objectness: f32,
  /// 激活后的各类别分数
  pub class_scores: &'a [f32],
  pub class_id: usize,
  /// objectness × 最大类别分数
  pub score: f32,
  /// 全局解码顺序，用于稳定的并列排序
  pub order: usize,
}

/// 就地对解码结果应用激活函数。边框通道中哪些需要激活由编码方式决定。
pub fn activate(head: &mut DecodedHead, arch: &Architecture) {
  if arch.activation == Activation::Identity {
    return;
  }
  let act = arch.activation;

  if arch.objectness {
    head.objectness.iter_mut().for_each(|v| *v = act.apply(*v));
  }
  head.class_scores.iter_mut().for_each(|v| *v = act.apply(*v));

  let activated = match arch.encoding {
    BoxEncoding::Yolov3 => 2,
    BoxEncoding::Yolov5 => 4,
    BoxEncoding::Ltrb => 0,
  };
  for deltas in head.box_deltas.iter_mut() {
    for v in deltas.iter_mut().take(activated) {
      *v = act.apply(*v);
    }
  }
}

/// 为检测头的每个网格单元、每个锚框生成一个候选框，追加到 `out`。
/// `order_base` 为该检测头第一个候选框的全局序号。
pub fn synthesize<'a>(
  decoded: &'a DecodedHead,
  head: &HeadParams,
  encoding: BoxEncoding,
  order_base: usize,
  out: &mut Vec<Candidate<'a>>,
) {
  let stride = head.stride;
  out.reserve(decoded.entries());

  for entry in 0..decoded.entries() {
    let (row, col, slot) = decoded.position(entry);
    let anchor = head.anchors.get(slot).copied().unwrap_or([stride, stride]);
    let bbox = decode_box(
      encoding,
      decoded.box_deltas[entry],
      row as f32,
      col as f32,
      stride,
      anchor,
    );

    let class_scores = decoded.class_scores_of(entry);
    let (class_id, best) = argmax(class_scores);
    let objectness = decoded.objectness[entry];
    let score = (objectness * best).clamp(0.0, 1.0);

    out.push(Candidate {
      bbox,
      objectness,
      class_scores,
      class_id,
      score,
      order: order_base + entry,
    });
  }
}

fn decode_box(
  encoding: BoxEncoding,
  [d0, d1, d2, d3]: [f32; 4],
  row: f32,
  col: f32,
  stride: f32,
  [anchor_w, anchor_h]: [f32; 2],
) -> BBox {
  match encoding {
    BoxEncoding::Yolov3 => {
      let cx = (col + d0) * stride;
      let cy = (row + d1) * stride;
      let w = anchor_w * d2.exp();
      let h = anchor_h * d3.exp();
      BBox::from_center(cx, cy, w, h)
    }
    BoxEncoding::Yolov5 => {
      let cx = (col + d0 * 2.0 - 0.5) * stride;
      let cy = (row + d1 * 2.0 - 0.5) * stride;
      let w = anchor_w * (d2 * 2.0).powi(2);
      let h = anchor_h * (d3 * 2.0).powi(2);
      BBox::from_center(cx, cy, w, h)
    }
    BoxEncoding::Ltrb => {
      let grid_x = col + 0.5;
      let grid_y = row + 0.5;
      BBox {
        left: (grid_x - d0) * stride,
        top: (grid_y - d1) * stride,
        right: (grid_x + d2) * stride,
        bottom: (grid_y + d3) * stride,
      }
    }
  }
}

/// 最大值及其下标，相同时取前者
fn argmax(scores: &[f32]) -> (usize, f32) {
  let mut best = f32::NEG_INFINITY;
  let mut index = 0;
  for (i, &v) in scores.iter().enumerate() {
    if v > best {
      best = v;
      index = i;
    }
  }
  (index, best)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::postprocess::params::{TensorLayout, sigmoid};

  fn head_params(anchors: Vec<[f32; 2]>) -> HeadParams {
    HeadParams {
      stride: 8.0,
      grid_height: 2,
      grid_width: 3,
      anchors,
    }
  }

  fn decoded(slots: usize, deltas: [f32; 4], objectness: f32, classes: &[f32]) -> DecodedHead {
    let entries = 6 * slots;
    DecodedHead {
      head: 0,
      grid_width: 3,
      slots,
      class_count: classes.len(),
      box_deltas: vec![deltas; entries],
      objectness: vec![objectness; entries],
      class_scores: classes.repeat(entries),
    }
  }

  fn arch(encoding: BoxEncoding, activation: Activation) -> Architecture {
    Architecture {
      encoding,
      layout: TensorLayout::ChannelsFirst,
      objectness: true,
      activation,
    }
  }

  #[test]
  fn yolov3_center_uses_sigmoid_offset() {
    let mut head = decoded(1, [0.0, 0.0, 0.0, 0.0], 0.0, &[0.0, 2.0]);
    let arch = arch(BoxEncoding::Yolov3, Activation::Sigmoid);
    activate(&mut head, &arch);
    let params = head_params(vec![]);
    let mut out = Vec::new();
    synthesize(&head, &params, arch.encoding, 10, &mut out);

    assert_eq!(out.len(), 6);
    // entry 5 -> row 1, col 2；中心 ((2 + 0.5) * 8, (1 + 0.5) * 8)，尺寸为步长
    let c = &out[5];
    assert_eq!(c.bbox, BBox::from_center(20.0, 12.0, 8.0, 8.0));
    assert_eq!(c.order, 15);
    assert_eq!(c.class_id, 1);
    assert!((c.objectness - 0.5).abs() < 1e-6);
    assert!((c.score - 0.5 * sigmoid(2.0)).abs() < 1e-6);
  }

  #[test]
  fn yolov5_uses_anchor_geometry() {
    let head = decoded(2, [0.5, 0.5, 0.5, 0.5], 0.9, &[0.2, 0.8]);
    let params = head_params(vec![[10.0, 13.0], [16.0, 30.0]]);
    let mut out = Vec::new();
    synthesize(&head, &params, BoxEncoding::Yolov5, 0, &mut out);

    // entry 1 -> cell 0, slot 1；中心 (0 + 1 - 0.5) * 8 = 4，尺寸 = 锚框 * 1
    assert_eq!(out[1].bbox, BBox::from_center(4.0, 4.0, 16.0, 30.0));
    assert_eq!(out[1].class_id, 1);
    assert!((out[1].score - 0.72).abs() < 1e-6);
  }

  #[test]
  fn ltrb_distances_from_cell_center() {
    let head = decoded(1, [1.0, 0.5, 2.0, 1.5], 1.0, &[1.0]);
    let params = head_params(vec![]);
    let mut out = Vec::new();
    synthesize(&head, &params, BoxEncoding::Ltrb, 0, &mut out);
    // entry 4 -> row 1, col 1；中心 (1.5, 1.5)
    assert_eq!(
      out[4].bbox,
      BBox {
        left: 4.0,
        top: 8.0,
        right: 28.0,
        bottom: 24.0
      }
    );
  }

  #[test]
  fn tie_in_class_scores_keeps_first() {
    assert_eq!(argmax(&[0.3, 0.7, 0.7]), (1, 0.7));
    assert_eq!(argmax(&[f32::NAN, 0.1]), (1, 0.1));
  }

  #[test]
  fn identity_activation_leaves_values() {
    let mut head = decoded(1, [0.1, 0.2, 0.3, 0.4], 0.6, &[0.5]);
    activate(&mut head, &arch(BoxEncoding::Yolov5, Activation::Identity));
    assert_eq!(head.box_deltas[0], [0.1, 0.2, 0.3, 0.4]);
    assert_eq!(head.objectness[0], 0.6);
  }
}

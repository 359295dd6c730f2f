// 该文件是 Beifeng （北风） 项目的一部分。
// src/postprocess/nms.rs - 非极大值抑制
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

use super::{BBox, synth::Candidate};

/// 两个边界框的 IoU，不相交或面积退化时为 0
pub fn iou(a: &BBox, b: &BBox) -> f32 {
  let x1 = a.left.max(b.left);
  let y1 = a.top.max(b.top);
  let x2 = a.right.min(b.right);
  let y2 = a.bottom.min(b.bottom);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = a.area() + b.area() - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 贪心 NMS。
///
/// 按分数降序稳定排序（分数相同保持解码顺序），依次保留最高者，
/// 并抑制之后与其 IoU 不小于 `iou_threshold` 的同类候选框
/// （`class_agnostic` 时不区分类别）。因此任意两个保留下来的同类框 IoU 都严格小于阈值。
/// 返回结果按分数降序排列。
pub fn non_max_suppression<'a>(
  mut candidates: Vec<Candidate<'a>>,
  iou_threshold: f32,
  class_agnostic: bool,
) -> Vec<Candidate<'a>> {
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.order.cmp(&b.order)));

  let mut suppressed = vec![false; candidates.len()];

  for i in 0..candidates.len() {
    if suppressed[i] {
      continue;
    }
    let best = &candidates[i];
    for j in (i + 1)..candidates.len() {
      if suppressed[j] {
        continue;
      }
      let other = &candidates[j];
      if !class_agnostic && other.class_id != best.class_id {
        continue;
      }
      if iou(&best.bbox, &other.bbox) >= iou_threshold {
        suppressed[j] = true;
      }
    }
  }

  candidates
    .into_iter()
    .zip(suppressed)
    .filter_map(|(candidate, suppressed)| (!suppressed).then_some(candidate))
    .collect()
}

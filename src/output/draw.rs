// 该文件是 Beifeng （北风） 项目的一部分。
// src/output/draw.rs - 检测结果可视化与记录
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

use image::{Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use serde::Serialize;

use crate::{label::Labels, postprocess::Detection};

const BOX_THICKNESS: i32 = 2;
const BOX_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色

pub struct Draw {
  thickness: i32,
  color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      thickness: BOX_THICKNESS,
      color: BOX_COLOR,
    }
  }
}

impl Draw {
  /// 在原始图像上绘制检测框（向内加粗）
  pub fn draw_detections(&self, image: &mut RgbImage, detections: &[Detection]) {
    for detection in detections {
      let bbox = detection.bbox;
      for t in 0..self.thickness {
        let width = bbox.width() - 2 * t;
        let height = bbox.height() - 2 * t;
        if width <= 0 || height <= 0 {
          break;
        }
        let rect = Rect::at(bbox.left + t, bbox.top + t).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(image, rect, Rgb(self.color));
      }
    }
  }
}

#[derive(Serialize)]
struct RecordItem<'a> {
  label: &'a str,
  #[serde(flatten)]
  detection: &'a Detection,
}

/// 将检测结果记录为 JSON
pub struct Record<'a> {
  pub labels: &'a Labels,
}

impl Record<'_> {
  pub fn to_json(&self, detections: &[Detection]) -> serde_json::Result<String> {
    let items: Vec<RecordItem> = detections
      .iter()
      .map(|detection| RecordItem {
        label: self.labels.name(detection.class_id),
        detection,
      })
      .collect();
    serde_json::to_string_pretty(&items)
  }
}

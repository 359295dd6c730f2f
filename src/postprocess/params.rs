// 该文件是 Beifeng （北风） 项目的一部分。
// src/postprocess/params.rs - 后处理参数
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

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ParamsFileError {
  #[error("无法读取参数文件 {}: {source}", .path.display())]
  IoError {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("无法解析参数文件 {}: {source}", .path.display())]
  ParseError {
    path: PathBuf,
    source: serde_json::Error,
  },
}

/// 参数校验错误，只会在构造后处理器时出现
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
  #[error("阈值 {name} 必须位于 [0, 1] 区间内, 实际为 {value}")]
  Threshold { name: &'static str, value: f32 },
  #[error("类别数量不能为 0")]
  ZeroClassCount,
  #[error("模型输入尺寸无效: {width}x{height}")]
  InputSize { width: u32, height: u32 },
  #[error("原始图像尺寸无效: {width}x{height}")]
  ImageSize { width: u32, height: u32 },
  #[error("至少需要一个检测头")]
  NoHeads,
  #[error("检测头 {head} 参数无效: {reason}")]
  InvalidHead { head: usize, reason: String },
  #[error("检测头 {head} 使用 {encoding:?} 编码, 但锚框集合为空")]
  EmptyAnchors { head: usize, encoding: BoxEncoding },
  #[error("检测头 {head} 使用无锚框编码 {encoding:?}, 但配置了 {count} 个锚框")]
  UnexpectedAnchors {
    head: usize,
    encoding: BoxEncoding,
    count: usize,
  },
  #[error("检测头 {head} 的第 {anchor} 个锚框尺寸无效: {size:?}")]
  InvalidAnchor {
    head: usize,
    anchor: usize,
    size: [f32; 2],
  },
  #[error("最大检测数量不能为 0")]
  ZeroMaxDetections,
}

/// 边框参数的编码方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoxEncoding {
  /// 中心 `(c + act(dx)) * s`，尺寸 `anchor * exp(dw)`；无锚框时以步长代替锚框
  Yolov3,
  /// 中心 `(c + 2 * act(dx) - 0.5) * s`，尺寸 `anchor * (2 * act(dw))^2`
  Yolov5,
  /// 无锚框，四个通道为网格中心到左、上、右、下边的距离（以步长为单位）
  Ltrb,
}

impl BoxEncoding {
  pub fn requires_anchors(self) -> bool {
    matches!(self, BoxEncoding::Yolov5)
  }

  pub fn forbids_anchors(self) -> bool {
    matches!(self, BoxEncoding::Ltrb)
  }
}

/// 输出张量中通道所在的维度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorLayout {
  /// `[slots * channels, H, W]`，RKNN 的 NCHW 输出
  ChannelsFirst,
  /// `[H, W, slots * channels]`
  ChannelsLast,
}

/// 模型输出值是否还需要经过激活函数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
  /// 输出为 logits，需要 sigmoid
  Sigmoid,
  /// 模型内部已经完成激活
  Identity,
}

impl Activation {
  #[inline]
  pub fn apply(self, x: f32) -> f32 {
    match self {
      Activation::Sigmoid => sigmoid(x),
      Activation::Identity => x,
    }
  }
}

#[inline]
pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 所有检测头共享的结构描述
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Architecture {
  pub encoding: BoxEncoding,
  pub layout: TensorLayout,
  /// 是否存在独立的 objectness 通道
  pub objectness: bool,
  pub activation: Activation,
}

impl Architecture {
  /// 单个锚框槽位的通道数：4 个边框通道 + objectness + 类别
  pub fn channels(&self, class_count: usize) -> usize {
    4 + usize::from(self.objectness) + class_count
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadParams {
  pub stride: f32,
  pub grid_height: usize,
  pub grid_width: usize,
  /// 锚框 `[w, h]`，单位为模型输入像素；无锚框检测头为空
  #[serde(default)]
  pub anchors: Vec<[f32; 2]>,
}

impl HeadParams {
  pub fn cells(&self) -> usize {
    self.grid_height * self.grid_width
  }

  /// 每个网格单元的预测槽位数
  pub fn slots(&self) -> usize {
    self.anchors.len().max(1)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineParams {
  pub input_width: u32,
  pub input_height: u32,
  pub class_count: usize,
  pub confidence_threshold: f32,
  pub iou_threshold: f32,
  /// 为 true 时 NMS 不区分类别
  #[serde(default)]
  pub class_agnostic: bool,
  #[serde(default)]
  pub max_detections: Option<usize>,
  pub architecture: Architecture,
  pub heads: Vec<HeadParams>,
}

const COCO_CLASS_NUM: usize = 80;

impl PipelineParams {
  /// RKNN 模型库中 YOLOv5s (640x640, COCO) 的参数。
  /// 模型输出已完成 sigmoid，因此激活为 `Identity`；运行时读取浮点输出。
  pub fn yolov5_coco() -> Self {
    PipelineParams {
      input_width: 640,
      input_height: 640,
      class_count: COCO_CLASS_NUM,
      confidence_threshold: 0.25,
      iou_threshold: 0.45,
      class_agnostic: false,
      max_detections: Some(64),
      architecture: Architecture {
        encoding: BoxEncoding::Yolov5,
        layout: TensorLayout::ChannelsFirst,
        objectness: true,
        activation: Activation::Identity,
      },
      heads: vec![
        HeadParams {
          stride: 8.0,
          grid_height: 80,
          grid_width: 80,
          anchors: vec![[10.0, 13.0], [16.0, 30.0], [33.0, 23.0]],
        },
        HeadParams {
          stride: 16.0,
          grid_height: 40,
          grid_width: 40,
          anchors: vec![[30.0, 61.0], [62.0, 45.0], [59.0, 119.0]],
        },
        HeadParams {
          stride: 32.0,
          grid_height: 20,
          grid_width: 20,
          anchors: vec![[116.0, 90.0], [156.0, 198.0], [373.0, 326.0]],
        },
      ],
    }
  }

  /// YOLOv3-Tiny (416x416, COCO)，输出为 logits
  pub fn yolov3_tiny_coco() -> Self {
    PipelineParams {
      input_width: 416,
      input_height: 416,
      class_count: COCO_CLASS_NUM,
      confidence_threshold: 0.2,
      iou_threshold: 0.45,
      class_agnostic: false,
      max_detections: None,
      architecture: Architecture {
        encoding: BoxEncoding::Yolov3,
        layout: TensorLayout::ChannelsFirst,
        objectness: true,
        activation: Activation::Sigmoid,
      },
      heads: vec![
        HeadParams {
          stride: 32.0,
          grid_height: 13,
          grid_width: 13,
          anchors: vec![[81.0, 82.0], [135.0, 169.0], [344.0, 319.0]],
        },
        HeadParams {
          stride: 16.0,
          grid_height: 26,
          grid_width: 26,
          anchors: vec![[23.0, 27.0], [37.0, 58.0], [81.0, 82.0]],
        },
      ],
    }
  }

  /// 从 JSON 读取参数，读取后仍需 [`PipelineParams::validate`]
  pub fn from_json_reader(reader: impl std::io::Read) -> serde_json::Result<Self> {
    serde_json::from_reader(reader)
  }

  pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ParamsFileError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| ParamsFileError::IoError {
      path: path.to_path_buf(),
      source,
    })?;
    let params = Self::from_json_reader(file).map_err(|source| ParamsFileError::ParseError {
      path: path.to_path_buf(),
      source,
    })?;
    info!("从 {} 加载后处理参数", path.display());
    Ok(params)
  }

  /// 未指定参数文件时使用 [`PipelineParams::yolov5_coco`]
  pub fn load(path: Option<&Path>) -> Result<Self, ParamsFileError> {
    match path {
      Some(path) => Self::from_json_file(path),
      None => {
        info!("使用 YOLOv5 COCO 默认参数");
        Ok(Self::yolov5_coco())
      }
    }
  }

  pub fn with_thresholds(mut self, confidence: f32, iou: f32) -> Self {
    self.confidence_threshold = confidence;
    self.iou_threshold = iou;
    self
  }

  pub fn with_class_agnostic(mut self, class_agnostic: bool) -> Self {
    self.class_agnostic = class_agnostic;
    self
  }

  /// 每个检测头期望的输出张量形状，顺序与 [`TensorLayout`] 一致
  pub fn head_shape(&self, head: &HeadParams) -> Vec<usize> {
    let depth = head.slots() * self.architecture.channels(self.class_count);
    match self.architecture.layout {
      TensorLayout::ChannelsFirst => vec![1, depth, head.grid_height, head.grid_width],
      TensorLayout::ChannelsLast => vec![1, head.grid_height, head.grid_width, depth],
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    check_threshold("confidence_threshold", self.confidence_threshold)?;
    check_threshold("iou_threshold", self.iou_threshold)?;

    if self.class_count == 0 {
      return Err(ConfigError::ZeroClassCount);
    }
    if self.input_width == 0 || self.input_height == 0 {
      return Err(ConfigError::InputSize {
        width: self.input_width,
        height: self.input_height,
      });
    }
    if self.max_detections == Some(0) {
      return Err(ConfigError::ZeroMaxDetections);
    }
    if self.heads.is_empty() {
      return Err(ConfigError::NoHeads);
    }

    let encoding = self.architecture.encoding;
    for (index, head) in self.heads.iter().enumerate() {
      if !(head.stride.is_finite() && head.stride > 0.0) {
        return Err(ConfigError::InvalidHead {
          head: index,
          reason: format!("步长必须为正数, 实际为 {}", head.stride),
        });
      }
      if head.cells() == 0 {
        return Err(ConfigError::InvalidHead {
          head: index,
          reason: format!(
            "网格尺寸不能为 0, 实际为 {}x{}",
            head.grid_height, head.grid_width
          ),
        });
      }
      if encoding.requires_anchors() && head.anchors.is_empty() {
        return Err(ConfigError::EmptyAnchors {
          head: index,
          encoding,
        });
      }
      if encoding.forbids_anchors() && !head.anchors.is_empty() {
        return Err(ConfigError::UnexpectedAnchors {
          head: index,
          encoding,
          count: head.anchors.len(),
        });
      }
      for (anchor, size) in head.anchors.iter().enumerate() {
        if !size.iter().all(|v| v.is_finite() && *v > 0.0) {
          return Err(ConfigError::InvalidAnchor {
            head: index,
            anchor,
            size: *size,
          });
        }
      }
    }

    Ok(())
  }
}

fn check_threshold(name: &'static str, value: f32) -> Result<(), ConfigError> {
  if (0.0..=1.0).contains(&value) {
    Ok(())
  } else {
    Err(ConfigError::Threshold { name, value })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn presets_are_valid() {
    assert_eq!(PipelineParams::yolov5_coco().validate(), Ok(()));
    assert_eq!(PipelineParams::yolov3_tiny_coco().validate(), Ok(()));
  }

  #[test]
  fn threshold_out_of_range_is_rejected() {
    let params = PipelineParams::yolov5_coco().with_thresholds(1.5, 0.45);
    assert!(matches!(
      params.validate(),
      Err(ConfigError::Threshold {
        name: "confidence_threshold",
        ..
      })
    ));

    let params = PipelineParams::yolov5_coco().with_thresholds(0.25, f32::NAN);
    assert!(matches!(
      params.validate(),
      Err(ConfigError::Threshold {
        name: "iou_threshold",
        ..
      })
    ));
  }

  #[test]
  fn anchor_based_head_needs_anchors() {
    let mut params = PipelineParams::yolov5_coco();
    params.heads[1].anchors.clear();
    assert_eq!(
      params.validate(),
      Err(ConfigError::EmptyAnchors {
        head: 1,
        encoding: BoxEncoding::Yolov5
      })
    );
  }

  #[test]
  fn distance_head_rejects_anchors() {
    let mut params = PipelineParams::yolov5_coco();
    params.architecture.encoding = BoxEncoding::Ltrb;
    assert!(matches!(
      params.validate(),
      Err(ConfigError::UnexpectedAnchors { head: 0, count: 3, .. })
    ));
  }

  #[test]
  fn head_shape_follows_layout() {
    let mut params = PipelineParams::yolov5_coco();
    assert_eq!(params.head_shape(&params.heads[0]), vec![1, 255, 80, 80]);
    params.architecture.layout = TensorLayout::ChannelsLast;
    assert_eq!(params.head_shape(&params.heads[2]), vec![1, 20, 20, 255]);
  }

  #[test]
  fn params_load_from_json() {
    let json = r#"{
      "input_width": 320,
      "input_height": 320,
      "class_count": 2,
      "confidence_threshold": 0.5,
      "iou_threshold": 0.5,
      "architecture": {
        "encoding": "ltrb",
        "layout": "channels_last",
        "objectness": false,
        "activation": "sigmoid"
      },
      "heads": [{ "stride": 32.0, "grid_height": 10, "grid_width": 10 }]
    }"#;
    let params = PipelineParams::from_json_reader(json.as_bytes()).unwrap();
    assert!(!params.class_agnostic);
    assert_eq!(params.max_detections, None);
    assert_eq!(params.heads[0].slots(), 1);
    assert_eq!(params.validate(), Ok(()));
  }

  #[test]
  fn params_file_is_loaded_or_defaulted() {
    let path = std::env::temp_dir().join(format!("beifeng-params-{}.json", std::process::id()));
    let json = serde_json::to_string(&PipelineParams::yolov3_tiny_coco()).unwrap();
    std::fs::write(&path, json).unwrap();
    let loaded = PipelineParams::load(Some(path.as_path())).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(loaded.input_width, 416);
    assert_eq!(loaded.heads.len(), 2);

    assert_eq!(PipelineParams::load(None).unwrap().input_width, 640);
  }

  #[test]
  fn params_file_errors_name_the_file() {
    let missing = std::env::temp_dir().join("beifeng-params-missing.json");
    match PipelineParams::from_json_file(&missing) {
      Err(err @ ParamsFileError::IoError { .. }) => {
        assert!(err.to_string().contains("beifeng-params-missing.json"));
      }
      other => panic!("期望读取错误, 实际 {:?}", other.map(|p| p.input_width)),
    }

    let path = std::env::temp_dir().join(format!("beifeng-params-bad-{}.json", std::process::id()));
    std::fs::write(&path, "{ \"input_width\": ").unwrap();
    let result = PipelineParams::from_json_file(&path);
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(result, Err(ParamsFileError::ParseError { .. })));
  }
}

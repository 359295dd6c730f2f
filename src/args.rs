// 该文件是 Beifeng （北风） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use beifeng::postprocess::{ParamsFileError, PipelineParams};
use clap::Parser;
use url::Url;

/// Beifeng 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// RKNN 模型文件路径，例如 rknn:///data/yolov5s-640-640-rk3588.rknn
  #[arg(short, long, value_name = "MODEL")]
  pub model: Url,

  /// 输入图像，例如 image:///data/bus.jpg 或 image:///data/bus.jpg?letterbox=fit
  #[arg(short, long, value_name = "SOURCE")]
  pub input: Url,

  /// 标签文件，每行一个类别名称
  #[arg(short, long, value_name = "FILE")]
  pub labels: PathBuf,

  /// 输出图像路径，例如 image:///data/bus-yolov5-out.jpg
  #[arg(short, long, value_name = "OUTPUT")]
  pub output: Url,

  /// 后处理参数 JSON 文件，未指定时使用 YOLOv5 COCO 参数
  #[arg(long, value_name = "FILE")]
  pub params: Option<PathBuf>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub nms_threshold: Option<f32>,

  /// NMS 不区分类别
  #[arg(long)]
  pub class_agnostic: bool,

  /// 检测完成后的性能测试次数，0 表示跳过
  #[arg(long, default_value_t = beifeng::task::DEFAULT_BENCHMARK_COUNT, value_name = "COUNT")]
  pub benchmark: usize,
}

/// 读取参数文件（或预设），再用命令行覆盖阈值。校验在构造后处理器时进行。
pub fn load_params(args: &Args) -> Result<PipelineParams, ParamsFileError> {
  let params = PipelineParams::load(args.params.as_deref())?;
  let confidence = args.confidence.unwrap_or(params.confidence_threshold);
  let nms_threshold = args.nms_threshold.unwrap_or(params.iou_threshold);
  let class_agnostic = params.class_agnostic || args.class_agnostic;

  Ok(
    params
      .with_thresholds(confidence, nms_threshold)
      .with_class_agnostic(class_agnostic),
  )
}

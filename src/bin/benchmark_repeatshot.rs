// 该文件是 Beifeng （北风） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复推理性能测试
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use beifeng::{
  FromUrl,
  input::{ImageFileInput, ImageFrame},
  model::Detector,
  postprocess::PipelineParams,
  runtime::{RknnRuntime, RknnRuntimeBuilder},
  task::{BenchmarkTask, Task},
};
use tracing::info;

/// Beifeng 性能测试参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// RKNN 模型文件路径
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 后处理参数 JSON 文件
  #[arg(long, value_name = "FILE")]
  pub params: Option<PathBuf>,
  /// 重复次数
  #[arg(long, default_value_t = beifeng::task::DEFAULT_BENCHMARK_COUNT)]
  pub count: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);

  let params = PipelineParams::load(args.params.as_deref())?;
  let (width, height) = (params.input_width, params.input_height);

  let runtime = RknnRuntimeBuilder::from_url(&args.model)?.build(&params)?;
  let detector: Detector<RknnRuntime, ImageFrame> = Detector::new(runtime, params)?;
  let frames = ImageFileInput::from_url(&args.input)?.into_frames(width, height)?;

  let report = BenchmarkTask::new(args.count).run_task(frames, &detector)?;
  println!(
    "count={}, total={:.2?}, average={:.2?}, first={:.2?}, steady average={:.2?}",
    report.count, report.total, report.mean, report.first, report.steady_mean
  );

  Ok(())
}

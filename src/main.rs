// 该文件是 Beifeng （北风） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use beifeng::{
  FromUrl,
  input::{ImageFileInput, ImageFrame},
  label::Labels,
  model::Detector,
  output::SaveImageFileOutput,
  runtime::{RknnRuntime, RknnRuntimeBuilder},
  task::{BenchmarkTask, OneShotTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("标签文件: {}", args.labels.display());
  info!("输出路径: {}", args.output);

  let params = args::load_params(&args)?;
  let (width, height) = (params.input_width, params.input_height);

  let labels = Labels::from_file(&args.labels)?;
  labels.check_class_count(params.class_count);

  let runtime = RknnRuntimeBuilder::from_url(&args.model)?.build(&params)?;
  let detector: Detector<RknnRuntime, ImageFrame> = Detector::new(runtime, params)?;

  let frame = ImageFileInput::from_url(&args.input)?
    .into_frames(width, height)?
    .next()
    .ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;

  let output = SaveImageFileOutput::from_url(&args.output)?.with_labels(labels.clone());
  let result = OneShotTask::new(output).run_task(std::iter::once(frame.clone()), &detector)?;

  for item in result.items.iter() {
    println!(
      "{} @ ({} {} {} {}) {:.6}",
      labels.name(item.class_id),
      item.bbox.left,
      item.bbox.top,
      item.bbox.right,
      item.bbox.bottom,
      item.score
    );
  }

  if args.benchmark > 0 {
    BenchmarkTask::new(args.benchmark).measure(&frame, &detector)?;
  }

  info!("完成");
  Ok(())
}

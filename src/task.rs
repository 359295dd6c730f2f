// 该文件是 Beifeng （北风） 项目的一部分。
// src/task.rs - 推理任务与性能测试
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

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::{
  model::{DetectResult, Model},
  output::Render,
};

pub trait Task<I, M>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M) -> Result<Self::Output, Self::Error>;
}

impl<T: Model> Model for &T {
  type Input = T::Input;
  type Output = T::Output;
  type Error = T::Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (**self).infer(input)
  }
}

/// 对第一帧推理一次并渲染结果
pub struct OneShotTask<O> {
  output: O,
}

impl<O> OneShotTask<O> {
  pub fn new(output: O) -> Self {
    OneShotTask { output }
  }
}

impl<
  F,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = DetectResult, Error = ME>,
  O: Render<F, DetectResult, Error = RE>,
> Task<I, M> for OneShotTask<O>
{
  type Output = DetectResult;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M) -> Result<Self::Output, Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let result = model.infer(&frame)?;
    info!(
      "首次运行耗时: 推理 {:.2?}, 后处理 {:.2?}, 总计 {:.2?}",
      result.timing.inference,
      result.timing.postprocess,
      result.timing.total()
    );
    self.output.render_result(&frame, &result)?;
    info!("渲染完成");

    Ok(result)
  }
}

/// 性能测试结果。第一次运行包含内存分配、缓存预热等一次性开销，单独统计。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkReport {
  pub count: usize,
  pub total: Duration,
  pub first: Duration,
  pub mean: Duration,
  /// 去掉第一次运行后的平均值；只运行一次时等于 `first`
  pub steady_mean: Duration,
}

impl BenchmarkReport {
  pub fn from_samples(samples: &[Duration]) -> Option<Self> {
    let (&first, rest) = samples.split_first()?;
    let count = samples.len();
    let total: Duration = samples.iter().sum();
    let mean = mean_of(total, count)?;
    let steady_mean = if rest.is_empty() {
      first
    } else {
      mean_of(rest.iter().sum(), rest.len())?
    };

    Some(BenchmarkReport {
      count,
      total,
      first,
      mean,
      steady_mean,
    })
  }
}

/// 按纳秒求平均，样本数不受 `u32` 限制
fn mean_of(total: Duration, count: usize) -> Option<Duration> {
  let nanos = total.as_nanos().checked_div(u128::try_from(count).ok()?)?;
  Some(Duration::from_nanos(u64::try_from(nanos).ok()?))
}

pub const DEFAULT_BENCHMARK_COUNT: usize = 100;

/// 对同一帧重复推理 + 后处理，丢弃结果，只统计耗时
#[derive(Debug, Clone, Copy)]
pub struct BenchmarkTask {
  count: usize,
}

impl Default for BenchmarkTask {
  fn default() -> Self {
    BenchmarkTask {
      count: DEFAULT_BENCHMARK_COUNT,
    }
  }
}

impl BenchmarkTask {
  pub fn new(count: usize) -> Self {
    BenchmarkTask { count }
  }

  /// 在已有的帧上运行
  pub fn measure<F, D, ME, M>(self, frame: &F, model: M) -> anyhow::Result<BenchmarkReport>
  where
    ME: std::error::Error + Sync + Send + 'static,
    M: Model<Input = F, Output = D, Error = ME>,
  {
    if self.count == 0 {
      anyhow::bail!("性能测试次数不能为 0");
    }

    let mut times = Vec::with_capacity(self.count);
    for i in 0..self.count {
      let now = Instant::now();
      let result = model.infer(frame)?;
      let elapsed = now.elapsed();
      std::hint::black_box(result);
      debug!("({}) 推理完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
    }

    let report = BenchmarkReport::from_samples(&times)
      .ok_or_else(|| anyhow::anyhow!("没有性能测试样本"))?;

    warn!(
      "性能测试: 次数 {}, 总耗时 {:.2?}, 平均 {:.2?}, 首次 {:.2?}, 预热后平均 {:.2?}",
      report.count, report.total, report.mean, report.first, report.steady_mean
    );

    Ok(report)
  }
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
> Task<I, M> for BenchmarkTask
{
  type Output = BenchmarkReport;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M) -> Result<Self::Output, Self::Error> {
    info!("开始性能测试, 次数 {}", self.count);
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    self.measure(&frame, model)
  }
}

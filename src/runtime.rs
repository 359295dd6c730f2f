// 该文件是 Beifeng （北风） 项目的一部分。
// src/runtime.rs - 推理运行时接口
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

use tracing::warn;

use crate::postprocess::RawOutputTensor;

#[cfg(feature = "rknpu")]
mod rknn;
#[cfg(feature = "rknpu")]
pub use self::rknn::{RknnOutputs, RknnRuntime, RknnRuntimeBuilder, RknnRuntimeError};

/// 一次推理得到的输出张量集合，持有设备侧资源，用完需要释放
pub trait InferenceOutputs {
  type Error;

  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn tensor(&self, index: usize) -> Result<RawOutputTensor<'_>, Self::Error>;

  /// 释放输出缓冲区。调用多次时只有第一次生效。
  fn release(&mut self) -> Result<(), Self::Error>;
}

/// 推理运行时，输入为预处理后的模型输入缓冲区
pub trait InferenceRuntime {
  type Outputs: InferenceOutputs<Error = Self::Error>;
  type Error;

  fn run(&self, input: &[u8]) -> Result<Self::Outputs, Self::Error>;
}

/// 限定输出缓冲区的生命周期：成功路径上显式调用 [`OutputGuard::release`]，
/// 其余路径（包括提前返回错误）在析构时释放。
pub struct OutputGuard<O: InferenceOutputs> {
  outputs: O,
  released: bool,
}

impl<O: InferenceOutputs> OutputGuard<O> {
  pub fn new(outputs: O) -> Self {
    OutputGuard {
      outputs,
      released: false,
    }
  }

  /// 取出所有张量
  pub fn tensors(&self) -> Result<Vec<RawOutputTensor<'_>>, O::Error> {
    (0..self.outputs.len()).map(|i| self.outputs.tensor(i)).collect()
  }

  pub fn release(mut self) -> Result<(), O::Error> {
    self.released = true;
    self.outputs.release()
  }
}

impl<O: InferenceOutputs> Drop for OutputGuard<O> {
  fn drop(&mut self) {
    if !self.released && self.outputs.release().is_err() {
      warn!("释放推理输出失败");
    }
  }
}

// 该文件是 Beifeng （北风） 项目的一部分。
// src/model.rs - 检测模型
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

use thiserror::Error;
use tracing::debug;

use crate::{
  frame::PreparedFrame,
  postprocess::{ConfigError, DecodeError, Detection, PipelineParams, PostProcessor},
  runtime::{InferenceRuntime, OutputGuard},
};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InferTiming {
  pub inference: Duration,
  pub postprocess: Duration,
}

impl InferTiming {
  pub fn total(&self) -> Duration {
    self.inference + self.postprocess
  }
}

#[derive(Debug, Clone)]
pub struct DetectResult {
  /// 按分数降序
  pub items: Box<[Detection]>,
  pub timing: InferTiming,
}

#[derive(Error, Debug)]
pub enum DetectError<E> {
  #[error("推理失败: {0}")]
  Runtime(E),
  #[error("后处理失败: {0}")]
  Decode(#[from] DecodeError),
  #[error("输入长度不匹配: 期望 {expected}, 实际 {actual}")]
  InputSize { expected: usize, actual: usize },
}

/// 推理运行时 + 后处理
pub struct Detector<R, Frame> {
  runtime: R,
  postprocessor: PostProcessor,
  _phantom: std::marker::PhantomData<Frame>,
}

impl<R: InferenceRuntime, Frame> Detector<R, Frame> {
  pub fn new(runtime: R, params: PipelineParams) -> Result<Self, ConfigError> {
    let postprocessor = PostProcessor::new(params)?;
    Ok(Detector {
      runtime,
      postprocessor,
      _phantom: std::marker::PhantomData,
    })
  }

  pub fn params(&self) -> &PipelineParams {
    self.postprocessor.params()
  }

  pub fn postprocessor(&self) -> &PostProcessor {
    &self.postprocessor
  }

  pub fn runtime(&self) -> &R {
    &self.runtime
  }
}

impl<R: InferenceRuntime, Frame: PreparedFrame> Model for Detector<R, Frame> {
  type Input = Frame;
  type Output = DetectResult;
  type Error = DetectError<R::Error>;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let params = self.params();
    let data = input.as_nhwc();
    let expected = params.input_width as usize * params.input_height as usize * 3;
    if data.len() != expected {
      return Err(DetectError::InputSize {
        expected,
        actual: data.len(),
      });
    }

    let start = Instant::now();
    let outputs = OutputGuard::new(self.runtime.run(data).map_err(DetectError::Runtime)?);
    let inference = start.elapsed();

    // 出错提前返回时由 OutputGuard 释放输出
    let tensors = outputs.tensors().map_err(DetectError::Runtime)?;
    let items = self.postprocessor.process(&tensors, input.letterbox())?;
    drop(tensors);
    outputs.release().map_err(DetectError::Runtime)?;
    let postprocess = start.elapsed() - inference;

    debug!(
      "推理耗时: {:.2?}, 后处理耗时: {:.2?}",
      inference, postprocess
    );

    Ok(DetectResult {
      items: items.into_boxed_slice(),
      timing: InferTiming {
        inference,
        postprocess,
      },
    })
  }
}

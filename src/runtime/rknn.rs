// 该文件是 Beifeng （北风） 项目的一部分。
// src/runtime/rknn.rs - RKNN 推理运行时
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

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  postprocess::{PipelineParams, RawOutputTensor},
  runtime::{InferenceOutputs, InferenceRuntime},
};

const RKNN_NUM_INPUTS: u32 = 1;

#[derive(Error, Debug)]
pub enum RknnRuntimeError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(#[from] std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(#[from] rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("输出索引 {0} 超出范围")]
  OutputIndex(usize),
  #[error("输出已释放")]
  Released,
}

impl RknnRuntimeError {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    RknnRuntimeError::ModelInvalid(msg.to_string(), e)
  }
}

pub struct RknnRuntimeBuilder {
  model_path: String,
  flags: InitFlags,
}

impl FromUrlWithScheme for RknnRuntimeBuilder {
  const SCHEME: &'static str = "rknn";
}

impl FromUrl for RknnRuntimeBuilder {
  type Error = RknnRuntimeError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RknnRuntimeError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(RknnRuntimeBuilder {
      model_path: url.path().to_string(),
      flags: InitFlags::default(),
    })
  }
}

impl RknnRuntimeBuilder {
  /// 加载模型，并检查输入输出数量与后处理参数一致
  pub fn build(self, params: &PipelineParams) -> Result<RknnRuntime, RknnRuntimeError> {
    info!("加载模型文件: {}", self.model_path);
    let mode_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      mode_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&mode_data, self.flags)?;
    info!("模型加载完成");

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          info!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          info!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(RknnRuntimeError::invalid("无法查询 SDK 版本", e));
      }
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| RknnRuntimeError::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| RknnRuntimeError::invalid("无法获取输出数量", e))?;
    info!("模型输入数量: {}, 输出数量: {}", num_inputs, num_outputs);

    if num_inputs != RKNN_NUM_INPUTS {
      let msg = format!(
        "预期模型输入数量为 {}, 实际为 {}",
        RKNN_NUM_INPUTS, num_inputs
      );
      error!("{}", msg);
      return Err(RknnRuntimeError::invalid(&msg, rknpu::Error::InvalidModel));
    }

    if num_outputs as usize != params.heads.len() {
      let msg = format!(
        "预期模型输出数量为 {}, 实际为 {}",
        params.heads.len(),
        num_outputs
      );
      error!("{}", msg);
      return Err(RknnRuntimeError::invalid(&msg, rknpu::Error::InvalidModel));
    }

    for (index, head) in params.heads.iter().enumerate() {
      debug!("输出 {}: 期望形状 {:?}", index, params.head_shape(head));
    }

    Ok(RknnRuntime {
      context,
      num_outputs: params.heads.len(),
    })
  }
}

/// RKNN 推理上下文。输入为 NHWC 排列的 u8 RGB 数据，输出以浮点形式读取。
pub struct RknnRuntime {
  context: Context,
  num_outputs: usize,
}

impl InferenceRuntime for RknnRuntime {
  type Outputs = RknnOutputs;
  type Error = RknnRuntimeError;

  fn run(&self, input: &[u8]) -> Result<Self::Outputs, Self::Error> {
    debug!("设置模型输入");
    self
      .context
      .set_input(0, input, TensorFormat::NHWC, TensorType::UInt8)?;

    debug!("执行模型推理");
    self.context.run()?;

    debug!("获取模型输出");
    let output = self.context.get_outputs()?;

    Ok(RknnOutputs {
      output: Some(output),
      num_outputs: self.num_outputs,
    })
  }
}

/// 运行时只提供输出数据，张量形状以实际数据长度 `[len]` 报告
pub struct RknnOutputs {
  output: Option<rknpu::Output>,
  num_outputs: usize,
}

impl InferenceOutputs for RknnOutputs {
  type Error = RknnRuntimeError;

  fn len(&self) -> usize {
    self.num_outputs
  }

  fn tensor(&self, index: usize) -> Result<RawOutputTensor<'_>, Self::Error> {
    let output = self.output.as_ref().ok_or(RknnRuntimeError::Released)?;
    if index >= self.num_outputs {
      return Err(RknnRuntimeError::OutputIndex(index));
    }
    let data = output.get_f32(index)?;
    Ok(RawOutputTensor::flat(data))
  }

  fn release(&mut self) -> Result<(), Self::Error> {
    // rknpu::Output 析构时归还输出缓冲区
    if self.output.take().is_some() {
      debug!("释放模型输出");
    }
    Ok(())
  }
}

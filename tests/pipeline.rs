// 该文件是 Beifeng （北风） 项目的一部分。
// tests/pipeline.rs - 检测流程集成测试
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

use std::{cell::Cell, rc::Rc};

use beifeng::{
  frame::{LetterboxedFrame, RgbNhwcFrame},
  model::{DetectError, Detector, Model},
  output::Discard,
  postprocess::{
    Activation, Architecture, BoxEncoding, DecodeError, HeadParams, Letterbox, PipelineParams,
    PixelBox, PostProcessor, Quantization, RawOutputTensor, TensorLayout, nms::iou,
  },
  runtime::{InferenceOutputs, InferenceRuntime},
  task::{BenchmarkTask, OneShotTask, Task},
};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("模拟运行时错误")]
struct FakeError;

struct FakeOutputs {
  tensors: Vec<(Vec<usize>, Vec<f32>)>,
  released: Rc<Cell<usize>>,
}

impl InferenceOutputs for FakeOutputs {
  type Error = FakeError;

  fn len(&self) -> usize {
    self.tensors.len()
  }

  fn tensor(&self, index: usize) -> Result<RawOutputTensor<'_>, FakeError> {
    let (shape, data) = self.tensors.get(index).ok_or(FakeError)?;
    Ok(RawOutputTensor::float(shape.clone(), data))
  }

  fn release(&mut self) -> Result<(), FakeError> {
    self.released.set(self.released.get() + 1);
    Ok(())
  }
}

/// 每次运行都返回同一组浮点输出
struct FakeRuntime {
  outputs: Vec<(Vec<usize>, Vec<f32>)>,
  released: Rc<Cell<usize>>,
  runs: Cell<usize>,
}

impl FakeRuntime {
  fn new(outputs: Vec<(Vec<usize>, Vec<f32>)>) -> Self {
    FakeRuntime {
      outputs,
      released: Rc::new(Cell::new(0)),
      runs: Cell::new(0),
    }
  }
}

impl InferenceRuntime for FakeRuntime {
  type Outputs = FakeOutputs;
  type Error = FakeError;

  fn run(&self, _input: &[u8]) -> Result<FakeOutputs, FakeError> {
    self.runs.set(self.runs.get() + 1);
    Ok(FakeOutputs {
      tensors: self.outputs.clone(),
      released: self.released.clone(),
    })
  }
}

/// 单检测头、无锚框、带 objectness 的 2x2 网格
fn anchor_free_params(confidence: f32) -> PipelineParams {
  PipelineParams {
    input_width: 4,
    input_height: 4,
    class_count: 2,
    confidence_threshold: confidence,
    iou_threshold: 0.45,
    class_agnostic: false,
    max_detections: None,
    architecture: Architecture {
      encoding: BoxEncoding::Yolov3,
      layout: TensorLayout::ChannelsLast,
      objectness: true,
      activation: Activation::Sigmoid,
    },
    heads: vec![HeadParams {
      stride: 2.0,
      grid_height: 2,
      grid_width: 2,
      anchors: vec![],
    }],
  }
}

/// 1x2 网格的 LTRB 检测头，一个类别，无 objectness
fn ltrb_params() -> PipelineParams {
  PipelineParams {
    input_width: 20,
    input_height: 10,
    class_count: 1,
    confidence_threshold: 0.25,
    iou_threshold: 0.7,
    class_agnostic: false,
    max_detections: None,
    architecture: Architecture {
      encoding: BoxEncoding::Ltrb,
      layout: TensorLayout::ChannelsLast,
      objectness: false,
      activation: Activation::Identity,
    },
    heads: vec![HeadParams {
      stride: 10.0,
      grid_height: 1,
      grid_width: 2,
      anchors: vec![],
    }],
  }
}

/// 两个高度重叠的框：[0,0,10,10] 分数 0.9，[1,0,11,10] 分数 0.8，IoU = 90/110
fn overlapping_pair() -> Vec<f32> {
  vec![
    0.5, 0.5, 0.5, 0.5, 0.9, //
    1.4, 0.5, -0.4, 0.5, 0.8,
  ]
}

fn frame_for(params: &PipelineParams, letterbox: Letterbox) -> LetterboxedFrame {
  LetterboxedFrame {
    frame: RgbNhwcFrame::with_shape(params.input_height as usize, params.input_width as usize),
    letterbox,
  }
}

#[test]
fn zero_logits_fall_below_threshold() {
  let params = anchor_free_params(0.6);
  let data = vec![0.0; 4 * 7];
  let tensors = [RawOutputTensor::float(vec![1, 2, 2, 7], &data)];
  let letterbox = Letterbox::stretch(4, 4, 4, 4).unwrap();

  let processor = PostProcessor::new(params).unwrap();
  let decoded = processor.decode(&tensors).unwrap();
  for candidate in processor.candidates(&decoded) {
    assert!((candidate.objectness - 0.5).abs() < 1e-6);
    assert!((candidate.score - 0.25).abs() < 1e-6);
  }
  assert!(processor.process(&tensors, &letterbox).unwrap().is_empty());
}

#[test]
fn zero_logits_above_threshold_keep_every_cell() {
  let processor = PostProcessor::new(anchor_free_params(0.2)).unwrap();
  let data = vec![0.0; 4 * 7];
  let tensors = [RawOutputTensor::float(vec![1, 2, 2, 7], &data)];
  let letterbox = Letterbox::stretch(4, 4, 4, 4).unwrap();

  let detections = processor.process(&tensors, &letterbox).unwrap();
  // 每个单元格一个 2x2 框，互不重叠；分数相同保持解码顺序
  let boxes: Vec<PixelBox> = detections.iter().map(|d| d.bbox).collect();
  assert_eq!(
    boxes,
    vec![
      PixelBox { left: 0, top: 0, right: 2, bottom: 2 },
      PixelBox { left: 2, top: 0, right: 4, bottom: 2 },
      PixelBox { left: 0, top: 2, right: 2, bottom: 4 },
      PixelBox { left: 2, top: 2, right: 4, bottom: 4 },
    ]
  );
  assert!(detections.iter().all(|d| d.class_id == 0));
}

#[test]
fn overlapping_lower_score_is_suppressed() {
  let processor = PostProcessor::new(ltrb_params()).unwrap();
  let data = overlapping_pair();
  let tensors = [RawOutputTensor::float(vec![1, 1, 2, 5], &data)];
  let letterbox = Letterbox::stretch(20, 10, 20, 10).unwrap();

  let detections = processor.process(&tensors, &letterbox).unwrap();
  assert_eq!(detections.len(), 1);
  assert!((detections[0].score - 0.9).abs() < 1e-6);
  assert_eq!(
    detections[0].bbox,
    PixelBox { left: 0, top: 0, right: 10, bottom: 10 }
  );
}

#[test]
fn overlap_at_point_seven_is_suppressed_at_half_threshold() {
  let mut params = ltrb_params();
  params.iou_threshold = 0.5;
  let processor = PostProcessor::new(params).unwrap();
  // 第二个框 [0,0,10,7] 完全落在第一个框内，IoU = 70/100
  let data = vec![
    0.5, 0.5, 0.5, 0.5, 0.9, //
    1.5, 0.5, -0.5, 0.2, 0.8,
  ];
  let tensors = [RawOutputTensor::float(vec![1, 1, 2, 5], &data)];
  let letterbox = Letterbox::stretch(20, 10, 20, 10).unwrap();

  let decoded = processor.decode(&tensors).unwrap();
  let candidates = processor.candidates(&decoded);
  assert!((iou(&candidates[0].bbox, &candidates[1].bbox) - 0.7).abs() < 1e-5);

  let detections = processor.process(&tensors, &letterbox).unwrap();
  assert_eq!(detections.len(), 1);
  assert!((detections[0].score - 0.9).abs() < 1e-6);
}

#[test]
fn class_agnostic_still_suppresses_same_class() {
  let processor = PostProcessor::new(ltrb_params().with_class_agnostic(true)).unwrap();
  let data = overlapping_pair();
  let tensors = [RawOutputTensor::float(vec![1, 1, 2, 5], &data)];
  let letterbox = Letterbox::stretch(20, 10, 20, 10).unwrap();
  assert_eq!(processor.process(&tensors, &letterbox).unwrap().len(), 1);
}

#[test]
fn quantized_yolov5_head() {
  let params = PipelineParams {
    input_width: 8,
    input_height: 8,
    class_count: 1,
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
    heads: vec![HeadParams {
      stride: 8.0,
      grid_height: 1,
      grid_width: 1,
      anchors: vec![[4.0, 6.0]],
    }],
  };
  let processor = PostProcessor::new(params).unwrap();

  // 反量化后: xy = 0.5, wh = 0.5, objectness = 1.0, class = 0.75
  let data: Vec<i8> = vec![2, 2, 2, 2, 4, 3];
  let tensors = [RawOutputTensor::int8(
    vec![1, 6, 1, 1],
    &data,
    Quantization::new(0.25, 0),
  )];
  // 中心 (4, 4)，大小 4x6 -> [2, 1, 6, 7]，原图为输入的两倍
  let letterbox = Letterbox::stretch(16, 16, 8, 8).unwrap();

  let detections = processor.process(&tensors, &letterbox).unwrap();
  assert_eq!(detections.len(), 1);
  assert_eq!(
    detections[0].bbox,
    PixelBox { left: 4, top: 2, right: 12, bottom: 14 }
  );
  assert!((detections[0].score - 0.75).abs() < 1e-6);
}

#[test]
fn detector_releases_outputs_on_success() {
  let params = ltrb_params();
  let frame = frame_for(&params, Letterbox::stretch(40, 20, 20, 10).unwrap());
  let runtime = FakeRuntime::new(vec![(vec![1, 1, 2, 5], overlapping_pair())]);
  let released = runtime.released.clone();
  let detector: Detector<FakeRuntime, LetterboxedFrame> = Detector::new(runtime, params).unwrap();

  let result = detector.infer(&frame).unwrap();
  assert_eq!(released.get(), 1);
  assert_eq!(result.items.len(), 1);
  assert_eq!(
    result.items[0].bbox,
    PixelBox { left: 0, top: 0, right: 20, bottom: 20 }
  );
  assert_eq!(
    result.timing.total(),
    result.timing.inference + result.timing.postprocess
  );
}

#[test]
fn detector_releases_outputs_on_decode_error() {
  let params = ltrb_params();
  let frame = frame_for(&params, Letterbox::stretch(20, 10, 20, 10).unwrap());
  let runtime = FakeRuntime::new(vec![
    (vec![1, 1, 2, 5], overlapping_pair()),
    (vec![1, 1, 2, 5], overlapping_pair()),
  ]);
  let released = runtime.released.clone();
  let detector: Detector<FakeRuntime, LetterboxedFrame> = Detector::new(runtime, params).unwrap();

  match detector.infer(&frame) {
    Err(DetectError::Decode(DecodeError::TensorCount { expected, actual })) => {
      assert_eq!((expected, actual), (1, 2));
    }
    other => panic!("期望张量数量错误, 实际 {:?}", other.map(|r| r.items)),
  }
  assert_eq!(released.get(), 1);
}

#[test]
fn detector_rejects_wrong_input_size() {
  let params = ltrb_params();
  let frame = LetterboxedFrame {
    frame: RgbNhwcFrame::with_shape(4, 4),
    letterbox: Letterbox::stretch(20, 10, 20, 10).unwrap(),
  };
  let runtime = FakeRuntime::new(vec![(vec![1, 1, 2, 5], overlapping_pair())]);
  let detector: Detector<FakeRuntime, LetterboxedFrame> = Detector::new(runtime, params).unwrap();

  assert!(matches!(
    detector.infer(&frame),
    Err(DetectError::InputSize { expected: 600, actual: 48 })
  ));
  assert_eq!(detector.params().input_width, 20);
}

#[test]
fn element_count_mismatch_is_reported() {
  let processor = PostProcessor::new(ltrb_params()).unwrap();
  let data = vec![0.0; 9];
  let tensors = [RawOutputTensor::float(vec![1, 1, 1, 9], &data)];
  let letterbox = Letterbox::stretch(20, 10, 20, 10).unwrap();

  match processor.process(&tensors, &letterbox) {
    Err(DecodeError::ElementCount {
      head,
      expected,
      actual,
      expected_shape,
      ..
    }) => {
      assert_eq!(head, 0);
      assert_eq!(expected, 10);
      assert_eq!(actual, 9);
      assert_eq!(expected_shape, vec![1, 1, 2, 5]);
    }
    other => panic!("期望元素数量错误, 实际 {:?}", other),
  }
}

#[test]
fn repeated_runs_are_identical() {
  let processor = PostProcessor::new(anchor_free_params(0.2)).unwrap();
  let data: Vec<f32> = (0..28).map(|i| ((i * 37) % 11) as f32 / 5.0 - 1.0).collect();
  let tensors = [RawOutputTensor::float(vec![1, 2, 2, 7], &data)];
  let letterbox = Letterbox::fit(5, 3, 4, 4).unwrap();

  let first = processor.process(&tensors, &letterbox).unwrap();
  let second = processor.process(&tensors, &letterbox).unwrap();
  assert_eq!(first, second);
}

#[test]
fn one_shot_task_returns_result() {
  let params = ltrb_params();
  let frame = frame_for(&params, Letterbox::stretch(20, 10, 20, 10).unwrap());
  let runtime = FakeRuntime::new(vec![(vec![1, 1, 2, 5], overlapping_pair())]);
  let detector: Detector<FakeRuntime, LetterboxedFrame> = Detector::new(runtime, params).unwrap();

  let result = OneShotTask::new(Discard)
    .run_task(std::iter::once(frame), &detector)
    .unwrap();
  assert_eq!(result.items.len(), 1);
}

#[test]
fn benchmark_runs_requested_count() {
  let params = ltrb_params();
  let frame = frame_for(&params, Letterbox::stretch(20, 10, 20, 10).unwrap());
  let runtime = FakeRuntime::new(vec![(vec![1, 1, 2, 5], overlapping_pair())]);
  let detector: Detector<FakeRuntime, LetterboxedFrame> = Detector::new(runtime, params).unwrap();

  let report = BenchmarkTask::new(5).measure(&frame, &detector).unwrap();
  assert_eq!(report.count, 5);
  assert!(report.total >= report.first);

  assert_eq!(detector.runtime().runs.get(), 5);

  assert!(BenchmarkTask::new(0).measure(&frame, &detector).is_err());
  assert!(
    BenchmarkTask::new(2)
      .run_task(std::iter::empty::<LetterboxedFrame>(), &detector)
      .is_err()
  );
}

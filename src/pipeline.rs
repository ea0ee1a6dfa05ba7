// 该文件是 Shanan （山南西风） 项目的一部分。
// src/pipeline.rs - 分类流水线
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

use std::sync::mpsc::Sender;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  engine::{EngineError, InferenceEngine},
  frame::{FrameEvent, ModelSpec, RawFrame, TensorLayout},
  labels::LabelTable,
  normalize::{NormalizeError, normalize},
  schedule::FrameScheduler,
  select::{Classification, SelectError, score_labels, select_top_n},
  tensor::{CodecError, FloatNormalization, InputEncoding, decode, encode},
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("图像归一化错误: {0}")]
  Normalize(#[from] NormalizeError),
  #[error("张量编解码错误: {0}")]
  Codec(#[from] CodecError),
  #[error("推理引擎错误: {0}")]
  Engine(#[from] EngineError),
  #[error("结果选择错误: {0}")]
  Select(#[from] SelectError),
}

/// 一次推理的结果
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
  pub model_name: String,
  pub frame: FrameEvent,
  pub top: Vec<Classification>,
}

impl ClassificationResult {
  pub fn primary(&self) -> Option<&Classification> {
    self.top.first()
  }

  /// 展示文本: 模型名、首位标签、置信度各占一行
  pub fn display_text(&self) -> String {
    match self.primary() {
      Some(item) => format!(
        "{}\n{}\n{}",
        self.model_name,
        item.label,
        item.display_confidence()
      ),
      None => self.model_name.clone(),
    }
  }
}

/// 结果投递。实现不得阻塞流水线线程。
pub trait ResultSink {
  fn deliver(&self, result: ClassificationResult);
}

impl ResultSink for Sender<ClassificationResult> {
  fn deliver(&self, result: ClassificationResult) {
    if self.send(result).is_err() {
      warn!("结果接收端已关闭, 丢弃结果");
    }
  }
}

/// 丢弃所有结果
impl ResultSink for () {
  fn deliver(&self, _result: ClassificationResult) {}
}

impl<F: Fn(ClassificationResult)> ResultSink for F {
  fn deliver(&self, result: ClassificationResult) {
    self(result)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
  /// 被帧调度器丢弃
  Skipped,
  Delivered,
  Failed,
}

pub struct ClassifyPipeline<E, S> {
  spec: ModelSpec,
  labels: LabelTable,
  engine: E,
  sink: S,
  scheduler: FrameScheduler,
  layout: TensorLayout,
  normalization: FloatNormalization,
  top_n: usize,
}

impl<E: InferenceEngine, S: ResultSink> ClassifyPipeline<E, S> {
  pub fn new(spec: ModelSpec, labels: LabelTable, engine: E, sink: S) -> Self {
    Self {
      spec,
      labels,
      engine,
      sink,
      scheduler: FrameScheduler::default(),
      layout: TensorLayout::default(),
      normalization: FloatNormalization::default(),
      top_n: 1,
    }
  }

  pub fn with_scheduler(mut self, scheduler: FrameScheduler) -> Self {
    self.scheduler = scheduler;
    self
  }

  pub fn with_layout(mut self, layout: TensorLayout) -> Self {
    self.layout = layout;
    self
  }

  pub fn with_normalization(mut self, normalization: FloatNormalization) -> Self {
    self.normalization = normalization;
    self
  }

  pub fn with_top_n(mut self, top_n: usize) -> Self {
    self.top_n = top_n;
    self
  }

  /// 替换结果投递目标
  pub fn with_sink<T: ResultSink>(self, sink: T) -> ClassifyPipeline<E, T> {
    ClassifyPipeline {
      spec: self.spec,
      labels: self.labels,
      engine: self.engine,
      sink,
      scheduler: self.scheduler,
      layout: self.layout,
      normalization: self.normalization,
      top_n: self.top_n,
    }
  }

  pub fn spec(&self) -> &ModelSpec {
    &self.spec
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  /// 不经过帧调度，直接完成一次推理
  pub fn classify(
    &mut self,
    frame: &RawFrame<'_>,
    event: &FrameEvent,
  ) -> Result<ClassificationResult, PipelineError> {
    let now = std::time::Instant::now();

    let image = normalize(frame, &self.spec)?;
    let encoding = InputEncoding::for_input_type(self.engine.input_type(), self.normalization);
    let input = encode(&image, &encoding, self.layout);

    debug!("执行模型推理");
    let output = self.engine.invoke(&input)?;
    let elapsed = now.elapsed();

    let scores = decode(&output)?;
    let scored = score_labels(&scores, &self.labels)?;
    let top: Vec<Classification> = select_top_n(scored, self.top_n)
      .iter()
      .filter_map(|s| Classification::from_scored(s, &self.labels))
      .collect();

    info!("推理完成，耗时: {:.2?}", elapsed);
    debug!("分类结果: {:?}", top);

    Ok(ClassificationResult {
      model_name: self.spec.name.clone(),
      frame: *event,
      top,
    })
  }

  /// 采集回调入口。出错只放弃当前帧，流水线继续运行。
  pub fn on_frame(&mut self, frame: &RawFrame<'_>, event: &FrameEvent) -> FrameOutcome {
    if !self.scheduler.should_process(event) {
      return FrameOutcome::Skipped;
    }

    match self.classify(frame, event) {
      Ok(result) => {
        self.sink.deliver(result);
        FrameOutcome::Delivered
      }
      Err(e) => {
        error!("第 {} 帧推理失败: {}", event.index, e);
        FrameOutcome::Failed
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::mpsc;

  use super::*;
  use crate::{
    frame::PixelFormat,
    tensor::{InputTensorBuffer, OutputTensor, Quantization, TensorType},
  };

  struct FixedEngine {
    input_type: TensorType,
    output: OutputTensor,
    calls: usize,
    last_input: Option<InputTensorBuffer>,
  }

  impl InferenceEngine for FixedEngine {
    fn input_type(&self) -> TensorType {
      self.input_type
    }

    fn invoke(&mut self, input: &InputTensorBuffer) -> Result<OutputTensor, EngineError> {
      assert_eq!(input.data_type(), self.input_type);
      self.calls += 1;
      self.last_input = Some(input.clone());
      Ok(self.output.clone())
    }
  }

  fn labels() -> LabelTable {
    ["background", "cat", "dog"].into_iter().collect()
  }

  static PIXELS: [u8; 16] = [9; 16];

  fn frame() -> RawFrame<'static> {
    RawFrame::new(&PIXELS, 2, 2, PixelFormat::Bgra8888)
  }

  #[test]
  fn test_quantized_cycle() {
    let engine = FixedEngine {
      input_type: TensorType::UInt8,
      output: OutputTensor::quantized(vec![0u8, 200, 100], Quantization::new(0.00390625, 0)),
      calls: 0,
      last_input: None,
    };
    let (tx, rx) = mpsc::channel::<ClassificationResult>();
    let mut pipeline = ClassifyPipeline::new(ModelSpec::new("mobilenet", 2, 2), labels(), engine, tx)
      .with_scheduler(FrameScheduler::with_threshold(1))
      .with_top_n(2);

    assert_eq!(
      pipeline.on_frame(&frame(), &FrameEvent::new(1, 0)),
      FrameOutcome::Delivered
    );
    let result = rx.try_recv().unwrap();
    assert_eq!(result.top.len(), 2);
    assert_eq!(result.top[0].label, "cat");
    assert_eq!(result.top[1].label, "dog");
    assert_eq!(result.display_text(), "mobilenet\ncat\n0.781");
  }

  #[test]
  fn test_float_cycle() {
    let engine = FixedEngine {
      input_type: TensorType::Float32,
      output: OutputTensor::float(&[0.1, 0.2, 0.7]),
      calls: 0,
      last_input: None,
    };
    let (tx, rx) = mpsc::channel::<ClassificationResult>();
    let mut pipeline =
      ClassifyPipeline::new(ModelSpec::new("float", 2, 2), labels(), engine, tx);

    let result = pipeline.classify(&frame(), &FrameEvent::default()).unwrap();
    assert_eq!(result.primary().map(|c| c.label.as_str()), Some("dog"));
    assert!(rx.try_recv().is_err());
  }

  #[test]
  fn test_custom_float_normalization() {
    let engine = FixedEngine {
      input_type: TensorType::Float32,
      output: OutputTensor::float(&[0.1, 0.2, 0.7]),
      calls: 0,
      last_input: None,
    };
    let mut pipeline = ClassifyPipeline::new(ModelSpec::new("float", 2, 2), labels(), engine, ())
      .with_normalization(FloatNormalization {
        mean: 0.0,
        std: 255.0,
      });
    pipeline.classify(&frame(), &FrameEvent::default()).unwrap();

    let input = pipeline.engine.last_input.take().unwrap();
    let values: Vec<f32> = input
      .as_bytes()
      .chunks_exact(4)
      .map(|w| f32::from_le_bytes([w[0], w[1], w[2], w[3]]))
      .collect();
    assert_eq!(values.len(), 2 * 2 * 3);
    assert!(values.iter().all(|&v| v == 9.0 / 255.0));
  }

  #[test]
  fn test_scheduler_gates_engine() {
    let engine = FixedEngine {
      input_type: TensorType::UInt8,
      output: OutputTensor::quantized(vec![1u8, 2, 3], Quantization::new(1.0, 0)),
      calls: 0,
      last_input: None,
    };
    let (tx, rx) = mpsc::channel::<ClassificationResult>();
    let mut pipeline = ClassifyPipeline::new(ModelSpec::new("m", 2, 2), labels(), engine, tx);

    let outcomes: Vec<FrameOutcome> = (1..=60)
      .map(|i| pipeline.on_frame(&frame(), &FrameEvent::new(i, 0)))
      .collect();
    assert!(outcomes[..59].iter().all(|o| *o == FrameOutcome::Skipped));
    assert_eq!(outcomes[59], FrameOutcome::Delivered);
    assert_eq!(pipeline.engine.calls, 1);
    assert_eq!(rx.try_iter().count(), 1);
  }

  #[test]
  fn test_failure_keeps_running() {
    let engine = FixedEngine {
      input_type: TensorType::UInt8,
      output: OutputTensor {
        data_type: TensorType::Int8,
        quantization: None,
        data: vec![0; 3].into_boxed_slice(),
      },
      calls: 0,
      last_input: None,
    };
    let delivered = std::cell::Cell::new(0);
    let sink = |_: ClassificationResult| delivered.set(delivered.get() + 1);
    let mut pipeline = ClassifyPipeline::new(ModelSpec::new("m", 2, 2), labels(), engine, sink)
      .with_scheduler(FrameScheduler::with_threshold(1));

    assert_eq!(
      pipeline.on_frame(&frame(), &FrameEvent::new(1, 0)),
      FrameOutcome::Failed
    );
    assert_eq!(
      pipeline.on_frame(&frame(), &FrameEvent::new(2, 0)),
      FrameOutcome::Failed
    );
    assert!(matches!(
      pipeline.classify(&frame(), &FrameEvent::default()),
      Err(PipelineError::Codec(CodecError::UnsupportedOutputType(
        TensorType::Int8
      )))
    ));
    assert_eq!(delivered.get(), 0);
  }

  #[test]
  fn test_label_count_mismatch() {
    let engine = FixedEngine {
      input_type: TensorType::Float32,
      output: OutputTensor::float(&[0.5, 0.5]),
      calls: 0,
      last_input: None,
    };
    let mut pipeline = ClassifyPipeline::new(
      ModelSpec::new("m", 2, 2),
      labels(),
      engine,
      |_: ClassificationResult| {},
    );
    assert!(matches!(
      pipeline.classify(&frame(), &FrameEvent::default()),
      Err(PipelineError::Select(SelectError::LabelCountMismatch { .. }))
    ));
  }
}

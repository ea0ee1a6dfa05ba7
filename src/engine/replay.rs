// 该文件是 Shanan （山南西风） 项目的一部分。
// src/engine/replay.rs - 回放录制的推理输出
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

//! # 回放引擎
//!
//! 把一份 JSON 录制文件当作模型，按顺序循环返回其中记录的输出张量。
//! 用于在没有硬件推理运行时的环境下驱动完整的分类流程。
//!
//! ```json
//! {
//!   "input_type": "uint8",
//!   "input_len": 150528,
//!   "outputs": [
//!     { "type": "uint8", "scale": 0.00390625, "zero_point": 0, "data": [0, 12, 250] },
//!     { "type": "float32", "data": [0.1, 0.2, 0.7] }
//!   ]
//! }
//! ```
//!
//! `float32` 输出的 `data` 为浮点数列表，其余类型为原始字节列表。

use serde_json::Value;
use tracing::{debug, warn};

use super::{EngineError, EngineOptions, InferenceEngine, LoadEngine, ModelArtifact};
use crate::tensor::{InputTensorBuffer, OutputTensor, Quantization, TensorType};

#[derive(Debug, Clone)]
pub struct ReplayEngine {
  input_type: TensorType,
  input_len: Option<usize>,
  outputs: Vec<OutputTensor>,
  cursor: usize,
}

fn invalid(msg: impl Into<String>) -> EngineError {
  EngineError::ModelLoad(msg.into())
}

fn parse_output(index: usize, value: &Value) -> Result<OutputTensor, EngineError> {
  let data_type = value
    .get("type")
    .and_then(Value::as_str)
    .ok_or_else(|| invalid(format!("第 {} 个输出缺少 type", index)))?
    .parse::<TensorType>()
    .map_err(|e| invalid(format!("第 {} 个输出: {}", index, e)))?;

  let items = value
    .get("data")
    .and_then(Value::as_array)
    .ok_or_else(|| invalid(format!("第 {} 个输出缺少 data", index)))?;

  let data: Vec<u8> = if data_type == TensorType::Float32 {
    items
      .iter()
      .map(|v| {
        v.as_f64()
          .map(|f| (f as f32).to_le_bytes())
          .ok_or_else(|| invalid(format!("第 {} 个输出包含非数值元素", index)))
      })
      .collect::<Result<Vec<_>, _>>()?
      .concat()
  } else {
    items
      .iter()
      .map(|v| {
        v.as_u64()
          .and_then(|b| u8::try_from(b).ok())
          .ok_or_else(|| invalid(format!("第 {} 个输出包含非字节元素", index)))
      })
      .collect::<Result<Vec<_>, _>>()?
  };

  let scale = value.get("scale").and_then(Value::as_f64);
  let zero_point = value.get("zero_point").and_then(Value::as_i64);
  let quantization = match (scale, zero_point) {
    (Some(scale), Some(zero_point)) => Some(Quantization::new(scale as f32, zero_point as i32)),
    (Some(scale), None) => Some(Quantization::new(scale as f32, 0)),
    (None, Some(_)) => {
      warn!("第 {} 个输出只有 zero_point 没有 scale, 忽略量化参数", index);
      None
    }
    (None, None) => None,
  };

  Ok(OutputTensor {
    data_type,
    quantization,
    data: data.into_boxed_slice(),
  })
}

impl ReplayEngine {
  pub fn from_json(text: &str) -> Result<Self, EngineError> {
    let root: Value =
      serde_json::from_str(text).map_err(|e| invalid(format!("录制文件格式错误: {}", e)))?;

    let input_type = root
      .get("input_type")
      .and_then(Value::as_str)
      .unwrap_or("uint8")
      .parse::<TensorType>()
      .map_err(|e| invalid(e.to_string()))?;
    let input_len = root
      .get("input_len")
      .and_then(Value::as_u64)
      .map(|n| n as usize);

    let outputs = root
      .get("outputs")
      .and_then(Value::as_array)
      .ok_or_else(|| invalid("录制文件缺少 outputs"))?
      .iter()
      .enumerate()
      .map(|(i, v)| parse_output(i, v))
      .collect::<Result<Vec<_>, _>>()?;

    if outputs.is_empty() {
      return Err(invalid("录制文件中没有输出"));
    }

    Ok(Self {
      input_type,
      input_len,
      outputs,
      cursor: 0,
    })
  }

  pub fn len(&self) -> usize {
    self.outputs.len()
  }

  pub fn is_empty(&self) -> bool {
    self.outputs.is_empty()
  }
}

impl LoadEngine for ReplayEngine {
  fn load(artifact: ModelArtifact, options: &EngineOptions) -> Result<Self, EngineError> {
    let text = std::str::from_utf8(artifact.data())
      .map_err(|e| invalid(format!("{}: {}", artifact.path().display(), e)))?;
    let engine = Self::from_json(text)?;
    debug!(
      "回放引擎: {} 条输出, 输入类型 {}, 线程数 {} (回放不使用)",
      engine.outputs.len(),
      engine.input_type,
      options.threads
    );
    Ok(engine)
  }
}

impl InferenceEngine for ReplayEngine {
  fn input_type(&self) -> TensorType {
    self.input_type
  }

  fn invoke(&mut self, input: &InputTensorBuffer) -> Result<OutputTensor, EngineError> {
    if input.data_type() != self.input_type {
      return Err(EngineError::Invocation(format!(
        "输入类型不匹配: 期望 {}, 实际 {}",
        self.input_type,
        input.data_type()
      )));
    }

    if let Some(input_len) = self.input_len {
      let element_size = match self.input_type {
        TensorType::Float32 => 4,
        _ => 1,
      };
      let expected = input_len * element_size;
      if input.len() != expected {
        return Err(EngineError::Invocation(format!(
          "输入大小不匹配: 期望 {} 字节, 实际 {} 字节",
          expected,
          input.len()
        )));
      }
    }

    let output = self.outputs[self.cursor % self.outputs.len()].clone();
    self.cursor = (self.cursor + 1) % self.outputs.len();
    Ok(output)
  }
}

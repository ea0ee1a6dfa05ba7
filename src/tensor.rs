// 该文件是 Shanan （山南西风） 项目的一部分。
// src/tensor.rs - 输入张量编码与输出张量解码
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

use std::{fmt, str::FromStr};

use thiserror::Error;
use tracing::debug;

use crate::frame::{NormalizedImage, TensorLayout};

const FLOAT_SIZE: usize = std::mem::size_of::<f32>();

/// 张量元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TensorType {
  UInt8,
  Int8,
  Int16,
  Int32,
  Int64,
  Float16,
  Float32,
  Bool,
}

impl TensorType {
  pub fn is_quantized(&self) -> bool {
    matches!(self, TensorType::UInt8)
  }
}

impl fmt::Display for TensorType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      TensorType::UInt8 => "uint8",
      TensorType::Int8 => "int8",
      TensorType::Int16 => "int16",
      TensorType::Int32 => "int32",
      TensorType::Int64 => "int64",
      TensorType::Float16 => "float16",
      TensorType::Float32 => "float32",
      TensorType::Bool => "bool",
    };
    f.write_str(name)
  }
}

impl FromStr for TensorType {
  type Err = CodecError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "uint8" | "u8" => Ok(TensorType::UInt8),
      "int8" | "i8" => Ok(TensorType::Int8),
      "int16" | "i16" => Ok(TensorType::Int16),
      "int32" | "i32" => Ok(TensorType::Int32),
      "int64" | "i64" => Ok(TensorType::Int64),
      "float16" | "f16" => Ok(TensorType::Float16),
      "float32" | "f32" => Ok(TensorType::Float32),
      "bool" => Ok(TensorType::Bool),
      other => Err(CodecError::UnknownTensorType(other.to_string())),
    }
  }
}

/// 线性量化参数: real = scale * (q - zero_point)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantization {
  pub scale: f32,
  pub zero_point: i32,
}

impl Quantization {
  pub fn new(scale: f32, zero_point: i32) -> Self {
    Self { scale, zero_point }
  }

  pub fn dequantize(&self, value: u8) -> f32 {
    self.scale * (i32::from(value) - self.zero_point) as f32
  }
}

/// 推理引擎返回的输出张量
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTensor {
  pub data_type: TensorType,
  pub quantization: Option<Quantization>,
  pub data: Box<[u8]>,
}

impl OutputTensor {
  pub fn quantized(data: impl Into<Box<[u8]>>, quantization: Quantization) -> Self {
    Self {
      data_type: TensorType::UInt8,
      quantization: Some(quantization),
      data: data.into(),
    }
  }

  pub fn float(values: &[f32]) -> Self {
    let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    Self {
      data_type: TensorType::Float32,
      quantization: None,
      data: data.into_boxed_slice(),
    }
  }
}

/// 浮点输入的归一化参数: (value - mean) / std
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatNormalization {
  pub mean: f32,
  pub std: f32,
}

impl Default for FloatNormalization {
  fn default() -> Self {
    // 映射到 [-1, 1]
    Self {
      mean: 127.5,
      std: 127.5,
    }
  }
}

impl FloatNormalization {
  pub fn apply(&self, value: u8) -> f32 {
    (f32::from(value) - self.mean) / self.std
  }
}

/// 模型期望的输入编码
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEncoding {
  /// 每通道一个无符号字节，不做缩放
  Quantized,
  Float(FloatNormalization),
}

impl InputEncoding {
  pub fn for_input_type(input_type: TensorType, normalization: FloatNormalization) -> Self {
    if input_type.is_quantized() {
      InputEncoding::Quantized
    } else {
      InputEncoding::Float(normalization)
    }
  }

  pub fn tensor_type(&self) -> TensorType {
    match self {
      InputEncoding::Quantized => TensorType::UInt8,
      InputEncoding::Float(_) => TensorType::Float32,
    }
  }
}

/// 模型输入缓冲区，按模型要求的布局与编码排列
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensorBuffer {
  data_type: TensorType,
  layout: TensorLayout,
  data: Box<[u8]>,
}

impl InputTensorBuffer {
  pub fn data_type(&self) -> TensorType {
    self.data_type
  }

  pub fn layout(&self) -> TensorLayout {
    self.layout
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

#[derive(Error, Debug, PartialEq)]
pub enum CodecError {
  #[error("量化输出张量缺少量化参数")]
  MissingQuantization,
  #[error("不支持的输出张量类型: {0}")]
  UnsupportedOutputType(TensorType),
  #[error("浮点输出长度 {0} 字节不是 4 的整数倍")]
  MisalignedFloatData(usize),
  #[error("未知的张量类型: {0}")]
  UnknownTensorType(String),
}

/// 按通道顺序重排为目标布局（NHWC 原样返回）
fn to_layout(image: &NormalizedImage, layout: TensorLayout) -> Vec<u8> {
  let src = image.as_nhwc();
  match layout {
    TensorLayout::Nhwc => src.to_vec(),
    TensorLayout::Nchw => {
      let channels = image.channels();
      let plane = image.width() as usize * image.height() as usize;
      let sample = plane * channels;
      let mut dst = vec![0u8; src.len()];

      // HWC -> CHW，逐个批次槽位转换
      for b in 0..image.batch_size() {
        let offset = b * sample;
        for p in 0..plane {
          for c in 0..channels {
            dst[offset + c * plane + p] = src[offset + p * channels + c];
          }
        }
      }
      dst
    }
  }
}

/// 将归一化图像编码为模型输入缓冲区
pub fn encode(
  image: &NormalizedImage,
  encoding: &InputEncoding,
  layout: TensorLayout,
) -> InputTensorBuffer {
  let bytes = to_layout(image, layout);
  let data: Vec<u8> = match encoding {
    InputEncoding::Quantized => bytes,
    InputEncoding::Float(normalization) => bytes
      .iter()
      .flat_map(|&value| normalization.apply(value).to_le_bytes())
      .collect(),
  };

  debug!(
    "编码输入张量: {} {:?}, {} 字节",
    encoding.tensor_type(),
    layout,
    data.len()
  );

  InputTensorBuffer {
    data_type: encoding.tensor_type(),
    layout,
    data: data.into_boxed_slice(),
  }
}

/// 将输出张量解码为按标签序号排列的置信度
pub fn decode(output: &OutputTensor) -> Result<Vec<f32>, CodecError> {
  match output.data_type {
    TensorType::UInt8 => {
      let quantization = output
        .quantization
        .ok_or(CodecError::MissingQuantization)?;
      Ok(
        output
          .data
          .iter()
          .map(|&value| quantization.dequantize(value))
          .collect(),
      )
    }
    TensorType::Float32 => {
      if output.data.len() % FLOAT_SIZE != 0 {
        return Err(CodecError::MisalignedFloatData(output.data.len()));
      }
      Ok(
        output
          .data
          .chunks_exact(FLOAT_SIZE)
          .map(|word| f32::from_le_bytes([word[0], word[1], word[2], word[3]]))
          .collect(),
      )
    }
    data_type @ (TensorType::Int8
    | TensorType::Int16
    | TensorType::Int32
    | TensorType::Int64
    | TensorType::Float16
    | TensorType::Bool) => Err(CodecError::UnsupportedOutputType(data_type)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    frame::{ModelSpec, PixelFormat, RawFrame},
    normalize::normalize,
  };

  fn image_2x1() -> NormalizedImage {
    let data = [0u8, 128, 255, 255, 10, 20, 30, 255];
    let frame = RawFrame::new(&data, 2, 1, PixelFormat::Rgba8888);
    normalize(&frame, &ModelSpec::new("test", 2, 1)).unwrap()
  }

  #[test]
  fn test_dequantize() {
    let output = OutputTensor::quantized(vec![200u8], Quantization::new(0.5, 10));
    assert_eq!(decode(&output).unwrap(), vec![95.0]);
  }

  #[test]
  fn test_float_decode_exact() {
    let output = OutputTensor::float(&[0.734, 0.0, -1.5]);
    assert_eq!(decode(&output).unwrap(), vec![0.734f32, 0.0, -1.5]);
  }

  #[test]
  fn test_missing_quantization() {
    let output = OutputTensor {
      data_type: TensorType::UInt8,
      quantization: None,
      data: vec![1, 2, 3].into_boxed_slice(),
    };
    assert_eq!(decode(&output), Err(CodecError::MissingQuantization));
  }

  #[test]
  fn test_unsupported_output_type() {
    let output = OutputTensor {
      data_type: TensorType::Int32,
      quantization: None,
      data: vec![0; 8].into_boxed_slice(),
    };
    assert_eq!(
      decode(&output),
      Err(CodecError::UnsupportedOutputType(TensorType::Int32))
    );
  }

  #[test]
  fn test_misaligned_float() {
    let output = OutputTensor {
      data_type: TensorType::Float32,
      quantization: None,
      data: vec![0; 6].into_boxed_slice(),
    };
    assert_eq!(decode(&output), Err(CodecError::MisalignedFloatData(6)));
  }

  #[test]
  fn test_quantized_encode_is_copy() {
    let image = image_2x1();
    let buffer = encode(&image, &InputEncoding::Quantized, TensorLayout::Nhwc);
    assert_eq!(buffer.data_type(), TensorType::UInt8);
    assert_eq!(buffer.as_bytes(), image.as_nhwc());
  }

  #[test]
  fn test_nchw_layout() {
    let buffer = encode(&image_2x1(), &InputEncoding::Quantized, TensorLayout::Nchw);
    assert_eq!(buffer.as_bytes(), &[0, 10, 128, 20, 255, 30]);
  }

  #[test]
  fn test_float_encode_range() {
    let encoding = InputEncoding::Float(FloatNormalization::default());
    let buffer = encode(&image_2x1(), &encoding, TensorLayout::Nhwc);
    assert_eq!(buffer.data_type(), TensorType::Float32);
    assert_eq!(buffer.len(), 6 * 4);

    let values: Vec<f32> = buffer
      .as_bytes()
      .chunks_exact(4)
      .map(|w| f32::from_le_bytes([w[0], w[1], w[2], w[3]]))
      .collect();
    assert_eq!(values[0], -1.0);
    assert_eq!(values[2], 1.0);
    assert!((values[1] - 0.003_921_569).abs() < 1e-6);
  }

  #[test]
  fn test_float_encode_custom_constants() {
    let encoding = InputEncoding::Float(FloatNormalization {
      mean: 0.0,
      std: 255.0,
    });
    let buffer = encode(&image_2x1(), &encoding, TensorLayout::Nhwc);
    let values: Vec<f32> = buffer
      .as_bytes()
      .chunks_exact(4)
      .map(|w| f32::from_le_bytes([w[0], w[1], w[2], w[3]]))
      .collect();
    assert_eq!(values[0], 0.0);
    assert_eq!(values[1], 128.0 / 255.0);
    assert_eq!(values[2], 1.0);
    assert_eq!(values[3], 10.0 / 255.0);
  }

  #[test]
  fn test_parse_tensor_type() {
    assert_eq!("UINT8".parse::<TensorType>(), Ok(TensorType::UInt8));
    assert_eq!("f32".parse::<TensorType>(), Ok(TensorType::Float32));
    assert!("complex64".parse::<TensorType>().is_err());
  }
}

// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - 原始帧与模型输入几何定义
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

use std::fmt;

/// 像素格式
///
/// 前四种为归一化器接受的 32 位交织格式，其余格式仅用于报告通道数。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
  Argb8888,
  Bgra8888,
  Rgba8888,
  /// BGR 加一个填充字节
  Bgrx8888,
  Rgb888,
  GrayAlpha88,
  Gray8,
}

impl PixelFormat {
  pub fn channels(&self) -> usize {
    match self {
      PixelFormat::Argb8888
      | PixelFormat::Bgra8888
      | PixelFormat::Rgba8888
      | PixelFormat::Bgrx8888 => 4,
      PixelFormat::Rgb888 => 3,
      PixelFormat::GrayAlpha88 => 2,
      PixelFormat::Gray8 => 1,
    }
  }

  pub fn bytes_per_pixel(&self) -> usize {
    // 所有格式均为每通道 8 位
    self.channels()
  }

  /// 每个像素内 R、G、B、A（或填充）字节的偏移
  pub(crate) fn rgba_offsets(&self) -> Option<[usize; 4]> {
    match self {
      PixelFormat::Argb8888 => Some([1, 2, 3, 0]),
      PixelFormat::Bgra8888 => Some([2, 1, 0, 3]),
      PixelFormat::Rgba8888 => Some([0, 1, 2, 3]),
      PixelFormat::Bgrx8888 => Some([2, 1, 0, 3]),
      PixelFormat::Rgb888 | PixelFormat::GrayAlpha88 | PixelFormat::Gray8 => None,
    }
  }
}

impl fmt::Display for PixelFormat {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      PixelFormat::Argb8888 => "ARGB8888",
      PixelFormat::Bgra8888 => "BGRA8888",
      PixelFormat::Rgba8888 => "RGBA8888",
      PixelFormat::Bgrx8888 => "BGRx8888",
      PixelFormat::Rgb888 => "RGB888",
      PixelFormat::GrayAlpha88 => "GA88",
      PixelFormat::Gray8 => "GRAY8",
    };
    f.write_str(name)
  }
}

/// 采集端提供的原始帧，仅在一次调用内借用
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
  data: &'a [u8],
  width: u32,
  height: u32,
  stride: usize,
  format: PixelFormat,
}

impl<'a> RawFrame<'a> {
  /// 紧密排列（无行填充）的帧
  pub fn new(data: &'a [u8], width: u32, height: u32, format: PixelFormat) -> Self {
    let stride = width as usize * format.bytes_per_pixel();
    Self::with_stride(data, width, height, stride, format)
  }

  pub fn with_stride(
    data: &'a [u8],
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
  ) -> Self {
    Self {
      data,
      width,
      height,
      stride,
      format,
    }
  }

  pub fn data(&self) -> &'a [u8] {
    self.data
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn stride(&self) -> usize {
    self.stride
  }

  pub fn format(&self) -> PixelFormat {
    self.format
  }
}

/// 采集回调附带的元数据
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameEvent {
  pub index: u64,
  pub timestamp_ms: u64,
}

impl FrameEvent {
  pub fn new(index: u64, timestamp_ms: u64) -> Self {
    Self {
      index,
      timestamp_ms,
    }
  }
}

/// 模型输入张量的内存布局
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TensorLayout {
  /// Height × Width × Channels，交织排列
  #[default]
  Nhwc,
  /// Channels × Height × Width，按通道平面排列
  Nchw,
}

/// 模型描述，启动时确定，之后不再改变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
  pub name: String,
  pub input_width: u32,
  pub input_height: u32,
  pub input_channels: usize,
  pub batch_size: usize,
}

impl ModelSpec {
  pub fn new(name: impl Into<String>, input_width: u32, input_height: u32) -> Self {
    Self {
      name: name.into(),
      input_width,
      input_height,
      input_channels: 3,
      batch_size: 1,
    }
  }

  pub fn with_channels(mut self, channels: usize) -> Self {
    self.input_channels = channels;
    self
  }

  pub fn with_batch_size(mut self, batch_size: usize) -> Self {
    self.batch_size = batch_size;
    self
  }

  pub fn pixels(&self) -> usize {
    self.input_width as usize * self.input_height as usize
  }

  /// 输入元素个数（batch × W × H × C）
  pub fn input_len(&self) -> usize {
    self.batch_size * self.pixels() * self.input_channels
  }
}

/// 归一化后的图像，NHWC 字节序，批次内每个槽位为同一帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
  data: Box<[u8]>,
  width: u32,
  height: u32,
  channels: usize,
  batch_size: usize,
}

impl NormalizedImage {
  pub(crate) fn new(
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: usize,
    batch_size: usize,
  ) -> Self {
    debug_assert_eq!(
      data.len(),
      batch_size * width as usize * height as usize * channels
    );
    Self {
      data: data.into_boxed_slice(),
      width,
      height,
      channels,
      batch_size,
    }
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn batch_size(&self) -> usize {
    self.batch_size
  }

  pub fn as_nhwc(&self) -> &[u8] {
    &self.data
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

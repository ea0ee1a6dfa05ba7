// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use std::{fmt, ops::Deref, sync::Arc};

use thiserror::Error;
use tracing::warn;

use crate::{
  FromUrl,
  frame::{FrameEvent, PixelFormat, RawFrame},
};

/// 帧像素数据。克隆只增加引用计数，不复制像素。
#[derive(Clone)]
pub struct FrameData(Arc<dyn AsRef<[u8]>>);

impl FrameData {
  pub fn new(data: impl AsRef<[u8]> + 'static) -> Self {
    FrameData(Arc::new(data))
  }
}

impl Deref for FrameData {
  type Target = [u8];

  fn deref(&self) -> &[u8] {
    (*self.0).as_ref()
  }
}

impl From<Vec<u8>> for FrameData {
  fn from(data: Vec<u8>) -> Self {
    FrameData::new(data)
  }
}

impl From<Box<[u8]>> for FrameData {
  fn from(data: Box<[u8]>) -> Self {
    FrameData::new(data)
  }
}

impl fmt::Debug for FrameData {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "FrameData({} bytes)", self.len())
  }
}

/// 采集端持有的一帧数据
#[derive(Debug, Clone)]
pub struct CapturedFrame {
  pub data: FrameData,
  pub width: u32,
  pub height: u32,
  pub stride: usize,
  pub format: PixelFormat,
  pub event: FrameEvent,
}

impl CapturedFrame {
  pub fn as_raw(&self) -> RawFrame<'_> {
    RawFrame::with_stride(&self.data, self.width, self.height, self.stride, self.format)
  }
}

/// 拉取样本直到有一个能转换成帧。转换失败的样本只丢弃这一个，
/// 拉取失败表示流已结束。
#[cfg_attr(not(feature = "gstreamer_input"), allow(dead_code))]
pub(crate) fn next_converted<S, T, E: fmt::Display>(
  mut pull: impl FnMut() -> Option<S>,
  mut convert: impl FnMut(S) -> Result<T, E>,
) -> Option<T> {
  loop {
    let sample = pull()?;
    match convert(sample) {
      Ok(frame) => return Some(frame),
      Err(e) => warn!("丢弃无法转换的样本: {}", e),
    }
  }
}

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{
  GStreamerInput, GStreamerInputError, GStreamerInputPipelineBuilder,
};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer input error: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
}

pub enum InputWrapper {
  #[cfg(feature = "gstreamer_input")]
  GStreamerInput(GStreamerInput),
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "gstreamer_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == GStreamerInputPipelineBuilder::SCHEME {
        let input = GStreamerInputPipelineBuilder::from_url(url)?.build()?;
        return Ok(InputWrapper::GStreamerInput(input));
      }
    }
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileInput::SCHEME {
        let input = ImageFileInput::from_url(url)?;
        return Ok(InputWrapper::ReadImageFile(input));
      }
    }
    Err(InputError::SchemeMismatch)
  }
}

impl Iterator for InputWrapper {
  type Item = CapturedFrame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.next(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.next(),
    }
  }
}

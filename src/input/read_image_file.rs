// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{ImageReader, RgbaImage};
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{FrameEvent, PixelFormat},
  input::{CapturedFrame, FrameData},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("Invalid query parameter {0}={1}")]
  InvalidQuery(String, String),
}

/// 静态图片输入，按 `repeat` 次数重复输出同一帧，模拟固定帧率的视频流
pub struct ImageFileInput {
  data: FrameData,
  width: u32,
  height: u32,
  repeat: u64,
  interval_ms: u64,
  emitted: u64,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let mut repeat = 1;
    let mut fps = 30;
    for (k, v) in url.query_pairs() {
      let parsed = || {
        v.parse::<u64>()
          .ok()
          .filter(|&n| n > 0)
          .ok_or_else(|| ImageFileInputError::InvalidQuery(k.to_string(), v.to_string()))
      };
      match &*k {
        "repeat" => repeat = parsed()?,
        "fps" => fps = parsed()?,
        _ => {}
      }
    }

    let path = url.path();
    let image = ImageReader::open(path)?.decode()?.to_rgba8();
    info!(
      "读取图片 {}: {}x{}, 重复 {} 次",
      path,
      image.width(),
      image.height(),
      repeat
    );

    Ok(Self::from_image(image).with_repeat(repeat, 1000 / fps))
  }
}

impl ImageFileInput {
  pub fn from_image(image: RgbaImage) -> Self {
    let (width, height) = image.dimensions();
    ImageFileInput {
      data: image.into_raw().into(),
      width,
      height,
      repeat: 1,
      interval_ms: 0,
      emitted: 0,
    }
  }

  pub fn with_repeat(mut self, repeat: u64, interval_ms: u64) -> Self {
    self.repeat = repeat;
    self.interval_ms = interval_ms;
    self
  }
}

impl Iterator for ImageFileInput {
  type Item = CapturedFrame;

  fn next(&mut self) -> Option<Self::Item> {
    if self.emitted >= self.repeat {
      return None;
    }
    self.emitted += 1;

    // 每次重复共享同一块像素内存
    Some(CapturedFrame {
      data: self.data.clone(),
      width: self.width,
      height: self.height,
      stride: self.width as usize * PixelFormat::Rgba8888.bytes_per_pixel(),
      format: PixelFormat::Rgba8888,
      event: FrameEvent::new(self.emitted, (self.emitted - 1) * self.interval_ms),
    })
  }
}

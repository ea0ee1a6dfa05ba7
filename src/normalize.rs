// 该文件是 Shanan （山南西风） 项目的一部分。
// src/normalize.rs - 图像归一化（中心裁剪与缩放）
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

use image::{ImageBuffer, Pixel, Rgb, Rgba, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

use crate::frame::{ModelSpec, NormalizedImage, PixelFormat, RawFrame};

const RESIZE_FILTER: FilterType = FilterType::Triangle;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum NormalizeError {
  #[error("不支持的像素格式: {0}")]
  UnsupportedFormat(PixelFormat),
  #[error("通道数不足: 源图像 {source_channels} 通道, 目标 {target_channels} 通道")]
  InsufficientChannels {
    source_channels: usize,
    target_channels: usize,
  },
  #[error("无效的目标尺寸: {width}x{height}x{channels}")]
  InvalidTarget {
    width: u32,
    height: u32,
    channels: usize,
  },
  #[error("空帧: {width}x{height}")]
  EmptyFrame { width: u32, height: u32 },
  #[error("缓冲区过小: 期望至少 {expected} 字节, 实际 {actual} 字节")]
  BufferTooSmall { expected: usize, actual: usize },
}

/// 中心裁剪区域 (x, y, width, height)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

/// 计算与目标宽高比一致、位于源图像中心的最大裁剪区域
pub fn center_crop(
  source_width: u32,
  source_height: u32,
  target_width: u32,
  target_height: u32,
) -> CropRegion {
  let (sw, sh) = (source_width as u64, source_height as u64);
  let (tw, th) = (target_width as u64, target_height as u64);

  if sw * th > sh * tw {
    // 源图像更宽，裁掉左右两侧
    let width = ((sh * tw + th / 2) / th).clamp(1, sw) as u32;
    CropRegion {
      x: (source_width - width) / 2,
      y: 0,
      width,
      height: source_height,
    }
  } else {
    let height = ((sw * th + tw / 2) / tw).clamp(1, sh) as u32;
    CropRegion {
      x: 0,
      y: (source_height - height) / 2,
      width: source_width,
      height,
    }
  }
}

/// 将任意 32 位交织格式的帧裁剪、缩放为模型输入尺寸，
/// 并按 R、G、B、A 顺序保留前 `spec.input_channels` 个通道。
pub fn normalize(frame: &RawFrame<'_>, spec: &ModelSpec) -> Result<NormalizedImage, NormalizeError> {
  let (target_width, target_height) = (spec.input_width, spec.input_height);
  let target_channels = spec.input_channels;

  if target_width == 0 || target_height == 0 || target_channels == 0 || spec.batch_size == 0 {
    return Err(NormalizeError::InvalidTarget {
      width: target_width,
      height: target_height,
      channels: target_channels,
    });
  }

  let format = frame.format();
  if format.channels() < target_channels {
    return Err(NormalizeError::InsufficientChannels {
      source_channels: format.channels(),
      target_channels,
    });
  }
  let offsets = format
    .rgba_offsets()
    .ok_or(NormalizeError::UnsupportedFormat(format))?;

  if frame.width() == 0 || frame.height() == 0 {
    return Err(NormalizeError::EmptyFrame {
      width: frame.width(),
      height: frame.height(),
    });
  }

  let row_bytes = frame.width() as usize * format.bytes_per_pixel();
  let expected = frame.stride() * (frame.height() as usize - 1) + row_bytes;
  if frame.stride() < row_bytes || frame.data().len() < expected {
    return Err(NormalizeError::BufferTooSmall {
      expected,
      actual: frame.data().len(),
    });
  }

  let crop = center_crop(frame.width(), frame.height(), target_width, target_height);
  debug!(
    "归一化帧: {}x{} {} -> 裁剪 {:?} -> {}x{}x{}",
    frame.width(),
    frame.height(),
    format,
    crop,
    target_width,
    target_height,
    target_channels
  );

  // 3 通道及以下使用 RGB 缓冲区缩放，避免 alpha 或填充字节参与插值
  let pixels = if target_channels <= 3 {
    let thumbnail = thumbnail::<Rgb<u8>>(frame, crop, offsets, target_width, target_height);
    extract_channels(thumbnail.as_raw(), 3, target_channels)
  } else {
    let thumbnail = thumbnail::<Rgba<u8>>(frame, crop, offsets, target_width, target_height);
    extract_channels(thumbnail.as_raw(), 4, target_channels)
  };

  let data = pixels.repeat(spec.batch_size);

  Ok(NormalizedImage::new(
    data,
    target_width,
    target_height,
    target_channels,
    spec.batch_size,
  ))
}

fn thumbnail<P: Pixel<Subpixel = u8> + 'static>(
  frame: &RawFrame<'_>,
  crop: CropRegion,
  offsets: [usize; 4],
  target_width: u32,
  target_height: u32,
) -> ImageBuffer<P, Vec<u8>> {
  let bpp = frame.format().bytes_per_pixel();
  let data = frame.data();
  let stride = frame.stride();
  let channels = P::CHANNEL_COUNT as usize;

  let cropped = ImageBuffer::from_fn(crop.width, crop.height, |x, y| {
    let base = (crop.y + y) as usize * stride + (crop.x + x) as usize * bpp;
    let mut pixel = [0u8; 4];
    for (c, value) in pixel.iter_mut().enumerate().take(channels) {
      *value = data[base + offsets[c]];
    }
    *P::from_slice(&pixel[..channels])
  });

  if crop.width == target_width && crop.height == target_height {
    cropped
  } else {
    image::imageops::resize(&cropped, target_width, target_height, RESIZE_FILTER)
  }
}

fn extract_channels(raw: &[u8], source_channels: usize, target_channels: usize) -> Vec<u8> {
  if source_channels == target_channels {
    return raw.to_vec();
  }
  raw
    .chunks_exact(source_channels)
    .flat_map(|pixel| pixel[..target_channels].iter().copied())
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn spec(width: u32, height: u32, channels: usize) -> ModelSpec {
    ModelSpec::new("test", width, height).with_channels(channels)
  }

  #[test]
  fn test_bgra_drops_alpha() {
    let data: Vec<u8> = [10u8, 20, 30, 255].repeat(4);
    let frame = RawFrame::new(&data, 2, 2, PixelFormat::Bgra8888);
    let image = normalize(&frame, &spec(2, 2, 3)).unwrap();
    assert_eq!(image.as_nhwc(), [30u8, 20, 10].repeat(4).as_slice());
  }

  #[test]
  fn test_argb_channel_order() {
    let data = [255u8, 1, 2, 3];
    let frame = RawFrame::new(&data, 1, 1, PixelFormat::Argb8888);
    let image = normalize(&frame, &spec(1, 1, 4)).unwrap();
    assert_eq!(image.as_nhwc(), &[1, 2, 3, 255]);
  }

  #[test]
  fn test_insufficient_channels() {
    let data = [0u8; 2 * 4];
    let frame = RawFrame::new(&data, 2, 2, PixelFormat::GrayAlpha88);
    assert_eq!(
      normalize(&frame, &spec(2, 2, 3)),
      Err(NormalizeError::InsufficientChannels {
        source_channels: 2,
        target_channels: 3
      })
    );
  }

  #[test]
  fn test_unsupported_format() {
    let data = [0u8; 3 * 4];
    let frame = RawFrame::new(&data, 2, 2, PixelFormat::Rgb888);
    assert_eq!(
      normalize(&frame, &spec(2, 2, 3)),
      Err(NormalizeError::UnsupportedFormat(PixelFormat::Rgb888))
    );
  }

  #[test]
  fn test_center_crop_wide_source() {
    assert_eq!(
      center_crop(640, 480, 224, 224),
      CropRegion {
        x: 80,
        y: 0,
        width: 480,
        height: 480
      }
    );
    assert_eq!(
      center_crop(480, 640, 224, 224),
      CropRegion {
        x: 0,
        y: 80,
        width: 480,
        height: 480
      }
    );
  }

  #[test]
  fn test_crop_keeps_center_columns() {
    // 4x2 RGBA，每列取不同的红色值
    let mut data = Vec::new();
    for _ in 0..2 {
      for column in 0..4u8 {
        data.extend_from_slice(&[column * 10, 0, 0, 255]);
      }
    }
    let frame = RawFrame::new(&data, 4, 2, PixelFormat::Rgba8888);
    let image = normalize(&frame, &spec(2, 2, 3)).unwrap();
    assert_eq!(
      image.as_nhwc(),
      &[10, 0, 0, 20, 0, 0, 10, 0, 0, 20, 0, 0]
    );
  }

  #[test]
  fn test_downscale_uniform_color() {
    let data: Vec<u8> = [50u8, 100, 150, 0].repeat(8 * 8);
    let frame = RawFrame::new(&data, 8, 8, PixelFormat::Bgrx8888);
    let image = normalize(&frame, &spec(2, 2, 3)).unwrap();
    assert_eq!(image.as_nhwc(), [150u8, 100, 50].repeat(4).as_slice());
  }

  #[test]
  fn test_row_padding_and_batch() {
    // 每行 1 像素 + 4 字节填充
    let data = [1u8, 2, 3, 4, 9, 9, 9, 9, 5, 6, 7, 8];
    let frame = RawFrame::with_stride(&data, 1, 2, 8, PixelFormat::Rgba8888);
    let image = normalize(&frame, &spec(1, 1, 3).with_batch_size(2)).unwrap();
    assert_eq!(image.batch_size(), 2);
    assert_eq!(image.len(), 6);
    assert_eq!(image.as_nhwc()[..3], image.as_nhwc()[3..]);
  }

  #[test]
  fn test_last_row_needs_no_padding() {
    // stride 12，两行 2 像素: 12 + 8 = 20 字节即可
    let data = [7u8; 20];
    let frame = RawFrame::with_stride(&data, 2, 2, 12, PixelFormat::Rgba8888);
    assert!(normalize(&frame, &spec(2, 2, 3)).is_ok());

    let frame = RawFrame::with_stride(&data[..19], 2, 2, 12, PixelFormat::Rgba8888);
    assert_eq!(
      normalize(&frame, &spec(2, 2, 3)),
      Err(NormalizeError::BufferTooSmall {
        expected: 20,
        actual: 19
      })
    );
  }

  #[test]
  fn test_buffer_too_small() {
    let data = [0u8; 7];
    let frame = RawFrame::new(&data, 2, 1, PixelFormat::Rgba8888);
    assert!(matches!(
      normalize(&frame, &spec(1, 1, 3)),
      Err(NormalizeError::BufferTooSmall { .. })
    ));
  }
}

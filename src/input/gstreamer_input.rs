// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! # GStreamer 视频输入模块
//!
//! 从摄像头或视频文件按设备原生帧率取帧，统一转换为 32 位交织格式
//! （默认 BGRA），交给分类流水线。裁剪与缩放由归一化器完成，
//! 这里不做宽高比处理。
//!
//! ## URL 格式
//!
//! - 摄像头: `gst://camera/dev/video0?width=1280&height=720&fps=30`
//! - 视频文件: `gst://file/path/to/video.mp4`
//!
//! 可选参数 `rotate`（0/90/180/270）与 `target`（BGRA、BGRx、RGBA、ARGB）。
//!
//! ## 系统依赖
//!
//! 使用前需要安装 GStreamer 开发库：
//!
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```

use std::collections::HashMap;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{FrameEvent, PixelFormat},
  input::{CapturedFrame, FrameData, next_converted},
};

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配（期望 "gst://"）
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 不支持的视频格式
  #[error("Unsupported video format: {0}")]
  UnsupportedFormat(String),
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 缓冲区大小不匹配
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

pub enum GStreamerInputBuilderItem {
  FileSource(String),
  CameraSource {
    camera: String,
    io_mode: Option<u32>,
    width: u32,
    height: u32,
    fps: u32,
  },
  TargetFormat {
    format: String,
  },
  VideoFlip {
    method: u32,
    direction: u32,
  },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location={} ! decodebin", path)
      }
      GStreamerInputBuilderItem::CameraSource {
        camera,
        io_mode,
        width,
        height,
        fps,
      } => {
        let io_mode_str = if let Some(mode) = io_mode {
          format!(" io-mode={}", mode)
        } else {
          "".to_string()
        };
        format!(
          "v4l2src device={}{} ! video/x-raw,width={},height={},framerate={}/1",
          camera, io_mode_str, width, height, fps
        )
      }
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
      GStreamerInputBuilderItem::VideoFlip { method, direction } => {
        format!("videoflip method={} video-direction={}", method, direction)
      }
    }
  }
}

/// GStreamer 输入管道构建器
///
/// ```no_run
/// use shanan_classify::input::GStreamerInputPipelineBuilder;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let input = GStreamerInputPipelineBuilder::new()
///     .camera("/dev/video0", 640, 480, 30)
///     .target_format("BGRA")
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct GStreamerInputPipelineBuilder {
  items: Vec<GStreamerInputBuilderItem>,
}

const DEFAULT_TARGET_FORMAT: &str = "BGRA";

impl GStreamerInputPipelineBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn camera(mut self, device: &str, width: u32, height: u32, fps: u32) -> Self {
    self.items.push(GStreamerInputBuilderItem::CameraSource {
      camera: device.to_string(),
      io_mode: None,
      width,
      height,
      fps,
    });
    self
  }

  pub fn file(mut self, path: &str) -> Self {
    self
      .items
      .push(GStreamerInputBuilderItem::FileSource(path.to_string()));
    self
  }

  pub fn target_format(mut self, format: &str) -> Self {
    self.items.push(GStreamerInputBuilderItem::TargetFormat {
      format: format.to_string(),
    });
    self
  }

  fn build_video_pipline(path: &str, query: &HashMap<String, String>) -> Self {
    let parse = |key: &str, default: u32| {
      query
        .get(key)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
    };

    let mut items = vec![GStreamerInputBuilderItem::CameraSource {
      camera: path.to_string(),
      io_mode: query.get("io-mode").and_then(|v| v.parse::<u32>().ok()),
      width: parse("width", 640),
      height: parse("height", 480),
      fps: parse("fps", 30),
    }];

    if let Some(video_flip) = Self::video_flip(query.get("rotate").map(|s| s.as_ref())) {
      items.push(video_flip);
    }

    GStreamerInputPipelineBuilder { items }
  }

  fn build_file_pipeline(path: &str, query: &HashMap<String, String>) -> Self {
    let mut items = vec![GStreamerInputBuilderItem::FileSource(path.to_string())];

    if let Some(video_flip) = Self::video_flip(query.get("rotate").map(|s| s.as_ref())) {
      items.push(video_flip);
    }

    GStreamerInputPipelineBuilder { items }
  }

  fn video_flip(rotate: Option<&str>) -> Option<GStreamerInputBuilderItem> {
    let (method, direction) = match rotate? {
      "90" => (1, 1),
      "180" => (2, 2),
      "270" => (3, 3),
      _ => (0, 0),
    };
    Some(GStreamerInputBuilderItem::VideoFlip { method, direction })
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    // 丢弃来不及处理的帧，不在管道中排队
    let full_pipeline = format!(
      "{} ! appsink max-buffers=2 drop=true name=sink",
      basic_pipeline
    );

    info!("GStreamer pipeline description: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerInput {
      pipeline,
      appsink,
      frame_index: 0,
    })
  }
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let builder = match url.host_str() {
      Some("camera") => Self::build_video_pipline(url.path(), &query),
      Some("file") => Self::build_file_pipeline(url.path(), &query),
      _ => {
        return Err(GStreamerInputError::SchemeMismatch);
      }
    };

    let format = query
      .get("target")
      .map(String::as_str)
      .unwrap_or(DEFAULT_TARGET_FORMAT);
    Ok(builder.target_format(format))
  }
}

/// GStreamer 视频输入，迭代输出 32 位交织格式的帧
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  frame_index: u64,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      tracing::warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl Iterator for GStreamerInput {
  type Item = CapturedFrame;

  /// 只有拉取失败（流结束或管道错误）才结束迭代
  fn next(&mut self) -> Option<Self::Item> {
    let appsink = &self.appsink;
    let frame_index = &mut self.frame_index;
    next_converted(
      || {
        appsink
          .pull_sample()
          .map_err(|e| info!("停止拉取样本: {}", e))
          .ok()
      },
      |sample| {
        *frame_index += 1;
        convert_sample(sample, *frame_index)
      },
    )
  }
}

fn pixel_format(format: gst_video::VideoFormat) -> Result<PixelFormat, GStreamerInputError> {
  match format {
    gst_video::VideoFormat::Bgra => Ok(PixelFormat::Bgra8888),
    gst_video::VideoFormat::Bgrx => Ok(PixelFormat::Bgrx8888),
    gst_video::VideoFormat::Rgba => Ok(PixelFormat::Rgba8888),
    gst_video::VideoFormat::Argb => Ok(PixelFormat::Argb8888),
    other => Err(GStreamerInputError::UnsupportedFormat(format!("{:?}", other))),
  }
}

/// 映射后的只读缓冲区，帧数据直接引用它而不复制
struct MappedSample(gst::MappedBuffer<gst::buffer::Readable>);

impl AsRef<[u8]> for MappedSample {
  fn as_ref(&self) -> &[u8] {
    self.0.as_slice()
  }
}

fn convert_sample(sample: gst::Sample, index: u64) -> Result<CapturedFrame, GStreamerInputError> {
  let buffer = sample
    .buffer_owned()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let format = pixel_format(video_info.format())?;
  let width = video_info.width();
  let height = video_info.height();
  let stride = video_info.stride()[0] as usize;
  let timestamp_ms = buffer.pts().map(|pts| pts.mseconds()).unwrap_or(0);

  let map = buffer.into_mapped_buffer_readable().map_err(|_| {
    GStreamerInputError::PipelineError("Failed to map buffer for reading".to_string())
  })?;

  let expected_size = stride * height as usize;
  if map.as_slice().len() < expected_size {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected: expected_size,
      actual: map.as_slice().len(),
    });
  }

  Ok(CapturedFrame {
    data: FrameData::new(MappedSample(map)),
    width,
    height,
    stride,
    format,
    event: FrameEvent::new(index, timestamp_ms),
  })
}

// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use tracing::info;
use url::Url;

use crate::{
  FromUrl,
  engine::{EngineBuilder, LoadEngine},
  frame::{ModelSpec, TensorLayout},
  labels::LabelTable,
  pipeline::ClassifyPipeline,
  schedule::{DEFAULT_FRAME_INTERVAL, FrameScheduler},
  tensor::FloatNormalization,
};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutArg {
  Nhwc,
  Nchw,
}

impl From<LayoutArg> for TensorLayout {
  fn from(layout: LayoutArg) -> Self {
    match layout {
      LayoutArg::Nhwc => TensorLayout::Nhwc,
      LayoutArg::Nchw => TensorLayout::Nchw,
    }
  }
}

/// 模型与流水线参数
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
  /// 模型路径，例如 model:///opt/models/mobilenet_quant_v1_224.json?threads=1
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 标签文件，每行一个标签
  #[arg(long, value_name = "FILE")]
  pub labels: PathBuf,

  /// 模型名称，默认取模型文件名
  #[arg(long, value_name = "NAME")]
  pub name: Option<String>,

  /// 模型输入宽度
  #[arg(long, default_value_t = 224, value_name = "PIXELS")]
  pub width: u32,

  /// 模型输入高度
  #[arg(long, default_value_t = 224, value_name = "PIXELS")]
  pub height: u32,

  /// 模型输入通道数
  #[arg(long, default_value_t = 3, value_name = "COUNT")]
  pub channels: usize,

  /// 批大小
  #[arg(long, default_value_t = 1, value_name = "COUNT")]
  pub batch_size: usize,

  /// 输入张量布局
  #[arg(long, value_enum, default_value_t = LayoutArg::Nhwc)]
  pub layout: LayoutArg,

  /// 浮点模型输入均值
  #[arg(long, default_value_t = 127.5, value_name = "VALUE")]
  pub mean: f32,

  /// 浮点模型输入标准差
  #[arg(long, default_value_t = 127.5, value_name = "VALUE")]
  pub std: f32,

  /// 输出的结果数量
  #[arg(long, default_value_t = 1, value_name = "COUNT")]
  pub top_n: usize,

  /// 每隔多少帧推理一次
  #[arg(long, default_value_t = DEFAULT_FRAME_INTERVAL, value_name = "FRAMES")]
  pub interval: u32,
}

impl ModelArgs {
  fn model_name(&self) -> String {
    self.name.clone().unwrap_or_else(|| {
      std::path::Path::new(self.model.path())
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string())
    })
  }

  pub fn model_spec(&self) -> ModelSpec {
    ModelSpec::new(self.model_name(), self.width, self.height)
      .with_channels(self.channels)
      .with_batch_size(self.batch_size)
  }

  /// 浮点输入归一化参数，std 为 0 或任一参数非有限值时报错
  pub fn normalization(&self) -> Result<FloatNormalization> {
    if !self.mean.is_finite() || !self.std.is_finite() || self.std == 0.0 {
      bail!("无效的浮点归一化参数: mean={}, std={}", self.mean, self.std);
    }
    Ok(FloatNormalization {
      mean: self.mean,
      std: self.std,
    })
  }

  /// 加载标签与模型并组装流水线，任何一步失败都无法继续运行
  pub fn build_pipeline<E: LoadEngine>(&self) -> Result<ClassifyPipeline<E, ()>> {
    let normalization = self.normalization().context("参数检查失败")?;
    info!("模型文件路径: {}", self.model);
    info!("标签文件路径: {}", self.labels.display());

    let labels = LabelTable::load(&self.labels).context("无法加载标签文件")?;
    let engine: E = EngineBuilder::from_url(&self.model)?
      .build()
      .context("无法加载模型")?;
    let spec = self.model_spec();
    info!(
      "模型 {}: 输入 {}x{}x{}, 批大小 {}, 标签 {} 个",
      spec.name,
      spec.input_width,
      spec.input_height,
      spec.input_channels,
      spec.batch_size,
      labels.len()
    );

    Ok(
      ClassifyPipeline::new(spec, labels, engine, ())
        .with_scheduler(FrameScheduler::with_threshold(self.interval))
        .with_layout(self.layout.into())
        .with_normalization(normalization)
        .with_top_n(self.top_n),
    )
  }
}

#[cfg(test)]
mod tests {
  use clap::Parser;

  use super::*;
  use crate::engine::ReplayEngine;

  #[derive(Parser)]
  struct TestArgs {
    #[command(flatten)]
    model: ModelArgs,
  }

  #[test]
  fn test_defaults() {
    let args = TestArgs::parse_from([
      "test",
      "--model",
      "model:///opt/models/mobilenet_quant_v1_224.json",
      "--labels",
      "labels.txt",
    ]);
    let spec = args.model.model_spec();
    assert_eq!(spec.name, "mobilenet_quant_v1_224");
    assert_eq!(spec.input_len(), 224 * 224 * 3);
    assert_eq!(args.model.interval, 60);
    assert_eq!(args.model.top_n, 1);
    assert_eq!(args.model.layout, LayoutArg::Nhwc);
    assert_eq!(args.model.normalization().unwrap(), FloatNormalization::default());
  }

  #[test]
  fn test_rejects_bad_normalization() {
    for (mean, std) in [("0", "0"), ("nan", "1"), ("0", "inf")] {
      let args = TestArgs::parse_from([
        "test",
        "--model",
        "model:///tmp/m.json",
        "--labels",
        "labels.txt",
        "--mean",
        mean,
        "--std",
        std,
      ]);
      assert!(args.model.normalization().is_err());
      assert!(args.model.build_pipeline::<ReplayEngine>().is_err());
    }
  }
}

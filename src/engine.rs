// 该文件是 Shanan （山南西风） 项目的一部分。
// src/engine.rs - 推理引擎接口
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  tensor::{InputTensorBuffer, OutputTensor, TensorType},
};

#[derive(Error, Debug)]
pub enum EngineError {
  #[error("模型加载错误: {0}")]
  ModelLoad(String),
  #[error("推理调用错误: {0}")]
  Invocation(String),
  #[error("模型路径错误: {0}")]
  ModelPath(String),
}

/// 推理引擎选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
  pub threads: usize,
}

impl Default for EngineOptions {
  fn default() -> Self {
    Self { threads: 1 }
  }
}

/// 从磁盘读入的模型文件，格式由具体引擎解释
#[derive(Debug, Clone)]
pub struct ModelArtifact {
  path: PathBuf,
  data: Box<[u8]>,
}

impl ModelArtifact {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
    let path = path.as_ref();
    info!("加载模型文件: {}", path.display());
    let data = std::fs::read(path)
      .map_err(|e| EngineError::ModelLoad(format!("{}: {}", path.display(), e)))?;
    if data.is_empty() {
      return Err(EngineError::ModelLoad(format!(
        "模型文件为空: {}",
        path.display()
      )));
    }
    debug!(
      "模型文件大小: {:.2} MB",
      data.len() as f64 / (1024.0 * 1024.0)
    );

    Ok(Self {
      path: path.to_path_buf(),
      data: data.into_boxed_slice(),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn data(&self) -> &[u8] {
    &self.data
  }

  /// 模型名称，取文件名（不含扩展名）
  pub fn name(&self) -> String {
    self
      .path
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_default()
  }
}

/// 推理引擎。调用是阻塞的，同一实例不允许并发调用。
pub trait InferenceEngine {
  /// 模型输入张量的元素类型，决定输入编码方式
  fn input_type(&self) -> TensorType;

  fn invoke(&mut self, input: &InputTensorBuffer) -> Result<OutputTensor, EngineError>;
}

pub trait LoadEngine: InferenceEngine + Sized {
  fn load(artifact: ModelArtifact, options: &EngineOptions) -> Result<Self, EngineError>;
}

pub struct EngineBuilder {
  model_path: String,
  options: EngineOptions,
}

impl FromUrlWithScheme for EngineBuilder {
  const SCHEME: &'static str = "model";
}

impl FromUrl for EngineBuilder {
  type Error = EngineError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(EngineError::ModelPath(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut options = EngineOptions::default();
    for (k, v) in url.query_pairs() {
      if k == "threads" {
        options.threads = v
          .parse::<usize>()
          .ok()
          .filter(|&n| n > 0)
          .ok_or_else(|| EngineError::ModelPath(format!("无效的线程数: {}", v)))?;
      }
    }

    Ok(EngineBuilder {
      model_path: url.path().to_string(),
      options,
    })
  }
}

impl EngineBuilder {
  pub fn new(model_path: impl Into<String>) -> Self {
    Self {
      model_path: model_path.into(),
      options: EngineOptions::default(),
    }
  }

  pub fn threads(mut self, threads: usize) -> Self {
    self.options.threads = threads.max(1);
    self
  }

  pub fn options(&self) -> &EngineOptions {
    &self.options
  }

  pub fn model_path(&self) -> &str {
    &self.model_path
  }

  pub fn build<E: LoadEngine>(self) -> Result<E, EngineError> {
    let artifact = ModelArtifact::load(&self.model_path)?;
    info!("创建推理引擎, 线程数: {}", self.options.threads);
    let engine = E::load(artifact, &self.options)?;
    info!("模型加载完成");
    Ok(engine)
  }
}

mod replay;
pub use self::replay::ReplayEngine;

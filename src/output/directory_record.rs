// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  fs::OpenOptions,
  io::Write,
  path::PathBuf,
  sync::Mutex,
};

use chrono::{DateTime, Datelike, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::Render,
  pipeline::ClassificationResult,
};

const RECORD_FILE_NAME: &str = "results.jsonl";

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 按日期分目录，以 JSON 行的形式记录分类结果
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  // 串行化同一进程内的追加写入
  lock: Mutex<()>,
  /// 是否记录没有任何标签的结果
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput::new(PathBuf::from(uri.path()), always))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: PathBuf, always: bool) -> Self {
    Self {
      directory,
      lock: Mutex::new(()),
      always,
    }
  }

  fn record_path(&self, now: &DateTime<Utc>) -> Result<PathBuf, std::io::Error> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }
    Ok(directory.join(RECORD_FILE_NAME))
  }

  pub fn record_line(
    result: &ClassificationResult,
    now: &DateTime<Utc>,
  ) -> Result<String, serde_json::Error> {
    let top: Vec<serde_json::Value> = result
      .top
      .iter()
      .map(|item| {
        json!({
          "index": item.label_index,
          "label": item.label,
          "confidence": item.confidence,
        })
      })
      .collect();

    serde_json::to_string(&json!({
      "time": now.to_rfc3339(),
      "model": result.model_name,
      "frame": result.frame.index,
      "timestamp_ms": result.frame.timestamp_ms,
      "top": top,
    }))
  }
}

impl Render for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, result: &ClassificationResult) -> Result<(), Self::Error> {
    if !self.always && result.top.is_empty() {
      return Ok(());
    }

    let now = Utc::now();
    let line = Self::record_line(result, &now)?;
    let path = self.record_path(&now)?;

    let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    writeln!(file, "{}", line)?;
    debug!("记录结果到文件: {}", path.display());

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{frame::FrameEvent, select::Classification};

  fn result() -> ClassificationResult {
    ClassificationResult {
      model_name: "mobilenet".to_string(),
      frame: FrameEvent::new(120, 4000),
      top: vec![Classification {
        label_index: 3,
        label: "goldfish".to_string(),
        confidence: 0.5,
      }],
    }
  }

  #[test]
  fn test_record_line() {
    let now = DateTime::parse_from_rfc3339("2026-01-02T03:04:05Z")
      .unwrap()
      .with_timezone(&Utc);
    let line = DirectoryRecordOutput::record_line(&result(), &now).unwrap();
    let value: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(value["model"], "mobilenet");
    assert_eq!(value["frame"], 120);
    assert_eq!(value["top"][0]["label"], "goldfish");
    assert_eq!(value["top"][0]["confidence"], 0.5);
  }

  #[test]
  fn test_appends_lines() {
    let directory = std::env::temp_dir().join(format!("shanan-classify-record-{}", std::process::id()));
    let output = DirectoryRecordOutput::new(directory.clone(), false);
    output.render_result(&result()).unwrap();
    output.render_result(&result()).unwrap();

    let empty = ClassificationResult {
      top: Vec::new(),
      ..result()
    };
    output.render_result(&empty).unwrap();

    let path = output.record_path(&Utc::now()).unwrap();
    let contents = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_dir_all(&directory).unwrap();
    assert_eq!(contents.lines().count(), 2);
  }
}

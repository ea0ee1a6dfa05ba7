// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/console.rs - 终端文本输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::convert::Infallible;

use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{OutputError, Render},
  pipeline::ClassificationResult,
};

/// 把结果作为文本打印到终端
pub struct ConsoleOutput {
  /// 是否列出全部 Top-N 结果
  all: bool,
}

impl FromUrlWithScheme for ConsoleOutput {
  const SCHEME: &'static str = "console";
}

impl FromUrl for ConsoleOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OutputError::SchemeMismatch);
    }
    let all = url.query_pairs().any(|(k, _)| k == "all");
    Ok(ConsoleOutput { all })
  }
}

impl ConsoleOutput {
  pub fn format(&self, result: &ClassificationResult) -> String {
    if !self.all {
      return result.display_text();
    }

    let mut lines = vec![result.model_name.clone()];
    for (rank, item) in result.top.iter().enumerate() {
      lines.push(format!(
        "{}. {} {}",
        rank + 1,
        item.label,
        item.display_confidence()
      ));
    }
    lines.join("\n")
  }
}

impl Render for ConsoleOutput {
  type Error = Infallible;

  fn render_result(&self, result: &ClassificationResult) -> Result<(), Self::Error> {
    info!(
      "第 {} 帧 (时间: {}ms) 分类结果已更新",
      result.frame.index, result.frame.timestamp_ms
    );
    println!("{}", self.format(result));
    Ok(())
  }
}

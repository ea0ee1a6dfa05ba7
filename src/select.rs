// 该文件是 Shanan （山南西风） 项目的一部分。
// src/select.rs - Top-N 选择
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

use std::cmp::Ordering;

use thiserror::Error;

use crate::labels::LabelTable;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SelectError {
  #[error("标签数量不匹配: 标签表 {labels} 个, 输出 {scores} 个")]
  LabelCountMismatch { labels: usize, scores: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredLabel {
  pub label_index: usize,
  pub confidence: f32,
}

impl ScoredLabel {
  pub fn new(label_index: usize, confidence: f32) -> Self {
    Self {
      label_index,
      confidence,
    }
  }
}

/// 置信度降序，相同时序号升序，NaN 排在最后
fn rank(a: &ScoredLabel, b: &ScoredLabel) -> Ordering {
  let by_confidence = match (a.confidence.is_nan(), b.confidence.is_nan()) {
    (false, false) => b
      .confidence
      .partial_cmp(&a.confidence)
      .unwrap_or(Ordering::Equal),
    (true, false) => Ordering::Greater,
    (false, true) => Ordering::Less,
    (true, true) => Ordering::Equal,
  };
  by_confidence.then(a.label_index.cmp(&b.label_index))
}

/// 返回置信度最高的 `n` 项，保留完整精度
pub fn select_top_n(scores: impl IntoIterator<Item = ScoredLabel>, n: usize) -> Vec<ScoredLabel> {
  if n == 0 {
    return Vec::new();
  }

  let mut scores: Vec<ScoredLabel> = scores.into_iter().collect();
  if n < scores.len() {
    scores.select_nth_unstable_by(n - 1, rank);
    scores.truncate(n);
  }
  scores.sort_unstable_by(rank);
  scores
}

/// 将解码后的置信度与标签表一一对应
pub fn score_labels(scores: &[f32], labels: &LabelTable) -> Result<Vec<ScoredLabel>, SelectError> {
  if scores.len() != labels.len() {
    return Err(SelectError::LabelCountMismatch {
      labels: labels.len(),
      scores: scores.len(),
    });
  }
  Ok(
    scores
      .iter()
      .enumerate()
      .map(|(index, &confidence)| ScoredLabel::new(index, confidence))
      .collect(),
  )
}

/// 面向展示的分类结果
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
  pub label_index: usize,
  pub label: String,
  pub confidence: f32,
}

impl Classification {
  pub fn from_scored(scored: &ScoredLabel, labels: &LabelTable) -> Option<Self> {
    labels.get(scored.label_index).map(|label| Classification {
      label_index: scored.label_index,
      label: label.to_string(),
      confidence: scored.confidence,
    })
  }

  /// 展示用的置信度，截断到小数点后 3 位
  pub fn display_confidence(&self) -> f32 {
    (self.confidence * 1000.0).floor() / 1000.0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scores(values: &[f32]) -> Vec<ScoredLabel> {
    values
      .iter()
      .enumerate()
      .map(|(i, &c)| ScoredLabel::new(i, c))
      .collect()
  }

  #[test]
  fn test_top1_tie_prefers_lower_index() {
    let top = select_top_n(scores(&[0.2, 0.9, 0.9]), 1);
    assert_eq!(top, vec![ScoredLabel::new(1, 0.9)]);
  }

  #[test]
  fn test_zero_is_empty() {
    assert!(select_top_n(scores(&[0.2, 0.9]), 0).is_empty());
    assert!(select_top_n(Vec::<ScoredLabel>::new(), 0).is_empty());
  }

  #[test]
  fn test_n_larger_than_input() {
    let top = select_top_n(scores(&[0.1, 0.3, 0.2]), 10);
    let order: Vec<usize> = top.iter().map(|s| s.label_index).collect();
    assert_eq!(order, vec![1, 2, 0]);
  }

  #[test]
  fn test_order_is_deterministic() {
    let input = scores(&[0.5, 0.7, 0.5, 0.7, 0.1, 0.5]);
    let top = select_top_n(input.iter().rev().copied(), 4);
    let order: Vec<usize> = top.iter().map(|s| s.label_index).collect();
    assert_eq!(order, vec![1, 3, 0, 2]);
  }

  #[test]
  fn test_nan_ranks_last() {
    let top = select_top_n(scores(&[f32::NAN, 0.1]), 2);
    assert_eq!(top[0].label_index, 1);
    assert!(top[1].confidence.is_nan());
  }

  #[test]
  fn test_signed_zero_ties_by_index() {
    let top = select_top_n(vec![ScoredLabel::new(0, -0.0), ScoredLabel::new(1, 0.0)], 1);
    assert_eq!(top[0].label_index, 0);
    let top = select_top_n(vec![ScoredLabel::new(3, 0.0), ScoredLabel::new(2, -0.0)], 2);
    let order: Vec<usize> = top.iter().map(|s| s.label_index).collect();
    assert_eq!(order, vec![2, 3]);
  }

  #[test]
  fn test_precision_preserved() {
    let top = select_top_n(scores(&[0.123_456, 0.123_457]), 2);
    assert_eq!(top[0].confidence, 0.123_457);
    assert_eq!(top[0].label_index, 1);
  }

  #[test]
  fn test_score_labels_mismatch() {
    let labels: LabelTable = ["cat", "dog"].into_iter().collect();
    assert_eq!(
      score_labels(&[0.1, 0.2, 0.3], &labels),
      Err(SelectError::LabelCountMismatch {
        labels: 2,
        scores: 3
      })
    );
    assert_eq!(score_labels(&[0.1, 0.2], &labels).unwrap().len(), 2);
  }

  #[test]
  fn test_display_confidence_truncates() {
    let labels: LabelTable = ["cat"].into_iter().collect();
    let item = Classification::from_scored(&ScoredLabel::new(0, 0.98765), &labels).unwrap();
    assert_eq!(item.label, "cat");
    assert_eq!(item.display_confidence(), 0.987);
  }
}

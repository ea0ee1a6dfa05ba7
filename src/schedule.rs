// 该文件是 Shanan （山南西风） 项目的一部分。
// src/schedule.rs - 帧调度（节流）
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

use tracing::{trace, warn};

use crate::frame::FrameEvent;

pub const DEFAULT_FRAME_INTERVAL: u32 = 60;

/// 每隔 `threshold` 帧放行一帧，其余帧直接丢弃
#[derive(Debug, Clone)]
pub struct FrameScheduler {
  counter: u32,
  threshold: u32,
}

impl Default for FrameScheduler {
  fn default() -> Self {
    Self::with_threshold(DEFAULT_FRAME_INTERVAL)
  }
}

impl FrameScheduler {
  pub fn with_threshold(threshold: u32) -> Self {
    let threshold = if threshold == 0 {
      warn!("帧间隔不能为 0, 改为处理每一帧");
      1
    } else {
      threshold
    };
    Self {
      counter: 0,
      threshold,
    }
  }

  pub fn threshold(&self) -> u32 {
    self.threshold
  }

  pub fn counter(&self) -> u32 {
    self.counter
  }

  pub fn should_process(&mut self, event: &FrameEvent) -> bool {
    self.counter += 1;
    if self.counter >= self.threshold {
      self.counter = 0;
      trace!("放行第 {} 帧", event.index);
      true
    } else {
      false
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_every_sixtieth_frame() {
    let mut scheduler = FrameScheduler::default();
    let decisions: Vec<bool> = (1..=120)
      .map(|i| scheduler.should_process(&FrameEvent::new(i, 0)))
      .collect();

    assert!(decisions[..59].iter().all(|d| !d));
    assert!(decisions[59]);
    assert!(decisions[60..119].iter().all(|d| !d));
    assert!(decisions[119]);
    assert_eq!(scheduler.counter(), 0);
  }

  #[test]
  fn test_counter_resets() {
    let mut scheduler = FrameScheduler::with_threshold(3);
    let event = FrameEvent::default();
    assert!(!scheduler.should_process(&event));
    assert!(!scheduler.should_process(&event));
    assert!(scheduler.should_process(&event));
    assert_eq!(scheduler.counter(), 0);
    assert!(!scheduler.should_process(&event));
    assert_eq!(scheduler.counter(), 1);
  }

  #[test]
  fn test_zero_threshold_processes_all() {
    let mut scheduler = FrameScheduler::with_threshold(0);
    assert_eq!(scheduler.threshold(), 1);
    assert!(scheduler.should_process(&FrameEvent::default()));
    assert!(scheduler.should_process(&FrameEvent::default()));
  }
}

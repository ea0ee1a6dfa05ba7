// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 推理任务
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

use std::{
  fmt::Display,
  sync::mpsc,
  thread,
  time::Duration,
};

use anyhow::Context;
use tracing::{error, info, warn};

use crate::{
  engine::InferenceEngine,
  input::CapturedFrame,
  output::Render,
  pipeline::{ClassificationResult, ClassifyPipeline, FrameOutcome},
};

pub trait Task<I, E, O>: Sized {
  type Error;
  fn run_task(self, input: I, pipeline: ClassifyPipeline<E, ()>, output: O)
  -> Result<(), Self::Error>;
}

/// 只处理第一帧，不经过帧调度
pub struct OneShotTask;

impl<I, E, O> Task<I, E, O> for OneShotTask
where
  I: Iterator<Item = CapturedFrame>,
  E: InferenceEngine,
  O: Render,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    mut input: I,
    mut pipeline: ClassifyPipeline<E, ()>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let result = pipeline.classify(&frame.as_raw(), &frame.event)?;
    output.render_result(&result)?;
    info!("任务完成，退出");

    Ok(())
  }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TaskSummary {
  pub frames: u64,
  pub delivered: u64,
  pub failed: u64,
}

/// 持续处理输入流，直到输入结束、达到指定帧数或收到中断信号
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<u64>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<u64>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 不安装中断处理的主循环
  pub fn run_until<I, E, O>(
    &self,
    input: I,
    pipeline: ClassifyPipeline<E, ()>,
    output: O,
    stop: &mpsc::Receiver<()>,
  ) -> anyhow::Result<TaskSummary>
  where
    I: Iterator<Item = CapturedFrame>,
    E: InferenceEngine,
    O: Render + Send + 'static,
    O::Error: Display,
  {
    let (tx, rx) = mpsc::channel::<ClassificationResult>();

    // 结果在独立线程上展示，流水线线程不等待
    let display = thread::spawn(move || {
      for result in rx {
        if let Err(e) = output.render_result(&result) {
          error!("输出结果失败: {}", e);
        }
      }
    });

    let mut pipeline = pipeline.with_sink(tx);
    let mut summary = TaskSummary::default();

    for frame in input {
      summary.frames += 1;
      match pipeline.on_frame(&frame.as_raw(), &frame.event) {
        FrameOutcome::Delivered => summary.delivered += 1,
        FrameOutcome::Failed => summary.failed += 1,
        FrameOutcome::Skipped => {}
      }

      if self.frame_number.is_some_and(|n| summary.frames >= n) {
        info!("达到指定帧数 {}, 退出任务循环", summary.frames);
        break;
      }
      if stop.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    // 关闭发送端，让显示线程处理完剩余结果后退出
    drop(pipeline);
    display
      .join()
      .map_err(|_| anyhow::anyhow!("显示线程异常退出"))?;

    info!(
      "共 {} 帧, 完成推理 {} 次, 失败 {} 次",
      summary.frames, summary.delivered, summary.failed
    );
    Ok(summary)
  }
}

impl<I, E, O> Task<I, E, O> for ContinuousTask
where
  I: Iterator<Item = CapturedFrame>,
  E: InferenceEngine,
  O: Render + Send + 'static,
  O::Error: Display,
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    pipeline: ClassifyPipeline<E, ()>,
    output: O,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .context("无法设置 Ctrl-C 处理函数")?;

    self.run_until(input, pipeline, output, &rx)?;

    info!("任务完成，退出");
    Ok(())
  }
}

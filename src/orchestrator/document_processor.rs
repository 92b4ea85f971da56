//! 单份答案处理器 - 编排层
//!
//! ## 职责
//!
//! - 按规范顺序调度步骤（全量 / 指定步骤）
//! - 每个步骤开始和结束时把状态写入状态存储，再开始下一步
//! - 同一份答案同时只允许一个运行
//! - 汇总运行报告
//!
//! 状态写入是尽力而为：失败只记录日志，不中断处理。

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{AppResult, PipelineError};
use crate::infrastructure::StateStore;
use crate::models::{
    timestamp_now, DocumentKey, DocumentStatus, PipelineStep, ProcessingState, StatePatch, StepTiming,
};
use crate::workflow::{DocumentCtx, StepExecutor, StepOutcome};

/// 失败步骤及错误信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepError {
    pub step: PipelineStep,
    pub error: String,
}

/// 一次运行的报告
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub done: Vec<PipelineStep>,
    pub skipped: Vec<PipelineStep>,
    pub errors: Vec<StepError>,
    pub status: Option<DocumentStatus>,
    pub timeline: BTreeMap<PipelineStep, StepTiming>,
}

impl RunReport {
    /// 停在人工确认或无题库
    pub fn is_halted(&self) -> bool {
        matches!(
            self.status,
            Some(DocumentStatus::NeedsManualReview) | Some(DocumentStatus::NoMatchFound)
        )
    }

    pub fn is_failed(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// 状态查询结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub status: DocumentStatus,
    pub last_step: Option<PipelineStep>,
    pub last_error: Option<String>,
    pub timeline: BTreeMap<PipelineStep, StepTiming>,
}

/// 运行中的答案登记，drop 时注销
struct RunGuard<'a> {
    active: &'a Mutex<HashSet<String>>,
    stem: String,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        active.remove(&self.stem);
    }
}

/// 流水线编排器
pub struct PipelineOrchestrator {
    executor: StepExecutor,
    states: Arc<StateStore>,
    active: Mutex<HashSet<String>>,
}

impl PipelineOrchestrator {
    pub fn new(executor: StepExecutor, states: Arc<StateStore>) -> Self {
        Self {
            executor,
            states,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// 全量处理一份答案
    ///
    /// 已处于终态（添削完了 / AI添削完了 / 要手動確認）时不做任何事。
    pub async fn run_full(&self, filename: &str) -> AppResult<RunReport> {
        self.run_full_indexed(filename, 1).await
    }

    /// 全量处理，`index` 仅用于日志
    pub async fn run_full_indexed(&self, filename: &str, index: usize) -> AppResult<RunReport> {
        let doc = DocumentKey::new(filename)?;
        let _guard = self.begin(&doc)?;

        let state = self.read_state(&doc).await;
        if let Some(status) = state.status.as_ref().filter(|s| s.is_terminal()) {
            info!("[答案 {}] {} ⏭️ 已是终态 {}，跳过", index, doc, status);
            return Ok(RunReport {
                status: Some(status.clone()),
                timeline: state.timeline,
                ..Default::default()
            });
        }

        let ctx = DocumentCtx::new(doc, index);
        info!("{} 🚀 开始全量处理", ctx);
        Ok(self.run_pipeline(&ctx, &PipelineStep::ALL, state.timeline).await)
    }

    /// 只执行指定步骤（按规范顺序，与输入顺序无关）
    ///
    /// # 参数
    /// - `filename`: 上传文件名
    /// - `steps`: 请求的步骤
    /// - `force`: 先删除步骤的既有产物再执行
    pub async fn run_steps(
        &self,
        filename: &str,
        steps: &[PipelineStep],
        force: bool,
    ) -> AppResult<RunReport> {
        let doc = DocumentKey::new(filename)?;
        let _guard = self.begin(&doc)?;
        let steps = PipelineStep::canonical_subset(steps);

        let state = self.read_state(&doc).await;
        let ctx = DocumentCtx::reprocess(doc, force);
        info!(
            "{} 🔁 再处理: {} (force={})",
            ctx,
            steps.iter().map(|s| s.name()).collect::<Vec<_>>().join(","),
            force
        );

        self.record(
            &ctx,
            StatePatch::status(DocumentStatus::ReprocessStarted).with_last_step(None),
        )
        .await;

        Ok(self.run_pipeline(&ctx, &steps, state.timeline).await)
    }

    /// 查询状态
    pub async fn status(&self, filename: &str) -> AppResult<StatusReport> {
        let doc = DocumentKey::new(filename)?;
        let state = self.states.read(&doc).await?;
        Ok(StatusReport {
            status: state.status.unwrap_or(DocumentStatus::Unprocessed),
            last_step: state.last_step,
            last_error: state.last_error,
            timeline: state.timeline,
        })
    }

    fn begin(&self, doc: &DocumentKey) -> AppResult<RunGuard<'_>> {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if !active.insert(doc.stem().to_string()) {
            warn!("⚠️ {} 正在处理中，拒绝重复运行", doc);
            return Err(PipelineError::AlreadyRunning(doc.filename().to_string()).into());
        }
        Ok(RunGuard {
            active: &self.active,
            stem: doc.stem().to_string(),
        })
    }

    async fn run_pipeline(
        &self,
        ctx: &DocumentCtx,
        steps: &[PipelineStep],
        mut timeline: BTreeMap<PipelineStep, StepTiming>,
    ) -> RunReport {
        let mut report = RunReport::default();

        for &step in steps {
            // ========== 步骤开始 ==========
            timeline.insert(
                step,
                StepTiming {
                    start: Some(timestamp_now()),
                    end: None,
                },
            );
            let mut start = StatePatch::status(ctx.in_progress_status(step))
                .with_last_step(Some(step))
                .with_last_error(None)
                .with_timeline(timeline.clone());
            if ctx.force && step == PipelineStep::Identify {
                // 强制重新识别时旧的题目集作废
                start = start.with_problem_set(None);
            }
            self.record(ctx, start).await;

            let result = self.executor.run(step, ctx).await;

            // ========== 步骤结束 ==========
            if let Some(timing) = timeline.get_mut(&step) {
                timing.end = Some(timestamp_now());
            }

            match result {
                Ok(result) => {
                    let status = result.outcome.status().clone();
                    let mut patch = result.patch;
                    patch.status = Some(status.clone());
                    patch.timeline = Some(timeline.clone());
                    self.record(ctx, patch).await;

                    report.status = Some(status.clone());
                    match result.outcome {
                        StepOutcome::Skipped(_) => report.skipped.push(step),
                        StepOutcome::Completed(_) => report.done.push(step),
                        StepOutcome::Halted(_) => {
                            report.done.push(step);
                            info!("{} ⏸️ 在 {} 步骤停止: {}", ctx, step, status);
                            break;
                        }
                    }
                }
                Err(failure) => {
                    error!("{} ❌ {} 步骤失败: {}", ctx, step, failure);
                    let status = DocumentStatus::Failed(step);
                    self.record(
                        ctx,
                        StatePatch::status(status.clone())
                            .with_last_error(Some(failure.message.clone()))
                            .with_timeline(timeline.clone()),
                    )
                    .await;

                    report.status = Some(status);
                    report.errors.push(StepError {
                        step,
                        error: failure.message,
                    });
                    break;
                }
            }
        }

        if report.errors.is_empty() && !report.is_halted() {
            info!("{} ✅ 处理完成: {}", ctx, report.status.as_ref().map(|s| s.label()).unwrap_or_default());
        }
        report.timeline = timeline;
        report
    }

    async fn read_state(&self, doc: &DocumentKey) -> ProcessingState {
        match self.states.read(doc).await {
            Ok(state) => state,
            Err(e) => {
                warn!("⚠️ {} 状态读取失败，按空状态处理: {}", doc, e);
                ProcessingState::default()
            }
        }
    }

    async fn record(&self, ctx: &DocumentCtx, patch: StatePatch) {
        if let Err(e) = self.states.merge(&ctx.doc, &patch).await {
            warn!("{} ⚠️ 状态写入失败（继续处理）: {}", ctx, e);
        }
    }
}

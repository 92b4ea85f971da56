//! 步骤执行器 - 流程层
//!
//! 核心职责：定义"一份答案的一个步骤"如何执行
//!
//! 每个步骤：
//! 1. 检查自己的产物，已存在且未强制 → 跳过（视为完成）
//! 2. 强制重跑 → 先删除自己的产物
//! 3. 调用业务能力（services），写入产物
//! 4. 返回步骤结果和需要合并进状态的字段
//!
//! 状态写入由编排层负责，本层不写也不读状态：步骤之间只通过产物传递数据。

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::AppError;
use crate::infrastructure::{ArtifactKind, ArtifactStore, DocumentRenderer};
use crate::models::{
    DocumentIdentity, DocumentStatus, ExamCatalogEntry, PipelineStep, QualityAssessment, StatePatch,
};
use crate::services::{
    CatalogService, ExamCatalogMatcher, GenerativeModel, IdentityService, ProblemTextService,
    QualityService, ReviewService, SelectionHints, TranscriptionService,
};
use crate::utils::logging::truncate_text;
use crate::workflow::document_ctx::DocumentCtx;

/// 步骤结果
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// 执行完成
    Completed(DocumentStatus),
    /// 产物已存在，未重新执行
    Skipped(DocumentStatus),
    /// 后续步骤不再执行（质量 NG / 无可用题库）
    Halted(DocumentStatus),
}

impl StepOutcome {
    /// 步骤结束后写入的状态
    pub fn status(&self) -> &DocumentStatus {
        match self {
            StepOutcome::Completed(status)
            | StepOutcome::Skipped(status)
            | StepOutcome::Halted(status) => status,
        }
    }
}

/// 步骤结果及需要合并进状态的字段
#[derive(Debug, Clone)]
pub struct StepResult {
    pub outcome: StepOutcome,
    pub patch: StatePatch,
}

impl StepResult {
    fn new(outcome: StepOutcome) -> Self {
        Self {
            outcome,
            patch: StatePatch::default(),
        }
    }

    fn with_patch(mut self, patch: StatePatch) -> Self {
        self.patch = patch;
        self
    }
}

/// 失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 输入缺失或无效（原件不存在、零页、转写缺失）
    Input,
    /// 外部能力失败（渲染、模型）
    External,
    /// 存储等内部错误
    Internal,
}

/// 步骤失败
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StepFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl StepFailure {
    pub fn input(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Input,
            message: message.into(),
        }
    }

    pub fn external(error: anyhow::Error) -> Self {
        Self {
            kind: FailureKind::External,
            message: format!("{:#}", error),
        }
    }
}

impl From<AppError> for StepFailure {
    fn from(error: AppError) -> Self {
        Self {
            kind: FailureKind::Internal,
            message: error.to_string(),
        }
    }
}

/// 步骤执行器
///
/// - 持有各步骤需要的业务能力
/// - 不持有状态存储，不决定步骤顺序
pub struct StepExecutor {
    artifacts: ArtifactStore,
    renderer: Arc<dyn DocumentRenderer>,
    quality: QualityService,
    transcription: TranscriptionService,
    identity: IdentityService,
    catalog: CatalogService,
    problem_texts: ProblemTextService,
    review: ReviewService,
    matcher: ExamCatalogMatcher,
}

impl StepExecutor {
    /// 创建步骤执行器
    ///
    /// # 参数
    /// - `config`: 应用配置
    /// - `artifacts`: 产物存储
    /// - `model`: 生成模型（质量、转写、抽取、添削共用）
    /// - `renderer`: PDF 渲染器
    pub fn new(
        config: &Config,
        artifacts: ArtifactStore,
        model: Arc<dyn GenerativeModel>,
        renderer: Arc<dyn DocumentRenderer>,
    ) -> Self {
        let storage = artifacts.storage().clone();
        Self {
            quality: QualityService::new(model.clone()),
            transcription: TranscriptionService::new(model.clone(), config.transcribe_dummy),
            identity: IdentityService::new(model.clone(), config.extract_use_ai),
            catalog: CatalogService::new(&config.problem_dir, storage.clone()),
            problem_texts: ProblemTextService::new(
                storage,
                renderer.clone(),
                config.problem_text_limit,
                config.pdf_text_limit,
            ),
            review: ReviewService::new(model, config.max_problem_files),
            matcher: ExamCatalogMatcher,
            artifacts,
            renderer,
        }
    }

    /// 执行一个步骤
    ///
    /// # 参数
    /// - `step`: 步骤
    /// - `ctx`: 答案上下文
    pub async fn run(&self, step: PipelineStep, ctx: &DocumentCtx) -> Result<StepResult, StepFailure> {
        match step {
            PipelineStep::Png => self.rasterize(ctx).await,
            PipelineStep::Quality => self.classify_quality(ctx).await,
            PipelineStep::Transcribe => self.transcribe(ctx).await,
            PipelineStep::Identify => self.identify(ctx).await,
            PipelineStep::Review => self.generate_review(ctx).await,
        }
    }

    // ========== 栅格化 ==========

    async fn rasterize(&self, ctx: &DocumentCtx) -> Result<StepResult, StepFailure> {
        if ctx.force {
            self.artifacts.delete(&ctx.doc, ArtifactKind::PageImage).await?;
        } else if self.artifacts.exists(&ctx.doc, ArtifactKind::PageImage).await? {
            info!("{} ⏭️ 页图已存在，跳过栅格化", ctx);
            return Ok(StepResult::new(StepOutcome::Skipped(DocumentStatus::Rasterized)));
        }

        let count = self.render_pages(ctx).await?.len();
        info!("{} 🖼️ 栅格化完成: {} 页", ctx, count);
        Ok(StepResult::new(StepOutcome::Completed(DocumentStatus::Rasterized)))
    }

    async fn render_pages(&self, ctx: &DocumentCtx) -> Result<Vec<Vec<u8>>, StepFailure> {
        let source = self
            .artifacts
            .get(&ctx.doc, ArtifactKind::Source)
            .await?
            .ok_or_else(|| {
                StepFailure::input(format!(
                    "原本が見つかりません: {}",
                    ArtifactStore::key_for(&ctx.doc, ArtifactKind::Source)
                ))
            })?;

        let pages = self
            .renderer
            .rasterize(&source)
            .await
            .map_err(StepFailure::external)?;
        if pages.is_empty() {
            return Err(StepFailure::input("PDF にページがありません"));
        }

        self.artifacts.put_pages(&ctx.doc, pages.clone()).await?;
        Ok(pages)
    }

    /// 读取页图，没有时从原件重新栅格化
    async fn ensure_pages(&self, ctx: &DocumentCtx) -> Result<Vec<Vec<u8>>, StepFailure> {
        let pages = self.artifacts.get_pages(&ctx.doc).await?;
        if !pages.is_empty() {
            return Ok(pages);
        }
        info!("{} 🔄 页图缺失，重新栅格化", ctx);
        self.render_pages(ctx).await
    }

    // ========== 质量判定 ==========

    async fn classify_quality(&self, ctx: &DocumentCtx) -> Result<StepResult, StepFailure> {
        if ctx.force {
            self.artifacts.delete(&ctx.doc, ArtifactKind::Quality).await?;
        } else {
            match self
                .artifacts
                .get_json::<QualityAssessment>(&ctx.doc, ArtifactKind::Quality)
                .await
            {
                Ok(Some(cached)) => {
                    info!("{} ⏭️ 使用已有质量判定: {}", ctx, cached.label.as_str());
                    return Ok(quality_result(cached, true));
                }
                Ok(None) => {}
                Err(e) => warn!("{} ⚠️ 质量判定缓存不可用，重新判定: {}", ctx, e),
            }
        }

        let first_page = match self.artifacts.get_first_page(&ctx.doc).await? {
            Some(page) => page,
            None => {
                info!("{} 🔄 页图缺失，重新栅格化", ctx);
                self.render_pages(ctx)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| StepFailure::input("PDF にページがありません"))?
            }
        };

        let assessment = self
            .quality
            .classify(&first_page)
            .await
            .map_err(StepFailure::external)?;
        self.artifacts
            .put_json(&ctx.doc, ArtifactKind::Quality, &assessment)
            .await?;

        info!(
            "{} 🔎 质量判定: {} ({})",
            ctx,
            assessment.label.as_str(),
            truncate_text(&assessment.reason, 60)
        );
        Ok(quality_result(assessment, false))
    }

    // ========== 转写 ==========

    async fn transcribe(&self, ctx: &DocumentCtx) -> Result<StepResult, StepFailure> {
        if ctx.force {
            self.artifacts.delete(&ctx.doc, ArtifactKind::Transcript).await?;
        } else if self.artifacts.exists(&ctx.doc, ArtifactKind::Transcript).await? {
            info!("{} ⏭️ 转写已存在，跳过", ctx);
            return Ok(StepResult::new(StepOutcome::Skipped(DocumentStatus::Transcribed)));
        }

        let pages = self.ensure_pages(ctx).await?;
        let transcript = self
            .transcription
            .transcribe_pages(&pages)
            .await
            .map_err(StepFailure::external)?;
        if transcript.trim().is_empty() {
            return Err(StepFailure::input("書き起こし結果が空です"));
        }

        self.artifacts
            .put_text(&ctx.doc, ArtifactKind::Transcript, &transcript)
            .await?;
        info!("{} 📝 转写完成: {} 字符", ctx, transcript.chars().count());
        Ok(StepResult::new(StepOutcome::Completed(DocumentStatus::Transcribed)))
    }

    async fn read_transcript(&self, ctx: &DocumentCtx) -> Result<String, StepFailure> {
        self.artifacts
            .get_text(&ctx.doc, ArtifactKind::Transcript)
            .await?
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| StepFailure::input("書き起こしが見つかりません"))
    }

    // ========== 识别 ==========

    async fn identify(&self, ctx: &DocumentCtx) -> Result<StepResult, StepFailure> {
        if ctx.force {
            self.artifacts.delete(&ctx.doc, ArtifactKind::ProblemSet).await?;
        }
        let transcript = self.read_transcript(ctx).await?;

        let (mut identity, cached) = self.load_or_extract_identity(ctx, &transcript).await?;

        let catalog = self.catalog.load().await?;
        let hints = SelectionHints::build(&identity, &transcript);
        let resolved = self
            .matcher
            .resolve(&catalog, &hints)
            .filter(|entry| entry.has_assets())
            .cloned();

        let Some(entry) = resolved else {
            warn!(
                "{} ⚠️ 题库中没有匹配的题目集 (大学: {:?}, 年度: {:?})",
                ctx, identity.university, identity.year
            );
            self.artifacts.delete(&ctx.doc, ArtifactKind::ProblemSet).await?;
            let patch = StatePatch {
                details: Some(identity),
                ..Default::default()
            }
            .with_problem_set(None);
            return Ok(StepResult::new(StepOutcome::Halted(DocumentStatus::NoMatchFound)).with_patch(patch));
        };

        info!("{} 🎯 匹配题目集: {}/{}", ctx, entry.university, entry.exam_type);
        identity.university = Some(entry.university.clone());
        self.artifacts
            .put_json(&ctx.doc, ArtifactKind::ProblemSet, &entry)
            .await?;

        let patch = StatePatch {
            details: Some(identity),
            ..Default::default()
        }
        .with_problem_set(Some(entry));
        let outcome = if cached {
            StepOutcome::Skipped(DocumentStatus::Identified)
        } else {
            StepOutcome::Completed(DocumentStatus::Identified)
        };
        Ok(StepResult::new(outcome).with_patch(patch))
    }

    /// 返回 (身份, 是否来自缓存)
    async fn load_or_extract_identity(
        &self,
        ctx: &DocumentCtx,
        transcript: &str,
    ) -> Result<(DocumentIdentity, bool), StepFailure> {
        if ctx.force {
            self.artifacts.delete(&ctx.doc, ArtifactKind::Identity).await?;
        } else {
            match self
                .artifacts
                .get_json::<DocumentIdentity>(&ctx.doc, ArtifactKind::Identity)
                .await
            {
                Ok(Some(cached)) if !cached.is_empty() => {
                    info!("{} ⏭️ 使用已有识别结果", ctx);
                    return Ok((cached, true));
                }
                Ok(_) => {}
                Err(e) => warn!("{} ⚠️ 识别缓存不可用，重新抽取: {}", ctx, e),
            }
        }

        let identity = self
            .identity
            .extract(transcript)
            .await
            .map_err(StepFailure::external)?;
        self.artifacts
            .put_json(&ctx.doc, ArtifactKind::Identity, &identity)
            .await?;
        Ok((identity, false))
    }

    // ========== 添削 ==========

    async fn generate_review(&self, ctx: &DocumentCtx) -> Result<StepResult, StepFailure> {
        let review_key = ArtifactStore::key_for(&ctx.doc, ArtifactKind::Review);
        let review_patch = StatePatch {
            review_ref: Some(review_key.clone()),
            ..Default::default()
        };

        if ctx.force {
            self.artifacts.delete(&ctx.doc, ArtifactKind::Review).await?;
        } else if self.artifacts.exists(&ctx.doc, ArtifactKind::Review).await? {
            info!("{} ⏭️ 添削结果已存在，跳过", ctx);
            return Ok(
                StepResult::new(StepOutcome::Skipped(DocumentStatus::ReviewComplete)).with_patch(review_patch),
            );
        }

        let entry = self
            .artifacts
            .get_json::<ExamCatalogEntry>(&ctx.doc, ArtifactKind::ProblemSet)
            .await?
            .filter(|entry| entry.has_assets())
            .ok_or_else(|| StepFailure::input("問題セットが特定されていません"))?;
        let transcript = self.read_transcript(ctx).await?;

        let problems = self.problem_texts.collect(&entry).await?;
        if problems.is_empty() {
            warn!("{} ⚠️ 题目集中没有可用文本: {}/{}", ctx, entry.university, entry.exam_type);
        }

        let review = self.review.generate(&transcript, &problems).await;
        self.artifacts
            .put_json(&ctx.doc, ArtifactKind::Review, &review)
            .await?;

        info!(
            "{} ✍️ 添削完成: {}/{} 分",
            ctx, review.summary.total_score, review.summary.max_score
        );
        Ok(StepResult::new(StepOutcome::Completed(DocumentStatus::ReviewComplete)).with_patch(review_patch))
    }
}

fn quality_result(assessment: QualityAssessment, cached: bool) -> StepResult {
    let outcome = if !assessment.is_ok() {
        StepOutcome::Halted(DocumentStatus::NeedsManualReview)
    } else if cached {
        StepOutcome::Skipped(DocumentStatus::Classified)
    } else {
        StepOutcome::Completed(DocumentStatus::Classified)
    };
    let patch = StatePatch {
        quality: Some(assessment),
        ..Default::default()
    };
    StepResult::new(outcome).with_patch(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QualityLabel;

    #[test]
    fn test_ng_quality_halts_even_when_cached() {
        let ng = QualityAssessment {
            label: QualityLabel::Ng,
            reason: "かすれ".to_string(),
        };
        let result = quality_result(ng, true);
        assert_eq!(result.outcome, StepOutcome::Halted(DocumentStatus::NeedsManualReview));
        assert!(result.patch.quality.is_some());
    }

    #[test]
    fn test_ok_quality_outcomes() {
        let ok = QualityAssessment {
            label: QualityLabel::Ok,
            reason: "鮮明".to_string(),
        };
        assert_eq!(
            quality_result(ok.clone(), true).outcome,
            StepOutcome::Skipped(DocumentStatus::Classified)
        );
        assert_eq!(
            quality_result(ok, false).outcome.status(),
            &DocumentStatus::Classified
        );
    }

    #[test]
    fn test_failure_messages() {
        let failure = StepFailure::external(anyhow::anyhow!("timeout").context("ページ1の書き起こしに失敗"));
        assert_eq!(failure.kind, FailureKind::External);
        assert_eq!(failure.to_string(), "ページ1の書き起こしに失敗: timeout");
    }
}

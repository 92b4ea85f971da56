//! 答案处理上下文
//!
//! 封装"我正在处理哪份答案、以什么方式处理"这一信息

use std::fmt::Display;

use crate::models::{DocumentKey, DocumentStatus, PipelineStep};

/// 答案处理上下文
#[derive(Debug, Clone)]
pub struct DocumentCtx {
    /// 答案标识
    pub doc: DocumentKey,

    /// 批次中的序号（仅用于日志显示）
    pub index: usize,

    /// 强制重跑：先删除步骤的既有产物
    pub force: bool,

    /// 指定步骤的再处理
    pub reprocess: bool,
}

impl DocumentCtx {
    /// 全量处理的上下文
    pub fn new(doc: DocumentKey, index: usize) -> Self {
        Self {
            doc,
            index,
            force: false,
            reprocess: false,
        }
    }

    /// 再处理的上下文
    pub fn reprocess(doc: DocumentKey, force: bool) -> Self {
        Self {
            doc,
            index: 1,
            force,
            reprocess: true,
        }
    }

    /// 步骤进行中写入的状态
    pub fn in_progress_status(&self, step: PipelineStep) -> DocumentStatus {
        if self.reprocess {
            return DocumentStatus::Reprocessing(step);
        }
        match step {
            PipelineStep::Png => DocumentStatus::Rasterizing,
            PipelineStep::Quality => DocumentStatus::Classifying,
            PipelineStep::Transcribe => DocumentStatus::Transcribing,
            PipelineStep::Identify => DocumentStatus::Identifying,
            PipelineStep::Review => DocumentStatus::Reviewing,
        }
    }
}

impl Display for DocumentCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[答案 {}] {}", self.index, self.doc)
    }
}

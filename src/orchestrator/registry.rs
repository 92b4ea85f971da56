//! 答案登记表 - 编排层
//!
//! ## 职责
//!
//! - 由 `uploaded_pdfs/` 和持久化状态重建内存缓存（只读视图，状态文件为准）
//! - 已有添削结果但状态落后时，自动提升为 AI添削完了
//! - 人工签收：写入 添削完了
//!
//! 添削完了 是人工终态，同步时不会覆盖。

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::infrastructure::artifact_store::UPLOAD_PREFIX;
use crate::infrastructure::{ArtifactKind, ArtifactStore, StateStore};
use crate::models::{AnswerDocument, DocumentKey, DocumentStatus, StatePatch};

/// 答案登记表
pub struct DocumentRegistry {
    artifacts: ArtifactStore,
    states: Arc<StateStore>,
    documents: RwLock<BTreeMap<String, AnswerDocument>>,
}

impl DocumentRegistry {
    pub fn new(artifacts: ArtifactStore, states: Arc<StateStore>) -> Self {
        Self {
            artifacts,
            states,
            documents: RwLock::new(BTreeMap::new()),
        }
    }

    /// 重建缓存
    ///
    /// # 返回
    /// 按文件名排序的全部答案
    pub async fn sync(&self) -> AppResult<Vec<AnswerDocument>> {
        let mut rebuilt = BTreeMap::new();

        for key in self.artifacts.storage().list(UPLOAD_PREFIX).await? {
            let Some(filename) = key.strip_prefix(UPLOAD_PREFIX) else {
                continue;
            };
            if filename.contains('/') || !filename.to_ascii_lowercase().ends_with(".pdf") {
                continue;
            }
            match self.load_document(filename).await {
                Ok(document) => {
                    rebuilt.insert(filename.to_string(), document);
                }
                Err(e) => warn!("⚠️ 跳过无法读取的答案 {}: {}", filename, e),
            }
        }

        debug!("登记表同步完成: {} 份", rebuilt.len());
        let documents: Vec<AnswerDocument> = rebuilt.values().cloned().collect();
        *self.documents.write().await = rebuilt;
        Ok(documents)
    }

    /// 读取单份答案的状态，必要时提升为 AI添削完了
    async fn load_document(&self, filename: &str) -> AppResult<AnswerDocument> {
        let doc = DocumentKey::new(filename)?;
        let mut state = self.states.read(&doc).await?;

        let status = state.status.clone().unwrap_or(DocumentStatus::Unprocessed);
        let promotable = !status.is_busy()
            && status != DocumentStatus::Completed
            && status != DocumentStatus::ReviewComplete;
        if promotable && self.artifacts.exists(&doc, ArtifactKind::Review).await? {
            info!("✓ {} 已有添削结果，状态 {} → {}", doc, status, DocumentStatus::ReviewComplete);
            let patch = StatePatch {
                status: Some(DocumentStatus::ReviewComplete),
                review_ref: Some(ArtifactStore::key_for(&doc, ArtifactKind::Review)),
                ..Default::default()
            };
            state = self.states.merge(&doc, &patch).await?;
        }

        Ok(AnswerDocument::from_state(filename, state))
    }

    /// 人工签收
    ///
    /// 写入 添削完了，并把缓存中的字段一起合并进状态。
    pub async fn mark_completed(&self, filename: &str) -> AppResult<AnswerDocument> {
        let doc = DocumentKey::new(filename)?;
        let current = self.states.read(&doc).await?;
        let cached = self.documents.read().await.get(doc.filename()).cloned();

        // 持久化状态优先，缺失的字段用缓存补齐
        let mut mirrored = AnswerDocument::from_state(doc.filename(), current);
        if let Some(cached) = cached {
            mirrored.quality = mirrored.quality.or(cached.quality);
            mirrored.details = mirrored.details.or(cached.details);
            mirrored.problem_set = mirrored.problem_set.or(cached.problem_set);
            mirrored.review_ref = mirrored.review_ref.or(cached.review_ref);
        }
        let patch = StatePatch {
            status: Some(DocumentStatus::Completed),
            quality: mirrored.quality,
            details: mirrored.details,
            problem_set: mirrored.problem_set.map(Some),
            review_ref: mirrored.review_ref,
            ..Default::default()
        };
        let state = self.states.merge(&doc, &patch).await?;
        info!("✅ {} 已签收", doc);

        let document = AnswerDocument::from_state(doc.filename(), state);
        self.documents
            .write()
            .await
            .insert(doc.filename().to_string(), document.clone());
        Ok(document)
    }
}

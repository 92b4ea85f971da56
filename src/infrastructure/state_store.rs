//! 状态存储
//!
//! 读-改-写整条 JSON 记录，补丁中出现的键覆盖旧值，其他键原样保留。

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::{AppError, AppResult, StorageError};
use crate::infrastructure::artifact_store::{ArtifactKind, ArtifactStore};
use crate::models::{timestamp_now, DocumentKey, ProcessingState, StatePatch};

pub struct StateStore {
    artifacts: ArtifactStore,
    // 串行化合并写入
    write_lock: Mutex<()>,
}

impl StateStore {
    pub fn new(artifacts: ArtifactStore) -> Self {
        Self {
            artifacts,
            write_lock: Mutex::new(()),
        }
    }

    /// 读取状态，不存在时返回空状态
    pub async fn read(&self, doc: &DocumentKey) -> AppResult<ProcessingState> {
        let raw = self.read_raw(doc).await?;
        serde_json::from_value(Value::Object(raw))
            .map_err(|e| AppError::json_parse_failed(ArtifactStore::key_for(doc, ArtifactKind::State), e))
    }

    /// 合并补丁并返回合并后的状态
    pub async fn merge(&self, doc: &DocumentKey, patch: &StatePatch) -> AppResult<ProcessingState> {
        let _guard = self.write_lock.lock().await;
        let key = ArtifactStore::key_for(doc, ArtifactKind::State);

        let mut current = self.read_raw(doc).await?;
        let patch_value = serde_json::to_value(patch).map_err(|e| AppError::json_parse_failed(&key, e))?;
        if let Value::Object(fields) = patch_value {
            for (name, value) in fields {
                current.insert(name, value);
            }
        }
        current.insert("updated_at".to_string(), Value::String(timestamp_now()));

        let merged = Value::Object(current);
        self.artifacts.put_json(doc, ArtifactKind::State, &merged).await?;
        serde_json::from_value(merged).map_err(|e| AppError::json_parse_failed(key, e))
    }

    async fn read_raw(&self, doc: &DocumentKey) -> AppResult<Map<String, Value>> {
        match self.artifacts.get_json::<Value>(doc, ArtifactKind::State).await {
            Ok(Some(Value::Object(map))) => Ok(map),
            Ok(_) => Ok(Map::new()),
            Err(AppError::Storage(StorageError::JsonParseFailed { key, source })) => {
                warn!("[{}] 状态文件损坏，按空状态处理 ({}): {}", doc, key, source);
                Ok(Map::new())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::infrastructure::object_storage::LocalStorage;
    use crate::models::{DocumentStatus, PipelineStep, StepTiming};

    fn state_store() -> (tempfile::TempDir, StateStore, ArtifactStore) {
        let dir = tempfile::tempdir().unwrap();
        let artifacts = ArtifactStore::new(Arc::new(LocalStorage::new(dir.path())));
        (dir, StateStore::new(artifacts.clone()), artifacts)
    }

    #[tokio::test]
    async fn test_merge_keeps_unrelated_keys() {
        let (_dir, store, artifacts) = state_store();
        let doc = DocumentKey::new("a.pdf").unwrap();

        // 外部写入的字段也要保留
        artifacts
            .put_json(&doc, ArtifactKind::State, &serde_json::json!({"favorite": true}))
            .await
            .unwrap();

        let mut timeline = std::collections::BTreeMap::new();
        timeline.insert(
            PipelineStep::Png,
            StepTiming {
                start: Some("2024-01-01T00:00:00".to_string()),
                end: None,
            },
        );
        store
            .merge(
                &doc,
                &StatePatch::status(DocumentStatus::Rasterizing).with_timeline(timeline),
            )
            .await
            .unwrap();
        let state = store
            .merge(&doc, &StatePatch::status(DocumentStatus::Rasterized))
            .await
            .unwrap();

        assert_eq!(state.status, Some(DocumentStatus::Rasterized));
        assert!(state.timeline.contains_key(&PipelineStep::Png));

        let raw: serde_json::Value = artifacts.get_json(&doc, ArtifactKind::State).await.unwrap().unwrap();
        assert_eq!(raw["favorite"], true);
        assert!(raw["updated_at"].is_string());
    }

    #[tokio::test]
    async fn test_null_clears_last_error() {
        let (_dir, store, _) = state_store();
        let doc = DocumentKey::new("a.pdf").unwrap();
        store
            .merge(&doc, &StatePatch::default().with_last_error(Some("boom".to_string())))
            .await
            .unwrap();
        let state = store
            .merge(&doc, &StatePatch::default().with_last_error(None))
            .await
            .unwrap();
        assert_eq!(state.last_error, None);
    }

    #[tokio::test]
    async fn test_read_missing_and_corrupt_state() {
        let (_dir, store, artifacts) = state_store();
        let doc = DocumentKey::new("a.pdf").unwrap();
        assert_eq!(store.read(&doc).await.unwrap(), ProcessingState::default());

        artifacts.put_text(&doc, ArtifactKind::State, "not json").await.unwrap();
        assert_eq!(store.read(&doc).await.unwrap(), ProcessingState::default());
    }
}

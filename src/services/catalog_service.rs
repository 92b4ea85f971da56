//! 题库目录服务
//!
//! 题库按 `<大学或类别>/<试题种类>/` 两级目录组织，同时来自：
//! - 本地题目目录（`PROBLEM_DIR`）
//! - 对象存储 `problems/` 前缀
//!
//! 同一 (大学, 试题种类) 只保留一个条目，两处的位置信息合并。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::infrastructure::artifact_store::PROBLEM_PREFIX;
use crate::infrastructure::object_storage::ObjectStorage;
use crate::models::ExamCatalogEntry;

/// 题库目录
pub struct CatalogService {
    problem_dir: PathBuf,
    storage: Arc<dyn ObjectStorage>,
}

impl CatalogService {
    pub fn new(problem_dir: impl Into<PathBuf>, storage: Arc<dyn ObjectStorage>) -> Self {
        Self {
            problem_dir: problem_dir.into(),
            storage,
        }
    }

    /// 加载全部条目
    ///
    /// 顺序固定：本地条目按名称排序在前，仅存在于对象存储的条目在后。
    pub async fn load(&self) -> AppResult<Vec<ExamCatalogEntry>> {
        let mut entries = scan_local(&self.problem_dir).await;
        let local_count = entries.len();

        for (university, exam_type) in self.scan_storage().await? {
            let prefix = format!("{}{}/{}/", PROBLEM_PREFIX, university, exam_type);
            match entries
                .iter_mut()
                .find(|e| e.university == university && e.exam_type == exam_type)
            {
                Some(existing) => existing.storage_prefix = Some(prefix),
                None => entries.push(ExamCatalogEntry::new(university, exam_type).with_storage_prefix(prefix)),
            }
        }

        info!(
            "✓ 题库加载完成: {} 条（本地 {} 条）",
            entries.len(),
            local_count
        );
        Ok(entries)
    }

    async fn scan_storage(&self) -> AppResult<Vec<(String, String)>> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        for key in self.storage.list(PROBLEM_PREFIX).await? {
            let Some(rest) = key.strip_prefix(PROBLEM_PREFIX) else {
                continue;
            };
            let mut parts = rest.splitn(3, '/');
            let (Some(university), Some(exam_type), Some(file)) = (parts.next(), parts.next(), parts.next()) else {
                continue;
            };
            if university.is_empty() || exam_type.is_empty() || file.is_empty() {
                continue;
            }
            let pair = (university.to_string(), exam_type.to_string());
            if !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }
        pairs.sort();
        debug!("对象存储题库: {} 组", pairs.len());
        Ok(pairs)
    }
}

async fn sorted_subdirs(dir: &Path) -> Vec<(String, PathBuf)> {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(read_dir) => read_dir,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("⚠️ 无法读取题库目录 {}: {}", dir.display(), e);
            }
            return Vec::new();
        }
    };

    let mut dirs = Vec::new();
    loop {
        match read_dir.next_entry().await {
            Ok(Some(entry)) => {
                let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                if is_dir {
                    dirs.push((entry.file_name().to_string_lossy().to_string(), entry.path()));
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("⚠️ 遍历题库目录 {} 中断: {}", dir.display(), e);
                break;
            }
        }
    }
    dirs.sort();
    dirs
}

async fn scan_local(problem_dir: &Path) -> Vec<ExamCatalogEntry> {
    let mut entries = Vec::new();
    for (university, uni_path) in sorted_subdirs(problem_dir).await {
        for (exam_type, exam_path) in sorted_subdirs(&uni_path).await {
            entries.push(
                ExamCatalogEntry::new(university.clone(), exam_type)
                    .with_local_path(exam_path.to_string_lossy().to_string()),
            );
        }
    }
    entries
}

//! 产物存储
//!
//! 按 (文档, 产物类型) 定位对象键。页图是一组对象，其余类型都是单个对象。

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::infrastructure::object_storage::ObjectStorage;
use crate::models::DocumentKey;

/// 上传原件前缀
pub const UPLOAD_PREFIX: &str = "uploaded_pdfs/";
/// 题库前缀
pub const PROBLEM_PREFIX: &str = "problems/";

/// 产物类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// 上传的原件
    Source,
    /// 页图（多个对象）
    PageImage,
    /// 转写文本
    Transcript,
    /// 质量判定缓存
    Quality,
    /// 身份识别缓存
    Identity,
    /// 识别步骤解析出的题目集
    ProblemSet,
    /// 添削结果
    Review,
    /// 处理状态
    State,
}

impl ArtifactKind {
    fn content_type(self) -> &'static str {
        match self {
            ArtifactKind::Source => "application/pdf",
            ArtifactKind::PageImage => "image/png",
            ArtifactKind::Transcript => "text/markdown",
            _ => "application/json",
        }
    }
}

/// 产物存储
#[derive(Clone)]
pub struct ArtifactStore {
    storage: Arc<dyn ObjectStorage>,
}

impl ArtifactStore {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStorage> {
        &self.storage
    }

    /// 对象键；页图返回目录前缀
    pub fn key_for(doc: &DocumentKey, kind: ArtifactKind) -> String {
        let stem = doc.stem();
        match kind {
            ArtifactKind::Source => format!("{}{}", UPLOAD_PREFIX, doc.filename()),
            ArtifactKind::PageImage => format!("processing_pngs/{}/", stem),
            ArtifactKind::Transcript => format!("processing_mds/{}.md", stem),
            ArtifactKind::Quality => format!("processing_cache/{}.quality.json", stem),
            ArtifactKind::Identity => format!("processing_cache/{}.identity.json", stem),
            ArtifactKind::ProblemSet => format!("processing_cache/{}.problem_set.json", stem),
            ArtifactKind::Review => format!("processing_reviews/{}.json", stem),
            ArtifactKind::State => format!("processing_state/{}.json", stem),
        }
    }

    /// 第 `page` 页（从 1 开始）的页图键
    pub fn page_key(doc: &DocumentKey, page: usize) -> String {
        format!("{}page_{}.png", Self::key_for(doc, ArtifactKind::PageImage), page)
    }

    /// 读取单对象产物
    pub async fn get(&self, doc: &DocumentKey, kind: ArtifactKind) -> AppResult<Option<Vec<u8>>> {
        self.storage.get(&Self::key_for(doc, kind)).await
    }

    /// 写入单对象产物
    pub async fn put(&self, doc: &DocumentKey, kind: ArtifactKind, data: Vec<u8>) -> AppResult<()> {
        self.storage
            .put(&Self::key_for(doc, kind), data, kind.content_type())
            .await
    }

    /// 列出该类型下的所有对象键，页图按页码排序
    pub async fn list(&self, doc: &DocumentKey, kind: ArtifactKind) -> AppResult<Vec<String>> {
        match kind {
            ArtifactKind::PageImage => {
                let prefix = Self::key_for(doc, kind);
                let mut pages: Vec<(usize, String)> = self
                    .storage
                    .list(&prefix)
                    .await?
                    .into_iter()
                    .filter_map(|key| page_number(&key, &prefix).map(|n| (n, key)))
                    .collect();
                pages.sort_by_key(|(n, _)| *n);
                Ok(pages.into_iter().map(|(_, key)| key).collect())
            }
            _ => {
                let key = Self::key_for(doc, kind);
                if self.storage.exists(&key).await? {
                    Ok(vec![key])
                } else {
                    Ok(Vec::new())
                }
            }
        }
    }

    /// 产物是否存在（页图至少一页）
    pub async fn exists(&self, doc: &DocumentKey, kind: ArtifactKind) -> AppResult<bool> {
        match kind {
            ArtifactKind::PageImage => Ok(!self.list(doc, kind).await?.is_empty()),
            _ => self.storage.exists(&Self::key_for(doc, kind)).await,
        }
    }

    /// 删除该类型的全部对象
    pub async fn delete(&self, doc: &DocumentKey, kind: ArtifactKind) -> AppResult<()> {
        for key in self.list(doc, kind).await? {
            self.storage.delete(&key).await?;
        }
        Ok(())
    }

    /// 读取全部页图（按页码顺序）
    pub async fn get_pages(&self, doc: &DocumentKey) -> AppResult<Vec<Vec<u8>>> {
        let mut pages = Vec::new();
        for key in self.list(doc, ArtifactKind::PageImage).await? {
            if let Some(data) = self.storage.get(&key).await? {
                pages.push(data);
            }
        }
        Ok(pages)
    }

    /// 读取第一页
    pub async fn get_first_page(&self, doc: &DocumentKey) -> AppResult<Option<Vec<u8>>> {
        match self.list(doc, ArtifactKind::PageImage).await?.first() {
            Some(key) => self.storage.get(key).await,
            None => Ok(None),
        }
    }

    /// 写入全部页图，页码从 1 开始
    pub async fn put_pages(&self, doc: &DocumentKey, pages: Vec<Vec<u8>>) -> AppResult<()> {
        for (idx, data) in pages.into_iter().enumerate() {
            self.storage
                .put(&Self::page_key(doc, idx + 1), data, ArtifactKind::PageImage.content_type())
                .await?;
        }
        Ok(())
    }

    pub async fn get_text(&self, doc: &DocumentKey, kind: ArtifactKind) -> AppResult<Option<String>> {
        Ok(self
            .get(doc, kind)
            .await?
            .map(|data| String::from_utf8_lossy(&data).into_owned()))
    }

    pub async fn put_text(&self, doc: &DocumentKey, kind: ArtifactKind, text: &str) -> AppResult<()> {
        self.put(doc, kind, text.as_bytes().to_vec()).await
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        doc: &DocumentKey,
        kind: ArtifactKind,
    ) -> AppResult<Option<T>> {
        let key = Self::key_for(doc, kind);
        match self.storage.get(&key).await? {
            Some(data) => serde_json::from_slice(&data)
                .map(Some)
                .map_err(|e| AppError::json_parse_failed(key, e)),
            None => Ok(None),
        }
    }

    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        doc: &DocumentKey,
        kind: ArtifactKind,
        value: &T,
    ) -> AppResult<()> {
        let key = Self::key_for(doc, kind);
        let data = serde_json::to_vec_pretty(value).map_err(|e| AppError::json_parse_failed(&key, e))?;
        self.put(doc, kind, data).await
    }
}

fn page_number(key: &str, prefix: &str) -> Option<usize> {
    key.strip_prefix(prefix)?
        .strip_prefix("page_")?
        .strip_suffix(".png")?
        .parse()
        .ok()
}

//! 题目文本收集
//!
//! 从题库条目的位置读取题目、解答、评分标准文本，供添削使用。
//! - `.md` / `.txt`：原文，截断到 `problem_text_limit`
//! - `.pdf`：提取文本层，截断到 `pdf_text_limit`
//! - 评分类 PDF 提取不到文本时，写入一条 NOTE 占位

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::object_storage::ObjectStorage;
use crate::infrastructure::renderer::DocumentRenderer;
use crate::models::ExamCatalogEntry;
use crate::utils::text::take_chars;

/// 图片型评分 PDF 的占位说明
pub const IMAGE_PDF_NOTE: &str =
    "[NOTE] このPDFは画像ベースの可能性があり、テキスト抽出できませんでした。";

const RUBRIC_MARKERS: [&str; 4] = ["採点", "基準", "解答", "模範"];

/// 收集结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProblemTexts {
    /// `[FILE:<名前>]` 开头的文本块
    pub texts: Vec<String>,
    /// 对应的文件名
    pub files: Vec<String>,
}

impl ProblemTexts {
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

enum FileKind {
    Text,
    Pdf,
}

fn file_kind(name: &str) -> Option<FileKind> {
    let ext = Path::new(name)
        .extension()?
        .to_string_lossy()
        .to_ascii_lowercase();
    match ext.as_str() {
        "md" | "txt" => Some(FileKind::Text),
        "pdf" => Some(FileKind::Pdf),
        _ => None,
    }
}

fn is_rubric_name(name: &str) -> bool {
    RUBRIC_MARKERS.iter().any(|marker| name.contains(marker))
}

/// 题目文本收集服务
pub struct ProblemTextService {
    storage: Arc<dyn ObjectStorage>,
    renderer: Arc<dyn DocumentRenderer>,
    text_limit: usize,
    pdf_limit: usize,
}

impl ProblemTextService {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        renderer: Arc<dyn DocumentRenderer>,
        text_limit: usize,
        pdf_limit: usize,
    ) -> Self {
        Self {
            storage,
            renderer,
            text_limit,
            pdf_limit,
        }
    }

    /// 收集条目下的全部题目文本（按文件名排序）
    ///
    /// 本地目录优先；没有本地目录时读取对象存储前缀。
    pub async fn collect(&self, entry: &ExamCatalogEntry) -> AppResult<ProblemTexts> {
        let files = if let Some(local) = entry.local_path.as_deref() {
            read_local_files(Path::new(local)).await?
        } else if let Some(prefix) = entry.storage_prefix.as_deref() {
            self.read_storage_files(prefix).await?
        } else {
            Vec::new()
        };

        let mut collected = ProblemTexts::default();
        for (name, data) in files {
            if let Some(text) = self.file_text(&name, &data).await {
                collected.texts.push(format!("[FILE:{}]\n{}", name, text));
                collected.files.push(name);
            }
        }

        debug!(
            "题目文本 {}/{}: {} 个文件",
            entry.university,
            entry.exam_type,
            collected.files.len()
        );
        Ok(collected)
    }

    async fn file_text(&self, name: &str, data: &[u8]) -> Option<String> {
        match file_kind(name)? {
            FileKind::Text => {
                let text = take_chars(String::from_utf8_lossy(data).trim(), self.text_limit);
                (!text.is_empty()).then_some(text)
            }
            FileKind::Pdf => {
                let text = match self.renderer.extract_text(data, self.pdf_limit).await {
                    Ok(text) => text.trim().to_string(),
                    Err(e) => {
                        warn!("⚠️ PDF 文本提取失败 {}: {}", name, e);
                        String::new()
                    }
                };
                if !text.is_empty() {
                    Some(take_chars(&text, self.pdf_limit))
                } else if is_rubric_name(name) {
                    Some(IMAGE_PDF_NOTE.to_string())
                } else {
                    None
                }
            }
        }
    }

    async fn read_storage_files(&self, prefix: &str) -> AppResult<Vec<(String, Vec<u8>)>> {
        let mut files = Vec::new();
        for key in self.storage.list(prefix).await? {
            let name = key.strip_prefix(prefix).unwrap_or(&key).to_string();
            if file_kind(&name).is_none() {
                continue;
            }
            if let Some(data) = self.storage.get(&key).await? {
                files.push((name, data));
            }
        }
        Ok(files)
    }
}

async fn read_local_files(root: &Path) -> AppResult<Vec<(String, Vec<u8>)>> {
    let mut paths: Vec<PathBuf> = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(AppError::storage_list_failed(dir.display().to_string(), e)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::storage_list_failed(dir.display().to_string(), e))?
        {
            let path = entry.path();
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                pending.push(path);
            } else {
                paths.push(path);
            }
        }
    }
    paths.sort();

    let mut files = Vec::new();
    for path in paths {
        let name = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        if file_kind(&name).is_none() {
            continue;
        }
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| AppError::storage_read_failed(path.display().to_string(), e))?;
        files.push((name, data));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use async_trait::async_trait;

    use super::*;
    use crate::infrastructure::object_storage::LocalStorage;

    /// 把 PDF 字节当作 UTF-8 文本返回
    struct EchoRenderer;

    #[async_trait]
    impl DocumentRenderer for EchoRenderer {
        async fn rasterize(&self, _source: &[u8]) -> Result<Vec<Vec<u8>>> {
            Ok(Vec::new())
        }

        async fn extract_text(&self, source: &[u8], max_chars: usize) -> Result<String> {
            Ok(take_chars(&String::from_utf8_lossy(source), max_chars))
        }
    }

    fn service(storage: Arc<dyn ObjectStorage>) -> ProblemTextService {
        ProblemTextService::new(storage, Arc::new(EchoRenderer), 5, 8)
    }

    #[tokio::test]
    async fn test_collect_from_storage_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn ObjectStorage> = Arc::new(LocalStorage::new(dir.path()));
        let prefix = "problems/東京大学/23年理系/";
        for (name, body) in [
            ("1_問題.md", "第1問 次の関数を微分せよ"),
            ("2_解答.pdf", "模範解答の本文です。長い。"),
            ("3_採点基準.pdf", ""),
            ("4_参考.pdf", ""),
            ("figure.png", "png"),
        ] {
            storage
                .put(&format!("{}{}", prefix, name), body.as_bytes().to_vec(), "application/octet-stream")
                .await
                .unwrap();
        }

        let entry = ExamCatalogEntry::new("東京大学", "23年理系").with_storage_prefix(prefix);
        let collected = service(storage).collect(&entry).await.unwrap();

        assert_eq!(collected.files, vec!["1_問題.md", "2_解答.pdf", "3_採点基準.pdf"]);
        // md 截断到 5 字符，pdf 截断到 8 字符
        assert_eq!(collected.texts[0], "[FILE:1_問題.md]\n第1問 次");
        assert_eq!(collected.texts[1], "[FILE:2_解答.pdf]\n模範解答の本文で");
        assert!(collected.texts[2].ends_with(IMAGE_PDF_NOTE));
    }

    #[tokio::test]
    async fn test_local_path_preferred() {
        let local = tempfile::tempdir().unwrap();
        std::fs::write(local.path().join("問題.txt"), "ローカル").unwrap();
        let bucket = tempfile::tempdir().unwrap();
        let storage: Arc<dyn ObjectStorage> = Arc::new(LocalStorage::new(bucket.path()));

        let entry = ExamCatalogEntry::new("京都大学", "22年文系")
            .with_local_path(local.path().to_string_lossy().to_string())
            .with_storage_prefix("problems/京都大学/22年文系/");
        let collected = service(storage).collect(&entry).await.unwrap();
        assert_eq!(collected.files, vec!["問題.txt"]);
        assert_eq!(collected.texts[0], "[FILE:問題.txt]\nローカル");
    }
}

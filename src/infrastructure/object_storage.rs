//! 对象存储 - 基础设施层
//!
//! 对外只暴露 get / put / delete / list / exists 能力。
//! 配置了 bucket 时走 JSON API，否则退化为本地目录布局，键名完全一致。

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use tracing::debug;

use crate::error::{AppError, AppResult, StorageError};

/// 对象存储能力
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// 读取对象，不存在时返回 `None`
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>>;

    /// 写入对象（覆盖）
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> AppResult<()>;

    /// 删除对象，不存在视为成功
    async fn delete(&self, key: &str) -> AppResult<()>;

    /// 列出前缀下的全部键（递归）
    async fn list(&self, prefix: &str) -> AppResult<Vec<String>>;

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// 用于日志的描述
    fn describe(&self) -> String;
}

fn validate_key(key: &str) -> AppResult<()> {
    if key.is_empty() || key.starts_with('/') || key.split('/').any(|part| part == "..") {
        return Err(StorageError::InvalidKey(key.to_string()).into());
    }
    Ok(())
}

// ========== 本地目录实现 ==========

/// 本地文件系统存储
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> AppResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::storage_read_failed(key, e)),
        }
    }

    async fn put(&self, key: &str, data: Vec<u8>, _content_type: &str) -> AppResult<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::storage_write_failed(key, e))?;
        }
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| AppError::storage_write_failed(key, e))
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::storage_delete_failed(key, e)),
        }
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<String>> {
        // 从前缀中最后一个 `/` 之前的目录开始遍历
        let dir_part = match prefix.rfind('/') {
            Some(pos) => &prefix[..pos],
            None => "",
        };
        if !dir_part.is_empty() {
            validate_key(dir_part)?;
        }
        let start = self.root.join(dir_part);

        let mut keys = Vec::new();
        let mut pending = vec![start];
        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(AppError::storage_list_failed(prefix, e)),
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| AppError::storage_list_failed(prefix, e))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| AppError::storage_list_failed(prefix, e))?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&self.root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn describe(&self) -> String {
        format!("本地目录 {}", self.root.display())
    }
}

// ========== JSON API 实现 ==========

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListItem>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListItem {
    name: String,
}

/// 通过 JSON API 访问的 bucket 存储
#[derive(Debug, Clone)]
pub struct GcsStorage {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    token: Option<String>,
}

impl GcsStorage {
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            token,
        }
    }

    fn url(&self, segments: &[&str], key: &str) -> AppResult<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| AppError::storage_read_failed(key, e))?;
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidKey(self.endpoint.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn object_url(&self, key: &str) -> AppResult<Url> {
        self.url(&["storage", "v1", "b", self.bucket.as_str(), "o", key], key)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ObjectStorage for GcsStorage {
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        validate_key(key)?;
        let url = self.object_url(key)?;
        let response = self
            .authorize(self.client.get(url).query(&[("alt", "media")]))
            .send()
            .await
            .map_err(|e| AppError::storage_read_failed(key, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| AppError::storage_read_failed(key, e))?;
                Ok(Some(bytes.to_vec()))
            }
            status => Err(StorageError::BadResponse {
                key: key.to_string(),
                status: status.as_u16(),
            }
            .into()),
        }
    }

    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> AppResult<()> {
        validate_key(key)?;
        let url = self.url(&["upload", "storage", "v1", "b", self.bucket.as_str(), "o"], key)?;
        let response = self
            .authorize(
                self.client
                    .post(url)
                    .query(&[("uploadType", "media"), ("name", key)])
                    .header(reqwest::header::CONTENT_TYPE, content_type)
                    .body(data),
            )
            .send()
            .await
            .map_err(|e| AppError::storage_write_failed(key, e))?;

        if !response.status().is_success() {
            return Err(StorageError::BadResponse {
                key: key.to_string(),
                status: response.status().as_u16(),
            }
            .into());
        }
        debug!("已上传对象: {}", key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        validate_key(key)?;
        let url = self.object_url(key)?;
        let response = self
            .authorize(self.client.delete(url))
            .send()
            .await
            .map_err(|e| AppError::storage_delete_failed(key, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            status => Err(StorageError::BadResponse {
                key: key.to_string(),
                status: status.as_u16(),
            }
            .into()),
        }
    }

    async fn list(&self, prefix: &str) -> AppResult<Vec<String>> {
        let url = self.url(&["storage", "v1", "b", self.bucket.as_str(), "o"], prefix)?;
        let mut keys = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(url.clone())
                .query(&[("prefix", prefix), ("fields", "items(name),nextPageToken")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let response = self
                .authorize(request)
                .send()
                .await
                .map_err(|e| AppError::storage_list_failed(prefix, e))?;
            if !response.status().is_success() {
                return Err(StorageError::BadResponse {
                    key: prefix.to_string(),
                    status: response.status().as_u16(),
                }
                .into());
            }
            let page: ListResponse = response
                .json()
                .await
                .map_err(|e| AppError::storage_list_failed(prefix, e))?;

            keys.extend(page.items.into_iter().map(|item| item.name));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    fn describe(&self) -> String {
        format!("bucket {}", self.bucket)
    }
}

//! 集成测试共用的脚本化模型、假渲染器和临时存储

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use auto_correction::config::Config;
use auto_correction::infrastructure::{ArtifactKind, ArtifactStore, DocumentRenderer, LocalStorage, ObjectStorage};
use auto_correction::models::DocumentKey;
use auto_correction::services::GenerativeModel;
use auto_correction::App;

pub const TRANSCRIPT_PAGE: &str = "2023年度・東京大学・前期・数学Ⅱ・第1問\n(1) f'(x) = 2x より x = 1";

pub const REVIEW_JSON: &str = r#"{"summary":{"total_score":8,"max_score":10,"notes":"概ね良好です"},
"questions":[{"id":1,"awarded":8,"max":10,"comments":[
{"type":"score","text":"微分が正確です","target":"(1)","points":8},
{"type":"mistake","text":"符号に注意","target":"(1)"}]}]}"#;

/// 按提示词内容路由的模型
pub struct ScriptedModel {
    pub quality_reply: String,
    pub transcript_reply: String,
    pub review_reply: Result<String, String>,
    pub quality_calls: AtomicUsize,
    pub transcribe_calls: AtomicUsize,
    pub identify_calls: AtomicUsize,
    pub review_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    delay: Duration,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            quality_reply: r#"{"label": "OK", "reason": "鮮明に読めます"}"#.to_string(),
            transcript_reply: TRANSCRIPT_PAGE.to_string(),
            review_reply: Ok(REVIEW_JSON.to_string()),
            quality_calls: AtomicUsize::new(0),
            transcribe_calls: AtomicUsize::new(0),
            identify_calls: AtomicUsize::new(0),
            review_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: Duration::from_millis(5),
        }
    }

    pub fn with_quality(mut self, reply: &str) -> Self {
        self.quality_reply = reply.to_string();
        self
    }

    pub fn with_review(mut self, reply: Result<&str, &str>) -> Self {
        self.review_reply = reply.map(str::to_string).map_err(str::to_string);
        self
    }

    pub fn total_calls(&self) -> usize {
        self.quality_calls.load(Ordering::SeqCst)
            + self.transcribe_calls.load(Ordering::SeqCst)
            + self.identify_calls.load(Ordering::SeqCst)
            + self.review_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn generate(&self, user: &str, _system: Option<&str>, _images: &[Vec<u8>]) -> Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if user.contains("添削コメント") {
            self.review_calls.fetch_add(1, Ordering::SeqCst);
            return self.review_reply.clone().map_err(|e| anyhow!(e));
        }
        if user.contains("仕分け担当") {
            self.quality_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(self.quality_reply.clone());
        }
        if user.contains("書き起こしてください") {
            self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
            return Ok(self.transcript_reply.clone());
        }
        if user.contains("識別情報") {
            self.identify_calls.fetch_add(1, Ordering::SeqCst);
            return Ok("{}".to_string());
        }
        bail!("unexpected prompt: {}", user)
    }
}

/// 返回固定页数的假渲染器，可切换为失败
pub struct FakeRenderer {
    pub pages: usize,
    pub fail: AtomicBool,
    pub rasterize_calls: AtomicUsize,
}

impl FakeRenderer {
    pub fn new(pages: usize) -> Self {
        Self {
            pages,
            fail: AtomicBool::new(false),
            rasterize_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DocumentRenderer for FakeRenderer {
    async fn rasterize(&self, _source: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.rasterize_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            bail!("pdfium が読み込めません");
        }
        Ok((1..=self.pages).map(|n| format!("png-{}", n).into_bytes()).collect())
    }

    async fn extract_text(&self, source: &[u8], max_chars: usize) -> Result<String> {
        Ok(String::from_utf8_lossy(source).chars().take(max_chars).collect())
    }
}

/// 临时目录中的完整应用
pub struct Harness {
    pub dir: tempfile::TempDir,
    pub storage: Arc<dyn ObjectStorage>,
    pub artifacts: ArtifactStore,
    pub model: Arc<ScriptedModel>,
    pub renderer: Arc<FakeRenderer>,
    pub app: App,
}

impl Harness {
    pub async fn new(model: ScriptedModel, max_concurrent: usize) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage: Arc<dyn ObjectStorage> = Arc::new(LocalStorage::new(dir.path().join("bucket")));
        storage
            .put(
                "problems/東京大学/23年理系/問題.md",
                "第1問 f(x) = x^2 - 2x の最小値を求めよ。".as_bytes().to_vec(),
                "text/markdown",
            )
            .await
            .expect("seed problem");
        storage
            .put(
                "problems/東京大学/23年文系/問題.md",
                "第1問 文系の問題".as_bytes().to_vec(),
                "text/markdown",
            )
            .await
            .expect("seed problem");

        let config = Config {
            max_concurrent_documents: max_concurrent,
            problem_dir: dir.path().join("no_local_problems").to_string_lossy().to_string(),
            output_log_file: dir.path().join("output.txt").to_string_lossy().to_string(),
            ..Config::default()
        };

        let model = Arc::new(model);
        let renderer = Arc::new(FakeRenderer::new(2));
        let app = App::with_components(config, storage.clone(), model.clone(), renderer.clone());

        Self {
            artifacts: ArtifactStore::new(storage.clone()),
            dir,
            storage,
            model,
            renderer,
            app,
        }
    }

    /// 上传一份答案原件
    pub async fn upload(&self, filename: &str) -> DocumentKey {
        let doc = DocumentKey::new(filename).expect("document key");
        self.artifacts
            .put(&doc, ArtifactKind::Source, b"%PDF-1.7 fake".to_vec())
            .await
            .expect("upload");
        doc
    }

    pub fn root(&self) -> PathBuf {
        self.dir.path().join("bucket")
    }
}

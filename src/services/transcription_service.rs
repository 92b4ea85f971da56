//! 转写服务 - 业务能力层
//!
//! 逐页转写手写答案，按页加标签后拼接。任意一页失败或结果为空都视为整体失败。

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::services::llm_service::GenerativeModel;

const TRANSCRIBE_PROMPT: &str = r#"この答案画像の手書き内容を Markdown で正確に書き起こしてください。
- 数式は LaTeX（$...$）で表記する
- 設問番号・見出し・受験者が書いた文字をそのまま残す
- 判読できない箇所は [判読不能] と書く
- 説明や前置きは書かず、書き起こし本文だけを返す"#;

/// 转写服务
pub struct TranscriptionService {
    model: Arc<dyn GenerativeModel>,
    dummy: bool,
}

impl TranscriptionService {
    pub fn new(model: Arc<dyn GenerativeModel>, dummy: bool) -> Self {
        Self { model, dummy }
    }

    /// 转写全部页面
    ///
    /// # 返回
    /// `--- [ページ N] ---` 分隔的 Markdown 文本
    pub async fn transcribe_pages(&self, pages: &[Vec<u8>]) -> Result<String> {
        if pages.is_empty() {
            bail!("書き起こし対象のページがありません");
        }

        let mut transcript = String::new();
        for (idx, page) in pages.iter().enumerate() {
            let page_no = idx + 1;
            let text = if self.dummy {
                format!("(ダミー) ページ{}を書き起こし", page_no)
            } else {
                self.model
                    .generate(TRANSCRIBE_PROMPT, None, std::slice::from_ref(page))
                    .await
                    .with_context(|| format!("ページ{}の書き起こしに失敗", page_no))?
            };

            if text.trim().is_empty() {
                bail!("ページ{}の書き起こしに失敗", page_no);
            }
            debug!("第 {} 页转写完成，{} 字符", page_no, text.chars().count());
            transcript.push_str(&format!("--- [ページ {}] ---\n\n{}\n\n", page_no, text.trim()));
        }

        info!("✓ 转写完成，共 {} 页", pages.len());
        Ok(transcript)
    }
}

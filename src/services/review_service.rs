//! 添削生成服务 - 业务能力层
//!
//! ## 职责
//! - 拼装答案转写和题目文本，调用模型生成添削 JSON
//! - 宽松解析（代码块 / 无效反斜杠修复 / 提取第一个 JSON 对象）
//! - 生成失败时降级为零分结果，不向上抛错
//! - 把参与添削的题目文件名追加到总评备注中

use std::sync::Arc;

use tracing::{info, warn};

use crate::models::ReviewDocument;
use crate::services::llm_service::GenerativeModel;
use crate::services::problem_text_service::ProblemTexts;
use crate::utils::text::parse_json_lenient;

const REVIEW_SYSTEM_PROMPT: &str = r#"あなたは大学入試の答案を添削する講師です。
添削ルール（厳守）:
- 丁寧語（です・ます調）。否定的・攻撃的な表現は避ける。
- 各小問で ① 採点 ② 賞賛 ③ 誤りの指摘 ④ 方針提示 を必ず含める。
- 採点は採点基準に厳密に準拠した加点法。誤った過程の結果には加点しない。
- 加点箇所・誤りが複数ある場合は、1点につき1要素として別々に列挙する。
- awarded は score コメントの points の合計。max が不明な場合は合理的に仮置きし、根拠を notes に書く。
- 数式は TeX 形式（$...$）で書く。
- 白紙・判読不能・問題違いの答案はその旨を notes に書き、採点不能とする。
- 出力は JSON のみ。"#;

const REVIEW_SCHEMA: &str = r#"JSONスキーマ:
{
  "summary": {"total_score": number, "max_score": number, "notes": string},
  "questions": [
    {
      "id": string,
      "awarded": number,
      "max": number,
      "comments": [
        {"type": "score"|"praise"|"mistake"|"guidance", "text": string, "target": string, "points": number|null}
      ]
    }
  ]
}"#;

/// 添削生成服务
pub struct ReviewService {
    model: Arc<dyn GenerativeModel>,
    max_problem_files: usize,
}

impl ReviewService {
    pub fn new(model: Arc<dyn GenerativeModel>, max_problem_files: usize) -> Self {
        Self {
            model,
            max_problem_files,
        }
    }

    /// 生成添削结果
    ///
    /// # 参数
    /// - `transcript`: 答案转写全文
    /// - `problems`: 题目文本，最多使用前 `max_problem_files` 个
    ///
    /// # 返回
    /// 总是返回一个 `ReviewDocument`，失败时为降级结果
    pub async fn generate(&self, transcript: &str, problems: &ProblemTexts) -> ReviewDocument {
        let used = problems.texts.len().min(self.max_problem_files);
        let prompt = build_prompt(transcript, &problems.texts[..used]);

        let mut review = match self.model.generate(&prompt, Some(REVIEW_SYSTEM_PROMPT), &[]).await {
            Ok(raw) => match parse_json_lenient::<ReviewDocument>(&raw) {
                Ok(review) => {
                    info!(
                        "✓ 添削生成完成: {} 题，{}/{} 分",
                        review.questions.len(),
                        review.summary.total_score,
                        review.summary.max_score
                    );
                    review
                }
                Err(e) => {
                    warn!("⚠️ 添削 JSON 修复后仍无法解析: {}", e);
                    ReviewDocument::degraded(format!("JSON の解析に失敗しました ({})", e))
                }
            },
            Err(e) => {
                warn!("⚠️ 添削生成调用失败: {}", e);
                ReviewDocument::degraded(e)
            }
        };

        append_file_list(&mut review, &problems.files[..used.min(problems.files.len())]);
        review
    }
}

fn build_prompt(transcript: &str, problem_texts: &[String]) -> String {
    format!(
        "次の答案Markdownと問題・採点基準テキストに基づき、添削コメントを生成してください。\n\n\
         [答案Markdown]\n---\n{}\n---\n\n\
         [問題・採点基準テキスト]\n---\n{}\n---\n\n\
         注意:\n\
         - 各テキストの先頭の [FILE:ファイル名] に「採点」を含むものは配点根拠として最優先で参照してください。\n\
         - PDF由来のテキストは欠落している可能性があります。その場合も妥当な配点と根拠を summary.notes に書いてください。\n\n\
         {}",
        transcript,
        problem_texts.join("\n\n"),
        REVIEW_SCHEMA
    )
}

fn append_file_list(review: &mut ReviewDocument, files: &[String]) {
    if files.is_empty() {
        return;
    }
    let listing = format!("[参照ファイル] {}", files.join(", "));
    let notes = &mut review.summary.notes;
    if notes.trim().is_empty() {
        *notes = listing;
    } else {
        notes.push_str("\n\n");
        notes.push_str(&listing);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    use super::*;

    struct RecordingModel {
        reply: Result<String, String>,
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingModel {
        fn new(reply: Result<String, String>) -> Self {
            Self {
                reply,
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GenerativeModel for RecordingModel {
        async fn generate(&self, user: &str, _: Option<&str>, _: &[Vec<u8>]) -> Result<String> {
            self.prompts.lock().unwrap().push(user.to_string());
            self.reply.clone().map_err(|e| anyhow!(e))
        }
    }

    fn problems(n: usize) -> ProblemTexts {
        ProblemTexts {
            texts: (1..=n).map(|i| format!("[FILE:{}.md]\n問題{}", i, i)).collect(),
            files: (1..=n).map(|i| format!("{}.md", i)).collect(),
        }
    }

    #[tokio::test]
    async fn test_parses_fenced_review_with_latex() {
        let raw = "```json\n{\"summary\":{\"total_score\":7,\"max_score\":10,\"notes\":\"良好\"},\
                   \"questions\":[{\"id\":\"1\",\"awarded\":7,\"max\":10,\"comments\":[\
                   {\"type\":\"mistake\",\"text\":\"$\\sqrt{2}$ の計算\",\"target\":\"(2)\"}]}]}\n```";
        let service = ReviewService::new(Arc::new(RecordingModel::new(Ok(raw.to_string()))), 6);
        let review = service.generate("答案", &problems(1)).await;

        assert_eq!(review.summary.max_score, 10.0);
        assert_eq!(review.questions[0].comments[0].text, "$\\sqrt{2}$ の計算");
        assert!(review.summary.notes.starts_with("良好"));
        assert!(review.summary.notes.ends_with("[参照ファイル] 1.md"));
    }

    #[tokio::test]
    async fn test_model_error_degrades() {
        let service = ReviewService::new(Arc::new(RecordingModel::new(Err("quota exceeded".to_string()))), 6);
        let review = service.generate("答案", &ProblemTexts::default()).await;

        assert_eq!(review.summary.max_score, 0.0);
        assert!(review.questions.is_empty());
        assert!(review.summary.notes.contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_unparsable_output_degrades() {
        let service = ReviewService::new(Arc::new(RecordingModel::new(Ok("採点できません".to_string()))), 6);
        let review = service.generate("答案", &problems(2)).await;
        assert_eq!(review.summary.total_score, 0.0);
        assert!(review.summary.notes.contains("生成に失敗しました"));
        assert!(review.summary.notes.contains("1.md, 2.md"));
    }

    #[tokio::test]
    async fn test_problem_files_capped() {
        let model = Arc::new(RecordingModel::new(Ok("{}".to_string())));
        let service = ReviewService::new(model.clone(), 6);
        let review = service.generate("答案", &problems(8)).await;

        let prompt = model.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("[FILE:6.md]"));
        assert!(!prompt.contains("[FILE:7.md]"));
        assert!(!review.summary.notes.contains("7.md"));
    }
}

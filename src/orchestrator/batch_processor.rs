//! 批量答案处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量答案的处理和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：启动日志文件、选择存储后端、创建模型和渲染器
//! 2. **批量加载**：同步登记表，得到所有已上传的答案
//! 3. **并发控制**：使用 Semaphore 限制同时处理的答案数量，满了就等待
//! 4. **全局统计**：汇总成功 / 需人工确认 / 失败
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个步骤的细节
//! - **资源所有者**：唯一创建存储、模型、渲染器的模块
//! - **不抛错**：单份答案的错误只计入统计
//! - **向下委托**：委托 document_processor 处理单份答案

use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::infrastructure::{
    default_renderer, ArtifactStore, DocumentRenderer, GcsStorage, LocalStorage, ObjectStorage,
    StateStore,
};
use crate::orchestrator::document_processor::{PipelineOrchestrator, RunReport};
use crate::orchestrator::registry::DocumentRegistry;
use crate::services::{GenerativeModel, LlmService};
use crate::utils::logging::{init_log_file, log_documents_loaded, log_startup, print_final_stats};
use crate::workflow::StepExecutor;

/// 处理统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessingStats {
    pub success: usize,
    pub halted: usize,
    pub failed: usize,
    pub total: usize,
}

impl ProcessingStats {
    fn add(&mut self, report: Option<&RunReport>) {
        match report {
            Some(report) if report.is_failed() => self.failed += 1,
            Some(report) if report.is_halted() => self.halted += 1,
            Some(_) => self.success += 1,
            None => self.failed += 1,
        }
    }
}

/// 有界并发的批量执行器
pub struct BatchRunner {
    orchestrator: Arc<PipelineOrchestrator>,
    max_concurrent: usize,
}

impl BatchRunner {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, max_concurrent: usize) -> Self {
        Self {
            orchestrator,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// 全量处理所有答案
    ///
    /// # 返回
    /// 按输入顺序的 (文件名, 报告)，任务异常时报告为 `None`
    pub async fn run(&self, filenames: Vec<String>) -> Vec<(String, Option<RunReport>)> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(filenames.len());

        for (idx, filename) in filenames.into_iter().enumerate() {
            let index = idx + 1;
            // 满了就在这里等待
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("[答案 {}] 无法获取并发许可: {}", index, e);
                    handles.push((filename, None));
                    continue;
                }
            };

            let orchestrator = self.orchestrator.clone();
            let name = filename.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                match orchestrator.run_full_indexed(&name, index).await {
                    Ok(report) => Some(report),
                    Err(e) => {
                        error!("[答案 {}] ❌ 处理过程中发生错误: {}", index, e);
                        None
                    }
                }
            });
            handles.push((filename, Some(handle)));
        }

        // 等待所有任务完成
        join_all(handles.into_iter().enumerate().map(|(idx, (filename, handle))| async move {
            let report = match handle {
                Some(handle) => match handle.await {
                    Ok(report) => report,
                    Err(e) => {
                        error!("[答案 {}] 任务执行失败: {}", idx + 1, e);
                        None
                    }
                },
                None => None,
            };
            (filename, report)
        }))
        .await
    }
}

/// 应用主结构
pub struct App {
    config: Config,
    storage_desc: String,
    orchestrator: Arc<PipelineOrchestrator>,
    registry: DocumentRegistry,
}

impl App {
    /// 初始化应用
    ///
    /// 配置了 bucket 时使用 JSON API 存储，否则使用 `data_dir` 本地目录。
    pub async fn initialize(config: Config) -> Result<Self> {
        // 初始化日志文件
        init_log_file(&config.output_log_file)?;

        let storage: Arc<dyn ObjectStorage> = match config.storage_bucket.as_deref() {
            Some(bucket) if !bucket.trim().is_empty() => Arc::new(GcsStorage::new(
                &config.storage_endpoint,
                bucket,
                config.storage_token.clone(),
            )),
            _ => Arc::new(LocalStorage::new(&config.data_dir)),
        };
        let model: Arc<dyn GenerativeModel> = Arc::new(LlmService::new(&config));
        let renderer = default_renderer(config.render_scale);

        Ok(Self::with_components(config, storage, model, renderer))
    }

    /// 用给定的存储、模型、渲染器组装应用
    pub fn with_components(
        config: Config,
        storage: Arc<dyn ObjectStorage>,
        model: Arc<dyn GenerativeModel>,
        renderer: Arc<dyn DocumentRenderer>,
    ) -> Self {
        let storage_desc = storage.describe();
        let artifacts = ArtifactStore::new(storage);
        let states = Arc::new(StateStore::new(artifacts.clone()));
        let executor = StepExecutor::new(&config, artifacts.clone(), model, renderer);

        Self {
            orchestrator: Arc::new(PipelineOrchestrator::new(executor, states.clone())),
            registry: DocumentRegistry::new(artifacts, states),
            storage_desc,
            config,
        }
    }

    pub fn orchestrator(&self) -> &Arc<PipelineOrchestrator> {
        &self.orchestrator
    }

    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    /// 运行应用主逻辑：处理全部已上传的答案
    pub async fn run(&self) -> Result<ProcessingStats> {
        log_startup(self.config.max_concurrent_documents, &self.storage_desc);

        // 加载所有待处理的答案
        info!("\n📁 正在扫描已上传的答案...");
        let filenames: Vec<String> = self
            .registry
            .sync()
            .await?
            .into_iter()
            .filter(|doc| !doc.status.is_terminal())
            .map(|doc| doc.name)
            .collect();

        if filenames.is_empty() {
            warn!("⚠️ 没有找到待处理的答案，程序结束");
            return Ok(ProcessingStats::default());
        }

        log_documents_loaded(filenames.len(), self.config.max_concurrent_documents);
        self.process(filenames).await
    }

    /// 处理指定的答案
    pub async fn process(&self, filenames: Vec<String>) -> Result<ProcessingStats> {
        let runner = BatchRunner::new(self.orchestrator.clone(), self.config.max_concurrent_documents);
        let results = runner.run(filenames).await;

        let mut stats = ProcessingStats {
            total: results.len(),
            ..Default::default()
        };
        for (_, report) in &results {
            stats.add(report.as_ref());
        }

        // 输出最终统计
        print_final_stats(
            stats.success,
            stats.halted,
            stats.failed,
            stats.total,
            &self.config.output_log_file,
        );
        self.registry.sync().await?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentStatus, PipelineStep};
    use crate::orchestrator::document_processor::StepError;

    #[test]
    fn test_stats_classification() {
        let mut stats = ProcessingStats::default();
        stats.add(Some(&RunReport {
            status: Some(DocumentStatus::ReviewComplete),
            ..Default::default()
        }));
        stats.add(Some(&RunReport {
            status: Some(DocumentStatus::NeedsManualReview),
            ..Default::default()
        }));
        stats.add(Some(&RunReport {
            status: Some(DocumentStatus::Failed(PipelineStep::Png)),
            errors: vec![StepError {
                step: PipelineStep::Png,
                error: "boom".to_string(),
            }],
            ..Default::default()
        }));
        stats.add(None);

        assert_eq!(
            stats,
            ProcessingStats {
                success: 1,
                halted: 1,
                failed: 2,
                total: 0,
            }
        );
    }
}

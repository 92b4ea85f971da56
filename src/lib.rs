//! # Auto Correction
//!
//! 手写答案自动添削流水线：栅格化 → 质量判定 → 转写 → 识别题库 → 生成添削
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 对象存储、产物存储、状态存储、PDF 渲染，只暴露能力
//! - `ArtifactStore` - 按 (答案, 产物类型) 读写
//! - `StateStore` - 每份答案一条 JSON 状态，浅合并更新
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心流程
//! - `QualityService` / `TranscriptionService` / `IdentityService` / `ReviewService` - 模型能力
//! - `ExamCatalogMatcher` - 题库打分与选择
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个步骤"的执行方式
//! - `DocumentCtx` - 上下文封装（答案 + 是否强制 / 再处理）
//! - `StepExecutor` - 产物检查 → 能力调用 → 写入产物
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量处理，管理资源和并发
//! - `orchestrator/document_processor` - 单份答案的步骤调度和状态记录
//! - `orchestrator/registry` - 答案登记表
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{AnswerDocument, DocumentKey, DocumentStatus, PipelineStep};
pub use orchestrator::{App, BatchRunner, DocumentRegistry, PipelineOrchestrator, RunReport};
pub use workflow::{DocumentCtx, StepExecutor, StepOutcome};

//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量答案处理器
//! - 管理应用生命周期（初始化、运行）
//! - 创建存储、模型、渲染器
//! - 控制并发数量（Semaphore）
//! - 输出全局统计信息
//!
//! ### `document_processor` - 单份答案处理器
//! - 按规范顺序调度步骤（全量 / 指定步骤 / 强制重跑）
//! - 每次步骤切换都写入状态
//! - 同一份答案只允许一个运行
//!
//! ### `registry` - 答案登记表
//! - 由上传目录和状态文件重建缓存
//! - 自动提升已有添削结果的答案、人工签收
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<答案>)
//!     ↓
//! document_processor (处理 Vec<步骤>)
//!     ↓
//! workflow::StepExecutor (处理单个步骤)
//!     ↓
//! services (能力层：quality / transcription / identity / matching / review)
//!     ↓
//! infrastructure (基础设施：对象存储 / 产物 / 状态 / 渲染)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_processor 管批量，document_processor 管单份
//! 2. **资源隔离**：只有编排层创建存储和模型
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure
//! 4. **无业务逻辑**：只做调度、状态记录和统计

pub mod batch_processor;
pub mod document_processor;
pub mod registry;

// 重新导出主要类型
pub use batch_processor::{App, BatchRunner, ProcessingStats};
pub use document_processor::{PipelineOrchestrator, RunReport, StatusReport, StepError};
pub use registry::DocumentRegistry;

//! # Auto Paper Publish
//!
//! 自动生成学术论文、迭代评审修改、编译 PDF 并发布到研究仓库的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持久化状态、重试策略、时钟
//! - `StateStore` - 唯一的状态文件 owner，整体读-改-写
//! - `RetryPolicy` - 三种退避曲线（固定 / 线性 / 指数）
//!
//! ### ② 外部客户端 + 业务能力层（Clients / Services）
//! - `clients/` - LLM、LaTeX 编译网关、仓库发布接口
//! - `services/` - 描述"我能做什么"：生成、记录结果、维护示例语料
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一篇论文"各阶段的处理流程
//! - `RefinementLoop` - 生成 → 评审 → 修改，直到收敛或用完迭代次数
//! - `RobustCompiler` - 编译重试 + AI 修复兜底
//! - `RobustPublisher` - 长周期线性退避的发布重试
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量论文编排，记录每篇论文的结果
//! - `orchestrator/scheduler` - 每日 03:00 定时触发批量任务
//!
//! ## 模块结构

pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::App;
pub use config::Config;
pub use error::{CompilationError, GenerationError, OrchestratorError, PublishError, SchedulerError};
pub use models::{CritiqueReport, PaperDraft, RunOutcome};
pub use orchestrator::{AppContext, BatchOrchestrator, BatchSummary, DailyScheduler};
pub use workflow::{CancellationFlag, ProgressObserver, ProgressUpdate};

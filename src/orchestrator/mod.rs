//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和定时调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `context` - 进程级上下文
//! - 持有配置、状态存储、结果日志、示例语料
//! - 运行锁：批量 / 重新发布 / 重新编译互斥
//!
//! ### `batch_processor` - 批量论文编排器
//! - 逐篇处理（不并发），每篇记录一条结果
//! - 手动操作：重新发布、按指令重新编译、列出记录
//! - 输出批次统计信息
//!
//! ### `scheduler` - 每日定时任务
//! - 每天固定整点触发一次批量任务
//! - 开关状态持久化，重启后恢复
//!
//! ## 层次关系
//!
//! ```text
//! scheduler (每天触发)
//!     ↓
//! batch_processor (处理 N 篇论文)
//!     ↓
//! workflow (RefinementLoop / RobustCompiler / RobustPublisher)
//!     ↓
//! services (能力层：generation / outcome_log / corpus)
//!     ↓
//! infrastructure (基础设施：StateStore / RetryPolicy / Clock)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：batch_processor 管批量，scheduler 管时间
//! 2. **资源隔离**：只有编排层持有 `AppContext`
//! 3. **向下依赖**：编排层 → workflow → services → infrastructure

pub mod batch_processor;
pub mod context;
pub mod scheduler;

// 重新导出主要类型
pub use batch_processor::{BatchHalt, BatchOrchestrator, BatchSummary, RecordedKind};
pub use context::AppContext;
pub use scheduler::{BatchTrigger, DailyScheduler};

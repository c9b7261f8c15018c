//! 流程层（Workflow）
//!
//! 定义"一篇论文"各阶段的处理流程：
//!
//! ```text
//! RefinementLoop   生成初稿 → 评审 → 修改（循环）
//!     ↓
//! RobustCompiler   编译重试 3 次 → AI 修复 → 再编译 1 次
//!     ↓
//! RobustPublisher  创建 → 上传 → 元数据 → 发布（整体重试 10 次）
//! ```
//!
//! 本层不持有任何持久化状态，只依赖 services / clients 暴露的能力

pub mod cancel;
pub mod compile_controller;
pub mod progress;
pub mod publish_controller;
pub mod refinement;
pub mod run_ctx;

pub use cancel::CancellationFlag;
pub use compile_controller::{CompiledPaper, RobustCompiler};
pub use progress::{Phase, ProgressObserver, ProgressUpdate, TracingObserver};
pub use publish_controller::RobustPublisher;
pub use refinement::{RefinementLoop, RefinementOutcome, RefinementSettings};
pub use run_ctx::AutomationRun;

//! 进度上报
//!
//! 进度分配：初稿生成固定 15%，迭代平分 75%，最后 10% 留给编译和发布

use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

pub const GENERATION_PERCENT: u8 = 15;
pub const ITERATION_SPAN_PERCENT: u8 = 75;
pub const COMPILE_PERCENT: u8 = 90;
pub const PUBLISH_PERCENT: u8 = 95;
pub const DONE_PERCENT: u8 = 100;

/// 当前所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Topic,
    Title,
    Drafting,
    Critique,
    Revision,
    Style,
    Compile,
    Repair,
    Publish,
    Record,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "空闲",
            Phase::Topic => "选题",
            Phase::Title => "生成标题",
            Phase::Drafting => "生成初稿",
            Phase::Critique => "评审",
            Phase::Revision => "修改",
            Phase::Style => "格式整理",
            Phase::Compile => "编译",
            Phase::Repair => "AI 修复",
            Phase::Publish => "发布",
            Phase::Record => "记录结果",
            Phase::Done => "完成",
        };
        write!(f, "{}", name)
    }
}

/// 进度事件
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressUpdate {
    /// 新一篇论文开始前清空进度
    Reset { paper_index: usize },
    Status {
        phase: Phase,
        percent: u8,
        message: String,
    },
    /// 即将重试：失败原因和等待时长
    Retry {
        phase: Phase,
        attempt: u32,
        max_attempts: u32,
        reason: String,
        wait: Duration,
    },
}

impl ProgressUpdate {
    pub fn status(phase: Phase, percent: u8, message: impl Into<String>) -> Self {
        ProgressUpdate::Status {
            phase,
            percent,
            message: message.into(),
        }
    }
}

/// 第 `iteration` 次迭代结束时的进度
pub fn iteration_percent(iteration: u32, max_iterations: u32) -> u8 {
    if max_iterations == 0 {
        return GENERATION_PERCENT + ITERATION_SPAN_PERCENT;
    }
    let done = iteration.min(max_iterations) as u64;
    let span = ITERATION_SPAN_PERCENT as u64 * done / max_iterations as u64;
    GENERATION_PERCENT + span as u8
}

pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, update: ProgressUpdate);
}

/// 把进度写进日志
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_progress(&self, update: ProgressUpdate) {
        match update {
            ProgressUpdate::Reset { paper_index } => {
                info!("\n{}", "─".repeat(60));
                info!("[论文 {}] 🔄 进度已重置", paper_index);
            }
            ProgressUpdate::Status {
                phase,
                percent,
                message,
            } => info!("[{:>3}%] {} - {}", percent, phase, message),
            ProgressUpdate::Retry {
                phase,
                attempt,
                max_attempts,
                reason,
                wait,
            } => warn!(
                "⚠️ {} 失败 (尝试 {}/{})，{} 秒后重试: {}",
                phase,
                attempt,
                max_attempts,
                wait.as_secs_f32(),
                reason
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_percent_spreads_over_budget() {
        assert_eq!(iteration_percent(0, 5), 15);
        assert_eq!(iteration_percent(1, 5), 30);
        assert_eq!(iteration_percent(5, 5), 90);
        assert_eq!(iteration_percent(9, 5), 90);
        assert_eq!(iteration_percent(1, 3), 40);
    }
}

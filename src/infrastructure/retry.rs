//! 重试策略
//!
//! 三条退避曲线各自独立、可单独测试：
//! - 编译：固定 1.5 秒，最多 3 次
//! - 发布：线性 15 秒 + 5 秒 × (n - 1)，最多 10 次
//! - LLM：限流固定 61 秒；临时故障指数退避；其他错误固定 2 秒；共 5 次

use std::time::Duration;

/// 退避曲线
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    /// base + step × (attempt - 1)
    Linear { base: Duration, step: Duration },
    /// base × 2^(attempt - 1)，不超过 max
    Exponential { base: Duration, max: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// 编译阶段：最多 3 次，每次间隔 1.5 秒
    pub const fn compile() -> Self {
        Self::new(3, Backoff::Fixed(Duration::from_millis(1500)))
    }

    /// 发布阶段：最多 10 次，等待时间线性增长
    pub const fn publish() -> Self {
        Self::new(
            10,
            Backoff::Linear {
                base: Duration::from_secs(15),
                step: Duration::from_secs(5),
            },
        )
    }

    /// LLM 一般错误
    pub const fn llm_generic() -> Self {
        Self::new(5, Backoff::Fixed(Duration::from_secs(2)))
    }

    /// LLM 限流 / 额度错误
    pub const fn llm_rate_limit() -> Self {
        Self::new(5, Backoff::Fixed(Duration::from_secs(61)))
    }

    /// LLM 过载等临时错误
    pub const fn llm_transient() -> Self {
        Self::new(
            5,
            Backoff::Exponential {
                base: Duration::from_secs(2),
                max: Duration::from_secs(60),
            },
        )
    }

    /// 第 `attempt` 次（从 1 开始）失败后、下一次尝试前的等待时间
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let n = attempt.max(1) - 1;
        match self.backoff {
            Backoff::Fixed(d) => d,
            Backoff::Linear { base, step } => base + step.saturating_mul(n),
            Backoff::Exponential { base, max } => {
                let factor = 2u32.saturating_pow(n.min(31));
                base.saturating_mul(factor).min(max)
            }
        }
    }

    /// 是否还有下一次尝试
    pub fn has_next(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// 全部失败时累计的等待时间（最后一次之后不等待）
    pub fn total_wait(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.delay_for_attempt(attempt))
            .sum()
    }
}

//! 本地挂钟时间
//!
//! 定时器通过 `Clock` 获取当前时间，测试中可以固定为任意时刻。

use std::sync::Mutex;

use chrono::{Local, NaiveDateTime, NaiveTime};

pub trait Clock: Send + Sync {
    /// 当前本地时间
    fn now(&self) -> NaiveDateTime;
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// 固定时间的时钟，可手动拨动
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
}

impl FixedClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// 严格晚于 `now` 的下一个 `at`
///
/// 如果今天的 `at` 已经到了或过了，就取明天的
pub fn next_occurrence(now: NaiveDateTime, at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(at);
    if now < today {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}

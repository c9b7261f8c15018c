//! 每日定时任务 - 编排层
//!
//! 开启后每天本地时间 `schedule_hour:00` 触发一次批量任务。
//! 开关状态持久化到 `scheduler.json`，进程重启后通过 `restore` 恢复。
//!
//! 任何时刻最多只有一个待触发的定时器；批量任务在独立的 task 中运行，
//! 关闭定时器不会中断已经开始的批次。

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{NaiveDateTime, NaiveTime};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::SchedulerError;
use crate::infrastructure::clock::next_occurrence;
use crate::infrastructure::{Clock, StateStore};

const SCHEDULE_KEY: &str = "scheduler";

/// 定时器触发时执行的批量任务
pub type BatchTrigger = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
struct PersistedSchedule {
    active: bool,
}

#[derive(Default)]
struct SchedulerState {
    active: bool,
    pending: Option<JoinHandle<()>>,
    armed_delay: Option<Duration>,
}

pub struct DailyScheduler {
    clock: Arc<dyn Clock>,
    at: NaiveTime,
    trigger: BatchTrigger,
    store: StateStore,
    state: Mutex<SchedulerState>,
}

impl DailyScheduler {
    pub fn new(
        clock: Arc<dyn Clock>,
        hour: u32,
        trigger: BatchTrigger,
        store: StateStore,
    ) -> Result<Self, SchedulerError> {
        let at = NaiveTime::from_hms_opt(hour, 0, 0)
            .ok_or_else(|| SchedulerError::Clock(format!("无效的触发整点: {}", hour)))?;
        Ok(Self {
            clock,
            at,
            trigger,
            store,
            state: Mutex::new(SchedulerState::default()),
        })
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 开启定时任务，返回距离下次触发的时长
    ///
    /// 已开启时会先取消旧的定时器再重新计算
    pub async fn activate(&self) -> Result<Duration, SchedulerError> {
        self.store
            .save(SCHEDULE_KEY, &PersistedSchedule { active: true })
            .await?;
        let delay = self.arm();
        info!(
            "⏰ 定时任务已开启，{:.1} 小时后触发",
            delay.as_secs_f64() / 3600.0
        );
        Ok(delay)
    }

    /// 关闭定时任务；重复调用无副作用
    pub async fn deactivate(&self) -> Result<(), SchedulerError> {
        self.disarm();
        self.store
            .save(SCHEDULE_KEY, &PersistedSchedule { active: false })
            .await?;
        info!("⏸️ 定时任务已关闭");
        Ok(())
    }

    /// 按持久化的开关恢复；开启状态下返回下次触发的时长
    pub async fn restore(&self) -> Result<Option<Duration>, SchedulerError> {
        let persisted: PersistedSchedule = self.store.load(SCHEDULE_KEY).await?;
        if persisted.active {
            let delay = self.arm();
            info!(
                "⏰ 已恢复定时任务，{:.1} 小时后触发",
                delay.as_secs_f64() / 3600.0
            );
            Ok(Some(delay))
        } else {
            Ok(None)
        }
    }

    /// 持久化的开关状态
    pub async fn persisted_active(&self) -> Result<bool, SchedulerError> {
        let persisted: PersistedSchedule = self.store.load(SCHEDULE_KEY).await?;
        Ok(persisted.active)
    }

    /// 进程退出前取消定时器，不修改持久化状态
    pub fn shutdown(&self) {
        self.disarm();
    }

    pub fn is_active(&self) -> bool {
        self.state().active
    }

    /// 最近一次计算出的等待时长
    pub fn armed_delay(&self) -> Option<Duration> {
        self.state().armed_delay
    }

    fn arm(&self) -> Duration {
        let mut state = self.state();
        if let Some(old) = state.pending.take() {
            old.abort();
        }

        let now = self.clock.now();
        let mut target = next_occurrence(now, self.at);
        let delay = until(now, target);
        let clock = self.clock.clone();
        let at = self.at;
        let trigger = self.trigger.clone();

        let handle = tokio::spawn(async move {
            let mut wait = delay;
            loop {
                sleep(wait).await;
                info!("⏰ 定时任务触发，开始批量生成");
                // 下一次从本次目标时刻之后算起，挂钟偏慢时同一天不会再触发
                let now = clock.now();
                target = next_occurrence(now.max(target), at);
                wait = until(now, target);
                tokio::spawn(trigger());
            }
        });

        state.active = true;
        state.pending = Some(handle);
        state.armed_delay = Some(delay);
        delay
    }

    fn disarm(&self) {
        let mut state = self.state();
        if let Some(handle) = state.pending.take() {
            handle.abort();
        }
        state.active = false;
        state.armed_delay = None;
    }
}

fn until(now: NaiveDateTime, target: NaiveDateTime) -> Duration {
    (target - now).to_std().unwrap_or(Duration::ZERO)
}

impl Drop for DailyScheduler {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(handle) = state.pending.take() {
            warn!("定时器随调度器一起释放");
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::FixedClock;
    use chrono::NaiveDate;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 跟随 tokio 虚拟时间前进的挂钟
    struct TokioClock {
        base: NaiveDateTime,
        started: tokio::time::Instant,
    }

    impl TokioClock {
        fn starting_at(base: NaiveDateTime) -> Self {
            Self {
                base,
                started: tokio::time::Instant::now(),
            }
        }
    }

    impl Clock for TokioClock {
        fn now(&self) -> NaiveDateTime {
            let elapsed = chrono::Duration::from_std(self.started.elapsed()).unwrap();
            self.base + elapsed
        }
    }

    /// 第一次读数准确，之后一直停在触发时刻前 100 毫秒
    struct LaggingClock {
        reads: AtomicUsize,
    }

    impl Clock for LaggingClock {
        fn now(&self) -> NaiveDateTime {
            if self.reads.fetch_add(1, Ordering::SeqCst) == 0 {
                local(2)
            } else {
                local(2) + chrono::Duration::milliseconds(3600 * 1000 - 100)
            }
        }
    }

    fn local(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 16)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    async fn scheduler_with(
        clock: Arc<dyn Clock>,
        dir: &tempfile::TempDir,
    ) -> (DailyScheduler, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let trigger: BatchTrigger = Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async {}.boxed()
        });
        let store = StateStore::open(dir.path()).await.unwrap();
        let scheduler = DailyScheduler::new(clock, 3, trigger, store).unwrap();
        (scheduler, fired)
    }

    async fn scheduler_at(
        hour_now: u32,
        dir: &tempfile::TempDir,
    ) -> (DailyScheduler, Arc<AtomicUsize>) {
        scheduler_with(Arc::new(FixedClock::new(local(hour_now))), dir).await
    }

    #[tokio::test]
    async fn test_activate_before_three_waits_one_hour() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, _) = scheduler_at(2, &dir).await;
        let delay = scheduler.activate().await.unwrap();
        assert_eq!(delay, Duration::from_secs(3600));
        assert!(scheduler.is_active());
    }

    #[tokio::test]
    async fn test_activate_after_three_waits_until_tomorrow() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, _) = scheduler_at(4, &dir).await;
        let delay = scheduler.activate().await.unwrap();
        assert_eq!(delay, Duration::from_secs(23 * 3600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, fired) = scheduler_at(2, &dir).await;
        scheduler.activate().await.unwrap();

        sleep(Duration::from_secs(3600 + 1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_again_next_day() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(TokioClock::starting_at(local(2)));
        let (scheduler, fired) = scheduler_with(clock, &dir).await;
        scheduler.activate().await.unwrap();

        sleep(Duration::from_secs(3600 + 1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        // 同一天内不会再次触发
        sleep(Duration::from_secs(3600)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        sleep(Duration::from_secs(24 * 3600 - 3600)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_wall_clock_does_not_fire_twice_same_day() {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(LaggingClock {
            reads: AtomicUsize::new(0),
        });
        let (scheduler, fired) = scheduler_with(clock, &dir).await;
        let delay = scheduler.activate().await.unwrap();
        assert_eq!(delay, Duration::from_secs(3600));

        sleep(Duration::from_millis(3600 * 1000 + 500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        sleep(Duration::from_secs(2 * 3600)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deactivate_cancels_pending_timer() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, fired) = scheduler_at(2, &dir).await;
        scheduler.activate().await.unwrap();
        scheduler.deactivate().await.unwrap();
        scheduler.deactivate().await.unwrap();

        sleep(Duration::from_secs(25 * 3600)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!scheduler.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reactivation_keeps_single_timer() {
        let dir = tempfile::tempdir().unwrap();
        let (scheduler, fired) = scheduler_at(2, &dir).await;
        scheduler.activate().await.unwrap();
        scheduler.activate().await.unwrap();

        sleep(Duration::from_secs(3600 + 1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restore_follows_persisted_flag() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (scheduler, _) = scheduler_at(2, &dir).await;
            scheduler.activate().await.unwrap();
        }

        let (restored, _) = scheduler_at(2, &dir).await;
        assert!(restored.persisted_active().await.unwrap());
        assert_eq!(restored.restore().await.unwrap(), Some(Duration::from_secs(3600)));
        assert!(restored.is_active());

        restored.deactivate().await.unwrap();
        let (again, _) = scheduler_at(2, &dir).await;
        assert_eq!(again.restore().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_hour_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).await.unwrap();
        let trigger: BatchTrigger = Arc::new(|| async {}.boxed());
        let result = DailyScheduler::new(Arc::new(FixedClock::new(local(1))), 24, trigger, store);
        assert!(matches!(result, Err(SchedulerError::Clock(_))));
    }
}

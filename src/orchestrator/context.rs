//! 进程级上下文
//!
//! 代替全局变量：持久化状态、结果日志、示例语料、运行锁都挂在这里，
//! 由 `init` 加载，注入给编排层各组件

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::info;

use crate::config::Config;
use crate::error::StoreError;
use crate::infrastructure::StateStore;
use crate::services::{ExampleCorpus, OutcomeLog};

pub struct AppContext {
    pub config: Config,
    pub store: StateStore,
    pub outcomes: OutcomeLog,
    pub corpus: ExampleCorpus,
    /// 同一时间只允许一个批量 / 重新发布 / 重新编译任务
    run_lock: Mutex<()>,
}

impl AppContext {
    pub async fn init(config: Config) -> Result<Arc<Self>, StoreError> {
        let store = StateStore::open(&config.state_dir).await?;
        let outcomes = OutcomeLog::new(store.clone());
        let corpus = ExampleCorpus::new(store.clone(), config.success_corpus_capacity);

        let existing = outcomes.all().await?;
        info!(
            "📁 状态目录: {} (已有 {} 条记录)",
            store.dir().display(),
            existing.len()
        );

        Ok(Arc::new(Self {
            config,
            store,
            outcomes,
            corpus,
            run_lock: Mutex::new(()),
        }))
    }

    /// 获取运行锁；已有任务在跑时排队等待
    pub async fn lock_runs(&self) -> MutexGuard<'_, ()> {
        if let Ok(guard) = self.run_lock.try_lock() {
            return guard;
        }
        info!("⏳ 已有任务在运行，等待其完成...");
        self.run_lock.lock().await
    }
}

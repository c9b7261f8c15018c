//! 结果日志 - 业务能力层
//!
//! 只追加；重新发布 / 重新编译通过 `replace` 原地替换同一 id 的记录

use uuid::Uuid;

use crate::error::StoreError;
use crate::infrastructure::StateStore;
use crate::models::RunOutcome;

const OUTCOMES_KEY: &str = "outcomes";

#[derive(Clone)]
pub struct OutcomeLog {
    store: StateStore,
}

impl OutcomeLog {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub async fn append(&self, outcome: RunOutcome) -> Result<(), StoreError> {
        self.store
            .update(OUTCOMES_KEY, |items: &mut Vec<RunOutcome>| items.push(outcome))
            .await
    }

    /// 原地替换，返回是否找到了该记录
    pub async fn replace(&self, outcome: RunOutcome) -> Result<bool, StoreError> {
        self.store
            .update(OUTCOMES_KEY, |items: &mut Vec<RunOutcome>| {
                match items.iter_mut().find(|o| o.id == outcome.id) {
                    Some(slot) => {
                        *slot = outcome;
                        true
                    }
                    None => false,
                }
            })
            .await
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<RunOutcome>, StoreError> {
        let items: Vec<RunOutcome> = self.store.load(OUTCOMES_KEY).await?;
        Ok(items.into_iter().find(|o| o.id == id))
    }

    /// 按追加顺序返回全部记录
    pub async fn all(&self) -> Result<Vec<RunOutcome>, StoreError> {
        self.store.load(OUTCOMES_KEY).await
    }
}

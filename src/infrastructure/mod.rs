//! 基础设施层：持有状态文件，只暴露能力
pub mod clock;
pub mod retry;
pub mod state_store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use retry::{Backoff, RetryPolicy};
pub use state_store::StateStore;

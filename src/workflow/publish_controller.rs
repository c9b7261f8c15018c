//! 稳健发布 - 流程层
//!
//! 每次尝试都完整执行 创建 → 上传 → 元数据 → 发布，
//! 中途失败算作整次失败，不续传。最多 10 次，等待时间线性增长。

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::clients::Publisher;
use crate::error::{GatewayError, PublishError};
use crate::infrastructure::RetryPolicy;
use crate::models::{PaperMetadata, PublishReceipt};
use crate::workflow::progress::{DONE_PERCENT, PUBLISH_PERCENT};
use crate::workflow::{Phase, ProgressObserver, ProgressUpdate};

pub struct RobustPublisher {
    publisher: Arc<dyn Publisher>,
    observer: Arc<dyn ProgressObserver>,
    policy: RetryPolicy,
}

impl RobustPublisher {
    pub fn new(publisher: Arc<dyn Publisher>, observer: Arc<dyn ProgressObserver>) -> Self {
        Self {
            publisher,
            observer,
            policy: RetryPolicy::publish(),
        }
    }

    pub async fn robust_publish(
        &self,
        pdf: &[u8],
        metadata: &PaperMetadata,
    ) -> Result<PublishReceipt, PublishError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.observer.on_progress(ProgressUpdate::status(
                Phase::Publish,
                PUBLISH_PERCENT,
                format!("发布尝试 {}/{}", attempt, self.policy.max_attempts),
            ));

            match self.publish_once(pdf, metadata).await {
                Ok(receipt) => {
                    info!("✓ 发布成功: {} ({})", receipt.external_id, receipt.link);
                    self.observer.on_progress(ProgressUpdate::status(
                        Phase::Done,
                        DONE_PERCENT,
                        format!("已发布: {}", receipt.link),
                    ));
                    return Ok(receipt);
                }
                Err(e) => {
                    if !self.policy.has_next(attempt) {
                        warn!("❌ 发布失败，已用尽 {} 次尝试: {}", attempt, e);
                        return Err(PublishError {
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }

                    let wait = self.policy.delay_for_attempt(attempt);
                    self.observer.on_progress(ProgressUpdate::Retry {
                        phase: Phase::Publish,
                        attempt,
                        max_attempts: self.policy.max_attempts,
                        reason: e.to_string(),
                        wait,
                    });
                    sleep(wait).await;
                }
            }
        }
    }

    /// 一次完整的发布尝试
    async fn publish_once(
        &self,
        pdf: &[u8],
        metadata: &PaperMetadata,
    ) -> Result<PublishReceipt, GatewayError> {
        let handle = self.publisher.create_draft().await?;
        self.publisher.upload(&handle, &metadata.file_name(), pdf).await?;
        self.publisher.attach_metadata(&handle, metadata).await?;
        self.publisher.finalize(&handle).await
    }
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::FutureExt;
use tracing::{info, warn};

use crate::clients::{CompileGateway, HttpCompileGateway, LlmClient, OpenAiBackend, Publisher, ZenodoPublisher};
use crate::config::Config;
use crate::infrastructure::{Clock, SystemClock};
use crate::orchestrator::{AppContext, BatchOrchestrator, BatchTrigger, DailyScheduler};
use crate::services::{GenerationService, PaperGenerator};
use crate::utils::logging;
use crate::workflow::{ProgressObserver, TracingObserver};

/// 应用主结构
///
/// 负责组装各层组件，对外暴露编排器和定时器
pub struct App {
    ctx: Arc<AppContext>,
    orchestrator: Arc<BatchOrchestrator>,
    scheduler: DailyScheduler,
}

impl App {
    /// 初始化应用：校验配置、加载状态、连接外部服务
    pub async fn initialize(config: Config) -> Result<Self> {
        config.validate()?;
        logging::log_startup(
            &config.llm_model_name,
            config.scheduled_batch_size,
            config.schedule_hour,
        );

        let ctx = AppContext::init(config)
            .await
            .context("加载状态目录失败")?;

        let llm = LlmClient::new(Arc::new(OpenAiBackend::new(&ctx.config)));
        let generator: Arc<dyn PaperGenerator> =
            Arc::new(GenerationService::new(llm, Some(ctx.corpus.clone())));
        let gateway: Arc<dyn CompileGateway> = Arc::new(HttpCompileGateway::new(&ctx.config));
        let publisher: Arc<dyn Publisher> = Arc::new(ZenodoPublisher::new(&ctx.config));

        Self::assemble(
            ctx,
            generator,
            gateway,
            publisher,
            Arc::new(TracingObserver),
            Arc::new(SystemClock),
        )
    }

    /// 用给定组件组装应用
    pub fn assemble(
        ctx: Arc<AppContext>,
        generator: Arc<dyn PaperGenerator>,
        gateway: Arc<dyn CompileGateway>,
        publisher: Arc<dyn Publisher>,
        observer: Arc<dyn ProgressObserver>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let orchestrator = Arc::new(BatchOrchestrator::new(
            ctx.clone(),
            generator,
            gateway,
            publisher,
            observer,
        ));

        let batch_size = ctx.config.scheduled_batch_size;
        let scheduled = orchestrator.clone();
        let trigger: BatchTrigger = Arc::new(move || {
            let orchestrator = scheduled.clone();
            async move {
                orchestrator.run_batch(batch_size).await;
            }
            .boxed()
        });

        let scheduler = DailyScheduler::new(
            clock,
            ctx.config.schedule_hour,
            trigger,
            ctx.store.clone(),
        )?;

        Ok(Self {
            ctx,
            orchestrator,
            scheduler,
        })
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    pub fn orchestrator(&self) -> &BatchOrchestrator {
        &self.orchestrator
    }

    pub fn scheduler(&self) -> &DailyScheduler {
        &self.scheduler
    }

    /// 守护进程启动时恢复定时任务
    ///
    /// 状态文件损坏或不可读时只记录警告，进程继续运行，等待 `schedule on` 重新写入
    pub async fn start_daemon(&self) -> Option<Duration> {
        match self.scheduler.restore().await {
            Ok(Some(delay)) => {
                info!("🕒 守护进程已启动，等待定时触发");
                Some(delay)
            }
            Ok(None) => {
                warn!("⚠️ 定时任务未开启，使用 `schedule on` 开启");
                None
            }
            Err(e) => {
                warn!("⚠️ 恢复定时任务失败: {}", e);
                None
            }
        }
    }

    /// 退出前清理：取消定时器，通知正在运行的批次停止
    pub fn shutdown(&self) {
        self.orchestrator.cancellation().cancel();
        self.scheduler.shutdown();
    }
}

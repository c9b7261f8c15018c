//! 批量论文编排器 - 编排层
//!
//! ## 职责
//!
//! 依次处理 N 篇互不相关的论文，每篇走完整条流水线并记录一条结果。
//!
//! ## 失败处理
//!
//! 1. **编译失败**：记录 CompilationFailed，继续下一篇
//! 2. **发布失败**：记录 Unpublished（保留草稿和 PDF），继续下一篇
//! 3. **其他错误**（标题 / 初稿生成等）：停止整个批次，提示出错阶段
//! 4. **取消**：立即停止整个批次，不为当前论文记录结果
//!
//! 之前已记录的结果不会因为后面论文的失败而被修改。

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clients::{CompileGateway, Publisher};
use crate::error::{AppResult, OrchestratorError};
use crate::models::{pick_random_topic, OutcomeStatus, PaperDraft, PaperMetadata, RunOutcome};
use crate::orchestrator::AppContext;
use crate::services::PaperGenerator;
use crate::utils::logging;
use crate::workflow::{
    AutomationRun, CancellationFlag, Phase, ProgressObserver, ProgressUpdate, RefinementLoop,
    RefinementOutcome, RefinementSettings, RobustCompiler, RobustPublisher,
};

/// 单篇论文的记录类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedKind {
    Published,
    Unpublished,
    CompilationFailed,
}

impl RecordedKind {
    pub fn label(self) -> &'static str {
        match self {
            RecordedKind::Published => "已发布",
            RecordedKind::Unpublished => "未发布",
            RecordedKind::CompilationFailed => "编译失败",
        }
    }
}

/// 批次提前结束的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchHalt {
    Cancelled {
        paper_index: usize,
    },
    Aborted {
        paper_index: usize,
        phase: Phase,
        /// 给用户看的状态信息
        message: String,
    },
}

/// 批次统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub requested: usize,
    pub published: usize,
    pub unpublished: usize,
    pub compile_failed: usize,
    pub halt: Option<BatchHalt>,
}

impl BatchSummary {
    pub fn recorded(&self) -> usize {
        self.published + self.unpublished + self.compile_failed
    }

    fn count(&mut self, kind: RecordedKind) {
        match kind {
            RecordedKind::Published => self.published += 1,
            RecordedKind::Unpublished => self.unpublished += 1,
            RecordedKind::CompilationFailed => self.compile_failed += 1,
        }
    }
}

/// 单篇论文的处理结果
enum PaperResult {
    Recorded(RecordedKind),
    Cancelled,
}

/// 批量编排器
///
/// 持有流程层的三个控制器，通过 `AppContext` 访问持久化状态
pub struct BatchOrchestrator {
    ctx: Arc<AppContext>,
    generator: Arc<dyn PaperGenerator>,
    refinement: RefinementLoop,
    compiler: RobustCompiler,
    publisher: RobustPublisher,
    observer: Arc<dyn ProgressObserver>,
    cancel: CancellationFlag,
}

impl BatchOrchestrator {
    pub fn new(
        ctx: Arc<AppContext>,
        generator: Arc<dyn PaperGenerator>,
        gateway: Arc<dyn CompileGateway>,
        publisher: Arc<dyn Publisher>,
        observer: Arc<dyn ProgressObserver>,
    ) -> Self {
        let refinement = RefinementLoop::new(generator.clone(), observer.clone());
        let compiler = RobustCompiler::new(
            gateway,
            generator.clone(),
            Some(ctx.corpus.clone()),
            observer.clone(),
        );
        let publisher = RobustPublisher::new(publisher, observer.clone());

        Self {
            ctx,
            generator,
            refinement,
            compiler,
            publisher,
            observer,
            cancel: CancellationFlag::new(),
        }
    }

    /// 取消标志，外部（如 Ctrl-C）可以设置
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// 依次生成并处理 `count` 篇论文
    pub async fn run_batch(&self, count: usize) -> BatchSummary {
        let _guard = self.ctx.lock_runs().await;
        self.cancel.reset();

        let mut summary = BatchSummary {
            requested: count,
            ..Default::default()
        };
        logging::log_batch_start(count);

        for paper_index in 1..=count {
            // 每篇论文开始前清空进度
            self.observer.on_progress(ProgressUpdate::Reset { paper_index });
            let mut run = AutomationRun::new(paper_index, self.cancel.clone());
            logging::log_paper_start(paper_index, count);

            match self.run_single(&mut run).await {
                Ok(PaperResult::Recorded(kind)) => {
                    summary.count(kind);
                    logging::log_paper_complete(paper_index, count, kind.label());
                }
                Ok(PaperResult::Cancelled) => {
                    warn!("{} 🛑 已取消，停止整个批次", run);
                    summary.halt = Some(BatchHalt::Cancelled { paper_index });
                    break;
                }
                Err(e) => {
                    let message = status_message(run.phase, &e);
                    error!("{} {}", run, message);
                    summary.halt = Some(BatchHalt::Aborted {
                        paper_index,
                        phase: run.phase,
                        message,
                    });
                    break;
                }
            }
        }

        logging::print_final_stats(&summary, &self.ctx.config.output_log_file);
        summary
    }

    /// 处理单篇论文：选题 → 标题 → 打磨 → (格式整理) → 编译 → 发布 → 记录
    async fn run_single(&self, run: &mut AutomationRun) -> AppResult<PaperResult> {
        let config = &self.ctx.config;

        run.enter(Phase::Topic);
        let topic = pick_random_topic();
        info!("{} 🎲 选题: {} / {}", run, topic.field, topic.topic);

        if run.is_cancelled() {
            return Ok(PaperResult::Cancelled);
        }
        run.enter(Phase::Title);
        self.observer
            .on_progress(ProgressUpdate::status(Phase::Title, 0, "正在生成标题"));
        run.title = self.generator.generate_title(&topic, config.language).await?;
        info!("{} 📝 标题: {}", run, run.title);

        let settings = RefinementSettings {
            language: config.language,
            target_pages: config.target_pages,
            max_iterations: config.max_iterations,
        };
        let mut draft = match self.refinement.refine(run, settings).await? {
            RefinementOutcome::Completed(draft) => draft,
            RefinementOutcome::Cancelled => return Ok(PaperResult::Cancelled),
        };

        if config.style_pass {
            if run.is_cancelled() {
                return Ok(PaperResult::Cancelled);
            }
            run.enter(Phase::Style);
            draft = self.generator.reformat_style(&draft).await?;
            run.draft = Some(draft.clone());
        }

        // ========== 编译 ==========
        run.enter(Phase::Compile);
        let compiled = match self.compiler.robust_compile(&draft).await {
            Ok(compiled) => compiled,
            Err(e) => {
                warn!("{} ⚠️ {}", run, e);
                let outcome = RunOutcome::compilation_failed(run.title.clone(), draft)
                    .with_keywords(topic.keywords());
                self.record(run, outcome).await?;
                return Ok(PaperResult::Recorded(RecordedKind::CompilationFailed));
            }
        };
        if compiled.repaired {
            info!("{} 🔧 使用 AI 修复后的源码", run);
        }
        run.draft = Some(compiled.source.clone());

        // ========== 发布 ==========
        run.enter(Phase::Publish);
        let metadata = PaperMetadata::from_draft(
            &run.title,
            &compiled.source,
            &config.author_name,
            topic.keywords(),
            config.language,
        );
        let published = self.publisher.robust_publish(&compiled.pdf, &metadata).await;
        match published {
            Ok(receipt) => {
                let outcome =
                    RunOutcome::published(run.title.clone(), receipt).with_keywords(metadata.keywords);
                self.record(run, outcome).await?;
                Ok(PaperResult::Recorded(RecordedKind::Published))
            }
            Err(e) => {
                warn!("{} ⚠️ {}", run, e);
                let outcome = RunOutcome::unpublished(run.title.clone(), compiled.source, compiled.pdf)
                    .with_keywords(metadata.keywords);
                self.record(run, outcome).await?;
                Ok(PaperResult::Recorded(RecordedKind::Unpublished))
            }
        }
    }

    /// 追加一条结果并写入运行日志
    async fn record(&self, run: &mut AutomationRun, outcome: RunOutcome) -> AppResult<()> {
        run.enter(Phase::Record);
        let line = outcome.summary_line();
        self.ctx.outcomes.append(outcome).await?;
        info!("{} 📌 已记录: {}", run, line);
        if let Err(e) = logging::append_log_line(&self.ctx.config.output_log_file, &line) {
            warn!("⚠️ 写入运行日志失败: {}", e);
        }
        Ok(())
    }

    /// 重新发布一条未发布的记录，成功后原地提升为已发布
    pub async fn republish(&self, id: Uuid) -> AppResult<RunOutcome> {
        let _guard = self.ctx.lock_runs().await;
        let config = &self.ctx.config;

        let outcome = self
            .ctx
            .outcomes
            .get(id)
            .await?
            .ok_or(OrchestratorError::OutcomeNotFound(id))?;

        let receipt = match &outcome.status {
            OutcomeStatus::Published { .. } => return Err(OrchestratorError::AlreadyPublished(id)),
            OutcomeStatus::CompilationFailed { .. } => return Err(OrchestratorError::NeedsRecompile(id)),
            OutcomeStatus::Unpublished { draft, pdf } => {
                info!("📤 重新发布: {}", outcome.title);
                let metadata = PaperMetadata::from_draft(
                    &outcome.title,
                    draft,
                    &config.author_name,
                    outcome.keywords.clone(),
                    config.language,
                );
                self.publisher.robust_publish(pdf, &metadata).await?
            }
        };

        let promoted = outcome.into_published(receipt);
        self.ctx.outcomes.replace(promoted.clone()).await?;
        self.log_promotion(&promoted);
        Ok(promoted)
    }

    /// 按人工指令强制修复并重新编译，成功后继续发布
    ///
    /// 编译仍失败时：编译失败记录换成最新的修复稿，未发布记录保持不变
    pub async fn recompile(&self, id: Uuid, instructions: &str) -> AppResult<RunOutcome> {
        let _guard = self.ctx.lock_runs().await;
        let config = &self.ctx.config;

        let outcome = self
            .ctx
            .outcomes
            .get(id)
            .await?
            .ok_or(OrchestratorError::OutcomeNotFound(id))?;

        let draft: PaperDraft = match &outcome.status {
            OutcomeStatus::Published { .. } => return Err(OrchestratorError::AlreadyPublished(id)),
            OutcomeStatus::Unpublished { draft, .. } | OutcomeStatus::CompilationFailed { draft } => {
                draft.clone()
            }
        };

        info!("🔧 按指令修复: {}", outcome.title);
        let repaired = self
            .generator
            .repair_latex(
                draft.source(),
                "A manual recompile was requested; no compiler output is available.",
                Some(instructions),
            )
            .await?;

        let compiled = match self
            .compiler
            .robust_compile_with(&repaired, Some(instructions))
            .await
        {
            Ok(compiled) => compiled,
            Err(e) => {
                warn!("⚠️ 按指令修复后仍无法编译: {}", e);
                if matches!(outcome.status, OutcomeStatus::CompilationFailed { .. }) {
                    let updated = outcome.into_compilation_failed(repaired);
                    self.ctx.outcomes.replace(updated).await?;
                }
                return Err(e.into());
            }
        };

        let metadata = PaperMetadata::from_draft(
            &outcome.title,
            &compiled.source,
            &config.author_name,
            outcome.keywords.clone(),
            config.language,
        );
        let updated = match self.publisher.robust_publish(&compiled.pdf, &metadata).await {
            Ok(receipt) => outcome.into_published(receipt),
            Err(e) => {
                warn!("⚠️ 重新编译成功但发布失败: {}", e);
                outcome.into_unpublished(compiled.source, compiled.pdf)
            }
        };

        self.ctx.outcomes.replace(updated.clone()).await?;
        self.log_promotion(&updated);
        Ok(updated)
    }

    /// 全部记录，按追加顺序
    pub async fn list_outcomes(&self) -> AppResult<Vec<RunOutcome>> {
        Ok(self.ctx.outcomes.all().await?)
    }

    fn log_promotion(&self, outcome: &RunOutcome) {
        let line = outcome.summary_line();
        info!("📌 已更新: {}", line);
        if let Err(e) = logging::append_log_line(&self.ctx.config.output_log_file, &line) {
            warn!("⚠️ 写入运行日志失败: {}", e);
        }
    }
}

/// 批次中止时给用户看的状态信息
///
/// 额度耗尽单独提示，但与其他错误一样停止批次
pub fn status_message(phase: Phase, error: &OrchestratorError) -> String {
    if error.is_quota() {
        format!("⛔ LLM 额度已用尽 (阶段: {})，批量任务已停止，请稍后再试: {}", phase, error)
    } else {
        format!("❌ 阶段「{}」发生错误，批量任务已停止: {}", phase, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GenerationError;

    #[test]
    fn test_quota_errors_get_dedicated_message() {
        let err = OrchestratorError::Generation(GenerationError::CallFailed {
            model: "m".to_string(),
            attempts: 5,
            message: "You exceeded your current quota".to_string(),
        });
        let message = status_message(Phase::Title, &err);
        assert!(message.contains("额度已用尽"));
        assert!(message.contains("生成标题"));
    }

    #[test]
    fn test_quota_wording_outside_llm_errors_is_not_quota() {
        let err = OrchestratorError::Publish(crate::error::PublishError {
            attempts: 10,
            last_error: "storage quota note in response body".to_string(),
        });
        assert!(!err.is_quota());
        assert!(status_message(Phase::Publish, &err).contains("阶段「发布」"));
    }

    #[test]
    fn test_other_errors_name_the_phase() {
        let err = OrchestratorError::Generation(GenerationError::EmptyContent {
            model: "m".to_string(),
        });
        let message = status_message(Phase::Drafting, &err);
        assert!(!err.is_quota());
        assert!(message.contains("生成初稿"));
        assert!(!message.contains("额度"));
    }
}

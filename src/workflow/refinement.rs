//! 论文打磨流程 - 流程层
//!
//! 流程顺序：
//! 1. 生成初稿
//! 2. 评审当前稿件；所有维度 >= 7.0 立即停止
//! 3. 不是最后一次迭代时，带着完整评审请求修改，采用新稿件
//!
//! LLM 调用失败直接向上传播，不在这一层重试

use std::sync::Arc;

use tracing::info;

use crate::error::GenerationError;
use crate::models::{Language, PaperDraft};
use crate::services::PaperGenerator;
use crate::workflow::progress::{iteration_percent, GENERATION_PERCENT};
use crate::workflow::{AutomationRun, Phase, ProgressObserver, ProgressUpdate};

/// 打磨结果
#[derive(Debug, Clone, PartialEq)]
pub enum RefinementOutcome {
    /// 收敛或用完迭代次数，得到最终稿件
    Completed(PaperDraft),
    /// 被取消，没有最终稿件
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct RefinementSettings {
    pub language: Language,
    pub target_pages: u32,
    pub max_iterations: u32,
}

pub struct RefinementLoop {
    generator: Arc<dyn PaperGenerator>,
    observer: Arc<dyn ProgressObserver>,
}

impl RefinementLoop {
    pub fn new(generator: Arc<dyn PaperGenerator>, observer: Arc<dyn ProgressObserver>) -> Self {
        Self {
            generator,
            observer,
        }
    }

    /// 针对 `run.title` 生成并打磨论文
    ///
    /// 过程中更新 `run` 的阶段、当前稿件和评审记录
    pub async fn refine(
        &self,
        run: &mut AutomationRun,
        settings: RefinementSettings,
    ) -> Result<RefinementOutcome, GenerationError> {
        if run.is_cancelled() {
            return Ok(RefinementOutcome::Cancelled);
        }

        run.enter(Phase::Drafting);
        self.observer.on_progress(ProgressUpdate::status(
            Phase::Drafting,
            0,
            format!("正在生成初稿: {}", run.title),
        ));
        let mut current = self
            .generator
            .generate_paper(&run.title, settings.language, settings.target_pages)
            .await?;
        run.draft = Some(current.clone());
        self.observer.on_progress(ProgressUpdate::status(
            Phase::Drafting,
            GENERATION_PERCENT,
            "初稿生成完成",
        ));

        for iteration in 1..=settings.max_iterations {
            if run.is_cancelled() {
                info!("{} 🛑 已取消 (第 {} 次迭代前)", run, iteration);
                return Ok(RefinementOutcome::Cancelled);
            }

            run.enter(Phase::Critique);
            let report = self.generator.critique(&current, settings.language).await?;
            info!(
                "{} 第 {}/{} 次评审，最低分: {:.1}",
                run,
                iteration,
                settings.max_iterations,
                report.lowest_score().unwrap_or(0.0)
            );

            if report.is_converged() {
                run.critiques.push(report);
                info!("{} ✓ 所有维度均达标，停止迭代", run);
                self.observer.on_progress(ProgressUpdate::status(
                    Phase::Critique,
                    iteration_percent(settings.max_iterations, settings.max_iterations),
                    format!("第 {} 次评审全部达标", iteration),
                ));
                break;
            }

            if iteration < settings.max_iterations {
                if run.is_cancelled() {
                    info!("{} 🛑 已取消 (修改前)", run);
                    return Ok(RefinementOutcome::Cancelled);
                }
                run.enter(Phase::Revision);
                let flagged = report.flagged().count();
                current = self
                    .generator
                    .revise(&current, &report, settings.language, settings.target_pages)
                    .await?;
                run.draft = Some(current.clone());
                info!("{} ✓ 已根据 {} 个待改进维度完成修改", run, flagged);
            }
            run.critiques.push(report);

            // 最后一轮只评审不修改
            let phase = if iteration == settings.max_iterations {
                Phase::Critique
            } else {
                Phase::Revision
            };
            self.observer.on_progress(ProgressUpdate::status(
                phase,
                iteration_percent(iteration, settings.max_iterations),
                format!("完成第 {}/{} 次迭代", iteration, settings.max_iterations),
            ));
        }

        Ok(RefinementOutcome::Completed(current))
    }
}

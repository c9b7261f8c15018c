//! 稳健编译 - 流程层
//!
//! 阶段 1：同一份源码最多提交 3 次，间隔 1.5 秒
//! 阶段 2：3 次都失败后，带着累计的错误请求 AI 修复一次，再编译一次
//!
//! 内部吞掉所有单次失败，只有两个阶段都用尽才返回 `CompilationError`

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::clients::CompileGateway;
use crate::error::CompilationError;
use crate::infrastructure::RetryPolicy;
use crate::models::PaperDraft;
use crate::services::{ExampleCorpus, PaperGenerator};
use crate::workflow::progress::COMPILE_PERCENT;
use crate::workflow::{Phase, ProgressObserver, ProgressUpdate};

/// 编译成功的结果
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledPaper {
    /// 最终源码；经过 AI 修复时与输入不同，调用方需要保存
    pub source: PaperDraft,
    pub pdf: Vec<u8>,
    pub repaired: bool,
}

pub struct RobustCompiler {
    gateway: Arc<dyn CompileGateway>,
    generator: Arc<dyn PaperGenerator>,
    corpus: Option<ExampleCorpus>,
    observer: Arc<dyn ProgressObserver>,
    policy: RetryPolicy,
}

impl RobustCompiler {
    pub fn new(
        gateway: Arc<dyn CompileGateway>,
        generator: Arc<dyn PaperGenerator>,
        corpus: Option<ExampleCorpus>,
        observer: Arc<dyn ProgressObserver>,
    ) -> Self {
        Self {
            gateway,
            generator,
            corpus,
            observer,
            policy: RetryPolicy::compile(),
        }
    }

    pub async fn robust_compile(&self, source: &PaperDraft) -> Result<CompiledPaper, CompilationError> {
        self.robust_compile_with(source, None).await
    }

    /// 可以给修复阶段附带人工指令
    pub async fn robust_compile_with(
        &self,
        source: &PaperDraft,
        instructions: Option<&str>,
    ) -> Result<CompiledPaper, CompilationError> {
        // ========== 阶段 1: 原样重试 ==========
        let mut errors: Vec<String> = Vec::new();
        for attempt in 1..=self.policy.max_attempts {
            self.observer.on_progress(ProgressUpdate::status(
                Phase::Compile,
                COMPILE_PERCENT,
                format!("编译尝试 {}/{}", attempt, self.policy.max_attempts),
            ));

            match self.gateway.compile(source.source()).await {
                Ok(pdf) => {
                    info!("✓ 编译成功 (第 {} 次尝试, {} 字节)", attempt, pdf.len());
                    self.record_success(source.source());
                    return Ok(CompiledPaper {
                        source: source.clone(),
                        pdf,
                        repaired: false,
                    });
                }
                Err(e) => {
                    warn!("⚠️ 编译失败 (尝试 {}/{}): {}", attempt, self.policy.max_attempts, e);
                    errors.push(e.to_string());
                    if self.policy.has_next(attempt) {
                        let wait = self.policy.delay_for_attempt(attempt);
                        self.observer.on_progress(ProgressUpdate::Retry {
                            phase: Phase::Compile,
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

        self.record_failure(source.source());
        let original = errors.last().cloned().unwrap_or_else(|| "未知编译错误".to_string());

        // ========== 阶段 2: AI 修复后再编译一次 ==========
        self.observer.on_progress(ProgressUpdate::status(
            Phase::Repair,
            COMPILE_PERCENT,
            "编译多次失败，请求 AI 修复",
        ));
        let error_context = errors
            .iter()
            .enumerate()
            .map(|(i, e)| format!("Attempt {}: {}", i + 1, e))
            .collect::<Vec<_>>()
            .join("\n");

        let repaired = match self
            .generator
            .repair_latex(source.source(), &error_context, instructions)
            .await
        {
            Ok(repaired) => repaired,
            Err(e) => {
                warn!("❌ AI 修复调用失败: {}", e);
                return Err(CompilationError {
                    original,
                    repair: format!("AI 修复调用失败: {}", e),
                });
            }
        };

        match self.gateway.compile(repaired.source()).await {
            Ok(pdf) => {
                info!("✓ AI 修复后编译成功 ({} 字节)", pdf.len());
                self.record_success(repaired.source());
                Ok(CompiledPaper {
                    source: repaired,
                    pdf,
                    repaired: true,
                })
            }
            Err(e) => {
                warn!("❌ AI 修复后编译仍失败: {}", e);
                self.record_failure(repaired.source());
                Err(CompilationError {
                    original,
                    repair: format!("修复后编译失败: {}", e),
                })
            }
        }
    }

    fn record_success(&self, source: &str) {
        if let Some(corpus) = &self.corpus {
            corpus.record_success(source);
        }
    }

    fn record_failure(&self, source: &str) {
        if let Some(corpus) = &self.corpus {
            corpus.record_failure(source);
        }
    }
}

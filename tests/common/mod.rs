//! 集成测试共用的假实现
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use auto_paper_publish::clients::{CompileGateway, DepositionHandle, Publisher};
use auto_paper_publish::error::{GatewayError, GenerationError};
use auto_paper_publish::models::{
    CriterionScore, CritiqueReport, Language, PaperDraft, PaperMetadata, PublishReceipt, TopicSeed,
};
use auto_paper_publish::services::PaperGenerator;
use auto_paper_publish::workflow::{CancellationFlag, ProgressObserver, ProgressUpdate};
use auto_paper_publish::{AppContext, Config};

pub const FAKE_PDF: &[u8] = b"%PDF-1.5 fake";

pub fn report(scores: &[f32]) -> CritiqueReport {
    CritiqueReport::new(
        scores
            .iter()
            .enumerate()
            .map(|(i, score)| CriterionScore {
                criterion: format!("criterion-{}", i + 1),
                score: *score,
                suggestion: "tighten the argument".to_string(),
            })
            .collect(),
    )
}

pub fn test_config(dir: &Path) -> Config {
    Config {
        state_dir: dir.join("state"),
        output_log_file: dir.join("run.log").display().to_string(),
        max_iterations: 3,
        ..Config::default()
    }
}

pub async fn test_context(dir: &Path) -> Arc<AppContext> {
    AppContext::init(test_config(dir)).await.unwrap()
}

// ========== 论文生成 ==========

#[derive(Default)]
pub struct FakeGenerator {
    /// 依次返回的标题；用完后返回 "Untitled"
    pub titles: Mutex<VecDeque<Result<String, String>>>,
    /// 依次返回的评审分数；用完后全部 9 分
    pub critiques: Mutex<VecDeque<Vec<f32>>>,
    /// 第 n 次评审之后设置取消标志
    pub cancel_after_critiques: Mutex<Option<(usize, CancellationFlag)>>,
    pub repair_fails: AtomicBool,
    pub generate_calls: AtomicUsize,
    pub critique_calls: AtomicUsize,
    pub revise_calls: AtomicUsize,
    pub style_calls: AtomicUsize,
    pub repair_calls: AtomicUsize,
    pub repair_instructions: Mutex<Vec<Option<String>>>,
}

impl FakeGenerator {
    pub fn with_titles(titles: &[&str]) -> Self {
        let generator = Self::default();
        *generator.titles.lock().unwrap() = titles.iter().map(|t| Ok(t.to_string())).collect();
        generator
    }

    pub fn push_title_error(&self, message: &str) {
        self.titles.lock().unwrap().push_back(Err(message.to_string()));
    }

    pub fn push_critique(&self, scores: &[f32]) {
        self.critiques.lock().unwrap().push_back(scores.to_vec());
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaperGenerator for FakeGenerator {
    async fn generate_title(&self, _topic: &TopicSeed, _language: Language) -> Result<String, GenerationError> {
        match self.titles.lock().unwrap().pop_front() {
            Some(Ok(title)) => Ok(title),
            Some(Err(message)) => Err(GenerationError::CallFailed {
                model: "fake".to_string(),
                attempts: 5,
                message,
            }),
            None => Ok("Untitled".to_string()),
        }
    }

    async fn generate_paper(
        &self,
        title: &str,
        _language: Language,
        _target_pages: u32,
    ) -> Result<PaperDraft, GenerationError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(PaperDraft::new(format!(
            "\\documentclass{{article}}\n\\title{{{}}}\n\\begin{{document}}\n\\begin{{abstract}}About {}.\\end{{abstract}}\n\\end{{document}}",
            title, title
        )))
    }

    async fn critique(&self, _draft: &PaperDraft, _language: Language) -> Result<CritiqueReport, GenerationError> {
        let n = self.critique_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, flag)) = self.cancel_after_critiques.lock().unwrap().as_ref() {
            if n >= *after {
                flag.cancel();
            }
        }
        let scores = self
            .critiques
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![9.0, 9.0, 9.0]);
        Ok(report(&scores))
    }

    async fn revise(
        &self,
        draft: &PaperDraft,
        _report: &CritiqueReport,
        _language: Language,
        _target_pages: u32,
    ) -> Result<PaperDraft, GenerationError> {
        let n = self.revise_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(PaperDraft::new(format!("{}\n% revision {}", draft.source(), n)))
    }

    async fn reformat_style(&self, draft: &PaperDraft) -> Result<PaperDraft, GenerationError> {
        self.style_calls.fetch_add(1, Ordering::SeqCst);
        Ok(draft.clone())
    }

    async fn repair_latex(
        &self,
        source: &str,
        _error_context: &str,
        instructions: Option<&str>,
    ) -> Result<PaperDraft, GenerationError> {
        self.repair_calls.fetch_add(1, Ordering::SeqCst);
        self.repair_instructions
            .lock()
            .unwrap()
            .push(instructions.map(str::to_string));
        if self.repair_fails.load(Ordering::SeqCst) {
            return Err(GenerationError::EmptyContent {
                model: "fake".to_string(),
            });
        }
        Ok(PaperDraft::new(format!("{}\n% repaired", source)))
    }
}

// ========== 编译网关 ==========

#[derive(Default)]
pub struct FakeGateway {
    /// 前 n 次调用失败
    pub failures_left: AtomicUsize,
    /// 源码包含该标记时一直失败
    pub fail_marker: Mutex<Option<String>>,
    pub calls: AtomicUsize,
}

impl FakeGateway {
    pub fn failing_first(n: usize) -> Self {
        let gateway = Self::default();
        gateway.failures_left.store(n, Ordering::SeqCst);
        gateway
    }

    pub fn failing_on(marker: &str) -> Self {
        let gateway = Self::default();
        *gateway.fail_marker.lock().unwrap() = Some(marker.to_string());
        gateway
    }
}

#[async_trait]
impl CompileGateway for FakeGateway {
    async fn compile(&self, source: &str) -> Result<Vec<u8>, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(GatewayError::Compile("Undefined control sequence".to_string()));
        }
        if let Some(marker) = self.fail_marker.lock().unwrap().as_deref() {
            if source.contains(marker) {
                return Err(GatewayError::Compile(format!("Missing $ inserted near {}", marker)));
            }
        }
        Ok(FAKE_PDF.to_vec())
    }
}

// ========== 发布仓库 ==========

#[derive(Default)]
pub struct FakePublisher {
    /// 前 n 次上传失败
    pub upload_failures_left: AtomicUsize,
    /// 标题包含该标记时一直失败
    pub fail_title_marker: Mutex<Option<String>>,
    pub always_fail: AtomicBool,
    pub create_calls: AtomicUsize,
    pub finalize_calls: AtomicUsize,
    pub current_title: Mutex<String>,
    pub last_keywords: Mutex<Vec<String>>,
}

impl FakePublisher {
    pub fn failing_on_title(marker: &str) -> Self {
        let publisher = Self::default();
        *publisher.fail_title_marker.lock().unwrap() = Some(marker.to_string());
        publisher
    }

    fn rejected(step: &str) -> GatewayError {
        GatewayError::Rejected {
            endpoint: step.to_string(),
            status: 503,
            message: "service unavailable".to_string(),
        }
    }
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn create_draft(&self) -> Result<DepositionHandle, GatewayError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.always_fail.load(Ordering::SeqCst) {
            return Err(Self::rejected("create"));
        }
        Ok(DepositionHandle {
            id: format!("dep-{}", n),
            bucket_url: format!("https://repo.test/files/{}", n),
        })
    }

    async fn upload(&self, _handle: &DepositionHandle, _file_name: &str, _pdf: &[u8]) -> Result<(), GatewayError> {
        let left = self.upload_failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.upload_failures_left.store(left - 1, Ordering::SeqCst);
            return Err(Self::rejected("upload"));
        }
        Ok(())
    }

    async fn attach_metadata(&self, _handle: &DepositionHandle, metadata: &PaperMetadata) -> Result<(), GatewayError> {
        if let Some(marker) = self.fail_title_marker.lock().unwrap().as_deref() {
            if metadata.title.contains(marker) {
                return Err(Self::rejected("metadata"));
            }
        }
        *self.current_title.lock().unwrap() = metadata.title.clone();
        *self.last_keywords.lock().unwrap() = metadata.keywords.clone();
        Ok(())
    }

    async fn finalize(&self, handle: &DepositionHandle) -> Result<PublishReceipt, GatewayError> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        Ok(PublishReceipt {
            external_id: handle.id.clone(),
            link: format!("https://repo.test/records/{}", handle.id),
        })
    }
}

// ========== 进度观察者 ==========

#[derive(Default)]
pub struct RecordingObserver {
    pub updates: Mutex<Vec<ProgressUpdate>>,
}

impl RecordingObserver {
    pub fn retries(&self) -> Vec<ProgressUpdate> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|u| matches!(u, ProgressUpdate::Retry { .. }))
            .cloned()
            .collect()
    }

    pub fn resets(&self) -> usize {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter(|u| matches!(u, ProgressUpdate::Reset { .. }))
            .count()
    }
}

impl ProgressObserver for RecordingObserver {
    fn on_progress(&self, update: ProgressUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}

//! 论文生成服务 - 业务能力层
//!
//! 只负责"让 LLM 产出内容"的能力，不关心流程顺序：
//! 标题、初稿、评审、修改、格式整理、LaTeX 修复
//!
//! 提示词只描述任务，不追求固定措辞

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::clients::{LlmClient, LlmRequest};
use crate::error::GenerationError;
use crate::models::{CritiqueReport, Language, PaperDraft, TopicSeed};
use crate::services::ExampleCorpus;

/// 论文生成能力
///
/// 流程层只依赖这个 trait，测试中可以替换为假实现
#[async_trait]
pub trait PaperGenerator: Send + Sync {
    async fn generate_title(&self, topic: &TopicSeed, language: Language) -> Result<String, GenerationError>;

    async fn generate_paper(
        &self,
        title: &str,
        language: Language,
        target_pages: u32,
    ) -> Result<PaperDraft, GenerationError>;

    async fn critique(&self, draft: &PaperDraft, language: Language) -> Result<CritiqueReport, GenerationError>;

    async fn revise(
        &self,
        draft: &PaperDraft,
        report: &CritiqueReport,
        language: Language,
        target_pages: u32,
    ) -> Result<PaperDraft, GenerationError>;

    async fn reformat_style(&self, draft: &PaperDraft) -> Result<PaperDraft, GenerationError>;

    /// 根据编译错误修复 LaTeX，可附带人工指令
    async fn repair_latex(
        &self,
        source: &str,
        error_context: &str,
        instructions: Option<&str>,
    ) -> Result<PaperDraft, GenerationError>;
}

/// 基于 LLM 的论文生成服务
pub struct GenerationService {
    llm: LlmClient,
    corpus: Option<ExampleCorpus>,
}

impl GenerationService {
    pub fn new(llm: LlmClient, corpus: Option<ExampleCorpus>) -> Self {
        Self { llm, corpus }
    }

    /// 从成功 / 失败语料中生成提示
    async fn corpus_hints(&self) -> String {
        match &self.corpus {
            Some(corpus) => corpus.prompt_hints().await,
            None => String::new(),
        }
    }

    async fn ask_for_latex(&self, system: &str, user: String) -> Result<PaperDraft, GenerationError> {
        let response = self.llm.send_text(&LlmRequest::new(system, user)).await?;
        let latex = extract_latex(&response);
        if !latex.contains("\\begin{document}") {
            return Err(GenerationError::InvalidResponse {
                what: "LaTeX 源码",
                message: "缺少 \\begin{document}".to_string(),
            });
        }
        Ok(PaperDraft::new(latex))
    }
}

const LATEX_SYSTEM: &str = "You are an experienced academic author. You write complete, \
self-contained LaTeX documents that compile with pdflatex using only standard packages. \
Return only the LaTeX source.";

const REVIEWER_SYSTEM: &str = "You are a rigorous peer reviewer for an academic venue.";

#[async_trait]
impl PaperGenerator for GenerationService {
    async fn generate_title(&self, topic: &TopicSeed, language: Language) -> Result<String, GenerationError> {
        let prompt = format!(
            "Propose one concise, specific research paper title in {} about \"{}\" in the field of {}. \
             Return only the title.",
            language.prompt_name(),
            topic.topic,
            topic.field
        );
        let request = LlmRequest::new("You are a research advisor.", prompt);
        let title = self.llm.send_text(&request).await?;
        let title = title.lines().next().unwrap_or("").trim().trim_matches(['"', '*', '#']).trim().to_string();
        if title.is_empty() {
            return Err(GenerationError::InvalidResponse {
                what: "标题",
                message: "标题为空".to_string(),
            });
        }
        debug!("生成标题: {}", title);
        Ok(title)
    }

    async fn generate_paper(
        &self,
        title: &str,
        language: Language,
        target_pages: u32,
    ) -> Result<PaperDraft, GenerationError> {
        let hints = self.corpus_hints().await;
        let prompt = format!(
            "Write a complete research paper titled \"{}\" in {}, about {} pages long. \
             Include an abstract environment, introduction, related work, method, results, \
             discussion, conclusion and a bibliography.\n{}",
            title,
            language.prompt_name(),
            target_pages,
            hints
        );
        self.ask_for_latex(LATEX_SYSTEM, prompt).await
    }

    async fn critique(&self, draft: &PaperDraft, language: Language) -> Result<CritiqueReport, GenerationError> {
        let prompt = format!(
            "Review the following paper (written in {}). Score it from 0 to 10 on: originality, \
             methodological rigor, clarity, structure, related work coverage, and LaTeX quality. \
             Return a JSON array of objects with fields \"criterion\", \"score\" and \"suggestion\".\n\n{}",
            language.prompt_name(),
            draft.source()
        );
        let request = LlmRequest::new(REVIEWER_SYSTEM, prompt).json();
        let response = self.llm.send_text(&request).await?;
        CritiqueReport::parse(&response)
    }

    async fn revise(
        &self,
        draft: &PaperDraft,
        report: &CritiqueReport,
        language: Language,
        target_pages: u32,
    ) -> Result<PaperDraft, GenerationError> {
        let prompt = format!(
            "Revise the paper below according to the review. All criteria are listed; items \
             marked [NEEDS WORK] must be improved, items marked [OK] should be preserved. \
             Keep it in {} and about {} pages.\n\nReview:\n{}\n\nPaper:\n{}",
            language.prompt_name(),
            target_pages,
            report.render_for_revision(),
            draft.source()
        );
        let request = LlmRequest::new(LATEX_SYSTEM, prompt).with_search();
        let response = self.llm.send(&request).await?;
        if !response.citations.is_empty() {
            debug!("修改稿引用了 {} 个来源", response.citations.len());
        }
        let latex = extract_latex(&response.text);
        if !latex.contains("\\begin{document}") {
            return Err(GenerationError::InvalidResponse {
                what: "LaTeX 源码",
                message: "缺少 \\begin{document}".to_string(),
            });
        }
        Ok(PaperDraft::new(latex))
    }

    async fn reformat_style(&self, draft: &PaperDraft) -> Result<PaperDraft, GenerationError> {
        let prompt = format!(
            "Reformat the following LaTeX paper into a clean journal style: consistent section \
             hierarchy, numbered equations, booktabs tables, and a uniform bibliography. \
             Do not change the content.\n\n{}",
            draft.source()
        );
        self.ask_for_latex(LATEX_SYSTEM, prompt).await
    }

    async fn repair_latex(
        &self,
        source: &str,
        error_context: &str,
        instructions: Option<&str>,
    ) -> Result<PaperDraft, GenerationError> {
        let hints = self.corpus_hints().await;
        let extra = instructions
            .map(|i| format!("\nAdditional instructions from the editor:\n{}\n", i))
            .unwrap_or_default();
        let prompt = format!(
            "The following LaTeX document fails to compile. Fix every error while keeping the \
             content intact.\n\nCompiler errors:\n{}\n{}\n{}\nDocument:\n{}",
            error_context, extra, hints, source
        );
        self.ask_for_latex(LATEX_SYSTEM, prompt).await
    }
}

/// 从 LLM 响应中取出 LaTeX 源码（去掉代码块和前后说明文字）
pub fn extract_latex(response: &str) -> String {
    let fenced = Regex::new(r"(?s)```(?:latex|tex)?\s*\n(.*?)```")
        .ok()
        .and_then(|re| re.captures(response).and_then(|c| c.get(1)).map(|m| m.as_str().to_string()));
    let body = fenced.unwrap_or_else(|| response.to_string());

    let start = body.find("\\documentclass");
    let end = body.rfind("\\end{document}").map(|i| i + "\\end{document}".len());
    match (start, end) {
        (Some(s), Some(e)) if s < e => body[s..e].to_string(),
        (Some(s), None) => body[s..].trim().to_string(),
        _ => body.trim().to_string(),
    }
}

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 论文草稿：某一时刻的 LaTeX 源码
///
/// 不可变，修改 / 修复都会产生新的草稿
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaperDraft {
    source: String,
}

impl PaperDraft {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 提取 `abstract` 环境中的摘要文本
    pub fn extract_abstract(&self) -> Option<String> {
        let re = Regex::new(r"(?s)\\begin\{abstract\}(.*?)\\end\{abstract\}").ok()?;
        let captures = re.captures(&self.source)?;
        let text = captures.get(1)?.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// 论文语言
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    Chinese,
}

impl Language {
    /// 提示词中使用的语言名称
    pub fn prompt_name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Chinese => "Simplified Chinese",
        }
    }

    /// 仓库元数据中的 ISO 639-3 代码
    pub fn iso_code(self) -> &'static str {
        match self {
            Language::English => "eng",
            Language::Chinese => "zho",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::English => write!(f, "english"),
            Language::Chinese => write!(f, "chinese"),
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "english" | "en" => Ok(Language::English),
            "chinese" | "zh" => Ok(Language::Chinese),
            other => Err(format!("不支持的语言: {}", other)),
        }
    }
}

/// 发布到仓库时附带的元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperMetadata {
    pub title: String,
    pub description: String,
    pub keywords: Vec<String>,
    pub creators: Vec<String>,
    pub language: Language,
}

impl PaperMetadata {
    /// 从草稿构建元数据，没有摘要时用标题代替
    pub fn from_draft(
        title: &str,
        draft: &PaperDraft,
        author: &str,
        keywords: Vec<String>,
        language: Language,
    ) -> Self {
        Self {
            title: title.to_string(),
            description: draft.extract_abstract().unwrap_or_else(|| title.to_string()),
            keywords,
            creators: vec![author.to_string()],
            language,
        }
    }

    /// 上传的 PDF 文件名
    pub fn file_name(&self) -> String {
        let slug: String = self
            .title
            .chars()
            .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect();
        let slug = slug.split('_').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("_");
        if slug.is_empty() {
            "paper.pdf".to_string()
        } else {
            format!("{}.pdf", slug)
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::PaperDraft;

/// 发布成功后仓库返回的标识
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub external_id: String,
    pub link: String,
}

/// 一篇论文走完编译 / 发布流程后的记录
///
/// 日志只追加；重新发布 / 重新编译会原地替换同一 id 的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// 首次发布时使用的关键词，重新发布 / 重新编译沿用
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Published {
        external_id: String,
        link: String,
        published_at: DateTime<Utc>,
    },
    /// 编译成功但发布失败，保留 PDF 以便稍后重试
    Unpublished {
        draft: PaperDraft,
        #[serde(with = "pdf_hex")]
        pdf: Vec<u8>,
    },
    /// 编译彻底失败，只保留草稿
    CompilationFailed { draft: PaperDraft },
}

impl RunOutcome {
    fn new(title: impl Into<String>, status: OutcomeStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            created_at: Utc::now(),
            keywords: Vec::new(),
            status,
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn published(title: impl Into<String>, receipt: PublishReceipt) -> Self {
        Self::new(
            title,
            OutcomeStatus::Published {
                external_id: receipt.external_id,
                link: receipt.link,
                published_at: Utc::now(),
            },
        )
    }

    pub fn unpublished(title: impl Into<String>, draft: PaperDraft, pdf: Vec<u8>) -> Self {
        Self::new(title, OutcomeStatus::Unpublished { draft, pdf })
    }

    pub fn compilation_failed(title: impl Into<String>, draft: PaperDraft) -> Self {
        Self::new(title, OutcomeStatus::CompilationFailed { draft })
    }

    /// 提升为已发布，保留 id / 标题 / 创建时间
    pub fn into_published(self, receipt: PublishReceipt) -> Self {
        Self {
            status: OutcomeStatus::Published {
                external_id: receipt.external_id,
                link: receipt.link,
                published_at: Utc::now(),
            },
            ..self
        }
    }

    /// 编译成功但发布失败
    pub fn into_unpublished(self, draft: PaperDraft, pdf: Vec<u8>) -> Self {
        Self {
            status: OutcomeStatus::Unpublished { draft, pdf },
            ..self
        }
    }

    /// 重新编译仍失败时更新草稿
    pub fn into_compilation_failed(self, draft: PaperDraft) -> Self {
        Self {
            status: OutcomeStatus::CompilationFailed { draft },
            ..self
        }
    }

    pub fn status_label(&self) -> &'static str {
        match &self.status {
            OutcomeStatus::Published { .. } => "已发布",
            OutcomeStatus::Unpublished { .. } => "未发布",
            OutcomeStatus::CompilationFailed { .. } => "编译失败",
        }
    }

    /// 日志中展示的一行摘要
    pub fn summary_line(&self) -> String {
        let detail = match &self.status {
            OutcomeStatus::Published { link, .. } => link.clone(),
            OutcomeStatus::Unpublished { pdf, .. } => format!("PDF {} 字节，可重新发布", pdf.len()),
            OutcomeStatus::CompilationFailed { draft } => {
                format!("草稿 {} 字符，可重新编译", draft.source().chars().count())
            }
        };
        format!(
            "{} | {} | {} | {} | {}",
            self.created_at.format("%Y-%m-%d %H:%M:%S"),
            self.id,
            self.status_label(),
            self.title,
            detail
        )
    }
}

/// PDF 字节在 JSON 中以十六进制字符串保存
mod pdf_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promotion_preserves_identity() {
        let original = RunOutcome::unpublished("T", PaperDraft::new("src"), vec![1, 2, 3]);
        let promoted = original.clone().into_published(PublishReceipt {
            external_id: "10.5281/zenodo.1".to_string(),
            link: "https://example.org/1".to_string(),
        });

        assert_eq!(promoted.id, original.id);
        assert_eq!(promoted.title, original.title);
        assert_eq!(promoted.created_at, original.created_at);
        assert!(matches!(promoted.status, OutcomeStatus::Published { .. }));
    }

    #[test]
    fn test_unpublished_keeps_pdf_through_json() {
        let outcome = RunOutcome::unpublished("T", PaperDraft::new("\\begin{document}"), vec![0x25, 0x50, 0x44, 0x46]);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "unpublished");
        assert_eq!(json["pdf"], "25504446");

        let back: RunOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back, outcome);
    }

    #[test]
    fn test_keywords_survive_promotion() {
        let keywords = vec!["物理学".to_string(), "量子纠错".to_string()];
        let failed = RunOutcome::compilation_failed("T", PaperDraft::new("src")).with_keywords(keywords.clone());

        let published = failed
            .into_unpublished(PaperDraft::new("src2"), vec![1])
            .into_published(PublishReceipt {
                external_id: "1".to_string(),
                link: "https://example.org/1".to_string(),
            });

        assert_eq!(published.keywords, keywords);
    }

    #[test]
    fn test_entry_without_keywords_still_loads() {
        let json = serde_json::json!({
            "id": "6f1c1c2e-8a3f-4d55-9a57-1d2f3c4b5a69",
            "title": "Old",
            "created_at": "2026-10-01T03:00:00Z",
            "status": "compilation_failed",
            "draft": PaperDraft::new("src"),
        });

        let outcome: RunOutcome = serde_json::from_value(json).unwrap();
        assert!(outcome.keywords.is_empty());
    }
}

//! 评审报告
//!
//! 两个阈值用途不同，不能合并：
//! - `CONVERGENCE_THRESHOLD`：所有维度都达到即停止迭代
//! - `REVISION_FLAG_THRESHOLD`：低于它的维度在修改请求中被标记为"需要改进"

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

pub const CONVERGENCE_THRESHOLD: f32 = 7.0;
pub const REVISION_FLAG_THRESHOLD: f32 = 8.5;

/// 单个评审维度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub criterion: String,
    /// 0 到 10 分
    pub score: f32,
    #[serde(default)]
    pub suggestion: String,
}

impl CriterionScore {
    pub fn needs_work(&self) -> bool {
        self.score < REVISION_FLAG_THRESHOLD
    }
}

/// 针对某一份草稿的评审报告，按维度有序
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CritiqueReport {
    pub criteria: Vec<CriterionScore>,
}

impl CritiqueReport {
    pub fn new(criteria: Vec<CriterionScore>) -> Self {
        Self { criteria }
    }

    /// 所有维度都 >= 7.0 时视为收敛
    pub fn is_converged(&self) -> bool {
        self.criteria.iter().all(|c| c.score >= CONVERGENCE_THRESHOLD)
    }

    pub fn flagged(&self) -> impl Iterator<Item = &CriterionScore> {
        self.criteria.iter().filter(|c| c.needs_work())
    }

    pub fn lowest_score(&self) -> Option<f32> {
        self.criteria.iter().map(|c| c.score).reduce(f32::min)
    }

    /// 渲染给修改请求使用：展示全部维度，只标记低于 8.5 的
    pub fn render_for_revision(&self) -> String {
        self.criteria
            .iter()
            .map(|c| {
                let mark = if c.needs_work() { "[NEEDS WORK]" } else { "[OK]" };
                format!("- {} {} ({:.1}/10): {}", mark, c.criterion, c.score, c.suggestion)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// 解析 LLM 返回的评审 JSON
    ///
    /// 接受数组 `[{criterion, score, suggestion}]` 或 `{"criteria": [...]}`，
    /// 容忍 ```json 代码块包裹。分数超出范围会被截断到 [0, 10]。
    pub fn parse(response: &str) -> Result<Self, GenerationError> {
        let body = strip_code_fence(response);

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            List(Vec<CriterionScore>),
            Wrapped { criteria: Vec<CriterionScore> },
        }

        let raw: Raw = serde_json::from_str(body).map_err(|e| GenerationError::InvalidResponse {
            what: "评审报告",
            message: e.to_string(),
        })?;
        let mut criteria = match raw {
            Raw::List(list) => list,
            Raw::Wrapped { criteria } => criteria,
        };

        if criteria.is_empty() {
            return Err(GenerationError::InvalidResponse {
                what: "评审报告",
                message: "没有任何评审维度".to_string(),
            });
        }

        for c in criteria.iter_mut() {
            if !c.score.is_finite() {
                return Err(GenerationError::InvalidResponse {
                    what: "评审报告",
                    message: format!("维度 {} 的分数无效", c.criterion),
                });
            }
            c.score = c.score.clamp(0.0, 10.0);
        }

        Ok(Self { criteria })
    }
}

/// 去掉 markdown 代码块包裹
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let re = match Regex::new(r"(?s)^```[a-zA-Z]*\s*\n(.*?)\n?```\s*$") {
        Ok(re) => re,
        Err(_) => return trimmed,
    };
    match re.captures(trimmed).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().trim(),
        None => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(name: &str, score: f32) -> CriterionScore {
        CriterionScore {
            criterion: name.to_string(),
            score,
            suggestion: String::new(),
        }
    }

    #[test]
    fn test_converged_only_when_all_at_least_seven() {
        assert!(CritiqueReport::new(vec![score("a", 7.0), score("b", 9.5)]).is_converged());
        assert!(!CritiqueReport::new(vec![score("a", 6.9), score("b", 10.0)]).is_converged());
    }

    #[test]
    fn test_flag_threshold_is_separate_from_convergence() {
        let report = CritiqueReport::new(vec![score("a", 7.5), score("b", 8.5), score("c", 9.0)]);
        // 已收敛，但 7.5 仍会被标记为需要改进
        assert!(report.is_converged());
        let flagged: Vec<_> = report.flagged().map(|c| c.criterion.as_str()).collect();
        assert_eq!(flagged, vec!["a"]);

        let rendered = report.render_for_revision();
        assert!(rendered.contains("[NEEDS WORK] a"));
        assert!(rendered.contains("[OK] b"));
        assert!(rendered.contains("[OK] c"));
    }

    #[test]
    fn test_parse_fenced_wrapped_json() {
        let text = "```json\n{\"criteria\": [{\"criterion\": \"clarity\", \"score\": 12, \"suggestion\": \"ok\"}]}\n```";
        let report = CritiqueReport::parse(text).unwrap();
        assert_eq!(report.criteria.len(), 1);
        assert_eq!(report.criteria[0].score, 10.0);
    }

    #[test]
    fn test_parse_plain_list() {
        let text = r#"[{"criterion": "novelty", "score": 6.5, "suggestion": "add related work"},
                      {"criterion": "rigor", "score": 8}]"#;
        let report = CritiqueReport::parse(text).unwrap();
        assert_eq!(report.criteria.len(), 2);
        assert_eq!(report.lowest_score(), Some(6.5));
        assert_eq!(report.criteria[1].suggestion, "");
    }

    #[test]
    fn test_parse_rejects_empty_report() {
        assert!(CritiqueReport::parse("[]").is_err());
        assert!(CritiqueReport::parse("not json").is_err());
    }
}

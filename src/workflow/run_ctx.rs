//! 单篇论文的运行上下文
//!
//! 封装"我正在处理第几篇、走到哪一步了"这一信息

use std::fmt::Display;

use crate::models::{CritiqueReport, PaperDraft};
use crate::workflow::{CancellationFlag, Phase};

/// 一篇论文从生成到记录结果期间的临时状态
///
/// 由批量编排器独占，结果记录之后即丢弃
#[derive(Debug, Clone)]
pub struct AutomationRun {
    /// 论文在本批中的序号（从 1 开始，仅用于日志）
    pub paper_index: usize,
    pub title: String,
    pub phase: Phase,
    pub draft: Option<PaperDraft>,
    pub critiques: Vec<CritiqueReport>,
    pub cancel: CancellationFlag,
}

impl AutomationRun {
    pub fn new(paper_index: usize, cancel: CancellationFlag) -> Self {
        Self {
            paper_index,
            title: String::new(),
            phase: Phase::Idle,
            draft: None,
            critiques: Vec::new(),
            cancel,
        }
    }

    pub fn enter(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Display for AutomationRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[论文 {}]", self.paper_index)
    }
}

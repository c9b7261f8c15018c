//! 编译示例语料 - 业务能力层
//!
//! - 成功编译的源码：有容量上限，先进先出淘汰
//! - 彻底失败的源码：不设上限
//!
//! 记录是"发出即忘"的：写入在后台任务中完成，失败只打日志，
//! 不会阻塞或影响编译流程。

use tracing::{debug, warn};

use crate::error::StoreError;
use crate::infrastructure::StateStore;

const SUCCESS_KEY: &str = "corpus_success";
const FAILED_KEY: &str = "corpus_failed";
/// 提示词中每个示例最多截取的字符数
const HINT_EXCERPT_CHARS: usize = 600;

#[derive(Clone)]
pub struct ExampleCorpus {
    store: StateStore,
    success_capacity: usize,
}

impl ExampleCorpus {
    pub fn new(store: StateStore, success_capacity: usize) -> Self {
        Self {
            store,
            success_capacity,
        }
    }

    pub fn record_success(&self, source: &str) {
        let corpus = self.clone();
        let source = source.to_string();
        tokio::spawn(async move {
            if let Err(e) = corpus.push_success(source).await {
                warn!("⚠️ 记录成功示例失败: {}", e);
            }
        });
    }

    pub fn record_failure(&self, source: &str) {
        let corpus = self.clone();
        let source = source.to_string();
        tokio::spawn(async move {
            if let Err(e) = corpus.push_failure(source).await {
                warn!("⚠️ 记录失败示例失败: {}", e);
            }
        });
    }

    pub async fn push_success(&self, source: String) -> Result<(), StoreError> {
        let capacity = self.success_capacity;
        self.store
            .update(SUCCESS_KEY, |items: &mut Vec<String>| {
                items.push(source);
                if items.len() > capacity {
                    let overflow = items.len() - capacity;
                    items.drain(..overflow);
                }
            })
            .await?;
        debug!("已记录成功编译示例");
        Ok(())
    }

    pub async fn push_failure(&self, source: String) -> Result<(), StoreError> {
        self.store
            .update(FAILED_KEY, |items: &mut Vec<String>| items.push(source))
            .await?;
        debug!("已记录失败编译示例");
        Ok(())
    }

    pub async fn successes(&self) -> Result<Vec<String>, StoreError> {
        self.store.load(SUCCESS_KEY).await
    }

    pub async fn failures(&self) -> Result<Vec<String>, StoreError> {
        self.store.load(FAILED_KEY).await
    }

    /// 给生成 / 修复提示词使用的参考片段
    ///
    /// 读取失败时返回空字符串
    pub async fn prompt_hints(&self) -> String {
        let successes = self.successes().await.unwrap_or_default();
        let failures = self.failures().await.unwrap_or_default();

        let mut hints = String::new();
        if let Some(latest) = successes.last() {
            hints.push_str("\nA preamble that compiled successfully before:\n");
            hints.push_str(&excerpt(latest));
            hints.push('\n');
        }
        if let Some(latest) = failures.last() {
            hints.push_str("\nA preamble that failed to compile before (avoid its mistakes):\n");
            hints.push_str(&excerpt(latest));
            hints.push('\n');
        }
        hints
    }
}

fn excerpt(source: &str) -> String {
    let head = match source.find("\\begin{document}") {
        Some(i) => &source[..i],
        None => source,
    };
    head.chars().take(HINT_EXCERPT_CHARS).collect()
}

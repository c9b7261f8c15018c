use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;
use crate::models::Language;

/// 程序配置文件
///
/// 加载顺序：默认值 ← TOML 文件 ← 环境变量
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
    // --- 编译网关 ---
    pub compile_endpoint: String,
    // --- 发布仓库 ---
    pub publisher_base_url: String,
    pub publisher_token: String,
    /// 发布时使用的作者名
    pub author_name: String,
    // --- 论文生成 ---
    /// 评审-修改的最大迭代次数
    pub max_iterations: u32,
    /// 目标页数
    pub target_pages: u32,
    pub language: Language,
    /// 评审结束后是否再做一次格式整理
    pub style_pass: bool,
    // --- 定时任务 ---
    /// 定时任务每次生成的论文数量
    pub scheduled_batch_size: usize,
    /// 每天触发的整点（本地时间）
    pub schedule_hour: u32,
    // --- 持久化与日志 ---
    /// 状态文件目录
    pub state_dir: PathBuf,
    /// 成功编译示例的保留数量
    pub success_corpus_capacity: usize,
    /// 输出日志文件
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o".to_string(),
            compile_endpoint: "http://localhost:8080/compile".to_string(),
            publisher_base_url: "https://zenodo.org/api".to_string(),
            publisher_token: String::new(),
            author_name: "Anonymous".to_string(),
            max_iterations: 5,
            target_pages: 8,
            language: Language::English,
            style_pass: true,
            scheduled_batch_size: 7,
            schedule_hour: 3,
            state_dir: PathBuf::from("state"),
            success_corpus_capacity: 5,
            output_log_file: "output.txt".to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default().merge_env()
    }

    /// 从 TOML 文件加载，再用环境变量覆盖
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        let config = base.merge_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
            path: path.display().to_string(),
            source,
        })
    }

    fn merge_env(self) -> Self {
        let default = self;
        Self {
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
            compile_endpoint: std::env::var("COMPILE_ENDPOINT").unwrap_or(default.compile_endpoint),
            publisher_base_url: std::env::var("PUBLISHER_BASE_URL").unwrap_or(default.publisher_base_url),
            publisher_token: std::env::var("PUBLISHER_TOKEN").unwrap_or(default.publisher_token),
            author_name: std::env::var("AUTHOR_NAME").unwrap_or(default.author_name),
            max_iterations: std::env::var("MAX_ITERATIONS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_iterations),
            target_pages: std::env::var("TARGET_PAGES").ok().and_then(|v| v.parse().ok()).unwrap_or(default.target_pages),
            language: std::env::var("PAPER_LANGUAGE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.language),
            style_pass: std::env::var("STYLE_PASS").ok().and_then(|v| v.parse().ok()).unwrap_or(default.style_pass),
            scheduled_batch_size: std::env::var("SCHEDULED_BATCH_SIZE").ok().and_then(|v| v.parse().ok()).unwrap_or(default.scheduled_batch_size),
            schedule_hour: std::env::var("SCHEDULE_HOUR").ok().and_then(|v| v.parse().ok()).unwrap_or(default.schedule_hour),
            state_dir: std::env::var("STATE_DIR").map(PathBuf::from).unwrap_or(default.state_dir),
            success_corpus_capacity: std::env::var("SUCCESS_CORPUS_CAPACITY").ok().and_then(|v| v.parse().ok()).unwrap_or(default.success_corpus_capacity),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid {
                field: "max_iterations",
                reason: "至少需要 1 次迭代".to_string(),
            });
        }
        if self.scheduled_batch_size == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduled_batch_size",
                reason: "至少需要生成 1 篇论文".to_string(),
            });
        }
        if self.schedule_hour > 23 {
            return Err(ConfigError::Invalid {
                field: "schedule_hour",
                reason: format!("{} 不是合法的小时", self.schedule_hour),
            });
        }
        for (field, value) in [
            ("llm_api_base_url", &self.llm_api_base_url),
            ("compile_endpoint", &self.compile_endpoint),
            ("publisher_base_url", &self.publisher_base_url),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "不能为空".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduled_batch_size, 7);
        assert_eq!(config.schedule_hour, 3);
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let config = Config {
            max_iterations: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "max_iterations", .. })
        ));
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "max_iterations = 3\nlanguage = \"chinese\"\nstyle_pass = false\n",
        )
        .unwrap();

        let config = Config::from_toml_file(&path).unwrap();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.language, Language::Chinese);
        assert!(!config.style_pass);
        // 未设置的字段保持默认值
        assert_eq!(config.target_pages, 8);
    }
}

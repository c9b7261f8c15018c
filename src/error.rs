use thiserror::Error;
use uuid::Uuid;

/// LLM 生成错误
///
/// 对当前论文的整个运行是致命的，不在流程层重试（重试只发生在 LLM 客户端内部）
#[derive(Debug, Error)]
pub enum GenerationError {
    /// 重试用尽后仍然失败
    #[error("LLM 调用失败 (模型: {model}, 已尝试 {attempts} 次): {message}")]
    CallFailed {
        model: String,
        attempts: u32,
        message: String,
    },
    /// 返回内容为空
    #[error("LLM 返回内容为空 (模型: {model})")]
    EmptyContent { model: String },
    /// 返回内容无法解析
    #[error("无法解析 LLM 返回的{what}: {message}")]
    InvalidResponse { what: &'static str, message: String },
}

impl GenerationError {
    /// 是否为额度耗尽类错误（状态信息中特殊提示）
    pub fn is_quota(&self) -> bool {
        self.to_string().to_lowercase().contains("quota")
    }
}

/// 单次外部调用（编译网关 / 发布仓库）失败
#[derive(Debug, Error)]
pub enum GatewayError {
    /// 网络请求失败
    #[error("请求失败 ({endpoint}): {message}")]
    Transport { endpoint: String, message: String },
    /// 服务返回非成功状态码
    #[error("服务返回错误 ({endpoint}, 状态码 {status}): {message}")]
    Rejected {
        endpoint: String,
        status: u16,
        message: String,
    },
    /// LaTeX 编译失败，携带从日志中提取的诊断信息
    #[error("LaTeX 编译失败: {0}")]
    Compile(String),
    /// 响应格式不符合预期
    #[error("响应格式错误 ({endpoint}): {message}")]
    BadResponse { endpoint: String, message: String },
}

impl GatewayError {
    pub fn transport(endpoint: impl Into<String>, source: impl std::fmt::Display) -> Self {
        GatewayError::Transport {
            endpoint: endpoint.into(),
            message: source.to_string(),
        }
    }
}

/// 编译错误：两个阶段（重试 + AI 修复）都用尽后才会产生
#[derive(Debug, Error)]
#[error("编译失败 (原始错误: {original}; 修复阶段错误: {repair})")]
pub struct CompilationError {
    /// 第一阶段最后一次编译的错误
    pub original: String,
    /// 修复调用或修复后编译的错误
    pub repair: String,
}

/// 发布错误：重试次数用尽
#[derive(Debug, Error)]
#[error("发布失败 (已尝试 {attempts} 次): {last_error}")]
pub struct PublishError {
    pub attempts: u32,
    pub last_error: String,
}

/// 状态持久化错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("读写状态文件失败 ({path}): {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("状态文件格式错误 ({path}): {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// 定时器错误：只记录日志，不会让进程崩溃
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("无法保存定时开关: {0}")]
    Persist(#[from] StoreError),
    #[error("时间计算失败: {0}")]
    Clock(String),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置项 {field} 无效: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("读取配置文件失败 ({path}): {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TOML 解析失败 ({path}): {source}")]
    TomlParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// 编排层错误（重新发布 / 重新编译等手动操作）
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("找不到记录: {0}")]
    OutcomeNotFound(Uuid),
    #[error("记录 {0} 已经发布，无需重复操作")]
    AlreadyPublished(Uuid),
    #[error("记录 {0} 尚未编译成功，请先重新编译")]
    NeedsRecompile(Uuid),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Compilation(#[from] CompilationError),
    #[error(transparent)]
    Publish(#[from] PublishError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrchestratorError {
    /// 只有 LLM 调用会因为额度耗尽失败
    pub fn is_quota(&self) -> bool {
        match self {
            OrchestratorError::Generation(e) => e.is_quota(),
            _ => false,
        }
    }
}

/// 应用程序结果类型
pub type AppResult<T> = Result<T, OrchestratorError>;

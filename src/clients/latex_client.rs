/// LaTeX 编译网关客户端
///
/// 网关本身是黑盒：提交源码，返回 PDF 或从编译日志中提取的诊断信息
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::Config;
use crate::error::GatewayError;

#[async_trait]
pub trait CompileGateway: Send + Sync {
    /// 编译 LaTeX 源码，成功返回 PDF 字节
    async fn compile(&self, source: &str) -> Result<Vec<u8>, GatewayError>;
}

/// 通过 HTTP 调用编译服务
pub struct HttpCompileGateway {
    client: reqwest::Client,
    endpoint: String,
}

/// 编译失败时网关返回的错误体
#[derive(Debug, Deserialize)]
struct CompileFailureBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    log: Option<String>,
}

impl HttpCompileGateway {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.compile_endpoint.clone(),
        }
    }
}

#[async_trait]
impl CompileGateway for HttpCompileGateway {
    async fn compile(&self, source: &str) -> Result<Vec<u8>, GatewayError> {
        debug!("提交编译，源码长度: {} 字符", source.len());

        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "latex": source }))
            .send()
            .await
            .map_err(|e| GatewayError::transport(&self.endpoint, e))?;

        let status = response.status();
        if status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| GatewayError::transport(&self.endpoint, e))?;
            if !bytes.starts_with(b"%PDF") {
                return Err(GatewayError::BadResponse {
                    endpoint: self.endpoint.clone(),
                    message: "返回内容不是 PDF".to_string(),
                });
            }
            return Ok(bytes.to_vec());
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() {
            return Err(GatewayError::Rejected {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
                message: body,
            });
        }

        let diagnostic = match serde_json::from_str::<CompileFailureBody>(&body) {
            Ok(parsed) => match (parsed.log, parsed.error) {
                (Some(log), _) => extract_diagnostic(&log),
                (None, Some(error)) => error,
                (None, None) => extract_diagnostic(&body),
            },
            Err(_) => extract_diagnostic(&body),
        };
        Err(GatewayError::Compile(diagnostic))
    }
}

/// 从 LaTeX 编译日志中提取人类可读的错误
///
/// 取以 `!` 开头的错误行以及紧随其后的 `l.<行号>` 上下文；
/// 日志里没有这类行时，返回日志末尾的一段
pub fn extract_diagnostic(log: &str) -> String {
    const MAX_ERRORS: usize = 5;
    const TAIL_CHARS: usize = 500;

    let line_re = Regex::new(r"^l\.(\d+)\s*(.*)$").ok();
    let lines: Vec<&str> = log.lines().collect();
    let mut errors = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let Some(message) = line.trim_start().strip_prefix('!') else {
            continue;
        };
        let mut entry = message.trim().to_string();
        if let Some(re) = &line_re {
            let context = lines
                .iter()
                .skip(i + 1)
                .take(8)
                .find_map(|l| re.captures(l.trim()));
            if let Some(caps) = context {
                let line_no = caps.get(1).map(|m| m.as_str()).unwrap_or("?");
                let snippet = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
                entry.push_str(&format!(" (line {}: {})", line_no, snippet));
            }
        }
        if !errors.contains(&entry) {
            errors.push(entry);
        }
        if errors.len() >= MAX_ERRORS {
            break;
        }
    }

    if !errors.is_empty() {
        return errors.join("; ");
    }

    let trimmed = log.trim();
    let count = trimmed.chars().count();
    if count > TAIL_CHARS {
        trimmed.chars().skip(count - TAIL_CHARS).collect()
    } else {
        trimmed.to_string()
    }
}

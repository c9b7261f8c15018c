/// 研究仓库发布客户端
///
/// 发布分四步：创建草稿 → 上传文件 → 填写元数据 → 正式发布。
/// 这里只封装单步调用，重试由 `RobustPublisher` 负责。
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::Config;
use crate::error::GatewayError;
use crate::models::{PaperMetadata, PublishReceipt};

/// 已创建但尚未发布的草稿
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositionHandle {
    pub id: String,
    /// 文件上传地址
    pub bucket_url: String,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn create_draft(&self) -> Result<DepositionHandle, GatewayError>;

    async fn upload(
        &self,
        handle: &DepositionHandle,
        file_name: &str,
        pdf: &[u8],
    ) -> Result<(), GatewayError>;

    async fn attach_metadata(
        &self,
        handle: &DepositionHandle,
        metadata: &PaperMetadata,
    ) -> Result<(), GatewayError>;

    async fn finalize(&self, handle: &DepositionHandle) -> Result<PublishReceipt, GatewayError>;
}

/// Zenodo 风格的 REST 接口
pub struct ZenodoPublisher {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct DepositionLinks {
    #[serde(default)]
    bucket: Option<String>,
    #[serde(default)]
    html: Option<String>,
    #[serde(default)]
    record_html: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DepositionResponse {
    id: Value,
    #[serde(default)]
    doi: Option<String>,
    links: DepositionLinks,
}

impl ZenodoPublisher {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.publisher_base_url.trim_end_matches('/').to_string(),
            token: config.publisher_token.clone(),
        }
    }

    fn depositions_url(&self) -> String {
        format!("{}/deposit/depositions", self.base_url)
    }

    /// 非 2xx 转成 `GatewayError::Rejected`
    async fn check(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(GatewayError::Rejected {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            message,
        })
    }

    async fn parse_deposition(
        response: reqwest::Response,
        endpoint: &str,
    ) -> Result<DepositionResponse, GatewayError> {
        response
            .json::<DepositionResponse>()
            .await
            .map_err(|e| GatewayError::BadResponse {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })
    }
}

fn id_to_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// 仓库元数据请求体
pub fn metadata_body(metadata: &PaperMetadata) -> Value {
    let creators: Vec<Value> = metadata
        .creators
        .iter()
        .map(|name| json!({ "name": name }))
        .collect();
    json!({
        "metadata": {
            "title": metadata.title,
            "upload_type": "publication",
            "publication_type": "preprint",
            "description": metadata.description,
            "creators": creators,
            "keywords": metadata.keywords,
            "language": metadata.language.iso_code(),
        }
    })
}

#[async_trait]
impl Publisher for ZenodoPublisher {
    async fn create_draft(&self) -> Result<DepositionHandle, GatewayError> {
        let endpoint = self.depositions_url();
        debug!("创建仓库草稿: {}", endpoint);

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.token)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| GatewayError::transport(&endpoint, e))?;
        let response = Self::check(response, &endpoint).await?;
        let deposition = Self::parse_deposition(response, &endpoint).await?;

        let bucket_url = deposition.links.bucket.ok_or_else(|| GatewayError::BadResponse {
            endpoint: endpoint.clone(),
            message: "缺少 links.bucket".to_string(),
        })?;

        Ok(DepositionHandle {
            id: id_to_string(&deposition.id),
            bucket_url,
        })
    }

    async fn upload(
        &self,
        handle: &DepositionHandle,
        file_name: &str,
        pdf: &[u8],
    ) -> Result<(), GatewayError> {
        let endpoint = format!("{}/{}", handle.bucket_url.trim_end_matches('/'), file_name);
        debug!("上传 PDF ({} 字节): {}", pdf.len(), endpoint);

        let response = self
            .client
            .put(&endpoint)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(pdf.to_vec())
            .send()
            .await
            .map_err(|e| GatewayError::transport(&endpoint, e))?;
        Self::check(response, &endpoint).await?;
        Ok(())
    }

    async fn attach_metadata(
        &self,
        handle: &DepositionHandle,
        metadata: &PaperMetadata,
    ) -> Result<(), GatewayError> {
        let endpoint = format!("{}/{}", self.depositions_url(), handle.id);
        debug!("填写元数据: {}", endpoint);

        let response = self
            .client
            .put(&endpoint)
            .bearer_auth(&self.token)
            .json(&metadata_body(metadata))
            .send()
            .await
            .map_err(|e| GatewayError::transport(&endpoint, e))?;
        Self::check(response, &endpoint).await?;
        Ok(())
    }

    async fn finalize(&self, handle: &DepositionHandle) -> Result<PublishReceipt, GatewayError> {
        let endpoint = format!("{}/{}/actions/publish", self.depositions_url(), handle.id);
        debug!("正式发布: {}", endpoint);

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| GatewayError::transport(&endpoint, e))?;
        let response = Self::check(response, &endpoint).await?;
        let deposition = Self::parse_deposition(response, &endpoint).await?;

        let external_id = deposition
            .doi
            .clone()
            .unwrap_or_else(|| id_to_string(&deposition.id));
        let link = deposition
            .links
            .record_html
            .or(deposition.links.html)
            .or_else(|| deposition.doi.map(|doi| format!("https://doi.org/{}", doi)))
            .unwrap_or_else(|| format!("{}/records/{}", self.base_url, handle.id));

        Ok(PublishReceipt { external_id, link })
    }
}

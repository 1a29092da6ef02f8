use async_trait::async_trait;
use reqwest::Client;
use shared::api::{
    AgentInput, AgentRequest, AppConfig, ChatRequest, ChatResponse, ErrorDetail, ImageRef,
    ImageRequest, ImageResponse, ModelCatalog, Usage,
};
use std::sync::LazyLock;
use std::time::Duration;

use crate::error::BackendError;

static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

/// Chat-capable transport. Split out as a trait so dispatch logic can be
/// exercised against an in-memory fake in tests.
#[async_trait]
pub trait ChatTransport: Send {
    async fn chat(&self, req: &ChatRequest) -> Result<String, BackendError>;
    async fn agent_completion(&self, prompt: &str) -> Result<String, BackendError>;
}

pub struct BackendClient {
    http: Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: SHARED_HTTP.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn fetch_config(&self) -> Result<AppConfig, BackendError> {
        let resp = self.http.get(self.url("/api/config")).send().await?;
        if !resp.status().is_success() {
            return Err(read_failure(resp).await);
        }
        Ok(resp.json().await?)
    }

    pub async fn fetch_usage(&self) -> Result<Usage, BackendError> {
        let resp = self.http.get(self.url("/api/usage")).send().await?;
        if !resp.status().is_success() {
            return Err(read_failure(resp).await);
        }
        Ok(resp.json().await?)
    }

    pub async fn fetch_models(&self) -> Result<ModelCatalog, BackendError> {
        let resp = self.http.get(self.url("/api/models")).send().await?;
        if !resp.status().is_success() {
            return Err(read_failure(resp).await);
        }
        Ok(resp.json().await?)
    }

    /// `POST /api/chat`: one full conversation in, one assistant reply out.
    pub async fn chat(&self, req: &ChatRequest) -> Result<String, BackendError> {
        let resp = self
            .http
            .post(self.url("/api/chat"))
            .json(req)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(read_failure(resp).await);
        }
        let body: ChatResponse = resp.json().await?;
        Ok(body.message.content)
    }

    /// `POST /api/agent-completion`: the alternate-persona route. The
    /// backend holds the agent configuration; only the prompt travels.
    pub async fn agent_completion(&self, prompt: &str) -> Result<String, BackendError> {
        let req = AgentRequest {
            input: AgentInput {
                prompt: prompt.to_string(),
            },
            parameters: serde_json::json!({}),
        };
        let resp = self
            .http
            .post(self.url("/api/agent-completion"))
            .json(&req)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(read_failure(resp).await);
        }
        let body: ChatResponse = resp.json().await?;
        Ok(body.message.content)
    }

    pub async fn generate_image(&self, req: &ImageRequest) -> Result<Vec<ImageRef>, BackendError> {
        let resp = self
            .http
            .post(self.url("/api/generate-image"))
            .json(req)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(read_failure(resp).await);
        }
        let body: ImageResponse = resp.json().await?;
        Ok(body.images)
    }

    /// Download raw bytes from an image URL the backend returned.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, BackendError> {
        let resp = self.http.get(url).send().await?;
        if !resp.status().is_success() {
            return Err(read_failure(resp).await);
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

#[async_trait]
impl ChatTransport for BackendClient {
    async fn chat(&self, req: &ChatRequest) -> Result<String, BackendError> {
        BackendClient::chat(self, req).await
    }

    async fn agent_completion(&self, prompt: &str) -> Result<String, BackendError> {
        BackendClient::agent_completion(self, prompt).await
    }
}

async fn read_failure(resp: reqwest::Response) -> BackendError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    tracing::warn!(status, "backend request failed");
    failure_from(status, &body)
}

/// Map a non-success status and body to the error taxonomy. The body is
/// normally `{"detail": ...}`, but anything can sit behind the proxy, so
/// raw text is kept as a truncated fallback.
fn failure_from(status: u16, body: &str) -> BackendError {
    let detail = match serde_json::from_str::<ErrorDetail>(body) {
        Ok(err) => err.detail,
        Err(_) => body.chars().take(800).collect(),
    };
    if status == 429 {
        BackendError::QuotaExceeded { detail }
    } else {
        BackendError::Api { status, detail }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_loses_trailing_slash() {
        let client = BackendClient::new("http://localhost:8000/");
        assert_eq!(client.url("/api/chat"), "http://localhost:8000/api/chat");
    }

    #[test]
    fn quota_status_maps_to_quota_error() {
        let err = failure_from(429, r#"{"detail":"limit reached"}"#);
        match err {
            BackendError::QuotaExceeded { detail } => assert_eq!(detail, "limit reached"),
            other => panic!("expected QuotaExceeded, got {other:?}"),
        }
    }

    #[test]
    fn api_error_keeps_status_and_detail() {
        let err = failure_from(502, r#"{"detail":"Upstream request failed"}"#);
        match err {
            BackendError::Api { status, detail } => {
                assert_eq!(status, 502);
                assert_eq!(detail, "Upstream request failed");
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[test]
    fn unparseable_body_falls_back_to_raw_text() {
        let err = failure_from(500, "<html>Internal Server Error</html>");
        match err {
            BackendError::Api { detail, .. } => {
                assert_eq!(detail, "<html>Internal Server Error</html>")
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[test]
    fn long_raw_bodies_are_truncated() {
        let body = "x".repeat(5000);
        let err = failure_from(500, &body);
        match err {
            BackendError::Api { detail, .. } => assert_eq!(detail.chars().count(), 800),
            other => panic!("expected Api, got {other:?}"),
        }
    }
}

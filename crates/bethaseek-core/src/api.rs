use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::DEFAULT_TOP_K;
use crate::error::GenerateError;

/// Anything that can turn a user query into response text.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, query: &str) -> Result<String, GenerateError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    query: &'a str,
    top_k: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    llm_response: String,
}

/// HTTP client for the generation backend (`/generate` and `/health`).
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    top_k: u32,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_http_client(Client::new(), base_url)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, GenerateError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_http_client(client, base_url))
    }

    /// Use a preconfigured reqwest client (proxy settings, TLS, ...).
    pub fn with_http_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn generate_response(&self, query: &str) -> Result<String, GenerateError> {
        let url = format!("{}/generate", self.base_url);
        debug!(%url, top_k = self.top_k, "sending generation request");

        let request = GenerateRequest {
            query,
            top_k: self.top_k,
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::Http { status, body });
        }

        let generated: GenerateResponse = response.json().await?;
        Ok(generated.llm_response)
    }

    /// `true` when the backend answers `/health` with a success status.
    pub async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!(%url, error = %e, "health check failed");
                false
            }
        }
    }
}

#[async_trait]
impl Generator for ApiClient {
    async fn generate(&self, query: &str) -> Result<String, GenerateError> {
        self.generate_response(query).await
    }
}

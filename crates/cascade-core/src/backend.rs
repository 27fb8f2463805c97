//! Narrow interface to the model inference backend.
//!
//! The engine never talks to an inference service directly; everything goes
//! through [`ModelBackend`]. The bundled [`HttpBackend`] speaks the local
//! model server's JSON API (`/api/generate`, `/api/tags`), but any
//! implementation of the trait will do; tests use static doubles.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CascadeError, Result};

/// Default hard bound on a single generate call.
const DEFAULT_GENERATE_TIMEOUT: Duration = Duration::from_secs(60);

/// Options for a single generate call.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub system_prompt: Option<String>,
    pub max_tokens: Option<usize>,
    /// Hard timeout for the call. A hung backend cannot stall a run.
    pub timeout: Duration,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_tokens: None,
            timeout: DEFAULT_GENERATE_TIMEOUT,
        }
    }
}

/// The model backend contract consumed by the router and the engine.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Generate a completion for `prompt` with the named model.
    async fn generate(&self, prompt: &str, model: &str, options: &GenerateOptions)
        -> Result<String>;

    /// List the model names the backend can currently serve.
    async fn list_available(&self) -> Result<Vec<String>>;
}

/// HTTP implementation against a local model server.
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ModelBackend for HttpBackend {
    async fn generate(
        &self,
        prompt: &str,
        model: &str,
        options: &GenerateOptions,
    ) -> Result<String> {
        let request = GenerateRequest {
            model,
            prompt,
            system: options.system_prompt.as_deref(),
            max_tokens: options.max_tokens,
            stream: false,
        };

        let send = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send();

        let response = tokio::time::timeout(options.timeout, send)
            .await
            .map_err(|_| CascadeError::Timeout(options.timeout))?
            .map_err(|e| CascadeError::Execution(format!("backend request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CascadeError::Execution(format!(
                "backend returned {} for model {model}",
                response.status()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| CascadeError::Execution(format!("malformed backend response: {e}")))?;

        Ok(body.response)
    }

    async fn list_available(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| CascadeError::Execution(format!("capability query failed: {e}")))?;

        if !response.status().is_success() {
            return Err(CascadeError::Execution(format!(
                "capability endpoint returned {}",
                response.status()
            )));
        }

        let body: TagsResponse = response
            .json()
            .await
            .map_err(|e| CascadeError::Execution(format!("malformed capability response: {e}")))?;

        Ok(body.models.into_iter().map(|m| m.name).collect())
    }
}

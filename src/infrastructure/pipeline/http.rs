//! HTTP pipeline runner

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::domain::{DomainError, PipelineOutcome, PipelineRunner};

/// Response body expected from the pipeline service
#[derive(Debug, Deserialize)]
struct PipelineResponse {
    success: bool,
    #[serde(default)]
    summary: String,
}

/// Posts `{ name, input }` to a pipeline service and reads back `{ success, summary }`
#[derive(Debug, Clone)]
pub struct HttpPipelineRunner {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpPipelineRunner {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("chain-controller/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DomainError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    async fn call(&self, name: &str, input: Value) -> Result<PipelineOutcome, String> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&json!({ "name": name, "input": input }))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("Pipeline timed out after {}ms", self.timeout.as_millis())
                } else {
                    format!("Pipeline request failed: {}", e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("Pipeline returned HTTP {}", status));
        }

        let body: PipelineResponse = response
            .json()
            .await
            .map_err(|e| format!("Invalid pipeline response: {}", e))?;

        Ok(PipelineOutcome {
            success: body.success,
            summary: body.summary,
        })
    }
}

#[async_trait]
impl PipelineRunner for HttpPipelineRunner {
    async fn run_pipeline(&self, name: &str, input: Value) -> PipelineOutcome {
        match self.call(name, input).await {
            Ok(outcome) => {
                info!(pipeline = %name, success = outcome.success, "Pipeline finished");
                outcome
            }
            Err(message) => {
                warn!(pipeline = %name, error = %message, "Pipeline failed");
                PipelineOutcome::failure(message)
            }
        }
    }
}

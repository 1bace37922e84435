//! reqwest-backed step executor

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::registry::ServiceRegistry;
use crate::domain::chain::{
    ChainError, ChainStep, ExecutionContext, HttpMethod, ResolvedRequest, StepExecutor, StepResult,
    VariableResolver,
};
use crate::domain::DomainError;

/// Executes chain steps as HTTP calls to the configured target services
#[derive(Debug, Clone)]
pub struct HttpStepExecutor {
    client: reqwest::Client,
    registry: Arc<ServiceRegistry>,
    resolver: VariableResolver,
    default_timeout: Duration,
}

impl HttpStepExecutor {
    pub fn new(registry: Arc<ServiceRegistry>, default_timeout: Duration) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("chain-controller/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DomainError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            registry,
            resolver: VariableResolver::new(),
            default_timeout,
        })
    }

    fn to_method(method: HttpMethod) -> Method {
        match method {
            HttpMethod::GET => Method::GET,
            HttpMethod::POST => Method::POST,
            HttpMethod::PUT => Method::PUT,
            HttpMethod::PATCH => Method::PATCH,
            HttpMethod::DELETE => Method::DELETE,
        }
    }

    /// Parse a response body: JSON when possible, raw text otherwise
    fn parse_body(text: &str) -> Value {
        if text.trim().is_empty() {
            return Value::Null;
        }

        serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
    }

    async fn send(
        &self,
        request: &ResolvedRequest,
        url: &str,
        timeout: Duration,
    ) -> Result<(StatusCode, String), reqwest::Error> {
        let mut builder = self
            .client
            .request(Self::to_method(request.method), url)
            .timeout(timeout);

        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }

        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        if let Some(body) = &request.body {
            if request.method.allows_body() {
                builder = builder.json(body);
            } else {
                warn!(method = %request.method, url, "Dropping request body not allowed for method");
            }
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;

        Ok((status, text))
    }
}

#[async_trait]
impl StepExecutor for HttpStepExecutor {
    async fn execute(
        &self,
        step: &ChainStep,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> StepResult {
        let start = Instant::now();
        let request = ResolvedRequest::build(step, context, &self.resolver);

        let Some(base_url) = self.registry.base_url(step.service) else {
            return StepResult::failure(
                request,
                format!("No base URL configured for service '{}'", step.service),
                0,
            );
        };

        let url = format!("{}{}", base_url, request.endpoint);
        let timeout = step
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);

        debug!(step_id = %step.id, method = %request.method, url = %url, "Sending step request");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.send(&request, &url, timeout) => Some(result),
        };

        let elapsed = start.elapsed().as_millis() as u64;

        match outcome {
            None => StepResult::failure(request, "Cancelled before the service responded", elapsed),
            Some(Err(e)) if e.is_timeout() => StepResult::failure(
                request,
                ChainError::timeout(&step.id, timeout.as_millis() as u64).to_string(),
                elapsed,
            ),
            Some(Err(e)) => StepResult::failure(request, format!("Request failed: {}", e), elapsed),
            Some(Ok((status, text))) => {
                let body = Self::parse_body(&text);

                if status.is_success() {
                    StepResult::success(request, status.as_u16(), body, elapsed)
                } else {
                    StepResult::failure(request, format!("HTTP {}", status), elapsed)
                        .with_status(status.as_u16())
                        .with_body(body)
                }
            }
        }
    }
}

//! Transport seam between the orchestrator and a cloud API.

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::StatusCode;
use serde_json::Value;

use crate::config::CloudConfig;
use crate::error::{ProcessingError, ProcessingErrorKind};

use super::types::{Capability, StatusReply, SubmitAck};

/// Failure of a single HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    /// Connection, timeout or other failure with no HTTP status
    NoResponse { reason: String },
    Status { status: u16, message: String },
    /// The body did not match the wire format
    Decode { reason: String },
}

impl TransportError {
    /// Whether the same call may be issued again.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::NoResponse { .. } => true,
            TransportError::Status { status, .. } => is_retryable_status(*status),
            TransportError::Decode { .. } => false,
        }
    }

    /// Map into the processing taxonomy after `attempts` calls.
    pub fn into_processing(self, attempts: u32) -> ProcessingError {
        let kind = match self {
            TransportError::NoResponse { reason } => {
                ProcessingErrorKind::NetworkFailure { reason, attempts }
            }
            TransportError::Status { status, message } if is_retryable_status(status) => {
                ProcessingErrorKind::NetworkFailure {
                    reason: format!("HTTP {}: {}", status, message),
                    attempts,
                }
            }
            TransportError::Status { status, message } => {
                ProcessingErrorKind::ServerRejected { status, message }
            }
            TransportError::Decode { reason } => ProcessingErrorKind::Decode { reason },
        };
        ProcessingError::cloud(kind)
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS.as_u16()
        || StatusCode::from_u16(status).is_ok_and(|code| code.is_server_error())
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NoResponse { reason } => write!(f, "no response: {}", reason),
            TransportError::Status { status, message } => write!(f, "HTTP {}: {}", status, message),
            TransportError::Decode { reason } => write!(f, "malformed response: {}", reason),
        }
    }
}

impl std::error::Error for TransportError {}

/// One cloud capability API.
///
/// Implementations issue exactly one call per invocation; retrying is the
/// orchestrator's job.
pub trait CloudTransport: Send + Sync {
    fn submit<'a>(
        &'a self,
        capability: Capability,
        payload: &'a Value,
    ) -> BoxFuture<'a, Result<SubmitAck, TransportError>>;

    fn status<'a>(
        &'a self,
        capability: Capability,
        job_id: &'a str,
    ) -> BoxFuture<'a, Result<StatusReply, TransportError>>;
}

/// JSON-over-HTTP transport.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &CloudConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: &CloudConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }

    fn jobs_url(&self, capability: Capability) -> String {
        format!("{}/{}/jobs", self.base_url, capability)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, TransportError> {
        let response = self
            .authorize(request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| TransportError::NoResponse {
                reason: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|err| TransportError::Decode {
                reason: err.to_string(),
            })
    }
}

impl CloudTransport for HttpTransport {
    fn submit<'a>(
        &'a self,
        capability: Capability,
        payload: &'a Value,
    ) -> BoxFuture<'a, Result<SubmitAck, TransportError>> {
        let request = self.client.post(self.jobs_url(capability)).json(payload);
        self.send_json(request).boxed()
    }

    fn status<'a>(
        &'a self,
        capability: Capability,
        job_id: &'a str,
    ) -> BoxFuture<'a, Result<StatusReply, TransportError>> {
        let url = format!("{}/{}", self.jobs_url(capability), job_id);
        self.send_json(self.client.get(url)).boxed()
    }
}

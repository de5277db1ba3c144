//! Webhook delivery — provider-neutral trait with simulated and HTTP backends.
//!
//! DESIGN
//! ======
//! `WebhookDispatcher` is the seam between the webhook service and the
//! network. The simulated backend rolls the shared `Simulator`; the HTTP
//! backend POSTs the JSON envelope with an HMAC-SHA256 signature over the
//! exact body bytes, keyed by the webhook's secret.

use std::time::{Duration, Instant};

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tracing::error;

use crate::services::simulate::Simulator;
use crate::util::{bytes_to_hex, now_ms};

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const EVENT_HEADER: &str = "x-webhook-event";

const CONNECT_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

/// Everything a backend needs to deliver one event to one endpoint.
#[derive(Debug, Clone)]
pub struct DeliveryRequest<'a> {
    pub url: &'a str,
    pub secret: &'a str,
    pub event: &'a str,
    pub payload: &'a serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    pub success: bool,
    pub status_code: Option<u16>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

#[derive(Serialize)]
struct Envelope<'a> {
    event: &'a str,
    sent_at: i64,
    data: &'a serde_json::Value,
}

/// Async delivery seam. Enables mocking in tests.
#[async_trait::async_trait]
pub trait WebhookDispatcher: Send + Sync {
    async fn deliver(&self, request: DeliveryRequest<'_>) -> DeliveryOutcome;
}

/// `sha256=<hex hmac>` over `body` keyed by `secret`.
#[must_use]
pub fn sign(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length, so construction cannot fail.
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(body);
    format!("sha256={}", bytes_to_hex(&mac.finalize().into_bytes()))
}

// =============================================================================
// SIMULATED
// =============================================================================

pub struct SimulatedDispatcher {
    simulator: Simulator,
}

impl SimulatedDispatcher {
    #[must_use]
    pub fn new(simulator: Simulator) -> Self {
        Self { simulator }
    }
}

#[async_trait::async_trait]
impl WebhookDispatcher for SimulatedDispatcher {
    async fn deliver(&self, _request: DeliveryRequest<'_>) -> DeliveryOutcome {
        let outcome = self.simulator.call().await;
        if outcome.success {
            DeliveryOutcome { success: true, status_code: Some(200), latency_ms: outcome.latency_ms, error: None }
        } else {
            DeliveryOutcome {
                success: false,
                status_code: Some(500),
                latency_ms: outcome.latency_ms,
                error: Some("simulated endpoint error".into()),
            }
        }
    }
}

// =============================================================================
// HTTP
// =============================================================================

pub struct HttpDispatcher {
    http: reqwest::Client,
}

impl HttpDispatcher {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, DispatchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| DispatchError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl WebhookDispatcher for HttpDispatcher {
    async fn deliver(&self, request: DeliveryRequest<'_>) -> DeliveryOutcome {
        let started = Instant::now();
        let elapsed_ms = || u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let envelope = Envelope { event: request.event, sent_at: now_ms(), data: request.payload };
        let body = match serde_json::to_vec(&envelope) {
            Ok(body) => body,
            Err(e) => {
                return DeliveryOutcome {
                    success: false,
                    status_code: None,
                    latency_ms: 0,
                    error: Some(format!("payload encode failed: {e}")),
                };
            }
        };
        let signature = sign(request.secret, &body);

        let response = self
            .http
            .post(request.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(EVENT_HEADER, request.event)
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await;

        match response {
            Ok(resp) => {
                let status = resp.status();
                DeliveryOutcome {
                    success: status.is_success(),
                    status_code: Some(status.as_u16()),
                    latency_ms: elapsed_ms(),
                    error: (!status.is_success()).then(|| format!("endpoint returned {status}")),
                }
            }
            Err(e) => {
                error!(url = request.url, event = request.event, error = %e, "webhook delivery failed");
                DeliveryOutcome { success: false, status_code: None, latency_ms: elapsed_ms(), error: Some(e.to_string()) }
            }
        }
    }
}

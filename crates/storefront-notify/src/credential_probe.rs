//! Credential-format discovery against the gateway's read-only endpoints.
//!
//! Before blaming the send catalog, operators can check which credential
//! parameter name the gateway accepts at all. Each probe issues one GET to a
//! balance/status endpoint; probes run sequentially and stop at the first one
//! that looks authenticated. No message is sent.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::delivery_engine::DeliveryEngine;
use crate::error::NotifyError;
use crate::response_classifier::parse_gateway_body;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialProbe {
    pub credential_param: String,
    pub path: String,
}

impl CredentialProbe {
    pub fn new(credential_param: &str, path: &str) -> Self {
        Self {
            credential_param: credential_param.to_string(),
            path: path.to_string(),
        }
    }
}

pub fn default_credential_probes() -> Vec<CredentialProbe> {
    vec![
        CredentialProbe::new("apikey", "/balance.php"),
        CredentialProbe::new("secret", "/v2/balance"),
        CredentialProbe::new("api_key", "/balance"),
        CredentialProbe::new("key", "/status"),
        CredentialProbe::new("secret", "/get/credits"),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialProbeAttempt {
    pub credential_param: String,
    pub endpoint: String,
    pub http_status: Option<u16>,
    pub raw_body: String,
    pub accepted: bool,
    pub error_message: Option<String>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialProbeReport {
    pub working_credential_param: Option<String>,
    pub attempts: Vec<CredentialProbeAttempt>,
}

/// A probe response counts as authenticated when it is a 200 with a non-empty
/// body whose `status` is neither `401` nor `"error"`.
pub fn is_authenticated_probe_response(http_status: u16, body: &Value) -> bool {
    if http_status != 200 {
        return false;
    }
    let empty = match body {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Bool(flag) => !flag,
        Value::Number(_) => false,
    };
    if empty {
        return false;
    }
    match body.get("status") {
        Some(Value::Number(number)) => number.as_u64() != Some(401),
        Some(Value::String(text)) => text != "error",
        _ => true,
    }
}

/// A body that cannot be read never counts as authenticated.
fn apply_probe_response(
    attempt: &mut CredentialProbeAttempt,
    http_status: u16,
    body: Result<String, String>,
) {
    attempt.http_status = Some(http_status);
    match body {
        Ok(raw) => {
            attempt.accepted =
                is_authenticated_probe_response(http_status, &parse_gateway_body(&raw));
            attempt.raw_body = raw.trim().to_string();
        }
        Err(error) => {
            attempt.accepted = false;
            attempt.error_message = Some(format!("failed to read probe response body: {error}"));
        }
    }
}

pub async fn probe_credential_formats(
    engine: &DeliveryEngine,
    probes: &[CredentialProbe],
) -> Result<CredentialProbeReport, NotifyError> {
    let config = engine.config();
    let credential = config.credential().ok_or(NotifyError::MissingCredential)?;
    let timeout = Duration::from_millis(config.probe_timeout_ms);
    let base = config.gateway_base_url.trim_end_matches('/');

    let mut attempts = Vec::with_capacity(probes.len());
    for probe in probes {
        let endpoint = format!("{}/{}", base, probe.path.trim_start_matches('/'));
        let started = Instant::now();
        let mut attempt = CredentialProbeAttempt {
            credential_param: probe.credential_param.clone(),
            endpoint: endpoint.clone(),
            http_status: None,
            raw_body: String::new(),
            accepted: false,
            error_message: None,
            elapsed_ms: 0,
        };
        let response = engine
            .http_client()
            .get(endpoint.as_str())
            .query(&[(probe.credential_param.as_str(), credential)])
            .timeout(timeout)
            .send()
            .await;
        match response {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.map_err(|error| error.to_string());
                apply_probe_response(&mut attempt, status, body);
            }
            Err(error) => {
                attempt.error_message = Some(error.to_string());
            }
        }
        attempt.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(
            credential_param = %attempt.credential_param,
            endpoint = %attempt.endpoint,
            http_status = ?attempt.http_status,
            accepted = attempt.accepted,
            "credential probe finished"
        );

        let accepted = attempt.accepted;
        attempts.push(attempt);
        if accepted {
            info!(credential_param = %probe.credential_param, "found working credential format");
            return Ok(CredentialProbeReport {
                working_credential_param: Some(probe.credential_param.clone()),
                attempts,
            });
        }
    }

    Ok(CredentialProbeReport {
        working_credential_param: None,
        attempts,
    })
}

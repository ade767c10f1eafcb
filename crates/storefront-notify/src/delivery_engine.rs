//! Blind-probing delivery engine for the messaging gateway.
//!
//! `send` walks the configuration catalog strictly in order, issuing exactly
//! one HTTP request per entry until a response classifies as success. Every
//! attempt, including transport failures, is recorded in the attempt trace.
//! When the catalog is exhausted (or the caller cancels), the outcome carries a
//! click-to-chat fallback link and a failure record is handed to the sink.
//!
//! Known limitation: probing is not idempotent. An entry that really delivered
//! the message but returned an unrecognized response shape is classified as a
//! failure, and the loop moves on, so the recipient may receive duplicates.
//! Attempts are never run in parallel for the same reason.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::NotifyConfig;
use crate::error::NotifyError;
use crate::failure_log::{FailedDeliveryRecord, FailedDeliverySink, TracingFailureSink};
use crate::fallback_link::build_fallback_link;
use crate::gateway_catalog::{
    validate_catalog, BodyEncoding, GatewayConfiguration, GatewayHttpMethod, GatewayRequest,
};
use crate::phone_normalizer::{normalize_recipient_number, RecipientNumber};
use crate::response_classifier::{explain_gateway_response, parse_gateway_body, ClassificationRule};

const RAW_BODY_TRACE_LIMIT: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// One outbound message. Immutable once constructed.
pub struct MessageEnvelope {
    recipient: RecipientNumber,
    body: String,
    attachment_url: Option<String>,
}

impl MessageEnvelope {
    pub fn new(
        raw_recipient: &str,
        body: impl Into<String>,
        attachment_url: Option<String>,
    ) -> Result<Self, NotifyError> {
        if raw_recipient.trim().is_empty() {
            return Err(NotifyError::InvalidEnvelope(
                "recipient phone number is required".to_string(),
            ));
        }
        Self::from_recipient(
            normalize_recipient_number(raw_recipient),
            body,
            attachment_url,
        )
    }

    pub fn from_recipient(
        recipient: RecipientNumber,
        body: impl Into<String>,
        attachment_url: Option<String>,
    ) -> Result<Self, NotifyError> {
        let body = body.into();
        if body.trim().is_empty() {
            return Err(NotifyError::InvalidEnvelope(
                "message body must not be empty".to_string(),
            ));
        }
        let attachment_url = attachment_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        Ok(Self {
            recipient,
            body,
            attachment_url,
        })
    }

    pub fn recipient(&self) -> &RecipientNumber {
        &self.recipient
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn attachment_url(&self) -> Option<&str> {
        self.attachment_url.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryAttemptResult {
    pub configuration_name: String,
    pub method: String,
    pub endpoint: String,
    pub http_status: Option<u16>,
    pub raw_body: String,
    pub classified_success: bool,
    pub matched_rule: Option<ClassificationRule>,
    pub error_message: Option<String>,
    /// Decided from the full response body, before `raw_body` is truncated.
    pub auth_rejected: bool,
    pub elapsed_ms: u64,
}

impl DeliveryAttemptResult {
    /// True when the gateway rejected the credential for this request shape.
    pub fn is_auth_rejection(&self) -> bool {
        self.auth_rejected
    }
}

fn is_auth_rejection_response(http_status: u16, body: &serde_json::Value) -> bool {
    if http_status == 401 {
        return true;
    }
    match body.get("status") {
        Some(serde_json::Value::Number(number)) => number.as_f64() == Some(401.0),
        Some(serde_json::Value::String(text)) => text.trim() == "401",
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Terminal result of one `send`. Callers must check `success`.
pub struct DeliveryOutcome {
    pub success: bool,
    pub used_configuration: Option<String>,
    pub attempts: Vec<DeliveryAttemptResult>,
    pub fallback_url: Option<String>,
    pub failure_reason: Option<String>,
    pub cancelled: bool,
}

impl DeliveryOutcome {
    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    pub fn auth_rejection_count(&self) -> usize {
        self.attempts
            .iter()
            .filter(|attempt| attempt.is_auth_rejection())
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Cancelled,
    DeadlineExceeded,
}

impl StopReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Cancelled => "delivery cancelled",
            Self::DeadlineExceeded => "overall delivery deadline exceeded",
        }
    }
}

enum AttemptStep {
    Completed(DeliveryAttemptResult),
    Interrupted(StopReason),
}

#[derive(Clone)]
pub struct DeliveryEngine {
    config: NotifyConfig,
    catalog: Arc<Vec<GatewayConfiguration>>,
    client: reqwest::Client,
    failure_sink: Arc<dyn FailedDeliverySink>,
}

impl std::fmt::Debug for DeliveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryEngine")
            .field("gateway_base_url", &self.config.gateway_base_url)
            .field("catalog_size", &self.catalog.len())
            .finish_non_exhaustive()
    }
}

impl DeliveryEngine {
    pub fn new(
        config: NotifyConfig,
        catalog: Vec<GatewayConfiguration>,
    ) -> Result<Self, NotifyError> {
        config.validate()?;
        validate_catalog(&catalog)?;
        let client = reqwest::Client::builder()
            .timeout(config.attempt_timeout())
            .build()?;
        Ok(Self {
            config,
            catalog: Arc::new(catalog),
            client,
            failure_sink: Arc::new(TracingFailureSink),
        })
    }

    pub fn with_failure_sink(mut self, sink: Arc<dyn FailedDeliverySink>) -> Self {
        self.failure_sink = sink;
        self
    }

    pub fn config(&self) -> &NotifyConfig {
        &self.config
    }

    pub fn catalog(&self) -> &[GatewayConfiguration] {
        &self.catalog
    }

    pub(crate) fn http_client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Longest a single `send` can block when every configuration fails.
    pub fn worst_case_latency(&self) -> Duration {
        let catalog_size = u32::try_from(self.catalog.len()).unwrap_or(u32::MAX);
        let per_catalog = self.config.attempt_timeout().saturating_mul(catalog_size);
        match self.config.overall_deadline() {
            Some(deadline) => per_catalog.min(deadline),
            None => per_catalog,
        }
    }

    pub async fn send(&self, envelope: &MessageEnvelope) -> Result<DeliveryOutcome, NotifyError> {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.send_with_cancel(envelope, cancel_rx).await
    }

    /// Like [`DeliveryEngine::send`], aborting the remaining catalog when
    /// `cancel_rx` flips to `true` or the configured overall deadline passes.
    pub async fn send_with_cancel(
        &self,
        envelope: &MessageEnvelope,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> Result<DeliveryOutcome, NotifyError> {
        let credential = self
            .config
            .credential()
            .ok_or(NotifyError::MissingCredential)?;
        let sender = self.config.admin_recipient();
        let deadline = self
            .config
            .overall_deadline()
            .map(|limit| Instant::now() + limit);

        let mut attempts = Vec::with_capacity(self.catalog.len());
        let mut stop_reason = None;
        for configuration in self.catalog.iter() {
            if *cancel_rx.borrow() {
                stop_reason = Some(StopReason::Cancelled);
                break;
            }
            if deadline.is_some_and(|at| Instant::now() >= at) {
                stop_reason = Some(StopReason::DeadlineExceeded);
                break;
            }

            let request = configuration.build_request(
                &self.config.gateway_base_url,
                envelope,
                credential,
                sender,
            );
            debug!(
                configuration = %request.configuration_name,
                method = request.method.as_str(),
                endpoint = %request.endpoint,
                params = ?request.redacted_params(),
                "trying gateway configuration"
            );
            let started = Instant::now();
            let step = tokio::select! {
                biased;
                _ = wait_for_cancel(&mut cancel_rx) => AttemptStep::Interrupted(StopReason::Cancelled),
                _ = wait_for_deadline(deadline) => AttemptStep::Interrupted(StopReason::DeadlineExceeded),
                attempt = self.execute_attempt(&request) => AttemptStep::Completed(attempt),
            };

            match step {
                AttemptStep::Completed(attempt) => {
                    debug!(
                        configuration = %attempt.configuration_name,
                        http_status = ?attempt.http_status,
                        classified_success = attempt.classified_success,
                        rule = attempt.matched_rule.map(ClassificationRule::as_str).unwrap_or("none"),
                        error = attempt.error_message.as_deref().unwrap_or(""),
                        elapsed_ms = attempt.elapsed_ms,
                        "gateway attempt finished"
                    );
                    let succeeded = attempt.classified_success;
                    attempts.push(attempt);
                    if succeeded {
                        let used = configuration.name.clone();
                        info!(
                            configuration = %used,
                            attempts = attempts.len(),
                            recipient = %envelope.recipient(),
                            "message delivered"
                        );
                        return Ok(DeliveryOutcome {
                            success: true,
                            used_configuration: Some(used),
                            attempts,
                            fallback_url: None,
                            failure_reason: None,
                            cancelled: false,
                        });
                    }
                }
                AttemptStep::Interrupted(reason) => {
                    attempts.push(DeliveryAttemptResult {
                        configuration_name: request.configuration_name.clone(),
                        method: request.method.as_str().to_string(),
                        endpoint: request.endpoint.clone(),
                        http_status: None,
                        raw_body: String::new(),
                        classified_success: false,
                        matched_rule: None,
                        error_message: Some(reason.as_str().to_string()),
                        auth_rejected: false,
                        elapsed_ms: elapsed_ms(started),
                    });
                    stop_reason = Some(reason);
                    break;
                }
            }
        }

        Ok(self.finish_failed(envelope, attempts, stop_reason))
    }

    async fn execute_attempt(&self, request: &GatewayRequest) -> DeliveryAttemptResult {
        let started = Instant::now();
        let builder = self
            .client
            .request(request.method.to_reqwest(), request.endpoint.as_str());
        let builder = match (request.method, request.body_encoding) {
            (GatewayHttpMethod::Get, _) => builder.query(request.params()),
            (GatewayHttpMethod::Post, BodyEncoding::Form) => builder.form(request.params()),
            (GatewayHttpMethod::Post, BodyEncoding::Json) => builder.json(&request.json_body()),
        };

        let mut attempt = DeliveryAttemptResult {
            configuration_name: request.configuration_name.clone(),
            method: request.method.as_str().to_string(),
            endpoint: request.endpoint.clone(),
            http_status: None,
            raw_body: String::new(),
            classified_success: false,
            matched_rule: None,
            error_message: None,
            auth_rejected: false,
            elapsed_ms: 0,
        };

        match builder.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                attempt.http_status = Some(status);
                let raw = match response.text().await {
                    Ok(raw) => raw,
                    Err(error) => {
                        attempt.error_message =
                            Some(format!("failed to read gateway response body: {error}"));
                        String::new()
                    }
                };
                let body = parse_gateway_body(&raw);
                let verdict = explain_gateway_response(status, &body);
                attempt.auth_rejected = is_auth_rejection_response(status, &body);
                attempt.classified_success = verdict.success;
                attempt.matched_rule = Some(verdict.rule);
                attempt.raw_body = truncate_body(&raw);
            }
            Err(error) => {
                attempt.error_message = Some(describe_transport_error(
                    &error,
                    self.config.attempt_timeout_ms,
                ));
            }
        }
        attempt.elapsed_ms = elapsed_ms(started);
        attempt
    }

    fn finish_failed(
        &self,
        envelope: &MessageEnvelope,
        attempts: Vec<DeliveryAttemptResult>,
        stop_reason: Option<StopReason>,
    ) -> DeliveryOutcome {
        let fallback_url = self.config.fallback_enabled.then(|| {
            build_fallback_link(
                &self.config.fallback_link_base,
                envelope.recipient(),
                envelope.body(),
            )
        });
        let mut outcome = DeliveryOutcome {
            success: false,
            used_configuration: None,
            attempts,
            fallback_url,
            failure_reason: None,
            cancelled: stop_reason.is_some(),
        };
        let reason = match stop_reason {
            Some(reason) => format!(
                "{} after {} of {} gateway configurations",
                reason.as_str(),
                outcome.attempt_count(),
                self.catalog.len()
            ),
            None => {
                let auth_rejections = outcome.auth_rejection_count();
                if auth_rejections > 0 {
                    format!(
                        "all {} gateway configurations failed; {} rejected the credential, verify the api secret and account status",
                        outcome.attempt_count(),
                        auth_rejections
                    )
                } else {
                    format!(
                        "all {} gateway configurations failed",
                        outcome.attempt_count()
                    )
                }
            }
        };
        warn!(
            recipient = %envelope.recipient(),
            attempts = outcome.attempt_count(),
            cancelled = outcome.cancelled,
            reason = %reason,
            "message delivery failed"
        );

        let record = FailedDeliveryRecord::new(
            &envelope.recipient().with_plus(),
            envelope.body(),
            &reason,
            outcome.fallback_url.as_deref(),
        );
        if let Err(error) = self.failure_sink.record_failure(&record) {
            warn!(error = %error, "failed to record failed delivery");
        }
        outcome.failure_reason = Some(reason);
        outcome
    }
}

async fn wait_for_cancel(cancel_rx: &mut watch::Receiver<bool>) {
    loop {
        if *cancel_rx.borrow_and_update() {
            return;
        }
        if cancel_rx.changed().await.is_err() {
            // Sender dropped without cancelling: nothing can cancel anymore.
            std::future::pending::<()>().await;
        }
    }
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

fn describe_transport_error(error: &reqwest::Error, timeout_ms: u64) -> String {
    if error.is_timeout() {
        return format!("gateway request timed out after {timeout_ms}ms");
    }
    if error.is_connect() {
        return format!("gateway connection failed: {error}");
    }
    format!("gateway transport error: {error}")
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn truncate_body(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= RAW_BODY_TRACE_LIMIT {
        return trimmed.to_string();
    }
    let mut output = trimmed
        .chars()
        .take(RAW_BODY_TRACE_LIMIT)
        .collect::<String>();
    output.push_str("...");
    output
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use serde_json::json;
    use tokio::sync::watch;

    use super::{truncate_body, DeliveryEngine, MessageEnvelope};
    use crate::config::NotifyConfig;
    use crate::error::NotifyError;
    use crate::failure_log::{FailedDeliveryRecord, FailedDeliverySink};
    use crate::gateway_catalog::{
        default_gateway_catalog, BodyEncoding, GatewayConfiguration, GatewayHttpMethod,
        ParameterStrategy, ParameterTemplate,
    };
    use crate::phone_normalizer::RecipientFormat;
    use crate::response_classifier::ClassificationRule;

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<FailedDeliveryRecord>>,
    }

    impl RecordingSink {
        fn records(&self) -> Vec<FailedDeliveryRecord> {
            self.records.lock().expect("sink lock").clone()
        }
    }

    impl FailedDeliverySink for RecordingSink {
        fn record_failure(&self, record: &FailedDeliveryRecord) -> anyhow::Result<()> {
            self.records.lock().expect("sink lock").push(record.clone());
            Ok(())
        }
    }

    fn template_entry(name: &str, path: &str) -> GatewayConfiguration {
        GatewayConfiguration::new(
            name,
            path,
            GatewayHttpMethod::Post,
            BodyEncoding::Form,
            ParameterStrategy::Template(ParameterTemplate {
                credential_param: "apikey".to_string(),
                recipient_param: "to".to_string(),
                message_param: "text".to_string(),
                attachment_param: None,
                static_params: Vec::new(),
            }),
        )
    }

    fn test_config(base_url: String) -> NotifyConfig {
        NotifyConfig {
            gateway_base_url: base_url,
            api_credential: Some("test-secret".to_string()),
            attempt_timeout_ms: 2_000,
            ..NotifyConfig::default()
        }
    }

    fn sample_envelope() -> MessageEnvelope {
        MessageEnvelope::new("9876543210", "Your order is confirmed", None).expect("envelope")
    }

    #[test]
    fn unit_envelope_rejects_blank_recipient_and_body() {
        assert!(matches!(
            MessageEnvelope::new("  ", "hi", None),
            Err(NotifyError::InvalidEnvelope(_))
        ));
        assert!(matches!(
            MessageEnvelope::new("9876543210", " \n ", None),
            Err(NotifyError::InvalidEnvelope(_))
        ));
        let envelope =
            MessageEnvelope::new("9876543210", "hi", Some("  ".to_string())).expect("envelope");
        assert_eq!(envelope.attachment_url(), None);
        assert_eq!(envelope.recipient().with_country_code(), "919876543210");
    }

    #[test]
    fn unit_truncate_body_caps_long_payloads() {
        let long = "x".repeat(2_000);
        let truncated = truncate_body(&long);
        assert_eq!(truncated.chars().count(), 1_027);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncate_body("  short  "), "short");
    }

    #[test]
    fn unit_worst_case_latency_is_sum_of_timeouts_capped_by_deadline() {
        let engine = DeliveryEngine::new(
            NotifyConfig {
                attempt_timeout_ms: 15_000,
                ..NotifyConfig::default()
            },
            default_gateway_catalog(),
        )
        .expect("engine");
        assert_eq!(engine.worst_case_latency(), Duration::from_secs(105));

        let capped = DeliveryEngine::new(
            NotifyConfig {
                attempt_timeout_ms: 15_000,
                overall_deadline_ms: Some(20_000),
                ..NotifyConfig::default()
            },
            default_gateway_catalog(),
        )
        .expect("engine");
        assert_eq!(capped.worst_case_latency(), Duration::from_secs(20));
    }

    #[test]
    fn regression_engine_rejects_empty_catalog() {
        let error = DeliveryEngine::new(NotifyConfig::default(), Vec::new())
            .expect_err("empty catalog should fail");
        assert!(matches!(error, NotifyError::InvalidCatalog(_)));
    }

    #[tokio::test]
    async fn regression_auth_rejection_survives_trace_body_truncation() {
        let server = MockServer::start();
        let rejected = server.mock(|when, then| {
            when.method(POST).path("/only");
            then.status(200)
                .json_body(json!({"detail": "x".repeat(4_096), "status": 401}));
        });

        let engine = DeliveryEngine::new(
            test_config(server.base_url()),
            vec![template_entry("only", "/only")],
        )
        .expect("engine");
        let outcome = engine.send(&sample_envelope()).await.expect("send");

        rejected.assert_calls(1);
        assert!(!outcome.success);
        assert!(outcome.attempts[0].raw_body.ends_with("..."));
        assert_eq!(outcome.auth_rejection_count(), 1);
        assert!(outcome
            .failure_reason
            .as_deref()
            .is_some_and(|reason| reason.contains("1 rejected the credential")));
    }

    #[tokio::test]
    async fn integration_send_stops_at_first_successful_configuration() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(POST).path("/first");
            then.status(200).json_body(json!({"status": 401, "message": "Invalid API key"}));
        });
        let second = server.mock(|when, then| {
            when.method(POST)
                .path("/second")
                .header("content-type", "application/x-www-form-urlencoded")
                .body_includes("apikey=test-secret")
                .body_includes("to=919876543210");
            then.status(200).json_body(json!({"message_id": "wamid-1"}));
        });
        let third = server.mock(|when, then| {
            when.method(POST).path("/third");
            then.status(200).json_body(json!({"success": true}));
        });

        let sink = Arc::new(RecordingSink::default());
        let engine = DeliveryEngine::new(
            test_config(server.base_url()),
            vec![
                template_entry("first", "/first"),
                template_entry("second", "/second"),
                template_entry("third", "/third"),
            ],
        )
        .expect("engine")
        .with_failure_sink(sink.clone());
        let outcome = engine.send(&sample_envelope()).await.expect("send");

        first.assert_calls(1);
        second.assert_calls(1);
        third.assert_calls(0);
        assert!(sink.records().is_empty());
        assert!(outcome.success);
        assert_eq!(outcome.used_configuration.as_deref(), Some("second"));
        assert_eq!(outcome.attempt_count(), 2);
        assert_eq!(
            outcome.attempts[0].matched_rule,
            Some(ClassificationRule::ExplicitErrorStatus)
        );
        assert_eq!(
            outcome.attempts[1].matched_rule,
            Some(ClassificationRule::MessageIdentifier)
        );
        assert_eq!(outcome.fallback_url, None);
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn integration_exhausted_catalog_returns_trace_fallback_and_failure_record() {
        let server = MockServer::start();
        let rejected = server.mock(|when, then| {
            when.method(POST);
            then.status(200)
                .json_body(json!({"status": 401, "message": "Unauthorized"}));
        });
        let sink = Arc::new(RecordingSink::default());
        let engine = DeliveryEngine::new(test_config(server.base_url()), default_gateway_catalog())
            .expect("engine")
            .with_failure_sink(sink.clone());

        let outcome = engine.send(&sample_envelope()).await.expect("send");

        rejected.assert_calls(7);
        assert!(!outcome.success);
        assert_eq!(outcome.attempt_count(), 7);
        assert_eq!(outcome.auth_rejection_count(), 7);
        assert_eq!(
            outcome.fallback_url.as_deref(),
            Some("https://wa.me/919876543210?text=Your%20order%20is%20confirmed")
        );
        let reason = outcome.failure_reason.as_deref().expect("reason");
        assert!(reason.contains("rejected the credential"));

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].recipient, "+919876543210");
        assert_eq!(records[0].message_text, "Your order is confirmed");
        assert_eq!(records[0].fallback_url, outcome.fallback_url);
    }

    #[tokio::test]
    async fn regression_missing_credential_fails_before_any_network_call() {
        let server = MockServer::start();
        let any = server.mock(|when, then| {
            when.method(POST);
            then.status(200).json_body(json!({"success": true}));
        });
        let engine = DeliveryEngine::new(
            NotifyConfig {
                api_credential: Some("   ".to_string()),
                ..test_config(server.base_url())
            },
            default_gateway_catalog(),
        )
        .expect("engine");

        let error = engine
            .send(&sample_envelope())
            .await
            .expect_err("missing credential should fail");
        assert!(matches!(error, NotifyError::MissingCredential));
        any.assert_calls(0);
    }

    #[tokio::test]
    async fn integration_timeouts_are_recorded_and_loop_continues() {
        let server = MockServer::start();
        let slow = server.mock(|when, then| {
            when.method(POST).path("/slow");
            then.status(200)
                .delay(Duration::from_millis(800))
                .json_body(json!({"success": true}));
        });
        let fast = server.mock(|when, then| {
            when.method(POST).path("/fast");
            then.status(200).json_body(json!({"status": "sent"}));
        });
        let engine = DeliveryEngine::new(
            NotifyConfig {
                attempt_timeout_ms: 150,
                ..test_config(server.base_url())
            },
            vec![template_entry("slow", "/slow"), template_entry("fast", "/fast")],
        )
        .expect("engine");

        let outcome = engine.send(&sample_envelope()).await.expect("send");

        assert!(slow.calls() <= 1);
        fast.assert_calls(1);
        assert!(outcome.success);
        assert_eq!(outcome.used_configuration.as_deref(), Some("fast"));
        let timed_out = &outcome.attempts[0];
        assert!(!timed_out.classified_success);
        assert_eq!(timed_out.http_status, None);
        assert!(timed_out
            .error_message
            .as_deref()
            .is_some_and(|message| message.contains("timed out")));
    }

    #[tokio::test]
    async fn integration_connection_failures_never_abort_the_loop() {
        let sink = Arc::new(RecordingSink::default());
        let engine = DeliveryEngine::new(
            test_config("http://127.0.0.1:1".to_string()),
            vec![template_entry("a", "/a"), template_entry("b", "/b")],
        )
        .expect("engine")
        .with_failure_sink(sink.clone());

        let outcome = engine.send(&sample_envelope()).await.expect("send");

        assert!(!outcome.success);
        assert_eq!(outcome.attempt_count(), 2);
        assert!(outcome
            .attempts
            .iter()
            .all(|attempt| attempt.error_message.is_some() && attempt.http_status.is_none()));
        assert!(outcome.fallback_url.is_some());
        assert_eq!(sink.records().len(), 1);
    }

    #[tokio::test]
    async fn functional_json_and_get_configurations_encode_parameters() {
        let server = MockServer::start();
        let json_entry = server.mock(|when, then| {
            when.method(POST)
                .path("/v2/send")
                .header("content-type", "application/json")
                .json_body_includes(
                    json!({"secret": "test-secret", "type": "whatsapp", "number": "919876543210"})
                        .to_string(),
                );
            then.status(400).json_body(json!({"error": "bad request"}));
        });
        let get_entry = server.mock(|when, then| {
            when.method(GET)
                .path("/query")
                .query_param("apikey", "test-secret")
                .query_param("to", "+919876543210")
                .query_param("text", "Your order is confirmed");
            then.status(200).json_body(json!({"status": "200"}));
        });
        let json_configuration = GatewayConfiguration::new(
            "v2",
            "/v2/send",
            GatewayHttpMethod::Post,
            BodyEncoding::Json,
            ParameterStrategy::TypedSend {
                credential_param: "secret".to_string(),
            },
        );
        let get_configuration = GatewayConfiguration {
            method: GatewayHttpMethod::Get,
            ..template_entry("query", "/query")
        }
        .with_recipient_format(RecipientFormat::WithPlus);

        let engine = DeliveryEngine::new(
            test_config(server.base_url()),
            vec![json_configuration, get_configuration],
        )
        .expect("engine");
        let outcome = engine.send(&sample_envelope()).await.expect("send");

        json_entry.assert_calls(1);
        get_entry.assert_calls(1);
        assert!(outcome.success);
        assert_eq!(outcome.attempts[0].http_status, Some(400));
        assert_eq!(
            outcome.attempts[0].matched_rule,
            Some(ClassificationRule::NonOkStatus)
        );
        assert_eq!(outcome.used_configuration.as_deref(), Some("query"));
    }

    #[tokio::test]
    async fn functional_cancelled_before_start_records_no_attempts() {
        let server = MockServer::start();
        let any = server.mock(|when, then| {
            when.method(POST);
            then.status(200).json_body(json!({"success": true}));
        });
        let sink = Arc::new(RecordingSink::default());
        let engine = DeliveryEngine::new(test_config(server.base_url()), default_gateway_catalog())
            .expect("engine")
            .with_failure_sink(sink.clone());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        cancel_tx.send(true).expect("cancel");

        let outcome = engine
            .send_with_cancel(&sample_envelope(), cancel_rx)
            .await
            .expect("send");

        any.assert_calls(0);
        assert!(!outcome.success);
        assert!(outcome.cancelled);
        assert_eq!(outcome.attempt_count(), 0);
        assert!(outcome.fallback_url.is_some());
        assert!(outcome
            .failure_reason
            .as_deref()
            .is_some_and(|reason| reason.starts_with("delivery cancelled after 0 of 7")));
        assert_eq!(sink.records().len(), 1);
    }

    #[tokio::test]
    async fn functional_cancel_during_attempt_stops_remaining_catalog() {
        let server = MockServer::start();
        let slow = server.mock(|when, then| {
            when.method(POST).path("/slow");
            then.status(200)
                .delay(Duration::from_millis(1_500))
                .json_body(json!({"success": true}));
        });
        let never = server.mock(|when, then| {
            when.method(POST).path("/never");
            then.status(200).json_body(json!({"success": true}));
        });
        let engine = DeliveryEngine::new(
            test_config(server.base_url()),
            vec![template_entry("slow", "/slow"), template_entry("never", "/never")],
        )
        .expect("engine");
        let (cancel_tx, cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = cancel_tx.send(true);
        });

        let outcome = engine
            .send_with_cancel(&sample_envelope(), cancel_rx)
            .await
            .expect("send");

        never.assert_calls(0);
        assert!(slow.calls() <= 1);
        assert!(outcome.cancelled);
        assert_eq!(outcome.attempt_count(), 1);
        assert_eq!(
            outcome.attempts[0].error_message.as_deref(),
            Some("delivery cancelled")
        );
    }

    #[tokio::test]
    async fn functional_overall_deadline_interrupts_slow_gateway() {
        let server = MockServer::start();
        let _slow = server.mock(|when, then| {
            when.method(POST).path("/slow");
            then.status(200)
                .delay(Duration::from_millis(1_500))
                .json_body(json!({"success": true}));
        });
        let never = server.mock(|when, then| {
            when.method(POST).path("/never");
            then.status(200).json_body(json!({"success": true}));
        });
        let engine = DeliveryEngine::new(
            NotifyConfig {
                overall_deadline_ms: Some(150),
                ..test_config(server.base_url())
            },
            vec![template_entry("slow", "/slow"), template_entry("never", "/never")],
        )
        .expect("engine");

        let outcome = engine.send(&sample_envelope()).await.expect("send");

        never.assert_calls(0);
        assert!(outcome.cancelled);
        assert_eq!(outcome.attempt_count(), 1);
        assert_eq!(
            outcome.attempts[0].error_message.as_deref(),
            Some("overall delivery deadline exceeded")
        );
    }

    #[tokio::test]
    async fn regression_disabled_fallback_still_records_failure() {
        let server = MockServer::start();
        let _rejected = server.mock(|when, then| {
            when.method(POST);
            then.status(500).body("upstream error");
        });
        let sink = Arc::new(RecordingSink::default());
        let engine = DeliveryEngine::new(
            NotifyConfig {
                fallback_enabled: false,
                ..test_config(server.base_url())
            },
            vec![template_entry("only", "/only")],
        )
        .expect("engine")
        .with_failure_sink(sink.clone());

        let outcome = engine.send(&sample_envelope()).await.expect("send");

        assert!(!outcome.success);
        assert_eq!(outcome.fallback_url, None);
        assert_eq!(outcome.attempts[0].raw_body, "upstream error");
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fallback_url, None);
        assert_eq!(
            records[0].error_reason,
            "all 1 gateway configurations failed"
        );
    }
}

//! Success classification for gateway responses with no reliable contract.
//!
//! The gateway response is treated as a generic JSON document and evaluated
//! against an ordered rule list where the first matching rule decides. Explicit
//! success flags are trusted before inferred keyword matches, and explicit
//! error statuses are checked before the default-deny fallback.

use serde::Serialize;
use serde_json::Value;

const SUCCESS_STATUS_STRINGS: &[&str] = &["success", "sent"];
const MESSAGE_ID_FIELDS: &[&str] = &["message_id", "messageId", "id"];
const SUCCESS_KEYWORDS: &[&str] = &["sent", "queued", "delivered", "accepted", "success"];
const ERROR_STATUS_CODES: &[u16] = &[400, 401, 403];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
/// Identifies which classification rule decided a response, in evaluation order.
pub enum ClassificationRule {
    NonOkStatus,
    EmptyBody,
    ExplicitSuccessFlag,
    MessageIdentifier,
    StatusOk,
    SuccessKeyword,
    ExplicitErrorStatus,
    DefaultDeny,
}

impl ClassificationRule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NonOkStatus => "non_ok_status",
            Self::EmptyBody => "empty_body",
            Self::ExplicitSuccessFlag => "explicit_success_flag",
            Self::MessageIdentifier => "message_identifier",
            Self::StatusOk => "status_ok",
            Self::SuccessKeyword => "success_keyword",
            Self::ExplicitErrorStatus => "explicit_error_status",
            Self::DefaultDeny => "default_deny",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResponseClassification {
    pub success: bool,
    pub rule: ClassificationRule,
}

impl ResponseClassification {
    fn accept(rule: ClassificationRule) -> Self {
        Self {
            success: true,
            rule,
        }
    }

    fn reject(rule: ClassificationRule) -> Self {
        Self {
            success: false,
            rule,
        }
    }
}

pub fn classify_gateway_response(http_status: u16, body: &Value) -> bool {
    explain_gateway_response(http_status, body).success
}

/// Evaluates the ordered rules and reports the deciding rule alongside the verdict.
pub fn explain_gateway_response(http_status: u16, body: &Value) -> ResponseClassification {
    if http_status != 200 {
        return ResponseClassification::reject(ClassificationRule::NonOkStatus);
    }
    if is_empty_document(body) {
        return ResponseClassification::reject(ClassificationRule::EmptyBody);
    }
    let status = body.get("status");

    let explicit_success = body.get("success").and_then(Value::as_bool) == Some(true)
        || status
            .and_then(Value::as_str)
            .is_some_and(|value| SUCCESS_STATUS_STRINGS.contains(&value));
    if explicit_success {
        return ResponseClassification::accept(ClassificationRule::ExplicitSuccessFlag);
    }

    let has_message_id = MESSAGE_ID_FIELDS
        .iter()
        .filter_map(|field| body.get(*field))
        .any(is_truthy);
    if has_message_id {
        return ResponseClassification::accept(ClassificationRule::MessageIdentifier);
    }

    if status.is_some_and(|value| status_code_equals(value, 200)) {
        return ResponseClassification::accept(ClassificationRule::StatusOk);
    }

    if body
        .get("message")
        .and_then(Value::as_str)
        .is_some_and(contains_success_keyword)
    {
        return ResponseClassification::accept(ClassificationRule::SuccessKeyword);
    }

    if status.is_some_and(|value| {
        ERROR_STATUS_CODES
            .iter()
            .any(|code| status_code_equals(value, *code))
    }) {
        return ResponseClassification::reject(ClassificationRule::ExplicitErrorStatus);
    }

    ResponseClassification::reject(ClassificationRule::DefaultDeny)
}

/// Parses a raw response body into the document the classifier evaluates.
///
/// Non-JSON bodies are kept as a JSON string so that a non-empty text reply is
/// still distinguishable from an empty one.
pub fn parse_gateway_body(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str::<Value>(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

fn is_empty_document(body: &Value) -> bool {
    match body {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|value| value != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Exact match against the numeric code or its canonical decimal string.
fn status_code_equals(value: &Value, code: u16) -> bool {
    match value {
        Value::Number(number) => number.as_f64() == Some(f64::from(code)),
        Value::String(text) => *text == code.to_string(),
        _ => false,
    }
}

fn contains_success_keyword(message: &str) -> bool {
    let lowered = message.to_lowercase();
    SUCCESS_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

//! Ordered catalog of candidate gateway request shapes.
//!
//! The gateway's real contract is unknown, so each entry is one best-effort
//! guess at endpoint path, HTTP method, body encoding, credential parameter
//! name and recipient format. Catalog order is part of the contract: the
//! delivery loop stops at the first entry whose response classifies as
//! success, so earlier entries are preferred.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::delivery_engine::MessageEnvelope;
use crate::error::NotifyError;
use crate::phone_normalizer::RecipientFormat;

const DEFAULT_SENDER_LABEL: &str = "WhatsApp";
const MESSAGE_CHANNEL_TYPE: &str = "whatsapp";
const REDACTED_VALUE: &str = "***";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GatewayHttpMethod {
    Get,
    Post,
}

impl GatewayHttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyEncoding {
    Form,
    Json,
}

impl BodyEncoding {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Form => "form",
            Self::Json => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Free-form parameter layout for gateways outside the built-in strategies.
pub struct ParameterTemplate {
    pub credential_param: String,
    pub recipient_param: String,
    pub message_param: String,
    pub attachment_param: Option<String>,
    pub static_params: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Tagged parameter-building strategies, one per guessed gateway dialect.
pub enum ParameterStrategy {
    /// `numbers` / `message` / `sender`, as used by `send.php`.
    StandardSend { credential_param: String },
    /// `mobile` / `msg` / `device_id`, as used by `sendWhatsApp.php`.
    WhatsAppSend { credential_param: String },
    /// `type=whatsapp` / `number` / `message`.
    TypedSend { credential_param: String },
    Template(ParameterTemplate),
}

impl ParameterStrategy {
    pub fn credential_param(&self) -> &str {
        match self {
            Self::StandardSend { credential_param }
            | Self::WhatsAppSend { credential_param }
            | Self::TypedSend { credential_param } => credential_param,
            Self::Template(template) => &template.credential_param,
        }
    }

    /// Builds the ordered key/value list for one request.
    pub fn build_parameters(
        &self,
        recipient: &str,
        envelope: &MessageEnvelope,
        credential: &str,
        sender: Option<&str>,
    ) -> Vec<(String, String)> {
        let mut params = vec![(self.credential_param().to_string(), credential.to_string())];
        match self {
            Self::StandardSend { .. } => {
                params.push(("numbers".to_string(), recipient.to_string()));
                params.push(("message".to_string(), envelope.body().to_string()));
                params.push((
                    "sender".to_string(),
                    sender.unwrap_or(DEFAULT_SENDER_LABEL).to_string(),
                ));
            }
            Self::WhatsAppSend { .. } => {
                params.push(("mobile".to_string(), recipient.to_string()));
                params.push(("msg".to_string(), envelope.body().to_string()));
                if let Some(sender) = sender {
                    params.push(("device_id".to_string(), sender.to_string()));
                }
            }
            Self::TypedSend { .. } => {
                params.push(("type".to_string(), MESSAGE_CHANNEL_TYPE.to_string()));
                params.push(("number".to_string(), recipient.to_string()));
                params.push(("message".to_string(), envelope.body().to_string()));
            }
            Self::Template(template) => {
                params.push((template.recipient_param.clone(), recipient.to_string()));
                params.push((template.message_param.clone(), envelope.body().to_string()));
                if let (Some(param), Some(url)) =
                    (template.attachment_param.as_ref(), envelope.attachment_url())
                {
                    params.push((param.clone(), url.to_string()));
                }
                params.extend(template.static_params.iter().cloned());
            }
        }
        params
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfiguration {
    pub name: String,
    pub path: String,
    pub method: GatewayHttpMethod,
    pub body_encoding: BodyEncoding,
    pub recipient_format: RecipientFormat,
    pub strategy: ParameterStrategy,
}

impl GatewayConfiguration {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<String>,
        method: GatewayHttpMethod,
        body_encoding: BodyEncoding,
        strategy: ParameterStrategy,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            method,
            body_encoding,
            recipient_format: RecipientFormat::WithCountryCode,
            strategy,
        }
    }

    pub fn with_recipient_format(mut self, recipient_format: RecipientFormat) -> Self {
        self.recipient_format = recipient_format;
        self
    }

    pub fn endpoint(&self, base_url: &str) -> String {
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            self.path.trim_start_matches('/')
        )
    }

    pub fn build_request(
        &self,
        base_url: &str,
        envelope: &MessageEnvelope,
        credential: &str,
        sender: Option<&str>,
    ) -> GatewayRequest {
        let recipient = envelope.recipient().render(self.recipient_format);
        GatewayRequest {
            configuration_name: self.name.clone(),
            method: self.method,
            body_encoding: self.body_encoding,
            endpoint: self.endpoint(base_url),
            credential_param: self.strategy.credential_param().to_string(),
            params: self
                .strategy
                .build_parameters(&recipient, envelope, credential, sender),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A fully-built request for one catalog entry.
pub struct GatewayRequest {
    pub configuration_name: String,
    pub method: GatewayHttpMethod,
    pub body_encoding: BodyEncoding,
    pub endpoint: String,
    credential_param: String,
    params: Vec<(String, String)>,
}

impl GatewayRequest {
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    pub fn json_body(&self) -> Value {
        let map = self
            .params
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect::<Map<String, Value>>();
        Value::Object(map)
    }

    /// Parameter list with the credential value masked, for diagnostics.
    pub fn redacted_params(&self) -> Vec<(String, String)> {
        self.params
            .iter()
            .map(|(key, value)| {
                if *key == self.credential_param {
                    (key.clone(), REDACTED_VALUE.to_string())
                } else {
                    (key.clone(), value.clone())
                }
            })
            .collect()
    }
}

/// Built-in catalog, ordered from the most to the least likely request shape.
pub fn default_gateway_catalog() -> Vec<GatewayConfiguration> {
    vec![
        GatewayConfiguration::new(
            "standard_send_apikey",
            "/send.php",
            GatewayHttpMethod::Post,
            BodyEncoding::Form,
            ParameterStrategy::StandardSend {
                credential_param: "apikey".to_string(),
            },
        ),
        GatewayConfiguration::new(
            "standard_send_api_key",
            "/send.php",
            GatewayHttpMethod::Post,
            BodyEncoding::Form,
            ParameterStrategy::StandardSend {
                credential_param: "api_key".to_string(),
            },
        ),
        GatewayConfiguration::new(
            "whatsapp_send_apikey",
            "/sendWhatsApp.php",
            GatewayHttpMethod::Post,
            BodyEncoding::Form,
            ParameterStrategy::WhatsAppSend {
                credential_param: "apikey".to_string(),
            },
        ),
        GatewayConfiguration::new(
            "whatsapp_send_api_key",
            "/sendWhatsApp.php",
            GatewayHttpMethod::Post,
            BodyEncoding::Form,
            ParameterStrategy::WhatsAppSend {
                credential_param: "api_key".to_string(),
            },
        ),
        GatewayConfiguration::new(
            "api_v2_secret",
            "/v2/send",
            GatewayHttpMethod::Post,
            BodyEncoding::Json,
            ParameterStrategy::TypedSend {
                credential_param: "secret".to_string(),
            },
        ),
        GatewayConfiguration::new(
            "api_v2_apikey",
            "/v2/send",
            GatewayHttpMethod::Post,
            BodyEncoding::Json,
            ParameterStrategy::TypedSend {
                credential_param: "apikey".to_string(),
            },
        ),
        GatewayConfiguration::new(
            "alternative_send",
            "/send",
            GatewayHttpMethod::Post,
            BodyEncoding::Form,
            ParameterStrategy::TypedSend {
                credential_param: "apikey".to_string(),
            },
        ),
    ]
}

pub fn validate_catalog(catalog: &[GatewayConfiguration]) -> Result<(), NotifyError> {
    if catalog.is_empty() {
        return Err(NotifyError::InvalidCatalog(
            "catalog must contain at least one configuration".to_string(),
        ));
    }
    let mut seen = BTreeSet::new();
    for configuration in catalog {
        let name = configuration.name.trim();
        if name.is_empty() {
            return Err(NotifyError::InvalidCatalog(
                "configuration name must not be empty".to_string(),
            ));
        }
        if !seen.insert(name) {
            return Err(NotifyError::InvalidCatalog(format!(
                "duplicate configuration name '{name}'"
            )));
        }
    }
    Ok(())
}

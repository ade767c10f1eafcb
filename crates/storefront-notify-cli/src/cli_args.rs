use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use storefront_notify::{
    CartLineItem, NotificationRequest, NotifyConfig, DEFAULT_ATTEMPT_TIMEOUT_MS,
    DEFAULT_FALLBACK_LINK_BASE, DEFAULT_GATEWAY_BASE_URL, DEFAULT_PROBE_TIMEOUT_MS,
};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

/// Parses `product_id:quantity`; a missing quantity means 1.
fn parse_cart_item(value: &str) -> Result<CartLineItem, String> {
    let (product_id, quantity) = match value.rsplit_once(':') {
        Some((product_id, quantity)) => {
            let quantity = quantity
                .trim()
                .parse::<u32>()
                .map_err(|error| format!("invalid quantity in '{value}': {error}"))?;
            (product_id, quantity)
        }
        None => (value, 1),
    };
    let product_id = product_id.trim();
    if product_id.is_empty() {
        return Err(format!("cart item '{value}' is missing a product id"));
    }
    if quantity == 0 {
        return Err(format!("cart item '{value}' must have a quantity above 0"));
    }
    Ok(CartLineItem {
        product_id: product_id.to_string(),
        quantity,
    })
}

#[derive(Debug, Parser)]
#[command(
    name = "storefront-notify",
    about = "Deliver storefront notifications through the messaging gateway",
    version
)]
pub struct Cli {
    #[arg(
        long = "gateway-base-url",
        env = "SMSQUICKER_API_BASE",
        default_value = DEFAULT_GATEWAY_BASE_URL,
        help = "Base URL the gateway catalog paths are joined to"
    )]
    pub gateway_base_url: String,

    #[arg(
        long = "api-secret",
        env = "SMSQUICKER_API_SECRET",
        hide_env_values = true,
        help = "Gateway API credential"
    )]
    pub api_secret: Option<String>,

    #[arg(
        long = "admin-number",
        env = "ADMIN_WHATSAPP_NUMBER",
        help = "Admin phone number that receives inquiry alerts"
    )]
    pub admin_number: Option<String>,

    #[arg(
        long = "fallback-enabled",
        env = "WHATSAPP_FALLBACK_ENABLED",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Generate a click-to-chat link when every gateway configuration fails"
    )]
    pub fallback_enabled: bool,

    #[arg(
        long = "fallback-link-base",
        env = "STOREFRONT_NOTIFY_FALLBACK_LINK_BASE",
        default_value = DEFAULT_FALLBACK_LINK_BASE,
        help = "Base URL for click-to-chat fallback links"
    )]
    pub fallback_link_base: String,

    #[arg(
        long = "attempt-timeout-ms",
        env = "STOREFRONT_NOTIFY_ATTEMPT_TIMEOUT_MS",
        default_value_t = DEFAULT_ATTEMPT_TIMEOUT_MS,
        value_parser = parse_positive_u64,
        help = "Timeout for a single gateway attempt"
    )]
    pub attempt_timeout_ms: u64,

    #[arg(
        long = "overall-deadline-ms",
        env = "STOREFRONT_NOTIFY_OVERALL_DEADLINE_MS",
        value_parser = parse_positive_u64,
        help = "Optional upper bound for one complete delivery across the catalog"
    )]
    pub overall_deadline_ms: Option<u64>,

    #[arg(
        long = "probe-timeout-ms",
        env = "STOREFRONT_NOTIFY_PROBE_TIMEOUT_MS",
        default_value_t = DEFAULT_PROBE_TIMEOUT_MS,
        value_parser = parse_positive_u64,
        help = "Timeout for each credential probe request"
    )]
    pub probe_timeout_ms: u64,

    #[arg(
        long = "failure-log",
        env = "STOREFRONT_NOTIFY_FAILURE_LOG",
        help = "Append failed deliveries as JSON lines to this file instead of only logging them"
    )]
    pub failure_log: Option<PathBuf>,

    #[arg(
        long = "products-file",
        env = "STOREFRONT_NOTIFY_PRODUCTS_FILE",
        help = "JSON array of products used to compose inquiry and cart messages"
    )]
    pub products_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum CliCommand {
    /// Send a raw text message.
    SendMessage {
        #[arg(long)]
        to: String,
        #[arg(long)]
        message: String,
        #[arg(long = "attachment-url")]
        attachment_url: Option<String>,
    },
    /// Send a product inquiry confirmation and alert the admin.
    ProductInquiry {
        #[arg(long)]
        to: String,
        #[arg(long = "product-id")]
        product_id: String,
        #[arg(long = "client-name")]
        client_name: Option<String>,
        #[arg(long = "user-id")]
        user_id: Option<String>,
    },
    /// Send a cart summary built from `product_id:quantity` items.
    CartSummary {
        #[arg(long)]
        to: String,
        #[arg(long = "item", value_parser = parse_cart_item, required = true)]
        items: Vec<CartLineItem>,
    },
    /// Send a message to the configured admin number.
    AdminAlert {
        #[arg(long)]
        message: String,
    },
    /// Find which credential parameter name the gateway accepts.
    ProbeCredentials,
    /// Print the gateway configuration catalog in probe order.
    ShowCatalog,
}

impl CliCommand {
    /// Maps notification subcommands to service requests.
    pub fn notification_request(&self) -> Option<NotificationRequest> {
        match self {
            Self::SendMessage {
                to,
                message,
                attachment_url,
            } => Some(NotificationRequest::RawMessage {
                recipient: to.clone(),
                message: message.clone(),
                attachment_url: attachment_url.clone(),
            }),
            Self::ProductInquiry {
                to,
                product_id,
                client_name,
                user_id,
            } => Some(NotificationRequest::ProductInquiry {
                client_phone: to.clone(),
                product_id: product_id.clone(),
                client_name: client_name.clone(),
                user_id: user_id.clone(),
            }),
            Self::CartSummary { to, items } => Some(NotificationRequest::CartSummary {
                client_phone: to.clone(),
                items: items.clone(),
            }),
            Self::AdminAlert { message } => Some(NotificationRequest::AdminAlert {
                message: message.clone(),
            }),
            Self::ProbeCredentials | Self::ShowCatalog => None,
        }
    }
}

impl Cli {
    pub fn notify_config(&self) -> NotifyConfig {
        NotifyConfig {
            gateway_base_url: self.gateway_base_url.clone(),
            api_credential: self.api_secret.clone(),
            admin_recipient: self.admin_number.clone(),
            fallback_enabled: self.fallback_enabled,
            fallback_link_base: self.fallback_link_base.clone(),
            attempt_timeout_ms: self.attempt_timeout_ms,
            overall_deadline_ms: self.overall_deadline_ms,
            probe_timeout_ms: self.probe_timeout_ms,
            failure_log_path: self.failure_log.clone(),
        }
    }
}

//! Business-facing notification operations.
//!
//! A request is composed into a message, delivered to the client through the
//! [`DeliveryEngine`], and (when an admin number is configured and the client
//! send succeeded) mirrored as a short alert to the admin. Admin delivery
//! problems are logged and never fail the client-facing operation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::delivery_engine::{DeliveryEngine, DeliveryOutcome, MessageEnvelope};
use crate::error::NotifyError;
use crate::notification_composer::{
    compose_cart_admin_alert, compose_cart_summary, compose_product_inquiry,
    compose_product_inquiry_admin_alert, CartLineItem, ProductLookup,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationRequest {
    ProductInquiry {
        client_phone: String,
        product_id: String,
        #[serde(default)]
        client_name: Option<String>,
        #[serde(default)]
        user_id: Option<String>,
    },
    CartSummary {
        client_phone: String,
        items: Vec<CartLineItem>,
    },
    AdminAlert {
        message: String,
    },
    RawMessage {
        recipient: String,
        message: String,
        #[serde(default)]
        attachment_url: Option<String>,
    },
}

impl NotificationRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProductInquiry { .. } => "product_inquiry",
            Self::CartSummary { .. } => "cart_summary",
            Self::AdminAlert { .. } => "admin_alert",
            Self::RawMessage { .. } => "raw_message",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationReport {
    pub kind: String,
    pub client: DeliveryOutcome,
    pub admin: Option<DeliveryOutcome>,
    /// Set when the primary delivery failed; holds the click-to-chat link when
    /// one was generated, otherwise the failure reason.
    pub manual_follow_up: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub omitted_product_ids: Vec<String>,
}

impl NotificationReport {
    fn new(kind: &str, client: DeliveryOutcome) -> Self {
        let manual_follow_up = if client.success {
            None
        } else {
            client
                .fallback_url
                .clone()
                .or_else(|| client.failure_reason.clone())
        };
        Self {
            kind: kind.to_string(),
            client,
            admin: None,
            manual_follow_up,
            omitted_product_ids: Vec::new(),
        }
    }

    pub fn requires_manual_follow_up(&self) -> bool {
        self.manual_follow_up.is_some()
    }
}

#[derive(Clone)]
pub struct NotificationService {
    engine: DeliveryEngine,
    lookup: Arc<dyn ProductLookup>,
}

impl std::fmt::Debug for NotificationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationService")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl NotificationService {
    pub fn new(engine: DeliveryEngine, lookup: Arc<dyn ProductLookup>) -> Self {
        Self { engine, lookup }
    }

    pub fn engine(&self) -> &DeliveryEngine {
        &self.engine
    }

    pub async fn send_notification(
        &self,
        request: NotificationRequest,
    ) -> Result<NotificationReport, NotifyError> {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.send_notification_with_cancel(request, cancel_rx).await
    }

    /// Cancellation applies to both the client and the admin delivery.
    pub async fn send_notification_with_cancel(
        &self,
        request: NotificationRequest,
        cancel_rx: watch::Receiver<bool>,
    ) -> Result<NotificationReport, NotifyError> {
        let kind = request.kind();
        let report = match request {
            NotificationRequest::ProductInquiry {
                client_phone,
                product_id,
                client_name,
                user_id,
            } => {
                let product = self
                    .lookup
                    .find_product(&product_id)
                    .await?
                    .ok_or_else(|| NotifyError::ProductNotFound(product_id.clone()))?;
                let envelope = MessageEnvelope::new(
                    &client_phone,
                    compose_product_inquiry(&product, client_name.as_deref()),
                    None,
                )?;
                let outcome = self
                    .engine
                    .send_with_cancel(&envelope, cancel_rx.clone())
                    .await?;
                let mut report = NotificationReport::new(kind, outcome);
                if report.client.success {
                    let alert = compose_product_inquiry_admin_alert(
                        &product,
                        client_name.as_deref(),
                        &client_phone,
                        user_id.as_deref(),
                    );
                    report.admin = self.notify_admin(&alert, cancel_rx.clone()).await;
                }
                report
            }
            NotificationRequest::CartSummary {
                client_phone,
                items,
            } => {
                if items.is_empty() {
                    return Err(NotifyError::InvalidRequest(
                        "cart summary requires at least one item".to_string(),
                    ));
                }
                let summary = compose_cart_summary(self.lookup.as_ref(), &items).await?;
                let envelope = MessageEnvelope::new(&client_phone, summary.text.clone(), None)?;
                let outcome = self
                    .engine
                    .send_with_cancel(&envelope, cancel_rx.clone())
                    .await?;
                let mut report = NotificationReport::new(kind, outcome);
                if report.client.success {
                    let alert = compose_cart_admin_alert(&client_phone, &summary);
                    report.admin = self.notify_admin(&alert, cancel_rx.clone()).await;
                }
                report.omitted_product_ids = summary.omitted_product_ids;
                report
            }
            NotificationRequest::AdminAlert { message } => {
                let admin = self
                    .engine
                    .config()
                    .admin_recipient()
                    .ok_or(NotifyError::MissingAdminRecipient)?;
                let envelope = MessageEnvelope::new(admin, message, None)?;
                let outcome = self.engine.send_with_cancel(&envelope, cancel_rx).await?;
                NotificationReport::new(kind, outcome)
            }
            NotificationRequest::RawMessage {
                recipient,
                message,
                attachment_url,
            } => {
                let envelope = MessageEnvelope::new(&recipient, message, attachment_url)?;
                let outcome = self.engine.send_with_cancel(&envelope, cancel_rx).await?;
                NotificationReport::new(kind, outcome)
            }
        };

        info!(
            kind = %report.kind,
            client_success = report.client.success,
            admin_success = ?report.admin.as_ref().map(|outcome| outcome.success),
            manual_follow_up = report.requires_manual_follow_up(),
            "notification processed"
        );
        Ok(report)
    }

    async fn notify_admin(
        &self,
        message: &str,
        cancel_rx: watch::Receiver<bool>,
    ) -> Option<DeliveryOutcome> {
        let admin = self.engine.config().admin_recipient()?;
        let envelope = match MessageEnvelope::new(admin, message, None) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(error = %error, "skipping admin notification");
                return None;
            }
        };
        match self.engine.send_with_cancel(&envelope, cancel_rx).await {
            Ok(outcome) => {
                if !outcome.success {
                    warn!(
                        reason = outcome.failure_reason.as_deref().unwrap_or(""),
                        "admin notification failed"
                    );
                }
                Some(outcome)
            }
            Err(error) => {
                warn!(error = %error, reason_code = error.reason_code(), "admin notification failed");
                None
            }
        }
    }
}

use thiserror::Error;

/// Failures surfaced synchronously by the notification engine.
///
/// Per-attempt gateway failures are not represented here: they are recorded in
/// the attempt trace of a [`crate::DeliveryOutcome`], and an exhausted catalog
/// is reported through `DeliveryOutcome::success == false`.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("gateway api credential is not configured")]
    MissingCredential,
    #[error("admin recipient number is not configured")]
    MissingAdminRecipient,
    #[error("invalid notify config: {0}")]
    InvalidConfig(String),
    #[error("invalid gateway catalog: {0}")]
    InvalidCatalog(String),
    #[error("invalid message envelope: {0}")]
    InvalidEnvelope(String),
    #[error("invalid notification request: {0}")]
    InvalidRequest(String),
    #[error("product '{0}' not found")]
    ProductNotFound(String),
    #[error("product lookup failed: {0}")]
    ProductLookup(String),
    #[error("http client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl NotifyError {
    /// Stable snake_case code for reports and logs.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::MissingCredential => "notify_missing_credential",
            Self::MissingAdminRecipient => "notify_missing_admin_recipient",
            Self::InvalidConfig(_) => "notify_invalid_config",
            Self::InvalidCatalog(_) => "notify_invalid_catalog",
            Self::InvalidEnvelope(_) => "notify_invalid_envelope",
            Self::InvalidRequest(_) => "notify_invalid_request",
            Self::ProductNotFound(_) => "notify_product_not_found",
            Self::ProductLookup(_) => "notify_product_lookup_failed",
            Self::HttpClient(_) => "notify_http_client_error",
        }
    }
}

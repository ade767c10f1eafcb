//! Click-to-chat links for manual follow-up when automated delivery fails.

use crate::phone_normalizer::RecipientNumber;

pub const DEFAULT_FALLBACK_LINK_BASE: &str = "https://wa.me";

/// Builds `{base}/{digits}?text={percent-encoded body}`.
pub fn build_fallback_link(base: &str, recipient: &RecipientNumber, body: &str) -> String {
    let base = match base.trim().trim_end_matches('/') {
        "" => DEFAULT_FALLBACK_LINK_BASE,
        trimmed => trimmed,
    };
    format!(
        "{}/{}?text={}",
        base,
        recipient.digits_only(),
        urlencoding::encode(body)
    )
}

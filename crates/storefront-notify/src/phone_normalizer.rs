//! Recipient phone-number canonicalization for gateway and click-to-chat use.
//!
//! Normalization only strips formatting and applies the default country
//! prefix heuristic. Plausibility is never validated: a malformed number
//! produces a malformed canonical value that the gateway later rejects.

use serde::Serialize;

pub const DEFAULT_COUNTRY_CODE: &str = "91";
const NATIONAL_NUMBER_DIGITS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
/// Enumerates the recipient representations a gateway configuration may expect.
pub enum RecipientFormat {
    WithCountryCode,
    WithPlus,
    DigitsOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
/// Canonical recipient number. Equal inputs after normalization compare equal.
pub struct RecipientNumber {
    with_country_code: String,
}

impl RecipientNumber {
    pub fn with_country_code(&self) -> &str {
        &self.with_country_code
    }

    pub fn with_plus(&self) -> String {
        format!("+{}", self.with_country_code)
    }

    /// Digit-only form used in click-to-chat links.
    pub fn digits_only(&self) -> &str {
        &self.with_country_code
    }

    pub fn render(&self, format: RecipientFormat) -> String {
        match format {
            RecipientFormat::WithCountryCode => self.with_country_code().to_string(),
            RecipientFormat::WithPlus => self.with_plus(),
            RecipientFormat::DigitsOnly => self.digits_only().to_string(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.with_country_code.is_empty()
    }
}

impl std::fmt::Display for RecipientNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.with_plus())
    }
}

pub fn normalize_recipient_number(raw: &str) -> RecipientNumber {
    let digits = raw
        .chars()
        .filter(|ch| ch.is_ascii_digit())
        .collect::<String>();
    let with_country_code =
        if digits.len() == NATIONAL_NUMBER_DIGITS && !digits.starts_with(DEFAULT_COUNTRY_CODE) {
            format!("{DEFAULT_COUNTRY_CODE}{digits}")
        } else {
            digits
        };
    RecipientNumber { with_country_code }
}

//! Outbound message delivery for a storefront backend.
//!
//! Delivers text messages through a third-party messaging gateway whose exact
//! request contract is unknown: a fixed catalog of plausible endpoint and
//! parameter configurations is probed in order until one response classifies
//! as success. When every configuration fails, a click-to-chat fallback link
//! is produced and the failure is handed to a log sink for manual follow-up.
//!
//! ```rust
//! use storefront_notify::{build_fallback_link, normalize_recipient_number};
//!
//! let recipient = normalize_recipient_number("+91 98765-43210");
//! assert_eq!(recipient.with_country_code(), "919876543210");
//! assert_eq!(
//!     build_fallback_link("https://wa.me", &recipient, "Order confirmed"),
//!     "https://wa.me/919876543210?text=Order%20confirmed"
//! );
//! ```

pub mod config;
pub mod credential_probe;
pub mod delivery_engine;
pub mod error;
pub mod failure_log;
pub mod fallback_link;
pub mod gateway_catalog;
pub mod notification_composer;
pub mod notification_service;
pub mod phone_normalizer;
pub mod response_classifier;

pub use config::*;
pub use credential_probe::*;
pub use delivery_engine::*;
pub use error::*;
pub use failure_log::*;
pub use fallback_link::*;
pub use gateway_catalog::*;
pub use notification_composer::*;
pub use notification_service::*;
pub use phone_normalizer::*;
pub use response_classifier::*;

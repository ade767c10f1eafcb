//! Message bodies for storefront notifications.
//!
//! Rendering is pure formatting over business data supplied by an external
//! product lookup. A cart line whose product cannot be resolved is omitted
//! from both the line list and the total rather than failing the whole
//! summary; lookup I/O errors still propagate. Resolved lines are numbered
//! consecutively, and the cart admin alert's item count covers resolved lines
//! only, so it always matches the lines the customer saw.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

const CART_SUMMARY_RULE: &str = "------------------------------------";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    pub price: f64,
    #[serde(default, alias = "discountedPrice")]
    pub discounted_price: Option<f64>,
}

impl ProductRecord {
    /// Discounted price when one is set and positive, otherwise the base price.
    pub fn effective_unit_price(&self) -> f64 {
        self.discounted_price
            .filter(|price| *price > 0.0)
            .unwrap_or(self.price)
    }

    fn display_description(&self) -> &str {
        [self.description.as_deref(), self.content.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|value| !value.is_empty())
            .unwrap_or("N/A")
    }
}

#[async_trait]
/// Product catalog owned by the persistence layer.
pub trait ProductLookup: Send + Sync {
    async fn find_product(&self, product_id: &str) -> Result<Option<ProductRecord>, NotifyError>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryProductCatalog {
    products: BTreeMap<String, ProductRecord>,
}

impl InMemoryProductCatalog {
    pub fn from_products(products: impl IntoIterator<Item = ProductRecord>) -> Self {
        Self {
            products: products
                .into_iter()
                .map(|product| (product.id.clone(), product))
                .collect(),
        }
    }

    /// Parses a JSON array of products.
    pub fn from_json_str(raw: &str) -> Result<Self, NotifyError> {
        let products = serde_json::from_str::<Vec<ProductRecord>>(raw)
            .map_err(|error| NotifyError::ProductLookup(format!("invalid product catalog: {error}")))?;
        Ok(Self::from_products(products))
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}

#[async_trait]
impl ProductLookup for InMemoryProductCatalog {
    async fn find_product(&self, product_id: &str) -> Result<Option<ProductRecord>, NotifyError> {
        Ok(self.products.get(product_id.trim()).cloned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLineItem {
    #[serde(alias = "productId")]
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartSummaryLine {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: f64,
    pub subtotal: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartSummary {
    pub text: String,
    pub lines: Vec<CartSummaryLine>,
    pub total: f64,
    pub omitted_product_ids: Vec<String>,
}

fn format_amount(value: f64) -> String {
    format!("₹{value:.2}")
}

pub fn compose_product_inquiry(product: &ProductRecord, client_name: Option<&str>) -> String {
    format!(
        "Hi {},\n\nThank you for your interest in \"{}\"!\nPrice: {}\n\nDescription: {}\n\nWe'll get back to you shortly.\n\nBest regards,\nYour Store Team",
        display_or(client_name, "there"),
        product.name,
        format_amount(product.effective_unit_price()),
        product.display_description()
    )
}

pub fn compose_product_inquiry_admin_alert(
    product: &ProductRecord,
    client_name: Option<&str>,
    client_phone: &str,
    user_id: Option<&str>,
) -> String {
    format!(
        "New Product Inquiry:\nProduct: {}\nClient: {} ({})\nUser ID: {}",
        product.name,
        display_or(client_name, "N/A"),
        client_phone.trim(),
        display_or(user_id, "N/A")
    )
}

pub async fn compose_cart_summary(
    lookup: &dyn ProductLookup,
    items: &[CartLineItem],
) -> Result<CartSummary, NotifyError> {
    let mut lines = Vec::with_capacity(items.len());
    let mut omitted_product_ids = Vec::new();
    for item in items {
        match lookup.find_product(&item.product_id).await? {
            Some(product) => {
                let unit_price = product.effective_unit_price();
                lines.push(CartSummaryLine {
                    product_id: product.id.clone(),
                    product_name: product.name.clone(),
                    quantity: item.quantity,
                    unit_price,
                    subtotal: unit_price * f64::from(item.quantity),
                });
            }
            None => {
                tracing::debug!(product_id = %item.product_id, "omitting unresolved cart line");
                omitted_product_ids.push(item.product_id.clone());
            }
        }
    }
    let total = lines.iter().fold(0.0, |total, line| total + line.subtotal);

    let mut text = String::from("🛒 Your Order Summary 🛒\n\n");
    for (index, line) in lines.iter().enumerate() {
        text.push_str(&format!(
            "{}. {}\n   Qty: {}\n   Price: {}\n   Subtotal: {}\n\n",
            index + 1,
            line.product_name,
            line.quantity,
            format_amount(line.unit_price),
            format_amount(line.subtotal)
        ));
    }
    text.push_str(CART_SUMMARY_RULE);
    text.push('\n');
    text.push_str(&format!("💰 Total Amount: {}\n", format_amount(total)));
    text.push_str(CART_SUMMARY_RULE);
    text.push_str("\n\nThank you for your inquiry! We will contact you shortly.");

    Ok(CartSummary {
        text,
        lines,
        total,
        omitted_product_ids,
    })
}

pub fn compose_cart_admin_alert(client_phone: &str, summary: &CartSummary) -> String {
    format!(
        "Cart Summary Sent:\nClient: {}\nItems: {}\nTotal: {}",
        client_phone.trim(),
        summary.lines.len(),
        format_amount(summary.total)
    )
}

fn display_or<'a>(value: Option<&'a str>, fallback: &'a str) -> &'a str {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(fallback)
}

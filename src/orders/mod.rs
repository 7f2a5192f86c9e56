//! Order records and the support agent that joins them with policy answers.

pub mod agent;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::ApiError;

pub use agent::{extract_order_id, AgentResponse, SupportAgent};
pub use sqlite::SqliteOrderStore;

/// One purchase record. Tracking and notes are absent for orders that have
/// not shipped or need no annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub product_name: String,
    pub product_sku: String,
    pub quantity: i64,
    pub price: f64,
    pub order_date: String,
    pub status: String,
    pub shipping_address: String,
    #[serde(default)]
    pub tracking_number: Option<String>,
    pub return_eligible: bool,
    pub warranty_status: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl OrderRecord {
    /// Renders the record as a labeled context block for the prompt.
    pub fn format_context(&self) -> String {
        let mut context = format!(
            "Order Information:\n\
             - Order ID: {}\n\
             - Customer: {} (ID: {})\n\
             - Email: {}\n\
             - Product: {} (SKU: {})\n\
             - Quantity: {}\n\
             - Price: ${:.2}\n\
             - Order Date: {}\n\
             - Status: {}\n\
             - Shipping Address: {}\n\
             - Tracking Number: {}\n\
             - Return Eligible: {}\n\
             - Warranty Status: {}\n",
            self.order_id,
            self.customer_name,
            self.customer_id,
            self.customer_email,
            self.product_name,
            self.product_sku,
            self.quantity,
            self.price,
            self.order_date,
            self.status,
            self.shipping_address,
            self.tracking_number.as_deref().unwrap_or("N/A"),
            if self.return_eligible { "Yes" } else { "No" },
            self.warranty_status,
        );
        if let Some(notes) = &self.notes {
            context.push_str(&format!("- Notes: {}\n", notes));
        }
        context
    }
}

/// Keyed order lookup and status updates. Lookups normalize the id (trim,
/// uppercase) so user-typed ids match; a miss is `Ok(None)`, never an error.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn get_by_id(&self, order_id: &str) -> Result<Option<OrderRecord>, ApiError>;

    async fn get_by_customer(&self, customer_id: &str) -> Result<Vec<OrderRecord>, ApiError>;

    /// Returns false when the order does not exist.
    async fn update_status(&self, order_id: &str, status: &str) -> Result<bool, ApiError>;

    async fn insert(&self, order: &OrderRecord) -> Result<(), ApiError>;

    async fn count(&self) -> Result<u64, ApiError>;
}

#[cfg(test)]
pub(crate) fn sample_order(order_id: &str, customer_id: &str) -> OrderRecord {
    OrderRecord {
        order_id: order_id.to_string(),
        customer_id: customer_id.to_string(),
        customer_name: "Alex Chen".to_string(),
        customer_email: "alex.chen@example.com".to_string(),
        product_name: "GeForce RTX 4070 Graphics Card".to_string(),
        product_sku: "GPU-4070-12G".to_string(),
        quantity: 1,
        price: 599.99,
        order_date: "2025-06-14".to_string(),
        status: "shipped".to_string(),
        shipping_address: "410 Elm St, Columbus, OH 43215".to_string(),
        tracking_number: Some("1Z999AA10123456784".to_string()),
        return_eligible: true,
        warranty_status: "active".to_string(),
        notes: None,
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MOCK_GATEWAY: &str = "mock_payment_gateway";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeStatus {
    Succeeded,
    Declined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub booking_id: Uuid,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeReceipt {
    pub transaction_id: String,
    pub method: String,
    pub status: ChargeStatus,
    pub processed_at: DateTime<Utc>,
}

#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Charge the booking total. A decline is a normal outcome, not an error.
    async fn charge(
        &self,
        request: &ChargeRequest,
    ) -> Result<ChargeReceipt, Box<dyn std::error::Error + Send + Sync>>;

    /// Reverse a charge whose booking could not be confirmed.
    async fn refund(
        &self,
        transaction_id: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Gateway stand-in that approves everything unless built with [`MockPaymentAdapter::declining`].
#[derive(Debug, Clone, Default)]
pub struct MockPaymentAdapter {
    decline: bool,
}

impl MockPaymentAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declining() -> Self {
        Self { decline: true }
    }
}

#[async_trait]
impl PaymentAdapter for MockPaymentAdapter {
    async fn charge(
        &self,
        request: &ChargeRequest,
    ) -> Result<ChargeReceipt, Box<dyn std::error::Error + Send + Sync>> {
        let status = if self.decline {
            ChargeStatus::Declined
        } else {
            ChargeStatus::Succeeded
        };
        tracing::info!(
            "Mock charge {} {} for booking {}: {:?}",
            request.amount,
            request.currency,
            request.booking_id,
            status
        );
        Ok(ChargeReceipt {
            transaction_id: format!("MOCK_TX_{}", request.booking_id.simple()),
            method: MOCK_GATEWAY.to_string(),
            status,
            processed_at: Utc::now(),
        })
    }

    async fn refund(
        &self,
        transaction_id: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!("Mock refund for transaction {}", transaction_id);
        Ok(())
    }
}

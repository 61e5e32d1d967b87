use crate::ids::{OrderId, PaymentIntentId};
use crate::money::Money;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// Errors reported by a payment gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The gateway refused to create an intent.
    #[error("Payment declined: {0}")]
    Declined(String),

    /// The gateway could not be reached.
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    /// The gateway has no record of the intent.
    #[error("Unknown payment intent: {0}")]
    UnknownIntent(String),
}

/// An intent the client completes with the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: PaymentIntentId,
    /// Secret the client hands to the gateway's SDK.
    pub client_secret: String,
    pub amount: Money,
}

/// Where the gateway says an intent stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentStatus {
    Pending,
    Succeeded,
    Failed,
}

/// Payment gateway.
///
/// The gateway is the only authority on whether an intent was paid; order
/// confirmation asks it rather than trusting the caller.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(
        &self,
        order_id: &OrderId,
        amount: Money,
    ) -> Result<PaymentIntent, GatewayError>;

    async fn intent_status(
        &self,
        intent_id: &PaymentIntentId,
    ) -> Result<IntentStatus, GatewayError>;
}

/// Gateway that issues intents locally without calling out.
///
/// Intents start `PENDING`; [`LocalGateway::set_intent_status`] stands in for
/// the customer completing (or abandoning) payment.
#[derive(Debug, Default)]
pub struct LocalGateway {
    unavailable: AtomicBool,
    intents: Mutex<HashMap<PaymentIntentId, IntentStatus>>,
}

impl LocalGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail as if the gateway were down.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Settle an intent this gateway issued.
    pub fn set_intent_status(
        &self,
        intent_id: &PaymentIntentId,
        status: IntentStatus,
    ) -> Result<(), GatewayError> {
        let mut intents = self.intents.lock().unwrap_or_else(|e| e.into_inner());
        match intents.get_mut(intent_id) {
            Some(current) => {
                *current = status;
                Ok(())
            }
            None => Err(GatewayError::UnknownIntent(intent_id.to_string())),
        }
    }

    fn check_available(&self) -> Result<(), GatewayError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("local gateway switched off".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for LocalGateway {
    async fn create_intent(
        &self,
        order_id: &OrderId,
        amount: Money,
    ) -> Result<PaymentIntent, GatewayError> {
        self.check_available()?;
        let id = PaymentIntentId::generate();
        self.intents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), IntentStatus::Pending);
        tracing::debug!(
            order_id = %order_id,
            intent_id = %id,
            amount = %amount,
            "Payment intent created"
        );
        Ok(PaymentIntent {
            client_secret: format!("{}_secret_{}", id, uuid::Uuid::new_v4().simple()),
            id,
            amount,
        })
    }

    async fn intent_status(
        &self,
        intent_id: &PaymentIntentId,
    ) -> Result<IntentStatus, GatewayError> {
        self.check_available()?;
        self.intents
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(intent_id)
            .copied()
            .ok_or_else(|| GatewayError::UnknownIntent(intent_id.to_string()))
    }
}

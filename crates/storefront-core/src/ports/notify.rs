use crate::checkout::OrderStatus;
use crate::ids::{OrderId, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Order lifecycle events sent to the notification service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Created {
        order_id: OrderId,
        order_number: String,
        user_id: UserId,
        status: OrderStatus,
    },
    Cancelled {
        order_id: OrderId,
        user_id: UserId,
        reason: String,
    },
}

impl OrderEvent {
    pub fn order_id(&self) -> &OrderId {
        match self {
            OrderEvent::Created { order_id, .. } | OrderEvent::Cancelled { order_id, .. } => {
                order_id
            }
        }
    }
}

/// Fire-and-forget notification sink. Failures never undo an order.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &OrderEvent) -> Result<(), NotifyError>;
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &OrderEvent) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(event).map_err(|e| NotifyError(e.to_string()))?;
        tracing::info!(order_id = %event.order_id(), event = %payload, "Order notification");
        Ok(())
    }
}

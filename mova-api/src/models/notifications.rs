//! Queued user notifications. Delivery itself is an external concern; the
//! repository only records what should be sent.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification categories raised by the platform services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    PurchaseConfirmation,
    PurchaseLimitWarning,
    CoinSuspension,
    AutoRefillDisabled,
    RideStatus,
    CarpoolVerification,
}

/// Delivery channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    Email,
    Push,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub kind: NotificationKind,
    pub channel: DeliveryChannel,
    pub title: String,
    pub body: String,
    pub created_on: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn enqueue(
        &self,
        user_id: i64,
        kind: NotificationKind,
        channel: DeliveryChannel,
        title: String,
        body: String,
    ) -> Result<Notification, String>;

    async fn for_user(&self, user_id: i64) -> Result<Vec<Notification>, String>;
    async fn count_for_user(&self, user_id: i64, kind: NotificationKind) -> Result<usize, String>;
}

/// In-memory implementation for development and testing.
#[derive(Debug, Default)]
pub struct InMemoryNotificationRepository {
    rows: Mutex<Vec<Notification>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn enqueue(
        &self,
        user_id: i64,
        kind: NotificationKind,
        channel: DeliveryChannel,
        title: String,
        body: String,
    ) -> Result<Notification, String> {
        let mut rows = self.rows.lock().unwrap();
        let row = Notification {
            id: rows.len() as i64 + 1,
            user_id,
            kind,
            channel,
            title,
            body,
            created_on: Utc::now(),
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn for_user(&self, user_id: i64) -> Result<Vec<Notification>, String> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.iter().filter(|n| n.user_id == user_id).cloned().collect())
    }

    async fn count_for_user(&self, user_id: i64, kind: NotificationKind) -> Result<usize, String> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|n| n.user_id == user_id && n.kind == kind)
            .count())
    }
}

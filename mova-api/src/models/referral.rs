//! Referral history: at most one row per receiver.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use mova_core::geo::Point;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralHistory {
    pub id: i64,
    pub sender_user_id: i64,
    pub receiver_user_id: i64,
    pub referral_code: String,
    pub reward_amount: Decimal,
    pub created_on: DateTime<Utc>,
}

/// The slice of the user profile the referral flow needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralUser {
    pub user_id: i64,
    pub created_on: DateTime<Utc>,
    /// Coordinates captured at registration, for geofenced eligibility.
    pub registration_location: Option<Point>,
    /// IANA zone the user registered in.
    pub timezone: String,
}

#[async_trait::async_trait]
pub trait ReferralRepository: Send + Sync {
    /// Insert the receiver's single referral row; errors when one exists.
    async fn insert(&self, row: ReferralHistory) -> Result<ReferralHistory, String>;
    async fn for_receiver(&self, receiver_user_id: i64) -> Result<Option<ReferralHistory>, String>;

    async fn get_user(&self, user_id: i64) -> Result<Option<ReferralUser>, String>;
    async fn put_user(&self, user: ReferralUser) -> Result<(), String>;
}

#[derive(Debug, Default)]
struct ReferralState {
    next_id: i64,
    rows: HashMap<i64, ReferralHistory>,
    users: HashMap<i64, ReferralUser>,
}

/// In-memory implementation for development and testing.
#[derive(Debug, Default)]
pub struct InMemoryReferralRepository {
    state: Mutex<ReferralState>,
}

impl InMemoryReferralRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ReferralRepository for InMemoryReferralRepository {
    async fn insert(&self, mut row: ReferralHistory) -> Result<ReferralHistory, String> {
        let mut state = self.state.lock().unwrap();
        if state.rows.contains_key(&row.receiver_user_id) {
            return Err(format!(
                "Referral already recorded for receiver {}",
                row.receiver_user_id
            ));
        }
        state.next_id += 1;
        row.id = state.next_id;
        state.rows.insert(row.receiver_user_id, row.clone());
        Ok(row)
    }

    async fn for_receiver(&self, receiver_user_id: i64) -> Result<Option<ReferralHistory>, String> {
        let state = self.state.lock().unwrap();
        Ok(state.rows.get(&receiver_user_id).cloned())
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<ReferralUser>, String> {
        let state = self.state.lock().unwrap();
        Ok(state.users.get(&user_id).cloned())
    }

    async fn put_user(&self, user: ReferralUser) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        state.users.insert(user.user_id, user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn one_row_per_receiver() {
        let repo = InMemoryReferralRepository::new();
        let row = ReferralHistory {
            id: 0,
            sender_user_id: 1005,
            receiver_user_id: 1003,
            referral_code: "code".to_string(),
            reward_amount: Decimal::ONE,
            created_on: Utc::now(),
        };
        repo.insert(row.clone()).await.unwrap();
        assert!(repo.insert(row).await.is_err());
    }
}

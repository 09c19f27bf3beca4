//! Enterprise carpool entities: enterprises, invites, blocklists, duo
//! groups and the email-verification rows.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Verification lifecycle of a carpool email row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Success,
    Expired,
}

impl std::fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationStatus::Pending => write!(f, "pending"),
            VerificationStatus::Success => write!(f, "success"),
            VerificationStatus::Expired => write!(f, "expired"),
        }
    }
}

/// A corporate tenant, matched to users by email domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enterprise {
    pub id: i64,
    pub name: String,
    pub email_domain: String,
}

/// A carpool group, optionally scoped to an enterprise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuoGroup {
    pub id: i64,
    pub name: String,
    pub enterprise_id: Option<i64>,
}

/// Direct invitation for an email that does not match the domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnterpriseInvite {
    pub email: String,
    pub enterprise_id: i64,
}

/// Blocklist row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnterpriseBlock {
    pub email: String,
    pub enterprise_id: i64,
    pub is_blocked: bool,
}

/// An email-verification record linking a user to an enterprise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnterpriseEmail {
    pub id: i64,
    pub user_id: i64,
    pub email: String,
    pub enterprise_id: i64,
    pub group_id: Option<i64>,
    pub verification_token: Option<String>,
    pub verification_status: VerificationStatus,
    pub token_expires_on: Option<DateTime<Utc>>,
    pub created_on: DateTime<Utc>,
}

/// Membership state in a duo group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMembership {
    pub user_id: i64,
    pub group_id: i64,
    pub status: String,
    pub created_on: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait EnterpriseRepository: Send + Sync {
    async fn enterprises_for_domain(&self, domain: &str) -> Result<Vec<Enterprise>, String>;
    async fn enterprises_for_invite(&self, email: &str) -> Result<Vec<Enterprise>, String>;
    async fn get_group(&self, group_id: i64) -> Result<Option<DuoGroup>, String>;
    async fn is_blocked(&self, email: &str, enterprise_id: i64) -> Result<bool, String>;

    /// The verified row for this email, if any user holds one.
    async fn verified_row_for_email(&self, email: &str) -> Result<Option<EnterpriseEmail>, String>;
    /// This user's row for the enterprise, any status.
    async fn row_for_user(
        &self,
        user_id: i64,
        enterprise_id: i64,
        email: &str,
    ) -> Result<Option<EnterpriseEmail>, String>;
    async fn upsert_email_row(&self, row: EnterpriseEmail) -> Result<EnterpriseEmail, String>;
    async fn find_by_token(&self, token: &str) -> Result<Option<EnterpriseEmail>, String>;
    async fn update_email_row(&self, row: EnterpriseEmail) -> Result<EnterpriseEmail, String>;

    /// Idempotent membership insert in `accepted` state.
    async fn join_group(&self, user_id: i64, group_id: i64) -> Result<GroupMembership, String>;
    async fn membership(&self, user_id: i64, group_id: i64) -> Result<Option<GroupMembership>, String>;

    // Seeding for wiring and tests.
    async fn add_enterprise(&self, enterprise: Enterprise) -> Result<(), String>;
    async fn add_group(&self, group: DuoGroup) -> Result<(), String>;
    async fn add_invite(&self, invite: EnterpriseInvite) -> Result<(), String>;
    async fn add_block(&self, block: EnterpriseBlock) -> Result<(), String>;
}

#[derive(Debug, Default)]
struct EnterpriseState {
    next_row_id: i64,
    enterprises: HashMap<i64, Enterprise>,
    groups: HashMap<i64, DuoGroup>,
    invites: Vec<EnterpriseInvite>,
    blocks: Vec<EnterpriseBlock>,
    email_rows: Vec<EnterpriseEmail>,
    memberships: Vec<GroupMembership>,
}

/// In-memory implementation for development and testing.
#[derive(Debug, Default)]
pub struct InMemoryEnterpriseRepository {
    state: Mutex<EnterpriseState>,
}

impl InMemoryEnterpriseRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl EnterpriseRepository for InMemoryEnterpriseRepository {
    async fn enterprises_for_domain(&self, domain: &str) -> Result<Vec<Enterprise>, String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .enterprises
            .values()
            .filter(|e| e.email_domain.eq_ignore_ascii_case(domain))
            .cloned()
            .collect())
    }

    async fn enterprises_for_invite(&self, email: &str) -> Result<Vec<Enterprise>, String> {
        let state = self.state.lock().unwrap();
        let ids: Vec<i64> = state
            .invites
            .iter()
            .filter(|i| i.email.eq_ignore_ascii_case(email))
            .map(|i| i.enterprise_id)
            .collect();
        Ok(ids
            .into_iter()
            .filter_map(|id| state.enterprises.get(&id).cloned())
            .collect())
    }

    async fn get_group(&self, group_id: i64) -> Result<Option<DuoGroup>, String> {
        let state = self.state.lock().unwrap();
        Ok(state.groups.get(&group_id).cloned())
    }

    async fn is_blocked(&self, email: &str, enterprise_id: i64) -> Result<bool, String> {
        let state = self.state.lock().unwrap();
        Ok(state.blocks.iter().any(|b| {
            b.is_blocked && b.enterprise_id == enterprise_id && b.email.eq_ignore_ascii_case(email)
        }))
    }

    async fn verified_row_for_email(&self, email: &str) -> Result<Option<EnterpriseEmail>, String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .email_rows
            .iter()
            .find(|r| {
                r.verification_status == VerificationStatus::Success
                    && r.email.eq_ignore_ascii_case(email)
            })
            .cloned())
    }

    async fn row_for_user(
        &self,
        user_id: i64,
        enterprise_id: i64,
        email: &str,
    ) -> Result<Option<EnterpriseEmail>, String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .email_rows
            .iter()
            .find(|r| {
                r.user_id == user_id
                    && r.enterprise_id == enterprise_id
                    && r.email.eq_ignore_ascii_case(email)
            })
            .cloned())
    }

    async fn upsert_email_row(&self, mut row: EnterpriseEmail) -> Result<EnterpriseEmail, String> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.email_rows.iter_mut().find(|r| {
            r.user_id == row.user_id
                && r.enterprise_id == row.enterprise_id
                && r.email.eq_ignore_ascii_case(&row.email)
        }) {
            row.id = existing.id;
            *existing = row.clone();
            return Ok(row);
        }
        state.next_row_id += 1;
        row.id = state.next_row_id;
        state.email_rows.push(row.clone());
        Ok(row)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<EnterpriseEmail>, String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .email_rows
            .iter()
            .find(|r| r.verification_token.as_deref() == Some(token))
            .cloned())
    }

    async fn update_email_row(&self, row: EnterpriseEmail) -> Result<EnterpriseEmail, String> {
        let mut state = self.state.lock().unwrap();
        match state.email_rows.iter_mut().find(|r| r.id == row.id) {
            Some(existing) => {
                *existing = row.clone();
                Ok(row)
            }
            None => Err(format!("Enterprise email row {} not found", row.id)),
        }
    }

    async fn join_group(&self, user_id: i64, group_id: i64) -> Result<GroupMembership, String> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state
            .memberships
            .iter()
            .find(|m| m.user_id == user_id && m.group_id == group_id)
        {
            return Ok(existing.clone());
        }
        let membership = GroupMembership {
            user_id,
            group_id,
            status: "accepted".to_string(),
            created_on: Utc::now(),
        };
        state.memberships.push(membership.clone());
        Ok(membership)
    }

    async fn membership(&self, user_id: i64, group_id: i64) -> Result<Option<GroupMembership>, String> {
        let state = self.state.lock().unwrap();
        Ok(state
            .memberships
            .iter()
            .find(|m| m.user_id == user_id && m.group_id == group_id)
            .cloned())
    }

    async fn add_enterprise(&self, enterprise: Enterprise) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        state.enterprises.insert(enterprise.id, enterprise);
        Ok(())
    }

    async fn add_group(&self, group: DuoGroup) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        state.groups.insert(group.id, group);
        Ok(())
    }

    async fn add_invite(&self, invite: EnterpriseInvite) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        state.invites.push(invite);
        Ok(())
    }

    async fn add_block(&self, block: EnterpriseBlock) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        state.blocks.push(block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_group_is_idempotent() {
        let repo = InMemoryEnterpriseRepository::new();
        let first = repo.join_group(1003, 77).await.unwrap();
        let second = repo.join_group(1003, 77).await.unwrap();
        assert_eq!(first.created_on, second.created_on);
        assert_eq!(first.status, "accepted");
    }

    #[tokio::test]
    async fn domain_match_is_case_insensitive() {
        let repo = InMemoryEnterpriseRepository::new();
        repo.add_enterprise(Enterprise {
            id: 1,
            name: "Acme".to_string(),
            email_domain: "acme.com".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(repo.enterprises_for_domain("ACME.com").await.unwrap().len(), 1);
    }
}

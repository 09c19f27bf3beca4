//! Enterprise verifier: carpool email verification and group join.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::{codes, ApiError, ApiResult};
use crate::models::enterprise::{
    EnterpriseEmail, EnterpriseRepository, VerificationStatus,
};
use crate::models::notifications::{DeliveryChannel, NotificationKind, NotificationRepository};

const TOKEN_LENGTH: usize = 64;
const TOKEN_TTL_HOURS: i64 = 24;

/// Outcome of a verification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationRequestOutcome {
    /// Email already verified for this user; the group join happened
    /// directly.
    Joined,
    /// A verification email was sent.
    EmailSent,
}

/// What the HTML page renders after a token verification.
#[derive(Debug, Clone)]
pub struct VerifiedEmail {
    pub email: String,
    pub group_id: Option<i64>,
}

pub struct EnterpriseService {
    repo: Arc<dyn EnterpriseRepository>,
    notifications: Arc<dyn NotificationRepository>,
}

impl EnterpriseService {
    pub fn new(
        repo: Arc<dyn EnterpriseRepository>,
        notifications: Arc<dyn NotificationRepository>,
    ) -> Self {
        Self {
            repo,
            notifications,
        }
    }

    fn email_domain(email: &str) -> ApiResult<&str> {
        match email.rsplit_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(domain),
            _ => Err(ApiError::bad_request(
                codes::MALFORMED_REQUEST,
                "invalid email address",
            )),
        }
    }

    fn generate_token() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect()
    }

    /// Enterprises the email can verify against: domain matches unioned
    /// with direct invites.
    async fn resolve_enterprises(&self, email: &str) -> ApiResult<Vec<i64>> {
        let domain = Self::email_domain(email)?;
        let mut ids: HashSet<i64> = HashSet::new();
        for enterprise in self
            .repo
            .enterprises_for_domain(domain)
            .await
            .map_err(ApiError::internal)?
        {
            ids.insert(enterprise.id);
        }
        for enterprise in self
            .repo
            .enterprises_for_invite(email)
            .await
            .map_err(ApiError::internal)?
        {
            ids.insert(enterprise.id);
        }
        Ok(ids.into_iter().collect())
    }

    pub async fn request_carpool_email_verification(
        &self,
        user_id: i64,
        email: &str,
        verify_type: &str,
        group_id: Option<i64>,
    ) -> ApiResult<VerificationRequestOutcome> {
        let enterprise_ids = self.resolve_enterprises(email).await?;
        if enterprise_ids.is_empty() {
            return Err(ApiError::forbidden(
                codes::EMAIL_NOT_ELIGIBLE,
                "email does not match any enterprise",
            ));
        }

        let group_enterprise = if verify_type == "carpool" {
            let group_id =
                group_id.ok_or_else(|| ApiError::missing_field("group_id"))?;
            let group = self
                .repo
                .get_group(group_id)
                .await
                .map_err(ApiError::internal)?
                .ok_or_else(|| {
                    ApiError::bad_request(codes::GROUP_NOT_FOUND, "carpool group not found")
                })?;
            match group.enterprise_id {
                Some(id) if enterprise_ids.contains(&id) => Some(id),
                _ => {
                    return Err(ApiError::forbidden(
                        codes::EMAIL_NOT_ELIGIBLE,
                        "group does not belong to an eligible enterprise",
                    ))
                }
            }
        } else {
            None
        };

        if let Some(verified) = self
            .repo
            .verified_row_for_email(email)
            .await
            .map_err(ApiError::internal)?
        {
            if verified.user_id != user_id {
                return Err(ApiError::forbidden(
                    codes::EMAIL_NOT_ELIGIBLE,
                    "email already verified by another user",
                ));
            }
        }

        for enterprise_id in &enterprise_ids {
            if self
                .repo
                .is_blocked(email, *enterprise_id)
                .await
                .map_err(ApiError::internal)?
            {
                return Err(ApiError::forbidden(
                    codes::EMAIL_NOT_ELIGIBLE,
                    "email is blocked for this enterprise",
                ));
            }
        }

        let enterprise_id = group_enterprise.unwrap_or(enterprise_ids[0]);

        // Already verified for this user and enterprise: join directly.
        if let Some(row) = self
            .repo
            .row_for_user(user_id, enterprise_id, email)
            .await
            .map_err(ApiError::internal)?
        {
            if row.verification_status == VerificationStatus::Success {
                if let Some(group_id) = group_id {
                    self.repo
                        .join_group(user_id, group_id)
                        .await
                        .map_err(ApiError::internal)?;
                }
                return Ok(VerificationRequestOutcome::Joined);
            }
        }

        let token = Self::generate_token();
        self.repo
            .upsert_email_row(EnterpriseEmail {
                id: 0,
                user_id,
                email: email.to_string(),
                enterprise_id,
                group_id,
                verification_token: Some(token.clone()),
                verification_status: VerificationStatus::Pending,
                token_expires_on: Some(Utc::now() + Duration::hours(TOKEN_TTL_HOURS)),
                created_on: Utc::now(),
            })
            .await
            .map_err(ApiError::internal)?;

        let _ = self
            .notifications
            .enqueue(
                user_id,
                NotificationKind::CarpoolVerification,
                DeliveryChannel::Email,
                "Verify your carpool email".to_string(),
                format!(
                    "Open /verify_carpool_email.html?verify_token={} to verify your email.",
                    token
                ),
            )
            .await;
        Ok(VerificationRequestOutcome::EmailSent)
    }

    /// Verify a token from the emailed link. The route renders HTML for
    /// both the success and error arms.
    pub async fn verify_email(&self, token: &str) -> ApiResult<VerifiedEmail> {
        let row = self
            .repo
            .find_by_token(token)
            .await
            .map_err(ApiError::internal)?
            .ok_or_else(|| ApiError::not_found("verification token not found"))?;

        match row.token_expires_on {
            Some(expires) if expires > Utc::now() => {}
            _ => {
                return Err(ApiError::forbidden(
                    codes::EMAIL_NOT_ELIGIBLE,
                    "verification token expired",
                ))
            }
        }

        let mut updated = row.clone();
        updated.verification_status = VerificationStatus::Success;
        updated.verification_token = None;
        updated.token_expires_on = None;
        self.repo
            .update_email_row(updated)
            .await
            .map_err(ApiError::internal)?;

        if let Some(group_id) = row.group_id {
            self.repo
                .join_group(row.user_id, group_id)
                .await
                .map_err(ApiError::internal)?;
        }

        Ok(VerifiedEmail {
            email: row.email,
            group_id: row.group_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enterprise::{
        DuoGroup, Enterprise, EnterpriseBlock, EnterpriseInvite, InMemoryEnterpriseRepository,
    };
    use crate::models::notifications::InMemoryNotificationRepository;

    async fn service_with_acme() -> (EnterpriseService, Arc<InMemoryEnterpriseRepository>) {
        let repo = Arc::new(InMemoryEnterpriseRepository::new());
        repo.add_enterprise(Enterprise {
            id: 1,
            name: "Acme".to_string(),
            email_domain: "acme.com".to_string(),
        })
        .await
        .unwrap();
        repo.add_group(DuoGroup {
            id: 77,
            name: "Acme Riders".to_string(),
            enterprise_id: Some(1),
        })
        .await
        .unwrap();
        let service = EnterpriseService::new(
            repo.clone(),
            Arc::new(InMemoryNotificationRepository::new()),
        );
        (service, repo)
    }

    #[tokio::test]
    async fn full_verification_flow_joins_group() {
        let (service, repo) = service_with_acme().await;
        let outcome = service
            .request_carpool_email_verification(1003, "pat@acme.com", "carpool", Some(77))
            .await
            .unwrap();
        assert_eq!(outcome, VerificationRequestOutcome::EmailSent);

        let row = repo
            .row_for_user(1003, 1, "pat@acme.com")
            .await
            .unwrap()
            .unwrap();
        let token = row.verification_token.unwrap();
        assert_eq!(token.len(), TOKEN_LENGTH);

        let verified = service.verify_email(&token).await.unwrap();
        assert_eq!(verified.group_id, Some(77));
        assert!(repo.membership(1003, 77).await.unwrap().is_some());

        // Re-requesting now joins directly.
        let outcome = service
            .request_carpool_email_verification(1003, "pat@acme.com", "carpool", Some(77))
            .await
            .unwrap();
        assert_eq!(outcome, VerificationRequestOutcome::Joined);
    }

    #[tokio::test]
    async fn foreign_group_rejected() {
        let (service, repo) = service_with_acme().await;
        repo.add_group(DuoGroup {
            id: 88,
            name: "Other Co".to_string(),
            enterprise_id: Some(2),
        })
        .await
        .unwrap();
        let err = service
            .request_carpool_email_verification(1003, "pat@acme.com", "carpool", Some(88))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::EMAIL_NOT_ELIGIBLE);
    }

    #[tokio::test]
    async fn email_reuse_rejected() {
        let (service, repo) = service_with_acme().await;
        let outcome = service
            .request_carpool_email_verification(1003, "pat@acme.com", "carpool", Some(77))
            .await
            .unwrap();
        assert_eq!(outcome, VerificationRequestOutcome::EmailSent);
        let token = repo
            .row_for_user(1003, 1, "pat@acme.com")
            .await
            .unwrap()
            .unwrap()
            .verification_token
            .unwrap();
        service.verify_email(&token).await.unwrap();

        let err = service
            .request_carpool_email_verification(1004, "pat@acme.com", "carpool", Some(77))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::EMAIL_NOT_ELIGIBLE);
    }

    #[tokio::test]
    async fn blocked_email_rejected() {
        let (service, repo) = service_with_acme().await;
        repo.add_block(EnterpriseBlock {
            email: "pat@acme.com".to_string(),
            enterprise_id: 1,
            is_blocked: true,
        })
        .await
        .unwrap();
        let err = service
            .request_carpool_email_verification(1003, "pat@acme.com", "carpool", Some(77))
            .await
            .unwrap_err();
        assert_eq!(err.code, codes::EMAIL_NOT_ELIGIBLE);
    }

    #[tokio::test]
    async fn invite_grants_access_without_domain_match() {
        let (service, repo) = service_with_acme().await;
        repo.add_invite(EnterpriseInvite {
            email: "contractor@gmail.com".to_string(),
            enterprise_id: 1,
        })
        .await
        .unwrap();
        let outcome = service
            .request_carpool_email_verification(1005, "contractor@gmail.com", "carpool", Some(77))
            .await
            .unwrap();
        assert_eq!(outcome, VerificationRequestOutcome::EmailSent);
    }

    #[tokio::test]
    async fn expired_token_rejected() {
        let (service, repo) = service_with_acme().await;
        service
            .request_carpool_email_verification(1003, "pat@acme.com", "carpool", Some(77))
            .await
            .unwrap();
        let mut row = repo
            .row_for_user(1003, 1, "pat@acme.com")
            .await
            .unwrap()
            .unwrap();
        let token = row.verification_token.clone().unwrap();
        row.token_expires_on = Some(Utc::now() - Duration::hours(1));
        repo.update_email_row(row).await.unwrap();

        assert!(service.verify_email(&token).await.is_err());
    }
}

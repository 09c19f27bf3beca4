//! Incentive rule storage and market service profiles.
//!
//! Exactly one rule is active per market; publishing a new rule replaces
//! the active row atomically and appends the replaced version to an audit
//! log.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use mova_core::geo::Polygon;
use mova_core::incentive::IncentiveRule;
use serde::{Deserialize, Serialize};

/// A retired rule version kept for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncentiveRuleAudit {
    pub rule: IncentiveRule,
    pub replaced_on: DateTime<Utc>,
}

/// A market's service-area polygon.
#[derive(Debug, Clone)]
pub struct ServiceProfile {
    pub market: String,
    pub polygon: Polygon,
}

#[async_trait::async_trait]
pub trait IncentiveRepository: Send + Sync {
    /// Atomically replace the market's active rule.
    async fn publish_rule(&self, rule: IncentiveRule) -> Result<(), String>;
    async fn active_rule(&self, market: &str) -> Result<Option<IncentiveRule>, String>;
    async fn audit_log(&self, market: &str) -> Result<Vec<IncentiveRuleAudit>, String>;

    async fn put_service_profile(&self, profile: ServiceProfile) -> Result<(), String>;
    async fn service_profile(&self, market: &str) -> Result<Option<ServiceProfile>, String>;
    async fn service_profiles(&self) -> Result<Vec<ServiceProfile>, String>;
}

/// In-memory implementation for development and testing.
#[derive(Debug, Default)]
pub struct InMemoryIncentiveRepository {
    rules: Mutex<HashMap<String, IncentiveRule>>,
    audit: Mutex<Vec<IncentiveRuleAudit>>,
    profiles: Mutex<HashMap<String, ServiceProfile>>,
}

impl InMemoryIncentiveRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl IncentiveRepository for InMemoryIncentiveRepository {
    async fn publish_rule(&self, rule: IncentiveRule) -> Result<(), String> {
        for (mode, mode_rule) in &rule.modes {
            mode_rule
                .validate()
                .map_err(|e| format!("mode {}: {}", mode, e))?;
        }
        let mut rules = self.rules.lock().unwrap();
        if let Some(previous) = rules.insert(rule.market.clone(), rule) {
            self.audit.lock().unwrap().push(IncentiveRuleAudit {
                rule: previous,
                replaced_on: Utc::now(),
            });
        }
        Ok(())
    }

    async fn active_rule(&self, market: &str) -> Result<Option<IncentiveRule>, String> {
        let rules = self.rules.lock().unwrap();
        Ok(rules.get(market).cloned())
    }

    async fn audit_log(&self, market: &str) -> Result<Vec<IncentiveRuleAudit>, String> {
        let audit = self.audit.lock().unwrap();
        Ok(audit
            .iter()
            .filter(|entry| entry.rule.market == market)
            .cloned()
            .collect())
    }

    async fn put_service_profile(&self, profile: ServiceProfile) -> Result<(), String> {
        let mut profiles = self.profiles.lock().unwrap();
        profiles.insert(profile.market.clone(), profile);
        Ok(())
    }

    async fn service_profile(&self, market: &str) -> Result<Option<ServiceProfile>, String> {
        let profiles = self.profiles.lock().unwrap();
        Ok(profiles.get(market).cloned())
    }

    async fn service_profiles(&self) -> Result<Vec<ServiceProfile>, String> {
        let profiles = self.profiles.lock().unwrap();
        Ok(profiles.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mova_core::incentive::ModeRule;
    use mova_core::validation::TravelMode;
    use rust_decimal::Decimal;

    fn rule(market: &str, welcome: i64) -> IncentiveRule {
        let mut modes = HashMap::new();
        modes.insert(
            TravelMode::Biking,
            ModeRule { distance: 1.0, mean: 0.75, min: 0.25, max: 2.0, beta: 0.1 },
        );
        IncentiveRule {
            market: market.to_string(),
            d: 1.0,
            h: 1.0,
            d1: 1.0,
            d2: 5.0,
            l: Decimal::from(20),
            w: Decimal::from(welcome),
            mc: 0.5,
            modes,
        }
    }

    #[tokio::test]
    async fn publish_replaces_and_audits() {
        let repo = InMemoryIncentiveRepository::new();
        repo.publish_rule(rule("HCS", 1)).await.unwrap();
        repo.publish_rule(rule("HCS", 2)).await.unwrap();

        let active = repo.active_rule("HCS").await.unwrap().unwrap();
        assert_eq!(active.w, Decimal::from(2));
        let audit = repo.audit_log("HCS").await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].rule.w, Decimal::from(1));
    }

    #[tokio::test]
    async fn invalid_mode_rule_rejected() {
        let repo = InMemoryIncentiveRepository::new();
        let mut bad = rule("HCS", 1);
        bad.modes.get_mut(&TravelMode::Biking).unwrap().mean = 9.0;
        assert!(repo.publish_rule(bad).await.is_err());
    }
}

//! Local mirror of payment-provider subscriptions
//!
//! Only `active` and `trialing` grant premium. `past_due` stays live so it is
//! still shown to the user, but it does not unlock anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::tier::limits::{TierLimits, UserPermissions};

#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid subscription: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    Incomplete,
    IncompleteExpired,
    PastDue,
    Paused,
    Trialing,
    Unpaid,
}

impl SubscriptionStatus {
    pub fn grants_premium(&self) -> bool {
        match self {
            SubscriptionStatus::Active | SubscriptionStatus::Trialing => true,
            SubscriptionStatus::PastDue
            | SubscriptionStatus::Canceled
            | SubscriptionStatus::Incomplete
            | SubscriptionStatus::IncompleteExpired
            | SubscriptionStatus::Paused
            | SubscriptionStatus::Unpaid => false,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing | SubscriptionStatus::PastDue
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Unpaid => "unpaid",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub status: SubscriptionStatus,
    pub plan: Plan,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
}

/// The record shown to a user and whether it unlocks premium
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionResolution {
    pub record: Option<Subscription>,
    pub is_premium: bool,
}

/// Pick the most recent live subscription out of a user's rows. Rows ending
/// together are ordered by start date, then id.
pub fn resolve<'a>(rows: impl IntoIterator<Item = &'a Subscription>) -> SubscriptionResolution {
    let record = rows
        .into_iter()
        .filter(|s| s.status.is_live())
        .max_by(|a, b| {
            a.current_period_end
                .cmp(&b.current_period_end)
                .then_with(|| a.current_period_start.cmp(&b.current_period_start))
                .then_with(|| a.id.cmp(&b.id))
        })
        .cloned();
    let is_premium = record.as_ref().is_some_and(|s| s.status.grants_premium());

    SubscriptionResolution { record, is_premium }
}

/// Payload of the subscription status endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusResponse {
    pub status: String,
    pub is_premium: bool,
    pub daily_puzzles_used: u32,
    pub daily_puzzles_remaining: Option<u32>,
    pub can_solve_puzzle: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_authenticated: bool,
}

impl SubscriptionStatusResponse {
    /// Fixed free-tier payload for callers without a session
    pub fn unauthenticated(limits: &TierLimits) -> Self {
        Self {
            status: "free".to_string(),
            is_premium: false,
            daily_puzzles_used: 0,
            daily_puzzles_remaining: Some(limits.free_daily_lessons),
            can_solve_puzzle: true,
            expires_at: None,
            is_authenticated: false,
        }
    }

    pub fn for_user(resolution: &SubscriptionResolution, permissions: &UserPermissions) -> Self {
        Self {
            status: resolution
                .record
                .as_ref()
                .map_or("free", |s| s.status.as_str())
                .to_string(),
            is_premium: resolution.is_premium,
            daily_puzzles_used: permissions.lessons_completed_today,
            daily_puzzles_remaining: permissions.lessons_remaining_today,
            can_solve_puzzle: permissions.can_access_lesson,
            expires_at: resolution.record.as_ref().map(|s| s.current_period_end),
            is_authenticated: true,
        }
    }
}

/// Subscription mirror with file persistence
pub struct SubscriptionStore {
    data_dir: PathBuf,
    subscriptions: HashMap<String, Subscription>,
}

impl SubscriptionStore {
    const SUBSCRIPTIONS_FILE: &'static str = "subscriptions.json";

    pub fn new(data_dir: PathBuf) -> Result<Self, SubscriptionError> {
        let dir = data_dir.join("billing");
        fs::create_dir_all(&dir)?;

        let mut store = Self {
            data_dir: dir,
            subscriptions: HashMap::new(),
        };
        store.load()?;
        Ok(store)
    }

    fn subscriptions_file(&self) -> PathBuf {
        self.data_dir.join(Self::SUBSCRIPTIONS_FILE)
    }

    fn load(&mut self) -> Result<(), SubscriptionError> {
        let path = self.subscriptions_file();
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            self.subscriptions = serde_json::from_str(&content)?;
        }
        Ok(())
    }

    fn save(&self) -> Result<(), SubscriptionError> {
        let content = serde_json::to_string_pretty(&self.subscriptions)?;
        fs::write(self.subscriptions_file(), content)?;
        Ok(())
    }

    pub fn for_user(&self, user_id: &str) -> Vec<&Subscription> {
        self.subscriptions
            .values()
            .filter(|s| s.user_id == user_id)
            .collect()
    }

    /// No rows resolves to free defaults, never an error
    pub fn resolve_user(&self, user_id: &str) -> SubscriptionResolution {
        resolve(self.for_user(user_id))
    }

    pub fn upsert(&mut self, subscription: Subscription) -> Result<(), SubscriptionError> {
        if subscription.id.trim().is_empty() || subscription.user_id.trim().is_empty() {
            return Err(SubscriptionError::Invalid(
                "id and user_id are required".to_string(),
            ));
        }
        if subscription.current_period_end < subscription.current_period_start {
            return Err(SubscriptionError::Invalid(
                "current_period_end precedes current_period_start".to_string(),
            ));
        }

        let id = subscription.id.clone();
        let user_id = subscription.user_id.clone();
        let status = subscription.status;

        let previous = self.subscriptions.insert(id.clone(), subscription);
        if let Err(e) = self.save() {
            match previous {
                Some(row) => self.subscriptions.insert(id, row),
                None => self.subscriptions.remove(&id),
            };
            return Err(e);
        }

        tracing::info!(
            "Mirrored subscription {} for user {} ({})",
            id,
            user_id,
            status.as_str()
        );
        Ok(())
    }
}

/// Shared subscription store type
pub type SharedSubscriptionStore = Arc<RwLock<SubscriptionStore>>;

pub fn create_shared_store(data_dir: PathBuf) -> Result<SharedSubscriptionStore, SubscriptionError> {
    let store = SubscriptionStore::new(data_dir)?;
    Ok(Arc::new(RwLock::new(store)))
}

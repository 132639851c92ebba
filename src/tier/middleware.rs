//! Axum middleware for caller identity and lesson gating

use axum::{
    body::Body,
    extract::Request,
    http::{header::HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::limits::{LessonGate, Tier, TierLimits, UserPermissions};
use super::usage::{SharedUsageTracker, UsageSubject};
use crate::error::AppError;
use crate::subscription::SharedSubscriptionStore;

/// Set by the auth gateway in front of this service
const USER_HEADER: &str = "x-tactics-user";
const ROLE_HEADER: &str = "x-tactics-role";

/// Who is calling. No user id means an anonymous visitor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identity {
    pub user_id: Option<String>,
    pub is_admin: bool,
}

impl Identity {
    pub fn require_user(&self) -> Result<&str, AppError> {
        self.user_id.as_deref().ok_or(AppError::NotAuthenticated)
    }
}

pub fn extract_identity(headers: &HeaderMap) -> Identity {
    let user_id = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    let is_admin = user_id.is_some()
        && headers
            .get(ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|role| role.trim().eq_ignore_ascii_case("admin"));

    Identity { user_id, is_admin }
}

pub async fn identity_middleware(mut request: Request<Body>, next: Next) -> Response {
    let identity = extract_identity(request.headers());
    request.extensions_mut().insert(identity);
    next.run(request).await
}

pub async fn resolve_tier(identity: &Identity, subscriptions: &SharedSubscriptionStore) -> Tier {
    let has_premium = match &identity.user_id {
        Some(user_id) => subscriptions.read().await.resolve_user(user_id).is_premium,
        None => false,
    };
    Tier::resolve(identity.user_id.is_some(), identity.is_admin, has_premium)
}

#[derive(Debug, Serialize)]
pub struct TierErrorResponse {
    pub error: String,
    pub code: TierErrorCode,
    pub prompt: UpgradePrompt,
    pub action_url: String,
    pub permissions: UserPermissions,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TierErrorCode {
    LifetimeLimit,
    DailyLimit,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum UpgradePrompt {
    Signup,
    Premium,
}

impl TierErrorResponse {
    const SIGNUP_URL: &'static str = "/signup";
    const UPGRADE_URL: &'static str = "/pricing";

    pub fn from_denied(permissions: UserPermissions) -> Self {
        let limit = permissions.daily_lesson_limit.unwrap_or(0);
        let used = permissions.lessons_completed_today;

        // Unlimited tiers never end up here, but stay exhaustive
        let (error, code, prompt, action_url) = match permissions.tier {
            Tier::Anonymous => (
                format!("Free preview used up ({}/{}). Sign up to keep training", used, limit),
                TierErrorCode::LifetimeLimit,
                UpgradePrompt::Signup,
                Self::SIGNUP_URL,
            ),
            Tier::Free | Tier::Premium | Tier::Admin => (
                format!("Daily lesson limit reached ({}/{})", used, limit),
                TierErrorCode::DailyLimit,
                UpgradePrompt::Premium,
                Self::UPGRADE_URL,
            ),
        };

        Self {
            error,
            code,
            prompt,
            action_url: action_url.to_string(),
            permissions,
        }
    }
}

impl IntoResponse for TierErrorResponse {
    fn into_response(self) -> Response {
        (StatusCode::TOO_MANY_REQUESTS, Json(self)).into_response()
    }
}

/// Check the caller's lesson allowance and count the lesson when granted.
pub async fn check_lesson_limit(
    tier: Tier,
    subject: UsageSubject<'_>,
    usage: &SharedUsageTracker,
    limits: &TierLimits,
    now: DateTime<Utc>,
) -> Result<UserPermissions, AppError> {
    let mut tracker = usage.write().await;

    match tracker.start_lesson(tier, subject, limits, now)? {
        LessonGate::Granted(permissions) => Ok(permissions),
        LessonGate::Denied(permissions) => {
            tracing::warn!(
                "Lesson start denied for {} caller ({} used)",
                tier.as_str(),
                permissions.lessons_completed_today
            );
            Err(AppError::LimitReached(Box::new(
                TierErrorResponse::from_denied(permissions),
            )))
        }
    }
}

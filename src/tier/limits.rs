//! Tier limits and lesson entitlements
//!
//! Anonymous visitors get a lifetime allowance, free accounts a daily one,
//! premium and admin accounts are unlimited.

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Access class of the caller
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Anonymous,
    Free,
    Premium,
    Admin,
}

impl Tier {
    pub fn resolve(authenticated: bool, is_admin: bool, has_premium_subscription: bool) -> Self {
        match (authenticated, is_admin, has_premium_subscription) {
            (false, _, _) => Tier::Anonymous,
            (true, true, _) => Tier::Admin,
            (true, false, true) => Tier::Premium,
            (true, false, false) => Tier::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Anonymous => "anonymous",
            Tier::Free => "free",
            Tier::Premium => "premium",
            Tier::Admin => "admin",
        }
    }
}

/// Lesson allowances per tier, loaded from `limits.json` in the data dir
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TierLimits {
    /// Lessons an anonymous visitor may ever start
    pub anonymous_total_lessons: u32,
    /// Lessons a free account may start per day
    pub free_daily_lessons: u32,
    /// Hour (UTC) at which daily counters reset
    pub daily_reset_hour_utc: u32,
}

impl Default for TierLimits {
    fn default() -> Self {
        Self {
            anonymous_total_lessons: 2,
            free_daily_lessons: 2,
            daily_reset_hour_utc: 0,
        }
    }
}

impl TierLimits {
    const LIMITS_FILE: &'static str = "limits.json";

    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(Self::LIMITS_FILE);
        let limits = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            Self::default()
        };

        if limits.daily_reset_hour_utc > 23 {
            anyhow::bail!(
                "daily_reset_hour_utc must be within 0..=23, got {}",
                limits.daily_reset_hour_utc
            );
        }
        Ok(limits)
    }

    /// Lesson allowance for a tier, `None` when unlimited
    pub fn lesson_limit(&self, tier: Tier) -> Option<u32> {
        match tier {
            Tier::Anonymous => Some(self.anonymous_total_lessons),
            Tier::Free => Some(self.free_daily_lessons),
            Tier::Premium | Tier::Admin => None,
        }
    }

    fn reset_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.daily_reset_hour_utc, 0, 0).unwrap_or(NaiveTime::MIN)
    }

    /// The usage day `now` falls into. A usage day starts at the reset hour.
    pub fn usage_day(&self, now: DateTime<Utc>) -> NaiveDate {
        (now - Duration::hours(i64::from(self.daily_reset_hour_utc))).date_naive()
    }

    pub fn next_reset_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let next_day = self.usage_day(now) + Duration::days(1);
        next_day.and_time(self.reset_time()).and_utc()
    }
}

/// Lesson entitlements computed per request, never persisted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserPermissions {
    pub tier: Tier,
    /// Lifetime total for anonymous visitors, daily count for free accounts
    pub daily_lesson_limit: Option<u32>,
    pub lessons_completed_today: u32,
    pub lessons_remaining_today: Option<u32>,
    pub can_access_lesson: bool,
    pub should_prompt_signup: bool,
    pub should_prompt_premium: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<DateTime<Utc>>,
}

impl UserPermissions {
    pub fn evaluate(tier: Tier, lessons_used: u32, limits: &TierLimits, now: DateTime<Utc>) -> Self {
        let limit = limits.lesson_limit(tier);
        let remaining = limit.map(|l| l.saturating_sub(lessons_used));
        let exhausted = remaining == Some(0);

        let (should_prompt_signup, should_prompt_premium) = match tier {
            Tier::Anonymous => (exhausted, false),
            Tier::Free => (false, exhausted),
            Tier::Premium | Tier::Admin => (false, false),
        };
        let resets_at = match tier {
            Tier::Free => Some(limits.next_reset_at(now)),
            Tier::Anonymous | Tier::Premium | Tier::Admin => None,
        };

        Self {
            tier,
            daily_lesson_limit: limit,
            lessons_completed_today: lessons_used,
            lessons_remaining_today: remaining,
            can_access_lesson: remaining.is_none_or(|r| r > 0),
            should_prompt_signup,
            should_prompt_premium,
            resets_at,
        }
    }
}

/// Outcome of trying to start a lesson
#[derive(Debug, Clone, PartialEq)]
pub enum LessonGate {
    Granted(UserPermissions),
    Denied(UserPermissions),
}

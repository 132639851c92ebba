//! Usage tracking for lesson limits
//!
//! Anonymous visitors are counted per signed cookie token over their whole
//! lifetime, accounts per usage day. Checks and increments happen under a
//! single write lock so concurrent requests cannot both slip under the limit.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::limits::{LessonGate, Tier, TierLimits, UserPermissions};

/// Lessons started by an account during one usage day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyLessonCount {
    pub day: NaiveDate,
    pub lessons: u32,
}

/// Combined usage data
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UsageData {
    /// Lifetime lesson count per anonymous token
    pub anonymous: HashMap<String, u32>,
    /// Daily lesson count per user id
    pub daily: HashMap<String, DailyLessonCount>,
}

/// Whose counter a request touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageSubject<'a> {
    Anonymous(&'a str),
    User(&'a str),
}

/// Usage tracker with file persistence
pub struct UsageTracker {
    data_dir: PathBuf,
    data: UsageData,
}

impl UsageTracker {
    const USAGE_FILE: &'static str = "tier_usage.json";

    pub fn new(data_dir: PathBuf) -> Result<Self> {
        let tier_dir = data_dir.join("tier");
        fs::create_dir_all(&tier_dir)?;

        let mut tracker = Self {
            data_dir: tier_dir,
            data: UsageData::default(),
        };
        tracker.load()?;

        Ok(tracker)
    }

    fn usage_file(&self) -> PathBuf {
        self.data_dir.join(Self::USAGE_FILE)
    }

    fn load(&mut self) -> Result<()> {
        let path = self.usage_file();
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            self.data = serde_json::from_str(&content)?;
        }
        Ok(())
    }

    /// Persist `data` and only then make it the in-memory state, so a failed
    /// write leaves every counter untouched.
    fn commit(&mut self, data: UsageData) -> Result<()> {
        let content = serde_json::to_string_pretty(&data)?;
        fs::write(self.usage_file(), content)?;
        self.data = data;
        Ok(())
    }

    // ========== Anonymous (lifetime) ==========

    pub fn anonymous_count(&self, token: &str) -> u32 {
        self.data.anonymous.get(token).copied().unwrap_or(0)
    }

    pub fn increment_anonymous(&mut self, token: &str) -> Result<u32> {
        let mut data = self.data.clone();
        let count = data.anonymous.entry(token.to_string()).or_insert(0);
        *count += 1;
        let count = *count;
        self.commit(data)?;
        Ok(count)
    }

    // ========== Accounts (daily) ==========

    pub fn lessons_today(&self, user_id: &str, limits: &TierLimits, now: DateTime<Utc>) -> u32 {
        let today = limits.usage_day(now);
        self.data
            .daily
            .get(user_id)
            .filter(|c| c.day == today)
            .map_or(0, |c| c.lessons)
    }

    pub fn increment_daily(
        &mut self,
        user_id: &str,
        limits: &TierLimits,
        now: DateTime<Utc>,
    ) -> Result<u32> {
        let today = limits.usage_day(now);
        let mut data = self.data.clone();
        let entry = data
            .daily
            .entry(user_id.to_string())
            .or_insert(DailyLessonCount {
                day: today,
                lessons: 0,
            });
        if entry.day != today {
            entry.day = today;
            entry.lessons = 0;
        }
        entry.lessons += 1;
        let count = entry.lessons;
        self.commit(data)?;
        Ok(count)
    }

    // ========== Lessons ==========

    pub fn lessons_used(
        &self,
        subject: UsageSubject<'_>,
        limits: &TierLimits,
        now: DateTime<Utc>,
    ) -> u32 {
        match subject {
            UsageSubject::Anonymous(token) => self.anonymous_count(token),
            UsageSubject::User(user_id) => self.lessons_today(user_id, limits, now),
        }
    }

    pub fn permissions(
        &self,
        tier: Tier,
        subject: UsageSubject<'_>,
        limits: &TierLimits,
        now: DateTime<Utc>,
    ) -> UserPermissions {
        let used = self.lessons_used(subject, limits, now);
        UserPermissions::evaluate(tier, used, limits, now)
    }

    /// Check the allowance and, when granted, count the lesson exactly once.
    pub fn start_lesson(
        &mut self,
        tier: Tier,
        subject: UsageSubject<'_>,
        limits: &TierLimits,
        now: DateTime<Utc>,
    ) -> Result<LessonGate> {
        let before = self.permissions(tier, subject, limits, now);
        if !before.can_access_lesson {
            return Ok(LessonGate::Denied(before));
        }

        let used = match subject {
            UsageSubject::Anonymous(token) => self.increment_anonymous(token)?,
            UsageSubject::User(user_id) => self.increment_daily(user_id, limits, now)?,
        };
        Ok(LessonGate::Granted(UserPermissions::evaluate(
            tier, used, limits, now,
        )))
    }
}

/// Shared usage tracker type
pub type SharedUsageTracker = Arc<RwLock<UsageTracker>>;

pub fn create_shared_tracker(data_dir: PathBuf) -> Result<SharedUsageTracker> {
    let tracker = UsageTracker::new(data_dir)?;
    Ok(Arc::new(RwLock::new(tracker)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_usage_tracker_creation() {
        let dir = tempdir().unwrap();
        let tracker = UsageTracker::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(tracker.anonymous_count("t1"), 0);
        assert_eq!(
            tracker.lessons_today("u1", &TierLimits::default(), at(1, 9)),
            0
        );
    }

    #[test]
    fn test_anonymous_limit_after_two_lessons() {
        let dir = tempdir().unwrap();
        let mut tracker = UsageTracker::new(dir.path().to_path_buf()).unwrap();
        let limits = TierLimits::default();
        let subject = UsageSubject::Anonymous("token");

        for _ in 0..2 {
            let gate = tracker
                .start_lesson(Tier::Anonymous, subject, &limits, at(1, 9))
                .unwrap();
            assert!(matches!(gate, LessonGate::Granted(_)));
        }

        // A new day does not help anonymous visitors
        let gate = tracker
            .start_lesson(Tier::Anonymous, subject, &limits, at(5, 9))
            .unwrap();
        match gate {
            LessonGate::Denied(p) => {
                assert!(p.should_prompt_signup);
                assert!(!p.can_access_lesson);
            }
            LessonGate::Granted(_) => panic!("Expected denial"),
        }
        assert_eq!(tracker.anonymous_count("token"), 2);
    }

    #[test]
    fn test_free_limit_resets_at_boundary() {
        let dir = tempdir().unwrap();
        let mut tracker = UsageTracker::new(dir.path().to_path_buf()).unwrap();
        let limits = TierLimits::default();
        let subject = UsageSubject::User("u1");

        tracker
            .start_lesson(Tier::Free, subject, &limits, at(1, 9))
            .unwrap();
        let gate = tracker
            .start_lesson(Tier::Free, subject, &limits, at(1, 10))
            .unwrap();
        if let LessonGate::Granted(p) = gate {
            assert_eq!(p.lessons_remaining_today, Some(0));
        } else {
            panic!("Expected second lesson to be granted");
        }

        let gate = tracker
            .start_lesson(Tier::Free, subject, &limits, at(1, 23))
            .unwrap();
        assert!(matches!(gate, LessonGate::Denied(ref p) if p.should_prompt_premium));

        let next_day = tracker.permissions(Tier::Free, subject, &limits, at(2, 0));
        assert_eq!(next_day.lessons_remaining_today, Some(2));
        assert!(next_day.can_access_lesson);
    }

    #[test]
    fn test_premium_counts_without_limit() {
        let dir = tempdir().unwrap();
        let mut tracker = UsageTracker::new(dir.path().to_path_buf()).unwrap();
        let limits = TierLimits::default();

        for _ in 0..5 {
            let gate = tracker
                .start_lesson(Tier::Premium, UsageSubject::User("u1"), &limits, at(1, 9))
                .unwrap();
            assert!(matches!(gate, LessonGate::Granted(_)));
        }
        assert_eq!(tracker.lessons_today("u1", &limits, at(1, 9)), 5);
    }

    #[test]
    fn test_usage_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().to_path_buf();
        let limits = TierLimits::default();

        {
            let mut tracker = UsageTracker::new(path.clone()).unwrap();
            tracker.increment_anonymous("t").unwrap();
            tracker.increment_daily("u1", &limits, at(1, 9)).unwrap();
        }

        {
            let tracker = UsageTracker::new(path).unwrap();
            assert_eq!(tracker.anonymous_count("t"), 1);
            assert_eq!(tracker.lessons_today("u1", &limits, at(1, 20)), 1);
        }
    }

    #[test]
    fn test_failed_write_does_not_consume_allowance() {
        let dir = tempdir().unwrap();
        let mut tracker = UsageTracker::new(dir.path().to_path_buf()).unwrap();
        let limits = TierLimits::default();

        // A directory where the usage file should be makes every write fail
        fs::create_dir(dir.path().join("tier").join("tier_usage.json")).unwrap();

        let result = tracker.start_lesson(Tier::Free, UsageSubject::User("u1"), &limits, at(1, 9));
        assert!(result.is_err());
        assert_eq!(tracker.lessons_today("u1", &limits, at(1, 9)), 0);

        let result = tracker.start_lesson(
            Tier::Anonymous,
            UsageSubject::Anonymous("token"),
            &limits,
            at(1, 9),
        );
        assert!(result.is_err());
        assert_eq!(tracker.anonymous_count("token"), 0);
    }

    #[tokio::test]
    async fn test_concurrent_starts_never_exceed_limit() {
        let dir = tempdir().unwrap();
        let shared = create_shared_tracker(dir.path().to_path_buf()).unwrap();
        let limits = TierLimits::default();
        let now = at(1, 9);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let shared = shared.clone();
            let limits = limits.clone();
            handles.push(tokio::spawn(async move {
                let mut tracker = shared.write().await;
                tracker
                    .start_lesson(Tier::Free, UsageSubject::User("u1"), &limits, now)
                    .unwrap()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), LessonGate::Granted(_)) {
                granted += 1;
            }
        }
        assert_eq!(granted, 2);
    }
}

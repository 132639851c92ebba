use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreakData {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_active_date: Option<NaiveDate>,
    pub streak_start_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StreakSummary {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_active_date: Option<NaiveDate>,
    pub active_today: bool,
}

impl StreakData {
    pub fn record_activity(&mut self, day: NaiveDate) {
        match self.last_active_date {
            None => {
                self.current_streak = 1;
                self.streak_start_date = Some(day);
            }
            Some(last) => {
                let diff = day.signed_duration_since(last).num_days();
                if diff <= 0 {
                    return;
                }
                if diff == 1 {
                    self.current_streak += 1;
                } else {
                    self.current_streak = 1;
                    self.streak_start_date = Some(day);
                }
            }
        }

        self.last_active_date = Some(day);
        self.longest_streak = self.longest_streak.max(self.current_streak);
    }

    /// Streak as seen on `today`: a streak lapses once a full day is missed.
    pub fn effective_streak(&self, today: NaiveDate) -> u32 {
        match self.last_active_date {
            Some(last) if today.signed_duration_since(last).num_days() <= 1 => {
                self.current_streak
            }
            _ => 0,
        }
    }

    pub fn summary(&self, today: NaiveDate) -> StreakSummary {
        StreakSummary {
            current_streak: self.effective_streak(today),
            longest_streak: self.longest_streak,
            last_active_date: self.last_active_date,
            active_today: self.last_active_date == Some(today),
        }
    }
}

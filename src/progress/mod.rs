//! Per-user progress through the curriculum
//!
//! Tracks completed themes per lesson, solved puzzle counts per theme and the
//! puzzles solved in the current review cycle. A missing record always means
//! "not started".

pub mod streak;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::curriculum::{Curriculum, LessonStatus};
pub use streak::{StreakData, StreakSummary};

#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Theme not found: {0}")]
    UnknownTheme(String),
    #[error("Puzzle {puzzle} not found in theme {theme}")]
    UnknownPuzzle { theme: String, puzzle: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub lesson_id: String,
    pub status: LessonStatus,
    pub themes_completed: BTreeSet<String>,
}

impl UserProgress {
    fn new(lesson_id: &str) -> Self {
        Self {
            lesson_id: lesson_id.to_string(),
            status: LessonStatus::InProgress,
            themes_completed: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ThemeProgress {
    pub theme_id: String,
    pub completed: bool,
    pub puzzles_solved: u32,
    pub total_puzzles: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct UserRecords {
    lessons: HashMap<String, UserProgress>,
    themes: HashMap<String, ThemeProgress>,
    /// Every puzzle ever solved, per theme
    solved: HashMap<String, BTreeSet<String>>,
    /// Puzzles solved since the theme's review cycle was last reset
    review_cycle: HashMap<String, BTreeSet<String>>,
    streak: StreakData,
}

/// Progress store with file persistence
pub struct ProgressStore {
    data_dir: PathBuf,
    users: HashMap<String, UserRecords>,
}

impl ProgressStore {
    const PROGRESS_FILE: &'static str = "progress.json";

    pub fn new(data_dir: PathBuf) -> Result<Self, ProgressError> {
        let progress_dir = data_dir.join("progress");
        fs::create_dir_all(&progress_dir)?;

        let mut store = Self {
            data_dir: progress_dir,
            users: HashMap::new(),
        };
        store.load()?;
        Ok(store)
    }

    fn progress_file(&self) -> PathBuf {
        self.data_dir.join(Self::PROGRESS_FILE)
    }

    fn load(&mut self) -> Result<(), ProgressError> {
        let path = self.progress_file();
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            self.users = serde_json::from_str(&content)?;
        }
        Ok(())
    }

    fn save(&self) -> Result<(), ProgressError> {
        let content = serde_json::to_string_pretty(&self.users)?;
        fs::write(self.progress_file(), content)?;
        Ok(())
    }

    /// Replace a user's records and persist. When the write fails the
    /// previous records are put back.
    fn commit_user(&mut self, user_id: &str, records: UserRecords) -> Result<(), ProgressError> {
        let previous = self.users.insert(user_id.to_string(), records);
        if let Err(e) = self.save() {
            match previous {
                Some(records) => self.users.insert(user_id.to_string(), records),
                None => self.users.remove(user_id),
            };
            return Err(e);
        }
        Ok(())
    }

    pub fn lessons_for(&self, user_id: &str) -> HashMap<String, UserProgress> {
        self.users
            .get(user_id)
            .map(|u| u.lessons.clone())
            .unwrap_or_default()
    }

    pub fn lesson_progress(&self, user_id: &str, lesson_id: &str) -> Option<&UserProgress> {
        self.users.get(user_id)?.lessons.get(lesson_id)
    }

    pub fn theme_progress(&self, user_id: &str, theme_id: &str) -> Option<&ThemeProgress> {
        self.users.get(user_id)?.themes.get(theme_id)
    }

    pub fn solved_in_cycle(&self, user_id: &str, theme_id: &str) -> HashSet<String> {
        self.users
            .get(user_id)
            .and_then(|u| u.review_cycle.get(theme_id))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn streak(&self, user_id: &str, now: DateTime<Utc>) -> StreakSummary {
        self.users
            .get(user_id)
            .map(|u| u.streak.clone())
            .unwrap_or_default()
            .summary(now.date_naive())
    }

    pub fn record_puzzle_solved(
        &mut self,
        curriculum: &Curriculum,
        user_id: &str,
        theme_id: &str,
        puzzle_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ThemeProgress, ProgressError> {
        let theme = curriculum
            .theme(theme_id)
            .ok_or_else(|| ProgressError::UnknownTheme(theme_id.to_string()))?;
        if !theme.puzzles.iter().any(|p| p.id == puzzle_id) {
            return Err(ProgressError::UnknownPuzzle {
                theme: theme_id.to_string(),
                puzzle: puzzle_id.to_string(),
            });
        }

        let mut user = self.users.get(user_id).cloned().unwrap_or_default();

        let first_solve = user
            .solved
            .entry(theme_id.to_string())
            .or_default()
            .insert(puzzle_id.to_string());
        user.review_cycle
            .entry(theme_id.to_string())
            .or_default()
            .insert(puzzle_id.to_string());

        let progress = user
            .themes
            .entry(theme_id.to_string())
            .or_insert_with(|| ThemeProgress {
                theme_id: theme_id.to_string(),
                completed: false,
                puzzles_solved: 0,
                total_puzzles: 0,
            });
        progress.total_puzzles = theme.puzzles.len() as u32;
        if first_solve {
            progress.puzzles_solved += 1;
        }
        let progress = progress.clone();

        user.lessons
            .entry(theme.lesson_id.clone())
            .or_insert_with(|| UserProgress::new(&theme.lesson_id));
        user.streak.record_activity(now.date_naive());

        self.commit_user(user_id, user)?;
        Ok(progress)
    }

    /// Mark a theme completed. The lesson becomes completed once all of its
    /// themes are. Completing an already completed theme changes nothing.
    pub fn complete_theme(
        &mut self,
        curriculum: &Curriculum,
        user_id: &str,
        theme_id: &str,
        now: DateTime<Utc>,
    ) -> Result<UserProgress, ProgressError> {
        let theme = curriculum
            .theme(theme_id)
            .ok_or_else(|| ProgressError::UnknownTheme(theme_id.to_string()))?;
        let lesson = curriculum
            .lesson_for_theme(theme_id)
            .ok_or_else(|| ProgressError::UnknownTheme(theme_id.to_string()))?;

        let mut user = self.users.get(user_id).cloned().unwrap_or_default();

        let theme_progress = user
            .themes
            .entry(theme_id.to_string())
            .or_insert_with(|| ThemeProgress {
                theme_id: theme_id.to_string(),
                completed: false,
                puzzles_solved: 0,
                total_puzzles: 0,
            });
        theme_progress.completed = true;
        theme_progress.total_puzzles = theme.puzzles.len() as u32;

        let lesson_progress = user
            .lessons
            .entry(lesson.id.clone())
            .or_insert_with(|| UserProgress::new(&lesson.id));
        lesson_progress.themes_completed.insert(theme_id.to_string());
        lesson_progress.status = if lesson
            .themes
            .iter()
            .all(|t| lesson_progress.themes_completed.contains(&t.id))
        {
            LessonStatus::Completed
        } else {
            LessonStatus::InProgress
        };
        let result = lesson_progress.clone();

        user.streak.record_activity(now.date_naive());

        self.commit_user(user_id, user)?;
        tracing::info!(
            "User {} completed theme {} ({:?})",
            user_id,
            theme_id,
            result.status
        );
        Ok(result)
    }

    pub fn reset_review_cycle(&mut self, user_id: &str, theme_id: &str) -> Result<(), ProgressError> {
        let Some(user) = self.users.get(user_id) else {
            return Ok(());
        };
        if !user.review_cycle.contains_key(theme_id) {
            return Ok(());
        }

        let mut user = user.clone();
        user.review_cycle.remove(theme_id);
        self.commit_user(user_id, user)
    }
}

/// Shared progress store type
pub type SharedProgressStore = Arc<RwLock<ProgressStore>>;

pub fn create_shared_store(data_dir: PathBuf) -> Result<SharedProgressStore, ProgressError> {
    let store = ProgressStore::new(data_dir)?;
    Ok(Arc::new(RwLock::new(store)))
}

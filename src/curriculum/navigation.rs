//! Lesson tree view model
//!
//! Derives the status of every lesson from the static curriculum and a user's
//! progress records. Nothing here is persisted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::Curriculum;
use crate::progress::UserProgress;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    #[default]
    Locked,
    Available,
    InProgress,
    Completed,
}

/// Horizontal placement of a lesson node on the path. Purely cosmetic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LayoutPosition {
    Left,
    Center,
    Right,
}

impl LayoutPosition {
    pub fn for_index(index: usize) -> Self {
        match index % 4 {
            0 => LayoutPosition::Left,
            1 | 3 => LayoutPosition::Center,
            _ => LayoutPosition::Right,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LessonNode {
    pub lesson_id: String,
    pub name: String,
    pub level: u32,
    pub status: LessonStatus,
    pub completion_percent: u8,
    pub layout_position: LayoutPosition,
    pub themes_completed: usize,
    pub total_themes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TreeView {
    pub lessons: Vec<LessonNode>,
    /// First lesson in global order that is in progress or available
    pub current_lesson_id: Option<String>,
}

/// Build the lesson tree for a user, optionally restricted to one level.
///
/// Availability always follows the global lesson order, so the first lesson
/// of a level stays locked until the last lesson of the previous level is done.
pub fn build_tree(
    curriculum: &Curriculum,
    progress: &HashMap<String, UserProgress>,
    level: Option<u32>,
) -> TreeView {
    let mut lessons = Vec::with_capacity(curriculum.lesson_count());
    let mut current_lesson_id = None;
    let mut previous_completed = true;

    for entry in curriculum.lessons() {
        let lesson = entry.lesson;
        let total_themes = lesson.themes.len();
        let themes_completed = progress.get(&lesson.id).map_or(0, |p| {
            lesson
                .themes
                .iter()
                .filter(|t| p.themes_completed.contains(&t.id))
                .count()
        });

        let status = if total_themes > 0 && themes_completed == total_themes {
            LessonStatus::Completed
        } else if themes_completed > 0 {
            LessonStatus::InProgress
        } else if previous_completed {
            LessonStatus::Available
        } else {
            LessonStatus::Locked
        };
        previous_completed = status == LessonStatus::Completed;

        if current_lesson_id.is_none()
            && matches!(status, LessonStatus::InProgress | LessonStatus::Available)
        {
            current_lesson_id = Some(lesson.id.clone());
        }

        if level.is_some_and(|l| l != entry.level) {
            continue;
        }

        let completion_percent = if total_themes == 0 {
            0
        } else {
            (themes_completed * 100 / total_themes) as u8
        };

        lessons.push(LessonNode {
            lesson_id: lesson.id.clone(),
            name: lesson.name.clone(),
            level: entry.level,
            status,
            completion_percent,
            layout_position: LayoutPosition::for_index(entry.position),
            themes_completed,
            total_themes,
        });
    }

    TreeView {
        lessons,
        current_lesson_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::fixtures::{curriculum, lesson};

    fn progress_with(lesson_id: &str, themes: &[&str]) -> UserProgress {
        UserProgress {
            lesson_id: lesson_id.to_string(),
            status: LessonStatus::InProgress,
            themes_completed: themes.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn status_of(tree: &TreeView, lesson_id: &str) -> LessonStatus {
        tree.lessons
            .iter()
            .find(|n| n.lesson_id == lesson_id)
            .map(|n| n.status)
            .unwrap()
    }

    #[test]
    fn test_first_lesson_available_without_progress() {
        let curriculum = curriculum(vec![lesson("1.1", 1, 2), lesson("1.2", 2, 2)]);
        let tree = build_tree(&curriculum, &HashMap::new(), None);

        assert_eq!(status_of(&tree, "1.1"), LessonStatus::Available);
        assert_eq!(status_of(&tree, "1.2"), LessonStatus::Locked);
        assert_eq!(tree.current_lesson_id.as_deref(), Some("1.1"));
    }

    #[test]
    fn test_lesson_status_from_themes() {
        let curriculum = curriculum(vec![
            lesson("1.1", 1, 2),
            lesson("1.2", 2, 2),
            lesson("1.3", 3, 2),
        ]);
        let mut progress = HashMap::new();
        progress.insert("1.1".to_string(), progress_with("1.1", &["1.1.1", "1.1.2"]));
        progress.insert("1.2".to_string(), progress_with("1.2", &["1.2.1"]));

        let tree = build_tree(&curriculum, &progress, None);

        assert_eq!(status_of(&tree, "1.1"), LessonStatus::Completed);
        assert_eq!(status_of(&tree, "1.2"), LessonStatus::InProgress);
        assert_eq!(status_of(&tree, "1.3"), LessonStatus::Locked);
        assert_eq!(tree.lessons[1].completion_percent, 50);
        assert_eq!(tree.current_lesson_id.as_deref(), Some("1.2"));
    }

    #[test]
    fn test_completed_lesson_unlocks_next() {
        let curriculum = curriculum(vec![lesson("1.1", 1, 1), lesson("1.2", 2, 1)]);
        let mut progress = HashMap::new();
        progress.insert("1.1".to_string(), progress_with("1.1", &["1.1.1"]));

        let tree = build_tree(&curriculum, &progress, None);

        assert_eq!(status_of(&tree, "1.2"), LessonStatus::Available);
        assert_eq!(tree.lessons[0].completion_percent, 100);
    }

    #[test]
    fn test_unknown_theme_ids_ignored() {
        let curriculum = curriculum(vec![lesson("1.1", 1, 1)]);
        let mut progress = HashMap::new();
        progress.insert("1.1".to_string(), progress_with("1.1", &["9.9.9"]));

        let tree = build_tree(&curriculum, &progress, None);
        assert_eq!(status_of(&tree, "1.1"), LessonStatus::Available);
    }

    #[test]
    fn test_tree_is_idempotent() {
        let curriculum = curriculum(vec![lesson("1.1", 1, 2), lesson("1.2", 2, 2)]);
        let mut progress = HashMap::new();
        progress.insert("1.1".to_string(), progress_with("1.1", &["1.1.2"]));

        let first = build_tree(&curriculum, &progress, None);
        let second = build_tree(&curriculum, &progress, None);
        assert_eq!(first, second);
    }

    #[test]
    fn test_layout_cycles_every_four() {
        let positions: Vec<_> = (0..8).map(LayoutPosition::for_index).collect();
        assert_eq!(positions[0..4], positions[4..8]);
        assert_eq!(positions[0], LayoutPosition::Left);
        assert_eq!(positions[2], LayoutPosition::Right);
    }

    #[test]
    fn test_level_filter_keeps_global_order() {
        let curriculum = crate::curriculum::Curriculum::builtin().unwrap();
        let tree = build_tree(&curriculum, &HashMap::new(), Some(2));

        assert!(tree.lessons.iter().all(|n| n.level == 2));
        assert!(tree
            .lessons
            .iter()
            .all(|n| n.status == LessonStatus::Locked));
        assert_eq!(tree.current_lesson_id.as_deref(), Some("1.1"));
    }
}

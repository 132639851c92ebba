use serde::{Deserialize, Serialize};

use crate::curriculum::{LevelSummary, Puzzle, Selection};
use crate::tier::UserPermissions;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumResponse {
    pub version: String,
    pub levels: Vec<LevelSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PuzzleQuery {
    pub count: Option<usize>,
}

impl PuzzleQuery {
    pub const DEFAULT_COUNT: usize = 10;

    /// Requested count. Zero is rejected by the caller; anything above the
    /// pool size just returns the whole pool.
    pub fn count(&self) -> usize {
        self.count.unwrap_or(Self::DEFAULT_COUNT)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionResponse<'a> {
    pub puzzles: Vec<&'a Puzzle>,
    pub requested: usize,
    /// Already solved puzzles were reused because fresh ones ran out
    pub relaxed: bool,
}

impl<'a> SelectionResponse<'a> {
    pub fn new(selection: Selection<'a>, requested: usize) -> Self {
        Self {
            puzzles: selection.puzzles,
            requested,
            relaxed: selection.relaxed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixedPracticeRequest {
    pub theme_ids: Vec<String>,
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PuzzleSolvedRequest {
    pub theme_id: String,
    pub puzzle_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThemeRequest {
    pub theme_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonStartResponse {
    pub lesson_id: String,
    pub permissions: UserPermissions,
}

//! Static curriculum for the tactics trainer
//!
//! Levels hold blocks, blocks hold sections, sections hold lessons. Each lesson
//! is split into themes and every theme owns a pool of puzzles. The content is
//! loaded once at startup and never mutated afterwards.

pub mod navigation;
pub mod selector;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

pub use navigation::{build_tree, LessonStatus};
pub use selector::{interleave_themes, select_puzzles, Selection};

const BUILTIN_CURRICULUM: &str = include_str!("builtin.json");

#[derive(Error, Debug)]
pub enum CurriculumError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid curriculum: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlayerColor {
    White,
    Black,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Puzzle {
    pub id: String,
    pub theme_id: String,
    /// Board position in FEN notation
    pub fen: String,
    /// Moves in UCI notation, starting with the player's move
    pub solution: Vec<String>,
    pub player_color: PlayerColor,
    /// Difficulty rating, higher is harder
    pub rating: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Puzzle {
    pub fn first_move(&self) -> Option<&str> {
        self.solution.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    pub id: String,
    pub lesson_id: String,
    pub name: String,
    pub order: u32,
    #[serde(default)]
    pub puzzles: Vec<Puzzle>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub name: String,
    pub order: u32,
    pub themes: Vec<Theme>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Level {
    pub level: u32,
    pub name: String,
    pub blocks: Vec<Block>,
}

impl Level {
    pub fn lessons(&self) -> impl Iterator<Item = &Lesson> {
        self.blocks
            .iter()
            .flat_map(|b| b.sections.iter())
            .flat_map(|s| s.lessons.iter())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurriculumData {
    pub version: String,
    pub levels: Vec<Level>,
}

/// Summary of a level for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelSummary {
    pub level: u32,
    pub name: String,
    pub lesson_count: usize,
    pub puzzle_count: usize,
}

#[derive(Debug, Clone, Copy)]
struct LessonPosition {
    level: usize,
    block: usize,
    section: usize,
    lesson: usize,
}

/// A lesson together with its place in the global ordering
#[derive(Debug, Clone, Copy)]
pub struct LessonRef<'a> {
    pub level: u32,
    pub position: usize,
    pub lesson: &'a Lesson,
}

/// Validated, immutable curriculum with lookup indices
#[derive(Debug)]
pub struct Curriculum {
    data: CurriculumData,
    ordered: Vec<LessonPosition>,
    lesson_index: HashMap<String, usize>,
    theme_index: HashMap<String, (usize, usize)>,
}

fn lesson_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+\.\d+$").expect("valid lesson id pattern"))
}

fn theme_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d+\.\d+\.\d+$").expect("valid theme id pattern"))
}

impl Curriculum {
    pub fn builtin() -> Result<Self, CurriculumError> {
        Self::from_json(BUILTIN_CURRICULUM)
    }

    pub fn load(path: &Path) -> Result<Self, CurriculumError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, CurriculumError> {
        let data: CurriculumData = serde_json::from_str(content)?;
        Self::new(data)
    }

    pub fn new(mut data: CurriculumData) -> Result<Self, CurriculumError> {
        data.levels.sort_by_key(|l| l.level);
        for level in &mut data.levels {
            for block in &mut level.blocks {
                for section in &mut block.sections {
                    section.lessons.sort_by_key(|l| l.order);
                    for lesson in &mut section.lessons {
                        lesson.themes.sort_by_key(|t| t.order);
                    }
                }
            }
        }

        validate(&data)?;

        let mut ordered = Vec::new();
        let mut lesson_index = HashMap::new();
        let mut theme_index = HashMap::new();

        for (li, level) in data.levels.iter().enumerate() {
            for (bi, block) in level.blocks.iter().enumerate() {
                for (si, section) in block.sections.iter().enumerate() {
                    for (ni, lesson) in section.lessons.iter().enumerate() {
                        let position = ordered.len();
                        ordered.push(LessonPosition {
                            level: li,
                            block: bi,
                            section: si,
                            lesson: ni,
                        });
                        lesson_index.insert(lesson.id.clone(), position);
                        for (ti, theme) in lesson.themes.iter().enumerate() {
                            theme_index.insert(theme.id.clone(), (position, ti));
                        }
                    }
                }
            }
        }

        Ok(Self {
            data,
            ordered,
            lesson_index,
            theme_index,
        })
    }

    pub fn version(&self) -> &str {
        &self.data.version
    }

    pub fn level(&self, level: u32) -> Option<&Level> {
        self.data.levels.iter().find(|l| l.level == level)
    }

    pub fn level_summaries(&self) -> Vec<LevelSummary> {
        self.data
            .levels
            .iter()
            .map(|level| LevelSummary {
                level: level.level,
                name: level.name.clone(),
                lesson_count: level.lessons().count(),
                puzzle_count: level
                    .lessons()
                    .flat_map(|l| l.themes.iter())
                    .map(|t| t.puzzles.len())
                    .sum(),
            })
            .collect()
    }

    pub fn lesson_count(&self) -> usize {
        self.ordered.len()
    }

    fn resolve(&self, position: usize) -> Option<LessonRef<'_>> {
        let pos = self.ordered.get(position)?;
        let level = self.data.levels.get(pos.level)?;
        let lesson = level
            .blocks
            .get(pos.block)?
            .sections
            .get(pos.section)?
            .lessons
            .get(pos.lesson)?;
        Some(LessonRef {
            level: level.level,
            position,
            lesson,
        })
    }

    /// All lessons in global order
    pub fn lessons(&self) -> impl Iterator<Item = LessonRef<'_>> {
        (0..self.ordered.len()).filter_map(|i| self.resolve(i))
    }

    pub fn lesson(&self, lesson_id: &str) -> Option<LessonRef<'_>> {
        self.lesson_index
            .get(lesson_id)
            .and_then(|&i| self.resolve(i))
    }

    pub fn theme(&self, theme_id: &str) -> Option<&Theme> {
        let &(position, ti) = self.theme_index.get(theme_id)?;
        self.resolve(position)?.lesson.themes.get(ti)
    }

    pub fn lesson_for_theme(&self, theme_id: &str) -> Option<&Lesson> {
        let &(position, _) = self.theme_index.get(theme_id)?;
        self.resolve(position).map(|r| r.lesson)
    }
}

fn invalid(msg: impl Into<String>) -> CurriculumError {
    CurriculumError::Invalid(msg.into())
}

fn validate(data: &CurriculumData) -> Result<(), CurriculumError> {
    let mut levels = HashSet::new();
    let mut ids = HashSet::new();

    for level in &data.levels {
        if level.level < 1 {
            return Err(invalid("level numbers start at 1"));
        }
        if !levels.insert(level.level) {
            return Err(invalid(format!("duplicate level {}", level.level)));
        }

        for lesson in level.lessons() {
            if !lesson_id_pattern().is_match(&lesson.id) {
                return Err(invalid(format!("malformed lesson id '{}'", lesson.id)));
            }
            if !ids.insert(lesson.id.clone()) {
                return Err(invalid(format!("duplicate id '{}'", lesson.id)));
            }
            if lesson.themes.is_empty() {
                return Err(invalid(format!("lesson {} has no themes", lesson.id)));
            }

            for (i, theme) in lesson.themes.iter().enumerate() {
                validate_theme(lesson, theme, i, &mut ids)?;
            }
        }
    }

    Ok(())
}

fn validate_theme(
    lesson: &Lesson,
    theme: &Theme,
    index: usize,
    ids: &mut HashSet<String>,
) -> Result<(), CurriculumError> {
    if !theme_id_pattern().is_match(&theme.id) {
        return Err(invalid(format!("malformed theme id '{}'", theme.id)));
    }
    if !theme.id.starts_with(&format!("{}.", lesson.id)) || theme.lesson_id != lesson.id {
        return Err(invalid(format!(
            "theme {} does not belong to lesson {}",
            theme.id, lesson.id
        )));
    }
    // Themes are already sorted, so contiguous orders match their index
    if theme.order as usize != index + 1 {
        return Err(invalid(format!(
            "theme orders in lesson {} must be contiguous from 1",
            lesson.id
        )));
    }
    if !ids.insert(theme.id.clone()) {
        return Err(invalid(format!("duplicate id '{}'", theme.id)));
    }

    for puzzle in &theme.puzzles {
        if puzzle.theme_id != theme.id {
            return Err(invalid(format!(
                "puzzle {} does not belong to theme {}",
                puzzle.id, theme.id
            )));
        }
        if puzzle.solution.is_empty() {
            return Err(invalid(format!("puzzle {} has no solution", puzzle.id)));
        }
        if puzzle.fen.split_whitespace().count() != 6 {
            return Err(invalid(format!("puzzle {} has a malformed FEN", puzzle.id)));
        }
        if !ids.insert(puzzle.id.clone()) {
            return Err(invalid(format!("duplicate id '{}'", puzzle.id)));
        }
    }

    Ok(())
}

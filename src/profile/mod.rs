//! Player profile: self-reported ELO rating and onboarding state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

pub const MIN_RATING: u32 = 400;
pub const MAX_RATING: u32 = 2000;

#[derive(Error, Debug, PartialEq)]
pub enum RatingError {
    #[error("elo_rating is required")]
    Missing,
    #[error("elo_rating must be a number")]
    NotANumber,
    #[error("elo_rating must be a whole number, got {0}")]
    NotAnInteger(f64),
    #[error("elo_rating must be between 400 and 2000, got {0}")]
    OutOfRange(f64),
}

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Rating(#[from] RatingError),
}

/// Body of a rating update. The rating stays an untyped JSON value so that
/// strings and fractions are reported as validation errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingUpdateRequest {
    #[serde(default)]
    pub elo_rating: Option<serde_json::Value>,
    #[serde(default)]
    pub onboarding_completed: Option<bool>,
}

pub fn validate_rating(value: Option<&serde_json::Value>) -> Result<u32, RatingError> {
    let number = value
        .ok_or(RatingError::Missing)?
        .as_f64()
        .ok_or(RatingError::NotANumber)?;

    if number.fract() != 0.0 {
        return Err(RatingError::NotAnInteger(number));
    }
    if number < f64::from(MIN_RATING) || number > f64::from(MAX_RATING) {
        return Err(RatingError::OutOfRange(number));
    }
    Ok(number as u32)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub elo_rating: u32,
    pub onboarding_completed: bool,
    pub updated_at: DateTime<Utc>,
}

/// Profile store with file persistence
pub struct ProfileStore {
    data_dir: PathBuf,
    profiles: HashMap<String, UserProfile>,
}

impl ProfileStore {
    const PROFILES_FILE: &'static str = "profiles.json";

    pub fn new(data_dir: PathBuf) -> Result<Self, ProfileError> {
        let dir = data_dir.join("profiles");
        fs::create_dir_all(&dir)?;

        let mut store = Self {
            data_dir: dir,
            profiles: HashMap::new(),
        };
        let path = store.profiles_file();
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            store.profiles = serde_json::from_str(&content)?;
        }
        Ok(store)
    }

    fn profiles_file(&self) -> PathBuf {
        self.data_dir.join(Self::PROFILES_FILE)
    }

    fn save(&self) -> Result<(), ProfileError> {
        let content = serde_json::to_string_pretty(&self.profiles)?;
        fs::write(self.profiles_file(), content)?;
        Ok(())
    }

    pub fn get(&self, user_id: &str) -> Option<&UserProfile> {
        self.profiles.get(user_id)
    }

    /// Validates before touching anything, so a rejected update leaves the
    /// stored profile as it was. A failed write is rolled back the same way.
    pub fn update_rating(
        &mut self,
        user_id: &str,
        request: &RatingUpdateRequest,
        now: DateTime<Utc>,
    ) -> Result<UserProfile, ProfileError> {
        let rating = validate_rating(request.elo_rating.as_ref())?;

        let mut profile = self
            .profiles
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| UserProfile {
                user_id: user_id.to_string(),
                elo_rating: rating,
                onboarding_completed: false,
                updated_at: now,
            });
        profile.elo_rating = rating;
        if let Some(done) = request.onboarding_completed {
            profile.onboarding_completed = done;
        }
        profile.updated_at = now;

        let previous = self.profiles.insert(user_id.to_string(), profile.clone());
        if let Err(e) = self.save() {
            match previous {
                Some(old) => self.profiles.insert(user_id.to_string(), old),
                None => self.profiles.remove(user_id),
            };
            return Err(e);
        }
        Ok(profile)
    }
}

/// Shared profile store type
pub type SharedProfileStore = Arc<RwLock<ProfileStore>>;

pub fn create_shared_store(data_dir: PathBuf) -> Result<SharedProfileStore, ProfileError> {
    let store = ProfileStore::new(data_dir)?;
    Ok(Arc::new(RwLock::new(store)))
}

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Extension, Json, Router,
};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use super::types::*;
use crate::config::AppConfig;
use crate::curriculum::{self, Curriculum};
use crate::error::AppError;
use crate::profile::{self, RatingUpdateRequest, SharedProfileStore};
use crate::progress::{self, SharedProgressStore};
use crate::subscription::{
    self, SharedSubscriptionStore, Subscription, SubscriptionStatusResponse,
};
use crate::tier::{
    self, check_lesson_limit, cookie, identity_middleware, resolve_tier, CookieSigner, Identity,
    SharedUsageTracker, Tier, TierLimits, UsageSubject,
};

#[derive(Clone)]
pub struct AppState {
    pub curriculum: Arc<Curriculum>,
    pub limits: Arc<TierLimits>,
    pub cookies: CookieSigner,
    pub secure_cookies: bool,
    pub usage_tracker: SharedUsageTracker,
    pub progress: SharedProgressStore,
    pub subscriptions: SharedSubscriptionStore,
    pub profiles: SharedProfileStore,
}

impl AppState {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let data_dir = config.data_dir();
        std::fs::create_dir_all(&data_dir)?;

        let curriculum = match &config.curriculum {
            Some(path) => Curriculum::load(path)?,
            None => Curriculum::builtin()?,
        };
        tracing::info!(
            "Loaded curriculum {} ({} lessons)",
            curriculum.version(),
            curriculum.lesson_count()
        );

        let cookies = match &config.cookie_secret {
            Some(secret) if !secret.is_empty() => CookieSigner::new(secret),
            _ => {
                tracing::warn!(
                    "TACTICS_COOKIE_SECRET not set, anonymous cookies will not survive a restart"
                );
                CookieSigner::random()
            }
        };

        Ok(Self {
            curriculum: Arc::new(curriculum),
            limits: Arc::new(TierLimits::load(&data_dir)?),
            cookies,
            secure_cookies: config.secure_cookies,
            usage_tracker: tier::create_shared_tracker(data_dir.clone())?,
            progress: progress::create_shared_store(data_dir.clone())?,
            subscriptions: subscription::create_shared_store(data_dir.clone())?,
            profiles: profile::create_shared_store(data_dir)?,
        })
    }

    /// Verified anonymous token from the request cookies
    fn anonymous_token(&self, headers: &HeaderMap) -> Option<String> {
        let value = cookie::read_cookie(headers, cookie::COOKIE_NAME)?;
        let token = self.cookies.verify(value);
        if token.is_none() {
            tracing::warn!("Ignoring anonymous cookie with a bad signature");
        }
        token
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/curriculum", get(curriculum_overview))
        .route("/api/curriculum/levels/{level}", get(curriculum_level))
        .route("/api/tree/{level}", get(lesson_tree))
        .route("/api/themes/{theme_id}/puzzles", get(theme_puzzles))
        .route("/api/practice/mixed", post(mixed_practice))
        .route("/api/progress/lessons/{lesson_id}", get(lesson_progress))
        .route("/api/progress/themes/{theme_id}", get(theme_progress))
        .route("/api/progress/puzzle", post(puzzle_solved))
        .route("/api/progress/theme", post(theme_completed))
        .route("/api/progress/theme/reset", post(theme_reset))
        .route("/api/permissions", get(permissions))
        .route("/api/lessons/{lesson_id}/start", post(lesson_start))
        .route("/api/subscription/status", get(subscription_status))
        .route("/api/subscription", put(subscription_upsert))
        .route("/api/profile", get(profile_get))
        .route("/api/profile/rating", post(profile_rating))
        .route("/api/stats/streak", get(streak_stats))
        .layer(axum::middleware::from_fn(identity_middleware))
        .layer(cors)
        .with_state(state)
}

pub async fn run_http_server(config: AppConfig) -> Result<()> {
    let state = Arc::new(AppState::new(&config)?);
    let app = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down");
        })
        .await?;
    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}

// ========== Curriculum ==========

async fn curriculum_overview(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = CurriculumResponse {
        version: state.curriculum.version().to_string(),
        levels: state.curriculum.level_summaries(),
    };
    (StatusCode::OK, Json(response))
}

async fn curriculum_level(
    State(state): State<Arc<AppState>>,
    Path(level): Path<u32>,
) -> Result<Response, AppError> {
    let level = state
        .curriculum
        .level(level)
        .ok_or_else(|| AppError::NotFound(format!("Level {} not found", level)))?;
    Ok((StatusCode::OK, Json(level)).into_response())
}

async fn lesson_tree(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(level): Path<u32>,
) -> Result<Response, AppError> {
    if state.curriculum.level(level).is_none() {
        return Err(AppError::NotFound(format!("Level {} not found", level)));
    }

    let progress = match &identity.user_id {
        Some(user_id) => state.progress.read().await.lessons_for(user_id),
        None => HashMap::new(),
    };
    let tree = curriculum::build_tree(&state.curriculum, &progress, Some(level));
    Ok((StatusCode::OK, Json(tree)).into_response())
}

// ========== Practice ==========

async fn solved_in_cycle(
    state: &AppState,
    identity: &Identity,
    theme_id: &str,
) -> HashSet<String> {
    match &identity.user_id {
        Some(user_id) => state.progress.read().await.solved_in_cycle(user_id, theme_id),
        None => HashSet::new(),
    }
}

async fn theme_puzzles(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(theme_id): Path<String>,
    Query(query): Query<PuzzleQuery>,
) -> Result<Response, AppError> {
    let count = query.count();
    if count == 0 {
        return Err(AppError::Validation("count must be at least 1".to_string()));
    }
    let theme = state
        .curriculum
        .theme(&theme_id)
        .ok_or_else(|| AppError::NotFound(format!("Theme {} not found", theme_id)))?;

    let solved = solved_in_cycle(&state, &identity, &theme_id).await;
    let selection = curriculum::select_puzzles(&theme.puzzles, count, &solved);

    Ok((StatusCode::OK, Json(SelectionResponse::new(selection, count))).into_response())
}

async fn mixed_practice(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<MixedPracticeRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    if request.theme_ids.is_empty() {
        return Err(AppError::Validation("theme_ids must not be empty".to_string()));
    }
    let count = PuzzleQuery {
        count: request.count,
    }
    .count();
    if count == 0 {
        return Err(AppError::Validation("count must be at least 1".to_string()));
    }

    let mut pools = Vec::with_capacity(request.theme_ids.len());
    for theme_id in &request.theme_ids {
        let theme = state
            .curriculum
            .theme(theme_id)
            .ok_or_else(|| AppError::NotFound(format!("Theme {} not found", theme_id)))?;
        pools.push((theme, solved_in_cycle(&state, &identity, theme_id).await));
    }

    let themes: Vec<_> = pools.iter().map(|(theme, solved)| (*theme, solved)).collect();
    let selection = curriculum::interleave_themes(&themes, count);

    Ok((StatusCode::OK, Json(SelectionResponse::new(selection, count))).into_response())
}

// ========== Progress ==========

/// `null` when the user has not started the lesson
async fn lesson_progress(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(lesson_id): Path<String>,
) -> Result<Response, AppError> {
    let user_id = identity.require_user()?;
    if state.curriculum.lesson(&lesson_id).is_none() {
        return Err(AppError::NotFound(format!("Lesson {} not found", lesson_id)));
    }
    let store = state.progress.read().await;
    Ok((StatusCode::OK, Json(store.lesson_progress(user_id, &lesson_id))).into_response())
}

async fn theme_progress(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(theme_id): Path<String>,
) -> Result<Response, AppError> {
    let user_id = identity.require_user()?;
    if state.curriculum.theme(&theme_id).is_none() {
        return Err(AppError::NotFound(format!("Theme {} not found", theme_id)));
    }
    let store = state.progress.read().await;
    Ok((StatusCode::OK, Json(store.theme_progress(user_id, &theme_id))).into_response())
}

async fn puzzle_solved(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<PuzzleSolvedRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    let user_id = identity.require_user()?;
    let progress = state.progress.write().await.record_puzzle_solved(
        &state.curriculum,
        user_id,
        &request.theme_id,
        &request.puzzle_id,
        Utc::now(),
    )?;
    Ok((StatusCode::OK, Json(progress)).into_response())
}

async fn theme_completed(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<ThemeRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    let user_id = identity.require_user()?;
    let progress = state.progress.write().await.complete_theme(
        &state.curriculum,
        user_id,
        &request.theme_id,
        Utc::now(),
    )?;
    Ok((StatusCode::OK, Json(progress)).into_response())
}

async fn theme_reset(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<ThemeRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    let user_id = identity.require_user()?;
    if state.curriculum.theme(&request.theme_id).is_none() {
        return Err(AppError::NotFound(format!(
            "Theme {} not found",
            request.theme_id
        )));
    }
    state
        .progress
        .write()
        .await
        .reset_review_cycle(user_id, &request.theme_id)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn streak_stats(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Response, AppError> {
    let user_id = identity.require_user()?;
    let summary = state.progress.read().await.streak(user_id, Utc::now());
    Ok((StatusCode::OK, Json(summary)).into_response())
}

// ========== Entitlements ==========

async fn permissions(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let tier = resolve_tier(&identity, &state.subscriptions).await;
    let tracker = state.usage_tracker.read().await;
    let now = Utc::now();

    let permissions = match &identity.user_id {
        Some(user_id) => tracker.permissions(tier, UsageSubject::User(user_id), &state.limits, now),
        None => {
            // No valid cookie yet means nothing was used
            let token = state.anonymous_token(&headers).unwrap_or_default();
            tracker.permissions(tier, UsageSubject::Anonymous(&token), &state.limits, now)
        }
    };
    (StatusCode::OK, Json(permissions))
}

async fn lesson_start(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(lesson_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    if state.curriculum.lesson(&lesson_id).is_none() {
        return Err(AppError::NotFound(format!("Lesson {} not found", lesson_id)));
    }

    let tier = resolve_tier(&identity, &state.subscriptions).await;
    let now = Utc::now();

    let (permissions, issued_cookie) = match &identity.user_id {
        Some(user_id) => {
            let subject = UsageSubject::User(user_id);
            let permissions =
                check_lesson_limit(tier, subject, &state.usage_tracker, &state.limits, now).await?;
            (permissions, None)
        }
        None => {
            let (token, issued) = match state.anonymous_token(&headers) {
                Some(token) => (token, None),
                None => {
                    let issued = state.cookies.issue();
                    (issued.token, Some(issued.cookie_value))
                }
            };
            let subject = UsageSubject::Anonymous(&token);
            let permissions =
                check_lesson_limit(tier, subject, &state.usage_tracker, &state.limits, now).await?;
            (permissions, issued)
        }
    };

    tracing::info!(
        "Lesson {} started by {} caller ({} used)",
        lesson_id,
        tier.as_str(),
        permissions.lessons_completed_today
    );

    let mut response = (
        StatusCode::OK,
        Json(LessonStartResponse {
            lesson_id,
            permissions,
        }),
    )
        .into_response();

    if let Some(value) = issued_cookie {
        let header = cookie::set_cookie_header(&value, state.secure_cookies);
        let header = HeaderValue::from_str(&header).map_err(anyhow::Error::from)?;
        response.headers_mut().insert(SET_COOKIE, header);
    }
    Ok(response)
}

// ========== Subscription ==========

async fn subscription_status(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> impl IntoResponse {
    let Some(user_id) = identity.user_id.as_deref() else {
        return (
            StatusCode::OK,
            Json(SubscriptionStatusResponse::unauthenticated(&state.limits)),
        );
    };

    let resolution = state.subscriptions.read().await.resolve_user(user_id);
    let tier = Tier::resolve(true, identity.is_admin, resolution.is_premium);
    let permissions = state.usage_tracker.read().await.permissions(
        tier,
        UsageSubject::User(user_id),
        &state.limits,
        Utc::now(),
    );

    (
        StatusCode::OK,
        Json(SubscriptionStatusResponse::for_user(&resolution, &permissions)),
    )
}

async fn subscription_upsert(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<Subscription>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(subscription) = payload?;
    identity.require_user()?;
    if !identity.is_admin {
        return Err(AppError::Forbidden);
    }

    state
        .subscriptions
        .write()
        .await
        .upsert(subscription.clone())?;
    Ok((StatusCode::OK, Json(subscription)).into_response())
}

// ========== Profile ==========

async fn profile_get(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Response, AppError> {
    let user_id = identity.require_user()?;
    let profiles = state.profiles.read().await;
    Ok((StatusCode::OK, Json(profiles.get(user_id))).into_response())
}

async fn profile_rating(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    payload: Result<Json<RatingUpdateRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = payload?;
    let user_id = identity.require_user()?;
    let profile = state
        .profiles
        .write()
        .await
        .update_rating(user_id, &request, Utc::now())?;
    Ok((StatusCode::OK, Json(profile)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::{Plan, SubscriptionStatus};
    use axum::body::to_bytes;
    use clap::Parser;
    use serde_json::{json, Value};
    use tempfile::{tempdir, TempDir};

    fn test_state() -> (TempDir, Arc<AppState>) {
        let dir = tempdir().unwrap();
        let data_dir = dir.path().to_str().unwrap().to_string();
        let config = AppConfig::parse_from([
            "tactics-core",
            "--data-dir",
            data_dir.as_str(),
            "--cookie-secret",
            "test-secret",
        ]);
        let state = Arc::new(AppState::new(&config).unwrap());
        (dir, state)
    }

    fn user(id: &str) -> Identity {
        Identity {
            user_id: Some(id.to_string()),
            is_admin: false,
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn start(
        state: &Arc<AppState>,
        identity: Identity,
        headers: HeaderMap,
    ) -> Response {
        lesson_start(
            State(state.clone()),
            Extension(identity),
            Path("1.1".to_string()),
            headers,
        )
        .await
        .into_response()
    }

    #[tokio::test]
    async fn test_anonymous_gets_cookie_and_is_capped() {
        let (_dir, state) = test_state();

        let first = start(&state, Identity::default(), HeaderMap::new()).await;
        assert_eq!(first.status(), StatusCode::OK);
        let set_cookie = first
            .headers()
            .get(SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(set_cookie.contains("HttpOnly"));

        let pair = set_cookie.split(';').next().unwrap().to_string();
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::COOKIE, pair.parse().unwrap());

        let second = start(&state, Identity::default(), headers.clone()).await;
        assert_eq!(second.status(), StatusCode::OK);
        assert!(second.headers().get(SET_COOKIE).is_none());

        let third = start(&state, Identity::default(), headers).await;
        assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(third).await;
        assert_eq!(body["code"], "LIFETIME_LIMIT");
        assert_eq!(body["permissions"]["shouldPromptSignup"], true);
    }

    #[tokio::test]
    async fn test_tampered_cookie_is_replaced() {
        let (_dir, state) = test_state();
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            "tactics_anon=forged.c2lnbmF0dXJl".parse().unwrap(),
        );

        let response = start(&state, Identity::default(), headers).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(SET_COOKIE).is_some());
    }

    #[tokio::test]
    async fn test_premium_user_is_unlimited() {
        let (_dir, state) = test_state();
        let now = Utc::now();
        state
            .subscriptions
            .write()
            .await
            .upsert(Subscription {
                id: "sub_1".to_string(),
                user_id: "u1".to_string(),
                status: SubscriptionStatus::Trialing,
                plan: Plan::Yearly,
                current_period_start: now,
                current_period_end: now + chrono::Duration::days(14),
                cancel_at_period_end: false,
            })
            .unwrap();

        for _ in 0..3 {
            let response = start(&state, user("u1"), HeaderMap::new()).await;
            assert_eq!(response.status(), StatusCode::OK);
        }

        let status = subscription_status(State(state.clone()), Extension(user("u1")))
            .await
            .into_response();
        let body = body_json(status).await;
        assert_eq!(body["isPremium"], true);
        assert_eq!(body["status"], "trialing");
        assert!(body["dailyPuzzlesRemaining"].is_null());
    }

    #[tokio::test]
    async fn test_unauthenticated_subscription_defaults() {
        let (_dir, state) = test_state();
        let response = subscription_status(State(state), Extension(Identity::default()))
            .await
            .into_response();
        let body = body_json(response).await;
        assert_eq!(body["status"], "free");
        assert_eq!(body["isAuthenticated"], false);
    }

    #[tokio::test]
    async fn test_upsert_requires_admin() {
        let (_dir, state) = test_state();
        let now = Utc::now();
        let row = Subscription {
            id: "sub_1".to_string(),
            user_id: "u2".to_string(),
            status: SubscriptionStatus::Active,
            plan: Plan::Monthly,
            current_period_start: now,
            current_period_end: now + chrono::Duration::days(30),
            cancel_at_period_end: false,
        };

        let denied = subscription_upsert(State(state.clone()), Extension(user("u1")), Ok(Json(row.clone())))
            .await
            .into_response();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let admin = Identity {
            user_id: Some("ops".to_string()),
            is_admin: true,
        };
        let ok = subscription_upsert(State(state.clone()), Extension(admin), Ok(Json(row)))
            .await
            .into_response();
        assert_eq!(ok.status(), StatusCode::OK);
        assert!(state.subscriptions.read().await.resolve_user("u2").is_premium);
    }

    #[tokio::test]
    async fn test_progress_requires_authentication() {
        let (_dir, state) = test_state();
        let request = PuzzleSolvedRequest {
            theme_id: "1.1.1".to_string(),
            puzzle_id: "p-1.1.1-a".to_string(),
        };
        let response = puzzle_solved(State(state), Extension(Identity::default()), Ok(Json(request)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["code"], "NOT_AUTHENTICATED");
    }

    #[tokio::test]
    async fn test_theme_completion_unlocks_tree() {
        let (_dir, state) = test_state();
        let lesson = state.curriculum.lesson("1.1").unwrap().lesson;
        let theme_ids: Vec<String> = lesson.themes.iter().map(|t| t.id.clone()).collect();

        for theme_id in theme_ids {
            let response = theme_completed(
                State(state.clone()),
                Extension(user("u1")),
                Ok(Json(ThemeRequest { theme_id })),
            )
            .await
            .into_response();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = lesson_tree(State(state.clone()), Extension(user("u1")), Path(1))
            .await
            .into_response();
        let body = body_json(response).await;
        assert_eq!(body["lessons"][0]["status"], "completed");
        assert_eq!(body["lessons"][1]["status"], "available");
        assert_eq!(body["currentLessonId"], "1.2");
    }

    #[tokio::test]
    async fn test_unstarted_progress_is_null() {
        let (_dir, state) = test_state();
        let response = theme_progress(
            State(state.clone()),
            Extension(user("u1")),
            Path("1.1.1".to_string()),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_json(response).await.is_null());

        let missing = lesson_progress(State(state), Extension(user("u1")), Path("9.9".to_string()))
            .await
            .into_response();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_theme_puzzles_scaffolded() {
        let (_dir, state) = test_state();
        let response = theme_puzzles(
            State(state),
            Extension(Identity::default()),
            Path("1.1.1".to_string()),
            Query(PuzzleQuery { count: Some(3) }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        let ratings: Vec<u64> = body["puzzles"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["rating"].as_u64().unwrap())
            .collect();
        assert_eq!(ratings.len(), 3);
        assert!(ratings.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_large_count_returns_whole_pool() {
        let (_dir, state) = test_state();
        let pool_size = state.curriculum.theme("1.1.1").unwrap().puzzles.len();
        let response = theme_puzzles(
            State(state),
            Extension(Identity::default()),
            Path("1.1.1".to_string()),
            Query(PuzzleQuery { count: Some(500) }),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["requested"], 500);
        assert_eq!(body["puzzles"].as_array().unwrap().len(), pool_size);
    }

    #[tokio::test]
    async fn test_malformed_body_is_validation_error() {
        use axum::{body::Body, extract::FromRequest, http::Request};

        let (_dir, state) = test_state();
        let request = Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from("{\"theme_id\": 7}"))
            .unwrap();
        let payload = Json::<ThemeRequest>::from_request(request, &()).await;
        assert!(payload.is_err());

        let response = theme_completed(State(state), Extension(user("u1")), payload)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_unknown_level_is_not_found() {
        let (_dir, state) = test_state();
        let response = curriculum_level(State(state), Path(99)).await.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rating_validation() {
        let (_dir, state) = test_state();
        let rejected = profile_rating(
            State(state.clone()),
            Extension(user("u1")),
            Ok(Json(RatingUpdateRequest {
                elo_rating: Some(json!(2500)),
                onboarding_completed: None,
            })),
        )
        .await
        .into_response();
        assert_eq!(rejected.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let accepted = profile_rating(
            State(state.clone()),
            Extension(user("u1")),
            Ok(Json(RatingUpdateRequest {
                elo_rating: Some(json!(1200)),
                onboarding_completed: Some(true),
            })),
        )
        .await
        .into_response();
        assert_eq!(accepted.status(), StatusCode::OK);
        assert_eq!(body_json(accepted).await["eloRating"], 1200);

        let stored = profile_get(State(state), Extension(user("u1")))
            .await
            .into_response();
        assert_eq!(body_json(stored).await["onboardingCompleted"], true);
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Read API for the presentation layer. All handlers are pure reads.

use crate::error::Result;
use crate::models::{Insight, StreakView, TeamId, UserId};
use crate::services::stats::{TeamStatsView, UserStatsView};
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

/// Read API routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users/{user_id}/stats", get(get_user_stats))
        .route("/api/users/{user_id}/streak", get(get_streak))
        .route("/api/users/{user_id}/insights", get(get_insights))
        .route("/api/teams/{team_id}/stats", get(get_team_stats))
}

// ─── Stats ───────────────────────────────────────────────────

async fn get_user_stats(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Result<Json<UserStatsView>> {
    Ok(Json(state.stats.get_user_stats(user_id).await?))
}

async fn get_team_stats(
    State(state): State<Arc<AppState>>,
    Path(team_id): Path<TeamId>,
) -> Result<Json<TeamStatsView>> {
    Ok(Json(state.stats.get_team_stats(team_id).await?))
}

// ─── Streak ──────────────────────────────────────────────────

/// Streak for a user. Users without a record get `has_record: false`.
async fn get_streak(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Result<Json<StreakView>> {
    Ok(Json(state.streaks.get_streak(user_id, Utc::now()).await?))
}

// ─── Insights ────────────────────────────────────────────────

#[derive(Serialize)]
pub struct InsightsResponse {
    pub user_id: UserId,
    pub insights: Vec<Insight>,
}

async fn get_insights(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
) -> Result<Json<InsightsResponse>> {
    let insights = state.stats.get_insights(user_id, Utc::now()).await?;
    Ok(Json(InsightsResponse { user_id, insights }))
}

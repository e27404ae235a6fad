// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Task routes for the scheduler and the ingest side.
//!
//! These endpoints are called by ops tooling, not directly by users.
//! Every route here sits behind the ops-token middleware.

use crate::error::{AppError, Result};
use crate::models::{ActivityRecord, RankingTarget, StreakState, UserId};
use crate::services::{AggregationReport, RankingReport, ScopeSummary, StreakUpdate};
use crate::AppState;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    routing::{post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

/// Task routes (ops token required, applied in routes/mod.rs).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks/process-activity", post(process_activity))
        .route("/tasks/aggregate-users", post(aggregate_users))
        .route("/tasks/aggregate-teams", post(aggregate_teams))
        .route("/tasks/recalculate-rankings", post(recalculate_all_rankings))
        .route(
            "/tasks/recalculate-rankings/target",
            post(recalculate_target_ranking),
        )
        .route("/tasks/users/{user_id}/weekly-goal", put(set_weekly_goal))
}

fn validation_error(err: validator::ValidationErrors) -> AppError {
    AppError::BadRequest(err.to_string())
}

/// Feed one newly ingested activity to the streak state machine.
async fn process_activity(
    State(state): State<Arc<AppState>>,
    Json(activity): Json<ActivityRecord>,
) -> Result<Json<StreakUpdate>> {
    activity.validate().map_err(validation_error)?;

    tracing::info!(
        activity_id = activity.activity_id,
        user_id = activity.user_id,
        "Processing activity"
    );

    Ok(Json(state.streaks.record_activity(&activity).await?))
}

async fn aggregate_users(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<AggregationReport>)> {
    let report = state.aggregation.run_aggregation_for_all_users().await?;
    Ok((report_status(report.is_complete_failure()), Json(report)))
}

async fn aggregate_teams(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<AggregationReport>)> {
    let report = state.aggregation.run_aggregation_for_all_teams().await?;
    Ok((report_status(report.is_complete_failure()), Json(report)))
}

/// Re-rank every scope.
async fn recalculate_all_rankings(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<RankingReport>)> {
    let report = state.ranking.recalculate_all_rankings().await?;
    Ok((report_status(report.is_complete_failure()), Json(report)))
}

/// Re-rank a single scope given as a `RankingTarget` body.
async fn recalculate_target_ranking(
    State(state): State<Arc<AppState>>,
    Json(target): Json<RankingTarget>,
) -> Result<Json<ScopeSummary>> {
    tracing::info!(scope = %target.scope_key(), "Recalculating single scope");
    Ok(Json(state.ranking.recalculate_rankings(&target).await?))
}

fn report_status(complete_failure: bool) -> StatusCode {
    if complete_failure {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct WeeklyGoalRequest {
    #[validate(range(min = 1, max = 7))]
    pub weekly_goal: u32,
}

async fn set_weekly_goal(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<UserId>,
    Json(request): Json<WeeklyGoalRequest>,
) -> Result<Json<StreakState>> {
    request.validate().map_err(validation_error)?;
    Ok(Json(
        state
            .streaks
            .set_weekly_goal(user_id, request.weekly_goal)
            .await?,
    ))
}

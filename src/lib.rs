// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Stride-Rank: performance ranking and streak engine
//!
//! Turns raw activity records into per-user, per-sport and per-team
//! statistic snapshots, assigns dense ranks across geographic and social
//! scopes, keeps each user's daily/weekly streak, and derives percentile
//! standings and insight messages for presentation.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use std::sync::Arc;

use config::Config;
use db::{ActivitySource, SnapshotStore};
use services::insights::default_rules;
use services::{
    AggregationService, RankingService, ScoringFunction, StatsService, StreakService,
};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub aggregation: AggregationService,
    pub streaks: Arc<StreakService>,
    pub ranking: RankingService,
    pub stats: StatsService,
}

impl AppState {
    /// Wire the engine services over the given storage and scoring function.
    pub fn new(
        config: Config,
        source: Arc<dyn ActivitySource>,
        store: Arc<dyn SnapshotStore>,
        scoring: Arc<dyn ScoringFunction>,
    ) -> Self {
        let aggregation = AggregationService::new(
            source.clone(),
            store.clone(),
            scoring,
            config.scoring_window_days,
            config.aggregation_concurrency,
        );
        let streaks = Arc::new(StreakService::new(
            store.clone(),
            config.default_weekly_goal,
            config.min_qualifying_duration_secs,
            config.streak_max_retries,
        ));
        let ranking =
            RankingService::new(source, store.clone(), config.aggregation_concurrency);
        let stats = StatsService::new(store, streaks.clone(), default_rules());

        Self {
            config,
            aggregation,
            streaks,
            ranking,
            stats,
        }
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Read API over current snapshots. Nothing here writes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::SnapshotStore;
use crate::error::{AppError, Result};
use crate::models::{
    Insight, RankScope, RankingTarget, TeamId, TeamMetric, TeamStatSnapshot, UserId,
    UserSportStatSnapshot, UserStatSnapshot,
};
use crate::services::insights::{self, InsightContext, InsightRule, Standing};
use crate::services::streak::StreakService;

/// A user's snapshot with percentile standings.
#[derive(Debug, Clone, Serialize)]
pub struct UserStatsView {
    #[serde(flatten)]
    pub stats: UserStatSnapshot,
    pub global: Option<Standing>,
    pub country: Option<Standing>,
    pub city: Option<Standing>,
    pub sports: Vec<SportStatsView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SportStatsView {
    #[serde(flatten)]
    pub stats: UserSportStatSnapshot,
    pub global: Option<Standing>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeamStatsView {
    #[serde(flatten)]
    pub stats: TeamStatSnapshot,
    /// Standing among teams ordered by average sport index
    pub by_avg_sport_index: Option<Standing>,
    /// Standing among teams ordered by total distance
    pub by_total_distance: Option<Standing>,
}

fn city_scope(country: &Option<String>, city: &Option<String>) -> Option<RankScope> {
    match (country, city) {
        (Some(country), Some(city)) => Some(RankScope::City {
            country: country.clone(),
            city: city.clone(),
        }),
        _ => None,
    }
}

pub struct StatsService {
    store: Arc<dyn SnapshotStore>,
    streaks: Arc<StreakService>,
    rules: Vec<InsightRule>,
}

impl StatsService {
    pub fn new(
        store: Arc<dyn SnapshotStore>,
        streaks: Arc<StreakService>,
        rules: Vec<InsightRule>,
    ) -> Self {
        Self {
            store,
            streaks,
            rules,
        }
    }

    /// Size of the scope as of its latest completed ranking run.
    async fn scope_total(&self, target: RankingTarget) -> Result<Option<u32>> {
        let run = self.store.get_ranking_run(&target.scope_key()).await?;
        Ok(run.map(|r| r.total))
    }

    async fn user_standing(
        &self,
        rank: Option<u32>,
        scope: Option<RankScope>,
    ) -> Result<Option<Standing>> {
        let (Some(rank), Some(scope)) = (rank, scope) else {
            return Ok(None);
        };
        let total = self
            .scope_total(RankingTarget::UserIndex { scope })
            .await?;
        Ok(Standing::new(Some(rank), total))
    }

    pub async fn get_user_stats(&self, user_id: UserId) -> Result<UserStatsView> {
        let stats = self
            .store
            .get_user_stats(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("stats for user {}", user_id)))?;

        let global = self
            .user_standing(stats.global_rank, Some(RankScope::Global))
            .await?;
        let country = self
            .user_standing(stats.country_rank, stats.country.clone().map(RankScope::Country))
            .await?;
        let city = self
            .user_standing(stats.city_rank, city_scope(&stats.country, &stats.city))
            .await?;

        let mut sports = Vec::new();
        for sport in self.store.get_user_sport_stats(user_id).await? {
            let total = match sport.global_rank {
                Some(_) => {
                    self.scope_total(RankingTarget::SportPerformance {
                        sport_id: sport.sport_id,
                        scope: RankScope::Global,
                    })
                    .await?
                }
                None => None,
            };
            sports.push(SportStatsView {
                global: Standing::new(sport.global_rank, total),
                stats: sport,
            });
        }

        Ok(UserStatsView {
            stats,
            global,
            country,
            city,
            sports,
        })
    }

    pub async fn get_team_stats(&self, team_id: TeamId) -> Result<TeamStatsView> {
        let stats = self
            .store
            .get_team_stats(team_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("stats for team {}", team_id)))?;

        Ok(TeamStatsView {
            by_avg_sport_index: self
                .team_standing(&stats, TeamMetric::AvgSportIndex)
                .await?,
            by_total_distance: self
                .team_standing(&stats, TeamMetric::TotalDistance)
                .await?,
            stats,
        })
    }

    /// Each metric's rank is paired with the total of that metric's own run.
    async fn team_standing(
        &self,
        stats: &TeamStatSnapshot,
        metric: TeamMetric,
    ) -> Result<Option<Standing>> {
        let Some(rank) = stats.rank(metric) else {
            return Ok(None);
        };
        let total = self.scope_total(RankingTarget::Teams { metric }).await?;
        Ok(Standing::new(Some(rank), total))
    }

    /// Insights for a user, highest priority first.
    ///
    /// A user with no snapshots yet gets whatever streak rules apply.
    pub async fn get_insights(&self, user_id: UserId, now: DateTime<Utc>) -> Result<Vec<Insight>> {
        let stats = self.store.get_user_stats(user_id).await?;
        let sports = self.store.get_user_sport_stats(user_id).await?;
        let streak = self.streaks.get_streak(user_id, now).await?;

        let global = match stats.as_ref() {
            Some(s) => {
                self.user_standing(s.global_rank, Some(RankScope::Global))
                    .await?
            }
            None => None,
        };

        let ctx = InsightContext {
            stats: stats.as_ref(),
            sports: &sports,
            streak: &streak,
            global,
        };
        Ok(insights::evaluate(&self.rules, &ctx))
    }
}

//! Statistic snapshots produced by aggregation and ranked by the ranking pass.
//!
//! Every snapshot is a full overwrite of the entity's current aggregate
//! state. Aggregation owns the metric fields; the ranking pass owns the rank
//! fields. Stores retain rank fields when aggregation writes a row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{SportId, TeamId, TeamMetric, UserId};

/// Per-user composite statistics.
///
/// Stored at: `user_stats/{user_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStatSnapshot {
    pub user_id: UserId,

    // ─── Index ───────────────────────────────────────────────────
    /// Current composite score over the recent window
    pub sport_index: f64,
    /// Running maximum of `sport_index`
    pub sport_index_best: f64,

    // ─── Geography ───────────────────────────────────────────────
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,

    // ─── Ranks ───────────────────────────────────────────────────
    #[serde(default)]
    pub global_rank: Option<u32>,
    #[serde(default)]
    pub country_rank: Option<u32>,
    #[serde(default)]
    pub city_rank: Option<u32>,

    // ─── Totals (all time) ───────────────────────────────────────
    #[serde(default)]
    pub total_activities: u32,
    #[serde(default)]
    pub total_distance_meters: f64,
    #[serde(default)]
    pub total_duration_seconds: u64,
    #[serde(default)]
    pub total_calories: f64,

    /// Start of the newest activity folded into this snapshot
    #[serde(default)]
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl UserStatSnapshot {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            sport_index: 0.0,
            sport_index_best: 0.0,
            city: None,
            country: None,
            global_rank: None,
            country_rank: None,
            city_rank: None,
            total_activities: 0,
            total_distance_meters: 0.0,
            total_duration_seconds: 0,
            total_calories: 0.0,
            last_activity_at: None,
        }
    }

    /// Set a freshly computed index, keeping the historic best as a running max.
    pub fn apply_index(&mut self, index: f64) {
        self.sport_index = index;
        self.sport_index_best = self.sport_index_best.max(index);
    }

    /// Copy rank fields from a previously stored row.
    pub fn retain_ranks_from(&mut self, previous: &UserStatSnapshot) {
        self.global_rank = previous.global_rank;
        self.country_rank = previous.country_rank;
        self.city_rank = previous.city_rank;
    }
}

/// Per-(user, sport) statistics.
///
/// Stored at: `user_sport_stats/{user_id}_{sport_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSportStatSnapshot {
    pub user_id: UserId,
    pub sport_id: SportId,
    pub performance_score: f64,
    #[serde(default)]
    pub activity_count: u32,
    #[serde(default)]
    pub total_distance_meters: f64,

    /// Copied from the user's profile so scopes can be resolved per row
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,

    #[serde(default)]
    pub global_rank: Option<u32>,
    #[serde(default)]
    pub country_rank: Option<u32>,
    #[serde(default)]
    pub city_rank: Option<u32>,
    #[serde(default)]
    pub friends_rank: Option<u32>,
}

impl UserSportStatSnapshot {
    pub fn new(user_id: UserId, sport_id: SportId) -> Self {
        Self {
            user_id,
            sport_id,
            performance_score: 0.0,
            activity_count: 0,
            total_distance_meters: 0.0,
            city: None,
            country: None,
            global_rank: None,
            country_rank: None,
            city_rank: None,
            friends_rank: None,
        }
    }

    /// Document ID combining user and sport.
    pub fn doc_id(&self) -> String {
        sport_stat_doc_id(self.user_id, self.sport_id)
    }

    pub fn retain_ranks_from(&mut self, previous: &UserSportStatSnapshot) {
        self.global_rank = previous.global_rank;
        self.country_rank = previous.country_rank;
        self.city_rank = previous.city_rank;
        self.friends_rank = previous.friends_rank;
    }
}

pub fn sport_stat_doc_id(user_id: UserId, sport_id: SportId) -> String {
    format!("{}_{}", user_id, sport_id)
}

/// Per-team statistics, re-folded from member snapshots on every run.
///
/// Stored at: `team_stats/{team_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamStatSnapshot {
    pub team_id: TeamId,
    /// Roster size at aggregation time
    pub member_count: u32,
    /// Members whose snapshot was read and folded in
    #[serde(default)]
    pub members_aggregated: u32,
    pub total_distance_meters: f64,
    pub total_activities: u32,
    pub avg_sport_index: f64,
    /// Global rank by `avg_sport_index`
    #[serde(default)]
    pub avg_sport_index_rank: Option<u32>,
    /// Global rank by `total_distance_meters`
    #[serde(default)]
    pub total_distance_rank: Option<u32>,
}

impl TeamStatSnapshot {
    /// Fold member snapshots into a team snapshot.
    pub fn fold(team_id: TeamId, member_count: u32, members: &[UserStatSnapshot]) -> Self {
        let total_distance_meters = members.iter().map(|m| m.total_distance_meters).sum();
        let total_activities = members.iter().map(|m| m.total_activities).sum();
        let avg_sport_index = if members.is_empty() {
            0.0
        } else {
            members.iter().map(|m| m.sport_index).sum::<f64>() / members.len() as f64
        };

        Self {
            team_id,
            member_count,
            members_aggregated: members.len() as u32,
            total_distance_meters,
            total_activities,
            avg_sport_index,
            avg_sport_index_rank: None,
            total_distance_rank: None,
        }
    }

    /// Metric value a team is ordered by.
    pub fn metric(&self, metric: TeamMetric) -> f64 {
        match metric {
            TeamMetric::AvgSportIndex => self.avg_sport_index,
            TeamMetric::TotalDistance => self.total_distance_meters,
        }
    }

    pub fn rank(&self, metric: TeamMetric) -> Option<u32> {
        match metric {
            TeamMetric::AvgSportIndex => self.avg_sport_index_rank,
            TeamMetric::TotalDistance => self.total_distance_rank,
        }
    }

    pub fn set_rank(&mut self, metric: TeamMetric, rank: Option<u32>) {
        match metric {
            TeamMetric::AvgSportIndex => self.avg_sport_index_rank = rank,
            TeamMetric::TotalDistance => self.total_distance_rank = rank,
        }
    }

    pub fn retain_ranks_from(&mut self, previous: &TeamStatSnapshot) {
        self.avg_sport_index_rank = previous.avg_sport_index_rank;
        self.total_distance_rank = previous.total_distance_rank;
    }
}

//! Ranking scopes, targets and per-scope run records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{SportId, UserId};

/// A partition over which dense ranks are computed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankScope {
    Global,
    Country(String),
    /// A city within a country; equal city names in different countries are distinct
    City { country: String, city: String },
    /// A user together with their friends
    Friends(UserId),
}

impl RankScope {
    fn key_suffix(&self) -> String {
        match self {
            RankScope::Global => "global".to_string(),
            RankScope::Country(country) => format!("country/{}", country),
            RankScope::City { country, city } => format!("city/{}/{}", country, city),
            RankScope::Friends(user_id) => format!("friends/{}", user_id),
        }
    }
}

/// Team metric used to order teams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamMetric {
    AvgSportIndex,
    TotalDistance,
}

impl TeamMetric {
    pub const ALL: [TeamMetric; 2] = [TeamMetric::AvgSportIndex, TeamMetric::TotalDistance];

    /// Rank column on `TeamStatSnapshot`.
    pub fn rank_column(&self) -> &'static str {
        match self {
            TeamMetric::AvgSportIndex => "avg_sport_index_rank",
            TeamMetric::TotalDistance => "total_distance_rank",
        }
    }
}

/// What to rank, and within which scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RankingTarget {
    /// Users by `sport_index`
    UserIndex { scope: RankScope },
    /// Users by per-sport `performance_score`
    SportPerformance { sport_id: SportId, scope: RankScope },
    /// Teams by the given metric (global only)
    Teams { metric: TeamMetric },
}

impl RankingTarget {
    /// Stable key identifying the scope's ranking table.
    pub fn scope_key(&self) -> String {
        match self {
            RankingTarget::UserIndex { scope } => format!("users/{}", scope.key_suffix()),
            RankingTarget::SportPerformance { sport_id, scope } => {
                format!("sport/{}/{}", sport_id, scope.key_suffix())
            }
            RankingTarget::Teams { metric } => match metric {
                TeamMetric::AvgSportIndex => "teams/avg_sport_index".to_string(),
                TeamMetric::TotalDistance => "teams/total_distance".to_string(),
            },
        }
    }
}

/// Rank column on `UserStatSnapshot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRankField {
    Global,
    Country,
    City,
}

impl UserRankField {
    pub fn column(&self) -> &'static str {
        match self {
            UserRankField::Global => "global_rank",
            UserRankField::Country => "country_rank",
            UserRankField::City => "city_rank",
        }
    }
}

/// Rank column on `UserSportStatSnapshot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SportRankField {
    Global,
    Country,
    City,
    Friends,
}

impl SportRankField {
    pub fn column(&self) -> &'static str {
        match self {
            SportRankField::Global => "global_rank",
            SportRankField::Country => "country_rank",
            SportRankField::City => "city_rank",
            SportRankField::Friends => "friends_rank",
        }
    }
}

/// Generation-tagged record of the latest completed ranking of a scope.
///
/// Stored at: `ranking_runs/{scope_key}` (slashes replaced)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRun {
    pub scope_key: String,
    /// Increments on every completed run of this scope
    pub generation: u64,
    /// Number of ranked entities
    pub total: u32,
    pub completed_at: DateTime<Utc>,
}

impl RankingRun {
    /// Successor record for a run completing at `completed_at`.
    pub fn next(
        previous: Option<&RankingRun>,
        scope_key: &str,
        total: u32,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            scope_key: scope_key.to_string(),
            generation: previous.map_or(1, |p| p.generation + 1),
            total,
            completed_at,
        }
    }

    /// Firestore-safe document ID.
    pub fn doc_id(scope_key: &str) -> String {
        scope_key.replace('/', "__")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_keys_are_distinct() {
        let keys = [
            RankingTarget::UserIndex {
                scope: RankScope::Global,
            }
            .scope_key(),
            RankingTarget::UserIndex {
                scope: RankScope::Country("NL".to_string()),
            }
            .scope_key(),
            RankingTarget::SportPerformance {
                sport_id: 3,
                scope: RankScope::City {
                    country: "NL".to_string(),
                    city: "Utrecht".to_string(),
                },
            }
            .scope_key(),
            RankingTarget::SportPerformance {
                sport_id: 3,
                scope: RankScope::Friends(12),
            }
            .scope_key(),
            RankingTarget::Teams {
                metric: TeamMetric::AvgSportIndex,
            }
            .scope_key(),
        ];

        assert_eq!(keys[0], "users/global");
        assert_eq!(keys[1], "users/country/NL");
        assert_eq!(keys[2], "sport/3/city/NL/Utrecht");
        assert_eq!(keys[3], "sport/3/friends/12");
        assert_eq!(keys[4], "teams/avg_sport_index");
    }

    #[test]
    fn test_target_deserializes_from_json() {
        let target: RankingTarget =
            serde_json::from_str(r#"{"kind":"user_index","scope":{"country":"FR"}}"#).unwrap();
        assert_eq!(
            target,
            RankingTarget::UserIndex {
                scope: RankScope::Country("FR".to_string())
            }
        );

        let target: RankingTarget =
            serde_json::from_str(r#"{"kind":"teams","metric":"total_distance"}"#).unwrap();
        assert_eq!(
            target,
            RankingTarget::Teams {
                metric: TeamMetric::TotalDistance
            }
        );
    }

    #[test]
    fn test_same_city_name_in_different_countries_has_distinct_keys() {
        let paris = |country: &str| {
            RankingTarget::UserIndex {
                scope: RankScope::City {
                    country: country.to_string(),
                    city: "Paris".to_string(),
                },
            }
            .scope_key()
        };
        assert_eq!(paris("US"), "users/city/US/Paris");
        assert_ne!(paris("US"), paris("FR"));

        let target: RankingTarget = serde_json::from_str(
            r#"{"kind":"user_index","scope":{"city":{"country":"FR","city":"Paris"}}}"#,
        )
        .unwrap();
        assert_eq!(target.scope_key(), "users/city/FR/Paris");
    }

    #[test]
    fn test_run_generation_increments() {
        let now = Utc::now();
        let first = RankingRun::next(None, "users/global", 10, now);
        let second = RankingRun::next(Some(&first), "users/global", 12, now);
        assert_eq!(first.generation, 1);
        assert_eq!(second.generation, 2);
        assert_eq!(second.total, 12);
        assert_eq!(RankingRun::doc_id("users/country/NL"), "users__country__NL");
    }
}

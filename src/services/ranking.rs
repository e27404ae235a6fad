// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Ranking assigner: dense ranks per scope.
//!
//! Every run reads the whole scope, sorts it, and rewrites the scope's rank
//! column. Ordering is by metric descending, then entity ID ascending, so
//! equal metrics still get distinct, reproducible ranks.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures_util::{stream, StreamExt};
use serde::Serialize;

use crate::db::{ActivitySource, SnapshotStore};
use crate::error::{AppError, Result};
use crate::models::{
    RankScope, RankingTarget, SportId, SportRankField, TeamMetric, TeamStatSnapshot, UserId,
    UserRankField, UserSportStatSnapshot, UserStatSnapshot,
};

/// Outcome of sorting one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseRanking<K> {
    /// Entities in rank order with their 1-based rank
    pub ranks: Vec<(K, u32)>,
    /// Entities whose metric is not finite; they get no rank
    pub excluded: Vec<K>,
}

impl<K: Copy + PartialEq> DenseRanking<K> {
    pub fn rank_of(&self, id: K) -> Option<u32> {
        self.ranks.iter().find(|(k, _)| *k == id).map(|(_, r)| *r)
    }

    /// Rank-column writes: ranked entities first, then clears.
    pub fn writes(&self) -> Vec<(K, Option<u32>)> {
        self.ranks
            .iter()
            .map(|(id, rank)| (*id, Some(*rank)))
            .chain(self.excluded.iter().map(|id| (*id, None)))
            .collect()
    }
}

/// Assign dense ranks 1..N to `entries` of `(id, metric)`.
pub fn dense_ranks<K, I>(entries: I) -> DenseRanking<K>
where
    K: Copy + Ord,
    I: IntoIterator<Item = (K, f64)>,
{
    let mut ranked = Vec::new();
    let mut excluded = Vec::new();
    for (id, metric) in entries {
        if metric.is_finite() {
            ranked.push((id, metric));
        } else {
            excluded.push(id);
        }
    }

    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    excluded.sort();

    let ranks = ranked
        .into_iter()
        .enumerate()
        .map(|(i, (id, _))| (id, i as u32 + 1))
        .collect();

    DenseRanking { ranks, excluded }
}

/// Result of ranking a single scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeSummary {
    pub scope: String,
    pub ranked: u32,
    /// Entities whose rank in this scope was cleared
    pub cleared: u32,
    /// Generation of the recorded run; `None` if the scope was empty
    pub generation: Option<u64>,
}

impl ScopeSummary {
    fn empty(scope: String) -> Self {
        Self {
            scope,
            ranked: 0,
            cleared: 0,
            generation: None,
        }
    }
}

/// Summary of a full ranking pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RankingReport {
    pub scopes: Vec<ScopeSummary>,
    /// Scope keys whose ranking failed
    pub failed: Vec<String>,
    /// Geographic ranks cleared for entities that left every such scope
    pub stale_cleared: u32,
}

impl RankingReport {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn is_complete_failure(&self) -> bool {
        self.scopes.is_empty() && !self.failed.is_empty()
    }

    pub fn is_partial_failure(&self) -> bool {
        !self.scopes.is_empty() && !self.failed.is_empty()
    }
}

fn in_geo_scope(country: &Option<String>, city: &Option<String>, scope: &RankScope) -> bool {
    match scope {
        RankScope::Global => true,
        RankScope::Country(c) => country.as_deref() == Some(c.as_str()),
        RankScope::City {
            country: scope_country,
            city: scope_city,
        } => {
            country.as_deref() == Some(scope_country.as_str())
                && city.as_deref() == Some(scope_city.as_str())
        }
        RankScope::Friends(_) => false,
    }
}

/// Global plus every distinct country and (country, city) pair among `rows`.
///
/// A city without a country belongs to no city scope.
fn geo_scopes<'a, I>(rows: I) -> Vec<RankScope>
where
    I: IntoIterator<Item = (&'a Option<String>, &'a Option<String>)>,
{
    let mut countries = BTreeSet::new();
    let mut cities = BTreeSet::new();
    for (country, city) in rows {
        if let Some(country) = country {
            countries.insert(country.clone());
            if let Some(city) = city {
                cities.insert((country.clone(), city.clone()));
            }
        }
    }

    std::iter::once(RankScope::Global)
        .chain(countries.into_iter().map(RankScope::Country))
        .chain(
            cities
                .into_iter()
                .map(|(country, city)| RankScope::City { country, city }),
        )
        .collect()
}

/// Owner plus friends, ranked by the scores present in `scores`.
fn friends_ranking(
    owner: UserId,
    friends: &[UserId],
    scores: &HashMap<UserId, f64>,
) -> DenseRanking<UserId> {
    let group: BTreeSet<UserId> = std::iter::once(owner).chain(friends.iter().copied()).collect();
    dense_ranks(
        group
            .into_iter()
            .filter_map(|id| scores.get(&id).map(|score| (id, *score))),
    )
}

fn sport_scores(rows: &[UserSportStatSnapshot]) -> HashMap<UserId, f64> {
    rows.iter()
        .map(|r| (r.user_id, r.performance_score))
        .collect()
}

/// Every snapshot a full ranking pass works from, read before any write.
struct RankingInputs {
    users: Vec<UserStatSnapshot>,
    sports: BTreeMap<SportId, Vec<UserSportStatSnapshot>>,
    /// Per sport, each user's performance score
    scores: BTreeMap<SportId, HashMap<UserId, f64>>,
    teams: Vec<TeamStatSnapshot>,
    /// Friend lists of every user holding a sport row
    friends: HashMap<UserId, Vec<UserId>>,
}

/// Users whose country/city rank the stale sweep must leave alone.
#[derive(Default)]
struct CoveredUsers {
    country: HashSet<UserId>,
    city: HashSet<UserId>,
    sport_country: HashSet<(SportId, UserId)>,
    sport_city: HashSet<(SportId, UserId)>,
}

impl CoveredUsers {
    /// Record the members of a geographic scope, whether or not its ranking succeeded.
    fn cover(&mut self, target: &RankingTarget, inputs: &RankingInputs) {
        match target {
            RankingTarget::UserIndex { scope } => {
                let ids = inputs
                    .users
                    .iter()
                    .filter(|r| in_geo_scope(&r.country, &r.city, scope))
                    .map(|r| r.user_id);
                match scope {
                    RankScope::Country(_) => self.country.extend(ids),
                    RankScope::City { .. } => self.city.extend(ids),
                    _ => {}
                }
            }
            RankingTarget::SportPerformance { sport_id, scope } => {
                let rows = inputs.sports.get(sport_id).map(Vec::as_slice).unwrap_or(&[]);
                let ids = rows
                    .iter()
                    .filter(|r| in_geo_scope(&r.country, &r.city, scope))
                    .map(|r| (*sport_id, r.user_id));
                match scope {
                    RankScope::Country(_) => self.sport_country.extend(ids),
                    RankScope::City { .. } => self.sport_city.extend(ids),
                    _ => {}
                }
            }
            RankingTarget::Teams { .. } => {}
        }
    }
}

pub struct RankingService {
    source: Arc<dyn ActivitySource>,
    store: Arc<dyn SnapshotStore>,
    concurrency: usize,
}

impl RankingService {
    pub fn new(
        source: Arc<dyn ActivitySource>,
        store: Arc<dyn SnapshotStore>,
        concurrency: usize,
    ) -> Self {
        Self {
            source,
            store,
            concurrency: concurrency.max(1),
        }
    }

    /// Re-rank a single scope.
    pub async fn recalculate_rankings(&self, target: &RankingTarget) -> Result<ScopeSummary> {
        match target {
            RankingTarget::UserIndex { scope } => {
                let rows = self.store.list_user_stats().await?;
                self.rank_users(scope, &rows).await
            }
            RankingTarget::SportPerformance {
                sport_id,
                scope: RankScope::Friends(owner),
            } => {
                let profile = self
                    .source
                    .get_user_profile(*owner)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("user {}", owner)))?;
                let rows = self.store.list_sport_stats(Some(*sport_id)).await?;
                self.rank_friends(*sport_id, *owner, &profile.friends, &sport_scores(&rows))
                    .await
            }
            RankingTarget::SportPerformance { sport_id, scope } => {
                let rows = self.store.list_sport_stats(Some(*sport_id)).await?;
                self.rank_sport(*sport_id, scope, &rows).await
            }
            RankingTarget::Teams { metric } => {
                let rows = self.store.list_team_stats().await?;
                self.rank_teams(*metric, &rows).await
            }
        }
    }

    /// Re-rank every scope present in the current snapshots.
    ///
    /// Users that no longer belong to any country or city scope have the
    /// matching rank cleared. Members of a scope whose ranking failed keep
    /// their previous rank.
    pub async fn recalculate_all_rankings(&self) -> Result<RankingReport> {
        let inputs = self.load_inputs().await?;

        let targets = Self::all_targets(&inputs);
        tracing::info!(scopes = targets.len(), "Starting ranking pass");

        let inputs = &inputs;
        let results: Vec<(RankingTarget, Result<ScopeSummary>)> = stream::iter(targets)
            .map(|target| async move {
                let result = self.rank_target(&target, inputs).await;
                (target, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = RankingReport::default();
        let mut covered = CoveredUsers::default();

        for (target, result) in results {
            covered.cover(&target, inputs);
            match result {
                Ok(summary) => report.scopes.push(summary),
                Err(e) => {
                    let scope = target.scope_key();
                    tracing::warn!(scope = %scope, error = %e, "Ranking scope failed");
                    report.failed.push(scope);
                }
            }
        }

        report.stale_cleared += self.clear_stale_user_ranks(&inputs.users, &covered).await?;
        report.stale_cleared += self
            .clear_stale_sport_ranks(&inputs.sports, &covered)
            .await?;

        report.scopes.sort_by(|a, b| a.scope.cmp(&b.scope));
        report.failed.sort();

        tracing::info!(
            scopes = report.scopes.len(),
            failed = report.failed.len(),
            stale_cleared = report.stale_cleared,
            "Ranking pass complete"
        );
        Ok(report)
    }

    async fn load_inputs(&self) -> Result<RankingInputs> {
        let mut sports: BTreeMap<SportId, Vec<UserSportStatSnapshot>> = BTreeMap::new();
        for row in self.store.list_sport_stats(None).await? {
            sports.entry(row.sport_id).or_default().push(row);
        }
        let scores = sports
            .iter()
            .map(|(sport_id, rows)| (*sport_id, sport_scores(rows)))
            .collect();

        let owners: BTreeSet<UserId> = sports
            .values()
            .flatten()
            .map(|r| r.user_id)
            .collect();
        let profiles: Vec<Result<(UserId, Vec<UserId>)>> = stream::iter(owners)
            .map(|user_id| async move {
                let profile = self.source.get_user_profile(user_id).await?;
                Ok((user_id, profile.map(|p| p.friends).unwrap_or_default()))
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        let friends = profiles.into_iter().collect::<Result<HashMap<_, _>>>()?;

        Ok(RankingInputs {
            users: self.store.list_user_stats().await?,
            sports,
            scores,
            teams: self.store.list_team_stats().await?,
            friends,
        })
    }

    fn all_targets(inputs: &RankingInputs) -> Vec<RankingTarget> {
        let mut targets: Vec<RankingTarget> = geo_scopes(
            inputs.users.iter().map(|r| (&r.country, &r.city)),
        )
        .into_iter()
        .map(|scope| RankingTarget::UserIndex { scope })
        .collect();

        for (sport_id, rows) in &inputs.sports {
            let scopes = geo_scopes(rows.iter().map(|r| (&r.country, &r.city)))
                .into_iter()
                .chain(rows.iter().map(|r| RankScope::Friends(r.user_id)));
            for scope in scopes {
                targets.push(RankingTarget::SportPerformance {
                    sport_id: *sport_id,
                    scope,
                });
            }
        }

        targets.extend(TeamMetric::ALL.map(|metric| RankingTarget::Teams { metric }));
        targets
    }

    async fn rank_target(
        &self,
        target: &RankingTarget,
        inputs: &RankingInputs,
    ) -> Result<ScopeSummary> {
        match target {
            RankingTarget::UserIndex { scope } => self.rank_users(scope, &inputs.users).await,
            RankingTarget::SportPerformance {
                sport_id,
                scope: RankScope::Friends(owner),
            } => {
                let friends = inputs.friends.get(owner).map(Vec::as_slice).unwrap_or(&[]);
                let empty = HashMap::new();
                let scores = inputs.scores.get(sport_id).unwrap_or(&empty);
                self.rank_friends(*sport_id, *owner, friends, scores).await
            }
            RankingTarget::SportPerformance { sport_id, scope } => {
                let rows = inputs.sports.get(sport_id).map(Vec::as_slice).unwrap_or(&[]);
                self.rank_sport(*sport_id, scope, rows).await
            }
            RankingTarget::Teams { metric } => self.rank_teams(*metric, &inputs.teams).await,
        }
    }

    async fn rank_users(
        &self,
        scope: &RankScope,
        rows: &[UserStatSnapshot],
    ) -> Result<ScopeSummary> {
        let field = match scope {
            RankScope::Global => UserRankField::Global,
            RankScope::Country(_) => UserRankField::Country,
            RankScope::City { .. } => UserRankField::City,
            RankScope::Friends(_) => {
                return Err(AppError::BadRequest(
                    "friends scope is only available for sport rankings".to_string(),
                ))
            }
        };
        let key = RankingTarget::UserIndex {
            scope: scope.clone(),
        }
        .scope_key();

        let ranking = dense_ranks(
            rows.iter()
                .filter(|r| in_geo_scope(&r.country, &r.city, scope))
                .map(|r| (r.user_id, r.sport_index)),
        );
        if ranking.ranks.is_empty() {
            return Ok(ScopeSummary::empty(key));
        }

        self.store.write_user_ranks(field, &ranking.writes()).await?;
        self.finish(key, ranking.ranks.len(), ranking.excluded.len())
            .await
    }

    async fn rank_sport(
        &self,
        sport_id: SportId,
        scope: &RankScope,
        rows: &[UserSportStatSnapshot],
    ) -> Result<ScopeSummary> {
        let field = match scope {
            RankScope::Global => SportRankField::Global,
            RankScope::Country(_) => SportRankField::Country,
            RankScope::City { .. } => SportRankField::City,
            RankScope::Friends(_) => SportRankField::Friends,
        };
        let key = RankingTarget::SportPerformance {
            sport_id,
            scope: scope.clone(),
        }
        .scope_key();

        let ranking = dense_ranks(
            rows.iter()
                .filter(|r| r.sport_id == sport_id)
                .filter(|r| in_geo_scope(&r.country, &r.city, scope))
                .map(|r| (r.user_id, r.performance_score)),
        );
        if ranking.ranks.is_empty() {
            return Ok(ScopeSummary::empty(key));
        }

        self.store
            .write_sport_ranks(sport_id, field, &ranking.writes())
            .await?;
        self.finish(key, ranking.ranks.len(), ranking.excluded.len())
            .await
    }

    /// Rank an owner among their friends; only the owner's row carries the rank.
    async fn rank_friends(
        &self,
        sport_id: SportId,
        owner: UserId,
        friends: &[UserId],
        scores: &HashMap<UserId, f64>,
    ) -> Result<ScopeSummary> {
        let key = RankingTarget::SportPerformance {
            sport_id,
            scope: RankScope::Friends(owner),
        }
        .scope_key();

        let ranking = friends_ranking(owner, friends, scores);
        if ranking.ranks.is_empty() || !scores.contains_key(&owner) {
            return Ok(ScopeSummary::empty(key));
        }

        let rank = ranking.rank_of(owner);
        self.store
            .write_sport_ranks(sport_id, SportRankField::Friends, &[(owner, rank)])
            .await?;
        self.finish(key, ranking.ranks.len(), usize::from(rank.is_none()))
            .await
    }

    async fn rank_teams(
        &self,
        metric: TeamMetric,
        rows: &[TeamStatSnapshot],
    ) -> Result<ScopeSummary> {
        let key = RankingTarget::Teams { metric }.scope_key();

        let ranking = dense_ranks(rows.iter().map(|r| (r.team_id, r.metric(metric))));
        if ranking.ranks.is_empty() {
            return Ok(ScopeSummary::empty(key));
        }

        self.store
            .write_team_ranks(metric, &ranking.writes())
            .await?;
        self.finish(key, ranking.ranks.len(), ranking.excluded.len())
            .await
    }

    async fn finish(&self, key: String, ranked: usize, cleared: usize) -> Result<ScopeSummary> {
        let run = self
            .store
            .record_ranking_run(&key, ranked as u32, Utc::now())
            .await?;

        tracing::info!(
            scope = %key,
            ranked,
            cleared,
            generation = run.generation,
            "Scope ranked"
        );

        Ok(ScopeSummary {
            scope: key,
            ranked: ranked as u32,
            cleared: cleared as u32,
            generation: Some(run.generation),
        })
    }

    async fn clear_stale_user_ranks(
        &self,
        rows: &[UserStatSnapshot],
        covered: &CoveredUsers,
    ) -> Result<u32> {
        let stale_country: Vec<(UserId, Option<u32>)> = rows
            .iter()
            .filter(|r| r.country_rank.is_some() && !covered.country.contains(&r.user_id))
            .map(|r| (r.user_id, None))
            .collect();
        let stale_city: Vec<(UserId, Option<u32>)> = rows
            .iter()
            .filter(|r| r.city_rank.is_some() && !covered.city.contains(&r.user_id))
            .map(|r| (r.user_id, None))
            .collect();

        if !stale_country.is_empty() {
            self.store
                .write_user_ranks(UserRankField::Country, &stale_country)
                .await?;
        }
        if !stale_city.is_empty() {
            self.store
                .write_user_ranks(UserRankField::City, &stale_city)
                .await?;
        }
        Ok((stale_country.len() + stale_city.len()) as u32)
    }

    async fn clear_stale_sport_ranks(
        &self,
        sports: &BTreeMap<SportId, Vec<UserSportStatSnapshot>>,
        covered: &CoveredUsers,
    ) -> Result<u32> {
        let mut cleared = 0;
        for (sport_id, rows) in sports {
            let stale_country: Vec<(UserId, Option<u32>)> = rows
                .iter()
                .filter(|r| {
                    r.country_rank.is_some()
                        && !covered.sport_country.contains(&(*sport_id, r.user_id))
                })
                .map(|r| (r.user_id, None))
                .collect();
            let stale_city: Vec<(UserId, Option<u32>)> = rows
                .iter()
                .filter(|r| {
                    r.city_rank.is_some() && !covered.sport_city.contains(&(*sport_id, r.user_id))
                })
                .map(|r| (r.user_id, None))
                .collect();

            if !stale_country.is_empty() {
                self.store
                    .write_sport_ranks(*sport_id, SportRankField::Country, &stale_country)
                    .await?;
            }
            if !stale_city.is_empty() {
                self.store
                    .write_sport_ranks(*sport_id, SportRankField::City, &stale_city)
                    .await?;
            }
            cleared += (stale_country.len() + stale_city.len()) as u32;
        }
        Ok(cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_dense(ranking: &DenseRanking<u64>) {
        let ranks: Vec<u32> = ranking.ranks.iter().map(|(_, r)| *r).collect();
        let expected: Vec<u32> = (1..=ranking.ranks.len() as u32).collect();
        assert_eq!(ranks, expected);
    }

    #[test]
    fn test_descending_by_metric() {
        let ranking = dense_ranks(vec![(1u64, 10.0), (2, 30.0), (3, 20.0)]);
        assert_eq!(ranking.ranks, vec![(2, 1), (3, 2), (1, 3)]);
        assert_dense(&ranking);
    }

    #[test]
    fn test_ties_broken_by_ascending_id() {
        let ranking = dense_ranks(vec![(9u64, 5.0), (3, 5.0), (7, 5.0), (1, 1.0)]);
        assert_eq!(ranking.ranks, vec![(3, 1), (7, 2), (9, 3), (1, 4)]);
        assert_dense(&ranking);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let a = dense_ranks(vec![(1u64, 2.0), (2, 2.0), (3, 8.0)]);
        let b = dense_ranks(vec![(3u64, 8.0), (2, 2.0), (1, 2.0)]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_non_finite_metrics_excluded() {
        let ranking = dense_ranks(vec![
            (1u64, f64::NAN),
            (2, 4.0),
            (3, f64::INFINITY),
            (4, 9.0),
        ]);
        assert_eq!(ranking.ranks, vec![(4, 1), (2, 2)]);
        assert_eq!(ranking.excluded, vec![1, 3]);
        assert_eq!(
            ranking.writes(),
            vec![(4, Some(1)), (2, Some(2)), (1, None), (3, None)]
        );
    }

    #[test]
    fn test_empty_scope() {
        let ranking: DenseRanking<u64> = dense_ranks(Vec::new());
        assert!(ranking.ranks.is_empty());
        assert!(ranking.writes().is_empty());
    }

    #[test]
    fn test_rank_of() {
        let ranking = dense_ranks(vec![(5u64, 1.0), (6, 2.0)]);
        assert_eq!(ranking.rank_of(6), Some(1));
        assert_eq!(ranking.rank_of(5), Some(2));
        assert_eq!(ranking.rank_of(7), None);
    }

    #[test]
    fn test_city_scope_requires_matching_country() {
        let paris_fr = RankScope::City {
            country: "FR".to_string(),
            city: "Paris".to_string(),
        };
        let fr = Some("FR".to_string());
        let us = Some("US".to_string());
        let paris = Some("Paris".to_string());

        assert!(in_geo_scope(&fr, &paris, &paris_fr));
        assert!(!in_geo_scope(&us, &paris, &paris_fr));
        assert!(!in_geo_scope(&None, &paris, &paris_fr));
    }

    #[test]
    fn test_geo_scopes_pair_city_with_country() {
        let rows = [
            (Some("FR".to_string()), Some("Paris".to_string())),
            (Some("US".to_string()), Some("Paris".to_string())),
            (None, Some("Nowhere".to_string())),
        ];
        let scopes = geo_scopes(rows.iter().map(|(country, city)| (country, city)));

        let city_keys: Vec<String> = scopes
            .iter()
            .filter(|s| matches!(s, RankScope::City { .. }))
            .map(|scope| {
                RankingTarget::UserIndex {
                    scope: scope.clone(),
                }
                .scope_key()
            })
            .collect();
        assert_eq!(city_keys, vec!["users/city/FR/Paris", "users/city/US/Paris"]);
        assert_eq!(scopes.len(), 5);
    }

    #[test]
    fn test_friends_ranking_uses_only_the_group() {
        let scores: HashMap<UserId, f64> =
            [(1, 50.0), (2, 80.0), (3, 20.0), (9, 999.0)].into_iter().collect();
        let ranking = friends_ranking(1, &[2, 3, 4], &scores);

        assert_eq!(ranking.ranks, vec![(2, 1), (1, 2), (3, 3)]);
        assert_eq!(ranking.rank_of(9), None);
    }

    #[test]
    fn test_report_classification() {
        let mut report = RankingReport::default();
        assert!(report.is_complete_success());

        report.scopes.push(ScopeSummary::empty("users/global".to_string()));
        report.failed.push("users/city/Utrecht".to_string());
        assert!(!report.is_complete_success());
        assert!(report.is_partial_failure());
    }
}

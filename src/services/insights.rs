// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Percentile standing and rule-driven insight messages.
//!
//! Insights come from an ordered list of declarative rules. Each rule pairs
//! a predicate with a message template and a display priority; adding an
//! insight means adding a rule, not another branch.

use serde::Serialize;

use crate::models::{
    Insight, StreakStatus, StreakView, UserSportStatSnapshot, UserStatSnapshot,
};

/// `round((total - rank) / total * 100)`, or `None` when `rank` is not
/// within `1..=total`.
pub fn percentile(rank: u32, total: u32) -> Option<u8> {
    if rank == 0 || total == 0 || rank > total {
        return None;
    }
    let pct = (f64::from(total - rank) / f64::from(total) * 100.0).round();
    Some(pct as u8)
}

/// Rank within a scope together with the scope size it was computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub rank: u32,
    pub total: u32,
    pub percentile: u8,
}

impl Standing {
    pub fn new(rank: Option<u32>, total: Option<u32>) -> Option<Self> {
        let (rank, total) = (rank?, total?);
        Some(Self {
            rank,
            total,
            percentile: percentile(rank, total)?,
        })
    }
}

/// Everything rules may look at for one user.
#[derive(Debug, Clone)]
pub struct InsightContext<'a> {
    pub stats: Option<&'a UserStatSnapshot>,
    pub sports: &'a [UserSportStatSnapshot],
    pub streak: &'a StreakView,
    pub global: Option<Standing>,
}

/// Condition a rule checks. Each match yields placeholder bindings.
#[derive(Debug, Clone, PartialEq)]
pub enum InsightPredicate {
    GlobalRankWithin(u32),
    CountryRankWithin(u32),
    CityRankWithin(u32),
    GlobalPercentileAtLeast(u8),
    /// Matches once per sport whose performance score exceeds the threshold
    SportPerformanceAbove(f64),
    /// Current index equals the best ever and is positive
    NewPersonalBest,
    StreakAtLeast(u32),
    StreakAtRisk,
    WeeklyGoalMet,
}

type Bindings = Vec<(&'static str, String)>;

impl InsightPredicate {
    fn matches(&self, ctx: &InsightContext<'_>) -> Vec<Bindings> {
        let mut out = Vec::new();
        match self {
            InsightPredicate::GlobalRankWithin(n) => {
                if let Some(rank) = ctx.stats.and_then(|s| s.global_rank) {
                    if rank <= *n {
                        out.push(vec![("rank", rank.to_string())]);
                    }
                }
            }
            InsightPredicate::CountryRankWithin(n) => {
                if let Some(s) = ctx.stats {
                    if let (Some(rank), Some(country)) = (s.country_rank, &s.country) {
                        if rank <= *n {
                            out.push(vec![("rank", rank.to_string()), ("country", country.clone())]);
                        }
                    }
                }
            }
            InsightPredicate::CityRankWithin(n) => {
                if let Some(s) = ctx.stats {
                    if let (Some(rank), Some(city)) = (s.city_rank, &s.city) {
                        if rank <= *n {
                            out.push(vec![("rank", rank.to_string()), ("city", city.clone())]);
                        }
                    }
                }
            }
            InsightPredicate::GlobalPercentileAtLeast(p) => {
                if let Some(standing) = ctx.global {
                    if standing.percentile >= *p {
                        out.push(vec![("percentile", standing.percentile.to_string())]);
                    }
                }
            }
            InsightPredicate::SportPerformanceAbove(threshold) => {
                for sport in ctx.sports {
                    if sport.performance_score > *threshold {
                        out.push(vec![
                            ("sport_id", sport.sport_id.to_string()),
                            ("score", format!("{:.1}", sport.performance_score)),
                        ]);
                    }
                }
            }
            InsightPredicate::NewPersonalBest => {
                if let Some(s) = ctx.stats {
                    if s.sport_index > 0.0 && s.sport_index >= s.sport_index_best {
                        out.push(vec![("index", format!("{:.1}", s.sport_index))]);
                    }
                }
            }
            InsightPredicate::StreakAtLeast(days) => {
                if ctx.streak.current_streak >= *days {
                    out.push(vec![("days", ctx.streak.current_streak.to_string())]);
                }
            }
            InsightPredicate::StreakAtRisk => {
                if ctx.streak.status == StreakStatus::AtRisk {
                    out.push(vec![("days", ctx.streak.current_streak.to_string())]);
                }
            }
            InsightPredicate::WeeklyGoalMet => {
                if ctx.streak.has_record && ctx.streak.weekly_progress >= ctx.streak.weekly_goal {
                    out.push(vec![
                        ("progress", ctx.streak.weekly_progress.to_string()),
                        ("goal", ctx.streak.weekly_goal.to_string()),
                    ]);
                }
            }
        }
        out
    }
}

/// A declarative insight rule.
#[derive(Debug, Clone, PartialEq)]
pub struct InsightRule {
    pub id: &'static str,
    pub priority: u8,
    pub predicate: InsightPredicate,
    /// Message with `{name}` placeholders
    pub template: &'static str,
}

fn render(template: &str, bindings: &Bindings) -> String {
    bindings
        .iter()
        .fold(template.to_string(), |msg, (name, value)| {
            msg.replace(&format!("{{{}}}", name), value)
        })
}

/// Built-in rules, in declaration order.
pub fn default_rules() -> Vec<InsightRule> {
    vec![
        InsightRule {
            id: "streak_at_risk",
            priority: 95,
            predicate: InsightPredicate::StreakAtRisk,
            template: "Your {days}-day streak ends today unless you log an activity",
        },
        InsightRule {
            id: "global_top_1000",
            priority: 90,
            predicate: InsightPredicate::GlobalRankWithin(1000),
            template: "You are #{rank} worldwide",
        },
        InsightRule {
            id: "country_top_100",
            priority: 80,
            predicate: InsightPredicate::CountryRankWithin(100),
            template: "You are #{rank} in {country}",
        },
        InsightRule {
            id: "city_top_10",
            priority: 80,
            predicate: InsightPredicate::CityRankWithin(10),
            template: "You are #{rank} in {city}",
        },
        InsightRule {
            id: "streak_week",
            priority: 70,
            predicate: InsightPredicate::StreakAtLeast(7),
            template: "{days} days in a row. Keep it going!",
        },
        InsightRule {
            id: "personal_best",
            priority: 70,
            predicate: InsightPredicate::NewPersonalBest,
            template: "New personal best sport index: {index}",
        },
        InsightRule {
            id: "top_decile",
            priority: 60,
            predicate: InsightPredicate::GlobalPercentileAtLeast(90),
            template: "You are ahead of {percentile}% of athletes",
        },
        InsightRule {
            id: "weekly_goal_met",
            priority: 50,
            predicate: InsightPredicate::WeeklyGoalMet,
            template: "Weekly goal reached: {progress} of {goal} days",
        },
        InsightRule {
            id: "strong_sport",
            priority: 40,
            predicate: InsightPredicate::SportPerformanceAbove(100.0),
            template: "Strong form in sport {sport_id}: score {score}",
        },
    ]
}

/// Evaluate `rules` in order and return insights, highest priority first.
///
/// Equal priorities keep rule declaration order.
pub fn evaluate(rules: &[InsightRule], ctx: &InsightContext<'_>) -> Vec<Insight> {
    let mut insights: Vec<Insight> = rules
        .iter()
        .flat_map(|rule| {
            rule.predicate
                .matches(ctx)
                .into_iter()
                .map(move |bindings| Insight {
                    rule_id: rule.id.to_string(),
                    priority: rule.priority,
                    message: render(rule.template, &bindings),
                })
        })
        .collect();

    // sort_by is stable
    insights.sort_by(|a, b| b.priority.cmp(&a.priority));
    insights
}

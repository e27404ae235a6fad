// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod aggregation;
pub mod insights;
pub mod ranking;
pub mod scoring;
pub mod stats;
pub mod streak;

pub use aggregation::{AggregationReport, AggregationService, PartialAggregationWarning};
pub use ranking::{RankingReport, RankingService, ScopeSummary};
pub use scoring::{ScoringConfig, ScoringFunction, WeightedScoring};
pub use stats::StatsService;
pub use streak::{StreakService, StreakUpdate};

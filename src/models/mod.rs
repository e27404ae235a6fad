// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the engine.

pub mod activity;
pub mod insight;
pub mod ranking;
pub mod stats;
pub mod streak;

pub use activity::{ActivityRecord, SportId, Team, TeamId, UserId, UserProfile};
pub use insight::Insight;
pub use ranking::{RankScope, RankingRun, RankingTarget, SportRankField, TeamMetric, UserRankField};
pub use stats::{TeamStatSnapshot, UserSportStatSnapshot, UserStatSnapshot};
pub use streak::{StreakOutcome, StreakState, StreakStatus, StreakView};

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Pluggable scoring of activity records.
//!
//! Aggregation never hard-codes a formula: it calls a [`ScoringFunction`]
//! supplied at start-up. The stock implementation is [`WeightedScoring`],
//! a per-sport weighted sum configured from JSON.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::models::{ActivityRecord, SportId};

/// Scores a set of activity records.
pub trait ScoringFunction: Send + Sync {
    /// Score `activities`. With `sport = Some(id)` only that sport's records
    /// count (per-sport performance score); with `None` every record counts
    /// (composite sport index).
    fn score(&self, activities: &[ActivityRecord], sport: Option<SportId>)
        -> Result<f64, ScoringError>;
}

/// Errors raised by a scoring function.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScoringError {
    #[error("Invalid input for activity {activity_id}: {reason}")]
    InvalidInput { activity_id: u64, reason: String },

    #[error("Score is not a finite number")]
    NonFinite,
}

/// Weights applied to one sport's activities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SportWeights {
    #[serde(default)]
    pub per_km: f64,
    #[serde(default)]
    pub per_minute: f64,
    #[serde(default)]
    pub per_kcal: f64,
    /// Weight of the sport-specific primary value (count, laps, ...)
    #[serde(default)]
    pub per_unit: f64,
}

impl Default for SportWeights {
    fn default() -> Self {
        Self {
            per_km: 10.0,
            per_minute: 1.0,
            per_kcal: 0.0,
            per_unit: 0.0,
        }
    }
}

impl SportWeights {
    fn is_valid(&self) -> bool {
        [self.per_km, self.per_minute, self.per_kcal, self.per_unit]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0)
    }
}

/// Scoring configuration document.
///
/// ```json
/// { "default": { "per_km": 10, "per_minute": 1 },
///   "sports": { "2": { "per_minute": 2, "per_unit": 5 } } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub default: SportWeights,
    #[serde(default)]
    pub sports: BTreeMap<SportId, SportWeights>,
}

impl ScoringConfig {
    /// Load a scoring configuration from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScoringConfigError> {
        let json_data = fs::read_to_string(path.as_ref())
            .map_err(|e| ScoringConfigError::IoError(e.to_string()))?;
        Self::load_from_json(&json_data)
    }

    /// Load a scoring configuration from a JSON string.
    pub fn load_from_json(json_data: &str) -> Result<Self, ScoringConfigError> {
        let config: ScoringConfig = serde_json::from_str(json_data)
            .map_err(|e| ScoringConfigError::ParseError(e.to_string()))?;

        if !config.default.is_valid() {
            return Err(ScoringConfigError::InvalidWeights("default".to_string()));
        }
        if let Some((sport_id, _)) = config.sports.iter().find(|(_, w)| !w.is_valid()) {
            return Err(ScoringConfigError::InvalidWeights(format!("sport {}", sport_id)));
        }

        tracing::info!(sports = config.sports.len(), "Loaded scoring config");
        Ok(config)
    }

    pub fn weights_for(&self, sport_id: SportId) -> &SportWeights {
        self.sports.get(&sport_id).unwrap_or(&self.default)
    }
}

/// Errors from loading a scoring configuration.
#[derive(Debug, thiserror::Error)]
pub enum ScoringConfigError {
    #[error("Failed to read file: {0}")]
    IoError(String),

    #[error("Failed to parse scoring config: {0}")]
    ParseError(String),

    #[error("Weights for {0} must be finite and non-negative")]
    InvalidWeights(String),
}

/// Weighted sum of distance, duration, calories and primary value.
#[derive(Debug, Clone, Default)]
pub struct WeightedScoring {
    config: ScoringConfig,
}

impl WeightedScoring {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }
}

fn check_input(activity: &ActivityRecord) -> Result<(), ScoringError> {
    let fields = [
        ("distance_meters", activity.distance_meters),
        ("calories", activity.calories),
        ("primary_value", activity.primary_value),
    ];
    for (name, value) in fields {
        if !value.is_finite() || value < 0.0 {
            return Err(ScoringError::InvalidInput {
                activity_id: activity.activity_id,
                reason: format!("{} = {}", name, value),
            });
        }
    }
    Ok(())
}

impl ScoringFunction for WeightedScoring {
    fn score(
        &self,
        activities: &[ActivityRecord],
        sport: Option<SportId>,
    ) -> Result<f64, ScoringError> {
        let mut total = 0.0;
        for activity in activities
            .iter()
            .filter(|a| sport.map_or(true, |s| a.sport_id == s))
        {
            check_input(activity)?;
            let w = self.config.weights_for(activity.sport_id);
            total += w.per_km * activity.distance_meters / 1000.0
                + w.per_minute * f64::from(activity.duration_seconds) / 60.0
                + w.per_kcal * activity.calories
                + w.per_unit * activity.primary_value;
        }

        if total.is_finite() {
            Ok(total)
        } else {
            Err(ScoringError::NonFinite)
        }
    }
}

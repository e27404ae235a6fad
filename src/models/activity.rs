// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Activity and profile models supplied by the ingest side.

use crate::time_utils::{local_date, MAX_UTC_OFFSET_SECONDS};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

pub type UserId = u64;
pub type TeamId = u64;
pub type SportId = u32;

/// Immutable activity fact produced by the ingest side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ActivityRecord {
    /// Activity ID (also used as document ID)
    pub activity_id: u64,
    /// Owner
    pub user_id: UserId,
    pub sport_id: SportId,
    #[serde(default)]
    pub discipline_id: Option<u32>,
    /// Start instant (UTC)
    pub start_date: DateTime<Utc>,
    /// Offset of the user's local clock when the activity started
    #[serde(default)]
    #[validate(custom(function = "validate_utc_offset"))]
    pub utc_offset_seconds: i32,
    /// Sport-specific headline value (distance, duration or repetition count)
    #[validate(range(min = 0.0))]
    pub primary_value: f64,
    pub duration_seconds: u32,
    #[validate(range(min = 0.0))]
    pub distance_meters: f64,
    #[validate(range(min = 0.0))]
    pub calories: f64,
}

impl ActivityRecord {
    /// Calendar day of this activity in the user's local time.
    pub fn local_date(&self) -> NaiveDate {
        local_date(self.start_date, self.utc_offset_seconds)
    }
}

fn validate_utc_offset(offset: i32) -> Result<(), ValidationError> {
    if offset.abs() > MAX_UTC_OFFSET_SECONDS {
        return Err(ValidationError::new("utc_offset_out_of_range"));
    }
    Ok(())
}

/// The subset of a user profile the engine needs for scoping ranks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub friends: Vec<UserId>,
}

/// Team roster as seen by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub team_id: TeamId,
    #[serde(default)]
    pub members: Vec<UserId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn activity(offset: i32) -> ActivityRecord {
        ActivityRecord {
            activity_id: 1,
            user_id: 7,
            sport_id: 1,
            discipline_id: None,
            start_date: Utc.with_ymd_and_hms(2024, 1, 10, 22, 0, 0).unwrap(),
            utc_offset_seconds: offset,
            primary_value: 5000.0,
            duration_seconds: 1800,
            distance_meters: 5000.0,
            calories: 350.0,
        }
    }

    #[test]
    fn test_local_date_uses_activity_offset() {
        assert_eq!(
            activity(0).local_date(),
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()
        );
        assert_eq!(
            activity(3 * 3600).local_date(),
            NaiveDate::from_ymd_opt(2024, 1, 11).unwrap()
        );
    }

    #[test]
    fn test_validation_rejects_negative_distance() {
        let mut a = activity(0);
        assert!(a.validate().is_ok());
        a.distance_meters = -1.0;
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_absurd_offset() {
        let a = activity(20 * 3600);
        assert!(a.validate().is_err());
    }

    #[test]
    fn test_deserialize_defaults_optional_fields() {
        let json = r#"{
            "activity_id": 3,
            "user_id": 9,
            "sport_id": 2,
            "start_date": "2024-01-10T08:00:00Z",
            "primary_value": 1.0,
            "duration_seconds": 60,
            "distance_meters": 0.0,
            "calories": 10.0
        }"#;
        let a: ActivityRecord = serde_json::from_str(json).unwrap();
        assert_eq!(a.utc_offset_seconds, 0);
        assert_eq!(a.discipline_id, None);
    }
}

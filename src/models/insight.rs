//! Insight messages derived from snapshots at read time. Never persisted.

use serde::{Deserialize, Serialize};

/// A rendered insight for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    /// ID of the rule that produced this insight
    pub rule_id: String,
    /// Display ordering only; higher first
    pub priority: u8,
    pub message: String,
}

//! Selection records - how often a selector has picked a given candidate.

use serde::{Deserialize, Serialize};
use crate::id::{SelectionId, UserId};
use crate::Time;

/// A directed, weighted edge from the selector to a selected candidate.
///
/// At most one record exists per `(selector_id, selected_id)` pair. A pair
/// without a record counts as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    /// Unique identifier
    pub id: SelectionId,

    /// The user doing the choosing
    pub selector_id: UserId,

    /// The candidate that was chosen
    pub selected_id: UserId,

    /// Times chosen, net of manual adjustments
    pub count: u32,

    /// Last updated
    pub updated_at: Time,
}

impl Selection {
    /// Create a record for a pair with the given count.
    pub fn new(selector_id: UserId, selected_id: UserId, count: u32) -> Self {
        Self {
            id: SelectionId::new(),
            selector_id,
            selected_id,
            count,
            updated_at: chrono::Utc::now(),
        }
    }

    /// Whether this record belongs to the given pair.
    pub fn is_pair(&self, selector_id: UserId, selected_id: UserId) -> bool {
        self.selector_id == selector_id && self.selected_id == selected_id
    }
}

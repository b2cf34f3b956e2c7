//! Fair-selection engine.
//!
//! Pure functions over an in-memory snapshot of the roster and a selector's
//! counts. Picks the next reviewer so that counts stay as even as possible and
//! applies clamped manual adjustments. Nothing here touches storage; the only
//! nondeterminism is the tie-break, which comes from the caller's RNG.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::id::UserId;
use crate::selection::Selection;
use crate::user::User;

/// Current count for a candidate, zero when no record exists.
///
/// `selections` is expected to hold a single selector's records.
pub fn count_for(selections: &[Selection], candidate: UserId) -> u32 {
    selections
        .iter()
        .find(|s| s.selected_id == candidate)
        .map(|s| s.count)
        .unwrap_or(0)
}

/// Choose the next reviewer among `users`.
///
/// Candidates are grouped by their current count and one member of the
/// lowest-count group is drawn uniformly at random. `users` must already be
/// limited to eligible candidates (no archived users, not the selector).
/// Returns `None` when there is nobody to choose from.
pub fn choose_reviewer<'a, R>(
    users: &'a [User],
    selections: &[Selection],
    rng: &mut R,
) -> Option<&'a User>
where
    R: Rng + ?Sized,
{
    let mut groups: BTreeMap<u32, Vec<&'a User>> = BTreeMap::new();
    for user in users {
        groups
            .entry(count_for(selections, user.id))
            .or_default()
            .push(user);
    }

    let (_, lowest) = groups.into_iter().next()?;
    lowest.choose(rng).copied()
}

/// The count to persist after applying `delta` to a pair.
///
/// `current` is the pair's existing count, or `None` when no record exists.
/// Existing counts are clamped at zero. A missing pair only gets a record
/// (with count 1) on a positive delta; otherwise `None` means nothing to write.
pub fn adjusted_count(current: Option<u32>, delta: i32) -> Option<u32> {
    match current {
        Some(count) => {
            let next = i64::from(count) + i64::from(delta);
            Some(next.clamp(0, i64::from(u32::MAX)) as u32)
        }
        None if delta > 0 => Some(1),
        None => None,
    }
}

/// Apply a manual (or choice-implied) adjustment to one pair.
///
/// Returns the updated set of selections; the input is left untouched.
pub fn apply_count_adjustment(
    selections: &[Selection],
    selector_id: UserId,
    candidate_id: UserId,
    delta: i32,
) -> Vec<Selection> {
    let mut updated = selections.to_vec();

    match updated
        .iter_mut()
        .find(|s| s.is_pair(selector_id, candidate_id))
    {
        Some(existing) => {
            if let Some(count) = adjusted_count(Some(existing.count), delta) {
                if count != existing.count {
                    existing.count = count;
                    existing.updated_at = chrono::Utc::now();
                }
            }
        }
        None => {
            if let Some(count) = adjusted_count(None, delta) {
                updated.push(Selection::new(selector_id, candidate_id, count));
            }
        }
    }

    updated
}

/// One row of a selector's standings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standing {
    /// The candidate
    pub user: User,
    /// How many times the selector has chosen them
    pub count: u32,
}

/// A selector's view of the roster and their counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionSnapshot {
    /// The user doing the choosing
    pub selector: UserId,
    /// Roster as fetched, in display order
    pub users: Vec<User>,
    /// The selector's selection records
    pub selections: Vec<Selection>,
}

impl SelectionSnapshot {
    /// Build a snapshot from fetched rows.
    pub fn new(selector: UserId, users: Vec<User>, selections: Vec<Selection>) -> Self {
        Self {
            selector,
            users,
            selections,
        }
    }

    /// An empty snapshot for a selector that has not loaded anything yet.
    pub fn empty(selector: UserId) -> Self {
        Self::new(selector, Vec::new(), Vec::new())
    }

    /// Users that may be chosen: active and not the selector.
    pub fn candidates(&self) -> impl Iterator<Item = &User> {
        self.users
            .iter()
            .filter(move |u| !u.is_archived && u.id != self.selector)
    }

    /// Whether `id` is currently a valid candidate.
    pub fn is_candidate(&self, id: UserId) -> bool {
        self.candidates().any(|u| u.id == id)
    }

    fn own_selections(&self) -> Vec<Selection> {
        self.selections
            .iter()
            .filter(|s| s.selector_id == self.selector)
            .cloned()
            .collect()
    }

    /// Current count for a candidate.
    pub fn count_for(&self, candidate: UserId) -> u32 {
        count_for(&self.own_selections(), candidate)
    }

    /// Pick the next reviewer from this snapshot.
    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<User> {
        let candidates: Vec<User> = self.candidates().cloned().collect();
        choose_reviewer(&candidates, &self.own_selections(), rng).cloned()
    }

    /// A new snapshot with `delta` applied to the selector's count for `candidate`.
    pub fn adjust(&self, candidate: UserId, delta: i32) -> Self {
        Self {
            selector: self.selector,
            users: self.users.clone(),
            selections: apply_count_adjustment(&self.selections, self.selector, candidate, delta),
        }
    }

    /// Candidates with their counts, in roster order.
    pub fn standings(&self) -> Vec<Standing> {
        let own = self.own_selections();
        self.candidates()
            .map(|user| Standing {
                user: user.clone(),
                count: count_for(&own, user.id),
            })
            .collect()
    }
}

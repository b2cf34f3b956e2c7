//! The selection session controller.
//!
//! Owns one selector's snapshot for the lifetime of a session:
//! ```text
//! load snapshot → engine decides → persist → reload
//! ```
//! Mutating methods take `&mut self`, so a session never starts a second write
//! before the previous one has resolved.

use std::sync::Arc;

use fairpick_core::{adjusted_count, CurrentUser, SelectionSnapshot, Standing, User, UserId};
use fairpick_storage::{ChangeEvent, SelectionStore, Subscription, Table};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use crate::{Result, SessionConfig, SessionError};

/// Result of asking for a reviewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChooseOutcome {
    /// A reviewer was picked and the pick was recorded
    Chosen {
        /// The chosen reviewer
        reviewer: User,
        /// Their count after this pick
        count: u32,
    },
    /// Nobody could be chosen; nothing was written
    NoEligibleCandidates,
}

/// Subscriptions a session holds while it follows remote changes.
pub struct SessionWatch {
    users: Subscription,
    selections: Subscription,
}

impl SessionWatch {
    /// Release both subscriptions.
    pub fn unsubscribe(self) {
        self.users.unsubscribe();
        self.selections.unsubscribe();
    }
}

/// One selector's session over a shared store.
pub struct SelectionSession<S: SelectionStore> {
    store: Arc<S>,
    current: CurrentUser,
    snapshot: SelectionSnapshot,
    rng: StdRng,
}

impl<S: SelectionStore> SelectionSession<S> {
    /// Open a session for `current` and load its first snapshot.
    pub async fn open(store: Arc<S>, current: CurrentUser, config: SessionConfig) -> Result<Self> {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut session = Self {
            store,
            snapshot: SelectionSnapshot::empty(current.id),
            current,
            rng,
        };
        session.refresh().await?;
        Ok(session)
    }

    /// The acting user.
    pub fn current_user(&self) -> &CurrentUser {
        &self.current
    }

    /// The last successfully loaded snapshot.
    pub fn snapshot(&self) -> &SelectionSnapshot {
        &self.snapshot
    }

    /// Candidates and their counts.
    pub fn standings(&self) -> Vec<Standing> {
        self.snapshot.standings()
    }

    /// Reload roster and counts. The snapshot is only replaced on success.
    pub async fn refresh(&mut self) -> Result<()> {
        let id = self.current.id;
        let (users, selections) = tokio::try_join!(
            self.store.list_users(Some(id), false),
            self.store.list_selections(id),
        )
        .map_err(|e| {
            warn!("Failed to load snapshot for {}: {}", self.current.name, e);
            e
        })?;

        debug!(
            "Loaded snapshot for {}: {} candidates, {} selections",
            self.current.name,
            users.len(),
            selections.len()
        );
        self.snapshot = SelectionSnapshot::new(id, users, selections);
        Ok(())
    }

    async fn reload_selections(&mut self) -> Result<()> {
        let selections = self.store.list_selections(self.current.id).await?;
        self.snapshot = SelectionSnapshot::new(self.current.id, self.snapshot.users.clone(), selections);
        Ok(())
    }

    /// Pick a reviewer and record the pick.
    pub async fn choose(&mut self) -> Result<ChooseOutcome> {
        let Some(reviewer) = self.snapshot.choose(&mut self.rng) else {
            info!("No available reviewers for {}", self.current.name);
            return Ok(ChooseOutcome::NoEligibleCandidates);
        };

        let count = self.persist_adjustment(reviewer.id, 1).await?;
        info!("{} has been chosen as reviewer for {}", reviewer.name, self.current.name);
        Ok(ChooseOutcome::Chosen { reviewer, count })
    }

    /// Manually adjust a candidate's count by `delta`, clamped at zero.
    ///
    /// Returns the candidate's count after the adjustment.
    pub async fn adjust(&mut self, candidate: UserId, delta: i32) -> Result<u32> {
        if !self.snapshot.is_candidate(candidate) {
            return Err(SessionError::UnknownCandidate(candidate));
        }
        self.persist_adjustment(candidate, delta).await
    }

    /// Add one to a candidate's count.
    pub async fn increment(&mut self, candidate: UserId) -> Result<u32> {
        self.adjust(candidate, 1).await
    }

    /// Take one off a candidate's count.
    pub async fn decrement(&mut self, candidate: UserId) -> Result<u32> {
        self.adjust(candidate, -1).await
    }

    async fn persist_adjustment(&mut self, candidate: UserId, delta: i32) -> Result<u32> {
        let selector = self.current.id;

        // Work from the stored count, not the snapshot, to keep the race window small.
        let current = self
            .store
            .list_selections(selector)
            .await?
            .into_iter()
            .find(|s| s.selected_id == candidate)
            .map(|s| s.count);

        let stored = match adjusted_count(current, delta) {
            Some(count) if Some(count) != current => {
                match self.store.upsert_selection_count(selector, candidate, count).await {
                    Ok(selection) => selection.count,
                    Err(e) => {
                        warn!("Failed to update count for {}: {}", candidate, e);
                        return Err(e.into());
                    }
                }
            }
            _ => {
                debug!("Count for {} unchanged", candidate);
                current.unwrap_or(0)
            }
        };

        // The write has landed; a failed reload only leaves the snapshot stale.
        if let Err(e) = self.reload_selections().await {
            warn!("Count for {} saved but reload failed, snapshot is stale: {}", candidate, e);
        }
        Ok(stored)
    }

    /// Subscribe to roster and count changes.
    pub fn watch(&self) -> SessionWatch {
        SessionWatch {
            users: self.store.subscribe(Table::Users),
            selections: self.store.subscribe(Table::Selections),
        }
    }

    /// Wait for the next change seen by `watch`, then refresh.
    ///
    /// Returns `Ok(None)` once the store stops publishing.
    pub async fn next_change(&mut self, watch: &mut SessionWatch) -> Result<Option<ChangeEvent>> {
        let event = tokio::select! {
            event = watch.users.changed() => event,
            event = watch.selections.changed() => event,
        };

        let Some(event) = event else {
            return Ok(None);
        };

        debug!("Change on {} ({:?}), refreshing", event.table, event.kind);
        self.refresh().await?;
        Ok(Some(event))
    }

    /// Refresh once if `watch` has changes queued, without waiting.
    ///
    /// Returns whether a refresh happened.
    pub async fn sync_pending(&mut self, watch: &mut SessionWatch) -> Result<bool> {
        let mut pending = false;
        while watch.users.try_changed().is_some() {
            pending = true;
        }
        while watch.selections.try_changed().is_some() {
            pending = true;
        }

        if pending {
            self.refresh().await?;
        }
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{open_store, FlakyStore};
    use std::collections::HashSet;

    async fn team(store: &FlakyStore, names: &[&str]) -> Vec<User> {
        let mut users = Vec::new();
        for name in names {
            users.push(store.create_user(name).await.unwrap());
        }
        users
    }

    async fn session_for(store: &Arc<FlakyStore>, user: &User) -> SelectionSession<FlakyStore> {
        SelectionSession::open(store.clone(), user.as_current(), SessionConfig::default().with_seed(1))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_choose_records_pick() {
        let (_dir, store) = open_store().await;
        let users = team(&store, &["Me", "Al", "Bo"]).await;
        let mut session = session_for(&store, &users[0]).await;

        let ChooseOutcome::Chosen { reviewer, count } = session.choose().await.unwrap() else {
            panic!("expected a reviewer");
        };

        assert_ne!(reviewer.id, users[0].id);
        assert_eq!(count, 1);
        assert_eq!(session.snapshot().count_for(reviewer.id), 1);
        let stored = store.list_selections(users[0].id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].selected_id, reviewer.id);
    }

    #[tokio::test]
    async fn test_choices_rotate_through_team() {
        let (_dir, store) = open_store().await;
        let users = team(&store, &["Me", "Al", "Bo", "Cy"]).await;
        let mut session = session_for(&store, &users[0]).await;

        let mut seen = HashSet::new();
        for _ in 0..3 {
            if let ChooseOutcome::Chosen { reviewer, .. } = session.choose().await.unwrap() {
                seen.insert(reviewer.id);
            }
        }

        // Three picks over three tied candidates must cover all of them.
        assert_eq!(seen.len(), 3);
        assert!(session.standings().iter().all(|s| s.count == 1));
    }

    #[tokio::test]
    async fn test_choose_without_candidates_writes_nothing() {
        let (_dir, store) = open_store().await;
        let users = team(&store, &["Me", "Gone"]).await;
        store.set_archived(users[1].id, true).await.unwrap();
        let mut session = session_for(&store, &users[0]).await;

        assert_eq!(session.choose().await.unwrap(), ChooseOutcome::NoEligibleCandidates);
        assert!(store.list_selections(users[0].id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_manual_adjustments_clamp_at_zero() {
        let (_dir, store) = open_store().await;
        let users = team(&store, &["Me", "Al"]).await;
        let mut session = session_for(&store, &users[0]).await;

        // No record and nothing to decrement.
        assert_eq!(session.decrement(users[1].id).await.unwrap(), 0);
        assert!(store.list_selections(users[0].id).await.unwrap().is_empty());

        assert_eq!(session.increment(users[1].id).await.unwrap(), 1);
        assert_eq!(session.increment(users[1].id).await.unwrap(), 2);
        assert_eq!(session.decrement(users[1].id).await.unwrap(), 1);
        assert_eq!(session.decrement(users[1].id).await.unwrap(), 0);
        assert_eq!(session.decrement(users[1].id).await.unwrap(), 0);

        let stored = store.list_selections(users[0].id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].count, 0);
    }

    #[tokio::test]
    async fn test_adjusting_non_candidate_is_rejected() {
        let (_dir, store) = open_store().await;
        let users = team(&store, &["Me", "Al"]).await;
        let mut session = session_for(&store, &users[0]).await;

        let err = session.increment(users[0].id).await.unwrap_err();
        assert!(matches!(err, SessionError::UnknownCandidate(id) if id == users[0].id));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_snapshot_intact() {
        let (_dir, store) = open_store().await;
        let users = team(&store, &["Me", "Al"]).await;
        let mut session = session_for(&store, &users[0]).await;
        session.increment(users[1].id).await.unwrap();
        let before = session.snapshot().clone();

        store.fail_writes(true);
        let err = session.increment(users[1].id).await.unwrap_err();
        assert!(matches!(err, SessionError::Persistence(_)));
        assert_eq!(session.snapshot(), &before);

        let err = session.choose().await.unwrap_err();
        assert!(matches!(err, SessionError::Persistence(_)));
        assert_eq!(session.snapshot(), &before);

        store.fail_writes(false);
        assert_eq!(session.increment(users[1].id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_choice_stands_when_reload_fails() {
        let (_dir, store) = open_store().await;
        let users = team(&store, &["Me", "Al"]).await;
        let mut session = session_for(&store, &users[0]).await;

        store.fail_reads_after_next_write();
        let outcome = session.choose().await.unwrap();

        assert_eq!(
            outcome,
            ChooseOutcome::Chosen { reviewer: users[1].clone(), count: 1 }
        );
        // Snapshot is stale until the next successful refresh.
        assert_eq!(session.snapshot().count_for(users[1].id), 0);

        store.fail_reads(false);
        assert_eq!(store.list_selections(users[0].id).await.unwrap()[0].count, 1);
        session.refresh().await.unwrap();
        assert_eq!(session.snapshot().count_for(users[1].id), 1);
    }

    #[tokio::test]
    async fn test_adjustment_stands_when_reload_fails() {
        let (_dir, store) = open_store().await;
        let users = team(&store, &["Me", "Al"]).await;
        let mut session = session_for(&store, &users[0]).await;
        session.increment(users[1].id).await.unwrap();

        store.fail_reads_after_next_write();
        assert_eq!(session.increment(users[1].id).await.unwrap(), 2);
        assert_eq!(session.snapshot().count_for(users[1].id), 1);

        store.fail_reads(false);
        assert_eq!(store.list_selections(users[0].id).await.unwrap()[0].count, 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_snapshot() {
        let (_dir, store) = open_store().await;
        let users = team(&store, &["Me", "Al"]).await;
        let mut session = session_for(&store, &users[0]).await;
        let before = session.snapshot().clone();

        store.fail_reads(true);
        assert!(session.refresh().await.is_err());
        assert_eq!(session.snapshot(), &before);
    }

    #[tokio::test]
    async fn test_selectors_track_independently() {
        let (_dir, store) = open_store().await;
        let users = team(&store, &["Ann", "Ben", "Al", "Bo"]).await;
        let mut ann = session_for(&store, &users[0]).await;
        let mut ben = session_for(&store, &users[1]).await;

        ann.increment(users[2].id).await.unwrap();
        ann.increment(users[2].id).await.unwrap();

        ben.refresh().await.unwrap();
        assert_eq!(ben.snapshot().count_for(users[2].id), 0);

        // Ann must now get Ben or Bo, never Al.
        for _ in 0..2 {
            if let ChooseOutcome::Chosen { reviewer, .. } = ann.choose().await.unwrap() {
                assert_ne!(reviewer.id, users[2].id);
            }
        }
    }

    #[tokio::test]
    async fn test_watch_refreshes_on_remote_change() {
        let (_dir, store) = open_store().await;
        let users = team(&store, &["Me", "Al"]).await;
        let mut session = session_for(&store, &users[0]).await;
        let mut watch = session.watch();

        let newcomer = store.create_user("Bo").await.unwrap();
        let event = session.next_change(&mut watch).await.unwrap().unwrap();

        assert_eq!(event.table, Table::Users);
        assert!(session.snapshot().is_candidate(newcomer.id));

        store.set_archived(users[1].id, true).await.unwrap();
        session.next_change(&mut watch).await.unwrap();
        assert!(!session.snapshot().is_candidate(users[1].id));

        watch.unsubscribe();
        assert_eq!(store.inner().feed().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_watch_sees_other_sessions_writes() {
        let (_dir, store) = open_store().await;
        let users = team(&store, &["Me", "Al"]).await;
        let mut mine = session_for(&store, &users[0]).await;
        let mut second_tab = session_for(&store, &users[0]).await;
        let mut watch = mine.watch();

        second_tab.increment(users[1].id).await.unwrap();
        let event = mine.next_change(&mut watch).await.unwrap().unwrap();

        assert_eq!(event.table, Table::Selections);
        assert_eq!(mine.snapshot().count_for(users[1].id), 1);
    }

    #[tokio::test]
    async fn test_sync_pending_only_refreshes_when_needed() {
        let (_dir, store) = open_store().await;
        let users = team(&store, &["Me", "Al"]).await;
        let mut session = session_for(&store, &users[0]).await;
        let mut watch = session.watch();

        assert!(!session.sync_pending(&mut watch).await.unwrap());

        let bo = store.create_user("Bo").await.unwrap();
        let cy = store.create_user("Cy").await.unwrap();
        assert!(session.sync_pending(&mut watch).await.unwrap());
        assert!(session.snapshot().is_candidate(bo.id));
        assert!(session.snapshot().is_candidate(cy.id));

        assert!(!session.sync_pending(&mut watch).await.unwrap());
    }
}

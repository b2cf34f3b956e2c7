//! Change notification for stored tables.
//!
//! Backed by a tokio broadcast channel. Each [`Subscription`] watches one
//! table; dropping it (or calling [`Subscription::unsubscribe`]) releases it.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Default number of buffered notifications per subscriber.
pub const DEFAULT_FEED_CAPACITY: usize = 256;

/// Tables that can be watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    /// Roster members
    Users,
    /// Selection counts
    Selections,
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Table::Users => write!(f, "users"),
            Table::Selections => write!(f, "selections"),
        }
    }
}

/// What happened to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// A new row was written
    Insert,
    /// An existing row was rewritten
    Update,
    /// Notifications were dropped; the subscriber should reload everything
    Resync,
}

/// A single row change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Table the row lives in
    pub table: Table,
    /// Kind of change
    pub kind: ChangeKind,
    /// Id of the changed row, when known
    pub id: Option<String>,
}

impl ChangeEvent {
    /// A change to a known row.
    pub fn new(table: Table, kind: ChangeKind, id: impl ToString) -> Self {
        Self {
            table,
            kind,
            id: Some(id.to_string()),
        }
    }

    fn resync(table: Table) -> Self {
        Self {
            table,
            kind: ChangeKind::Resync,
            id: None,
        }
    }
}

/// Fan-out point for change notifications.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    /// Create a feed buffering up to `capacity` notifications per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Announce a change. Returns how many subscriptions received it.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        debug!("Publishing {:?} on {}", event.kind, event.table);
        self.tx.send(event).unwrap_or(0)
    }

    /// Watch one table.
    pub fn subscribe(&self, table: Table) -> Subscription {
        Subscription {
            table,
            rx: Some(self.tx.subscribe()),
        }
    }

    /// Number of live subscriptions across all tables.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

/// A live subscription to one table.
pub struct Subscription {
    table: Table,
    rx: Option<broadcast::Receiver<ChangeEvent>>,
}

impl Subscription {
    /// The watched table.
    pub fn table(&self) -> Table {
        self.table
    }

    /// Wait for the next change on the watched table.
    ///
    /// Returns `None` once the subscription is released or the store is gone.
    pub async fn changed(&mut self) -> Option<ChangeEvent> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.recv().await {
                Ok(event) if event.table == self.table => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    debug!("Subscription on {} lagged by {}", self.table, missed);
                    return Some(ChangeEvent::resync(self.table));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take an already-delivered change without waiting.
    pub fn try_changed(&mut self) -> Option<ChangeEvent> {
        let rx = self.rx.as_mut()?;
        loop {
            match rx.try_recv() {
                Ok(event) if event.table == self.table => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    return Some(ChangeEvent::resync(self.table));
                }
                Err(_) => return None,
            }
        }
    }

    /// Stop receiving notifications.
    pub fn unsubscribe(mut self) {
        self.rx = None;
    }

    /// Whether the subscription is still live.
    pub fn is_active(&self) -> bool {
        self.rx.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscription_filters_by_table() {
        let feed = ChangeFeed::default();
        let mut users = feed.subscribe(Table::Users);

        feed.publish(ChangeEvent::new(Table::Selections, ChangeKind::Insert, "s1"));
        feed.publish(ChangeEvent::new(Table::Users, ChangeKind::Update, "u1"));

        let event = users.changed().await.unwrap();
        assert_eq!(event.table, Table::Users);
        assert_eq!(event.id.as_deref(), Some("u1"));
        assert!(users.try_changed().is_none());
    }

    #[test]
    fn test_unsubscribe_releases_receiver() {
        let feed = ChangeFeed::default();
        let sub = feed.subscribe(Table::Selections);
        assert_eq!(feed.subscriber_count(), 1);

        sub.unsubscribe();
        assert_eq!(feed.subscriber_count(), 0);
        assert_eq!(feed.publish(ChangeEvent::new(Table::Selections, ChangeKind::Insert, "s1")), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_gets_resync() {
        let feed = ChangeFeed::new(2);
        let mut sub = feed.subscribe(Table::Users);

        for i in 0..5 {
            feed.publish(ChangeEvent::new(Table::Users, ChangeKind::Update, i));
        }

        let event = sub.changed().await.unwrap();
        assert_eq!(event.kind, ChangeKind::Resync);
    }

    #[tokio::test]
    async fn test_closed_feed_ends_subscription() {
        let feed = ChangeFeed::default();
        let mut sub = feed.subscribe(Table::Users);
        drop(feed);

        assert!(sub.changed().await.is_none());
    }
}

// 📡 Realtime - per-table change notifications and self-refreshing views
//
// Notifications carry no row data. Subscribers react by refetching
// everything they show ("refetch and replace"), so a missed or duplicated
// notification only costs an extra fetch.

use crate::error::StoreResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default number of buffered notifications per subscriber
pub const FEED_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Transactions,
    Categories,
    Providers,
    Departments,
    Positions,
    UserPositions,
    Activities,
    ProcessInstances,
}

impl Table {
    /// Tables scoped by owning user
    pub const EXPENSE: &'static [Table] = &[Table::Transactions, Table::Categories, Table::Providers];

    /// Tables scoped by organization
    pub const ORG: &'static [Table] = &[
        Table::Departments,
        Table::Positions,
        Table::UserPositions,
        Table::Activities,
        Table::ProcessInstances,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub table: Table,
    /// Owning user id (expense tables) or org id (org tables)
    pub scope: String,
    pub kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_id: Option<String>,
}

impl Change {
    pub fn new(table: Table, scope: &str, kind: ChangeKind, row_id: Option<&str>) -> Self {
        Change {
            table,
            scope: scope.to_string(),
            kind,
            row_id: row_id.map(String::from),
        }
    }
}

/// What a subscriber receives
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum Notification {
    Change(Change),
    /// The subscriber fell behind and notifications were dropped; refetch
    Resync { skipped: u64 },
}

// ============================================================================
// CHANGE FEED
// ============================================================================

#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<Change>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(FEED_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        ChangeFeed { sender }
    }

    /// Returns the number of subscribers that will see the change
    pub fn publish(&self, change: Change) -> usize {
        debug!(table = ?change.table, scope = %change.scope, kind = ?change.kind, "change published");
        // No subscribers is not an error
        self.sender.send(change).unwrap_or(0)
    }

    pub fn subscribe(&self, tables: &[Table], scope: &str) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            tables: tables.to_vec(),
            scope: scope.to_string(),
        }
    }
}

/// Receives the changes of some tables within one scope
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<Change>,
    tables: Vec<Table>,
    scope: String,
}

impl Subscription {
    pub fn matches(&self, change: &Change) -> bool {
        change.scope == self.scope && self.tables.contains(&change.table)
    }

    /// Next matching notification; `None` once the feed is gone
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(change) if self.matches(&change) => return Some(Notification::Change(change)),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(scope = %self.scope, skipped, "subscriber lagged; forcing resync");
                    return Some(Notification::Resync { skipped });
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// ============================================================================
// LIVE VIEW
// ============================================================================

/// A snapshot that is fetched on mount and fully refetched after every
/// notification. Fetches run one after another, so the last one to finish
/// is the one kept. A failed fetch keeps the previous snapshot.
pub struct LiveView<T> {
    receiver: watch::Receiver<Option<Arc<T>>>,
    task: JoinHandle<()>,
}

impl<T> LiveView<T>
where
    T: Send + Sync + 'static,
{
    /// Must be called inside a tokio runtime
    pub fn mount<F>(mut subscription: Subscription, fetch: F) -> Self
    where
        F: Fn() -> StoreResult<T> + Send + Sync + 'static,
    {
        let (sender, receiver) = watch::channel(None);
        let fetch = Arc::new(fetch);

        let task = tokio::spawn(async move {
            if !refresh(&sender, &fetch).await {
                return;
            }
            while subscription.recv().await.is_some() {
                if !refresh(&sender, &fetch).await {
                    break;
                }
            }
        });

        LiveView { receiver, task }
    }

    /// Latest snapshot, `None` until the first fetch succeeds
    pub fn snapshot(&self) -> Option<Arc<T>> {
        (*self.receiver.borrow()).clone()
    }

    /// Wait for the first successful fetch
    pub async fn ready(&mut self) -> Option<Arc<T>> {
        let value = self.receiver.wait_for(Option::is_some).await.ok()?;
        (*value).clone()
    }

    /// Wait for the next refetch to land
    pub async fn changed(&mut self) -> Option<Arc<T>> {
        self.receiver.changed().await.ok()?;
        (*self.receiver.borrow_and_update()).clone()
    }
}

impl<T> Drop for LiveView<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run one fetch; false once nobody is watching anymore
async fn refresh<T, F>(sender: &watch::Sender<Option<Arc<T>>>, fetch: &Arc<F>) -> bool
where
    T: Send + Sync + 'static,
    F: Fn() -> StoreResult<T> + Send + Sync + 'static,
{
    let fetch = Arc::clone(fetch);

    match tokio::task::spawn_blocking(move || fetch()).await {
        Ok(Ok(value)) => sender.send(Some(Arc::new(value))).is_ok(),
        Ok(Err(e)) => {
            warn!(error = %e, "live view refetch failed; keeping previous snapshot");
            !sender.is_closed()
        }
        Err(e) => {
            warn!(error = %e, "live view refetch panicked");
            !sender.is_closed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_subscription_filters_table_and_scope() {
        let feed = ChangeFeed::default();
        let mut sub = feed.subscribe(Table::EXPENSE, "alice");

        feed.publish(Change::new(Table::Transactions, "bob", ChangeKind::Insert, Some("t1")));
        feed.publish(Change::new(Table::Departments, "alice", ChangeKind::Insert, None));
        feed.publish(Change::new(Table::Providers, "alice", ChangeKind::Delete, Some("p1")));

        let next = sub.recv().await.unwrap();
        assert_eq!(
            next,
            Notification::Change(Change::new(
                Table::Providers,
                "alice",
                ChangeKind::Delete,
                Some("p1")
            ))
        );
    }

    #[tokio::test]
    async fn test_lagged_subscriber_gets_resync() {
        let feed = ChangeFeed::new(2);
        let mut sub = feed.subscribe(&[Table::Transactions], "alice");

        for i in 0..5 {
            feed.publish(Change::new(
                Table::Transactions,
                "alice",
                ChangeKind::Insert,
                Some(&i.to_string()),
            ));
        }

        assert!(matches!(sub.recv().await, Some(Notification::Resync { skipped: 3 })));
        assert!(matches!(sub.recv().await, Some(Notification::Change(_))));
    }

    #[tokio::test]
    async fn test_closed_feed_ends_subscription() {
        let feed = ChangeFeed::default();
        let mut sub = feed.subscribe(&[Table::Transactions], "alice");
        drop(feed);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_live_view_refetches_on_change() {
        let feed = ChangeFeed::default();
        let fetches = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fetches);
        let mut view = LiveView::mount(feed.subscribe(Table::ORG, "o1"), move || {
            Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
        });

        assert_eq!(view.ready().await.as_deref(), Some(&1));

        feed.publish(Change::new(Table::ProcessInstances, "o1", ChangeKind::Insert, None));
        let next = tokio::time::timeout(Duration::from_secs(5), view.changed())
            .await
            .unwrap();
        assert_eq!(next.as_deref(), Some(&2));
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_live_view_keeps_snapshot_on_error() {
        let feed = ChangeFeed::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let mut view = LiveView::mount(feed.subscribe(&[Table::Activities], "o1"), move || {
            match counter.fetch_add(1, Ordering::SeqCst) {
                1 => Err(StoreError::Validation("boom".to_string())),
                n => Ok(n),
            }
        });

        assert_eq!(view.ready().await.as_deref(), Some(&0));

        // Second fetch fails, third succeeds
        feed.publish(Change::new(Table::Activities, "o1", ChangeKind::Update, None));
        feed.publish(Change::new(Table::Activities, "o1", ChangeKind::Update, None));

        let next = tokio::time::timeout(Duration::from_secs(5), view.changed())
            .await
            .unwrap();
        assert_eq!(next.as_deref(), Some(&2));
    }
}

//! Transaction history and notification stores.
//!
//! The engine only talks to the traits. Implementations serialize their own
//! writes; the in-memory ones here back the batch terminal and the tests.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::model::{MerchantId, TransactionResult, TxId};
use crate::notification::{NotificationId, RawNotification};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("notification {0} not found")]
    NotificationNotFound(NotificationId),
}

/// Append-only record of processed transactions.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, result: TransactionResult) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: TxId) -> Result<Option<TransactionResult>, StoreError>;

    /// Most recent first.
    async fn list_by_merchant(
        &self,
        merchant: MerchantId,
    ) -> Result<Vec<TransactionResult>, StoreError>;
}

/// Append-only notification feed.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn append(&self, notification: RawNotification) -> Result<(), StoreError>;

    /// Most recent first.
    async fn list(&self, merchant: MerchantId) -> Result<Vec<RawNotification>, StoreError>;

    /// Flip `processed` to true. Returns whether the flag changed; marking an
    /// already processed notification is a no-op.
    async fn mark_processed(&self, id: NotificationId) -> Result<bool, StoreError>;
}

#[derive(Debug, Default)]
struct HistoryState {
    results: Vec<TransactionResult>,
    index: HashMap<TxId, usize>,
}

/// In-memory [`HistoryStore`].
#[derive(Debug, Default)]
pub struct MemoryHistory {
    state: RwLock<HistoryState>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn append(&self, result: TransactionResult) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let position = state.results.len();
        state.index.insert(result.transaction_id, position);
        state.results.push(result);
        Ok(())
    }

    async fn find_by_id(&self, id: TxId) -> Result<Option<TransactionResult>, StoreError> {
        let state = self.state.read().await;
        Ok(state.index.get(&id).map(|&position| state.results[position].clone()))
    }

    async fn list_by_merchant(
        &self,
        merchant: MerchantId,
    ) -> Result<Vec<TransactionResult>, StoreError> {
        let state = self.state.read().await;
        // newest insert first, then a stable sort keeps it first among equal timestamps
        let mut results: Vec<TransactionResult> = state
            .results
            .iter()
            .rev()
            .filter(|result| result.merchant == merchant)
            .cloned()
            .collect();
        results.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(results)
    }
}

/// In-memory [`NotificationStore`].
#[derive(Debug, Default)]
pub struct MemoryNotifications {
    notifications: RwLock<Vec<RawNotification>>,
}

impl MemoryNotifications {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotifications {
    async fn append(&self, notification: RawNotification) -> Result<(), StoreError> {
        self.notifications.write().await.push(notification);
        Ok(())
    }

    async fn list(&self, merchant: MerchantId) -> Result<Vec<RawNotification>, StoreError> {
        let notifications = self.notifications.read().await;
        let mut listed: Vec<RawNotification> = notifications
            .iter()
            .rev()
            .filter(|notification| notification.merchant == merchant)
            .cloned()
            .collect();
        listed.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(listed)
    }

    async fn mark_processed(&self, id: NotificationId) -> Result<bool, StoreError> {
        let mut notifications = self.notifications.write().await;
        let notification = notifications
            .iter_mut()
            .find(|notification| notification.id == id)
            .ok_or(StoreError::NotificationNotFound(id))?;
        Ok(notification.mark_processed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Currency, TransactionStatus, TransactionType};
    use crate::notification::Notification;
    use crate::{Amount, Mti};
    use chrono::{TimeDelta, Utc};
    use uuid::Uuid;

    fn result(merchant: MerchantId, age_secs: i64) -> TransactionResult {
        TransactionResult {
            transaction_id: Uuid::new_v4(),
            merchant,
            transaction_type: TransactionType::Sale,
            status: TransactionStatus::Approved,
            amount: Amount::from_units(5),
            currency: Currency::Eur,
            approval_code: Some("123456".into()),
            response_code: Some("00".into()),
            response_message: None,
            mti: Mti::FINANCIAL_RESPONSE,
            protocol: "POS Terminal -201.1".into(),
            reference: None,
            timestamp: Utc::now() - TimeDelta::seconds(age_secs),
        }
    }

    #[tokio::test]
    async fn history_find_by_id() {
        let history = MemoryHistory::new();
        let stored = result(1, 0);
        history.append(stored.clone()).await.unwrap();

        assert_eq!(history.find_by_id(stored.transaction_id).await.unwrap(), Some(stored));
        assert_eq!(history.find_by_id(Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn history_lists_most_recent_first_per_merchant() {
        let history = MemoryHistory::new();
        let old = result(1, 60);
        let newest = result(1, 0);
        let middle = result(1, 30);
        let other_merchant = result(2, 0);

        for r in [old.clone(), newest.clone(), middle.clone(), other_merchant] {
            history.append(r).await.unwrap();
        }

        let ids: Vec<TxId> = history
            .list_by_merchant(1)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.transaction_id)
            .collect();
        assert_eq!(
            ids,
            [newest.transaction_id, middle.transaction_id, old.transaction_id]
        );
        assert!(history.list_by_merchant(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn notifications_list_and_mark_processed() {
        let store = MemoryNotifications::new();
        let first = Notification::for_result(&result(1, 10)).encode();
        let second = Notification::for_result(&result(1, 0)).encode();
        store.append(first.clone()).await.unwrap();
        store.append(second.clone()).await.unwrap();
        store
            .append(Notification::for_result(&result(2, 0)).encode())
            .await
            .unwrap();

        let listed = store.list(1).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert!(listed.iter().all(|n| !n.processed));

        assert!(store.mark_processed(first.id).await.unwrap());
        // second call is a no-op, not an error
        assert!(!store.mark_processed(first.id).await.unwrap());

        let listed = store.list(1).await.unwrap();
        assert!(listed.iter().find(|n| n.id == first.id).unwrap().processed);
        assert!(!listed.iter().find(|n| n.id == second.id).unwrap().processed);
    }

    #[tokio::test]
    async fn mark_unknown_notification_fails() {
        let store = MemoryNotifications::new();
        let id = Uuid::new_v4();
        assert_eq!(
            store.mark_processed(id).await,
            Err(StoreError::NotificationNotFound(id))
        );
    }
}

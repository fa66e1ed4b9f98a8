use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::session::{CustomerId, Session};

/// Exclusive access to one customer's session for the length of a message.
/// Other messages from the same customer wait on `acquire` until the lease drops.
pub struct SessionLease {
    guard: OwnedMutexGuard<Session>,
}

impl SessionLease {
    pub fn session(&self) -> &Session {
        &self.guard
    }

    /// Replaces the stored session; nothing is written unless this is called.
    pub fn commit(&mut self, next: Session) {
        *self.guard = next;
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns the customer's session, creating a fresh one on first contact.
    async fn acquire(&self, customer_id: &CustomerId, now: DateTime<Utc>) -> SessionLease;

    /// Snapshot without taking the lease; `None` for unknown customers.
    async fn get(&self, customer_id: &CustomerId) -> Option<Session>;

    async fn reset(&self, customer_id: &CustomerId, now: DateTime<Utc>);

    /// Drops sessions idle for longer than `idle_timeout`. Sessions held by an
    /// in-flight message are skipped. Returns how many were evicted.
    async fn evict_idle(&self, now: DateTime<Utc>, idle_timeout: Duration) -> usize;

    async fn len(&self) -> usize;
}

type Slot = Arc<AsyncMutex<Session>>;

#[derive(Default)]
pub struct InMemorySessionStore {
    slots: Mutex<HashMap<CustomerId, Slot>>,
}

impl InMemorySessionStore {
    fn slot(&self, customer_id: &CustomerId, now: DateTime<Utc>) -> Slot {
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(slots.entry(customer_id.clone()).or_insert_with(|| {
            Arc::new(AsyncMutex::new(Session::new(customer_id.clone(), now)))
        }))
    }

    fn existing(&self, customer_id: &CustomerId) -> Option<Slot> {
        let slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots.get(customer_id).cloned()
    }

    fn is_current(&self, customer_id: &CustomerId, slot: &Slot) -> bool {
        self.existing(customer_id).is_some_and(|current| Arc::ptr_eq(&current, slot))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn acquire(&self, customer_id: &CustomerId, now: DateTime<Utc>) -> SessionLease {
        loop {
            let slot = self.slot(customer_id, now);
            let guard = Arc::clone(&slot).lock_owned().await;
            // Eviction may have removed the slot while we waited for it.
            if self.is_current(customer_id, &slot) {
                return SessionLease { guard };
            }
        }
    }

    async fn get(&self, customer_id: &CustomerId) -> Option<Session> {
        let slot = self.existing(customer_id)?;
        let session = slot.lock().await.clone();
        Some(session)
    }

    async fn reset(&self, customer_id: &CustomerId, now: DateTime<Utc>) {
        if let Some(slot) = self.existing(customer_id) {
            slot.lock().await.reset(now);
        }
    }

    async fn evict_idle(&self, now: DateTime<Utc>, idle_timeout: Duration) -> usize {
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        let before = slots.len();
        slots.retain(|_, slot| match slot.try_lock() {
            Ok(session) => now - session.last_activity <= idle_timeout,
            Err(_) => true,
        });
        before - slots.len()
    }

    async fn len(&self) -> usize {
        match self.slots.lock() {
            Ok(slots) => slots.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use super::{InMemorySessionStore, SessionStore};
    use crate::domain::session::{CustomerId, Stage};

    fn customer() -> CustomerId {
        CustomerId("U1".to_owned())
    }

    #[tokio::test]
    async fn acquire_creates_an_idle_session_lazily() {
        let store = InMemorySessionStore::default();
        assert!(store.get(&customer()).await.is_none());

        let lease = store.acquire(&customer(), Utc::now()).await;
        assert_eq!(lease.session().stage, Stage::Idle);
        assert!(lease.session().cart.is_empty());
        drop(lease);

        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn uncommitted_changes_are_discarded() {
        let store = InMemorySessionStore::default();
        let now = Utc::now();
        {
            let mut lease = store.acquire(&customer(), now).await;
            let mut next = lease.session().clone();
            next.stage = Stage::Confirming;
            lease.commit(next);
        }
        {
            let lease = store.acquire(&customer(), now).await;
            let mut scratch = lease.session().clone();
            scratch.stage = Stage::PickingVariant;
        }

        let stored = store.get(&customer()).await.expect("session exists");
        assert_eq!(stored.stage, Stage::Confirming);
    }

    #[tokio::test]
    async fn concurrent_messages_for_one_customer_are_serialized() {
        let store = Arc::new(InMemorySessionStore::default());
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut lease = store.acquire(&CustomerId("U1".to_owned()), now).await;
                let mut next = lease.session().clone();
                tokio::task::yield_now().await;
                next.address = Some(format!("{}x", next.address.unwrap_or_default()));
                lease.commit(next);
            }));
        }
        for handle in handles {
            handle.await.expect("task completes");
        }

        let stored = store.get(&customer()).await.expect("session exists");
        assert_eq!(stored.address.map(|address| address.len()), Some(20));
    }

    #[tokio::test]
    async fn reset_returns_the_session_to_idle() {
        let store = InMemorySessionStore::default();
        let now = Utc::now();
        {
            let mut lease = store.acquire(&customer(), now).await;
            let mut next = lease.session().clone();
            next.stage = Stage::CollectingDeliveryInfo;
            lease.commit(next);
        }

        store.reset(&customer(), now).await;

        assert_eq!(store.get(&customer()).await.map(|session| session.stage), Some(Stage::Idle));
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted_but_leased_ones_are_kept() {
        let store = InMemorySessionStore::default();
        let start = Utc::now();
        drop(store.acquire(&customer(), start).await);
        let busy = CustomerId("U2".to_owned());
        let held = store.acquire(&busy, start).await;

        let evicted = store.evict_idle(start + Duration::minutes(31), Duration::minutes(30)).await;

        assert_eq!(evicted, 1);
        assert!(store.get(&customer()).await.is_none());
        drop(held);
        assert_eq!(store.len().await, 1);
    }
}

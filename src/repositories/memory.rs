//! `dashmap` backed stores for tests and local runs without a database.

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::{
    CatalogItem, Enrollment, LinkStatus, LinkSuggestion, Order, OrderStatus, UserIdentity,
};

use super::{CatalogSource, EnrollmentDirectory, OrderStore, SuggestionStore, UserDirectory};

#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: DashMap<Uuid, Order>,
    /// Live key to the order holding it. Never touched while an `orders` guard is held.
    live: DashMap<String, Uuid>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn all(&self) -> Vec<Order> {
        self.orders.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Claims `key` for `order_id`. `Ok(true)` when this call took it.
    fn claim(&self, key: &str, order_id: Uuid) -> Result<bool, ServiceError> {
        match self.live.entry(key.to_string()) {
            Entry::Occupied(held) if *held.get() == order_id => Ok(false),
            Entry::Occupied(held) => Err(ServiceError::Conflict(format!(
                "Order {} already holds {}",
                held.get(),
                key
            ))),
            Entry::Vacant(slot) => {
                slot.insert(order_id);
                Ok(true)
            }
        }
    }

    fn release(&self, key: &str, order_id: Uuid) {
        self.live.remove_if(key, |_, holder| *holder == order_id);
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<Order, ServiceError> {
        let key = order.live_key();
        let claimed = match &key {
            Some(key) => self.claim(key, order.id)?,
            None => false,
        };

        let mut stored = order.clone();
        stored.version = 0;
        let inserted = match self.orders.entry(order.id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(stored.clone());
                true
            }
        };
        if !inserted {
            if let (true, Some(key)) = (claimed, &key) {
                self.release(key, order.id);
            }
            return Err(ServiceError::Conflict(format!(
                "Order {} already exists",
                order.id
            )));
        }
        Ok(stored)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn update(&self, order: &Order) -> Result<Order, ServiceError> {
        let previous_key = self
            .orders
            .get(&order.id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order.id)))?
            .live_key();
        let next_key = order.live_key();
        let claimed = match &next_key {
            Some(key) if next_key != previous_key => self.claim(key, order.id)?,
            _ => false,
        };
        let undo = || {
            if let (true, Some(key)) = (claimed, &next_key) {
                self.release(key, order.id);
            }
        };

        let saved = {
            let Some(mut entry) = self.orders.get_mut(&order.id) else {
                undo();
                return Err(ServiceError::NotFound(format!("Order {} not found", order.id)));
            };
            if entry.version != order.version {
                drop(entry);
                undo();
                return Err(ServiceError::ConcurrentModification(order.id));
            }
            let mut saved = order.clone();
            saved.version = order.version + 1;
            *entry = saved.clone();
            saved
        };

        if let Some(key) = previous_key.filter(|key| Some(key) != next_key.as_ref()) {
            self.release(&key, order.id);
        }
        Ok(saved)
    }

    async fn find_by_student_year(
        &self,
        student_id: Uuid,
        school_year: i32,
    ) -> Result<Option<Order>, ServiceError> {
        let mut matches: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| {
                entry.student_id == Some(student_id) && entry.school_year == school_year
            })
            .map(|entry| entry.value().clone())
            .collect();
        matches.sort_by_key(|order| {
            (
                order.status == OrderStatus::Cancelled,
                std::cmp::Reverse(order.updated_at),
            )
        });
        Ok(matches.into_iter().next())
    }

    async fn find_by_user(&self, user_id: Uuid) -> Result<Vec<Order>, ServiceError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| entry.user_id == Some(user_id))
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| {
            b.school_year
                .cmp(&a.school_year)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(orders)
    }

    async fn find_by_subitem(&self, subitem_id: &str) -> Result<Option<Order>, ServiceError> {
        Ok(self
            .orders
            .iter()
            .find(|entry| entry.contains_subitem(subitem_id))
            .map(|entry| entry.value().clone()))
    }

    async fn find_by_source_item(
        &self,
        board_item_id: &str,
    ) -> Result<Option<Order>, ServiceError> {
        Ok(self
            .orders
            .iter()
            .find(|entry| {
                entry
                    .presale
                    .as_ref()
                    .is_some_and(|p| p.source_board_item_id == board_item_id)
            })
            .map(|entry| entry.value().clone()))
    }

    async fn list_unlinked(&self) -> Result<Vec<Order>, ServiceError> {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| {
                entry.link_status == Some(LinkStatus::Unlinked)
                    && entry.status != OrderStatus::Cancelled
            })
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by_key(|order| order.created_at);
        Ok(orders)
    }
}

#[derive(Debug, Default)]
pub struct InMemorySuggestionStore {
    suggestions: DashMap<Uuid, LinkSuggestion>,
}

impl InMemorySuggestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<LinkSuggestion> {
        self.suggestions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[async_trait]
impl SuggestionStore for InMemorySuggestionStore {
    async fn insert(&self, suggestion: &LinkSuggestion) -> Result<(), ServiceError> {
        self.suggestions.insert(suggestion.id, suggestion.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<LinkSuggestion>, ServiceError> {
        Ok(self.suggestions.get(&id).map(|entry| entry.value().clone()))
    }

    async fn update(&self, suggestion: &LinkSuggestion) -> Result<(), ServiceError> {
        match self.suggestions.get_mut(&suggestion.id) {
            Some(mut entry) => {
                *entry = suggestion.clone();
                Ok(())
            }
            None => Err(ServiceError::NotFound(format!(
                "Link suggestion {} not found",
                suggestion.id
            ))),
        }
    }

    async fn find_for_pair(
        &self,
        order_id: Uuid,
        student_id: Uuid,
    ) -> Result<Option<LinkSuggestion>, ServiceError> {
        Ok(self
            .suggestions
            .iter()
            .filter(|entry| entry.order_id == order_id && entry.student_id == student_id)
            .max_by_key(|entry| entry.created_at)
            .map(|entry| entry.value().clone()))
    }

    async fn pending_for_order(&self, order_id: Uuid) -> Result<Vec<LinkSuggestion>, ServiceError> {
        Ok(self
            .suggestions
            .iter()
            .filter(|entry| entry.order_id == order_id && entry.is_pending())
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn list_pending(&self) -> Result<Vec<LinkSuggestion>, ServiceError> {
        let mut pending: Vec<LinkSuggestion> = self
            .suggestions
            .iter()
            .filter(|entry| entry.is_pending())
            .map(|entry| entry.value().clone())
            .collect();
        pending.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(pending)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    books: DashMap<Uuid, CatalogItem>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, book: CatalogItem) {
        self.books.insert(book.book_id, book);
    }

    fn sorted(&self, keep: impl Fn(&CatalogItem) -> bool) -> Vec<CatalogItem> {
        let mut books: Vec<CatalogItem> = self
            .books
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        books.sort_by(|a, b| a.name.cmp(&b.name));
        books
    }
}

#[async_trait]
impl CatalogSource for InMemoryCatalog {
    async fn restricted_books(&self) -> Result<Vec<CatalogItem>, ServiceError> {
        Ok(self.sorted(|book| book.active && book.restricted_catalog))
    }

    async fn active_books(&self) -> Result<Vec<CatalogItem>, ServiceError> {
        Ok(self.sorted(|book| book.active))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryEnrollments {
    enrollments: DashMap<(Uuid, i32), Enrollment>,
}

impl InMemoryEnrollments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, enrollment: Enrollment) {
        self.enrollments
            .insert((enrollment.student_id, enrollment.school_year), enrollment);
    }
}

#[async_trait]
impl EnrollmentDirectory for InMemoryEnrollments {
    async fn enrollment(
        &self,
        student_id: Uuid,
        school_year: i32,
    ) -> Result<Option<Enrollment>, ServiceError> {
        Ok(self
            .enrollments
            .get(&(student_id, school_year))
            .map(|entry| entry.value().clone()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryUsers {
    users: DashMap<Uuid, UserIdentity>,
}

impl InMemoryUsers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, identity: UserIdentity) {
        self.users.insert(identity.user_id, identity);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUsers {
    async fn identity(&self, user_id: Uuid) -> Result<Option<UserIdentity>, ServiceError> {
        Ok(self.users.get(&user_id).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::update_with_retry;
    use assert_matches::assert_matches;
    use chrono::Utc;

    fn order() -> Order {
        Order::new_draft(Uuid::new_v4(), Uuid::new_v4(), "Ana", "3", 2026, &[], Utc::now())
    }

    #[tokio::test]
    async fn stale_versions_are_rejected() {
        let store = InMemoryOrderStore::new();
        let stored = store.insert(&order()).await.unwrap();

        let mut first = stored.clone();
        first.notes = Some("first".into());
        let saved = store.update(&first).await.unwrap();
        assert_eq!(saved.version, 1);

        let mut second = stored;
        second.notes = Some("second".into());
        assert_matches!(
            store.update(&second).await,
            Err(ServiceError::ConcurrentModification(_))
        );
    }

    #[tokio::test]
    async fn one_live_order_per_student_and_year() {
        let store = InMemoryOrderStore::new();
        let first = store.insert(&order()).await.unwrap();

        let mut duplicate = order();
        duplicate.student_id = first.student_id;
        assert_matches!(store.insert(&duplicate).await, Err(ServiceError::Conflict(_)));

        let mut cancelled = first.clone();
        cancelled.status = OrderStatus::Cancelled;
        store.update(&cancelled).await.unwrap();
        let replacement = store.insert(&duplicate).await.unwrap();

        let found = store
            .find_by_student_year(first.student_id.unwrap(), 2026)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, replacement.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_leave_one_live_order() {
        let store = std::sync::Arc::new(InMemoryOrderStore::new());
        let student_id = Uuid::new_v4();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                let mut draft = order();
                draft.student_id = Some(student_id);
                tokio::spawn(async move { store.insert(&draft).await })
            })
            .collect();

        let mut stored = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => stored += 1,
                Err(e) => assert_matches!(e, ServiceError::Conflict(_)),
            }
        }
        assert_eq!(stored, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn reopening_a_cancelled_order_needs_a_free_slot() {
        let store = InMemoryOrderStore::new();
        let first = store.insert(&order()).await.unwrap();

        let mut cancelled = first.clone();
        cancelled.status = OrderStatus::Cancelled;
        let cancelled = store.update(&cancelled).await.unwrap();

        let mut replacement = order();
        replacement.student_id = first.student_id;
        store.insert(&replacement).await.unwrap();

        let mut reopened = cancelled;
        reopened.status = OrderStatus::Draft;
        assert_matches!(store.update(&reopened).await, Err(ServiceError::Conflict(_)));
        let kept = store.get(first.id).await.unwrap().unwrap();
        assert_eq!(kept.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn retry_skips_writes_without_changes() {
        let store = InMemoryOrderStore::new();
        let stored = store.insert(&order()).await.unwrap();

        let (unchanged, wrote) = update_with_retry(&store, stored.id, 3, |_| Ok(false))
            .await
            .unwrap();
        assert!(!wrote);
        assert_eq!(unchanged.version, 0);

        let (changed, wrote) = update_with_retry(&store, stored.id, 3, |order| {
            order.notes = Some("x".into());
            Ok(true)
        })
        .await
        .unwrap();
        assert!(wrote);
        assert_eq!(changed.version, 1);
    }
}

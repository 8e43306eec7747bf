//! In-memory alert store: the token-indexed map plus the creation ordering
//! scheduling and conflict resolution tie-break on.

use std::collections::HashMap;

use belltower_core::error::{AlertsError, Result};

use crate::item::{AlertItem, AlertKind};

#[derive(Default)]
pub struct AlertStore {
    items: HashMap<String, AlertItem>,
    /// Sequence numbers are never reused, so creation order stays total even
    /// across removals.
    next_seq: u64,
}

impl AlertStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the creation sequence number for the next item.
    pub fn next_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Insert a new item, returning any evicted one. Timer and Sleep kinds
    /// evict the oldest existing item of the same kind; Alarms and Actions
    /// accumulate.
    pub fn insert(&mut self, item: AlertItem) -> Result<Option<AlertItem>> {
        if self.items.contains_key(item.token()) {
            return Err(AlertsError::DuplicateToken(item.token().to_string()));
        }
        let mut evicted = None;
        if matches!(item.kind, AlertKind::Timer | AlertKind::Sleep) {
            let prev = self
                .items
                .values()
                .filter(|i| i.kind == item.kind)
                .min_by_key(|i| i.created_seq)
                .map(|i| i.token().to_string());
            if let Some(token) = prev {
                tracing::info!(%token, kind = ?item.kind, "evicting previous alert of same kind");
                evicted = self.remove(&token);
            }
        }
        self.items.insert(item.token().to_string(), item);
        Ok(evicted)
    }

    /// Remove and return an item, deactivating it and clearing its timers
    /// first so no expiry fires for a token the store no longer knows.
    pub fn remove(&mut self, token: &str) -> Option<AlertItem> {
        let mut item = self.items.remove(token)?;
        item.active = false;
        item.clear_timers();
        Some(item)
    }

    pub fn get(&self, token: &str) -> Option<&AlertItem> {
        self.items.get(token)
    }

    pub fn get_mut(&mut self, token: &str) -> Option<&mut AlertItem> {
        self.items.get_mut(token)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.items.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter_by_creation_order(&self) -> Vec<&AlertItem> {
        let mut items: Vec<&AlertItem> = self.items.values().collect();
        items.sort_by_key(|i| i.created_seq);
        items
    }

    pub fn tokens_by_creation_order(&self) -> Vec<String> {
        self.iter_by_creation_order()
            .into_iter()
            .map(|i| i.token().to_string())
            .collect()
    }

    /// Take every item out of the store.
    pub fn drain(&mut self) -> Vec<AlertItem> {
        self.items.drain().map(|(_, item)| item).collect()
    }
}

//! Live content set, indexed for dedup and id lookup.

use std::collections::HashMap;

use uuid::Uuid;

use crate::item::ContentItem;
use crate::time::Millis;

/// All live (unexpired) content items, keyed by dedup key with a secondary
/// id index. The invariant "at most one live item per dedup key" holds by
/// construction: the only way in is [`insert`](ContentSet::insert), which
/// replaces on key collision.
#[derive(Debug, Default)]
pub struct ContentSet {
    items: HashMap<String, ContentItem>,
    ids: HashMap<Uuid, String>,
}

impl ContentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn insert(&mut self, item: ContentItem) {
        let id = item.id;
        let key = item.dedup_key.clone();
        if let Some(old) = self.items.insert(key.clone(), item) {
            self.ids.remove(&old.id);
        }
        self.ids.insert(id, key);
    }

    pub fn get_by_key(&self, key: &str) -> Option<&ContentItem> {
        self.items.get(key)
    }

    pub fn get_by_key_mut(&mut self, key: &str) -> Option<&mut ContentItem> {
        self.items.get_mut(key)
    }

    pub fn get_by_id(&self, id: Uuid) -> Option<&ContentItem> {
        self.ids.get(&id).and_then(|key| self.items.get(key))
    }

    pub fn get_by_id_mut(&mut self, id: Uuid) -> Option<&mut ContentItem> {
        let key = self.ids.get(&id)?;
        self.items.get_mut(key)
    }

    pub fn remove_by_id(&mut self, id: Uuid) -> Option<ContentItem> {
        let key = self.ids.remove(&id)?;
        self.items.remove(&key)
    }

    /// Drop an item whose display slot was consumed, unless new occurrences
    /// arrived while it was on screen (`occurrences_at_show` is the count
    /// captured when it went up). Returns true if the item was removed.
    pub fn retire_if_unchanged(&mut self, id: Uuid, occurrences_at_show: u32) -> bool {
        let Some(item) = self.get_by_id(id) else {
            return false;
        };
        if item.occurrence_count > occurrences_at_show {
            return false;
        }
        self.remove_by_id(id).is_some()
    }

    /// Purge everything past its TTL. Returns the number purged.
    pub fn sweep_expired(&mut self, now: Millis) -> usize {
        let expired: Vec<(String, Uuid)> = self
            .items
            .iter()
            .filter(|(_, item)| item.is_expired(now))
            .map(|(key, item)| (key.clone(), item.id))
            .collect();
        for (key, id) in &expired {
            self.items.remove(key);
            self.ids.remove(id);
        }
        expired.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ContentItem> {
        self.items.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ContentItem> {
        self.items.values_mut()
    }
}

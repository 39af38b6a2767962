//! Cache LRU du parsing des frames ASCII.

use std::collections::HashMap;
use std::sync::Arc;

use gw_ascii::markup::TokenGrid;

/// Capacité par défaut.
pub const DEFAULT_CAPACITY: usize = 50;

const NIL: usize = usize::MAX;

struct Slot {
    key: String,
    grid: Arc<TokenGrid>,
    prev: usize,
    next: usize,
}

/// LRU texte ASCII → grille de tokens parsée.
///
/// Arène de slots chaînés par indices : `get`, `insert` et l'éviction sont
/// en O(1). La tête de liste est l'entrée la moins récemment utilisée.
///
/// # Example
/// ```
/// use gw_export::cache::RenderCache;
/// let mut cache = RenderCache::new(2);
/// let a = cache.get_or_parse("<span style=\"color: rgb(1, 2, 3)\">a</span>\n");
/// assert_eq!(a.width(), 1);
/// assert_eq!(cache.len(), 1);
/// cache.clear();
/// assert!(cache.is_empty());
/// ```
pub struct RenderCache {
    capacity: usize,
    slots: Vec<Slot>,
    index: HashMap<String, usize>,
    head: usize,
    tail: usize,
    free: Vec<usize>,
}

impl RenderCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            slots: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            head: NIL,
            tail: NIL,
            free: Vec::new(),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Grille en cache ; un hit la replace en queue.
    pub fn get(&mut self, key: &str) -> Option<Arc<TokenGrid>> {
        let slot = *self.index.get(key)?;
        self.unlink(slot);
        self.push_back(slot);
        Some(Arc::clone(&self.slots[slot].grid))
    }

    /// Insère (ou remplace) une entrée, en évinçant la plus ancienne si
    /// le cache est plein.
    pub fn insert(&mut self, key: String, grid: Arc<TokenGrid>) {
        if let Some(&slot) = self.index.get(&key) {
            self.slots[slot].grid = grid;
            self.unlink(slot);
            self.push_back(slot);
            return;
        }

        if self.index.len() >= self.capacity {
            self.evict_oldest();
        }

        let slot = Slot {
            key: key.clone(),
            grid,
            prev: NIL,
            next: NIL,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.slots[id] = slot;
                id
            }
            None => {
                self.slots.push(slot);
                self.slots.len() - 1
            }
        };
        self.index.insert(key, id);
        self.push_back(id);
    }

    /// Grille parsée de `ascii`, depuis le cache ou parsée puis insérée.
    pub fn get_or_parse(&mut self, ascii: &str) -> Arc<TokenGrid> {
        if let Some(grid) = self.get(ascii) {
            return grid;
        }
        let grid = Arc::new(TokenGrid::parse(ascii));
        self.insert(ascii.to_string(), Arc::clone(&grid));
        grid
    }

    /// Vide le cache et libère l'arène.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.index.clear();
        self.free.clear();
        self.head = NIL;
        self.tail = NIL;
    }

    fn evict_oldest(&mut self) {
        let oldest = self.head;
        if oldest == NIL {
            return;
        }
        self.unlink(oldest);
        let key = std::mem::take(&mut self.slots[oldest].key);
        self.slots[oldest].grid = Arc::default();
        self.index.remove(&key);
        self.free.push(oldest);
        log::trace!("RenderCache : éviction");
    }

    fn unlink(&mut self, id: usize) {
        let (prev, next) = (self.slots[id].prev, self.slots[id].next);
        if prev == NIL {
            self.head = next;
        } else {
            self.slots[prev].next = next;
        }
        if next == NIL {
            self.tail = prev;
        } else {
            self.slots[next].prev = prev;
        }
        self.slots[id].prev = NIL;
        self.slots[id].next = NIL;
    }

    fn push_back(&mut self, id: usize) {
        self.slots[id].prev = self.tail;
        self.slots[id].next = NIL;
        if self.tail == NIL {
            self.head = id;
        } else {
            self.slots[self.tail].next = id;
        }
        self.tail = id;
    }
}

impl Default for RenderCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: usize) -> String {
        format!("frame-{i}")
    }

    #[test]
    fn fifty_first_insert_evicts_exactly_the_oldest() {
        let mut cache = RenderCache::default();
        for i in 0..DEFAULT_CAPACITY {
            cache.insert(key(i), Arc::default());
        }
        assert_eq!(cache.len(), 50);

        cache.insert(key(50), Arc::default());
        assert_eq!(cache.len(), 50);
        assert!(!cache.contains(&key(0)));
        assert!((1..=50).all(|i| cache.contains(&key(i))));
    }

    #[test]
    fn hits_refresh_recency() {
        let mut cache = RenderCache::new(3);
        for i in 0..3 {
            cache.insert(key(i), Arc::default());
        }
        assert!(cache.get(&key(0)).is_some());
        cache.insert(key(3), Arc::default());
        assert!(cache.contains(&key(0)));
        assert!(!cache.contains(&key(1)));
    }

    #[test]
    fn reinsert_replaces_without_growing() {
        let mut cache = RenderCache::new(2);
        cache.insert(key(0), Arc::default());
        cache.insert(key(0), Arc::new(TokenGrid::parse("x")));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn never_exceeds_capacity_under_churn() {
        let mut cache = RenderCache::new(5);
        for i in 0..200 {
            cache.insert(key(i % 17), Arc::default());
            let _ = cache.get(&key((i * 7) % 17));
            assert!(cache.len() <= 5);
        }
    }
}

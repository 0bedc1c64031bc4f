//! Weak-valued variant of [`CacheMap`].
//!
//! Entries do not keep their values alive. Dead entries are weeded out before the table
//! would grow, and a table that has become mostly empty shrinks back towards the
//! 16-slot floor.

use std::sync::{Arc, Weak};

use crate::{
    metadata::interner::cache::{CacheMap, MIN_CAPACITY},
    Result,
};

/// Open-addressing map from strictly positive `i32` keys to weakly held values
pub struct WeakCacheMap<V> {
    inner: CacheMap<Weak<V>>,
}

impl<V> WeakCacheMap<V> {
    /// Create an empty map with the minimum capacity
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MIN_CAPACITY)
    }

    /// Create an empty map with at least `capacity` slots
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        WeakCacheMap {
            inner: CacheMap::with_capacity(capacity),
        }
    }

    /// Number of stored entries, including ones whose value has already been dropped
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if no entry is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Number of slots currently allocated
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Look up `key`, returning the value if it is still alive
    #[must_use]
    pub fn get(&self, key: i32) -> Option<Arc<V>> {
        self.inner.get(key).and_then(Weak::upgrade)
    }

    /// Store a weak reference to `value` under `key`
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidCacheKey`] if `key` is not greater than zero.
    pub fn set(&mut self, key: i32, value: &Arc<V>) -> Result<()> {
        if key > 0 && !self.inner.contains_key(key) && self.inner.would_grow() {
            self.weed();
        }

        self.inner.set(key, Arc::downgrade(value))?;
        Ok(())
    }

    /// Remove the entry for `key`
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidCacheKey`] if `key` is not greater than zero.
    pub fn remove(&mut self, key: i32) -> Result<Option<Arc<V>>> {
        Ok(self.inner.remove(key)?.and_then(|weak| weak.upgrade()))
    }

    /// Drop every entry whose value is gone, shrinking the table when it became sparse
    ///
    /// Returns the number of removed entries.
    pub fn weed(&mut self) -> usize {
        let removed = self.inner.retain(|_, weak| weak.strong_count() > 0);
        if removed == 0 {
            return 0;
        }

        let capacity = self.inner.capacity();
        let target = if self.inner.len() * 4 < capacity {
            (self.inner.len() * 4).max(MIN_CAPACITY)
        } else {
            capacity
        };
        // also clears the tombstones retain left behind
        self.inner.rehash(target);

        removed
    }

    /// Iterate over all `(key, value)` pairs whose value is still alive
    pub fn iter(&self) -> impl Iterator<Item = (i32, Arc<V>)> + '_ {
        self.inner
            .iter()
            .filter_map(|(key, weak)| weak.upgrade().map(|value| (key, value)))
    }
}

impl<V> Default for WeakCacheMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dead_values_are_absent() {
        let mut cache = WeakCacheMap::new();
        let alive = Arc::new(1);
        cache.set(1, &alive).unwrap();
        {
            let dead = Arc::new(2);
            cache.set(2, &dead).unwrap();
        }

        assert_eq!(cache.get(1).as_deref(), Some(&1));
        assert!(cache.get(2).is_none());
        assert_eq!(cache.iter().count(), 1);
    }

    #[test]
    fn test_weeding_prevents_growth() {
        let mut cache = WeakCacheMap::new();
        for key in 1..=1000 {
            let transient = Arc::new(key);
            cache.set(key, &transient).unwrap();
        }

        assert_eq!(cache.capacity(), MIN_CAPACITY);
        assert!(cache.len() <= MIN_CAPACITY / 2);
    }

    #[test]
    fn test_shrinks_after_release() {
        let mut cache = WeakCacheMap::new();
        let values: Vec<Arc<i32>> = (1..=200).map(Arc::new).collect();
        for value in &values {
            cache.set(**value, value).unwrap();
        }
        let grown = cache.capacity();
        assert!(grown >= 512);

        drop(values);
        let removed = cache.weed();
        assert_eq!(removed, 200);
        assert_eq!(cache.capacity(), MIN_CAPACITY);
    }

    #[test]
    fn test_live_values_survive_weeding() {
        let mut cache = WeakCacheMap::new();
        let keep: Vec<Arc<i32>> = (1..=50).map(Arc::new).collect();
        for value in &keep {
            cache.set(**value, value).unwrap();
        }
        for key in 51..=400 {
            let transient = Arc::new(key);
            cache.set(key, &transient).unwrap();
        }

        for value in &keep {
            assert_eq!(cache.get(**value).as_deref(), Some(&**value));
        }
    }
}

//! Open-addressing integer-keyed cache.
//!
//! [`CacheMap`] is the memoization substrate used by every other component of the graph:
//! interned names, unique node keys and interned mangled names all map onto strictly
//! positive `i32` keys, which lets a flat linear-probing table stand in for a general
//! purpose hash map.
//!
//! # Table Layout
//!
//! - key `0` marks an empty slot
//! - key `-1` marks a tombstone left behind by [`CacheMap::remove`]
//! - probing is linear, starting at `key & (capacity - 1)`
//! - the table doubles and rehashes once live entries plus tombstones exceed half the capacity
//!
//! # Thread Safety
//!
//! `CacheMap` is a plain value. Shared instances are wrapped in an `RwLock` by their owner;
//! readers take the read side only, writers (including growth) the write side.

use crate::{Error::InvalidCacheKey, Result};

/// Marker for a slot that never held a key
const EMPTY: i32 = 0;
/// Marker for a slot whose key was removed
const TOMBSTONE: i32 = -1;
/// Smallest table ever allocated
pub(crate) const MIN_CAPACITY: usize = 16;

/// Open-addressing map from strictly positive `i32` keys to values
pub struct CacheMap<V> {
    keys: Vec<i32>,
    values: Vec<Option<V>>,
    /// Live entries
    count: usize,
    /// Live entries plus tombstones
    occupied: usize,
}

impl<V> CacheMap<V> {
    /// Create an empty map with the minimum capacity
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(MIN_CAPACITY)
    }

    /// Create an empty map able to hold `capacity` slots (rounded up to a power of two)
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY).next_power_of_two();
        let mut values = Vec::with_capacity(capacity);
        values.resize_with(capacity, || None);

        CacheMap {
            keys: vec![EMPTY; capacity],
            values,
            count: 0,
            occupied: 0,
        }
    }

    /// Number of live entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` if no live entry is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Number of slots currently allocated
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.keys.len()
    }

    fn mask(&self) -> usize {
        self.keys.len() - 1
    }

    #[allow(clippy::cast_sign_loss)]
    fn home_slot(&self, key: i32) -> usize {
        (key as usize) & self.mask()
    }

    /// Locate the slot holding `key`
    fn find_slot(&self, key: i32) -> Option<usize> {
        let mut slot = self.home_slot(key);
        loop {
            match self.keys[slot] {
                EMPTY => return None,
                k if k == key => return Some(slot),
                _ => slot = (slot + 1) & self.mask(),
            }
        }
    }

    /// Look up the value stored for `key`
    ///
    /// Non-positive keys are never stored and always yield `None`.
    #[must_use]
    pub fn get(&self, key: i32) -> Option<&V> {
        if key <= 0 {
            return None;
        }

        self.find_slot(key).and_then(|slot| self.values[slot].as_ref())
    }

    /// Mutable variant of [`CacheMap::get`]
    pub fn get_mut(&mut self, key: i32) -> Option<&mut V> {
        if key <= 0 {
            return None;
        }

        match self.find_slot(key) {
            Some(slot) => self.values[slot].as_mut(),
            None => None,
        }
    }

    /// Returns `true` if a live entry exists for `key`
    #[must_use]
    pub fn contains_key(&self, key: i32) -> bool {
        self.get(key).is_some()
    }

    /// Returns `true` if inserting a new key would trigger a rehash
    pub(crate) fn would_grow(&self) -> bool {
        (self.occupied + 1) * 2 > self.capacity()
    }

    /// Store `value` under `key`, returning the previous value
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidCacheKey`] if `key` is not greater than zero.
    pub fn set(&mut self, key: i32, value: V) -> Result<Option<V>> {
        if key <= 0 {
            return Err(InvalidCacheKey(key));
        }

        let mut slot = self.home_slot(key);
        let mut reusable = None;
        loop {
            match self.keys[slot] {
                EMPTY => break,
                TOMBSTONE => {
                    if reusable.is_none() {
                        reusable = Some(slot);
                    }
                }
                k if k == key => return Ok(self.values[slot].replace(value)),
                _ => {}
            }
            slot = (slot + 1) & self.mask();
        }

        let target = match reusable {
            Some(tombstone) => tombstone,
            None => {
                self.occupied += 1;
                slot
            }
        };

        self.keys[target] = key;
        self.values[target] = Some(value);
        self.count += 1;

        if self.occupied * 2 > self.capacity() {
            let capacity = if self.count * 2 > self.capacity() / 2 {
                self.capacity() * 2
            } else {
                // mostly tombstones, a same-size rehash reclaims them
                self.capacity()
            };
            self.rehash(capacity);
        }

        Ok(None)
    }

    /// Remove the entry for `key`, leaving a tombstone
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidCacheKey`] if `key` is not greater than zero.
    pub fn remove(&mut self, key: i32) -> Result<Option<V>> {
        if key <= 0 {
            return Err(InvalidCacheKey(key));
        }

        match self.find_slot(key) {
            Some(slot) => {
                self.keys[slot] = TOMBSTONE;
                self.count -= 1;
                Ok(self.values[slot].take())
            }
            None => Ok(None),
        }
    }

    /// Drop every entry while keeping the current allocation
    pub fn clear(&mut self) {
        self.keys.iter_mut().for_each(|key| *key = EMPTY);
        self.values.iter_mut().for_each(|value| *value = None);
        self.count = 0;
        self.occupied = 0;
    }

    /// Keep only the entries for which `keep` returns `true`
    ///
    /// Returns the number of removed entries.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(i32, &V) -> bool,
    {
        let mut removed = 0;
        for slot in 0..self.keys.len() {
            let key = self.keys[slot];
            if key <= 0 {
                continue;
            }

            let drop_entry = match &self.values[slot] {
                Some(value) => !keep(key, value),
                None => true,
            };

            if drop_entry {
                self.keys[slot] = TOMBSTONE;
                self.values[slot] = None;
                self.count -= 1;
                removed += 1;
            }
        }
        removed
    }

    /// Reinsert every live entry into a table of `capacity` slots, discarding tombstones
    pub(crate) fn rehash(&mut self, capacity: usize) {
        let capacity = capacity
            .max(MIN_CAPACITY)
            .max(self.count * 2 + 1)
            .next_power_of_two();

        let old_keys = std::mem::replace(&mut self.keys, vec![EMPTY; capacity]);
        let mut new_values = Vec::with_capacity(capacity);
        new_values.resize_with(capacity, || None);
        let old_values = std::mem::replace(&mut self.values, new_values);

        self.occupied = 0;
        for (key, value) in old_keys.into_iter().zip(old_values) {
            if key <= 0 {
                continue;
            }
            if let Some(value) = value {
                let mut slot = self.home_slot(key);
                while self.keys[slot] != EMPTY {
                    slot = (slot + 1) & self.mask();
                }
                self.keys[slot] = key;
                self.values[slot] = Some(value);
                self.occupied += 1;
            }
        }
        self.count = self.occupied;
    }

    /// Iterate over all live `(key, value)` pairs in slot order
    pub fn iter(&self) -> impl Iterator<Item = (i32, &V)> + '_ {
        self.keys
            .iter()
            .zip(self.values.iter())
            .filter_map(|(key, value)| match value {
                Some(value) if *key > 0 => Some((*key, value)),
                _ => None,
            })
    }

    /// Iterate over all live values in slot order
    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, value)| value)
    }
}

impl<V> Default for CacheMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: std::fmt::Debug> std::fmt::Debug for CacheMap<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

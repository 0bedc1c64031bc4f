//! Name interning and integer-keyed caches.
//!
//! This module is the substrate every other component memoizes through:
//!
//! - [`Interner`] canonicalizes name strings into [`Identifier`]s backed by small, strictly
//!   positive integers, so that name equality is a single integer comparison.
//! - [`CacheMap`] is an open-addressing map from those integers (or node unique keys) to
//!   values.
//! - [`WeakCacheMap`] is the same map holding weak references, used for directories that
//!   must not keep nodes alive.
//!
//! # Examples
//!
//! ```rust
//! use cilgraph::metadata::interner::Interner;
//!
//! let interner = Interner::new();
//! let a = interner.intern("System.Object");
//! let b = interner.intern("System.Object");
//! let c = interner.intern("system.object");
//!
//! assert_eq!(a, b);
//! assert_eq!(a.key(), b.key());
//! assert_ne!(a, c);
//! ```

mod cache;
mod weak;

pub use cache::CacheMap;
pub use weak::WeakCacheMap;

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, RwLock},
};

/// Ordinal hash of `text` over its UTF-16 code units, masked to 31 bits
#[must_use]
pub fn hash_name(text: &str) -> i32 {
    let mut hash: i32 = 0;
    for unit in text.encode_utf16() {
        hash = hash.wrapping_mul(17).wrapping_add(i32::from(unit));
    }
    hash & 0x7FFF_FFFF
}

/// An interned name
///
/// Two identifiers compare equal exactly when their canonical keys are equal, which for
/// identifiers from the same [`Interner`] means their texts are ordinally equal.
#[derive(Clone)]
pub struct Identifier {
    key: i32,
    text: Arc<str>,
}

impl Identifier {
    /// The canonical key of this name, always greater than zero
    #[must_use]
    pub fn key(&self) -> i32 {
        self.key
    }

    /// The interned text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns `true` for the empty name
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Identifier {}

impl Hash for Identifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialEq<str> for Identifier {
    fn eq(&self, other: &str) -> bool {
        &*self.text == other
    }
}

impl PartialEq<&str> for Identifier {
    fn eq(&self, other: &&str) -> bool {
        &*self.text == *other
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identifier({}, {:?})", self.key, &*self.text)
    }
}

struct InternSlot {
    hash: i32,
    identifier: Identifier,
}

struct InternTable {
    slots: Vec<Option<InternSlot>>,
    count: usize,
    last_key: i32,
}

impl InternTable {
    fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(16).next_power_of_two();
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);

        InternTable {
            slots,
            count: 0,
            last_key: 0,
        }
    }

    #[allow(clippy::cast_sign_loss)]
    fn home(&self, hash: i32) -> usize {
        (hash as usize) & (self.slots.len() - 1)
    }

    fn find(&self, hash: i32, text: &str) -> Option<Identifier> {
        let mask = self.slots.len() - 1;
        let mut index = self.home(hash);
        while let Some(slot) = &self.slots[index] {
            if slot.hash == hash && slot.identifier.as_str() == text {
                return Some(slot.identifier.clone());
            }
            index = (index + 1) & mask;
        }
        None
    }

    fn place(&mut self, slot: InternSlot) {
        let mask = self.slots.len() - 1;
        let mut index = self.home(slot.hash);
        while self.slots[index].is_some() {
            index = (index + 1) & mask;
        }
        self.slots[index] = Some(slot);
    }

    fn insert(&mut self, hash: i32, text: &str) -> Identifier {
        self.last_key += 1;
        let identifier = Identifier {
            key: self.last_key,
            text: Arc::from(text),
        };

        self.place(InternSlot {
            hash,
            identifier: identifier.clone(),
        });
        self.count += 1;

        if self.count * 2 > self.slots.len() {
            self.grow();
        }

        identifier
    }

    fn grow(&mut self) {
        let capacity = self.slots.len() * 2;
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);

        let old = std::mem::replace(&mut self.slots, slots);
        for slot in old.into_iter().flatten() {
            self.place(slot);
        }
    }
}

/// Canonicalizes strings into [`Identifier`]s
///
/// Interning is case-sensitive, ordinal, deterministic and idempotent. Lookups of names
/// that are already interned only take the read side of the table lock; insertion and
/// growth take the write side.
pub struct Interner {
    table: RwLock<InternTable>,
}

impl Interner {
    /// Create an interner with the default initial capacity
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create an interner with at least `capacity` slots
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Interner {
            table: RwLock::new(InternTable::with_capacity(capacity)),
        }
    }

    /// Intern `text`, returning its canonical identifier
    pub fn intern(&self, text: &str) -> Identifier {
        let hash = hash_name(text);
        if let Some(identifier) = read_lock!(self.table).find(hash, text) {
            return identifier;
        }

        let mut table = write_lock!(self.table);
        if let Some(identifier) = table.find(hash, text) {
            return identifier;
        }
        table.insert(hash, text)
    }

    /// Return the identifier of `text` if it was interned before, without inserting it
    #[must_use]
    pub fn lookup(&self, text: &str) -> Option<Identifier> {
        read_lock!(self.table).find(hash_name(text), text)
    }

    /// Number of distinct names interned so far
    #[must_use]
    pub fn len(&self) -> usize {
        read_lock!(self.table).count
    }

    /// Returns `true` if nothing was interned yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Interner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Interner(len: {})", self.len())
    }
}

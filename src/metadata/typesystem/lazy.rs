//! Lazy population of derived collections.
//!
//! Members, attributes and nested types of a type (and attributes and resources of a module)
//! are expensive to materialize, so they are produced on first access by an external
//! [`MetadataProvider`]. Each collection is a [`Lazy`] cell moving through
//! [`PopulationState::Unpopulated`] → [`PopulationState::Populating`] →
//! [`PopulationState::Populated`].
//!
//! # Population Protocol
//!
//! 1. Readers of a populated cell return its snapshot without locking the graph.
//! 2. The first reader takes the coarse [`PopulationLock`] and checks the state again.
//! 3. If the cell is still unpopulated, an empty placeholder is stored and the state moves to
//!    `Populating` before the provider runs.
//! 4. The provider's result is stored and the state moves to `Populated`.
//!
//! A provider that reads the collection it is currently populating (for example an attribute
//! whose argument names its own owner) holds the lock already and gets the empty placeholder
//! back instead of recursing.
//!
//! # Derived Caches
//!
//! Every stored value carries a generation number. Caches computed from a collection
//! ([`Derived`]) remember the generation they were computed at and are recomputed once a
//! bulk replacement moved the collection past it.

use std::{
    any::Any,
    fmt,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, RwLock,
    },
};

use strum::Display;

use crate::metadata::{
    module::Module,
    sync::PopulationLock,
    typesystem::{Attribute, MemberRc, Resource, TypeNodeRc},
};

/// Lifecycle of a [`Lazy`] collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[repr(u8)]
pub enum PopulationState {
    /// The provider was not invoked yet
    Unpopulated = 0,
    /// The provider is running on the thread holding the population lock
    Populating = 1,
    /// The collection is final, up to explicit bulk replacement
    Populated = 2,
}

impl PopulationState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PopulationState::Unpopulated,
            1 => PopulationState::Populating,
            _ => PopulationState::Populated,
        }
    }
}

/// Outcome of a population callback
pub enum Population<T> {
    /// The collection was produced
    Complete(Vec<T>),
    /// The provider did not produce a collection; the cell degrades to empty
    Missing,
    /// Population could not run right now; the cell stays unpopulated and is retried on the
    /// next access
    Deferred,
}

impl<T> From<Option<Vec<T>>> for Population<T> {
    fn from(value: Option<Vec<T>>) -> Self {
        match value {
            Some(items) => Population::Complete(items),
            None => Population::Missing,
        }
    }
}

struct Snapshot<T> {
    generation: u64,
    items: Arc<Vec<T>>,
}

/// A collection populated at most once, on first access
pub struct Lazy<T> {
    label: &'static str,
    state: AtomicU8,
    value: RwLock<Snapshot<T>>,
}

impl<T> Lazy<T> {
    /// Create an unpopulated, empty cell; `label` names the collection in diagnostics
    #[must_use]
    pub fn new(label: &'static str) -> Self {
        Lazy {
            label,
            state: AtomicU8::new(PopulationState::Unpopulated as u8),
            value: RwLock::new(Snapshot {
                generation: 0,
                items: Arc::new(Vec::new()),
            }),
        }
    }

    /// Create a cell that is already populated with `items`
    #[must_use]
    pub fn populated(label: &'static str, items: Vec<T>) -> Self {
        let lazy = Self::new(label);
        lazy.store(items);
        lazy.set_state(PopulationState::Populated);
        lazy
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> PopulationState {
        PopulationState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: PopulationState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// The current value, without triggering population
    #[must_use]
    pub fn current(&self) -> Arc<Vec<T>> {
        read_lock!(self.value).items.clone()
    }

    /// The current generation
    #[must_use]
    pub fn generation(&self) -> u64 {
        read_lock!(self.value).generation
    }

    /// The current value together with the generation it belongs to
    #[must_use]
    pub fn snapshot(&self) -> (u64, Arc<Vec<T>>) {
        let value = read_lock!(self.value);
        (value.generation, value.items.clone())
    }

    fn store(&self, items: Vec<T>) -> Arc<Vec<T>> {
        let items = Arc::new(items);
        let mut value = write_lock!(self.value);
        value.generation += 1;
        value.items = items.clone();
        items
    }

    /// Return the collection, running `populate` under `lock` if this is the first access
    ///
    /// `populate` is invoked at most once per successful population. Re-entrant calls made
    /// from inside `populate` observe the empty placeholder.
    pub fn get_or_populate<F>(&self, lock: &PopulationLock, populate: F) -> Arc<Vec<T>>
    where
        F: FnOnce() -> Population<T>,
    {
        if self.state() == PopulationState::Populated {
            return self.current();
        }

        let _guard = lock.acquire();
        match self.state() {
            PopulationState::Populated | PopulationState::Populating => return self.current(),
            PopulationState::Unpopulated => {}
        }

        self.store(Vec::new());
        self.set_state(PopulationState::Populating);

        let abandoned = AbandonedPopulation { lazy: self };
        let outcome = populate();
        std::mem::forget(abandoned);

        match outcome {
            Population::Complete(items) => {
                let items = self.store(items);
                self.set_state(PopulationState::Populated);
                items
            }
            Population::Missing => {
                log::error!(
                    "provider left {} unset, treating the collection as empty",
                    self.label
                );
                self.set_state(PopulationState::Populated);
                self.current()
            }
            Population::Deferred => {
                self.set_state(PopulationState::Unpopulated);
                self.current()
            }
        }
    }

    /// Replace the whole collection, moving it to a new generation
    pub fn replace(&self, lock: &PopulationLock, items: Vec<T>) -> Arc<Vec<T>> {
        let _guard = lock.acquire();
        let items = self.store(items);
        self.set_state(PopulationState::Populated);
        items
    }
}

/// Settles a cell whose provider unwound out of [`Lazy::get_or_populate`]
struct AbandonedPopulation<'a, T> {
    lazy: &'a Lazy<T>,
}

impl<T> Drop for AbandonedPopulation<'_, T> {
    fn drop(&mut self) {
        log::error!(
            "provider for {} panicked, treating the collection as empty",
            self.lazy.label
        );
        self.lazy.set_state(PopulationState::Populated);
    }
}

impl<T: Clone> Lazy<T> {
    /// Append one item to the current value, moving it to a new generation
    ///
    /// An unpopulated cell keeps its state, so a provider bound later still runs.
    pub fn push(&self, lock: &PopulationLock, item: T) -> Arc<Vec<T>> {
        let _guard = lock.acquire();
        let mut items = self.current().as_ref().clone();
        items.push(item);
        self.store(items)
    }
}

impl<T> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = read_lock!(self.value);
        write!(
            f,
            "Lazy({}, {}, generation {}, {} items)",
            self.label,
            self.state(),
            value.generation,
            value.items.len()
        )
    }
}

/// A cache computed from a [`Lazy`] collection
pub struct Derived<V> {
    cached: RwLock<Option<(u64, V)>>,
}

impl<V: Clone> Derived<V> {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Derived {
            cached: RwLock::new(None),
        }
    }

    /// Return the value computed for `generation`, computing it if missing or stale
    pub fn get_or_compute<F>(&self, generation: u64, compute: F) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some((computed_at, value)) = &*read_lock!(self.cached) {
            if *computed_at == generation {
                return value.clone();
            }
        }

        let value = compute();
        let mut cached = write_lock!(self.cached);
        match &*cached {
            Some((computed_at, existing)) if *computed_at >= generation => existing.clone(),
            _ => {
                *cached = Some((generation, value.clone()));
                value
            }
        }
    }

    /// Reset to "not yet computed"
    pub fn invalidate(&self) {
        *write_lock!(self.cached) = None;
    }

    /// Returns `true` if a value computed for `generation` is cached
    #[must_use]
    pub fn is_current(&self, generation: u64) -> bool {
        matches!(&*read_lock!(self.cached), Some((computed_at, _)) if *computed_at == generation)
    }
}

impl<V: Clone> Default for Derived<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Opaque data handed back to a provider on every call
///
/// The graph never looks inside; importers typically store a row index or a reader handle.
#[derive(Clone, Default)]
pub struct ProviderHandle(Option<Arc<dyn Any + Send + Sync>>);

impl ProviderHandle {
    /// Wrap `value`
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        ProviderHandle(Some(Arc::new(value)))
    }

    /// A handle carrying nothing
    #[must_use]
    pub fn empty() -> Self {
        ProviderHandle(None)
    }

    /// Access the wrapped value if it has type `T`
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|value| value.downcast_ref::<T>())
    }
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_some() {
            write!(f, "ProviderHandle(..)")
        } else {
            write!(f, "ProviderHandle(empty)")
        }
    }
}

/// Source of the lazily populated collections of a type
///
/// Each method is called at most once per type and collection. Returning `None` breaks the
/// provider contract; the graph logs it and treats the collection as empty.
pub trait MetadataProvider: Send + Sync {
    /// Produce the members declared by `owner`
    fn members(&self, owner: &TypeNodeRc, handle: &ProviderHandle) -> Option<Vec<MemberRc>> {
        let _ = (owner, handle);
        Some(Vec::new())
    }

    /// Produce the attributes applied to `owner`
    fn attributes(&self, owner: &TypeNodeRc, handle: &ProviderHandle) -> Option<Vec<Attribute>> {
        let _ = (owner, handle);
        Some(Vec::new())
    }

    /// Produce the types nested in `owner`
    fn nested_types(
        &self,
        owner: &TypeNodeRc,
        handle: &ProviderHandle,
    ) -> Option<Vec<TypeNodeRc>> {
        let _ = (owner, handle);
        Some(Vec::new())
    }
}

/// Source of the lazily populated collections of a module
pub trait ModuleProvider: Send + Sync {
    /// Produce the module-level attributes
    fn attributes(&self, module: &Arc<Module>, handle: &ProviderHandle) -> Option<Vec<Attribute>> {
        let _ = (module, handle);
        Some(Vec::new())
    }

    /// Produce the embedded and linked resources
    fn resources(&self, module: &Arc<Module>, handle: &ProviderHandle) -> Option<Vec<Resource>> {
        let _ = (module, handle);
        Some(Vec::new())
    }
}

/// A provider bound to a node together with its opaque handle
pub struct ProviderBinding<P: ?Sized> {
    /// The provider
    pub provider: Arc<P>,
    /// Data passed back to the provider
    pub handle: ProviderHandle,
}

impl<P: ?Sized> Clone for ProviderBinding<P> {
    fn clone(&self) -> Self {
        ProviderBinding {
            provider: self.provider.clone(),
            handle: self.handle.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
    };

    use super::*;

    #[test]
    fn test_populates_once() {
        let lock = PopulationLock::new();
        let lazy: Lazy<u32> = Lazy::new("numbers");
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let items = lazy.get_or_populate(&lock, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Population::Complete(vec![1, 2, 3])
            });
            assert_eq!(*items, vec![1, 2, 3]);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.state(), PopulationState::Populated);
    }

    #[test]
    fn test_reentrant_access_sees_placeholder() {
        let lock = PopulationLock::new();
        let lazy: Lazy<u32> = Lazy::new("numbers");

        let items = lazy.get_or_populate(&lock, || {
            assert_eq!(lazy.state(), PopulationState::Populating);
            let inner = lazy.get_or_populate(&lock, || unreachable!());
            assert!(inner.is_empty());
            Population::Complete(vec![7])
        });

        assert_eq!(*items, vec![7]);
    }

    #[test]
    fn test_missing_degrades_to_empty() {
        let lock = PopulationLock::new();
        let lazy: Lazy<u32> = Lazy::new("numbers");

        let items = lazy.get_or_populate(&lock, || Population::Missing);
        assert!(items.is_empty());
        assert_eq!(lazy.state(), PopulationState::Populated);
        // not retried
        let again = lazy.get_or_populate(&lock, || Population::Complete(vec![1]));
        assert!(again.is_empty());
    }

    #[test]
    fn test_panicking_provider_degrades_to_empty() {
        let lock = Arc::new(PopulationLock::new());
        let lazy: Arc<Lazy<u32>> = Arc::new(Lazy::new("numbers"));

        let result = {
            let lock = lock.clone();
            let lazy = lazy.clone();
            thread::spawn(move || {
                lazy.get_or_populate(&lock, || -> Population<u32> { panic!("provider failure") })
            })
            .join()
        };
        assert!(result.is_err());

        assert_eq!(lazy.state(), PopulationState::Populated);
        assert!(!lock.is_held());
        let items = lazy.get_or_populate(&lock, || Population::Complete(vec![1]));
        assert!(items.is_empty());
    }

    #[test]
    fn test_deferred_is_retried() {
        let lock = PopulationLock::new();
        let lazy: Lazy<u32> = Lazy::new("numbers");

        assert!(lazy.get_or_populate(&lock, || Population::Deferred).is_empty());
        assert_eq!(lazy.state(), PopulationState::Unpopulated);
        assert_eq!(*lazy.get_or_populate(&lock, || Population::Complete(vec![5])), vec![5]);
    }

    #[test]
    fn test_replace_bumps_generation() {
        let lock = PopulationLock::new();
        let lazy = Lazy::populated("numbers", vec![1]);
        let before = lazy.generation();

        lazy.replace(&lock, vec![2, 3]);
        assert!(lazy.generation() > before);
        assert_eq!(*lazy.current(), vec![2, 3]);

        lazy.push(&lock, 4);
        assert_eq!(*lazy.current(), vec![2, 3, 4]);
    }

    #[test]
    fn test_derived_recomputes_when_stale() {
        let lock = PopulationLock::new();
        let lazy = Lazy::populated("numbers", vec![1, 2, 3]);
        let sum: Derived<u32> = Derived::new();
        let computed = AtomicUsize::new(0);

        let compute = |lazy: &Lazy<u32>| {
            let (generation, items) = lazy.snapshot();
            sum.get_or_compute(generation, || {
                computed.fetch_add(1, Ordering::SeqCst);
                items.iter().sum()
            })
        };

        assert_eq!(compute(&lazy), 6);
        assert_eq!(compute(&lazy), 6);
        assert_eq!(computed.load(Ordering::SeqCst), 1);

        lazy.replace(&lock, vec![10]);
        assert!(!sum.is_current(lazy.generation()));
        assert_eq!(compute(&lazy), 10);
        assert_eq!(computed.load(Ordering::SeqCst), 2);

        sum.invalidate();
        assert!(!sum.is_current(lazy.generation()));
    }

    #[test]
    fn test_concurrent_first_access() {
        let lock = Arc::new(PopulationLock::new());
        let lazy: Arc<Lazy<u32>> = Arc::new(Lazy::new("numbers"));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];

        for _ in 0..10 {
            let lock = lock.clone();
            let lazy = lazy.clone();
            let calls = calls.clone();
            handles.push(thread::spawn(move || {
                lazy.get_or_populate(&lock, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(std::time::Duration::from_millis(10));
                    Population::Complete((0..100).collect())
                })
            }));
        }

        let results: Vec<Arc<Vec<u32>>> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in &results {
            assert!(Arc::ptr_eq(result, &results[0]));
            assert_eq!(result.len(), 100);
        }
    }

    #[test]
    fn test_provider_handle() {
        let handle = ProviderHandle::new(42_u32);
        assert_eq!(handle.downcast_ref::<u32>(), Some(&42));
        assert!(handle.downcast_ref::<i64>().is_none());
        assert!(ProviderHandle::empty().downcast_ref::<u32>().is_none());
    }
}

//! Integration tests for lazy population of members, attributes and nested types.
//!
//! Covers self-referencing providers, recursive nested-type graphs and concurrent first
//! access from many threads.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Barrier, OnceLock, Weak,
    },
    thread,
    time::Duration,
};

use cilgraph::prelude::*;

fn setup(config: EngineConfig) -> (ModuleRc, TypeNodeRc) {
    let context = TypeContext::with_config(config);
    let corlib = Module::core_library(&context);
    let app = Module::new(&context, "App");
    app.add_reference(&corlib);
    let object = corlib.resolve("System", "Object").unwrap();
    (app, object)
}

/// Attribute provider whose single attribute names its own owner
struct SelfDescribing {
    calls: AtomicUsize,
}

impl MetadataProvider for SelfDescribing {
    fn attributes(&self, owner: &TypeNodeRc, _handle: &ProviderHandle) -> Option<Vec<Attribute>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // reads the collection that is being populated
        let seen = owner.attributes().len();
        Some(vec![Attribute::new(owner)
            .with_type(owner)
            .with_literal(i32::try_from(seen).unwrap_or(-1))])
    }
}

#[test]
fn test_self_referencing_attribute() {
    let (app, _) = setup(EngineConfig::default());
    let marker = app.define_type(TypeKind::Class, "App", "MarkerAttribute", TypeFlags::PUBLIC);
    let provider = Arc::new(SelfDescribing {
        calls: AtomicUsize::new(0),
    });
    marker.set_provider(provider.clone(), ProviderHandle::empty());

    let attributes = marker.attributes();

    assert_eq!(attributes.len(), 1);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert_eq!(marker.attributes_state(), PopulationState::Populated);
    let referenced = attributes[0].referenced_types();
    assert!(referenced.iter().all(|ty| Arc::ptr_eq(ty, &marker)));
    assert!(Arc::ptr_eq(&marker.attributes(), &attributes));
}

/// Each type contains the other one
struct MutualContainment {
    partner: OnceLock<TypeNodeRef>,
}

impl MetadataProvider for MutualContainment {
    fn nested_types(&self, _owner: &TypeNodeRc, _handle: &ProviderHandle) -> Option<Vec<TypeNodeRc>> {
        let partner = self.partner.get()?.upgrade()?;
        partner.nested_types();
        Some(vec![partner])
    }
}

#[test]
fn test_mutually_recursive_nested_types() {
    let (app, _) = setup(EngineConfig::default());
    let left = app.define_type(TypeKind::Class, "App", "Left", TypeFlags::PUBLIC);
    let right = app.define_type(TypeKind::Class, "App", "Right", TypeFlags::PUBLIC);

    let to_right = Arc::new(MutualContainment {
        partner: OnceLock::new(),
    });
    let to_left = Arc::new(MutualContainment {
        partner: OnceLock::new(),
    });
    let _ = to_right.partner.set(right.handle());
    let _ = to_left.partner.set(left.handle());
    left.set_provider(to_right, ProviderHandle::empty());
    right.set_provider(to_left, ProviderHandle::empty());

    let nested = left.nested_types();
    assert_eq!(nested.len(), 1);
    assert!(Arc::ptr_eq(&nested[0], &right));
    assert_eq!(right.nested_types_state(), PopulationState::Populated);
    assert!(Arc::ptr_eq(&right.nested_types()[0], &left));
}

/// Every type populated by this provider gets a fresh nested type, populated eagerly
struct Unbounded {
    this: Weak<Unbounded>,
    calls: AtomicUsize,
}

impl MetadataProvider for Unbounded {
    fn nested_types(&self, owner: &TypeNodeRc, _handle: &ProviderHandle) -> Option<Vec<TypeNodeRc>> {
        let depth = self.calls.fetch_add(1, Ordering::SeqCst);
        let module = owner.module()?;
        let child = module.define_nested_type(
            owner,
            TypeKind::Class,
            &format!("Level{depth}"),
            TypeFlags::NESTED_PUBLIC,
        );
        child.set_provider(self.this.upgrade()?, ProviderHandle::empty());
        child.nested_types();
        Some(vec![child])
    }
}

#[test]
fn test_nesting_cap_bounds_population() {
    let (app, _) = setup(EngineConfig::default().with_max_nesting_depth(5));
    let provider = Arc::new_cyclic(|this| Unbounded {
        this: this.clone(),
        calls: AtomicUsize::new(0),
    });
    let root = app.define_type(TypeKind::Class, "App", "Root", TypeFlags::PUBLIC);
    root.set_provider(provider.clone(), ProviderHandle::empty());

    let nested = root.nested_types();
    assert_eq!(nested.len(), 1);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 5);
    assert_eq!(app.context().nesting_depth(), 0);

    // walk down to the level that hit the cap
    let mut current = nested[0].clone();
    for _ in 0..4 {
        assert_eq!(current.nested_types_state(), PopulationState::Populated);
        current = current.nested_types()[0].clone();
    }
    assert_eq!(current.nested_types_state(), PopulationState::Unpopulated);

    // a later, shallower access continues where the cap stopped
    assert_eq!(current.nested_types().len(), 1);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 10);
}

/// Slow member provider counting its invocations
struct SlowMembers {
    field_type: TypeNodeRc,
    calls: AtomicUsize,
}

impl MetadataProvider for SlowMembers {
    fn members(&self, owner: &TypeNodeRc, _handle: &ProviderHandle) -> Option<Vec<MemberRc>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        Some(
            (0..16)
                .map(|index| {
                    Member::field(
                        owner,
                        &format!("field{index}"),
                        &self.field_type,
                        MemberFlags::PUBLIC,
                    )
                })
                .collect(),
        )
    }
}

#[test]
fn test_concurrent_first_access() {
    const THREADS: usize = 10;

    let (app, object) = setup(EngineConfig::default());
    let widget = app.define_type(TypeKind::Class, "App", "Widget", TypeFlags::PUBLIC);
    let provider = Arc::new(SlowMembers {
        field_type: object,
        calls: AtomicUsize::new(0),
    });
    widget.set_provider(provider.clone(), ProviderHandle::empty());

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let widget = widget.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                widget.members()
            })
        })
        .collect();

    let results: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    for members in &results {
        assert_eq!(members.len(), 16);
        assert!(Arc::ptr_eq(members, &results[0]));
    }
}

#[test]
fn test_bulk_replacement_invalidates_derived_caches() {
    let (app, object) = setup(EngineConfig::default());
    let widget = app.define_type(TypeKind::Class, "App", "Widget", TypeFlags::PUBLIC);
    widget.set_members(vec![Member::field(&widget, "value", &object, MemberFlags::PUBLIC)]);

    assert_eq!(widget.members_named("value").len(), 1);
    assert!(widget.constructors().is_empty());

    let generation = widget.members_generation();
    widget.set_members(vec![Member::method(
        &widget,
        ".ctor",
        None,
        &[],
        &[],
        MemberFlags::PUBLIC | MemberFlags::SPECIAL_NAME | MemberFlags::RT_SPECIAL_NAME,
    )]);

    assert!(widget.members_generation() > generation);
    assert!(widget.members_named("value").is_empty());
    assert_eq!(widget.constructors().len(), 1);
}

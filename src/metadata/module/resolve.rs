//! Namespace and type-name resolution.
//!
//! A module answers `(namespace, name)` queries from its own definitions first and then from
//! its references, in the order they were added. The first hit wins. Every module is visited
//! at most once per query, so reference cycles terminate.
//!
//! Results, including misses, are memoized per querying module. Memoized results carry the
//! context's definition epoch and are ignored once any module of the context defined a type
//! or gained a reference after they were computed.

use std::{collections::HashSet, sync::Arc};

use crate::metadata::{
    interner::CacheMap,
    module::Module,
    typesystem::{TypeNodeRc, TypeNodeRef},
};

/// Namespace key to name key to type, built from a module's top-level definitions
#[derive(Default)]
pub(crate) struct NamespaceTable {
    namespaces: CacheMap<CacheMap<TypeNodeRef>>,
}

impl NamespaceTable {
    fn insert(&mut self, namespace: i32, name: i32, node: TypeNodeRef) {
        // identifier keys are positive, set cannot fail here
        if !self.namespaces.contains_key(namespace) {
            let _ = self.namespaces.set(namespace, CacheMap::new());
        }
        if let Some(names) = self.namespaces.get_mut(namespace) {
            // first definition wins
            if !names.contains_key(name) {
                let _ = names.set(name, node);
            }
        }
    }

    fn get(&self, namespace: i32, name: i32) -> Option<TypeNodeRc> {
        self.namespaces.get(namespace)?.get(name)?.upgrade()
    }

    /// Number of distinct namespaces
    pub(crate) fn namespace_count(&self) -> usize {
        self.namespaces.len()
    }
}

/// Memoized outcome of a query
#[derive(Clone)]
pub(crate) enum Resolved {
    Found(TypeNodeRef),
    /// Sentinel for a query that found nothing
    Absent,
}

#[derive(Clone)]
pub(crate) struct Resolution {
    epoch: u64,
    resolved: Resolved,
}

impl Module {
    /// Resolve `namespace.name` in this module and its references
    ///
    /// ## Arguments
    /// * `namespace` - The namespace, empty for the global namespace
    /// * `name`      - The simple type name, including any arity suffix
    #[must_use]
    pub fn resolve(&self, namespace: &str, name: &str) -> Option<TypeNodeRc> {
        let interner = self.context().interner();
        // a name that was never interned cannot name a type
        let namespace = interner.lookup(namespace)?.key();
        let name = interner.lookup(name)?.key();

        let epoch = self.context().definitions_epoch();
        if let Some(cached) = self.resolutions.get(&(namespace, name)) {
            if cached.epoch == epoch {
                match &cached.resolved {
                    Resolved::Found(node) => {
                        if let Some(node) = node.upgrade() {
                            return Some(node);
                        }
                    }
                    Resolved::Absent => return None,
                }
            }
        }

        let mut visited = HashSet::new();
        let found = self.search(namespace, name, &mut visited);
        let resolved = match &found {
            Some(node) => Resolved::Found(node.handle()),
            None => Resolved::Absent,
        };
        self.resolutions
            .insert((namespace, name), Resolution { epoch, resolved });
        found
    }

    fn search(&self, namespace: i32, name: i32, visited: &mut HashSet<i32>) -> Option<TypeNodeRc> {
        if !visited.insert(self.unique_key()) {
            return None;
        }

        if let Some(node) = self.namespace_table().get(namespace, name) {
            return Some(node);
        }

        self.references
            .iter()
            .find_map(|(_, reference)| reference.search(namespace, name, visited))
    }

    /// Resolve the type nested in `outer` called `name`
    #[must_use]
    pub fn resolve_nested(&self, outer: &TypeNodeRc, name: &str) -> Option<TypeNodeRc> {
        let name = self.context().interner().lookup(name)?;
        outer.nested_type(&name)
    }

    /// Resolve a full name such as `System.Collections.Generic.Dictionary`2+Enumerator`
    ///
    /// The namespace ends at the last `.` before the first `+`; every `+` separates a nested
    /// type name.
    #[must_use]
    pub fn resolve_full_name(&self, full_name: &str) -> Option<TypeNodeRc> {
        let mut parts = full_name.split('+');
        let top = parts.next()?;
        let (namespace, name) = match top.rfind('.') {
            Some(separator) => (&top[..separator], &top[separator + 1..]),
            None => ("", top),
        };

        let mut current = self.resolve(namespace, name)?;
        for nested in parts {
            current = self.resolve_nested(&current, nested)?;
        }
        Some(current)
    }

    /// The namespace table of this module, built on first use after each definition
    pub(crate) fn namespace_table(&self) -> Arc<NamespaceTable> {
        if let Some(table) = read_lock!(self.namespaces).as_ref() {
            return table.clone();
        }

        let mut slot = write_lock!(self.namespaces);
        if let Some(table) = slot.as_ref() {
            return table.clone();
        }

        let mut table = NamespaceTable::default();
        for (_, node) in self.types.iter() {
            if let Some(node) = node.upgrade() {
                table.insert(node.namespace.key(), node.name.key(), node.handle());
            }
        }

        let table = Arc::new(table);
        *slot = Some(table.clone());
        table
    }

    pub(crate) fn invalidate_namespaces(&self) {
        *write_lock!(self.namespaces) = None;
        self.context().bump_definitions();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        context::TypeContext,
        typesystem::{TypeFlags, TypeKind},
    };

    #[test]
    fn test_own_types_first() {
        let context = TypeContext::new();
        let corlib = Module::core_library(&context);
        let app = Module::new(&context, "App");
        app.add_reference(&corlib);

        let shadow = app.define_type(TypeKind::Class, "System", "Object", TypeFlags::PUBLIC);
        assert!(Arc::ptr_eq(&app.resolve("System", "Object").unwrap(), &shadow));
        assert!(!Arc::ptr_eq(&corlib.resolve("System", "Object").unwrap(), &shadow));
    }

    #[test]
    fn test_references_in_order() {
        let context = TypeContext::new();
        let first = Module::new(&context, "First");
        let second = Module::new(&context, "Second");
        let app = Module::new(&context, "App");
        let a = first.define_type(TypeKind::Class, "Shared", "Thing", TypeFlags::PUBLIC);
        second.define_type(TypeKind::Class, "Shared", "Thing", TypeFlags::PUBLIC);
        let only_second = second.define_type(TypeKind::Class, "Shared", "Other", TypeFlags::PUBLIC);

        app.add_reference(&first);
        app.add_reference(&second);

        assert!(Arc::ptr_eq(&app.resolve("Shared", "Thing").unwrap(), &a));
        assert!(Arc::ptr_eq(&app.resolve("Shared", "Other").unwrap(), &only_second));
    }

    #[test]
    fn test_negative_result_invalidated_by_definition() {
        let context = TypeContext::new();
        let library = Module::new(&context, "Library");
        let app = Module::new(&context, "App");
        app.add_reference(&library);
        context.intern("Late");
        context.intern("Sample");

        assert!(app.resolve("Sample", "Late").is_none());
        let late = library.define_type(TypeKind::Class, "Sample", "Late", TypeFlags::PUBLIC);
        assert!(Arc::ptr_eq(&app.resolve("Sample", "Late").unwrap(), &late));
    }

    #[test]
    fn test_unknown_names() {
        let context = TypeContext::new();
        let corlib = Module::core_library(&context);

        assert!(corlib.resolve("System", "NeverInterned").is_none());
        assert!(corlib.resolve("Nowhere", "Int32").is_none());
        assert!(corlib.resolve("System", "Int32").is_some());
    }

    #[test]
    fn test_reference_cycles_terminate() {
        let context = TypeContext::new();
        let left = Module::new(&context, "Left");
        let right = Module::new(&context, "Right");
        left.add_reference(&right);
        right.add_reference(&left);
        let target = right.define_type(TypeKind::Class, "Cycle", "Target", TypeFlags::PUBLIC);

        assert!(Arc::ptr_eq(&left.resolve("Cycle", "Target").unwrap(), &target));
        assert!(left.resolve("Cycle", "Missing").is_none());
        context.intern("Missing");
        assert!(right.resolve("Cycle", "Missing").is_none());
    }

    #[test]
    fn test_nested_and_full_names() {
        let context = TypeContext::new();
        let module = Module::new(&context, "Sample");
        let outer = module.define_type(TypeKind::Class, "Sample.Collections", "Map`2", TypeFlags::PUBLIC);
        let inner = module.define_nested_type(&outer, TypeKind::Struct, "Enumerator", TypeFlags::NESTED_PUBLIC);
        let deepest = module.define_nested_type(&inner, TypeKind::Class, "State", TypeFlags::NESTED_PRIVATE);
        let global = module.define_type(TypeKind::Class, "", "Global", TypeFlags::PUBLIC);

        assert!(Arc::ptr_eq(&module.resolve_nested(&outer, "Enumerator").unwrap(), &inner));
        assert!(Arc::ptr_eq(
            &module.resolve_full_name("Sample.Collections.Map`2+Enumerator+State").unwrap(),
            &deepest
        ));
        assert!(Arc::ptr_eq(&module.resolve_full_name("Global").unwrap(), &global));
        assert!(module.resolve_full_name("Sample.Collections.Map`2+Missing").is_none());
        assert_eq!(module.namespace_table().namespace_count(), 2);
    }
}

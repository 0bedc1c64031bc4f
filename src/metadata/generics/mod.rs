//! Generic instantiation engine.
//!
//! [`Instantiator`] produces the canonical instance of a generic type or method template over
//! concrete arguments. Instances are cached per scope module, so requesting the same template
//! and arguments twice from the same module yields the identical object.
//!
//! # Algorithm
//!
//! 1. Nested templates whose enclosing types are generic are resolved first: the enclosing
//!    type is instantiated with the leading arguments, the same-named nested type is looked
//!    up in that instance and instantiated with the trailing arguments.
//! 2. The unique mangled name of the request is looked up in the scope's instance cache. A
//!    cached entry only counts as a hit if it was created from the same template over
//!    structurally equivalent arguments; otherwise the next `_n` suffixed name is probed.
//! 3. On a miss the coarse population lock is taken and the cache is probed again. The new
//!    instance copies the template's declaration with every template parameter substituted;
//!    its members, attributes and nested types are specialized lazily.
//!
//! A request for a template that is currently being instantiated further up the stack, and
//! that is not cached yet, yields the template itself. This bounds expansions such as
//! `class Node<T> : Base<Node<Node<T>>>`.
//!
//! # Examples
//!
//! ```rust
//! use cilgraph::prelude::*;
//!
//! let context = TypeContext::new();
//! let corlib = Module::core_library(&context);
//! let int32 = corlib.resolve("System", "Int32").unwrap();
//!
//! let list = TypeBuilder::new(corlib.clone())
//!     .class("Sample", "List`1", TypeFlags::PUBLIC)?
//!     .generic_parameters(&["T"])?
//!     .build()?;
//!
//! let first = corlib.instantiate(&list, &[int32.clone()]);
//! let second = Instantiator::new(&corlib).instantiate(&list, &[int32]);
//! assert!(std::sync::Arc::ptr_eq(&first, &second));
//! assert_eq!(first.full_name(), "Sample.List`1<System.Int32>");
//! # Ok::<(), cilgraph::Error>(())
//! ```

mod mangle;
mod specialize;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

pub use mangle::{mangled_name, suffixed, unique_mangled_name, unique_method_name};
pub(crate) use specialize::{Specializer, SpecializingProvider, Substitution};

use crate::metadata::{
    context::TypeContext,
    interner::Identifier,
    module::Module,
    typesystem::{
        equivalent_lists, GenericInstance, Member, MemberRc, MemberRef, MethodInstance,
        ProviderHandle, TypeNodeRc, TypeNodeRef,
    },
};

/// Creates and caches generic instances in a scope module
pub struct Instantiator<'a> {
    scope: &'a Arc<Module>,
}

impl<'a> Instantiator<'a> {
    /// An instantiator registering instances in `scope`
    #[must_use]
    pub fn new(scope: &'a Arc<Module>) -> Self {
        Instantiator { scope }
    }

    /// Instantiate `template` over its consolidated `arguments`
    ///
    /// `arguments` lists the arguments of every generic enclosing type, outermost first,
    /// followed by the template's own arguments. A request that cannot be satisfied (wrong
    /// argument count, missing nested type, recursion limit) is logged and answered with the
    /// template itself.
    ///
    /// ## Arguments
    /// * `template`  - A generic type definition
    /// * `arguments` - The consolidated type arguments
    #[must_use]
    pub fn instantiate(&self, template: &TypeNodeRc, arguments: &[TypeNodeRc]) -> TypeNodeRc {
        if template.generic_instance().is_some() {
            log::warn!("{} is already a generic instance", template.full_name());
            return template.clone();
        }

        let declaring = template.declaring_type();
        let leading = declaring
            .as_ref()
            .map_or(0, |declaring| declaring.consolidated_template_parameters().len());
        let own = template.template_parameter_count();
        if leading + own == 0 || arguments.len() != leading + own {
            log::warn!(
                "{} expects {} type arguments, got {}",
                template.full_name(),
                leading + own,
                arguments.len()
            );
            return template.clone();
        }

        match declaring {
            Some(declaring) if leading > 0 => {
                self.instantiate_nested(template, &declaring, arguments, leading)
            }
            _ => self.instantiate_own(template, arguments),
        }
    }

    fn instantiate_nested(
        &self,
        template: &TypeNodeRc,
        declaring: &TypeNodeRc,
        arguments: &[TypeNodeRc],
        leading: usize,
    ) -> TypeNodeRc {
        let outer = self.instantiate(declaring, &arguments[..leading]);
        if Arc::ptr_eq(&outer, declaring) {
            return template.clone();
        }

        let Some(nested) = outer.nested_type(&template.name) else {
            log::warn!(
                "{} has no nested type {}, using the template",
                outer.full_name(),
                template.name
            );
            return template.clone();
        };

        if nested.is_generic_template() {
            self.instantiate_own(&nested, &arguments[leading..])
        } else {
            nested
        }
    }

    /// Instantiate `template` over its own arguments; enclosing types are not generic or
    /// already instantiated
    fn instantiate_own(&self, template: &TypeNodeRc, arguments: &[TypeNodeRc]) -> TypeNodeRc {
        let scope = self.scope;
        let context = scope.context();

        let mut consolidated = template
            .declaring_type()
            .map(|declaring| declaring.consolidated_template_arguments())
            .unwrap_or_default();
        consolidated.extend(arguments.iter().cloned());

        let unique = unique_mangled_name(template, arguments);
        let confirm = |existing: &TypeNodeRc| is_instance_of(existing, template, &consolidated);

        let cached = |key: i32| read_lock!(scope.instance_cache).get(key).cloned();
        if let Some(hit) = find_cached(context, &unique, cached, confirm) {
            log::debug!("instance cache hit for {}", hit.full_name());
            return hit;
        }

        let _guard = context.population_lock().acquire();
        let known = |key: i32| {
            let cached = read_lock!(scope.instance_cache).get(key).cloned();
            cached.or_else(|| read_lock!(scope.pending_instances).get(key).cloned())
        };
        let slot = match reserve_slot(context, &unique, known, confirm) {
            Slot::Occupied(hit) => return hit,
            Slot::Vacant(slot) => slot,
        };

        if template.instantiating.load(Ordering::Acquire) {
            log::debug!(
                "{} is being instantiated, using the template",
                template.full_name()
            );
            return template.clone();
        }
        let Some(_depth) = context.enter_instantiation() else {
            log::warn!(
                "instantiation depth {} reached at {}",
                context.config().max_instantiation_depth,
                template.full_name()
            );
            return template.clone();
        };
        let _flag = RaisedFlag::raise(&template.instantiating);

        let instance = self.create_instance(template, arguments, &consolidated);
        if let Err(error) = write_lock!(scope.pending_instances).set(slot.key(), instance.clone()) {
            log::error!("cannot reserve {unique}: {error}");
        }

        let substitution = Substitution::from_pairs(&template.template_parameters(), arguments);
        {
            let specializer = Specializer::new(&substitution, scope);
            specialize::copy_constraints(&specializer, template, &instance);
        }
        instance.set_provider(
            Arc::new(SpecializingProvider::new(template, substitution, scope)),
            ProviderHandle::empty(),
        );

        if let Err(error) = write_lock!(scope.instance_cache).set(slot.key(), instance.clone()) {
            log::error!("cannot cache {unique}: {error}");
        }
        if let Err(error) = write_lock!(scope.pending_instances).remove(slot.key()) {
            log::error!("cannot release {unique}: {error}");
        }
        scope.index_instance(&instance);
        if template
            .module()
            .is_some_and(|module| Arc::ptr_eq(&module, scope))
        {
            template.record_instance(&instance);
        }

        log::debug!("instantiated {} in {}", instance.full_name(), scope.name);
        instance
    }

    fn create_instance(
        &self,
        template: &TypeNodeRc,
        arguments: &[TypeNodeRc],
        consolidated: &[TypeNodeRc],
    ) -> TypeNodeRc {
        let context = self.scope.context();
        let fully_specialized = consolidated
            .iter()
            .all(|argument| argument.is_fully_specialized());
        let visibility = arguments
            .iter()
            .filter(|argument| argument.is_fully_specialized())
            .fold(template.visibility(), |visibility, argument| {
                visibility.narrowest(argument.visibility())
            });

        let instance = self.scope.create_node(
            template.kind.clone(),
            template.namespace.clone(),
            context.intern(&mangled_name(template.name.as_str(), arguments)),
            template.flags,
            Some(GenericInstance {
                template: template.handle(),
                arguments: arguments.iter().map(TypeNodeRef::new).collect(),
                fully_specialized,
                visibility,
            }),
        );
        if let Some(declaring) = template.declaring_type() {
            instance.set_declaring_type(&declaring);
        }
        instance
    }

    /// Instantiate the generic method `method` over its method-level `arguments`
    ///
    /// Method instances are cached on the method definition. Requests with the wrong number of
    /// arguments, or for methods without type parameters, return `method` itself.
    #[must_use]
    pub fn instantiate_method(&self, method: &MemberRc, arguments: &[TypeNodeRc]) -> MemberRc {
        let parameters = method.template_parameters();
        if parameters.is_empty() || parameters.len() != arguments.len() {
            log::warn!(
                "{} expects {} method type arguments, got {}",
                method.full_name(),
                parameters.len(),
                arguments.len()
            );
            return method.clone();
        }

        let context = method.context();
        let unique = unique_method_name(method, arguments);
        let confirm = |existing: &MemberRc| {
            existing.method_instance().is_some_and(|instance| {
                instance.template.ptr_eq(method)
                    && equivalent_lists(
                        &instance
                            .arguments
                            .iter()
                            .filter_map(TypeNodeRef::upgrade)
                            .collect::<Vec<_>>(),
                        arguments,
                    )
            })
        };

        let cached = |key: i32| read_lock!(method.instances).get(key).cloned();
        if let Some(hit) = find_cached(context, &unique, cached, confirm) {
            return hit;
        }

        let _guard = context.population_lock().acquire();
        let slot = match reserve_slot(context, &unique, cached, confirm) {
            Slot::Occupied(hit) => return hit,
            Slot::Vacant(slot) => slot,
        };
        if method.instantiating.load(Ordering::Acquire) {
            return method.clone();
        }
        let _flag = RaisedFlag::raise(&method.instantiating);

        let substitution = Substitution::from_pairs(&parameters, arguments);
        let specializer = Specializer::new(&substitution, self.scope);
        let instance = Member::create(
            context,
            method.name.clone(),
            specializer.specialize_member_kind(&method.kind),
            method.flags,
            Some(MethodInstance {
                template: MemberRef::new(method),
                arguments: arguments.iter().map(TypeNodeRef::new).collect(),
            }),
        );
        if let Some(owner) = method.declaring_type() {
            instance.set_declaring_type(&owner);
        }

        if let Err(error) = write_lock!(method.instances).set(slot.key(), instance.clone()) {
            log::error!("cannot cache {unique}: {error}");
        }
        log::debug!("instantiated method {unique}");
        instance
    }
}

/// `true` if `existing` is an instance of `template` over equivalent consolidated arguments
fn is_instance_of(existing: &TypeNodeRc, template: &TypeNodeRc, consolidated: &[TypeNodeRc]) -> bool {
    existing
        .generic_instance()
        .is_some_and(|instance| instance.template.ptr_eq(template))
        && equivalent_lists(&existing.consolidated_template_arguments(), consolidated)
}

/// Outcome of probing a cache while holding the population lock
enum Slot<T> {
    /// A confirmed entry exists
    Occupied(T),
    /// The first free candidate name
    Vacant(Identifier),
}

/// Probe `unique`, `unique_1`, ... without interning new names
fn find_cached<T, L, C>(context: &TypeContext, unique: &str, lookup: L, confirm: C) -> Option<T>
where
    L: Fn(i32) -> Option<T>,
    C: Fn(&T) -> bool,
{
    let mut attempt = 0;
    loop {
        let name = context.interner().lookup(&suffixed(unique, attempt))?;
        let existing = lookup(name.key())?;
        if confirm(&existing) {
            return Some(existing);
        }
        attempt += 1;
    }
}

/// Probe `unique`, `unique_1`, ... until a confirmed entry or a free name is found
fn reserve_slot<T, L, C>(context: &TypeContext, unique: &str, lookup: L, confirm: C) -> Slot<T>
where
    L: Fn(i32) -> Option<T>,
    C: Fn(&T) -> bool,
{
    let threshold = context.config().disambiguation_warn_threshold;
    let mut attempt = 0;
    loop {
        let name = context.intern(&suffixed(unique, attempt));
        match lookup(name.key()) {
            None => return Slot::Vacant(name),
            Some(existing) if confirm(&existing) => return Slot::Occupied(existing),
            Some(_) => {
                if attempt == threshold {
                    log::warn!("{unique} needed more than {threshold} disambiguation suffixes");
                }
                attempt += 1;
            }
        }
    }
}

/// Sets a flag for the lifetime of the guard
struct RaisedFlag<'a>(&'a AtomicBool);

impl<'a> RaisedFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        RaisedFlag(flag)
    }
}

impl Drop for RaisedFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

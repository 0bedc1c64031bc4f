//! Names of generic instances.
//!
//! Every instance is known under two names:
//!
//! - the *mangled name* `Name<Arg1.FullName,Arg2.FullName>`, which is what users see and what
//!   [`crate::metadata::module::Module::find_instance`] looks up;
//! - the *unique mangled name*, which additionally embeds the unique key of every argument and
//!   the full name of the template. It keys the instance cache of a module.
//!
//! Unique mangled names still collide when two distinct templates share a full name. Such
//! collisions are resolved by probing `_1`, `_2`, ... suffixes, see [`suffixed`].

use crate::metadata::typesystem::{Member, TypeNode, TypeNodeRc};

/// Render `name<A,B>` from the full names of `arguments`
#[must_use]
pub fn mangled_name(name: &str, arguments: &[TypeNodeRc]) -> String {
    let mut mangled = String::with_capacity(name.len() + arguments.len() * 16 + 2);
    mangled.push_str(name);
    mangled.push('<');
    for (index, argument) in arguments.iter().enumerate() {
        if index > 0 {
            mangled.push(',');
        }
        mangled.push_str(&argument.full_name());
    }
    mangled.push('>');
    mangled
}

/// Render the cache key name of an instance of `template` over its own `arguments`
///
/// Arguments are rendered as `FullName#key`, so two arguments with the same full name but a
/// different identity produce different names.
#[must_use]
pub fn unique_mangled_name(template: &TypeNode, arguments: &[TypeNodeRc]) -> String {
    with_unique_arguments(template.full_name(), arguments)
}

/// Render the cache key name of an instance of the generic method `method`
#[must_use]
pub fn unique_method_name(method: &Member, arguments: &[TypeNodeRc]) -> String {
    with_unique_arguments(method.full_name(), arguments)
}

fn with_unique_arguments(mut mangled: String, arguments: &[TypeNodeRc]) -> String {
    mangled.push('<');
    for (index, argument) in arguments.iter().enumerate() {
        if index > 0 {
            mangled.push(',');
        }
        mangled.push_str(&argument.full_name());
        mangled.push('#');
        mangled.push_str(&argument.unique_key().to_string());
    }
    mangled.push('>');
    mangled
}

/// The `attempt`-th candidate name for `unique`, `attempt` 0 being `unique` itself
#[must_use]
pub fn suffixed(unique: &str, attempt: usize) -> String {
    if attempt == 0 {
        unique.to_string()
    } else {
        format!("{unique}_{attempt}")
    }
}

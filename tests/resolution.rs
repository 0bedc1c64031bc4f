//! Integration tests for namespace resolution across modules.

use std::sync::Arc;

use cilgraph::{prelude::*, Result};

#[test]
fn test_core_library_names() {
    let context = TypeContext::new();
    let corlib = Module::core_library(&context);

    for kind in [
        PrimitiveKind::Boolean,
        PrimitiveKind::I4,
        PrimitiveKind::U8,
        PrimitiveKind::R8,
        PrimitiveKind::I,
    ] {
        let node = corlib.resolve(kind.namespace(), kind.name()).unwrap();
        assert_eq!(node.full_name(), kind.full_name());
    }
    let string = corlib.resolve_full_name("System.String").unwrap();
    assert!(Arc::ptr_eq(
        &string.base_type().unwrap(),
        &corlib.resolve("System", "Object").unwrap()
    ));
}

#[test]
fn test_resolution_through_references() -> Result<()> {
    let context = TypeContext::new();
    let corlib = Module::core_library(&context);
    let library = Module::new(&context, "Library");
    library.add_reference(&corlib);
    let app = Module::new(&context, "App");
    app.add_reference(&library);

    let dictionary = TypeBuilder::new(library.clone())
        .class("Library.Collections", "Dictionary`2", TypeFlags::PUBLIC)?
        .generic_parameters(&["K", "V"])?
        .build()?;
    let enumerator = TypeBuilder::new(library.clone())
        .nested(&dictionary, TypeKind::Struct, "Enumerator", TypeFlags::NESTED_PUBLIC)?
        .build()?;

    assert!(Arc::ptr_eq(
        &app.resolve("Library.Collections", "Dictionary`2").unwrap(),
        &dictionary
    ));
    assert!(Arc::ptr_eq(
        &app.resolve_full_name("Library.Collections.Dictionary`2+Enumerator").unwrap(),
        &enumerator
    ));
    // transitive references are searched as well
    assert!(app.resolve("System", "Int32").is_some());
    assert!(app.resolve("Library.Collections", "Enumerator").is_none());
    Ok(())
}

#[test]
fn test_later_definitions_become_visible() {
    let context = TypeContext::new();
    let library = Module::new(&context, "Library");
    let app = Module::new(&context, "App");

    context.intern("Plugins");
    context.intern("Loader");
    assert!(app.resolve("Plugins", "Loader").is_none());

    app.add_reference(&library);
    assert!(app.resolve("Plugins", "Loader").is_none());

    let loader = library.define_type(TypeKind::Class, "Plugins", "Loader", TypeFlags::PUBLIC);
    assert!(Arc::ptr_eq(&app.resolve("Plugins", "Loader").unwrap(), &loader));
}

#[test]
fn test_lookup_is_case_sensitive() {
    let context = TypeContext::new();
    let corlib = Module::core_library(&context);
    context.intern("int32");

    assert!(corlib.resolve("System", "Int32").is_some());
    assert!(corlib.resolve("System", "int32").is_none());
    assert!(corlib.resolve("system", "Int32").is_none());
}

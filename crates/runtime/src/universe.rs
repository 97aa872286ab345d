//! The universe: root lexical scope of every Tern program
//!
//! Defines the primitive type names, the sentinels `nil`/`true`/`false`,
//! the reserved identifiers `iota` and `_`, the `error` and `stringer`
//! interfaces, and the built-in functions.
//!
//! # Bootstrap
//!
//! Built-in signatures reference types the universe itself defines, so
//! initialisation uses a three-state protocol: `uninitialised →
//! initialising → initialised`. A re-entrant request during the
//! `initialising` window gets an *empty placeholder* instead of blocking or
//! recursing; after initialisation every lookup returns the fully
//! populated scope. Initialisation is per interpreter thread and is not
//! re-entrant beyond that placeholder rule.

use crate::machine::{Machine, NativeFn};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tern_core::errors::RuntimeError;
use tern_core::typed_value::{TypedValue, typed_bool, typed_int, typed_type};
use tern_core::types::{
    DeclaredType, FieldType, FuncType, InterfaceType, Kind, Type, TypeHandle, fld, primitive,
    string_type,
};
use tern_core::value::{PackageNode, PackageValue};
use tracing::debug;

/// The universe scope is hidden, hence the leading dot in its path.
pub const UNIVERSE_PKG_PATH: &str = ".universe";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UniverseInit {
    Uninitialized,
    Initializing,
    Initialized,
}

thread_local! {
    static UNIVERSE_INIT: Cell<UniverseInit> = const { Cell::new(UniverseInit::Uninitialized) };
    static UNIVERSE_NODE: RefCell<Option<Rc<PackageNode>>> = const { RefCell::new(None) };
    static UNIVERSE_VALUE: RefCell<Option<Rc<PackageValue>>> = const { RefCell::new(None) };
}

/// The universe environment. During its own initialisation this returns an
/// empty placeholder package.
pub fn universe() -> Rc<PackageValue> {
    match UNIVERSE_INIT.with(|s| s.get()) {
        UniverseInit::Uninitialized => {
            UNIVERSE_INIT.with(|s| s.set(UniverseInit::Initializing));
            make_universe_node();
            UNIVERSE_INIT.with(|s| s.set(UniverseInit::Initialized));
        }
        UniverseInit::Initializing => return Rc::new(PackageValue::empty()),
        UniverseInit::Initialized => {}
    }
    UNIVERSE_VALUE.with(|v| v.borrow().clone().expect("universe value initialized"))
}

/// The universe's static node. Placeholder rule as for [`universe`].
pub fn universe_node() -> Rc<PackageNode> {
    match UNIVERSE_INIT.with(|s| s.get()) {
        UniverseInit::Uninitialized => {
            UNIVERSE_INIT.with(|s| s.set(UniverseInit::Initializing));
            make_universe_node();
            UNIVERSE_INIT.with(|s| s.set(UniverseInit::Initialized));
        }
        UniverseInit::Initializing => return Rc::new(PackageNode::new("", "")),
        UniverseInit::Initialized => {}
    }
    UNIVERSE_NODE.with(|n| n.borrow().clone().expect("universe node initialized"))
}

/// The `error` interface: a single `Error() string` method.
pub fn error_type() -> TypeHandle {
    declared_interface("error", "Error")
}

/// The `stringer` interface: a single `String() string` method.
pub fn stringer_type() -> TypeHandle {
    declared_interface("stringer", "String")
}

fn declared_interface(name: &str, method: &str) -> TypeHandle {
    Rc::new(Type::Declared(DeclaredType {
        pkg_path: UNIVERSE_PKG_PATH.to_string(),
        name: name.to_string(),
        base: Rc::new(Type::Interface(InterfaceType {
            pkg_path: UNIVERSE_PKG_PATH.to_string(),
            methods: vec![fld(
                method,
                Rc::new(Type::Func(FuncType {
                    params: vec![],
                    results: vec![fld("", string_type())],
                })),
            )],
        })),
    }))
}

/// The empty interface, used for generic built-in signatures.
fn any_t() -> TypeHandle {
    Rc::new(Type::Interface(InterfaceType {
        pkg_path: String::new(),
        methods: vec![],
    }))
}

fn int_result() -> Vec<FieldType> {
    vec![fld("", tern_core::types::int_type())]
}

fn make_universe_node() {
    debug!("initializing universe scope");
    let mut node = PackageNode::new("universe", UNIVERSE_PKG_PATH);

    let undefined = TypedValue::default;

    // Reserved placeholders
    node.define("_", undefined());
    node.define("iota", undefined());
    node.define("nil", undefined());

    // Primitive types
    node.define("bigint", typed_type(primitive(Kind::BigInt)));
    node.define("bool", typed_type(primitive(Kind::Bool)));
    node.define("byte", typed_type(primitive(Kind::Uint8)));
    node.define("float32", typed_type(primitive(Kind::Float32)));
    node.define("float64", typed_type(primitive(Kind::Float64)));
    node.define("int", typed_type(primitive(Kind::Int)));
    node.define("int8", typed_type(primitive(Kind::Int8)));
    node.define("int16", typed_type(primitive(Kind::Int16)));
    node.define("int32", typed_type(primitive(Kind::Int32)));
    node.define("int64", typed_type(primitive(Kind::Int64)));
    node.define("rune", typed_type(primitive(Kind::Int32)));
    node.define("string", typed_type(primitive(Kind::String)));
    node.define("uint", typed_type(primitive(Kind::Uint)));
    node.define("uint8", typed_type(primitive(Kind::Uint8)));
    node.define("uint16", typed_type(primitive(Kind::Uint16)));
    node.define("uint32", typed_type(primitive(Kind::Uint32)));
    node.define("uint64", typed_type(primitive(Kind::Uint64)));
    // The type of type values cannot be named "type" (it is a keyword);
    // the name "typeval" stands in for it.
    node.define("typeval", typed_type(Rc::new(Type::Meta)));
    node.define("error", typed_type(error_type()));
    node.define("stringer", typed_type(stringer_type()));

    // Values
    node.define("true", typed_bool(true));
    node.define("false", typed_bool(false));

    // Declared but deliberately absent behaviour
    node.define("close", undefined());
    node.define("complex", undefined());

    // Functions. The handler registry is keyed by these names; see
    // [`builtin`].
    node.define_native(
        "append",
        vec![fld("x", any_t()), fld("args", any_t())],
        vec![fld("res", any_t())],
    );
    node.define_native("cap", vec![fld("x", any_t())], int_result());
    node.define_native(
        "copy",
        vec![fld("dst", any_t()), fld("src", any_t())],
        int_result(),
    );
    node.define_native("delete", vec![fld("m", any_t()), fld("k", any_t())], vec![]);
    node.define_native("len", vec![fld("x", any_t())], int_result());
    node.define_native(
        "make",
        vec![fld("t", Rc::new(Type::Meta)), fld("z", any_t())],
        vec![fld("", any_t())],
    );
    node.define_native(
        "new",
        vec![fld("t", Rc::new(Type::Meta))],
        vec![fld("", any_t())],
    );
    node.define_native("print", vec![fld("xs", any_t())], vec![]);
    node.define_native("println", vec![fld("xs", any_t())], vec![]);
    node.define_native("recover", vec![], vec![fld("exception", any_t())]);

    let node = Rc::new(node);
    let value = Rc::new(node.new_package());
    UNIVERSE_NODE.with(|n| *n.borrow_mut() = Some(node));
    UNIVERSE_VALUE.with(|v| *v.borrow_mut() = Some(value));
}

/// Resolve a built-in name to its native handler.
pub fn builtin(name: &str) -> Option<NativeFn> {
    match name {
        "append" => Some(crate::slice_ops::builtin_append),
        "cap" => Some(builtin_cap),
        "copy" => Some(crate::slice_ops::builtin_copy),
        "delete" => Some(crate::map_ops::builtin_delete),
        "len" => Some(builtin_len),
        "make" => Some(crate::make_ops::builtin_make),
        "new" => Some(crate::make_ops::builtin_new),
        "print" => Some(crate::io::builtin_print),
        "println" => Some(crate::io::builtin_println),
        "recover" => Some(builtin_recover),
        _ => None,
    }
}

/// `len(x)` for strings, arrays, slices, maps, and foreign sequences.
pub fn builtin_len(m: &mut Machine) -> Result<(), RuntimeError> {
    let arg0 = m.params1();
    let n = arg0.get_length()? as i64;
    m.push_value(typed_int(n));
    Ok(())
}

/// `cap(x)`; the capacity of a non-slice is its length.
pub fn builtin_cap(m: &mut Machine) -> Result<(), RuntimeError> {
    let arg0 = m.params1();
    let n = arg0.get_capacity()? as i64;
    m.push_value(typed_int(n));
    Ok(())
}

/// `recover()` per the panic-scope protocol.
pub fn builtin_recover(m: &mut Machine) -> Result<(), RuntimeError> {
    let Some(exception) = m.exceptions.last().cloned() else {
        m.push_value(TypedValue::default());
        return Ok(());
    };

    // The exception is outside the current deferred scope.
    if m.panic_scope <= m.defer_panic_scope {
        m.push_value(TypedValue::default());
        return Ok(());
    }

    // If the panicking frame is still live it must be the frame that
    // deferred the function executing this recover; the call frame above
    // it is the recover invocation itself.
    if !exception.frame.popped() {
        match m.last_call_frame(2) {
            Some(frame) if Rc::ptr_eq(&frame, &exception.frame) => {}
            _ => {
                m.push_value(TypedValue::default());
                return Ok(());
            }
        }
    }

    m.push_value(exception.value);
    m.exceptions.clear();
    Ok(())
}

//! End-to-end scenarios for the built-in dispatcher
//!
//! These tests drive the public machine ABI the way the interpreter does:
//! operands pre-collected into parameter blocks, variadic arguments
//! gathered into slices, deferred frames pushed during unwinding.

use std::rc::Rc;
use tern_core::errors::RuntimeError;
use tern_core::realm::RecordingRealm;
use tern_core::typed_value::{TypedValue, typed_int, typed_string};
use tern_core::types::{Kind, SliceType, Type, byte_slice_type, int_type};
use tern_core::value::{ArrayData, BaseRef, Value};
use tern_runtime::machine::Machine;
use tern_runtime::universe::universe;

fn int_slice_type() -> Rc<Type> {
    Rc::new(Type::Slice(SliceType {
        elt: int_type(),
        vrd: false,
    }))
}

fn byte_slice(m: &mut Machine, bytes: &[u8]) -> TypedValue {
    let n = bytes.len();
    let base = m.alloc.new_array_from_data(bytes.to_vec()).unwrap();
    TypedValue {
        t: Some(byte_slice_type(false)),
        v: Value::Slice(m.alloc.new_slice(base, 0, n, n).unwrap()),
    }
}

fn varargs(m: &mut Machine, items: Vec<TypedValue>) -> TypedValue {
    let n = items.len();
    let base = m.alloc.new_list_array(n).unwrap();
    {
        let mut arr = base.borrow_mut();
        let ArrayData::List(list) = &mut arr.data else {
            unreachable!()
        };
        for (i, tv) in items.into_iter().enumerate() {
            list[i] = tv;
        }
    }
    TypedValue {
        t: Some(Rc::new(Type::Slice(SliceType {
            elt: int_type(),
            vrd: true,
        }))),
        v: Value::Slice(m.alloc.new_slice(base, 0, n, n).unwrap()),
    }
}

fn base_id(tv: &TypedValue) -> u64 {
    match &tv.v {
        Value::Slice(s) => match &s.base {
            BaseRef::Array(a) => a.borrow().id,
            BaseRef::Unresolved(id) => *id,
        },
        other => panic!("expected slice, got {:?}", other),
    }
}

// Scenario 1: append across representation. []byte{1,2,3} appended to
// itself doubles into a Data base with length == capacity == 6.
#[test]
fn test_append_across_representation() {
    let mut m = Machine::new();
    let s = byte_slice(&mut m, &[1, 2, 3]);
    let out = m.call_builtin("append", vec![s.clone(), s]).unwrap();
    let r = &out[0];
    assert_eq!(r.sprint(), "[1 2 3 1 2 3]");
    assert_eq!(r.get_length().unwrap(), 6);
    assert_eq!(r.get_capacity().unwrap(), 6);
    match &r.v {
        Value::Slice(sv) => match &sv.base {
            BaseRef::Array(a) => assert!(a.borrow().is_data()),
            other => panic!("unresolved base {:?}", other),
        },
        other => panic!("expected slice, got {:?}", other),
    }
}

// Scenario 2: append with capacity. make([]int, 0, 4) grows in place twice,
// then reallocates on the fifth element.
#[test]
fn test_append_with_capacity() {
    let mut m = Machine::new();
    let args = varargs(&mut m, vec![typed_int(0), typed_int(4)]);
    let made = m
        .call_builtin(
            "make",
            vec![tern_core::typed_value::typed_type(int_slice_type()), args],
        )
        .unwrap()
        .remove(0);
    let original_base = base_id(&made);

    let src = varargs(&mut m, vec![typed_int(10), typed_int(20)]);
    let r = m
        .call_builtin("append", vec![made, src])
        .unwrap()
        .remove(0);
    assert_eq!(r.get_length().unwrap(), 2);
    assert_eq!(r.get_capacity().unwrap(), 4);
    assert_eq!(base_id(&r), original_base);

    let src = varargs(&mut m, vec![typed_int(30), typed_int(40)]);
    let r = m.call_builtin("append", vec![r, src]).unwrap().remove(0);
    assert_eq!(base_id(&r), original_base);
    assert_eq!(r.sprint(), "[10 20 30 40]");

    let src = varargs(&mut m, vec![typed_int(50)]);
    let r = m.call_builtin("append", vec![r, src]).unwrap().remove(0);
    assert_ne!(base_id(&r), original_base);
    assert!(r.get_capacity().unwrap() >= 5);
    assert_eq!(r.sprint(), "[10 20 30 40 50]");
}

// Scenario 3: copy truncation. A 3-byte destination takes exactly 3 of 5.
#[test]
fn test_copy_truncation() {
    let mut m = Machine::new();
    let dst = byte_slice(&mut m, &[0, 0, 0]);
    let src = byte_slice(&mut m, &[9, 9, 9, 9, 9]);
    let out = m.call_builtin("copy", vec![dst.clone(), src]).unwrap();
    assert_eq!(out[0].convert_get_int().unwrap(), 3);
    assert_eq!(dst.sprint(), "[9 9 9]");
}

// Scenario 4: map delete event count. Deleting a present key emits exactly
// two realm events and leaves iteration order intact.
#[test]
fn test_map_delete_event_count() {
    let realm = RecordingRealm::new();
    let mut m = Machine::builder()
        .with_realm(Box::new(realm.clone()))
        .build();

    let mv = m.alloc.new_map(0).unwrap();
    for (i, k) in ["a", "b", "c"].iter().enumerate() {
        mv.borrow_mut()
            .set(typed_string(k), typed_int(i as i64))
            .unwrap();
    }
    let map = TypedValue {
        t: Some(Rc::new(Type::Map(tern_core::types::MapType {
            key: tern_core::types::string_type(),
            value: int_type(),
        }))),
        v: Value::Map(mv.clone()),
    };

    m.call_builtin("delete", vec![map, typed_string("b")]).unwrap();

    assert_eq!(realm.len(), 2);
    let keys: Vec<String> = mv.borrow().keys().map(|k| k.sprint()).collect();
    assert_eq!(keys, vec!["a", "c"]);
}

// Scenario 5: recover across defer. f() defers a recover, then panics with
// "boom"; the deferred recover observes the value and the step completes
// without an unrecovered panic.
#[test]
fn test_recover_across_defer() {
    let mut m = Machine::new();

    // f() starts executing
    m.push_frame_call("f");
    // panic("boom") inside f
    m.push_panic(typed_string("boom"));

    // unwinding runs f's deferred function
    m.push_frame_defer("f.defer");
    let r = m.call_builtin("recover", vec![]).unwrap().remove(0);
    assert_eq!(r.sprint(), "boom");
    assert!(m.exceptions.is_empty());
    m.pop_frame(); // deferred function returns
    m.pop_frame(); // f returns normally

    assert!(m.take_unrecovered().is_none());
}

// recover outside any deferred invocation returns nil even mid-panic.
#[test]
fn test_recover_outside_defer_returns_nil() {
    let mut m = Machine::new();
    m.push_frame_call("f");
    m.push_panic(typed_string("boom"));

    let r = m.call_builtin("recover", vec![]).unwrap().remove(0);
    assert!(r.is_undefined());
    assert_eq!(m.exceptions.len(), 1, "exception must survive");

    m.pop_frame();
    assert!(matches!(
        m.take_unrecovered(),
        Some(RuntimeError::UnrecoveredPanic(_))
    ));
}

// recover in a deferred function of an unrelated frame returns nil while
// the panicking frame is still live.
#[test]
fn test_recover_in_unrelated_frame_returns_nil() {
    let mut m = Machine::new();
    m.push_frame_call("g");
    m.push_frame_call("f");
    // g panicked earlier in this step; f is still on the stack
    {
        // construct the exception against g's frame
        let g_frame = m.last_call_frame(2).unwrap();
        m.push_frame_defer("g.defer");
        // the panic belongs to g, not to the frame below the recover
        m.exceptions.push(tern_runtime::machine::Exception {
            value: typed_string("boom"),
            frame: g_frame,
        });
    }
    let r = m.call_builtin("recover", vec![]).unwrap().remove(0);
    assert!(r.is_undefined());
    assert_eq!(m.exceptions.len(), 1);
}

// Scenario: a bad make() is recoverable by a deferred recover.
#[test]
fn test_make_cap_out_of_range_recovers() {
    let mut m = Machine::new();
    m.push_frame_call("f");

    let args = varargs(&mut m, vec![typed_int(3), typed_int(1)]);
    let err = m
        .call_builtin(
            "make",
            vec![tern_core::typed_value::typed_type(int_slice_type()), args],
        )
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Exception(_)));
    assert_eq!(m.exceptions.len(), 1);

    // f's deferred recover picks it up
    m.push_frame_defer("f.defer");
    let r = m.call_builtin("recover", vec![]).unwrap().remove(0);
    assert_eq!(r.sprint(), "makeslice: cap out of range");
    assert!(m.exceptions.is_empty());
    m.pop_frame();
    m.pop_frame();
    assert!(m.take_unrecovered().is_none());
}

// Unrecovered variant of the same failure.
#[test]
fn test_make_cap_out_of_range_unrecovered() {
    let mut m = Machine::new();
    m.push_frame_call("f");
    let args = varargs(&mut m, vec![typed_int(3), typed_int(1)]);
    let _ = m
        .call_builtin(
            "make",
            vec![tern_core::typed_value::typed_type(int_slice_type()), args],
        )
        .unwrap_err();
    m.pop_frame();
    match m.take_unrecovered() {
        Some(RuntimeError::UnrecoveredPanic(v)) => {
            assert_eq!(v.sprint(), "makeslice: cap out of range")
        }
        other => panic!("expected unrecovered panic, got {:?}", other),
    }
}

// Scenario 6 lives with the declaration graph tests in decl_graph.rs; the
// remaining end-to-end check here is that a metered machine surfaces quota
// exhaustion from inside a built-in.
#[test]
fn test_quota_exhaustion_fails_step() {
    let mut m = Machine::builder().with_alloc_limit(256).build();
    let args = varargs(&mut m, vec![typed_int(1000)]);
    let err = m
        .call_builtin(
            "make",
            vec![tern_core::typed_value::typed_type(int_slice_type()), args],
        )
        .unwrap_err();
    assert!(matches!(err, RuntimeError::QuotaExceeded { .. }), "{:?}", err);
}

#[test]
fn test_universe_survives_across_machines() {
    let u1 = universe();
    let _m = Machine::new();
    let u2 = universe();
    assert!(Rc::ptr_eq(&u1, &u2));
    assert_eq!(u1.block.get("byte").unwrap().get_type().unwrap().kind(), Kind::Uint8);
}

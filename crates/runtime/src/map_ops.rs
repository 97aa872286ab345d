//! `delete`
//!
//! Deleting a present key removes it in place (iteration order of the
//! survivors is untouched) and reports two realm events: the key object
//! removed from the container, then the value object removed. An absent
//! key is a no-op. Foreign maps delegate to the host, where setting an
//! undefined value deletes.

use crate::machine::Machine;
use tern_core::errors::RuntimeError;
use tern_core::foreign::ForeignObject as _;
use tern_core::realm::ObjectRef;
use tern_core::typed_value::TypedValue;
use tern_core::types::{Type, base_of};
use tern_core::value::Value;

pub fn builtin_delete(m: &mut Machine) -> Result<(), RuntimeError> {
    let (arg0, arg1) = m.params2();
    // a pointer-valued key refers to its slot; delete by the target value
    let key = match &arg1.v {
        Value::Pointer(p) => p.deref()?,
        _ => arg1,
    };

    let Some(t) = arg0.t.clone() else {
        return Err(RuntimeError::static_type("delete of untyped operand"));
    };
    match &*base_of(&t) {
        Type::Map(_) => {
            let Value::Map(mv) = &arg0.v else {
                // deleting from a nil map is a no-op
                return Ok(());
            };
            let removed = mv.borrow_mut().delete(&key)?;
            if let Some((kv, vv)) = removed {
                let container = ObjectRef::Map(mv.clone());
                m.did_update(&container, kv.first_object().as_ref(), None);
                m.did_update(&container, vv.first_object().as_ref(), None);
            }
            Ok(())
        }
        Type::Foreign(_) => {
            let Value::Foreign(f) = &arg0.v else {
                return Ok(());
            };
            f.obj.set_key(key, TypedValue::default())
        }
        _ => Err(RuntimeError::static_type(format!(
            "unexpected map type {}",
            t
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use tern_core::foreign::ForeignObject as _;
    use tern_core::realm::RecordingRealm;
    use tern_core::typed_value::{typed_int, typed_string};
    use tern_core::types::{MapType, int_type, string_type};

    fn map_type() -> Rc<Type> {
        Rc::new(Type::Map(MapType {
            key: string_type(),
            value: int_type(),
        }))
    }

    fn sample_map(m: &mut Machine, keys: &[&str]) -> TypedValue {
        let mv = m.alloc.new_map(0).unwrap();
        for (i, k) in keys.iter().enumerate() {
            mv.borrow_mut()
                .set(typed_string(k), typed_int(i as i64))
                .unwrap();
        }
        TypedValue {
            t: Some(map_type()),
            v: Value::Map(mv),
        }
    }

    #[test]
    fn test_delete_present_key_emits_two_events() {
        let realm = RecordingRealm::new();
        let mut m = Machine::builder()
            .with_realm(Box::new(realm.clone()))
            .build();
        let map = sample_map(&mut m, &["a", "b", "c"]);
        m.call_builtin("delete", vec![map.clone(), typed_string("b")])
            .unwrap();

        assert_eq!(map.get_length().unwrap(), 2);
        let events = realm.events();
        assert_eq!(events.len(), 2);

        let Value::Map(mv) = &map.v else { unreachable!() };
        let id = mv.borrow().id;
        assert!(events.iter().all(|e| e.container == id && e.new_child.is_none()));

        let keys: Vec<String> = mv.borrow().keys().map(|k| k.sprint()).collect();
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[test]
    fn test_delete_absent_key_is_noop() {
        let realm = RecordingRealm::new();
        let mut m = Machine::builder()
            .with_realm(Box::new(realm.clone()))
            .build();
        let map = sample_map(&mut m, &["a"]);
        m.call_builtin("delete", vec![map.clone(), typed_string("zzz")])
            .unwrap();
        assert_eq!(map.get_length().unwrap(), 1);
        assert!(realm.is_empty());
    }

    #[test]
    fn test_delete_from_nil_map_is_noop() {
        let mut m = Machine::new();
        let nil_map = TypedValue {
            t: Some(map_type()),
            v: Value::Null,
        };
        m.call_builtin("delete", vec![nil_map, typed_string("a")])
            .unwrap();
    }

    #[test]
    fn test_delete_on_non_map_is_static_error() {
        let mut m = Machine::new();
        let err = m
            .call_builtin("delete", vec![typed_int(1), typed_string("a")])
            .unwrap_err();
        assert!(matches!(err, RuntimeError::StaticType(_)));
    }

    #[test]
    fn test_delete_foreign_map_delegates() {
        let mut m = Machine::new();
        let bridge = tern_core::foreign::MapBridge::new();
        bridge
            .set_key(typed_string("k"), typed_int(1))
            .unwrap();
        let fv = m.alloc.new_foreign(bridge).unwrap();
        let ft = Rc::new(Type::Foreign(tern_core::foreign::ForeignType {
            ops: Rc::new(tern_core::foreign::MapBridgeType),
        }));
        let map = TypedValue {
            t: Some(ft),
            v: Value::Foreign(fv.clone()),
        };
        m.call_builtin("delete", vec![map, typed_string("k")]).unwrap();
        assert_eq!(fv.obj.len(), 0);
    }
}

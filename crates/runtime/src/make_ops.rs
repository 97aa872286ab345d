//! `make` and `new`
//!
//! `make` takes a first-class type and a variadic argument slice. Slice
//! makes choose the Data|List backing by element kind and default-fill the
//! entire capacity for concrete element types; map makes accept a capacity
//! hint; channel makes are declared but unimplemented; foreign map types
//! delegate construction to the host.
//!
//! A capacity below the requested length is a user error raised as a
//! *recoverable* exception, not a fatal abort.

use crate::machine::Machine;
use tern_core::errors::RuntimeError;
use tern_core::foreign::ForeignTypeOps as _;
use tern_core::typed_value::{TypedValue, default_typed_value};
use tern_core::types::{Kind, Type, base_of};
use tern_core::value::{ArrayData, PointerBase, PointerValue, Value};

pub fn builtin_make(m: &mut Machine) -> Result<(), RuntimeError> {
    let (arg0, arg1) = m.params2();
    let tt = arg0.get_type()?;
    let vargs = arg1;
    let vargsl = vargs.get_length()?;

    match &*base_of(&tt) {
        Type::Slice(st) => {
            let et = st.elt.clone();
            let (length, capacity) = match vargsl {
                1 => {
                    let lv = vargs.get_pointer_at_index(&*m.store, 0)?.deref()?;
                    let li = lv.convert_get_int()?;
                    (li, li)
                }
                2 => {
                    let lv = vargs.get_pointer_at_index(&*m.store, 0)?.deref()?;
                    let li = lv.convert_get_int()?;
                    let cv = vargs.get_pointer_at_index(&*m.store, 1)?.deref()?;
                    let ci = cv.convert_get_int()?;
                    if ci < li {
                        return Err(RuntimeError::exception_str("makeslice: cap out of range"));
                    }
                    (li, ci)
                }
                _ => {
                    return Err(RuntimeError::static_type(
                        "make() of slice type takes 2 or 3 arguments",
                    ));
                }
            };
            if length < 0 {
                return Err(RuntimeError::exception_str("makeslice: len out of range"));
            }
            let (length, capacity) = (length as usize, capacity as usize);

            let sv = if et.kind() == Kind::Uint8 {
                let base = m.alloc.new_data_array(capacity)?;
                m.alloc.new_slice(base, 0, length, capacity)?
            } else {
                let base = m.alloc.new_list_array(capacity)?;
                if et.kind() != Kind::Interface {
                    // Initialize the full capacity with typed zero values,
                    // so later window-widening slice operations always see
                    // defined elements.
                    let mut defaults = Vec::with_capacity(capacity);
                    for _ in 0..capacity {
                        defaults.push(default_typed_value(&mut m.alloc, &et)?);
                    }
                    let mut arr = base.borrow_mut();
                    let ArrayData::List(list) = &mut arr.data else {
                        unreachable!()
                    };
                    for (slot, dv) in list.iter_mut().zip(defaults) {
                        *slot = dv;
                    }
                }
                m.alloc.new_slice(base, 0, length, capacity)?
            };
            m.push_value(TypedValue {
                t: Some(tt),
                v: Value::Slice(sv),
            });
            Ok(())
        }
        Type::Map(_) => {
            let hint = match vargsl {
                0 => 0,
                1 => {
                    let hv = vargs.get_pointer_at_index(&*m.store, 0)?.deref()?;
                    hv.convert_get_int()?.max(0) as usize
                }
                _ => {
                    return Err(RuntimeError::static_type(
                        "make() of map type takes 1 or 2 arguments",
                    ));
                }
            };
            let mv = m.alloc.new_map(hint)?;
            m.push_value(TypedValue {
                t: Some(tt),
                v: Value::Map(mv),
            });
            Ok(())
        }
        Type::Chan(_) => match vargsl {
            0 | 1 => Err(RuntimeError::unimplemented("make() of channel type")),
            _ => Err(RuntimeError::static_type(
                "make() of chan type takes 1 or 2 arguments",
            )),
        },
        Type::Foreign(ft) if ft.ops.kind() == Kind::Map => {
            let hint = match vargsl {
                0 => 0,
                1 => {
                    let hv = vargs.get_pointer_at_index(&*m.store, 0)?.deref()?;
                    hv.convert_get_int()?.max(0) as usize
                }
                _ => {
                    return Err(RuntimeError::static_type(
                        "make() of map type takes 1 or 2 arguments",
                    ));
                }
            };
            let obj = ft.ops.make_map(hint)?;
            let fv = m.alloc.new_foreign(obj)?;
            m.push_value(TypedValue {
                t: Some(tt),
                v: Value::Foreign(fv),
            });
            Ok(())
        }
        Type::Foreign(_) => Err(RuntimeError::unimplemented("make() of foreign type")),
        other => Err(RuntimeError::static_type(format!(
            "cannot make type {} kind {:?}",
            tt,
            other.kind()
        ))),
    }
}

/// `new(T)`: a heap item holding the zero value of T, returned through a
/// pointer whose base is that heap item. Always charges one pointer
/// allocation.
pub fn builtin_new(m: &mut Machine) -> Result<(), RuntimeError> {
    let arg0 = m.params1();
    let tt = arg0.get_type()?;
    let zero = default_typed_value(&mut m.alloc, &tt)?;
    m.alloc.allocate_pointer()?;
    let hi = m.alloc.new_heap_item(zero)?;
    let ptr_t = m.alloc.new_type(Type::Pointer(tern_core::types::PointerType {
        elt: tt,
    }))?;
    m.push_value(TypedValue {
        t: Some(ptr_t),
        v: Value::Pointer(PointerValue {
            base: PointerBase::HeapItem(hi),
            index: 0,
        }),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use tern_core::typed_value::{typed_int, typed_type};
    use tern_core::types::{
        ChanType, MapType, SliceType, byte_slice_type, int_type, string_type, uint8_type,
    };
    use tern_core::value::SliceValue;

    fn int_slice_t() -> Rc<Type> {
        Rc::new(Type::Slice(SliceType {
            elt: int_type(),
            vrd: false,
        }))
    }

    fn vargs(m: &mut Machine, items: Vec<TypedValue>) -> TypedValue {
        // variadic args arrive collected into a slice
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

    fn slice_of_result(tv: &TypedValue) -> &SliceValue {
        match &tv.v {
            Value::Slice(s) => s,
            other => panic!("expected slice, got {:?}", other),
        }
    }

    #[test]
    fn test_make_byte_slice_uses_data_backing() {
        let mut m = Machine::new();
        let args = vargs(&mut m, vec![typed_int(3)]);
        let out = m
            .call_builtin("make", vec![typed_type(byte_slice_type(false)), args])
            .unwrap();
        let s = slice_of_result(&out[0]);
        assert_eq!(s.length, 3);
        assert_eq!(s.maxcap, 3);
        match &s.base {
            tern_core::value::BaseRef::Array(a) => assert!(a.borrow().is_data()),
            other => panic!("unexpected base {:?}", other),
        }
        assert_eq!(out[0].sprint(), "[0 0 0]");
    }

    #[test]
    fn test_make_int_slice_zero_initialised() {
        let mut m = Machine::new();
        let args = vargs(&mut m, vec![typed_int(2), typed_int(4)]);
        let out = m
            .call_builtin("make", vec![typed_type(int_slice_t()), args])
            .unwrap();
        assert_eq!(out[0].get_length().unwrap(), 2);
        assert_eq!(out[0].get_capacity().unwrap(), 4);
        assert_eq!(out[0].sprint(), "[0 0]");
    }

    #[test]
    fn test_make_cap_below_len_is_recoverable() {
        let mut m = Machine::new();
        let args = vargs(&mut m, vec![typed_int(3), typed_int(1)]);
        let err = m
            .call_builtin("make", vec![typed_type(int_slice_t()), args])
            .unwrap_err();
        match err {
            RuntimeError::Exception(v) => {
                assert_eq!(v.sprint(), "makeslice: cap out of range")
            }
            other => panic!("expected exception, got {:?}", other),
        }
        // the failed call left the exception pending on the machine
        assert_eq!(m.exceptions.len(), 1);
    }

    #[test]
    fn test_make_negative_len_is_recoverable() {
        let mut m = Machine::new();
        let args = vargs(&mut m, vec![typed_int(-1)]);
        let err = m
            .call_builtin("make", vec![typed_type(int_slice_t()), args])
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Exception(_)));
    }

    #[test]
    fn test_make_map_with_hint() {
        let mut m = Machine::new();
        let map_t = Rc::new(Type::Map(MapType {
            key: string_type(),
            value: int_type(),
        }));
        let none = vargs(&mut m, vec![]);
        let out = m
            .call_builtin("make", vec![typed_type(map_t.clone()), none])
            .unwrap();
        assert_eq!(out[0].get_length().unwrap(), 0);

        let hint = vargs(&mut m, vec![typed_int(8)]);
        let out = m.call_builtin("make", vec![typed_type(map_t), hint]).unwrap();
        assert!(matches!(out[0].v, Value::Map(_)));
    }

    #[test]
    fn test_make_channel_unimplemented() {
        let mut m = Machine::new();
        let chan_t = Rc::new(Type::Chan(ChanType { elt: int_type() }));
        let args = vargs(&mut m, vec![]);
        let err = m
            .call_builtin("make", vec![typed_type(chan_t), args])
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Unimplemented(_)));
    }

    #[test]
    fn test_make_foreign_map_delegates_to_host() {
        let mut m = Machine::new();
        let ft = Rc::new(Type::Foreign(tern_core::foreign::ForeignType {
            ops: Rc::new(tern_core::foreign::MapBridgeType),
        }));
        let args = vargs(&mut m, vec![]);
        let out = m.call_builtin("make", vec![typed_type(ft), args]).unwrap();
        assert!(matches!(out[0].v, Value::Foreign(_)));
    }

    #[test]
    fn test_new_returns_pointer_to_heap_item() {
        let mut m = Machine::new();
        let out = m.call_builtin("new", vec![typed_type(int_type())]).unwrap();
        let ptr = match &out[0].v {
            Value::Pointer(p) => p.clone(),
            other => panic!("expected pointer, got {:?}", other),
        };
        assert!(matches!(ptr.base, PointerBase::HeapItem(_)));
        assert_eq!(ptr.deref().unwrap().convert_get_int().unwrap(), 0);
        assert_eq!(out[0].t.as_ref().unwrap().kind(), Kind::Pointer);

        // writes through the pointer are visible on re-deref
        ptr.assign(None, typed_int(42)).unwrap();
        assert_eq!(ptr.deref().unwrap().convert_get_int().unwrap(), 42);
    }

    #[test]
    fn test_new_charges_pointer_allocation() {
        let mut m = Machine::builder().with_alloc_limit(32).build();
        let err = m
            .call_builtin("new", vec![typed_type(uint8_type())])
            .unwrap_err();
        assert!(matches!(err, RuntimeError::QuotaExceeded { .. }));
    }

    #[test]
    fn test_make_wrong_arity_is_static_error() {
        let mut m = Machine::new();
        let args = vargs(&mut m, vec![typed_int(1), typed_int(2), typed_int(3)]);
        let err = m
            .call_builtin("make", vec![typed_type(int_slice_t()), args])
            .unwrap_err();
        assert!(matches!(err, RuntimeError::StaticType(_)));
    }
}

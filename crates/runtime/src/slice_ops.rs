//! `append` and `copy`
//!
//! The large case analysis of the dispatcher lives here. Both built-ins
//! range over the slice/array Data|List duality, so every path handles the
//! four source/destination representation combinations.
//!
//! # Copy disciplines
//!
//! Source windows are snapshotted before any destination write. This makes
//! overlapping `copy` calls and self-appends well-defined, and it is where
//! reference-copy-by-value happens: list elements are `unref_copy`-ed as
//! they are collected, so a grown destination never aliases its source.
//!
//! # Realm events
//!
//! In-place list writes report one event per overwritten slot.
//! Cross-representation bulk writes report one coarse
//! `(container, None, None)` event. Byte-to-byte writes report nothing:
//! bytes reference no child objects.

use crate::machine::Machine;
use std::mem;
use tern_core::errors::RuntimeError;
use tern_core::foreign::{ForeignObject as _, ForeignValue};
use tern_core::realm::ObjectRef;
use tern_core::store::Store;
use tern_core::typed_value::{TypedValue, typed_int, typed_uint8};
use tern_core::types::{Kind, TypeHandle, base_of, byte_slice_type, uint8_type};
use tern_core::value::{ArrayData, SliceValue, Value};

/// `append(dst, src)`. The result type equals the destination's static
/// type; the destination is never mutated beyond its own window.
pub fn builtin_append(m: &mut Machine) -> Result<(), RuntimeError> {
    let (arg0, arg1) = m.params2();
    // A string source is first converted into a byte slice. The parameter
    // copy is local, so the caller's operand is untouched.
    let arg1 = convert_string_src(m, &arg0, arg1)?;
    check_elem_kinds(&arg0, &arg1)?;

    let t = arg0.t.clone();
    match arg0.v {
        Value::Null => append_to_nil(m, t, arg1),
        Value::Slice(ref d) => append_to_slice(m, t, d.clone(), arg1),
        Value::Foreign(ref d) => append_to_foreign(m, t, d.clone(), arg1),
        ref other => Err(RuntimeError::static_type(format!(
            "append destination must be nil, a slice, or a foreign sequence, got {:?}",
            other
        ))),
    }
}

/// `copy(dst, src)`. Copies `min(len(dst), len(src))` elements and returns
/// the count. The source may be a string when the destination holds bytes.
pub fn builtin_copy(m: &mut Machine) -> Result<(), RuntimeError> {
    let (arg0, arg1) = m.params2();
    let dst_t = arg0
        .t
        .clone()
        .ok_or_else(|| RuntimeError::static_type("copy destination is untyped"))?;
    if base_of(&dst_t).kind() != Kind::Slice {
        return Err(RuntimeError::static_type(format!(
            "copy destination must be a slice, got {}",
            dst_t
        )));
    }

    match &arg1.v {
        Value::String(s) => {
            if elem_kind(&arg0) != Some(Kind::Uint8) {
                return Err(RuntimeError::static_type(format!(
                    "cannot copy string into {}",
                    dst_t
                )));
            }
            let minl = arg0.get_length()?.min(s.len());
            if minl == 0 {
                m.push_value(typed_int(0));
                return Ok(());
            }
            let bytes = s.as_bytes()[..minl].to_vec();
            for (i, b) in bytes.into_iter().enumerate() {
                let p = arg0.get_pointer_at_index(&*m.store, i)?;
                let realm: Option<&mut dyn tern_core::realm::Realm> = match &mut m.realm {
                    Some(r) => Some(&mut **r),
                    None => None,
                };
                p.assign(realm, typed_uint8(b))?;
            }
            m.push_value(typed_int(minl as i64));
            Ok(())
        }
        Value::Null | Value::Slice(_) => {
            let minl = arg0.get_length()?.min(arg1.get_length()?);
            if minl == 0 {
                m.push_value(typed_int(0));
                return Ok(());
            }
            // Snapshot the source prefix first; overlapping windows over a
            // shared base must not observe partial writes.
            let mut elems = Vec::with_capacity(minl);
            for i in 0..minl {
                elems.push(arg1.get_pointer_at_index(&*m.store, i)?.deref()?);
            }
            for (i, e) in elems.into_iter().enumerate() {
                let p = arg0.get_pointer_at_index(&*m.store, i)?;
                let realm: Option<&mut dyn tern_core::realm::Realm> = match &mut m.realm {
                    Some(r) => Some(&mut **r),
                    None => None,
                };
                p.assign(realm, e)?;
            }
            m.push_value(typed_int(minl as i64));
            Ok(())
        }
        Value::Foreign(_) => Err(RuntimeError::unimplemented("copy from foreign slice")),
        other => Err(RuntimeError::static_type(format!(
            "copy source must be a slice or string, got {:?}",
            other
        ))),
    }
}

// ---- append cases ----

fn append_to_nil(
    m: &mut Machine,
    t: Option<TypeHandle>,
    src: TypedValue,
) -> Result<(), RuntimeError> {
    let dst_is_byte = type_elem_kind(&t) == Some(Kind::Uint8);
    match src.v {
        Value::Null => {
            m.push_value(TypedValue { t, v: Value::Null });
            Ok(())
        }
        Value::Slice(s) => {
            if s.length == 0 {
                m.push_value(TypedValue { t, v: Value::Null });
                return Ok(());
            }
            let v = if dst_is_byte {
                let bytes = window_bytes(&*m.store, &s)?;
                Value::Slice(new_data_slice(m, bytes)?)
            } else {
                let src_elem = src_elem_type(&src.t);
                let vals = window_values(m, &s, &src_elem)?;
                Value::Slice(new_list_slice(m, vals)?)
            };
            m.push_value(TypedValue { t, v });
            Ok(())
        }
        Value::Foreign(f) => {
            if f.obj.len() == 0 {
                m.push_value(TypedValue { t, v: Value::Null });
                return Ok(());
            }
            let v = if dst_is_byte {
                Value::Slice(new_data_slice(m, foreign_bytes(&f)?)?)
            } else {
                Value::Slice(new_list_slice(m, foreign_values(&f)?)?)
            };
            m.push_value(TypedValue { t, v });
            Ok(())
        }
        other => Err(cannot_append(&other, &t)),
    }
}

fn append_to_slice(
    m: &mut Machine,
    t: Option<TypeHandle>,
    d: SliceValue,
    src: TypedValue,
) -> Result<(), RuntimeError> {
    let dst_is_byte = type_elem_kind(&t) == Some(Kind::Uint8);
    match src.v {
        Value::Null => {
            m.push_value(TypedValue {
                t,
                v: Value::Slice(d),
            });
            Ok(())
        }
        Value::Slice(s) => {
            if d.length + s.length <= d.maxcap {
                // within capacity: mutate the shared base in place
                if s.length == 0 {
                    m.push_value(TypedValue {
                        t,
                        v: Value::Slice(d),
                    });
                    return Ok(());
                }
                let src_elem = src_elem_type(&src.t);
                let src_is_data = s.base(&*m.store)?.borrow().is_data();
                grow_in_place(m, &d, s.length, |m, want_bytes| {
                    if want_bytes {
                        Ok(Window::Bytes(window_bytes(&*m.store, &s)?))
                    } else {
                        Ok(Window::Values(window_values(m, &s, &src_elem)?))
                    }
                }, src_is_data, t)
            } else if dst_is_byte {
                // growth past capacity: fresh Data base, exact sizing
                let mut bytes = window_bytes(&*m.store, &d)?;
                bytes.extend(window_bytes(&*m.store, &s)?);
                let sv = new_data_slice(m, bytes)?;
                m.push_value(TypedValue {
                    t,
                    v: Value::Slice(sv),
                });
                Ok(())
            } else {
                // growth past capacity: fresh List base
                let dst_elem = type_elem(&t);
                let src_elem = src_elem_type(&src.t);
                let mut vals = window_values(m, &d, &dst_elem)?;
                vals.extend(window_values(m, &s, &src_elem)?);
                let sv = new_list_slice(m, vals)?;
                m.push_value(TypedValue {
                    t,
                    v: Value::Slice(sv),
                });
                Ok(())
            }
        }
        Value::Foreign(f) => {
            let n = f.obj.len();
            if d.length + n <= d.maxcap {
                if n == 0 {
                    m.push_value(TypedValue {
                        t,
                        v: Value::Slice(d),
                    });
                    return Ok(());
                }
                grow_in_place(m, &d, n, |_m, want_bytes| {
                    if want_bytes {
                        Ok(Window::Bytes(foreign_bytes(&f)?))
                    } else {
                        Ok(Window::Values(foreign_values(&f)?))
                    }
                }, false, t)
            } else if dst_is_byte {
                let mut bytes = window_bytes(&*m.store, &d)?;
                bytes.extend(foreign_bytes(&f)?);
                let sv = new_data_slice(m, bytes)?;
                m.push_value(TypedValue {
                    t,
                    v: Value::Slice(sv),
                });
                Ok(())
            } else {
                let dst_elem = type_elem(&t);
                let mut vals = window_values(m, &d, &dst_elem)?;
                vals.extend(foreign_values(&f)?);
                let sv = new_list_slice(m, vals)?;
                m.push_value(TypedValue {
                    t,
                    v: Value::Slice(sv),
                });
                Ok(())
            }
        }
        other => Err(cannot_append(&other, &t)),
    }
}

fn append_to_foreign(
    m: &mut Machine,
    t: Option<TypeHandle>,
    d: ForeignValue,
    src: TypedValue,
) -> Result<(), RuntimeError> {
    let vals = match src.v {
        Value::Null => {
            m.push_value(TypedValue {
                t,
                v: Value::Foreign(d),
            });
            return Ok(());
        }
        Value::Slice(ref s) => {
            let src_elem = src_elem_type(&src.t);
            window_values(m, s, &src_elem)?
        }
        Value::Foreign(ref f) => foreign_values(f)?,
        ref other => return Err(cannot_append(other, &t)),
    };
    let grown = d.obj.append(vals)?;
    let fv = m.alloc.new_foreign(grown)?;
    m.push_value(TypedValue {
        t,
        v: Value::Foreign(fv),
    });
    Ok(())
}

// ---- shared helpers ----

enum Window {
    Bytes(Vec<u8>),
    Values(Vec<TypedValue>),
}

/// Write `added` source elements past the destination window inside its
/// existing base, emit realm events per the granularity rules, and push
/// the widened slice.
fn grow_in_place<F>(
    m: &mut Machine,
    d: &SliceValue,
    added: usize,
    collect: F,
    src_is_data: bool,
    t: Option<TypeHandle>,
) -> Result<(), RuntimeError>
where
    F: FnOnce(&mut Machine, bool) -> Result<Window, RuntimeError>,
{
    let d_base = d.base(&*m.store)?;
    let dst_is_data = d_base.borrow().is_data();
    let window = collect(m, dst_is_data)?;
    let start = d.offset + d.length;

    match window {
        Window::Bytes(bytes) => {
            {
                let mut arr = d_base.borrow_mut();
                let ArrayData::Data(buf) = &mut arr.data else {
                    return Err(RuntimeError::static_type(
                        "byte write into a list-backed base",
                    ));
                };
                buf[start..start + added].copy_from_slice(&bytes);
            }
            if !src_is_data {
                // list (or foreign) elements narrowed into a Data base
                m.did_update(&ObjectRef::Array(d_base.clone()), None, None);
            }
        }
        Window::Values(vals) => {
            if src_is_data {
                {
                    let mut arr = d_base.borrow_mut();
                    let ArrayData::List(list) = &mut arr.data else {
                        return Err(RuntimeError::static_type(
                            "list write into a data-backed base",
                        ));
                    };
                    for (i, val) in vals.into_iter().enumerate() {
                        list[start + i] = val;
                    }
                }
                m.did_update(&ObjectRef::Array(d_base.clone()), None, None);
            } else {
                let mut events = Vec::with_capacity(added);
                {
                    let mut arr = d_base.borrow_mut();
                    let ArrayData::List(list) = &mut arr.data else {
                        return Err(RuntimeError::static_type(
                            "list write into a data-backed base",
                        ));
                    };
                    for (i, val) in vals.into_iter().enumerate() {
                        let new_obj = val.first_object();
                        let old = mem::replace(&mut list[start + i], val);
                        events.push((old.first_object(), new_obj));
                    }
                }
                for (old, new) in events {
                    m.did_update(&ObjectRef::Array(d_base.clone()), old.as_ref(), new.as_ref());
                }
            }
        }
    }

    let sv = m
        .alloc
        .new_slice(d_base, d.offset, d.length + added, d.maxcap)?;
    m.push_value(TypedValue {
        t,
        v: Value::Slice(sv),
    });
    Ok(())
}

/// Convert a string source operand into a byte slice. Legal only toward
/// byte-element (or interface-element) destinations.
fn convert_string_src(
    m: &mut Machine,
    arg0: &TypedValue,
    arg1: TypedValue,
) -> Result<TypedValue, RuntimeError> {
    let is_string = arg1
        .t
        .as_ref()
        .map(|t| t.kind() == Kind::String)
        .unwrap_or(false);
    if !is_string {
        return Ok(arg1);
    }
    if let Some(ek) = elem_kind(arg0) {
        if ek != Kind::Uint8 && ek != Kind::Interface {
            return Err(RuntimeError::static_type(format!(
                "cannot append {} to {}",
                type_name(&arg1.t),
                type_name(&arg0.t)
            )));
        }
    }
    let s = arg1.get_string()?;
    let n = s.len();
    let base = m.alloc.new_array_from_data(s.as_bytes().to_vec())?;
    let sv = m.alloc.new_slice(base, 0, n, n)?;
    Ok(TypedValue {
        t: Some(byte_slice_type(true)),
        v: Value::Slice(sv),
    })
}

/// Mismatched concrete element kinds should have been rejected by static
/// typing; check defensively anyway.
fn check_elem_kinds(arg0: &TypedValue, arg1: &TypedValue) -> Result<(), RuntimeError> {
    if let (Some(a), Some(b)) = (elem_kind(arg0), elem_kind(arg1)) {
        if a != Kind::Interface && b != Kind::Interface && a != b {
            return Err(RuntimeError::static_type(format!(
                "cannot append {} to {}",
                type_name(&arg1.t),
                type_name(&arg0.t)
            )));
        }
    }
    Ok(())
}

fn cannot_append(src: &Value, dst_t: &Option<TypeHandle>) -> RuntimeError {
    RuntimeError::static_type(format!(
        "cannot append {:?} to {}",
        src,
        type_name(dst_t)
    ))
}

fn type_name(t: &Option<TypeHandle>) -> String {
    t.as_ref()
        .map(|t| t.to_string())
        .unwrap_or_else(|| "<untyped>".to_string())
}

fn elem_kind(tv: &TypedValue) -> Option<Kind> {
    type_elem_kind(&tv.t)
}

fn type_elem_kind(t: &Option<TypeHandle>) -> Option<Kind> {
    t.as_ref().and_then(|t| t.elem()).map(|e| e.kind())
}

fn type_elem(t: &Option<TypeHandle>) -> TypeHandle {
    t.as_ref().and_then(|t| t.elem()).unwrap_or_else(uint8_type)
}

fn src_elem_type(t: &Option<TypeHandle>) -> TypeHandle {
    type_elem(t)
}

/// Read a window as raw bytes, narrowing typed byte values out of a List
/// backing. Non-byte elements are a static type violation.
fn window_bytes(store: &dyn Store, s: &SliceValue) -> Result<Vec<u8>, RuntimeError> {
    let base = s.base(store)?;
    let arr = base.borrow();
    match &arr.data {
        ArrayData::Data(bytes) => Ok(bytes[s.offset..s.offset + s.length].to_vec()),
        ArrayData::List(list) => {
            let mut out = Vec::with_capacity(s.length);
            for tv in &list[s.offset..s.offset + s.length] {
                out.push(tv.get_uint8()?);
            }
            Ok(out)
        }
    }
}

/// Read a window as typed values: Data elements materialise as typed bytes
/// of the source element type, List elements are unref-copied.
fn window_values(
    m: &mut Machine,
    s: &SliceValue,
    elem_t: &TypeHandle,
) -> Result<Vec<TypedValue>, RuntimeError> {
    let base = s.base(&*m.store)?;
    let raw: Vec<TypedValue> = match &base.borrow().data {
        ArrayData::Data(bytes) => bytes[s.offset..s.offset + s.length]
            .iter()
            .map(|b| TypedValue {
                t: Some(elem_t.clone()),
                v: Value::Uint8(*b),
            })
            .collect(),
        ArrayData::List(list) => list[s.offset..s.offset + s.length].to_vec(),
    };
    let mut out = Vec::with_capacity(raw.len());
    for tv in &raw {
        out.push(tv.unref_copy(&mut m.alloc, &*m.store)?);
    }
    Ok(out)
}

fn foreign_values(f: &ForeignValue) -> Result<Vec<TypedValue>, RuntimeError> {
    (0..f.obj.len()).map(|i| f.obj.get(i)).collect()
}

fn foreign_bytes(f: &ForeignValue) -> Result<Vec<u8>, RuntimeError> {
    (0..f.obj.len())
        .map(|i| f.obj.get(i).and_then(|tv| tv.get_uint8()))
        .collect()
}

fn new_data_slice(m: &mut Machine, bytes: Vec<u8>) -> Result<SliceValue, RuntimeError> {
    let n = bytes.len();
    let base = m.alloc.new_array_from_data(bytes)?;
    m.alloc.new_slice(base, 0, n, n)
}

fn new_list_slice(m: &mut Machine, vals: Vec<TypedValue>) -> Result<SliceValue, RuntimeError> {
    let n = vals.len();
    let base = m.alloc.new_list_array(n)?;
    {
        let mut arr = base.borrow_mut();
        let ArrayData::List(list) = &mut arr.data else {
            unreachable!()
        };
        for (i, val) in vals.into_iter().enumerate() {
            list[i] = val;
        }
    }
    m.alloc.new_slice(base, 0, n, n)
}

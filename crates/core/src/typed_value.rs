//! Typed values and their accessors
//!
//! A `TypedValue` pairs an optional static type handle with a payload. The
//! fully undefined value (no type, `Null` payload) is distinct from a typed
//! nil (a slice, map, or pointer type with a `Null` payload).
//!
//! This module also implements the two copy disciplines the built-ins rely
//! on:
//!
//! - `unref_copy` dereferences any reference payload and clones its target
//!   transitively down to leaf scalar/string cells, so destination and
//!   source arrays cannot observe each other's later mutations. Foreign
//!   cells stay shared (the host owns them).
//! - `default_typed_value` produces the zero value of a type, allocating
//!   for strings, structs, and arrays.

use crate::alloc::Allocator;
use crate::errors::RuntimeError;
use crate::foreign::ForeignObject as _;
use crate::realm::ObjectRef;
use crate::store::Store;
use crate::types::{Kind, Type, TypeHandle, base_of, int_type, primitive, string_type, uint8_type};
use crate::value::{ArrayData, BaseRef, PointerBase, PointerValue, SliceValue, Value};
use num_bigint::BigInt;
use std::rc::Rc;

#[derive(Debug, Clone, Default)]
pub struct TypedValue {
    pub t: Option<TypeHandle>,
    pub v: Value,
}

// Convenience constructors for the scalar shapes built-ins produce.

pub fn typed_bool(b: bool) -> TypedValue {
    TypedValue {
        t: Some(primitive(Kind::Bool)),
        v: Value::Bool(b),
    }
}

pub fn typed_int(n: i64) -> TypedValue {
    TypedValue {
        t: Some(int_type()),
        v: Value::Int(n),
    }
}

pub fn typed_uint8(b: u8) -> TypedValue {
    TypedValue {
        t: Some(uint8_type()),
        v: Value::Uint8(b),
    }
}

pub fn typed_string(s: &str) -> TypedValue {
    TypedValue {
        t: Some(string_type()),
        v: Value::String(Rc::from(s)),
    }
}

pub fn typed_type(t: TypeHandle) -> TypedValue {
    TypedValue {
        t: Some(Rc::new(Type::Meta)),
        v: Value::Type(t),
    }
}

impl TypedValue {
    /// The fully undefined value: no type, no payload.
    pub fn is_undefined(&self) -> bool {
        self.t.is_none() && matches!(self.v, Value::Null)
    }

    pub fn kind(&self) -> Option<Kind> {
        self.t.as_ref().map(|t| t.kind())
    }

    pub fn get_bool(&self) -> Result<bool, RuntimeError> {
        match &self.v {
            Value::Bool(b) => Ok(*b),
            other => Err(RuntimeError::static_type(format!(
                "expected bool value, got {:?}",
                other
            ))),
        }
    }

    pub fn get_int(&self) -> Result<i64, RuntimeError> {
        match &self.v {
            Value::Int(n) => Ok(*n),
            other => Err(RuntimeError::static_type(format!(
                "expected int value, got {:?}",
                other
            ))),
        }
    }

    pub fn get_uint8(&self) -> Result<u8, RuntimeError> {
        match &self.v {
            Value::Uint8(b) => Ok(*b),
            other => Err(RuntimeError::static_type(format!(
                "expected uint8 value, got {:?}",
                other
            ))),
        }
    }

    pub fn get_string(&self) -> Result<Rc<str>, RuntimeError> {
        match &self.v {
            Value::String(s) => Ok(s.clone()),
            other => Err(RuntimeError::static_type(format!(
                "expected string value, got {:?}",
                other
            ))),
        }
    }

    pub fn get_type(&self) -> Result<TypeHandle, RuntimeError> {
        match &self.v {
            Value::Type(t) => Ok(t.clone()),
            other => Err(RuntimeError::static_type(format!(
                "expected type value, got {:?}",
                other
            ))),
        }
    }

    /// Convert any integer payload to an arithmetic index.
    pub fn convert_get_int(&self) -> Result<i64, RuntimeError> {
        let overflow =
            |n: &dyn std::fmt::Display| RuntimeError::static_type(format!("integer overflow: {}", n));
        match &self.v {
            Value::Int(n) | Value::Int64(n) => Ok(*n),
            Value::Int8(n) => Ok(*n as i64),
            Value::Int16(n) => Ok(*n as i64),
            Value::Int32(n) => Ok(*n as i64),
            Value::Uint(n) | Value::Uint64(n) => i64::try_from(*n).map_err(|_| overflow(n)),
            Value::Uint8(n) => Ok(*n as i64),
            Value::Uint16(n) => Ok(*n as i64),
            Value::Uint32(n) => Ok(*n as i64),
            Value::BigInt(b) => i64::try_from(&**b).map_err(|_| overflow(b)),
            other => Err(RuntimeError::static_type(format!(
                "cannot convert {:?} to int",
                other
            ))),
        }
    }

    /// Length of strings, arrays, slices, maps, and foreign sequences.
    /// The length of nil is zero.
    pub fn get_length(&self) -> Result<usize, RuntimeError> {
        match &self.v {
            Value::Null => Ok(0),
            Value::String(s) => Ok(s.len()),
            Value::Array(a) => Ok(a.borrow().len()),
            Value::Slice(s) => Ok(s.length),
            Value::Map(m) => Ok(m.borrow().len()),
            Value::Foreign(f) => Ok(f.obj.len()),
            other => Err(RuntimeError::static_type(format!(
                "cannot take length of {:?}",
                other
            ))),
        }
    }

    /// Capacity of a slice; the length of anything else measurable.
    pub fn get_capacity(&self) -> Result<usize, RuntimeError> {
        match &self.v {
            Value::Slice(s) => Ok(s.maxcap),
            _ => self.get_length(),
        }
    }

    /// A pointer to element `i` whose base identity is the container.
    pub fn get_pointer_at_index(
        &self,
        store: &dyn Store,
        i: usize,
    ) -> Result<PointerValue, RuntimeError> {
        match &self.v {
            Value::Slice(s) => {
                if i >= s.length {
                    return Err(RuntimeError::static_type(format!(
                        "slice index {} out of range (len {})",
                        i, s.length
                    )));
                }
                Ok(PointerValue {
                    base: PointerBase::Array(s.base(store)?),
                    index: s.offset + i,
                })
            }
            Value::Array(a) => {
                if i >= a.borrow().len() {
                    return Err(RuntimeError::static_type(format!(
                        "array index {} out of range (len {})",
                        i,
                        a.borrow().len()
                    )));
                }
                Ok(PointerValue {
                    base: PointerBase::Array(a.clone()),
                    index: i,
                })
            }
            other => Err(RuntimeError::static_type(format!(
                "cannot index into {:?}",
                other
            ))),
        }
    }

    /// The heap object this value references first, for realm reporting.
    /// Scalars, strings, and host-owned foreign values reference none.
    pub fn first_object(&self) -> Option<ObjectRef> {
        match &self.v {
            Value::Array(a) => Some(ObjectRef::Array(a.clone())),
            Value::Map(m) => Some(ObjectRef::Map(m.clone())),
            Value::Struct(s) => Some(ObjectRef::Struct(s.clone())),
            Value::HeapItem(h) => Some(ObjectRef::HeapItem(h.clone())),
            Value::Slice(s) => match &s.base {
                BaseRef::Array(a) => Some(ObjectRef::Array(a.clone())),
                BaseRef::Unresolved(_) => None,
            },
            Value::Pointer(p) => Some(p.base_object()),
            _ => None,
        }
    }

    /// Copy by value, dereferencing reference payloads and cloning their
    /// targets transitively. Allocation for the clones is charged.
    pub fn unref_copy(
        &self,
        alloc: &mut Allocator,
        store: &dyn Store,
    ) -> Result<TypedValue, RuntimeError> {
        let v = match &self.v {
            Value::Pointer(p) => return p.deref()?.unref_copy(alloc, store),
            Value::Slice(s) => {
                let base = s.base(store)?;
                let arr = base.borrow();
                let fresh = match &arr.data {
                    ArrayData::Data(bytes) => {
                        alloc.new_array_from_data(bytes[s.offset..s.offset + s.length].to_vec())?
                    }
                    ArrayData::List(list) => {
                        let fresh = alloc.new_list_array(s.length)?;
                        {
                            let mut fa = fresh.borrow_mut();
                            let ArrayData::List(dst) = &mut fa.data else {
                                unreachable!()
                            };
                            for (i, tv) in list[s.offset..s.offset + s.length].iter().enumerate() {
                                dst[i] = tv.unref_copy(alloc, store)?;
                            }
                        }
                        fresh
                    }
                };
                drop(arr);
                Value::Slice(alloc.new_slice(fresh, 0, s.length, s.length)?)
            }
            Value::Array(a) => {
                let arr = a.borrow();
                let fresh = match &arr.data {
                    ArrayData::Data(bytes) => alloc.new_array_from_data(bytes.clone())?,
                    ArrayData::List(list) => {
                        let fresh = alloc.new_list_array(list.len())?;
                        {
                            let mut fa = fresh.borrow_mut();
                            let ArrayData::List(dst) = &mut fa.data else {
                                unreachable!()
                            };
                            for (i, tv) in list.iter().enumerate() {
                                dst[i] = tv.unref_copy(alloc, store)?;
                            }
                        }
                        fresh
                    }
                };
                drop(arr);
                Value::Array(fresh)
            }
            Value::Map(m) => {
                let src = m.borrow();
                let fresh = alloc.new_map(src.len())?;
                {
                    let mut fm = fresh.borrow_mut();
                    for entry in src.iter() {
                        fm.set(
                            entry.key.unref_copy(alloc, store)?,
                            entry.value.unref_copy(alloc, store)?,
                        )?;
                    }
                }
                Value::Map(fresh)
            }
            Value::Struct(s) => {
                let src = s.borrow();
                let mut fields = Vec::with_capacity(src.fields.len());
                for f in &src.fields {
                    fields.push(f.unref_copy(alloc, store)?);
                }
                drop(src);
                Value::Struct(alloc.new_struct(fields)?)
            }
            Value::HeapItem(h) => {
                let inner = h.borrow().value.clone();
                return inner.unref_copy(alloc, store);
            }
            // Scalars, strings, and immutable handles copy as-is; foreign
            // cells are shared with the host.
            other => other.clone(),
        };
        Ok(TypedValue {
            t: self.t.clone(),
            v,
        })
    }

    /// Stringer used by `print`/`println` and by exception display.
    pub fn sprint(&self) -> String {
        match &self.v {
            Value::Null => {
                if self.t.is_none() {
                    "undefined".to_string()
                } else {
                    "nil".to_string()
                }
            }
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Int8(n) => n.to_string(),
            Value::Int16(n) => n.to_string(),
            Value::Int32(n) => n.to_string(),
            Value::Int64(n) => n.to_string(),
            Value::Uint(n) => n.to_string(),
            Value::Uint8(n) => n.to_string(),
            Value::Uint16(n) => n.to_string(),
            Value::Uint32(n) => n.to_string(),
            Value::Uint64(n) => n.to_string(),
            Value::Float32(x) => x.to_string(),
            Value::Float64(x) => x.to_string(),
            Value::BigInt(b) => b.to_string(),
            Value::String(s) => s.to_string(),
            Value::Array(a) => {
                let arr = a.borrow();
                match &arr.data {
                    ArrayData::Data(bytes) => sprint_items(bytes.iter()),
                    ArrayData::List(list) => sprint_items(list.iter().map(SprintItem)),
                }
            }
            Value::Slice(s) => match &s.base {
                BaseRef::Unresolved(id) => format!("slice[base:{}]", id),
                BaseRef::Array(a) => {
                    let arr = a.borrow();
                    match &arr.data {
                        ArrayData::Data(bytes) => {
                            sprint_items(bytes[s.offset..s.offset + s.length].iter())
                        }
                        ArrayData::List(list) => sprint_items(
                            list[s.offset..s.offset + s.length].iter().map(SprintItem),
                        ),
                    }
                }
            },
            Value::Map(m) => {
                let mv = m.borrow();
                let inner: Vec<String> = mv
                    .iter()
                    .map(|e| format!("{}:{}", e.key.sprint(), e.value.sprint()))
                    .collect();
                format!("map[{}]", inner.join(" "))
            }
            Value::Pointer(p) => match p.deref() {
                Ok(tv) => format!("&{}", tv.sprint()),
                Err(_) => "&<invalid>".to_string(),
            },
            Value::Struct(s) => {
                let sv = s.borrow();
                let inner: Vec<String> = sv.fields.iter().map(|f| f.sprint()).collect();
                format!("{{{}}}", inner.join(" "))
            }
            Value::Func(f) => {
                if f.name.is_empty() {
                    "func(...)".to_string()
                } else {
                    f.name.clone()
                }
            }
            Value::Foreign(_) => "<foreign>".to_string(),
            Value::Type(t) => t.to_string(),
            Value::Package(p) => format!("package({})", p.pkg_path),
            Value::HeapItem(h) => h.borrow().value.sprint(),
        }
    }
}

// Display adapters for sprint_items.
struct SprintItem<'a>(&'a TypedValue);

impl std::fmt::Display for SprintItem<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.sprint())
    }
}

fn sprint_items<I, T>(items: I) -> String
where
    I: Iterator<Item = T>,
    T: std::fmt::Display,
{
    let inner: Vec<String> = items.map(|x| x.to_string()).collect();
    format!("[{}]", inner.join(" "))
}

/// The zero value of a type. Interface-kinded types default to the fully
/// undefined value; reference kinds default to typed nil; composites
/// allocate.
pub fn default_typed_value(
    alloc: &mut Allocator,
    t: &TypeHandle,
) -> Result<TypedValue, RuntimeError> {
    let bt = base_of(t);
    let v = match &*bt {
        Type::Primitive(k) => match k {
            Kind::Bool => Value::Bool(false),
            Kind::Int => Value::Int(0),
            Kind::Int8 => Value::Int8(0),
            Kind::Int16 => Value::Int16(0),
            Kind::Int32 => Value::Int32(0),
            Kind::Int64 => Value::Int64(0),
            Kind::Uint => Value::Uint(0),
            Kind::Uint8 => Value::Uint8(0),
            Kind::Uint16 => Value::Uint16(0),
            Kind::Uint32 => Value::Uint32(0),
            Kind::Uint64 => Value::Uint64(0),
            Kind::Float32 => Value::Float32(0.0),
            Kind::Float64 => Value::Float64(0.0),
            Kind::BigInt => Value::BigInt(alloc.new_big_int(BigInt::default())?),
            Kind::String => Value::String(alloc.new_string("")?),
            _ => {
                return Err(RuntimeError::static_type(format!(
                    "no default value for primitive {}",
                    bt
                )));
            }
        },
        Type::Interface(_) => return Ok(TypedValue::default()),
        Type::Slice(_) | Type::Map(_) | Type::Pointer(_) | Type::Func(_) | Type::Chan(_)
        | Type::Foreign(_) => Value::Null,
        Type::Struct(st) => {
            let mut fields = Vec::with_capacity(st.fields.len());
            for f in &st.fields {
                fields.push(default_typed_value(alloc, &f.typ)?);
            }
            Value::Struct(alloc.new_struct(fields)?)
        }
        Type::Array(at) => {
            if at.elt.kind() == Kind::Uint8 {
                Value::Array(alloc.new_data_array(at.len)?)
            } else {
                let arr = alloc.new_list_array(at.len)?;
                if at.elt.kind() != Kind::Interface {
                    let mut a = arr.borrow_mut();
                    let ArrayData::List(list) = &mut a.data else {
                        unreachable!()
                    };
                    for slot in list.iter_mut() {
                        *slot = default_typed_value(alloc, &at.elt)?;
                    }
                }
                Value::Array(arr)
            }
        }
        Type::Meta | Type::Package | Type::Declared(_) => {
            return Err(RuntimeError::static_type(format!(
                "no default value for {}",
                bt
            )));
        }
    };
    Ok(TypedValue {
        t: Some(t.clone()),
        v,
    })
}

/// A slice value over an already-resolved base.
pub fn slice_of(
    base: Rc<std::cell::RefCell<crate::value::ArrayValue>>,
    offset: usize,
    length: usize,
    maxcap: usize,
) -> SliceValue {
    SliceValue {
        base: BaseRef::Array(base),
        offset,
        length,
        maxcap,
    }
}

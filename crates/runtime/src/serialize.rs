//! Serialization of runtime values
//!
//! This module provides a serializable representation of runtime values
//! for exchange with external systems: state snapshots, IPC with the host
//! process, test fixtures. It does not define the persisted-object wire
//! format of the realm store, which belongs to the persistence layer.
//!
//! # Why WireValue?
//!
//! The runtime `TypedValue` holds shared handles (`Rc` arrays, interned
//! strings, host objects) that are not directly serializable. `WireValue`
//! uses owned data and can be serialized with serde/bincode.
//!
//! Map entries serialize as an ordered pair list, so the same logical map
//! always serializes to identical bytes. Non-finite floats are rejected
//! for the same reason: the encoding must be deterministic and
//! re-hashable.
//!
//! Code is not data: function values are not serializable, and neither are
//! foreign values (the host owns their state), type handles, packages, or
//! pointers (their base identity is meaningless outside the machine).

use serde::{Deserialize, Serialize};
use std::rc::Rc;
use tern_core::alloc::Allocator;
use tern_core::errors::RuntimeError;
use tern_core::store::Store;
use tern_core::typed_value::{TypedValue, typed_bool, typed_int};
use tern_core::types::{Kind, byte_slice_type, primitive};
use tern_core::value::{ArrayData, Value};

/// Error during value serialization/deserialization.
#[derive(Debug)]
pub enum WireError {
    /// Cannot serialize function values (code is not data)
    FuncNotSerializable,
    /// Cannot serialize foreign values (the host owns their state)
    ForeignNotSerializable,
    /// Cannot serialize type handles
    TypeNotSerializable,
    /// Cannot serialize package environments
    PackageNotSerializable,
    /// Cannot serialize pointers (base identity is machine-local)
    PointerNotSerializable,
    /// Non-finite float (NaN or Infinity) breaks determinism
    NonFiniteFloat(f64),
    /// A map key that is not a hashable shape
    UnhashableKey,
    /// The slice base could not be resolved from the store
    StoreFault(String),
    /// Bincode encoding/decoding error
    Bincode(Box<bincode::Error>),
    /// Malformed big-int literal during hydration
    InvalidBigInt(String),
}

impl std::fmt::Display for WireError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WireError::FuncNotSerializable => {
                write!(f, "function values cannot be serialized - code is not data")
            }
            WireError::ForeignNotSerializable => {
                write!(f, "foreign values cannot be serialized - host state")
            }
            WireError::TypeNotSerializable => write!(f, "type handles cannot be serialized"),
            WireError::PackageNotSerializable => {
                write!(f, "package environments cannot be serialized")
            }
            WireError::PointerNotSerializable => {
                write!(f, "pointers cannot be serialized - machine-local identity")
            }
            WireError::NonFiniteFloat(v) => {
                write!(f, "cannot serialize non-finite float: {}", v)
            }
            WireError::UnhashableKey => write!(f, "map key is not hashable"),
            WireError::StoreFault(msg) => write!(f, "store fault: {}", msg),
            WireError::Bincode(e) => write!(f, "bincode error: {}", e),
            WireError::InvalidBigInt(s) => write!(f, "invalid bigint literal: {}", s),
        }
    }
}

impl std::error::Error for WireError {}

/// Hashable key forms, mirroring the runtime's map key rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireKey {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Str(String),
}

/// Owned, serializable mirror of a runtime value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireValue {
    Null,
    Bool(bool),
    Int(i64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint(u64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    /// Decimal digits; arbitrary precision survives the trip.
    BigInt(String),
    Str(String),
    /// A Data-backed array or byte slice window.
    Bytes(Vec<u8>),
    /// A List-backed array or slice window.
    List(Vec<WireValue>),
    /// Map entries in iteration order.
    Map(Vec<(WireKey, WireValue)>),
    Struct(Vec<WireValue>),
}

impl WireValue {
    /// Capture a runtime value. Slices capture their window, not their
    /// whole base.
    pub fn from_typed(tv: &TypedValue, store: &dyn Store) -> Result<WireValue, WireError> {
        match &tv.v {
            Value::Null => Ok(WireValue::Null),
            Value::Bool(b) => Ok(WireValue::Bool(*b)),
            Value::Int(n) => Ok(WireValue::Int(*n)),
            Value::Int8(n) => Ok(WireValue::Int8(*n)),
            Value::Int16(n) => Ok(WireValue::Int16(*n)),
            Value::Int32(n) => Ok(WireValue::Int32(*n)),
            Value::Int64(n) => Ok(WireValue::Int64(*n)),
            Value::Uint(n) => Ok(WireValue::Uint(*n)),
            Value::Uint8(n) => Ok(WireValue::Uint8(*n)),
            Value::Uint16(n) => Ok(WireValue::Uint16(*n)),
            Value::Uint32(n) => Ok(WireValue::Uint32(*n)),
            Value::Uint64(n) => Ok(WireValue::Uint64(*n)),
            Value::Float32(x) => {
                if !x.is_finite() {
                    return Err(WireError::NonFiniteFloat(*x as f64));
                }
                Ok(WireValue::Float32(*x))
            }
            Value::Float64(x) => {
                if !x.is_finite() {
                    return Err(WireError::NonFiniteFloat(*x));
                }
                Ok(WireValue::Float64(*x))
            }
            Value::BigInt(b) => Ok(WireValue::BigInt(b.to_string())),
            Value::String(s) => Ok(WireValue::Str(s.to_string())),
            Value::Array(a) => match &a.borrow().data {
                ArrayData::Data(bytes) => Ok(WireValue::Bytes(bytes.clone())),
                ArrayData::List(list) => {
                    let mut out = Vec::with_capacity(list.len());
                    for tv in list {
                        out.push(WireValue::from_typed(tv, store)?);
                    }
                    Ok(WireValue::List(out))
                }
            },
            Value::Slice(s) => {
                let base = s
                    .base(store)
                    .map_err(|e| WireError::StoreFault(e.to_string()))?;
                let arr = base.borrow();
                match &arr.data {
                    ArrayData::Data(bytes) => {
                        Ok(WireValue::Bytes(bytes[s.offset..s.offset + s.length].to_vec()))
                    }
                    ArrayData::List(list) => {
                        let mut out = Vec::with_capacity(s.length);
                        for tv in &list[s.offset..s.offset + s.length] {
                            out.push(WireValue::from_typed(tv, store)?);
                        }
                        Ok(WireValue::List(out))
                    }
                }
            }
            Value::Map(m) => {
                let mv = m.borrow();
                let mut out = Vec::with_capacity(mv.len());
                for entry in mv.iter() {
                    let key = match &entry.key.v {
                        Value::Bool(b) => WireKey::Bool(*b),
                        Value::Int(n) | Value::Int64(n) => WireKey::Int(*n),
                        Value::Int8(n) => WireKey::Int(*n as i64),
                        Value::Int16(n) => WireKey::Int(*n as i64),
                        Value::Int32(n) => WireKey::Int(*n as i64),
                        Value::Uint(n) | Value::Uint64(n) => WireKey::Uint(*n),
                        Value::Uint8(n) => WireKey::Uint(*n as u64),
                        Value::Uint16(n) => WireKey::Uint(*n as u64),
                        Value::Uint32(n) => WireKey::Uint(*n as u64),
                        Value::String(s) => WireKey::Str(s.to_string()),
                        _ => return Err(WireError::UnhashableKey),
                    };
                    out.push((key, WireValue::from_typed(&entry.value, store)?));
                }
                Ok(WireValue::Map(out))
            }
            Value::Struct(s) => {
                let sv = s.borrow();
                let mut out = Vec::with_capacity(sv.fields.len());
                for f in &sv.fields {
                    out.push(WireValue::from_typed(f, store)?);
                }
                Ok(WireValue::Struct(out))
            }
            Value::HeapItem(h) => {
                let inner = h.borrow().value.clone();
                WireValue::from_typed(&inner, store)
            }
            Value::Func(_) => Err(WireError::FuncNotSerializable),
            Value::Foreign(_) => Err(WireError::ForeignNotSerializable),
            Value::Type(_) => Err(WireError::TypeNotSerializable),
            Value::Package(_) => Err(WireError::PackageNotSerializable),
            Value::Pointer(_) => Err(WireError::PointerNotSerializable),
        }
    }

    /// Rebuild a runtime value, charging the allocator for every mint.
    /// Types hydrate to the closest primitive shape; bytes hydrate to a
    /// byte slice over a fresh Data base.
    pub fn hydrate(&self, alloc: &mut Allocator) -> Result<TypedValue, RuntimeError> {
        match self {
            WireValue::Null => Ok(TypedValue::default()),
            WireValue::Bool(b) => Ok(typed_bool(*b)),
            WireValue::Int(n) => Ok(typed_int(*n)),
            WireValue::Int8(n) => Ok(scalar(Kind::Int8, Value::Int8(*n))),
            WireValue::Int16(n) => Ok(scalar(Kind::Int16, Value::Int16(*n))),
            WireValue::Int32(n) => Ok(scalar(Kind::Int32, Value::Int32(*n))),
            WireValue::Int64(n) => Ok(scalar(Kind::Int64, Value::Int64(*n))),
            WireValue::Uint(n) => Ok(scalar(Kind::Uint, Value::Uint(*n))),
            WireValue::Uint8(n) => Ok(scalar(Kind::Uint8, Value::Uint8(*n))),
            WireValue::Uint16(n) => Ok(scalar(Kind::Uint16, Value::Uint16(*n))),
            WireValue::Uint32(n) => Ok(scalar(Kind::Uint32, Value::Uint32(*n))),
            WireValue::Uint64(n) => Ok(scalar(Kind::Uint64, Value::Uint64(*n))),
            WireValue::Float32(x) => Ok(scalar(Kind::Float32, Value::Float32(*x))),
            WireValue::Float64(x) => Ok(scalar(Kind::Float64, Value::Float64(*x))),
            WireValue::BigInt(digits) => {
                let n: num_bigint::BigInt = digits.parse().map_err(|_| {
                    RuntimeError::static_type(format!("invalid bigint literal: {}", digits))
                })?;
                Ok(scalar(Kind::BigInt, Value::BigInt(alloc.new_big_int(n)?)))
            }
            WireValue::Str(s) => Ok(typed_string_alloc(alloc, s)?),
            WireValue::Bytes(bytes) => {
                let n = bytes.len();
                let base = alloc.new_array_from_data(bytes.clone())?;
                let sv = alloc.new_slice(base, 0, n, n)?;
                Ok(TypedValue {
                    t: Some(byte_slice_type(false)),
                    v: Value::Slice(sv),
                })
            }
            WireValue::List(items) => {
                let n = items.len();
                let base = alloc.new_list_array(n)?;
                {
                    let mut hydrated = Vec::with_capacity(n);
                    for item in items {
                        hydrated.push(item.hydrate(alloc)?);
                    }
                    let mut arr = base.borrow_mut();
                    let ArrayData::List(list) = &mut arr.data else {
                        unreachable!()
                    };
                    for (slot, tv) in list.iter_mut().zip(hydrated) {
                        *slot = tv;
                    }
                }
                let sv = alloc.new_slice(base, 0, n, n)?;
                Ok(TypedValue {
                    t: None,
                    v: Value::Slice(sv),
                })
            }
            WireValue::Map(entries) => {
                let mv = alloc.new_map(entries.len())?;
                for (key, value) in entries {
                    let key_tv = match key {
                        WireKey::Bool(b) => typed_bool(*b),
                        WireKey::Int(n) => typed_int(*n),
                        WireKey::Uint(n) => scalar(Kind::Uint, Value::Uint(*n)),
                        WireKey::Str(s) => typed_string_alloc(alloc, s)?,
                    };
                    let value_tv = value.hydrate(alloc)?;
                    mv.borrow_mut().set(key_tv, value_tv)?;
                }
                Ok(TypedValue {
                    t: None,
                    v: Value::Map(mv),
                })
            }
            WireValue::Struct(fields) => {
                let mut out = Vec::with_capacity(fields.len());
                for f in fields {
                    out.push(f.hydrate(alloc)?);
                }
                Ok(TypedValue {
                    t: None,
                    v: Value::Struct(alloc.new_struct(out)?),
                })
            }
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        bincode::serialize(self).map_err(|e| WireError::Bincode(Box::new(e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<WireValue, WireError> {
        bincode::deserialize(bytes).map_err(|e| WireError::Bincode(Box::new(e)))
    }
}

fn scalar(kind: Kind, v: Value) -> TypedValue {
    TypedValue {
        t: Some(primitive(kind)),
        v,
    }
}

fn typed_string_alloc(alloc: &mut Allocator, s: &str) -> Result<TypedValue, RuntimeError> {
    let rc: Rc<str> = alloc.new_string(s)?;
    Ok(TypedValue {
        t: Some(primitive(Kind::String)),
        v: Value::String(rc),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_core::store::MemStore;

    fn capture(tv: &TypedValue) -> WireValue {
        WireValue::from_typed(tv, &MemStore::new()).unwrap()
    }

    #[test]
    fn test_scalar_round_trip() {
        let mut alloc = Allocator::unlimited();
        for wv in [
            WireValue::Null,
            WireValue::Bool(true),
            WireValue::Int(-5),
            WireValue::Uint8(255),
            WireValue::Float64(1.25),
            WireValue::Str("hello".to_string()),
            WireValue::BigInt("123456789012345678901234567890".to_string()),
        ] {
            let bytes = wv.to_bytes().unwrap();
            let back = WireValue::from_bytes(&bytes).unwrap();
            assert_eq!(wv, back);
            // hydration succeeds for every wire shape
            back.hydrate(&mut alloc).unwrap();
        }
    }

    #[test]
    fn test_byte_slice_captures_window() {
        let mut alloc = Allocator::unlimited();
        let base = alloc.new_array_from_data(vec![1, 2, 3, 4, 5]).unwrap();
        let sv = alloc.new_slice(base, 1, 3, 5).unwrap();
        let tv = TypedValue {
            t: Some(byte_slice_type(false)),
            v: Value::Slice(sv),
        };
        assert_eq!(capture(&tv), WireValue::Bytes(vec![2, 3, 4]));
    }

    #[test]
    fn test_map_preserves_insertion_order() {
        let mut alloc = Allocator::unlimited();
        let mv = alloc.new_map(0).unwrap();
        for (i, k) in ["z", "a", "m"].iter().enumerate() {
            let key = typed_string_alloc(&mut alloc, k).unwrap();
            mv.borrow_mut().set(key, typed_int(i as i64)).unwrap();
        }
        let tv = TypedValue {
            t: None,
            v: Value::Map(mv),
        };
        match capture(&tv) {
            WireValue::Map(entries) => {
                let keys: Vec<_> = entries
                    .iter()
                    .map(|(k, _)| match k {
                        WireKey::Str(s) => s.clone(),
                        other => panic!("unexpected key {:?}", other),
                    })
                    .collect();
                assert_eq!(keys, vec!["z", "a", "m"]);
            }
            other => panic!("expected map, got {:?}", other),
        }
    }

    #[test]
    fn test_code_is_not_data() {
        let u = crate::universe::universe();
        let append = u.block.get("append").unwrap().clone();
        let err = WireValue::from_typed(&append, &MemStore::new()).unwrap_err();
        assert!(matches!(err, WireError::FuncNotSerializable));
    }

    #[test]
    fn test_non_finite_float_rejected() {
        let tv = scalar(Kind::Float64, Value::Float64(f64::NAN));
        let err = WireValue::from_typed(&tv, &MemStore::new()).unwrap_err();
        assert!(matches!(err, WireError::NonFiniteFloat(_)));
    }

    #[test]
    fn test_bytes_hydrate_to_byte_slice() {
        let mut alloc = Allocator::unlimited();
        let tv = WireValue::Bytes(vec![7, 8]).hydrate(&mut alloc).unwrap();
        assert_eq!(tv.get_length().unwrap(), 2);
        assert_eq!(
            tv.get_pointer_at_index(&MemStore::new(), 1)
                .unwrap()
                .deref()
                .unwrap()
                .get_uint8()
                .unwrap(),
            8
        );
    }
}

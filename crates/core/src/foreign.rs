//! Foreign (host-bridged) values
//!
//! A foreign value is an opaque wrapper around a host-ecosystem object. The
//! core exposes only the narrow operation set it needs: length, index get,
//! index set, sequence append, and map set-at-key. Foreign and native
//! representations never share a base array; conversion is explicit at the
//! built-in boundary.
//!
//! `VecBridge` and `MapBridge` are in-crate reference implementations, used
//! by the test suites and as templates for embedders bridging real host
//! collections.

use crate::errors::RuntimeError;
use crate::types::Kind;
use crate::typed_value::TypedValue;
use crate::value::ObjectId;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Host operations available on a foreign object.
///
/// `set_key` with an undefined value deletes the key.
pub trait ForeignObject: fmt::Debug {
    fn len(&self) -> usize;
    fn get(&self, index: usize) -> Result<TypedValue, RuntimeError>;
    fn set(&self, index: usize, value: TypedValue) -> Result<(), RuntimeError>;
    /// Append materialised elements, returning the grown host sequence.
    fn append(&self, values: Vec<TypedValue>) -> Result<Rc<dyn ForeignObject>, RuntimeError>;
    fn set_key(&self, key: TypedValue, value: TypedValue) -> Result<(), RuntimeError>;
}

/// Host operations available on a foreign *type*, used by `make`.
pub trait ForeignTypeOps: fmt::Debug {
    fn kind(&self) -> Kind;
    fn make_map(&self, hint: usize) -> Result<Rc<dyn ForeignObject>, RuntimeError>;
}

/// A foreign type handle payload. Equality is host-type identity.
#[derive(Debug, Clone)]
pub struct ForeignType {
    pub ops: Rc<dyn ForeignTypeOps>,
}

impl PartialEq for ForeignType {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.ops, &other.ops)
    }
}

/// A foreign value: host object plus the identity minted for it.
#[derive(Debug, Clone)]
pub struct ForeignValue {
    pub id: ObjectId,
    pub obj: Rc<dyn ForeignObject>,
}

/// Vec-backed foreign sequence.
#[derive(Debug, Default)]
pub struct VecBridge {
    items: RefCell<Vec<TypedValue>>,
}

impl VecBridge {
    pub fn new(items: Vec<TypedValue>) -> Rc<Self> {
        Rc::new(Self {
            items: RefCell::new(items),
        })
    }
}

impl ForeignObject for VecBridge {
    fn len(&self) -> usize {
        self.items.borrow().len()
    }

    fn get(&self, index: usize) -> Result<TypedValue, RuntimeError> {
        self.items
            .borrow()
            .get(index)
            .cloned()
            .ok_or_else(|| RuntimeError::static_type(format!("foreign index {} out of range", index)))
    }

    fn set(&self, index: usize, value: TypedValue) -> Result<(), RuntimeError> {
        let mut items = self.items.borrow_mut();
        match items.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(RuntimeError::static_type(format!(
                "foreign index {} out of range",
                index
            ))),
        }
    }

    fn append(&self, values: Vec<TypedValue>) -> Result<Rc<dyn ForeignObject>, RuntimeError> {
        let mut grown = self.items.borrow().clone();
        grown.extend(values);
        Ok(VecBridge::new(grown))
    }

    fn set_key(&self, _key: TypedValue, _value: TypedValue) -> Result<(), RuntimeError> {
        Err(RuntimeError::static_type("foreign sequence has no keys"))
    }
}

/// Vec-of-pairs foreign map. Keys compare by their stringer form, which is
/// enough for the hashable-equivalent host types the core admits as keys.
#[derive(Debug, Default)]
pub struct MapBridge {
    entries: RefCell<Vec<(TypedValue, TypedValue)>>,
}

impl MapBridge {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }
}

impl ForeignObject for MapBridge {
    fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    fn get(&self, index: usize) -> Result<TypedValue, RuntimeError> {
        self.entries
            .borrow()
            .get(index)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| RuntimeError::static_type(format!("foreign index {} out of range", index)))
    }

    fn set(&self, _index: usize, _value: TypedValue) -> Result<(), RuntimeError> {
        Err(RuntimeError::static_type("foreign map is not indexable"))
    }

    fn append(&self, _values: Vec<TypedValue>) -> Result<Rc<dyn ForeignObject>, RuntimeError> {
        Err(RuntimeError::static_type("foreign map is not appendable"))
    }

    fn set_key(&self, key: TypedValue, value: TypedValue) -> Result<(), RuntimeError> {
        let mut entries = self.entries.borrow_mut();
        let needle = key.sprint();
        if value.is_undefined() {
            entries.retain(|(k, _)| k.sprint() != needle);
            return Ok(());
        }
        for (k, v) in entries.iter_mut() {
            if k.sprint() == needle {
                *v = value;
                return Ok(());
            }
        }
        entries.push((key, value));
        Ok(())
    }
}

/// `ForeignTypeOps` for `MapBridge`, usable as the foreign map type in
/// `make`.
#[derive(Debug)]
pub struct MapBridgeType;

impl ForeignTypeOps for MapBridgeType {
    fn kind(&self) -> Kind {
        Kind::Map
    }

    fn make_map(&self, _hint: usize) -> Result<Rc<dyn ForeignObject>, RuntimeError> {
        Ok(MapBridge::new())
    }
}

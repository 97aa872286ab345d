//! Runtime value representation
//!
//! `Value` is the tagged payload of a `TypedValue`. Scalars live inline;
//! everything else holds a shared handle to a heap object minted by the
//! allocator. The machine is single-threaded, so heap objects are
//! `Rc<RefCell<_>>` and strings are shared `Rc<str>`.
//!
//! # Array duality
//!
//! An array object has exactly one of two backings:
//! - `Data`: a packed byte buffer, used whenever the element type is the
//!   8-bit unsigned byte.
//! - `List`: a contiguous sequence of typed values.
//!
//! Cross-cutting built-ins must handle all four source/destination
//! combinations; elements read out of a `Data` backing are materialised as
//! typed byte values.

use crate::errors::RuntimeError;
use crate::foreign::ForeignValue;
use crate::realm::{ObjectRef, Realm};
use crate::store::Store;
use crate::typed_value::TypedValue;
use crate::types::{TypeHandle, uint8_type};
use num_bigint::BigInt;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Stable identity of a heap object, minted by the allocator. Used by the
/// realm update protocol and by store base resolution.
pub type ObjectId = u64;

#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absence; legal only where the static type permits.
    #[default]
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
    BigInt(Rc<BigInt>),
    String(Rc<str>),
    Array(Rc<RefCell<ArrayValue>>),
    Slice(SliceValue),
    Map(Rc<RefCell<MapValue>>),
    Pointer(PointerValue),
    Struct(Rc<RefCell<StructValue>>),
    Func(Rc<FuncValue>),
    Foreign(ForeignValue),
    Type(TypeHandle),
    Package(Rc<PackageValue>),
    HeapItem(Rc<RefCell<HeapItemValue>>),
}

/// The two physical array backings.
#[derive(Debug, Clone)]
pub enum ArrayData {
    Data(Vec<u8>),
    List(Vec<TypedValue>),
}

#[derive(Debug, Clone)]
pub struct ArrayValue {
    pub id: ObjectId,
    pub data: ArrayData,
}

impl ArrayValue {
    pub fn len(&self) -> usize {
        match &self.data {
            ArrayData::Data(b) => b.len(),
            ArrayData::List(l) => l.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_data(&self) -> bool {
        matches!(self.data, ArrayData::Data(_))
    }
}

/// Reference to a slice's backing array: resolved in memory, or a stored
/// identity to be faulted in through the store.
#[derive(Debug, Clone)]
pub enum BaseRef {
    Array(Rc<RefCell<ArrayValue>>),
    Unresolved(ObjectId),
}

/// A slice does not own its base; it owns three indices into it.
/// Invariant: `offset + length <= maxcap <= base.len()`.
#[derive(Debug, Clone)]
pub struct SliceValue {
    pub base: BaseRef,
    pub offset: usize,
    pub length: usize,
    pub maxcap: usize,
}

impl SliceValue {
    /// Resolve the backing array, faulting through the store if needed.
    pub fn base(&self, store: &dyn Store) -> Result<Rc<RefCell<ArrayValue>>, RuntimeError> {
        match &self.base {
            BaseRef::Array(rc) => Ok(rc.clone()),
            BaseRef::Unresolved(id) => match store.resolve_base(*id)? {
                ObjectRef::Array(rc) => Ok(rc),
                other => Err(RuntimeError::store_fault(format!(
                    "slice base {} resolved to non-array {:?}",
                    id, other
                ))),
            },
        }
    }
}

/// Hashable projection of a typed value, usable as a map key.
///
/// Signed widths normalise to `Int`, unsigned to `Uint`. Floats are not
/// admitted (NaN breaks equality).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    Uint(u64),
    String(Rc<str>),
}

impl MapKey {
    pub fn from_typed(tv: &TypedValue) -> Option<MapKey> {
        match &tv.v {
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            Value::Int(n) | Value::Int64(n) => Some(MapKey::Int(*n)),
            Value::Int8(n) => Some(MapKey::Int(*n as i64)),
            Value::Int16(n) => Some(MapKey::Int(*n as i64)),
            Value::Int32(n) => Some(MapKey::Int(*n as i64)),
            Value::Uint(n) | Value::Uint64(n) => Some(MapKey::Uint(*n)),
            Value::Uint8(n) => Some(MapKey::Uint(*n as u64)),
            Value::Uint16(n) => Some(MapKey::Uint(*n as u64)),
            Value::Uint32(n) => Some(MapKey::Uint(*n as u64)),
            Value::String(s) => Some(MapKey::String(s.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MapEntry {
    pub key: TypedValue,
    pub value: TypedValue,
}

/// Insertion-ordered map. Deletion removes in place; iteration never
/// reorders surviving entries.
#[derive(Debug, Clone)]
pub struct MapValue {
    pub id: ObjectId,
    entries: Vec<MapEntry>,
    index: HashMap<MapKey, usize>,
}

impl MapValue {
    pub fn new(id: ObjectId, hint: usize) -> Self {
        Self {
            id,
            entries: Vec::with_capacity(hint),
            index: HashMap::with_capacity(hint),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn key_of(tv: &TypedValue) -> Result<MapKey, RuntimeError> {
        MapKey::from_typed(tv).ok_or_else(|| {
            RuntimeError::static_type(format!("unhashable map key: {}", tv.sprint()))
        })
    }

    pub fn get(&self, key: &TypedValue) -> Result<Option<TypedValue>, RuntimeError> {
        let k = Self::key_of(key)?;
        Ok(self.index.get(&k).map(|&i| self.entries[i].value.clone()))
    }

    /// Insert or overwrite. New keys append at the end of iteration order.
    pub fn set(&mut self, key: TypedValue, value: TypedValue) -> Result<(), RuntimeError> {
        let k = Self::key_of(&key)?;
        match self.index.get(&k) {
            Some(&i) => self.entries[i].value = value,
            None => {
                self.index.insert(k, self.entries.len());
                self.entries.push(MapEntry { key, value });
            }
        }
        Ok(())
    }

    /// Remove a key in place. Returns the removed entry when present.
    pub fn delete(
        &mut self,
        key: &TypedValue,
    ) -> Result<Option<(TypedValue, TypedValue)>, RuntimeError> {
        let k = Self::key_of(key)?;
        let Some(pos) = self.index.remove(&k) else {
            return Ok(None);
        };
        let entry = self.entries.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Ok(Some((entry.key, entry.value)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MapEntry> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &TypedValue> {
        self.entries.iter().map(|e| &e.key)
    }
}

/// Where a pointer's slot lives.
#[derive(Debug, Clone)]
pub enum PointerBase {
    Array(Rc<RefCell<ArrayValue>>),
    Struct(Rc<RefCell<StructValue>>),
    HeapItem(Rc<RefCell<HeapItemValue>>),
}

/// A pointer is the pair (base identity, index). Duplicating a pointer
/// never reallocates; `deref` computes the target on demand.
#[derive(Debug, Clone)]
pub struct PointerValue {
    pub base: PointerBase,
    pub index: usize,
}

impl PointerValue {
    /// Identity of the enclosing container, reported by the realm protocol.
    pub fn base_id(&self) -> ObjectId {
        match &self.base {
            PointerBase::Array(rc) => rc.borrow().id,
            PointerBase::Struct(rc) => rc.borrow().id,
            PointerBase::HeapItem(rc) => rc.borrow().id,
        }
    }

    pub fn base_object(&self) -> ObjectRef {
        match &self.base {
            PointerBase::Array(rc) => ObjectRef::Array(rc.clone()),
            PointerBase::Struct(rc) => ObjectRef::Struct(rc.clone()),
            PointerBase::HeapItem(rc) => ObjectRef::HeapItem(rc.clone()),
        }
    }

    pub fn deref(&self) -> Result<TypedValue, RuntimeError> {
        match &self.base {
            PointerBase::Array(rc) => {
                let arr = rc.borrow();
                match &arr.data {
                    ArrayData::Data(bytes) => {
                        let b = bytes.get(self.index).copied().ok_or_else(|| {
                            RuntimeError::static_type(format!(
                                "pointer index {} out of range (len {})",
                                self.index,
                                bytes.len()
                            ))
                        })?;
                        Ok(TypedValue {
                            t: Some(uint8_type()),
                            v: Value::Uint8(b),
                        })
                    }
                    ArrayData::List(list) => list.get(self.index).cloned().ok_or_else(|| {
                        RuntimeError::static_type(format!(
                            "pointer index {} out of range (len {})",
                            self.index,
                            list.len()
                        ))
                    }),
                }
            }
            PointerBase::Struct(rc) => {
                let sv = rc.borrow();
                sv.fields.get(self.index).cloned().ok_or_else(|| {
                    RuntimeError::static_type(format!(
                        "pointer field index {} out of range",
                        self.index
                    ))
                })
            }
            PointerBase::HeapItem(rc) => Ok(rc.borrow().value.clone()),
        }
    }

    /// Overwrite the slot this pointer designates.
    ///
    /// List, struct, and heap-item slots report the overwrite to the realm
    /// (one event per slot). Byte slots reference no child objects and
    /// report nothing.
    pub fn assign(
        &self,
        realm: Option<&mut dyn Realm>,
        value: TypedValue,
    ) -> Result<(), RuntimeError> {
        let (container, old) = match &self.base {
            PointerBase::Array(rc) => {
                let old = {
                    let mut arr = rc.borrow_mut();
                    match &mut arr.data {
                        ArrayData::Data(bytes) => {
                            let b = value.get_uint8()?;
                            let len = bytes.len();
                            let slot = bytes.get_mut(self.index).ok_or_else(|| {
                                RuntimeError::static_type(format!(
                                    "pointer index {} out of range (len {})",
                                    self.index, len
                                ))
                            })?;
                            *slot = b;
                            return Ok(());
                        }
                        ArrayData::List(list) => {
                            let len = list.len();
                            let slot = list.get_mut(self.index).ok_or_else(|| {
                                RuntimeError::static_type(format!(
                                    "pointer index {} out of range (len {})",
                                    self.index, len
                                ))
                            })?;
                            std::mem::replace(slot, value.clone())
                        }
                    }
                };
                (ObjectRef::Array(rc.clone()), old)
            }
            PointerBase::Struct(rc) => {
                let old = {
                    let mut sv = rc.borrow_mut();
                    let slot = sv.fields.get_mut(self.index).ok_or_else(|| {
                        RuntimeError::static_type(format!(
                            "pointer field index {} out of range",
                            self.index
                        ))
                    })?;
                    std::mem::replace(slot, value.clone())
                };
                (ObjectRef::Struct(rc.clone()), old)
            }
            PointerBase::HeapItem(rc) => {
                let old = std::mem::replace(&mut rc.borrow_mut().value, value.clone());
                (ObjectRef::HeapItem(rc.clone()), old)
            }
        };
        if let Some(realm) = realm {
            realm.did_update(
                &container,
                old.first_object().as_ref(),
                value.first_object().as_ref(),
            );
        }
        Ok(())
    }
}

/// Fixed-arity record of typed values.
#[derive(Debug, Clone)]
pub struct StructValue {
    pub id: ObjectId,
    pub fields: Vec<TypedValue>,
}

/// Single-cell box produced by `new`, addressable only through a pointer.
#[derive(Debug, Clone)]
pub struct HeapItemValue {
    pub id: ObjectId,
    pub value: TypedValue,
}

/// A function value: code address plus captured environment, or the name of
/// a registered native handler for universe built-ins.
#[derive(Debug)]
pub struct FuncValue {
    pub name: String,
    pub typ: TypeHandle,
    /// Registered handler name for built-ins; `None` for bytecode funcs.
    pub native: Option<String>,
    /// Code address for bytecode funcs.
    pub pc: usize,
    pub captures: Vec<TypedValue>,
}

/// An ordered name/value scope. Packages use named entries; built-in
/// invocations use anonymous parameter entries read by position.
#[derive(Debug, Clone, Default)]
pub struct Block {
    names: Vec<String>,
    pub values: Vec<TypedValue>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    /// A parameter block for one built-in invocation.
    pub fn with_params(params: Vec<TypedValue>) -> Self {
        Self {
            names: Vec::new(),
            values: params,
        }
    }

    /// Define or overwrite a named entry, preserving first-definition order.
    pub fn define(&mut self, name: &str, tv: TypedValue) {
        match self.names.iter().position(|n| n == name) {
            Some(i) => self.values[i] = tv,
            None => {
                self.names.push(name.to_string());
                self.values.push(tv);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&TypedValue> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| &self.values[i])
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    // Positional operand access for built-in handlers. Missing operands are
    // a machine invariant violation, not a user error.

    pub fn get_params1(&self) -> TypedValue {
        self.values[0].clone()
    }

    pub fn get_params2(&self) -> (TypedValue, TypedValue) {
        (self.values[0].clone(), self.values[1].clone())
    }

    pub fn get_params3(&self) -> (TypedValue, TypedValue, TypedValue) {
        (
            self.values[0].clone(),
            self.values[1].clone(),
            self.values[2].clone(),
        )
    }
}

/// A package-level environment handle.
#[derive(Debug, Clone)]
pub struct PackageValue {
    pub pkg_name: String,
    pub pkg_path: String,
    pub block: Block,
}

impl PackageValue {
    pub fn empty() -> Self {
        Self {
            pkg_name: String::new(),
            pkg_path: String::new(),
            block: Block::new(),
        }
    }
}

/// The static form of a package: its definitions before instantiation.
#[derive(Debug, Clone)]
pub struct PackageNode {
    pub pkg_name: String,
    pub pkg_path: String,
    pub block: Block,
}

impl PackageNode {
    pub fn new(pkg_name: &str, pkg_path: &str) -> Self {
        Self {
            pkg_name: pkg_name.to_string(),
            pkg_path: pkg_path.to_string(),
            block: Block::new(),
        }
    }

    pub fn define(&mut self, name: &str, tv: TypedValue) {
        self.block.define(name, tv);
    }

    /// Define a built-in function backed by a registered native handler.
    pub fn define_native(
        &mut self,
        name: &str,
        params: Vec<crate::types::FieldType>,
        results: Vec<crate::types::FieldType>,
    ) {
        let typ: TypeHandle = Rc::new(crate::types::Type::Func(crate::types::FuncType {
            params,
            results,
        }));
        let fv = FuncValue {
            name: name.to_string(),
            typ: typ.clone(),
            native: Some(name.to_string()),
            pc: 0,
            captures: Vec::new(),
        };
        self.block.define(
            name,
            TypedValue {
                t: Some(typ),
                v: Value::Func(Rc::new(fv)),
            },
        );
    }

    pub fn block_names(&self) -> &[String] {
        self.block.names()
    }

    /// Instantiate the package environment from the static definitions.
    pub fn new_package(&self) -> PackageValue {
        PackageValue {
            pkg_name: self.pkg_name.clone(),
            pkg_path: self.pkg_path.clone(),
            block: self.block.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed_value::{typed_int, typed_string};

    fn list_array(id: ObjectId, items: Vec<TypedValue>) -> Rc<RefCell<ArrayValue>> {
        Rc::new(RefCell::new(ArrayValue {
            id,
            data: ArrayData::List(items),
        }))
    }

    #[test]
    fn test_array_duality() {
        let data = ArrayValue {
            id: 1,
            data: ArrayData::Data(vec![0; 4]),
        };
        assert!(data.is_data());
        assert_eq!(data.len(), 4);

        let list = ArrayValue {
            id: 2,
            data: ArrayData::List(vec![TypedValue::default(); 3]),
        };
        assert!(!list.is_data());
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn test_map_insertion_order_and_in_place_delete() {
        let mut mv = MapValue::new(1, 0);
        mv.set(typed_string("a"), typed_int(1)).unwrap();
        mv.set(typed_string("b"), typed_int(2)).unwrap();
        mv.set(typed_string("c"), typed_int(3)).unwrap();
        assert_eq!(mv.len(), 3);

        let removed = mv.delete(&typed_string("b")).unwrap();
        assert!(removed.is_some());
        assert_eq!(mv.len(), 2);

        let keys: Vec<String> = mv.keys().map(|k| k.sprint()).collect();
        assert_eq!(keys, vec!["a", "c"]);

        // surviving entries still reachable through the index
        assert_eq!(mv.get(&typed_string("c")).unwrap().unwrap().sprint(), "3");
        assert!(mv.get(&typed_string("b")).unwrap().is_none());
    }

    #[test]
    fn test_map_delete_absent_is_noop() {
        let mut mv = MapValue::new(1, 0);
        mv.set(typed_string("a"), typed_int(1)).unwrap();
        assert!(mv.delete(&typed_string("zzz")).unwrap().is_none());
        assert_eq!(mv.len(), 1);
    }

    #[test]
    fn test_map_overwrite_keeps_position() {
        let mut mv = MapValue::new(1, 0);
        mv.set(typed_string("a"), typed_int(1)).unwrap();
        mv.set(typed_string("b"), typed_int(2)).unwrap();
        mv.set(typed_string("a"), typed_int(9)).unwrap();
        let keys: Vec<String> = mv.keys().map(|k| k.sprint()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(mv.get(&typed_string("a")).unwrap().unwrap().sprint(), "9");
    }

    #[test]
    fn test_unhashable_key_rejected() {
        let mut mv = MapValue::new(1, 0);
        let float_key = TypedValue {
            t: Some(crate::types::primitive(crate::types::Kind::Float64)),
            v: Value::Float64(1.5),
        };
        assert!(mv.set(float_key, typed_int(1)).is_err());
    }

    #[test]
    fn test_pointer_deref_data_materialises_typed_byte() {
        let arr = Rc::new(RefCell::new(ArrayValue {
            id: 7,
            data: ArrayData::Data(vec![10, 20, 30]),
        }));
        let p = PointerValue {
            base: PointerBase::Array(arr),
            index: 1,
        };
        let tv = p.deref().unwrap();
        assert_eq!(tv.get_uint8().unwrap(), 20);
        assert_eq!(tv.t.unwrap().kind(), crate::types::Kind::Uint8);
    }

    #[test]
    fn test_pointer_assign_list_slot() {
        let arr = list_array(9, vec![typed_int(1), typed_int(2)]);
        let p = PointerValue {
            base: PointerBase::Array(arr.clone()),
            index: 0,
        };
        p.assign(None, typed_int(5)).unwrap();
        match &arr.borrow().data {
            ArrayData::List(l) => assert_eq!(l[0].sprint(), "5"),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_block_define_preserves_order() {
        let mut b = Block::new();
        b.define("x", typed_int(1));
        b.define("y", typed_int(2));
        b.define("x", typed_int(3));
        assert_eq!(b.names(), ["x", "y"]);
        assert_eq!(b.get("x").unwrap().sprint(), "3");
    }
}

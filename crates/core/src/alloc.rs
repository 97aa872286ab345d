//! Byte-budget allocator
//!
//! Every heap mint charges a per-variant byte cost against the budget;
//! exhaustion fails the current machine step with `QuotaExceeded`. A limit
//! of zero means unlimited (used by tests and non-metered embeddings).
//!
//! The allocator also mints object identities. Handles are opaque: callers
//! never assume contiguity between successive allocations, and identities
//! only promise uniqueness within one allocator.
//!
//! Reclamation is opportunistic. `gc` exists as an entry point for the
//! machine; with `Rc`-managed objects there is nothing to sweep eagerly, so
//! it reports zero bytes reclaimed. Semantics never depend on GC
//! promptness.

use crate::errors::RuntimeError;
use crate::foreign::{ForeignObject, ForeignValue};
use crate::typed_value::TypedValue;
use crate::types::{Type, TypeHandle};
use crate::value::{
    ArrayData, ArrayValue, HeapItemValue, MapValue, ObjectId, SliceValue, StructValue,
};
use num_bigint::BigInt;
use std::cell::RefCell;
use std::rc::Rc;

// Per-variant byte costs. These approximate the resident size of each
// shape; the exact constants are part of the metering contract and must not
// change silently between releases.
const ALLOC_SLICE: u64 = 40;
const ALLOC_POINTER: u64 = 40;
const ALLOC_ARRAY: u64 = 24;
const ALLOC_ARRAY_ITEM: u64 = 40;
const ALLOC_DATA_BYTE: u64 = 1;
const ALLOC_STRING: u64 = 16;
const ALLOC_STRING_BYTE: u64 = 1;
const ALLOC_MAP: u64 = 112;
const ALLOC_MAP_ITEM: u64 = 96;
const ALLOC_STRUCT: u64 = 48;
const ALLOC_STRUCT_FIELD: u64 = 40;
const ALLOC_HEAP_ITEM: u64 = 64;
const ALLOC_TYPE: u64 = 112;
const ALLOC_FOREIGN: u64 = 64;
const ALLOC_BIG_INT: u64 = 48;

#[derive(Debug)]
pub struct Allocator {
    limit: u64,
    bytes: u64,
    next_id: ObjectId,
}

impl Allocator {
    /// A metered allocator. `limit` is in bytes; 0 means unlimited.
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            bytes: 0,
            next_id: 1,
        }
    }

    pub fn unlimited() -> Self {
        Self::new(0)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    fn allocate(&mut self, size: u64) -> Result<(), RuntimeError> {
        if self.limit > 0 && self.bytes.saturating_add(size) > self.limit {
            return Err(RuntimeError::QuotaExceeded {
                requested: size,
                limit: self.limit,
            });
        }
        self.bytes += size;
        Ok(())
    }

    fn next_id(&mut self) -> ObjectId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Zero-initialised packed byte array.
    pub fn new_data_array(&mut self, n: usize) -> Result<Rc<RefCell<ArrayValue>>, RuntimeError> {
        self.allocate(ALLOC_ARRAY + n as u64 * ALLOC_DATA_BYTE)?;
        let id = self.next_id();
        Ok(Rc::new(RefCell::new(ArrayValue {
            id,
            data: ArrayData::Data(vec![0; n]),
        })))
    }

    /// Byte array seeded with the given contents.
    pub fn new_array_from_data(
        &mut self,
        bytes: Vec<u8>,
    ) -> Result<Rc<RefCell<ArrayValue>>, RuntimeError> {
        self.allocate(ALLOC_ARRAY + bytes.len() as u64 * ALLOC_DATA_BYTE)?;
        let id = self.next_id();
        Ok(Rc::new(RefCell::new(ArrayValue {
            id,
            data: ArrayData::Data(bytes),
        })))
    }

    /// Typed-zero-initialised list array (entries start undefined; callers
    /// fill in defaults per element type).
    pub fn new_list_array(&mut self, n: usize) -> Result<Rc<RefCell<ArrayValue>>, RuntimeError> {
        self.allocate(ALLOC_ARRAY + n as u64 * ALLOC_ARRAY_ITEM)?;
        let id = self.next_id();
        Ok(Rc::new(RefCell::new(ArrayValue {
            id,
            data: ArrayData::List(vec![TypedValue::default(); n]),
        })))
    }

    /// A slice over an already-resolved base.
    pub fn new_slice(
        &mut self,
        base: Rc<RefCell<ArrayValue>>,
        offset: usize,
        length: usize,
        maxcap: usize,
    ) -> Result<SliceValue, RuntimeError> {
        let base_len = base.borrow().len();
        if offset + length > maxcap || maxcap > base_len {
            return Err(RuntimeError::static_type(format!(
                "invalid slice bounds: offset {} length {} maxcap {} base {}",
                offset, length, maxcap, base_len
            )));
        }
        self.allocate(ALLOC_SLICE)?;
        Ok(crate::typed_value::slice_of(base, offset, length, maxcap))
    }

    pub fn new_map(&mut self, hint: usize) -> Result<Rc<RefCell<MapValue>>, RuntimeError> {
        self.allocate(ALLOC_MAP + hint as u64 * ALLOC_MAP_ITEM)?;
        let id = self.next_id();
        Ok(Rc::new(RefCell::new(MapValue::new(id, hint))))
    }

    pub fn new_string(&mut self, s: &str) -> Result<Rc<str>, RuntimeError> {
        self.allocate(ALLOC_STRING + s.len() as u64 * ALLOC_STRING_BYTE)?;
        Ok(Rc::from(s))
    }

    pub fn new_heap_item(
        &mut self,
        value: TypedValue,
    ) -> Result<Rc<RefCell<HeapItemValue>>, RuntimeError> {
        self.allocate(ALLOC_HEAP_ITEM)?;
        let id = self.next_id();
        Ok(Rc::new(RefCell::new(HeapItemValue { id, value })))
    }

    pub fn new_struct(
        &mut self,
        fields: Vec<TypedValue>,
    ) -> Result<Rc<RefCell<StructValue>>, RuntimeError> {
        self.allocate(ALLOC_STRUCT + fields.len() as u64 * ALLOC_STRUCT_FIELD)?;
        let id = self.next_id();
        Ok(Rc::new(RefCell::new(StructValue { id, fields })))
    }

    pub fn new_type(&mut self, t: Type) -> Result<TypeHandle, RuntimeError> {
        self.allocate(ALLOC_TYPE)?;
        Ok(Rc::new(t))
    }

    pub fn new_foreign(
        &mut self,
        obj: Rc<dyn ForeignObject>,
    ) -> Result<ForeignValue, RuntimeError> {
        self.allocate(ALLOC_FOREIGN)?;
        let id = self.next_id();
        Ok(ForeignValue { id, obj })
    }

    pub fn new_big_int(&mut self, n: BigInt) -> Result<Rc<BigInt>, RuntimeError> {
        self.allocate(ALLOC_BIG_INT)?;
        Ok(Rc::new(n))
    }

    /// Charge for a pointer without minting an object; `new` uses this for
    /// the pointer it returns.
    pub fn allocate_pointer(&mut self) -> Result<(), RuntimeError> {
        self.allocate(ALLOC_POINTER)
    }

    /// Opportunistic reclamation hook. Returns bytes reclaimed.
    pub fn gc(&mut self) -> u64 {
        0
    }

    pub fn mem_stats(&self) -> String {
        format!("Allocator{{limit:{}, bytes:{}}}", self.limit, self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::typed_value::typed_int;

    #[test]
    fn test_quota_exceeded() {
        let mut alloc = Allocator::new(64);
        // first small mint fits
        alloc.new_string("hi").unwrap();
        // a large array cannot
        let err = alloc.new_data_array(1024).unwrap_err();
        match err {
            RuntimeError::QuotaExceeded { limit, .. } => assert_eq!(limit, 64),
            other => panic!("expected quota error, got {:?}", other),
        }
    }

    #[test]
    fn test_unlimited_never_fails() {
        let mut alloc = Allocator::unlimited();
        alloc.new_data_array(1 << 20).unwrap();
        assert!(alloc.bytes() > (1u64 << 20));
    }

    #[test]
    fn test_object_ids_are_unique() {
        let mut alloc = Allocator::unlimited();
        let a = alloc.new_data_array(1).unwrap();
        let b = alloc.new_list_array(1).unwrap();
        let m = alloc.new_map(0).unwrap();
        assert_ne!(a.borrow().id, b.borrow().id);
        assert_ne!(b.borrow().id, m.borrow().id);
    }

    #[test]
    fn test_slice_bounds_validated() {
        let mut alloc = Allocator::unlimited();
        let base = alloc.new_data_array(4).unwrap();
        assert!(alloc.new_slice(base.clone(), 0, 4, 4).is_ok());
        assert!(alloc.new_slice(base.clone(), 2, 3, 4).is_err());
        assert!(alloc.new_slice(base, 0, 2, 8).is_err());
    }

    #[test]
    fn test_mem_stats_reports_budget() {
        let mut alloc = Allocator::new(4096);
        alloc.new_heap_item(typed_int(1)).unwrap();
        let stats = alloc.mem_stats();
        assert!(stats.contains("limit:4096"), "stats: {}", stats);
    }

    #[test]
    fn test_gc_is_opportunistic() {
        let mut alloc = Allocator::unlimited();
        assert_eq!(alloc.gc(), 0);
    }
}

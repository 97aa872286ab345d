//! Tern Core: the value model and resource contracts of the Tern VM
//!
//! This crate provides the machine-independent primitives shared by the
//! interpreter runtime and by embedders: how a typed value is represented,
//! how heap objects are minted against a byte budget, and the two
//! collaborator contracts the core consumes (store) and exposes upward
//! (realm updates).
//!
//! Key design principles:
//! - TypedValue: a (type handle, payload) pair; the payload is a tagged sum
//!   matched exhaustively by the built-in dispatcher
//! - Array duality: byte-element arrays are packed Data buffers, all others
//!   are List sequences of typed values
//! - Slices are three indices into a shared base they never own
//!
//! # Modules
//!
//! - `errors`: runtime error taxonomy (recoverable exceptions vs fatal)
//! - `types`: static types, kinds, and interned type handles
//! - `value`: payload variants and heap object shapes
//! - `typed_value`: accessors, zero values, unref-copy, the stringer
//! - `alloc`: byte-budget allocator and object identities
//! - `store`: resolution of bases, types, and packages from persistence
//! - `realm`: per-slot mutation events for the persistence layer
//! - `foreign`: the narrow host-value bridge

pub mod alloc;
pub mod errors;
pub mod foreign;
pub mod realm;
pub mod store;
pub mod typed_value;
pub mod types;
pub mod value;

// Re-export key types and functions
pub use alloc::Allocator;
pub use errors::RuntimeError;
pub use foreign::{ForeignObject, ForeignType, ForeignTypeOps, ForeignValue, MapBridge, MapBridgeType, VecBridge};
pub use realm::{ObjectRef, Realm, RecordingRealm, UpdateEvent};
pub use store::{MemStore, Store};
pub use typed_value::{
    TypedValue, default_typed_value, typed_bool, typed_int, typed_string, typed_type, typed_uint8,
};
pub use types::{
    DeclaredTypeId, FieldType, Kind, Location, Type, TypeHandle, base_of, bool_type,
    byte_slice_type, fld, int_type, primitive, string_type, uint8_type,
};
pub use value::{
    ArrayData, ArrayValue, BaseRef, Block, FuncValue, HeapItemValue, MapEntry, MapKey, MapValue,
    ObjectId, PackageNode, PackageValue, PointerBase, PointerValue, SliceValue, StructValue, Value,
};

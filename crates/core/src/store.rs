//! Store interface
//!
//! The store is an opaque collaborator owned by the embedding layer. The
//! core needs four deterministic operations from it: resolve a base
//! identity to its in-memory form, fetch a declared type, fetch a package,
//! and fetch a package's static node. Failures surface as `StoreFault` and
//! are never retried.
//!
//! `MemStore` is the in-memory implementation used by tests and by
//! embedders that do not page objects from persistence.

use crate::errors::RuntimeError;
use crate::realm::ObjectRef;
use crate::types::{DeclaredTypeId, Location, TypeHandle};
use crate::value::{ObjectId, PackageNode, PackageValue};
use std::collections::HashMap;
use std::rc::Rc;

pub trait Store {
    /// Turn a logical base identity into its in-memory value; may fault a
    /// page in from persistence.
    fn resolve_base(&self, id: ObjectId) -> Result<ObjectRef, RuntimeError>;

    fn get_type(&self, id: &DeclaredTypeId) -> Result<TypeHandle, RuntimeError>;

    fn get_package(&self, pkg_path: &str, lazy: bool) -> Result<Rc<PackageValue>, RuntimeError>;

    fn get_block_node(&self, loc: &Location) -> Result<Rc<PackageNode>, RuntimeError>;
}

#[derive(Debug, Default)]
pub struct MemStore {
    objects: HashMap<ObjectId, ObjectRef>,
    types: HashMap<DeclaredTypeId, TypeHandle>,
    packages: HashMap<String, Rc<PackageValue>>,
    nodes: HashMap<String, Rc<PackageNode>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_object(&mut self, id: ObjectId, obj: ObjectRef) {
        self.objects.insert(id, obj);
    }

    pub fn set_type(&mut self, id: DeclaredTypeId, t: TypeHandle) {
        self.types.insert(id, t);
    }

    pub fn set_package(&mut self, pkg: PackageValue) {
        self.packages.insert(pkg.pkg_path.clone(), Rc::new(pkg));
    }

    pub fn set_block_node(&mut self, node: PackageNode) {
        self.nodes.insert(node.pkg_path.clone(), Rc::new(node));
    }
}

impl Store for MemStore {
    fn resolve_base(&self, id: ObjectId) -> Result<ObjectRef, RuntimeError> {
        self.objects
            .get(&id)
            .cloned()
            .ok_or_else(|| RuntimeError::store_fault(format!("unknown object {}", id)))
    }

    fn get_type(&self, id: &DeclaredTypeId) -> Result<TypeHandle, RuntimeError> {
        self.types
            .get(id)
            .cloned()
            .ok_or_else(|| RuntimeError::store_fault(format!("unknown type {}", id)))
    }

    fn get_package(&self, pkg_path: &str, _lazy: bool) -> Result<Rc<PackageValue>, RuntimeError> {
        self.packages
            .get(pkg_path)
            .cloned()
            .ok_or_else(|| RuntimeError::store_fault(format!("unknown package {}", pkg_path)))
    }

    fn get_block_node(&self, loc: &Location) -> Result<Rc<PackageNode>, RuntimeError> {
        self.nodes
            .get(&loc.pkg_path)
            .cloned()
            .ok_or_else(|| RuntimeError::store_fault(format!("unknown package node {}", loc.pkg_path)))
    }
}

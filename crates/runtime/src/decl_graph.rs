//! Declaration dependency graph
//!
//! Used only during package predefinition. `DeclGraph` accumulates edges
//! between same-package declarations and `assert_acyclic` rejects cyclic
//! type declarations with the full cycle path in the error.
//!
//! The companion walker `Graph` descends a single declaration's body and
//! marks each reference direct or indirect. A pointer- or
//! interface-mediated reference breaks structural recursion, so any
//! indirect mark on the stack suppresses cycle reporting for that frame;
//! mutually recursive types are legal through a pointer.

use tern_core::errors::RuntimeError;
use tern_core::types::{Location, StructType, Type};
use tracing::trace;

#[derive(Debug, Clone)]
pub struct DeclNode {
    pub name: String,
    pub loc: Location,
    deps: Vec<usize>,
}

#[derive(Debug, Default)]
pub struct DeclGraph {
    nodes: Vec<DeclNode>,
}

impl DeclGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn find_or_push(&mut self, name: &str) -> usize {
        match self.nodes.iter().position(|n| n.name == name) {
            Some(i) => i,
            None => {
                self.nodes.push(DeclNode {
                    name: name.to_string(),
                    loc: Location::default(),
                    deps: Vec::new(),
                });
                self.nodes.len() - 1
            }
        }
    }

    /// Insert a declaration with its dependencies. Idempotent per name:
    /// repeat insertions update the location and append edges.
    pub fn insert<S: AsRef<str>>(&mut self, name: &str, loc: Location, deps: &[S]) {
        trace!(name, %loc, "insert decl node");
        let idx = self.find_or_push(name);
        self.nodes[idx].loc = loc;
        for dep in deps {
            let dep_idx = self.find_or_push(dep.as_ref());
            self.nodes[idx].deps.push(dep_idx);
        }
    }

    /// Depth-first search in insertion order; the first back edge found
    /// reports the cycle as the path from the back-edge target to the
    /// current node.
    pub fn assert_acyclic(&self) -> Result<(), RuntimeError> {
        let n = self.nodes.len();
        let mut visited = vec![false; n];
        let mut on_stack = vec![false; n];
        let mut path: Vec<usize> = Vec::new();

        for i in 0..n {
            if visited[i] {
                continue;
            }
            if let Some(cycle) = self.visit(i, &mut visited, &mut on_stack, &mut path) {
                let names: Vec<String> = cycle
                    .iter()
                    .map(|&c| format!("{}(File: {})", self.nodes[c].name, self.nodes[c].loc.file))
                    .collect();
                return Err(RuntimeError::CyclicDependency(format!(
                    "Cyclic dependency detected: {}",
                    names.join(" -> ")
                )));
            }
        }
        Ok(())
    }

    fn visit(
        &self,
        i: usize,
        visited: &mut [bool],
        on_stack: &mut [bool],
        path: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        visited[i] = true;
        on_stack[i] = true;
        path.push(i);

        for &d in &self.nodes[i].deps {
            if on_stack[d] {
                let start = path.iter().position(|&x| x == d).unwrap();
                let mut cycle = path[start..].to_vec();
                cycle.push(d);
                return Some(cycle);
            }
            if !visited[d] {
                if let Some(c) = self.visit(d, visited, on_stack, path) {
                    return Some(c);
                }
            }
        }

        on_stack[i] = false;
        path.pop();
        None
    }
}

/// Collect the names a field type references within the given package.
/// Cross-package declarations are not edges; array element types are
/// descended.
pub fn same_package_refs(pkg_path: &str, t: &Type, names: &mut Vec<String>) -> bool {
    match t {
        Type::Declared(dt) => {
            if dt.pkg_path == pkg_path {
                names.push(dt.name.clone());
                return true;
            }
            false
        }
        Type::Array(at) => same_package_refs(pkg_path, &at.elt, names),
        _ => false,
    }
}

/// Dependencies of one struct declaration, ready for `DeclGraph::insert`.
pub fn struct_decl_deps(pkg_path: &str, st: &StructType) -> Vec<String> {
    let mut names = Vec::new();
    for f in &st.fields {
        same_package_refs(pkg_path, &f.typ, &mut names);
    }
    names
}

#[derive(Debug, Clone)]
struct Element {
    name: String,
    indirect: bool,
}

/// Stack of references walked while descending one declaration's body.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Element>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: &str, indirect: bool) {
        trace!(name, indirect, "push dep node");
        self.nodes.push(Element {
            name: name.to_string(),
            indirect,
        });
    }

    pub fn pop_node(&mut self) {
        trace!("pop dep node");
        self.nodes.pop();
    }

    /// A name on the stack is a cycle only if no stacked reference is
    /// indirect.
    pub fn check_cycle(&self, name: &str) -> bool {
        if self.nodes.iter().any(|n| n.indirect) {
            return false;
        }
        self.nodes.iter().any(|n| n.name == name)
    }
}

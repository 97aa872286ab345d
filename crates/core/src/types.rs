//! Static types and type handles
//!
//! A `TypeHandle` is a shared, immutable `Rc<Type>`. Declared types carry a
//! package path; two declared types with equal names but different paths are
//! distinct. `base_of` unwraps declared types to their underlying shape,
//! which is what the built-in dispatcher switches on.

use crate::foreign::{ForeignType, ForeignTypeOps as _};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

pub type TypeHandle = Rc<Type>;

/// The shape classification used by the dispatcher's case analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    BigInt,
    String,
    Array,
    Slice,
    Map,
    Pointer,
    Struct,
    Func,
    Interface,
    Chan,
    Type,
    Package,
    Heap,
    Foreign,
}

/// A named field or parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldType {
    pub name: String,
    pub typ: TypeHandle,
}

pub fn fld(name: &str, typ: TypeHandle) -> FieldType {
    FieldType {
        name: name.to_string(),
        typ,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayType {
    pub elt: TypeHandle,
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SliceType {
    pub elt: TypeHandle,
    /// Variadic marker: the slice was formed by collecting variadic args.
    pub vrd: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapType {
    pub key: TypeHandle,
    pub value: TypeHandle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PointerType {
    pub elt: TypeHandle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    pub fields: Vec<FieldType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncType {
    pub params: Vec<FieldType>,
    pub results: Vec<FieldType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceType {
    pub pkg_path: String,
    pub methods: Vec<FieldType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChanType {
    pub elt: TypeHandle,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredType {
    pub pkg_path: String,
    pub name: String,
    pub base: TypeHandle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// Scalar, string, and big-int kinds only.
    Primitive(Kind),
    Array(ArrayType),
    Slice(SliceType),
    Map(MapType),
    Pointer(PointerType),
    Struct(StructType),
    Func(FuncType),
    Interface(InterfaceType),
    Chan(ChanType),
    Declared(DeclaredType),
    Foreign(ForeignType),
    /// The type of first-class type values.
    Meta,
    Package,
}

impl Type {
    pub fn kind(&self) -> Kind {
        match self {
            Type::Primitive(k) => *k,
            Type::Array(_) => Kind::Array,
            Type::Slice(_) => Kind::Slice,
            Type::Map(_) => Kind::Map,
            Type::Pointer(_) => Kind::Pointer,
            Type::Struct(_) => Kind::Struct,
            Type::Func(_) => Kind::Func,
            Type::Interface(_) => Kind::Interface,
            Type::Chan(_) => Kind::Chan,
            Type::Declared(dt) => dt.base.kind(),
            Type::Foreign(ft) => ft.ops.kind(),
            Type::Meta => Kind::Type,
            Type::Package => Kind::Package,
        }
    }

    /// Element type for arrays, slices, pointers, and channels.
    pub fn elem(&self) -> Option<TypeHandle> {
        match self {
            Type::Array(at) => Some(at.elt.clone()),
            Type::Slice(st) => Some(st.elt.clone()),
            Type::Pointer(pt) => Some(pt.elt.clone()),
            Type::Chan(ct) => Some(ct.elt.clone()),
            Type::Declared(dt) => dt.base.elem(),
            _ => None,
        }
    }
}

/// Unwrap declared types to the underlying shape.
pub fn base_of(t: &TypeHandle) -> TypeHandle {
    match &**t {
        Type::Declared(dt) => base_of(&dt.base),
        _ => t.clone(),
    }
}

/// Shared handle for a primitive kind. Handles are interned per thread so
/// repeated lookups do not allocate.
pub fn primitive(kind: Kind) -> TypeHandle {
    thread_local! {
        static CACHE: RefCell<HashMap<Kind, TypeHandle>> = RefCell::new(HashMap::new());
    }
    CACHE.with(|c| {
        c.borrow_mut()
            .entry(kind)
            .or_insert_with(|| Rc::new(Type::Primitive(kind)))
            .clone()
    })
}

pub fn bool_type() -> TypeHandle {
    primitive(Kind::Bool)
}

pub fn int_type() -> TypeHandle {
    primitive(Kind::Int)
}

pub fn uint8_type() -> TypeHandle {
    primitive(Kind::Uint8)
}

pub fn string_type() -> TypeHandle {
    primitive(Kind::String)
}

/// `[]byte` as produced by the string-source conversion in `append`.
pub fn byte_slice_type(vrd: bool) -> TypeHandle {
    Rc::new(Type::Slice(SliceType {
        elt: uint8_type(),
        vrd,
    }))
}

/// Identity of a declared type in the store: package path + name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeclaredTypeId {
    pub pkg_path: String,
    pub name: String,
}

impl DeclaredTypeId {
    pub fn new(pkg_path: &str, name: &str) -> Self {
        Self {
            pkg_path: pkg_path.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for DeclaredTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.pkg_path, self.name)
    }
}

/// Source location of a declaration, used by the predefinition cycle report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location {
    pub pkg_path: String,
    pub file: String,
    pub line: u32,
}

impl Location {
    pub fn new(pkg_path: &str, file: &str, line: u32) -> Self {
        Self {
            pkg_path: pkg_path.to_string(),
            file: file.to_string(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

fn primitive_name(kind: Kind) -> &'static str {
    match kind {
        Kind::Bool => "bool",
        Kind::Int => "int",
        Kind::Int8 => "int8",
        Kind::Int16 => "int16",
        Kind::Int32 => "int32",
        Kind::Int64 => "int64",
        Kind::Uint => "uint",
        Kind::Uint8 => "uint8",
        Kind::Uint16 => "uint16",
        Kind::Uint32 => "uint32",
        Kind::Uint64 => "uint64",
        Kind::Float32 => "float32",
        Kind::Float64 => "float64",
        Kind::BigInt => "bigint",
        Kind::String => "string",
        _ => "<non-primitive>",
    }
}

// Spelled out rather than derived so error messages read like source syntax
// ("[]byte", "map[string]int", "*T").
impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Primitive(k) => write!(f, "{}", primitive_name(*k)),
            Type::Array(at) => write!(f, "[{}]{}", at.len, at.elt),
            Type::Slice(st) => write!(f, "[]{}", st.elt),
            Type::Map(mt) => write!(f, "map[{}]{}", mt.key, mt.value),
            Type::Pointer(pt) => write!(f, "*{}", pt.elt),
            Type::Struct(st) => {
                write!(f, "struct{{")?;
                for (i, fldt) in st.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{} {}", fldt.name, fldt.typ)?;
                }
                write!(f, "}}")
            }
            Type::Func(ft) => {
                write!(f, "func(")?;
                for (i, p) in ft.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p.typ)?;
                }
                write!(f, ")")?;
                match ft.results.len() {
                    0 => Ok(()),
                    1 => write!(f, " {}", ft.results[0].typ),
                    _ => {
                        write!(f, " (")?;
                        for (i, r) in ft.results.iter().enumerate() {
                            if i > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{}", r.typ)?;
                        }
                        write!(f, ")")
                    }
                }
            }
            Type::Interface(it) => {
                if it.methods.is_empty() {
                    write!(f, "interface{{}}")
                } else {
                    write!(f, "interface{{...}}")
                }
            }
            Type::Chan(ct) => write!(f, "chan {}", ct.elt),
            Type::Declared(dt) => write!(f, "{}.{}", dt.pkg_path, dt.name),
            Type::Foreign(_) => write!(f, "<foreign>"),
            Type::Meta => write!(f, "typeval"),
            Type::Package => write!(f, "package"),
        }
    }
}

//! Tern Runtime: universe, built-in dispatcher, and machine ABI
//!
//! The bytecode interpreter invokes a built-in through the universe, which
//! selects a handler here; handlers read operands from the machine's
//! parameter area, call into `tern-core`, and push results onto the value
//! stack.
//!
//! Key design principles:
//! - The universe initialises once per interpreter thread with a
//!   three-state protocol; re-entrant requests get an empty placeholder
//! - Built-in handlers are plain `fn(&mut Machine) -> Result<(), _>`;
//!   recoverable failures become machine panics, everything else fails the
//!   step
//! - Mutations through shared bases report per-slot realm events before
//!   any result is pushed

pub mod address;
pub mod decl_graph;
pub mod io;
pub mod machine;
pub mod make_ops;
pub mod map_ops;
pub mod names;
pub mod serialize;
pub mod slice_ops;
pub mod universe;

// Re-export key types and functions
pub use machine::{Exception, Frame, Machine, MachineBuilder, NativeFn, SharedBuffer};
pub use universe::{UNIVERSE_PKG_PATH, builtin, error_type, stringer_type, universe, universe_node};

// Built-in handlers (one entry point per universe-registered function)
pub use io::{builtin_print, builtin_println};
pub use make_ops::{builtin_make, builtin_new};
pub use map_ops::builtin_delete;
pub use slice_ops::{builtin_append, builtin_copy};
pub use universe::{builtin_cap, builtin_len, builtin_recover};

// Declaration graph (package predefinition)
pub use decl_graph::{DeclGraph, DeclNode, Graph, same_package_refs, struct_decl_deps};

// Addresses
pub use address::{ADDRESS_SIZE, Address, decode_bech32, derive_pkg_addr, encode_bech32};

// Reserved names
pub use names::{RESERVED_NAMES, default_pkg_name, is_reserved_name, is_universe_name};

// Value exchange
pub use serialize::{WireError, WireKey, WireValue};

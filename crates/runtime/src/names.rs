//! Reserved and universe names
//!
//! The 25 keywords can never be rebound; predefinition rejects the
//! attempt. Universe names are scanned from the universe node's block, so
//! shadowing checks stay in sync with whatever the universe defines.

use crate::universe::universe_node;

/// The language keywords. Rebinding any of these is a predefinition error.
pub const RESERVED_NAMES: [&str; 25] = [
    "break",
    "case",
    "chan",
    "const",
    "continue",
    "default",
    "defer",
    "else",
    "fallthrough",
    "for",
    "func",
    "go",
    "goto",
    "if",
    "import",
    "interface",
    "map",
    "package",
    "range",
    "return",
    "select",
    "struct",
    "switch",
    "type",
    "var",
];

/// If true, the caller should reject the binding.
pub fn is_reserved_name(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Scans the universe node for block names. (Slow; predefinition only.)
pub fn is_universe_name(name: &str) -> bool {
    universe_node()
        .block_names()
        .iter()
        .any(|n| n == name)
}

/// The default package name for a path: the last path segment, after its
/// last dash, lowercased.
pub fn default_pkg_name(pkg_path: &str) -> String {
    let last = pkg_path.rsplit('/').next().unwrap_or(pkg_path);
    let name = last.rsplit('-').next().unwrap_or(last);
    name.to_lowercase()
}

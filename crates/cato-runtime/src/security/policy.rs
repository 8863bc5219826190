//! Capability policy: importable modules and per-type attribute allow-lists
//!
//! Attribute access never reflects over host objects. A name resolves only
//! if it appears in the allow-list for the receiver's type.

use crate::value::{ModuleKind, Value};

/// Modules a script may import
pub const ALLOWED_MODULES: &[(&str, ModuleKind)] =
    &[("json", ModuleKind::Json), ("hashlib", ModuleKind::Hashlib)];

/// Host facilities that are deliberately left unbound
pub const UNBOUND_NAMES: &[&str] = &[
    "open",
    "eval",
    "exec",
    "compile",
    "__import__",
    "getattr",
    "setattr",
    "delattr",
    "globals",
    "locals",
    "vars",
    "dir",
    "type",
    "input",
    "exit",
    "quit",
    "breakpoint",
    "help",
    "memoryview",
    "object",
];

const STR_METHODS: &[&str] = &[
    "strip",
    "lstrip",
    "rstrip",
    "lower",
    "upper",
    "split",
    "join",
    "replace",
    "startswith",
    "endswith",
    "find",
    "count",
    "isdigit",
    "isalpha",
    "capitalize",
    "title",
    "encode",
    "format",
];

const BYTES_METHODS: &[&str] = &["decode", "hex"];

const LIST_METHODS: &[&str] = &[
    "append", "extend", "pop", "insert", "remove", "index", "count", "reverse", "sort", "copy",
    "clear",
];

const TUPLE_METHODS: &[&str] = &["index", "count"];

const DICT_METHODS: &[&str] = &[
    "get",
    "keys",
    "values",
    "items",
    "pop",
    "update",
    "setdefault",
    "copy",
    "clear",
];

const HASH_METHODS: &[&str] = &["update", "hexdigest", "digest", "copy"];

const DB_METHODS: &[&str] = &["get", "set"];

const EXCEPTION_ATTRIBUTES: &[&str] = &["args"];

/// Functions exported by an allow-listed module
pub const JSON_EXPORTS: &[&str] = &["loads", "dumps"];
pub const HASHLIB_EXPORTS: &[&str] = &["sha256", "sha224", "sha384", "sha512"];

/// Resolve an import against the allow-list
pub fn allowed_module(name: &str) -> Option<ModuleKind> {
    ALLOWED_MODULES
        .iter()
        .find(|(allowed, _)| *allowed == name)
        .map(|(_, kind)| *kind)
}

/// Names starting with `_` are never resolved
pub fn is_private(name: &str) -> bool {
    name.starts_with('_')
}

/// Allow-listed attribute name for `receiver`, as a static string
pub fn allowed_attribute(receiver: &Value, name: &str) -> Option<&'static str> {
    if is_private(name) {
        return None;
    }
    let allowed = match receiver {
        Value::Str(_) => STR_METHODS,
        Value::Bytes(_) => BYTES_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Tuple(_) => TUPLE_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Hash(_) => HASH_METHODS,
        Value::Db => DB_METHODS,
        Value::Exception(_) => EXCEPTION_ATTRIBUTES,
        Value::Module(ModuleKind::Json) => JSON_EXPORTS,
        Value::Module(ModuleKind::Hashlib) => HASHLIB_EXPORTS,
        _ => return None,
    };
    allowed.iter().copied().find(|allowed| *allowed == name)
}

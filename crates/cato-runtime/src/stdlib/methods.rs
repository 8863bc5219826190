//! Methods on builtin types and the `db` handle
//!
//! Only names allow-listed in [`crate::security::policy`] ever reach this
//! module. Mutating methods snapshot their receiver before running any
//! script-visible comparison, so a `RefCell` is never borrowed across a
//! call back into the interpreter.

use crate::interpreter::Interpreter;
use crate::stdlib::format::str_format;
use crate::stdlib::hashlib::{hashable_bytes, HashState};
use crate::stdlib::{expect_int, expect_str, CallArgs};
use crate::value::{
    values_equal, Dict, DictRef, ExceptionKind, Items, ListRef, RuntimeError, Value,
};
use std::cell::RefCell;
use std::rc::Rc;

fn read_only() -> RuntimeError {
    RuntimeError::type_error("'request' object is read-only")
}

impl Interpreter {
    /// Call the allow-listed method `name` on `receiver`
    pub(crate) fn call_method(
        &mut self,
        receiver: &Value,
        name: &'static str,
        args: CallArgs,
    ) -> Result<Value, RuntimeError> {
        match receiver {
            Value::Str(s) => self.str_method(s, name, args),
            Value::Bytes(b) => self.bytes_method(b, name, args),
            Value::List(list) => self.list_method(list, name, args),
            Value::Tuple(items) => self.tuple_method(items, name, args),
            Value::Dict(dict) => self.dict_method(dict, name, args),
            Value::Hash(state) => self.hash_method(state, name, args),
            Value::Db => self.db_method(name, args),
            other => Err(RuntimeError::attribute_error(format!(
                "'{}' object has no attribute '{}'",
                other.type_name(),
                name
            ))),
        }
    }

    // === str ===

    fn str_method(&mut self, s: &str, name: &'static str, mut args: CallArgs) -> Result<Value, RuntimeError> {
        let qualified = format!("str.{}", name);
        match name {
            "strip" | "lstrip" | "rstrip" => {
                args.exact(&qualified, 0, 1)?;
                let chars: Option<Vec<char>> = match args.args.first() {
                    None | Some(Value::None) => None,
                    Some(chars) => Some(expect_str(chars, "strip arg")?.chars().collect()),
                };
                let matches = |c: char| match &chars {
                    Some(set) => set.contains(&c),
                    None => c.is_whitespace(),
                };
                let stripped = match name {
                    "strip" => s.trim_matches(matches),
                    "lstrip" => s.trim_start_matches(matches),
                    _ => s.trim_end_matches(matches),
                };
                Ok(Value::str(stripped))
            }
            "lower" => {
                args.exact(&qualified, 0, 0)?;
                self.new_str(s.to_lowercase())
            }
            "upper" => {
                args.exact(&qualified, 0, 0)?;
                self.new_str(s.to_uppercase())
            }
            "capitalize" => {
                args.exact(&qualified, 0, 0)?;
                let mut chars = s.chars();
                let text = match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                    None => String::new(),
                };
                self.new_str(text)
            }
            "title" => {
                args.exact(&qualified, 0, 0)?;
                let mut text = String::with_capacity(s.len());
                let mut previous_cased = false;
                for c in s.chars() {
                    if previous_cased {
                        text.extend(c.to_lowercase());
                    } else {
                        text.extend(c.to_uppercase());
                    }
                    previous_cased = c.is_alphabetic();
                }
                self.new_str(text)
            }
            "isdigit" => {
                args.exact(&qualified, 0, 0)?;
                Ok(Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())))
            }
            "isalpha" => {
                args.exact(&qualified, 0, 0)?;
                Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic)))
            }
            "split" => {
                let sep = args.keyword("sep");
                let maxsplit = args.keyword("maxsplit");
                args.exact(&qualified, 0, 2)?;
                let sep = sep.or_else(|| args.args.first().cloned());
                let maxsplit = match maxsplit.or_else(|| args.args.get(1).cloned()) {
                    Some(n) => expect_int(&n, "")?,
                    None => -1,
                };
                let parts = match &sep {
                    None | Some(Value::None) => split_whitespace(s, maxsplit),
                    Some(sep) => {
                        let sep = expect_str(sep, "must be str or None")?;
                        if sep.is_empty() {
                            return Err(RuntimeError::value_error("empty separator"));
                        }
                        if maxsplit < 0 {
                            s.split(sep).collect()
                        } else {
                            s.splitn(maxsplit.saturating_add(1) as usize, sep).collect()
                        }
                    }
                };
                let parts = parts.into_iter().map(Value::str).collect();
                self.new_list(parts)
            }
            "join" => {
                args.exact(&qualified, 1, 1)?;
                let items = self.collect_values(&args.args[0])?;
                let mut pieces = Vec::with_capacity(items.len());
                let mut total = 0usize;
                for (i, item) in items.iter().enumerate() {
                    let Value::Str(piece) = item else {
                        return Err(RuntimeError::type_error(format!(
                            "sequence item {}: expected str instance, {} found",
                            i,
                            item.type_name()
                        )));
                    };
                    total = total.saturating_add(piece.len()).saturating_add(s.len());
                    pieces.push(&**piece);
                }
                self.budget.check_string(total)?;
                self.new_str(pieces.join(s))
            }
            "replace" => {
                args.exact(&qualified, 2, 3)?;
                let old = expect_str(&args.args[0], "replace() argument 1")?;
                let new = expect_str(&args.args[1], "replace() argument 2")?;
                let count = match args.args.get(2) {
                    Some(n) => expect_int(n, "")?,
                    None => -1,
                };
                let occurrences = if old.is_empty() {
                    s.chars().count() + 1
                } else {
                    s.matches(old).count()
                };
                let replaced = if count < 0 {
                    occurrences
                } else {
                    occurrences.min(count as usize)
                };
                let projected = s.len().saturating_add(replaced.saturating_mul(new.len()));
                self.budget.check_string(projected)?;
                let text = if count < 0 {
                    s.replace(old, new)
                } else {
                    s.replacen(old, new, count as usize)
                };
                self.new_str(text)
            }
            "startswith" | "endswith" => {
                args.exact(&qualified, 1, 1)?;
                let candidates = match &args.args[0] {
                    Value::Tuple(items) => items.to_vec(),
                    single => vec![single.clone()],
                };
                for candidate in &candidates {
                    let affix = candidate.as_str().ok_or_else(|| {
                        RuntimeError::type_error(format!(
                            "{} first arg must be str or a tuple of str, not {}",
                            name,
                            candidate.type_name()
                        ))
                    })?;
                    let hit = if name == "startswith" {
                        s.starts_with(affix)
                    } else {
                        s.ends_with(affix)
                    };
                    if hit {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            "find" => {
                args.exact(&qualified, 1, 1)?;
                let needle = expect_str(&args.args[0], "must be str")?;
                let index = s
                    .find(needle)
                    .map(|byte| s[..byte].chars().count() as i64)
                    .unwrap_or(-1);
                Ok(Value::Int(index))
            }
            "count" => {
                args.exact(&qualified, 1, 1)?;
                let needle = expect_str(&args.args[0], "must be str")?;
                let count = if needle.is_empty() {
                    s.chars().count() + 1
                } else {
                    s.matches(needle).count()
                };
                Ok(Value::Int(count as i64))
            }
            "encode" => {
                let encoding = args.keyword("encoding");
                let errors = args.keyword("errors");
                args.exact(&qualified, 0, 2)?;
                let encoding = encoding.or_else(|| args.args.first().cloned());
                let errors = errors.or_else(|| args.args.get(1).cloned());
                let encoding = match &encoding {
                    Some(e) => expect_str(e, "encode() argument 'encoding'")?,
                    None => "utf-8",
                };
                let errors = match &errors {
                    Some(e) => expect_str(e, "encode() argument 'errors'")?,
                    None => "strict",
                };
                let bytes = encode_str(s, encoding, errors)?;
                self.new_bytes(bytes)
            }
            "format" => {
                let CallArgs { args, kwargs } = args;
                let text = str_format(s, &args, &kwargs)?;
                self.new_str(text)
            }
            _ => Err(no_method("str", name)),
        }
    }

    // === bytes ===

    fn bytes_method(&mut self, bytes: &[u8], name: &'static str, mut args: CallArgs) -> Result<Value, RuntimeError> {
        match name {
            "decode" => {
                let encoding = args.keyword("encoding");
                let errors = args.keyword("errors");
                args.exact("bytes.decode", 0, 2)?;
                let encoding = encoding.or_else(|| args.args.first().cloned());
                let errors = errors.or_else(|| args.args.get(1).cloned());
                let encoding = match &encoding {
                    Some(e) => expect_str(e, "decode() argument 'encoding'")?,
                    None => "utf-8",
                };
                let errors = match &errors {
                    Some(e) => expect_str(e, "decode() argument 'errors'")?,
                    None => "strict",
                };
                let text = decode_bytes(bytes, encoding, errors)?;
                self.new_str(text)
            }
            "hex" => {
                args.exact("bytes.hex", 0, 0)?;
                self.new_str(hex::encode(bytes))
            }
            _ => Err(no_method("bytes", name)),
        }
    }

    // === list ===

    fn list_method(&mut self, list: &ListRef, name: &'static str, mut args: CallArgs) -> Result<Value, RuntimeError> {
        let qualified = format!("list.{}", name);
        match name {
            "append" => {
                args.exact(&qualified, 1, 1)?;
                let len = list.borrow().len();
                self.budget.check_collection(len + 1)?;
                self.budget.allocate_slots(1)?;
                let item = args.args.swap_remove(0);
                list.borrow_mut().push(item);
                Ok(Value::None)
            }
            "extend" => {
                args.exact(&qualified, 1, 1)?;
                let extra = self.collect_values(&args.args[0])?;
                let len = list.borrow().len();
                self.budget.check_collection(len + extra.len())?;
                self.budget.allocate_slots(extra.len())?;
                list.borrow_mut().extend(extra);
                Ok(Value::None)
            }
            "insert" => {
                args.exact(&qualified, 2, 2)?;
                let index = expect_int(&args.args[0], "")?;
                let len = list.borrow().len();
                self.budget.check_collection(len + 1)?;
                self.budget.allocate_slots(1)?;
                let at = if index < 0 {
                    (len as i64 + index).max(0) as usize
                } else {
                    (index as usize).min(len)
                };
                let item = args.args.swap_remove(1);
                list.borrow_mut().insert(at, item);
                Ok(Value::None)
            }
            "pop" => {
                args.exact(&qualified, 0, 1)?;
                let index = match args.args.first() {
                    Some(index) => expect_int(index, "")?,
                    None => -1,
                };
                let len = list.borrow().len();
                if len == 0 {
                    return Err(RuntimeError::index_error("pop from empty list"));
                }
                let at = if index < 0 { len as i64 + index } else { index };
                if at < 0 || at >= len as i64 {
                    return Err(RuntimeError::index_error("pop index out of range"));
                }
                Ok(list.borrow_mut().remove(at as usize))
            }
            "remove" => {
                args.exact(&qualified, 1, 1)?;
                let snapshot = list.borrow().0.clone();
                let position = self.position(&snapshot, &args.args[0])?;
                let Some(at) = position else {
                    return Err(RuntimeError::value_error("list.remove(x): x not in list"));
                };
                let mut items = list.borrow_mut();
                if at < items.len() {
                    items.remove(at);
                }
                Ok(Value::None)
            }
            "index" => {
                args.exact(&qualified, 1, 1)?;
                let snapshot = list.borrow().0.clone();
                match self.position(&snapshot, &args.args[0])? {
                    Some(at) => Ok(Value::Int(at as i64)),
                    None => Err(RuntimeError::value_error(format!(
                        "{} is not in list",
                        args.args[0].repr()?
                    ))),
                }
            }
            "count" => {
                args.exact(&qualified, 1, 1)?;
                let snapshot = list.borrow().0.clone();
                self.count(&snapshot, &args.args[0])
            }
            "reverse" => {
                args.exact(&qualified, 0, 0)?;
                list.borrow_mut().reverse();
                Ok(Value::None)
            }
            "sort" => {
                let key = args.keyword("key");
                let reverse = args.keyword("reverse");
                args.exact(&qualified, 0, 0)?;
                let snapshot = list.borrow().0.clone();
                let reverse = reverse.is_some_and(|r| r.is_truthy());
                let sorted = self.sort_values(snapshot, key, reverse)?;
                // Swap out first so the old items drop outside the borrow
                let old = std::mem::replace(&mut *list.borrow_mut(), Items(sorted));
                drop(old);
                Ok(Value::None)
            }
            "copy" => {
                args.exact(&qualified, 0, 0)?;
                let items = list.borrow().0.clone();
                self.new_list(items)
            }
            "clear" => {
                args.exact(&qualified, 0, 0)?;
                let old = std::mem::take(&mut list.borrow_mut().0);
                drop(Items(old));
                Ok(Value::None)
            }
            _ => Err(no_method("list", name)),
        }
    }

    // === tuple ===

    fn tuple_method(&mut self, items: &Items, name: &'static str, args: CallArgs) -> Result<Value, RuntimeError> {
        match name {
            "index" => {
                args.exact("tuple.index", 1, 1)?;
                match self.position(items, &args.args[0])? {
                    Some(at) => Ok(Value::Int(at as i64)),
                    None => Err(RuntimeError::value_error("tuple.index(x): x not in tuple")),
                }
            }
            "count" => {
                args.exact("tuple.count", 1, 1)?;
                self.count(items, &args.args[0])
            }
            _ => Err(no_method("tuple", name)),
        }
    }

    fn position(&mut self, items: &[Value], needle: &Value) -> Result<Option<usize>, RuntimeError> {
        for (i, item) in items.iter().enumerate() {
            self.budget.tick()?;
            if values_equal(item, needle)? {
                return Ok(Some(i));
            }
        }
        Ok(None)
    }

    fn count(&mut self, items: &[Value], needle: &Value) -> Result<Value, RuntimeError> {
        let mut count = 0i64;
        for item in items {
            self.budget.tick()?;
            if values_equal(item, needle)? {
                count += 1;
            }
        }
        Ok(Value::Int(count))
    }

    // === dict ===

    fn dict_method(&mut self, dict: &DictRef, name: &'static str, mut args: CallArgs) -> Result<Value, RuntimeError> {
        let qualified = format!("dict.{}", name);
        let frozen = dict.borrow().is_frozen();
        match name {
            "get" => {
                let default = args.arg_or_keyword(1, "default");
                args.exact(&qualified, 1, 2)?;
                let found = dict.borrow().get(&args.args[0])?;
                Ok(found.or(default).unwrap_or(Value::None))
            }
            "keys" => {
                args.exact(&qualified, 0, 0)?;
                let keys = dict.borrow().keys();
                self.new_list(keys)
            }
            "values" => {
                args.exact(&qualified, 0, 0)?;
                let values = dict.borrow().values();
                self.new_list(values)
            }
            "items" => {
                args.exact(&qualified, 0, 0)?;
                let entries = dict.borrow().entries();
                let items = entries
                    .into_iter()
                    .map(|(k, v)| Value::tuple(vec![k, v]))
                    .collect();
                self.new_list(items)
            }
            "copy" => {
                args.exact(&qualified, 0, 0)?;
                let entries = dict.borrow().entries();
                self.budget.check_collection(entries.len())?;
                self.budget.allocate_entries(entries.len())?;
                let mut copy = Dict::new();
                for (key, value) in entries {
                    copy.insert(key, value)?;
                }
                Ok(Value::dict(copy))
            }
            "pop" => {
                args.exact(&qualified, 1, 2)?;
                if frozen {
                    return Err(read_only());
                }
                let removed = dict.borrow_mut().remove(&args.args[0])?;
                match (removed, args.args.get(1)) {
                    (Some(value), _) => Ok(value),
                    (None, Some(default)) => Ok(default.clone()),
                    (None, None) => Err(RuntimeError::key_error(args.args[0].clone())),
                }
            }
            "setdefault" => {
                args.exact(&qualified, 1, 2)?;
                if frozen {
                    return Err(read_only());
                }
                let existing = dict.borrow().get(&args.args[0])?;
                if let Some(value) = existing {
                    return Ok(value);
                }
                let default = args.args.get(1).cloned().unwrap_or(Value::None);
                let len = dict.borrow().len();
                self.budget.check_collection(len + 1)?;
                self.budget.allocate_entries(1)?;
                dict.borrow_mut().insert(args.args[0].clone(), default.clone())?;
                Ok(default)
            }
            "update" => {
                args.arity(&qualified, 0, 1)?;
                if frozen {
                    return Err(read_only());
                }
                let mut pairs = match args.args.first() {
                    Some(source) => self.dict_pairs(source)?,
                    None => Vec::new(),
                };
                pairs.extend(args.kwargs.into_iter().map(|(k, v)| (Value::str(k), v)));
                let len = dict.borrow().len();
                self.budget.check_collection(len + pairs.len())?;
                self.budget.allocate_entries(pairs.len())?;
                let mut target = dict.borrow_mut();
                for (key, value) in pairs {
                    target.insert(key, value)?;
                }
                Ok(Value::None)
            }
            "clear" => {
                args.exact(&qualified, 0, 0)?;
                if frozen {
                    return Err(read_only());
                }
                let mut old = std::mem::take(&mut *dict.borrow_mut());
                old.clear();
                Ok(Value::None)
            }
            _ => Err(no_method("dict", name)),
        }
    }

    // === hashlib objects ===

    fn hash_method(
        &mut self,
        state: &Rc<RefCell<HashState>>,
        name: &'static str,
        args: CallArgs,
    ) -> Result<Value, RuntimeError> {
        match name {
            "update" => {
                args.exact("update", 1, 1)?;
                let data = hashable_bytes(&args.args[0])?;
                self.budget.charge((data.len() / 64) as u64)?;
                state.borrow_mut().update(&data);
                Ok(Value::None)
            }
            "hexdigest" => {
                args.exact("hexdigest", 0, 0)?;
                Ok(Value::str(state.borrow().hexdigest()))
            }
            "digest" => {
                args.exact("digest", 0, 0)?;
                Ok(Value::Bytes(state.borrow().digest().into()))
            }
            "copy" => {
                args.exact("copy", 0, 0)?;
                let copy = state.borrow().clone();
                Ok(Value::Hash(Rc::new(RefCell::new(copy))))
            }
            _ => Err(no_method("HASH", name)),
        }
    }

    // === db ===

    fn db_method(&mut self, name: &'static str, mut args: CallArgs) -> Result<Value, RuntimeError> {
        match name {
            "get" => {
                let default = args.arg_or_keyword(1, "default");
                args.exact("get", 1, 2)?;
                let key = db_string(&args.args[0], "key")?;
                let stored = self
                    .kv
                    .get(key)
                    .map_err(|err| RuntimeError::Storage(err.to_string()))?;
                tracing::trace!(key, hit = stored.is_some(), "db.get");
                match stored {
                    Some(value) => Ok(Value::str(value)),
                    None => Ok(default.unwrap_or(Value::None)),
                }
            }
            "set" => {
                args.exact("set", 2, 2)?;
                let key = db_string(&args.args[0], "key")?;
                let value = db_string(&args.args[1], "value")?;
                self.kv
                    .set(key, value)
                    .map_err(|err| RuntimeError::Storage(err.to_string()))?;
                tracing::trace!(key, bytes = value.len(), "db.set");
                Ok(Value::None)
            }
            _ => Err(no_method("db", name)),
        }
    }
}

fn db_string<'a>(value: &'a Value, what: &str) -> Result<&'a str, RuntimeError> {
    value.as_str().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "db {} must be str, not {}",
            what,
            value.type_name()
        ))
    })
}

fn no_method(type_name: &str, name: &str) -> RuntimeError {
    RuntimeError::attribute_error(format!(
        "'{}' object has no attribute '{}'",
        type_name, name
    ))
}

/// `str.split()` with no separator
fn split_whitespace(s: &str, maxsplit: i64) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if maxsplit >= 0 && parts.len() as i64 == maxsplit {
            parts.push(rest);
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                parts.push(&rest[..end]);
                rest = rest[end..].trim_start();
            }
            None => {
                parts.push(rest);
                break;
            }
        }
    }
    parts
}

// === Codecs ===

#[derive(Debug, Clone, Copy, PartialEq)]
enum Codec {
    Utf8,
    Ascii,
    Latin1,
}

fn codec(encoding: &str) -> Result<Codec, RuntimeError> {
    let normalized = encoding.to_ascii_lowercase().replace('_', "-");
    match normalized.as_str() {
        "utf-8" | "utf8" => Ok(Codec::Utf8),
        "ascii" | "us-ascii" => Ok(Codec::Ascii),
        "latin-1" | "latin1" | "iso-8859-1" => Ok(Codec::Latin1),
        _ => Err(RuntimeError::new(
            ExceptionKind::LookupError,
            format!("unknown encoding: {}", encoding),
        )),
    }
}

fn check_errors(errors: &str) -> Result<(), RuntimeError> {
    match errors {
        "strict" | "replace" | "ignore" => Ok(()),
        other => Err(RuntimeError::new(
            ExceptionKind::LookupError,
            format!("unknown error handler name '{}'", other),
        )),
    }
}

/// `bytes.decode(encoding, errors)`
pub(crate) fn decode_bytes(bytes: &[u8], encoding: &str, errors: &str) -> Result<String, RuntimeError> {
    let codec = codec(encoding)?;
    check_errors(errors)?;
    match codec {
        Codec::Latin1 => Ok(bytes.iter().map(|b| *b as char).collect()),
        Codec::Ascii => {
            let mut text = String::with_capacity(bytes.len());
            for (position, byte) in bytes.iter().enumerate() {
                if byte.is_ascii() {
                    text.push(*byte as char);
                    continue;
                }
                match errors {
                    "replace" => text.push(char::REPLACEMENT_CHARACTER),
                    "ignore" => {}
                    _ => {
                        return Err(RuntimeError::new(
                            ExceptionKind::UnicodeDecodeError,
                            format!(
                                "'ascii' codec can't decode byte 0x{:02x} in position {}: ordinal not in range(128)",
                                byte, position
                            ),
                        ))
                    }
                }
            }
            Ok(text)
        }
        Codec::Utf8 => {
            let mut text = String::with_capacity(bytes.len());
            let mut rest = bytes;
            let mut offset = 0usize;
            loop {
                match std::str::from_utf8(rest) {
                    Ok(valid) => {
                        text.push_str(valid);
                        return Ok(text);
                    }
                    Err(err) => {
                        let valid_len = err.valid_up_to();
                        text.push_str(&String::from_utf8_lossy(&rest[..valid_len]));
                        let bad_len = err.error_len().unwrap_or(rest.len() - valid_len);
                        match errors {
                            "replace" => text.push(char::REPLACEMENT_CHARACTER),
                            "ignore" => {}
                            _ => {
                                let position = offset + valid_len;
                                let byte = rest[valid_len];
                                let reason = match err.error_len() {
                                    None => "unexpected end of data",
                                    Some(_) if (0x80..0xc2).contains(&byte) || byte >= 0xf5 => {
                                        "invalid start byte"
                                    }
                                    Some(_) => "invalid continuation byte",
                                };
                                return Err(RuntimeError::new(
                                    ExceptionKind::UnicodeDecodeError,
                                    format!(
                                        "'utf-8' codec can't decode byte 0x{:02x} in position {}: {}",
                                        byte, position, reason
                                    ),
                                ));
                            }
                        }
                        offset += valid_len + bad_len;
                        rest = &rest[valid_len + bad_len..];
                    }
                }
            }
        }
    }
}

/// `str.encode(encoding, errors)`
pub(crate) fn encode_str(s: &str, encoding: &str, errors: &str) -> Result<Vec<u8>, RuntimeError> {
    let codec = codec(encoding)?;
    check_errors(errors)?;
    let (name, limit) = match codec {
        Codec::Utf8 => return Ok(s.as_bytes().to_vec()),
        Codec::Ascii => ("ascii", 128u32),
        Codec::Latin1 => ("latin-1", 256u32),
    };
    let mut bytes = Vec::with_capacity(s.len());
    for (position, c) in s.chars().enumerate() {
        if (c as u32) < limit {
            bytes.push(c as u32 as u8);
            continue;
        }
        match errors {
            "replace" => bytes.push(b'?'),
            "ignore" => {}
            _ => {
                return Err(RuntimeError::value_error(format!(
                    "'{}' codec can't encode character '\\u{:04x}' in position {}: ordinal not in range({})",
                    name, c as u32, position, limit
                )))
            }
        }
    }
    Ok(bytes)
}

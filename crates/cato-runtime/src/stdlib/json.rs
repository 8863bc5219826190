//! `json` module and payload conversion
//!
//! Both directions go through `serde_json`. `json.dumps` plugs a
//! [`Formatter`] into its serializer for the script-visible layout:
//! separators, `indent` and `ensure_ascii`. Non-finite floats are written as
//! `NaN`/`Infinity` literals.

use crate::value::{
    self, check_text, compare_values, float_repr, walk_step, Dict, ExceptionKind, RuntimeError,
    Value, MAX_DEPTH,
};
use crate::ast::CompareOp;
use serde::ser::{self, Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::ser::Formatter;
use std::cell::{Cell, RefCell};
use std::io;
use std::rc::Rc;

// === Decoding ===

/// `json.loads(text)`
pub fn loads(text: &str) -> Result<Value, RuntimeError> {
    let parsed: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| RuntimeError::value_error(decode_message(&e)))?;
    Ok(from_json(&parsed))
}

fn decode_message(err: &serde_json::Error) -> String {
    let detail = err.to_string();
    // serde_json appends " at line L column C"; keep only the description
    let detail = match detail.find(" at line ") {
        Some(index) => &detail[..index],
        None => detail.as_str(),
    };
    format!(
        "{}: line {} column {}",
        capitalize(detail),
        err.line(),
        err.column()
    )
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Convert decoded JSON into a script value
pub fn from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::None,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::str(s.as_str()),
        serde_json::Value::Array(items) => Value::list(items.iter().map(from_json).collect()),
        serde_json::Value::Object(map) => {
            let mut dict = Dict::new();
            for (key, item) in map {
                // string keys are always hashable
                let _ = dict.insert(Value::str(key.as_str()), from_json(item));
            }
            Value::dict(dict)
        }
    }
}

// === Host conversion ===

/// Convert a script value into JSON for the response envelope
pub fn to_json(value: &Value) -> Result<serde_json::Value, RuntimeError> {
    let mut seen = Vec::new();
    to_json_at(value, &mut seen)
}

fn to_json_at(value: &Value, seen: &mut Vec<usize>) -> Result<serde_json::Value, RuntimeError> {
    walk_step()?;
    let json = match value {
        Value::None => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => match serde_json::Number::from_f64(*f) {
            Some(n) => serde_json::Value::Number(n),
            None => {
                return Err(RuntimeError::value_error(
                    "Out of range float values are not JSON compliant",
                ))
            }
        },
        Value::Str(s) => serde_json::Value::String(s.to_string()),
        Value::List(list) => {
            let ptr = Rc::as_ptr(list) as usize;
            enter(seen, ptr)?;
            let items = list.borrow().0.clone();
            let array = items
                .iter()
                .map(|item| to_json_at(item, seen))
                .collect::<Result<Vec<_>, _>>()?;
            seen.pop();
            serde_json::Value::Array(array)
        }
        Value::Tuple(items) => {
            enter(seen, Rc::as_ptr(items) as usize)?;
            let array = items
                .iter()
                .map(|item| to_json_at(item, seen))
                .collect::<Result<Vec<_>, _>>()?;
            seen.pop();
            serde_json::Value::Array(array)
        }
        Value::Dict(dict) => {
            let ptr = Rc::as_ptr(dict) as usize;
            enter(seen, ptr)?;
            let entries = dict.borrow().entries();
            let mut map = serde_json::Map::with_capacity(entries.len());
            for (key, item) in &entries {
                map.insert(key_string(key)?, to_json_at(item, seen)?);
            }
            seen.pop();
            serde_json::Value::Object(map)
        }
        other => return Err(not_serializable(other)),
    };
    Ok(json)
}

fn enter(seen: &mut Vec<usize>, ptr: usize) -> Result<(), RuntimeError> {
    if seen.contains(&ptr) {
        return Err(RuntimeError::value_error("Circular reference detected"));
    }
    if seen.len() >= MAX_DEPTH {
        return Err(RuntimeError::new(
            ExceptionKind::RecursionError,
            "maximum recursion depth exceeded while encoding a JSON object",
        ));
    }
    seen.push(ptr);
    Ok(())
}

fn not_serializable(value: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "Object of type {} is not JSON serializable",
        value.type_name()
    ))
}

/// Object keys: strings as-is, scalars stringified, anything else rejected
fn key_string(key: &Value) -> Result<String, RuntimeError> {
    match key {
        Value::Str(s) => Ok(s.to_string()),
        Value::Int(i) => Ok(i.to_string()),
        Value::Bool(true) => Ok("true".to_string()),
        Value::Bool(false) => Ok("false".to_string()),
        Value::None => Ok("null".to_string()),
        Value::Float(f) => Ok(float_text(*f)),
        other => Err(RuntimeError::type_error(format!(
            "keys must be str, int, float, bool or None, not {}",
            other.type_name()
        ))),
    }
}

fn float_text(f: f64) -> String {
    if f.is_finite() {
        float_repr(f)
    } else {
        non_finite_literal(f).to_string()
    }
}

fn non_finite_literal(f: f64) -> &'static str {
    if f.is_nan() {
        "NaN"
    } else if f > 0.0 {
        "Infinity"
    } else {
        "-Infinity"
    }
}

// === Encoding ===

/// Options accepted by `json.dumps`
#[derive(Debug, Clone)]
pub struct DumpOptions {
    /// Per-level indentation; `None` keeps everything on one line
    pub indent: Option<String>,
    pub sort_keys: bool,
    pub ensure_ascii: bool,
    pub item_separator: String,
    pub key_separator: String,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            indent: None,
            sort_keys: false,
            ensure_ascii: true,
            item_separator: ", ".to_string(),
            key_separator: ": ".to_string(),
        }
    }
}

impl DumpOptions {
    /// Apply an `indent=` argument (int or str); switches the item separator to ","
    pub fn with_indent(mut self, indent: &Value) -> Result<Self, RuntimeError> {
        self.indent = match indent {
            Value::None => None,
            Value::Str(s) => Some(s.to_string()),
            other => match other.as_int() {
                Some(n) => Some(" ".repeat(n.clamp(0, 64) as usize)),
                None => {
                    return Err(RuntimeError::type_error(format!(
                        "indent must be int, str or None, not {}",
                        other.type_name()
                    )))
                }
            },
        };
        if self.indent.is_some() {
            self.item_separator = ",".to_string();
        }
        Ok(self)
    }
}

/// `json.dumps(value, ...)`
pub fn dumps(value: &Value, options: &DumpOptions) -> Result<String, RuntimeError> {
    let state = EncodeState::default();
    let output = Output {
        buf: Vec::new(),
        state: &state,
    };
    let formatter = ScriptFormatter {
        options,
        state: &state,
        depth: 0,
        has_value: false,
    };
    let mut serializer = serde_json::Serializer::with_formatter(output, formatter);
    let encoded = Encodable {
        value,
        options,
        state: &state,
    }
    .serialize(&mut serializer);
    if let Some(err) = state.failure.take() {
        return Err(err);
    }
    encoded.map_err(|e| RuntimeError::value_error(e.to_string()))?;
    String::from_utf8(serializer.into_inner().buf)
        .map_err(|e| RuntimeError::value_error(e.to_string()))
}

/// Shared between the value walker, the formatter and the output buffer
#[derive(Default)]
struct EncodeState {
    /// Containers on the current path
    seen: RefCell<Vec<usize>>,
    /// Literal written in place of the next `null` (non-finite floats)
    pending: Cell<Option<&'static str>>,
    failure: Cell<Option<RuntimeError>>,
}

impl EncodeState {
    /// Keep the first error; serde only carries its text
    fn fail<E: ser::Error>(&self, err: RuntimeError) -> E {
        let wrapped = E::custom(&err);
        let first = self.failure.take().unwrap_or(err);
        self.failure.set(Some(first));
        wrapped
    }
}

/// Output buffer bounded by the sandbox text limit
struct Output<'a> {
    buf: Vec<u8>,
    state: &'a EncodeState,
}

impl io::Write for Output<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if let Err(err) = check_text(self.buf.len() + data.len()) {
            let _: serde_json::Error = self.state.fail(err);
            return Err(io::Error::other("encoded text too large"));
        }
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// `serde_json` layout with the `json.dumps` separators and indentation
struct ScriptFormatter<'a> {
    options: &'a DumpOptions,
    state: &'a EncodeState,
    depth: usize,
    has_value: bool,
}

impl ScriptFormatter<'_> {
    fn newline<W>(&self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if let Some(indent) = &self.options.indent {
            writer.write_all(b"\n")?;
            for _ in 0..self.depth {
                writer.write_all(indent.as_bytes())?;
            }
        }
        Ok(())
    }

    fn separator<W>(&self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if !first {
            writer.write_all(self.options.item_separator.as_bytes())?;
        }
        self.newline(writer)
    }
}

impl Formatter for ScriptFormatter<'_> {
    fn write_null<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let literal = self.state.pending.take().unwrap_or("null");
        writer.write_all(literal.as_bytes())
    }

    fn write_f64<W>(&mut self, writer: &mut W, value: f64) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(float_repr(value).as_bytes())
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if !self.options.ensure_ascii || fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }

    fn begin_array<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.depth += 1;
        self.has_value = false;
        writer.write_all(b"[")
    }

    fn end_array<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.depth -= 1;
        if self.has_value {
            self.newline(writer)?;
        }
        writer.write_all(b"]")
    }

    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.separator(writer, first)
    }

    fn end_array_value<W>(&mut self, _writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.has_value = true;
        Ok(())
    }

    fn begin_object<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.depth += 1;
        self.has_value = false;
        writer.write_all(b"{")
    }

    fn end_object<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.depth -= 1;
        if self.has_value {
            self.newline(writer)?;
        }
        writer.write_all(b"}")
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.separator(writer, first)
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(self.options.key_separator.as_bytes())
    }

    fn end_object_value<W>(&mut self, _writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.has_value = true;
        Ok(())
    }
}

/// A script value seen through `serde::Serialize`
struct Encodable<'a> {
    value: &'a Value,
    options: &'a DumpOptions,
    state: &'a EncodeState,
}

impl Encodable<'_> {
    fn child<'b>(&'b self, value: &'b Value) -> Encodable<'b> {
        Encodable {
            value,
            options: self.options,
            state: self.state,
        }
    }

    fn enter<E: ser::Error>(&self, ptr: usize) -> Result<(), E> {
        let entered = enter(&mut self.state.seen.borrow_mut(), ptr);
        entered.map_err(|err| self.state.fail(err))
    }

    fn leave(&self) {
        self.state.seen.borrow_mut().pop();
    }

    fn array<S: Serializer>(
        &self,
        serializer: S,
        ptr: usize,
        items: &[Value],
    ) -> Result<S::Ok, S::Error> {
        self.enter::<S::Error>(ptr)?;
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
            seq.serialize_element(&self.child(item))?;
        }
        self.leave();
        seq.end()
    }

    fn object<S: Serializer>(
        &self,
        serializer: S,
        ptr: usize,
        mut entries: Vec<(Value, Value)>,
    ) -> Result<S::Ok, S::Error> {
        self.enter::<S::Error>(ptr)?;
        if self.options.sort_keys {
            sort_entries(&mut entries).map_err(|err| self.state.fail::<S::Error>(err))?;
        }
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, item) in &entries {
            let key = key_string(key).map_err(|err| self.state.fail::<S::Error>(err))?;
            map.serialize_entry(&key, &self.child(item))?;
        }
        self.leave();
        map.end()
    }
}

impl Serialize for Encodable<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        walk_step().map_err(|err| self.state.fail::<S::Error>(err))?;
        match self.value {
            Value::None => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            Value::Float(f) => {
                // serde_json writes non-finite floats as null; swap in the literal
                self.state.pending.set(Some(non_finite_literal(*f)));
                serializer.serialize_unit()
            }
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(list) => {
                let items = list.borrow().0.clone();
                self.array(serializer, Rc::as_ptr(list) as usize, &items)
            }
            Value::Tuple(items) => self.array(serializer, Rc::as_ptr(items) as usize, items),
            Value::Dict(dict) => {
                let entries = dict.borrow().entries();
                self.object(serializer, Rc::as_ptr(dict) as usize, entries)
            }
            other => Err(self.state.fail(not_serializable(other))),
        }
    }
}

/// Sort `(key, value)` pairs by key; mixed key types raise `TypeError`
fn sort_entries(entries: &mut [(Value, Value)]) -> Result<(), RuntimeError> {
    let mut failure = None;
    entries.sort_by(|(a, _), (b, _)| {
        if failure.is_some() {
            return std::cmp::Ordering::Equal;
        }
        match compare_values(a, b, CompareOp::Lt) {
            Ok(true) => std::cmp::Ordering::Less,
            Ok(false) => match value::values_equal(a, b) {
                Ok(true) => std::cmp::Ordering::Equal,
                Ok(false) => std::cmp::Ordering::Greater,
                Err(e) => {
                    failure = Some(e);
                    std::cmp::Ordering::Equal
                }
            },
            Err(e) => {
                failure = Some(e);
                std::cmp::Ordering::Equal
            }
        }
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn sample() -> Value {
        let mut dict = Dict::new();
        dict.insert(Value::str("b"), Value::list(vec![Value::Int(1), Value::Float(2.5)]))
            .unwrap();
        dict.insert(Value::str("a"), Value::None).unwrap();
        Value::dict(dict)
    }

    #[test]
    fn test_dumps_default_separators() {
        let text = dumps(&sample(), &DumpOptions::default()).unwrap();
        assert_eq!(text, r#"{"b": [1, 2.5], "a": null}"#);
    }

    #[test]
    fn test_dumps_indent_and_sort_keys() {
        let options = DumpOptions {
            sort_keys: true,
            ..DumpOptions::default()
        }
        .with_indent(&Value::Int(2))
        .unwrap();
        let text = dumps(&sample(), &options).unwrap();
        assert_eq!(text, "{\n  \"a\": null,\n  \"b\": [\n    1,\n    2.5\n  ]\n}");
    }

    #[rstest]
    #[case("héllo", true, r#""h\u00e9llo""#)]
    #[case("héllo", false, "\"héllo\"")]
    #[case("😀", true, r#""\ud83d\ude00""#)]
    #[case("tab\there", true, r#""tab\there""#)]
    fn test_string_escaping(#[case] input: &str, #[case] ascii: bool, #[case] expected: &str) {
        let options = DumpOptions {
            ensure_ascii: ascii,
            ..DumpOptions::default()
        };
        assert_eq!(dumps(&Value::str(input), &options).unwrap(), expected);
    }

    #[test]
    fn test_empty_containers_stay_on_one_line() {
        let value = Value::list(vec![Value::list(vec![]), Value::dict(Dict::new())]);
        let options = DumpOptions::default().with_indent(&Value::str("\t")).unwrap();
        assert_eq!(dumps(&value, &options).unwrap(), "[\n\t[],\n\t{}\n]");
    }

    #[test]
    fn test_non_finite_floats_inside_containers() {
        let value = Value::list(vec![
            Value::Float(f64::NAN),
            Value::None,
            Value::Float(f64::NEG_INFINITY),
            Value::Float(1e20),
        ]);
        let text = dumps(&value, &DumpOptions::default()).unwrap();
        assert_eq!(text, "[NaN, null, -Infinity, 1e+20]");
    }

    #[test]
    fn test_compact_separators() {
        let options = DumpOptions {
            item_separator: ",".to_string(),
            key_separator: ":".to_string(),
            ..DumpOptions::default()
        };
        assert_eq!(dumps(&sample(), &options).unwrap(), r#"{"b":[1,2.5],"a":null}"#);
    }

    #[test]
    fn test_unserializable_value_keeps_its_error() {
        let value = Value::list(vec![Value::Int(1), Value::Db]);
        let err = dumps(&value, &DumpOptions::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: Object of type KeyValueStore is not JSON serializable"
        );
    }

    #[test]
    fn test_non_string_keys_are_stringified() {
        let mut dict = Dict::new();
        dict.insert(Value::Int(1), Value::Bool(true)).unwrap();
        dict.insert(Value::None, Value::Float(f64::INFINITY)).unwrap();
        let text = dumps(&Value::dict(dict), &DumpOptions::default()).unwrap();
        assert_eq!(text, r#"{"1": true, "null": Infinity}"#);
    }

    #[test]
    fn test_circular_reference() {
        let list = Value::list(vec![]);
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        let err = dumps(&list, &DumpOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "ValueError: Circular reference detected");
        value::release_containers();
    }

    #[test]
    fn test_loads_preserves_order_and_numbers() {
        let value = loads(r#"{"z": 1, "a": [2.0, "x", null], "big": 18446744073709551615}"#).unwrap();
        assert_eq!(
            value.repr().unwrap(),
            "{'z': 1, 'a': [2.0, 'x', None], 'big': 1.8446744073709552e+19}"
        );
    }

    #[test]
    fn test_loads_error_is_value_error() {
        let err = loads("{not json").unwrap_err();
        assert_eq!(err.kind(), Some(ExceptionKind::ValueError));
    }

    #[test]
    fn test_to_json_rejects_nan_and_functions() {
        assert!(to_json(&Value::Float(f64::NAN)).is_err());
        let err = to_json(&Value::Db).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: Object of type KeyValueStore is not JSON serializable"
        );
    }
}

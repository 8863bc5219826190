//! Runtime value representation
//!
//! Values live on the single script thread, so sharing is `Rc` based:
//! - None, Bool, Int, Float: immediate values
//! - Str, Bytes: immutable, reference-counted
//! - List, Dict: shared mutable containers (`Rc<RefCell<_>>`), reference semantics
//! - Tuple: immutable, reference-counted
//! - Function, Builtin, Method, Module, Hash, Exception: callables and host objects
//!
//! Dropping deeply nested containers is iterative (see [`Items`]), and every
//! list or dict created on a thread is tracked so reference cycles can be
//! broken when the interpreter is torn down.

use crate::ast::{CompareOp, FunctionDef};
use crate::security::SandboxError;
use crate::stdlib::hashlib::HashState;
use crate::stdlib::Builtin;
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::{Rc, Weak};
use thiserror::Error;

/// Deepest container nesting walked by repr, equality and JSON encoding
pub const MAX_DEPTH: usize = 500;

/// Shared list storage
pub type ListRef = Rc<RefCell<Items>>;
/// Shared dict storage
pub type DictRef = Rc<RefCell<Dict>>;

/// Element storage for lists, tuples and exception arguments.
///
/// Dropping it tears nested containers down with an explicit stack instead
/// of recursion, so arbitrarily deep structures never overflow the stack.
#[derive(Clone, Default)]
pub struct Items(pub Vec<Value>);

impl Deref for Items {
    type Target = Vec<Value>;

    fn deref(&self) -> &Vec<Value> {
        &self.0
    }
}

impl DerefMut for Items {
    fn deref_mut(&mut self) -> &mut Vec<Value> {
        &mut self.0
    }
}

impl From<Vec<Value>> for Items {
    fn from(items: Vec<Value>) -> Self {
        Items(items)
    }
}

impl Drop for Items {
    fn drop(&mut self) {
        if !self.0.is_empty() {
            drain(std::mem::take(&mut self.0));
        }
    }
}

/// Drop values, taking ownership of the children of uniquely owned containers first
fn drain(mut pending: Vec<Value>) {
    while let Some(value) = pending.pop() {
        match value {
            Value::List(list) => {
                if Rc::strong_count(&list) == 1 {
                    if let Ok(mut items) = list.try_borrow_mut() {
                        pending.append(&mut items.0);
                    }
                }
            }
            Value::Tuple(mut tuple) => {
                if let Some(items) = Rc::get_mut(&mut tuple) {
                    pending.append(&mut items.0);
                }
            }
            Value::Dict(dict) => {
                if Rc::strong_count(&dict) == 1 {
                    if let Ok(mut dict) = dict.try_borrow_mut() {
                        dict.drain_into(&mut pending);
                    }
                }
            }
            Value::Exception(mut exc) => {
                if let Some(exc) = Rc::get_mut(&mut exc) {
                    pending.append(&mut exc.args.0);
                }
            }
            _ => {}
        }
    }
}

// === Container tracking ===

enum Tracked {
    List(Weak<RefCell<Items>>),
    Dict(Weak<RefCell<Dict>>),
}

thread_local! {
    static CONTAINERS: RefCell<Vec<Tracked>> = const { RefCell::new(Vec::new()) };
}

fn track(entry: Tracked) {
    CONTAINERS.with(|containers| {
        let mut containers = containers.borrow_mut();
        if containers.len() % 4096 == 4095 {
            containers.retain(|c| match c {
                Tracked::List(w) => w.strong_count() > 0,
                Tracked::Dict(w) => w.strong_count() > 0,
            });
        }
        containers.push(entry);
    });
}

/// Empty every list and dict still alive on this thread.
///
/// Breaks reference cycles (`a.append(a)`) that `Rc` cannot reclaim.
pub fn release_containers() {
    let tracked = CONTAINERS.with(|containers| std::mem::take(&mut *containers.borrow_mut()));
    let mut pending = Vec::new();
    for entry in tracked {
        match entry {
            Tracked::List(weak) => {
                if let Some(list) = weak.upgrade() {
                    if let Ok(mut items) = list.try_borrow_mut() {
                        pending.append(&mut items.0);
                    }
                }
            }
            Tracked::Dict(weak) => {
                if let Some(dict) = weak.upgrade() {
                    if let Ok(mut dict) = dict.try_borrow_mut() {
                        dict.drain_into(&mut pending);
                    }
                }
            }
        }
    }
    drain(pending);
}

// === Walk metering ===

/// Allowance for recursive walks (repr, equality, ordering, JSON encoding).
///
/// Walks over shared sub-structures can visit far more nodes than the script
/// ever allocated, so each visited node is metered against the run's
/// remaining steps and the resulting text against the string limit.
struct Meter {
    walked: Cell<u64>,
    allowance: Cell<u64>,
    step_limit: Cell<u64>,
    text_limit: Cell<usize>,
}

thread_local! {
    static METER: Meter = const {
        Meter {
            walked: Cell::new(0),
            allowance: Cell::new(u64::MAX),
            step_limit: Cell::new(u64::MAX),
            text_limit: Cell::new(usize::MAX),
        }
    };
}

/// Set how many nodes walks may visit before the step limit trips
pub(crate) fn set_walk_allowance(allowance: u64, step_limit: u64) {
    METER.with(|m| {
        m.allowance.set(allowance);
        m.step_limit.set(step_limit);
    });
}

/// Set the largest text a walk may produce
pub(crate) fn set_text_limit(limit: usize) {
    METER.with(|m| m.text_limit.set(limit));
}

/// Nodes visited since the last call
pub(crate) fn take_walked() -> u64 {
    METER.with(|m| m.walked.replace(0))
}

pub(crate) fn walk_step() -> Result<(), RuntimeError> {
    METER.with(|m| {
        let walked = m.walked.get() + 1;
        m.walked.set(walked);
        if walked > m.allowance.get() {
            return Err(SandboxError::StepLimitExceeded {
                limit: m.step_limit.get(),
            }
            .into());
        }
        Ok(())
    })
}

pub(crate) fn check_text(len: usize) -> Result<(), RuntimeError> {
    METER.with(|m| {
        let limit = m.text_limit.get();
        if len > limit {
            return Err(SandboxError::StringTooLarge { size: len, limit }.into());
        }
        Ok(())
    })
}

// === Values ===

/// Runtime value type
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    List(ListRef),
    Tuple(Rc<Items>),
    Dict(DictRef),
    /// Lazy `range(start, stop, step)`
    Range(RangeValue),
    /// User-defined function
    Function(Rc<Function>),
    /// Builtin function or type
    Builtin(Builtin),
    /// Method bound to its receiver
    Method(Rc<BoundMethod>),
    /// Allow-listed module (`json`, `hashlib`)
    Module(ModuleKind),
    /// Incremental hash object from `hashlib`
    Hash(Rc<RefCell<HashState>>),
    /// Exception instance
    Exception(Rc<ExceptionValue>),
    /// Exception class, callable to build an instance
    ExceptionType(ExceptionKind),
    /// Project key-value store handle
    Db,
}

/// User-defined function with its evaluated defaults
pub struct Function {
    pub def: Rc<FunctionDef>,
    /// One slot per parameter; `Some` when the parameter has a default
    pub defaults: Vec<Option<Value>>,
}

/// Method looked up on a value, e.g. `items.append`
pub struct BoundMethod {
    pub receiver: Value,
    pub name: &'static str,
}

/// Modules scripts may import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    Json,
    Hashlib,
}

impl ModuleKind {
    pub fn name(&self) -> &'static str {
        match self {
            ModuleKind::Json => "json",
            ModuleKind::Hashlib => "hashlib",
        }
    }
}

/// Lazy integer range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeValue {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl RangeValue {
    /// Number of elements (step is never zero)
    pub fn len(&self) -> usize {
        let (start, stop, step) = (self.start as i128, self.stop as i128, self.step as i128);
        let span = if step > 0 { stop - start } else { start - stop };
        if span <= 0 {
            return 0;
        }
        let len = (span + step.abs() - 1) / step.abs();
        usize::try_from(len).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index` (must be in bounds)
    pub fn get(&self, index: usize) -> i64 {
        (self.start as i128 + index as i128 * self.step as i128) as i64
    }

    pub fn contains(&self, value: i64) -> bool {
        let len = self.len();
        if len == 0 {
            return false;
        }
        let offset = value as i128 - self.start as i128;
        if offset % self.step as i128 != 0 {
            return false;
        }
        let index = offset / self.step as i128;
        index >= 0 && (index as usize) < len
    }
}

impl Value {
    pub fn str(s: impl Into<Rc<str>>) -> Value {
        Value::Str(s.into())
    }

    /// New list (tracked for cycle cleanup)
    pub fn list(items: Vec<Value>) -> Value {
        let list = Rc::new(RefCell::new(Items(items)));
        track(Tracked::List(Rc::downgrade(&list)));
        Value::List(list)
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(Items(items)))
    }

    /// New dict (tracked for cycle cleanup)
    pub fn dict(dict: Dict) -> Value {
        let dict = Rc::new(RefCell::new(dict));
        track(Tracked::Dict(Rc::downgrade(&dict)));
        Value::Dict(dict)
    }

    /// Python type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Range(_) => "range",
            Value::Function(_) => "function",
            Value::Builtin(b) if b.is_type() => "type",
            Value::Builtin(_) | Value::Method(_) => "builtin_function_or_method",
            Value::Module(_) => "module",
            Value::Hash(_) => "HASH",
            Value::Exception(exc) => exc.kind.name(),
            Value::ExceptionType(_) => "type",
            Value::Db => "KeyValueStore",
        }
    }

    /// Truth value
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(dict) => !dict.borrow().is_empty(),
            Value::Range(range) => !range.is_empty(),
            _ => true,
        }
    }

    /// Numeric view of bools, ints and floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view of bools and ints
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// `str(value)`
    pub fn to_str(&self) -> Result<String, RuntimeError> {
        match self {
            Value::Str(s) => Ok(s.to_string()),
            Value::Exception(exc) => exc.message(),
            _ => self.repr(),
        }
    }

    /// `repr(value)`
    pub fn repr(&self) -> Result<String, RuntimeError> {
        let mut out = String::new();
        let mut seen = Vec::new();
        self.write_repr(&mut out, &mut seen)?;
        check_text(out.len())?;
        Ok(out)
    }

    fn write_repr(&self, out: &mut String, seen: &mut Vec<usize>) -> Result<(), RuntimeError> {
        walk_step()?;
        check_text(out.len())?;
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Float(f) => out.push_str(&float_repr(*f)),
            Value::Str(s) => out.push_str(&str_repr(s)),
            Value::Bytes(b) => out.push_str(&bytes_repr(b)),
            Value::List(list) => {
                let ptr = Rc::as_ptr(list) as usize;
                if seen.contains(&ptr) {
                    out.push_str("[...]");
                    return Ok(());
                }
                enter(seen, ptr)?;
                out.push('[');
                let items = list.borrow().0.clone();
                write_joined(&items, out, seen)?;
                out.push(']');
                seen.pop();
            }
            Value::Tuple(items) => {
                enter(seen, Rc::as_ptr(items) as usize)?;
                out.push('(');
                write_joined(items, out, seen)?;
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
                seen.pop();
            }
            Value::Dict(dict) => {
                let ptr = Rc::as_ptr(dict) as usize;
                if seen.contains(&ptr) {
                    out.push_str("{...}");
                    return Ok(());
                }
                enter(seen, ptr)?;
                out.push('{');
                let entries = dict.borrow().entries();
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    key.write_repr(out, seen)?;
                    out.push_str(": ");
                    value.write_repr(out, seen)?;
                }
                out.push('}');
                seen.pop();
            }
            Value::Range(r) => {
                if r.step == 1 {
                    out.push_str(&format!("range({}, {})", r.start, r.stop));
                } else {
                    out.push_str(&format!("range({}, {}, {})", r.start, r.stop, r.step));
                }
            }
            Value::Function(func) => out.push_str(&format!("<function {}>", func.def.name)),
            Value::Builtin(b) if b.is_type() => out.push_str(&format!("<class '{}'>", b.name())),
            Value::Builtin(b) => out.push_str(&format!("<built-in function {}>", b.name())),
            Value::Method(m) => out.push_str(&format!(
                "<built-in method {} of {} object>",
                m.name,
                m.receiver.type_name()
            )),
            Value::Module(m) => out.push_str(&format!("<module '{}'>", m.name())),
            Value::Hash(h) => out.push_str(&format!("<{} HASH object>", h.borrow().name())),
            Value::Exception(exc) => {
                out.push_str(exc.kind.name());
                out.push('(');
                enter(seen, Rc::as_ptr(exc) as usize)?;
                write_joined(&exc.args, out, seen)?;
                seen.pop();
                out.push(')');
            }
            Value::ExceptionType(kind) => out.push_str(&format!("<class '{}'>", kind.name())),
            Value::Db => out.push_str("<KeyValueStore>"),
        }
        Ok(())
    }

    /// Key used for dict storage; fails for unhashable values
    pub fn hash_key(&self) -> Result<HashKey, RuntimeError> {
        self.hash_key_at(0)
    }

    fn hash_key_at(&self, depth: usize) -> Result<HashKey, RuntimeError> {
        let key = match self {
            Value::None => HashKey::None,
            Value::Bool(b) => HashKey::Int(*b as i64),
            Value::Int(i) => HashKey::Int(*i),
            Value::Float(f) => float_key(*f),
            Value::Str(s) => HashKey::Str(s.clone()),
            Value::Bytes(b) => HashKey::Bytes(b.clone()),
            Value::Tuple(items) => {
                if depth >= MAX_DEPTH {
                    return Err(RuntimeError::new(
                        ExceptionKind::RecursionError,
                        "maximum recursion depth exceeded while hashing",
                    ));
                }
                walk_step()?;
                HashKey::Tuple(
                    items
                        .iter()
                        .map(|item| item.hash_key_at(depth + 1))
                        .collect::<Result<Vec<_>, _>>()?,
                )
            }
            Value::Range(r) => HashKey::Range(r.start, r.stop, r.step),
            Value::Builtin(b) => HashKey::Builtin(*b),
            Value::Module(m) => HashKey::Module(*m),
            Value::ExceptionType(kind) => HashKey::ExceptionType(*kind),
            Value::Function(f) => HashKey::Identity(Rc::as_ptr(f) as *const () as usize),
            Value::Exception(e) => HashKey::Identity(Rc::as_ptr(e) as *const () as usize),
            Value::Db => HashKey::Db,
            Value::List(_) | Value::Dict(_) | Value::Method(_) | Value::Hash(_) => {
                return Err(RuntimeError::type_error(format!(
                    "unhashable type: '{}'",
                    self.type_name()
                )));
            }
        };
        Ok(key)
    }
}

fn enter(seen: &mut Vec<usize>, ptr: usize) -> Result<(), RuntimeError> {
    if seen.len() >= MAX_DEPTH {
        return Err(RuntimeError::new(
            ExceptionKind::RecursionError,
            "maximum recursion depth exceeded while getting the repr of an object",
        ));
    }
    seen.push(ptr);
    Ok(())
}

fn write_joined(items: &[Value], out: &mut String, seen: &mut Vec<usize>) -> Result<(), RuntimeError> {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        item.write_repr(out, seen)?;
    }
    Ok(())
}

fn float_key(f: f64) -> HashKey {
    if f == 0.0 {
        return HashKey::Int(0);
    }
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        return HashKey::Int(f as i64);
    }
    HashKey::Float(f.to_bits())
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repr() {
            Ok(repr) => f.write_str(&repr),
            Err(_) => write!(f, "<{}>", self.type_name()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        values_equal(self, other).unwrap_or(false)
    }
}

/// Python `float.__repr__`: shortest round-trip digits
pub fn float_repr(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let sign = if f < 0.0 { "-" } else { "" };
    let formatted = format!("{:e}", f.abs());
    let (mantissa, exponent) = formatted.split_once('e').unwrap_or((&formatted, "0"));
    let exp: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if (-4..16).contains(&exp) {
        if exp >= 0 {
            let int_len = exp as usize + 1;
            if digits.len() <= int_len {
                format!("{}{}{}.0", sign, digits, "0".repeat(int_len - digits.len()))
            } else {
                format!("{}{}.{}", sign, &digits[..int_len], &digits[int_len..])
            }
        } else {
            format!("{}0.{}{}", sign, "0".repeat((-exp - 1) as usize), digits)
        }
    } else {
        let mantissa = if digits.len() == 1 {
            digits
        } else {
            format!("{}.{}", &digits[..1], &digits[1..])
        };
        let exp_sign = if exp < 0 { '-' } else { '+' };
        format!("{}{}e{}{:02}", sign, mantissa, exp_sign, exp.abs())
    }
}

/// Python `str.__repr__`
pub fn str_repr(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {
                let code = c as u32;
                if code <= 0xff {
                    out.push_str(&format!("\\x{:02x}", code));
                } else if code <= 0xffff {
                    out.push_str(&format!("\\u{:04x}", code));
                } else {
                    out.push_str(&format!("\\U{:08x}", code));
                }
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Python `bytes.__repr__`
pub fn bytes_repr(bytes: &[u8]) -> String {
    let quote = if bytes.contains(&b'\'') && !bytes.contains(&b'"') {
        b'"'
    } else {
        b'\''
    };
    let mut out = String::with_capacity(bytes.len() + 3);
    out.push('b');
    out.push(quote as char);
    for &b in bytes {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            b if b == quote => {
                out.push('\\');
                out.push(b as char);
            }
            0x20..=0x7e => out.push(b as char),
            b => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out.push(quote as char);
    out
}

// === Equality and ordering ===

/// `a == b`
pub fn values_equal(a: &Value, b: &Value) -> Result<bool, RuntimeError> {
    equal_at(a, b, 0)
}

fn equal_at(a: &Value, b: &Value, depth: usize) -> Result<bool, RuntimeError> {
    if depth > MAX_DEPTH {
        return Err(RuntimeError::new(
            ExceptionKind::RecursionError,
            "maximum recursion depth exceeded in comparison",
        ));
    }
    walk_step()?;

    let equal = match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Int(x), Value::Int(y)) => x == y,
        (
            Value::Bool(_) | Value::Int(_) | Value::Float(_),
            Value::Bool(_) | Value::Int(_) | Value::Float(_),
        ) => match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_f64() == b.as_f64(),
        },
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Bytes(x), Value::Bytes(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            if Rc::ptr_eq(x, y) {
                return Ok(true);
            }
            let (x, y) = (x.borrow().0.clone(), y.borrow().0.clone());
            sequences_equal(&x, &y, depth)?
        }
        (Value::Tuple(x), Value::Tuple(y)) => sequences_equal(x, y, depth)?,
        (Value::Dict(x), Value::Dict(y)) => {
            if Rc::ptr_eq(x, y) {
                return Ok(true);
            }
            let (x, y) = (x.borrow().clone_entries(), y.borrow().clone_entries());
            if x.len() != y.len() {
                return Ok(false);
            }
            for (key, (_, value)) in &x {
                match y.get(key) {
                    Some((_, other)) => {
                        if !equal_at(value, other, depth + 1)? {
                            return Ok(false);
                        }
                    }
                    None => return Ok(false),
                }
            }
            true
        }
        (Value::Range(x), Value::Range(y)) => {
            let len = x.len();
            len == y.len() && (len == 0 || (x.start == y.start && (len == 1 || x.step == y.step)))
        }
        _ => is_identical(a, b),
    };
    Ok(equal)
}

fn sequences_equal(x: &[Value], y: &[Value], depth: usize) -> Result<bool, RuntimeError> {
    if x.len() != y.len() {
        return Ok(false);
    }
    for (a, b) in x.iter().zip(y) {
        if !equal_at(a, b, depth + 1)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// `a is b`
pub fn is_identical(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) | (Value::Db, Value::Db) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Str(x), Value::Str(y)) => Rc::ptr_eq(x, y) || (x.is_empty() && y.is_empty()),
        (Value::Bytes(x), Value::Bytes(y)) => Rc::ptr_eq(x, y),
        (Value::List(x), Value::List(y)) => Rc::ptr_eq(x, y),
        (Value::Tuple(x), Value::Tuple(y)) => Rc::ptr_eq(x, y) || (x.is_empty() && y.is_empty()),
        (Value::Dict(x), Value::Dict(y)) => Rc::ptr_eq(x, y),
        (Value::Range(x), Value::Range(y)) => x == y,
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::Builtin(x), Value::Builtin(y)) => x == y,
        (Value::Method(x), Value::Method(y)) => Rc::ptr_eq(x, y),
        (Value::Module(x), Value::Module(y)) => x == y,
        (Value::Hash(x), Value::Hash(y)) => Rc::ptr_eq(x, y),
        (Value::Exception(x), Value::Exception(y)) => Rc::ptr_eq(x, y),
        (Value::ExceptionType(x), Value::ExceptionType(y)) => x == y,
        _ => false,
    }
}

/// Ordering comparison (`<`, `<=`, `>`, `>=`)
pub fn compare_values(a: &Value, b: &Value, op: CompareOp) -> Result<bool, RuntimeError> {
    compare_at(a, b, op, 0)
}

fn compare_at(a: &Value, b: &Value, op: CompareOp, depth: usize) -> Result<bool, RuntimeError> {
    use std::cmp::Ordering;

    if depth > MAX_DEPTH {
        return Err(RuntimeError::new(
            ExceptionKind::RecursionError,
            "maximum recursion depth exceeded in comparison",
        ));
    }
    walk_step()?;

    let ordering: Option<Ordering> = match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (
            Value::Bool(_) | Value::Int(_) | Value::Float(_),
            Value::Bool(_) | Value::Int(_) | Value::Float(_),
        ) => match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => {
                let (x, y) = (a.as_f64().unwrap_or(f64::NAN), b.as_f64().unwrap_or(f64::NAN));
                // NaN compares false with everything
                match x.partial_cmp(&y) {
                    Some(ordering) => Some(ordering),
                    None => return Ok(false),
                }
            }
        },
        (Value::Str(x), Value::Str(y)) => Some(x.as_ref().cmp(y.as_ref())),
        (Value::Bytes(x), Value::Bytes(y)) => Some(x.as_ref().cmp(y.as_ref())),
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow().0.clone(), y.borrow().0.clone());
            return compare_sequences(&x, &y, op, depth);
        }
        (Value::Tuple(x), Value::Tuple(y)) => return compare_sequences(x, y, op, depth),
        _ => None,
    };

    let Some(ordering) = ordering else {
        return Err(RuntimeError::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            a.type_name(),
            b.type_name()
        )));
    };

    Ok(match op {
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::LtE => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    })
}

fn compare_sequences(x: &[Value], y: &[Value], op: CompareOp, depth: usize) -> Result<bool, RuntimeError> {
    for (a, b) in x.iter().zip(y) {
        if !equal_at(a, b, depth + 1)? {
            return compare_at(a, b, op, depth + 1);
        }
    }
    let (xl, yl) = (x.len(), y.len());
    Ok(match op {
        CompareOp::Lt => xl < yl,
        CompareOp::LtE => xl <= yl,
        CompareOp::Gt => xl > yl,
        _ => xl >= yl,
    })
}

// === Dict ===

/// Hashable identity of a dict key.
///
/// Numeric keys are normalized so `1`, `1.0` and `True` address the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    None,
    Int(i64),
    Float(u64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
    Tuple(Vec<HashKey>),
    Range(i64, i64, i64),
    Builtin(Builtin),
    Module(ModuleKind),
    ExceptionType(ExceptionKind),
    Identity(usize),
    Db,
}

/// Insertion-ordered dictionary
#[derive(Clone, Default)]
pub struct Dict {
    entries: IndexMap<HashKey, (Value, Value)>,
    /// Read-only mapping (the request payload)
    frozen: bool,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Make the dict read-only
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn get(&self, key: &Value) -> Result<Option<Value>, RuntimeError> {
        let key = key.hash_key()?;
        Ok(self.entries.get(&key).map(|(_, v)| v.clone()))
    }

    /// Lookup by string key
    pub fn get_str(&self, key: &str) -> Option<Value> {
        self.entries
            .get(&HashKey::Str(Rc::from(key)))
            .map(|(_, v)| v.clone())
    }

    pub fn contains(&self, key: &Value) -> Result<bool, RuntimeError> {
        Ok(self.entries.contains_key(&key.hash_key()?))
    }

    /// Insert or update; an existing entry keeps its original key object
    pub fn insert(&mut self, key: Value, value: Value) -> Result<(), RuntimeError> {
        let hash = key.hash_key()?;
        match self.entries.get_mut(&hash) {
            Some(entry) => entry.1 = value,
            None => {
                self.entries.insert(hash, (key, value));
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> Result<Option<Value>, RuntimeError> {
        let hash = key.hash_key()?;
        Ok(self.entries.shift_remove(&hash).map(|(_, v)| v))
    }

    pub fn clear(&mut self) {
        let mut pending = Vec::new();
        self.drain_into(&mut pending);
        drain(pending);
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.values().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.values().map(|(_, v)| v.clone()).collect()
    }

    /// Snapshot of `(key, value)` pairs in insertion order
    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.entries.values().cloned().collect()
    }

    fn clone_entries(&self) -> IndexMap<HashKey, (Value, Value)> {
        self.entries.clone()
    }

    fn drain_into(&mut self, out: &mut Vec<Value>) {
        for (_, (key, value)) in self.entries.drain(..) {
            out.push(key);
            out.push(value);
        }
    }
}

impl Drop for Dict {
    fn drop(&mut self) {
        if !self.entries.is_empty() {
            self.clear();
        }
    }
}

// === Exceptions ===

/// Builtin exception classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    Exception,
    ArithmeticError,
    AssertionError,
    LookupError,
    AttributeError,
    ImportError,
    ModuleNotFoundError,
    IndexError,
    KeyError,
    NameError,
    UnboundLocalError,
    NotImplementedError,
    OverflowError,
    RecursionError,
    RuntimeError,
    TypeError,
    ValueError,
    UnicodeDecodeError,
    ZeroDivisionError,
}

impl ExceptionKind {
    pub const ALL: [ExceptionKind; 19] = [
        ExceptionKind::Exception,
        ExceptionKind::ArithmeticError,
        ExceptionKind::AssertionError,
        ExceptionKind::LookupError,
        ExceptionKind::AttributeError,
        ExceptionKind::ImportError,
        ExceptionKind::ModuleNotFoundError,
        ExceptionKind::IndexError,
        ExceptionKind::KeyError,
        ExceptionKind::NameError,
        ExceptionKind::UnboundLocalError,
        ExceptionKind::NotImplementedError,
        ExceptionKind::OverflowError,
        ExceptionKind::RecursionError,
        ExceptionKind::RuntimeError,
        ExceptionKind::TypeError,
        ExceptionKind::ValueError,
        ExceptionKind::UnicodeDecodeError,
        ExceptionKind::ZeroDivisionError,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ExceptionKind::Exception => "Exception",
            ExceptionKind::ArithmeticError => "ArithmeticError",
            ExceptionKind::AssertionError => "AssertionError",
            ExceptionKind::LookupError => "LookupError",
            ExceptionKind::AttributeError => "AttributeError",
            ExceptionKind::ImportError => "ImportError",
            ExceptionKind::ModuleNotFoundError => "ModuleNotFoundError",
            ExceptionKind::IndexError => "IndexError",
            ExceptionKind::KeyError => "KeyError",
            ExceptionKind::NameError => "NameError",
            ExceptionKind::UnboundLocalError => "UnboundLocalError",
            ExceptionKind::NotImplementedError => "NotImplementedError",
            ExceptionKind::OverflowError => "OverflowError",
            ExceptionKind::RecursionError => "RecursionError",
            ExceptionKind::RuntimeError => "RuntimeError",
            ExceptionKind::TypeError => "TypeError",
            ExceptionKind::ValueError => "ValueError",
            ExceptionKind::UnicodeDecodeError => "UnicodeDecodeError",
            ExceptionKind::ZeroDivisionError => "ZeroDivisionError",
        }
    }

    pub fn parent(&self) -> Option<ExceptionKind> {
        use ExceptionKind::*;
        match self {
            Exception => None,
            IndexError | KeyError => Some(LookupError),
            ZeroDivisionError | OverflowError => Some(ArithmeticError),
            UnboundLocalError => Some(NameError),
            RecursionError | NotImplementedError => Some(RuntimeError),
            ModuleNotFoundError => Some(ImportError),
            UnicodeDecodeError => Some(ValueError),
            _ => Some(Exception),
        }
    }

    /// `issubclass(self, other)`
    pub fn is_subclass_of(&self, other: ExceptionKind) -> bool {
        let mut current = Some(*self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

/// Exception instance
pub struct ExceptionValue {
    pub kind: ExceptionKind,
    pub args: Items,
}

impl ExceptionValue {
    pub fn new(kind: ExceptionKind, args: Vec<Value>) -> Self {
        Self {
            kind,
            args: Items(args),
        }
    }

    /// `str(exc)`
    pub fn message(&self) -> Result<String, RuntimeError> {
        match self.args.as_slice() {
            [] => Ok(String::new()),
            // KeyError shows the missing key as a repr
            [arg] if self.kind == ExceptionKind::KeyError => arg.repr(),
            [arg] => arg.to_str(),
            args => Value::tuple(args.to_vec()).repr(),
        }
    }

    /// `Kind: message`, or just `Kind` without a message
    pub fn describe(&self) -> String {
        let message = self
            .message()
            .unwrap_or_else(|_| "<exception str() failed>".to_string());
        if message.is_empty() {
            self.kind.name().to_string()
        } else {
            format!("{}: {}", self.kind.name(), message)
        }
    }
}

/// Errors raised while running a script
#[derive(Debug, Error, Clone)]
pub enum RuntimeError {
    /// Script-level exception; the only kind `try/except` can catch
    #[error("{}", describe_exception(exc, *line))]
    Exception { exc: Rc<ExceptionValue>, line: u32 },

    /// Resource limit hit
    #[error("{0}")]
    Limit(#[from] SandboxError),

    /// Key-value store failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Host cancelled the run
    #[error("execution cancelled")]
    Cancelled,
}

fn describe_exception(exc: &ExceptionValue, line: u32) -> String {
    if line == 0 {
        exc.describe()
    } else {
        format!("{} (line {})", exc.describe(), line)
    }
}

impl fmt::Debug for ExceptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl RuntimeError {
    /// Exception of `kind` with a single message argument
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::from_exception(Rc::new(ExceptionValue::new(
            kind,
            vec![Value::str(message)],
        )))
    }

    pub fn from_exception(exc: Rc<ExceptionValue>) -> Self {
        RuntimeError::Exception { exc, line: 0 }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::ValueError, message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::IndexError, message)
    }

    pub fn attribute_error(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::AttributeError, message)
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::ZeroDivisionError, message)
    }

    pub fn overflow(message: impl Into<String>) -> Self {
        Self::new(ExceptionKind::OverflowError, message)
    }

    /// `KeyError(key)`
    pub fn key_error(key: Value) -> Self {
        Self::from_exception(Rc::new(ExceptionValue::new(ExceptionKind::KeyError, vec![key])))
    }

    /// Attach the script line where the error surfaced (first one wins)
    pub fn with_line(self, new_line: u32) -> Self {
        match self {
            RuntimeError::Exception { exc, line: 0 } => RuntimeError::Exception {
                exc,
                line: new_line,
            },
            other => other,
        }
    }

    /// Script line of an exception, if known
    pub fn line(&self) -> Option<u32> {
        match self {
            RuntimeError::Exception { line, .. } if *line > 0 => Some(*line),
            _ => None,
        }
    }

    /// Kind of a script exception
    pub fn kind(&self) -> Option<ExceptionKind> {
        match self {
            RuntimeError::Exception { exc, .. } => Some(exc.kind),
            _ => None,
        }
    }

    /// Only script exceptions are visible to `try/except`
    pub fn is_catchable(&self) -> bool {
        matches!(self, RuntimeError::Exception { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(1.0, "1.0")]
    #[case(0.1, "0.1")]
    #[case(-2.5, "-2.5")]
    #[case(1e16, "1e+16")]
    #[case(1.5e16, "1.5e+16")]
    #[case(1e15, "1000000000000000.0")]
    #[case(0.0001, "0.0001")]
    #[case(1e-5, "1e-05")]
    #[case(123456.789, "123456.789")]
    #[case(0.1 + 0.2, "0.30000000000000004")]
    #[case(-0.0, "-0.0")]
    #[case(f64::INFINITY, "inf")]
    #[case(f64::NAN, "nan")]
    fn test_float_repr(#[case] value: f64, #[case] expected: &str) {
        assert_eq!(float_repr(value), expected);
    }

    #[rstest]
    #[case("abc", "'abc'")]
    #[case("it's", "\"it's\"")]
    #[case("a\nb", "'a\\nb'")]
    #[case("both ' and \"", "'both \\' and \"'")]
    #[case("\u{1}", "'\\x01'")]
    fn test_str_repr(#[case] value: &str, #[case] expected: &str) {
        assert_eq!(str_repr(value), expected);
    }

    #[test]
    fn test_bytes_repr() {
        assert_eq!(bytes_repr(b"ab\x00\xff'"), "b\"ab\\x00\\xff'\"");
    }

    #[test]
    fn test_container_repr() {
        let mut dict = Dict::new();
        dict.insert(Value::str("a"), Value::Int(1)).unwrap();
        dict.insert(Value::Int(2), Value::list(vec![Value::None, Value::Bool(true)]))
            .unwrap();
        let value = Value::dict(dict);
        assert_eq!(value.repr().unwrap(), "{'a': 1, 2: [None, True]}");
        assert_eq!(Value::tuple(vec![Value::Int(1)]).repr().unwrap(), "(1,)");
    }

    #[test]
    fn test_cyclic_list_repr() {
        let list = Value::list(vec![Value::Int(1)]);
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert_eq!(list.repr().unwrap(), "[1, [...]]");
        release_containers();
    }

    #[test]
    fn test_numeric_keys_share_an_entry() {
        let mut dict = Dict::new();
        dict.insert(Value::Int(1), Value::str("int")).unwrap();
        dict.insert(Value::Float(1.0), Value::str("float")).unwrap();
        dict.insert(Value::Bool(true), Value::str("bool")).unwrap();
        assert_eq!(dict.len(), 1);
        assert_eq!(dict.keys(), vec![Value::Int(1)]);
        assert_eq!(dict.get(&Value::Int(1)).unwrap(), Some(Value::str("bool")));
    }

    #[test]
    fn test_unhashable_key() {
        let err = Value::list(vec![]).hash_key().unwrap_err();
        assert_eq!(err.to_string(), "TypeError: unhashable type: 'list'");
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut dict = Dict::new();
        for key in ["a", "b", "c"] {
            dict.insert(Value::str(key), Value::None).unwrap();
        }
        dict.remove(&Value::str("a")).unwrap();
        assert_eq!(dict.keys(), vec![Value::str("b"), Value::str("c")]);
    }

    #[test]
    fn test_cross_type_equality() {
        assert!(values_equal(&Value::Int(1), &Value::Float(1.0)).unwrap());
        assert!(values_equal(&Value::Bool(true), &Value::Int(1)).unwrap());
        assert!(!values_equal(&Value::str("1"), &Value::Int(1)).unwrap());
        assert!(!values_equal(
            &Value::list(vec![Value::Int(1)]),
            &Value::tuple(vec![Value::Int(1)])
        )
        .unwrap());
    }

    #[test]
    fn test_ordering() {
        let lt = |a: Value, b: Value| compare_values(&a, &b, CompareOp::Lt).unwrap();
        assert!(lt(Value::Int(1), Value::Float(1.5)));
        assert!(lt(Value::str("apple"), Value::str("banana")));
        assert!(lt(
            Value::list(vec![Value::Int(1), Value::Int(2)]),
            Value::list(vec![Value::Int(1), Value::Int(3)])
        ));
        assert!(lt(Value::tuple(vec![Value::Int(1)]), Value::tuple(vec![Value::Int(1), Value::Int(0)])));
        assert!(!lt(Value::Float(f64::NAN), Value::Int(1)));

        let err = compare_values(&Value::str("a"), &Value::Int(1), CompareOp::Lt).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: '<' not supported between instances of 'str' and 'int'"
        );
    }

    #[test]
    fn test_exception_hierarchy() {
        assert!(ExceptionKind::KeyError.is_subclass_of(ExceptionKind::LookupError));
        assert!(ExceptionKind::KeyError.is_subclass_of(ExceptionKind::Exception));
        assert!(ExceptionKind::ZeroDivisionError.is_subclass_of(ExceptionKind::ArithmeticError));
        assert!(!ExceptionKind::ValueError.is_subclass_of(ExceptionKind::TypeError));
    }

    #[test]
    fn test_error_display() {
        let err = RuntimeError::key_error(Value::str("missing")).with_line(3);
        assert_eq!(err.to_string(), "KeyError: 'missing' (line 3)");
        let err = err.with_line(9);
        assert_eq!(err.line(), Some(3));

        let bare = RuntimeError::from_exception(Rc::new(ExceptionValue::new(
            ExceptionKind::ValueError,
            vec![],
        )));
        assert_eq!(bare.to_string(), "ValueError");
    }

    #[test]
    fn test_range_len_and_contains() {
        let r = RangeValue { start: 0, stop: 10, step: 3 };
        assert_eq!(r.len(), 4);
        assert!(r.contains(9));
        assert!(!r.contains(10));
        let down = RangeValue { start: 5, stop: 0, step: -2 };
        assert_eq!(down.len(), 3);
        assert_eq!(down.get(2), 1);
    }

    #[test]
    fn test_shared_structure_walk_is_metered() {
        let mut value = Value::list(vec![Value::Int(1)]);
        for _ in 0..40 {
            value = Value::list(vec![value.clone(), value]);
        }
        set_walk_allowance(10_000, 10_000);
        let err = value.repr().unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Limit(SandboxError::StepLimitExceeded { limit: 10_000 })
        ));
        set_walk_allowance(u64::MAX, u64::MAX);
        take_walked();
        release_containers();
    }

    #[test]
    fn test_deep_nesting_drops_without_overflow() {
        let mut value = Value::list(vec![]);
        for _ in 0..200_000 {
            value = Value::list(vec![value]);
        }
        drop(value);
        release_containers();
    }
}

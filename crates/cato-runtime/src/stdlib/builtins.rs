//! Builtin functions
//!
//! Every builtin validates its own arguments and charges the budget for the
//! values it creates. Iterator-returning builtins (`enumerate`, `zip`,
//! `reversed`) produce lists.

use crate::ast::CompareOp;
use crate::interpreter::Interpreter;
use crate::stdlib::json::{self, DumpOptions};
use crate::stdlib::methods::decode_bytes;
use crate::stdlib::{expect_int, expect_str, format, hashlib, Builtin, CallArgs};
use crate::value::{compare_values, Dict, ExceptionKind, RangeValue, RuntimeError, Value};

impl Interpreter {
    /// Call a builtin function
    pub(crate) fn call_builtin(&mut self, builtin: Builtin, mut args: CallArgs) -> Result<Value, RuntimeError> {
        let name = builtin.name();
        match builtin {
            Builtin::Print => self.builtin_print(args),
            Builtin::Len => {
                args.exact(name, 1, 1)?;
                len_of(&args.args[0]).map(|len| Value::Int(len as i64))
            }
            Builtin::Range => {
                args.exact(name, 1, 3)?;
                builtin_range(&args.args)
            }
            Builtin::Int => self.builtin_int(args),
            Builtin::Float => {
                args.exact(name, 0, 1)?;
                match args.args.first() {
                    Some(value) => builtin_float(value),
                    None => Ok(Value::Float(0.0)),
                }
            }
            Builtin::Str => self.builtin_str(args),
            Builtin::Bool => {
                args.exact(name, 0, 1)?;
                Ok(Value::Bool(args.args.first().is_some_and(Value::is_truthy)))
            }
            Builtin::List => {
                args.exact(name, 0, 1)?;
                let items = match args.args.first() {
                    Some(iterable) => self.collect_values(iterable)?,
                    None => Vec::new(),
                };
                self.new_list(items)
            }
            Builtin::Tuple => {
                args.exact(name, 0, 1)?;
                match args.args.first() {
                    Some(tuple @ Value::Tuple(_)) => Ok(tuple.clone()),
                    Some(iterable) => {
                        let items = self.collect_values(iterable)?;
                        self.new_tuple(items)
                    }
                    None => Ok(Value::tuple(Vec::new())),
                }
            }
            Builtin::Dict => {
                args.arity(name, 0, 1)?;
                let mut dict = Dict::new();
                if let Some(source) = args.args.first() {
                    for (key, value) in self.dict_pairs(source)? {
                        dict.insert(key, value)?;
                    }
                }
                for (key, value) in args.kwargs {
                    dict.insert(Value::str(key), value)?;
                }
                self.budget.check_collection(dict.len())?;
                self.budget.allocate_entries(dict.len())?;
                Ok(Value::dict(dict))
            }
            Builtin::Enumerate => {
                let start = args.keyword("start");
                args.exact(name, 1, 2)?;
                let start = match start.as_ref().or(args.args.get(1)) {
                    Some(start) => expect_int(start, "")?,
                    None => 0,
                };
                let items = self.collect_values(&args.args[0])?;
                let mut pairs = Vec::with_capacity(items.len());
                for (offset, item) in items.into_iter().enumerate() {
                    let index = start
                        .checked_add(offset as i64)
                        .ok_or_else(|| RuntimeError::overflow("integer overflow"))?;
                    pairs.push(Value::tuple(vec![Value::Int(index), item]));
                }
                self.new_list(pairs)
            }
            Builtin::Zip => {
                args.reject_keywords(name)?;
                let mut columns = Vec::with_capacity(args.args.len());
                for iterable in &args.args {
                    columns.push(self.collect_values(iterable)?);
                }
                let len = columns.iter().map(Vec::len).min().unwrap_or(0);
                let rows = (0..len)
                    .map(|i| Value::tuple(columns.iter().map(|column| column[i].clone()).collect()))
                    .collect();
                self.new_list(rows)
            }
            Builtin::Min => self.builtin_extreme(args, name, CompareOp::Lt),
            Builtin::Max => self.builtin_extreme(args, name, CompareOp::Gt),
            Builtin::Sum => self.builtin_sum(args),
            Builtin::Abs => {
                args.exact(name, 1, 1)?;
                builtin_abs(&args.args[0])
            }
            Builtin::Round => {
                let ndigits = args.keyword("ndigits");
                args.exact(name, 1, 2)?;
                let ndigits = ndigits.or_else(|| args.args.get(1).cloned());
                builtin_round(&args.args[0], ndigits.as_ref())
            }
            Builtin::Sorted => {
                let key = args.keyword("key");
                let reverse = args.keyword("reverse");
                args.exact(name, 1, 1)?;
                let items = self.collect_values(&args.args[0])?;
                let reverse = reverse.is_some_and(|r| r.is_truthy());
                let sorted = self.sort_values(items, key, reverse)?;
                self.new_list(sorted)
            }
            Builtin::Reversed => {
                args.exact(name, 1, 1)?;
                let seq = &args.args[0];
                if !matches!(
                    seq,
                    Value::List(_) | Value::Tuple(_) | Value::Str(_) | Value::Bytes(_) | Value::Range(_) | Value::Dict(_)
                ) {
                    return Err(RuntimeError::type_error(format!(
                        "'{}' object is not reversible",
                        seq.type_name()
                    )));
                }
                let mut items = self.collect_values(seq)?;
                items.reverse();
                self.new_list(items)
            }
            Builtin::Repr => {
                args.exact(name, 1, 1)?;
                let text = args.args[0].repr()?;
                self.new_str(text)
            }
            Builtin::Any | Builtin::All => {
                args.exact(name, 1, 1)?;
                let want = builtin == Builtin::Any;
                let mut iter = self.iter_value(&args.args[0])?;
                while let Some(item) = iter.next() {
                    self.budget.tick()?;
                    if item.is_truthy() == want {
                        return Ok(Value::Bool(want));
                    }
                }
                Ok(Value::Bool(!want))
            }
            Builtin::JsonLoads => {
                args.exact(name, 1, 1)?;
                match &args.args[0] {
                    Value::Str(text) => json::loads(text),
                    Value::Bytes(bytes) => {
                        let text = decode_bytes(bytes, "utf-8", "strict")?;
                        json::loads(&text)
                    }
                    other => Err(RuntimeError::type_error(format!(
                        "the JSON object must be str, bytes or bytearray, not {}",
                        other.type_name()
                    ))),
                }
            }
            Builtin::JsonDumps => self.builtin_dumps(args),
            Builtin::Sha224 | Builtin::Sha256 | Builtin::Sha384 | Builtin::Sha512 => {
                args.keyword("usedforsecurity");
                let data = args.keyword("data").or_else(|| args.keyword("string"));
                args.exact(name, 0, 1)?;
                let data = data.or_else(|| args.args.first().cloned());
                hashlib::construct(name, data.as_ref())
            }
        }
    }

    fn builtin_print(&mut self, mut args: CallArgs) -> Result<Value, RuntimeError> {
        let sep = separator(args.keyword("sep"), "sep", " ")?;
        let end = separator(args.keyword("end"), "end", "\n")?;
        args.reject_keywords("print")?;

        let mut line = String::new();
        for (i, value) in args.args.iter().enumerate() {
            if i > 0 {
                line.push_str(&sep);
            }
            line.push_str(&value.to_str()?);
        }
        line.push_str(&end);

        self.budget.record_output(line.len())?;
        self.output.push_str(&line);
        Ok(Value::None)
    }

    fn builtin_int(&mut self, mut args: CallArgs) -> Result<Value, RuntimeError> {
        let base = args.keyword("base");
        args.exact("int", 0, 2)?;
        let base = base.or_else(|| args.args.get(1).cloned());
        let Some(value) = args.args.first() else {
            return Ok(Value::Int(0));
        };

        if let Some(base) = base {
            let base = expect_int(&base, "")?;
            if base != 0 && !(2..=36).contains(&base) {
                return Err(RuntimeError::value_error(
                    "int() base must be >= 2 and <= 36, or 0",
                ));
            }
            let text = match value {
                Value::Str(text) => text.to_string(),
                Value::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                _ => {
                    return Err(RuntimeError::type_error(
                        "int() can't convert non-string with explicit base",
                    ))
                }
            };
            return parse_int(&text, base as u32).map(Value::Int);
        }

        match value {
            Value::Int(i) => Ok(Value::Int(*i)),
            Value::Bool(b) => Ok(Value::Int(*b as i64)),
            Value::Float(f) => float_to_int(*f).map(Value::Int),
            Value::Str(text) => parse_int(text, 10).map(Value::Int),
            Value::Bytes(bytes) => parse_int(&String::from_utf8_lossy(bytes), 10).map(Value::Int),
            other => Err(RuntimeError::type_error(format!(
                "int() argument must be a string, a bytes-like object or a real number, not '{}'",
                other.type_name()
            ))),
        }
    }

    fn builtin_str(&mut self, mut args: CallArgs) -> Result<Value, RuntimeError> {
        let encoding = args.keyword("encoding");
        let errors = args.keyword("errors");
        args.exact("str", 0, 3)?;
        let encoding = encoding.or_else(|| args.args.get(1).cloned());
        let errors = errors.or_else(|| args.args.get(2).cloned());
        let Some(value) = args.args.first() else {
            return Ok(Value::str(""));
        };

        if encoding.is_none() && errors.is_none() {
            let text = value.to_str()?;
            return self.new_str(text);
        }
        let Value::Bytes(bytes) = value else {
            return Err(RuntimeError::type_error(format!(
                "decoding to str: need a bytes-like object, {} found",
                value.type_name()
            )));
        };
        let encoding = match &encoding {
            Some(encoding) => expect_str(encoding, "str() argument 'encoding'")?,
            None => "utf-8",
        };
        let errors = match &errors {
            Some(errors) => expect_str(errors, "str() argument 'errors'")?,
            None => "strict",
        };
        let text = decode_bytes(bytes, encoding, errors)?;
        self.new_str(text)
    }

    /// `min()` / `max()`; `op` is the comparison a new best must win
    fn builtin_extreme(&mut self, mut args: CallArgs, name: &str, op: CompareOp) -> Result<Value, RuntimeError> {
        let key = args.keyword("key").filter(|k| !matches!(k, Value::None));
        let default = args.keyword("default");
        args.reject_keywords(name)?;

        let candidates = match args.args.len() {
            0 => {
                return Err(RuntimeError::type_error(format!(
                    "{} expected at least 1 argument, got 0",
                    name
                )))
            }
            1 => self.collect_values(&args.args[0])?,
            _ => {
                if default.is_some() {
                    return Err(RuntimeError::type_error(format!(
                        "Cannot specify a default for {}() with multiple positional arguments",
                        name
                    )));
                }
                std::mem::take(&mut args.args)
            }
        };

        let mut best: Option<(Value, Value)> = None;
        for item in candidates {
            self.budget.tick()?;
            let item_key = match &key {
                Some(key) => self.call_value(key, CallArgs::positional(vec![item.clone()]))?,
                None => item.clone(),
            };
            let replace = match &best {
                Some((best_key, _)) => compare_values(&item_key, best_key, op)?,
                None => true,
            };
            if replace {
                best = Some((item_key, item));
            }
        }

        match (best, default) {
            (Some((_, item)), _) => Ok(item),
            (None, Some(default)) => Ok(default),
            (None, None) => Err(RuntimeError::value_error(format!(
                "{}() iterable argument is empty",
                name
            ))),
        }
    }

    fn builtin_sum(&mut self, mut args: CallArgs) -> Result<Value, RuntimeError> {
        let start = args.keyword("start");
        args.exact("sum", 1, 2)?;
        let start = start
            .or_else(|| args.args.get(1).cloned())
            .unwrap_or(Value::Int(0));
        if matches!(start, Value::Str(_)) {
            return Err(RuntimeError::type_error(
                "sum() can't sum strings [use ''.join(seq) instead]",
            ));
        }

        let mut total = start;
        let mut iter = self.iter_value(&args.args[0])?;
        while let Some(item) = iter.next() {
            self.budget.tick()?;
            total = self.binary_op(crate::ast::BinaryOp::Add, &total, &item)?;
        }
        Ok(total)
    }

    fn builtin_dumps(&mut self, mut args: CallArgs) -> Result<Value, RuntimeError> {
        let indent = args.keyword("indent");
        let sort_keys = args.keyword("sort_keys");
        let ensure_ascii = args.keyword("ensure_ascii");
        let separators = args.keyword("separators");
        args.exact("dumps", 1, 1)?;

        let mut options = DumpOptions::default();
        if let Some(indent) = &indent {
            options = options.with_indent(indent)?;
        }
        if let Some(sort_keys) = sort_keys {
            options.sort_keys = sort_keys.is_truthy();
        }
        if let Some(ensure_ascii) = ensure_ascii {
            options.ensure_ascii = ensure_ascii.is_truthy();
        }
        match separators {
            None | Some(Value::None) => {}
            Some(separators) => {
                let pair = self.collect_values(&separators)?;
                let [item, key] = pair.as_slice() else {
                    return Err(RuntimeError::value_error(
                        "separators must be a pair of strings",
                    ));
                };
                options.item_separator = expect_str(item, "separator")?.to_string();
                options.key_separator = expect_str(key, "separator")?.to_string();
            }
        }

        let text = json::dumps(&args.args[0], &options)?;
        self.new_str(text)
    }

    /// Key/value pairs from a mapping or an iterable of pairs
    pub(crate) fn dict_pairs(&mut self, source: &Value) -> Result<Vec<(Value, Value)>, RuntimeError> {
        if let Value::Dict(dict) = source {
            let entries = dict.borrow().entries();
            self.budget.check_collection(entries.len())?;
            self.budget.allocate_entries(entries.len())?;
            return Ok(entries);
        }
        let items = self.collect_values(source)?;
        let mut pairs = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            if !matches!(item, Value::List(_) | Value::Tuple(_) | Value::Str(_)) {
                return Err(RuntimeError::type_error(format!(
                    "cannot convert dictionary update sequence element #{} to a sequence",
                    index
                )));
            }
            let pair = self.collect_values(item)?;
            let [key, value] = <[Value; 2]>::try_from(pair).map_err(|pair| {
                RuntimeError::value_error(format!(
                    "dictionary update sequence element #{} has length {}; 2 is required",
                    index,
                    pair.len()
                ))
            })?;
            pairs.push((key, value));
        }
        Ok(pairs)
    }

    /// Stable sort on `key(item)` using only `<`
    pub(crate) fn sort_values(
        &mut self,
        mut items: Vec<Value>,
        key: Option<Value>,
        reverse: bool,
    ) -> Result<Vec<Value>, RuntimeError> {
        let key = key.filter(|k| !matches!(k, Value::None));
        // Reversing before and after keeps equal items in their original order
        if reverse {
            items.reverse();
        }
        let mut decorated = Vec::with_capacity(items.len());
        for item in items {
            let sort_key = match &key {
                Some(key) => self.call_value(key, CallArgs::positional(vec![item.clone()]))?,
                None => item.clone(),
            };
            decorated.push((sort_key, item));
        }
        let sorted = self.merge_sort(decorated)?;
        let mut items: Vec<Value> = sorted.into_iter().map(|(_, item)| item).collect();
        if reverse {
            items.reverse();
        }
        Ok(items)
    }

    fn merge_sort(&mut self, mut items: Vec<(Value, Value)>) -> Result<Vec<(Value, Value)>, RuntimeError> {
        if items.len() <= 1 {
            return Ok(items);
        }
        let right = items.split_off(items.len() / 2);
        let left = self.merge_sort(items)?;
        let right = self.merge_sort(right)?;

        let mut merged = Vec::with_capacity(left.len() + right.len());
        let mut left = left.into_iter().peekable();
        let mut right = right.into_iter().peekable();
        loop {
            let take_right = match (left.peek(), right.peek()) {
                (Some(l), Some(r)) => {
                    self.budget.tick()?;
                    compare_values(&r.0, &l.0, CompareOp::Lt)?
                }
                (Some(_), None) => false,
                (None, Some(_)) => true,
                (None, None) => break,
            };
            let next = if take_right { right.next() } else { left.next() };
            merged.extend(next);
        }
        Ok(merged)
    }
}

/// `len(value)`
pub(crate) fn len_of(value: &Value) -> Result<usize, RuntimeError> {
    match value {
        Value::Str(s) => Ok(s.chars().count()),
        Value::Bytes(b) => Ok(b.len()),
        Value::List(list) => Ok(list.borrow().len()),
        Value::Tuple(items) => Ok(items.len()),
        Value::Dict(dict) => Ok(dict.borrow().len()),
        Value::Range(range) => Ok(range.len()),
        other => Err(RuntimeError::type_error(format!(
            "object of type '{}' has no len()",
            other.type_name()
        ))),
    }
}

fn builtin_range(args: &[Value]) -> Result<Value, RuntimeError> {
    let mut bounds = Vec::with_capacity(args.len());
    for arg in args {
        bounds.push(expect_int(arg, "")?);
    }
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step, ..] => (*start, *stop, *step),
        [] => {
            return Err(RuntimeError::type_error(
                "range expected at least 1 argument, got 0",
            ))
        }
    };
    if step == 0 {
        return Err(RuntimeError::value_error("range() arg 3 must not be zero"));
    }
    Ok(Value::Range(RangeValue { start, stop, step }))
}

fn separator(value: Option<Value>, what: &str, default: &str) -> Result<String, RuntimeError> {
    match value {
        None | Some(Value::None) => Ok(default.to_string()),
        Some(Value::Str(s)) => Ok(s.to_string()),
        Some(other) => Err(RuntimeError::type_error(format!(
            "{} must be None or a string, not {}",
            what,
            other.type_name()
        ))),
    }
}

/// `int("...", base)`; underscores may separate digits
fn parse_int(text: &str, base: u32) -> Result<i64, RuntimeError> {
    let invalid = || {
        RuntimeError::value_error(format!(
            "invalid literal for int() with base {}: {}",
            base,
            crate::value::str_repr(text)
        ))
    };

    let trimmed = text.trim();
    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let prefix = unsigned.get(..2).map(str::to_ascii_lowercase);
    let (radix, digits) = match prefix.as_deref() {
        Some("0x") if base == 0 || base == 16 => (16, &unsigned[2..]),
        Some("0o") if base == 0 || base == 8 => (8, &unsigned[2..]),
        Some("0b") if base == 0 || base == 2 => (2, &unsigned[2..]),
        _ => (if base == 0 { 10 } else { base }, unsigned),
    };
    // One underscore may follow a radix prefix
    let digits = if digits.len() < unsigned.len() {
        digits.strip_prefix('_').unwrap_or(digits)
    } else {
        digits
    };

    if digits.is_empty()
        || digits.starts_with('_')
        || digits.ends_with('_')
        || digits.contains("__")
        || !digits.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(invalid());
    }
    let cleaned: String = digits.chars().filter(|c| *c != '_').collect();
    // Base 0 forbids leading zeros on decimal literals
    if base == 0 && radix == 10 && cleaned.len() > 1 && cleaned.starts_with('0') && cleaned.chars().any(|c| c != '0') {
        return Err(invalid());
    }
    if !cleaned.chars().all(|c| c.is_digit(radix)) {
        return Err(invalid());
    }

    let magnitude = u128::from_str_radix(&cleaned, radix)
        .map_err(|_| RuntimeError::overflow("integer overflow"))?;
    i128::try_from(magnitude)
        .ok()
        .map(|m| if negative { -m } else { m })
        .and_then(|v| i64::try_from(v).ok())
        .ok_or_else(|| RuntimeError::overflow("integer overflow"))
}

/// Truncate a float toward zero
pub(crate) fn float_to_int(f: f64) -> Result<i64, RuntimeError> {
    if f.is_nan() {
        return Err(RuntimeError::value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() {
        return Err(RuntimeError::overflow("cannot convert float infinity to integer"));
    }
    let truncated = f.trunc();
    if truncated < -9.223_372_036_854_776e18 || truncated >= 9.223_372_036_854_776e18 {
        return Err(RuntimeError::overflow("integer overflow"));
    }
    Ok(truncated as i64)
}

fn builtin_float(value: &Value) -> Result<Value, RuntimeError> {
    match value {
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Int(i) => Ok(Value::Float(*i as f64)),
        Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::Str(text) => parse_float(text).map(Value::Float),
        Value::Bytes(bytes) => parse_float(&String::from_utf8_lossy(bytes)).map(Value::Float),
        other => Err(RuntimeError::type_error(format!(
            "float() argument must be a string or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn parse_float(text: &str) -> Result<f64, RuntimeError> {
    let invalid = || {
        RuntimeError::value_error(format!(
            "could not convert string to float: {}",
            crate::value::str_repr(text)
        ))
    };
    let trimmed = text.trim();
    let unsigned = trimmed.trim_start_matches(|c: char| c == '+' || c == '-');
    if unsigned.len() + 1 < trimmed.len() {
        return Err(invalid());
    }
    match unsigned.to_ascii_lowercase().as_str() {
        "inf" | "infinity" | "nan" => {}
        _ => {
            // Digits only, with single underscores strictly between digits
            let bytes = unsigned.as_bytes();
            for (i, b) in bytes.iter().enumerate() {
                if *b == b'_' {
                    let digit_before = i > 0 && bytes[i - 1].is_ascii_digit();
                    let digit_after = bytes.get(i + 1).is_some_and(u8::is_ascii_digit);
                    if !digit_before || !digit_after {
                        return Err(invalid());
                    }
                } else if !(b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-')) {
                    return Err(invalid());
                }
            }
        }
    }
    let cleaned: String = trimmed.chars().filter(|c| *c != '_').collect();
    cleaned.parse::<f64>().map_err(|_| invalid())
}

fn builtin_abs(value: &Value) -> Result<Value, RuntimeError> {
    match value {
        Value::Int(i) => i
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| RuntimeError::overflow("integer overflow")),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(RuntimeError::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

/// Round half to even
fn round_half_even(f: f64) -> f64 {
    let rounded = f.round();
    if (f - f.trunc()).abs() == 0.5 {
        2.0 * (f / 2.0).round()
    } else {
        rounded
    }
}

fn builtin_round(number: &Value, ndigits: Option<&Value>) -> Result<Value, RuntimeError> {
    let ndigits = match ndigits {
        None | Some(Value::None) => None,
        Some(n) => Some(expect_int(n, "")?),
    };
    match (number, ndigits) {
        (Value::Int(_) | Value::Bool(_), None) => Ok(Value::Int(number.as_int().unwrap_or(0))),
        (Value::Int(_) | Value::Bool(_), Some(n)) => {
            let x = number.as_int().unwrap_or(0);
            if n >= 0 {
                return Ok(Value::Int(x));
            }
            let Some(p) = u32::try_from(-n).ok().and_then(|e| 10i128.checked_pow(e)) else {
                return Ok(Value::Int(0));
            };
            let x = x as i128;
            let mut q = x.div_euclid(p);
            let r = x.rem_euclid(p);
            if 2 * r > p || (2 * r == p && q % 2 != 0) {
                q += 1;
            }
            i64::try_from(q * p)
                .map(Value::Int)
                .map_err(|_| RuntimeError::overflow("integer overflow"))
        }
        (Value::Float(f), None) => float_to_int(round_half_even(*f)).map(Value::Int),
        (Value::Float(f), Some(n)) => {
            if !f.is_finite() || n > 300 {
                return Ok(Value::Float(*f));
            }
            if n >= 0 {
                // Decimal formatting rounds the exact binary value correctly
                let text = format::format_value(&Value::Float(*f), &format!(".{}f", n))?;
                return Ok(Value::Float(text.parse().unwrap_or(*f)));
            }
            let scale = 10f64.powi((-n).min(308) as i32);
            Ok(Value::Float(round_half_even(f / scale) * scale))
        }
        (other, _) => Err(RuntimeError::new(
            ExceptionKind::TypeError,
            format!(
                "type {} doesn't define __round__ method",
                other.type_name()
            ),
        )),
    }
}

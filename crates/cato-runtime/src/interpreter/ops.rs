//! Operators, membership and subscripting

use crate::ast::{BinaryOp, UnaryOp};
use crate::interpreter::Interpreter;
use crate::stdlib::builtins::float_to_int;
use crate::stdlib::format::percent_format;
use crate::value::{values_equal, RangeValue, RuntimeError, Value};

fn int_overflow() -> RuntimeError {
    RuntimeError::overflow("integer overflow")
}

fn unsupported(op: BinaryOp, a: &Value, b: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        a.type_name(),
        b.type_name()
    ))
}

/// Python floor division on integers
fn floor_div(a: i64, b: i64) -> Option<i64> {
    let q = a.checked_div(b)?;
    if (a % b != 0) && ((a < 0) != (b < 0)) {
        Some(q - 1)
    } else {
        Some(q)
    }
}

/// Python modulo on integers (result takes the divisor's sign)
fn floor_mod(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && ((r < 0) != (b < 0)) {
        r + b
    } else {
        r
    }
}

fn float_mod(a: f64, b: f64) -> f64 {
    let r = a % b;
    if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
        r + b
    } else if r == 0.0 {
        0.0f64.copysign(b)
    } else {
        r
    }
}

fn is_number(value: &Value) -> bool {
    matches!(value, Value::Bool(_) | Value::Int(_) | Value::Float(_))
}

impl Interpreter {
    /// `a <op> b`
    pub(crate) fn binary_op(&mut self, op: BinaryOp, a: &Value, b: &Value) -> Result<Value, RuntimeError> {
        if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
            return self.int_op(op, x, y);
        }
        if is_number(a) && is_number(b) {
            let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            return float_op(op, x, y);
        }

        match (op, a, b) {
            (BinaryOp::Add, Value::Str(x), Value::Str(y)) => {
                self.new_str(format!("{}{}", x, y))
            }
            (BinaryOp::Add, Value::Bytes(x), Value::Bytes(y)) => {
                self.new_bytes([x.as_ref(), y.as_ref()].concat())
            }
            (BinaryOp::Add, Value::List(x), Value::List(y)) => {
                let mut items = x.borrow().0.clone();
                items.extend(y.borrow().iter().cloned());
                self.new_list(items)
            }
            (BinaryOp::Add, Value::Tuple(x), Value::Tuple(y)) => {
                let mut items = x.to_vec();
                items.extend(y.iter().cloned());
                self.new_tuple(items)
            }
            (BinaryOp::Add, Value::Str(_) | Value::List(_) | Value::Tuple(_), other) => {
                Err(RuntimeError::type_error(format!(
                    "can only concatenate {} (not \"{}\") to {}",
                    a.type_name(),
                    other.type_name(),
                    a.type_name()
                )))
            }
            (BinaryOp::Mul, seq, Value::Int(_) | Value::Bool(_))
                if matches!(seq, Value::Str(_) | Value::Bytes(_) | Value::List(_) | Value::Tuple(_)) =>
            {
                self.repeat(seq, b.as_int().unwrap_or(0))
            }
            (BinaryOp::Mul, Value::Int(_) | Value::Bool(_), seq)
                if matches!(seq, Value::Str(_) | Value::Bytes(_) | Value::List(_) | Value::Tuple(_)) =>
            {
                self.repeat(seq, a.as_int().unwrap_or(0))
            }
            (BinaryOp::Mod, Value::Str(template), args) => {
                let text = percent_format(template, args)?;
                self.new_str(text)
            }
            _ => Err(unsupported(op, a, b)),
        }
    }

    fn int_op(&mut self, op: BinaryOp, x: i64, y: i64) -> Result<Value, RuntimeError> {
        let result = match op {
            BinaryOp::Add => x.checked_add(y).ok_or_else(int_overflow)?,
            BinaryOp::Sub => x.checked_sub(y).ok_or_else(int_overflow)?,
            BinaryOp::Mul => x.checked_mul(y).ok_or_else(int_overflow)?,
            BinaryOp::Div => {
                if y == 0 {
                    return Err(RuntimeError::zero_division("division by zero"));
                }
                return Ok(Value::Float(x as f64 / y as f64));
            }
            BinaryOp::FloorDiv => {
                if y == 0 {
                    return Err(RuntimeError::zero_division(
                        "integer division or modulo by zero",
                    ));
                }
                floor_div(x, y).ok_or_else(int_overflow)?
            }
            BinaryOp::Mod => {
                if y == 0 {
                    return Err(RuntimeError::zero_division("integer modulo by zero"));
                }
                floor_mod(x, y)
            }
            BinaryOp::Pow => {
                if y < 0 {
                    if x == 0 {
                        return Err(RuntimeError::zero_division(
                            "0.0 cannot be raised to a negative power",
                        ));
                    }
                    return Ok(Value::Float((x as f64).powf(y as f64)));
                }
                let exp = u32::try_from(y).map_err(|_| int_overflow())?;
                x.checked_pow(exp).ok_or_else(int_overflow)?
            }
        };
        Ok(Value::Int(result))
    }

    /// `seq * n`
    fn repeat(&mut self, seq: &Value, count: i64) -> Result<Value, RuntimeError> {
        let count = count.max(0) as usize;
        match seq {
            Value::Str(s) => {
                let size = s.len().checked_mul(count).ok_or_else(int_overflow)?;
                self.budget.check_string(size)?;
                self.budget.allocate(size)?;
                Ok(Value::str(s.repeat(count)))
            }
            Value::Bytes(b) => {
                let size = b.len().checked_mul(count).ok_or_else(int_overflow)?;
                self.budget.check_string(size)?;
                self.budget.allocate(size)?;
                Ok(Value::Bytes(b.repeat(count).into()))
            }
            Value::List(list) => {
                let items = list.borrow().0.clone();
                let len = items.len().checked_mul(count).ok_or_else(int_overflow)?;
                self.budget.check_collection(len)?;
                self.budget.allocate_slots(len)?;
                Ok(Value::list(repeat_items(&items, count, len)))
            }
            Value::Tuple(items) => {
                let len = items.len().checked_mul(count).ok_or_else(int_overflow)?;
                self.budget.check_collection(len)?;
                self.budget.allocate_slots(len)?;
                Ok(Value::tuple(repeat_items(items, count, len)))
            }
            _ => Err(RuntimeError::type_error(format!(
                "can't multiply sequence by non-int of type '{}'",
                seq.type_name()
            ))),
        }
    }

    /// `-x`, `+x`, `not x`
    pub(crate) fn unary_op(&mut self, op: UnaryOp, operand: &Value) -> Result<Value, RuntimeError> {
        match (op, operand) {
            (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
            (UnaryOp::Neg, Value::Int(i)) => Ok(Value::Int(i.checked_neg().ok_or_else(int_overflow)?)),
            (UnaryOp::Neg, Value::Bool(b)) => Ok(Value::Int(-(*b as i64))),
            (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
            (UnaryOp::Pos, Value::Int(_) | Value::Float(_)) => Ok(operand.clone()),
            (UnaryOp::Pos, Value::Bool(b)) => Ok(Value::Int(*b as i64)),
            (op, value) => Err(RuntimeError::type_error(format!(
                "bad operand type for unary {}: '{}'",
                if op == UnaryOp::Neg { "-" } else { "+" },
                value.type_name()
            ))),
        }
    }

    /// `item in container`
    pub(crate) fn contains(&mut self, container: &Value, item: &Value) -> Result<bool, RuntimeError> {
        match container {
            Value::Str(haystack) => match item {
                Value::Str(needle) => {
                    self.budget.charge((haystack.len() / 64) as u64)?;
                    Ok(haystack.contains(needle.as_ref()))
                }
                other => Err(RuntimeError::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_name()
                ))),
            },
            Value::Bytes(haystack) => match item {
                Value::Bytes(needle) => Ok(needle.is_empty()
                    || haystack.windows(needle.len()).any(|w| w == needle.as_ref())),
                Value::Int(byte) => Ok(haystack.iter().any(|b| *b as i64 == *byte)),
                other => Err(RuntimeError::type_error(format!(
                    "a bytes-like object is required, not '{}'",
                    other.type_name()
                ))),
            },
            Value::List(list) => {
                let items = list.borrow().0.clone();
                self.sequence_contains(&items, item)
            }
            Value::Tuple(items) => self.sequence_contains(items, item),
            Value::Dict(dict) => dict.borrow().contains(item),
            Value::Range(range) => match item {
                Value::Int(_) | Value::Bool(_) => Ok(range.contains(item.as_int().unwrap_or(0))),
                Value::Float(f) if f.fract() == 0.0 => {
                    Ok(float_to_int(*f).is_ok_and(|n| range.contains(n)))
                }
                _ => Ok(false),
            },
            other => Err(RuntimeError::type_error(format!(
                "argument of type '{}' is not iterable",
                other.type_name()
            ))),
        }
    }

    fn sequence_contains(&mut self, items: &[Value], item: &Value) -> Result<bool, RuntimeError> {
        for candidate in items {
            self.budget.tick()?;
            if values_equal(candidate, item)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // === Subscripts ===

    /// `object[index]`
    pub(crate) fn get_item(&mut self, object: &Value, index: &Value) -> Result<Value, RuntimeError> {
        match object {
            Value::List(list) => {
                let list = list.borrow();
                let i = sequence_index(index, list.len(), "list")?;
                Ok(list[i].clone())
            }
            Value::Tuple(items) => {
                let i = sequence_index(index, items.len(), "tuple")?;
                Ok(items[i].clone())
            }
            Value::Str(text) => {
                let Some(n) = index.as_int() else {
                    return Err(RuntimeError::type_error(format!(
                        "string indices must be integers, not '{}'",
                        index.type_name()
                    )));
                };
                let len = text.chars().count();
                let i = normalize(n, len)
                    .ok_or_else(|| RuntimeError::index_error("string index out of range"))?;
                let c = text.chars().nth(i).unwrap_or_default();
                Ok(Value::str(c.to_string()))
            }
            Value::Bytes(bytes) => {
                let i = sequence_index(index, bytes.len(), "bytes")?;
                Ok(Value::Int(bytes[i] as i64))
            }
            Value::Range(range) => {
                let i = sequence_index(index, range.len(), "range object")?;
                Ok(Value::Int(range.get(i)))
            }
            Value::Dict(dict) => {
                let found = dict.borrow().get(index)?;
                found.ok_or_else(|| RuntimeError::key_error(index.clone()))
            }
            other => Err(RuntimeError::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    /// `object[lower:upper:step]`
    pub(crate) fn get_slice(
        &mut self,
        object: &Value,
        lower: Option<i64>,
        upper: Option<i64>,
        step: Option<i64>,
    ) -> Result<Value, RuntimeError> {
        match object {
            Value::List(list) => {
                let items = list.borrow().0.clone();
                let picked = pick(&items, slice_indices(items.len(), lower, upper, step)?);
                self.new_list(picked)
            }
            Value::Tuple(items) => {
                let picked = pick(items, slice_indices(items.len(), lower, upper, step)?);
                self.new_tuple(picked)
            }
            Value::Str(text) => {
                let chars: Vec<char> = text.chars().collect();
                let (start, stop, step) = slice_indices(chars.len(), lower, upper, step)?;
                let mut out = String::new();
                for i in SliceRange::new(start, stop, step) {
                    out.push(chars[i]);
                }
                Ok(Value::str(out))
            }
            Value::Bytes(bytes) => {
                let (start, stop, step) = slice_indices(bytes.len(), lower, upper, step)?;
                let out: Vec<u8> = SliceRange::new(start, stop, step).map(|i| bytes[i]).collect();
                Ok(Value::Bytes(out.into()))
            }
            Value::Range(range) => {
                let (start, stop, s) = slice_indices(range.len(), lower, upper, step)?;
                let at = |i: i64| -> Result<i64, RuntimeError> {
                    i.checked_mul(range.step)
                        .and_then(|offset| offset.checked_add(range.start))
                        .ok_or_else(int_overflow)
                };
                Ok(Value::Range(RangeValue {
                    start: at(start)?,
                    stop: at(stop)?,
                    step: range.step.checked_mul(s).ok_or_else(int_overflow)?,
                }))
            }
            Value::Dict(_) => Err(RuntimeError::type_error("unhashable type: 'slice'")),
            other => Err(RuntimeError::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    /// `object[index] = value`
    pub(crate) fn set_item(&mut self, object: &Value, index: &Value, value: Value) -> Result<(), RuntimeError> {
        match object {
            Value::List(list) => {
                let len = list.borrow().len();
                let i = match index.as_int() {
                    Some(n) => normalize(n, len).ok_or_else(|| {
                        RuntimeError::index_error("list assignment index out of range")
                    })?,
                    None => return Err(index_type_error("list", index)),
                };
                list.borrow_mut()[i] = value;
                Ok(())
            }
            Value::Dict(dict) => {
                if dict.borrow().is_frozen() {
                    return Err(RuntimeError::type_error(
                        "'request' object does not support item assignment",
                    ));
                }
                let len = dict.borrow().len();
                self.budget.check_collection(len + 1)?;
                dict.borrow_mut().insert(index.clone(), value)?;
                if dict.borrow().len() > len {
                    self.budget.allocate_entries(1)?;
                }
                Ok(())
            }
            other => Err(RuntimeError::type_error(format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ))),
        }
    }

    /// `list[lower:upper:step] = iterable`
    pub(crate) fn set_slice(
        &mut self,
        object: &Value,
        bounds: (Option<i64>, Option<i64>, Option<i64>),
        value: &Value,
    ) -> Result<(), RuntimeError> {
        let Value::List(list) = object else {
            return Err(RuntimeError::type_error(format!(
                "'{}' object does not support item assignment",
                object.type_name()
            )));
        };
        let replacement = self.collect_values(value)?;
        let len = list.borrow().len();
        let (start, stop, step) = slice_indices(len, bounds.0, bounds.1, bounds.2)?;

        if step == 1 {
            let start = start as usize;
            let stop = (stop as usize).max(start);
            let new_len = len - (stop - start) + replacement.len();
            self.budget.check_collection(new_len)?;
            self.budget.allocate_slots(replacement.len())?;
            let removed: Vec<Value> = list.borrow_mut().splice(start..stop, replacement).collect();
            drop(removed);
            return Ok(());
        }

        let positions: Vec<usize> = SliceRange::new(start, stop, step).collect();
        if positions.len() != replacement.len() {
            return Err(RuntimeError::value_error(format!(
                "attempt to assign sequence of size {} to extended slice of size {}",
                replacement.len(),
                positions.len()
            )));
        }
        let mut items = list.borrow_mut();
        for (position, item) in positions.into_iter().zip(replacement) {
            items[position] = item;
        }
        Ok(())
    }

    /// `del object[index]`
    pub(crate) fn del_item(&mut self, object: &Value, index: &Value) -> Result<(), RuntimeError> {
        match object {
            Value::List(list) => {
                let len = list.borrow().len();
                let i = match index.as_int() {
                    Some(n) => normalize(n, len).ok_or_else(|| {
                        RuntimeError::index_error("list assignment index out of range")
                    })?,
                    None => return Err(index_type_error("list", index)),
                };
                let removed = list.borrow_mut().remove(i);
                drop(removed);
                Ok(())
            }
            Value::Dict(dict) => {
                if dict.borrow().is_frozen() {
                    return Err(RuntimeError::type_error(
                        "'request' object doesn't support item deletion",
                    ));
                }
                let removed = dict.borrow_mut().remove(index)?;
                match removed {
                    Some(_) => Ok(()),
                    None => Err(RuntimeError::key_error(index.clone())),
                }
            }
            other => Err(RuntimeError::type_error(format!(
                "'{}' object doesn't support item deletion",
                other.type_name()
            ))),
        }
    }

    /// `del list[lower:upper:step]`
    pub(crate) fn del_slice(
        &mut self,
        object: &Value,
        bounds: (Option<i64>, Option<i64>, Option<i64>),
    ) -> Result<(), RuntimeError> {
        let Value::List(list) = object else {
            return Err(RuntimeError::type_error(format!(
                "'{}' object doesn't support item deletion",
                object.type_name()
            )));
        };
        let len = list.borrow().len();
        let (start, stop, step) = slice_indices(len, bounds.0, bounds.1, bounds.2)?;
        let mut doomed: Vec<usize> = SliceRange::new(start, stop, step).collect();
        doomed.sort_unstable();
        let removed: Vec<Value> = {
            let mut items = list.borrow_mut();
            let mut removed = Vec::with_capacity(doomed.len());
            for position in doomed.into_iter().rev() {
                removed.push(items.remove(position));
            }
            removed
        };
        drop(removed);
        Ok(())
    }
}

fn repeat_items(items: &[Value], count: usize, len: usize) -> Vec<Value> {
    let mut out = Vec::with_capacity(len);
    for _ in 0..count {
        out.extend(items.iter().cloned());
    }
    out
}

fn float_op(op: BinaryOp, x: f64, y: f64) -> Result<Value, RuntimeError> {
    let result = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => {
            if y == 0.0 {
                return Err(RuntimeError::zero_division("float division by zero"));
            }
            x / y
        }
        BinaryOp::FloorDiv => {
            if y == 0.0 {
                return Err(RuntimeError::zero_division("float floor division by zero"));
            }
            (x / y).floor()
        }
        BinaryOp::Mod => {
            if y == 0.0 {
                return Err(RuntimeError::zero_division("float modulo by zero"));
            }
            float_mod(x, y)
        }
        BinaryOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Err(RuntimeError::zero_division(
                    "0.0 cannot be raised to a negative power",
                ));
            }
            if x < 0.0 && y.fract() != 0.0 {
                return Err(RuntimeError::value_error(
                    "negative number cannot be raised to a fractional power",
                ));
            }
            let result = x.powf(y);
            if result.is_infinite() && x.is_finite() && y.is_finite() {
                return Err(RuntimeError::overflow("Numerical result out of range"));
            }
            result
        }
    };
    Ok(Value::Float(result))
}

/// Resolve a possibly negative index against `len`
fn normalize(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { index + len } else { index };
    if (0..len).contains(&index) {
        Some(index as usize)
    } else {
        None
    }
}

fn index_type_error(kind: &str, index: &Value) -> RuntimeError {
    RuntimeError::type_error(format!(
        "{} indices must be integers or slices, not {}",
        kind,
        index.type_name()
    ))
}

fn sequence_index(index: &Value, len: usize, kind: &str) -> Result<usize, RuntimeError> {
    let Some(n) = index.as_int() else {
        return Err(index_type_error(kind, index));
    };
    normalize(n, len).ok_or_else(|| RuntimeError::index_error(format!("{} index out of range", kind)))
}

/// Normalized `(start, stop, step)` for a slice over `len` items
pub(crate) fn slice_indices(
    len: usize,
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
) -> Result<(i64, i64, i64), RuntimeError> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(RuntimeError::value_error("slice step cannot be zero"));
    }
    let len = len as i64;
    let clamp = |value: i64, low: i64, high: i64| -> i64 {
        let value = if value < 0 { value.saturating_add(len) } else { value };
        value.clamp(low, high)
    };
    let (start, stop) = if step > 0 {
        (
            lower.map_or(0, |v| clamp(v, 0, len)),
            upper.map_or(len, |v| clamp(v, 0, len)),
        )
    } else {
        (
            lower.map_or(len - 1, |v| clamp(v, -1, len - 1)),
            upper.map_or(-1, |v| clamp(v, -1, len - 1)),
        )
    };
    Ok((start, stop, step))
}

/// Positions selected by a normalized slice
struct SliceRange {
    next: i64,
    stop: i64,
    step: i64,
}

impl SliceRange {
    fn new(start: i64, stop: i64, step: i64) -> Self {
        Self {
            next: start,
            stop,
            step,
        }
    }
}

impl Iterator for SliceRange {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let more = if self.step > 0 {
            self.next < self.stop
        } else {
            self.next > self.stop
        };
        if !more {
            return None;
        }
        let current = self.next;
        self.next = self.next.saturating_add(self.step);
        Some(current as usize)
    }
}

fn pick(items: &[Value], (start, stop, step): (i64, i64, i64)) -> Vec<Value> {
    SliceRange::new(start, stop, step)
        .map(|i| items[i].clone())
        .collect()
}

//! String formatting: format specs, `%` formatting and `str.format`

use crate::stdlib::builtins::float_to_int;
use crate::value::{check_text, float_repr, Dict, ExceptionKind, RuntimeError, Value};

/// Parsed format spec (`[[fill]align][sign][#][0][width][,|_][.precision][type]`)
#[derive(Debug, Clone, PartialEq)]
pub struct FormatSpec {
    pub fill: char,
    pub align: Option<char>,
    pub sign: char,
    pub alternate: bool,
    pub width: usize,
    pub grouping: Option<char>,
    pub precision: Option<usize>,
    pub kind: Option<char>,
}

impl Default for FormatSpec {
    fn default() -> Self {
        Self {
            fill: ' ',
            align: None,
            sign: '-',
            alternate: false,
            width: 0,
            grouping: None,
            precision: None,
            kind: None,
        }
    }
}

/// Widths and precisions above this are rejected
const MAX_WIDTH: usize = 1 << 20;

fn is_align(c: char) -> bool {
    matches!(c, '<' | '>' | '^' | '=')
}

fn invalid_spec() -> RuntimeError {
    RuntimeError::value_error("Invalid format specifier")
}

pub fn parse_spec(spec: &str) -> Result<FormatSpec, RuntimeError> {
    let chars: Vec<char> = spec.chars().collect();
    let mut result = FormatSpec::default();
    let mut i = 0;

    if chars.len() >= 2 && is_align(chars[1]) {
        result.fill = chars[0];
        result.align = Some(chars[1]);
        i = 2;
    } else if !chars.is_empty() && is_align(chars[0]) {
        result.align = Some(chars[0]);
        i = 1;
    }

    if let Some(&c) = chars.get(i) {
        if matches!(c, '+' | '-' | ' ') {
            result.sign = c;
            i += 1;
        }
    }
    if chars.get(i) == Some(&'#') {
        result.alternate = true;
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        if result.align.is_none() {
            result.fill = '0';
            result.align = Some('=');
        }
        i += 1;
    }

    let start = i;
    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        i += 1;
    }
    if i > start {
        result.width = parse_count(&chars[start..i])?;
    }

    if let Some(&c) = chars.get(i) {
        if c == ',' || c == '_' {
            result.grouping = Some(c);
            i += 1;
        }
    }

    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        if i == start {
            return Err(RuntimeError::value_error("Format specifier missing precision"));
        }
        result.precision = Some(parse_count(&chars[start..i])?);
    }

    match &chars[i..] {
        [] => {}
        [kind] => result.kind = Some(*kind),
        _ => return Err(invalid_spec()),
    }
    Ok(result)
}

fn parse_count(digits: &[char]) -> Result<usize, RuntimeError> {
    let text: String = digits.iter().collect();
    match text.parse::<usize>() {
        Ok(n) if n <= MAX_WIDTH => Ok(n),
        _ => Err(RuntimeError::value_error("Too many decimal digits in format string")),
    }
}

fn unknown_code(kind: char, value: &Value) -> RuntimeError {
    RuntimeError::value_error(format!(
        "Unknown format code '{}' for object of type '{}'",
        kind,
        value.type_name()
    ))
}

/// `format(value, spec)`, as used by f-strings and `str.format`
pub fn format_value(value: &Value, spec: &str) -> Result<String, RuntimeError> {
    if spec.is_empty() {
        return value.to_str();
    }
    let spec = parse_spec(spec)?;
    let formatted = match value {
        Value::Bool(_) if spec.kind.is_none() => {
            let text = value.to_str()?;
            pad(&text, &spec, '<')
        }
        Value::Int(_) | Value::Bool(_) => format_int(value, &spec)?,
        Value::Float(f) => format_float(*f, &spec, value)?,
        Value::Str(s) => format_str(s, &spec, value)?,
        other => {
            return Err(RuntimeError::type_error(format!(
                "unsupported format string passed to {}.__format__",
                other.type_name()
            )))
        }
    };
    check_text(formatted.len())?;
    Ok(formatted)
}

fn format_str(s: &str, spec: &FormatSpec, value: &Value) -> Result<String, RuntimeError> {
    match spec.kind {
        None | Some('s') => {}
        Some(kind) => return Err(unknown_code(kind, value)),
    }
    if spec.sign != '-' {
        return Err(RuntimeError::value_error(
            "Sign not allowed in string format specifier",
        ));
    }
    if spec.align == Some('=') {
        return Err(RuntimeError::value_error(
            "'=' alignment not allowed in string format specifier",
        ));
    }
    let text: String = match spec.precision {
        Some(p) => s.chars().take(p).collect(),
        None => s.to_string(),
    };
    Ok(pad(&text, spec, '<'))
}

fn format_int(value: &Value, spec: &FormatSpec) -> Result<String, RuntimeError> {
    let n = value.as_int().unwrap_or(0);
    let (body, prefix) = match spec.kind {
        None | Some('d') | Some('n') => {
            if spec.precision.is_some() {
                return Err(RuntimeError::value_error(
                    "Precision not allowed in integer format specifier",
                ));
            }
            (group(&n.unsigned_abs().to_string(), spec.grouping, 3), "")
        }
        Some('x') => (radix(n, 16, spec, false), "0x"),
        Some('X') => (radix(n, 16, spec, true), "0X"),
        Some('o') => (radix(n, 8, spec, false), "0o"),
        Some('b') => (radix(n, 2, spec, false), "0b"),
        Some('c') => {
            let c = u32::try_from(n)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| RuntimeError::overflow("%c arg not in range(0x110000)"))?;
            return Ok(pad(&c.to_string(), spec, '<'));
        }
        Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%') => {
            return format_float(n as f64, spec, value);
        }
        Some(kind) => return Err(unknown_code(kind, value)),
    };
    let prefix = if spec.alternate { prefix } else { "" };
    Ok(finish_number(n < 0, prefix, &body, spec))
}

fn radix(n: i64, base: u32, spec: &FormatSpec, upper: bool) -> String {
    let magnitude = n.unsigned_abs();
    let digits = match base {
        16 if upper => format!("{:X}", magnitude),
        16 => format!("{:x}", magnitude),
        8 => format!("{:o}", magnitude),
        _ => format!("{:b}", magnitude),
    };
    match spec.grouping {
        Some('_') => group(&digits, Some('_'), 4),
        _ => digits,
    }
}

/// Insert a separator every `size` digits from the right
fn group(digits: &str, separator: Option<char>, size: usize) -> String {
    let Some(separator) = separator else {
        return digits.to_string();
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / size);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % size == 0 {
            out.push(separator);
        }
        out.push(c);
    }
    out
}

fn format_float(f: f64, spec: &FormatSpec, value: &Value) -> Result<String, RuntimeError> {
    let negative = f.is_sign_negative() && !(f.is_nan());
    let magnitude = f.abs();
    let upper = matches!(spec.kind, Some('F' | 'E' | 'G'));

    let body = if !magnitude.is_finite() {
        let text = if magnitude.is_nan() { "nan" } else { "inf" };
        let text = if upper { text.to_uppercase() } else { text.to_string() };
        match spec.kind {
            Some('%') => format!("{}%", text),
            _ => text,
        }
    } else {
        match spec.kind {
            Some('f' | 'F') => fixed(magnitude, spec.precision.unwrap_or(6), spec),
            Some('e' | 'E') => {
                let text = exponent(magnitude, spec.precision.unwrap_or(6), spec.alternate);
                if upper {
                    text.to_uppercase()
                } else {
                    text
                }
            }
            Some('g' | 'G') => {
                let text = general(magnitude, spec.precision.unwrap_or(6), spec);
                if upper {
                    text.to_uppercase()
                } else {
                    text
                }
            }
            Some('%') => format!("{}%", fixed(magnitude * 100.0, spec.precision.unwrap_or(6), spec)),
            None => match spec.precision {
                Some(p) => general(magnitude, p, spec),
                None => {
                    let repr = float_repr(magnitude);
                    match repr.split_once('.') {
                        Some((int_part, rest)) if spec.grouping.is_some() => {
                            format!("{}.{}", group(int_part, spec.grouping, 3), rest)
                        }
                        _ => repr,
                    }
                }
            },
            Some(kind) => return Err(unknown_code(kind, value)),
        }
    };
    Ok(finish_number(negative, "", &body, spec))
}

fn fixed(magnitude: f64, precision: usize, spec: &FormatSpec) -> String {
    let text = format!("{:.*}", precision, magnitude);
    let text = match text.split_once('.') {
        Some((int_part, frac)) => format!("{}.{}", group(int_part, spec.grouping, 3), frac),
        None => group(&text, spec.grouping, 3),
    };
    if spec.alternate && precision == 0 {
        format!("{}.", text)
    } else {
        text
    }
}

/// Scientific notation with a signed, two-digit exponent
fn exponent(magnitude: f64, precision: usize, alternate: bool) -> String {
    let text = format!("{:.*e}", precision, magnitude);
    let (mantissa, exp) = text.split_once('e').unwrap_or((&text, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let mantissa = if alternate && precision == 0 {
        format!("{}.", mantissa)
    } else {
        mantissa.to_string()
    };
    format!(
        "{}e{}{:02}",
        mantissa,
        if exp < 0 { '-' } else { '+' },
        exp.abs()
    )
}

fn general(magnitude: f64, precision: usize, spec: &FormatSpec) -> String {
    let precision = precision.max(1);
    if magnitude == 0.0 {
        return if spec.alternate {
            format!("0.{}", "0".repeat(precision - 1))
        } else {
            "0".to_string()
        };
    }
    let scientific = format!("{:.*e}", precision - 1, magnitude);
    let exp: i32 = scientific
        .split_once('e')
        .and_then(|(_, exp)| exp.parse().ok())
        .unwrap_or(0);
    let text = if exp >= -4 && exp < precision as i32 {
        fixed(magnitude, (precision as i32 - 1 - exp) as usize, spec)
    } else {
        exponent(magnitude, precision - 1, false)
    };
    if spec.alternate {
        return text;
    }
    strip_zeros(&text)
}

/// Drop trailing fractional zeros (and a bare point) from a number
fn strip_zeros(text: &str) -> String {
    let (mantissa, exp) = match text.find('e') {
        Some(index) => text.split_at(index),
        None => (text, ""),
    };
    let mantissa = if mantissa.contains('.') {
        mantissa.trim_end_matches('0').trim_end_matches('.')
    } else {
        mantissa
    };
    format!("{}{}", mantissa, exp)
}

/// Apply sign, prefix and padding to a formatted magnitude
fn finish_number(negative: bool, prefix: &str, body: &str, spec: &FormatSpec) -> String {
    let sign = if negative {
        "-"
    } else {
        match spec.sign {
            '+' => "+",
            ' ' => " ",
            _ => "",
        }
    };
    if spec.align == Some('=') {
        let head = format!("{}{}", sign, prefix);
        let used = head.chars().count() + body.chars().count();
        let fill: String = std::iter::repeat(spec.fill)
            .take(spec.width.saturating_sub(used))
            .collect();
        return format!("{}{}{}", head, fill, body);
    }
    pad(&format!("{}{}{}", sign, prefix, body), spec, '>')
}

fn pad(text: &str, spec: &FormatSpec, default_align: char) -> String {
    let len = text.chars().count();
    if len >= spec.width {
        return text.to_string();
    }
    let total = spec.width - len;
    let (left, right) = match spec.align.unwrap_or(default_align) {
        '<' => (0, total),
        '^' => (total / 2, total - total / 2),
        _ => (total, 0),
    };
    let mut out = String::with_capacity(text.len() + total);
    out.extend(std::iter::repeat(spec.fill).take(left));
    out.push_str(text);
    out.extend(std::iter::repeat(spec.fill).take(right));
    out
}

// === Percent formatting ===

/// `template % args`
pub fn percent_format(template: &str, args: &Value) -> Result<String, RuntimeError> {
    let positional: Vec<Value> = match args {
        Value::Tuple(items) => items.to_vec(),
        other => vec![other.clone()],
    };
    let mapping = match args {
        Value::Dict(dict) => Some(dict.clone()),
        _ => None,
    };
    let mut next = 0usize;
    let mut used_mapping = false;
    let mut out = String::new();
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut key = None;
        if chars.get(i) == Some(&'(') {
            let start = i + 1;
            let mut depth = 1;
            let mut j = start;
            while j < chars.len() && depth > 0 {
                match chars[j] {
                    '(' => depth += 1,
                    ')' => depth -= 1,
                    _ => {}
                }
                j += 1;
            }
            if depth > 0 {
                return Err(RuntimeError::value_error("incomplete format key"));
            }
            key = Some(chars[start..j - 1].iter().collect::<String>());
            i = j;
        }

        let mut spec = FormatSpec::default();
        while let Some(&flag) = chars.get(i) {
            match flag {
                '-' => spec.align = Some('<'),
                '+' => spec.sign = '+',
                ' ' if spec.sign != '+' => spec.sign = ' ',
                ' ' => {}
                '#' => spec.alternate = true,
                '0' => {
                    if spec.align.is_none() {
                        spec.fill = '0';
                        spec.align = Some('=');
                    }
                }
                _ => break,
            }
            i += 1;
        }
        let start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        if i > start {
            spec.width = parse_count(&chars[start..i])?;
        }
        if chars.get(i) == Some(&'.') {
            i += 1;
            let start = i;
            while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
                i += 1;
            }
            spec.precision = Some(if i > start {
                parse_count(&chars[start..i])?
            } else {
                0
            });
        }
        // '-' left-aligns with spaces even when '0' was given
        if spec.align == Some('<') {
            spec.fill = ' ';
        }

        let Some(&conversion) = chars.get(i) else {
            return Err(RuntimeError::value_error("incomplete format"));
        };
        i += 1;
        if conversion == '%' {
            out.push('%');
            continue;
        }

        let arg = match &key {
            Some(key) => {
                used_mapping = true;
                let Some(mapping) = &mapping else {
                    return Err(RuntimeError::type_error("format requires a mapping"));
                };
                let value = mapping.borrow().get(&Value::str(key.as_str()))?;
                value.ok_or_else(|| RuntimeError::key_error(Value::str(key.as_str())))?
            }
            None => {
                let arg = positional.get(next).cloned().ok_or_else(|| {
                    RuntimeError::type_error("not enough arguments for format string")
                })?;
                next += 1;
                arg
            }
        };

        out.push_str(&percent_one(conversion, &arg, &mut spec)?);
        check_text(out.len())?;
    }

    let consumed_all = match args {
        Value::Tuple(items) => next == items.len(),
        Value::Dict(_) => true,
        _ => next == 1 || used_mapping,
    };
    if !consumed_all {
        return Err(RuntimeError::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

fn percent_one(conversion: char, arg: &Value, spec: &mut FormatSpec) -> Result<String, RuntimeError> {
    match conversion {
        's' | 'r' | 'a' => {
            let text = if conversion == 's' { arg.to_str()? } else { arg.repr()? };
            let text: String = match spec.precision {
                Some(p) => text.chars().take(p).collect(),
                None => text,
            };
            spec.fill = ' ';
            if spec.align == Some('=') {
                spec.align = None;
            }
            Ok(pad(&text, spec, '>'))
        }
        'd' | 'i' | 'u' => {
            let n = match arg {
                Value::Int(_) | Value::Bool(_) => arg.as_int().unwrap_or(0),
                Value::Float(f) => float_to_int(*f)?,
                other => {
                    return Err(RuntimeError::type_error(format!(
                        "%{} format: a real number is required, not {}",
                        conversion,
                        other.type_name()
                    )))
                }
            };
            let body = n.unsigned_abs().to_string();
            let body = match spec.precision {
                Some(p) if body.len() < p => format!("{}{}", "0".repeat(p - body.len()), body),
                _ => body,
            };
            spec.precision = None;
            Ok(finish_number(n < 0, "", &body, spec))
        }
        'x' | 'X' | 'o' => {
            let Some(n) = arg.as_int() else {
                return Err(RuntimeError::type_error(format!(
                    "%{} format: an integer is required, not {}",
                    conversion,
                    arg.type_name()
                )));
            };
            let prefix = match conversion {
                'x' => "0x",
                'X' => "0X",
                _ => "0o",
            };
            let body = radix(n, if conversion == 'o' { 8 } else { 16 }, spec, conversion == 'X');
            let prefix = if spec.alternate { prefix } else { "" };
            Ok(finish_number(n < 0, prefix, &body, spec))
        }
        'e' | 'E' | 'f' | 'F' | 'g' | 'G' => {
            let Some(f) = arg.as_f64() else {
                return Err(RuntimeError::type_error(format!(
                    "must be real number, not {}",
                    arg.type_name()
                )));
            };
            spec.kind = Some(conversion);
            format_float(f, spec, arg)
        }
        'c' => match arg {
            Value::Str(s) if s.chars().count() == 1 => Ok(pad(s, spec, '>')),
            Value::Int(_) => {
                spec.kind = Some('c');
                format_int(arg, spec)
            }
            _ => Err(RuntimeError::type_error("%c requires int or char")),
        },
        other => Err(RuntimeError::value_error(format!(
            "unsupported format character '{}' (0x{:x})",
            other, other as u32
        ))),
    }
}

// === str.format ===

/// `template.format(*args, **kwargs)`
pub fn str_format(
    template: &str,
    args: &[Value],
    kwargs: &[(String, Value)],
) -> Result<String, RuntimeError> {
    let chars: Vec<char> = template.chars().collect();
    let mut out = String::new();
    let mut auto_index = 0usize;
    let mut numbering: Option<bool> = None;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                out.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                out.push('}');
                i += 2;
            }
            '}' => {
                return Err(RuntimeError::value_error(
                    "Single '}' encountered in format string",
                ))
            }
            '{' => {
                let start = i + 1;
                let mut j = start;
                let mut depth = 1;
                while j < chars.len() {
                    match chars[j] {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(RuntimeError::value_error(
                        "expected '}' before end of string",
                    ));
                }
                let field: String = chars[start..j].iter().collect();
                i = j + 1;

                let (name, conversion, spec) = split_field(&field)?;
                if spec.contains('{') {
                    return Err(RuntimeError::value_error(
                        "nested replacement fields are not supported",
                    ));
                }
                let value = resolve_field(name, args, kwargs, &mut auto_index, &mut numbering)?;
                let value = match conversion {
                    Some('r') | Some('a') => Value::str(value.repr()?),
                    Some('s') => Value::str(value.to_str()?),
                    Some(other) => {
                        return Err(RuntimeError::value_error(format!(
                            "Unknown conversion specifier {}",
                            other
                        )))
                    }
                    None => value,
                };
                out.push_str(&format_value(&value, spec)?);
                check_text(out.len())?;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok(out)
}

/// Split `name!conv:spec`
fn split_field(field: &str) -> Result<(&str, Option<char>, &str), RuntimeError> {
    let (head, spec) = match field.find(':') {
        Some(index) => (&field[..index], &field[index + 1..]),
        None => (field, ""),
    };
    match head.split_once('!') {
        Some((name, conv)) => {
            let mut conv_chars = conv.chars();
            match (conv_chars.next(), conv_chars.next()) {
                (Some(c), None) => Ok((name, Some(c), spec)),
                _ => Err(RuntimeError::value_error(
                    "expected ':' after conversion specifier",
                )),
            }
        }
        None => Ok((head, None, spec)),
    }
}

fn resolve_field(
    field: &str,
    args: &[Value],
    kwargs: &[(String, Value)],
    auto_index: &mut usize,
    numbering: &mut Option<bool>,
) -> Result<Value, RuntimeError> {
    let (name, index_part) = match field.find('[') {
        Some(at) => (&field[..at], Some(&field[at..])),
        None => (field, None),
    };
    if name.contains('.') {
        return Err(RuntimeError::attribute_error(
            "attribute access in format fields is not supported",
        ));
    }

    let automatic = name.is_empty();
    match numbering {
        Some(previous) if *previous != automatic => {
            let message = if automatic {
                "cannot switch from manual field specification to automatic field numbering"
            } else {
                "cannot switch from automatic field numbering to manual field specification"
            };
            if automatic || name.chars().all(|c| c.is_ascii_digit()) {
                return Err(RuntimeError::value_error(message));
            }
        }
        _ => {}
    }

    let mut value = if automatic {
        *numbering = Some(true);
        let index = *auto_index;
        *auto_index += 1;
        positional(args, index)?
    } else if let Ok(index) = name.parse::<usize>() {
        *numbering = Some(false);
        positional(args, index)?
    } else {
        kwargs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
            .ok_or_else(|| RuntimeError::key_error(Value::str(name)))?
    };

    // `[key]` lookups, e.g. "{0[name]}" or "{items[0]}"
    let mut rest = index_part.unwrap_or("");
    while let Some(stripped) = rest.strip_prefix('[') {
        let close = stripped
            .find(']')
            .ok_or_else(|| RuntimeError::value_error("Missing ']' in format string"))?;
        let key = &stripped[..close];
        rest = &stripped[close + 1..];
        value = index_field(&value, key)?;
    }
    if !rest.is_empty() {
        return Err(RuntimeError::value_error(
            "Only '.' or '[' may follow ']' in format field specifier",
        ));
    }
    Ok(value)
}

fn positional(args: &[Value], index: usize) -> Result<Value, RuntimeError> {
    args.get(index).cloned().ok_or_else(|| {
        RuntimeError::index_error(format!(
            "Replacement index {} out of range for positional args tuple",
            index
        ))
    })
}

fn index_field(value: &Value, key: &str) -> Result<Value, RuntimeError> {
    match value {
        Value::Dict(dict) => {
            let key_value = match key.parse::<i64>() {
                Ok(n) => Value::Int(n),
                Err(_) => Value::str(key),
            };
            let found = dict.borrow().get(&key_value)?;
            found.ok_or_else(|| RuntimeError::key_error(key_value))
        }
        Value::List(_) | Value::Tuple(_) => {
            let index: usize = key.parse().map_err(|_| {
                RuntimeError::type_error(format!(
                    "{} indices must be integers or slices, not str",
                    value.type_name()
                ))
            })?;
            let item = match value {
                Value::List(list) => list.borrow().get(index).cloned(),
                Value::Tuple(items) => items.get(index).cloned(),
                _ => None,
            };
            item.ok_or_else(|| {
                RuntimeError::index_error(format!("{} index out of range", value.type_name()))
            })
        }
        other => Err(RuntimeError::new(
            ExceptionKind::TypeError,
            format!("'{}' object is not subscriptable", other.type_name()),
        )),
    }
}

/// `dict` view used by `%(name)s` when the script passes keyword data
pub fn mapping_from(pairs: &[(String, Value)]) -> Result<Value, RuntimeError> {
    let mut dict = Dict::new();
    for (key, value) in pairs {
        dict.insert(Value::str(key.as_str()), value.clone())?;
    }
    Ok(Value::dict(dict))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Value::Float(3.14159), ".2f", "3.14")]
    #[case(Value::Float(2.675), ".2f", "2.67")]
    #[case(Value::Int(42), "05d", "00042")]
    #[case(Value::Int(-42), "+06d", "-00042")]
    #[case(Value::Int(1234567), ",", "1,234,567")]
    #[case(Value::Float(1234.5), ",.2f", "1,234.50")]
    #[case(Value::Int(255), "#x", "0xff")]
    #[case(Value::Int(5), "b", "101")]
    #[case(Value::str("ab"), ">5", "   ab")]
    #[case(Value::str("ab"), "*^6", "**ab**")]
    #[case(Value::str("abcdef"), ".3", "abc")]
    #[case(Value::Int(7), "<4", "7   ")]
    #[case(Value::Float(0.25), ".1%", "25.0%")]
    #[case(Value::Float(12345.678), "e", "1.234568e+04")]
    #[case(Value::Float(0.00001234), "g", "1.234e-05")]
    #[case(Value::Float(1234.5), "g", "1234.5")]
    #[case(Value::Float(1.0), "", "1.0")]
    #[case(Value::Float(f64::INFINITY), "f", "inf")]
    #[case(Value::Bool(true), ">6", "  True")]
    fn test_format_value(#[case] value: Value, #[case] spec: &str, #[case] expected: &str) {
        assert_eq!(format_value(&value, spec).unwrap(), expected);
    }

    #[test]
    fn test_format_value_errors() {
        let err = format_value(&Value::str("x"), "d").unwrap_err();
        assert_eq!(
            err.to_string(),
            "ValueError: Unknown format code 'd' for object of type 'str'"
        );
        assert!(format_value(&Value::None, ">3").is_err());
    }

    #[rstest]
    #[case("%s-%d", Value::tuple(vec![Value::str("a"), Value::Int(3)]), "a-3")]
    #[case("%5.1f|", Value::Float(2.26), "  2.3|")]
    #[case("%-4s|", Value::str("x"), "x   |")]
    #[case("%r", Value::str("q"), "'q'")]
    #[case("100%%", Value::tuple(vec![]), "100%")]
    #[case("%03d", Value::Int(7), "007")]
    #[case("%x", Value::Int(255), "ff")]
    fn test_percent_format(#[case] template: &str, #[case] args: Value, #[case] expected: &str) {
        assert_eq!(percent_format(template, &args).unwrap(), expected);
    }

    #[test]
    fn test_percent_format_mapping() {
        let mapping = mapping_from(&[("name".to_string(), Value::str("cato"))]).unwrap();
        assert_eq!(percent_format("hi %(name)s", &mapping).unwrap(), "hi cato");
    }

    #[test]
    fn test_percent_format_argument_count() {
        let err = percent_format("%s %s", &Value::tuple(vec![Value::Int(1)])).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: not enough arguments for format string");
        let err = percent_format("%s", &Value::tuple(vec![Value::Int(1), Value::Int(2)])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: not all arguments converted during string formatting"
        );
    }

    #[test]
    fn test_str_format() {
        let args = [Value::str("a"), Value::Int(2)];
        let kwargs = [("who".to_string(), Value::str("you"))];
        assert_eq!(
            str_format("{0} {1} {who!r} {{x}} {1:03d}", &args, &kwargs).unwrap(),
            "a 2 'you' {x} 002"
        );
    }

    #[test]
    fn test_str_format_errors() {
        let err = str_format("{} {}", &[Value::Int(1)], &[]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "IndexError: Replacement index 1 out of range for positional args tuple"
        );
        let err = str_format("{0} {}", &[Value::Int(1), Value::Int(2)], &[]).unwrap_err();
        assert_eq!(err.kind(), Some(ExceptionKind::ValueError));
        assert!(str_format("oops }", &[], &[]).is_err());
    }
}

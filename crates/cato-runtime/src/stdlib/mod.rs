//! Standard library: builtin functions, methods and allow-listed modules

pub mod builtins;
pub mod format;
pub mod hashlib;
pub mod json;
pub mod methods;

use crate::value::{ExceptionKind, RuntimeError, Value};

/// Builtin functions and types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Print,
    Len,
    Range,
    Int,
    Float,
    Str,
    Bool,
    List,
    Dict,
    Tuple,
    Enumerate,
    Zip,
    Min,
    Max,
    Sum,
    Abs,
    Round,
    Sorted,
    Reversed,
    Repr,
    Any,
    All,
    // json module
    JsonLoads,
    JsonDumps,
    // hashlib module
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

/// Builtins bound in every script's namespace
const GLOBAL_BUILTINS: &[Builtin] = &[
    Builtin::Print,
    Builtin::Len,
    Builtin::Range,
    Builtin::Int,
    Builtin::Float,
    Builtin::Str,
    Builtin::Bool,
    Builtin::List,
    Builtin::Dict,
    Builtin::Tuple,
    Builtin::Enumerate,
    Builtin::Zip,
    Builtin::Min,
    Builtin::Max,
    Builtin::Sum,
    Builtin::Abs,
    Builtin::Round,
    Builtin::Sorted,
    Builtin::Reversed,
    Builtin::Repr,
    Builtin::Any,
    Builtin::All,
];

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Len => "len",
            Builtin::Range => "range",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Str => "str",
            Builtin::Bool => "bool",
            Builtin::List => "list",
            Builtin::Dict => "dict",
            Builtin::Tuple => "tuple",
            Builtin::Enumerate => "enumerate",
            Builtin::Zip => "zip",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sum => "sum",
            Builtin::Abs => "abs",
            Builtin::Round => "round",
            Builtin::Sorted => "sorted",
            Builtin::Reversed => "reversed",
            Builtin::Repr => "repr",
            Builtin::Any => "any",
            Builtin::All => "all",
            Builtin::JsonLoads => "loads",
            Builtin::JsonDumps => "dumps",
            Builtin::Sha224 => "sha224",
            Builtin::Sha256 => "sha256",
            Builtin::Sha384 => "sha384",
            Builtin::Sha512 => "sha512",
        }
    }

    /// Builtins that are classes (`int`, `str`, ...) rather than functions
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            Builtin::Int
                | Builtin::Float
                | Builtin::Str
                | Builtin::Bool
                | Builtin::List
                | Builtin::Dict
                | Builtin::Tuple
                | Builtin::Range
        )
    }
}

/// Names and values every script starts with (functions and exception classes)
pub fn global_namespace() -> impl Iterator<Item = (&'static str, Value)> {
    GLOBAL_BUILTINS
        .iter()
        .map(|b| (b.name(), Value::Builtin(*b)))
        .chain(
            ExceptionKind::ALL
                .iter()
                .map(|kind| (kind.name(), Value::ExceptionType(*kind))),
        )
}

/// Arguments of one call
#[derive(Debug, Default)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn new(args: Vec<Value>, kwargs: Vec<(String, Value)>) -> Self {
        Self { args, kwargs }
    }

    pub fn positional(args: Vec<Value>) -> Self {
        Self {
            args,
            kwargs: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Remove and return keyword argument `name`
    pub fn keyword(&mut self, name: &str) -> Option<Value> {
        let index = self.kwargs.iter().position(|(k, _)| k == name)?;
        Some(self.kwargs.remove(index).1)
    }

    /// Positional argument `index`, or keyword `name` in its place
    pub fn arg_or_keyword(&mut self, index: usize, name: &str) -> Option<Value> {
        if index < self.args.len() {
            return Some(self.args[index].clone());
        }
        self.keyword(name)
    }

    /// Fail on keyword arguments nobody consumed
    pub fn reject_keywords(&self, func: &str) -> Result<(), RuntimeError> {
        match self.kwargs.first() {
            Some((name, _)) => Err(RuntimeError::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                func, name
            ))),
            None => Ok(()),
        }
    }

    /// Check the positional argument count
    pub fn arity(&self, func: &str, min: usize, max: usize) -> Result<(), RuntimeError> {
        let given = self.args.len();
        if given >= min && given <= max {
            return Ok(());
        }
        let plural = |n: usize| if n == 1 { "" } else { "s" };
        let message = if min == max {
            format!(
                "{}() takes exactly {} argument{} ({} given)",
                func,
                min,
                plural(min),
                given
            )
        } else if given < min {
            format!(
                "{}() takes at least {} argument{} ({} given)",
                func,
                min,
                plural(min),
                given
            )
        } else {
            format!(
                "{}() takes at most {} argument{} ({} given)",
                func,
                max,
                plural(max),
                given
            )
        };
        Err(RuntimeError::type_error(message))
    }

    /// `arity` plus `reject_keywords`
    pub fn exact(&self, func: &str, min: usize, max: usize) -> Result<(), RuntimeError> {
        self.reject_keywords(func)?;
        self.arity(func, min, max)
    }
}

/// Argument that must be a `str`
pub(crate) fn expect_str<'a>(value: &'a Value, what: &str) -> Result<&'a str, RuntimeError> {
    value.as_str().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "{} must be str, not {}",
            what,
            value.type_name()
        ))
    })
}

/// Argument that must be an `int` (bools count)
pub(crate) fn expect_int(value: &Value, what: &str) -> Result<i64, RuntimeError> {
    value.as_int().ok_or_else(|| {
        RuntimeError::type_error(format!(
            "'{}' object cannot be interpreted as an integer{}",
            value.type_name(),
            if what.is_empty() {
                String::new()
            } else {
                format!(" ({})", what)
            }
        ))
    })
}

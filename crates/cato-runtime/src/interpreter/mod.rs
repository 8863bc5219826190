//! AST interpreter (tree-walking)
//!
//! Direct AST evaluation over a module namespace plus one frame per active
//! function call. Supports:
//! - Expression evaluation (literals, operators, calls, subscripts, comprehensions)
//! - Statement execution (assignment, control flow, try/except, imports)
//! - Function calls with positional, keyword and default arguments
//! - Metering: every statement and expression is charged to the run's budget

mod expr;
mod ops;
mod stmt;

use crate::api::KvHandle;
use crate::ast::{FunctionDef, Program};
use crate::security::{AuditEntry, AuditEvent, AuditLogger, Budget};
use crate::stdlib::{self, CallArgs};
use crate::value::{
    release_containers, ExceptionKind, ExceptionValue, Function, Items, ListRef, RangeValue,
    RuntimeError, Value,
};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// Control flow signal for handling break, continue, and return
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ControlFlow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Activation record of one function call (or the module body)
pub(crate) struct Frame {
    /// `None` for the module body
    pub(crate) function: Option<Rc<FunctionDef>>,
    pub(crate) locals: HashMap<String, Value>,
    /// Comprehension scopes, innermost last
    pub(crate) scopes: Vec<HashMap<String, Value>>,
}

impl Frame {
    fn module() -> Self {
        Self {
            function: None,
            locals: HashMap::new(),
            scopes: Vec::new(),
        }
    }
}

/// Interpreter state for one script run
pub struct Interpreter {
    /// Module namespace
    pub(crate) globals: HashMap<String, Value>,
    /// Builtin functions and exception classes
    pub(crate) builtins: HashMap<&'static str, Value>,
    /// Call stack; the module frame is always at the bottom
    pub(crate) frames: Vec<Frame>,
    pub(crate) budget: Budget,
    /// Captured `print` output
    pub(crate) output: String,
    pub(crate) kv: Arc<dyn KvHandle>,
    pub(crate) audit: Arc<dyn AuditLogger>,
    /// Exceptions being handled by enclosing `except` blocks (for bare `raise`)
    pub(crate) handling: Vec<RuntimeError>,
}

impl Interpreter {
    /// Create an interpreter bound to a budget and the project's store
    pub fn new(budget: Budget, kv: Arc<dyn KvHandle>, audit: Arc<dyn AuditLogger>) -> Self {
        Self {
            globals: HashMap::new(),
            builtins: stdlib::global_namespace().collect(),
            frames: vec![Frame::module()],
            budget,
            output: String::new(),
            kv,
            audit,
            handling: Vec::new(),
        }
    }

    /// Execute a program's top-level statements
    pub fn run(&mut self, program: &Program) -> Result<(), RuntimeError> {
        match self.exec_block(&program.body) {
            Ok(_) => Ok(()),
            Err(err) => {
                if let RuntimeError::Limit(limit) = &err {
                    self.audit(AuditEvent::QuotaViolation {
                        resource: limit.resource().to_string(),
                        limit: limit.limit(),
                    });
                } else if matches!(err, RuntimeError::Cancelled) {
                    self.audit(AuditEvent::Cancelled);
                }
                Err(err)
            }
        }
    }

    /// Bind a module-level name
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.globals.insert(name.into(), value);
    }

    /// Read a module-level name
    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Everything printed so far
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Steps charged so far
    pub fn steps(&self) -> u64 {
        self.budget.steps()
    }

    pub(crate) fn audit(&self, event: AuditEvent) {
        self.audit.log(AuditEntry {
            step: self.budget.steps(),
            event,
        });
    }

    // === Names ===

    fn frame(&self) -> &Frame {
        // The module frame is never popped
        &self.frames[self.frames.len() - 1]
    }

    fn frame_mut(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Whether `name` is a local of the current function
    fn is_local(&self, name: &str) -> bool {
        match &self.frame().function {
            Some(def) => def.locals.contains(name),
            None => false,
        }
    }

    pub(crate) fn lookup(&self, name: &str) -> Result<Value, RuntimeError> {
        let frame = self.frame();
        for scope in frame.scopes.iter().rev() {
            if let Some(value) = scope.get(name) {
                return Ok(value.clone());
            }
        }
        if self.is_local(name) {
            return frame.locals.get(name).cloned().ok_or_else(|| {
                RuntimeError::new(
                    ExceptionKind::UnboundLocalError,
                    format!(
                        "cannot access local variable '{}' where it is not associated with a value",
                        name
                    ),
                )
            });
        }
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.builtins.get(name) {
            return Ok(value.clone());
        }
        Err(RuntimeError::new(
            ExceptionKind::NameError,
            format!("name '{}' is not defined", name),
        ))
    }

    pub(crate) fn store(&mut self, name: &str, value: Value) {
        let local = self.is_local(name);
        let last = self.frames.len() - 1;
        let frame = &mut self.frames[last];
        // Only comprehension targets are assigned while a comprehension scope is open
        if let Some(scope) = frame.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        } else if local {
            frame.locals.insert(name.to_string(), value);
        } else {
            self.globals.insert(name.to_string(), value);
        }
    }

    pub(crate) fn delete(&mut self, name: &str) -> Result<(), RuntimeError> {
        let removed = if self.is_local(name) {
            self.frame_mut().locals.remove(name).is_some()
        } else {
            self.globals.remove(name).is_some()
        };
        if removed {
            return Ok(());
        }
        if self.is_local(name) {
            return Err(RuntimeError::new(
                ExceptionKind::UnboundLocalError,
                format!(
                    "cannot access local variable '{}' where it is not associated with a value",
                    name
                ),
            ));
        }
        Err(RuntimeError::new(
            ExceptionKind::NameError,
            format!("name '{}' is not defined", name),
        ))
    }

    // === Allocation ===

    pub(crate) fn new_str(&mut self, text: String) -> Result<Value, RuntimeError> {
        self.budget.check_string(text.len())?;
        self.budget.allocate(text.len())?;
        Ok(Value::str(text))
    }

    pub(crate) fn new_bytes(&mut self, bytes: Vec<u8>) -> Result<Value, RuntimeError> {
        self.budget.check_string(bytes.len())?;
        self.budget.allocate(bytes.len())?;
        Ok(Value::Bytes(bytes.into()))
    }

    pub(crate) fn new_list(&mut self, items: Vec<Value>) -> Result<Value, RuntimeError> {
        self.budget.check_collection(items.len())?;
        self.budget.allocate_slots(items.len())?;
        Ok(Value::list(items))
    }

    pub(crate) fn new_tuple(&mut self, items: Vec<Value>) -> Result<Value, RuntimeError> {
        self.budget.check_collection(items.len())?;
        self.budget.allocate_slots(items.len())?;
        Ok(Value::tuple(items))
    }

    // === Iteration ===

    /// Start iterating a value
    pub(crate) fn iter_value(&mut self, value: &Value) -> Result<ValueIter, RuntimeError> {
        let iter = match value {
            Value::List(list) => ValueIter::List {
                list: list.clone(),
                index: 0,
            },
            Value::Tuple(items) => ValueIter::Tuple {
                items: items.clone(),
                index: 0,
            },
            Value::Range(range) => ValueIter::Range {
                range: *range,
                index: 0,
            },
            Value::Str(text) => ValueIter::Chars {
                text: text.clone(),
                offset: 0,
            },
            Value::Bytes(bytes) => ValueIter::Bytes {
                bytes: bytes.clone(),
                index: 0,
            },
            Value::Dict(dict) => {
                let keys = dict.borrow().keys();
                self.budget.charge((keys.len() / 8) as u64)?;
                ValueIter::Values(keys.into_iter())
            }
            other => {
                return Err(RuntimeError::type_error(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                )))
            }
        };
        Ok(iter)
    }

    /// Collect every item of an iterable, charging one step per item
    pub(crate) fn collect_values(&mut self, value: &Value) -> Result<Vec<Value>, RuntimeError> {
        match value {
            Value::List(list) => {
                let items = list.borrow().0.clone();
                self.budget.check_collection(items.len())?;
                self.budget.allocate_slots(items.len())?;
                Ok(items)
            }
            Value::Tuple(items) => {
                self.budget.allocate_slots(items.len())?;
                Ok(items.to_vec())
            }
            Value::Range(range) => {
                self.budget.check_collection(range.len())?;
                self.budget.allocate_slots(range.len())?;
                Ok((0..range.len()).map(|i| Value::Int(range.get(i))).collect())
            }
            _ => {
                let mut iter = self.iter_value(value)?;
                let mut items = Vec::new();
                while let Some(item) = iter.next() {
                    self.budget.tick()?;
                    items.push(item);
                }
                self.budget.check_collection(items.len())?;
                self.budget.allocate_slots(items.len())?;
                Ok(items)
            }
        }
    }

    // === Calls ===

    /// Call any callable value
    pub(crate) fn call_value(&mut self, func: &Value, args: CallArgs) -> Result<Value, RuntimeError> {
        self.budget.tick()?;
        match func {
            Value::Function(function) => self.call_function(function, args),
            Value::Builtin(builtin) => self.call_builtin(*builtin, args),
            Value::Method(method) => {
                let receiver = method.receiver.clone();
                self.call_method(&receiver, method.name, args)
            }
            Value::ExceptionType(kind) => {
                args.reject_keywords(kind.name())?;
                Ok(Value::Exception(Rc::new(ExceptionValue::new(*kind, args.args))))
            }
            other => Err(RuntimeError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))),
        }
    }

    /// Call a script-defined function
    pub(crate) fn call_function(
        &mut self,
        function: &Rc<Function>,
        args: CallArgs,
    ) -> Result<Value, RuntimeError> {
        let locals = bind_arguments(function, args)?;
        let def = function.def.clone();

        self.budget.enter_call()?;
        self.frames.push(Frame {
            function: Some(def.clone()),
            locals,
            scopes: Vec::new(),
        });
        let result = self.exec_block(&def.body);
        self.frames.pop();
        self.budget.exit_call();

        match result? {
            ControlFlow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        self.frames.clear();
        self.globals.clear();
        self.handling.clear();
        release_containers();
    }
}

/// Match call arguments to parameters
fn bind_arguments(
    function: &Function,
    args: CallArgs,
) -> Result<HashMap<String, Value>, RuntimeError> {
    let def = &function.def;
    let params = &def.params;
    let given = args.args.len();

    if given > params.len() {
        let required = function.defaults.iter().filter(|d| d.is_none()).count();
        let takes = if required == params.len() {
            format!(
                "{} positional argument{}",
                params.len(),
                if params.len() == 1 { "" } else { "s" }
            )
        } else {
            format!("from {} to {} positional arguments", required, params.len())
        };
        return Err(RuntimeError::type_error(format!(
            "{}() takes {} but {} {} given",
            def.name,
            takes,
            given,
            if given == 1 { "was" } else { "were" }
        )));
    }

    let mut slots: Vec<Option<Value>> = args.args.into_iter().map(Some).collect();
    slots.resize(params.len(), None);

    for (name, value) in args.kwargs {
        let Some(index) = params.iter().position(|p| p.name == name) else {
            return Err(RuntimeError::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                def.name, name
            )));
        };
        if slots[index].is_some() {
            return Err(RuntimeError::type_error(format!(
                "{}() got multiple values for argument '{}'",
                def.name, name
            )));
        }
        slots[index] = Some(value);
    }

    let mut missing = Vec::new();
    let mut locals = HashMap::with_capacity(params.len());
    for ((param, slot), default) in params.iter().zip(slots).zip(&function.defaults) {
        match slot.or_else(|| default.clone()) {
            Some(value) => {
                locals.insert(param.name.clone(), value);
            }
            None => missing.push(format!("'{}'", param.name)),
        }
    }
    if !missing.is_empty() {
        return Err(RuntimeError::type_error(format!(
            "{}() missing {} required positional argument{}: {}",
            def.name,
            missing.len(),
            if missing.len() == 1 { "" } else { "s" },
            join_names(&missing)
        )));
    }
    Ok(locals)
}

/// `'a'`, `'a' and 'b'`, `'a', 'b', and 'c'`
fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [one] => one.clone(),
        [first, second] => format!("{} and {}", first, second),
        [init @ .., last] => format!("{}, and {}", init.join(", "), last),
    }
}

/// Iteration state over a script value
pub(crate) enum ValueIter {
    /// Lists are iterated live, so appends during the loop are seen
    List { list: ListRef, index: usize },
    Tuple { items: Rc<Items>, index: usize },
    Range { range: RangeValue, index: usize },
    Chars { text: Rc<str>, offset: usize },
    Bytes { bytes: Rc<[u8]>, index: usize },
    Values(std::vec::IntoIter<Value>),
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            ValueIter::List { list, index } => {
                let item = list.borrow().get(*index).cloned()?;
                *index += 1;
                Some(item)
            }
            ValueIter::Tuple { items, index } => {
                let item = items.get(*index).cloned()?;
                *index += 1;
                Some(item)
            }
            ValueIter::Range { range, index } => {
                if *index >= range.len() {
                    return None;
                }
                let item = range.get(*index);
                *index += 1;
                Some(Value::Int(item))
            }
            ValueIter::Chars { text, offset } => {
                let c = text[*offset..].chars().next()?;
                *offset += c.len_utf8();
                let mut buf = [0u8; 4];
                Some(Value::str(&*c.encode_utf8(&mut buf)))
            }
            ValueIter::Bytes { bytes, index } => {
                let byte = *bytes.get(*index)?;
                *index += 1;
                Some(Value::Int(byte as i64))
            }
            ValueIter::Values(values) => values.next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_names() {
        let names: Vec<String> = ["'a'", "'b'", "'c'"].iter().map(|s| s.to_string()).collect();
        assert_eq!(join_names(&names[..1]), "'a'");
        assert_eq!(join_names(&names[..2]), "'a' and 'b'");
        assert_eq!(join_names(&names), "'a', 'b', and 'c'");
    }

    #[test]
    fn test_chars_iteration_handles_multibyte() {
        let iter = ValueIter::Chars {
            text: Rc::from("héllo"),
            offset: 0,
        };
        let chars: Vec<Value> = iter.collect();
        assert_eq!(chars.len(), 5);
        assert_eq!(chars[1], Value::str("é"));
    }
}

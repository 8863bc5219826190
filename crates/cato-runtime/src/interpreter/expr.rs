//! Expression evaluation

use crate::ast::*;
use crate::interpreter::Interpreter;
use crate::security::{policy, AuditEvent};
use crate::stdlib::format::format_value;
use crate::stdlib::CallArgs;
use crate::value::{
    compare_values, is_identical, values_equal, BoundMethod, Dict, ModuleKind, RuntimeError, Value,
};
use std::collections::HashMap;
use std::rc::Rc;

impl Interpreter {
    /// Evaluate an expression
    pub(crate) fn eval_expr(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        self.budget.tick()?;
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(literal_value(literal)),
            ExprKind::FString(parts) => self.eval_fstring(parts),
            ExprKind::Name(name) => self.lookup(name),
            ExprKind::List(items) => {
                let values = self.eval_display(items)?;
                self.new_list(values)
            }
            ExprKind::Tuple(items) => {
                let values = self.eval_display(items)?;
                self.new_tuple(values)
            }
            ExprKind::Dict(entries) => {
                self.budget.check_collection(entries.len())?;
                self.budget.allocate_entries(entries.len())?;
                let mut dict = Dict::new();
                for (key, value) in entries {
                    let key = self.eval_expr(key)?;
                    let value = self.eval_expr(value)?;
                    dict.insert(key, value)?;
                }
                Ok(Value::dict(dict))
            }
            ExprKind::ListComp {
                element,
                generators,
            } => self.eval_list_comp(element, generators),
            ExprKind::DictComp {
                key,
                value,
                generators,
            } => self.eval_dict_comp(key, value, generators),
            ExprKind::Unary { op, operand } => {
                let operand = self.eval_expr(operand)?;
                self.unary_op(*op, &operand)
            }
            ExprKind::Binary { op, left, right } => {
                let left = self.eval_expr(left)?;
                let right = self.eval_expr(right)?;
                self.binary_op(*op, &left, &right)
            }
            ExprKind::Logical { op, left, right } => {
                let left = self.eval_expr(left)?;
                let short_circuit = match op {
                    LogicalOp::And => !left.is_truthy(),
                    LogicalOp::Or => left.is_truthy(),
                };
                if short_circuit {
                    Ok(left)
                } else {
                    self.eval_expr(right)
                }
            }
            ExprKind::Compare { left, comparisons } => self.eval_compare(left, comparisons),
            ExprKind::IfExp { test, body, orelse } => {
                if self.eval_expr(test)?.is_truthy() {
                    self.eval_expr(body)
                } else {
                    self.eval_expr(orelse)
                }
            }
            ExprKind::Call { func, args, kwargs } => self.eval_call(func, args, kwargs),
            ExprKind::Attribute { object, name } => {
                let object = self.eval_expr(object)?;
                self.get_attribute(&object, name)
            }
            ExprKind::Subscript { object, index } => {
                let object = self.eval_expr(object)?;
                if let ExprKind::Slice { lower, upper, step } = &index.kind {
                    let lower = self.eval_slice_bound(lower)?;
                    let upper = self.eval_slice_bound(upper)?;
                    let step = self.eval_slice_bound(step)?;
                    return self.get_slice(&object, lower, upper, step);
                }
                let index = self.eval_expr(index)?;
                self.get_item(&object, &index)
            }
            ExprKind::Slice { .. } => Err(RuntimeError::type_error(
                "slices are only valid inside a subscript",
            )),
            ExprKind::Starred(_) => Err(RuntimeError::type_error(
                "can't use starred expression here",
            )),
        }
    }

    /// Items of a tuple or list display, splicing in `*iterable` items
    fn eval_display(&mut self, items: &[Expr]) -> Result<Vec<Value>, RuntimeError> {
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            match &item.kind {
                ExprKind::Starred(inner) => {
                    let iterable = self.eval_expr(inner)?;
                    values.extend(self.collect_values(&iterable)?);
                    self.budget.check_collection(values.len())?;
                }
                _ => values.push(self.eval_expr(item)?),
            }
        }
        Ok(values)
    }

    pub(crate) fn eval_exprs(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, RuntimeError> {
        exprs.iter().map(|expr| self.eval_expr(expr)).collect()
    }

    /// One bound of `a[lower:upper:step]`
    pub(crate) fn eval_slice_bound(
        &mut self,
        bound: &Option<Box<Expr>>,
    ) -> Result<Option<i64>, RuntimeError> {
        let Some(bound) = bound else {
            return Ok(None);
        };
        match self.eval_expr(bound)? {
            Value::None => Ok(None),
            value => value.as_int().map(Some).ok_or_else(|| {
                RuntimeError::type_error(
                    "slice indices must be integers or None or have an __index__ method",
                )
            }),
        }
    }

    fn eval_fstring(&mut self, parts: &[FStringPart]) -> Result<Value, RuntimeError> {
        let mut out = String::new();
        for part in parts {
            match part {
                FStringPart::Text(text) => out.push_str(text),
                FStringPart::Field {
                    expr,
                    conversion,
                    spec,
                } => {
                    let value = self.eval_expr(expr)?;
                    let value = match conversion {
                        Some('r') | Some('a') => Value::str(value.repr()?),
                        Some(_) => Value::str(value.to_str()?),
                        None => value,
                    };
                    out.push_str(&format_value(&value, spec)?);
                    self.budget.check_string(out.len())?;
                }
            }
        }
        self.budget.allocate(out.len())?;
        Ok(Value::str(out))
    }

    fn eval_compare(
        &mut self,
        left: &Expr,
        comparisons: &[(CompareOp, Expr)],
    ) -> Result<Value, RuntimeError> {
        let mut current = self.eval_expr(left)?;
        for (op, right) in comparisons {
            let right = self.eval_expr(right)?;
            if !self.compare(*op, &current, &right)? {
                return Ok(Value::Bool(false));
            }
            current = right;
        }
        Ok(Value::Bool(true))
    }

    pub(crate) fn compare(&mut self, op: CompareOp, a: &Value, b: &Value) -> Result<bool, RuntimeError> {
        match op {
            CompareOp::Eq => values_equal(a, b),
            CompareOp::NotEq => Ok(!values_equal(a, b)?),
            CompareOp::Lt | CompareOp::LtE | CompareOp::Gt | CompareOp::GtE => {
                compare_values(a, b, op)
            }
            CompareOp::In => self.contains(b, a),
            CompareOp::NotIn => Ok(!self.contains(b, a)?),
            CompareOp::Is => Ok(is_identical(a, b)),
            CompareOp::IsNot => Ok(!is_identical(a, b)),
        }
    }

    // === Calls ===

    fn eval_call(
        &mut self,
        func: &Expr,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<Value, RuntimeError> {
        // `obj.method(...)` is dispatched without materializing a bound method
        if let ExprKind::Attribute { object, name } = &func.kind {
            let receiver = self.eval_expr(object)?;
            let callee = self.resolve_attribute(&receiver, name)?;
            let call_args = self.eval_call_args(args, kwargs)?;
            return match callee {
                Attribute::Method(method) => {
                    self.budget.tick()?;
                    self.call_method(&receiver, method, call_args)
                }
                Attribute::Value(value) => self.call_value(&value, call_args),
            };
        }

        let callee = self.eval_expr(func)?;
        let call_args = self.eval_call_args(args, kwargs)?;
        self.call_value(&callee, call_args)
    }

    fn eval_call_args(
        &mut self,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<CallArgs, RuntimeError> {
        let args = self.eval_exprs(args)?;
        let mut evaluated = Vec::with_capacity(kwargs.len());
        for (name, expr) in kwargs {
            evaluated.push((name.clone(), self.eval_expr(expr)?));
        }
        Ok(CallArgs::new(args, evaluated))
    }

    // === Attributes ===

    /// `object.name` as a value
    pub(crate) fn get_attribute(&mut self, object: &Value, name: &str) -> Result<Value, RuntimeError> {
        match self.resolve_attribute(object, name)? {
            Attribute::Value(value) => Ok(value),
            Attribute::Method(method) => Ok(Value::Method(Rc::new(BoundMethod {
                receiver: object.clone(),
                name: method,
            }))),
        }
    }

    /// Resolve `object.name` against the attribute policy
    fn resolve_attribute(&mut self, object: &Value, name: &str) -> Result<Attribute, RuntimeError> {
        let Some(allowed) = policy::allowed_attribute(object, name) else {
            if policy::is_private(name) {
                self.audit(AuditEvent::AttributeDenied {
                    type_name: object.type_name().to_string(),
                    attribute: name.to_string(),
                });
            }
            return Err(no_attribute(object, name));
        };

        let attribute = match object {
            Value::Module(ModuleKind::Json) | Value::Module(ModuleKind::Hashlib) => {
                let builtin = module_export(object, allowed).ok_or_else(|| no_attribute(object, name))?;
                Attribute::Value(Value::Builtin(builtin))
            }
            Value::Exception(exc) => Attribute::Value(Value::tuple(exc.args.to_vec())),
            _ => Attribute::Method(allowed),
        };
        Ok(attribute)
    }

    // === Comprehensions ===

    fn eval_list_comp(&mut self, element: &Expr, generators: &[Comprehension]) -> Result<Value, RuntimeError> {
        let mut items = Vec::new();
        self.in_comprehension_scope(|interp| {
            interp.comprehension_loop(generators, &mut |interp| {
                let value = interp.eval_expr(element)?;
                items.push(value);
                interp.budget.check_collection(items.len())?;
                interp.budget.allocate_slots(1)
            })
        })?;
        Ok(Value::list(items))
    }

    fn eval_dict_comp(
        &mut self,
        key: &Expr,
        value: &Expr,
        generators: &[Comprehension],
    ) -> Result<Value, RuntimeError> {
        let mut dict = Dict::new();
        self.in_comprehension_scope(|interp| {
            interp.comprehension_loop(generators, &mut |interp| {
                let k = interp.eval_expr(key)?;
                let v = interp.eval_expr(value)?;
                dict.insert(k, v)?;
                interp.budget.check_collection(dict.len())?;
                interp.budget.allocate_entries(1)
            })
        })?;
        Ok(Value::dict(dict))
    }

    /// Run `body` with a fresh comprehension scope, always popping it
    fn in_comprehension_scope<T>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        self.frame_mut().scopes.push(HashMap::new());
        let result = body(self);
        self.frame_mut().scopes.pop();
        result
    }

    fn comprehension_loop(
        &mut self,
        generators: &[Comprehension],
        emit: &mut dyn FnMut(&mut Self) -> Result<(), RuntimeError>,
    ) -> Result<(), RuntimeError> {
        let Some((first, rest)) = generators.split_first() else {
            return emit(self);
        };
        let iterable = self.eval_expr(&first.iter)?;
        let mut iter = self.iter_value(&iterable)?;
        'items: while let Some(item) = iter.next() {
            self.budget.tick()?;
            self.assign_target(&first.target, item)?;
            for condition in &first.conditions {
                if !self.eval_expr(condition)?.is_truthy() {
                    continue 'items;
                }
            }
            self.comprehension_loop(rest, emit)?;
        }
        Ok(())
    }
}

/// Result of resolving an attribute
enum Attribute {
    /// Plain value (module export, exception args)
    Value(Value),
    /// Allow-listed method name, bound at call time
    Method(&'static str),
}

fn module_export(module: &Value, name: &str) -> Option<crate::stdlib::Builtin> {
    use crate::stdlib::Builtin;
    match (module, name) {
        (Value::Module(ModuleKind::Json), "loads") => Some(Builtin::JsonLoads),
        (Value::Module(ModuleKind::Json), "dumps") => Some(Builtin::JsonDumps),
        (Value::Module(ModuleKind::Hashlib), "sha224") => Some(Builtin::Sha224),
        (Value::Module(ModuleKind::Hashlib), "sha256") => Some(Builtin::Sha256),
        (Value::Module(ModuleKind::Hashlib), "sha384") => Some(Builtin::Sha384),
        (Value::Module(ModuleKind::Hashlib), "sha512") => Some(Builtin::Sha512),
        _ => None,
    }
}

/// Export of an allow-listed module, for `from json import loads`
pub(crate) fn module_member(module: ModuleKind, name: &str) -> Option<Value> {
    let module = Value::Module(module);
    let allowed = policy::allowed_attribute(&module, name)?;
    module_export(&module, allowed).map(Value::Builtin)
}

fn no_attribute(object: &Value, name: &str) -> RuntimeError {
    match object {
        Value::Module(module) => RuntimeError::attribute_error(format!(
            "module '{}' has no attribute '{}'",
            module.name(),
            name
        )),
        _ => RuntimeError::attribute_error(format!(
            "'{}' object has no attribute '{}'",
            object.type_name(),
            name
        )),
    }
}

pub(crate) fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::None => Value::None,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::Str(s) => Value::Str(s.clone()),
        Literal::Bytes(b) => Value::Bytes(b.clone()),
    }
}

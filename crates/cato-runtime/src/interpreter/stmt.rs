//! Statement execution

use crate::ast::*;
use crate::interpreter::expr::module_member;
use crate::interpreter::{ControlFlow, Interpreter};
use crate::security::{policy, AuditEvent};
use crate::value::{ExceptionKind, ExceptionValue, Function, RuntimeError, Value};
use std::rc::Rc;

type Bounds = (Option<i64>, Option<i64>, Option<i64>);

impl Interpreter {
    /// Execute statements until one of them transfers control
    pub(crate) fn exec_block(&mut self, stmts: &[Stmt]) -> Result<ControlFlow, RuntimeError> {
        for stmt in stmts {
            match self.exec_stmt(stmt)? {
                ControlFlow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(ControlFlow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<ControlFlow, RuntimeError> {
        self.budget.tick()?;
        self.exec_stmt_kind(&stmt.kind)
            .map_err(|err| err.with_line(stmt.span.line))
    }

    fn exec_stmt_kind(&mut self, kind: &StmtKind) -> Result<ControlFlow, RuntimeError> {
        match kind {
            StmtKind::Expr(expr) => {
                self.eval_expr(expr)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval_expr(value)?;
                for target in targets {
                    self.assign_target(target, value.clone())?;
                }
            }
            StmtKind::AugAssign { target, op, value } => self.exec_aug_assign(target, *op, value)?,
            StmtKind::If { branches, orelse } => {
                for (condition, body) in branches {
                    if self.eval_expr(condition)?.is_truthy() {
                        return self.exec_block(body);
                    }
                }
                return self.exec_block(orelse);
            }
            StmtKind::While {
                condition,
                body,
                orelse,
            } => {
                while self.eval_expr(condition)?.is_truthy() {
                    match self.exec_block(body)? {
                        ControlFlow::Break => return Ok(ControlFlow::Normal),
                        ControlFlow::Normal | ControlFlow::Continue => {}
                        flow @ ControlFlow::Return(_) => return Ok(flow),
                    }
                }
                return self.exec_block(orelse);
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let iterable = self.eval_expr(iter)?;
                let mut items = self.iter_value(&iterable)?;
                while let Some(item) = items.next() {
                    self.budget.tick()?;
                    self.assign_target(target, item)?;
                    match self.exec_block(body)? {
                        ControlFlow::Break => return Ok(ControlFlow::Normal),
                        ControlFlow::Normal | ControlFlow::Continue => {}
                        flow @ ControlFlow::Return(_) => return Ok(flow),
                    }
                }
                return self.exec_block(orelse);
            }
            StmtKind::Break => return Ok(ControlFlow::Break),
            StmtKind::Continue => return Ok(ControlFlow::Continue),
            StmtKind::Pass | StmtKind::Global(_) => {}
            StmtKind::FunctionDef(def) => {
                let mut defaults = Vec::with_capacity(def.params.len());
                for param in &def.params {
                    let default = match &param.default {
                        Some(expr) => Some(self.eval_expr(expr)?),
                        None => None,
                    };
                    defaults.push(default);
                }
                let function = Function {
                    def: def.clone(),
                    defaults,
                };
                self.store(&def.name, Value::Function(Rc::new(function)));
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr)?,
                    None => Value::None,
                };
                return Ok(ControlFlow::Return(value));
            }
            StmtKind::Del(targets) => {
                for target in targets {
                    self.delete_target(target)?;
                }
            }
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    let module = self.import_module(&alias.name)?;
                    self.store(alias.bound_name(), Value::Module(module));
                }
            }
            StmtKind::ImportFrom { module, names } => {
                let kind = self.import_module(module)?;
                for alias in names {
                    let value = module_member(kind, &alias.name).ok_or_else(|| {
                        RuntimeError::new(
                            ExceptionKind::ImportError,
                            format!("cannot import name '{}' from '{}'", alias.name, module),
                        )
                    })?;
                    self.store(alias.bound_name(), value);
                }
            }
            StmtKind::Raise(value) => return Err(self.raise(value.as_ref())?),
            StmtKind::Assert { test, message } => {
                if !self.eval_expr(test)?.is_truthy() {
                    let args = match message {
                        Some(expr) => vec![self.eval_expr(expr)?],
                        None => Vec::new(),
                    };
                    let exc = ExceptionValue::new(ExceptionKind::AssertionError, args);
                    return Err(RuntimeError::from_exception(Rc::new(exc)));
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
            } => return self.exec_try(body, handlers, orelse),
        }
        Ok(ControlFlow::Normal)
    }

    // === Assignment ===

    pub(crate) fn assign_target(&mut self, target: &Target, value: Value) -> Result<(), RuntimeError> {
        match target {
            Target::Name(name, _) => {
                self.store(name, value);
                Ok(())
            }
            Target::Subscript { object, index, .. } => {
                let object = self.eval_expr(object)?;
                if let Some(bounds) = self.eval_slice_index(index)? {
                    return self.set_slice(&object, bounds, &value);
                }
                let index = self.eval_expr(index)?;
                self.set_item(&object, &index, value)
            }
            Target::Attribute { object, name, .. } => {
                let object = self.eval_expr(object)?;
                Err(read_only_attribute(&object, name))
            }
            Target::Tuple(targets, _) => {
                let star = targets.iter().position(|t| matches!(t, Target::Starred(..)));
                let Some(at) = star else {
                    let items = self.unpack(&value, targets.len(), false)?;
                    for (target, item) in targets.iter().zip(items) {
                        self.assign_target(target, item)?;
                    }
                    return Ok(());
                };

                let mut items = self.unpack(&value, targets.len() - 1, true)?;
                let after = targets.len() - at - 1;
                let tail = items.split_off(items.len() - after);
                let middle = items.split_off(at);
                for (target, item) in targets[..at].iter().zip(items) {
                    self.assign_target(target, item)?;
                }
                let rest = self.new_list(middle)?;
                self.assign_target(&targets[at], rest)?;
                for (target, item) in targets[at + 1..].iter().zip(tail) {
                    self.assign_target(target, item)?;
                }
                Ok(())
            }
            Target::Starred(inner, _) => self.assign_target(inner, value),
        }
    }

    /// Split `value` into exactly `expected` items, or at least that many
    /// when a starred target takes the rest
    fn unpack(&mut self, value: &Value, expected: usize, starred: bool) -> Result<Vec<Value>, RuntimeError> {
        let items = match value {
            Value::List(_) | Value::Tuple(_) | Value::Range(_) | Value::Str(_) | Value::Bytes(_) | Value::Dict(_) => {
                self.collect_values(value)?
            }
            other => {
                return Err(RuntimeError::type_error(format!(
                    "cannot unpack non-iterable {} object",
                    other.type_name()
                )))
            }
        };
        if items.len() < expected {
            let at_least = if starred { "at least " } else { "" };
            return Err(RuntimeError::value_error(format!(
                "not enough values to unpack (expected {}{}, got {})",
                at_least,
                expected,
                items.len()
            )));
        }
        if items.len() > expected && !starred {
            return Err(RuntimeError::value_error(format!(
                "too many values to unpack (expected {})",
                expected
            )));
        }
        Ok(items)
    }

    /// Bounds of a subscript that is a slice, `None` for a plain index
    fn eval_slice_index(&mut self, index: &Expr) -> Result<Option<Bounds>, RuntimeError> {
        let ExprKind::Slice { lower, upper, step } = &index.kind else {
            return Ok(None);
        };
        let lower = self.eval_slice_bound(lower)?;
        let upper = self.eval_slice_bound(upper)?;
        let step = self.eval_slice_bound(step)?;
        Ok(Some((lower, upper, step)))
    }

    fn exec_aug_assign(&mut self, target: &Target, op: BinaryOp, value: &Expr) -> Result<(), RuntimeError> {
        match target {
            Target::Name(name, _) => {
                let current = self.lookup(name)?;
                let rhs = self.eval_expr(value)?;
                let result = self.inplace_op(op, &current, &rhs)?;
                self.store(name, result);
                Ok(())
            }
            Target::Subscript { object, index, .. } => {
                // Object and index are evaluated once
                let object = self.eval_expr(object)?;
                if let Some(bounds) = self.eval_slice_index(index)? {
                    let current = self.get_slice(&object, bounds.0, bounds.1, bounds.2)?;
                    let rhs = self.eval_expr(value)?;
                    let result = self.inplace_op(op, &current, &rhs)?;
                    return self.set_slice(&object, bounds, &result);
                }
                let index = self.eval_expr(index)?;
                let current = self.get_item(&object, &index)?;
                let rhs = self.eval_expr(value)?;
                let result = self.inplace_op(op, &current, &rhs)?;
                self.set_item(&object, &index, result)
            }
            Target::Attribute { object, name, .. } => {
                let object = self.eval_expr(object)?;
                Err(read_only_attribute(&object, name))
            }
            Target::Tuple(..) | Target::Starred(..) => Err(RuntimeError::type_error(
                "illegal expression for augmented assignment",
            )),
        }
    }

    /// `current op= rhs`; lists extend in place
    fn inplace_op(&mut self, op: BinaryOp, current: &Value, rhs: &Value) -> Result<Value, RuntimeError> {
        if let (BinaryOp::Add, Value::List(list)) = (op, current) {
            let extra = self.collect_values(rhs)?;
            let len = list.borrow().len() + extra.len();
            self.budget.check_collection(len)?;
            self.budget.allocate_slots(extra.len())?;
            list.borrow_mut().extend(extra);
            return Ok(current.clone());
        }
        self.binary_op(op, current, rhs)
    }

    fn delete_target(&mut self, target: &Target) -> Result<(), RuntimeError> {
        match target {
            Target::Name(name, _) => self.delete(name),
            Target::Subscript { object, index, .. } => {
                let object = self.eval_expr(object)?;
                if let Some(bounds) = self.eval_slice_index(index)? {
                    return self.del_slice(&object, bounds);
                }
                let index = self.eval_expr(index)?;
                self.del_item(&object, &index)
            }
            Target::Attribute { object, name, .. } => {
                let object = self.eval_expr(object)?;
                Err(read_only_attribute(&object, name))
            }
            Target::Tuple(targets, _) => {
                for target in targets {
                    self.delete_target(target)?;
                }
                Ok(())
            }
            Target::Starred(inner, _) => self.delete_target(inner),
        }
    }

    // === Imports ===

    fn import_module(&mut self, name: &str) -> Result<crate::value::ModuleKind, RuntimeError> {
        match policy::allowed_module(name) {
            Some(kind) => Ok(kind),
            None => {
                self.audit(AuditEvent::ImportDenied {
                    module: name.to_string(),
                });
                Err(RuntimeError::new(
                    ExceptionKind::ModuleNotFoundError,
                    format!("No module named '{}'", name),
                ))
            }
        }
    }

    // === Exceptions ===

    /// Build the error a `raise` statement propagates
    fn raise(&mut self, value: Option<&Expr>) -> Result<RuntimeError, RuntimeError> {
        let Some(expr) = value else {
            return Ok(self.handling.last().cloned().unwrap_or_else(|| {
                RuntimeError::new(ExceptionKind::RuntimeError, "No active exception to reraise")
            }));
        };
        let exc = match self.eval_expr(expr)? {
            Value::Exception(exc) => exc,
            Value::ExceptionType(kind) => Rc::new(ExceptionValue::new(kind, Vec::new())),
            _ => {
                return Ok(RuntimeError::type_error(
                    "exceptions must derive from BaseException",
                ))
            }
        };
        Ok(RuntimeError::from_exception(exc))
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[ExceptHandler],
        orelse: &[Stmt],
    ) -> Result<ControlFlow, RuntimeError> {
        let err = match self.exec_block(body) {
            Ok(ControlFlow::Normal) => return self.exec_block(orelse),
            Ok(flow) => return Ok(flow),
            Err(err) => err,
        };
        let Some(exc) = caught_exception(&err) else {
            return Err(err);
        };

        for handler in handlers {
            if !self.handler_matches(handler, exc.kind)? {
                continue;
            }
            if let Some(name) = &handler.name {
                self.store(name, Value::Exception(exc.clone()));
            }
            self.handling.push(err);
            let result = self.exec_block(&handler.body);
            self.handling.pop();
            if let Some(name) = &handler.name {
                // Unbound on exit even if the handler rebound or deleted it
                let _ = self.delete(name);
            }
            return result;
        }
        Err(err)
    }

    fn handler_matches(&mut self, handler: &ExceptHandler, kind: ExceptionKind) -> Result<bool, RuntimeError> {
        let Some(types) = &handler.types else {
            return Ok(true);
        };
        let types = self.eval_expr(types)?;
        match &types {
            Value::Tuple(items) => {
                for item in items.iter() {
                    if exception_matches(item, kind)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            single => exception_matches(single, kind),
        }
    }
}

/// Exception instance of an error `except` can catch
fn caught_exception(err: &RuntimeError) -> Option<Rc<ExceptionValue>> {
    match err {
        RuntimeError::Exception { exc, .. } => Some(exc.clone()),
        _ => None,
    }
}

fn exception_matches(class: &Value, kind: ExceptionKind) -> Result<bool, RuntimeError> {
    match class {
        Value::ExceptionType(class) => Ok(kind.is_subclass_of(*class)),
        _ => Err(RuntimeError::type_error(
            "catching classes that do not inherit from BaseException is not allowed",
        )),
    }
}

fn read_only_attribute(object: &Value, name: &str) -> RuntimeError {
    if policy::allowed_attribute(object, name).is_some() {
        RuntimeError::attribute_error(format!(
            "'{}' object attribute '{}' is read-only",
            object.type_name(),
            name
        ))
    } else {
        RuntimeError::attribute_error(format!(
            "'{}' object has no attribute '{}'",
            object.type_name(),
            name
        ))
    }
}

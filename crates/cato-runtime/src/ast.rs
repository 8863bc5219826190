//! Abstract Syntax Tree (AST) definitions
//!
//! Statements and expressions of the script dialect. Every node carries a
//! span so runtime errors can report the script line.

use crate::span::Span;
use std::collections::HashSet;
use std::rc::Rc;

/// Top-level program
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Stmt>,
}

/// Statement with its location
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

/// Statement forms
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Expression evaluated for its side effects
    Expr(Expr),
    /// `a = b = value`
    Assign { targets: Vec<Target>, value: Expr },
    /// `target op= value`
    AugAssign {
        target: Target,
        op: BinaryOp,
        value: Expr,
    },
    /// `if`/`elif` chain with optional `else`
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        orelse: Vec<Stmt>,
    },
    /// `while` loop; `orelse` runs when the loop ends without `break`
    While {
        condition: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    For {
        target: Target,
        iter: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    Break,
    Continue,
    Pass,
    FunctionDef(Rc<FunctionDef>),
    Return(Option<Expr>),
    Global(Vec<String>),
    Del(Vec<Target>),
    /// `import a [as b], c`
    Import(Vec<ImportAlias>),
    /// `from module import a [as b]`
    ImportFrom {
        module: String,
        names: Vec<ImportAlias>,
    },
    /// `raise [expr]`
    Raise(Option<Expr>),
    /// `assert test[, message]`
    Assert { test: Expr, message: Option<Expr> },
    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        orelse: Vec<Stmt>,
    },
}

/// Function definition
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    /// Names bound anywhere in the body (parameters included)
    pub locals: HashSet<String>,
    /// Names declared `global` in the body
    pub globals: HashSet<String>,
    pub span: Span,
}

/// Function parameter with optional default
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
    pub span: Span,
}

/// `name [as alias]` in an import statement
#[derive(Debug, Clone, PartialEq)]
pub struct ImportAlias {
    pub name: String,
    pub alias: Option<String>,
    pub span: Span,
}

impl ImportAlias {
    /// Name the import binds in scope
    pub fn bound_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// `except [types] [as name]:` clause
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    pub types: Option<Expr>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// Assignment target
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Name(String, Span),
    Subscript {
        object: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Attribute {
        object: Box<Expr>,
        name: String,
        span: Span,
    },
    /// Unpacking target `a, b` or `[a, b]`
    Tuple(Vec<Target>, Span),
    /// `*rest` inside an unpacking target
    Starred(Box<Target>, Span),
}

impl Target {
    pub fn span(&self) -> Span {
        match self {
            Target::Name(_, span)
            | Target::Subscript { span, .. }
            | Target::Attribute { span, .. }
            | Target::Tuple(_, span)
            | Target::Starred(_, span) => *span,
        }
    }

    /// Collect plain names this target binds
    pub fn bound_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Target::Name(name, _) => out.push(name),
            Target::Tuple(items, _) => {
                for item in items {
                    item.bound_names(out);
                }
            }
            Target::Starred(inner, _) => inner.bound_names(out),
            Target::Subscript { .. } | Target::Attribute { .. } => {}
        }
    }
}

/// Expression with its location
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Expression forms
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    FString(Vec<FStringPart>),
    Name(String),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    /// `[element for ...]`, also used for generator expressions
    ListComp {
        element: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    DictComp {
        key: Box<Expr>,
        value: Box<Expr>,
        generators: Vec<Comprehension>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Short-circuit `and`/`or`
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Chained comparison `a < b <= c`
    Compare {
        left: Box<Expr>,
        comparisons: Vec<(CompareOp, Expr)>,
    },
    /// `body if test else orelse`
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Attribute {
        object: Box<Expr>,
        name: String,
    },
    Subscript {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    /// `*value` spliced into a tuple or list display
    Starred(Box<Expr>),
    /// `lower:upper:step`, only valid as a subscript index
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
}

/// Literal values
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bytes(Rc<[u8]>),
}

/// Piece of an f-string
#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Text(String),
    Field {
        expr: Expr,
        /// `!r` / `!s` conversion
        conversion: Option<char>,
        /// Text after `:`
        spec: String,
    },
}

/// `for target in iter if condition...` clause
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub target: Target,
    pub iter: Expr,
    pub conditions: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "** or pow()",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtE => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtE => ">=",
            CompareOp::In => "in",
            CompareOp::NotIn => "not in",
            CompareOp::Is => "is",
            CompareOp::IsNot => "is not",
        }
    }
}

/// Collect the names a function body binds, and those it declares global.
///
/// Nested function bodies are not entered (their name is bound, their
/// contents are their own scope). Comprehension targets stay inside the
/// comprehension.
pub fn collect_bindings(body: &[Stmt], locals: &mut HashSet<String>, globals: &mut HashSet<String>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Assign { targets, .. } => {
                for target in targets {
                    bind_target(target, locals);
                }
            }
            StmtKind::AugAssign { target, .. } => bind_target(target, locals),
            StmtKind::For {
                target,
                body,
                orelse,
                ..
            } => {
                bind_target(target, locals);
                collect_bindings(body, locals, globals);
                collect_bindings(orelse, locals, globals);
            }
            StmtKind::Del(targets) => {
                for target in targets {
                    bind_target(target, locals);
                }
            }
            StmtKind::If { branches, orelse } => {
                for (_, block) in branches {
                    collect_bindings(block, locals, globals);
                }
                collect_bindings(orelse, locals, globals);
            }
            StmtKind::While { body, orelse, .. } => {
                collect_bindings(body, locals, globals);
                collect_bindings(orelse, locals, globals);
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
            } => {
                collect_bindings(body, locals, globals);
                for handler in handlers {
                    if let Some(name) = &handler.name {
                        locals.insert(name.clone());
                    }
                    collect_bindings(&handler.body, locals, globals);
                }
                collect_bindings(orelse, locals, globals);
            }
            StmtKind::FunctionDef(def) => {
                locals.insert(def.name.clone());
            }
            StmtKind::Import(names) | StmtKind::ImportFrom { names, .. } => {
                for alias in names {
                    locals.insert(alias.bound_name().to_string());
                }
            }
            StmtKind::Global(names) => {
                globals.extend(names.iter().cloned());
            }
            StmtKind::Expr(_)
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Pass
            | StmtKind::Return(_)
            | StmtKind::Raise(_)
            | StmtKind::Assert { .. } => {}
        }
    }
}

fn bind_target(target: &Target, locals: &mut HashSet<String>) {
    let mut names = Vec::new();
    target.bound_names(&mut names);
    locals.extend(names.into_iter().map(str::to_string));
}

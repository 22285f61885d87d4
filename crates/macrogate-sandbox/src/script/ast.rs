//! Syntax tree for macro scripts.
//!
//! Every statement and expression carries the 1-based source line it started
//! on. Function bodies are reference counted so the interpreter can create
//! function values without copying the tree.

use std::rc::Rc;

/// A parsed script.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    /// Top-level statements in source order.
    pub body: Vec<Stmt>,
}

/// A statement with its line.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    /// Line the statement starts on.
    pub line: u32,
    /// What the statement is.
    pub kind: StmtKind,
}

/// Statement forms.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// A bare expression evaluated for its effect.
    Expr(Expr),
    /// `a = b = value`, with one entry in `targets` per `=`.
    Assign {
        /// Assignment targets, leftmost first.
        targets: Vec<Expr>,
        /// The assigned value.
        value: Expr,
    },
    /// `target op= value`.
    AugAssign {
        /// The single target.
        target: Expr,
        /// The arithmetic operator.
        op: BinOp,
        /// Right-hand side.
        value: Expr,
    },
    /// `if` with optional `elif`/`else` folded into `orelse`.
    If {
        /// Condition.
        test: Expr,
        /// Taken branch.
        body: Vec<Stmt>,
        /// Else branch (an `elif` is a nested `If`).
        orelse: Vec<Stmt>,
    },
    /// `while test: ... else: ...`.
    While {
        /// Loop condition.
        test: Expr,
        /// Loop body.
        body: Vec<Stmt>,
        /// Runs when the loop ends without `break`.
        orelse: Vec<Stmt>,
    },
    /// `for target in iter: ... else: ...`.
    For {
        /// Loop variable(s).
        target: Expr,
        /// Iterated expression.
        iter: Expr,
        /// Loop body.
        body: Vec<Stmt>,
        /// Runs when the loop ends without `break`.
        orelse: Vec<Stmt>,
    },
    /// `break`.
    Break,
    /// `continue`.
    Continue,
    /// `pass`.
    Pass,
    /// `def name(params): body`.
    FunctionDef(Rc<FunctionDef>),
    /// `return [value]`.
    Return(Option<Expr>),
    /// `import a.b as c, d`.
    Import(Vec<Alias>),
    /// `from module import names` or `from module import *`.
    ImportFrom {
        /// Dotted module path, with leading dots for relative imports.
        module: String,
        /// Imported names; empty for a star import.
        names: Vec<Alias>,
        /// Whether this is `from module import *`.
        star: bool,
    },
    /// `try` with handlers, `else` and `finally`.
    Try {
        /// Guarded block.
        body: Vec<Stmt>,
        /// `except` clauses in order.
        handlers: Vec<ExceptHandler>,
        /// Runs when `body` raised nothing.
        orelse: Vec<Stmt>,
        /// Always runs.
        finalbody: Vec<Stmt>,
    },
    /// `raise [exc]`.
    Raise(Option<Expr>),
    /// `assert test[, msg]`.
    Assert {
        /// Asserted condition.
        test: Expr,
        /// Optional failure message.
        msg: Option<Expr>,
    },
    /// `del a, b[0]`.
    Delete(Vec<Expr>),
    /// `global a, b`.
    Global(Vec<String>),
}

/// One `except` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    /// Line of the `except` keyword.
    pub line: u32,
    /// Matched exception type(s); `None` catches everything.
    pub kind: Option<Expr>,
    /// `as name` binding.
    pub name: Option<String>,
    /// Handler body.
    pub body: Vec<Stmt>,
}

/// `name [as asname]` in an import.
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    /// Imported (possibly dotted) name.
    pub name: String,
    /// Local binding override.
    pub asname: Option<String>,
}

impl Alias {
    /// The name this alias binds in the importing scope.
    pub fn bound_name(&self) -> &str {
        match &self.asname {
            Some(asname) => asname,
            None => self.name.split('.').next().unwrap_or(&self.name),
        }
    }
}

/// A function or lambda definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    /// Line of `def` or `lambda`.
    pub line: u32,
    /// Function name; `<lambda>` for lambdas.
    pub name: String,
    /// Parameter list.
    pub params: Params,
    /// Body; a lambda body is a single `return`.
    pub body: Vec<Stmt>,
}

/// A formal parameter list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    /// Positional-or-keyword parameters.
    pub args: Vec<Param>,
    /// `*name`.
    pub vararg: Option<String>,
    /// Keyword-only parameters after `*` or `*name`.
    pub kwonly: Vec<Param>,
    /// `**name`.
    pub kwarg: Option<String>,
}

impl Params {
    /// Every name the parameter list binds, in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.args
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.vararg.as_deref())
            .chain(self.kwonly.iter().map(|p| p.name.as_str()))
            .chain(self.kwarg.as_deref())
    }

    /// Default-value expressions, in declaration order.
    pub fn defaults(&self) -> impl Iterator<Item = &Expr> {
        self.args
            .iter()
            .chain(self.kwonly.iter())
            .filter_map(|p| p.default.as_ref())
    }
}

/// A single named parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Parameter name.
    pub name: String,
    /// Default value, evaluated at definition time.
    pub default: Option<Expr>,
}

/// An expression with its line.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// Line the expression starts on.
    pub line: u32,
    /// What the expression is.
    pub kind: ExprKind,
}

impl Expr {
    /// Build an expression node.
    pub fn new(line: u32, kind: ExprKind) -> Self {
        Self { line, kind }
    }
}

/// Expression forms.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A name reference.
    Name(String),
    /// A literal constant.
    Const(Const),
    /// An f-string.
    FString(Vec<FStringPart>),
    /// `[a, b]`.
    List(Vec<Expr>),
    /// `(a, b)` or a bare `a, b`.
    Tuple(Vec<Expr>),
    /// `{k: v, **other}`; a `None` key marks a `**` spread.
    Dict(Vec<(Option<Expr>, Expr)>),
    /// `*value` inside a display or an assignment target.
    Starred(Box<Expr>),
    /// `value.attr`.
    Attribute {
        /// Object.
        value: Box<Expr>,
        /// Attribute name.
        attr: String,
    },
    /// `value[index]`.
    Subscript {
        /// Container.
        value: Box<Expr>,
        /// Index or slice.
        index: Box<Expr>,
    },
    /// `lower:upper:step`, only inside a subscript.
    Slice {
        /// Start bound.
        lower: Option<Box<Expr>>,
        /// End bound.
        upper: Option<Box<Expr>>,
        /// Stride.
        step: Option<Box<Expr>>,
    },
    /// `func(args)`.
    Call {
        /// Callee.
        func: Box<Expr>,
        /// Arguments in source order.
        args: Vec<Arg>,
    },
    /// Binary arithmetic or bitwise operation.
    BinOp {
        /// Left operand.
        left: Box<Expr>,
        /// Operator.
        op: BinOp,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Unary operation.
    UnaryOp {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// Short-circuit `and` / `or`.
    BoolOp {
        /// Operator.
        op: BoolOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// Chained comparison `a < b <= c`.
    Compare {
        /// First operand.
        left: Box<Expr>,
        /// Operator and right operand pairs.
        ops: Vec<(CmpOp, Expr)>,
    },
    /// `body if test else orelse`.
    IfExp {
        /// Condition.
        test: Box<Expr>,
        /// Value when true.
        body: Box<Expr>,
        /// Value when false.
        orelse: Box<Expr>,
    },
    /// `lambda params: body`.
    Lambda(Rc<FunctionDef>),
    /// `[elt for ...]`.
    ListComp {
        /// Produced element.
        elt: Box<Expr>,
        /// `for` / `if` clauses.
        generators: Vec<Comprehension>,
    },
    /// `(elt for ...)`, materialised eagerly as a list.
    GeneratorExp {
        /// Produced element.
        elt: Box<Expr>,
        /// `for` / `if` clauses.
        generators: Vec<Comprehension>,
    },
    /// `{key: value for ...}`.
    DictComp {
        /// Produced key.
        key: Box<Expr>,
        /// Produced value.
        value: Box<Expr>,
        /// `for` / `if` clauses.
        generators: Vec<Comprehension>,
    },
}

/// One `for target in iter if cond...` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    /// Loop variable(s).
    pub target: Expr,
    /// Iterated expression.
    pub iter: Expr,
    /// Filters.
    pub ifs: Vec<Expr>,
}

/// A call argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// `value`.
    Positional(Expr),
    /// `*value`.
    Star(Expr),
    /// `name=value`.
    Keyword(String, Expr),
    /// `**value`.
    DoubleStar(Expr),
}

impl Arg {
    /// The argument's value expression.
    pub fn value(&self) -> &Expr {
        match self {
            Arg::Positional(e) | Arg::Star(e) | Arg::Keyword(_, e) | Arg::DoubleStar(e) => e,
        }
    }
}

/// A piece of an f-string.
#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    /// Literal text.
    Literal(String),
    /// `{expr!conversion:spec}`.
    Field {
        /// Interpolated expression.
        expr: Box<Expr>,
        /// `r`, `s` or `a`.
        conversion: Option<char>,
        /// Format specification.
        spec: Option<String>,
    },
}

/// Literal constants.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    /// `None`.
    None,
    /// `True` / `False`.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// String literal (adjacent literals already joined).
    Str(String),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `//`
    FloorDiv,
    /// `%`
    Mod,
    /// `**`
    Pow,
    /// `<<`
    LShift,
    /// `>>`
    RShift,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `&`
    BitAnd,
}

impl BinOp {
    /// The operator's source spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
            BinOp::LShift => "<<",
            BinOp::RShift => ">>",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::BitAnd => "&",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `not`
    Not,
    /// `-`
    Neg,
    /// `+`
    Pos,
    /// `~`
    Invert,
}

/// Boolean operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    /// `and`
    And,
    /// `or`
    Or,
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtE,
    /// `>`
    Gt,
    /// `>=`
    GtE,
    /// `in`
    In,
    /// `not in`
    NotIn,
    /// `is`
    Is,
    /// `is not`
    IsNot,
}

impl CmpOp {
    /// The operator's source spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
        }
    }
}

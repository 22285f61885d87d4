//! Static security validator for macro scripts.
//!
//! Parses code into a syntax tree and walks every node against a
//! [`SecurityPolicy`]: imports must name allowed modules, denied identifiers
//! may not be referenced, bound or called, and denied attributes may not be
//! accessed. Nothing is executed.
//!
//! ## Limitations
//!
//! This is an allow/deny filter over syntax. It does not stop an allowed
//! capability from being misused through its own API, and it is not an
//! isolation boundary on its own. The interpreter that runs validated code is
//! the second layer: it has no file, network, process or reflection
//! primitives at all.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::script::ast::*;
use crate::script::{parse, SyntaxError};

/// Maximum bracket nesting depth before parsing is refused.
pub const MAX_NESTING_DEPTH: usize = 100;

/// Modules importable by default.
pub const DEFAULT_ALLOWED_MODULES: &[&str] = &[
    "App",
    "Arch",
    "Draft",
    "Drawing",
    "FreeCAD",
    "FreeCADGui",
    "Gui",
    "Import",
    "Mesh",
    "Part",
    "PartDesign",
    "Sketcher",
    "Spreadsheet",
    "TechDraw",
    "math",
    "numpy",
];

/// Identifiers denied by default.
pub const DEFAULT_DENIED_IDENTIFIERS: &[&str] = &[
    "__import__",
    "__builtins__",
    "compile",
    "delattr",
    "dir",
    "eval",
    "exec",
    "getattr",
    "globals",
    "hasattr",
    "locals",
    "open",
    "setattr",
    "vars",
];

/// Attributes denied by default.
pub const DEFAULT_DENIED_ATTRIBUTES: &[&str] = &[
    "__bases__",
    "__class__",
    "__code__",
    "__dict__",
    "__globals__",
    "__mro__",
    "__subclasses__",
];

/// The allow/deny configuration consumed by the validator.
///
/// Build one at startup and share it behind an `Arc`; every validation in
/// the process should see the same instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityPolicy {
    allowed_modules: BTreeSet<String>,
    denied_identifiers: BTreeSet<String>,
    denied_attributes: BTreeSet<String>,
    allowed_list: Arc<str>,
}

impl Default for SecurityPolicy {
    fn default() -> Self {
        Self::new(
            DEFAULT_ALLOWED_MODULES.iter().copied(),
            DEFAULT_DENIED_IDENTIFIERS.iter().copied(),
            DEFAULT_DENIED_ATTRIBUTES.iter().copied(),
        )
    }
}

impl SecurityPolicy {
    /// Build a policy from explicit sets.
    pub fn new<A, I, T>(allowed_modules: A, denied_identifiers: I, denied_attributes: T) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
        T: IntoIterator,
        T::Item: Into<String>,
    {
        let allowed_modules: BTreeSet<String> =
            allowed_modules.into_iter().map(Into::into).collect();
        let allowed_list = allowed_modules
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            allowed_modules,
            denied_identifiers: denied_identifiers.into_iter().map(Into::into).collect(),
            denied_attributes: denied_attributes.into_iter().map(Into::into).collect(),
            allowed_list: allowed_list.into(),
        }
    }

    /// Allowed top-level module names.
    pub fn allowed_modules(&self) -> &BTreeSet<String> {
        &self.allowed_modules
    }

    /// Identifiers that may not be referenced.
    pub fn denied_identifiers(&self) -> &BTreeSet<String> {
        &self.denied_identifiers
    }

    /// Attribute names that may not be accessed.
    pub fn denied_attributes(&self) -> &BTreeSet<String> {
        &self.denied_attributes
    }

    /// Whether `module`'s top-level package is allowed.
    pub fn is_module_allowed(&self, module: &str) -> bool {
        let top = module.split('.').next().unwrap_or(module);
        self.allowed_modules.contains(top)
    }

    /// Validate code against this policy.
    pub fn validate(&self, code: &str) -> ValidationResult {
        validate_code(code, self).0
    }
}

/// A single reason code was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Violation {
    /// The code does not parse.
    SyntaxError {
        /// Parser message.
        message: String,
        /// Offending line.
        line: u32,
    },
    /// An import names a module outside the allowed set.
    DisallowedImport {
        /// The module path as written.
        module: String,
        /// `from module import ...` rather than `import module`.
        from_import: bool,
        /// Comma-separated allowed modules, for the message.
        #[serde(skip)]
        allowed: Arc<str>,
        /// Offending line.
        line: u32,
    },
    /// A denied identifier is referenced or bound.
    DeniedIdentifier {
        /// The identifier.
        name: String,
        /// Offending line.
        line: u32,
    },
    /// A denied attribute is accessed.
    DeniedAttribute {
        /// The attribute name.
        attr: String,
        /// Offending line.
        line: u32,
    },
    /// A denied identifier is called.
    DeniedCall {
        /// The callee name.
        name: String,
        /// Offending line.
        line: u32,
    },
    /// Brackets nest deeper than the parser accepts.
    NestingTooDeep {
        /// Maximum allowed depth.
        max: usize,
        /// Depth found.
        actual: usize,
        /// Line where the limit was crossed.
        line: u32,
    },
}

impl Violation {
    /// The source line the violation refers to.
    pub fn line(&self) -> u32 {
        match self {
            Self::SyntaxError { line, .. }
            | Self::DisallowedImport { line, .. }
            | Self::DeniedIdentifier { line, .. }
            | Self::DeniedAttribute { line, .. }
            | Self::DeniedCall { line, .. }
            | Self::NestingTooDeep { line, .. } => *line,
        }
    }

    /// The violation as a JSON object with `kind`, `line` and `message`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| serde_json::json!({}));
        if let Some(object) = value.as_object_mut() {
            object.insert("message".into(), self.to_string().into());
        }
        value
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SyntaxError { message, line } => {
                write!(f, "Syntax error at line {line}: {message}")
            }
            Self::DisallowedImport {
                module,
                from_import: false,
                allowed,
                ..
            } => write!(
                f,
                "Importing module '{module}' is not allowed. Allowed modules: {allowed}"
            ),
            Self::DisallowedImport {
                module,
                from_import: true,
                allowed,
                ..
            } => write!(
                f,
                "Importing from module '{module}' is not allowed. Allowed modules: {allowed}"
            ),
            Self::DeniedIdentifier { name, .. } => {
                write!(f, "Using '{name}' is not allowed for security reasons")
            }
            Self::DeniedAttribute { attr, .. } => {
                write!(f, "Accessing attribute '{attr}' is not allowed for security reasons")
            }
            Self::DeniedCall { name, .. } => {
                write!(f, "Calling '{name}' is not allowed for security reasons")
            }
            Self::NestingTooDeep { max, actual, .. } => {
                write!(f, "Code nesting depth {actual} exceeds maximum {max}")
            }
        }
    }
}

/// The verdict of one validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    violations: Vec<Violation>,
}

impl ValidationResult {
    fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    /// `true` when no violations were found.
    pub fn is_safe(&self) -> bool {
        self.violations.is_empty()
    }

    /// Violations in the order they were found.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Human-readable messages in order.
    pub fn messages(&self) -> Vec<String> {
        self.violations.iter().map(ToString::to_string).collect()
    }

    /// All messages joined with `"; "`.
    pub fn summary(&self) -> String {
        self.messages().join("; ")
    }

    /// Consume the result, yielding the violations.
    pub fn into_violations(self) -> Vec<Violation> {
        self.violations
    }
}

/// Check bracket nesting depth before parsing.
pub fn check_nesting_depth(code: &str) -> Result<(), Violation> {
    let mut depth: usize = 0;
    let mut line: u32 = 1;
    for ch in code.chars() {
        match ch {
            '\n' => line += 1,
            '{' | '[' | '(' => {
                depth += 1;
                if depth > MAX_NESTING_DEPTH {
                    return Err(Violation::NestingTooDeep {
                        max: MAX_NESTING_DEPTH,
                        actual: depth,
                        line,
                    });
                }
            }
            '}' | ']' | ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}

/// Validate code, also returning the parsed program when it parsed.
///
/// The executor runs the program it gets back here, so the tree that was
/// checked is exactly the tree that is executed.
pub fn validate_code(code: &str, policy: &SecurityPolicy) -> (ValidationResult, Option<Program>) {
    if let Err(violation) = check_nesting_depth(code) {
        return (ValidationResult::new(vec![violation]), None);
    }

    let program = match parse(code) {
        Ok(program) => program,
        Err(SyntaxError { line, message }) => {
            return (
                ValidationResult::new(vec![Violation::SyntaxError { message, line }]),
                None,
            );
        }
    };

    let result = validate_program(&program, policy);
    (result, Some(program))
}

/// Validate an already-parsed program.
pub fn validate_program(program: &Program, policy: &SecurityPolicy) -> ValidationResult {
    let mut walker = PolicyWalker {
        policy,
        violations: Vec::new(),
    };
    walker.walk_block(&program.body);
    ValidationResult::new(walker.violations)
}

/// Exhaustive tree walker collecting policy violations.
struct PolicyWalker<'p> {
    policy: &'p SecurityPolicy,
    violations: Vec<Violation>,
}

impl PolicyWalker<'_> {
    fn report(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    fn check_identifier(&mut self, name: &str, line: u32) {
        if self.policy.denied_identifiers.contains(name) {
            self.report(Violation::DeniedIdentifier {
                name: name.to_string(),
                line,
            });
        }
    }

    fn check_attribute(&mut self, attr: &str, line: u32) {
        if self.policy.denied_attributes.contains(attr) {
            self.report(Violation::DeniedAttribute {
                attr: attr.to_string(),
                line,
            });
        }
    }

    fn check_import(&mut self, module: &str, from_import: bool, line: u32) {
        if !self.policy.is_module_allowed(module) {
            self.report(Violation::DisallowedImport {
                module: module.to_string(),
                from_import,
                allowed: self.policy.allowed_list.clone(),
                line,
            });
        }
    }

    // --- Statements ---

    fn walk_block(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.walk_stmt(stmt);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::Expr(expr) => self.walk_expr(expr),
            StmtKind::Assign { targets, value } => {
                for target in targets {
                    self.walk_expr(target);
                }
                self.walk_expr(value);
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.walk_expr(target);
                self.walk_expr(value);
            }
            StmtKind::If { test, body, orelse } | StmtKind::While { test, body, orelse } => {
                self.walk_expr(test);
                self.walk_block(body);
                self.walk_block(orelse);
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                self.walk_expr(target);
                self.walk_expr(iter);
                self.walk_block(body);
                self.walk_block(orelse);
            }
            StmtKind::Break | StmtKind::Continue | StmtKind::Pass => {}
            StmtKind::FunctionDef(def) => {
                self.check_identifier(&def.name, def.line);
                self.walk_function(def);
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.walk_expr(value);
                }
            }
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    self.check_import(&alias.name, false, line);
                    if let Some(asname) = &alias.asname {
                        self.check_identifier(asname, line);
                    }
                }
            }
            StmtKind::ImportFrom { module, names, .. } => {
                self.check_import(module, true, line);
                for alias in names {
                    self.check_identifier(alias.bound_name(), line);
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.walk_block(body);
                for handler in handlers {
                    if let Some(kind) = &handler.kind {
                        self.walk_expr(kind);
                    }
                    if let Some(name) = &handler.name {
                        self.check_identifier(name, handler.line);
                    }
                    self.walk_block(&handler.body);
                }
                self.walk_block(orelse);
                self.walk_block(finalbody);
            }
            StmtKind::Raise(exc) => {
                if let Some(exc) = exc {
                    self.walk_expr(exc);
                }
            }
            StmtKind::Assert { test, msg } => {
                self.walk_expr(test);
                if let Some(msg) = msg {
                    self.walk_expr(msg);
                }
            }
            StmtKind::Delete(targets) => {
                for target in targets {
                    self.walk_expr(target);
                }
            }
            StmtKind::Global(names) => {
                for name in names {
                    self.check_identifier(name, line);
                }
            }
        }
    }

    fn walk_function(&mut self, def: &FunctionDef) {
        for name in def.params.names() {
            self.check_identifier(name, def.line);
        }
        for default in def.params.defaults() {
            self.walk_expr(default);
        }
        self.walk_block(&def.body);
    }

    // --- Expressions ---

    fn walk_expr(&mut self, expr: &Expr) {
        let line = expr.line;
        match &expr.kind {
            ExprKind::Name(name) => self.check_identifier(name, line),
            ExprKind::Const(_) => {}
            ExprKind::FString(parts) => {
                for part in parts {
                    if let FStringPart::Field { expr, .. } = part {
                        self.walk_expr(expr);
                    }
                }
            }
            ExprKind::List(items) | ExprKind::Tuple(items) => {
                for item in items {
                    self.walk_expr(item);
                }
            }
            ExprKind::Dict(items) => {
                for (key, value) in items {
                    if let Some(key) = key {
                        self.walk_expr(key);
                    }
                    self.walk_expr(value);
                }
            }
            ExprKind::Starred(inner) => self.walk_expr(inner),
            ExprKind::Attribute { value, attr } => {
                self.check_attribute(attr, line);
                self.walk_expr(value);
            }
            ExprKind::Subscript { value, index } => {
                self.walk_expr(value);
                self.walk_expr(index);
            }
            ExprKind::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.walk_expr(part);
                }
            }
            ExprKind::Call { func, args } => {
                if let ExprKind::Name(name) = &func.kind {
                    if self.policy.denied_identifiers.contains(name.as_str()) {
                        self.report(Violation::DeniedCall {
                            name: name.clone(),
                            line,
                        });
                    }
                }
                self.walk_expr(func);
                for arg in args {
                    self.walk_expr(arg.value());
                }
            }
            ExprKind::BinOp { left, right, .. } | ExprKind::BoolOp { left, right, .. } => {
                self.walk_expr(left);
                self.walk_expr(right);
            }
            ExprKind::UnaryOp { operand, .. } => self.walk_expr(operand),
            ExprKind::Compare { left, ops } => {
                self.walk_expr(left);
                for (_, right) in ops {
                    self.walk_expr(right);
                }
            }
            ExprKind::IfExp { test, body, orelse } => {
                self.walk_expr(test);
                self.walk_expr(body);
                self.walk_expr(orelse);
            }
            ExprKind::Lambda(def) => self.walk_function(def),
            ExprKind::ListComp { elt, generators } | ExprKind::GeneratorExp { elt, generators } => {
                self.walk_generators(generators);
                self.walk_expr(elt);
            }
            ExprKind::DictComp {
                key,
                value,
                generators,
            } => {
                self.walk_generators(generators);
                self.walk_expr(key);
                self.walk_expr(value);
            }
        }
    }

    fn walk_generators(&mut self, generators: &[Comprehension]) {
        for generator in generators {
            self.walk_expr(&generator.target);
            self.walk_expr(&generator.iter);
            for cond in &generator.ifs {
                self.walk_expr(cond);
            }
        }
    }
}

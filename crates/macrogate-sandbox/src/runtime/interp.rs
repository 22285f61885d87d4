//! Tree-walking evaluator for macro scripts.
//!
//! One [`Interpreter`] runs one program and is dropped afterwards. It ticks
//! once per statement, call and loop iteration; every tick counts against the
//! step budget and every 64th also checks the wall clock, so a runaway loop is
//! stopped with an [`Abort`] that script code cannot catch.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use serde_json::{Map, Value as Json};

use crate::audit::HostCallAudit;
use crate::capability::{self, CapabilitySet, HostBridge};
use crate::script::ast::*;

use super::builtins::{self, Args, Builtin};
use super::exception::{raise, Abort, ExcKind, ExceptionObj, Interrupt, Raised, TraceFrame};
use super::format::convert_and_format;
use super::math;
use super::methods;
use super::value::{
    dict_from_json, release, BoundMethod, Dict, Function, NativeFn, NativeKind, RunResult, Value,
};

/// Resource limits for one run.
#[derive(Debug, Clone)]
pub struct Limits {
    /// Wall-clock budget.
    pub timeout: Duration,
    /// Optional step budget.
    pub max_steps: Option<u64>,
    /// Maximum bytes of captured output.
    pub max_output: usize,
    /// Maximum script call depth.
    pub max_recursion: usize,
    /// Maximum length of a single string or collection.
    pub max_collection_len: usize,
}

/// A variable namespace: module globals, a function call, or a comprehension.
pub struct Scope {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Scope>>,
    declared_global: RefCell<HashSet<String>>,
}

impl Scope {
    /// The module-level scope.
    pub fn root() -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::default(),
            parent: None,
            declared_global: RefCell::default(),
        })
    }

    /// A nested scope.
    pub fn child(parent: &Rc<Scope>) -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::default(),
            parent: Some(parent.clone()),
            declared_global: RefCell::default(),
        })
    }

    /// Resolve a name through the scope chain.
    pub fn get(&self, name: &str) -> Option<Value> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(value) = current.vars.borrow().get(name) {
                return Some(value.clone());
            }
            scope = current.parent.as_deref();
        }
        None
    }

    /// A binding in this scope only.
    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }

    /// Bind in this scope, ignoring `global` declarations.
    pub fn set_local(&self, name: &str, value: Value) {
        let previous = self.vars.borrow_mut().insert(name.to_string(), value);
        drop(previous);
    }

    /// Bind, honouring `global` declarations.
    pub fn assign(self: &Rc<Self>, name: &str, value: Value) {
        if self.declared_global.borrow().contains(name) {
            self.root_scope().set_local(name, value);
        } else {
            self.set_local(name, value);
        }
    }

    /// Unbind, honouring `global` declarations.
    pub fn remove(self: &Rc<Self>, name: &str) -> Option<Value> {
        if self.declared_global.borrow().contains(name) {
            let root = self.root_scope();
            let removed = root.vars.borrow_mut().remove(name);
            removed
        } else {
            let removed = self.vars.borrow_mut().remove(name);
            removed
        }
    }

    fn declare_global(&self, name: &str) {
        if self.parent.is_some() {
            self.declared_global.borrow_mut().insert(name.to_string());
        }
    }

    fn root_scope(self: &Rc<Self>) -> Rc<Scope> {
        let mut scope = self.clone();
        while let Some(parent) = scope.parent.clone() {
            scope = parent;
        }
        scope
    }

    /// Drop every binding.
    pub fn clear(&self) {
        let vars = std::mem::take(&mut *self.vars.borrow_mut());
        release(vars.into_values());
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        release(std::mem::take(self.vars.get_mut()).into_values());
    }
}

/// How a block finished.
pub enum Flow {
    /// Fell off the end.
    Normal,
    /// `break`.
    Break,
    /// `continue`.
    Continue,
    /// `return value`.
    Return(Value),
}

/// What a successful run produced.
#[derive(Debug, Default)]
pub struct RunOutput {
    /// Everything `print` wrote.
    pub output: String,
    /// JSON form of the top-level `result` binding, if bound.
    pub result: Option<Json>,
    /// Host calls made by the script.
    pub host_calls: Vec<HostCallAudit>,
}

/// Why a run failed.
#[derive(Debug)]
pub enum RunFailure {
    /// An uncaught script exception.
    Script {
        /// Exception type name.
        kind: &'static str,
        /// `str(exception)`.
        message: String,
        /// Python-style traceback.
        traceback: String,
        /// Output captured before the failure.
        output: String,
        /// Host calls made before the failure.
        host_calls: Vec<HostCallAudit>,
    },
    /// A resource limit stopped the run.
    Abort(Abort),
}

/// Run a parsed program with injected parameters.
///
/// Capability bindings and parameters become module globals, and all
/// parameters are also available as the dict `params`. Callers validate
/// parameter names beforehand.
pub fn run(
    program: &Program,
    params: &Map<String, Json>,
    capabilities: &CapabilitySet,
    limits: &Limits,
) -> Result<RunOutput, RunFailure> {
    let mut interp = Interpreter::new(capabilities, limits);
    let globals = interp.globals.clone();

    for name in capabilities.names() {
        if let Some(module) = interp.module(name) {
            globals.set_local(name, module);
        }
    }
    for (name, value) in params {
        globals.set_local(name, Value::from_json(value));
    }
    globals.set_local("params", Value::dict(dict_from_json(params)));

    let outcome = interp.exec_block(&program.body, &globals);
    let result = match outcome {
        Ok(_) => Ok(globals.get_local("result").map(|value| {
            value
                .to_json()
                .unwrap_or_else(|_| Json::String(value.repr()))
        })),
        Err(err) => Err(err),
    };
    let output = std::mem::take(&mut interp.output);
    let host_calls = std::mem::take(&mut interp.host_calls);
    interp.teardown();

    match result {
        Ok(result) => Ok(RunOutput {
            output,
            result,
            host_calls,
        }),
        Err(Interrupt::Abort(abort)) => Err(RunFailure::Abort(abort)),
        Err(Interrupt::Raise(raised)) => Err(RunFailure::Script {
            kind: raised.exc.kind.name(),
            message: raised.exc.message.clone(),
            traceback: raised.traceback(),
            output,
            host_calls,
        }),
    }
}

/// Evaluation state for one run.
pub struct Interpreter<'a> {
    limits: &'a Limits,
    capabilities: &'a CapabilitySet,
    globals: Rc<Scope>,
    builtins: HashMap<&'static str, Value>,
    modules: HashMap<String, Value>,
    frames: Vec<TraceFrame>,
    handling: Vec<Raised>,
    output: String,
    host_calls: Vec<HostCallAudit>,
    steps: u64,
    started: Instant,
    closure_scopes: Vec<Weak<Scope>>,
    prune_at: usize,
}

impl<'a> Interpreter<'a> {
    fn new(capabilities: &'a CapabilitySet, limits: &'a Limits) -> Self {
        let mut builtins = HashMap::new();
        for builtin in Builtin::ALL {
            builtins.insert(builtin.name(), Value::Builtin(builtin));
        }
        for kind in ExcKind::ALL {
            builtins.insert(kind.name(), Value::ExcType(kind));
        }
        Self {
            limits,
            capabilities,
            globals: Scope::root(),
            builtins,
            modules: HashMap::new(),
            frames: vec![TraceFrame {
                name: Rc::from("<module>"),
                line: 0,
            }],
            handling: Vec::new(),
            output: String::new(),
            host_calls: Vec::new(),
            steps: 0,
            started: Instant::now(),
            closure_scopes: Vec::new(),
            prune_at: 1024,
        }
    }

    /// Break reference cycles between functions and the scopes they close
    /// over. Containers that reference only themselves are not reclaimed.
    fn teardown(&mut self) {
        self.handling.clear();
        for scope in std::mem::take(&mut self.closure_scopes) {
            if let Some(scope) = scope.upgrade() {
                scope.clear();
            }
        }
        self.globals.clear();
        let modules = std::mem::take(&mut self.modules);
        release(modules.into_values());
    }

    // --- Limits ---

    /// Count one step against the budgets.
    pub fn tick(&mut self) -> RunResult<()> {
        self.steps += 1;
        if let Some(max) = self.limits.max_steps {
            if self.steps > max {
                return Err(Interrupt::Abort(Abort::StepLimit));
            }
        }
        if self.steps % 64 == 0 && self.started.elapsed() > self.limits.timeout {
            return Err(Interrupt::Abort(Abort::Timeout));
        }
        Ok(())
    }

    /// Refuse to build a collection longer than the configured limit.
    pub fn check_len(&self, len: usize) -> RunResult<()> {
        if len > self.limits.max_collection_len {
            return raise(
                ExcKind::MemoryError,
                format!(
                    "collection of {len} items exceeds the limit of {}",
                    self.limits.max_collection_len
                ),
            );
        }
        Ok(())
    }

    /// Append to the captured output.
    pub fn write_output(&mut self, text: &str) -> RunResult<()> {
        if self.output.len() + text.len() > self.limits.max_output {
            return Err(Interrupt::Abort(Abort::OutputLimit));
        }
        self.output.push_str(text);
        Ok(())
    }

    fn snapshot(&self) -> Vec<TraceFrame> {
        self.frames.clone()
    }

    // --- Iteration ---

    /// Visit every item of an iterable; `visit` returns `false` to stop.
    pub fn for_each<F>(&mut self, iterable: &Value, mut visit: F) -> RunResult<()>
    where
        F: FnMut(&mut Self, Value) -> RunResult<bool>,
    {
        match iterable {
            Value::List(list) => {
                let mut index = 0;
                while let Some(item) = list.get(index) {
                    self.tick()?;
                    if !visit(self, item)? {
                        break;
                    }
                    index += 1;
                }
            }
            Value::Tuple(items) => {
                for item in items.iter() {
                    self.tick()?;
                    if !visit(self, item.clone())? {
                        break;
                    }
                }
            }
            Value::Str(s) => {
                let mut buf = [0u8; 4];
                for ch in s.chars() {
                    self.tick()?;
                    if !visit(self, Value::str(ch.encode_utf8(&mut buf)))? {
                        break;
                    }
                }
            }
            Value::Dict(dict) => {
                let keys = dict.borrow().keys();
                for key in keys {
                    self.tick()?;
                    if !visit(self, key)? {
                        break;
                    }
                }
            }
            Value::Range(range) => {
                for index in 0..range.len() {
                    self.tick()?;
                    if !visit(self, Value::Int(range.nth(index)))? {
                        break;
                    }
                }
            }
            other => {
                return raise(
                    ExcKind::TypeError,
                    format!("'{}' object is not iterable", other.type_name()),
                )
            }
        }
        Ok(())
    }

    /// Materialise an iterable.
    pub fn collect(&mut self, iterable: &Value) -> RunResult<Vec<Value>> {
        match iterable {
            Value::List(list) => return Ok(list.borrow().clone()),
            Value::Tuple(items) => return Ok(items.to_vec()),
            Value::Range(range) => self.check_len(range.len())?,
            _ => {}
        }
        let max = self.limits.max_collection_len;
        let mut items = Vec::new();
        self.for_each(iterable, |this, item| {
            if items.len() >= max {
                this.check_len(items.len() + 1)?;
            }
            items.push(item);
            Ok(true)
        })?;
        Ok(items)
    }

    // --- Statements ---

    fn exec_block(&mut self, body: &[Stmt], scope: &Rc<Scope>) -> RunResult<Flow> {
        for stmt in body {
            match self.exec_stmt(stmt, scope)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> RunResult<Flow> {
        self.tick()?;
        if let Some(frame) = self.frames.last_mut() {
            frame.line = stmt.line;
        }
        match self.exec_kind(stmt, scope) {
            Err(Interrupt::Raise(mut raised)) if raised.trace.is_none() => {
                raised.trace = Some(self.snapshot());
                Err(Interrupt::Raise(raised))
            }
            other => other,
        }
    }

    fn exec_kind(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> RunResult<Flow> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr, scope)?;
            }
            StmtKind::Assign { targets, value } => {
                let value = self.eval(value, scope)?;
                for target in targets {
                    self.assign(target, value.clone(), scope)?;
                }
            }
            StmtKind::AugAssign { target, op, value } => self.aug_assign(target, *op, value, scope)?,
            StmtKind::If { test, body, orelse } => {
                return if self.eval(test, scope)?.truthy() {
                    self.exec_block(body, scope)
                } else {
                    self.exec_block(orelse, scope)
                };
            }
            StmtKind::While { test, body, orelse } => {
                while self.eval(test, scope)?.truthy() {
                    match self.exec_block(body, scope)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                    self.tick()?;
                }
                return self.exec_block(orelse, scope);
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let iterable = self.eval(iter, scope)?;
                let mut returned = None;
                let mut broke = false;
                self.for_each(&iterable, |this, item| {
                    this.assign(target, item, scope)?;
                    match this.exec_block(body, scope)? {
                        Flow::Break => {
                            broke = true;
                            Ok(false)
                        }
                        Flow::Return(value) => {
                            returned = Some(value);
                            Ok(false)
                        }
                        Flow::Normal | Flow::Continue => Ok(true),
                    }
                })?;
                if let Some(value) = returned {
                    return Ok(Flow::Return(value));
                }
                if !broke {
                    return self.exec_block(orelse, scope);
                }
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Pass => {}
            StmtKind::FunctionDef(def) => {
                let function = self.make_function(def, scope)?;
                scope.assign(&def.name, function);
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval(expr, scope)?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    let (top, leaf) = self.import(&alias.name)?;
                    match &alias.asname {
                        Some(asname) => scope.assign(asname, leaf),
                        None => scope.assign(alias.bound_name(), top),
                    }
                }
            }
            StmtKind::ImportFrom {
                module,
                names,
                star,
            } => {
                let (_, source) = self.import(module)?;
                let Value::Module(source) = source else {
                    return raise(ExcKind::ImportError, format!("No module named '{module}'"));
                };
                if *star {
                    for (name, value) in &source.attrs {
                        if !name.starts_with('_') {
                            scope.assign(name, value.clone());
                        }
                    }
                }
                for alias in names {
                    let Some(value) = source.attrs.get(&alias.name) else {
                        return raise(
                            ExcKind::ImportError,
                            format!("cannot import name '{}' from '{module}'", alias.name),
                        );
                    };
                    scope.assign(alias.bound_name(), value.clone());
                }
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => return self.exec_try(body, handlers, orelse, finalbody, scope),
            StmtKind::Raise(exc) => {
                let Some(expr) = exc else {
                    return match self.handling.last() {
                        Some(raised) => Err(Interrupt::Raise(raised.clone())),
                        None => raise(ExcKind::RuntimeError, "No active exception to reraise"),
                    };
                };
                let exc = match self.eval(expr, scope)? {
                    Value::ExcType(kind) => Rc::new(ExceptionObj::from_args(kind, Vec::new())),
                    Value::Exception(exc) => exc,
                    _ => return raise(ExcKind::TypeError, "exceptions must derive from BaseException"),
                };
                return Err(Interrupt::Raise(Raised { exc, trace: None }));
            }
            StmtKind::Assert { test, msg } => {
                if !self.eval(test, scope)?.truthy() {
                    let args = match msg {
                        Some(msg) => vec![self.eval(msg, scope)?],
                        None => Vec::new(),
                    };
                    return Err(Interrupt::from_exception(ExceptionObj::from_args(
                        ExcKind::AssertionError,
                        args,
                    )));
                }
            }
            StmtKind::Delete(targets) => {
                for target in targets {
                    self.delete(target, scope)?;
                }
            }
            StmtKind::Global(names) => {
                for name in names {
                    scope.declare_global(name);
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[ExceptHandler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
        scope: &Rc<Scope>,
    ) -> RunResult<Flow> {
        let outcome = match self.exec_block(body, scope) {
            Err(Interrupt::Raise(raised)) => match self.find_handler(handlers, &raised, scope) {
                Ok(Some(handler)) => {
                    if let Some(name) = &handler.name {
                        scope.assign(name, Value::Exception(raised.exc.clone()));
                    }
                    self.handling.push(raised);
                    let result = self.exec_block(&handler.body, scope);
                    self.handling.pop();
                    if let Some(name) = &handler.name {
                        scope.remove(name);
                    }
                    result
                }
                Ok(None) => Err(Interrupt::Raise(raised)),
                Err(err) => Err(err),
            },
            Ok(Flow::Normal) => self.exec_block(orelse, scope),
            other => other,
        };
        if finalbody.is_empty() || matches!(outcome, Err(Interrupt::Abort(_))) {
            return outcome;
        }
        match self.exec_block(finalbody, scope)? {
            Flow::Normal => outcome,
            flow => Ok(flow),
        }
    }

    fn find_handler<'h>(
        &mut self,
        handlers: &'h [ExceptHandler],
        raised: &Raised,
        scope: &Rc<Scope>,
    ) -> RunResult<Option<&'h ExceptHandler>> {
        for handler in handlers {
            let Some(kind_expr) = &handler.kind else {
                return Ok(Some(handler));
            };
            let filter = self.eval(kind_expr, scope)?;
            if self.exception_matches(raised.exc.kind, &filter)? {
                return Ok(Some(handler));
            }
        }
        Ok(None)
    }

    fn exception_matches(&self, kind: ExcKind, filter: &Value) -> RunResult<bool> {
        match filter {
            Value::ExcType(expected) => Ok(kind.is_subclass_of(*expected)),
            Value::Tuple(items) => {
                for item in items.iter() {
                    if self.exception_matches(kind, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            _ => raise(
                ExcKind::TypeError,
                "catching classes that do not inherit from BaseException is not allowed",
            ),
        }
    }

    fn import(&mut self, dotted: &str) -> RunResult<(Value, Value)> {
        let not_found = || Interrupt::new(ExcKind::ImportError, format!("No module named '{dotted}'"));
        let mut parts = dotted.split('.');
        let top_name = parts.next().unwrap_or_default();
        let top = self.module(top_name).ok_or_else(not_found)?;
        let mut leaf = top.clone();
        for part in parts {
            let next = match &leaf {
                Value::Module(module) => match module.attrs.get(part) {
                    Some(value @ Value::Module(_)) => value.clone(),
                    _ => return Err(not_found()),
                },
                _ => return Err(not_found()),
            };
            leaf = next;
        }
        Ok((top, leaf))
    }

    fn module(&mut self, name: &str) -> Option<Value> {
        if let Some(module) = self.modules.get(name) {
            return Some(module.clone());
        }
        let capability = self.capabilities.get(name)?;
        let module = capability::instantiate(name, capability);
        self.modules.insert(name.to_string(), module.clone());
        Some(module)
    }

    // --- Assignment ---

    fn assign(&mut self, target: &Expr, value: Value, scope: &Rc<Scope>) -> RunResult<()> {
        match &target.kind {
            ExprKind::Name(name) => {
                scope.assign(name, value);
                Ok(())
            }
            ExprKind::Tuple(targets) | ExprKind::List(targets) => self.unpack(targets, value, scope),
            ExprKind::Subscript { value: object, index } => {
                let container = self.eval(object, scope)?;
                if let ExprKind::Slice { lower, upper, step } = &index.kind {
                    let bounds = self.eval_slice(lower, upper, step, scope)?;
                    self.set_slice(&container, bounds, value)
                } else {
                    let index = self.eval(index, scope)?;
                    self.set_item(&container, index, value)
                }
            }
            ExprKind::Attribute { value: object, attr } => {
                let object = self.eval(object, scope)?;
                self.set_attr(&object, attr)
            }
            _ => raise(ExcKind::TypeError, "cannot assign to expression"),
        }
    }

    fn unpack(&mut self, targets: &[Expr], value: Value, scope: &Rc<Scope>) -> RunResult<()> {
        let mut items = self.collect(&value)?;
        let star = targets
            .iter()
            .position(|t| matches!(t.kind, ExprKind::Starred(_)));
        match star {
            None => {
                if items.len() < targets.len() {
                    return raise(
                        ExcKind::ValueError,
                        format!(
                            "not enough values to unpack (expected {}, got {})",
                            targets.len(),
                            items.len()
                        ),
                    );
                }
                if items.len() > targets.len() {
                    return raise(
                        ExcKind::ValueError,
                        format!("too many values to unpack (expected {})", targets.len()),
                    );
                }
                for (target, item) in targets.iter().zip(items) {
                    self.assign(target, item, scope)?;
                }
            }
            Some(position) => {
                let required = targets.len() - 1;
                if items.len() < required {
                    return raise(
                        ExcKind::ValueError,
                        format!(
                            "not enough values to unpack (expected at least {required}, got {})",
                            items.len()
                        ),
                    );
                }
                let after = targets.len() - position - 1;
                let tail = items.split_off(items.len() - after);
                let middle = items.split_off(position);
                for (target, item) in targets[..position].iter().zip(items) {
                    self.assign(target, item, scope)?;
                }
                if let ExprKind::Starred(inner) = &targets[position].kind {
                    self.assign(inner, Value::list(middle), scope)?;
                }
                for (target, item) in targets[position + 1..].iter().zip(tail) {
                    self.assign(target, item, scope)?;
                }
            }
        }
        Ok(())
    }

    fn aug_assign(
        &mut self,
        target: &Expr,
        op: BinOp,
        value: &Expr,
        scope: &Rc<Scope>,
    ) -> RunResult<()> {
        match &target.kind {
            ExprKind::Name(name) => {
                let current = self.load_name(name, scope)?;
                let rhs = self.eval(value, scope)?;
                let updated = self.inplace_op(op, current, &rhs)?;
                scope.assign(name, updated);
                Ok(())
            }
            ExprKind::Subscript {
                value: object,
                index,
            } if !matches!(index.kind, ExprKind::Slice { .. }) => {
                let container = self.eval(object, scope)?;
                let index = self.eval(index, scope)?;
                let current = self.get_item(&container, &index)?;
                let rhs = self.eval(value, scope)?;
                let updated = self.inplace_op(op, current, &rhs)?;
                self.set_item(&container, index, updated)
            }
            ExprKind::Attribute { value: object, attr } => {
                let object = self.eval(object, scope)?;
                self.set_attr(&object, attr)
            }
            _ => raise(
                ExcKind::TypeError,
                "illegal expression for augmented assignment",
            ),
        }
    }

    /// `a += b` extends lists in place; everything else rebinds.
    fn inplace_op(&mut self, op: BinOp, current: Value, rhs: &Value) -> RunResult<Value> {
        if let (BinOp::Add, Value::List(list)) = (op, &current) {
            let items = self.collect(rhs)?;
            self.check_len(list.len() + items.len())?;
            list.borrow_mut().extend(items);
            return Ok(current);
        }
        self.binary_op(op, &current, rhs)
    }

    fn delete(&mut self, target: &Expr, scope: &Rc<Scope>) -> RunResult<()> {
        match &target.kind {
            ExprKind::Name(name) => match scope.remove(name) {
                Some(_) => Ok(()),
                None => raise(ExcKind::NameError, format!("name '{name}' is not defined")),
            },
            ExprKind::Subscript { value, index } => {
                let container = self.eval(value, scope)?;
                if let ExprKind::Slice { lower, upper, step } = &index.kind {
                    let bounds = self.eval_slice(lower, upper, step, scope)?;
                    self.del_slice(&container, bounds)
                } else {
                    let index = self.eval(index, scope)?;
                    self.del_item(&container, &index)
                }
            }
            ExprKind::Tuple(items) | ExprKind::List(items) => {
                for item in items {
                    self.delete(item, scope)?;
                }
                Ok(())
            }
            ExprKind::Attribute { value, attr } => {
                let object = self.eval(value, scope)?;
                self.set_attr(&object, attr)
            }
            _ => raise(ExcKind::TypeError, "cannot delete expression"),
        }
    }

    // --- Expressions ---

    fn load_name(&self, name: &str, scope: &Scope) -> RunResult<Value> {
        if let Some(value) = scope.get(name) {
            return Ok(value);
        }
        if let Some(value) = self.builtins.get(name) {
            return Ok(value.clone());
        }
        raise(ExcKind::NameError, format!("name '{name}' is not defined"))
    }

    /// Evaluate an expression.
    pub fn eval(&mut self, expr: &Expr, scope: &Rc<Scope>) -> RunResult<Value> {
        match &expr.kind {
            ExprKind::Name(name) => self.load_name(name, scope),
            ExprKind::Const(constant) => Ok(match constant {
                Const::None => Value::None,
                Const::Bool(b) => Value::Bool(*b),
                Const::Int(i) => Value::Int(*i),
                Const::Float(f) => Value::Float(*f),
                Const::Str(s) => Value::str(s),
            }),
            ExprKind::FString(parts) => {
                let mut out = String::new();
                for part in parts {
                    match part {
                        FStringPart::Literal(text) => out.push_str(text),
                        FStringPart::Field {
                            expr,
                            conversion,
                            spec,
                        } => {
                            let value = self.eval(expr, scope)?;
                            let conversion = conversion.map(String::from);
                            let text = convert_and_format(
                                &value,
                                conversion.as_deref(),
                                spec.as_deref().unwrap_or(""),
                            )?;
                            out.push_str(&text);
                            self.check_len(out.len())?;
                        }
                    }
                }
                Ok(Value::str(&out))
            }
            ExprKind::List(items) => Ok(Value::list(self.eval_items(items, scope)?)),
            ExprKind::Tuple(items) => Ok(Value::tuple(self.eval_items(items, scope)?)),
            ExprKind::Dict(entries) => {
                let mut dict = Dict::default();
                for (key, value) in entries {
                    match key {
                        Some(key) => {
                            let key = self.eval(key, scope)?;
                            let value = self.eval(value, scope)?;
                            dict.insert(key.hash_key()?, key, value);
                        }
                        None => match self.eval(value, scope)? {
                            Value::Dict(other) => {
                                for (k, v) in other.borrow().iter() {
                                    dict.insert(k.hash_key()?, k.clone(), v.clone());
                                }
                            }
                            other => {
                                return raise(
                                    ExcKind::TypeError,
                                    format!("'{}' object is not a mapping", other.type_name()),
                                )
                            }
                        },
                    }
                }
                Ok(Value::dict(dict))
            }
            ExprKind::Starred(_) => raise(ExcKind::TypeError, "can't use starred expression here"),
            ExprKind::Attribute { value, attr } => {
                let object = self.eval(value, scope)?;
                self.get_attr(&object, attr)
            }
            ExprKind::Subscript { value, index } => {
                let object = self.eval(value, scope)?;
                if let ExprKind::Slice { lower, upper, step } = &index.kind {
                    let bounds = self.eval_slice(lower, upper, step, scope)?;
                    self.get_slice(&object, bounds)
                } else {
                    let index = self.eval(index, scope)?;
                    self.get_item(&object, &index)
                }
            }
            ExprKind::Slice { .. } => raise(ExcKind::TypeError, "slice outside of a subscript"),
            ExprKind::Call { func, args } => {
                let callee = self.eval(func, scope)?;
                let (positional, keywords) = self.eval_args(args, scope)?;
                self.call_value(&callee, positional, keywords)
            }
            ExprKind::BinOp { left, op, right } => {
                let left = self.eval(left, scope)?;
                let right = self.eval(right, scope)?;
                self.binary_op(*op, &left, &right)
            }
            ExprKind::UnaryOp { op, operand } => {
                let operand = self.eval(operand, scope)?;
                self.unary_op(*op, &operand)
            }
            ExprKind::BoolOp { op, left, right } => {
                let left = self.eval(left, scope)?;
                match (op, left.truthy()) {
                    (BoolOp::And, false) | (BoolOp::Or, true) => Ok(left),
                    _ => self.eval(right, scope),
                }
            }
            ExprKind::Compare { left, ops } => {
                let mut lhs = self.eval(left, scope)?;
                for (op, right) in ops {
                    let rhs = self.eval(right, scope)?;
                    if !self.compare_op(*op, &lhs, &rhs)? {
                        return Ok(Value::Bool(false));
                    }
                    lhs = rhs;
                }
                Ok(Value::Bool(true))
            }
            ExprKind::IfExp { test, body, orelse } => {
                if self.eval(test, scope)?.truthy() {
                    self.eval(body, scope)
                } else {
                    self.eval(orelse, scope)
                }
            }
            ExprKind::Lambda(def) => self.make_function(def, scope),
            ExprKind::ListComp { elt, generators } | ExprKind::GeneratorExp { elt, generators } => {
                let inner = Scope::child(scope);
                let mut items = Vec::new();
                self.comprehension(generators, &inner, &mut |this, s| {
                    let item = this.eval(elt, s)?;
                    this.check_len(items.len() + 1)?;
                    items.push(item);
                    Ok(())
                })?;
                Ok(Value::list(items))
            }
            ExprKind::DictComp {
                key,
                value,
                generators,
            } => {
                let inner = Scope::child(scope);
                let mut dict = Dict::default();
                self.comprehension(generators, &inner, &mut |this, s| {
                    let k = this.eval(key, s)?;
                    let v = this.eval(value, s)?;
                    this.check_len(dict.len() + 1)?;
                    dict.insert(k.hash_key()?, k, v);
                    Ok(())
                })?;
                Ok(Value::dict(dict))
            }
        }
    }

    fn eval_items(&mut self, items: &[Expr], scope: &Rc<Scope>) -> RunResult<Vec<Value>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            if let ExprKind::Starred(inner) = &item.kind {
                let iterable = self.eval(inner, scope)?;
                let spread = self.collect(&iterable)?;
                self.check_len(out.len() + spread.len())?;
                out.extend(spread);
            } else {
                out.push(self.eval(item, scope)?);
            }
        }
        Ok(out)
    }

    #[allow(clippy::type_complexity)]
    fn eval_args(
        &mut self,
        args: &[Arg],
        scope: &Rc<Scope>,
    ) -> RunResult<(Vec<Value>, Vec<(String, Value)>)> {
        let mut positional = Vec::with_capacity(args.len());
        let mut keywords = Vec::new();
        for arg in args {
            match arg {
                Arg::Positional(expr) => positional.push(self.eval(expr, scope)?),
                Arg::Star(expr) => {
                    let iterable = self.eval(expr, scope)?;
                    positional.extend(self.collect(&iterable)?);
                }
                Arg::Keyword(name, expr) => keywords.push((name.clone(), self.eval(expr, scope)?)),
                Arg::DoubleStar(expr) => match self.eval(expr, scope)? {
                    Value::Dict(dict) => {
                        for (key, value) in dict.borrow().iter() {
                            let Value::Str(key) = key else {
                                return raise(ExcKind::TypeError, "keywords must be strings");
                            };
                            keywords.push((key.to_string(), value.clone()));
                        }
                    }
                    other => {
                        return raise(
                            ExcKind::TypeError,
                            format!(
                                "argument after ** must be a mapping, not {}",
                                other.type_name()
                            ),
                        )
                    }
                },
            }
        }
        Ok((positional, keywords))
    }

    #[allow(clippy::type_complexity)]
    fn eval_slice(
        &mut self,
        lower: &Option<Box<Expr>>,
        upper: &Option<Box<Expr>>,
        step: &Option<Box<Expr>>,
        scope: &Rc<Scope>,
    ) -> RunResult<(Option<i64>, Option<i64>, Option<i64>)> {
        let bound = |this: &mut Self, expr: &Option<Box<Expr>>| -> RunResult<Option<i64>> {
            let Some(expr) = expr else {
                return Ok(None);
            };
            match this.eval(expr, scope)? {
                Value::None => Ok(None),
                value => match value.as_int() {
                    Some(i) => Ok(Some(i)),
                    None => raise(
                        ExcKind::TypeError,
                        "slice indices must be integers or None",
                    ),
                },
            }
        };
        let lower = bound(self, lower)?;
        let upper = bound(self, upper)?;
        let step = bound(self, step)?;
        if step == Some(0) {
            return raise(ExcKind::ValueError, "slice step cannot be zero");
        }
        Ok((lower, upper, step))
    }

    fn comprehension(
        &mut self,
        generators: &[Comprehension],
        scope: &Rc<Scope>,
        emit: &mut dyn FnMut(&mut Self, &Rc<Scope>) -> RunResult<()>,
    ) -> RunResult<()> {
        let Some((first, rest)) = generators.split_first() else {
            return emit(self, scope);
        };
        let iterable = self.eval(&first.iter, scope)?;
        self.for_each(&iterable, |this, item| {
            this.assign(&first.target, item, scope)?;
            for condition in &first.ifs {
                if !this.eval(condition, scope)?.truthy() {
                    return Ok(true);
                }
            }
            this.comprehension(rest, scope, &mut *emit)?;
            Ok(true)
        })
    }

    fn make_function(&mut self, def: &Rc<FunctionDef>, scope: &Rc<Scope>) -> RunResult<Value> {
        let mut defaults = Vec::with_capacity(def.params.args.len());
        for param in &def.params.args {
            defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr, scope)?),
                None => None,
            });
        }
        let mut kw_defaults = Vec::with_capacity(def.params.kwonly.len());
        for param in &def.params.kwonly {
            kw_defaults.push(match &param.default {
                Some(expr) => Some(self.eval(expr, scope)?),
                None => None,
            });
        }
        self.note_closure(scope);
        Ok(Value::Function(Rc::new(Function {
            def: def.clone(),
            defaults,
            kw_defaults,
            closure: scope.clone(),
        })))
    }

    fn note_closure(&mut self, scope: &Rc<Scope>) {
        if Rc::ptr_eq(scope, &self.globals) {
            return;
        }
        if let Some(last) = self.closure_scopes.last() {
            if std::ptr::eq(last.as_ptr(), Rc::as_ptr(scope)) {
                return;
            }
        }
        self.closure_scopes.push(Rc::downgrade(scope));
        if self.closure_scopes.len() >= self.prune_at {
            self.closure_scopes.retain(|scope| scope.strong_count() > 0);
            self.prune_at = (self.closure_scopes.len() * 2).max(1024);
        }
    }

    // --- Attributes ---

    /// `object.attr`.
    pub fn get_attr(&self, object: &Value, attr: &str) -> RunResult<Value> {
        if attr.starts_with("__") {
            return raise(
                ExcKind::AttributeError,
                format!("access to attribute '{attr}' is not permitted"),
            );
        }
        match object {
            Value::Module(module) => {
                return module.attrs.get(attr).cloned().ok_or_else(|| {
                    Interrupt::new(
                        ExcKind::AttributeError,
                        format!("module '{}' has no attribute '{attr}'", module.name),
                    )
                });
            }
            Value::Exception(exc) if attr == "args" => return Ok(Value::tuple(exc.args.clone())),
            _ => {}
        }
        if let Some(name) = methods::lookup(object, attr) {
            return Ok(Value::Method(Rc::new(BoundMethod {
                receiver: object.clone(),
                name,
            })));
        }
        raise(
            ExcKind::AttributeError,
            format!("'{}' object has no attribute '{attr}'", object.type_name()),
        )
    }

    fn set_attr(&self, object: &Value, attr: &str) -> RunResult<()> {
        match object {
            Value::Module(module) => raise(
                ExcKind::AttributeError,
                format!("module '{}' attributes are read-only", module.name),
            ),
            other => raise(
                ExcKind::AttributeError,
                format!(
                    "'{}' object attribute '{attr}' is read-only",
                    other.type_name()
                ),
            ),
        }
    }

    // --- Calls ---

    /// Call any callable value.
    pub fn call_value(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> RunResult<Value> {
        self.tick()?;
        match callee {
            Value::Function(function) => self.call_function(function, args, kwargs),
            Value::Builtin(builtin) => {
                builtins::call(self, *builtin, Args::new(builtin.name(), args, kwargs))
            }
            Value::Native(native) => self.call_native(native, args, kwargs),
            Value::Method(method) => methods::call(
                self,
                &method.receiver,
                Args::new(method.name, args, kwargs),
            ),
            Value::ExcType(kind) => {
                if !kwargs.is_empty() {
                    return raise(
                        ExcKind::TypeError,
                        format!("{}() takes no keyword arguments", kind.name()),
                    );
                }
                Ok(Value::Exception(Rc::new(ExceptionObj::from_args(*kind, args))))
            }
            other => raise(
                ExcKind::TypeError,
                format!("'{}' object is not callable", other.type_name()),
            ),
        }
    }

    fn call_function(
        &mut self,
        function: &Rc<Function>,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> RunResult<Value> {
        if self.frames.len() > self.limits.max_recursion {
            return raise(ExcKind::RecursionError, "maximum recursion depth exceeded");
        }
        let local = Scope::child(&function.closure);
        bind_params(function, &local, args, kwargs)?;
        self.frames.push(TraceFrame {
            name: Rc::from(function.def.name.as_str()),
            line: function.def.line,
        });
        let result = self.exec_block(&function.def.body, &local);
        self.frames.pop();
        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }

    fn call_native(
        &mut self,
        native: &NativeFn,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> RunResult<Value> {
        let args = Args::new(native.name, args, kwargs);
        match &native.kind {
            NativeKind::Math(function) => math::call(*function, args),
            NativeKind::HostCall(bridge) => self.host_call(bridge.as_ref(), args),
            NativeKind::HostCommands(bridge) => {
                args.arity(0, 0)?;
                args.finish_keywords()?;
                let mut names = bridge.commands();
                names.sort();
                Ok(Value::list(names.iter().map(|n| Value::str(n)).collect()))
            }
        }
    }

    fn host_call(&mut self, bridge: &dyn HostBridge, mut args: Args) -> RunResult<Value> {
        args.arity(1, 2)?;
        let command = match args.get(0, "command") {
            Some(Value::Str(command)) => command,
            Some(other) => {
                return raise(
                    ExcKind::TypeError,
                    format!("call() command must be str, not {}", other.type_name()),
                )
            }
            None => return raise(ExcKind::TypeError, "call() missing required argument 'command'"),
        };
        let params = match args.get(1, "params") {
            None | Some(Value::None) => Map::new(),
            Some(value @ Value::Dict(_)) => match value.to_json() {
                Ok(Json::Object(map)) => map,
                Ok(_) => Map::new(),
                Err(reason) => return raise(ExcKind::TypeError, reason),
            },
            Some(other) => {
                return raise(
                    ExcKind::TypeError,
                    format!("call() params must be a dict, not {}", other.type_name()),
                )
            }
        };
        args.finish_keywords()?;

        let started = Instant::now();
        let outcome = bridge.call(&command, &params);
        let audit = HostCallAudit::new(&command, started.elapsed(), outcome.is_ok());
        tracing::debug!(
            command = %command,
            duration_ms = audit.duration_ms,
            success = audit.success,
            "host call from macro"
        );
        self.host_calls.push(audit);

        match outcome {
            Ok(payload) => Ok(Value::dict(dict_from_json(&payload))),
            Err(err) => raise(ExcKind::HostError, err.to_string()),
        }
    }
}

fn bind_params(
    function: &Function,
    local: &Scope,
    args: Vec<Value>,
    kwargs: Vec<(String, Value)>,
) -> RunResult<()> {
    let params = &function.def.params;
    let name = &function.def.name;
    let mut slots: Vec<Option<Value>> = vec![None; params.args.len()];
    let mut extra = Vec::new();
    for (i, arg) in args.into_iter().enumerate() {
        match slots.get_mut(i) {
            Some(slot) => *slot = Some(arg),
            None => extra.push(arg),
        }
    }
    if !extra.is_empty() && params.vararg.is_none() {
        let expected = params.args.len();
        return raise(
            ExcKind::TypeError,
            format!(
                "{name}() takes {expected} positional argument{} but {} were given",
                if expected == 1 { "" } else { "s" },
                expected + extra.len()
            ),
        );
    }

    let mut kw_slots: Vec<Option<Value>> = vec![None; params.kwonly.len()];
    let mut extra_kw = Dict::default();
    for (key, value) in kwargs {
        let slot = if let Some(i) = params.args.iter().position(|p| p.name == key) {
            &mut slots[i]
        } else if let Some(i) = params.kwonly.iter().position(|p| p.name == key) {
            &mut kw_slots[i]
        } else if params.kwarg.is_some() {
            let key = Value::str(&key);
            extra_kw.insert(key.hash_key()?, key, value);
            continue;
        } else {
            return raise(
                ExcKind::TypeError,
                format!("{name}() got an unexpected keyword argument '{key}'"),
            );
        };
        if slot.is_some() {
            return raise(
                ExcKind::TypeError,
                format!("{name}() got multiple values for argument '{key}'"),
            );
        }
        *slot = Some(value);
    }

    for ((param, slot), default) in params.args.iter().zip(slots).zip(&function.defaults) {
        let value = match (slot, default) {
            (Some(value), _) => value,
            (None, Some(default)) => default.clone(),
            (None, None) => {
                return raise(
                    ExcKind::TypeError,
                    format!("{name}() missing required argument: '{}'", param.name),
                )
            }
        };
        local.set_local(&param.name, value);
    }
    if let Some(vararg) = &params.vararg {
        local.set_local(vararg, Value::tuple(extra));
    }
    for ((param, slot), default) in params.kwonly.iter().zip(kw_slots).zip(&function.kw_defaults) {
        let value = match (slot, default) {
            (Some(value), _) => value,
            (None, Some(default)) => default.clone(),
            (None, None) => {
                return raise(
                    ExcKind::TypeError,
                    format!(
                        "{name}() missing required keyword-only argument: '{}'",
                        param.name
                    ),
                )
            }
        };
        local.set_local(&param.name, value);
    }
    if let Some(kwarg) = &params.kwarg {
        local.set_local(kwarg, Value::dict(extra_kw));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parse;

    fn limits() -> Limits {
        Limits {
            timeout: Duration::from_secs(5),
            max_steps: None,
            max_output: 1 << 20,
            max_recursion: 100,
            max_collection_len: 1_000_000,
        }
    }

    fn run_with(code: &str, limits: Limits) -> Result<RunOutput, RunFailure> {
        let code = code.to_string();
        std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(move || {
                let program = parse(&code).expect("parse");
                run(&program, &Map::new(), &CapabilitySet::standard(), &limits)
            })
            .expect("spawn")
            .join()
            .expect("join")
    }

    fn output(code: &str) -> String {
        match run_with(code, limits()) {
            Ok(out) => out.output,
            Err(err) => panic!("run failed: {err:?}"),
        }
    }

    fn failure(code: &str) -> (String, String, String) {
        match run_with(code, limits()) {
            Err(RunFailure::Script {
                kind,
                message,
                traceback,
                ..
            }) => (kind.to_string(), message, traceback),
            other => panic!("expected script failure, got {other:?}"),
        }
    }

    #[test]
    fn prints_and_result() {
        let out = run_with("print('hi', 1 + 2)\nresult = [1, 2.5, 'x']", limits()).unwrap();
        assert_eq!(out.output, "hi 3\n");
        assert_eq!(out.result, Some(serde_json::json!([1, 2.5, "x"])));
    }

    #[test]
    fn closures_and_defaults() {
        let code = "\
def make(n):
    def add(x, y=1):
        return x + y + n
    return add
f = make(10)
print(f(1), f(1, y=5))
";
        assert_eq!(output(code), "12 16\n");
    }

    #[test]
    fn global_declaration() {
        let code = "\
count = 0
def bump():
    global count
    count += 1
bump()
bump()
print(count)
";
        assert_eq!(output(code), "2\n");
    }

    #[test]
    fn try_except_finally_ordering() {
        let code = "\
def f():
    try:
        raise ValueError('bad')
    except (KeyError, ValueError) as e:
        print('caught', e)
        return 1
    finally:
        print('finally')
print(f())
";
        assert_eq!(output(code), "caught bad\nfinally\n1\n");
    }

    #[test]
    fn bare_raise_reraises() {
        let (kind, message, _) = failure("try:\n    1 / 0\nexcept ZeroDivisionError:\n    raise\n");
        assert_eq!(kind, "ZeroDivisionError");
        assert_eq!(message, "division by zero");
    }

    #[test]
    fn traceback_names_frames() {
        let (kind, _, traceback) = failure("def inner():\n    return {}['k']\n\ninner()\n");
        assert_eq!(kind, "KeyError");
        assert!(traceback.contains("line 4, in <module>"), "{traceback}");
        assert!(traceback.contains("line 2, in inner"), "{traceback}");
        assert!(traceback.ends_with("KeyError: 'k'"), "{traceback}");
    }

    #[test]
    fn recursion_limit() {
        let (kind, _, _) = failure("def f(n):\n    return f(n + 1)\nf(0)\n");
        assert_eq!(kind, "RecursionError");
    }

    #[test]
    fn step_limit_cannot_be_caught() {
        let mut limits = limits();
        limits.max_steps = Some(1000);
        let code = "while True:\n    try:\n        pass\n    except Exception:\n        pass\n";
        assert!(matches!(
            run_with(code, limits),
            Err(RunFailure::Abort(Abort::StepLimit))
        ));
    }

    #[test]
    fn timeout_aborts() {
        let mut limits = limits();
        limits.timeout = Duration::from_millis(50);
        assert!(matches!(
            run_with("while True:\n    pass\n", limits),
            Err(RunFailure::Abort(Abort::Timeout))
        ));
    }

    #[test]
    fn output_limit() {
        let mut limits = limits();
        limits.max_output = 100;
        assert!(matches!(
            run_with("for i in range(1000):\n    print(i)\n", limits),
            Err(RunFailure::Abort(Abort::OutputLimit))
        ));
    }

    #[test]
    fn collection_limit() {
        let (kind, _, _) = failure("x = 'a' * 10000000000");
        assert_eq!(kind, "MemoryError");
    }

    #[test]
    fn unpacking_forms() {
        assert_eq!(
            output("a, *rest, z = range(5)\nprint(a, rest, z)\n(p, q), r = [1, 2], 3\nprint(p, q, r)"),
            "0 [1, 2, 3] 4\n1 2 3\n"
        );
        let (kind, message, _) = failure("a, b = [1, 2, 3]");
        assert_eq!(kind, "ValueError");
        assert_eq!(message, "too many values to unpack (expected 2)");
    }

    #[test]
    fn comprehensions() {
        let code = "\
squares = [x * x for x in range(6) if x % 2 == 0]
pairs = {k: v for k, v in zip('ab', [1, 2])}
total = sum(n for n in range(4))
print(squares, pairs, total)
";
        assert_eq!(output(code), "[0, 4, 16] {'a': 1, 'b': 2} 6\n");
    }

    #[test]
    fn loop_else_and_break() {
        let code = "\
for i in range(3):
    if i == 5:
        break
else:
    print('no break')
n = 0
while n < 10:
    n += 1
    if n == 3:
        break
print(n)
";
        assert_eq!(output(code), "no break\n3\n");
    }

    #[test]
    fn dunder_attributes_are_blocked_at_runtime() {
        let (kind, _, _) = failure("x = (1).__add__");
        assert_eq!(kind, "AttributeError");
    }

    #[test]
    fn attributes_are_read_only() {
        let (kind, message, _) = failure("import math\nmath.pi = 3");
        assert_eq!(kind, "AttributeError");
        assert!(message.contains("read-only"));
    }

    #[test]
    fn imports_resolve_against_capabilities() {
        assert_eq!(output("from math import sqrt as s\nprint(s(9))"), "3.0\n");
        let (kind, message, _) = failure("import numpy");
        assert_eq!(kind, "ImportError");
        assert_eq!(message, "No module named 'numpy'");
    }

    #[test]
    fn unbound_result_is_absent() {
        let out = run_with("x = 1", limits()).unwrap();
        assert_eq!(out.result, None);
    }

    #[test]
    fn unconvertible_result_falls_back_to_repr() {
        let out = run_with("result = len", limits()).unwrap();
        assert_eq!(out.result, Some(Json::String("<built-in function len>".into())));
    }

    #[test]
    fn params_are_injected() {
        let mut params = Map::new();
        params.insert("radius".into(), serde_json::json!(2));
        let out = std::thread::Builder::new()
            .stack_size(16 * 1024 * 1024)
            .spawn(move || {
                let program = parse("result = radius * params['radius']").unwrap();
                run(&program, &params, &CapabilitySet::standard(), &limits())
                    .map(|out| out.result)
                    .ok()
            })
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(out, Some(Some(serde_json::json!(4))));
    }
}

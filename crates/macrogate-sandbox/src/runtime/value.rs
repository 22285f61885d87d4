//! Runtime values and the operations every part of the interpreter shares:
//! truthiness, identity, equality, ordering, hashing, `repr` and JSON
//! conversion.
//!
//! Containers release their children through [`release`], so dropping a
//! deeply nested structure never recurses on the native stack.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;
use std::sync::Arc;

use crate::capability::HostBridge;
use crate::script::ast::FunctionDef;

use super::builtins::Builtin;
use super::exception::{raise, ExcKind, ExceptionObj, Interrupt};
use super::format::float_repr;
use super::interp::Scope;
use super::math::MathFn;

/// Result of any evaluation step.
pub type RunResult<T> = Result<T, Interrupt>;

/// Nesting beyond which comparison, hashing and conversion give up.
pub const MAX_DEPTH: usize = 200;

/// A script value.
#[derive(Clone)]
pub enum Value {
    /// `None`.
    None,
    /// `True` / `False`.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// Double-precision float.
    Float(f64),
    /// Immutable string.
    Str(Rc<str>),
    /// Mutable list.
    List(Rc<ListObj>),
    /// Immutable tuple.
    Tuple(Rc<TupleObj>),
    /// Insertion-ordered dict.
    Dict(Rc<DictObj>),
    /// Lazy integer range.
    Range(RangeObj),
    /// User-defined function or lambda.
    Function(Rc<Function>),
    /// Builtin function or type.
    Builtin(Builtin),
    /// Function provided by a capability module.
    Native(Rc<NativeFn>),
    /// Imported capability module.
    Module(Rc<Module>),
    /// Method bound to a receiver, e.g. `items.append`.
    Method(Rc<BoundMethod>),
    /// Exception class.
    ExcType(ExcKind),
    /// Exception instance.
    Exception(Rc<ExceptionObj>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

// --- Containers ---

/// Storage behind a list value.
#[derive(Default)]
pub struct ListObj(RefCell<Vec<Value>>);

impl ListObj {
    /// Immutable view of the items.
    pub fn borrow(&self) -> Ref<'_, Vec<Value>> {
        self.0.borrow()
    }

    /// Mutable view of the items.
    pub fn borrow_mut(&self) -> RefMut<'_, Vec<Value>> {
        self.0.borrow_mut()
    }

    /// Current length.
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    /// Item at `index`, if present.
    pub fn get(&self, index: usize) -> Option<Value> {
        self.0.borrow().get(index).cloned()
    }

    /// Swap the contents out, leaving the list empty.
    pub fn take(&self) -> Vec<Value> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

impl Drop for ListObj {
    fn drop(&mut self) {
        release(std::mem::take(self.0.get_mut()));
    }
}

/// Storage behind a tuple value.
pub struct TupleObj(Vec<Value>);

impl Deref for TupleObj {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        &self.0
    }
}

impl Drop for TupleObj {
    fn drop(&mut self) {
        release(std::mem::take(&mut self.0));
    }
}

/// Storage behind a dict value.
#[derive(Default)]
pub struct DictObj(RefCell<Dict>);

impl DictObj {
    /// Immutable view.
    pub fn borrow(&self) -> Ref<'_, Dict> {
        self.0.borrow()
    }

    /// Mutable view.
    pub fn borrow_mut(&self) -> RefMut<'_, Dict> {
        self.0.borrow_mut()
    }
}

impl Drop for DictObj {
    fn drop(&mut self) {
        let dict = std::mem::take(self.0.get_mut());
        release(dict.into_items().into_iter().flat_map(|(k, v)| [k, v]));
    }
}

/// Hashable identity of a dict key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    /// `None`.
    None,
    /// Integers, bools and integral floats.
    Int(i64),
    /// Non-integral floats by bit pattern.
    Float(u64),
    /// Strings.
    Str(Rc<str>),
    /// Tuples of hashable items.
    Tuple(Vec<HashKey>),
    /// Ranges.
    Range(i64, i64, i64),
    /// Builtins and exception classes by name.
    Named(&'static str),
    /// Functions, modules and exceptions by address.
    Identity(usize),
}

/// An insertion-ordered hash map from values to values.
#[derive(Default, Clone)]
pub struct Dict {
    index: HashMap<HashKey, usize>,
    entries: Vec<Option<(Value, Value)>>,
    live: usize,
}

impl Dict {
    /// Number of entries.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether the dict is empty.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Value stored under `key`.
    pub fn get(&self, key: &HashKey) -> Option<&Value> {
        let slot = *self.index.get(key)?;
        self.entries[slot].as_ref().map(|(_, v)| v)
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &HashKey) -> bool {
        self.index.contains_key(key)
    }

    /// Insert or overwrite; an existing entry keeps its position and key.
    pub fn insert(&mut self, hash: HashKey, key: Value, value: Value) -> Option<Value> {
        if let Some(&slot) = self.index.get(&hash) {
            if let Some((_, existing)) = self.entries[slot].as_mut() {
                return Some(std::mem::replace(existing, value));
            }
        }
        self.index.insert(hash, self.entries.len());
        self.entries.push(Some((key, value)));
        self.live += 1;
        None
    }

    /// Remove an entry, returning its key and value.
    pub fn remove(&mut self, hash: &HashKey) -> Option<(Value, Value)> {
        let slot = self.index.remove(hash)?;
        let entry = self.entries[slot].take();
        self.live -= 1;
        if self.entries.len() > 16 && self.live * 2 < self.entries.len() {
            self.compact();
        }
        entry
    }

    /// Remove and return the most recently inserted entry.
    pub fn pop_last(&mut self) -> Option<(Value, Value)> {
        while let Some(entry) = self.entries.pop() {
            if let Some((key, value)) = entry {
                self.live -= 1;
                if let Ok(hash) = key.hash_key() {
                    self.index.remove(&hash);
                }
                return Some((key, value));
            }
        }
        None
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().flatten().map(|(k, v)| (k, v))
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<Value> {
        self.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Values in insertion order.
    pub fn values(&self) -> Vec<Value> {
        self.iter().map(|(_, v)| v.clone()).collect()
    }

    /// Remove everything.
    pub fn clear(&mut self) -> Vec<(Value, Value)> {
        self.index.clear();
        self.live = 0;
        std::mem::take(&mut self.entries).into_iter().flatten().collect()
    }

    /// Consume the dict, yielding its entries in order.
    pub fn into_items(mut self) -> Vec<(Value, Value)> {
        self.clear()
    }

    fn compact(&mut self) {
        self.entries.retain(Option::is_some);
        self.index.clear();
        for (slot, entry) in self.entries.iter().enumerate() {
            if let Some((key, _)) = entry {
                if let Ok(hash) = key.hash_key() {
                    self.index.insert(hash, slot);
                }
            }
        }
    }
}

/// `range(start, stop, step)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeObj {
    /// First value.
    pub start: i64,
    /// Exclusive bound.
    pub stop: i64,
    /// Non-zero stride.
    pub step: i64,
}

impl RangeObj {
    /// Number of values produced.
    pub fn len(&self) -> usize {
        let (start, stop, step) = (
            i128::from(self.start),
            i128::from(self.stop),
            i128::from(self.step),
        );
        let len = if step > 0 && start < stop {
            (stop - start - 1) / step + 1
        } else if step < 0 && start > stop {
            (start - stop - 1) / (-step) + 1
        } else {
            0
        };
        usize::try_from(len).unwrap_or(usize::MAX)
    }

    /// The `index`-th value; caller guarantees `index < len()`.
    pub fn nth(&self, index: usize) -> i64 {
        let value = i128::from(self.start) + index as i128 * i128::from(self.step);
        i64::try_from(value).unwrap_or(self.stop)
    }
}

// --- Callables and namespaces ---

/// A user-defined function with its captured scope.
pub struct Function {
    /// The definition.
    pub def: Rc<FunctionDef>,
    /// Defaults for positional parameters, aligned with `def.params.args`.
    pub defaults: Vec<Option<Value>>,
    /// Defaults for keyword-only parameters, aligned with `def.params.kwonly`.
    pub kw_defaults: Vec<Option<Value>>,
    /// Scope the function was defined in.
    pub closure: Rc<Scope>,
}

impl Drop for Function {
    fn drop(&mut self) {
        let defaults = std::mem::take(&mut self.defaults);
        let kw_defaults = std::mem::take(&mut self.kw_defaults);
        release(defaults.into_iter().chain(kw_defaults).flatten());
    }
}

/// A capability module instantiated for one execution.
pub struct Module {
    /// Binding name.
    pub name: String,
    /// Public attributes.
    pub attrs: BTreeMap<String, Value>,
}

/// A function exposed by a capability module.
pub struct NativeFn {
    /// Owning module, for messages.
    pub module: String,
    /// Attribute name.
    pub name: &'static str,
    /// What the call does.
    pub kind: NativeKind,
}

/// Implementations behind [`NativeFn`].
pub enum NativeKind {
    /// A `math` function.
    Math(MathFn),
    /// `App.call(command, params=None)`.
    HostCall(Arc<dyn HostBridge>),
    /// `App.commands()`.
    HostCommands(Arc<dyn HostBridge>),
}

/// A method looked up on a receiver.
pub struct BoundMethod {
    /// The receiver.
    pub receiver: Value,
    /// Method name from the method table.
    pub name: &'static str,
}

// --- Deferred release ---

thread_local! {
    static RELEASING: Cell<bool> = const { Cell::new(false) };
    static PENDING: RefCell<Vec<Value>> = const { RefCell::new(Vec::new()) };
}

/// Drop values iteratively.
///
/// Container destructors hand their children here instead of dropping them
/// in place, so a chain of a million nested lists unwinds in a loop.
pub fn release(items: impl IntoIterator<Item = Value>) {
    let mut items = items.into_iter().filter(Value::owns_values).peekable();
    if items.peek().is_none() {
        return;
    }
    PENDING.with(|pending| pending.borrow_mut().extend(items));
    if RELEASING.with(Cell::get) {
        return;
    }
    RELEASING.with(|flag| flag.set(true));
    while let Some(value) = PENDING.with(|pending| pending.borrow_mut().pop()) {
        drop(value);
    }
    RELEASING.with(|flag| flag.set(false));
}

// --- Numbers ---

/// A numeric view of a value.
#[derive(Debug, Clone, Copy)]
pub enum Num {
    /// Integer (including bools).
    Int(i64),
    /// Float.
    Float(f64),
}

impl Num {
    /// Widen to float.
    pub fn to_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }
}

fn int_float_eq(i: i64, f: f64) -> bool {
    f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 && f as i64 == i
}

fn num_cmp(a: Num, b: Num) -> Option<Ordering> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
        (Num::Int(x), Num::Float(y)) if int_float_eq(x, y) => Some(Ordering::Equal),
        (x, y) => x.to_f64().partial_cmp(&y.to_f64()),
    }
}

// --- Value operations ---

impl Value {
    /// A string value.
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    /// A list value.
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(ListObj(RefCell::new(items))))
    }

    /// A tuple value.
    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(TupleObj(items)))
    }

    /// A dict value.
    pub fn dict(dict: Dict) -> Value {
        Value::Dict(Rc::new(DictObj(RefCell::new(dict))))
    }

    fn owns_values(&self) -> bool {
        matches!(
            self,
            Value::List(_)
                | Value::Tuple(_)
                | Value::Dict(_)
                | Value::Function(_)
                | Value::Module(_)
                | Value::Method(_)
                | Value::Exception(_)
        )
    }

    /// The type name used in messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Range(_) => "range",
            Value::Function(_) => "function",
            Value::Builtin(b) if b.is_type() => "type",
            Value::Builtin(_) | Value::Native(_) => "builtin_function_or_method",
            Value::Module(_) => "module",
            Value::Method(_) => "method",
            Value::ExcType(_) => "type",
            Value::Exception(e) => e.kind.name(),
        }
    }

    /// Python truthiness.
    pub fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => l.len() > 0,
            Value::Tuple(t) => !t.is_empty(),
            Value::Dict(d) => !d.borrow().is_empty(),
            Value::Range(r) => r.len() > 0,
            _ => true,
        }
    }

    /// Numeric view of ints, bools and floats.
    pub fn number(&self) -> Option<Num> {
        match self {
            Value::Bool(b) => Some(Num::Int(i64::from(*b))),
            Value::Int(i) => Some(Num::Int(*i)),
            Value::Float(f) => Some(Num::Float(*f)),
            _ => None,
        }
    }

    /// Integer view of ints and bools.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float view of any number.
    pub fn as_f64(&self) -> Option<f64> {
        self.number().map(Num::to_f64)
    }

    /// `a is b`.
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::Method(a), Value::Method(b)) => Rc::ptr_eq(a, b),
            (Value::ExcType(a), Value::ExcType(b)) => a == b,
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `a == b`.
    pub fn equals(&self, other: &Value) -> RunResult<bool> {
        eq_depth(self, other, 0)
    }

    /// Order two values for `op`; `None` means unordered (NaN).
    pub fn compare(&self, other: &Value, op: &str) -> RunResult<Option<Ordering>> {
        cmp_depth(self, other, op, 0)
    }

    /// Dict key for this value.
    pub fn hash_key(&self) -> RunResult<HashKey> {
        hash_depth(self, 0)
    }

    /// `repr(value)`.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        write_repr(self, &mut out, &mut Vec::new());
        out
    }

    /// `str(value)`.
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Exception(e) => e.message.clone(),
            other => other.repr(),
        }
    }

    /// Convert a JSON value.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::str(s),
            serde_json::Value::Array(items) => {
                Value::list(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::dict(dict_from_json(map)),
        }
    }

    /// Convert to JSON; tuples become arrays and non-finite floats `null`.
    pub fn to_json(&self) -> Result<serde_json::Value, String> {
        json_depth(self, 0)
    }
}

/// Convert a JSON object into a dict of string keys.
pub fn dict_from_json(map: &serde_json::Map<String, serde_json::Value>) -> Dict {
    let mut dict = Dict::default();
    for (key, value) in map {
        let key: Rc<str> = Rc::from(key.as_str());
        dict.insert(
            HashKey::Str(key.clone()),
            Value::Str(key),
            Value::from_json(value),
        );
    }
    dict
}

fn too_deep<T>() -> RunResult<T> {
    raise(
        ExcKind::RecursionError,
        "maximum recursion depth exceeded in comparison",
    )
}

fn eq_depth(a: &Value, b: &Value, depth: usize) -> RunResult<bool> {
    if depth > MAX_DEPTH {
        return too_deep();
    }
    if let (Some(x), Some(y)) = (a.number(), b.number()) {
        return Ok(num_cmp(x, y) == Some(Ordering::Equal));
    }
    Ok(match (a, b) {
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            Rc::ptr_eq(x, y) || seq_eq(&x.borrow(), &y.borrow(), depth)?
        }
        (Value::Tuple(x), Value::Tuple(y)) => Rc::ptr_eq(x, y) || seq_eq(x, y, depth)?,
        (Value::Dict(x), Value::Dict(y)) => {
            if Rc::ptr_eq(x, y) {
                return Ok(true);
            }
            let (x, y) = (x.borrow(), y.borrow());
            if x.len() != y.len() {
                return Ok(false);
            }
            for (key, value) in x.iter() {
                let Some(other) = y.get(&key.hash_key()?) else {
                    return Ok(false);
                };
                if !value.is_same(other) && !eq_depth(value, other, depth + 1)? {
                    return Ok(false);
                }
            }
            true
        }
        (Value::Range(x), Value::Range(y)) => {
            let len = x.len();
            len == y.len() && (len == 0 || (x.start == y.start && (len == 1 || x.step == y.step)))
        }
        _ => a.is_same(b),
    })
}

fn seq_eq(x: &[Value], y: &[Value], depth: usize) -> RunResult<bool> {
    if x.len() != y.len() {
        return Ok(false);
    }
    for (a, b) in x.iter().zip(y) {
        if !a.is_same(b) && !eq_depth(a, b, depth + 1)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn cmp_depth(a: &Value, b: &Value, op: &str, depth: usize) -> RunResult<Option<Ordering>> {
    if depth > MAX_DEPTH {
        return too_deep();
    }
    if let (Some(x), Some(y)) = (a.number(), b.number()) {
        return Ok(num_cmp(x, y));
    }
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => Ok(Some(x.cmp(y))),
        (Value::List(x), Value::List(y)) => {
            let (x, y) = (x.borrow().clone(), y.borrow().clone());
            seq_cmp(&x, &y, op, depth)
        }
        (Value::Tuple(x), Value::Tuple(y)) => seq_cmp(x, y, op, depth),
        _ => raise(
            ExcKind::TypeError,
            format!(
                "'{op}' not supported between instances of '{}' and '{}'",
                a.type_name(),
                b.type_name()
            ),
        ),
    }
}

fn seq_cmp(x: &[Value], y: &[Value], op: &str, depth: usize) -> RunResult<Option<Ordering>> {
    for (a, b) in x.iter().zip(y) {
        if a.is_same(b) || eq_depth(a, b, depth + 1)? {
            continue;
        }
        return cmp_depth(a, b, op, depth + 1);
    }
    Ok(Some(x.len().cmp(&y.len())))
}

fn hash_depth(value: &Value, depth: usize) -> RunResult<HashKey> {
    if depth > MAX_DEPTH {
        return too_deep();
    }
    Ok(match value {
        Value::None => HashKey::None,
        Value::Bool(b) => HashKey::Int(i64::from(*b)),
        Value::Int(i) => HashKey::Int(*i),
        Value::Float(f) => {
            if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                HashKey::Int(*f as i64)
            } else {
                HashKey::Float(f.to_bits())
            }
        }
        Value::Str(s) => HashKey::Str(s.clone()),
        Value::Tuple(items) => HashKey::Tuple(
            items
                .iter()
                .map(|item| hash_depth(item, depth + 1))
                .collect::<RunResult<_>>()?,
        ),
        Value::Range(r) => HashKey::Range(r.start, r.stop, r.step),
        Value::Builtin(b) => HashKey::Named(b.name()),
        Value::ExcType(kind) => HashKey::Named(kind.name()),
        Value::Function(f) => HashKey::Identity(Rc::as_ptr(f) as usize),
        Value::Native(f) => HashKey::Identity(Rc::as_ptr(f) as usize),
        Value::Module(m) => HashKey::Identity(Rc::as_ptr(m) as usize),
        Value::Method(m) => HashKey::Identity(Rc::as_ptr(m) as usize),
        Value::Exception(e) => HashKey::Identity(Rc::as_ptr(e) as usize),
        Value::List(_) | Value::Dict(_) => {
            return raise(
                ExcKind::TypeError,
                format!("unhashable type: '{}'", value.type_name()),
            );
        }
    })
}

fn json_depth(value: &Value, depth: usize) -> Result<serde_json::Value, String> {
    use serde_json::Value as Json;

    if depth > MAX_DEPTH {
        return Err("value is nested too deeply to convert".into());
    }
    Ok(match value {
        Value::None => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(Json::Number)
            .unwrap_or(Json::Null),
        Value::Str(s) => Json::String(s.to_string()),
        Value::List(items) => Json::Array(
            items
                .borrow()
                .iter()
                .map(|item| json_depth(item, depth + 1))
                .collect::<Result<_, _>>()?,
        ),
        Value::Tuple(items) => Json::Array(
            items
                .iter()
                .map(|item| json_depth(item, depth + 1))
                .collect::<Result<_, _>>()?,
        ),
        Value::Dict(dict) => {
            let mut map = serde_json::Map::new();
            for (key, item) in dict.borrow().iter() {
                let key = match key {
                    Value::Str(s) => s.to_string(),
                    Value::Int(i) => i.to_string(),
                    Value::Float(f) => float_repr(*f),
                    Value::Bool(b) => b.to_string(),
                    Value::None => "null".to_string(),
                    other => {
                        return Err(format!(
                            "keys must be str, int, float, bool or None, not {}",
                            other.type_name()
                        ))
                    }
                };
                map.insert(key, json_depth(item, depth + 1)?);
            }
            Json::Object(map)
        }
        other => {
            return Err(format!(
                "Object of type {} is not JSON serializable",
                other.type_name()
            ))
        }
    })
}

// --- repr ---

/// Quote and escape a string the way Python's `repr` does.
pub fn repr_str(s: &str, out: &mut String) {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    out.push(quote);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

fn write_seq<'a>(
    items: impl Iterator<Item = &'a Value>,
    out: &mut String,
    seen: &mut Vec<usize>,
) -> usize {
    let mut count = 0;
    for item in items {
        if count > 0 {
            out.push_str(", ");
        }
        write_repr(item, out, seen);
        count += 1;
    }
    count
}

fn write_repr(value: &Value, out: &mut String, seen: &mut Vec<usize>) {
    match value {
        Value::None => out.push_str("None"),
        Value::Bool(true) => out.push_str("True"),
        Value::Bool(false) => out.push_str("False"),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) => out.push_str(&float_repr(*f)),
        Value::Str(s) => repr_str(s, out),
        Value::List(items) => {
            let id = Rc::as_ptr(items) as usize;
            if seen.contains(&id) || seen.len() > MAX_DEPTH {
                out.push_str("[...]");
                return;
            }
            seen.push(id);
            out.push('[');
            write_seq(items.borrow().iter(), out, seen);
            out.push(']');
            seen.pop();
        }
        Value::Tuple(items) => {
            let id = Rc::as_ptr(items) as usize;
            if seen.len() > MAX_DEPTH {
                out.push_str("(...)");
                return;
            }
            seen.push(id);
            out.push('(');
            if write_seq(items.iter(), out, seen) == 1 {
                out.push(',');
            }
            out.push(')');
            seen.pop();
        }
        Value::Dict(dict) => {
            let id = Rc::as_ptr(dict) as usize;
            if seen.contains(&id) || seen.len() > MAX_DEPTH {
                out.push_str("{...}");
                return;
            }
            seen.push(id);
            out.push('{');
            for (i, (key, item)) in dict.borrow().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_repr(key, out, seen);
                out.push_str(": ");
                write_repr(item, out, seen);
            }
            out.push('}');
            seen.pop();
        }
        Value::Range(r) => {
            if r.step == 1 {
                out.push_str(&format!("range({}, {})", r.start, r.stop));
            } else {
                out.push_str(&format!("range({}, {}, {})", r.start, r.stop, r.step));
            }
        }
        Value::Function(f) => out.push_str(&format!("<function {}>", f.def.name)),
        Value::Builtin(b) if b.is_type() => out.push_str(&format!("<class '{}'>", b.name())),
        Value::Builtin(b) => out.push_str(&format!("<built-in function {}>", b.name())),
        Value::Native(f) => out.push_str(&format!("<built-in function {}>", f.name)),
        Value::Module(m) => out.push_str(&format!("<module '{}'>", m.name)),
        Value::Method(m) => out.push_str(&format!(
            "<built-in method {} of {} object>",
            m.name,
            m.receiver.type_name()
        )),
        Value::ExcType(kind) => out.push_str(&format!("<class '{}'>", kind.name())),
        Value::Exception(e) => out.push_str(&e.repr()),
    }
}

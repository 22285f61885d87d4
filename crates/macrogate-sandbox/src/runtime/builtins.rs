//! Builtin functions and types available to every script.
//!
//! The namespace is deliberately small: nothing here reaches the file system,
//! the network, the process or the interpreter's own internals.

use std::cmp::Ordering;

use crate::script::ast::BinOp;

use super::exception::{raise, ExcKind, Interrupt};
use super::format::format_value;
use super::interp::Interpreter;
use super::math::float_to_int;
use super::value::{Dict, RangeObj, RunResult, Value};

/// A builtin function or type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Builtin {
    Print,
    Len,
    Range,
    Str,
    Int,
    Float,
    Bool,
    List,
    Tuple,
    Dict,
    Abs,
    Min,
    Max,
    Sum,
    Round,
    Sorted,
    Reversed,
    Enumerate,
    Zip,
    Map,
    Filter,
    Any,
    All,
    Isinstance,
    Repr,
    Format,
    Pow,
    Divmod,
    Chr,
    Ord,
}

impl Builtin {
    /// Every builtin, for populating the namespace.
    pub const ALL: [Builtin; 30] = [
        Builtin::Print,
        Builtin::Len,
        Builtin::Range,
        Builtin::Str,
        Builtin::Int,
        Builtin::Float,
        Builtin::Bool,
        Builtin::List,
        Builtin::Tuple,
        Builtin::Dict,
        Builtin::Abs,
        Builtin::Min,
        Builtin::Max,
        Builtin::Sum,
        Builtin::Round,
        Builtin::Sorted,
        Builtin::Reversed,
        Builtin::Enumerate,
        Builtin::Zip,
        Builtin::Map,
        Builtin::Filter,
        Builtin::Any,
        Builtin::All,
        Builtin::Isinstance,
        Builtin::Repr,
        Builtin::Format,
        Builtin::Pow,
        Builtin::Divmod,
        Builtin::Chr,
        Builtin::Ord,
    ];

    /// The name scripts use.
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Len => "len",
            Builtin::Range => "range",
            Builtin::Str => "str",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Bool => "bool",
            Builtin::List => "list",
            Builtin::Tuple => "tuple",
            Builtin::Dict => "dict",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sum => "sum",
            Builtin::Round => "round",
            Builtin::Sorted => "sorted",
            Builtin::Reversed => "reversed",
            Builtin::Enumerate => "enumerate",
            Builtin::Zip => "zip",
            Builtin::Map => "map",
            Builtin::Filter => "filter",
            Builtin::Any => "any",
            Builtin::All => "all",
            Builtin::Isinstance => "isinstance",
            Builtin::Repr => "repr",
            Builtin::Format => "format",
            Builtin::Pow => "pow",
            Builtin::Divmod => "divmod",
            Builtin::Chr => "chr",
            Builtin::Ord => "ord",
        }
    }

    /// Whether this builtin is a type usable with `isinstance`.
    pub fn is_type(self) -> bool {
        matches!(
            self,
            Builtin::Str
                | Builtin::Int
                | Builtin::Float
                | Builtin::Bool
                | Builtin::List
                | Builtin::Tuple
                | Builtin::Dict
                | Builtin::Range
        )
    }

    fn takes_keywords(self) -> bool {
        matches!(
            self,
            Builtin::Print
                | Builtin::Int
                | Builtin::Dict
                | Builtin::Min
                | Builtin::Max
                | Builtin::Sum
                | Builtin::Round
                | Builtin::Sorted
                | Builtin::Enumerate
        )
    }
}

/// Arguments of a native call, with Python-style arity checking.
#[derive(Debug)]
pub struct Args {
    name: &'static str,
    positional: Vec<Value>,
    keywords: Vec<(String, Value)>,
}

impl Args {
    /// Wrap the arguments of a call to `name`.
    pub fn new(name: &'static str, positional: Vec<Value>, keywords: Vec<(String, Value)>) -> Self {
        Self {
            name,
            positional,
            keywords,
        }
    }

    /// Name of the called function.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Positional arguments.
    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    /// Require between `min` and `max` positional arguments.
    pub fn arity(&self, min: usize, max: usize) -> RunResult<()> {
        let given = self.positional.len();
        if (min..=max).contains(&given) {
            return Ok(());
        }
        let name = self.name;
        let message = if min == max {
            match min {
                0 => format!("{name}() takes no arguments ({given} given)"),
                1 => format!("{name}() takes exactly one argument ({given} given)"),
                n => format!("{name}() takes exactly {n} arguments ({given} given)"),
            }
        } else if given < min {
            format!(
                "{name}() expected at least {min} argument{}, got {given}",
                if min == 1 { "" } else { "s" }
            )
        } else {
            format!("{name}() expected at most {max} arguments, got {given}")
        };
        raise(ExcKind::TypeError, message)
    }

    /// Positional argument `index`, or else the keyword argument `keyword`.
    pub fn get(&mut self, index: usize, keyword: &str) -> Option<Value> {
        match self.positional.get(index) {
            Some(value) => Some(value.clone()),
            None => self.keyword(keyword),
        }
    }

    /// Remove and return a keyword argument.
    pub fn keyword(&mut self, key: &str) -> Option<Value> {
        let position = self.keywords.iter().position(|(k, _)| k == key)?;
        Some(self.keywords.remove(position).1)
    }

    /// Remove and return every remaining keyword argument.
    pub fn take_keywords(&mut self) -> Vec<(String, Value)> {
        std::mem::take(&mut self.keywords)
    }

    /// Fail on any keyword argument nobody consumed.
    pub fn finish_keywords(&self) -> RunResult<()> {
        match self.keywords.first() {
            Some((key, _)) => raise(
                ExcKind::TypeError,
                format!("{}() got an unexpected keyword argument '{key}'", self.name),
            ),
            None => Ok(()),
        }
    }

    /// Consume into the positional arguments.
    pub fn into_positional(self) -> Vec<Value> {
        self.positional
    }
}

/// Call a builtin.
pub fn call(interp: &mut Interpreter<'_>, builtin: Builtin, mut args: Args) -> RunResult<Value> {
    if !builtin.takes_keywords() {
        args.finish_keywords()?;
    }
    match builtin {
        Builtin::Print => {
            let sep = text_keyword(&mut args, "sep", " ")?;
            let end = text_keyword(&mut args, "end", "\n")?;
            args.finish_keywords()?;
            let mut text = String::new();
            for (i, value) in args.positional().iter().enumerate() {
                if i > 0 {
                    text.push_str(&sep);
                }
                text.push_str(&value.to_str());
            }
            text.push_str(&end);
            interp.write_output(&text)?;
            Ok(Value::None)
        }
        Builtin::Len => {
            args.arity(1, 1)?;
            let len = match &args.positional()[0] {
                Value::Str(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Tuple(items) => items.len(),
                Value::Dict(dict) => dict.borrow().len(),
                Value::Range(range) => range.len(),
                other => {
                    return raise(
                        ExcKind::TypeError,
                        format!("object of type '{}' has no len()", other.type_name()),
                    )
                }
            };
            i64::try_from(len).map(Value::Int).map_err(|_| {
                Interrupt::new(
                    ExcKind::OverflowError,
                    "Python int too large to convert to C ssize_t",
                )
            })
        }
        Builtin::Range => {
            args.arity(1, 3)?;
            let mut bounds = [0i64; 3];
            for (slot, value) in bounds.iter_mut().zip(args.positional()) {
                *slot = index_int(value)?;
            }
            let (start, stop, step) = match args.positional().len() {
                1 => (0, bounds[0], 1),
                2 => (bounds[0], bounds[1], 1),
                _ => (bounds[0], bounds[1], bounds[2]),
            };
            if step == 0 {
                return raise(ExcKind::ValueError, "range() arg 3 must not be zero");
            }
            Ok(Value::Range(RangeObj { start, stop, step }))
        }
        Builtin::Str => {
            args.arity(0, 1)?;
            Ok(match args.positional().first() {
                Some(value @ Value::Str(_)) => value.clone(),
                Some(value) => Value::str(&value.to_str()),
                None => Value::str(""),
            })
        }
        Builtin::Int => {
            args.arity(0, 2)?;
            let base = args.get(1, "base");
            args.finish_keywords()?;
            let Some(value) = args.positional().first() else {
                return Ok(Value::Int(0));
            };
            match (value, base) {
                (Value::Str(s), Some(base)) => {
                    let base = index_int(&base)?;
                    if base != 0 && !(2..=36).contains(&base) {
                        return raise(ExcKind::ValueError, "int() base must be >= 2 and <= 36, or 0");
                    }
                    parse_int(s, base as u32)
                }
                (_, Some(_)) => raise(
                    ExcKind::TypeError,
                    "int() can't convert non-string with explicit base",
                ),
                (Value::Str(s), None) => parse_int(s, 10),
                (Value::Float(f), None) => float_to_int(f.trunc()),
                (other, None) => match other.as_int() {
                    Some(i) => Ok(Value::Int(i)),
                    None => raise(
                        ExcKind::TypeError,
                        format!(
                            "int() argument must be a string or a real number, not '{}'",
                            other.type_name()
                        ),
                    ),
                },
            }
        }
        Builtin::Float => {
            args.arity(0, 1)?;
            match args.positional().first() {
                None => Ok(Value::Float(0.0)),
                Some(Value::Str(s)) => parse_float(s),
                Some(other) => match other.as_f64() {
                    Some(f) => Ok(Value::Float(f)),
                    None => raise(
                        ExcKind::TypeError,
                        format!(
                            "float() argument must be a string or a real number, not '{}'",
                            other.type_name()
                        ),
                    ),
                },
            }
        }
        Builtin::Bool => {
            args.arity(0, 1)?;
            Ok(Value::Bool(
                args.positional().first().is_some_and(Value::truthy),
            ))
        }
        Builtin::List | Builtin::Tuple => {
            args.arity(0, 1)?;
            let items = match args.positional().first() {
                Some(iterable) => interp.collect(iterable)?,
                None => Vec::new(),
            };
            Ok(if builtin == Builtin::List {
                Value::list(items)
            } else {
                Value::tuple(items)
            })
        }
        Builtin::Dict => {
            args.arity(0, 1)?;
            let mut dict = Dict::default();
            if let Some(source) = args.positional().first().cloned() {
                for (key, value) in dict_pairs(interp, &source)? {
                    dict.insert(key.hash_key()?, key, value);
                }
            }
            for (key, value) in args.take_keywords() {
                let key = Value::str(&key);
                dict.insert(key.hash_key()?, key, value);
            }
            Ok(Value::dict(dict))
        }
        Builtin::Abs => {
            args.arity(1, 1)?;
            match &args.positional()[0] {
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => match other.as_int() {
                    Some(i) => i
                        .checked_abs()
                        .map(Value::Int)
                        .ok_or_else(|| Interrupt::new(ExcKind::OverflowError, "integer overflow")),
                    None => raise(
                        ExcKind::TypeError,
                        format!("bad operand type for abs(): '{}'", other.type_name()),
                    ),
                },
            }
        }
        Builtin::Min => extreme(interp, args, Ordering::Less),
        Builtin::Max => extreme(interp, args, Ordering::Greater),
        Builtin::Sum => {
            args.arity(1, 2)?;
            let start = args.get(1, "start").unwrap_or(Value::Int(0));
            args.finish_keywords()?;
            if let Value::Str(_) = start {
                return raise(
                    ExcKind::TypeError,
                    "sum() can't sum strings [use ''.join(seq) instead]",
                );
            }
            let iterable = args.positional()[0].clone();
            let mut total = start;
            interp.for_each(&iterable, |this, item| {
                total = this.binary_op(BinOp::Add, &total, &item)?;
                Ok(true)
            })?;
            Ok(total)
        }
        Builtin::Round => {
            args.arity(1, 2)?;
            let ndigits = args.get(1, "ndigits");
            args.finish_keywords()?;
            let ndigits = match ndigits {
                None | Some(Value::None) => None,
                Some(value) => Some(index_int(&value)?),
            };
            round(&args.positional()[0], ndigits)
        }
        Builtin::Sorted => {
            args.arity(1, 1)?;
            let key = args.keyword("key").filter(|key| !matches!(key, Value::None));
            let reverse = args.keyword("reverse").is_some_and(|r| r.truthy());
            args.finish_keywords()?;
            let items = interp.collect(&args.positional()[0])?;
            Ok(Value::list(interp.sort_values(items, key, reverse)?))
        }
        Builtin::Reversed => {
            args.arity(1, 1)?;
            let mut items = interp.collect(&args.positional()[0])?;
            items.reverse();
            Ok(Value::list(items))
        }
        Builtin::Enumerate => {
            args.arity(1, 2)?;
            let start = match args.get(1, "start") {
                Some(value) => index_int(&value)?,
                None => 0,
            };
            args.finish_keywords()?;
            let iterable = args.positional()[0].clone();
            let mut out = Vec::new();
            let mut counter = start;
            interp.for_each(&iterable, |this, item| {
                this.check_len(out.len() + 1)?;
                out.push(Value::tuple(vec![Value::Int(counter), item]));
                counter = counter.wrapping_add(1);
                Ok(true)
            })?;
            Ok(Value::list(out))
        }
        Builtin::Zip => {
            let mut columns = Vec::with_capacity(args.positional().len());
            for iterable in args.positional() {
                columns.push(interp.collect(iterable)?);
            }
            let len = columns.iter().map(Vec::len).min().unwrap_or(0);
            let rows = (0..len)
                .map(|i| Value::tuple(columns.iter().map(|column| column[i].clone()).collect()))
                .collect();
            Ok(Value::list(rows))
        }
        Builtin::Map => {
            if args.positional().len() < 2 {
                return raise(ExcKind::TypeError, "map() must have at least two arguments.");
            }
            let mut positional = args.into_positional();
            let function = positional.remove(0);
            let mut columns = Vec::with_capacity(positional.len());
            for iterable in &positional {
                columns.push(interp.collect(iterable)?);
            }
            let len = columns.iter().map(Vec::len).min().unwrap_or(0);
            let mut out = Vec::with_capacity(len);
            for i in 0..len {
                let call_args = columns.iter().map(|column| column[i].clone()).collect();
                out.push(interp.call_value(&function, call_args, Vec::new())?);
            }
            Ok(Value::list(out))
        }
        Builtin::Filter => {
            args.arity(2, 2)?;
            let function = args.positional()[0].clone();
            let iterable = args.positional()[1].clone();
            let mut out = Vec::new();
            interp.for_each(&iterable, |this, item| {
                let keep = match &function {
                    Value::None => item.truthy(),
                    f => this.call_value(f, vec![item.clone()], Vec::new())?.truthy(),
                };
                if keep {
                    out.push(item);
                }
                Ok(true)
            })?;
            Ok(Value::list(out))
        }
        Builtin::Any | Builtin::All => {
            args.arity(1, 1)?;
            let want = builtin == Builtin::Any;
            let mut found = false;
            interp.for_each(&args.positional()[0], |_, item| {
                if item.truthy() == want {
                    found = true;
                    return Ok(false);
                }
                Ok(true)
            })?;
            Ok(Value::Bool(found == want))
        }
        Builtin::Isinstance => {
            args.arity(2, 2)?;
            Ok(Value::Bool(is_instance(
                &args.positional()[0],
                &args.positional()[1],
            )?))
        }
        Builtin::Repr => {
            args.arity(1, 1)?;
            Ok(Value::str(&args.positional()[0].repr()))
        }
        Builtin::Format => {
            args.arity(1, 2)?;
            let spec = match args.positional().get(1) {
                None => String::new(),
                Some(Value::Str(s)) => s.to_string(),
                Some(other) => {
                    return raise(
                        ExcKind::TypeError,
                        format!(
                            "format() argument 2 must be str, not {}",
                            other.type_name()
                        ),
                    )
                }
            };
            Ok(Value::str(&format_value(&args.positional()[0], &spec)?))
        }
        Builtin::Pow => {
            args.arity(2, 3)?;
            let positional = args.positional();
            match positional.get(2) {
                None | Some(Value::None) => {
                    interp.binary_op(BinOp::Pow, &positional[0], &positional[1])
                }
                Some(modulus) => modular_pow(&positional[0], &positional[1], modulus),
            }
        }
        Builtin::Divmod => {
            args.arity(2, 2)?;
            let (a, b) = (&args.positional()[0], &args.positional()[1]);
            let quotient = interp.binary_op(BinOp::FloorDiv, a, b)?;
            let remainder = interp.binary_op(BinOp::Mod, a, b)?;
            Ok(Value::tuple(vec![quotient, remainder]))
        }
        Builtin::Chr => {
            args.arity(1, 1)?;
            let code = index_int(&args.positional()[0])?;
            match u32::try_from(code).ok().and_then(char::from_u32) {
                Some(ch) => Ok(Value::str(ch.encode_utf8(&mut [0u8; 4]))),
                None => raise(ExcKind::ValueError, "chr() arg not in range(0x110000)"),
            }
        }
        Builtin::Ord => {
            args.arity(1, 1)?;
            let Value::Str(s) = &args.positional()[0] else {
                return raise(
                    ExcKind::TypeError,
                    format!(
                        "ord() expected string of length 1, but {} found",
                        args.positional()[0].type_name()
                    ),
                );
            };
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => Ok(Value::Int(i64::from(u32::from(ch)))),
                _ => raise(
                    ExcKind::TypeError,
                    format!(
                        "ord() expected a character, but string of length {} found",
                        s.chars().count()
                    ),
                ),
            }
        }
    }
}

fn text_keyword(args: &mut Args, key: &str, default: &str) -> RunResult<String> {
    match args.keyword(key) {
        None | Some(Value::None) => Ok(default.to_string()),
        Some(Value::Str(s)) => Ok(s.to_string()),
        Some(other) => raise(
            ExcKind::TypeError,
            format!("{key} must be None or a string, not {}", other.type_name()),
        ),
    }
}

/// An integer argument; floats are refused the way Python refuses them.
pub(crate) fn index_int(value: &Value) -> RunResult<i64> {
    match value.as_int() {
        Some(i) => Ok(i),
        None => raise(
            ExcKind::TypeError,
            format!(
                "'{}' object cannot be interpreted as an integer",
                value.type_name()
            ),
        ),
    }
}

/// Key/value pairs from a dict or an iterable of pairs.
pub(crate) fn dict_pairs(interp: &mut Interpreter<'_>, source: &Value) -> RunResult<Vec<(Value, Value)>> {
    if let Value::Dict(dict) = source {
        return Ok(dict
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect());
    }
    let items = interp.collect(source)?;
    let mut pairs = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let pair = match interp.collect(item) {
            Ok(pair) => pair,
            Err(Interrupt::Raise(_)) => {
                return raise(
                    ExcKind::TypeError,
                    format!(
                        "cannot convert dictionary update sequence element #{index} to a sequence"
                    ),
                )
            }
            Err(abort) => return Err(abort),
        };
        let [key, value]: [Value; 2] = pair.try_into().map_err(|pair: Vec<Value>| {
            Interrupt::new(
                ExcKind::ValueError,
                format!(
                    "dictionary update sequence element #{index} has length {}; 2 is required",
                    pair.len()
                ),
            )
        })?;
        pairs.push((key, value));
    }
    Ok(pairs)
}

fn parse_int(text: &str, base: u32) -> RunResult<Value> {
    let invalid = || {
        Interrupt::new(
            ExcKind::ValueError,
            format!(
                "invalid literal for int() with base {base}: {}",
                Value::str(text).repr()
            ),
        )
    };
    let trimmed = text.trim();
    let (negative, unsigned) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let lower = unsigned.to_ascii_lowercase();
    let (radix, digits) = match (base, lower.get(..2)) {
        (16 | 0, Some("0x")) => (16, &unsigned[2..]),
        (8 | 0, Some("0o")) => (8, &unsigned[2..]),
        (2 | 0, Some("0b")) => (2, &unsigned[2..]),
        (0, _) => (10, unsigned),
        (base, _) => (base, unsigned),
    };
    // `0x_ff` is valid; `_ff` is not.
    let digits = match digits.strip_prefix('_') {
        Some(rest) if digits.len() < unsigned.len() => rest,
        _ => digits,
    };
    if digits.is_empty()
        || digits.starts_with('_')
        || digits.ends_with('_')
        || digits.contains("__")
        || !digits.chars().all(|c| c == '_' || c.is_digit(radix))
    {
        return Err(invalid());
    }
    let cleaned: String = digits.chars().filter(|&c| c != '_').collect();
    let magnitude = u128::from_str_radix(&cleaned, radix).map_err(|_| invalid())?;
    let value = if negative {
        0i128.checked_sub_unsigned(magnitude)
    } else {
        i128::try_from(magnitude).ok()
    };
    value
        .and_then(|v| i64::try_from(v).ok())
        .map(Value::Int)
        .ok_or_else(|| Interrupt::new(ExcKind::OverflowError, "integer overflow"))
}

fn parse_float(text: &str) -> RunResult<Value> {
    let trimmed = text.trim();
    let valid_underscores = !trimmed.starts_with('_')
        && !trimmed.ends_with('_')
        && !trimmed.contains("__");
    let cleaned: String = trimmed.chars().filter(|&c| c != '_').collect();
    match cleaned.parse::<f64>() {
        Ok(f) if valid_underscores && !cleaned.is_empty() => Ok(Value::Float(f)),
        _ => raise(
            ExcKind::ValueError,
            format!(
                "could not convert string to float: {}",
                Value::str(text).repr()
            ),
        ),
    }
}

fn round(value: &Value, ndigits: Option<i64>) -> RunResult<Value> {
    match (value, ndigits) {
        (Value::Float(f), None) => float_to_int(f.round_ties_even()),
        (Value::Float(f), Some(_)) if !f.is_finite() => Ok(Value::Float(*f)),
        (Value::Float(f), Some(n)) if n > 300 => Ok(Value::Float(*f)),
        (Value::Float(f), Some(n)) if n >= 0 => {
            let text = format!("{:.*}", n as usize, f);
            Ok(Value::Float(text.parse().unwrap_or(*f)))
        }
        (Value::Float(f), Some(n)) => {
            let scale = 10f64.powi(n.unsigned_abs().min(400) as i32);
            Ok(Value::Float((f / scale).round_ties_even() * scale))
        }
        (other, ndigits) => match other.as_int() {
            Some(i) => round_int(i, ndigits.unwrap_or(0)),
            None => raise(
                ExcKind::TypeError,
                format!(
                    "type {} doesn't define __round__ method",
                    other.type_name()
                ),
            ),
        },
    }
}

fn round_int(value: i64, ndigits: i64) -> RunResult<Value> {
    if ndigits >= 0 {
        return Ok(Value::Int(value));
    }
    if ndigits < -18 {
        return Ok(Value::Int(0));
    }
    let scale = 10i128.pow(ndigits.unsigned_abs() as u32);
    let value = i128::from(value);
    let mut quotient = value.div_euclid(scale);
    let remainder = value.rem_euclid(scale);
    if remainder * 2 > scale || (remainder * 2 == scale && quotient % 2 != 0) {
        quotient += 1;
    }
    i64::try_from(quotient * scale)
        .map(Value::Int)
        .map_err(|_| Interrupt::new(ExcKind::OverflowError, "integer overflow"))
}

fn modular_pow(base: &Value, exponent: &Value, modulus: &Value) -> RunResult<Value> {
    let (Some(base), Some(exponent), Some(modulus)) =
        (base.as_int(), exponent.as_int(), modulus.as_int())
    else {
        return raise(
            ExcKind::TypeError,
            "pow() 3rd argument not allowed unless all arguments are integers",
        );
    };
    if modulus == 0 {
        return raise(ExcKind::ValueError, "pow() 3rd argument cannot be 0");
    }
    if exponent < 0 {
        return raise(
            ExcKind::ValueError,
            "pow() negative exponent is not supported with a modulus",
        );
    }
    let modulus = i128::from(modulus);
    let mut result: i128 = 1;
    let mut base = i128::from(base).rem_euclid(modulus);
    let mut exponent = exponent;
    while exponent > 0 {
        if exponent & 1 == 1 {
            result = (result * base).rem_euclid(modulus);
        }
        base = (base * base).rem_euclid(modulus);
        exponent >>= 1;
    }
    // Python's result takes the sign of the modulus.
    if modulus < 0 && result > 0 {
        result += modulus;
    }
    Ok(Value::Int(result as i64))
}

fn is_instance(value: &Value, class: &Value) -> RunResult<bool> {
    match class {
        Value::Builtin(builtin) if builtin.is_type() => Ok(matches!(
            (builtin, value),
            (Builtin::Str, Value::Str(_))
                | (Builtin::Int, Value::Int(_) | Value::Bool(_))
                | (Builtin::Float, Value::Float(_))
                | (Builtin::Bool, Value::Bool(_))
                | (Builtin::List, Value::List(_))
                | (Builtin::Tuple, Value::Tuple(_))
                | (Builtin::Dict, Value::Dict(_))
                | (Builtin::Range, Value::Range(_))
        )),
        Value::ExcType(kind) => {
            Ok(matches!(value, Value::Exception(exc) if exc.kind.is_subclass_of(*kind)))
        }
        Value::Tuple(classes) => {
            for class in classes.iter() {
                if is_instance(value, class)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => raise(
            ExcKind::TypeError,
            "isinstance() arg 2 must be a type or tuple of types",
        ),
    }
}

fn extreme(interp: &mut Interpreter<'_>, mut args: Args, want: Ordering) -> RunResult<Value> {
    let key = args.keyword("key").filter(|key| !matches!(key, Value::None));
    let default = args.keyword("default");
    args.finish_keywords()?;
    let name = args.name();
    let items = match args.positional() {
        [] => {
            return raise(
                ExcKind::TypeError,
                format!("{name} expected at least 1 argument, got 0"),
            )
        }
        [iterable] => interp.collect(iterable)?,
        many => {
            if default.is_some() {
                return raise(
                    ExcKind::TypeError,
                    format!(
                        "Cannot specify a default for {name}() with multiple positional arguments"
                    ),
                );
            }
            many.to_vec()
        }
    };
    let op = if want == Ordering::Less { "<" } else { ">" };
    let mut best: Option<(Value, Value)> = None;
    for item in items {
        let rank = match &key {
            Some(key) => interp.call_value(key, vec![item.clone()], Vec::new())?,
            None => item.clone(),
        };
        let replace = match &best {
            None => true,
            Some((best_rank, _)) => rank.compare(best_rank, op)? == Some(want),
        };
        if replace {
            best = Some((rank, item));
        }
    }
    match (best, default) {
        (Some((_, item)), _) => Ok(item),
        (None, Some(default)) => Ok(default),
        (None, None) => raise(
            ExcKind::ValueError,
            format!("{name}() arg is an empty sequence"),
        ),
    }
}

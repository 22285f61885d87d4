//! The `math` capability module.

use std::f64::consts;

use super::builtins::Args;
use super::exception::{raise, ExcKind};
use super::value::{RunResult, Value};

/// Constants exported by `math`.
pub const MATH_CONSTANTS: [(&str, f64); 5] = [
    ("pi", consts::PI),
    ("e", consts::E),
    ("tau", consts::TAU),
    ("inf", f64::INFINITY),
    ("nan", f64::NAN),
];

/// Functions exported by `math`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum MathFn {
    Sqrt,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Hypot,
    Degrees,
    Radians,
    Floor,
    Ceil,
    Fabs,
    Pow,
    Exp,
    Log,
    Log10,
    Trunc,
    Isclose,
    Isnan,
    Isinf,
}

impl MathFn {
    /// Every function, in export order.
    pub const ALL: [MathFn; 22] = [
        MathFn::Sqrt,
        MathFn::Sin,
        MathFn::Cos,
        MathFn::Tan,
        MathFn::Asin,
        MathFn::Acos,
        MathFn::Atan,
        MathFn::Atan2,
        MathFn::Hypot,
        MathFn::Degrees,
        MathFn::Radians,
        MathFn::Floor,
        MathFn::Ceil,
        MathFn::Fabs,
        MathFn::Pow,
        MathFn::Exp,
        MathFn::Log,
        MathFn::Log10,
        MathFn::Trunc,
        MathFn::Isclose,
        MathFn::Isnan,
        MathFn::Isinf,
    ];

    /// Attribute name.
    pub fn name(self) -> &'static str {
        match self {
            MathFn::Sqrt => "sqrt",
            MathFn::Sin => "sin",
            MathFn::Cos => "cos",
            MathFn::Tan => "tan",
            MathFn::Asin => "asin",
            MathFn::Acos => "acos",
            MathFn::Atan => "atan",
            MathFn::Atan2 => "atan2",
            MathFn::Hypot => "hypot",
            MathFn::Degrees => "degrees",
            MathFn::Radians => "radians",
            MathFn::Floor => "floor",
            MathFn::Ceil => "ceil",
            MathFn::Fabs => "fabs",
            MathFn::Pow => "pow",
            MathFn::Exp => "exp",
            MathFn::Log => "log",
            MathFn::Log10 => "log10",
            MathFn::Trunc => "trunc",
            MathFn::Isclose => "isclose",
            MathFn::Isnan => "isnan",
            MathFn::Isinf => "isinf",
        }
    }
}

fn real(args: &Args, value: &Value) -> RunResult<f64> {
    match value.as_f64() {
        Some(f) => Ok(f),
        None => raise(
            ExcKind::TypeError,
            format!(
                "{}() argument must be a real number, not '{}'",
                args.name(),
                value.type_name()
            ),
        ),
    }
}

fn domain_error<T>() -> RunResult<T> {
    raise(ExcKind::ValueError, "math domain error")
}

fn checked(result: f64, inputs_finite: bool) -> RunResult<Value> {
    if result.is_nan() && inputs_finite {
        return domain_error();
    }
    if result.is_infinite() && inputs_finite {
        return raise(ExcKind::OverflowError, "math range error");
    }
    Ok(Value::Float(result))
}

/// Convert a float to an int the way `math.floor` and friends do.
pub fn float_to_int(f: f64) -> RunResult<Value> {
    float_to_i64(f).map(Value::Int)
}

/// Truncate a float to `i64`, raising instead of saturating.
pub fn float_to_i64(f: f64) -> RunResult<i64> {
    if f.is_nan() {
        return raise(ExcKind::ValueError, "cannot convert float NaN to integer");
    }
    if f.is_infinite() {
        return raise(
            ExcKind::OverflowError,
            "cannot convert float infinity to integer",
        );
    }
    if f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return raise(ExcKind::OverflowError, "integer overflow");
    }
    Ok(f as i64)
}

fn unary(args: Args, f: impl Fn(f64) -> RunResult<Value>) -> RunResult<Value> {
    args.arity(1, 1)?;
    args.finish_keywords()?;
    let x = real(&args, &args.positional()[0])?;
    f(x)
}

/// Call a `math` function.
pub fn call(function: MathFn, mut args: Args) -> RunResult<Value> {
    match function {
        MathFn::Sqrt => unary(args, |x| {
            if x < 0.0 {
                domain_error()
            } else {
                Ok(Value::Float(x.sqrt()))
            }
        }),
        MathFn::Sin => unary(args, |x| checked(x.sin(), x.is_finite())),
        MathFn::Cos => unary(args, |x| checked(x.cos(), x.is_finite())),
        MathFn::Tan => unary(args, |x| checked(x.tan(), x.is_finite())),
        MathFn::Asin => unary(args, |x| {
            if (-1.0..=1.0).contains(&x) {
                Ok(Value::Float(x.asin()))
            } else {
                domain_error()
            }
        }),
        MathFn::Acos => unary(args, |x| {
            if (-1.0..=1.0).contains(&x) {
                Ok(Value::Float(x.acos()))
            } else {
                domain_error()
            }
        }),
        MathFn::Atan => unary(args, |x| Ok(Value::Float(x.atan()))),
        MathFn::Degrees => unary(args, |x| Ok(Value::Float(x.to_degrees()))),
        MathFn::Radians => unary(args, |x| Ok(Value::Float(x.to_radians()))),
        MathFn::Fabs => unary(args, |x| Ok(Value::Float(x.abs()))),
        MathFn::Exp => unary(args, |x| checked(x.exp(), x.is_finite())),
        MathFn::Log10 => unary(args, |x| {
            if x <= 0.0 {
                domain_error()
            } else {
                Ok(Value::Float(x.log10()))
            }
        }),
        MathFn::Isnan => unary(args, |x| Ok(Value::Bool(x.is_nan()))),
        MathFn::Isinf => unary(args, |x| Ok(Value::Bool(x.is_infinite()))),
        MathFn::Floor | MathFn::Ceil | MathFn::Trunc => {
            args.arity(1, 1)?;
            args.finish_keywords()?;
            let value = args.positional()[0].clone();
            if let Some(i) = value.as_int() {
                return Ok(Value::Int(i));
            }
            let x = real(&args, &value)?;
            float_to_int(match function {
                MathFn::Floor => x.floor(),
                MathFn::Ceil => x.ceil(),
                _ => x.trunc(),
            })
        }
        MathFn::Atan2 | MathFn::Pow => {
            args.arity(2, 2)?;
            args.finish_keywords()?;
            let y = real(&args, &args.positional()[0])?;
            let x = real(&args, &args.positional()[1])?;
            if function == MathFn::Atan2 {
                return Ok(Value::Float(y.atan2(x)));
            }
            if y == 0.0 && x < 0.0 {
                return domain_error();
            }
            if y < 0.0 && x.fract() != 0.0 && x.is_finite() {
                return domain_error();
            }
            checked(y.powf(x), y.is_finite() && x.is_finite())
        }
        MathFn::Hypot => {
            args.finish_keywords()?;
            let mut total: f64 = 0.0;
            for value in args.positional() {
                let x = real(&args, value)?;
                total = total.hypot(x);
            }
            Ok(Value::Float(total))
        }
        MathFn::Log => {
            args.arity(1, 2)?;
            args.finish_keywords()?;
            let x = real(&args, &args.positional()[0])?;
            if x <= 0.0 {
                return domain_error();
            }
            match args.positional().get(1) {
                None => Ok(Value::Float(x.ln())),
                Some(base) => {
                    let base = real(&args, base)?;
                    if base <= 0.0 || base == 1.0 {
                        if base == 1.0 {
                            return raise(ExcKind::ZeroDivisionError, "float division by zero");
                        }
                        return domain_error();
                    }
                    Ok(Value::Float(x.ln() / base.ln()))
                }
            }
        }
        MathFn::Isclose => {
            args.arity(2, 2)?;
            let rel_tol = match args.keyword("rel_tol") {
                Some(v) => real(&args, &v)?,
                None => 1e-9,
            };
            let abs_tol = match args.keyword("abs_tol") {
                Some(v) => real(&args, &v)?,
                None => 0.0,
            };
            args.finish_keywords()?;
            if rel_tol < 0.0 || abs_tol < 0.0 {
                return raise(ExcKind::ValueError, "tolerances must be non-negative");
            }
            let a = real(&args, &args.positional()[0])?;
            let b = real(&args, &args.positional()[1])?;
            if a == b {
                return Ok(Value::Bool(true));
            }
            if a.is_infinite() || b.is_infinite() {
                return Ok(Value::Bool(false));
            }
            let diff = (a - b).abs();
            let close = diff <= (rel_tol * b.abs()).max(rel_tol * a.abs()) || diff <= abs_tol;
            Ok(Value::Bool(close))
        }
    }
}

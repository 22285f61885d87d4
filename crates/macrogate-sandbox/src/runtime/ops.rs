//! Operators, subscripts and sorting.
//!
//! Integer arithmetic is checked: a result outside the 64-bit range raises
//! `OverflowError` instead of wrapping. Division and modulo follow Python's
//! floor semantics.

use std::cmp::Ordering;

use crate::script::ast::{BinOp, CmpOp, UnaryOp};

use super::exception::{raise, ExcKind, Interrupt};
use super::format::printf;
use super::interp::Interpreter;
use super::value::{release, Num, RangeObj, RunResult, Value};

/// `lower:upper:step` after evaluation; a zero step is rejected earlier.
pub type SliceBounds = (Option<i64>, Option<i64>, Option<i64>);

fn overflow<T>() -> RunResult<T> {
    raise(ExcKind::OverflowError, "integer overflow")
}

fn unsupported<T>(op: BinOp, left: &Value, right: &Value) -> RunResult<T> {
    raise(
        ExcKind::TypeError,
        format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ),
    )
}

fn int_op(op: BinOp, x: i64, y: i64) -> RunResult<Value> {
    let checked = |result: Option<i64>| result.map(Value::Int).map_or_else(overflow, Ok);
    match op {
        BinOp::Add => checked(x.checked_add(y)),
        BinOp::Sub => checked(x.checked_sub(y)),
        BinOp::Mul => checked(x.checked_mul(y)),
        BinOp::Div => {
            if y == 0 {
                return raise(ExcKind::ZeroDivisionError, "division by zero");
            }
            Ok(Value::Float(x as f64 / y as f64))
        }
        BinOp::FloorDiv => {
            if y == 0 {
                return raise(ExcKind::ZeroDivisionError, "integer division or modulo by zero");
            }
            let Some(quotient) = x.checked_div(y) else {
                return overflow();
            };
            let adjust = x % y != 0 && ((x < 0) != (y < 0));
            Ok(Value::Int(if adjust { quotient - 1 } else { quotient }))
        }
        BinOp::Mod => {
            if y == 0 {
                return raise(ExcKind::ZeroDivisionError, "integer division or modulo by zero");
            }
            let remainder = x.checked_rem(y).unwrap_or(0);
            let adjust = remainder != 0 && ((remainder < 0) != (y < 0));
            Ok(Value::Int(if adjust { remainder + y } else { remainder }))
        }
        BinOp::Pow => {
            if y < 0 {
                if x == 0 {
                    return raise(
                        ExcKind::ZeroDivisionError,
                        "0.0 cannot be raised to a negative power",
                    );
                }
                return Ok(Value::Float((x as f64).powf(y as f64)));
            }
            match x {
                0 => Ok(Value::Int(i64::from(y == 0))),
                1 => Ok(Value::Int(1)),
                -1 => Ok(Value::Int(if y % 2 == 0 { 1 } else { -1 })),
                _ => match u32::try_from(y) {
                    Ok(exponent) => checked(x.checked_pow(exponent)),
                    Err(_) => overflow(),
                },
            }
        }
        BinOp::LShift => {
            if y < 0 {
                return raise(ExcKind::ValueError, "negative shift count");
            }
            if x == 0 {
                return Ok(Value::Int(0));
            }
            if y >= 63 {
                return overflow();
            }
            let shifted = x << y;
            if shifted >> y != x {
                return overflow();
            }
            Ok(Value::Int(shifted))
        }
        BinOp::RShift => {
            if y < 0 {
                return raise(ExcKind::ValueError, "negative shift count");
            }
            Ok(Value::Int(if y >= 64 {
                if x < 0 {
                    -1
                } else {
                    0
                }
            } else {
                x >> y
            }))
        }
        BinOp::BitAnd => Ok(Value::Int(x & y)),
        BinOp::BitOr => Ok(Value::Int(x | y)),
        BinOp::BitXor => Ok(Value::Int(x ^ y)),
    }
}

fn float_op(op: BinOp, x: f64, y: f64) -> Option<RunResult<Value>> {
    let value = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Some(raise(ExcKind::ZeroDivisionError, "float division by zero"));
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Some(raise(
                    ExcKind::ZeroDivisionError,
                    "float floor division by zero",
                ));
            }
            (x / y).floor()
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Some(raise(ExcKind::ZeroDivisionError, "float modulo"));
            }
            let remainder = x % y;
            if remainder != 0.0 && ((remainder < 0.0) != (y < 0.0)) {
                remainder + y
            } else {
                remainder
            }
        }
        BinOp::Pow => {
            if x == 0.0 && y < 0.0 {
                return Some(raise(
                    ExcKind::ZeroDivisionError,
                    "0.0 cannot be raised to a negative power",
                ));
            }
            if x < 0.0 && y.is_finite() && y.fract() != 0.0 {
                return Some(raise(
                    ExcKind::ValueError,
                    "negative number cannot be raised to a fractional power",
                ));
            }
            let result = x.powf(y);
            if result.is_infinite() && x.is_finite() && y.is_finite() {
                return Some(raise(ExcKind::OverflowError, "numerical result out of range"));
            }
            result
        }
        _ => return None,
    };
    Some(Ok(Value::Float(value)))
}

/// Python's slice index adjustment: `(start, step, count)`.
fn adjust_slice(len: usize, (lower, upper, step): SliceBounds) -> (i128, i128, usize) {
    let len = len as i128;
    let step = i128::from(step.unwrap_or(1));
    let clamp = |bound: Option<i64>, default: i128| -> i128 {
        let Some(bound) = bound else {
            return default;
        };
        let bound = i128::from(bound);
        if bound < 0 {
            let shifted = bound + len;
            if shifted < 0 {
                if step < 0 {
                    -1
                } else {
                    0
                }
            } else {
                shifted
            }
        } else if bound >= len {
            if step < 0 {
                len - 1
            } else {
                len
            }
        } else {
            bound
        }
    };
    let (start, stop) = if step > 0 {
        (clamp(lower, 0), clamp(upper, len))
    } else {
        (clamp(lower, len - 1), clamp(upper, -1))
    };
    let count = if step > 0 && start < stop {
        (stop - start - 1) / step + 1
    } else if step < 0 && stop < start {
        (start - stop - 1) / (-step) + 1
    } else {
        0
    };
    (start, step, count as usize)
}

fn slice_indices(len: usize, bounds: SliceBounds) -> impl Iterator<Item = usize> {
    let (start, step, count) = adjust_slice(len, bounds);
    (0..count).map(move |k| (start + k as i128 * step) as usize)
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { index + len } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

fn sequence_index(value: &Value, index: &Value) -> RunResult<i64> {
    match index.as_int() {
        Some(i) => Ok(i),
        None => raise(
            ExcKind::TypeError,
            format!(
                "{} indices must be integers or slices, not {}",
                value.type_name(),
                index.type_name()
            ),
        ),
    }
}

fn repeated(items: &[Value], count: usize) -> Vec<Value> {
    std::iter::repeat(items.iter().cloned())
        .take(count)
        .flatten()
        .collect()
}

fn repeat_count(count: &Value) -> usize {
    count
        .as_int()
        .map_or(0, |n| usize::try_from(n.max(0)).unwrap_or(usize::MAX))
}

/// Stable bottom-up merge sort over positions; `less` may fail.
fn merge_sort<F>(len: usize, mut less: F) -> RunResult<Vec<usize>>
where
    F: FnMut(usize, usize) -> RunResult<bool>,
{
    let mut src: Vec<usize> = (0..len).collect();
    let mut dst = vec![0; len];
    let mut width = 1;
    while width < len {
        let mut start = 0;
        while start < len {
            let mid = (start + width).min(len);
            let end = (start + 2 * width).min(len);
            let (mut i, mut j, mut k) = (start, mid, start);
            while i < mid && j < end {
                if less(src[j], src[i])? {
                    dst[k] = src[j];
                    j += 1;
                } else {
                    dst[k] = src[i];
                    i += 1;
                }
                k += 1;
            }
            let left = mid - i;
            dst[k..k + left].copy_from_slice(&src[i..mid]);
            k += left;
            dst[k..k + (end - j)].copy_from_slice(&src[j..end]);
            start = end;
        }
        std::mem::swap(&mut src, &mut dst);
        width *= 2;
    }
    Ok(src)
}

impl Interpreter<'_> {
    /// `left op right`.
    pub fn binary_op(&mut self, op: BinOp, left: &Value, right: &Value) -> RunResult<Value> {
        if let (Value::Bool(a), Value::Bool(b)) = (left, right) {
            match op {
                BinOp::BitAnd => return Ok(Value::Bool(a & b)),
                BinOp::BitOr => return Ok(Value::Bool(a | b)),
                BinOp::BitXor => return Ok(Value::Bool(a ^ b)),
                _ => {}
            }
        }
        if let (Some(a), Some(b)) = (left.number(), right.number()) {
            return match (a, b) {
                (Num::Int(x), Num::Int(y)) => int_op(op, x, y),
                _ => match float_op(op, a.to_f64(), b.to_f64()) {
                    Some(result) => result,
                    None => unsupported(op, left, right),
                },
            };
        }
        match (op, left, right) {
            (BinOp::Add, Value::Str(a), Value::Str(b)) => {
                self.check_len(a.len() + b.len())?;
                let mut out = String::with_capacity(a.len() + b.len());
                out.push_str(a);
                out.push_str(b);
                Ok(Value::str(&out))
            }
            (BinOp::Add, Value::List(a), Value::List(b)) => {
                self.check_len(a.len() + b.len())?;
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                Ok(Value::list(items))
            }
            (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
                self.check_len(a.len() + b.len())?;
                Ok(Value::tuple(a.iter().chain(b.iter()).cloned().collect()))
            }
            (
                BinOp::Mul,
                sequence @ (Value::Str(_) | Value::List(_) | Value::Tuple(_)),
                count,
            )
            | (
                BinOp::Mul,
                count,
                sequence @ (Value::Str(_) | Value::List(_) | Value::Tuple(_)),
            ) if count.as_int().is_some() => self.repeat(sequence, repeat_count(count)),
            (BinOp::Mod, Value::Str(template), args) => {
                let text = printf(template, args)?;
                self.check_len(text.len())?;
                Ok(Value::str(&text))
            }
            (BinOp::BitOr, Value::Dict(a), Value::Dict(b)) => {
                let mut merged = a.borrow().clone();
                for (key, value) in b.borrow().iter() {
                    merged.insert(key.hash_key()?, key.clone(), value.clone());
                }
                Ok(Value::dict(merged))
            }
            _ => unsupported(op, left, right),
        }
    }

    fn repeat(&mut self, sequence: &Value, count: usize) -> RunResult<Value> {
        match sequence {
            Value::Str(s) => {
                self.check_len(s.len().saturating_mul(count))?;
                Ok(Value::str(&s.repeat(count)))
            }
            Value::List(items) => {
                let items = items.borrow().clone();
                self.check_len(items.len().saturating_mul(count))?;
                Ok(Value::list(repeated(&items, count)))
            }
            Value::Tuple(items) => {
                self.check_len(items.len().saturating_mul(count))?;
                Ok(Value::tuple(repeated(items, count)))
            }
            other => raise(
                ExcKind::TypeError,
                format!("can't multiply sequence of type '{}'", other.type_name()),
            ),
        }
    }

    /// `op operand`.
    pub fn unary_op(&mut self, op: UnaryOp, operand: &Value) -> RunResult<Value> {
        let symbol = match op {
            UnaryOp::Not => return Ok(Value::Bool(!operand.truthy())),
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
            UnaryOp::Invert => "~",
        };
        match (op, operand) {
            (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
            (UnaryOp::Pos, Value::Float(f)) => Ok(Value::Float(*f)),
            (_, value) => match value.as_int() {
                Some(i) => match op {
                    UnaryOp::Neg => i.checked_neg().map(Value::Int).map_or_else(overflow, Ok),
                    UnaryOp::Invert => Ok(Value::Int(!i)),
                    _ => Ok(Value::Int(i)),
                },
                None => raise(
                    ExcKind::TypeError,
                    format!(
                        "bad operand type for unary {symbol}: '{}'",
                        value.type_name()
                    ),
                ),
            },
        }
    }

    /// One link of a comparison chain.
    pub fn compare_op(&mut self, op: CmpOp, left: &Value, right: &Value) -> RunResult<bool> {
        let ordering = |wanted: fn(Ordering) -> bool| -> RunResult<bool> {
            Ok(left.compare(right, op.symbol())?.is_some_and(wanted))
        };
        match op {
            CmpOp::Eq => left.equals(right),
            CmpOp::NotEq => Ok(!left.equals(right)?),
            CmpOp::Lt => ordering(Ordering::is_lt),
            CmpOp::LtE => ordering(Ordering::is_le),
            CmpOp::Gt => ordering(Ordering::is_gt),
            CmpOp::GtE => ordering(Ordering::is_ge),
            CmpOp::In => self.contains(right, left),
            CmpOp::NotIn => Ok(!self.contains(right, left)?),
            CmpOp::Is => Ok(left.is_same(right)),
            CmpOp::IsNot => Ok(!left.is_same(right)),
        }
    }

    /// `item in container`.
    pub fn contains(&mut self, container: &Value, item: &Value) -> RunResult<bool> {
        match container {
            Value::Str(s) => match item {
                Value::Str(needle) => Ok(s.contains(&**needle)),
                other => raise(
                    ExcKind::TypeError,
                    format!(
                        "'in <string>' requires string as left operand, not {}",
                        other.type_name()
                    ),
                ),
            },
            Value::List(_) | Value::Tuple(_) => {
                let items = match container {
                    Value::List(list) => list.borrow().clone(),
                    Value::Tuple(items) => items.to_vec(),
                    _ => Vec::new(),
                };
                for candidate in &items {
                    self.tick()?;
                    if candidate.is_same(item) || candidate.equals(item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Value::Dict(dict) => {
                let key = item.hash_key()?;
                Ok(dict.borrow().contains(&key))
            }
            Value::Range(range) => {
                let value = match item {
                    Value::Float(f) if f.fract() == 0.0 => *f as i64,
                    other => match other.as_int() {
                        Some(i) => i,
                        None => return Ok(false),
                    },
                };
                let offset = i128::from(value) - i128::from(range.start);
                let step = i128::from(range.step);
                Ok(offset % step == 0 && {
                    let index = offset / step;
                    index >= 0 && (index as u128) < range.len() as u128
                })
            }
            other => raise(
                ExcKind::TypeError,
                format!("argument of type '{}' is not iterable", other.type_name()),
            ),
        }
    }

    /// `object[index]`.
    pub fn get_item(&mut self, object: &Value, index: &Value) -> RunResult<Value> {
        match object {
            Value::List(list) => {
                let i = sequence_index(object, index)?;
                normalize_index(i, list.len())
                    .and_then(|i| list.get(i))
                    .ok_or_else(|| Interrupt::new(ExcKind::IndexError, "list index out of range"))
            }
            Value::Tuple(items) => {
                let i = sequence_index(object, index)?;
                normalize_index(i, items.len())
                    .map(|i| items[i].clone())
                    .ok_or_else(|| Interrupt::new(ExcKind::IndexError, "tuple index out of range"))
            }
            Value::Str(s) => {
                let i = sequence_index(object, index)?;
                let ch = if i >= 0 {
                    s.chars().nth(i as usize)
                } else {
                    normalize_index(i, s.chars().count()).and_then(|i| s.chars().nth(i))
                };
                match ch {
                    Some(ch) => Ok(Value::str(ch.encode_utf8(&mut [0u8; 4]))),
                    None => raise(ExcKind::IndexError, "string index out of range"),
                }
            }
            Value::Dict(dict) => {
                let key = index.hash_key()?;
                let found = dict.borrow().get(&key).cloned();
                found.ok_or_else(|| Interrupt::key_error(index))
            }
            Value::Range(range) => {
                let i = sequence_index(object, index)?;
                normalize_index(i, range.len())
                    .map(|i| Value::Int(range.nth(i)))
                    .ok_or_else(|| {
                        Interrupt::new(ExcKind::IndexError, "range object index out of range")
                    })
            }
            other => raise(
                ExcKind::TypeError,
                format!("'{}' object is not subscriptable", other.type_name()),
            ),
        }
    }

    /// `object[lower:upper:step]`.
    pub fn get_slice(&mut self, object: &Value, bounds: SliceBounds) -> RunResult<Value> {
        match object {
            Value::List(list) => {
                let items = list.borrow();
                let picked = slice_indices(items.len(), bounds)
                    .map(|i| items[i].clone())
                    .collect();
                Ok(Value::list(picked))
            }
            Value::Tuple(items) => Ok(Value::tuple(
                slice_indices(items.len(), bounds)
                    .map(|i| items[i].clone())
                    .collect(),
            )),
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let picked: String = slice_indices(chars.len(), bounds)
                    .map(|i| chars[i])
                    .collect();
                Ok(Value::str(&picked))
            }
            Value::Range(range) => {
                let (start, step, count) = adjust_slice(range.len(), bounds);
                let new_start = i128::from(range.start) + start * i128::from(range.step);
                let new_step = i128::from(range.step) * step;
                let new_stop = new_start + count as i128 * new_step;
                match (
                    i64::try_from(new_start),
                    i64::try_from(new_stop),
                    i64::try_from(new_step),
                ) {
                    (Ok(start), Ok(stop), Ok(step)) => {
                        Ok(Value::Range(RangeObj { start, stop, step }))
                    }
                    _ => overflow(),
                }
            }
            other => raise(
                ExcKind::TypeError,
                format!("'{}' object is not subscriptable", other.type_name()),
            ),
        }
    }

    /// `object[index] = value`.
    pub fn set_item(&mut self, object: &Value, index: Value, value: Value) -> RunResult<()> {
        match object {
            Value::List(list) => {
                let i = sequence_index(object, &index)?;
                let Some(i) = normalize_index(i, list.len()) else {
                    return raise(ExcKind::IndexError, "list assignment index out of range");
                };
                let previous = std::mem::replace(&mut list.borrow_mut()[i], value);
                release(Some(previous));
                Ok(())
            }
            Value::Dict(dict) => {
                let key = index.hash_key()?;
                if !dict.borrow().contains(&key) {
                    self.check_len(dict.borrow().len() + 1)?;
                }
                let previous = dict.borrow_mut().insert(key, index, value);
                release(previous);
                Ok(())
            }
            other => raise(
                ExcKind::TypeError,
                format!(
                    "'{}' object does not support item assignment",
                    other.type_name()
                ),
            ),
        }
    }

    /// `object[lower:upper:step] = value`.
    pub fn set_slice(&mut self, object: &Value, bounds: SliceBounds, value: Value) -> RunResult<()> {
        let Value::List(list) = object else {
            return raise(
                ExcKind::TypeError,
                format!(
                    "'{}' object does not support item assignment",
                    object.type_name()
                ),
            );
        };
        let items = self.collect(&value)?;
        let len = list.len();
        if matches!(bounds.2, None | Some(1)) {
            let (start, _, count) = adjust_slice(len, bounds);
            let start = start as usize;
            self.check_len(len - count + items.len())?;
            let removed: Vec<Value> = list
                .borrow_mut()
                .splice(start..start + count, items)
                .collect();
            release(removed);
            return Ok(());
        }
        let indices: Vec<usize> = slice_indices(len, bounds).collect();
        if indices.len() != items.len() {
            return raise(
                ExcKind::ValueError,
                format!(
                    "attempt to assign sequence of size {} to extended slice of size {}",
                    items.len(),
                    indices.len()
                ),
            );
        }
        let mut previous = Vec::with_capacity(items.len());
        {
            let mut target = list.borrow_mut();
            for (i, item) in indices.into_iter().zip(items) {
                previous.push(std::mem::replace(&mut target[i], item));
            }
        }
        release(previous);
        Ok(())
    }

    /// `del object[index]`.
    pub fn del_item(&mut self, object: &Value, index: &Value) -> RunResult<()> {
        match object {
            Value::List(list) => {
                let i = sequence_index(object, index)?;
                let Some(i) = normalize_index(i, list.len()) else {
                    return raise(ExcKind::IndexError, "list assignment index out of range");
                };
                let removed = list.borrow_mut().remove(i);
                release(Some(removed));
                Ok(())
            }
            Value::Dict(dict) => {
                let removed = dict.borrow_mut().remove(&index.hash_key()?);
                match removed {
                    Some((key, value)) => {
                        release([key, value]);
                        Ok(())
                    }
                    None => Err(Interrupt::key_error(index)),
                }
            }
            other => raise(
                ExcKind::TypeError,
                format!(
                    "'{}' object doesn't support item deletion",
                    other.type_name()
                ),
            ),
        }
    }

    /// `del object[lower:upper:step]`.
    pub fn del_slice(&mut self, object: &Value, bounds: SliceBounds) -> RunResult<()> {
        let Value::List(list) = object else {
            return raise(
                ExcKind::TypeError,
                format!(
                    "'{}' object doesn't support item deletion",
                    object.type_name()
                ),
            );
        };
        let mut indices: Vec<usize> = slice_indices(list.len(), bounds).collect();
        indices.sort_unstable_by(|a, b| b.cmp(a));
        let mut removed = Vec::with_capacity(indices.len());
        {
            let mut items = list.borrow_mut();
            for i in indices {
                removed.push(items.remove(i));
            }
        }
        release(removed);
        Ok(())
    }

    /// Stable sort by an optional key function; `reverse` keeps equal
    /// elements in their original order.
    pub fn sort_values(
        &mut self,
        mut items: Vec<Value>,
        key: Option<Value>,
        reverse: bool,
    ) -> RunResult<Vec<Value>> {
        let mut keys = match &key {
            Some(key) => {
                let mut keys = Vec::with_capacity(items.len());
                for item in &items {
                    keys.push(self.call_value(key, vec![item.clone()], Vec::new())?);
                }
                keys
            }
            None => items.clone(),
        };
        if reverse {
            items.reverse();
            keys.reverse();
        }
        let order = merge_sort(items.len(), |a, b| {
            self.tick()?;
            Ok(keys[a].compare(&keys[b], "<")? == Some(Ordering::Less))
        })?;
        let mut slots: Vec<Option<Value>> = items.into_iter().map(Some).collect();
        let mut sorted: Vec<Value> = order.into_iter().filter_map(|i| slots[i].take()).collect();
        if reverse {
            sorted.reverse();
        }
        Ok(sorted)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{error_of, output_of};
    use super::*;

    #[test]
    fn floor_division_and_modulo_follow_python() {
        assert_eq!(
            output_of("print(7 // 2, -7 // 2, 7 % -3, -7 % 3, 7.5 // 2, -7.5 % 2, 7 / 2)"),
            "3 -4 -2 2 3.0 0.5 3.5\n"
        );
    }

    #[test]
    fn division_by_zero_messages() {
        assert_eq!(error_of("1 / 0").1, "division by zero");
        assert_eq!(error_of("1 // 0").1, "integer division or modulo by zero");
        assert_eq!(error_of("1 % 0").1, "integer division or modulo by zero");
        assert_eq!(error_of("1.0 / 0").1, "float division by zero");
        assert_eq!(error_of("0 ** -1").0, "ZeroDivisionError");
    }

    #[test]
    fn integer_overflow_is_an_error() {
        assert_eq!(error_of("x = 2 ** 64").0, "OverflowError");
        assert_eq!(error_of("x = 9223372036854775807 + 1").0, "OverflowError");
        assert_eq!(error_of("x = 1 << 64").0, "OverflowError");
        assert_eq!(output_of("print(2 ** 62, 2 ** -1, -8 >> 1, 1 << 3)"), "4611686018427387904 0.5 -4 8\n");
    }

    #[test]
    fn sequence_operators() {
        assert_eq!(
            output_of("print('ab' + 'c', [1] + [2], (1,) + (2,), 'ab' * 2, 2 * [0], 'x' * -1)"),
            "abc [1, 2] (1, 2) abab [0, 0] \n"
        );
        assert_eq!(
            output_of("print('%s=%d' % ('n', 5), {'a': 1} | {'b': 2})"),
            "n=5 {'a': 1, 'b': 2}\n"
        );
        assert_eq!(
            error_of("'a' + 1"),
            ("TypeError".into(), "unsupported operand type(s) for +: 'str' and 'int'".into())
        );
    }

    #[test]
    fn list_and_tuple_repetition() {
        assert_eq!(
            output_of("a = [[0]] * 2\na[0].append(1)\nprint(a, (1, 'x') * 2, [] * 5, [1, 2] * 0)"),
            "[[0, 1], [0, 1]] (1, 'x', 1, 'x') [] []\n"
        );
        assert_eq!(error_of("x = [0, 0] * 6000000").0, "MemoryError");
    }

    #[test]
    fn comparisons_chain() {
        assert_eq!(
            output_of("print(1 < 2 < 3, 1 < 3 < 2, 'a' in 'cat', 3 not in [1, 2], None is None, [1] == [1.0])"),
            "True False True True True True\n"
        );
        assert_eq!(output_of("nan = float('nan')\nprint(nan < 1, nan == nan)"), "False False\n");
        assert_eq!(error_of("1 < 'a'").0, "TypeError");
        assert_eq!(output_of("print(4 in range(0, 10, 2), 5 in range(0, 10, 2))"), "True False\n");
    }

    #[test]
    fn subscripts_and_slices() {
        let code = "\
s = 'hello'
l = [0, 1, 2, 3, 4, 5]
print(s[1], s[-1], s[1:3], s[::-1], l[::2], l[-2:], l[4:1:-1], l[10:])
print(list(range(10)[2:8:3]), (1, 2, 3)[-1])
";
        assert_eq!(
            output_of(code),
            "e o el olleh [0, 2, 4] [4, 5] [4, 3, 2] []\n[2, 5] 3\n"
        );
        assert_eq!(
            error_of("[1][5]"),
            ("IndexError".into(), "list index out of range".into())
        );
        assert_eq!(error_of("{'a': 1}['b']").1, "'b'");
        assert_eq!(error_of("(1)[0]").0, "TypeError");
    }

    #[test]
    fn slice_assignment_and_deletion() {
        let code = "\
l = [0, 1, 2, 3, 4, 5]
l[1:3] = ['a', 'b', 'c']
print(l)
l[::2] = [9, 9, 9, 9]
print(l)
del l[0]
del l[::3]
print(l)
d = {'k': 1}
d['j'] = 2
del d['k']
print(d)
";
        assert_eq!(
            output_of(code),
            "[0, 'a', 'b', 'c', 3, 4, 5]\n[9, 'a', 9, 'c', 9, 4, 9]\n[9, 'c', 4, 9]\n{'j': 2}\n"
        );
        assert_eq!(error_of("l = [1, 2, 3]\nl[::2] = [1]").0, "ValueError");
        assert_eq!(error_of("t = (1,)\nt[0] = 2").0, "TypeError");
    }

    #[test]
    fn unary_operators() {
        assert_eq!(output_of("print(-5, +2.5, ~5, not 0, -True)"), "-5 2.5 -6 True -1\n");
        assert_eq!(error_of("-'a'").0, "TypeError");
    }

    #[test]
    fn sorting_mixed_types_raises() {
        assert_eq!(error_of("sorted([1, 'a'])").0, "TypeError");
    }

    #[test]
    fn reverse_sort_is_stable() {
        assert_eq!(
            output_of("pairs = [(1, 'a'), (0, 'b'), (1, 'c')]\nprint(sorted(pairs, key=lambda p: p[0], reverse=True))"),
            "[(1, 'a'), (1, 'c'), (0, 'b')]\n"
        );
    }

    #[test]
    fn merge_sort_orders_positions() {
        let values = [5, 3, 9, 1, 3];
        let order = merge_sort(values.len(), |a, b| Ok(values[a] < values[b])).unwrap();
        assert_eq!(order, vec![3, 1, 4, 0, 2]);
    }

    #[test]
    fn slice_adjustment() {
        assert_eq!(adjust_slice(6, (None, None, Some(-1))), (5, -1, 6));
        assert_eq!(adjust_slice(6, (Some(-100), Some(100), None)), (0, 1, 6));
        assert_eq!(adjust_slice(6, (Some(4), Some(1), None)).2, 0);
    }
}

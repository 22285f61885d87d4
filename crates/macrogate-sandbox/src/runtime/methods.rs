//! Methods of the builtin value types.

use std::rc::Rc;

use super::builtins::{dict_pairs, index_int, Args};
use super::exception::{raise, ExcKind, Interrupt};
use super::format::str_format;
use super::interp::Interpreter;
use super::value::{release, DictObj, ListObj, RunResult, Value};

const STR_METHODS: &[&str] = &[
    "upper",
    "lower",
    "strip",
    "lstrip",
    "rstrip",
    "split",
    "rsplit",
    "splitlines",
    "join",
    "replace",
    "startswith",
    "endswith",
    "find",
    "rfind",
    "index",
    "count",
    "format",
    "isdigit",
    "isalpha",
    "isalnum",
    "isspace",
    "isupper",
    "islower",
    "title",
    "capitalize",
    "center",
    "ljust",
    "rjust",
    "zfill",
    "partition",
];

const LIST_METHODS: &[&str] = &[
    "append", "extend", "pop", "insert", "remove", "index", "count", "sort", "reverse", "copy",
    "clear",
];

const DICT_METHODS: &[&str] = &[
    "get",
    "keys",
    "values",
    "items",
    "pop",
    "update",
    "setdefault",
    "copy",
    "clear",
    "popitem",
];

const INT_METHODS: &[&str] = &["bit_length"];
const FLOAT_METHODS: &[&str] = &["is_integer"];

/// The method `name` of `receiver`'s type, if it has one.
pub fn lookup(receiver: &Value, name: &str) -> Option<&'static str> {
    let table = match receiver {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Int(_) | Value::Bool(_) => INT_METHODS,
        Value::Float(_) => FLOAT_METHODS,
        _ => return None,
    };
    table.iter().find(|method| **method == name).copied()
}

/// Call a method previously found by [`lookup`].
pub fn call(interp: &mut Interpreter<'_>, receiver: &Value, args: Args) -> RunResult<Value> {
    match receiver {
        Value::Str(s) => str_method(interp, s, args),
        Value::List(list) => list_method(interp, list, args),
        Value::Dict(dict) => dict_method(interp, dict, args),
        Value::Float(f) => {
            args.arity(0, 0)?;
            args.finish_keywords()?;
            Ok(Value::Bool(f.is_finite() && f.fract() == 0.0))
        }
        other => match other.as_int() {
            Some(i) => {
                args.arity(0, 0)?;
                args.finish_keywords()?;
                Ok(Value::Int(i64::from(64 - i.unsigned_abs().leading_zeros())))
            }
            None => no_method(other, args.name()),
        },
    }
}

fn no_method<T>(receiver: &Value, name: &str) -> RunResult<T> {
    raise(
        ExcKind::AttributeError,
        format!(
            "'{}' object has no attribute '{name}'",
            receiver.type_name()
        ),
    )
}

fn text_arg(args: &Args, value: Option<Value>) -> RunResult<Option<Rc<str>>> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(Value::Str(s)) => Ok(Some(s)),
        Some(other) => raise(
            ExcKind::TypeError,
            format!(
                "{}() argument must be str or None, not {}",
                args.name(),
                other.type_name()
            ),
        ),
    }
}

fn required_text(args: &Args, index: usize) -> RunResult<Rc<str>> {
    match args.positional().get(index) {
        Some(Value::Str(s)) => Ok(s.clone()),
        Some(other) => raise(
            ExcKind::TypeError,
            format!(
                "{}() argument must be str, not {}",
                args.name(),
                other.type_name()
            ),
        ),
        None => raise(
            ExcKind::TypeError,
            format!("{}() missing required argument", args.name()),
        ),
    }
}

fn optional_int(value: Option<Value>) -> RunResult<Option<i64>> {
    match value {
        None | Some(Value::None) => Ok(None),
        Some(value) => index_int(&value).map(Some),
    }
}

/// The char window `s[start:end]` as a byte slice plus its char offset.
fn window(s: &str, start: Option<i64>, end: Option<i64>) -> Option<(&str, usize)> {
    let len = s.chars().count() as i64;
    let adjust = |i: i64| if i < 0 { (i + len).max(0) } else { i.min(len) };
    if start.is_some_and(|start| start > len) {
        return None;
    }
    let start = start.map_or(0, adjust);
    let end = end.map_or(len, adjust);
    if start > end {
        return None;
    }
    let byte = |index: i64| {
        s.char_indices()
            .nth(index as usize)
            .map_or(s.len(), |(offset, _)| offset)
    };
    Some((&s[byte(start)..byte(end)], start as usize))
}

fn split_whitespace(s: &str, maxsplit: Option<usize>) -> Vec<Value> {
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if maxsplit.is_some_and(|max| parts.len() >= max) {
            parts.push(Value::str(rest));
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                parts.push(Value::str(&rest[..end]));
                rest = rest[end..].trim_start();
            }
            None => {
                parts.push(Value::str(rest));
                break;
            }
        }
    }
    parts
}

fn rsplit_whitespace(s: &str, maxsplit: Option<usize>) -> Vec<Value> {
    let mut parts = Vec::new();
    let mut rest = s.trim_end();
    while !rest.is_empty() {
        if maxsplit.is_some_and(|max| parts.len() >= max) {
            parts.push(Value::str(rest));
            break;
        }
        match rest.rfind(char::is_whitespace) {
            Some(start) => {
                let ch = rest[start..].chars().next().map_or(1, char::len_utf8);
                parts.push(Value::str(&rest[start + ch..]));
                rest = rest[..start].trim_end();
            }
            None => {
                parts.push(Value::str(rest));
                break;
            }
        }
    }
    parts.reverse();
    parts
}

fn predicate(s: &str, test: fn(char) -> bool) -> Value {
    Value::Bool(!s.is_empty() && s.chars().all(test))
}

fn pad(interp: &Interpreter<'_>, s: &str, args: &Args) -> RunResult<Value> {
    args.arity(1, 2)?;
    let width = index_int(&args.positional()[0])?;
    let fill = match args.positional().get(1) {
        None => ' ',
        Some(Value::Str(f)) if f.chars().count() == 1 => f.chars().next().unwrap_or(' '),
        Some(_) => {
            return raise(
                ExcKind::TypeError,
                "The fill character must be exactly one character long",
            )
        }
    };
    let len = s.chars().count();
    let width = usize::try_from(width).unwrap_or(0);
    if width <= len {
        return Ok(Value::str(s));
    }
    interp.check_len(width)?;
    let margin = width - len;
    let left = match args.name() {
        "ljust" => 0,
        "rjust" => margin,
        _ => margin / 2 + (margin & width & 1),
    };
    let mut out = String::with_capacity(width);
    out.extend(std::iter::repeat(fill).take(left));
    out.push_str(s);
    out.extend(std::iter::repeat(fill).take(margin - left));
    Ok(Value::str(&out))
}

fn str_method(interp: &mut Interpreter<'_>, s: &Rc<str>, mut args: Args) -> RunResult<Value> {
    let name = args.name();
    if !matches!(name, "split" | "rsplit" | "format") {
        args.finish_keywords()?;
    }
    match name {
        "upper" | "lower" | "title" | "capitalize" | "splitlines" => {
            args.arity(0, 0)?;
            Ok(match name {
                "upper" => Value::str(&s.to_uppercase()),
                "lower" => Value::str(&s.to_lowercase()),
                "title" => {
                    let mut out = String::with_capacity(s.len());
                    let mut previous_cased = false;
                    for ch in s.chars() {
                        if previous_cased {
                            out.extend(ch.to_lowercase());
                        } else {
                            out.extend(ch.to_uppercase());
                        }
                        previous_cased = ch.is_alphabetic();
                    }
                    Value::str(&out)
                }
                "capitalize" => {
                    let mut chars = s.chars();
                    let mut out = String::with_capacity(s.len());
                    if let Some(first) = chars.next() {
                        out.extend(first.to_uppercase());
                        out.push_str(&chars.as_str().to_lowercase());
                    }
                    Value::str(&out)
                }
                _ => Value::list(s.lines().map(Value::str).collect()),
            })
        }
        "strip" | "lstrip" | "rstrip" => {
            args.arity(0, 1)?;
            let chars = text_arg(&args, args.positional().first().cloned())?;
            let strip = |c: char| match &chars {
                Some(set) => set.contains(c),
                None => c.is_whitespace(),
            };
            Ok(Value::str(match name {
                "strip" => s.trim_matches(strip),
                "lstrip" => s.trim_start_matches(strip),
                _ => s.trim_end_matches(strip),
            }))
        }
        "split" | "rsplit" => {
            args.arity(0, 2)?;
            let sep = args.get(0, "sep");
            let sep = text_arg(&args, sep)?;
            let maxsplit = optional_int(args.get(1, "maxsplit"))?
                .and_then(|max| usize::try_from(max).ok());
            args.finish_keywords()?;
            let reverse = name == "rsplit";
            let parts = match sep {
                None if reverse => rsplit_whitespace(s, maxsplit),
                None => split_whitespace(s, maxsplit),
                Some(sep) if sep.is_empty() => {
                    return raise(ExcKind::ValueError, "empty separator")
                }
                Some(sep) => match (maxsplit, reverse) {
                    (None, _) => s.split(&*sep).map(Value::str).collect(),
                    (Some(max), false) => s.splitn(max + 1, &*sep).map(Value::str).collect(),
                    (Some(max), true) => {
                        let mut parts: Vec<Value> =
                            s.rsplitn(max + 1, &*sep).map(Value::str).collect();
                        parts.reverse();
                        parts
                    }
                },
            };
            Ok(Value::list(parts))
        }
        "join" => {
            args.arity(1, 1)?;
            let items = interp.collect(&args.positional()[0])?;
            let mut out = String::new();
            for (i, item) in items.iter().enumerate() {
                let Value::Str(piece) = item else {
                    return raise(
                        ExcKind::TypeError,
                        format!(
                            "sequence item {i}: expected str instance, {} found",
                            item.type_name()
                        ),
                    );
                };
                if i > 0 {
                    out.push_str(s);
                }
                out.push_str(piece);
                interp.check_len(out.len())?;
            }
            Ok(Value::str(&out))
        }
        "replace" => {
            args.arity(2, 3)?;
            let old = required_text(&args, 0)?;
            let new = required_text(&args, 1)?;
            let limit = optional_int(args.positional().get(2).cloned())?
                .and_then(|count| usize::try_from(count).ok());
            let mut occurrences = if old.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(&*old).count()
            };
            if let Some(limit) = limit {
                occurrences = occurrences.min(limit);
            }
            let grown = occurrences.saturating_mul(new.len());
            interp.check_len(s.len().saturating_add(grown))?;
            Ok(Value::str(&match limit {
                Some(limit) => s.replacen(&*old, &new, limit),
                None => s.replace(&*old, &new),
            }))
        }
        "startswith" | "endswith" => {
            args.arity(1, 1)?;
            let candidates: Vec<Value> = match &args.positional()[0] {
                Value::Tuple(items) => items.to_vec(),
                other => vec![other.clone()],
            };
            for candidate in candidates {
                let Value::Str(affix) = candidate else {
                    return raise(
                        ExcKind::TypeError,
                        format!(
                            "{name} first arg must be str or a tuple of str, not {}",
                            candidate.type_name()
                        ),
                    );
                };
                let hit = if name == "startswith" {
                    s.starts_with(&*affix)
                } else {
                    s.ends_with(&*affix)
                };
                if hit {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "find" | "rfind" | "index" | "count" => {
            args.arity(1, 3)?;
            let sub = required_text(&args, 0)?;
            let start = optional_int(args.positional().get(1).cloned())?;
            let end = optional_int(args.positional().get(2).cloned())?;
            let Some((hay, offset)) = window(s, start, end) else {
                return match name {
                    "count" => Ok(Value::Int(0)),
                    "index" => raise(ExcKind::ValueError, "substring not found"),
                    _ => Ok(Value::Int(-1)),
                };
            };
            if name == "count" {
                let count = if sub.is_empty() {
                    hay.chars().count() + 1
                } else {
                    hay.matches(&*sub).count()
                };
                return Ok(Value::Int(count as i64));
            }
            let found = if name == "rfind" {
                hay.rfind(&*sub)
            } else {
                hay.find(&*sub)
            };
            match found {
                Some(byte) => Ok(Value::Int((offset + hay[..byte].chars().count()) as i64)),
                None if name == "index" => raise(ExcKind::ValueError, "substring not found"),
                None => Ok(Value::Int(-1)),
            }
        }
        "format" => {
            let keywords = args.take_keywords();
            let text = str_format(s, args.positional(), &keywords)?;
            interp.check_len(text.len())?;
            Ok(Value::str(&text))
        }
        "isdigit" | "isalpha" | "isalnum" | "isspace" => {
            args.arity(0, 0)?;
            Ok(predicate(
                s,
                match name {
                    "isdigit" => |c: char| c.is_ascii_digit(),
                    "isalpha" => char::is_alphabetic,
                    "isalnum" => char::is_alphanumeric,
                    _ => char::is_whitespace,
                },
            ))
        }
        "isupper" | "islower" => {
            args.arity(0, 0)?;
            let (want, reject): (fn(char) -> bool, fn(char) -> bool) = if name == "isupper" {
                (char::is_uppercase, char::is_lowercase)
            } else {
                (char::is_lowercase, char::is_uppercase)
            };
            Ok(Value::Bool(
                s.chars().any(want) && !s.chars().any(reject),
            ))
        }
        "center" | "ljust" | "rjust" => pad(interp, s, &args),
        "zfill" => {
            args.arity(1, 1)?;
            let width = usize::try_from(index_int(&args.positional()[0])?).unwrap_or(0);
            let len = s.chars().count();
            if width <= len {
                return Ok(Value::str(s));
            }
            interp.check_len(width)?;
            let (sign, digits) = match s.as_bytes().first() {
                Some(b'+' | b'-') => s.split_at(1),
                _ => ("", &**s),
            };
            let mut out = String::with_capacity(width);
            out.push_str(sign);
            out.extend(std::iter::repeat('0').take(width - len));
            out.push_str(digits);
            Ok(Value::str(&out))
        }
        "partition" => {
            args.arity(1, 1)?;
            let sep = required_text(&args, 0)?;
            if sep.is_empty() {
                return raise(ExcKind::ValueError, "empty separator");
            }
            let parts = match s.split_once(&*sep) {
                Some((head, tail)) => [Value::str(head), Value::Str(sep), Value::str(tail)],
                None => [Value::Str(s.clone()), Value::str(""), Value::str("")],
            };
            Ok(Value::tuple(parts.to_vec()))
        }
        other => no_method(&Value::Str(s.clone()), other),
    }
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { index + len } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

fn position_of(list: &ListObj, needle: &Value) -> RunResult<Option<usize>> {
    let items = list.borrow().clone();
    for (i, item) in items.iter().enumerate() {
        if item.is_same(needle) || item.equals(needle)? {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

fn list_method(interp: &mut Interpreter<'_>, list: &Rc<ListObj>, mut args: Args) -> RunResult<Value> {
    let name = args.name();
    if name != "sort" {
        args.finish_keywords()?;
    }
    match name {
        "append" => {
            args.arity(1, 1)?;
            interp.check_len(list.len() + 1)?;
            list.borrow_mut().push(args.positional()[0].clone());
            Ok(Value::None)
        }
        "extend" => {
            args.arity(1, 1)?;
            let items = interp.collect(&args.positional()[0])?;
            interp.check_len(list.len() + items.len())?;
            list.borrow_mut().extend(items);
            Ok(Value::None)
        }
        "pop" => {
            args.arity(0, 1)?;
            let len = list.len();
            if len == 0 {
                return raise(ExcKind::IndexError, "pop from empty list");
            }
            let index = match args.positional().first() {
                Some(index) => index_int(index)?,
                None => -1,
            };
            let Some(index) = normalize_index(index, len) else {
                return raise(ExcKind::IndexError, "pop index out of range");
            };
            let item = list.borrow_mut().remove(index);
            Ok(item)
        }
        "insert" => {
            args.arity(2, 2)?;
            let len = list.len() as i64;
            let index = index_int(&args.positional()[0])?;
            let index = if index < 0 {
                (index + len).max(0)
            } else {
                index.min(len)
            };
            interp.check_len(list.len() + 1)?;
            list.borrow_mut()
                .insert(index as usize, args.positional()[1].clone());
            Ok(Value::None)
        }
        "remove" => {
            args.arity(1, 1)?;
            match position_of(list, &args.positional()[0])? {
                Some(index) => {
                    let removed = list.borrow_mut().remove(index);
                    drop(removed);
                    Ok(Value::None)
                }
                None => raise(ExcKind::ValueError, "list.remove(x): x not in list"),
            }
        }
        "index" => {
            args.arity(1, 1)?;
            let needle = &args.positional()[0];
            match position_of(list, needle)? {
                Some(index) => Ok(Value::Int(index as i64)),
                None => raise(
                    ExcKind::ValueError,
                    format!("{} is not in list", needle.repr()),
                ),
            }
        }
        "count" => {
            args.arity(1, 1)?;
            let needle = &args.positional()[0];
            let items = list.borrow().clone();
            let mut count = 0;
            for item in &items {
                if item.is_same(needle) || item.equals(needle)? {
                    count += 1;
                }
            }
            Ok(Value::Int(count))
        }
        "sort" => {
            args.arity(0, 0)?;
            let key = args.keyword("key").filter(|key| !matches!(key, Value::None));
            let reverse = args.keyword("reverse").is_some_and(|r| r.truthy());
            args.finish_keywords()?;
            let items = list.borrow().clone();
            let sorted = interp.sort_values(items, key, reverse)?;
            let previous = std::mem::replace(&mut *list.borrow_mut(), sorted);
            release(previous);
            Ok(Value::None)
        }
        "reverse" => {
            args.arity(0, 0)?;
            list.borrow_mut().reverse();
            Ok(Value::None)
        }
        "copy" => {
            args.arity(0, 0)?;
            Ok(Value::list(list.borrow().clone()))
        }
        "clear" => {
            args.arity(0, 0)?;
            release(list.take());
            Ok(Value::None)
        }
        other => no_method(&Value::List(list.clone()), other),
    }
}

fn dict_method(interp: &mut Interpreter<'_>, dict: &Rc<DictObj>, mut args: Args) -> RunResult<Value> {
    let name = args.name();
    if name != "update" {
        args.finish_keywords()?;
    }
    match name {
        "get" => {
            args.arity(1, 2)?;
            let hash = args.positional()[0].hash_key()?;
            let found = dict.borrow().get(&hash).cloned();
            Ok(found.unwrap_or_else(|| args.positional().get(1).cloned().unwrap_or(Value::None)))
        }
        "keys" => {
            args.arity(0, 0)?;
            Ok(Value::list(dict.borrow().keys()))
        }
        "values" => {
            args.arity(0, 0)?;
            Ok(Value::list(dict.borrow().values()))
        }
        "items" => {
            args.arity(0, 0)?;
            let items = dict
                .borrow()
                .iter()
                .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                .collect();
            Ok(Value::list(items))
        }
        "pop" => {
            args.arity(1, 2)?;
            let key = &args.positional()[0];
            let removed = dict.borrow_mut().remove(&key.hash_key()?);
            match (removed, args.positional().get(1)) {
                (Some((_, value)), _) => Ok(value),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(Interrupt::key_error(key)),
            }
        }
        "popitem" => {
            args.arity(0, 0)?;
            let last = dict.borrow_mut().pop_last();
            match last {
                Some((key, value)) => Ok(Value::tuple(vec![key, value])),
                None => raise(ExcKind::KeyError, "popitem(): dictionary is empty"),
            }
        }
        "setdefault" => {
            args.arity(1, 2)?;
            let key = args.positional()[0].clone();
            let hash = key.hash_key()?;
            let existing = dict.borrow().get(&hash).cloned();
            if let Some(existing) = existing {
                return Ok(existing);
            }
            let default = args.positional().get(1).cloned().unwrap_or(Value::None);
            interp.check_len(dict.borrow().len() + 1)?;
            dict.borrow_mut().insert(hash, key, default.clone());
            Ok(default)
        }
        "update" => {
            args.arity(0, 1)?;
            let mut pairs = match args.positional().first() {
                Some(source) => dict_pairs(interp, source)?,
                None => Vec::new(),
            };
            for (key, value) in args.take_keywords() {
                pairs.push((Value::str(&key), value));
            }
            interp.check_len(dict.borrow().len() + pairs.len())?;
            for (key, value) in pairs {
                let hash = key.hash_key()?;
                let previous = dict.borrow_mut().insert(hash, key, value);
                release(previous);
            }
            Ok(Value::None)
        }
        "copy" => {
            args.arity(0, 0)?;
            Ok(Value::dict(dict.borrow().clone()))
        }
        "clear" => {
            args.arity(0, 0)?;
            let entries = dict.borrow_mut().clear();
            release(entries.into_iter().flat_map(|(k, v)| [k, v]));
            Ok(Value::None)
        }
        other => no_method(&Value::Dict(dict.clone()), other),
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{error_of, output_of};
    use super::*;

    #[test]
    fn lookup_is_per_type() {
        assert_eq!(lookup(&Value::str("x"), "upper"), Some("upper"));
        assert_eq!(lookup(&Value::list(vec![]), "upper"), None);
        assert_eq!(lookup(&Value::Int(1), "bit_length"), Some("bit_length"));
        assert_eq!(lookup(&Value::None, "anything"), None);
    }

    #[test]
    fn string_methods() {
        let code = "\
s = '  Hello, World  '
print(s.strip(), s.lower().strip(), s.upper().rstrip() + '|')
print('a,b,,c'.split(','), 'a b  c'.split(), 'a b c'.split(None, 1), 'a.b.c'.rsplit('.', 1))
print('-'.join(['x', 'y']), 'aaa'.replace('a', 'b', 2), 'hello'.find('l'), 'hello'.rfind('l'))
print('abc'.startswith(('x', 'a')), 'abc'.endswith('bc'), 'banana'.count('an'))
print('{} and {name}'.format(1, name='two'), '123'.isdigit(), ''.isdigit())
print('hello world'.title(), 'hELLO'.capitalize(), 'ab'.center(6, '*'), '42'.zfill(5), '-7'.zfill(4))
print('k=v=w'.partition('='), 'line1\\nline2'.splitlines())
";
        assert_eq!(
            output_of(code),
            "Hello, World hello, world   HELLO, WORLD|\n\
             ['a', 'b', '', 'c'] ['a', 'b', 'c'] ['a', 'b c'] ['a.b', 'c']\n\
             x-y bba 2 3\n\
             True True 2\n\
             1 and two True False\n\
             Hello World Hello **ab** 00042 -007\n\
             ('k', '=', 'v=w') ['line1', 'line2']\n"
        );
    }

    #[test]
    fn string_method_errors() {
        assert_eq!(
            error_of("'abc'.index('z')"),
            ("ValueError".into(), "substring not found".into())
        );
        assert_eq!(error_of("'a'.split('')").0, "ValueError");
        assert_eq!(
            error_of("','.join([1])"),
            ("TypeError".into(), "sequence item 0: expected str instance, int found".into())
        );
        assert_eq!(error_of("'x'.nope()").0, "AttributeError");
    }

    #[test]
    fn list_methods() {
        let code = "\
items = [3, 1, 2]
items.append(4)
items.extend((5, 6))
items.insert(0, 0)
print(items, items.pop(), items.pop(0), items)
items.remove(2)
items.sort(reverse=True)
print(items, items.index(3), items.count(1))
copy = items.copy()
items.clear()
print(items, copy)
";
        assert_eq!(
            output_of(code),
            "[3, 1, 2, 4, 5] 6 0 [3, 1, 2, 4, 5]\n[5, 4, 3, 1] 2 1\n[] [5, 4, 3, 1]\n"
        );
        assert_eq!(
            error_of("[].pop()"),
            ("IndexError".into(), "pop from empty list".into())
        );
        assert_eq!(error_of("[1].remove(2)").0, "ValueError");
    }

    #[test]
    fn sort_with_key_is_stable() {
        assert_eq!(
            output_of("words = ['bb', 'a', 'cc', 'd']\nwords.sort(key=len)\nprint(words)"),
            "['a', 'd', 'bb', 'cc']\n"
        );
    }

    #[test]
    fn dict_methods() {
        let code = "\
d = {'a': 1}
d.update({'b': 2}, c=3)
print(d.get('a'), d.get('z'), d.get('z', 0), d.keys(), d.values())
print(d.items(), d.pop('a'), d.pop('zz', None), d.setdefault('e', 5), d)
print(d.popitem(), len(d.copy()))
d.clear()
print(d)
";
        assert_eq!(
            output_of(code),
            "1 None 0 ['a', 'b', 'c'] [1, 2, 3]\n\
             [('a', 1), ('b', 2), ('c', 3)] 1 None 5 {'b': 2, 'c': 3, 'e': 5}\n\
             ('e', 5) 2\n\
             {}\n"
        );
        assert_eq!(
            error_of("{}.pop('k')"),
            ("KeyError".into(), "'k'".into())
        );
    }

    #[test]
    fn numeric_methods() {
        assert_eq!(
            output_of("print((255).bit_length(), (-8).bit_length(), (2.0).is_integer(), (2.5).is_integer())"),
            "8 4 True False\n"
        );
    }
}

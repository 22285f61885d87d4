//! Number and string formatting: float `repr`, format specifications
//! (`f"{x:>8.2f}"`, `format(x, spec)`, `str.format`) and printf-style `%`.

use super::exception::{raise, ExcKind, Interrupt};
use super::math::float_to_i64;
use super::value::{RunResult, Value};

/// Largest width or precision a format specification may request.
pub const MAX_FORMAT_WIDTH: usize = 1 << 20;

/// Shortest round-tripping float text, in Python's `repr` layout.
pub fn float_repr(x: f64) -> String {
    if x.is_nan() {
        return "nan".into();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.into();
    }
    if x == 0.0 {
        return if x.is_sign_negative() { "-0.0" } else { "0.0" }.into();
    }
    // `{:e}` yields the shortest digits that round-trip, e.g. "-1.2345e-7".
    let sci = format!("{x:e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((&sci, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let mut out = String::new();
    if x < 0.0 {
        out.push('-');
    }
    if !(-4..16).contains(&exp) {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        push_exponent(&mut out, exp, 'e');
    } else if exp < 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat('0').take((-exp - 1) as usize));
        out.push_str(&digits);
    } else {
        let point = exp as usize + 1;
        if digits.len() <= point {
            out.push_str(&digits);
            out.extend(std::iter::repeat('0').take(point - digits.len()));
            out.push_str(".0");
        } else {
            out.push_str(&digits[..point]);
            out.push('.');
            out.push_str(&digits[point..]);
        }
    }
    out
}

fn push_exponent(out: &mut String, exp: i32, marker: char) {
    out.push(marker);
    out.push(if exp < 0 { '-' } else { '+' });
    out.push_str(&format!("{:02}", exp.unsigned_abs()));
}

/// Rewrite Rust's `1.5e3` exponent into Python's `1.5e+03`.
fn pythonize_exponent(rust: &str, marker: char) -> String {
    match rust.split_once('e') {
        Some((mantissa, exp)) => {
            let mut out = mantissa.to_string();
            push_exponent(&mut out, exp.parse().unwrap_or(0), marker);
            out
        }
        None => rust.to_string(),
    }
}

/// A parsed format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatSpec {
    fill: char,
    align: Option<char>,
    sign: char,
    alternate: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

impl Default for FormatSpec {
    fn default() -> Self {
        Self {
            fill: ' ',
            align: None,
            sign: '-',
            alternate: false,
            width: 0,
            grouping: None,
            precision: None,
            kind: None,
        }
    }
}

fn invalid_spec<T>(spec: &str) -> RunResult<T> {
    raise(
        ExcKind::ValueError,
        format!("Invalid format specifier '{spec}'"),
    )
}

fn read_number(chars: &[char], i: &mut usize, spec: &str) -> RunResult<Option<usize>> {
    let start = *i;
    while *i < chars.len() && chars[*i].is_ascii_digit() {
        *i += 1;
    }
    if *i == start {
        return Ok(None);
    }
    let text: String = chars[start..*i].iter().collect();
    match text.parse::<usize>() {
        Ok(n) if n <= MAX_FORMAT_WIDTH => Ok(Some(n)),
        _ => raise(
            ExcKind::ValueError,
            format!("Too many decimal digits in format string '{spec}'"),
        ),
    }
}

impl FormatSpec {
    /// Parse `[[fill]align][sign][#][0][width][grouping][.precision][type]`.
    pub fn parse(spec: &str) -> RunResult<Self> {
        let chars: Vec<char> = spec.chars().collect();
        let mut out = FormatSpec::default();
        let mut i = 0;
        let is_align = |c: char| matches!(c, '<' | '>' | '=' | '^');
        if chars.len() >= 2 && is_align(chars[1]) {
            out.fill = chars[0];
            out.align = Some(chars[1]);
            i = 2;
        } else if chars.first().copied().is_some_and(is_align) {
            out.align = Some(chars[0]);
            i = 1;
        }
        if i < chars.len() && matches!(chars[i], '+' | '-' | ' ') {
            out.sign = chars[i];
            i += 1;
        }
        if i < chars.len() && chars[i] == '#' {
            out.alternate = true;
            i += 1;
        }
        if i < chars.len() && chars[i] == '0' {
            if out.align.is_none() {
                out.fill = '0';
                out.align = Some('=');
            }
            i += 1;
        }
        out.width = read_number(&chars, &mut i, spec)?.unwrap_or(0);
        if i < chars.len() && matches!(chars[i], ',' | '_') {
            out.grouping = Some(chars[i]);
            i += 1;
        }
        if i < chars.len() && chars[i] == '.' {
            i += 1;
            match read_number(&chars, &mut i, spec)? {
                Some(p) => out.precision = Some(p),
                None => {
                    return raise(ExcKind::ValueError, "Format specifier missing precision");
                }
            }
        }
        if i < chars.len() {
            out.kind = Some(chars[i]);
            i += 1;
        }
        if i < chars.len() {
            return invalid_spec(spec);
        }
        Ok(out)
    }

    fn pad(&self, prefix: &str, body: &str, default_align: char) -> String {
        let len = prefix.chars().count() + body.chars().count();
        if self.width <= len {
            return format!("{prefix}{body}");
        }
        let n = self.width - len;
        let fill = |count: usize| std::iter::repeat(self.fill).take(count).collect::<String>();
        match self.align.unwrap_or(default_align) {
            '<' => format!("{prefix}{body}{}", fill(n)),
            '^' => format!("{}{prefix}{body}{}", fill(n / 2), fill(n - n / 2)),
            '=' => format!("{prefix}{}{body}", fill(n)),
            _ => format!("{}{prefix}{body}", fill(n)),
        }
    }

    fn sign_prefix(&self, negative: bool) -> &'static str {
        match (negative, self.sign) {
            (true, _) => "-",
            (false, '+') => "+",
            (false, ' ') => " ",
            _ => "",
        }
    }
}

fn group_digits(digits: &str, sep: char, every: usize) -> String {
    let (int_part, rest) = match digits.find(|c: char| !c.is_ascii_alphanumeric()) {
        Some(pos) => digits.split_at(pos),
        None => (digits, ""),
    };
    let chars: Vec<char> = int_part.chars().collect();
    let mut out = String::with_capacity(digits.len() + digits.len() / every);
    for (i, ch) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % every == 0 {
            out.push(sep);
        }
        out.push(*ch);
    }
    out.push_str(rest);
    out
}

fn format_int(i: i64, spec: &FormatSpec, type_name: &str) -> RunResult<String> {
    let magnitude = i.unsigned_abs();
    let (prefix, body, every) = match spec.kind {
        None | Some('d') | Some('n') => ("", magnitude.to_string(), 3),
        Some('x') => ("0x", format!("{magnitude:x}"), 4),
        Some('X') => ("0X", format!("{magnitude:X}"), 4),
        Some('o') => ("0o", format!("{magnitude:o}"), 4),
        Some('b') => ("0b", format!("{magnitude:b}"), 4),
        Some('c') => {
            let ch = u32::try_from(i)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| Interrupt::new(ExcKind::OverflowError, "%c arg not in range(0x110000)"))?;
            return Ok(spec.pad("", &ch.to_string(), '<'));
        }
        Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%') => return format_float(i as f64, spec),
        Some(other) => {
            return raise(
                ExcKind::ValueError,
                format!("Unknown format code '{other}' for object of type '{type_name}'"),
            )
        }
    };
    let body = match spec.grouping {
        Some(sep) => group_digits(&body, sep, if sep == ',' { 3 } else { every }),
        None => body,
    };
    let sign = spec.sign_prefix(i < 0);
    let prefix = if spec.alternate {
        format!("{sign}{prefix}")
    } else {
        sign.to_string()
    };
    Ok(spec.pad(&prefix, &body, '>'))
}

fn strip_fraction_zeros(text: &str) -> String {
    let (mantissa, exp) = match text.find('e') {
        Some(pos) => text.split_at(pos),
        None => (text, ""),
    };
    let mantissa = if mantissa.contains('.') {
        mantissa.trim_end_matches('0').trim_end_matches('.')
    } else {
        mantissa
    };
    format!("{mantissa}{exp}")
}

fn general_float(x: f64, precision: usize, alternate: bool, upper: bool) -> String {
    let p = precision.max(1);
    let exp = if x == 0.0 {
        0
    } else {
        let sci = format!("{:.*e}", p - 1, x);
        sci.split_once('e')
            .and_then(|(_, e)| e.parse::<i32>().ok())
            .unwrap_or(0)
    };
    let marker = if upper { 'E' } else { 'e' };
    let text = if exp >= -4 && exp < p as i32 {
        format!("{:.*}", (p as i32 - 1 - exp).max(0) as usize, x)
    } else {
        pythonize_exponent(&format!("{:.*e}", p - 1, x), marker)
    };
    if alternate {
        text
    } else {
        strip_fraction_zeros(&text)
    }
}

fn format_float(x: f64, spec: &FormatSpec) -> RunResult<String> {
    let negative = x.is_sign_negative() && !x.is_nan();
    let magnitude = x.abs();
    let upper = matches!(spec.kind, Some('E' | 'F' | 'G'));
    let body = if !magnitude.is_finite() {
        let text = if magnitude.is_nan() { "nan" } else { "inf" };
        let text = if spec.kind == Some('%') {
            format!("{text}%")
        } else {
            text.to_string()
        };
        if upper {
            text.to_uppercase()
        } else {
            text
        }
    } else {
        match spec.kind {
            Some('f' | 'F') => format!("{:.*}", spec.precision.unwrap_or(6), magnitude),
            Some('e' | 'E') => pythonize_exponent(
                &format!("{:.*e}", spec.precision.unwrap_or(6), magnitude),
                if upper { 'E' } else { 'e' },
            ),
            Some('g' | 'G') => general_float(
                magnitude,
                spec.precision.unwrap_or(6),
                spec.alternate,
                upper,
            ),
            Some('%') => format!("{:.*}%", spec.precision.unwrap_or(6), magnitude * 100.0),
            None => match spec.precision {
                None => float_repr(magnitude),
                Some(p) => {
                    let text = general_float(magnitude, p, spec.alternate, false);
                    if text.contains(['.', 'e']) {
                        text
                    } else {
                        format!("{text}.0")
                    }
                }
            },
            Some(other) => {
                return raise(
                    ExcKind::ValueError,
                    format!("Unknown format code '{other}' for object of type 'float'"),
                )
            }
        }
    };
    let body = match spec.grouping {
        Some(sep) => group_digits(&body, sep, 3),
        None => body,
    };
    Ok(spec.pad(spec.sign_prefix(negative), &body, '>'))
}

fn format_str(s: &str, spec: &FormatSpec, default_align: char) -> RunResult<String> {
    match spec.kind {
        None | Some('s') => {}
        Some(other) => {
            return raise(
                ExcKind::ValueError,
                format!("Unknown format code '{other}' for object of type 'str'"),
            )
        }
    }
    if spec.sign != '-' {
        return raise(ExcKind::ValueError, "Sign not allowed in string format specifier");
    }
    let body: String = match spec.precision {
        Some(p) => s.chars().take(p).collect(),
        None => s.to_string(),
    };
    Ok(spec.pad("", &body, default_align))
}

/// `format(value, spec)`.
pub fn format_value(value: &Value, spec: &str) -> RunResult<String> {
    if spec.is_empty() {
        return Ok(value.to_str());
    }
    let parsed = FormatSpec::parse(spec)?;
    match value {
        Value::Bool(b) => format_int(i64::from(*b), &parsed, "bool"),
        Value::Int(i) => format_int(*i, &parsed, "int"),
        Value::Float(f) => format_float(*f, &parsed),
        Value::Str(s) => format_str(s, &parsed, '<'),
        other => raise(
            ExcKind::TypeError,
            format!(
                "unsupported format string passed to {}.__format__",
                other.type_name()
            ),
        ),
    }
}

/// `ascii(value)`: `repr` with non-ASCII characters escaped.
pub fn ascii_repr(value: &Value) -> String {
    let mut out = String::new();
    for ch in value.repr().chars() {
        let code = ch as u32;
        if code < 0x80 {
            out.push(ch);
        } else if code <= 0xff {
            out.push_str(&format!("\\x{code:02x}"));
        } else if code <= 0xffff {
            out.push_str(&format!("\\u{code:04x}"));
        } else {
            out.push_str(&format!("\\U{code:08x}"));
        }
    }
    out
}

/// `template.format(*args, **kwargs)`.
pub fn str_format(template: &str, args: &[Value], kwargs: &[(String, Value)]) -> RunResult<String> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut auto_index = 0usize;
    let mut manual = false;
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return raise(ExcKind::ValueError, "Single '}' encountered in format string");
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some('{') => {
                            return raise(
                                ExcKind::ValueError,
                                "nested replacement fields are not supported",
                            );
                        }
                        Some(c) => field.push(c),
                        None => {
                            return raise(
                                ExcKind::ValueError,
                                "expected '}' before end of string",
                            );
                        }
                    }
                }
                let (head, spec) = match field.split_once(':') {
                    Some((head, spec)) => (head, spec),
                    None => (field.as_str(), ""),
                };
                let (name, conversion) = match head.split_once('!') {
                    Some((name, conv)) => (name, Some(conv)),
                    None => (head, None),
                };
                let value = if name.is_empty() {
                    if manual {
                        return raise(
                            ExcKind::ValueError,
                            "cannot switch from manual field specification to automatic field numbering",
                        );
                    }
                    auto_index += 1;
                    positional(args, auto_index - 1)?
                } else if let Ok(index) = name.parse::<usize>() {
                    if auto_index > 0 {
                        return raise(
                            ExcKind::ValueError,
                            "cannot switch from automatic field numbering to manual field specification",
                        );
                    }
                    manual = true;
                    positional(args, index)?
                } else {
                    match kwargs.iter().find(|(k, _)| k == name) {
                        Some((_, v)) => v.clone(),
                        None => return Err(Interrupt::key_error(&Value::str(name))),
                    }
                };
                out.push_str(&convert_and_format(&value, conversion, spec)?);
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

fn positional(args: &[Value], index: usize) -> RunResult<Value> {
    args.get(index).cloned().ok_or_else(|| {
        Interrupt::new(
            ExcKind::IndexError,
            format!("Replacement index {index} out of range for positional args tuple"),
        )
    })
}

/// Apply a `!r`/`!s`/`!a` conversion, then a format spec.
pub fn convert_and_format(value: &Value, conversion: Option<&str>, spec: &str) -> RunResult<String> {
    let converted = match conversion {
        None => None,
        Some("r") => Some(value.repr()),
        Some("s") => Some(value.to_str()),
        Some("a") => Some(ascii_repr(value)),
        Some(other) => {
            return raise(
                ExcKind::ValueError,
                format!("Unknown conversion specifier {other}"),
            )
        }
    };
    match converted {
        Some(text) => format_value(&Value::str(&text), spec),
        None => format_value(value, spec),
    }
}

/// `template % args`.
pub fn printf(template: &str, args: &Value) -> RunResult<String> {
    let positional: Vec<Value> = match args {
        Value::Tuple(items) => items.to_vec(),
        Value::Dict(_) => Vec::new(),
        other => vec![other.clone()],
    };
    let mapping = match args {
        Value::Dict(d) => Some(d.clone()),
        _ => None,
    };
    let mut next = 0usize;
    let take = |next: &mut usize| -> RunResult<Value> {
        let value = positional.get(*next).cloned().ok_or_else(|| {
            Interrupt::new(ExcKind::TypeError, "not enough arguments for format string")
        })?;
        *next += 1;
        Ok(value)
    };

    let chars: Vec<char> = template.chars().collect();
    let mut out = String::new();
    let mut i = 0;
    let mut used_mapping = false;
    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;
        let mut key = None;
        if chars.get(i) == Some(&'(') {
            let start = i + 1;
            let end = chars[start..]
                .iter()
                .position(|&c| c == ')')
                .map(|p| start + p)
                .ok_or_else(|| Interrupt::new(ExcKind::ValueError, "incomplete format key"))?;
            key = Some(chars[start..end].iter().collect::<String>());
            i = end + 1;
        }
        let mut spec = FormatSpec {
            align: Some('>'),
            ..FormatSpec::default()
        };
        while let Some(&flag) = chars.get(i) {
            match flag {
                '-' => spec.align = Some('<'),
                '+' => spec.sign = '+',
                ' ' if spec.sign != '+' => spec.sign = ' ',
                ' ' => {}
                '#' => spec.alternate = true,
                '0' => {
                    if spec.align != Some('<') {
                        spec.fill = '0';
                        spec.align = Some('=');
                    }
                }
                _ => break,
            }
            i += 1;
        }
        if chars.get(i) == Some(&'*') {
            i += 1;
            let width = take(&mut next)?;
            spec.width = width
                .as_int()
                .and_then(|w| usize::try_from(w).ok())
                .filter(|w| *w <= MAX_FORMAT_WIDTH)
                .ok_or_else(|| Interrupt::new(ExcKind::TypeError, "* wants int"))?;
        } else {
            spec.width = read_number(&chars, &mut i, template)?.unwrap_or(0);
        }
        if chars.get(i) == Some(&'.') {
            i += 1;
            spec.precision = Some(read_number(&chars, &mut i, template)?.unwrap_or(0));
        }
        while matches!(chars.get(i), Some('h' | 'l' | 'L')) {
            i += 1;
        }
        let Some(&conv) = chars.get(i) else {
            return raise(ExcKind::ValueError, "incomplete format");
        };
        i += 1;
        if conv == '%' {
            out.push('%');
            continue;
        }
        let value = match &key {
            Some(key) => {
                used_mapping = true;
                let Some(map) = &mapping else {
                    return raise(ExcKind::TypeError, "format requires a mapping");
                };
                let lookup = Value::str(key);
                let found = map.borrow().get(&lookup.hash_key()?).cloned();
                found.ok_or_else(|| Interrupt::key_error(&lookup))?
            }
            None => take(&mut next)?,
        };
        let piece = match conv {
            's' => format_str(&value.to_str(), &spec, '>')?,
            'r' => format_str(&value.repr(), &spec, '>')?,
            'a' => format_str(&ascii_repr(&value), &spec, '>')?,
            'd' | 'i' | 'u' => {
                let i = match &value {
                    Value::Float(f) => float_to_i64(*f)?,
                    other => other.as_int().ok_or_else(|| {
                        Interrupt::new(
                            ExcKind::TypeError,
                            format!(
                                "%{conv} format: a real number is required, not {}",
                                other.type_name()
                            ),
                        )
                    })?,
                };
                spec.kind = Some('d');
                format_int(i, &spec, "int")?
            }
            'x' | 'X' | 'o' => {
                let i = value.as_int().ok_or_else(|| {
                    Interrupt::new(
                        ExcKind::TypeError,
                        format!(
                            "%{conv} format: an integer is required, not {}",
                            value.type_name()
                        ),
                    )
                })?;
                spec.kind = Some(conv);
                format_int(i, &spec, "int")?
            }
            'c' => match &value {
                Value::Str(s) if s.chars().count() == 1 => format_str(s, &spec, '>')?,
                other => {
                    spec.kind = Some('c');
                    let i = other.as_int().ok_or_else(|| {
                        Interrupt::new(ExcKind::TypeError, "%c requires int or char")
                    })?;
                    format_int(i, &spec, "int")?
                }
            },
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
                let f = value.as_f64().ok_or_else(|| {
                    Interrupt::new(
                        ExcKind::TypeError,
                        format!(
                            "must be real number, not {}",
                            value.type_name()
                        ),
                    )
                })?;
                spec.kind = Some(conv);
                format_float(f, &spec)?
            }
            other => {
                return raise(
                    ExcKind::ValueError,
                    format!("unsupported format character '{other}'"),
                )
            }
        };
        out.push_str(&piece);
    }
    if !used_mapping && next < positional.len() {
        return raise(
            ExcKind::TypeError,
            "not all arguments converted during string formatting",
        );
    }
    Ok(out)
}

//! Tokenizer for macro scripts.
//!
//! Produces a flat token stream with explicit `Newline`, `Indent` and
//! `Dedent` tokens, so the parser never has to look at whitespace. Newlines
//! inside brackets are implicit line continuations.

use super::SyntaxError;

/// Multi-character operators come first so the longest match wins.
const OPERATORS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "...", "**", "//", "<<", ">>", "<=", ">=", "==", "!=", "->", "+=",
    "-=", "*=", "/=", "%=", "&=", "|=", "^=", ":=", "@=", "+", "-", "*", "/", "%", "@", "&", "|",
    "^", "~", "<", ">", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";", "=",
];

/// A token with the line it started on.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// Token payload.
    pub kind: TokenKind,
    /// 1-based source line.
    pub line: u32,
}

/// Token payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier or keyword.
    Name(String),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// String literal with escapes resolved.
    Str(String),
    /// f-string split into literal and field pieces.
    FStr(Vec<FStrPiece>),
    /// Operator or delimiter.
    Op(&'static str),
    /// End of a logical line.
    Newline,
    /// Indentation increased.
    Indent,
    /// Indentation decreased.
    Dedent,
    /// End of input.
    Eof,
}

/// Raw pieces of an f-string; field sources are parsed later.
#[derive(Debug, Clone, PartialEq)]
pub enum FStrPiece {
    /// Literal text.
    Lit(String),
    /// A replacement field.
    Field {
        /// Expression source text.
        source: String,
        /// `!r`, `!s` or `!a`.
        conversion: Option<char>,
        /// Text after `:`.
        spec: Option<String>,
    },
}

const INCONSISTENT_INDENT: &str = "inconsistent use of tabs and spaces in indentation";

/// Tokenize a whole script.
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    /// Lines of the currently open brackets, innermost last.
    brackets: Vec<u32>,
    /// Indentation levels as (tabs to 8 columns, tabs as 1 column).
    indents: Vec<(usize, usize)>,
    tokens: Vec<Token>,
    at_line_start: bool,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            brackets: Vec::new(),
            indents: vec![(0, 0)],
            tokens: Vec::new(),
            at_line_start: true,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.line, message)
    }

    fn push(&mut self, kind: TokenKind, line: u32) {
        self.tokens.push(Token { kind, line });
    }

    fn last_is_newline(&self) -> bool {
        matches!(
            self.tokens.last().map(|t| &t.kind),
            None | Some(TokenKind::Newline) | Some(TokenKind::Indent) | Some(TokenKind::Dedent)
        )
    }

    fn run(mut self) -> Result<Vec<Token>, SyntaxError> {
        loop {
            if self.at_line_start && self.brackets.is_empty() {
                self.at_line_start = false;
                if self.indentation()? {
                    continue;
                }
            }
            let Some(c) = self.peek() else {
                break;
            };
            match c {
                ' ' | '\t' | '\x0c' | '\r' => self.pos += 1,
                '\n' => {
                    self.pos += 1;
                    if self.brackets.is_empty() {
                        if !self.last_is_newline() {
                            self.push(TokenKind::Newline, self.line);
                        }
                        self.at_line_start = true;
                    }
                    self.line += 1;
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                '\\' => {
                    let next = self.peek_at(1);
                    let after = self.peek_at(2);
                    if next == Some('\n') {
                        self.pos += 2;
                    } else if next == Some('\r') && after == Some('\n') {
                        self.pos += 3;
                    } else {
                        return Err(self.error("unexpected character after line continuation character"));
                    }
                    self.line += 1;
                }
                '"' | '\'' => self.string(false, false)?,
                c if c.is_ascii_digit() => self.number()?,
                '.' if self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) => self.number()?,
                c if is_ident_start(c) => self.name()?,
                _ => self.operator()?,
            }
        }

        if let Some(&line) = self.brackets.last() {
            return Err(SyntaxError::new(line, "unexpected end of input: unclosed bracket"));
        }
        if !self.last_is_newline() {
            self.push(TokenKind::Newline, self.line);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(TokenKind::Dedent, self.line);
        }
        self.push(TokenKind::Eof, self.line);
        Ok(self.tokens)
    }

    /// Measure the indentation of a new line. Returns `true` when the line
    /// was blank or comment-only and has been consumed entirely.
    fn indentation(&mut self) -> Result<bool, SyntaxError> {
        let mut col = 0usize;
        let mut alt = 0usize;
        while let Some(c) = self.peek() {
            match c {
                ' ' => {
                    col += 1;
                    alt += 1;
                }
                '\t' => {
                    col = (col / 8 + 1) * 8;
                    alt += 1;
                }
                '\x0c' => {
                    col = 0;
                    alt = 0;
                }
                _ => break,
            }
            self.pos += 1;
        }

        match self.peek() {
            None => return Ok(false),
            Some('\n') | Some('\r') | Some('#') => {
                while let Some(c) = self.peek() {
                    self.pos += 1;
                    if c == '\n' {
                        self.line += 1;
                        break;
                    }
                }
                self.at_line_start = true;
                return Ok(true);
            }
            Some(_) => {}
        }

        // A line must compare the same way against the enclosing level
        // whatever width a tab is given.
        let (current, current_alt) = self.indents.last().copied().unwrap_or((0, 0));
        if col > current {
            if alt <= current_alt {
                return Err(self.error(INCONSISTENT_INDENT));
            }
            self.indents.push((col, alt));
            self.push(TokenKind::Indent, self.line);
        } else if col < current {
            while self.indents.last().is_some_and(|&(level, _)| level > col) {
                self.indents.pop();
                self.push(TokenKind::Dedent, self.line);
            }
            match self.indents.last().copied() {
                Some((level, level_alt)) if level == col => {
                    if level_alt != alt {
                        return Err(self.error(INCONSISTENT_INDENT));
                    }
                }
                _ => return Err(self.error("unindent does not match any outer indentation level")),
            }
        } else if alt != current_alt {
            return Err(self.error(INCONSISTENT_INDENT));
        }
        Ok(false)
    }

    fn name(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();

        if matches!(self.peek(), Some('"') | Some('\'')) {
            let prefix = name.to_ascii_lowercase();
            match prefix.as_str() {
                "r" => return self.string(true, false),
                "f" => return self.string(false, true),
                "rf" | "fr" => return self.string(true, true),
                "u" => return self.string(false, false),
                "b" | "rb" | "br" => return Err(self.error("bytes literals are not supported")),
                _ => {}
            }
        }

        self.push(TokenKind::Name(name), self.line);
        Ok(())
    }

    fn number(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        let line = self.line;

        if self.peek() == Some('0') {
            let radix = match self.peek_at(1) {
                Some('x') | Some('X') => Some(16),
                Some('o') | Some('O') => Some(8),
                Some('b') | Some('B') => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.pos += 2;
                let digits_start = self.pos;
                while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
                    self.pos += 1;
                }
                let digits: String = self.chars[digits_start..self.pos]
                    .iter()
                    .filter(|&&c| c != '_')
                    .collect();
                let value = i64::from_str_radix(&digits, radix)
                    .map_err(|e| self.error(format!("invalid integer literal: {e}")))?;
                self.push(TokenKind::Int(value), line);
                return Ok(());
            }
        }

        let mut is_float = false;
        self.digits();
        if self.peek() == Some('.') {
            is_float = true;
            self.pos += 1;
            self.digits();
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let sign = matches!(self.peek_at(1), Some('+') | Some('-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += digit_at;
                self.digits();
            }
        }
        if matches!(self.peek(), Some('j') | Some('J')) {
            return Err(self.error("complex literals are not supported"));
        }
        if self.peek().is_some_and(is_ident_start) {
            return Err(self.error("invalid decimal literal"));
        }

        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|&&c| c != '_')
            .collect();
        let kind = if is_float {
            TokenKind::Float(
                text.parse::<f64>()
                    .map_err(|e| self.error(format!("invalid float literal: {e}")))?,
            )
        } else {
            TokenKind::Int(
                text.parse::<i64>()
                    .map_err(|_| self.error("integer literal is too large"))?,
            )
        };
        self.push(kind, line);
        Ok(())
    }

    fn digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.pos += 1;
        }
    }

    fn string(&mut self, raw: bool, fstring: bool) -> Result<(), SyntaxError> {
        let Some(quote) = self.peek() else {
            return Err(self.error("expected string literal"));
        };
        let line = self.line;
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut body = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(SyntaxError::new(line, "unterminated string literal"));
            };
            if c == '\\' {
                body.push(c);
                self.pos += 1;
                if let Some(next) = self.peek() {
                    body.push(next);
                    self.pos += 1;
                    if next == '\n' {
                        self.line += 1;
                    }
                }
                continue;
            }
            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }
            if c == '\n' {
                if !triple {
                    return Err(SyntaxError::new(line, "unterminated string literal"));
                }
                self.line += 1;
            }
            body.push(c);
            self.pos += 1;
        }

        let kind = if fstring {
            TokenKind::FStr(split_fstring(&body, raw, line)?)
        } else if raw {
            TokenKind::Str(body)
        } else {
            TokenKind::Str(unescape(&body, line)?)
        };
        self.push(kind, line);
        Ok(())
    }

    fn operator(&mut self) -> Result<(), SyntaxError> {
        for op in OPERATORS {
            let len = op.chars().count();
            let matches = op
                .chars()
                .enumerate()
                .all(|(i, c)| self.peek_at(i) == Some(c));
            if !matches {
                continue;
            }
            match *op {
                "(" | "[" | "{" => self.brackets.push(self.line),
                ")" | "]" | "}" => {
                    self.brackets.pop();
                }
                _ => {}
            }
            self.pos += len;
            self.push(TokenKind::Op(op), self.line);
            return Ok(());
        }
        let c = self.peek().unwrap_or('\0');
        Err(self.error(format!("invalid character '{c}'")))
    }
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// Resolve backslash escapes in a non-raw string body.
pub(crate) fn unescape(body: &str, line: u32) -> Result<String, SyntaxError> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(esc) = chars.next() else {
            out.push('\\');
            break;
        };
        match esc {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            '0'..='7' => {
                let mut value = esc.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(value).unwrap_or('\u{fffd}'));
            }
            'x' | 'u' | 'U' => {
                let width = match esc {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let mut value = 0u32;
                for _ in 0..width {
                    let digit = chars
                        .next()
                        .and_then(|c| c.to_digit(16))
                        .ok_or_else(|| SyntaxError::new(line, format!("truncated \\{esc} escape")))?;
                    value = value * 16 + digit;
                }
                let ch = char::from_u32(value).ok_or_else(|| {
                    SyntaxError::new(line, format!("invalid unicode escape \\{esc}{value:x}"))
                })?;
                out.push(ch);
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Ok(out)
}

/// Split an f-string body into literal text and replacement fields.
fn split_fstring(body: &str, raw: bool, line: u32) -> Result<Vec<FStrPiece>, SyntaxError> {
    let chars: Vec<char> = body.chars().collect();
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    let flush = |literal: &mut String, pieces: &mut Vec<FStrPiece>| -> Result<(), SyntaxError> {
        if !literal.is_empty() {
            let text = if raw {
                std::mem::take(literal)
            } else {
                let text = unescape(literal, line)?;
                literal.clear();
                text
            };
            pieces.push(FStrPiece::Lit(text));
        }
        Ok(())
    };

    while i < chars.len() {
        let c = chars[i];
        if c == '}' {
            if chars.get(i + 1) == Some(&'}') {
                literal.push('}');
                i += 2;
                continue;
            }
            return Err(SyntaxError::new(line, "f-string: single '}' is not allowed"));
        }
        if c != '{' {
            literal.push(c);
            i += 1;
            continue;
        }
        if chars.get(i + 1) == Some(&'{') {
            literal.push('{');
            i += 2;
            continue;
        }

        flush(&mut literal, &mut pieces)?;
        i += 1;
        let start = i;
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        while i < chars.len() {
            let c = chars[i];
            if let Some(q) = quote {
                if c == q {
                    quote = None;
                }
                i += 1;
                continue;
            }
            match c {
                '\'' | '"' => quote = Some(c),
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' if depth > 0 => depth -= 1,
                '}' => break,
                '!' if depth == 0 && chars.get(i + 1) != Some(&'=') => break,
                ':' if depth == 0 => break,
                _ => {}
            }
            i += 1;
        }
        let source: String = chars[start..i].iter().collect();
        if source.trim().is_empty() {
            return Err(SyntaxError::new(line, "f-string: empty expression not allowed"));
        }

        let mut conversion = None;
        if chars.get(i) == Some(&'!') {
            match chars.get(i + 1) {
                Some(&c @ ('r' | 's' | 'a')) => conversion = Some(c),
                _ => {
                    return Err(SyntaxError::new(
                        line,
                        "f-string: invalid conversion character: expected 's', 'r', or 'a'",
                    ))
                }
            }
            i += 2;
        }

        let mut spec = None;
        if chars.get(i) == Some(&':') {
            i += 1;
            let spec_start = i;
            while i < chars.len() && chars[i] != '}' {
                if chars[i] == '{' {
                    return Err(SyntaxError::new(
                        line,
                        "f-string: nested replacement fields in format specs are not supported",
                    ));
                }
                i += 1;
            }
            spec = Some(chars[spec_start..i].iter().collect());
        }

        if chars.get(i) != Some(&'}') {
            return Err(SyntaxError::new(line, "f-string: expecting '}'"));
        }
        i += 1;
        pieces.push(FStrPiece::Field {
            source,
            conversion,
            spec,
        });
    }
    flush(&mut literal, &mut pieces)?;
    Ok(pieces)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn simple_assignment() {
        assert_eq!(
            kinds("x = 2 + 2\n"),
            vec![
                TokenKind::Name("x".into()),
                TokenKind::Op("="),
                TokenKind::Int(2),
                TokenKind::Op("+"),
                TokenKind::Int(2),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn indentation_produces_indent_and_dedent() {
        let k = kinds("if x:\n    y = 1\nz = 2");
        assert!(k.contains(&TokenKind::Indent));
        assert!(k.contains(&TokenKind::Dedent));
        let indent = k.iter().position(|t| *t == TokenKind::Indent).unwrap();
        let dedent = k.iter().position(|t| *t == TokenKind::Dedent).unwrap();
        assert!(indent < dedent);
    }

    #[test]
    fn blank_and_comment_lines_are_ignored() {
        let k = kinds("x = 1\n\n   # comment\n\ny = 2\n");
        let newlines = k.iter().filter(|t| **t == TokenKind::Newline).count();
        assert_eq!(newlines, 2);
        assert!(!k.contains(&TokenKind::Indent));
    }

    #[test]
    fn newlines_inside_brackets_are_joined() {
        let k = kinds("x = [1,\n     2]\n");
        let newlines = k.iter().filter(|t| **t == TokenKind::Newline).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn line_numbers_are_tracked() {
        let tokens = tokenize("a = 1\nb = 2\n\nc = 3").unwrap();
        let c = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Name("c".into()))
            .unwrap();
        assert_eq!(c.line, 4);
    }

    #[test]
    fn numbers() {
        assert_eq!(kinds("0x1F")[0], TokenKind::Int(31));
        assert_eq!(kinds("0b101")[0], TokenKind::Int(5));
        assert_eq!(kinds("1_000")[0], TokenKind::Int(1000));
        assert_eq!(kinds("2.5")[0], TokenKind::Float(2.5));
        assert_eq!(kinds(".5")[0], TokenKind::Float(0.5));
        assert_eq!(kinds("1e3")[0], TokenKind::Float(1000.0));
    }

    #[test]
    fn integer_overflow_is_an_error() {
        assert!(tokenize("99999999999999999999").is_err());
    }

    #[test]
    fn string_escapes() {
        assert_eq!(kinds(r#""a\tb\n""#)[0], TokenKind::Str("a\tb\n".into()));
        assert_eq!(kinds(r#"'it\'s'"#)[0], TokenKind::Str("it's".into()));
        assert_eq!(kinds(r#""\x41\u00e9""#)[0], TokenKind::Str("Aé".into()));
        assert_eq!(kinds(r#"r"\d+""#)[0], TokenKind::Str("\\d+".into()));
    }

    #[test]
    fn triple_quoted_string_spans_lines() {
        let tokens = tokenize("s = \"\"\"one\ntwo\"\"\"\nx = 1").unwrap();
        assert_eq!(tokens[2].kind, TokenKind::Str("one\ntwo".into()));
        let x = tokens
            .iter()
            .find(|t| t.kind == TokenKind::Name("x".into()))
            .unwrap();
        assert_eq!(x.line, 3);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let err = tokenize("s = 'abc\n").unwrap_err();
        assert!(err.message.contains("unterminated"));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn fstring_pieces() {
        let k = kinds(r#"f"v={x:.2f} {{lit}} {y!r}""#);
        assert_eq!(
            k[0],
            TokenKind::FStr(vec![
                FStrPiece::Lit("v=".into()),
                FStrPiece::Field {
                    source: "x".into(),
                    conversion: None,
                    spec: Some(".2f".into()),
                },
                FStrPiece::Lit(" {lit} ".into()),
                FStrPiece::Field {
                    source: "y".into(),
                    conversion: Some('r'),
                    spec: None,
                },
            ])
        );
    }

    #[test]
    fn fstring_field_with_nested_brackets_and_comparison() {
        let k = kinds(r#"f"{d['k']} {a != b}""#);
        match &k[0] {
            TokenKind::FStr(pieces) => {
                assert_eq!(
                    pieces[0],
                    FStrPiece::Field {
                        source: "d['k']".into(),
                        conversion: None,
                        spec: None
                    }
                );
                assert_eq!(
                    pieces[2],
                    FStrPiece::Field {
                        source: "a != b".into(),
                        conversion: None,
                        spec: None
                    }
                );
            }
            other => panic!("expected f-string, got {other:?}"),
        }
    }

    #[test]
    fn fstring_errors() {
        assert!(tokenize(r#"f"{}""#).is_err());
        assert!(tokenize(r#"f"a } b""#).is_err());
        assert!(tokenize(r#"f"{x""#).is_err());
    }

    #[test]
    fn bad_dedent_is_an_error() {
        let err = tokenize("if x:\n        a = 1\n    b = 2\n").unwrap_err();
        assert!(err.message.contains("unindent"));
    }

    #[test]
    fn unclosed_bracket_reports_opening_line() {
        let err = tokenize("def broken(:\n    pass").unwrap_err();
        assert_eq!(err.line, 1);
        assert!(err.message.contains("unclosed bracket"));

        let err = tokenize("x = (1,\n").unwrap_err();
        assert_eq!(err.line, 1);

        let err = tokenize("x = [\n  1,\n  f(2,\n").unwrap_err();
        assert_eq!(err.line, 3);
    }

    #[test]
    fn mixed_tabs_and_spaces_are_rejected() {
        let err = tokenize("if True:\n\tx = 1\n        y = 2\n").unwrap_err();
        assert!(err.message.contains("inconsistent use of tabs"), "{err:?}");
        assert_eq!(err.line, 3);

        assert!(tokenize("if True:\n\tx = 1\n\ty = 2\n").is_ok());
        assert!(tokenize("if a:\n\tif b:\n\t\tx = 1\n\ty = 2\n").is_ok());
    }

    #[test]
    fn invalid_character_is_an_error() {
        let err = tokenize("x = 1 $ 2").unwrap_err();
        assert!(err.message.contains('$'));
    }

    #[test]
    fn bytes_literal_is_rejected() {
        assert!(tokenize("b'abc'").is_err());
    }
}

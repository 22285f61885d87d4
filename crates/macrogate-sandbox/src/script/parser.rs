//! Recursive-descent parser for macro scripts.

use std::collections::HashSet;
use std::rc::Rc;

use super::ast::*;
use super::lexer::{tokenize, FStrPiece, Token, TokenKind};
use super::{is_keyword, SyntaxError};

/// Recursion guard for nested expressions and blocks.
const MAX_PARSE_DEPTH: usize = 200;

/// Parse a whole script.
pub fn parse(source: &str) -> Result<Program, SyntaxError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    parser.program()
}

/// Parse a single expression, reporting lines relative to `line`.
fn parse_fstring_field(source: &str, line: u32) -> Result<Expr, SyntaxError> {
    let mut tokens = tokenize(source.trim())?;
    for token in &mut tokens {
        token.line += line - 1;
    }
    let mut parser = Parser::new(tokens);
    let expr = parser.testlist()?;
    parser.skip_newlines();
    if !matches!(parser.peek(), TokenKind::Eof) {
        return Err(parser.error("f-string: invalid expression"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    loops: usize,
    functions: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            loops: 0,
            functions: 0,
        }
    }

    // --- Token utilities ---

    fn peek(&self) -> &TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        self.tokens
            .get(self.pos + offset)
            .or_else(|| self.tokens.last())
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn line(&self) -> u32 {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.line(), message)
    }

    fn unexpected(&self) -> SyntaxError {
        let found = match self.peek() {
            TokenKind::Name(n) => format!("'{n}'"),
            TokenKind::Int(i) => i.to_string(),
            TokenKind::Float(f) => f.to_string(),
            TokenKind::Str(_) | TokenKind::FStr(_) => "string literal".into(),
            TokenKind::Op(op) => format!("'{op}'"),
            TokenKind::Newline => "end of line".into(),
            TokenKind::Indent => "indent".into(),
            TokenKind::Dedent => "dedent".into(),
            TokenKind::Eof => "end of input".into(),
        };
        self.error(format!("invalid syntax: unexpected {found}"))
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(self.peek(), TokenKind::Op(o) if *o == op)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.is_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), SyntaxError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{op}'")))
        }
    }

    fn is_kw(&self, kw: &str) -> bool {
        matches!(self.peek(), TokenKind::Name(n) if n == kw)
    }

    fn is_kw_at(&self, offset: usize, kw: &str) -> bool {
        matches!(self.peek_at(offset), TokenKind::Name(n) if n == kw)
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.is_kw(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_kw(&mut self, kw: &str) -> Result<(), SyntaxError> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{kw}'")))
        }
    }

    fn expect_name(&mut self) -> Result<String, SyntaxError> {
        match self.peek() {
            TokenKind::Name(n) if !is_keyword(n) => {
                let name = n.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected()),
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), TokenKind::Newline) {
            self.pos += 1;
        }
    }

    fn at_line_end(&self) -> bool {
        matches!(self.peek(), TokenKind::Newline | TokenKind::Eof) || self.is_op(";")
    }

    fn enter(&mut self) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > MAX_PARSE_DEPTH {
            return Err(self.error("too many nested expressions or blocks"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // --- Statements ---

    fn program(&mut self) -> Result<Program, SyntaxError> {
        let mut body = Vec::new();
        self.skip_newlines();
        while !matches!(self.peek(), TokenKind::Eof) {
            body.extend(self.statement()?);
            self.skip_newlines();
        }
        Ok(Program { body })
    }

    fn statement(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let line = self.line();
        let keyword = match self.peek() {
            TokenKind::Name(n) => Some(n.clone()),
            TokenKind::Indent => return Err(self.error("unexpected indent")),
            TokenKind::Op("@") => return Err(self.error("decorators are not supported")),
            _ => None,
        };
        let compound = match keyword.as_deref() {
            Some("if") => Some(self.if_stmt()?),
            Some("while") => Some(self.while_stmt()?),
            Some("for") => Some(self.for_stmt()?),
            Some("def") => Some(self.def_stmt()?),
            Some("try") => Some(self.try_stmt()?),
            Some(kw @ ("class" | "with" | "async" | "await" | "yield" | "nonlocal")) => {
                return Err(self.error(format!("'{kw}' is not supported in macro scripts")));
            }
            _ => None,
        };
        if let Some(kind) = compound {
            return Ok(vec![Stmt { line, kind }]);
        }
        self.simple_line()
    }

    fn simple_line(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let mut stmts = Vec::new();
        loop {
            let line = self.line();
            let kind = self.small_stmt()?;
            stmts.push(Stmt { line, kind });
            if self.eat_op(";") {
                if matches!(self.peek(), TokenKind::Newline | TokenKind::Eof) {
                    break;
                }
                continue;
            }
            break;
        }
        match self.peek() {
            TokenKind::Newline => {
                self.pos += 1;
                Ok(stmts)
            }
            TokenKind::Eof => Ok(stmts),
            _ => Err(self.unexpected()),
        }
    }

    fn block(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.expect_op(":")?;
        self.enter()?;
        let body = if matches!(self.peek(), TokenKind::Newline) {
            self.pos += 1;
            if !matches!(self.peek(), TokenKind::Indent) {
                return Err(self.error("expected an indented block"));
            }
            self.pos += 1;
            let mut body = Vec::new();
            loop {
                self.skip_newlines();
                match self.peek() {
                    TokenKind::Dedent => {
                        self.pos += 1;
                        break;
                    }
                    TokenKind::Eof => break,
                    _ => body.extend(self.statement()?),
                }
            }
            body
        } else {
            self.simple_line()?
        };
        self.leave();
        Ok(body)
    }

    fn if_stmt(&mut self) -> Result<StmtKind, SyntaxError> {
        // Called with `if` or `elif` as the current token.
        self.pos += 1;
        let test = self.named_test()?;
        let body = self.block()?;
        let orelse = if self.is_kw("elif") {
            let line = self.line();
            let kind = self.if_stmt()?;
            vec![Stmt { line, kind }]
        } else if self.eat_kw("else") {
            self.block()?
        } else {
            Vec::new()
        };
        Ok(StmtKind::If { test, body, orelse })
    }

    fn while_stmt(&mut self) -> Result<StmtKind, SyntaxError> {
        self.expect_kw("while")?;
        let test = self.named_test()?;
        let body = self.loop_body()?;
        let orelse = if self.eat_kw("else") {
            self.block()?
        } else {
            Vec::new()
        };
        Ok(StmtKind::While { test, body, orelse })
    }

    fn for_stmt(&mut self) -> Result<StmtKind, SyntaxError> {
        self.expect_kw("for")?;
        let target = self.target_list()?;
        self.expect_kw("in")?;
        let iter = self.testlist()?;
        let body = self.loop_body()?;
        let orelse = if self.eat_kw("else") {
            self.block()?
        } else {
            Vec::new()
        };
        Ok(StmtKind::For {
            target,
            iter,
            body,
            orelse,
        })
    }

    fn loop_body(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.loops += 1;
        let body = self.block();
        self.loops -= 1;
        body
    }

    fn def_stmt(&mut self) -> Result<StmtKind, SyntaxError> {
        let line = self.line();
        self.expect_kw("def")?;
        let name = self.expect_name()?;
        self.expect_op("(")?;
        let params = self.params(")")?;
        self.expect_op(")")?;
        if self.eat_op("->") {
            self.test()?;
        }
        let outer_loops = std::mem::replace(&mut self.loops, 0);
        self.functions += 1;
        let body = self.block();
        self.functions -= 1;
        self.loops = outer_loops;
        let body = body?;
        Ok(StmtKind::FunctionDef(Rc::new(FunctionDef {
            line,
            name,
            params,
            body,
        })))
    }

    fn params(&mut self, end: &str) -> Result<Params, SyntaxError> {
        let mut params = Params::default();
        let mut seen = HashSet::new();
        let mut keyword_only = false;
        let mut saw_default = false;

        while !self.is_op(end) {
            if self.eat_op("**") {
                let name = self.expect_name()?;
                self.annotation(end)?;
                if !seen.insert(name.clone()) {
                    return Err(self.error(format!("duplicate argument '{name}'")));
                }
                params.kwarg = Some(name);
                self.eat_op(",");
                if !self.is_op(end) {
                    return Err(self.error("arguments cannot follow var-keyword argument"));
                }
                break;
            }
            if self.eat_op("*") {
                if keyword_only {
                    return Err(self.error("* argument may appear only once"));
                }
                keyword_only = true;
                if !self.is_op(",") && !self.is_op(end) {
                    let name = self.expect_name()?;
                    self.annotation(end)?;
                    if !seen.insert(name.clone()) {
                        return Err(self.error(format!("duplicate argument '{name}'")));
                    }
                    params.vararg = Some(name);
                }
            } else {
                let name = self.expect_name()?;
                self.annotation(end)?;
                if !seen.insert(name.clone()) {
                    return Err(self.error(format!("duplicate argument '{name}'")));
                }
                let default = if self.eat_op("=") {
                    Some(self.test()?)
                } else {
                    None
                };
                if keyword_only {
                    params.kwonly.push(Param { name, default });
                } else {
                    if default.is_some() {
                        saw_default = true;
                    } else if saw_default {
                        return Err(self.error("non-default argument follows default argument"));
                    }
                    params.args.push(Param { name, default });
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(params)
    }

    /// Skip a `: type` annotation in a `def` parameter list.
    fn annotation(&mut self, end: &str) -> Result<(), SyntaxError> {
        if end == ")" && self.eat_op(":") {
            self.test()?;
        }
        Ok(())
    }

    fn try_stmt(&mut self) -> Result<StmtKind, SyntaxError> {
        self.expect_kw("try")?;
        let body = self.block()?;
        let mut handlers = Vec::new();
        while self.is_kw("except") {
            let line = self.line();
            self.pos += 1;
            let (kind, name) = if self.is_op(":") {
                (None, None)
            } else {
                let kind = self.test()?;
                let name = if self.eat_kw("as") {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                (Some(kind), name)
            };
            let handler_body = self.block()?;
            handlers.push(ExceptHandler {
                line,
                kind,
                name,
                body: handler_body,
            });
        }
        let orelse = if !handlers.is_empty() && self.eat_kw("else") {
            self.block()?
        } else {
            Vec::new()
        };
        let finalbody = if self.eat_kw("finally") {
            self.block()?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.error("expected 'except' or 'finally' block"));
        }
        Ok(StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        })
    }

    fn small_stmt(&mut self) -> Result<StmtKind, SyntaxError> {
        let keyword = match self.peek() {
            TokenKind::Name(n) => Some(n.clone()),
            _ => None,
        };
        match keyword.as_deref() {
            Some("pass") => {
                self.pos += 1;
                Ok(StmtKind::Pass)
            }
            Some("break") => {
                if self.loops == 0 {
                    return Err(self.error("'break' outside loop"));
                }
                self.pos += 1;
                Ok(StmtKind::Break)
            }
            Some("continue") => {
                if self.loops == 0 {
                    return Err(self.error("'continue' not properly in loop"));
                }
                self.pos += 1;
                Ok(StmtKind::Continue)
            }
            Some("return") => {
                if self.functions == 0 {
                    return Err(self.error("'return' outside function"));
                }
                self.pos += 1;
                if self.at_line_end() {
                    Ok(StmtKind::Return(None))
                } else {
                    Ok(StmtKind::Return(Some(self.testlist_star()?)))
                }
            }
            Some("raise") => {
                self.pos += 1;
                if self.at_line_end() {
                    return Ok(StmtKind::Raise(None));
                }
                let exc = self.test()?;
                if self.is_kw("from") {
                    return Err(self.error("'raise ... from' is not supported in macro scripts"));
                }
                Ok(StmtKind::Raise(Some(exc)))
            }
            Some("global") => {
                self.pos += 1;
                let mut names = vec![self.expect_name()?];
                while self.eat_op(",") {
                    names.push(self.expect_name()?);
                }
                Ok(StmtKind::Global(names))
            }
            Some("del") => {
                self.pos += 1;
                let mut targets = Vec::new();
                loop {
                    let target = self.binary(1)?;
                    check_delete_target(&target)?;
                    targets.push(target);
                    if !self.eat_op(",") || self.at_line_end() {
                        break;
                    }
                }
                Ok(StmtKind::Delete(targets))
            }
            Some("assert") => {
                self.pos += 1;
                let test = self.test()?;
                let msg = if self.eat_op(",") {
                    Some(self.test()?)
                } else {
                    None
                };
                Ok(StmtKind::Assert { test, msg })
            }
            Some("import") => {
                self.pos += 1;
                let mut aliases = Vec::new();
                loop {
                    let name = self.dotted_name()?;
                    let asname = if self.eat_kw("as") {
                        Some(self.expect_name()?)
                    } else {
                        None
                    };
                    aliases.push(Alias { name, asname });
                    if !self.eat_op(",") {
                        break;
                    }
                }
                Ok(StmtKind::Import(aliases))
            }
            Some("from") => self.from_import(),
            Some(kw @ ("class" | "with" | "async" | "await" | "yield" | "nonlocal")) => {
                Err(self.error(format!("'{kw}' is not supported in macro scripts")))
            }
            _ => self.expr_stmt(),
        }
    }

    fn dotted_name(&mut self) -> Result<String, SyntaxError> {
        let mut name = self.expect_name()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn from_import(&mut self) -> Result<StmtKind, SyntaxError> {
        self.expect_kw("from")?;
        let mut module = String::new();
        loop {
            if self.eat_op(".") {
                module.push('.');
            } else if self.eat_op("...") {
                module.push_str("...");
            } else {
                break;
            }
        }
        if !self.is_kw("import") {
            module.push_str(&self.dotted_name()?);
        }
        self.expect_kw("import")?;

        if self.eat_op("*") {
            return Ok(StmtKind::ImportFrom {
                module,
                names: Vec::new(),
                star: true,
            });
        }

        let parenthesized = self.eat_op("(");
        let mut names = Vec::new();
        loop {
            let name = self.expect_name()?;
            let asname = if self.eat_kw("as") {
                Some(self.expect_name()?)
            } else {
                None
            };
            names.push(Alias { name, asname });
            if !self.eat_op(",") {
                break;
            }
            if parenthesized && self.is_op(")") {
                break;
            }
        }
        if parenthesized {
            self.expect_op(")")?;
        }
        Ok(StmtKind::ImportFrom {
            module,
            names,
            star: false,
        })
    }

    fn expr_stmt(&mut self) -> Result<StmtKind, SyntaxError> {
        let first = self.testlist_star()?;

        if let Some(op) = self.aug_op() {
            match first.kind {
                ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => {}
                _ => return Err(self.error("illegal expression for augmented assignment")),
            }
            self.pos += 1;
            let value = self.testlist()?;
            return Ok(StmtKind::AugAssign {
                target: first,
                op,
                value,
            });
        }

        if !self.is_op("=") {
            if let ExprKind::Starred(_) = first.kind {
                return Err(self.error("can't use starred expression here"));
            }
            return Ok(StmtKind::Expr(first));
        }

        let mut exprs = vec![first];
        while self.eat_op("=") {
            exprs.push(self.testlist_star()?);
        }
        let value = exprs.pop().ok_or_else(|| self.error("expected value"))?;
        for target in &exprs {
            check_target(target)?;
        }
        Ok(StmtKind::Assign {
            targets: exprs,
            value,
        })
    }

    fn aug_op(&self) -> Option<BinOp> {
        let TokenKind::Op(op) = self.peek() else {
            return None;
        };
        Some(match *op {
            "+=" => BinOp::Add,
            "-=" => BinOp::Sub,
            "*=" => BinOp::Mul,
            "/=" => BinOp::Div,
            "//=" => BinOp::FloorDiv,
            "%=" => BinOp::Mod,
            "**=" => BinOp::Pow,
            "<<=" => BinOp::LShift,
            ">>=" => BinOp::RShift,
            "|=" => BinOp::BitOr,
            "^=" => BinOp::BitXor,
            "&=" => BinOp::BitAnd,
            _ => return None,
        })
    }

    // --- Expressions ---

    /// A comma-separated list of tests; more than one becomes a tuple.
    fn testlist(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.line();
        let first = self.test()?;
        if !self.is_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.ends_tuple() {
                break;
            }
            items.push(self.test()?);
        }
        Ok(Expr::new(line, ExprKind::Tuple(items)))
    }

    /// Like `testlist`, also allowing `*starred` items.
    fn testlist_star(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.line();
        let first = self.star_or_test()?;
        if !self.is_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.ends_tuple() {
                break;
            }
            items.push(self.star_or_test()?);
        }
        Ok(Expr::new(line, ExprKind::Tuple(items)))
    }

    fn ends_tuple(&self) -> bool {
        self.at_line_end()
            || self.is_op("=")
            || self.is_op(")")
            || self.is_op("]")
            || self.is_op("}")
            || self.is_op(":")
            || self.aug_op().is_some()
    }

    fn star_or_test(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.line();
        if self.eat_op("*") {
            let inner = self.binary(1)?;
            return Ok(Expr::new(line, ExprKind::Starred(Box::new(inner))));
        }
        self.test()
    }

    /// Loop targets: `x`, `k, v`, `(a, b)`.
    fn target_list(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.line();
        let first = self.star_target()?;
        if !self.is_op(",") {
            check_target(&first)?;
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.is_kw("in") || self.is_op("=") {
                break;
            }
            items.push(self.star_target()?);
        }
        let target = Expr::new(line, ExprKind::Tuple(items));
        check_target(&target)?;
        Ok(target)
    }

    fn star_target(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.line();
        if self.eat_op("*") {
            let inner = self.binary(1)?;
            return Ok(Expr::new(line, ExprKind::Starred(Box::new(inner))));
        }
        self.binary(1)
    }

    fn named_test(&mut self) -> Result<Expr, SyntaxError> {
        let expr = self.test()?;
        if self.is_op(":=") {
            return Err(self.error("assignment expressions are not supported"));
        }
        Ok(expr)
    }

    fn test(&mut self) -> Result<Expr, SyntaxError> {
        self.enter()?;
        let result = self.test_inner();
        self.leave();
        result
    }

    fn test_inner(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.line();
        if self.is_kw("lambda") {
            return self.lambda();
        }
        let body = self.or_test()?;
        if self.is_kw("if") {
            self.pos += 1;
            let test = self.or_test()?;
            self.expect_kw("else")?;
            let orelse = self.test()?;
            return Ok(Expr::new(
                line,
                ExprKind::IfExp {
                    test: Box::new(test),
                    body: Box::new(body),
                    orelse: Box::new(orelse),
                },
            ));
        }
        if self.is_op(":=") {
            return Err(self.error("assignment expressions are not supported"));
        }
        Ok(body)
    }

    fn lambda(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.line();
        self.expect_kw("lambda")?;
        let params = self.params(":")?;
        self.expect_op(":")?;
        let body_line = self.line();
        let value = self.test()?;
        let def = FunctionDef {
            line,
            name: "<lambda>".into(),
            params,
            body: vec![Stmt {
                line: body_line,
                kind: StmtKind::Return(Some(value)),
            }],
        };
        Ok(Expr::new(line, ExprKind::Lambda(Rc::new(def))))
    }

    fn or_test(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.and_test()?;
        while self.is_kw("or") {
            let line = self.line();
            self.pos += 1;
            let right = self.and_test()?;
            left = Expr::new(
                line,
                ExprKind::BoolOp {
                    op: BoolOp::Or,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn and_test(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.not_test()?;
        while self.is_kw("and") {
            let line = self.line();
            self.pos += 1;
            let right = self.not_test()?;
            left = Expr::new(
                line,
                ExprKind::BoolOp {
                    op: BoolOp::And,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            );
        }
        Ok(left)
    }

    fn not_test(&mut self) -> Result<Expr, SyntaxError> {
        if self.is_kw("not") {
            let line = self.line();
            self.pos += 1;
            self.enter()?;
            let operand = self.not_test()?;
            self.leave();
            return Ok(Expr::new(
                line,
                ExprKind::UnaryOp {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
            ));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.line();
        let left = self.binary(1)?;
        let mut ops = Vec::new();
        while let Some(op) = self.comp_op() {
            let right = self.binary(1)?;
            ops.push((op, right));
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::new(
            line,
            ExprKind::Compare {
                left: Box::new(left),
                ops,
            },
        ))
    }

    /// Consume a comparison operator if one is next.
    fn comp_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek() {
            TokenKind::Op("==") => CmpOp::Eq,
            TokenKind::Op("!=") => CmpOp::NotEq,
            TokenKind::Op("<") => CmpOp::Lt,
            TokenKind::Op("<=") => CmpOp::LtE,
            TokenKind::Op(">") => CmpOp::Gt,
            TokenKind::Op(">=") => CmpOp::GtE,
            TokenKind::Name(n) if n == "in" => CmpOp::In,
            TokenKind::Name(n) if n == "not" && self.is_kw_at(1, "in") => {
                self.pos += 2;
                return Some(CmpOp::NotIn);
            }
            TokenKind::Name(n) if n == "is" => {
                if self.is_kw_at(1, "not") {
                    self.pos += 2;
                    return Some(CmpOp::IsNot);
                }
                CmpOp::Is
            }
            _ => return None,
        };
        self.pos += 1;
        Some(op)
    }

    fn binop_info(&self) -> Option<(BinOp, u8)> {
        let TokenKind::Op(op) = self.peek() else {
            return None;
        };
        Some(match *op {
            "|" => (BinOp::BitOr, 1),
            "^" => (BinOp::BitXor, 2),
            "&" => (BinOp::BitAnd, 3),
            "<<" => (BinOp::LShift, 4),
            ">>" => (BinOp::RShift, 4),
            "+" => (BinOp::Add, 5),
            "-" => (BinOp::Sub, 5),
            "*" => (BinOp::Mul, 6),
            "/" => (BinOp::Div, 6),
            "//" => (BinOp::FloorDiv, 6),
            "%" => (BinOp::Mod, 6),
            _ => return None,
        })
    }

    /// Precedence climbing over the binary arithmetic and bitwise operators.
    fn binary(&mut self, min_prec: u8) -> Result<Expr, SyntaxError> {
        let mut left = self.unary()?;
        while let Some((op, prec)) = self.binop_info() {
            if prec < min_prec {
                break;
            }
            let line = self.line();
            self.pos += 1;
            let right = self.binary(prec + 1)?;
            left = Expr::new(
                line,
                ExprKind::BinOp {
                    left: Box::new(left),
                    op,
                    right: Box::new(right),
                },
            );
        }
        if self.is_op("@") {
            return Err(self.error("the '@' operator is not supported"));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.line();
        let op = match self.peek() {
            TokenKind::Op("-") => UnaryOp::Neg,
            TokenKind::Op("+") => UnaryOp::Pos,
            TokenKind::Op("~") => UnaryOp::Invert,
            _ => return self.power(),
        };
        self.pos += 1;
        self.enter()?;
        let operand = self.unary()?;
        self.leave();

        // Negated numeric literals become constants.
        if op == UnaryOp::Neg {
            match operand.kind {
                ExprKind::Const(Const::Int(i)) if i != i64::MIN => {
                    return Ok(Expr::new(line, ExprKind::Const(Const::Int(-i))));
                }
                ExprKind::Const(Const::Float(f)) => {
                    return Ok(Expr::new(line, ExprKind::Const(Const::Float(-f))));
                }
                _ => {}
            }
        }
        Ok(Expr::new(
            line,
            ExprKind::UnaryOp {
                op,
                operand: Box::new(operand),
            },
        ))
    }

    fn power(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.line();
        let base = self.postfix()?;
        if self.eat_op("**") {
            self.enter()?;
            let exponent = self.unary()?;
            self.leave();
            return Ok(Expr::new(
                line,
                ExprKind::BinOp {
                    left: Box::new(base),
                    op: BinOp::Pow,
                    right: Box::new(exponent),
                },
            ));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.atom()?;
        loop {
            let line = self.line();
            if self.eat_op("(") {
                let args = self.call_args()?;
                self.expect_op(")")?;
                expr = Expr::new(
                    line,
                    ExprKind::Call {
                        func: Box::new(expr),
                        args,
                    },
                );
            } else if self.eat_op("[") {
                let index = self.subscript()?;
                self.expect_op("]")?;
                expr = Expr::new(
                    line,
                    ExprKind::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                    },
                );
            } else if self.eat_op(".") {
                let attr = self.expect_name()?;
                expr = Expr::new(
                    line,
                    ExprKind::Attribute {
                        value: Box::new(expr),
                        attr,
                    },
                );
            } else {
                return Ok(expr);
            }
        }
    }

    fn call_args(&mut self) -> Result<Vec<Arg>, SyntaxError> {
        let mut args = Vec::new();
        let mut saw_keyword = false;
        while !self.is_op(")") {
            if self.eat_op("**") {
                args.push(Arg::DoubleStar(self.test()?));
                saw_keyword = true;
            } else if self.eat_op("*") {
                args.push(Arg::Star(self.test()?));
            } else if matches!(self.peek(), TokenKind::Name(_))
                && matches!(self.peek_at(1), TokenKind::Op("="))
            {
                let name = self.expect_name()?;
                self.pos += 1;
                args.push(Arg::Keyword(name, self.test()?));
                saw_keyword = true;
            } else {
                let line = self.line();
                let value = self.test()?;
                if self.is_kw("for") {
                    let generators = self.comprehension()?;
                    let genexp = Expr::new(
                        line,
                        ExprKind::GeneratorExp {
                            elt: Box::new(value),
                            generators,
                        },
                    );
                    if !args.is_empty() || !self.is_op(")") {
                        return Err(self.error(
                            "generator expression must be parenthesized when not the sole argument",
                        ));
                    }
                    args.push(Arg::Positional(genexp));
                    break;
                }
                if saw_keyword {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                args.push(Arg::Positional(value));
            }
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(args)
    }

    fn subscript(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.line();
        let first = self.slice_item()?;
        if !self.is_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.is_op("]") {
                break;
            }
            items.push(self.slice_item()?);
        }
        Ok(Expr::new(line, ExprKind::Tuple(items)))
    }

    fn slice_item(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.line();
        let lower = if self.is_op(":") {
            None
        } else {
            let expr = self.test()?;
            if !self.is_op(":") {
                return Ok(expr);
            }
            Some(Box::new(expr))
        };
        self.expect_op(":")?;
        let upper = if self.is_op(":") || self.is_op("]") || self.is_op(",") {
            None
        } else {
            Some(Box::new(self.test()?))
        };
        let step = if self.eat_op(":") {
            if self.is_op("]") || self.is_op(",") {
                None
            } else {
                Some(Box::new(self.test()?))
            }
        } else {
            None
        };
        Ok(Expr::new(line, ExprKind::Slice { lower, upper, step }))
    }

    fn comprehension(&mut self) -> Result<Vec<Comprehension>, SyntaxError> {
        let mut generators = Vec::new();
        while self.eat_kw("for") {
            let target = self.target_list()?;
            self.expect_kw("in")?;
            let iter = self.or_test()?;
            let mut ifs = Vec::new();
            while self.eat_kw("if") {
                ifs.push(self.or_test()?);
            }
            generators.push(Comprehension { target, iter, ifs });
        }
        Ok(generators)
    }

    fn atom(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.line();
        match self.peek().clone() {
            TokenKind::Op("(") => {
                self.pos += 1;
                self.enter()?;
                let expr = self.paren_body(line)?;
                self.leave();
                self.expect_op(")")?;
                Ok(expr)
            }
            TokenKind::Op("[") => {
                self.pos += 1;
                self.enter()?;
                let expr = self.list_body(line)?;
                self.leave();
                self.expect_op("]")?;
                Ok(expr)
            }
            TokenKind::Op("{") => {
                self.pos += 1;
                self.enter()?;
                let expr = self.dict_body(line)?;
                self.leave();
                self.expect_op("}")?;
                Ok(expr)
            }
            TokenKind::Op("...") => Err(self.error("'...' is not supported in macro scripts")),
            TokenKind::Name(name) => {
                self.pos += 1;
                let kind = match name.as_str() {
                    "True" => ExprKind::Const(Const::Bool(true)),
                    "False" => ExprKind::Const(Const::Bool(false)),
                    "None" => ExprKind::Const(Const::None),
                    "yield" | "await" => {
                        return Err(SyntaxError::new(
                            line,
                            format!("'{name}' is not supported in macro scripts"),
                        ))
                    }
                    n if is_keyword(n) => {
                        self.pos -= 1;
                        return Err(self.unexpected());
                    }
                    _ => ExprKind::Name(name),
                };
                Ok(Expr::new(line, kind))
            }
            TokenKind::Int(i) => {
                self.pos += 1;
                Ok(Expr::new(line, ExprKind::Const(Const::Int(i))))
            }
            TokenKind::Float(f) => {
                self.pos += 1;
                Ok(Expr::new(line, ExprKind::Const(Const::Float(f))))
            }
            TokenKind::Str(_) | TokenKind::FStr(_) => self.strings(line),
            _ => Err(self.unexpected()),
        }
    }

    /// Adjacent string literals concatenate; any f-string makes the whole
    /// run an f-string.
    fn strings(&mut self, line: u32) -> Result<Expr, SyntaxError> {
        let mut parts: Vec<FStringPart> = Vec::new();
        let mut is_fstring = false;
        loop {
            match self.peek().clone() {
                TokenKind::Str(s) => {
                    self.pos += 1;
                    push_literal(&mut parts, s);
                }
                TokenKind::FStr(pieces) => {
                    let token_line = self.line();
                    self.pos += 1;
                    is_fstring = true;
                    for piece in pieces {
                        match piece {
                            FStrPiece::Lit(text) => push_literal(&mut parts, text),
                            FStrPiece::Field {
                                source,
                                conversion,
                                spec,
                            } => {
                                let expr = parse_fstring_field(&source, token_line)?;
                                parts.push(FStringPart::Field {
                                    expr: Box::new(expr),
                                    conversion,
                                    spec,
                                });
                            }
                        }
                    }
                }
                _ => break,
            }
        }

        if is_fstring {
            return Ok(Expr::new(line, ExprKind::FString(parts)));
        }
        let text = match parts.pop() {
            Some(FStringPart::Literal(text)) => text,
            _ => String::new(),
        };
        Ok(Expr::new(line, ExprKind::Const(Const::Str(text))))
    }

    fn paren_body(&mut self, line: u32) -> Result<Expr, SyntaxError> {
        if self.is_op(")") {
            return Ok(Expr::new(line, ExprKind::Tuple(Vec::new())));
        }
        let first = self.star_or_test()?;
        if self.is_kw("for") {
            let generators = self.comprehension()?;
            return Ok(Expr::new(
                line,
                ExprKind::GeneratorExp {
                    elt: Box::new(first),
                    generators,
                },
            ));
        }
        if !self.is_op(",") {
            if let ExprKind::Starred(_) = first.kind {
                return Err(self.error("can't use starred expression here"));
            }
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.is_op(")") {
                break;
            }
            items.push(self.star_or_test()?);
        }
        Ok(Expr::new(line, ExprKind::Tuple(items)))
    }

    fn list_body(&mut self, line: u32) -> Result<Expr, SyntaxError> {
        if self.is_op("]") {
            return Ok(Expr::new(line, ExprKind::List(Vec::new())));
        }
        let first = self.star_or_test()?;
        if self.is_kw("for") {
            let generators = self.comprehension()?;
            return Ok(Expr::new(
                line,
                ExprKind::ListComp {
                    elt: Box::new(first),
                    generators,
                },
            ));
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.is_op("]") {
                break;
            }
            items.push(self.star_or_test()?);
        }
        Ok(Expr::new(line, ExprKind::List(items)))
    }

    fn dict_body(&mut self, line: u32) -> Result<Expr, SyntaxError> {
        let mut items: Vec<(Option<Expr>, Expr)> = Vec::new();
        if self.is_op("}") {
            return Ok(Expr::new(line, ExprKind::Dict(items)));
        }
        loop {
            if self.eat_op("**") {
                items.push((None, self.binary(1)?));
            } else {
                let key = self.test()?;
                if !self.eat_op(":") {
                    return Err(self.error("set literals are not supported in macro scripts"));
                }
                let value = self.test()?;
                if items.is_empty() && self.is_kw("for") {
                    let generators = self.comprehension()?;
                    return Ok(Expr::new(
                        line,
                        ExprKind::DictComp {
                            key: Box::new(key),
                            value: Box::new(value),
                            generators,
                        },
                    ));
                }
                items.push((Some(key), value));
            }
            if !self.eat_op(",") || self.is_op("}") {
                break;
            }
        }
        Ok(Expr::new(line, ExprKind::Dict(items)))
    }
}

fn push_literal(parts: &mut Vec<FStringPart>, text: String) {
    if let Some(FStringPart::Literal(existing)) = parts.last_mut() {
        existing.push_str(&text);
    } else {
        parts.push(FStringPart::Literal(text));
    }
}

/// Validate an assignment or loop target.
fn check_target(expr: &Expr) -> Result<(), SyntaxError> {
    match &expr.kind {
        ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => Ok(()),
        ExprKind::Tuple(items) | ExprKind::List(items) => {
            let starred = items
                .iter()
                .filter(|e| matches!(e.kind, ExprKind::Starred(_)))
                .count();
            if starred > 1 {
                return Err(SyntaxError::new(
                    expr.line,
                    "multiple starred expressions in assignment",
                ));
            }
            items.iter().try_for_each(check_target)
        }
        ExprKind::Starred(inner) => match inner.kind {
            ExprKind::Starred(_) => Err(SyntaxError::new(expr.line, "invalid starred target")),
            _ => check_target(inner),
        },
        other => Err(SyntaxError::new(
            expr.line,
            format!("cannot assign to {}", describe(other)),
        )),
    }
}

fn check_delete_target(expr: &Expr) -> Result<(), SyntaxError> {
    match &expr.kind {
        ExprKind::Name(_) | ExprKind::Attribute { .. } | ExprKind::Subscript { .. } => Ok(()),
        ExprKind::Tuple(items) | ExprKind::List(items) => {
            items.iter().try_for_each(check_delete_target)
        }
        other => Err(SyntaxError::new(
            expr.line,
            format!("cannot delete {}", describe(other)),
        )),
    }
}

fn describe(kind: &ExprKind) -> &'static str {
    match kind {
        ExprKind::Const(_) => "literal",
        ExprKind::FString(_) => "f-string expression",
        ExprKind::Call { .. } => "function call",
        ExprKind::BinOp { .. } | ExprKind::UnaryOp { .. } => "expression",
        ExprKind::BoolOp { .. } => "boolean expression",
        ExprKind::Compare { .. } => "comparison",
        ExprKind::IfExp { .. } => "conditional expression",
        ExprKind::Lambda(_) => "lambda",
        ExprKind::ListComp { .. } => "list comprehension",
        ExprKind::DictComp { .. } => "dict comprehension",
        ExprKind::GeneratorExp { .. } => "generator expression",
        ExprKind::Dict(_) => "dict literal",
        _ => "expression",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Program {
        match parse(source) {
            Ok(program) => program,
            Err(e) => panic!("failed to parse {source:?}: {e}"),
        }
    }

    fn single_expr(source: &str) -> Expr {
        let program = parse_ok(source);
        match program.body.into_iter().next().map(|s| s.kind) {
            Some(StmtKind::Expr(e)) => e,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn precedence_of_arithmetic() {
        let expr = single_expr("1 + 2 * 3");
        match expr.kind {
            ExprKind::BinOp {
                op: BinOp::Add,
                right,
                ..
            } => assert!(matches!(right.kind, ExprKind::BinOp { op: BinOp::Mul, .. })),
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn power_binds_tighter_than_unary_minus() {
        let expr = single_expr("-2 ** 2");
        assert!(matches!(
            expr.kind,
            ExprKind::UnaryOp {
                op: UnaryOp::Neg,
                ..
            }
        ));
    }

    #[test]
    fn chained_comparison() {
        let expr = single_expr("a < b <= c not in d");
        match expr.kind {
            ExprKind::Compare { ops, .. } => {
                let ops: Vec<CmpOp> = ops.into_iter().map(|(op, _)| op).collect();
                assert_eq!(ops, vec![CmpOp::Lt, CmpOp::LtE, CmpOp::NotIn]);
            }
            other => panic!("unexpected tree {other:?}"),
        }
    }

    #[test]
    fn assignment_forms() {
        let program = parse_ok("a = b = 1\nx, *rest = items\nd['k'] += 2\nobj.attr = 3");
        assert_eq!(program.body.len(), 4);
        match &program.body[0].kind {
            StmtKind::Assign { targets, .. } => assert_eq!(targets.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            program.body[2].kind,
            StmtKind::AugAssign { op: BinOp::Add, .. }
        ));
    }

    #[test]
    fn invalid_targets_are_rejected() {
        assert!(parse("f() = 1").is_err());
        assert!(parse("1 = x").is_err());
        assert!(parse("a, *b, *c = x").is_err());
        assert!(parse("f() += 1").is_err());
    }

    #[test]
    fn function_definition_with_all_parameter_kinds() {
        let program = parse_ok("def f(a, b=2, *args, c, d=4, **kw):\n    return a\n");
        match &program.body[0].kind {
            StmtKind::FunctionDef(def) => {
                assert_eq!(def.name, "f");
                let names: Vec<&str> = def.params.names().collect();
                assert_eq!(names, vec!["a", "b", "args", "c", "d", "kw"]);
                assert_eq!(def.params.defaults().count(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn default_ordering_is_enforced() {
        assert!(parse("def f(a=1, b):\n    pass").is_err());
        assert!(parse("def f(a, a):\n    pass").is_err());
    }

    #[test]
    fn if_elif_else_nests() {
        let program = parse_ok("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
        match &program.body[0].kind {
            StmtKind::If { orelse, .. } => {
                assert_eq!(orelse.len(), 1);
                assert!(matches!(orelse[0].kind, StmtKind::If { .. }));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn try_statement_parts() {
        let source = "try:\n    x = 1\nexcept (ValueError, KeyError) as e:\n    pass\nexcept:\n    pass\nelse:\n    y = 2\nfinally:\n    z = 3\n";
        match &parse_ok(source).body[0].kind {
            StmtKind::Try {
                handlers,
                orelse,
                finalbody,
                ..
            } => {
                assert_eq!(handlers.len(), 2);
                assert_eq!(handlers[0].name.as_deref(), Some("e"));
                assert!(handlers[1].kind.is_none());
                assert_eq!(orelse.len(), 1);
                assert_eq!(finalbody.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bare_try_is_rejected() {
        assert!(parse("try:\n    pass\nx = 1").is_err());
    }

    #[test]
    fn imports() {
        let program = parse_ok("import os.path as p, math\nfrom FreeCAD import Vector as V, Placement\nfrom math import *\nfrom . import sibling");
        match &program.body[0].kind {
            StmtKind::Import(aliases) => {
                assert_eq!(aliases[0].name, "os.path");
                assert_eq!(aliases[0].bound_name(), "p");
                assert_eq!(aliases[1].bound_name(), "math");
            }
            other => panic!("unexpected {other:?}"),
        }
        match &program.body[1].kind {
            StmtKind::ImportFrom { module, names, star } => {
                assert_eq!(module, "FreeCAD");
                assert_eq!(names.len(), 2);
                assert!(!star);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            &program.body[2].kind,
            StmtKind::ImportFrom { star: true, .. }
        ));
        match &program.body[3].kind {
            StmtKind::ImportFrom { module, .. } => assert_eq!(module, "."),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn dotted_import_binds_top_level_name() {
        let alias = Alias {
            name: "os.path".into(),
            asname: None,
        };
        assert_eq!(alias.bound_name(), "os");
    }

    #[test]
    fn comprehensions_and_generators() {
        assert!(matches!(
            single_expr("[x * 2 for x in xs if x > 1]").kind,
            ExprKind::ListComp { .. }
        ));
        assert!(matches!(
            single_expr("{k: v for k, v in pairs}").kind,
            ExprKind::DictComp { .. }
        ));
        match single_expr("sum(x for x in xs)").kind {
            ExprKind::Call { args, .. } => {
                assert!(matches!(
                    args[0],
                    Arg::Positional(Expr {
                        kind: ExprKind::GeneratorExp { .. },
                        ..
                    })
                ));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn call_argument_kinds() {
        match single_expr("f(1, *a, key=2, **kw)").kind {
            ExprKind::Call { args, .. } => {
                assert!(matches!(args[0], Arg::Positional(_)));
                assert!(matches!(args[1], Arg::Star(_)));
                assert!(matches!(args[2], Arg::Keyword(ref k, _) if k == "key"));
                assert!(matches!(args[3], Arg::DoubleStar(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse("f(a=1, 2)").is_err());
    }

    #[test]
    fn slices() {
        match single_expr("xs[1:-1:2]").kind {
            ExprKind::Subscript { index, .. } => match index.kind {
                ExprKind::Slice { lower, upper, step } => {
                    assert!(lower.is_some() && upper.is_some() && step.is_some())
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            single_expr("xs[:]").kind,
            ExprKind::Subscript { .. }
        ));
    }

    #[test]
    fn adjacent_strings_concatenate() {
        let expr = single_expr("'a' \"b\" '''c'''");
        assert_eq!(expr.kind, ExprKind::Const(Const::Str("abc".into())));
    }

    #[test]
    fn fstring_fields_are_parsed() {
        match single_expr("f'{a + 1:>4} and {b}'").kind {
            ExprKind::FString(parts) => {
                assert_eq!(parts.len(), 3);
                match &parts[0] {
                    FStringPart::Field { expr, spec, .. } => {
                        assert!(matches!(expr.kind, ExprKind::BinOp { .. }));
                        assert_eq!(spec.as_deref(), Some(">4"));
                    }
                    other => panic!("unexpected {other:?}"),
                }
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn fstring_field_line_follows_literal() {
        match single_expr("\n\nf'{x}'").kind {
            ExprKind::FString(parts) => match &parts[0] {
                FStringPart::Field { expr, .. } => assert_eq!(expr.line, 3),
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lambda_and_conditional() {
        assert!(matches!(
            single_expr("lambda x, y=1: x + y").kind,
            ExprKind::Lambda(_)
        ));
        assert!(matches!(
            single_expr("a if c else b").kind,
            ExprKind::IfExp { .. }
        ));
    }

    #[test]
    fn unsupported_constructs_are_syntax_errors() {
        for source in [
            "class A:\n    pass",
            "with open('f') as f:\n    pass",
            "def g():\n    yield 1",
            "@decorator\ndef f():\n    pass",
            "s = {1, 2}",
            "if (n := 10) > 5:\n    pass",
            "async def f():\n    pass",
            "x = ...",
        ] {
            assert!(parse(source).is_err(), "{source:?} should not parse");
        }
    }

    #[test]
    fn semicolons_and_single_line_blocks() {
        let program = parse_ok("a = 1; b = 2\nif a: c = 3\n");
        assert_eq!(program.body.len(), 3);
    }

    #[test]
    fn syntax_error_reports_line() {
        let err = parse("x = 1\ny = (2 +\n").unwrap_err();
        assert!(err.line >= 2, "line was {}", err.line);
        let err = parse("x = 1\n  y = 2\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("indent"));
    }

    #[test]
    fn deep_unary_chain_is_bounded() {
        let source = format!("x = {}1", "-".repeat(5000));
        let err = parse(&source).unwrap_err();
        assert!(err.message.contains("nested"));
    }

    #[test]
    fn negative_literals_fold() {
        assert_eq!(
            single_expr("-5").kind,
            ExprKind::Const(Const::Int(-5))
        );
    }

    #[test]
    fn control_flow_context_is_checked() {
        assert!(parse("break").unwrap_err().message.contains("outside loop"));
        assert!(parse("if x:\n    continue").is_err());
        assert!(parse("return 1").unwrap_err().message.contains("outside function"));
        assert!(parse("for i in x:\n    def f():\n        break").is_err());
        parse_ok("for i in x:\n    if i:\n        break\nelse:\n    pass");
        parse_ok("def f():\n    while True:\n        return 1");
    }
}

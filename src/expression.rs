//! Boolean/arithmetic expressions over string values.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! or       := and (OR and)*
//! and      := equality (AND equality)*
//! equality := relational ((== | !=) relational)*
//! relational := additive ((< | <= | > | >=) additive)*
//! additive := term ((+ | -) term)*
//! term     := unary ((* | / | %) unary)*
//! unary    := NOT unary | primary
//! primary  := ( or ) | FN_CALL ( [or (, or)*] ) | value value*
//! ```
//!
//! Every result is a string. Booleans are `"true"` or the empty string and
//! truthiness is non-emptiness. Adjacent values concatenate.
//!
//! Operator runs at one precedence level are kept flat, so tree height only
//! grows with nesting and is bounded by [`MAX_DEPTH`].

use std::{cmp::Ordering, collections::BTreeSet, collections::HashMap};

/// Maximum nesting of parentheses, `NOT` and function calls.
pub const MAX_DEPTH: usize = 100;

const TRUE: &str = "true";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("syntax error at byte {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("expression nested too deeply")]
    TooDeep,

    #[error("division by zero")]
    DivisionByZero,
}

fn syntax(position: usize, message: impl Into<String>) -> EvalError {
    EvalError::Syntax {
        position,
        message: message.into(),
    }
}

/// Field bindings visible while evaluating against one subject.
pub trait ExpressionContext {
    /// Value of a bare name; `None` evaluates to the empty value.
    fn lookup(&self, name: &str) -> Option<String>;

    /// Resolve a function the built-ins do not cover.
    fn call(&self, _name: &str, _args: &[String]) -> Option<String> {
        None
    }
}

impl ExpressionContext for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// A context with no bindings.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBindings;

impl ExpressionContext for NoBindings {
    fn lookup(&self, _name: &str) -> Option<String> {
        None
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Value(String),
    /// Bare word starting with a digit.
    Number(String),
    Name(String),
    FnCall(String),
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Mult,
    Div,
    Mod,
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    position: usize,
}

fn ends_word(c: char, numeric: bool) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            '(' | ')' | '<' | '>' | '=' | '!' | '&' | '|' | '+' | '*' | '/'
                | '%' | ','
        )
        || (numeric && c == '-')
}

fn lex(input: &str) -> Result<Vec<Spanned>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let two = input[pos..].get(..2).unwrap_or("");
        let token = match two {
            "&&" => Some(Token::And),
            "||" => Some(Token::Or),
            "==" => Some(Token::Eq),
            "!=" => Some(Token::Ne),
            "<=" => Some(Token::Le),
            ">=" => Some(Token::Ge),
            _ => None,
        };
        if let Some(token) = token {
            chars.next();
            chars.next();
            tokens.push(Spanned {
                token,
                position: pos,
            });
            continue;
        }

        let single = match c {
            '<' => Some(Token::Lt),
            '>' => Some(Token::Gt),
            '=' => Some(Token::Eq),
            '!' => Some(Token::Not),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Mult),
            '/' => Some(Token::Div),
            '%' => Some(Token::Mod),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            ',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(token) = single {
            chars.next();
            tokens.push(Spanned {
                token,
                position: pos,
            });
            continue;
        }

        if c == '"' || c == '\'' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            while let Some((_, ch)) = chars.next() {
                match ch {
                    '\\' => {
                        if let Some((_, escaped)) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    ch if ch == c => {
                        closed = true;
                        break;
                    }
                    ch => value.push(ch),
                }
            }
            if !closed {
                return Err(syntax(pos, "unterminated string"));
            }
            tokens.push(Spanned {
                token: Token::Value(value),
                position: pos,
            });
            continue;
        }

        if c == '&' || c == '|' {
            return Err(syntax(pos, format!("unexpected '{c}'")));
        }

        let numeric = c.is_ascii_digit();
        let mut end = pos;
        while let Some(&(i, ch)) = chars.peek() {
            if ends_word(ch, numeric) {
                break;
            }
            end = i + ch.len_utf8();
            chars.next();
        }
        let word = &input[pos..end];

        let token = if numeric {
            Token::Number(word.to_string())
        } else if word.eq_ignore_ascii_case("AND") {
            Token::And
        } else if word.eq_ignore_ascii_case("OR") {
            Token::Or
        } else if word.eq_ignore_ascii_case("NOT") {
            Token::Not
        } else if input[end..].starts_with('(') {
            Token::FnCall(word.to_string())
        } else {
            Token::Name(word.to_string())
        };
        tokens.push(Spanned {
            token,
            position: pos,
        });
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Literal(String),
    Number(String),
    Name(String),
    Concat(Vec<Expr>),
    Call { name: String, args: Vec<Expr> },
    Not(Box<Expr>),
    /// Left-associative run of operators of one precedence level.
    Chain {
        first: Box<Expr>,
        rest: Vec<(BinaryOp, Expr)>,
    },
}

struct Parser {
    tokens: Vec<Spanned>,
    index: usize,
    depth: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|s| &s.token)
    }

    fn position(&self) -> usize {
        self.tokens
            .get(self.index)
            .map_or(self.end, |s| s.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).map(|s| s.token.clone());
        self.index += 1;
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), EvalError> {
        if self.peek() == Some(&expected) {
            self.index += 1;
            Ok(())
        } else {
            Err(syntax(self.position(), format!("expected {what}")))
        }
    }

    fn enter(&mut self) -> Result<(), EvalError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(EvalError::TooDeep);
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn binary_chain(
        &mut self,
        next: fn(&mut Self) -> Result<Expr, EvalError>,
        op_for: fn(&Token) -> Option<BinaryOp>,
    ) -> Result<Expr, EvalError> {
        let first = next(self)?;
        let mut rest = Vec::new();
        while let Some(op) = self.peek().and_then(op_for) {
            self.index += 1;
            rest.push((op, next(self)?));
        }
        Ok(if rest.is_empty() {
            first
        } else {
            Expr::Chain {
                first: Box::new(first),
                rest,
            }
        })
    }

    fn or(&mut self) -> Result<Expr, EvalError> {
        self.binary_chain(Self::and, |t| {
            matches!(t, Token::Or).then_some(BinaryOp::Or)
        })
    }

    fn and(&mut self) -> Result<Expr, EvalError> {
        self.binary_chain(Self::equality, |t| {
            matches!(t, Token::And).then_some(BinaryOp::And)
        })
    }

    fn equality(&mut self) -> Result<Expr, EvalError> {
        self.binary_chain(Self::relational, |t| match t {
            Token::Eq => Some(BinaryOp::Eq),
            Token::Ne => Some(BinaryOp::Ne),
            _ => None,
        })
    }

    fn relational(&mut self) -> Result<Expr, EvalError> {
        self.binary_chain(Self::additive, |t| match t {
            Token::Lt => Some(BinaryOp::Lt),
            Token::Le => Some(BinaryOp::Le),
            Token::Gt => Some(BinaryOp::Gt),
            Token::Ge => Some(BinaryOp::Ge),
            _ => None,
        })
    }

    fn additive(&mut self) -> Result<Expr, EvalError> {
        self.binary_chain(Self::term, |t| match t {
            Token::Plus => Some(BinaryOp::Add),
            Token::Minus => Some(BinaryOp::Sub),
            _ => None,
        })
    }

    fn term(&mut self) -> Result<Expr, EvalError> {
        self.binary_chain(Self::unary, |t| match t {
            Token::Mult => Some(BinaryOp::Mul),
            Token::Div => Some(BinaryOp::Div),
            Token::Mod => Some(BinaryOp::Mod),
            _ => None,
        })
    }

    fn unary(&mut self) -> Result<Expr, EvalError> {
        if self.peek() == Some(&Token::Not) {
            self.index += 1;
            self.enter()?;
            let operand = self.unary()?;
            self.leave();
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, EvalError> {
        let position = self.position();
        match self.advance() {
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.or()?;
                self.expect(Token::RParen, "')'")?;
                self.leave();
                Ok(inner)
            }
            Some(Token::FnCall(name)) => {
                self.enter()?;
                self.expect(Token::LParen, "'('")?;
                let mut args = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    args.push(self.or()?);
                    while self.peek() == Some(&Token::Comma) {
                        self.index += 1;
                        args.push(self.or()?);
                    }
                }
                self.expect(Token::RParen, "')'")?;
                self.leave();
                Ok(Expr::Call { name, args })
            }
            Some(Token::Value(v)) => self.values(Expr::Literal(v)),
            Some(Token::Number(v)) => self.values(Expr::Number(v)),
            Some(Token::Name(n)) => self.values(Expr::Name(n)),
            Some(_) => Err(syntax(position, "expected a value")),
            None => Err(syntax(position, "unexpected end of expression")),
        }
    }

    fn values(&mut self, first: Expr) -> Result<Expr, EvalError> {
        let mut parts = vec![first];
        loop {
            match self.peek() {
                Some(Token::Value(v)) => {
                    parts.push(Expr::Literal(v.clone()));
                }
                Some(Token::Number(v)) => parts.push(Expr::Number(v.clone())),
                Some(Token::Name(n)) => parts.push(Expr::Name(n.clone())),
                _ => break,
            }
            self.index += 1;
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::Concat(parts)
        })
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn truthy(value: &str) -> bool {
    !value.is_empty()
}

fn boolean(b: bool) -> String {
    if b { TRUE.to_string() } else { String::new() }
}

fn strict_integer(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}

/// Leading-integer parse: optional sign then digits, `0` when there are
/// none, saturating on overflow.
pub fn to_integer(value: &str) -> i64 {
    let s = value.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut n: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        let d = i64::from(b - b'0');
        n = match n.checked_mul(10).and_then(|n| {
            if negative { n.checked_sub(d) } else { n.checked_add(d) }
        }) {
            Some(n) => n,
            None => return if negative { i64::MIN } else { i64::MAX },
        };
    }
    n
}

/// Ordering for `==`/`!=`: numeric when both sides are integers, an empty
/// value below any non-empty one, otherwise byte order.
fn compare_equality(a: &str, b: &str) -> Ordering {
    if let (Some(x), Some(y)) = (strict_integer(a), strict_integer(b)) {
        return x.cmp(&y);
    }
    match (a.is_empty(), b.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.cmp(b),
    }
}

fn compare_relational(a: &str, b: &str) -> Ordering {
    match (strict_integer(a), strict_integer(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => to_integer(a).cmp(&to_integer(b)),
    }
}

fn builtin(name: &str, args: &[String]) -> Option<String> {
    let value = match (name, args) {
        ("min", [a, b]) => to_integer(a).min(to_integer(b)).to_string(),
        ("max", [a, b]) => to_integer(a).max(to_integer(b)).to_string(),
        ("abs", [a]) => to_integer(a).saturating_abs().to_string(),
        ("len", [a]) => a.chars().count().to_string(),
        ("lower", [a]) => a.to_lowercase(),
        ("upper", [a]) => a.to_uppercase(),
        ("contains", [a, b]) => boolean(a.contains(b.as_str())),
        ("starts_with", [a, b]) => boolean(a.starts_with(b.as_str())),
        ("ends_with", [a, b]) => boolean(a.ends_with(b.as_str())),
        _ => return None,
    };
    Some(value)
}

fn eval(expr: &Expr, ctx: &dyn ExpressionContext) -> Result<String, EvalError> {
    Ok(match expr {
        Expr::Literal(v) | Expr::Number(v) => v.clone(),
        Expr::Name(n) => ctx.lookup(n).unwrap_or_default(),
        Expr::Concat(parts) => {
            let mut out = String::new();
            for part in parts {
                out.push_str(&eval(part, ctx)?);
            }
            out
        }
        Expr::Call { name, args } => {
            let args = args
                .iter()
                .map(|a| eval(a, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            ctx.call(name, &args)
                .or_else(|| builtin(name, &args))
                .unwrap_or_default()
        }
        Expr::Not(inner) => boolean(!truthy(&eval(inner, ctx)?)),
        Expr::Chain { first, rest } => {
            let mut acc = eval(first, ctx)?;
            for (op, rhs) in rest {
                acc = match op {
                    BinaryOp::Or if truthy(&acc) => return Ok(boolean(true)),
                    BinaryOp::And if !truthy(&acc) => return Ok(boolean(false)),
                    BinaryOp::Or | BinaryOp::And => {
                        boolean(truthy(&eval(rhs, ctx)?))
                    }
                    _ => apply(*op, &acc, &eval(rhs, ctx)?)?,
                };
            }
            acc
        }
    })
}

fn apply(op: BinaryOp, l: &str, r: &str) -> Result<String, EvalError> {
    let (x, y) = (to_integer(l), to_integer(r));
    Ok(match op {
        BinaryOp::Eq => boolean(compare_equality(l, r) == Ordering::Equal),
        BinaryOp::Ne => boolean(compare_equality(l, r) != Ordering::Equal),
        BinaryOp::Lt => boolean(compare_relational(l, r) == Ordering::Less),
        BinaryOp::Le => boolean(compare_relational(l, r) != Ordering::Greater),
        BinaryOp::Gt => boolean(compare_relational(l, r) == Ordering::Greater),
        BinaryOp::Ge => boolean(compare_relational(l, r) != Ordering::Less),
        BinaryOp::Add => x.wrapping_add(y).to_string(),
        BinaryOp::Sub => x.wrapping_sub(y).to_string(),
        BinaryOp::Mul => x.wrapping_mul(y).to_string(),
        BinaryOp::Div if y == 0 => return Err(EvalError::DivisionByZero),
        BinaryOp::Div => x.wrapping_div(y).to_string(),
        BinaryOp::Mod if y == 0 => return Err(EvalError::DivisionByZero),
        BinaryOp::Mod => x.wrapping_rem(y).to_string(),
        BinaryOp::Or => boolean(truthy(l) || truthy(r)),
        BinaryOp::And => boolean(truthy(l) && truthy(r)),
    })
}

fn collect_names<'a>(expr: &'a Expr, out: &mut BTreeSet<&'a str>) {
    match expr {
        Expr::Literal(_) | Expr::Number(_) => {}
        Expr::Name(n) => {
            out.insert(n);
        }
        Expr::Concat(parts) => parts.iter().for_each(|p| collect_names(p, out)),
        Expr::Call { args, .. } => {
            args.iter().for_each(|a| collect_names(a, out))
        }
        Expr::Not(inner) => collect_names(inner, out),
        Expr::Chain { first, rest } => {
            collect_names(first, out);
            rest.iter().for_each(|(_, e)| collect_names(e, out));
        }
    }
}

/// Rewrite bare numbers that stand alone as a predicate (the whole
/// expression, a `NOT` operand, an `AND`/`OR` operand) into names.
fn numbers_to_names(expr: Expr) -> Expr {
    match expr {
        Expr::Number(n) => Expr::Name(n),
        Expr::Not(inner) => Expr::Not(Box::new(numbers_to_names(*inner))),
        Expr::Chain { first, rest }
            if rest
                .iter()
                .all(|(op, _)| matches!(op, BinaryOp::Or | BinaryOp::And)) =>
        {
            Expr::Chain {
                first: Box::new(numbers_to_names(*first)),
                rest: rest
                    .into_iter()
                    .map(|(op, e)| (op, numbers_to_names(e)))
                    .collect(),
            }
        }
        other => other,
    }
}

/// A parsed expression, reusable across many evaluation contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    root: Expr,
}

impl Expression {
    pub fn parse(input: &str) -> Result<Self, EvalError> {
        let tokens = lex(input)?;
        if tokens.is_empty() {
            return Err(syntax(0, "empty expression"));
        }

        let mut parser = Parser {
            tokens,
            index: 0,
            depth: 0,
            end: input.len(),
        };
        let root = parser.or()?;
        if parser.index < parser.tokens.len() {
            return Err(syntax(parser.position(), "unexpected token"));
        }
        Ok(Self { root })
    }

    pub fn evaluate(
        &self,
        ctx: &dyn ExpressionContext,
    ) -> Result<String, EvalError> {
        eval(&self.root, ctx)
    }

    /// Treat bare numbers in predicate position as names, so `2005 OR x`
    /// looks up `2005` while `x > 2005` still compares against a number.
    pub fn numbers_as_names(self) -> Self {
        Self {
            root: numbers_to_names(self.root),
        }
    }

    /// Evaluate as a predicate. Evaluation failures count as false.
    pub fn matches(&self, ctx: &dyn ExpressionContext) -> bool {
        match self.evaluate(ctx) {
            Ok(value) => truthy(&value),
            Err(e) => {
                tracing::debug!(error = %e, "predicate failed");
                false
            }
        }
    }

    /// Every bare name the expression looks up.
    pub fn names(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        collect_names(&self.root, &mut out);
        out
    }
}

/// Parse and evaluate `input` in one step.
pub fn evaluate(
    input: &str,
    ctx: &dyn ExpressionContext,
) -> Result<String, EvalError> {
    Expression::parse(input)?.evaluate(ctx)
}

// File: ./src/model/filter.rs
// Compiles view filter expressions into reusable predicates over events.
//
// A lexer and recursive-descent parser turn the expression into an AST once;
// evaluation walks the AST against an `EventRecord` and never fails loudly:
// any evaluation error (type mismatch, division by zero) makes the predicate
// false so the event is simply excluded.
//
// Syntax (lowest to highest precedence):
//   a or b, a and b, not a
//   a == b, a != b, a < b, a <= b, a > b, a >= b
//   a ~= "regex", a in (x, y), a not in tags, "sub" in title
//   a + b, a - b, a * b, a / b, a % b, -a
//   fn(args), field, meta.nested, "text", 'text', 42, 1.5, true, false, null

use crate::error::EngineError;
use crate::model::event::EventRecord;
use regex::Regex;
use serde_json::Value;
use std::fmt;

// --- VALUES ---

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<FilterValue>),
}

impl FilterValue {
    pub fn is_truthy(&self) -> bool {
        match self {
            FilterValue::Null => false,
            FilterValue::Bool(b) => *b,
            FilterValue::Number(n) => *n != 0.0 && !n.is_nan(),
            FilterValue::Text(s) => !s.is_empty(),
            FilterValue::List(l) => !l.is_empty(),
        }
    }

    fn type_name(&self) -> &'static str {
        match self {
            FilterValue::Null => "null",
            FilterValue::Bool(_) => "boolean",
            FilterValue::Number(_) => "number",
            FilterValue::Text(_) => "string",
            FilterValue::List(_) => "list",
        }
    }
}

impl From<&Value> for FilterValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null | Value::Object(_) => FilterValue::Null,
            Value::Bool(b) => FilterValue::Bool(*b),
            Value::Number(n) => n.as_f64().map_or(FilterValue::Null, FilterValue::Number),
            Value::String(s) => FilterValue::Text(s.clone()),
            Value::Array(items) => FilterValue::List(items.iter().map(FilterValue::from).collect()),
        }
    }
}

type EvalResult = Result<FilterValue, String>;

// --- AST ---

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Function {
    Abs,
    Ceil,
    Floor,
    Round,
    Min,
    Max,
    Lower,
    Upper,
    Len,
    Exists,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Function::Abs,
            "ceil" => Function::Ceil,
            "floor" => Function::Floor,
            "round" => Function::Round,
            "min" => Function::Min,
            "max" => Function::Max,
            "lower" => Function::Lower,
            "upper" => Function::Upper,
            "len" => Function::Len,
            "exists" => Function::Exists,
            _ => return None,
        })
    }

    fn arity_ok(&self, n: usize) -> bool {
        match self {
            Function::Min | Function::Max => n >= 1,
            _ => n == 1,
        }
    }
}

#[derive(Debug, Clone)]
enum Expr {
    Literal(FilterValue),
    Field(Vec<String>),
    Tuple(Vec<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    In(Box<Expr>, Box<Expr>),
    Matches(Box<Expr>, Regex),
    Call(Function, Vec<Expr>),
}

fn as_number(v: &FilterValue) -> Result<f64, String> {
    match v {
        FilterValue::Number(n) => Ok(*n),
        other => Err(format!("expected a number, got {}", other.type_name())),
    }
}

fn as_text(v: &FilterValue) -> Result<&str, String> {
    match v {
        FilterValue::Text(s) => Ok(s),
        other => Err(format!("expected a string, got {}", other.type_name())),
    }
}

fn resolve_field(event: &EventRecord, path: &[String]) -> FilterValue {
    let Some((head, rest)) = path.split_first() else {
        return FilterValue::Null;
    };
    let Some(mut current) = event.lookup(head) else {
        return FilterValue::Null;
    };
    for segment in rest {
        let next = match &current {
            Value::Object(map) => map.get(segment).cloned(),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return FilterValue::Null,
        }
    }
    FilterValue::from(&current)
}

impl Expr {
    fn eval(&self, event: &EventRecord) -> EvalResult {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Field(path) => Ok(resolve_field(event, path)),
            Expr::Tuple(items) => items
                .iter()
                .map(|e| e.eval(event))
                .collect::<Result<Vec<_>, _>>()
                .map(FilterValue::List),
            Expr::Neg(e) => Ok(FilterValue::Number(-as_number(&e.eval(event)?)?)),
            Expr::Not(e) => Ok(FilterValue::Bool(!e.eval(event)?.is_truthy())),
            Expr::And(a, b) => {
                if !a.eval(event)?.is_truthy() {
                    return Ok(FilterValue::Bool(false));
                }
                Ok(FilterValue::Bool(b.eval(event)?.is_truthy()))
            }
            Expr::Or(a, b) => {
                if a.eval(event)?.is_truthy() {
                    return Ok(FilterValue::Bool(true));
                }
                Ok(FilterValue::Bool(b.eval(event)?.is_truthy()))
            }
            Expr::Binary(op, a, b) => binary(*op, a.eval(event)?, b.eval(event)?),
            Expr::In(needle, haystack) => {
                let needle = needle.eval(event)?;
                match haystack.eval(event)? {
                    FilterValue::List(items) => Ok(FilterValue::Bool(items.contains(&needle))),
                    FilterValue::Text(s) => Ok(FilterValue::Bool(s.contains(as_text(&needle)?))),
                    // A missing list field contains nothing
                    FilterValue::Null => Ok(FilterValue::Bool(false)),
                    other => Err(format!("cannot search in a {}", other.type_name())),
                }
            }
            Expr::Matches(e, re) => {
                let v = e.eval(event)?;
                match v {
                    FilterValue::Null => Ok(FilterValue::Bool(false)),
                    other => Ok(FilterValue::Bool(re.is_match(as_text(&other)?))),
                }
            }
            Expr::Call(func, args) => {
                let values = args
                    .iter()
                    .map(|e| e.eval(event))
                    .collect::<Result<Vec<_>, _>>()?;
                call(*func, &values)
            }
        }
    }
}

fn binary(op: BinaryOp, a: FilterValue, b: FilterValue) -> EvalResult {
    match op {
        BinaryOp::Eq => Ok(FilterValue::Bool(a == b)),
        BinaryOp::Ne => Ok(FilterValue::Bool(a != b)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = match (&a, &b) {
                (FilterValue::Number(x), FilterValue::Number(y)) => x.partial_cmp(y),
                (FilterValue::Text(x), FilterValue::Text(y)) => Some(x.cmp(y)),
                _ => None,
            }
            .ok_or_else(|| format!("cannot compare {} with {}", a.type_name(), b.type_name()))?;
            let ok = match op {
                BinaryOp::Lt => ord.is_lt(),
                BinaryOp::Le => ord.is_le(),
                BinaryOp::Gt => ord.is_gt(),
                _ => ord.is_ge(),
            };
            Ok(FilterValue::Bool(ok))
        }
        BinaryOp::Add => match (&a, &b) {
            (FilterValue::Text(x), FilterValue::Text(y)) => Ok(FilterValue::Text(format!("{x}{y}"))),
            _ => Ok(FilterValue::Number(as_number(&a)? + as_number(&b)?)),
        },
        BinaryOp::Sub => Ok(FilterValue::Number(as_number(&a)? - as_number(&b)?)),
        BinaryOp::Mul => Ok(FilterValue::Number(as_number(&a)? * as_number(&b)?)),
        BinaryOp::Div | BinaryOp::Rem => {
            let (x, y) = (as_number(&a)?, as_number(&b)?);
            if y == 0.0 {
                return Err("division by zero".to_string());
            }
            Ok(FilterValue::Number(if op == BinaryOp::Div { x / y } else { x % y }))
        }
    }
}

fn call(func: Function, args: &[FilterValue]) -> EvalResult {
    let first = args.first().ok_or_else(|| "missing argument".to_string())?;
    match func {
        Function::Abs => Ok(FilterValue::Number(as_number(first)?.abs())),
        Function::Ceil => Ok(FilterValue::Number(as_number(first)?.ceil())),
        Function::Floor => Ok(FilterValue::Number(as_number(first)?.floor())),
        Function::Round => Ok(FilterValue::Number(as_number(first)?.round())),
        Function::Min | Function::Max => {
            let mut best = as_number(first)?;
            for v in &args[1..] {
                let n = as_number(v)?;
                best = if func == Function::Min { best.min(n) } else { best.max(n) };
            }
            Ok(FilterValue::Number(best))
        }
        Function::Lower => Ok(FilterValue::Text(as_text(first)?.to_lowercase())),
        Function::Upper => Ok(FilterValue::Text(as_text(first)?.to_uppercase())),
        Function::Len => match first {
            FilterValue::Text(s) => Ok(FilterValue::Number(s.chars().count() as f64)),
            FilterValue::List(l) => Ok(FilterValue::Number(l.len() as f64)),
            FilterValue::Null => Ok(FilterValue::Number(0.0)),
            other => Err(format!("len() of a {}", other.type_name())),
        },
        Function::Exists => Ok(FilterValue::Bool(*first != FilterValue::Null)),
    }
}

// --- LEXER ---

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Text(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen);
                chars.next();
            }
            ',' => {
                tokens.push(Token::Comma);
                chars.next();
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some(c) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some('n') => text.push('\n'),
                            Some('t') => text.push('\t'),
                            Some(other) => text.push(other),
                            None => break,
                        },
                        c if c == quote => {
                            closed = true;
                            break;
                        }
                        c => text.push(c),
                    }
                }
                if !closed {
                    return Err("unterminated string literal".to_string());
                }
                tokens.push(Token::Text(text));
            }
            c if c.is_ascii_digit() => {
                let mut num = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n = num
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{}'", num))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' || d == '.' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            _ => {
                chars.next();
                let next = chars.peek().copied();
                let op = match (c, next) {
                    ('=', Some('=')) | ('!', Some('=')) | ('<', Some('=')) | ('>', Some('='))
                    | ('~', Some('=')) => {
                        chars.next();
                        match c {
                            '=' => "==",
                            '!' => "!=",
                            '<' => "<=",
                            '>' => ">=",
                            _ => "~=",
                        }
                    }
                    ('<', _) => "<",
                    ('>', _) => ">",
                    ('+', _) => "+",
                    ('-', _) => "-",
                    ('*', _) => "*",
                    ('/', _) => "/",
                    ('%', _) => "%",
                    _ => return Err(format!("unexpected character '{}'", c)),
                };
                tokens.push(Token::Op(op));
            }
        }
    }

    Ok(tokens)
}

// --- PARSER ---

/// Bounds the depth of the AST, and with it the recursion of `Expr::eval`.
const MAX_DEPTH: usize = 100;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn enter(&mut self) -> Result<(), String> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err("expression nested too deeply".to_string());
        }
        Ok(())
    }

    fn parse(&mut self) -> Result<Expr, String> {
        if self.tokens.is_empty() {
            return Err("empty expression".to_string());
        }
        let expr = self.parse_or()?;
        match self.peek() {
            None => Ok(expr),
            Some(t) => Err(format!("unexpected {:?}", t)),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(s)) if s == kw)
    }

    fn expect(&mut self, token: Token) -> Result<(), String> {
        if self.peek() == Some(&token) {
            self.advance();
            Ok(())
        } else {
            Err(format!("expected {:?}", token))
        }
    }

    // OR has lowest precedence
    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        let depth = self.depth;
        while self.is_keyword("or") {
            self.advance();
            self.enter()?;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_not()?;
        let depth = self.depth;
        while self.is_keyword("and") {
            self.advance();
            self.enter()?;
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, String> {
        if self.is_keyword("not") {
            self.advance();
            self.enter()?;
            let inner = self.parse_not()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let left = self.parse_additive()?;

        if self.is_keyword("in") {
            self.advance();
            let right = self.parse_additive()?;
            return Ok(Expr::In(Box::new(left), Box::new(right)));
        }
        if self.is_keyword("not") && matches!(self.peek_at(1), Some(Token::Ident(s)) if s == "in") {
            self.advance();
            self.advance();
            let right = self.parse_additive()?;
            return Ok(Expr::Not(Box::new(Expr::In(Box::new(left), Box::new(right)))));
        }

        let op = match self.peek() {
            Some(Token::Op("==")) => BinaryOp::Eq,
            Some(Token::Op("!=")) => BinaryOp::Ne,
            Some(Token::Op("<")) => BinaryOp::Lt,
            Some(Token::Op("<=")) => BinaryOp::Le,
            Some(Token::Op(">")) => BinaryOp::Gt,
            Some(Token::Op(">=")) => BinaryOp::Ge,
            Some(Token::Op("~=")) => {
                self.advance();
                // The pattern must be a literal so it is validated at compile time
                let pattern = match self.peek() {
                    Some(Token::Text(p)) => p.clone(),
                    _ => return Err("'~=' expects a quoted pattern".to_string()),
                };
                self.advance();
                let re = Regex::new(&pattern).map_err(|e| format!("invalid pattern: {}", e))?;
                return Ok(Expr::Matches(Box::new(left), re));
            }
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_additive()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_multiplicative()?;
        let depth = self.depth;
        loop {
            let op = match self.peek() {
                Some(Token::Op("+")) => BinaryOp::Add,
                Some(Token::Op("-")) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            self.enter()?;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;
        let depth = self.depth;
        loop {
            let op = match self.peek() {
                Some(Token::Op("*")) => BinaryOp::Mul,
                Some(Token::Op("/")) => BinaryOp::Div,
                Some(Token::Op("%")) => BinaryOp::Rem,
                _ => break,
            };
            self.advance();
            self.enter()?;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth = depth;
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        if let Some(Token::Op("-")) = self.peek() {
            self.advance();
            self.enter()?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        let token = self.peek().cloned().ok_or_else(|| "unexpected end of expression".to_string())?;
        self.advance();
        match token {
            Token::Number(n) => Ok(Expr::Literal(FilterValue::Number(n))),
            Token::Text(s) => Ok(Expr::Literal(FilterValue::Text(s))),
            Token::LParen => {
                self.enter()?;
                let first = self.parse_or()?;
                let expr = if let Some(Token::Comma) = self.peek() {
                    let mut items = vec![first];
                    while let Some(Token::Comma) = self.peek() {
                        self.advance();
                        items.push(self.parse_or()?);
                    }
                    Expr::Tuple(items)
                } else {
                    first
                };
                self.expect(Token::RParen)?;
                self.depth -= 1;
                Ok(expr)
            }
            Token::Ident(name) => match name.as_str() {
                "true" => Ok(Expr::Literal(FilterValue::Bool(true))),
                "false" => Ok(Expr::Literal(FilterValue::Bool(false))),
                "null" => Ok(Expr::Literal(FilterValue::Null)),
                "and" | "or" | "not" | "in" => Err(format!("unexpected keyword '{}'", name)),
                _ if self.peek() == Some(&Token::LParen) => {
                    let func = Function::from_name(&name)
                        .ok_or_else(|| format!("unknown function '{}'", name))?;
                    self.advance();
                    self.enter()?;
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        args.push(self.parse_or()?);
                        while let Some(Token::Comma) = self.peek() {
                            self.advance();
                            args.push(self.parse_or()?);
                        }
                    }
                    self.expect(Token::RParen)?;
                    self.depth -= 1;
                    if !func.arity_ok(args.len()) {
                        return Err(format!("wrong number of arguments to '{}'", name));
                    }
                    Ok(Expr::Call(func, args))
                }
                _ => {
                    let path: Vec<String> = name.split('.').map(str::to_string).collect();
                    if path.iter().any(|p| p.is_empty()) {
                        return Err(format!("invalid field name '{}'", name));
                    }
                    Ok(Expr::Field(path))
                }
            },
            other => Err(format!("unexpected {:?}", other)),
        }
    }
}

// --- PUBLIC API ---

/// A compiled filter expression.
#[derive(Debug, Clone)]
pub struct Filter {
    expression: String,
    ast: Expr,
}

impl Filter {
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Evaluates the filter. Errors during evaluation count as a rejection.
    pub fn matches(&self, event: &EventRecord) -> bool {
        self.ast.eval(event).map(|v| v.is_truthy()).unwrap_or(false)
    }

}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// Compiles one expression. The error names the offending expression.
pub fn compile(expression: &str) -> Result<Filter, EngineError> {
    let syntax_error = |reason: String| EngineError::FilterSyntax {
        expression: expression.to_string(),
        reason,
    };
    let tokens = tokenize(expression).map_err(syntax_error)?;
    let ast = Parser::new(tokens).parse().map_err(syntax_error)?;
    Ok(Filter {
        expression: expression.to_string(),
        ast,
    })
}

/// The conjunction of a view's filters.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    filters: Vec<Filter>,
}

impl FilterChain {
    pub fn compile<S: AsRef<str>>(expressions: &[S]) -> Result<Self, EngineError> {
        let filters = expressions
            .iter()
            .map(|e| compile(e.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { filters })
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Returns `Err(index)` of the first filter rejecting the event.
    pub fn check(&self, event: &EventRecord) -> Result<(), usize> {
        match self.filters.iter().position(|f| !f.matches(event)) {
            Some(idx) => Err(idx),
            None => Ok(()),
        }
    }

    pub fn matches(&self, event: &EventRecord) -> bool {
        self.check(event).is_ok()
    }
}

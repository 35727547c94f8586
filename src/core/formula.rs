//! Formula language for derived parameters
//!
//! Formulas are written against parameter positions: `f1` is the first
//! parameter of the lot, `f2` the second, and so on. Compiling a formula
//! resolves those references to concrete parameter ids and produces an
//! expression tree over a closed set of operators and functions. Nothing
//! outside that set can be named, so a formula can only do arithmetic.
//!
//! # Example
//!
//! ```rust
//! use cpdt::core::formula::Formula;
//!
//! let ids = ["VTH", "IDS"];
//! let f = Formula::compile("abs(f1) / f2 ^ 2", &ids).unwrap();
//! assert_eq!(f.dependencies(), &["VTH".to_string(), "IDS".to_string()]);
//!
//! let value = f.evaluate(|id| match id {
//!     "VTH" => Some(-8.0),
//!     "IDS" => Some(2.0),
//!     _ => None,
//! });
//! assert_eq!(value, Some(2.0));
//! ```

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use thiserror::Error;

/// Errors raised while compiling a formula
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormulaError {
    #[error("unexpected character '{found}' at position {position}")]
    UnexpectedChar { found: char, position: usize },

    #[error("expected {expected}, found {found}")]
    Expected { expected: String, found: String },

    #[error("invalid number: {0}")]
    InvalidNumber(String),

    #[error("unknown name '{0}'")]
    UnknownName(String),

    #[error("parameter reference f{index} is out of range (1..={available})")]
    IndexOutOfRange { index: usize, available: usize },

    #[error("{function}() takes {expected} argument(s), got {found}")]
    Arity {
        function: &'static str,
        expected: &'static str,
        found: usize,
    },

    #[error("empty formula")]
    Empty,
}

/// Errors raised while evaluating one row
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("missing value for '{0}'")]
    MissingValue(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("{0} is outside the domain of the operation")]
    Domain(&'static str),
}

/// Functions a formula may call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Abs,
    Sqrt,
    Log,
    Log10,
    Exp,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Degrees,
    Radians,
    Min,
    Max,
    Round,
    Pow,
}

impl Func {
    /// Resolve a function name
    pub fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "abs" => Func::Abs,
            "sqrt" => Func::Sqrt,
            "log" => Func::Log,
            "log10" => Func::Log10,
            "exp" => Func::Exp,
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "asin" => Func::Asin,
            "acos" => Func::Acos,
            "atan" => Func::Atan,
            "degrees" => Func::Degrees,
            "radians" => Func::Radians,
            "min" => Func::Min,
            "max" => Func::Max,
            "round" => Func::Round,
            "pow" => Func::Pow,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Func::Abs => "abs",
            Func::Sqrt => "sqrt",
            Func::Log => "log",
            Func::Log10 => "log10",
            Func::Exp => "exp",
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Tan => "tan",
            Func::Asin => "asin",
            Func::Acos => "acos",
            Func::Atan => "atan",
            Func::Degrees => "degrees",
            Func::Radians => "radians",
            Func::Min => "min",
            Func::Max => "max",
            Func::Round => "round",
            Func::Pow => "pow",
        }
    }

    fn check_arity(self, found: usize) -> Result<(), FormulaError> {
        let (ok, expected) = match self {
            Func::Min | Func::Max => (found >= 1, "at least 1"),
            Func::Round => (found == 1 || found == 2, "1 or 2"),
            Func::Pow => (found == 2, "2"),
            _ => (found == 1, "1"),
        };
        if ok {
            Ok(())
        } else {
            Err(FormulaError::Arity {
                function: self.name(),
                expected,
                found,
            })
        }
    }

    fn apply(self, args: &[f64]) -> Result<f64, EvalError> {
        let x = args.first().copied().unwrap_or(f64::NAN);
        let result = match self {
            Func::Abs => x.abs(),
            Func::Sqrt => x.sqrt(),
            Func::Log => x.ln(),
            Func::Log10 => x.log10(),
            Func::Exp => x.exp(),
            Func::Sin => x.sin(),
            Func::Cos => x.cos(),
            Func::Tan => x.tan(),
            Func::Asin => x.asin(),
            Func::Acos => x.acos(),
            Func::Atan => x.atan(),
            Func::Degrees => x.to_degrees(),
            Func::Radians => x.to_radians(),
            Func::Min => args.iter().copied().fold(f64::INFINITY, f64::min),
            Func::Max => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Func::Round => match args.get(1) {
                None => x.round_ties_even(),
                Some(digits) if digits.fract() == 0.0 => {
                    let scale = 10f64.powi(*digits as i32);
                    (x * scale).round_ties_even() / scale
                }
                Some(_) => return Err(EvalError::Domain("round() digit count")),
            },
            Func::Pow => return power(x, args.get(1).copied().unwrap_or(f64::NAN)),
        };
        finite(result, self.name())
    }
}

/// Named constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constant {
    Pi,
    E,
}

impl Constant {
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "pi" => Some(Constant::Pi),
            "e" => Some(Constant::E),
            _ => None,
        }
    }

    pub fn value(self) -> f64 {
        match self {
            Constant::Pi => std::f64::consts::PI,
            Constant::E => std::f64::consts::E,
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinOp {
    fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Pow => "**",
        }
    }
}

/// Expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Constant(Constant),
    /// A resolved parameter id
    Param(String),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

impl Expr {
    /// Evaluate against a lookup of dependency values
    pub fn eval<F>(&self, lookup: &F) -> Result<f64, EvalError>
    where
        F: Fn(&str) -> Option<f64>,
    {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Constant(c) => Ok(c.value()),
            Expr::Param(id) => lookup(id).ok_or_else(|| EvalError::MissingValue(id.clone())),
            Expr::Neg(inner) => Ok(-inner.eval(lookup)?),
            Expr::Binary(op, lhs, rhs) => {
                let a = lhs.eval(lookup)?;
                let b = rhs.eval(lookup)?;
                match op {
                    BinOp::Add => finite(a + b, "sum"),
                    BinOp::Sub => finite(a - b, "difference"),
                    BinOp::Mul => finite(a * b, "product"),
                    BinOp::Div if b == 0.0 => Err(EvalError::DivisionByZero),
                    BinOp::Div => finite(a / b, "quotient"),
                    BinOp::Pow => power(a, b),
                }
            }
            Expr::Call(func, args) => {
                let values = args
                    .iter()
                    .map(|a| a.eval(lookup))
                    .collect::<Result<Vec<_>, _>>()?;
                func.apply(&values)
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Constant(Constant::Pi) => write!(f, "pi"),
            Expr::Constant(Constant::E) => write!(f, "e"),
            Expr::Param(id) => write!(f, "{}", id),
            Expr::Neg(inner) => write!(f, "-{}", inner),
            Expr::Binary(op, lhs, rhs) => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            Expr::Call(func, args) => {
                write!(f, "{}(", func.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

fn finite(value: f64, what: &'static str) -> Result<f64, EvalError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvalError::Domain(what))
    }
}

fn power(base: f64, exponent: f64) -> Result<f64, EvalError> {
    if base == 0.0 && exponent < 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    finite(base.powf(exponent), "power")
}

// =========================================================================
// Lexer
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    /// `fN` positional reference, 1-indexed
    Ref(usize),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
    Comma,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "number {}", n),
            Token::Ident(s) => write!(f, "'{}'", s),
            Token::Ref(i) => write!(f, "f{}", i),
            Token::Plus => write!(f, "'+'"),
            Token::Minus => write!(f, "'-'"),
            Token::Star => write!(f, "'*'"),
            Token::Slash => write!(f, "'/'"),
            Token::Caret => write!(f, "'^'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::Comma => write!(f, "','"),
            Token::Eof => write!(f, "end of formula"),
        }
    }
}

struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
    position: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Lexer {
            input: input.chars().peekable(),
            position: 0,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.input.peek().copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.input.next();
        if c.is_some() {
            self.position += 1;
        }
        c
    }

    fn read_while<F: Fn(char) -> bool>(&mut self, predicate: F) -> String {
        let mut result = String::new();
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            result.push(c);
            self.advance();
        }
        result
    }

    fn read_number(&mut self) -> Result<Token, FormulaError> {
        let mut s = self.read_while(|c| c.is_ascii_digit() || c == '.');
        if matches!(self.peek(), Some('e' | 'E')) {
            s.push('e');
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                s.push(sign);
                self.advance();
            }
            s.push_str(&self.read_while(|c| c.is_ascii_digit()));
        }
        s.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| FormulaError::InvalidNumber(s))
    }

    fn next_token(&mut self) -> Result<Token, FormulaError> {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }

        let Some(c) = self.peek() else {
            return Ok(Token::Eof);
        };

        if c.is_ascii_digit() || c == '.' {
            return self.read_number();
        }
        if c.is_alphabetic() || c == '_' {
            let word = self.read_while(|c| c.is_alphanumeric() || c == '_');
            return Ok(reference_index(&word)
                .map(Token::Ref)
                .unwrap_or(Token::Ident(word)));
        }

        let position = self.position;
        self.advance();
        Ok(match c {
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' if self.peek() == Some('*') => {
                self.advance();
                Token::Caret
            }
            '*' => Token::Star,
            '/' => Token::Slash,
            '^' => Token::Caret,
            '(' => Token::LParen,
            ')' => Token::RParen,
            ',' => Token::Comma,
            found => return Err(FormulaError::UnexpectedChar { found, position }),
        })
    }

    fn tokenize(mut self) -> Result<Vec<Token>, FormulaError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token == Token::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }
}

/// `f12` / `F12` -> 12
fn reference_index(word: &str) -> Option<usize> {
    let digits = word.strip_prefix('f').or_else(|| word.strip_prefix('F'))?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

// =========================================================================
// Parser
// =========================================================================

struct Parser<'a, S: AsRef<str>> {
    tokens: Vec<Token>,
    pos: usize,
    parameters: &'a [S],
    dependencies: Vec<String>,
}

impl<'a, S: AsRef<str>> Parser<'a, S> {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), FormulaError> {
        let found = self.next();
        if found == expected {
            Ok(())
        } else {
            Err(FormulaError::Expected {
                expected: expected.to_string(),
                found: found.to_string(),
            })
        }
    }

    fn expression(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.next();
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                _ => return Ok(lhs),
            };
            self.next();
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    // Unary minus binds looser than `^`: -2^2 == -(2^2)
    fn unary(&mut self) -> Result<Expr, FormulaError> {
        match self.peek() {
            Token::Minus => {
                self.next();
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Token::Plus => {
                self.next();
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, FormulaError> {
        let base = self.atom()?;
        if self.peek() == &Token::Caret {
            self.next();
            let exponent = self.unary()?;
            return Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, FormulaError> {
        match self.next() {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Ref(index) => {
                let available = self.parameters.len();
                if index == 0 || index > available {
                    return Err(FormulaError::IndexOutOfRange { index, available });
                }
                let id = self.parameters[index - 1].as_ref().to_string();
                if !self.dependencies.contains(&id) {
                    self.dependencies.push(id.clone());
                }
                Ok(Expr::Param(id))
            }
            Token::Ident(name) => {
                if self.peek() == &Token::LParen {
                    let func =
                        Func::lookup(&name).ok_or_else(|| FormulaError::UnknownName(name.clone()))?;
                    self.next();
                    let args = self.arguments()?;
                    func.check_arity(args.len())?;
                    Ok(Expr::Call(func, args))
                } else {
                    Constant::lookup(&name)
                        .map(Expr::Constant)
                        .ok_or(FormulaError::UnknownName(name))
                }
            }
            Token::LParen => {
                let inner = self.expression()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            other => Err(FormulaError::Expected {
                expected: "a number, parameter, function or '('".to_string(),
                found: other.to_string(),
            }),
        }
    }

    fn arguments(&mut self) -> Result<Vec<Expr>, FormulaError> {
        let mut args = Vec::new();
        if self.peek() == &Token::RParen {
            self.next();
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            match self.next() {
                Token::Comma => continue,
                Token::RParen => return Ok(args),
                other => {
                    return Err(FormulaError::Expected {
                        expected: "',' or ')'".to_string(),
                        found: other.to_string(),
                    })
                }
            }
        }
    }
}

/// A compiled formula with its resolved dependencies
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
    dependencies: Vec<String>,
}

impl Formula {
    /// Compile `source`, resolving `fN` against `parameters` (1-indexed)
    pub fn compile<S: AsRef<str>>(source: &str, parameters: &[S]) -> Result<Self, FormulaError> {
        let tokens = Lexer::new(source).tokenize()?;
        if tokens.first() == Some(&Token::Eof) {
            return Err(FormulaError::Empty);
        }

        let mut parser = Parser {
            tokens,
            pos: 0,
            parameters,
            dependencies: Vec::new(),
        };
        let expr = parser.expression()?;
        if parser.peek() != &Token::Eof {
            return Err(FormulaError::Expected {
                expected: "end of formula".to_string(),
                found: parser.peek().to_string(),
            });
        }

        Ok(Self {
            source: source.to_string(),
            expr,
            dependencies: parser.dependencies,
        })
    }

    /// The formula as written
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The expression tree
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Parameter ids the formula reads, in order of first use
    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    /// The formula with references replaced by parameter ids
    pub fn expression(&self) -> String {
        self.expr.to_string()
    }

    /// Evaluate, reporting why a row has no value
    pub fn try_evaluate<F>(&self, lookup: F) -> Result<f64, EvalError>
    where
        F: Fn(&str) -> Option<f64>,
    {
        self.expr.eval(&lookup)
    }

    /// Evaluate one row; a missing input or any evaluation error gives `None`
    pub fn evaluate<F>(&self, lookup: F) -> Option<f64>
    where
        F: Fn(&str) -> Option<f64>,
    {
        self.try_evaluate(lookup).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDS: [&str; 3] = ["VTH", "IDS", "BV"];

    fn eval(source: &str, values: &[Option<f64>]) -> Option<f64> {
        let formula = Formula::compile(source, &IDS).unwrap();
        formula.evaluate(|id| {
            IDS.iter()
                .position(|p| *p == id)
                .and_then(|i| values.get(i).copied().flatten())
        })
    }

    #[test]
    fn test_references_resolve_to_ids() {
        let f = Formula::compile("f3 - f1*2 + f3", &IDS).unwrap();
        assert_eq!(f.dependencies(), &["BV".to_string(), "VTH".to_string()]);
        assert_eq!(f.expression(), "((BV - (VTH * 2)) + BV)");
        assert_eq!(f.source(), "f3 - f1*2 + f3");
    }

    #[test]
    fn test_precedence() {
        assert_eq!(eval("1 + 2 * 3", &[]), Some(7.0));
        assert_eq!(eval("(1 + 2) * 3", &[]), Some(9.0));
        assert_eq!(eval("2 ^ 3 ^ 2", &[]), Some(512.0));
        assert_eq!(eval("-2 ^ 2", &[]), Some(-4.0));
        assert_eq!(eval("2 ** 3", &[]), Some(8.0));
        assert_eq!(eval("2 ^ -1", &[]), Some(0.5));
        assert_eq!(eval("8 / 4 / 2", &[]), Some(1.0));
    }

    #[test]
    fn test_functions_and_constants() {
        assert_eq!(eval("abs(-3)", &[]), Some(3.0));
        assert_eq!(eval("sqrt(16)", &[]), Some(4.0));
        assert_eq!(eval("log10(1000)", &[]), Some(3.0));
        assert_eq!(eval("log(e)", &[]), Some(1.0));
        assert_eq!(eval("degrees(pi)", &[]), Some(180.0));
        assert_eq!(eval("min(3, 1, 2)", &[]), Some(1.0));
        assert_eq!(eval("max(3, 1, 2)", &[]), Some(3.0));
        assert_eq!(eval("pow(2, 10)", &[]), Some(1024.0));
        assert_eq!(eval("round(2.5)", &[]), Some(2.0));
        assert_eq!(eval("round(3.5)", &[]), Some(4.0));
        assert_eq!(eval("round(1.25, 1)", &[]), Some(1.2));
        assert_eq!(eval("exp(0)", &[]), Some(1.0));
    }

    #[test]
    fn test_division_by_zero_is_missing() {
        assert_eq!(eval("f1/f2", &[Some(2.0), Some(0.0)]), None);
        let f = Formula::compile("f1/f2", &IDS).unwrap();
        let err = f
            .try_evaluate(|id| if id == "VTH" { Some(2.0) } else { Some(0.0) })
            .unwrap_err();
        assert_eq!(err, EvalError::DivisionByZero);
    }

    #[test]
    fn test_missing_dependency_is_missing() {
        assert_eq!(eval("f1/f2", &[Some(2.0), None]), None);
        assert_eq!(eval("f1/f2", &[Some(3.0), Some(1.5)]), Some(2.0));
    }

    #[test]
    fn test_domain_errors_are_missing() {
        assert_eq!(eval("sqrt(f1)", &[Some(-1.0)]), None);
        assert_eq!(eval("log(0)", &[]), None);
        assert_eq!(eval("asin(2)", &[]), None);
        assert_eq!(eval("0 ^ -1", &[]), None);
    }

    #[test]
    fn test_out_of_range_reference() {
        let err = Formula::compile("f4 + 1", &IDS).unwrap_err();
        assert_eq!(err, FormulaError::IndexOutOfRange { index: 4, available: 3 });
        let err = Formula::compile("f0", &IDS).unwrap_err();
        assert!(matches!(err, FormulaError::IndexOutOfRange { index: 0, .. }));
    }

    #[test]
    fn test_names_outside_allow_list_are_rejected() {
        assert_eq!(
            Formula::compile("system(1)", &IDS).unwrap_err(),
            FormulaError::UnknownName("system".to_string())
        );
        assert_eq!(
            Formula::compile("VTH + 1", &IDS).unwrap_err(),
            FormulaError::UnknownName("VTH".to_string())
        );
        assert!(matches!(
            Formula::compile("__import__('os')", &IDS),
            Err(FormulaError::UnknownName(_)) | Err(FormulaError::UnexpectedChar { .. })
        ));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(
            Formula::compile("f1 +", &IDS),
            Err(FormulaError::Expected { .. })
        ));
        assert!(matches!(
            Formula::compile("(f1", &IDS),
            Err(FormulaError::Expected { .. })
        ));
        assert!(matches!(
            Formula::compile("f1 f2", &IDS),
            Err(FormulaError::Expected { .. })
        ));
        assert_eq!(Formula::compile("   ", &IDS).unwrap_err(), FormulaError::Empty);
        assert!(matches!(
            Formula::compile("pow(1)", &IDS),
            Err(FormulaError::Arity { function: "pow", .. })
        ));
    }
}

//! Safe arithmetic.
//!
//! Expressions are tokenized and parsed into a small tree before anything is
//! evaluated, so only numbers, `+ - * / // % **`, unary signs and parentheses
//! ever reach the evaluator. Precedence and the semantics of `//`, `%` and
//! `**` follow the usual calculator conventions: `**` binds tighter than a
//! unary sign on its left and is right-associative, `//` floors, and `%`
//! takes the sign of the divisor.

use std::fmt;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use toolgate_core::{
    LocalNode, NodeCategory, NodeContext, NodeDefinition, NodeError, NodeErrorCode,
    NodeExecutionError, NodeInput, NodeInputType, NodeOutput, NodeValidationError,
};

pub const NAME: &str = "calculator";

const FORBIDDEN_PATTERNS: [&str; 6] = ["import", "exec", "eval", "__", "open", "file"];

/// Deepest allowed nesting of parentheses, signs and exponents.
const MAX_NESTING: usize = 100;

/// Longest accepted expression, in tokens. Bounds the evaluated tree's depth.
const MAX_TOKENS: usize = 1_000;

pub fn definition() -> NodeDefinition {
    NodeDefinition::new(
        NAME,
        "Calculator",
        "Perform mathematical calculations safely",
        NodeCategory::Tool,
    )
    .with_input(
        NodeInput::new("expression", NodeInputType::String)
            .describe("Mathematical expression (e.g., '(1 + 2) * 3')"),
    )
    .with_output(NodeOutput::new("result", NodeInputType::Number))
    .with_tags(["math", "calculation", "arithmetic"])
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Calculator;

#[async_trait]
impl LocalNode for Calculator {
    async fn execute(
        &self,
        input: Map<String, Value>,
        _ctx: &NodeContext,
    ) -> Result<Value, NodeError> {
        let expression = validate(&input)?;
        let result = evaluate(expression)?;
        Ok(json!({ "result": result }))
    }
}

fn validate(input: &Map<String, Value>) -> Result<&str, NodeValidationError> {
    let expression = match input.get("expression") {
        None | Some(Value::Null) => {
            return Err(NodeValidationError::for_field("expression", "Expression is required"));
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err(NodeValidationError::for_field("expression", "Expression is required"));
        }
        Some(Value::String(s)) => s.as_str(),
        Some(_) => {
            return Err(NodeValidationError::for_field(
                "expression",
                "Expression must be a string",
            ));
        }
    };

    let lowered = expression.to_lowercase();
    if let Some(pattern) = FORBIDDEN_PATTERNS.iter().find(|p| lowered.contains(*p)) {
        return Err(NodeValidationError::for_field(
            "expression",
            format!("Expression contains forbidden pattern: {pattern}"),
        ));
    }

    Ok(expression)
}

/// Evaluate an arithmetic expression.
///
/// # Errors
///
/// `SYNTAX_ERROR` when the expression does not parse, `DIVISION_BY_ZERO` for
/// a zero divisor, and `EVALUATION_ERROR` for names or non-real results.
pub fn evaluate(expression: &str) -> Result<f64, NodeExecutionError> {
    let tokens = tokenize(expression).map_err(syntax_error)?;
    let tree = Parser::new(&tokens).parse().map_err(syntax_error)?;
    tree.eval()
}

fn syntax_error(message: String) -> NodeExecutionError {
    NodeExecutionError::new(
        NAME,
        NodeErrorCode::SyntaxError,
        format!("Invalid expression syntax: {message}"),
    )
}

fn evaluation_error(message: impl Into<String>) -> NodeExecutionError {
    NodeExecutionError::new(NAME, NodeErrorCode::EvaluationError, message)
}

fn division_by_zero() -> NodeExecutionError {
    NodeExecutionError::new(NAME, NodeErrorCode::DivisionByZero, "Division by zero")
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Name(String),
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Name(name) => f.write_str(name),
            Self::Plus => f.write_str("+"),
            Self::Minus => f.write_str("-"),
            Self::Star => f.write_str("*"),
            Self::DoubleStar => f.write_str("**"),
            Self::Slash => f.write_str("/"),
            Self::DoubleSlash => f.write_str("//"),
            Self::Percent => f.write_str("%"),
            Self::LParen => f.write_str("("),
            Self::RParen => f.write_str(")"),
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                if i < chars.len() && matches!(chars[i], 'e' | 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && matches!(chars[j], '+' | '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        i = j;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number literal '{literal}'"))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::DoubleStar);
                i += 2;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '+' | '-' | '*' | '/' | '%' | '(' | ')' => {
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '(' => Token::LParen,
                    _ => Token::RParen,
                });
                i += 1;
            }
            other => return Err(format!("unexpected character '{other}'")),
        }

        if tokens.len() > MAX_TOKENS {
            return Err(format!("expression is too long (over {MAX_TOKENS} tokens)"));
        }
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    fn apply(self, a: f64, b: f64) -> Result<f64, NodeExecutionError> {
        let value = match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div | Self::FloorDiv | Self::Mod if b == 0.0 => return Err(division_by_zero()),
            Self::Div => a / b,
            Self::FloorDiv => (a / b).floor(),
            Self::Mod => {
                let r = a % b;
                if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }
            }
            Self::Pow if a == 0.0 && b < 0.0 => return Err(division_by_zero()),
            Self::Pow => a.powf(b),
        };

        if value.is_nan() {
            Err(evaluation_error("Result is not a real number"))
        } else if value.is_infinite() {
            Err(evaluation_error("Result is out of range"))
        } else {
            Ok(value)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Name(String),
    Neg(Box<Expr>),
    Pos(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    fn binary(op: BinOp, lhs: Self, rhs: Self) -> Self {
        Self::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    fn eval(&self) -> Result<f64, NodeExecutionError> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Name(name) => Err(evaluation_error(format!(
                "Unsupported expression: name '{name}'"
            ))),
            Self::Neg(operand) => Ok(-operand.eval()?),
            Self::Pos(operand) => operand.eval(),
            Self::Binary(op, lhs, rhs) => op.apply(lhs.eval()?, rhs.eval()?),
        }
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    const fn new(tokens: &'a [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn parse(mut self) -> Result<Expr, String> {
        if self.tokens.is_empty() {
            return Err("empty expression".to_string());
        }
        let expr = self.sum()?;
        match self.peek() {
            Some(token) => Err(format!("unexpected '{token}'")),
            None => Ok(expr),
        }
    }

    fn sum(&mut self) -> Result<Expr, String> {
        let mut lhs = self.product()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            lhs = Expr::binary(op, lhs, self.product()?);
        }
    }

    fn product(&mut self) -> Result<Expr, String> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::DoubleSlash) => BinOp::FloorDiv,
                Some(Token::Percent) => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            lhs = Expr::binary(op, lhs, self.unary()?);
        }
    }

    /// Every recursive path passes through here, so this is where nesting
    /// is bounded.
    fn unary(&mut self) -> Result<Expr, String> {
        if self.depth >= MAX_NESTING {
            return Err("expression is nested too deeply".to_string());
        }
        self.depth += 1;
        let expr = self.signed();
        self.depth -= 1;
        expr
    }

    fn signed(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                Ok(Expr::Pos(Box::new(self.unary()?)))
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, String> {
        let base = self.atom()?;
        if matches!(self.peek(), Some(Token::DoubleStar)) {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Expr::binary(BinOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(*n)),
            Some(Token::Name(name)) => Ok(Expr::Name(name.clone())),
            Some(Token::LParen) => {
                let inner = self.sum()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("'(' was never closed".to_string()),
                }
            }
            Some(token) => Err(format!("unexpected '{token}'")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

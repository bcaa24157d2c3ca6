//! Calculator tool: evaluates arithmetic expressions.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! expr    = term (('+' | '-') term)*
//! term    = unary (('*' | '/' | '%') unary)*
//! unary   = ('-' | '+') unary | power
//! power   = primary (('^' | '**') unary)?
//! primary = NUMBER | IDENT | IDENT '(' expr (',' expr)* ')' | '(' expr ')'
//! ```
//!
//! Identifiers are the constants `pi` and `e` and a fixed set of math
//! functions. Nothing else is evaluated.

use async_trait::async_trait;
use ember_core::{Tool, ToolError};
use serde_json::{Map, Value};

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate a mathematical expression. Supports +, -, *, /, %, ^ (or **), parentheses, \
         sqrt, abs, sin, cos, tan, ln, log, log10, floor, ceil, round, min, max, pi and e."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The mathematical expression to evaluate, e.g. '(2 + 3) * 4' or 'sqrt(16)'"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<String, ToolError> {
        let expr = arguments
            .get("expression")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'expression' argument".into()))?;

        let value = evaluate(expr).map_err(|reason| ToolError::ExecutionFailed {
            tool_name: "calculator".into(),
            reason,
        })?;
        tracing::debug!(expression = %expr, result = value, "Evaluated expression");
        Ok(format_number(value))
    }
}

/// Render integers without a trailing `.0`.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Evaluate a mathematical expression string.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser { tokens: &tokens, pos: 0 };
    let result = parser.parse_expr()?;
    if let Some(tok) = parser.peek() {
        return Err(format!("Unexpected token at position {}: {tok:?}", parser.pos));
    }
    if !result.is_finite() {
        return Err("Result is not a finite number".into());
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Comma,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '^' => Some(Token::Caret),
            ',' => Some(Token::Comma),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            _ => None,
        };
        if let Some(tok) = single {
            tokens.push(tok);
            chars.next();
            continue;
        }

        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '*' => {
                chars.next();
                if chars.peek() == Some(&'*') {
                    chars.next();
                    tokens.push(Token::Caret);
                } else {
                    tokens.push(Token::Star);
                }
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if !(d.is_ascii_digit() || d == '.') {
                        break;
                    }
                    literal.push(d);
                    chars.next();
                }
                let num = literal.parse().map_err(|_| format!("Invalid number: {literal}"))?;
                tokens.push(Token::Number(num));
            }
            c if c.is_ascii_alphabetic() => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if !(d.is_ascii_alphanumeric() || d == '_') {
                        break;
                    }
                    ident.push(d);
                    chars.next();
                }
                tokens.push(Token::Ident(ident.to_lowercase()));
            }
            c => return Err(format!("Unexpected character: '{c}'")),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_expr(&mut self) -> Result<f64, String> {
        let mut left = self.parse_term()?;
        loop {
            if self.eat(&Token::Plus) {
                left += self.parse_term()?;
            } else if self.eat(&Token::Minus) {
                left -= self.parse_term()?;
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_term(&mut self) -> Result<f64, String> {
        let mut left = self.parse_unary()?;
        loop {
            if self.eat(&Token::Star) {
                left *= self.parse_unary()?;
            } else if self.eat(&Token::Slash) {
                let right = self.parse_unary()?;
                if right == 0.0 {
                    return Err("Division by zero".into());
                }
                left /= right;
            } else if self.eat(&Token::Percent) {
                let right = self.parse_unary()?;
                if right == 0.0 {
                    return Err("Modulo by zero".into());
                }
                left = left.rem_euclid(right);
            } else {
                return Ok(left);
            }
        }
    }

    fn parse_unary(&mut self) -> Result<f64, String> {
        if self.eat(&Token::Minus) {
            return Ok(-self.parse_unary()?);
        }
        if self.eat(&Token::Plus) {
            return self.parse_unary();
        }
        self.parse_power()
    }

    // Right-associative: 2^3^2 == 2^9
    fn parse_power(&mut self) -> Result<f64, String> {
        let base = self.parse_primary()?;
        if self.eat(&Token::Caret) {
            let exponent = self.parse_unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<f64, String> {
        match self.bump() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::LParen) => {
                let val = self.parse_expr()?;
                if self.eat(&Token::RParen) {
                    Ok(val)
                } else {
                    Err("Expected closing parenthesis".into())
                }
            }
            Some(Token::Ident(name)) => {
                if self.eat(&Token::LParen) {
                    let args = self.parse_args()?;
                    call(&name, &args)
                } else {
                    constant(&name)
                }
            }
            Some(tok) => Err(format!("Unexpected token: {tok:?}")),
            None => Err("Unexpected end of expression".into()),
        }
    }

    fn parse_args(&mut self) -> Result<Vec<f64>, String> {
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            if self.eat(&Token::RParen) {
                return Ok(args);
            }
            return Err("Expected ',' or ')' in argument list".into());
        }
    }
}

fn constant(name: &str) -> Result<f64, String> {
    match name {
        "pi" => Ok(std::f64::consts::PI),
        "e" => Ok(std::f64::consts::E),
        _ => Err(format!("Unknown variable: {name}")),
    }
}

fn call(name: &str, args: &[f64]) -> Result<f64, String> {
    let unary = |f: fn(f64) -> f64| match args {
        [x] => Ok(f(*x)),
        _ => Err(format!("{name}() takes exactly one argument")),
    };

    match name {
        "sqrt" => match args {
            [x] if *x < 0.0 => Err("sqrt() of a negative number".into()),
            _ => unary(f64::sqrt),
        },
        "abs" => unary(f64::abs),
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "tan" => unary(f64::tan),
        "floor" => unary(f64::floor),
        "ceil" => unary(f64::ceil),
        "round" => unary(f64::round),
        "ln" => unary(f64::ln),
        "log10" => unary(f64::log10),
        "log" => match args {
            [x] => Ok(x.ln()),
            [x, base] => Ok(x.log(*base)),
            _ => Err("log() takes one or two arguments".into()),
        },
        "min" | "max" if args.is_empty() => Err(format!("{name}() needs at least one argument")),
        "min" => Ok(args.iter().copied().fold(f64::INFINITY, f64::min)),
        "max" => Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        _ => Err(format!("Unsupported function: {name}")),
    }
}

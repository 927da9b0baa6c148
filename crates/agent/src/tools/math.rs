//! Arithmetic expression calculator

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{Tool, ToolError, ToolResult};

const DEFAULT_PRECISION: u32 = 2;
const MAX_PRECISION: u32 = 12;

#[derive(Debug, Deserialize)]
struct MathArgs {
    expression: String,
    #[serde(default)]
    precision: Option<u32>,
}

/// Evaluates `+ - * / ^`, parentheses, `sqrt`, `pow`, `abs`, and
/// `sin`/`cos`/`tan` in degrees, with constants `pi` and `e`
pub struct MathTool;

#[async_trait]
impl Tool for MathTool {
    fn name(&self) -> &str {
        "math_calculator"
    }

    fn description(&self) -> &str {
        "Evaluate a math expression: + - * / ^, parentheses, sqrt(x), pow(x, y), abs(x), \
         sin/cos/tan(degrees), constants pi and e."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Expression, e.g. '2 + 3 * 4', 'pow(2, 3)', 'sqrt(16)', 'sin(30)'"
                },
                "precision": {
                    "type": "integer",
                    "description": "Decimal places in the result (default 2)"
                }
            },
            "required": ["expression"]
        })
    }

    async fn invoke(&self, args: Value) -> Result<ToolResult, ToolError> {
        let args: MathArgs = serde_json::from_value(args)?;
        let precision = args.precision.unwrap_or(DEFAULT_PRECISION).min(MAX_PRECISION);

        let text = match evaluate(&args.expression) {
            Ok(value) => format!("Result: {}", round(value, precision)),
            Err(e) => format!("Calculation error: {}", e),
        };
        Ok(ToolResult::Query(Value::String(text)))
    }
}

fn round(value: f64, precision: u32) -> String {
    let rounded = format!("{:.*}", precision as usize, value);
    // Avoid "-0.00"
    if rounded.trim_start_matches('-').chars().all(|c| c == '0' || c == '.') {
        rounded.trim_start_matches('-').to_string()
    } else {
        rounded
    }
}

/// Evaluate an expression to a finite number
pub fn evaluate(expression: &str) -> Result<f64, String> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens, pos: 0 };
    let value = parser.expr()?;
    if let Some(token) = parser.peek() {
        return Err(format!("unexpected '{}'", token));
    }
    if !value.is_finite() {
        return Err("result is not a finite number".to_string());
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{}", n),
            Self::Ident(name) => f.write_str(name),
            Self::Op(c) => write!(f, "{}", c),
            Self::LParen => f.write_str("("),
            Self::RParen => f.write_str(")"),
            Self::Comma => f.write_str(","),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' => {
                chars.next();
            }
            '0'..='9' | '.' => {
                let mut number = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        number.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = number
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{}'", number))?;
                tokens.push(Token::Num(value));
            }
            'a'..='z' | 'A'..='Z' => {
                let mut name = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() {
                        name.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(name.to_lowercase()));
            }
            '+' | '-' | '*' | '/' | '^' => {
                tokens.push(Token::Op(c));
                chars.next();
            }
            '×' => {
                tokens.push(Token::Op('*'));
                chars.next();
            }
            '÷' => {
                tokens.push(Token::Op('/'));
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
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected '{}', found '{}'", expected, token)),
            None => Err(format!("expected '{}' at end of expression", expected)),
        }
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.term()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    // term := unary (('*' | '/') unary)*
    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.unary()?;
            if op == '*' {
                value *= rhs;
            } else if rhs == 0.0 {
                return Err("division by zero".to_string());
            } else {
                value /= rhs;
            }
        }
        Ok(value)
    }

    // unary := ('-' | '+') unary | power
    fn unary(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    // power := primary ('^' unary)?   (right associative)
    fn power(&mut self) -> Result<f64, String> {
        let base = self.primary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(value)
            }
            Some(Token::Ident(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    self.pos += 1;
                    let args = self.arguments()?;
                    call(&name, &args)
                } else {
                    constant(&name)
                }
            }
            Some(token) => Err(format!("unexpected '{}'", token)),
            None => Err("unexpected end of expression".to_string()),
        }
    }

    fn arguments(&mut self) -> Result<Vec<f64>, String> {
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                Some(token) => return Err(format!("expected ',' or ')', found '{}'", token)),
                None => return Err("unclosed '('".to_string()),
            }
        }
    }
}

fn constant(name: &str) -> Result<f64, String> {
    match name {
        "pi" => Ok(std::f64::consts::PI),
        "e" => Ok(std::f64::consts::E),
        other => Err(format!("unknown identifier '{}'", other)),
    }
}

fn call(name: &str, args: &[f64]) -> Result<f64, String> {
    let arity = match name {
        "pow" => 2,
        "sqrt" | "abs" | "sin" | "cos" | "tan" => 1,
        other => return Err(format!("unknown function '{}'", other)),
    };
    if args.len() != arity {
        return Err(format!(
            "{}() takes {} argument(s), got {}",
            name,
            arity,
            args.len()
        ));
    }

    let x = args[0];
    match name {
        "pow" => Ok(x.powf(args[1])),
        "sqrt" if x < 0.0 => Err("square root of a negative number".to_string()),
        "sqrt" => Ok(x.sqrt()),
        "abs" => Ok(x.abs()),
        "sin" => Ok(x.to_radians().sin()),
        "cos" => Ok(x.to_radians().cos()),
        _ => {
            if (x.rem_euclid(180.0) - 90.0).abs() < 1e-9 {
                return Err(format!("tan({}) is undefined", x));
            }
            Ok(x.to_radians().tan())
        }
    }
}

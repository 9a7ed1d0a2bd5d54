//! Magnetization direction of a block label.
//!
//! A direction is either a fixed angle in degrees or an arithmetic expression
//! in the element centroid coordinates `x`, `y`, `r` and `theta` (degrees).
//! Trigonometric functions take and return degrees.

use crate::error::{Error, Result};

/// Magnetization direction, evaluated per element.
#[derive(Debug, Clone, PartialEq)]
pub enum MagDirection {
    /// Constant angle in degrees.
    Angle(f64),
    /// Expression evaluated at each element centroid.
    Expression(Expr),
}

impl Default for MagDirection {
    fn default() -> Self {
        MagDirection::Angle(0.0)
    }
}

impl MagDirection {
    /// Parse an expression string. Plain numbers become [`MagDirection::Angle`].
    pub fn parse(source: &str) -> Result<Self> {
        let expr = Expr::parse(source)?;
        match expr {
            Expr::Number(v) => Ok(MagDirection::Angle(v)),
            e => Ok(MagDirection::Expression(e)),
        }
    }

    /// Direction in degrees at the point (x, y).
    pub fn angle_at(&self, x: f64, y: f64) -> Result<f64> {
        match self {
            MagDirection::Angle(a) => Ok(*a),
            MagDirection::Expression(e) => {
                let vars = Variables {
                    x,
                    y,
                    r: x.hypot(y),
                    theta: y.atan2(x).to_degrees(),
                };
                let value = e.eval(&vars)?;
                if value.is_finite() {
                    Ok(value)
                } else {
                    Err(Error::InvalidMaterial(format!(
                        "magnetization direction is not finite at ({}, {})",
                        x, y
                    )))
                }
            }
        }
    }
}

struct Variables {
    x: f64,
    y: f64,
    r: f64,
    theta: f64,
}

/// Parsed arithmetic expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Var(Var),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Func, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Var {
    X,
    Y,
    R,
    Theta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sqrt,
    Abs,
    Exp,
    Log,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "asin" => Func::Asin,
            "acos" => Func::Acos,
            "atan" => Func::Atan,
            "sqrt" => Func::Sqrt,
            "abs" => Func::Abs,
            "exp" => Func::Exp,
            "log" => Func::Log,
            _ => return None,
        })
    }

    fn apply(self, v: f64) -> f64 {
        match self {
            Func::Sin => v.to_radians().sin(),
            Func::Cos => v.to_radians().cos(),
            Func::Tan => v.to_radians().tan(),
            Func::Asin => v.asin().to_degrees(),
            Func::Acos => v.acos().to_degrees(),
            Func::Atan => v.atan().to_degrees(),
            Func::Sqrt => v.sqrt(),
            Func::Abs => v.abs(),
            Func::Exp => v.exp(),
            Func::Log => v.ln(),
        }
    }
}

impl Expr {
    /// Parse an expression.
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.sum()?;
        if parser.pos != parser.tokens.len() {
            return Err(expr_error(source, "unexpected trailing input"));
        }
        Ok(expr)
    }

    fn eval(&self, vars: &Variables) -> Result<f64> {
        Ok(match self {
            Expr::Number(v) => *v,
            Expr::Var(Var::X) => vars.x,
            Expr::Var(Var::Y) => vars.y,
            Expr::Var(Var::R) => vars.r,
            Expr::Var(Var::Theta) => vars.theta,
            Expr::Neg(e) => -e.eval(vars)?,
            Expr::Binary(op, a, b) => {
                let (a, b) = (a.eval(vars)?, b.eval(vars)?);
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Pow => a.powf(b),
                }
            }
            Expr::Call(f, e) => f.apply(e.eval(vars)?),
        })
    }
}

fn expr_error(source: &str, what: &str) -> Error {
    Error::InvalidMaterial(format!("magnetization expression \"{}\": {}", source, what))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(char),
    Open,
    Close,
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // exponent
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| expr_error(source, &format!("bad number '{}'", text)))?;
            tokens.push(Token::Number(value));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect::<String>().to_ascii_lowercase()));
        } else if "+-*/^".contains(c) {
            tokens.push(Token::Op(c));
            i += 1;
        } else if c == '(' {
            tokens.push(Token::Open);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::Close);
            i += 1;
        } else {
            return Err(expr_error(source, &format!("unexpected character '{}'", c)));
        }
    }
    if tokens.is_empty() {
        return Err(expr_error(source, "empty expression"));
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
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn error(&self, what: &str) -> Error {
        Error::InvalidMaterial(format!("magnetization expression: {} at token {}", what, self.pos))
    }

    fn sum(&mut self) -> Result<Expr> {
        let mut lhs = self.product()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.product()?;
            let op = if op == '+' { BinaryOp::Add } else { BinaryOp::Sub };
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn product(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek().cloned() {
            self.pos += 1;
            let rhs = self.unary()?;
            let op = if op == '*' { BinaryOp::Mul } else { BinaryOp::Div };
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.atom()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            // right associative
            let exponent = self.unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Number(v)) => Ok(Expr::Number(v)),
            Some(Token::Open) => {
                let e = self.sum()?;
                match self.next() {
                    Some(Token::Close) => Ok(e),
                    _ => Err(self.error("expected ')'")),
                }
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "x" => Ok(Expr::Var(Var::X)),
                "y" => Ok(Expr::Var(Var::Y)),
                "r" => Ok(Expr::Var(Var::R)),
                "theta" => Ok(Expr::Var(Var::Theta)),
                "pi" => Ok(Expr::Number(std::f64::consts::PI)),
                other => {
                    let func = Func::from_name(other)
                        .ok_or_else(|| self.error(&format!("unknown name '{}'", other)))?;
                    match self.next() {
                        Some(Token::Open) => {}
                        _ => return Err(self.error("expected '(' after function name")),
                    }
                    let arg = self.sum()?;
                    match self.next() {
                        Some(Token::Close) => Ok(Expr::Call(func, Box::new(arg))),
                        _ => Err(self.error("expected ')'")),
                    }
                }
            },
            _ => Err(self.error("expected a value")),
        }
    }
}

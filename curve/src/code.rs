//! Parser for three-address field operations such as `t0 = X1*Y2`.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operand {
    Name(String),
    Int(u64),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Name(name) => f.write_str(name),
            Operand::Int(value) => write!(f, "{value}"),
        }
    }
}

/// Right-hand side of an operation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expr {
    Copy(Operand),
    Add(Operand, Operand),
    Sub(Operand, Operand),
    Mul(Operand, Operand),
    Div(Operand, Operand),
    Neg(Operand),
    Inv(Operand),
    Sqr(Operand),
}

impl Expr {
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Expr::Copy(a) | Expr::Neg(a) | Expr::Inv(a) | Expr::Sqr(a) => vec![a],
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) | Expr::Div(a, b) => vec![a, b],
        }
    }
}

/// One parsed line: `result = expr`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeOp {
    pub result: String,
    pub expr: Expr,
}

impl fmt::Display for CodeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = ", self.result)?;
        match &self.expr {
            Expr::Copy(a) => write!(f, "{a}"),
            Expr::Add(a, b) => write!(f, "{a}+{b}"),
            Expr::Sub(a, b) => write!(f, "{a}-{b}"),
            Expr::Mul(a, b) => write!(f, "{a}*{b}"),
            Expr::Div(a, b) => write!(f, "{a}/{b}"),
            Expr::Neg(a) => write!(f, "-{a}"),
            Expr::Inv(a) => write!(f, "1/{a}"),
            Expr::Sqr(a) => write!(f, "{a}^2"),
        }
    }
}

/// Parses one line; the error is a human-readable reason.
pub fn parse_line(line: &str) -> Result<CodeOp, String> {
    let (lhs, rhs) = line
        .split_once('=')
        .ok_or_else(|| format!("`{line}` has no assignment"))?;
    let result = lhs.trim();
    if !is_identifier(result) {
        return Err(format!("`{result}` is not a valid name"));
    }

    let rhs: String = rhs.chars().filter(|c| !c.is_whitespace()).collect();
    if rhs.is_empty() {
        return Err(format!("`{line}` has an empty right-hand side"));
    }

    let expr = if let Some(operand) = rhs.strip_prefix("1/") {
        Expr::Inv(parse_operand(operand)?)
    } else if let Some(operand) = rhs.strip_prefix('-') {
        Expr::Neg(parse_operand(operand)?)
    } else if let Some(operand) = rhs.strip_suffix("^2") {
        Expr::Sqr(parse_operand(operand)?)
    } else if let Some(index) = rhs.find(['+', '-', '*', '/']) {
        let a = parse_operand(&rhs[..index])?;
        let b = parse_operand(&rhs[index + 1..])?;
        match &rhs[index..index + 1] {
            "+" => Expr::Add(a, b),
            "-" => Expr::Sub(a, b),
            "*" => Expr::Mul(a, b),
            _ => Expr::Div(a, b),
        }
    } else {
        Expr::Copy(parse_operand(&rhs)?)
    };

    Ok(CodeOp {
        result: result.to_string(),
        expr,
    })
}

/// Parses newline-separated operations, skipping blank lines.
pub fn parse_program(text: &str) -> Result<Vec<CodeOp>, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(parse_line)
        .collect()
}

fn parse_operand(text: &str) -> Result<Operand, String> {
    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        return text
            .parse()
            .map(Operand::Int)
            .map_err(|_| format!("constant `{text}` is out of range"));
    }
    if is_identifier(text) {
        Ok(Operand::Name(text.to_string()))
    } else {
        Err(format!("`{text}` is not a valid operand"))
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

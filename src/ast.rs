use std::fmt::Display;
use std::rc::Rc;

use num_rational::BigRational;

use crate::error::ControlKind;
use crate::interpreter::value::format_rational;
use crate::tokenizer::Token;

/// A variable reference: the token it was written at plus its name.
#[derive(Debug, Clone)]
pub struct Var {
    pub token: Token,
    pub name: Rc<str>,
}

#[derive(Debug, Clone)]
pub enum Statement {
    Var {
        token: Token,
        vars: Vec<(Var, Option<Expression>)>,
    },
    Assignment {
        token: Token,
        lhs: Var,
        rhs: Expression,
    },
    If {
        token: Token,
        test: Expression,
        body: Vec<Statement>,
        else_body: Vec<Statement>,
    },
    While {
        token: Token,
        test: Expression,
        body: Vec<Statement>,
    },
    ProcDef {
        token: Token,
        name: Var,
        params: Vec<Var>,
        body: Rc<Vec<Statement>>,
    },
    FuncDef {
        token: Token,
        name: Var,
        params: Vec<Var>,
        body: Rc<Vec<Statement>>,
    },
    ProcCall {
        token: Token,
        proc: Expression,
        args: Vec<Expression>,
    },
    Return {
        token: Token,
        expr: Expression,
    },
    Control {
        token: Token,
        kind: ControlKind,
    },
    Import {
        token: Token,
        path: String,
        prefix: Option<Var>,
    },
    Unimport {
        token: Token,
        path: String,
    },
    Export {
        token: Token,
        vars: Vec<Var>,
    },
    Undefine {
        token: Token,
        vars: Vec<Var>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    And,
    Or,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
        }
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum Expression {
    Var(Var),
    Str {
        token: Token,
        value: Rc<str>,
    },
    Number {
        token: Token,
        value: Rc<BigRational>,
    },
    Bool {
        token: Token,
        value: bool,
    },
    Op {
        token: Token,
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Not {
        token: Token,
        expr: Box<Expression>,
    },
    Negative {
        token: Token,
        expr: Box<Expression>,
    },
    Index {
        token: Token,
        object: Box<Expression>,
        index: Box<Expression>,
    },
    FuncCall {
        token: Token,
        callee: Box<Expression>,
        args: Vec<Expression>,
    },
}

impl Expression {
    /// The token errors about this expression point at.
    pub fn token(&self) -> &Token {
        match self {
            Expression::Var(var) => &var.token,
            Expression::Str { token, .. }
            | Expression::Number { token, .. }
            | Expression::Bool { token, .. }
            | Expression::Op { token, .. }
            | Expression::Not { token, .. }
            | Expression::Negative { token, .. }
            | Expression::Index { token, .. }
            | Expression::FuncCall { token, .. } => token,
        }
    }
}

fn write_block(f: &mut std::fmt::Formatter<'_>, body: &[Statement]) -> std::fmt::Result {
    for stmt in body {
        write!(f, "{}", stmt)?;
    }
    Ok(())
}

fn write_vars(f: &mut std::fmt::Formatter<'_>, vars: &[Var]) -> std::fmt::Result {
    for (i, var) in vars.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        f.write_str(&var.name)?;
    }
    Ok(())
}

pub fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

impl Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Statement::Var { vars, .. } => {
                f.write_str("var ")?;
                for (i, (var, init)) in vars.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    f.write_str(&var.name)?;
                    if let Some(init) = init {
                        write!(f, " = {}", init)?;
                    }
                }
                writeln!(f)
            }
            Statement::Assignment { lhs, rhs, .. } => writeln!(f, "{} = {}", lhs.name, rhs),
            Statement::If {
                test,
                body,
                else_body,
                ..
            } => {
                writeln!(f, "if {} {{", test)?;
                write_block(f, body)?;
                if !else_body.is_empty() {
                    writeln!(f, "}} else {{")?;
                    write_block(f, else_body)?;
                }
                writeln!(f, "}}")
            }
            Statement::While { test, body, .. } => {
                writeln!(f, "while {} {{", test)?;
                write_block(f, body)?;
                writeln!(f, "}}")
            }
            Statement::ProcDef {
                name, params, body, ..
            } => {
                write!(f, "proc {}", name.name)?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, " {}", param.name)?;
                }
                writeln!(f, " {{")?;
                write_block(f, body)?;
                writeln!(f, "}}")
            }
            Statement::FuncDef {
                name, params, body, ..
            } => {
                write!(f, "func {}(", name.name)?;
                write_vars(f, params)?;
                writeln!(f, ") {{")?;
                write_block(f, body)?;
                writeln!(f, "}}")
            }
            Statement::ProcCall { proc, args, .. } => {
                write!(f, "{}", proc)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, " {}", arg)?;
                }
                writeln!(f)
            }
            Statement::Return { expr, .. } => writeln!(f, "return {}", expr),
            Statement::Control { kind, .. } => writeln!(f, "{}", kind),
            Statement::Import { path, prefix, .. } => match prefix {
                Some(prefix) => {
                    writeln!(f, "import {} withprefix {}", escape_string(path), prefix.name)
                }
                None => writeln!(f, "import {}", escape_string(path)),
            },
            Statement::Unimport { path, .. } => writeln!(f, "unimport {}", escape_string(path)),
            Statement::Export { vars, .. } => {
                f.write_str("export ")?;
                write_vars(f, vars)?;
                writeln!(f)
            }
            Statement::Undefine { vars, .. } => {
                f.write_str("undefine ")?;
                write_vars(f, vars)?;
                writeln!(f)
            }
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Var(var) => f.write_str(&var.name),
            Expression::Str { value, .. } => f.write_str(&escape_string(value)),
            Expression::Number { value, .. } => f.write_str(&format_rational(value)),
            Expression::Bool { value, .. } => write!(f, "{}", value),
            Expression::Op {
                op, left, right, ..
            } => write!(f, "({} {} {})", left, op, right),
            Expression::Not { expr, .. } => write!(f, "not {}", expr),
            Expression::Negative { expr, .. } => write!(f, "-{}", expr),
            Expression::Index { object, index, .. } => write!(f, "{}[{}]", object, index),
            Expression::FuncCall { callee, args, .. } => {
                write!(f, "{}(", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
        }
    }
}

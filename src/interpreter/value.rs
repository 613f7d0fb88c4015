use std::cell::RefCell;
use std::fmt::{Debug, Display};
use std::rc::Rc;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::pow::Pow;
use num_traits::{One, Signed, Zero};

use crate::ast::{Statement, Var};
use crate::error::{ControlKind, Error, RuntimeError};
use crate::source::Line;
use crate::tokenizer::Token;

use super::scope::{Scope, ScopeRef};
use super::{Interpreter, ModuleImporter};

/// Errors from builtin procs and funcs. The evaluator rewraps them into a
/// runtime error at the call site, which also gives them a location.
pub type BuiltinError = Box<dyn std::error::Error>;
pub type ProcFn = Box<dyn Fn(&[Value]) -> Result<(), BuiltinError>>;
pub type FuncFn = Box<dyn Fn(&[Value]) -> Result<Value, BuiltinError>>;

#[derive(Debug, Clone)]
pub enum Value {
    Number(Rc<BigRational>),
    Str(Rc<str>),
    Bool(bool),
    Proc(Rc<Proc>),
    Func(Rc<Func>),
}

impl Value {
    pub fn number(value: BigRational) -> Value {
        Value::Number(Rc::new(value))
    }

    pub fn number_from(value: i64) -> Value {
        Value::number(BigRational::from_integer(value.into()))
    }

    pub fn string(value: &str) -> Value {
        Value::Str(value.into())
    }

    /// The kind name used in operator dispatch errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::Proc(_) => "proc",
            Value::Func(_) => "func",
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(value) => f.write_str(&format_rational(value)),
            Value::Str(value) => f.write_str(value),
            Value::Bool(value) => write!(f, "{}", value),
            Value::Proc(proc) => write!(f, "{}", proc),
            Value::Func(func) => write!(f, "{}", func),
        }
    }
}

/// Storage for one named variable. `var x` creates it empty; assignment
/// fills it in place so every scope holding the cell sees the new value.
#[derive(Debug, Clone)]
pub struct ValueCell {
    pub def: Rc<Line>,
    pub value: Option<Value>,
}

pub type CellRef = Rc<RefCell<ValueCell>>;

impl ValueCell {
    pub fn uninitialized(def: Rc<Line>) -> CellRef {
        Rc::new(RefCell::new(ValueCell { def, value: None }))
    }

    pub fn with_value(def: Rc<Line>, value: Value) -> CellRef {
        Rc::new(RefCell::new(ValueCell {
            def,
            value: Some(value),
        }))
    }

    /// A fresh cell with the same definition line and current value.
    pub fn snapshot(&self) -> CellRef {
        Rc::new(RefCell::new(self.clone()))
    }

    pub fn builtin(value: Value) -> CellRef {
        ValueCell::with_value(
            Rc::new(Line {
                filename: "<builtin>".into(),
                lineno: 0,
                text: String::new(),
            }),
            value,
        )
    }
}

/// A user-defined proc or func: the definition site, a flattened snapshot of
/// the defining scope, and the shared body.
pub struct UserRoutine {
    pub def: Token,
    pub name: Rc<str>,
    pub scope: ScopeRef,
    pub params: Vec<Var>,
    pub body: Rc<Vec<Statement>>,
}

impl UserRoutine {
    fn invoke(
        &self,
        importer: &Rc<dyn ModuleImporter>,
        token: &Token,
        args: Vec<Value>,
    ) -> Result<(), Error> {
        if args.len() != self.params.len() {
            return Err(RuntimeError::new(
                token,
                format!(
                    "Expected {} arguments but got {}",
                    self.params.len(),
                    args.len()
                ),
            )
            .into());
        }
        for param in &self.params {
            if let Some(cell) = self.scope.borrow().lookup(&param.name) {
                let def = cell.borrow().def.clone();
                return Err(RuntimeError::new(
                    &param.token,
                    format!(
                        "Variable {} already defined on file {:?}, line {}",
                        param.name, def.filename, def.lineno
                    ),
                )
                .into());
            }
        }
        let scope = Scope::fork(&self.scope);
        for (param, value) in self.params.iter().zip(args) {
            scope.borrow_mut().define(
                &param.name,
                ValueCell::with_value(param.token.line.clone(), value),
            );
        }
        Interpreter::new(scope, importer.clone()).run_all(&self.body)
    }
}

pub enum Proc {
    User(UserRoutine),
    Builtin { name: Rc<str>, f: ProcFn },
}

impl Proc {
    pub fn call(
        &self,
        importer: &Rc<dyn ModuleImporter>,
        token: &Token,
        args: Vec<Value>,
    ) -> Result<(), Error> {
        match self {
            Proc::User(routine) => match routine.invoke(importer, token, args) {
                Err(Error::Control(signal)) => match signal.kind {
                    ControlKind::Done => Ok(()),
                    kind => Err(RuntimeError::new(
                        &signal.token,
                        format!("Unexpected {:?}", kind.as_str()),
                    )
                    .into()),
                },
                result => result,
            },
            Proc::Builtin { f, .. } => {
                f(&args).map_err(|err| RuntimeError::new(token, err.to_string()).into())
            }
        }
    }
}

impl Display for Proc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Proc::User(routine) => f.write_str(&routine.name),
            Proc::Builtin { .. } => f.write_str("<builtin>"),
        }
    }
}

impl Debug for Proc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Proc::User(routine) => write!(f, "Proc({})", routine.name),
            Proc::Builtin { name, .. } => write!(f, "BuiltinProc({})", name),
        }
    }
}

pub enum Func {
    User(UserRoutine),
    Builtin { name: Rc<str>, f: FuncFn },
}

impl Func {
    pub fn call(
        &self,
        importer: &Rc<dyn ModuleImporter>,
        token: &Token,
        args: Vec<Value>,
    ) -> Result<Value, Error> {
        match self {
            Func::User(routine) => match routine.invoke(importer, token, args) {
                Ok(()) => Err(RuntimeError::new(
                    &routine.def,
                    "Function exited with no return statement",
                )
                .into()),
                Err(Error::Control(signal)) => match (signal.kind, signal.value) {
                    (ControlKind::Return, Some(value)) => Ok(value),
                    (ControlKind::Return, None) => {
                        unreachable!("return signals always carry a value")
                    }
                    (kind, _) => Err(RuntimeError::new(
                        &signal.token,
                        format!("Unexpected {:?}", kind.as_str()),
                    )
                    .into()),
                },
                Err(err) => Err(err),
            },
            Func::Builtin { f, .. } => {
                f(&args).map_err(|err| RuntimeError::new(token, err.to_string()).into())
            }
        }
    }
}

impl Display for Func {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Func::User(routine) => write!(f, "{}()", routine.name),
            Func::Builtin { .. } => f.write_str("<builtin>"),
        }
    }
}

impl Debug for Func {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Func::User(routine) => write!(f, "Func({})", routine.name),
            Func::Builtin { name, .. } => write!(f, "BuiltinFunc({})", name),
        }
    }
}

/// Renders a rational in decimal: up to 10 fractional digits, rounded half
/// away from zero, trailing zeros trimmed, no trailing point.
pub fn format_rational(value: &BigRational) -> String {
    let negative = value.is_negative();
    let abs = value.abs();
    let numer = abs.numer();
    let denom = abs.denom();
    let mut int_part = numer / denom;
    let rem = numer % denom;
    let scale = BigInt::from(10u32).pow(10u32);
    let scaled = rem * &scale;
    let mut frac = &scaled / denom;
    let rest = &scaled % denom;
    if &rest + &rest >= *denom {
        frac += BigInt::one();
        if frac == scale {
            frac = BigInt::zero();
            int_part += BigInt::one();
        }
    }
    let mut out = String::new();
    if negative && !(int_part.is_zero() && frac.is_zero()) {
        out.push('-');
    }
    out.push_str(&int_part.to_string());
    if !frac.is_zero() {
        let mut digits = frac.to_string();
        while digits.len() < 10 {
            digits.insert(0, '0');
        }
        out.push('.');
        out.push_str(digits.trim_end_matches('0'));
    }
    out
}

/// Parses a number the way `std.number` accepts it: optional sign, then
/// either decimal digits with at most one point, or a `numer/denom` pair.
pub fn parse_rational(text: &str) -> Option<BigRational> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let value = if let Some((numer, denom)) = digits.split_once('/') {
        let numer: BigInt = numer.parse().ok()?;
        let denom: BigInt = denom.parse().ok()?;
        if denom.is_zero() {
            return None;
        }
        BigRational::new(numer, denom)
    } else {
        let (int_digits, frac_digits) = match digits.split_once('.') {
            Some((int, frac)) => (int, frac),
            None => (digits, ""),
        };
        if int_digits.is_empty() && frac_digits.is_empty() {
            return None;
        }
        let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if !all_digits(int_digits) || !all_digits(frac_digits) {
            return None;
        }
        let mantissa: BigInt = format!("{}{}", int_digits, frac_digits).parse().ok()?;
        let denom = BigInt::from(10u32).pow(frac_digits.len() as u32);
        BigRational::new(mantissa, denom)
    };
    Some(if negative { -value } else { value })
}

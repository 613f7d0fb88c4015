use std::io::Write;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use justerror::Error;
use num_bigint::{BigInt, RandBigInt};
use num_rational::BigRational;
use num_traits::Signed;
use rand::thread_rng;
use rustc_hash::FxHashMap;

use crate::app::App;
use crate::interpreter::value::{
    parse_rational, BuiltinError, Func, FuncFn, Proc, ProcFn, Value,
};

#[Error]
enum StdError {
    /// unexpected arguments
    UnexpectedArguments,
    /// could not convert value to number
    NotANumber,
    /// random bounds must be integers
    NotAnInteger,
    /// random range is empty
    EmptyRange,
}

fn expect_args(args: &[Value], count: usize) -> Result<(), BuiltinError> {
    if args.len() == count {
        Ok(())
    } else {
        Err(StdError::UnexpectedArguments.into())
    }
}

fn print(args: &[Value]) -> Result<(), BuiltinError> {
    let mut out = std::io::stdout();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(out, " ")?;
        }
        write!(out, "{}", arg)?;
    }
    out.flush()?;
    Ok(())
}

fn log(args: &[Value]) -> Result<(), BuiltinError> {
    print(args)?;
    writeln!(std::io::stdout())?;
    Ok(())
}

fn time(args: &[Value]) -> Result<Value, BuiltinError> {
    expect_args(args, 0)?;
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH)?;
    Ok(Value::number(BigRational::from_integer(BigInt::from(
        elapsed.as_nanos(),
    ))))
}

fn input(args: &[Value]) -> Result<Value, BuiltinError> {
    expect_args(args, 0)?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(Value::string(line.trim()))
}

fn number(args: &[Value]) -> Result<Value, BuiltinError> {
    expect_args(args, 1)?;
    match &args[0] {
        Value::Str(text) => match parse_rational(text) {
            Some(value) => Ok(Value::number(value)),
            None => Err(StdError::NotANumber.into()),
        },
        Value::Number(_) => Ok(args[0].clone()),
        _ => Err(StdError::NotANumber.into()),
    }
}

fn integer_arg(value: &Value) -> Result<BigInt, BuiltinError> {
    match value {
        Value::Number(n) if n.is_integer() => Ok(n.numer().clone()),
        Value::Number(_) => Err(StdError::NotAnInteger.into()),
        _ => Err(StdError::NotANumber.into()),
    }
}

// uniform integer in [low, high)
fn random(args: &[Value]) -> Result<Value, BuiltinError> {
    expect_args(args, 2)?;
    let low = integer_arg(&args[0])?;
    let high = integer_arg(&args[1])?;
    if (&high - &low).is_positive() {
        let picked = thread_rng().gen_bigint_range(&low, &high);
        Ok(Value::number(BigRational::from_integer(picked)))
    } else {
        Err(StdError::EmptyRange.into())
    }
}

fn proc_value(name: &str, f: ProcFn) -> Value {
    Value::Proc(Rc::new(Proc::Builtin {
        name: name.into(),
        f,
    }))
}

fn func_value(name: &str, f: FuncFn) -> Value {
    Value::Func(Rc::new(Func::Builtin {
        name: name.into(),
        f,
    }))
}

/// Registers the `std` module. Hosts usually follow up with
/// `app.run_in_default_scope("import \"std\"")` so every program sees the
/// bindings without its own import.
pub fn register(app: &App) {
    app.define_module(
        "std",
        Box::new(|| {
            let mut values = FxHashMap::default();
            values.insert("print".to_string(), proc_value("print", Box::new(print)));
            values.insert("log".to_string(), proc_value("log", Box::new(log)));
            values.insert("time".to_string(), func_value("time", Box::new(time)));
            values.insert("input".to_string(), func_value("input", Box::new(input)));
            values.insert("number".to_string(), func_value("number", Box::new(number)));
            values.insert("random".to_string(), func_value("random", Box::new(random)));
            Ok(values)
        }),
    );
}

#[cfg(test)]
mod test {
    use super::*;

    fn num(value: &Value) -> BigRational {
        match value {
            Value::Number(n) => (**n).clone(),
            other => panic!("expected number, got {}", other),
        }
    }

    #[test]
    fn test_number_converts_strings() {
        let v = number(&[Value::string(" 3.5 ")]).unwrap();
        assert_eq!(num(&v), BigRational::new(7.into(), 2.into()));
        let v = number(&[Value::string("2/6")]).unwrap();
        assert_eq!(num(&v), BigRational::new(1.into(), 3.into()));
    }

    #[test]
    fn test_number_passes_numbers_through() {
        let v = number(&[Value::number_from(9)]).unwrap();
        assert_eq!(num(&v), BigRational::from_integer(9.into()));
    }

    #[test]
    fn test_number_rejects_junk() {
        assert!(number(&[Value::string("nope")]).is_err());
        assert!(number(&[Value::Bool(true)]).is_err());
        assert!(number(&[]).is_err());
    }

    #[test]
    fn test_time_is_positive_nanoseconds() {
        let v = time(&[]).unwrap();
        assert!(num(&v).is_positive());
        assert!(time(&[Value::Bool(true)]).is_err());
    }

    #[test]
    fn test_random_stays_in_range() {
        for _ in 0..50 {
            let v = random(&[Value::number_from(-3), Value::number_from(4)]).unwrap();
            let picked = num(&v);
            assert!(picked >= BigRational::from_integer((-3).into()));
            assert!(picked < BigRational::from_integer(4.into()));
            assert!(picked.is_integer());
        }
    }

    #[test]
    fn test_random_rejects_bad_bounds() {
        assert!(random(&[Value::number_from(2), Value::number_from(2)]).is_err());
        assert!(random(&[Value::number_from(5), Value::number_from(1)]).is_err());
        let half = Value::number(BigRational::new(1.into(), 2.into()));
        assert!(random(&[half, Value::number_from(4)]).is_err());
    }
}

use num_rational::BigRational;
use num_traits::{Signed, Zero};

use crate::ast::BinaryOp;
use crate::error::{Error, RuntimeError};
use crate::tokenizer::Token;

use super::value::Value;

/// Structural equality. Values of different kinds never compare equal;
/// procs and funcs compare unequal to everything, themselves included.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a == b,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ => false,
    }
}

/// The dispatch table for binary operators: one arm per supported
/// (operator, left kind, right kind) cell. `and`/`or` never get here; the
/// evaluator handles them lazily.
pub fn binary_op(
    token: &Token,
    op: BinaryOp,
    left: &Value,
    right: &Value,
) -> Result<Value, Error> {
    use BinaryOp::*;
    use Value::*;

    let value = match (op, left, right) {
        (Equal, a, b) => Bool(values_equal(a, b)),
        (NotEqual, a, b) => Bool(!values_equal(a, b)),

        (Plus, Number(a), Number(b)) => Value::number(&**a + &**b),
        (Minus, Number(a), Number(b)) => Value::number(&**a - &**b),
        (Multiply, Number(a), Number(b)) => Value::number(&**a * &**b),
        (Divide, Number(a), Number(b)) => {
            if b.is_zero() {
                return Err(RuntimeError::new(token, "Division by zero").into());
            }
            Value::number(&**a / &**b)
        }
        (Modulo, Number(a), Number(b)) => {
            if b.is_zero() {
                return Err(RuntimeError::new(token, "Division by zero").into());
            }
            if !a.is_integer() || !b.is_integer() {
                return Err(RuntimeError::new(token, "Modulo only works on integers").into());
            }
            // Euclidean: the result is in [0, |divisor|)
            let modulus = b.numer().abs();
            let rem = ((a.numer() % &modulus) + &modulus) % &modulus;
            Value::number(BigRational::from_integer(rem))
        }
        (Less, Number(a), Number(b)) => Bool(a < b),
        (LessEqual, Number(a), Number(b)) => Bool(a <= b),
        (Greater, Number(a), Number(b)) => Bool(a > b),
        (GreaterEqual, Number(a), Number(b)) => Bool(a >= b),

        (Plus, Str(a), Str(b)) => Value::Str(format!("{}{}", a, b).into()),
        (Less, Str(a), Str(b)) => Bool(a < b),
        (LessEqual, Str(a), Str(b)) => Bool(a <= b),
        (Greater, Str(a), Str(b)) => Bool(a > b),
        (GreaterEqual, Str(a), Str(b)) => Bool(a >= b),

        (And | Or, _, _) => unreachable!("short-circuit operators are evaluated lazily"),

        _ => {
            return Err(RuntimeError::new(
                token,
                format!(
                    "unsupported operation: {} {} {}",
                    left.kind_name(),
                    op,
                    right.kind_name()
                ),
            )
            .into());
        }
    };
    Ok(value)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::rc::Rc;

    use num_bigint::BigInt;

    use crate::source::Line;
    use crate::tokenizer::TokenKind;

    fn token() -> Token {
        Token {
            line: Rc::new(Line {
                filename: "test".into(),
                lineno: 1,
                text: String::new(),
            }),
            start: 0,
            length: 1,
            kind: TokenKind::Plus,
        }
    }

    fn num(n: i64, d: i64) -> Value {
        Value::number(BigRational::new(BigInt::from(n), BigInt::from(d)))
    }

    fn apply(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, Error> {
        binary_op(&token(), op, left, right)
    }

    fn expect_num(op: BinaryOp, left: &Value, right: &Value) -> BigRational {
        match apply(op, left, right).unwrap() {
            Value::Number(v) => (*v).clone(),
            other => panic!("expected number, got {}", other),
        }
    }

    fn expect_bool(op: BinaryOp, left: &Value, right: &Value) -> bool {
        match apply(op, left, right).unwrap() {
            Value::Bool(b) => b,
            other => panic!("expected bool, got {}", other),
        }
    }

    #[test]
    fn test_exact_arithmetic() {
        assert_eq!(
            expect_num(BinaryOp::Plus, &num(1, 3), &num(1, 6)),
            BigRational::new(1.into(), 2.into())
        );
        assert_eq!(
            expect_num(BinaryOp::Divide, &num(1, 1), &num(3, 1)),
            BigRational::new(1.into(), 3.into())
        );
        assert_eq!(
            expect_num(BinaryOp::Multiply, &num(2, 3), &num(3, 2)),
            BigRational::from_integer(1.into())
        );
    }

    #[test]
    fn test_addition_commutes_and_multiplication_associates() {
        let (a, b, c) = (num(3, 7), num(-5, 2), num(11, 13));
        assert!(values_equal(
            &apply(BinaryOp::Plus, &a, &b).unwrap(),
            &apply(BinaryOp::Plus, &b, &a).unwrap(),
        ));
        let ab_c = apply(
            BinaryOp::Multiply,
            &apply(BinaryOp::Multiply, &a, &b).unwrap(),
            &c,
        )
        .unwrap();
        let a_bc = apply(
            BinaryOp::Multiply,
            &a,
            &apply(BinaryOp::Multiply, &b, &c).unwrap(),
        )
        .unwrap();
        assert!(values_equal(&ab_c, &a_bc));
    }

    #[test]
    fn test_division_by_zero() {
        for op in [BinaryOp::Divide, BinaryOp::Modulo] {
            let err = apply(op, &num(1, 1), &num(0, 1)).unwrap_err();
            assert!(err.to_string().contains("Division by zero"), "{}", err);
        }
    }

    #[test]
    fn test_modulo_requires_integers() {
        let err = apply(BinaryOp::Modulo, &num(1, 2), &num(3, 1)).unwrap_err();
        assert!(err.to_string().contains("Modulo only works on integers"));
        let err = apply(BinaryOp::Modulo, &num(3, 1), &num(1, 2)).unwrap_err();
        assert!(err.to_string().contains("Modulo only works on integers"));
    }

    #[test]
    fn test_modulo_is_euclidean() {
        assert_eq!(
            expect_num(BinaryOp::Modulo, &num(7, 1), &num(3, 1)),
            BigRational::from_integer(1.into())
        );
        assert_eq!(
            expect_num(BinaryOp::Modulo, &num(-7, 1), &num(3, 1)),
            BigRational::from_integer(2.into())
        );
        assert_eq!(
            expect_num(BinaryOp::Modulo, &num(7, 1), &num(-3, 1)),
            BigRational::from_integer(1.into())
        );
    }

    #[test]
    fn test_string_concat_and_order() {
        let (ab, cd) = (Value::string("ab"), Value::string("cd"));
        match apply(BinaryOp::Plus, &ab, &cd).unwrap() {
            Value::Str(s) => assert_eq!(&*s, "abcd"),
            other => panic!("expected string, got {}", other),
        }
        assert!(expect_bool(BinaryOp::Less, &ab, &cd));
        assert!(!expect_bool(BinaryOp::Greater, &ab, &cd));
        assert!(expect_bool(BinaryOp::GreaterEqual, &ab, &Value::string("ab")));
        assert!(!expect_bool(BinaryOp::Less, &ab, &Value::string("ab")));
    }

    #[test]
    fn test_equality_across_kinds_is_false() {
        assert!(!expect_bool(BinaryOp::Equal, &num(1, 1), &Value::string("1")));
        assert!(expect_bool(BinaryOp::NotEqual, &num(1, 1), &Value::Bool(true)));
        assert!(expect_bool(BinaryOp::Equal, &Value::Bool(true), &Value::Bool(true)));
    }

    #[test]
    fn test_procs_are_never_equal() {
        use crate::interpreter::value::Proc;
        let p = Value::Proc(Rc::new(Proc::Builtin {
            name: "p".into(),
            f: Box::new(|_| Ok(())),
        }));
        assert!(!expect_bool(BinaryOp::Equal, &p, &p.clone()));
    }

    #[test]
    fn test_unsupported_operations() {
        let err = apply(BinaryOp::Minus, &Value::string("a"), &Value::string("b")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Runtime error on file \"test\", line 1: unsupported operation: string - string"
        );
        assert!(apply(BinaryOp::Plus, &num(1, 1), &Value::string("x")).is_err());
        assert!(apply(BinaryOp::Less, &Value::Bool(true), &Value::Bool(false)).is_err());
    }
}

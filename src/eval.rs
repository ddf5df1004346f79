//! Expression evaluation and built-in functions
//!
//! Operators and functions are exposed individually so the compiled backend
//! and constant folding share one definition with the tree walker.

use std::ops::RangeInclusive;

use thiserror::Error;

use crate::data::Value;
use crate::runtime::{BidiDir, SharedParams};
use crate::tree::{BinaryOp, Expr, UnaryOp};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },

    #[error("function '{name}' takes {expected} arguments, found {found}")]
    WrongArity {
        name: String,
        expected: String,
        found: usize,
    },

    #[error("cannot apply '{op}' to {found}")]
    TypeMismatch { op: &'static str, found: String },

    #[error("'for' expects a list, found {found}")]
    NotAList { found: &'static str },
}

/// Where expressions find their variables
pub trait Scope {
    /// A parameter, loop variable or `let` binding
    fn var(&self, name: &str) -> Option<Value>;
    /// An injected data entry
    fn ij(&self, key: &str) -> Option<Value>;
    fn shared(&self) -> &SharedParams;
}

/// Argument counts accepted by a built-in function
pub fn function_arity(name: &str) -> Option<RangeInclusive<usize>> {
    Some(match name {
        "isNonnull" | "length" => 1..=1,
        "round" => 1..=2,
        "bidiMark" | "bidiStartEdge" | "bidiEndEdge" | "bidiGlobalDir" => 0..=0,
        _ => return None,
    })
}

pub fn eval(expr: &Expr, scope: &dyn Scope) -> Result<Value, EvalError> {
    Ok(match expr {
        Expr::Null => Value::Null,
        Expr::Bool(b) => Value::Bool(*b),
        Expr::Int(i) => Value::Int(*i),
        Expr::Float(f) => Value::Float(*f),
        Expr::Str(s) => Value::String(s.clone()),
        Expr::List(items) => Value::List(
            items
                .iter()
                .map(|item| eval(item, scope))
                .collect::<Result<_, _>>()?,
        ),
        Expr::Var(name) => scope.var(name).unwrap_or_default(),
        Expr::Ij(key) => scope.ij(key).unwrap_or_default(),
        Expr::Field(base, field) => get_field(eval(base, scope)?, field),
        Expr::Unary(op, operand) => apply_unary(*op, eval(operand, scope)?)?,
        Expr::Binary(BinaryOp::And, lhs, rhs) => {
            Value::Bool(eval(lhs, scope)?.is_truthy() && eval(rhs, scope)?.is_truthy())
        }
        Expr::Binary(BinaryOp::Or, lhs, rhs) => {
            Value::Bool(eval(lhs, scope)?.is_truthy() || eval(rhs, scope)?.is_truthy())
        }
        Expr::Binary(op, lhs, rhs) => apply_binary(*op, eval(lhs, scope)?, eval(rhs, scope)?)?,
        Expr::Ternary(cond, then, otherwise) => {
            if eval(cond, scope)?.is_truthy() {
                eval(then, scope)?
            } else {
                eval(otherwise, scope)?
            }
        }
        Expr::Call { name, args, .. } => {
            let args = args
                .iter()
                .map(|arg| eval(arg, scope))
                .collect::<Result<Vec<_>, _>>()?;
            call_function(name, args, scope.shared())?
        }
    })
}

/// Record field access; anything that is not a record yields null
pub fn get_field(base: Value, field: &str) -> Value {
    match base {
        Value::Record(record) => record.get(field).cloned().unwrap_or_default(),
        _ => Value::Null,
    }
}

pub fn apply_unary(op: UnaryOp, value: Value) -> Result<Value, EvalError> {
    match (op, value) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOp::Neg, Value::Int(i)) => Ok(i
            .checked_neg()
            .map(Value::Int)
            .unwrap_or(Value::Float(-(i as f64)))),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, other) => Err(EvalError::TypeMismatch {
            op: "-",
            found: other.type_name().to_string(),
        }),
    }
}

fn mismatch(op: BinaryOp, lhs: &Value, rhs: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op: op.symbol(),
        found: format!("{} and {}", lhs.type_name(), rhs.type_name()),
    }
}

fn is_stringish(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Sanitized(_))
}

/// Loose equality: numbers compare by value, sanitized content by text
pub fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a == b,
        (a, b) if a.as_f64().is_some() && b.as_f64().is_some() => a.as_f64() == b.as_f64(),
        (a, b) if is_stringish(a) && is_stringish(b) => a.coerce_to_string() == b.coerce_to_string(),
        (a, b) => a == b,
    }
}

/// Binary operators other than the short-circuiting `and` / `or`
pub fn apply_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::And => Ok(Value::Bool(lhs.is_truthy() && rhs.is_truthy())),
        BinaryOp::Or => Ok(Value::Bool(lhs.is_truthy() || rhs.is_truthy())),
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
        BinaryOp::Add => match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => Ok(a
                .checked_add(b)
                .map(Value::Int)
                .unwrap_or(Value::Float(a as f64 + b as f64))),
            (Value::List(mut a), Value::List(b)) => {
                a.extend(b);
                Ok(Value::List(a))
            }
            (a, b) if is_stringish(&a) || is_stringish(&b) => Ok(Value::String(format!(
                "{}{}",
                a.coerce_to_string(),
                b.coerce_to_string()
            ))),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => Ok(Value::Float(x + y)),
                _ => Err(mismatch(op, &a, &b)),
            },
        },
        BinaryOp::Sub | BinaryOp::Mul => match (&lhs, &rhs) {
            (Value::Int(a), Value::Int(b)) => {
                let exact = if op == BinaryOp::Sub {
                    a.checked_sub(*b)
                } else {
                    a.checked_mul(*b)
                };
                Ok(exact.map(Value::Int).unwrap_or_else(|| {
                    float_op(op, *a as f64, *b as f64)
                }))
            }
            _ => match (lhs.as_f64(), rhs.as_f64()) {
                (Some(x), Some(y)) => Ok(float_op(op, x, y)),
                _ => Err(mismatch(op, &lhs, &rhs)),
            },
        },
        BinaryOp::Div => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(x), Some(y)) => Ok(Value::Float(x / y)),
            _ => Err(mismatch(op, &lhs, &rhs)),
        },
        BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            let ordering = match (&lhs, &rhs) {
                (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
                (a, b) if is_stringish(a) && is_stringish(b) => {
                    Some(a.coerce_to_string().cmp(&b.coerce_to_string()))
                }
                (a, b) => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => x.partial_cmp(&y),
                    _ => return Err(mismatch(op, &lhs, &rhs)),
                },
            };
            let result = ordering.is_some_and(|o| match op {
                BinaryOp::Lt => o.is_lt(),
                BinaryOp::Gt => o.is_gt(),
                BinaryOp::Le => o.is_le(),
                _ => o.is_ge(),
            });
            Ok(Value::Bool(result))
        }
    }
}

fn float_op(op: BinaryOp, x: f64, y: f64) -> Value {
    match op {
        BinaryOp::Sub => Value::Float(x - y),
        _ => Value::Float(x * y),
    }
}

pub fn call_function(name: &str, args: Vec<Value>, shared: &SharedParams) -> Result<Value, EvalError> {
    let Some(arity) = function_arity(name) else {
        return Err(EvalError::UnknownFunction {
            name: name.to_string(),
        });
    };
    if !arity.contains(&args.len()) {
        let expected = if arity.start() == arity.end() {
            arity.start().to_string()
        } else {
            format!("{} to {}", arity.start(), arity.end())
        };
        return Err(EvalError::WrongArity {
            name: name.to_string(),
            expected,
            found: args.len(),
        });
    }

    let rtl = shared.bidi == BidiDir::Rtl;
    let mut args = args.into_iter();
    let first = args.next().unwrap_or_default();
    Ok(match name {
        "isNonnull" => Value::Bool(!first.is_null()),
        "length" => match first {
            Value::List(items) => Value::Int(items.len() as i64),
            Value::String(s) => Value::Int(s.chars().count() as i64),
            Value::Sanitized(s) => Value::Int(s.content().chars().count() as i64),
            other => {
                return Err(EvalError::TypeMismatch {
                    op: "length",
                    found: other.type_name().to_string(),
                })
            }
        },
        "round" => round(first, args.next())?,
        "bidiMark" => Value::from(if rtl { "\u{200F}" } else { "\u{200E}" }),
        "bidiStartEdge" => Value::from(if rtl { "right" } else { "left" }),
        "bidiEndEdge" => Value::from(if rtl { "left" } else { "right" }),
        _ => Value::Int(if rtl { -1 } else { 1 }),
    })
}

fn round(value: Value, digits: Option<Value>) -> Result<Value, EvalError> {
    let digits = match digits {
        None => 0,
        Some(Value::Int(d)) => d,
        Some(other) => {
            return Err(EvalError::TypeMismatch {
                op: "round",
                found: other.type_name().to_string(),
            })
        }
    };
    // Halves round up; negative digits round to a power of ten
    let half_up = |x: f64| (x + 0.5).floor();
    match value {
        Value::Int(i) if digits >= 0 => Ok(Value::Int(i)),
        Value::Float(f) if digits == 0 => Ok(Value::Int(half_up(f) as i64)),
        Value::Int(_) | Value::Float(_) if digits < 0 => {
            let x = value.as_f64().unwrap_or_default();
            let scale = 10f64.powi(digits.unsigned_abs().min(18) as i32);
            Ok(Value::Int((half_up(x / scale) * scale) as i64))
        }
        Value::Float(f) => {
            let scale = 10f64.powi(digits.min(15) as i32);
            Ok(Value::Float(half_up(f * scale) / scale))
        }
        other => Err(EvalError::TypeMismatch {
            op: "round",
            found: other.type_name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Record;

    struct TestScope {
        vars: Record,
        shared: SharedParams,
    }

    impl Scope for TestScope {
        fn var(&self, name: &str) -> Option<Value> {
            self.vars.get(name).cloned()
        }

        fn ij(&self, _key: &str) -> Option<Value> {
            None
        }

        fn shared(&self) -> &SharedParams {
            &self.shared
        }
    }

    fn scope(vars: Record) -> TestScope {
        TestScope {
            vars,
            shared: SharedParams::default(),
        }
    }

    fn bin(op: BinaryOp, a: Expr, b: Expr) -> Expr {
        Expr::Binary(op, Box::new(a), Box::new(b))
    }

    #[test]
    fn test_arithmetic() {
        let s = scope(Record::new());
        assert_eq!(eval(&bin(BinaryOp::Add, Expr::Int(2), Expr::Int(3)), &s), Ok(Value::Int(5)));
        assert_eq!(
            eval(&bin(BinaryOp::Div, Expr::Int(3), Expr::Int(2)), &s),
            Ok(Value::Float(1.5))
        );
        assert_eq!(
            eval(&bin(BinaryOp::Add, Expr::Str("n".into()), Expr::Int(1)), &s),
            Ok(Value::from("n1"))
        );
    }

    #[test]
    fn test_type_mismatch() {
        let s = scope(Record::new());
        let err = eval(&bin(BinaryOp::Sub, Expr::Str("a".into()), Expr::Int(1)), &s).unwrap_err();
        assert_eq!(err.to_string(), "cannot apply '-' to string and int");
    }

    #[test]
    fn test_field_access_and_missing_vars() {
        let user = Record::new().with("name", "Ed");
        let s = scope(Record::new().with("user", user));
        let expr = Expr::Field(Box::new(Expr::Var("user".into())), "name".into());
        assert_eq!(eval(&expr, &s), Ok(Value::from("Ed")));
        assert_eq!(eval(&Expr::Var("nobody".into()), &s), Ok(Value::Null));
    }

    #[test]
    fn test_loose_equality() {
        assert!(values_equal(&Value::Int(1), &Value::Float(1.0)));
        assert!(!values_equal(&Value::Int(1), &Value::from("1")));
    }

    #[test]
    fn test_functions() {
        let shared = SharedParams::default();
        assert_eq!(
            call_function("length", vec![Value::from("héllo")], &shared),
            Ok(Value::Int(5))
        );
        assert_eq!(
            call_function("round", vec![Value::Float(2.346), Value::Int(2)], &shared),
            Ok(Value::Float(2.35))
        );
        for (args, expected) in [
            (vec![Value::Float(123.0), Value::Int(-1)], Value::Int(120)),
            (vec![Value::Int(1250), Value::Int(-2)], Value::Int(1300)),
            (vec![Value::Float(-2.5)], Value::Int(-2)),
            (vec![Value::Float(2.5)], Value::Int(3)),
        ] {
            assert_eq!(call_function("round", args, &shared), Ok(expected));
        }
        assert_eq!(
            call_function("isNonnull", vec![Value::Null], &shared),
            Ok(Value::Bool(false))
        );
        assert!(matches!(
            call_function("length", vec![], &shared),
            Err(EvalError::WrongArity { found: 0, .. })
        ));
        assert!(matches!(
            call_function("nope", vec![], &shared),
            Err(EvalError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn test_bidi_functions_follow_shared_params() {
        let rtl = SharedParams {
            bidi: BidiDir::Rtl,
            locale: Some("he".to_string()),
        };
        assert_eq!(call_function("bidiGlobalDir", vec![], &rtl), Ok(Value::Int(-1)));
        assert_eq!(call_function("bidiStartEdge", vec![], &rtl), Ok(Value::from("right")));
        assert_eq!(
            call_function("bidiEndEdge", vec![], &SharedParams::default()),
            Ok(Value::from("right"))
        );
    }
}

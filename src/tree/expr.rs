//! Expression nodes

use crate::data::Value;
use crate::parser::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

/// An expression inside a template body
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Expr>),
    /// `$name`: a parameter, loop variable or `let` binding
    Var(String),
    /// `$ij.name`: injected data
    Ij(String),
    Field(Box<Expr>, String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    Call {
        name: String,
        args: Vec<Expr>,
        span: Span,
    },
}

impl Expr {
    /// Literal form of a value, when one exists
    pub fn literal(value: &Value) -> Option<Expr> {
        Some(match value {
            Value::Null => Expr::Null,
            Value::Bool(b) => Expr::Bool(*b),
            Value::Int(i) => Expr::Int(*i),
            Value::Float(f) => Expr::Float(*f),
            Value::String(s) => Expr::Str(s.clone()),
            Value::List(items) => Expr::List(
                items
                    .iter()
                    .map(Expr::literal)
                    .collect::<Option<Vec<_>>>()?,
            ),
            Value::Record(_) | Value::Sanitized(_) => return None,
        })
    }

    pub fn is_literal(&self) -> bool {
        match self {
            Expr::Null | Expr::Bool(_) | Expr::Int(_) | Expr::Float(_) | Expr::Str(_) => true,
            Expr::List(items) => items.iter().all(Expr::is_literal),
            _ => false,
        }
    }

    /// Visit this expression and every subexpression, parents first
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::List(items) => items.iter().for_each(|e| e.walk(f)),
            Expr::Field(base, _) | Expr::Unary(_, base) => base.walk(f),
            Expr::Binary(_, lhs, rhs) => {
                lhs.walk(f);
                rhs.walk(f);
            }
            Expr::Ternary(cond, then, otherwise) => {
                cond.walk(f);
                then.walk(f);
                otherwise.walk(f);
            }
            Expr::Call { args, .. } => args.iter().for_each(|e| e.walk(f)),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_of_list() {
        let value = Value::List(vec![Value::Int(1), Value::from("a")]);
        assert_eq!(
            Expr::literal(&value),
            Some(Expr::List(vec![Expr::Int(1), Expr::Str("a".to_string())]))
        );
        assert!(Expr::literal(&Value::Record(Default::default())).is_none());
    }

    #[test]
    fn test_walk_visits_nested_ij() {
        let expr = Expr::Binary(
            BinaryOp::Add,
            Box::new(Expr::Ij("a".to_string())),
            Box::new(Expr::Field(Box::new(Expr::Ij("b".to_string())), "c".to_string())),
        );
        let mut seen = Vec::new();
        expr.walk(&mut |e| {
            if let Expr::Ij(name) = e {
                seen.push(name.clone());
            }
        });
        assert_eq!(seen, vec!["a", "b"]);
    }
}

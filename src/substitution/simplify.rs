//! Constant folding and dead-branch removal
//!
//! Only rewrites whose result is known at compile time are made, so a
//! simplified tree renders byte-for-byte like its input.

use crate::data::Value;
use crate::escape::{print_value, EscapeContext};
use crate::eval::{eval, Scope};
use crate::runtime::{css_class, SharedParams};
use crate::tree::{BinaryOp, CallParam, CallParamValue, Expr, FileSet, Node};

/// Scope with no variables; folding only evaluates closed expressions
struct ConstScope<'a> {
    shared: &'a SharedParams,
}

impl Scope for ConstScope<'_> {
    fn var(&self, _name: &str) -> Option<Value> {
        None
    }

    fn ij(&self, _key: &str) -> Option<Value> {
        None
    }

    fn shared(&self) -> &SharedParams {
        self.shared
    }
}

fn const_value(expr: &Expr, shared: &SharedParams) -> Option<Value> {
    eval(expr, &ConstScope { shared }).ok()
}

fn literal_truth(expr: &Expr, shared: &SharedParams) -> Option<bool> {
    if expr.is_literal() {
        const_value(expr, shared).map(|v| v.is_truthy())
    } else {
        None
    }
}

pub fn simplify(tree: &mut FileSet, shared: &SharedParams) {
    for template in tree.templates_mut() {
        let escape = EscapeContext::new(template.autoescape_mode, template.content_kind);
        simplify_body(&mut template.body, escape, shared);
    }
}

/// Fold `expr` bottom-up
///
/// Expressions that fail to evaluate are left alone so the failure still
/// happens at render time.
pub fn fold_expr(expr: &mut Expr, shared: &SharedParams) {
    let children_literal = match expr {
        Expr::List(items) | Expr::Call { args: items, .. } => {
            items.iter_mut().for_each(|e| fold_expr(e, shared));
            items.iter().all(Expr::is_literal)
        }
        Expr::Field(base, _) | Expr::Unary(_, base) => {
            fold_expr(base, shared);
            base.is_literal()
        }
        Expr::Binary(op, lhs, rhs) => {
            let op = *op;
            fold_expr(lhs, shared);
            fold_expr(rhs, shared);
            let decided = match (op, literal_truth(lhs, shared)) {
                (BinaryOp::And, Some(false)) => Some(false),
                (BinaryOp::Or, Some(true)) => Some(true),
                _ => None,
            };
            if let Some(result) = decided {
                *expr = Expr::Bool(result);
                return;
            }
            lhs.is_literal() && rhs.is_literal()
        }
        Expr::Ternary(cond, then, otherwise) => {
            fold_expr(cond, shared);
            fold_expr(then, shared);
            fold_expr(otherwise, shared);
            let chosen = match literal_truth(cond, shared) {
                Some(true) => std::mem::replace(then.as_mut(), Expr::Null),
                Some(false) => std::mem::replace(otherwise.as_mut(), Expr::Null),
                None => return,
            };
            *expr = chosen;
            return;
        }
        _ => return,
    };

    if children_literal && !expr.is_literal() {
        if let Some(folded) = const_value(expr, shared).as_ref().and_then(Expr::literal) {
            *expr = folded;
        }
    }
}

fn simplify_body(body: &mut Vec<Node>, escape: EscapeContext, shared: &SharedParams) {
    let nodes = std::mem::take(body);
    for mut node in nodes {
        for expr in node.exprs_mut() {
            fold_expr(expr, shared);
        }
        match &mut node {
            Node::Call(call) => simplify_params(&mut call.params, escape, shared),
            Node::DelCall(call) => simplify_params(&mut call.params, escape, shared),
            other => {
                for child in other.bodies_mut() {
                    simplify_body(child, escape, shared);
                }
            }
        }

        match node {
            Node::Text(text) => push_text(body, &text),
            Node::Print { expr, directives } if expr.is_literal() => {
                match const_value(&expr, shared) {
                    Some(value) => push_text(body, &print_value(escape, value, &directives)),
                    None => body.push(Node::Print { expr, directives }),
                }
            }
            Node::Css {
                component: Some(component),
                selector,
            } if component.is_literal() => match const_value(&component, shared) {
                Some(value) => push_text(body, &css_class(Some(&value), &selector)),
                None => body.push(Node::Css {
                    component: Some(component),
                    selector,
                }),
            },
            Node::If {
                branches,
                otherwise,
            } => {
                let mut kept = Vec::with_capacity(branches.len());
                let mut otherwise = otherwise;
                for (cond, branch) in branches {
                    match literal_truth(&cond, shared) {
                        Some(false) => {}
                        Some(true) => {
                            otherwise = Some(branch);
                            break;
                        }
                        None => kept.push((cond, branch)),
                    }
                }
                if kept.is_empty() {
                    splice(body, otherwise.unwrap_or_default());
                } else {
                    body.push(Node::If {
                        branches: kept,
                        otherwise,
                    });
                }
            }
            Node::For {
                list: Expr::List(items),
                if_empty,
                ..
            } if items.is_empty() => splice(body, if_empty.unwrap_or_default()),
            other => body.push(other),
        }
    }
}

fn simplify_params(params: &mut [CallParam], escape: EscapeContext, shared: &SharedParams) {
    for param in params {
        if let CallParamValue::Block { kind, body } = &mut param.value {
            simplify_body(body, escape.for_block(*kind), shared);
        }
    }
}

fn push_text(body: &mut Vec<Node>, text: &str) {
    if text.is_empty() {
        return;
    }
    match body.last_mut() {
        Some(Node::Text(last)) => last.push_str(text),
        _ => body.push(Node::Text(text.to_string())),
    }
}

/// Inline a branch that is always taken
///
/// A branch with its own `let` bindings keeps a scope of its own.
fn splice(body: &mut Vec<Node>, nodes: Vec<Node>) {
    if nodes.iter().any(|n| matches!(n, Node::Let { .. })) {
        body.push(Node::If {
            branches: vec![(Expr::Bool(true), nodes)],
            otherwise: None,
        });
        return;
    }
    for node in nodes {
        match node {
            Node::Text(text) => push_text(body, &text),
            other => body.push(other),
        }
    }
}

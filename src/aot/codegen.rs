//! Template to closure compilation
//!
//! Every node becomes a boxed closure. Local variables are resolved to slot
//! indices here, so a compiled template never searches scopes by name.

use std::fmt::Write;

use crate::data::{Record, SanitizedContent, Value};
use crate::error::{CompileErrorKind, ErrorReporter};
use crate::escape::{print_value, EscapeContext, PrintDirective};
use crate::eval::{apply_binary, apply_unary, call_function, function_arity, get_field, EvalError};
use crate::msgs::CatalogPart;
use crate::renaming::{rename_id, rename_selector};
use crate::runtime::{call_record, css_class, CallBase, RenderContext};
use crate::substitution::SubstitutionError;
use crate::tree::{
    AutoescapeMode, BinaryOp, CallData, CallParam, CallParamValue, Expr, MsgNode, MsgPart, Node,
    TemplateNode,
};
use crate::RenderError;

use super::{CompiledUnit, ExecutableSet};

/// Execution state of one template instance
pub(crate) struct Frame<'f, 'r> {
    pub data: &'f Record,
    pub slots: &'f mut Vec<Value>,
    pub ctx: &'f mut RenderContext<'r>,
    pub set: &'f ExecutableSet,
}

impl Frame<'_, '_> {
    fn slot(&self, index: usize) -> Value {
        self.slots.get(index).cloned().unwrap_or_default()
    }

    fn set_slot(&mut self, index: usize, value: Value) {
        if index >= self.slots.len() {
            self.slots.resize(index + 1, Value::Null);
        }
        self.slots[index] = value;
    }
}

pub(crate) type ExprFn = Box<dyn Fn(&Frame<'_, '_>) -> Result<Value, EvalError> + Send + Sync>;
pub(crate) type Op =
    Box<dyn Fn(&mut Frame<'_, '_>, &mut dyn Write) -> Result<(), RenderError> + Send + Sync>;

fn expr_fn<F>(f: F) -> ExprFn
where
    F: Fn(&Frame<'_, '_>) -> Result<Value, EvalError> + Send + Sync + 'static,
{
    Box::new(f)
}

fn op<F>(f: F) -> Op
where
    F: Fn(&mut Frame<'_, '_>, &mut dyn Write) -> Result<(), RenderError> + Send + Sync + 'static,
{
    Box::new(f)
}

pub(crate) fn run(ops: &[Op], frame: &mut Frame<'_, '_>, out: &mut dyn Write) -> Result<(), RenderError> {
    for op in ops {
        op(frame, out)?;
    }
    Ok(())
}

/// Compile one template; problems are reported, not returned
pub(crate) fn generate(template: &TemplateNode, reporter: &mut ErrorReporter) -> CompiledUnit {
    let mut codegen = Codegen {
        template,
        reporter,
        scope: Vec::new(),
        max_slots: 0,
    };
    if template.autoescape_mode == AutoescapeMode::NonContextual {
        codegen.unsupported(
            template.span.clone(),
            format!(
                "autoescape=\"{}\"",
                AutoescapeMode::NonContextual.attribute_value()
            ),
        );
    }
    let escape = EscapeContext::new(template.autoescape_mode, template.content_kind);
    let body = codegen.body(&template.body, escape);
    CompiledUnit {
        name: template.name.clone(),
        params: template.params.clone(),
        slots: codegen.max_slots,
        body,
    }
}

struct Codegen<'a> {
    template: &'a TemplateNode,
    reporter: &'a mut ErrorReporter,
    /// Names of the bound slots, innermost last
    scope: Vec<String>,
    max_slots: usize,
}

enum CallDataFn {
    None,
    All,
    Expr(ExprFn),
}

enum ParamFn {
    Expr(ExprFn),
    Block {
        kind: Option<crate::data::ContentKind>,
        ops: Vec<Op>,
    },
}

enum MsgOp {
    Text(String),
    Placeholder(usize),
}

struct Placeholder {
    name: String,
    value: ExprFn,
    directives: Vec<PrintDirective>,
}

impl Codegen<'_> {
    fn unsupported(&mut self, span: crate::parser::Span, feature: String) {
        self.reporter.report_at(
            &self.template.file,
            span,
            CompileErrorKind::UnsupportedFeature {
                template: self.template.name.clone(),
                feature,
            },
        );
    }

    fn bind(&mut self, name: &str) -> usize {
        self.scope.push(name.to_string());
        self.max_slots = self.max_slots.max(self.scope.len());
        self.scope.len() - 1
    }

    fn body(&mut self, nodes: &[Node], escape: EscapeContext) -> Vec<Op> {
        let mark = self.scope.len();
        let ops = nodes.iter().map(|node| self.node(node, escape)).collect();
        self.scope.truncate(mark);
        ops
    }

    fn node(&mut self, node: &Node, escape: EscapeContext) -> Op {
        match node {
            Node::Text(text) => {
                let text = text.clone();
                op(move |_, out| Ok(out.write_str(&text)?))
            }
            Node::Print { expr, directives } => {
                let value = self.expr(expr);
                let directives = directives.clone();
                op(move |f, out| {
                    let value = value(f)?;
                    out.write_str(&print_value(escape, value, &directives))?;
                    Ok(())
                })
            }
            Node::Msg(msg) => self.msg(msg, escape),
            Node::Css {
                component,
                selector,
            } => {
                let component = component.as_ref().map(|c| self.expr(c));
                let selector = selector.clone();
                op(move |f, out| {
                    let component = component.as_ref().map(|c| c(f)).transpose()?;
                    let renamed = rename_selector(f.ctx.css_map, &selector);
                    out.write_str(&css_class(component.as_ref(), &renamed))?;
                    Ok(())
                })
            }
            Node::Xid(id) => {
                let id = id.clone();
                op(move |f, out| Ok(out.write_str(&rename_id(f.ctx.id_map, &id))?))
            }
            Node::If {
                branches,
                otherwise,
            } => {
                let branches: Vec<(ExprFn, Vec<Op>)> = branches
                    .iter()
                    .map(|(cond, body)| (self.expr(cond), self.body(body, escape)))
                    .collect();
                let otherwise = otherwise.as_ref().map(|body| self.body(body, escape));
                op(move |f, out| {
                    for (cond, body) in &branches {
                        if cond(f)?.is_truthy() {
                            return run(body, f, out);
                        }
                    }
                    match &otherwise {
                        Some(body) => run(body, f, out),
                        None => Ok(()),
                    }
                })
            }
            Node::For {
                var,
                list,
                body,
                if_empty,
            } => {
                let list = self.expr(list);
                let if_empty = if_empty.as_ref().map(|body| self.body(body, escape));
                let mark = self.scope.len();
                let slot = self.bind(var);
                let body = self.body(body, escape);
                self.scope.truncate(mark);
                op(move |f, out| {
                    let items = match list(f)? {
                        Value::List(items) => items,
                        Value::Null => Vec::new(),
                        other => {
                            return Err(EvalError::NotAList {
                                found: other.type_name(),
                            }
                            .into())
                        }
                    };
                    if items.is_empty() {
                        if let Some(if_empty) = &if_empty {
                            run(if_empty, f, out)?;
                        }
                    }
                    for item in items {
                        f.set_slot(slot, item);
                        run(&body, f, out)?;
                    }
                    Ok(())
                })
            }
            Node::Let { var, value } => {
                let value = self.expr(value);
                let slot = self.bind(var);
                op(move |f, _| {
                    let value = value(f)?;
                    f.set_slot(slot, value);
                    Ok(())
                })
            }
            Node::Call(call) => {
                let callee = call.callee.clone();
                let data = self.call_data(&call.data);
                let params = self.call_params(&call.params, escape);
                op(move |f, out| {
                    if !f.set.has_basic(&callee) {
                        return Err(RenderError::UndefinedTemplate {
                            name: callee.clone(),
                        });
                    }
                    let record = build_record(&data, &params, f)?;
                    let set = f.set;
                    set.render_unit(&callee, &record, f.ctx, out)
                })
            }
            Node::DelCall(call) => {
                let name = call.name.clone();
                let variant = call.variant.clone();
                let allow_empty_default = call.allow_empty_default;
                let data = self.call_data(&call.data);
                let params = self.call_params(&call.params, escape);
                op(move |f, out| {
                    let set = f.set;
                    let Some(unit) = set.select_delegate(&name, &variant, f.ctx.active_packages)?
                    else {
                        if allow_empty_default {
                            return Ok(());
                        }
                        return Err(RenderError::UndefinedDelegate {
                            name: name.clone(),
                            variant: variant.clone(),
                        });
                    };
                    let record = build_record(&data, &params, f)?;
                    set.render_unit(unit, &record, f.ctx, out)
                })
            }
        }
    }

    fn msg(&mut self, msg: &MsgNode, escape: EscapeContext) -> Op {
        let id = msg.id;
        let mut placeholders: Vec<Placeholder> = Vec::new();
        let mut source = Vec::with_capacity(msg.parts.len());
        for part in &msg.parts {
            match part {
                MsgPart::Text(text) => source.push(MsgOp::Text(text.clone())),
                MsgPart::Placeholder {
                    name,
                    expr,
                    directives,
                } => {
                    let index = match placeholders.iter().position(|p| p.name == *name) {
                        Some(index) => index,
                        None => {
                            placeholders.push(Placeholder {
                                name: name.clone(),
                                value: self.expr(expr),
                                directives: directives.clone(),
                            });
                            placeholders.len() - 1
                        }
                    };
                    source.push(MsgOp::Placeholder(index));
                }
            }
        }

        op(move |f, out| {
            let Some(translation) = f.ctx.msgs.and_then(|c| c.get(id)) else {
                return write_msg(&source, &placeholders, escape, f, out);
            };

            // Check every placeholder before writing anything
            let mut resolved = Vec::with_capacity(translation.len());
            for part in translation {
                resolved.push(match part {
                    CatalogPart::Text(text) => MsgOp::Text(text.clone()),
                    CatalogPart::Placeholder(wanted) => MsgOp::Placeholder(
                        placeholders
                            .iter()
                            .position(|p| p.name == *wanted)
                            .ok_or_else(|| SubstitutionError::UnknownPlaceholder {
                                id,
                                placeholder: wanted.clone(),
                            })?,
                    ),
                });
            }
            write_msg(&resolved, &placeholders, escape, f, out)
        })
    }

    fn call_data(&mut self, data: &CallData) -> CallDataFn {
        match data {
            CallData::None => CallDataFn::None,
            CallData::All => CallDataFn::All,
            CallData::Expr(expr) => CallDataFn::Expr(self.expr(expr)),
        }
    }

    fn call_params(&mut self, params: &[CallParam], escape: EscapeContext) -> Vec<(String, ParamFn)> {
        params
            .iter()
            .map(|param| {
                let value = match &param.value {
                    CallParamValue::Expr(expr) => ParamFn::Expr(self.expr(expr)),
                    CallParamValue::Block { kind, body } => ParamFn::Block {
                        kind: *kind,
                        ops: self.body(body, escape.for_block(*kind)),
                    },
                };
                (param.name.clone(), value)
            })
            .collect()
    }

    fn expr(&mut self, expr: &Expr) -> ExprFn {
        if expr.is_literal() {
            let value = literal_value(expr);
            return expr_fn(move |_| Ok(value.clone()));
        }
        match expr {
            Expr::Var(name) => match self.scope.iter().rposition(|bound| bound == name) {
                Some(slot) => expr_fn(move |f| Ok(f.slot(slot))),
                None => {
                    let name = name.clone();
                    expr_fn(move |f| Ok(f.data.get(&name).cloned().unwrap_or_default()))
                }
            },
            Expr::Ij(key) => {
                let key = key.clone();
                expr_fn(move |f| Ok(f.ctx.ij_value(&key).unwrap_or_default()))
            }
            Expr::List(items) => {
                let items: Vec<ExprFn> = items.iter().map(|item| self.expr(item)).collect();
                expr_fn(move |f| {
                    Ok(Value::List(
                        items.iter().map(|item| item(f)).collect::<Result<_, _>>()?,
                    ))
                })
            }
            Expr::Field(base, field) => {
                let base = self.expr(base);
                let field = field.clone();
                expr_fn(move |f| Ok(get_field(base(f)?, &field)))
            }
            Expr::Unary(op, operand) => {
                let op = *op;
                let operand = self.expr(operand);
                expr_fn(move |f| apply_unary(op, operand(f)?))
            }
            Expr::Binary(BinaryOp::And, lhs, rhs) => {
                let (lhs, rhs) = (self.expr(lhs), self.expr(rhs));
                expr_fn(move |f| Ok(Value::Bool(lhs(f)?.is_truthy() && rhs(f)?.is_truthy())))
            }
            Expr::Binary(BinaryOp::Or, lhs, rhs) => {
                let (lhs, rhs) = (self.expr(lhs), self.expr(rhs));
                expr_fn(move |f| Ok(Value::Bool(lhs(f)?.is_truthy() || rhs(f)?.is_truthy())))
            }
            Expr::Binary(op, lhs, rhs) => {
                let op = *op;
                let (lhs, rhs) = (self.expr(lhs), self.expr(rhs));
                expr_fn(move |f| apply_binary(op, lhs(f)?, rhs(f)?))
            }
            Expr::Ternary(cond, then, otherwise) => {
                let (cond, then, otherwise) = (self.expr(cond), self.expr(then), self.expr(otherwise));
                expr_fn(move |f| {
                    if cond(f)?.is_truthy() {
                        then(f)
                    } else {
                        otherwise(f)
                    }
                })
            }
            Expr::Call { name, args, span } => {
                match function_arity(name) {
                    None => self.unsupported(span.clone(), format!("unknown function '{}'", name)),
                    Some(arity) if !arity.contains(&args.len()) => self.unsupported(
                        span.clone(),
                        format!("function '{}' called with {} arguments", name, args.len()),
                    ),
                    Some(_) => {}
                }
                let name = name.clone();
                let args: Vec<ExprFn> = args.iter().map(|arg| self.expr(arg)).collect();
                expr_fn(move |f| {
                    let args = args.iter().map(|arg| arg(f)).collect::<Result<Vec<_>, _>>()?;
                    call_function(&name, args, &f.ctx.shared)
                })
            }
            Expr::Null | Expr::Bool(_) | Expr::Int(_) | Expr::Float(_) | Expr::Str(_) => {
                let value = literal_value(expr);
                expr_fn(move |_| Ok(value.clone()))
            }
        }
    }
}

fn write_msg(
    parts: &[MsgOp],
    placeholders: &[Placeholder],
    escape: EscapeContext,
    f: &Frame<'_, '_>,
    out: &mut dyn Write,
) -> Result<(), RenderError> {
    for part in parts {
        match part {
            MsgOp::Text(text) => out.write_str(text)?,
            MsgOp::Placeholder(index) => {
                let placeholder = &placeholders[*index];
                let value = (placeholder.value)(f)?;
                out.write_str(&print_value(escape, value, &placeholder.directives))?;
            }
        }
    }
    Ok(())
}

fn literal_value(expr: &Expr) -> Value {
    match expr {
        Expr::Bool(b) => Value::Bool(*b),
        Expr::Int(i) => Value::Int(*i),
        Expr::Float(x) => Value::Float(*x),
        Expr::Str(s) => Value::String(s.clone()),
        Expr::List(items) => Value::List(items.iter().map(literal_value).collect()),
        _ => Value::Null,
    }
}

fn build_record(
    data: &CallDataFn,
    params: &[(String, ParamFn)],
    f: &mut Frame<'_, '_>,
) -> Result<Record, RenderError> {
    let base = match data {
        CallDataFn::None => CallBase::Empty,
        CallDataFn::All => CallBase::All(f.data),
        CallDataFn::Expr(expr) => CallBase::Value(expr(f)?),
    };
    let mut values = Vec::with_capacity(params.len());
    for (name, param) in params {
        let value = match param {
            ParamFn::Expr(expr) => expr(f)?,
            ParamFn::Block { kind, ops } => {
                let mut content = String::new();
                run(ops, f, &mut content)?;
                match kind {
                    Some(kind) => SanitizedContent::ordain(content, *kind).into(),
                    None => Value::String(content),
                }
            }
        };
        values.push((name.clone(), value));
    }
    call_record(base, values)
}

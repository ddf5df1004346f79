//! Tree-walking interpreter

use std::fmt::Write;
use std::sync::Arc;

use crate::data::{Record, SanitizedContent, Value};
use crate::escape::{print_value, EscapeContext};
use crate::eval::{eval, EvalError, Scope};
use crate::msgs::{resolve_parts, ResolvedPart};
use crate::renaming::{rename_id, rename_selector};
use crate::runtime::{
    call_record, check_required_params, css_class, nested_call, CallBase, RenderContext,
    SharedParams,
};
use crate::template::TemplateRegistry;
use crate::tree::{
    CallData, CallNode, CallParam, CallParamValue, DelCallNode, Expr, Node, TemplateNode,
};
use crate::RenderError;

use super::TemplateExecutor;

/// Executes templates by walking their tree directly
pub struct Interpreter {
    registry: Arc<TemplateRegistry>,
}

impl Interpreter {
    pub fn new(registry: Arc<TemplateRegistry>) -> Self {
        Self { registry }
    }
}

impl TemplateExecutor for Interpreter {
    fn execute(
        &self,
        template: &TemplateNode,
        data: &Record,
        ctx: &mut RenderContext<'_>,
        out: &mut dyn Write,
    ) -> Result<(), RenderError> {
        Walker {
            registry: &self.registry,
        }
        .render_template(template, data, ctx, out)
    }
}

/// Variables visible at one point of a body
struct WalkScope<'a> {
    data: &'a Record,
    locals: &'a [(String, Value)],
    ij: &'a Record,
    shared: &'a SharedParams,
}

impl Scope for WalkScope<'_> {
    fn var(&self, name: &str) -> Option<Value> {
        self.locals
            .iter()
            .rev()
            .find(|(local, _)| local == name)
            .map(|(_, value)| value.clone())
            .or_else(|| self.data.get(name).cloned())
    }

    fn ij(&self, key: &str) -> Option<Value> {
        self.ij.get(key).cloned()
    }

    fn shared(&self) -> &SharedParams {
        self.shared
    }
}

struct Walker<'a> {
    registry: &'a TemplateRegistry,
}

/// Per-template state threaded through a body
struct Frame<'d> {
    data: &'d Record,
    escape: EscapeContext,
    locals: Vec<(String, Value)>,
}

impl Frame<'_> {
    fn eval(&self, expr: &Expr, ctx: &RenderContext<'_>) -> Result<Value, EvalError> {
        eval(
            expr,
            &WalkScope {
                data: self.data,
                locals: &self.locals,
                ij: ctx.ij,
                shared: &ctx.shared,
            },
        )
    }
}

impl Walker<'_> {
    fn render_template(
        &self,
        template: &TemplateNode,
        data: &Record,
        ctx: &mut RenderContext<'_>,
        out: &mut dyn Write,
    ) -> Result<(), RenderError> {
        check_required_params(&template.name, &template.params, data)?;
        ctx.enter(&template.name)?;
        let mut frame = Frame {
            data,
            escape: EscapeContext::new(template.autoescape_mode, template.content_kind),
            locals: Vec::new(),
        };
        let result = self.render_body(&template.body, &mut frame, ctx, out);
        ctx.exit();
        result
    }

    fn render_body(
        &self,
        body: &[Node],
        frame: &mut Frame<'_>,
        ctx: &mut RenderContext<'_>,
        out: &mut dyn Write,
    ) -> Result<(), RenderError> {
        let mark = frame.locals.len();
        for node in body {
            self.render_node(node, frame, ctx, out)?;
        }
        frame.locals.truncate(mark);
        Ok(())
    }

    fn render_node(
        &self,
        node: &Node,
        frame: &mut Frame<'_>,
        ctx: &mut RenderContext<'_>,
        out: &mut dyn Write,
    ) -> Result<(), RenderError> {
        match node {
            Node::Text(text) => out.write_str(text)?,
            Node::Print { expr, directives } => {
                let value = frame.eval(expr, ctx)?;
                out.write_str(&print_value(frame.escape, value, directives))?;
            }
            Node::Msg(msg) => {
                for part in resolve_parts(msg, ctx.msgs)? {
                    match part {
                        ResolvedPart::Text(text) => out.write_str(&text)?,
                        ResolvedPart::Placeholder { expr, directives } => {
                            let value = frame.eval(expr, ctx)?;
                            out.write_str(&print_value(frame.escape, value, directives))?;
                        }
                    }
                }
            }
            Node::Css {
                component,
                selector,
            } => {
                let component = component
                    .as_ref()
                    .map(|c| frame.eval(c, ctx))
                    .transpose()?;
                let renamed = rename_selector(ctx.css_map, selector);
                out.write_str(&css_class(component.as_ref(), &renamed))?;
            }
            Node::Xid(id) => out.write_str(&rename_id(ctx.id_map, id))?,
            Node::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    if frame.eval(cond, ctx)?.is_truthy() {
                        return self.render_body(body, frame, ctx, out);
                    }
                }
                if let Some(body) = otherwise {
                    self.render_body(body, frame, ctx, out)?;
                }
            }
            Node::For {
                var,
                list,
                body,
                if_empty,
            } => {
                let items = match frame.eval(list, ctx)? {
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
                    if let Some(body) = if_empty {
                        self.render_body(body, frame, ctx, out)?;
                    }
                }
                for item in items {
                    frame.locals.push((var.clone(), item));
                    let result = self.render_body(body, frame, ctx, out);
                    frame.locals.pop();
                    result?;
                }
            }
            Node::Let { var, value } => {
                let value = frame.eval(value, ctx)?;
                frame.locals.push((var.clone(), value));
            }
            Node::Call(call) => self.render_call(call, frame, ctx, out)?,
            Node::DelCall(call) => self.render_delcall(call, frame, ctx, out)?,
        }
        Ok(())
    }

    #[inline(never)]
    fn render_call(
        &self,
        call: &CallNode,
        frame: &mut Frame<'_>,
        ctx: &mut RenderContext<'_>,
        out: &mut dyn Write,
    ) -> Result<(), RenderError> {
        let callee = self
            .registry
            .get(&call.callee)
            .ok_or_else(|| RenderError::UndefinedTemplate {
                name: call.callee.clone(),
            })?;
        let data = self.call_data(&call.data, &call.params, frame, ctx)?;
        nested_call(|| self.render_template(callee, &data, ctx, out))
    }

    #[inline(never)]
    fn render_delcall(
        &self,
        call: &DelCallNode,
        frame: &mut Frame<'_>,
        ctx: &mut RenderContext<'_>,
        out: &mut dyn Write,
    ) -> Result<(), RenderError> {
        match self
            .registry
            .select_delegate(&call.name, &call.variant, ctx.active_packages)?
        {
            Some(callee) => {
                let data = self.call_data(&call.data, &call.params, frame, ctx)?;
                nested_call(|| self.render_template(callee, &data, ctx, out))
            }
            None if call.allow_empty_default => Ok(()),
            None => Err(RenderError::UndefinedDelegate {
                name: call.name.clone(),
                variant: call.variant.clone(),
            }),
        }
    }

    fn call_data(
        &self,
        data: &CallData,
        params: &[CallParam],
        frame: &mut Frame<'_>,
        ctx: &mut RenderContext<'_>,
    ) -> Result<Record, RenderError> {
        let base = match data {
            CallData::None => CallBase::Empty,
            CallData::All => CallBase::All(frame.data),
            CallData::Expr(expr) => CallBase::Value(frame.eval(expr, ctx)?),
        };

        let mut values = Vec::with_capacity(params.len());
        for param in params {
            let value = match &param.value {
                CallParamValue::Expr(expr) => frame.eval(expr, ctx)?,
                CallParamValue::Block { kind, body } => {
                    let mut content = String::new();
                    let outer = frame.escape;
                    frame.escape = outer.for_block(*kind);
                    let result = self.render_body(body, frame, ctx, &mut content);
                    frame.escape = outer;
                    result?;
                    match kind {
                        Some(kind) => SanitizedContent::ordain(content, *kind).into(),
                        None => Value::String(content),
                    }
                }
            };
            values.push((param.name.clone(), value));
        }
        call_record(base, values)
    }
}

//! Template tree
//!
//! A [`FileSet`] is the validated, immutable form of a set of source files.
//! Pipelines that need to change it work on a clone.

pub mod builder;
pub mod expr;

use std::collections::BTreeMap;

use crate::data::ContentKind;
use crate::escape::PrintDirective;
use crate::parser::Span;

pub use builder::build_file_set;
pub use expr::{BinaryOp, Expr, UnaryOp};

/// Who may render a template directly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    #[default]
    Public,
    Private,
    LegacyPrivate,
}

impl Visibility {
    pub fn attribute_value(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::LegacyPrivate => "legacy-private",
        }
    }

    pub fn from_attribute_value(value: &str) -> Option<Self> {
        [Visibility::Public, Visibility::Private, Visibility::LegacyPrivate]
            .into_iter()
            .find(|v| v.attribute_value() == value)
    }
}

/// How printed values are escaped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AutoescapeMode {
    /// Escaping follows the declared content kind
    #[default]
    Strict,
    Contextual,
    NonContextual,
    NoAutoescape,
}

impl AutoescapeMode {
    pub const ALL: [AutoescapeMode; 4] = [
        AutoescapeMode::Strict,
        AutoescapeMode::Contextual,
        AutoescapeMode::NonContextual,
        AutoescapeMode::NoAutoescape,
    ];

    pub fn attribute_value(self) -> &'static str {
        match self {
            AutoescapeMode::Strict => "strict",
            AutoescapeMode::Contextual => "contextual",
            AutoescapeMode::NonContextual => "deprecated-noncontextual",
            AutoescapeMode::NoAutoescape => "deprecated-noautoescape",
        }
    }

    pub fn from_attribute_value(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.attribute_value() == value)
    }
}

/// An ordered collection of files compiled together
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FileSet {
    pub files: Vec<FileNode>,
}

impl FileSet {
    pub fn templates(&self) -> impl Iterator<Item = &TemplateNode> {
        self.files.iter().flat_map(|f| f.templates.iter())
    }

    pub fn templates_mut(&mut self) -> impl Iterator<Item = &mut TemplateNode> {
        self.files.iter_mut().flat_map(|f| f.templates.iter_mut())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileNode {
    pub path: String,
    pub namespace: String,
    pub delegate_package: Option<String>,
    pub default_autoescape: AutoescapeMode,
    pub alias_to_namespace: BTreeMap<String, String>,
    pub required_css_namespaces: Vec<String>,
    pub css_base: Option<String>,
    pub templates: Vec<TemplateNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateKind {
    Basic,
    Delegate {
        delegate_name: String,
        variant: String,
        package: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateNode {
    /// Fully-qualified name; delegates use [`TemplateNode::unique_name`] in registries
    pub name: String,
    pub partial_name: Option<String>,
    pub kind: TemplateKind,
    pub visibility: Visibility,
    pub autoescape_mode: AutoescapeMode,
    /// Present iff `autoescape_mode` is strict
    pub content_kind: Option<ContentKind>,
    pub params: Vec<Param>,
    pub required_css_namespaces: Vec<String>,
    pub css_base: Option<String>,
    pub body: Vec<Node>,
    pub file: String,
    pub span: Span,
}

impl TemplateNode {
    pub fn is_strict(&self) -> bool {
        self.autoescape_mode == AutoescapeMode::Strict
    }

    /// Name unique across the file set, distinguishing delegate implementations
    pub fn unique_name(&self) -> String {
        match &self.kind {
            TemplateKind::Basic => self.name.clone(),
            TemplateKind::Delegate {
                delegate_name,
                variant,
                package,
            } => format!(
                "{}:{}:{}",
                delegate_name,
                variant,
                package.as_deref().unwrap_or("")
            ),
        }
    }
}

/// A statement in a template body
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Print {
        expr: Expr,
        directives: Vec<PrintDirective>,
    },
    Msg(MsgNode),
    /// A style selector, optionally prefixed by a component expression
    Css {
        component: Option<Expr>,
        selector: String,
    },
    /// An element id rewritten through the id-renaming map
    Xid(String),
    If {
        branches: Vec<(Expr, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    },
    For {
        var: String,
        list: Expr,
        body: Vec<Node>,
        if_empty: Option<Vec<Node>>,
    },
    Let {
        var: String,
        value: Expr,
    },
    Call(CallNode),
    DelCall(DelCallNode),
}

impl Node {
    /// Child bodies, in source order
    pub fn bodies(&self) -> Vec<&Vec<Node>> {
        match self {
            Node::If {
                branches,
                otherwise,
            } => branches
                .iter()
                .map(|(_, body)| body)
                .chain(otherwise.iter())
                .collect(),
            Node::For { body, if_empty, .. } => {
                std::iter::once(body).chain(if_empty.iter()).collect()
            }
            Node::Call(call) => call.params.iter().filter_map(CallParam::block).collect(),
            Node::DelCall(call) => call.params.iter().filter_map(CallParam::block).collect(),
            _ => Vec::new(),
        }
    }

    pub fn bodies_mut(&mut self) -> Vec<&mut Vec<Node>> {
        match self {
            Node::If {
                branches,
                otherwise,
            } => branches
                .iter_mut()
                .map(|(_, body)| body)
                .chain(otherwise.iter_mut())
                .collect(),
            Node::For { body, if_empty, .. } => {
                std::iter::once(body).chain(if_empty.iter_mut()).collect()
            }
            Node::Call(call) => call
                .params
                .iter_mut()
                .filter_map(CallParam::block_mut)
                .collect(),
            Node::DelCall(call) => call
                .params
                .iter_mut()
                .filter_map(CallParam::block_mut)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Expressions held directly by this node (not by child bodies)
    pub fn exprs(&self) -> Vec<&Expr> {
        match self {
            Node::Print { expr, .. } => vec![expr],
            Node::Msg(msg) => msg
                .parts
                .iter()
                .filter_map(|part| match part {
                    MsgPart::Placeholder { expr, .. } => Some(expr),
                    MsgPart::Text(_) => None,
                })
                .collect(),
            Node::Css { component, .. } => component.iter().collect(),
            Node::If { branches, .. } => branches.iter().map(|(cond, _)| cond).collect(),
            Node::For { list, .. } => vec![list],
            Node::Let { value, .. } => vec![value],
            Node::Call(call) => call_exprs(&call.data, &call.params),
            Node::DelCall(call) => call_exprs(&call.data, &call.params),
            Node::Text(_) | Node::Xid(_) => Vec::new(),
        }
    }

    pub fn exprs_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Node::Print { expr, .. } => vec![expr],
            Node::Msg(msg) => msg
                .parts
                .iter_mut()
                .filter_map(|part| match part {
                    MsgPart::Placeholder { expr, .. } => Some(expr),
                    MsgPart::Text(_) => None,
                })
                .collect(),
            Node::Css { component, .. } => component.iter_mut().collect(),
            Node::If { branches, .. } => branches.iter_mut().map(|(cond, _)| cond).collect(),
            Node::For { list, .. } => vec![list],
            Node::Let { value, .. } => vec![value],
            Node::Call(call) => call_exprs_mut(&mut call.data, &mut call.params),
            Node::DelCall(call) => call_exprs_mut(&mut call.data, &mut call.params),
            Node::Text(_) | Node::Xid(_) => Vec::new(),
        }
    }
}

fn call_exprs<'a>(data: &'a CallData, params: &'a [CallParam]) -> Vec<&'a Expr> {
    let mut exprs: Vec<&Expr> = match data {
        CallData::Expr(expr) => vec![expr],
        CallData::None | CallData::All => Vec::new(),
    };
    exprs.extend(params.iter().filter_map(|p| match &p.value {
        CallParamValue::Expr(expr) => Some(expr),
        CallParamValue::Block { .. } => None,
    }));
    exprs
}

fn call_exprs_mut<'a>(data: &'a mut CallData, params: &'a mut [CallParam]) -> Vec<&'a mut Expr> {
    let mut exprs: Vec<&mut Expr> = match data {
        CallData::Expr(expr) => vec![expr],
        CallData::None | CallData::All => Vec::new(),
    };
    exprs.extend(params.iter_mut().filter_map(|p| match &mut p.value {
        CallParamValue::Expr(expr) => Some(expr),
        CallParamValue::Block { .. } => None,
    }));
    exprs
}

/// Visit every node of a body, parents before children
pub fn walk_nodes<'a>(nodes: &'a [Node], f: &mut dyn FnMut(&'a Node)) {
    for node in nodes {
        f(node);
        for body in node.bodies() {
            walk_nodes(body, f);
        }
    }
}

/// A translatable message
#[derive(Debug, Clone, PartialEq)]
pub struct MsgNode {
    /// Fingerprint of meaning and text, used as the catalog key
    pub id: u64,
    pub meaning: Option<String>,
    pub desc: Option<String>,
    pub parts: Vec<MsgPart>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MsgPart {
    Text(String),
    Placeholder {
        name: String,
        expr: Expr,
        directives: Vec<PrintDirective>,
    },
}

/// What a call passes as the callee's data record
#[derive(Debug, Clone, PartialEq)]
pub enum CallData {
    None,
    /// `data="all"`: the caller's own data
    All,
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallParam {
    pub name: String,
    pub value: CallParamValue,
}

impl CallParam {
    fn block(&self) -> Option<&Vec<Node>> {
        match &self.value {
            CallParamValue::Block { body, .. } => Some(body),
            CallParamValue::Expr(_) => None,
        }
    }

    fn block_mut(&mut self) -> Option<&mut Vec<Node>> {
        match &mut self.value {
            CallParamValue::Block { body, .. } => Some(body),
            CallParamValue::Expr(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallParamValue {
    Expr(Expr),
    /// Rendered content; `kind` is set when the block produces sanitized content
    Block {
        kind: Option<ContentKind>,
        body: Vec<Node>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallNode {
    /// Fully-qualified callee, resolved against namespace and aliases
    pub callee: String,
    pub data: CallData,
    pub params: Vec<CallParam>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DelCallNode {
    pub name: String,
    pub variant: String,
    pub data: CallData,
    pub params: Vec<CallParam>,
    pub allow_empty_default: bool,
    pub span: Span,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visibility_attribute_values() {
        assert_eq!(
            Visibility::from_attribute_value("legacy-private"),
            Some(Visibility::LegacyPrivate)
        );
        assert_eq!(Visibility::from_attribute_value("internal"), None);
    }

    #[test]
    fn test_autoescape_attribute_values() {
        assert_eq!(
            AutoescapeMode::from_attribute_value("deprecated-noncontextual"),
            Some(AutoescapeMode::NonContextual)
        );
        assert_eq!(AutoescapeMode::default(), AutoescapeMode::Strict);
    }

    #[test]
    fn test_walk_nodes_visits_nested_bodies() {
        let body = vec![Node::If {
            branches: vec![(Expr::Bool(true), vec![Node::Xid("a".to_string())])],
            otherwise: Some(vec![Node::Text("b".to_string())]),
        }];
        let mut count = 0;
        walk_nodes(&body, &mut |_| count += 1);
        assert_eq!(count, 3);
    }
}

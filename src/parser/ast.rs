//! Syntax tree produced by the grammar
//!
//! This is the unvalidated shape of one source file. The tree builder turns it
//! into [`crate::tree::FileNode`]s, checking headers, aliases and attributes on
//! the way.

pub use crate::tree::expr::Expr;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// AST node with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub node: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { node, span }
    }
}

/// `name = value` on a header, declaration or statement
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: Spanned<String>,
    pub value: Spanned<Expr>,
}

/// Root AST node - one template source file
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceFile {
    pub headers: Vec<Spanned<Header>>,
    pub templates: Vec<TemplateDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Header {
    /// `namespace a.b attr="..."`
    Namespace {
        name: String,
        attributes: Vec<Attribute>,
    },
    /// `alias a.b.c [as c]`
    Alias {
        namespace: String,
        alias: Option<Spanned<String>>,
    },
    /// `delpackage name`
    Delpackage(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateDeclKind {
    /// `template .name`
    Basic { partial_name: String },
    /// `deltemplate dotted.name`
    Delegate { name: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDecl {
    pub kind: TemplateDeclKind,
    pub attributes: Vec<Attribute>,
    pub params: Vec<Spanned<ParamDecl>>,
    pub body: Vec<Spanned<Stmt>>,
    pub span: Span,
}

/// `param name` or `param? name`
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub required: bool,
}

/// Name of a called template as written
#[derive(Debug, Clone, PartialEq)]
pub enum CalleeName {
    /// `.name`, completed with the file namespace
    Relative(String),
    /// `a.b.name`, possibly starting with an alias
    Dotted(String),
}

/// Print directive: `|name`
pub type Directive = Spanned<String>;

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `"literal text"`
    Text(String),
    /// `print expr |directive` or the `$var.path` shorthand
    Print {
        expr: Expr,
        directives: Vec<Directive>,
    },
    /// `msg desc=".." meaning=".." { parts }`
    Msg {
        attributes: Vec<Attribute>,
        parts: Vec<Spanned<MsgPartDecl>>,
    },
    /// `css [component,] "selector"`
    Css {
        component: Option<Expr>,
        selector: Spanned<String>,
    },
    /// `xid "name"`
    Xid(String),
    If {
        branches: Vec<(Expr, Vec<Spanned<Stmt>>)>,
        otherwise: Option<Vec<Spanned<Stmt>>>,
    },
    For {
        var: String,
        list: Expr,
        body: Vec<Spanned<Stmt>>,
        if_empty: Option<Vec<Spanned<Stmt>>>,
    },
    Let {
        var: String,
        value: Expr,
    },
    Call {
        callee: Spanned<CalleeName>,
        attributes: Vec<Attribute>,
        params: Vec<CallParamDecl>,
    },
    Delcall {
        name: Spanned<String>,
        attributes: Vec<Attribute>,
        params: Vec<CallParamDecl>,
    },
}

/// Message content: text and placeholders only
#[derive(Debug, Clone, PartialEq)]
pub enum MsgPartDecl {
    Text(String),
    Print {
        expr: Expr,
        directives: Vec<Directive>,
    },
}

/// `param name = expr` or `param name kind=".." { body }` inside a call
#[derive(Debug, Clone, PartialEq)]
pub struct CallParamDecl {
    pub name: Spanned<String>,
    pub value: CallParamValueDecl,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallParamValueDecl {
    Expr(Expr),
    Block {
        attributes: Vec<Attribute>,
        body: Vec<Spanned<Stmt>>,
    },
}

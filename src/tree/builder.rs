//! Builds validated [`FileNode`]s from parsed source files
//!
//! Every check reports into an [`ErrorReporter`] and carries on, so a single
//! pass surfaces all problems in a file set.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::data::ContentKind;
use crate::error::{CompileError, CompileErrorKind, CompileErrors, ErrorReporter};
use crate::escape::PrintDirective;
use crate::msgs::{message_id, name_placeholders};
use crate::parser::{
    self, Attribute, CallParamDecl, CallParamValueDecl, CalleeName, Directive, Header,
    MsgPartDecl, SourceFile, Span, Spanned, Stmt, TemplateDecl, TemplateDeclKind,
};
use crate::tree::{
    AutoescapeMode, CallData, CallNode, CallParam, CallParamValue, DelCallNode, Expr, FileNode,
    FileSet, MsgNode, MsgPart, Node, Param, TemplateKind, TemplateNode, Visibility,
};

/// Parse and build a file set from `(path, source)` pairs
pub fn build_file_set(sources: &[(String, String)]) -> Result<FileSet, CompileErrors> {
    let mut reporter = ErrorReporter::new();
    let checkpoint = reporter.checkpoint();
    let mut files = Vec::with_capacity(sources.len());

    for (path, text) in sources {
        match parser::parse(text) {
            Ok(source) => {
                if let Some(file) = build_file(path, source, &mut reporter) {
                    files.push(file);
                }
            }
            Err(errors) => {
                for err in errors {
                    reporter.report(CompileError::syntax(path.as_str(), err));
                }
            }
        }
    }

    reporter.finish_since(checkpoint, FileSet { files })
}

/// Validate one parsed file; `None` when the file has no usable namespace
pub fn build_file(
    path: &str,
    source: SourceFile,
    reporter: &mut ErrorReporter,
) -> Option<FileNode> {
    let mut namespace: Option<(String, Vec<Attribute>)> = None;
    let mut delegate_package: Option<String> = None;
    let mut aliases = Vec::new();

    for header in source.headers {
        match header.node {
            Header::Namespace { name, attributes } => {
                if namespace.is_some() {
                    reporter.report_at(
                        path,
                        header.span,
                        CompileErrorKind::DuplicateHeader { header: "namespace" },
                    );
                } else {
                    namespace = Some((name, attributes));
                }
            }
            Header::Delpackage(name) => {
                if delegate_package.is_some() {
                    reporter.report_at(
                        path,
                        header.span,
                        CompileErrorKind::DuplicateHeader {
                            header: "delpackage",
                        },
                    );
                } else {
                    delegate_package = Some(name);
                }
            }
            Header::Alias {
                namespace: aliased,
                alias,
            } => aliases.push((aliased, alias, header.span)),
        }
    }

    let Some((namespace, namespace_attributes)) = namespace else {
        reporter.report_at(path, 0..0, CompileErrorKind::MissingNamespace);
        return None;
    };

    let mut attrs = AttributeReader::new(path, "namespace", reporter);
    let mut default_autoescape = AutoescapeMode::default();
    let mut required_css_namespaces = Vec::new();
    let mut css_base = None;
    for attr in &namespace_attributes {
        match attr.name.node.as_str() {
            "autoescape" => {
                if let Some(mode) = attrs.autoescape(attr) {
                    default_autoescape = mode;
                }
            }
            "requirecss" => required_css_namespaces = attrs.list(attr).unwrap_or_default(),
            "cssbase" => css_base = attrs.string(attr),
            _ => attrs.unknown(attr),
        }
    }

    let alias_to_namespace = build_aliases(path, &namespace, aliases, reporter);

    let mut file = FileNode {
        path: path.to_string(),
        namespace,
        delegate_package,
        default_autoescape,
        alias_to_namespace,
        required_css_namespaces,
        css_base,
        templates: Vec::new(),
    };

    for decl in source.templates {
        let template = build_template(&file, decl, reporter);
        file.templates.push(template);
    }

    debug!(file = path, templates = file.templates.len(), "built file");
    Some(file)
}

fn build_aliases(
    path: &str,
    namespace: &str,
    aliases: Vec<(String, Option<Spanned<String>>, Span)>,
    reporter: &mut ErrorReporter,
) -> BTreeMap<String, String> {
    let alias_for_file_namespace = last_part(namespace);
    let mut alias_to_namespace: BTreeMap<String, String> = BTreeMap::new();

    for (aliased, alias, span) in aliases {
        let alias = alias
            .map(|a| a.node)
            .unwrap_or_else(|| last_part(&aliased).to_string());

        if alias == "as" {
            reporter.report_at(
                path,
                span.clone(),
                CompileErrorKind::AliasNamedAs {
                    namespace: aliased.clone(),
                },
            );
        }
        if alias == alias_for_file_namespace && aliased != namespace {
            reporter.report_at(
                path,
                span.clone(),
                CompileErrorKind::InvalidAliasForLastNamespacePart {
                    namespace: namespace.to_string(),
                    aliased: aliased.clone(),
                },
            );
        }
        match alias_to_namespace.get(&alias) {
            Some(existing) if *existing != aliased => {
                reporter.report_at(
                    path,
                    span,
                    CompileErrorKind::DuplicateAlias {
                        first: existing.clone(),
                        second: aliased,
                    },
                );
            }
            Some(_) => {}
            None => {
                alias_to_namespace.insert(alias, aliased);
            }
        }
    }

    alias_to_namespace
}

fn last_part(dotted: &str) -> &str {
    dotted.rsplit('.').next().unwrap_or(dotted)
}

/// `some.test.package` becomes `someTestPackage`
pub fn css_base_prefix(base: &str) -> String {
    let mut out = String::with_capacity(base.len());
    for (i, part) in base.split('.').enumerate() {
        let mut chars = part.chars();
        match chars.next() {
            Some(first) if i > 0 => {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
            Some(_) => out.push_str(part),
            None => {}
        }
    }
    out
}

fn build_template(file: &FileNode, decl: TemplateDecl, reporter: &mut ErrorReporter) -> TemplateNode {
    let path = file.path.as_str();
    let (name, partial_name, is_delegate) = match &decl.kind {
        TemplateDeclKind::Basic { partial_name } => (
            format!("{}.{}", file.namespace, partial_name),
            Some(format!(".{}", partial_name)),
            false,
        ),
        TemplateDeclKind::Delegate { name } => (name.clone(), None, true),
    };

    let command = if is_delegate { "deltemplate" } else { "template" };
    let mut attrs = AttributeReader::new(path, command, reporter);
    let mut private: Option<bool> = None;
    let mut visibility: Option<Visibility> = None;
    let mut autoescape_mode = file.default_autoescape;
    let mut kind: Option<(ContentKind, Span)> = None;
    let mut required_css_namespaces = Vec::new();
    let mut css_base = None;
    let mut variant = String::new();

    for attr in &decl.attributes {
        match attr.name.node.as_str() {
            "private" => private = attrs.boolean(attr),
            "visibility" => {
                visibility = attrs.string(attr).and_then(|value| {
                    let parsed = Visibility::from_attribute_value(&value);
                    if parsed.is_none() {
                        attrs.invalid(attr, &value, "one of private, legacy-private, public");
                    }
                    parsed
                })
            }
            "autoescape" => {
                if let Some(mode) = attrs.autoescape(attr) {
                    autoescape_mode = mode;
                }
            }
            "kind" => kind = attrs.content_kind(attr).map(|k| (k, attr.value.span.clone())),
            "requirecss" => required_css_namespaces = attrs.list(attr).unwrap_or_default(),
            "cssbase" => css_base = attrs.string(attr),
            "variant" if is_delegate => variant = attrs.string(attr).unwrap_or_default(),
            _ => attrs.unknown(attr),
        }
    }

    let visibility = match (private, visibility) {
        (Some(_), Some(v)) => {
            reporter.report_at(
                path,
                decl.span.clone(),
                CompileErrorKind::ConflictingVisibility {
                    template: name.clone(),
                },
            );
            v
        }
        (Some(true), None) => Visibility::LegacyPrivate,
        (Some(false), None) | (None, None) => Visibility::Public,
        (None, Some(v)) => v,
    };

    let content_kind = match (autoescape_mode, kind) {
        (AutoescapeMode::Strict, kind) => Some(kind.map(|(k, _)| k).unwrap_or(ContentKind::Html)),
        (_, Some((_, span))) => {
            reporter.report_at(
                path,
                span,
                CompileErrorKind::KindRequiresStrict {
                    template: name.clone(),
                },
            );
            None
        }
        (_, None) => None,
    };

    let mut seen_params = HashSet::new();
    let mut params = Vec::with_capacity(decl.params.len());
    for param in decl.params {
        if !seen_params.insert(param.node.name.clone()) {
            reporter.report_at(
                path,
                param.span,
                CompileErrorKind::DuplicateParam {
                    name: param.node.name,
                },
            );
            continue;
        }
        params.push(Param {
            name: param.node.name,
            required: param.node.required,
        });
    }

    let template_kind = if is_delegate {
        TemplateKind::Delegate {
            delegate_name: name.clone(),
            variant,
            package: file.delegate_package.clone(),
        }
    } else {
        TemplateKind::Basic
    };

    let css_package = css_base
        .clone()
        .or_else(|| file.css_base.clone())
        .or_else(|| required_css_namespaces.first().cloned())
        .or_else(|| file.required_css_namespaces.first().cloned());

    let ctx = BodyContext {
        file,
        strict: autoescape_mode == AutoescapeMode::Strict,
        css_package,
    };
    let body = ctx.build_body(decl.body, reporter);

    TemplateNode {
        name,
        partial_name,
        kind: template_kind,
        visibility,
        autoescape_mode,
        content_kind,
        params,
        required_css_namespaces,
        css_base,
        body,
        file: file.path.clone(),
        span: decl.span,
    }
}

/// Reads attribute values, reporting malformed ones
struct AttributeReader<'r> {
    path: &'r str,
    command: &'static str,
    reporter: &'r mut ErrorReporter,
}

impl<'r> AttributeReader<'r> {
    fn new(path: &'r str, command: &'static str, reporter: &'r mut ErrorReporter) -> Self {
        Self {
            path,
            command,
            reporter,
        }
    }

    fn invalid(&mut self, attr: &Attribute, value: &str, expected: &str) {
        self.reporter.report_at(
            self.path,
            attr.value.span.clone(),
            CompileErrorKind::InvalidAttributeValue {
                attribute: attr.name.node.clone(),
                value: value.to_string(),
                expected: expected.to_string(),
            },
        );
    }

    fn unknown(&mut self, attr: &Attribute) {
        self.reporter.report_at(
            self.path,
            attr.name.span.clone(),
            CompileErrorKind::UnknownAttribute {
                attribute: attr.name.node.clone(),
                command: self.command.to_string(),
            },
        );
    }

    fn string(&mut self, attr: &Attribute) -> Option<String> {
        match &attr.value.node {
            Expr::Str(s) => Some(s.clone()),
            other => {
                self.invalid(attr, &format!("{:?}", other), "a string literal");
                None
            }
        }
    }

    fn list(&mut self, attr: &Attribute) -> Option<Vec<String>> {
        self.string(attr).map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect()
        })
    }

    fn boolean(&mut self, attr: &Attribute) -> Option<bool> {
        let value = self.string(attr)?;
        match value.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => {
                self.invalid(attr, &value, "true or false");
                None
            }
        }
    }

    fn autoescape(&mut self, attr: &Attribute) -> Option<AutoescapeMode> {
        let value = self.string(attr)?;
        let mode = AutoescapeMode::from_attribute_value(&value);
        if mode.is_none() {
            self.invalid(
                attr,
                &value,
                "one of strict, contextual, deprecated-noncontextual, deprecated-noautoescape",
            );
        }
        mode
    }

    fn content_kind(&mut self, attr: &Attribute) -> Option<ContentKind> {
        let value = self.string(attr)?;
        let kind = ContentKind::from_attribute_value(&value);
        if kind.is_none() {
            self.invalid(attr, &value, "one of html, attributes, js, css, uri, text");
        }
        kind
    }
}

struct BodyContext<'f> {
    file: &'f FileNode,
    strict: bool,
    css_package: Option<String>,
}

impl BodyContext<'_> {
    fn path(&self) -> &str {
        &self.file.path
    }

    fn build_body(&self, stmts: Vec<Spanned<Stmt>>, reporter: &mut ErrorReporter) -> Vec<Node> {
        stmts
            .into_iter()
            .filter_map(|stmt| self.build_stmt(stmt, reporter))
            .collect()
    }

    fn build_stmt(&self, stmt: Spanned<Stmt>, reporter: &mut ErrorReporter) -> Option<Node> {
        let span = stmt.span;
        Some(match stmt.node {
            Stmt::Text(text) => Node::Text(text),
            Stmt::Print { expr, directives } => Node::Print {
                expr,
                directives: self.directives(directives, reporter),
            },
            Stmt::Msg { attributes, parts } => Node::Msg(self.build_msg(attributes, parts, reporter)),
            Stmt::Css {
                component,
                selector,
            } => {
                let Some(relative) = selector.node.strip_prefix('%') else {
                    return Some(Node::Css {
                        component,
                        selector: selector.node,
                    });
                };
                if component.is_some() {
                    reporter.report_at(
                        self.path(),
                        selector.span,
                        CompileErrorKind::CssComponentWithPackageRelative {
                            selector: selector.node.clone(),
                        },
                    );
                    return None;
                }
                match &self.css_package {
                    Some(package) => Node::Css {
                        component: None,
                        selector: format!("{}{}", css_base_prefix(package), relative),
                    },
                    None => {
                        reporter.report_at(
                            self.path(),
                            selector.span,
                            CompileErrorKind::MissingCssPackage {
                                selector: selector.node.clone(),
                            },
                        );
                        return None;
                    }
                }
            }
            Stmt::Xid(id) => Node::Xid(id),
            Stmt::If {
                branches,
                otherwise,
            } => Node::If {
                branches: branches
                    .into_iter()
                    .map(|(cond, body)| (cond, self.build_body(body, reporter)))
                    .collect(),
                otherwise: otherwise.map(|body| self.build_body(body, reporter)),
            },
            Stmt::For {
                var,
                list,
                body,
                if_empty,
            } => Node::For {
                var,
                list,
                body: self.build_body(body, reporter),
                if_empty: if_empty.map(|body| self.build_body(body, reporter)),
            },
            Stmt::Let { var, value } => Node::Let { var, value },
            Stmt::Call {
                callee,
                attributes,
                params,
            } => {
                let mut data = CallData::None;
                let mut attrs = AttributeReader::new(self.path(), "call", reporter);
                for attr in &attributes {
                    match attr.name.node.as_str() {
                        "data" => data = call_data(attr),
                        _ => attrs.unknown(attr),
                    }
                }
                Node::Call(CallNode {
                    callee: self.resolve_callee(&callee.node),
                    data,
                    params: self.call_params(params, reporter),
                    span,
                })
            }
            Stmt::Delcall {
                name,
                attributes,
                params,
            } => {
                let mut data = CallData::None;
                let mut variant = String::new();
                let mut allow_empty_default = false;
                let mut attrs = AttributeReader::new(self.path(), "delcall", reporter);
                for attr in &attributes {
                    match attr.name.node.as_str() {
                        "data" => data = call_data(attr),
                        "variant" => variant = attrs.string(attr).unwrap_or_default(),
                        "allowemptydefault" => {
                            allow_empty_default = attrs.boolean(attr).unwrap_or(false)
                        }
                        _ => attrs.unknown(attr),
                    }
                }
                Node::DelCall(DelCallNode {
                    name: name.node,
                    variant,
                    data,
                    params: self.call_params(params, reporter),
                    allow_empty_default,
                    span,
                })
            }
        })
    }

    fn directives(
        &self,
        directives: Vec<Directive>,
        reporter: &mut ErrorReporter,
    ) -> Vec<PrintDirective> {
        directives
            .into_iter()
            .filter_map(|d| {
                let parsed = PrintDirective::from_name(&d.node);
                if parsed.is_none() {
                    reporter.report_at(
                        self.path(),
                        d.span,
                        CompileErrorKind::UnknownPrintDirective { name: d.node },
                    );
                }
                parsed
            })
            .collect()
    }

    fn build_msg(
        &self,
        attributes: Vec<Attribute>,
        parts: Vec<Spanned<MsgPartDecl>>,
        reporter: &mut ErrorReporter,
    ) -> MsgNode {
        let mut meaning = None;
        let mut desc = None;
        let mut attrs = AttributeReader::new(self.path(), "msg", reporter);
        for attr in &attributes {
            match attr.name.node.as_str() {
                "meaning" => meaning = attrs.string(attr),
                "desc" => desc = attrs.string(attr),
                _ => attrs.unknown(attr),
            }
        }

        let mut built = Vec::with_capacity(parts.len());
        let mut placeholders = Vec::new();
        for part in parts {
            match part.node {
                MsgPartDecl::Text(text) => built.push(MsgPart::Text(text)),
                MsgPartDecl::Print { expr, directives } => {
                    let directives = self.directives(directives, reporter);
                    placeholders.push((expr.clone(), directives.clone()));
                    built.push(MsgPart::Placeholder {
                        name: String::new(),
                        expr,
                        directives,
                    });
                }
            }
        }

        let mut names = name_placeholders(&placeholders).into_iter();
        for part in &mut built {
            if let MsgPart::Placeholder { name, .. } = part {
                *name = names.next().unwrap_or_default();
            }
        }

        MsgNode {
            id: message_id(meaning.as_deref(), &built),
            meaning,
            desc,
            parts: built,
        }
    }

    fn resolve_callee(&self, callee: &CalleeName) -> String {
        match callee {
            CalleeName::Relative(name) => format!("{}.{}", self.file.namespace, name),
            CalleeName::Dotted(dotted) => match dotted.split_once('.') {
                Some((first, rest)) => match self.file.alias_to_namespace.get(first) {
                    Some(namespace) => format!("{}.{}", namespace, rest),
                    None => dotted.clone(),
                },
                None => dotted.clone(),
            },
        }
    }

    fn call_params(
        &self,
        params: Vec<CallParamDecl>,
        reporter: &mut ErrorReporter,
    ) -> Vec<CallParam> {
        params
            .into_iter()
            .map(|param| {
                let value = match param.value {
                    CallParamValueDecl::Expr(expr) => CallParamValue::Expr(expr),
                    CallParamValueDecl::Block { attributes, body } => {
                        let mut kind = self.strict.then_some(ContentKind::Html);
                        let mut attrs = AttributeReader::new(self.path(), "param", reporter);
                        for attr in &attributes {
                            match attr.name.node.as_str() {
                                "kind" => {
                                    if let Some(k) = attrs.content_kind(attr) {
                                        kind = Some(k);
                                    }
                                }
                                _ => attrs.unknown(attr),
                            }
                        }
                        CallParamValue::Block {
                            kind,
                            body: self.build_body(body, reporter),
                        }
                    }
                };
                CallParam {
                    name: param.name.node,
                    value,
                }
            })
            .collect()
    }
}

fn call_data(attr: &Attribute) -> CallData {
    match &attr.value.node {
        Expr::Str(s) if s == "all" => CallData::All,
        other => CallData::Expr(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::walk_nodes;
    use indoc::indoc;

    fn build(source: &str) -> Result<FileSet, CompileErrors> {
        build_file_set(&[("test.tpl".to_string(), source.to_string())])
    }

    fn build_ok(source: &str) -> FileSet {
        match build(source) {
            Ok(set) => set,
            Err(errs) => panic!("build failed: {}", errs),
        }
    }

    fn error_kinds(source: &str) -> Vec<CompileErrorKind> {
        match build(source) {
            Ok(_) => panic!("expected errors"),
            Err(errs) => errs.iter().map(|e| e.kind.clone()).collect(),
        }
    }

    #[test]
    fn test_template_names_and_defaults() {
        let set = build_ok(indoc! {r#"
            namespace ns
            template .foo { "x" }
        "#});
        let template = &set.files[0].templates[0];
        assert_eq!(template.name, "ns.foo");
        assert_eq!(template.partial_name.as_deref(), Some(".foo"));
        assert_eq!(template.visibility, Visibility::Public);
        assert_eq!(template.autoescape_mode, AutoescapeMode::Strict);
        assert_eq!(template.content_kind, Some(ContentKind::Html));
    }

    #[test]
    fn test_visibility_attributes() {
        let set = build_ok(indoc! {r#"
            namespace ns
            template .a visibility="private" { }
            template .b private="true" { }
            template .c visibility="legacy-private" { }
        "#});
        let vis: Vec<_> = set.templates().map(|t| t.visibility).collect();
        assert_eq!(
            vis,
            vec![
                Visibility::Private,
                Visibility::LegacyPrivate,
                Visibility::LegacyPrivate
            ]
        );
    }

    #[test]
    fn test_conflicting_visibility() {
        let kinds = error_kinds(r#"namespace ns template .a private="true" visibility="public" { }"#);
        assert_eq!(
            kinds,
            vec![CompileErrorKind::ConflictingVisibility {
                template: "ns.a".to_string()
            }]
        );
    }

    #[test]
    fn test_kind_requires_strict() {
        let kinds = error_kinds(r#"namespace ns template .a autoescape="contextual" kind="html" { }"#);
        assert!(matches!(kinds[0], CompileErrorKind::KindRequiresStrict { .. }));
    }

    #[test]
    fn test_non_strict_template_has_no_kind() {
        let set = build_ok(r#"namespace ns autoescape="deprecated-noncontextual" template .a { }"#);
        let template = &set.files[0].templates[0];
        assert_eq!(template.autoescape_mode, AutoescapeMode::NonContextual);
        assert_eq!(template.content_kind, None);
    }

    #[test]
    fn test_alias_for_last_namespace_part() {
        let kinds = error_kinds("namespace x.y.c alias a.b.c as c");
        assert_eq!(
            kinds,
            vec![CompileErrorKind::InvalidAliasForLastNamespacePart {
                namespace: "x.y.c".to_string(),
                aliased: "a.b.c".to_string()
            }]
        );
    }

    #[test]
    fn test_alias_named_as() {
        let kinds = error_kinds("namespace ns alias foo.bar as as");
        assert_eq!(
            kinds,
            vec![CompileErrorKind::AliasNamedAs {
                namespace: "foo.bar".to_string()
            }]
        );
    }

    #[test]
    fn test_duplicate_alias() {
        let kinds = error_kinds("namespace ns alias a.w alias b.w alias a.w");
        assert_eq!(
            kinds,
            vec![CompileErrorKind::DuplicateAlias {
                first: "a.w".to_string(),
                second: "b.w".to_string()
            }]
        );
    }

    #[test]
    fn test_all_errors_reported_in_one_pass() {
        let kinds = error_kinds(indoc! {r#"
            namespace ns
            alias foo.bar as as
            template .a kind="htm" bogus="1" { param x param x }
        "#});
        assert_eq!(kinds.len(), 4);
    }

    #[test]
    fn test_missing_namespace() {
        assert_eq!(
            error_kinds(r#"template .a { }"#),
            vec![CompileErrorKind::MissingNamespace]
        );
    }

    #[test]
    fn test_call_targets_resolve_through_aliases() {
        let set = build_ok(indoc! {r#"
            namespace shop.pages
            alias shop.widgets as w
            template .t {
                call .local
                call w.button
                call other.ns.x
            }
        "#});
        let callees: Vec<_> = set.files[0].templates[0]
            .body
            .iter()
            .filter_map(|n| match n {
                Node::Call(call) => Some(call.callee.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            callees,
            vec!["shop.pages.local", "shop.widgets.button", "other.ns.x"]
        );
    }

    #[test]
    fn test_package_relative_css() {
        let set = build_ok(indoc! {r#"
            namespace boo cssbase="some.test.package"
            template .foo { css "%AAA" css "AAA" }
        "#});
        let selectors: Vec<_> = set.files[0].templates[0]
            .body
            .iter()
            .filter_map(|n| match n {
                Node::Css { selector, .. } => Some(selector.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(selectors, vec!["someTestPackageAAA", "AAA"]);
    }

    #[test]
    fn test_package_relative_css_from_requirecss() {
        let set = build_ok(indoc! {r#"
            namespace boo requirecss="some.test.package,some.other.package"
            template .foo { css "%AAA" }
        "#});
        assert_eq!(
            set.files[0].templates[0].body,
            vec![Node::Css {
                component: None,
                selector: "someTestPackageAAA".to_string()
            }]
        );
    }

    #[test]
    fn test_package_relative_css_errors() {
        let missing = build(r#"namespace boo template .foo { css "%AAA" }"#).unwrap_err();
        assert!(missing.to_string().contains("no CSS package"));

        let component = build(r#"namespace boo cssbase="a.b" template .foo { css $goo, "%AAA" }"#)
            .unwrap_err();
        assert!(component.to_string().contains("component expression"));
    }

    #[test]
    fn test_msg_placeholders_and_id() {
        let set = build_ok(indoc! {r#"
            namespace ns
            template .t {
                msg desc="Greeting" { "Hello, " $userName "!" }
            }
        "#});
        let mut msgs = Vec::new();
        walk_nodes(&set.files[0].templates[0].body, &mut |n| {
            if let Node::Msg(msg) = n {
                msgs.push(msg.clone());
            }
        });
        let msg = &msgs[0];
        assert_eq!(msg.desc.as_deref(), Some("Greeting"));
        assert!(matches!(&msg.parts[1], MsgPart::Placeholder { name, .. } if name == "USER_NAME"));
        assert_eq!(msg.id, message_id(None, &msg.parts));
    }

    #[test]
    fn test_unknown_directive() {
        assert_eq!(
            error_kinds(r#"namespace ns template .t { print $x |bogus }"#),
            vec![CompileErrorKind::UnknownPrintDirective {
                name: "bogus".to_string()
            }]
        );
    }

    #[test]
    fn test_delegate_template_and_call() {
        let set = build_ok(indoc! {r#"
            delpackage fancy
            namespace ns
            deltemplate shop.Banner variant="wide" { "fancy" }
            template .t { delcall shop.Banner variant="wide" allowemptydefault="true" }
        "#});
        let file = &set.files[0];
        assert_eq!(
            file.templates[0].kind,
            TemplateKind::Delegate {
                delegate_name: "shop.Banner".to_string(),
                variant: "wide".to_string(),
                package: Some("fancy".to_string())
            }
        );
        assert!(matches!(
            &file.templates[1].body[0],
            Node::DelCall(call) if call.allow_empty_default && call.variant == "wide"
        ));
    }

    #[test]
    fn test_block_param_kind_defaults_in_strict_templates() {
        let set = build_ok(indoc! {r#"
            namespace ns
            template .t { call .x { param a { "A" } param b kind="text" { "B" } } }
        "#});
        let Node::Call(call) = &set.files[0].templates[0].body[0] else {
            panic!("expected call");
        };
        let kinds: Vec<_> = call
            .params
            .iter()
            .map(|p| match &p.value {
                CallParamValue::Block { kind, .. } => *kind,
                CallParamValue::Expr(_) => None,
            })
            .collect();
        assert_eq!(kinds, vec![Some(ContentKind::Html), Some(ContentKind::Text)]);
    }

    #[test]
    fn test_css_base_prefix() {
        assert_eq!(css_base_prefix("some.test.package"), "someTestPackage");
        assert_eq!(css_base_prefix("single"), "single");
    }
}

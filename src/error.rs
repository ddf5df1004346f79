//! Error types for parsing, tree building and compilation

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("parse error at {span:?}: {message}")]
    Syntax {
        span: Span,
        message: String,
        expected: Vec<String>,
    },
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::Syntax { span, .. } => span.clone(),
        }
    }
}

impl<'a> From<chumsky::error::Rich<'a, crate::parser::lexer::Token>> for ParseError {
    fn from(err: chumsky::error::Rich<'a, crate::parser::lexer::Token>) -> Self {
        use chumsky::error::{RichPattern, RichReason};

        let message = match err.reason() {
            RichReason::ExpectedFound { found, .. } => {
                let found_str = match found {
                    Some(tok) => format_token(tok),
                    None => "end of input".to_string(),
                };
                format!("unexpected {}", found_str)
            }
            RichReason::Custom(msg) => msg.to_string(),
        };

        let expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                RichPattern::Token(tok) => Some(format_token(tok)),
                RichPattern::Label(label) => Some(label.to_string()),
                RichPattern::EndOfInput => Some("end of input".to_string()),
                RichPattern::Identifier(s) => Some(format!("identifier '{}'", s)),
                RichPattern::Any => Some("any token".to_string()),
                RichPattern::SomethingElse => None,
            })
            .collect();

        ParseError::Syntax {
            span: err.span().into_range(),
            message,
            expected,
        }
    }
}

/// Format a token for human-readable error messages
fn format_token(tok: &crate::parser::lexer::Token) -> String {
    use crate::parser::lexer::Token;
    match tok {
        Token::Ident(s) => format!("identifier '{}'", s),
        Token::Var(s) => format!("variable '${}'", s),
        Token::String(s) => format!("string \"{}\"", s),
        Token::Int(n) => format!("number {}", n),
        Token::Float(n) => format!("number {}", n),
        Token::Invalid => "invalid input".to_string(),
        Token::BraceOpen => "'{'".to_string(),
        Token::BraceClose => "'}'".to_string(),
        Token::ParenOpen => "'('".to_string(),
        Token::ParenClose => "')'".to_string(),
        Token::BracketOpen => "'['".to_string(),
        Token::BracketClose => "']'".to_string(),
        Token::Comma => "','".to_string(),
        Token::Dot => "'.'".to_string(),
        Token::Equals => "'='".to_string(),
        Token::Pipe => "'|'".to_string(),
        Token::Namespace => "keyword 'namespace'".to_string(),
        Token::Template => "keyword 'template'".to_string(),
        Token::Deltemplate => "keyword 'deltemplate'".to_string(),
        Token::Param => "keyword 'param'".to_string(),
        _ => format!("{:?}", tok),
    }
}

/// What went wrong while building or compiling a file set
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileErrorKind {
    #[error("{message}")]
    Syntax {
        message: String,
        expected: Vec<String>,
    },

    #[error("file must declare a namespace")]
    MissingNamespace,

    #[error("file declares more than one {header}")]
    DuplicateHeader { header: &'static str },

    #[error("invalid namespace alias 'as' for namespace '{namespace}'")]
    AliasNamedAs { namespace: String },

    #[error(
        "not allowed to alias the last part of the file's namespace ({namespace}) to another namespace ({aliased})"
    )]
    InvalidAliasForLastNamespacePart { namespace: String, aliased: String },

    #[error("found two namespaces with the same alias ('{first}' and '{second}')")]
    DuplicateAlias { first: String, second: String },

    #[error("template {template} specifies both 'private' and 'visibility'")]
    ConflictingVisibility { template: String },

    #[error("invalid value '{value}' for attribute '{attribute}', expected {expected}")]
    InvalidAttributeValue {
        attribute: String,
        value: String,
        expected: String,
    },

    #[error("unknown attribute '{attribute}' on {command}")]
    UnknownAttribute { attribute: String, command: String },

    #[error("template {template} declares 'kind' without strict autoescaping")]
    KindRequiresStrict { template: String },

    #[error("parameter '{name}' is declared more than once")]
    DuplicateParam { name: String },

    #[error("template {name} is defined more than once")]
    DuplicateTemplate { name: String },

    #[error("delegate template {name} (variant '{variant}', package {package}) is defined more than once")]
    DuplicateDelegate {
        name: String,
        variant: String,
        package: String,
    },

    #[error("no CSS package defined for package-relative class name '{selector}'")]
    MissingCssPackage { selector: String },

    #[error("package-relative class name '{selector}' cannot be used with a component expression")]
    CssComponentWithPackageRelative { selector: String },

    #[error("unknown print directive '|{name}'")]
    UnknownPrintDirective { name: String },

    #[error("template {template} uses an unsupported feature: {feature}")]
    UnsupportedFeature { template: String, feature: String },
}

/// One compile error, located in a source file
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{file}: {kind}")]
pub struct CompileError {
    pub file: String,
    pub span: Span,
    pub kind: CompileErrorKind,
}

impl CompileError {
    pub fn new(file: impl Into<String>, span: Span, kind: CompileErrorKind) -> Self {
        Self {
            file: file.into(),
            span,
            kind,
        }
    }

    pub fn syntax(file: impl Into<String>, err: ParseError) -> Self {
        match err {
            ParseError::Syntax {
                span,
                message,
                expected,
            } => Self::new(file, span, CompileErrorKind::Syntax { message, expected }),
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str) -> String {
        let filename = self.file.as_str();
        let message = self.kind.to_string();
        let label = match &self.kind {
            CompileErrorKind::Syntax { expected, .. } if !expected.is_empty() => {
                format!("{}\nexpected: {}", message, expected.join(", "))
            }
            _ => message.clone(),
        };

        let mut buf = Vec::new();
        let written = Report::build(ReportKind::Error, filename, self.span.start)
            .with_message(&message)
            .with_label(
                Label::new((filename, self.span.clone()))
                    .with_message(label)
                    .with_color(Color::Red),
            )
            .finish()
            .write((filename, Source::from(source)), &mut buf);

        match written {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

/// All errors reported by one compilation pass
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", format_compile_errors(.0))]
pub struct CompileErrors(pub Vec<CompileError>);

impl CompileErrors {
    pub fn iter(&self) -> impl Iterator<Item = &CompileError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render every error against its source; `sources` pairs file names with text
    pub fn format(&self, sources: &[(String, String)]) -> String {
        self.0
            .iter()
            .map(|err| {
                match sources.iter().find(|(name, _)| *name == err.file) {
                    Some((_, text)) => err.format(text),
                    None => format!("{}\n", err),
                }
            })
            .collect()
    }
}

impl From<CompileError> for CompileErrors {
    fn from(err: CompileError) -> Self {
        CompileErrors(vec![err])
    }
}

fn format_compile_errors(errors: &[CompileError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Position in an [`ErrorReporter`]'s log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

/// Collects compile errors so one pass can surface all of them
#[derive(Debug, Default)]
pub struct ErrorReporter {
    errors: Vec<CompileError>,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, error: CompileError) {
        self.errors.push(error);
    }

    pub fn report_at(&mut self, file: &str, span: Span, kind: CompileErrorKind) {
        self.report(CompileError::new(file, span, kind));
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.errors.len())
    }

    pub fn errors_since(&self, checkpoint: Checkpoint) -> &[CompileError] {
        self.errors.get(checkpoint.0..).unwrap_or(&[])
    }

    pub fn has_errors_since(&self, checkpoint: Checkpoint) -> bool {
        !self.errors_since(checkpoint).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(value)` when nothing was reported since `checkpoint`
    pub fn finish_since<T>(&self, checkpoint: Checkpoint, value: T) -> Result<T, CompileErrors> {
        let errors = self.errors_since(checkpoint);
        if errors.is_empty() {
            Ok(value)
        } else {
            Err(CompileErrors(errors.to_vec()))
        }
    }

    pub fn into_errors(self) -> Vec<CompileError> {
        self.errors
    }
}

/// A broken invariant inside the implementation rather than a caller mistake
#[derive(Error, Debug, Clone, PartialEq)]
#[error("internal error: {0}")]
pub struct InternalError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_scopes_errors() {
        let mut reporter = ErrorReporter::new();
        reporter.report_at("a.tpl", 0..1, CompileErrorKind::MissingNamespace);
        let checkpoint = reporter.checkpoint();
        assert!(!reporter.has_errors_since(checkpoint));
        assert_eq!(reporter.finish_since(checkpoint, 7), Ok(7));

        reporter.report_at(
            "a.tpl",
            2..3,
            CompileErrorKind::DuplicateTemplate {
                name: "ns.x".to_string(),
            },
        );
        let errors = reporter.finish_since(checkpoint, ()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors.to_string(),
            "a.tpl: template ns.x is defined more than once"
        );
    }

    #[test]
    fn test_compile_errors_join_messages() {
        let errors = CompileErrors(vec![
            CompileError::new("a", 0..0, CompileErrorKind::MissingNamespace),
            CompileError::new(
                "b",
                0..0,
                CompileErrorKind::DuplicateHeader { header: "delpackage" },
            ),
        ]);
        assert_eq!(
            errors.to_string(),
            "a: file must declare a namespace; b: file declares more than one delpackage"
        );
    }

    #[test]
    fn test_format_includes_source_context() {
        let source = "namespace x.y.c\nalias a.b.c\n";
        let err = CompileError::new(
            "page.tpl",
            16..27,
            CompileErrorKind::InvalidAliasForLastNamespacePart {
                namespace: "x.y.c".to_string(),
                aliased: "a.b.c".to_string(),
            },
        );
        let formatted = err.format(source);
        assert!(formatted.contains("page.tpl"));
        assert!(formatted.contains("not allowed to alias the last part"));
    }
}

//! Quire - a template compiler and renderer
//!
//! Template files are parsed and validated into a file set, compiled once,
//! and rendered many times. Translated messages and selector renaming are
//! either baked into cached copies of the templates or applied live.
//!
//! # Example
//!
//! ```rust
//! use quire::{compile, Record};
//!
//! let files = compile(&[(
//!     "hello.tpl".to_string(),
//!     r#"namespace demo template .hello { "Hi " $who }"#.to_string(),
//! )])
//! .unwrap();
//! let out = files
//!     .new_renderer("demo.hello")
//!     .with_data(Record::new().with("who", "<you>"))
//!     .render()
//!     .unwrap();
//! assert_eq!(out, "Hi &lt;you&gt;");
//! ```

pub mod aot;
pub mod cache;
pub mod config;
pub mod data;
pub mod error;
pub mod escape;
pub mod eval;
pub mod msgs;
pub mod parser;
pub mod render;
pub mod renaming;
pub mod runtime;
pub mod substitution;
pub mod template;
pub mod tree;

pub use cache::{ArtifactCache, CacheStats};
pub use config::{Backend, CompileOptions, ConfigError};
pub use data::{ContentKind, DataError, Record, SanitizedContent, Value};
pub use error::{CompileError, CompileErrorKind, CompileErrors, InternalError, ParseError};
pub use eval::EvalError;
pub use msgs::{CatalogError, MessageCatalog};
pub use render::{CompiledFileSet, Renderer, TemplateExecutor};
pub use renaming::{CssRenamingMap, IdRenamingMap, RenamingMap, RenamingMapError};
pub use substitution::SubstitutionError;
pub use template::TemplateRegistry;

use thiserror::Error;

/// Errors that can occur while rendering a template
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template {name} is not defined")]
    UndefinedTemplate { name: String },

    #[error("template {name} is private and cannot be rendered directly")]
    PrivateTemplate { name: String },

    #[error("template {template} has content kind {actual}, expected {expected}")]
    ContentKindMismatch {
        template: String,
        expected: ContentKind,
        actual: String,
    },

    #[error("caching is disabled for this file set")]
    CachingDisabled,

    #[error("no delegate implementation for {name} (variant '{variant}')")]
    UndefinedDelegate { name: String, variant: String },

    #[error(
        "delegate {name} (variant '{variant}') is defined by both active packages {first} and {second}"
    )]
    DelegateConflict {
        name: String,
        variant: String,
        first: String,
        second: String,
    },

    #[error("template {template} requires parameter '{param}'")]
    MissingRequiredParam { template: String, param: String },

    #[error("call depth limit of {limit} exceeded in template {template}")]
    CallDepthExceeded { template: String, limit: usize },

    #[error("evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("substitution error: {0}")]
    Substitution(#[from] SubstitutionError),

    #[error("compile errors: {0}")]
    Compile(#[from] CompileErrors),

    #[error("failed to write output")]
    Output(#[from] std::fmt::Error),

    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl RenderError {
    /// True when the error is a broken invariant rather than a caller mistake
    pub fn is_internal(&self) -> bool {
        matches!(self, RenderError::Internal(_))
    }
}

/// Compile `(path, source)` pairs with default options
pub fn compile(sources: &[(String, String)]) -> Result<CompiledFileSet, CompileErrors> {
    CompiledFileSet::from_sources(sources, CompileOptions::default())
}

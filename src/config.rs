//! Compile options
//!
//! Options can be built in code or loaded from a TOML file:
//!
//! ```toml
//! [compile]
//! caching = true
//! backend = "compiled"
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur when loading or parsing compile options
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
}

/// How templates are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Walk the template tree on every render
    #[default]
    Interpreter,
    /// Compile every template to closures up front
    Compiled,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Interpreter => "interpreter",
            Backend::Compiled => "compiled",
        })
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interpreter" => Ok(Backend::Interpreter),
            "compiled" => Ok(Backend::Compiled),
            other => Err(format!(
                "unknown backend '{}', expected 'interpreter' or 'compiled'",
                other
            )),
        }
    }
}

/// Settings fixed when a file set is compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileOptions {
    /// Memoize substituted trees per (catalog, selector map)
    pub caching: bool,
    pub backend: Backend,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            caching: true,
            backend: Backend::Interpreter,
        }
    }
}

#[derive(Deserialize)]
struct TomlConfig {
    #[serde(default)]
    compile: TomlCompile,
}

#[derive(Deserialize, Default)]
struct TomlCompile {
    caching: Option<bool>,
    backend: Option<Backend>,
}

impl CompileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_caching(mut self, caching: bool) -> Self {
        self.caching = caching;
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    /// Load options from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse options from TOML text; missing keys keep their defaults
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let parsed: TomlConfig = toml::from_str(content)?;
        let defaults = Self::default();
        Ok(Self {
            caching: parsed.compile.caching.unwrap_or(defaults.caching),
            backend: parsed.compile.backend.unwrap_or(defaults.backend),
        })
    }
}

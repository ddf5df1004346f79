//! Compiled file sets and rendering
//!
//! A [`CompiledFileSet`] owns the validated templates of one compilation and
//! the cache of substituted variants derived from them. Renders go through a
//! [`Renderer`] obtained from the handle.
//!
//! # Example
//!
//! ```rust
//! use quire::{CompileOptions, CompiledFileSet, Record};
//!
//! let sources = vec![(
//!     "greet.tpl".to_string(),
//!     r#"namespace demo template .greet { param name "Hello, " $name "!" }"#.to_string(),
//! )];
//! let files = CompiledFileSet::from_sources(&sources, CompileOptions::default()).unwrap();
//! let html = files
//!     .new_renderer("demo.greet")
//!     .with_data(Record::new().with("name", "<Ed>"))
//!     .render()
//!     .unwrap();
//! assert_eq!(html, "Hello, &lt;Ed&gt;!");
//! ```

mod renderer;
mod walker;

use std::collections::BTreeSet;
use std::fmt::Write;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::aot;
use crate::cache::{ArtifactCache, CacheStats};
use crate::config::{Backend, CompileOptions};
use crate::data::Record;
use crate::error::CompileErrors;
use crate::msgs::MessageCatalog;
use crate::renaming::CssRenamingMap;
use crate::runtime::RenderContext;
use crate::substitution;
use crate::template::{qualify, used_ij_params, TemplateRegistry};
use crate::tree::{build_file_set, FileSet, TemplateNode};
use crate::RenderError;

pub use renderer::Renderer;
pub use walker::Interpreter;

/// Runs one template against a render context
///
/// Implemented by the tree-walking [`Interpreter`] and by the ahead-of-time
/// [`aot::ExecutableSet`]; the renderer only sees this trait.
pub trait TemplateExecutor: Send + Sync {
    fn execute(
        &self,
        template: &TemplateNode,
        data: &Record,
        ctx: &mut RenderContext<'_>,
        out: &mut dyn Write,
    ) -> Result<(), RenderError>;
}

/// A registry together with the executor built for it
pub struct CompiledArtifact {
    registry: Arc<TemplateRegistry>,
    executor: Box<dyn TemplateExecutor>,
}

impl CompiledArtifact {
    pub fn new(registry: TemplateRegistry, backend: Backend) -> Result<Self, CompileErrors> {
        let registry = Arc::new(registry);
        let executor: Box<dyn TemplateExecutor> = match backend {
            Backend::Interpreter => Box::new(Interpreter::new(registry.clone())),
            Backend::Compiled => Box::new(aot::compile(&registry)?),
        };
        Ok(Self { registry, executor })
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn executor(&self) -> &dyn TemplateExecutor {
        self.executor.as_ref()
    }
}

struct FileSetState {
    options: CompileOptions,
    /// Built from the unsubstituted tree
    base: Arc<CompiledArtifact>,
    cache: Option<ArtifactCache<CompiledArtifact>>,
}

/// Handle to a compiled set of template files
///
/// Cheap to clone and safe to share between threads. Handles made with
/// [`CompiledFileSet::for_namespace`] share templates and cache with the
/// handle they came from.
#[derive(Clone)]
pub struct CompiledFileSet {
    state: Arc<FileSetState>,
    namespace: Option<String>,
}

impl CompiledFileSet {
    /// Parse, validate and compile `(path, source)` pairs
    pub fn from_sources(sources: &[(String, String)], options: CompileOptions) -> Result<Self, CompileErrors> {
        Self::compile(build_file_set(sources)?, options)
    }

    pub fn compile(tree: FileSet, options: CompileOptions) -> Result<Self, CompileErrors> {
        let files = tree.files.len();
        let registry = TemplateRegistry::build(tree)?;
        let templates = registry.len();
        let base = Arc::new(CompiledArtifact::new(registry, options.backend)?);

        let handle = Self {
            state: Arc::new(FileSetState {
                options,
                base,
                cache: options.caching.then(ArtifactCache::new),
            }),
            namespace: None,
        };

        if handle.is_caching() {
            if let Err(err) = handle.add_to_cache(None, None) {
                warn!(error = %err, "failed to prime the default cache entry");
            }
        }

        info!(
            files,
            templates,
            backend = %options.backend,
            caching = options.caching,
            "compiled file set"
        );
        Ok(handle)
    }

    /// A handle that completes `.name` template names with `namespace`
    pub fn for_namespace(&self, namespace: &str) -> Self {
        Self {
            state: self.state.clone(),
            namespace: Some(namespace.to_string()),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn options(&self) -> CompileOptions {
        self.state.options
    }

    pub fn is_caching(&self) -> bool {
        self.state.cache.is_some()
    }

    /// Build the cache entry for this catalog and map ahead of the first render
    pub fn add_to_cache(
        &self,
        catalog: Option<&Arc<MessageCatalog>>,
        css_map: Option<&Arc<dyn CssRenamingMap>>,
    ) -> Result<(), RenderError> {
        let cache = self.state.cache.as_ref().ok_or(RenderError::CachingDisabled)?;
        cache.get_or_build(catalog, css_map, || self.build_artifact(catalog, css_map))?;
        Ok(())
    }

    pub fn new_renderer(&self, template: &str) -> Renderer<'_> {
        Renderer::new(self, template)
    }

    /// Sorted `$ij` keys read by `template` and everything it may call
    pub fn used_ij_params(&self, template: &str) -> Result<BTreeSet<String>, RenderError> {
        let name = qualify(template, self.namespace());
        used_ij_params(self.registry(), &name)
    }

    /// Cache occupancy; `None` when caching is disabled
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.state.cache.as_ref().map(ArtifactCache::stats)
    }

    /// The unsubstituted registry
    pub fn registry(&self) -> &TemplateRegistry {
        self.state.base.registry()
    }

    /// Resolve the artifact a render runs against
    ///
    /// Returns the artifact and whether the catalog and map still have to be
    /// applied while rendering.
    pub(crate) fn artifact_for(
        &self,
        catalog: Option<&Arc<MessageCatalog>>,
        css_map: Option<&Arc<dyn CssRenamingMap>>,
        populate: bool,
    ) -> Result<(Arc<CompiledArtifact>, bool), RenderError> {
        let Some(cache) = &self.state.cache else {
            return Ok((self.state.base.clone(), true));
        };
        if populate {
            let artifact =
                cache.get_or_build(catalog, css_map, || self.build_artifact(catalog, css_map))?;
            return Ok((artifact, false));
        }
        match cache.get(catalog, css_map) {
            Some(artifact) => Ok((artifact, false)),
            None => {
                debug!("no cache entry, rendering with live substitution");
                Ok((self.state.base.clone(), true))
            }
        }
    }

    fn build_artifact(
        &self,
        catalog: Option<&Arc<MessageCatalog>>,
        css_map: Option<&Arc<dyn CssRenamingMap>>,
    ) -> Result<CompiledArtifact, RenderError> {
        let tree = substitution::apply(
            self.registry().file_set(),
            catalog.map(|c| &**c),
            css_map.map(|m| &**m),
        )?;
        let registry = TemplateRegistry::build(tree)?;
        Ok(CompiledArtifact::new(registry, self.state.options.backend)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renaming::RenamingMap;

    fn handle(caching: bool) -> CompiledFileSet {
        let sources = vec![(
            "a.tpl".to_string(),
            r#"namespace ns template .t { css "x" $ij.a }"#.to_string(),
        )];
        CompiledFileSet::from_sources(&sources, CompileOptions::default().with_caching(caching)).unwrap()
    }

    #[test]
    fn test_caching_handle_primes_default_entry() {
        let files = handle(true);
        assert_eq!(files.cache_stats(), Some(CacheStats { entries: 1, builds: 1 }));
    }

    #[test]
    fn test_add_to_cache_requires_caching() {
        let files = handle(false);
        assert!(matches!(
            files.add_to_cache(None, None),
            Err(RenderError::CachingDisabled)
        ));
        assert_eq!(files.cache_stats(), None);
    }

    #[test]
    fn test_namespaced_handle_shares_cache() {
        let files = handle(true);
        let scoped = files.for_namespace("ns");
        let map: Arc<dyn CssRenamingMap> = Arc::new(RenamingMap::new().with("x", "y"));
        scoped.add_to_cache(None, Some(&map)).unwrap();
        assert_eq!(files.cache_stats().map(|s| s.entries), Some(2));
        assert_eq!(
            scoped.used_ij_params(".t").unwrap().into_iter().collect::<Vec<_>>(),
            vec!["a"]
        );
    }
}

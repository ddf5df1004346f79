//! Template registry: name lookup over a file set

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::{CompileErrorKind, CompileErrors, ErrorReporter};
use crate::tree::{FileSet, TemplateKind, TemplateNode};
use crate::RenderError;

use super::delegates::DelegateTable;

/// Position of a template inside the registry's file set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TemplateId {
    file: usize,
    template: usize,
}

/// Read-only index from template names to definitions
///
/// The registry owns the file set it indexes. Call targets are resolved by
/// name when a call executes, so templates may call each other in any order.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    file_set: FileSet,
    basic: HashMap<String, TemplateId>,
    delegates: DelegateTable<TemplateId>,
}

impl TemplateRegistry {
    /// Index `file_set`, reporting every duplicate definition at once
    pub fn build(file_set: FileSet) -> Result<Self, CompileErrors> {
        let mut reporter = ErrorReporter::new();
        let checkpoint = reporter.checkpoint();
        let mut basic = HashMap::new();
        let mut delegates = DelegateTable::new();

        for (file_index, file) in file_set.files.iter().enumerate() {
            for (template_index, template) in file.templates.iter().enumerate() {
                let id = TemplateId {
                    file: file_index,
                    template: template_index,
                };
                match &template.kind {
                    TemplateKind::Basic => {
                        if basic.insert(template.name.clone(), id).is_some() {
                            reporter.report_at(
                                &template.file,
                                template.span.clone(),
                                CompileErrorKind::DuplicateTemplate {
                                    name: template.name.clone(),
                                },
                            );
                        }
                    }
                    TemplateKind::Delegate {
                        delegate_name,
                        variant,
                        package,
                    } => {
                        if !delegates.insert(delegate_name, variant, package.as_deref(), id) {
                            reporter.report_at(
                                &template.file,
                                template.span.clone(),
                                CompileErrorKind::DuplicateDelegate {
                                    name: delegate_name.clone(),
                                    variant: variant.clone(),
                                    package: package.clone().unwrap_or_else(|| "<default>".to_string()),
                                },
                            );
                        }
                    }
                }
            }
        }

        debug!(templates = basic.len(), "built template registry");
        reporter.finish_since(
            checkpoint,
            Self {
                file_set,
                basic,
                delegates,
            },
        )
    }

    pub fn file_set(&self) -> &FileSet {
        &self.file_set
    }

    pub fn template(&self, id: TemplateId) -> &TemplateNode {
        &self.file_set.files[id.file].templates[id.template]
    }

    /// Look up a basic template by its fully-qualified name
    pub fn get(&self, name: &str) -> Option<&TemplateNode> {
        self.basic.get(name).map(|id| self.template(*id))
    }

    /// Look up `name`, completing a leading `.` with `namespace`
    pub fn lookup(&self, name: &str, namespace: Option<&str>) -> Option<&TemplateNode> {
        self.get(&qualify(name, namespace))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.basic.contains_key(name)
    }

    /// Basic template names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.basic.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.basic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.basic.is_empty()
    }

    /// Every template, delegates included, in file order
    pub fn templates(&self) -> impl Iterator<Item = (TemplateId, &TemplateNode)> {
        self.file_set.files.iter().enumerate().flat_map(|(f, file)| {
            file.templates.iter().enumerate().map(move |(t, template)| {
                (
                    TemplateId {
                        file: f,
                        template: t,
                    },
                    template,
                )
            })
        })
    }

    pub fn select_delegate(
        &self,
        name: &str,
        variant: &str,
        active_packages: &HashSet<String>,
    ) -> Result<Option<&TemplateNode>, RenderError> {
        Ok(self
            .delegates
            .select(name, variant, active_packages)?
            .map(|id| self.template(*id)))
    }

    pub fn delegate_ids(&self) -> &DelegateTable<TemplateId> {
        &self.delegates
    }

    /// All implementations of a delegate, whatever their variant or package
    pub fn delegate_candidates<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a TemplateNode> + 'a {
        self.delegates
            .candidates(name)
            .map(|id| self.template(*id))
            .collect::<Vec<_>>()
            .into_iter()
    }
}

/// Complete a namespace-relative name such as `.foo`
pub fn qualify<'a>(name: &'a str, namespace: Option<&str>) -> Cow<'a, str> {
    match namespace {
        Some(ns) if name.starts_with('.') => Cow::Owned(format!("{}{}", ns, name)),
        _ => Cow::Borrowed(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::build_file_set;

    fn registry(sources: &[(&str, &str)]) -> Result<TemplateRegistry, CompileErrors> {
        let sources: Vec<(String, String)> = sources
            .iter()
            .map(|(p, s)| (p.to_string(), s.to_string()))
            .collect();
        TemplateRegistry::build(build_file_set(&sources)?)
    }

    #[test]
    fn test_registry_lookup() {
        let registry = registry(&[(
            "a.tpl",
            r#"namespace ns template .foo { "x" } template .bar { "y" }"#,
        )])
        .unwrap();
        assert_eq!(registry.names(), vec!["ns.bar", "ns.foo"]);
        assert!(registry.get("ns.foo").is_some());
        assert!(registry.lookup(".foo", Some("ns")).is_some());
        assert!(registry.lookup(".foo", None).is_none());
    }

    #[test]
    fn test_duplicate_template_across_files() {
        let err = registry(&[
            ("a.tpl", r#"namespace ns template .foo { "x" }"#),
            ("b.tpl", r#"namespace ns template .foo { "y" }"#),
        ])
        .unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err.to_string(), "b.tpl: template ns.foo is defined more than once");
    }

    #[test]
    fn test_duplicate_delegate_is_reported() {
        let err = registry(&[
            ("a.tpl", r#"namespace ns deltemplate x.Y { "1" }"#),
            ("b.tpl", r#"namespace ns2 deltemplate x.Y { "2" }"#),
        ])
        .unwrap_err();
        assert!(matches!(
            err.0[0].kind,
            CompileErrorKind::DuplicateDelegate { .. }
        ));
    }

    #[test]
    fn test_delegates_are_not_basic_templates() {
        let registry = registry(&[
            ("a.tpl", r#"namespace ns deltemplate x.Y { "1" }"#),
            ("b.tpl", r#"delpackage p namespace ns2 deltemplate x.Y { "2" }"#),
        ])
        .unwrap();
        assert!(registry.get("x.Y").is_none());
        assert_eq!(registry.delegate_candidates("x.Y").count(), 2);
        let active: HashSet<String> = ["p".to_string()].into_iter().collect();
        let chosen = registry.select_delegate("x.Y", "", &active).unwrap().unwrap();
        assert_eq!(chosen.file, "b.tpl");
    }
}

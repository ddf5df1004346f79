//! Renderer builder

use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Arc;

use tracing::debug_span;

use crate::data::{ContentKind, Record, SanitizedContent};
use crate::msgs::MessageCatalog;
use crate::renaming::{CssRenamingMap, IdRenamingMap};
use crate::runtime::{RenderContext, SharedParams};
use crate::template::qualify;
use crate::tree::{TemplateNode, Visibility};
use crate::RenderError;

use super::CompiledFileSet;

/// One configured render of one template
///
/// Every setting is optional. Finish with [`Renderer::render`],
/// [`Renderer::render_to`] or [`Renderer::render_strict`].
pub struct Renderer<'h> {
    files: &'h CompiledFileSet,
    template: String,
    data: Option<Record>,
    ij: Option<Record>,
    active_packages: HashSet<String>,
    msgs: Option<Arc<MessageCatalog>>,
    id_map: Option<Arc<dyn IdRenamingMap>>,
    css_map: Option<Arc<dyn CssRenamingMap>>,
    dont_add_to_cache: bool,
    expected_kind: Option<ContentKind>,
}

impl<'h> Renderer<'h> {
    pub(crate) fn new(files: &'h CompiledFileSet, template: &str) -> Self {
        Self {
            files,
            template: template.to_string(),
            data: None,
            ij: None,
            active_packages: HashSet::new(),
            msgs: None,
            id_map: None,
            css_map: None,
            dont_add_to_cache: false,
            expected_kind: None,
        }
    }

    pub fn with_data(mut self, data: Record) -> Self {
        self.data = Some(data);
        self
    }

    /// Data every template can read through `$ij`
    pub fn with_ij_data(mut self, ij: Record) -> Self {
        self.ij = Some(ij);
        self
    }

    pub fn with_active_delegate_packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.active_packages = packages.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_message_catalog(mut self, msgs: Arc<MessageCatalog>) -> Self {
        self.msgs = Some(msgs);
        self
    }

    pub fn with_id_renaming_map(mut self, id_map: Arc<dyn IdRenamingMap>) -> Self {
        self.id_map = Some(id_map);
        self
    }

    pub fn with_css_renaming_map(mut self, css_map: Arc<dyn CssRenamingMap>) -> Self {
        self.css_map = Some(css_map);
        self
    }

    /// Use an existing cache entry but never build one
    pub fn with_dont_add_to_cache(mut self, dont_add: bool) -> Self {
        self.dont_add_to_cache = dont_add;
        self
    }

    pub fn with_expected_content_kind(mut self, kind: ContentKind) -> Self {
        self.expected_kind = Some(kind);
        self
    }

    /// Render to a string
    pub fn render(&self) -> Result<String, RenderError> {
        let mut out = String::new();
        self.execute(&mut out, false)?;
        Ok(out)
    }

    /// Render into `out`, returning the template's content kind
    ///
    /// `None` means the template is not strict.
    pub fn render_to(&self, out: &mut dyn Write) -> Result<Option<ContentKind>, RenderError> {
        self.execute(out, false)
    }

    /// Render a strict template to content tagged with the expected kind
    pub fn render_strict(&self) -> Result<SanitizedContent, RenderError> {
        let mut out = String::new();
        self.execute(&mut out, true)?;
        Ok(SanitizedContent::ordain(
            out,
            self.expected_kind.unwrap_or(ContentKind::Html),
        ))
    }

    fn execute(&self, out: &mut dyn Write, require_strict: bool) -> Result<Option<ContentKind>, RenderError> {
        let name = qualify(&self.template, self.files.namespace());
        let _span = debug_span!("render", template = %name).entered();

        let (artifact, live) = self.files.artifact_for(
            self.msgs.as_ref(),
            self.css_map.as_ref(),
            !self.dont_add_to_cache,
        )?;

        let template = artifact
            .registry()
            .get(&name)
            .ok_or_else(|| RenderError::UndefinedTemplate {
                name: name.to_string(),
            })?;
        if template.visibility == Visibility::Private {
            return Err(RenderError::PrivateTemplate {
                name: name.to_string(),
            });
        }
        enforce_content_kind(template, self.expected_kind, require_strict)?;

        let empty = Record::new();
        let data = self.data.as_ref().unwrap_or(&empty);
        let ij = self.ij.as_ref().unwrap_or(&empty);
        let mut ctx = RenderContext::new(
            ij,
            &self.active_packages,
            SharedParams::seed(self.msgs.as_deref()),
        )
        .with_id_map(self.id_map.as_deref());
        if live {
            ctx = ctx.with_live_substitution(self.msgs.as_deref(), self.css_map.as_deref());
        }

        artifact.executor().execute(template, data, &mut ctx, out)?;
        Ok(template.content_kind)
    }
}

/// Check `template` may be used where `expected` content is wanted
///
/// Without an explicit expectation only strict templates are checked, against
/// HTML. Expecting text accepts any template.
fn enforce_content_kind(
    template: &TemplateNode,
    expected: Option<ContentKind>,
    require_strict: bool,
) -> Result<(), RenderError> {
    let expected_kind = expected.unwrap_or(ContentKind::Html);
    let mismatch = || RenderError::ContentKindMismatch {
        template: template.name.clone(),
        expected: expected_kind,
        actual: template
            .content_kind
            .map(|k| k.to_string())
            .unwrap_or_else(|| "not strict".to_string()),
    };

    if require_strict && !template.is_strict() {
        return Err(mismatch());
    }
    if expected.is_none() && !template.is_strict() {
        return Ok(());
    }
    if expected_kind == ContentKind::Text || template.content_kind == Some(expected_kind) {
        Ok(())
    } else {
        Err(mismatch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompileOptions;
    use indoc::indoc;

    fn files() -> CompiledFileSet {
        let source = indoc! {r#"
            namespace ns
            template .page { "<p>" $x "</p>" }
            template .script kind="js" { "var x = " $x ";" }
            template .legacy autoescape="contextual" { $x }
            template .hidden visibility="private" { "h" }
            template .old private="true" { "o" }
        "#};
        CompiledFileSet::from_sources(
            &[("a.tpl".to_string(), source.to_string())],
            CompileOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_default_expectation_is_html() {
        let files = files();
        let data = Record::new().with("x", "<");
        assert_eq!(
            files.new_renderer("ns.page").with_data(data.clone()).render().unwrap(),
            "<p>&lt;</p>"
        );
        assert!(matches!(
            files.new_renderer("ns.script").with_data(data).render(),
            Err(RenderError::ContentKindMismatch { .. })
        ));
    }

    #[test]
    fn test_text_expectation_accepts_anything() {
        let files = files();
        for name in ["ns.page", "ns.script", "ns.legacy"] {
            let result = files
                .new_renderer(name)
                .with_expected_content_kind(ContentKind::Text)
                .render();
            assert!(result.is_ok(), "{} failed: {:?}", name, result);
        }
    }

    #[test]
    fn test_render_strict_tags_with_expected_kind() {
        let files = files();
        let content = files
            .new_renderer("ns.page")
            .with_expected_content_kind(ContentKind::Text)
            .render_strict()
            .unwrap();
        assert_eq!(content.kind(), ContentKind::Text);
        assert!(matches!(
            files.new_renderer("ns.legacy").render_strict(),
            Err(RenderError::ContentKindMismatch { .. })
        ));
    }

    #[test]
    fn test_non_strict_template_renders_without_expectation() {
        let files = files();
        let mut out = String::new();
        let kind = files
            .new_renderer("ns.legacy")
            .with_data(Record::new().with("x", "<"))
            .render_to(&mut out)
            .unwrap();
        assert_eq!(kind, None);
        assert_eq!(out, "&lt;");
        assert!(matches!(
            files
                .new_renderer("ns.legacy")
                .with_expected_content_kind(ContentKind::Html)
                .render(),
            Err(RenderError::ContentKindMismatch { .. })
        ));
    }

    #[test]
    fn test_visibility() {
        let files = files();
        assert!(matches!(
            files.new_renderer("ns.hidden").render(),
            Err(RenderError::PrivateTemplate { .. })
        ));
        assert_eq!(files.new_renderer("ns.old").render().unwrap(), "o");
        assert!(matches!(
            files.new_renderer("ns.nope").render(),
            Err(RenderError::UndefinedTemplate { .. })
        ));
    }
}

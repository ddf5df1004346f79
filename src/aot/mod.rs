//! Ahead-of-time backend
//!
//! [`compile`] turns every template of a registry into a tree of closures
//! before anything renders. Generation happens first for the whole set and
//! loading only when every template generated cleanly, so a set is either
//! loaded completely or not at all.
//!
//! Loaded templates are reached through factories. A factory holds a weak
//! reference to its unit and hands out a fresh [`TemplateInstance`], with its
//! own variable slots, for every render.

mod codegen;

use std::collections::{HashMap, HashSet};
use std::fmt::Write;
use std::sync::{Arc, Weak};

use tracing::{debug, info};

use crate::data::{Record, Value};
use crate::error::{CompileErrors, ErrorReporter, InternalError};
use crate::render::TemplateExecutor;
use crate::runtime::{check_required_params, nested_call, RenderContext};
use crate::template::{DelegateTable, TemplateRegistry};
use crate::tree::{Param, TemplateKind, TemplateNode};
use crate::RenderError;

use codegen::{Frame, Op};

/// One template compiled to closures
pub struct CompiledUnit {
    name: String,
    params: Vec<Param>,
    /// Number of variable slots the body needs
    slots: usize,
    body: Vec<Op>,
}

impl CompiledUnit {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A unit ready to render once
pub struct TemplateInstance {
    unit: Arc<CompiledUnit>,
    slots: Vec<Value>,
}

impl TemplateInstance {
    fn new(unit: Arc<CompiledUnit>) -> Self {
        let slots = vec![Value::Null; unit.slots];
        Self { unit, slots }
    }

    fn render(
        &mut self,
        data: &Record,
        ctx: &mut RenderContext<'_>,
        set: &ExecutableSet,
        out: &mut dyn Write,
    ) -> Result<(), RenderError> {
        let unit = self.unit.clone();
        check_required_params(&unit.name, &unit.params, data)?;
        ctx.enter(&unit.name)?;
        let result = {
            let mut frame = Frame {
                data,
                slots: &mut self.slots,
                ctx: &mut *ctx,
                set,
            };
            codegen::run(&unit.body, &mut frame, out)
        };
        ctx.exit();
        result
    }
}

type Factory = Box<dyn Fn() -> Option<TemplateInstance> + Send + Sync>;

/// Every template of a registry, loaded as closures
pub struct ExecutableSet {
    /// Keyed by unique name; owns the units the factories point at
    units: HashMap<String, Arc<CompiledUnit>>,
    factories: HashMap<String, Factory>,
    basic: HashSet<String>,
    delegates: DelegateTable<String>,
}

/// Generate and load closures for every template in `registry`
pub fn compile(registry: &TemplateRegistry) -> Result<ExecutableSet, CompileErrors> {
    let mut reporter = ErrorReporter::new();
    let start = reporter.checkpoint();

    let mut generated = Vec::with_capacity(registry.len());
    for (_, template) in registry.templates() {
        let checkpoint = reporter.checkpoint();
        let unit = codegen::generate(template, &mut reporter);
        if !reporter.has_errors_since(checkpoint) {
            generated.push((template.unique_name(), unit));
        }
    }
    reporter.finish_since(start, ())?;

    let set = ExecutableSet::load(generated, registry.templates().map(|(_, t)| t));
    info!(templates = set.len(), "loaded compiled templates");
    Ok(set)
}

impl ExecutableSet {
    fn load<'t>(
        generated: Vec<(String, CompiledUnit)>,
        templates: impl Iterator<Item = &'t TemplateNode>,
    ) -> Self {
        let mut units = HashMap::with_capacity(generated.len());
        let mut factories: HashMap<String, Factory> = HashMap::with_capacity(generated.len());
        for (name, unit) in generated {
            let unit = Arc::new(unit);
            let weak: Weak<CompiledUnit> = Arc::downgrade(&unit);
            factories.insert(
                name.clone(),
                Box::new(move || weak.upgrade().map(TemplateInstance::new)),
            );
            units.insert(name, unit);
        }

        let mut basic = HashSet::new();
        let mut delegates = DelegateTable::new();
        for template in templates {
            match &template.kind {
                TemplateKind::Basic => {
                    basic.insert(template.name.clone());
                }
                TemplateKind::Delegate {
                    delegate_name,
                    variant,
                    package,
                } => {
                    delegates.insert(
                        delegate_name,
                        variant,
                        package.as_deref(),
                        template.unique_name(),
                    );
                }
            }
        }

        Self {
            units,
            factories,
            basic,
            delegates,
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn unit(&self, unique_name: &str) -> Option<&CompiledUnit> {
        self.units.get(unique_name).map(|unit| unit.as_ref())
    }

    /// A fresh instance of the template named `unique_name`
    pub fn instantiate(&self, unique_name: &str) -> Result<TemplateInstance, InternalError> {
        let factory = self
            .factories
            .get(unique_name)
            .ok_or_else(|| InternalError(format!("no factory for template {}", unique_name)))?;
        factory().ok_or_else(|| {
            InternalError(format!(
                "factory for template {} no longer has a unit",
                unique_name
            ))
        })
    }

    pub(crate) fn has_basic(&self, name: &str) -> bool {
        self.basic.contains(name)
    }

    pub(crate) fn select_delegate(
        &self,
        name: &str,
        variant: &str,
        active_packages: &HashSet<String>,
    ) -> Result<Option<&String>, RenderError> {
        self.delegates.select(name, variant, active_packages)
    }

    pub(crate) fn render_unit(
        &self,
        unique_name: &str,
        data: &Record,
        ctx: &mut RenderContext<'_>,
        out: &mut dyn Write,
    ) -> Result<(), RenderError> {
        let mut instance = self.instantiate(unique_name)?;
        nested_call(|| instance.render(data, ctx, self, out))
    }
}

impl TemplateExecutor for ExecutableSet {
    fn execute(
        &self,
        template: &TemplateNode,
        data: &Record,
        ctx: &mut RenderContext<'_>,
        out: &mut dyn Write,
    ) -> Result<(), RenderError> {
        let name = template.unique_name();
        debug!(template = %name, "executing compiled template");
        self.render_unit(&name, data, ctx, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileErrorKind;
    use crate::msgs::MessageCatalog;
    use crate::runtime::SharedParams;
    use crate::tree::build_file_set;
    use indoc::indoc;

    fn registry(source: &str) -> TemplateRegistry {
        let set = build_file_set(&[("a.tpl".to_string(), source.to_string())]).unwrap();
        TemplateRegistry::build(set).unwrap()
    }

    fn render_with(
        set: &ExecutableSet,
        registry: &TemplateRegistry,
        name: &str,
        data: Record,
        msgs: Option<&MessageCatalog>,
    ) -> Result<String, RenderError> {
        let template = registry.get(name).unwrap();
        let ij = Record::new();
        let packages = HashSet::new();
        let mut ctx = RenderContext::new(&ij, &packages, SharedParams::seed(msgs))
            .with_live_substitution(msgs, None);
        let mut out = String::new();
        set.execute(template, &data, &mut ctx, &mut out)?;
        Ok(out)
    }

    #[test]
    fn test_compiled_loops_and_calls() {
        let registry = registry(indoc! {r#"
            namespace ns
            template .list {
                param items
                for $item in $items { call .item { param v = $item * 2 } } ifempty { "none" }
            }
            template .item { param v "<" $v ">" }
        "#});
        let set = compile(&registry).unwrap();
        assert_eq!(set.len(), 2);
        let items = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(
            render_with(&set, &registry, "ns.list", Record::new().with("items", items), None).unwrap(),
            "&lt;2&gt;&lt;4&gt;"
        );
    }

    #[test]
    fn test_instances_do_not_share_slots() {
        let registry = registry(indoc! {r#"
            namespace ns
            template .t { param n let $x = $n + 1 $x }
        "#});
        let set = compile(&registry).unwrap();
        for n in [1, 5] {
            assert_eq!(
                render_with(&set, &registry, "ns.t", Record::new().with("n", n as i64), None).unwrap(),
                (n + 1).to_string()
            );
        }
    }

    #[test]
    fn test_messages_follow_live_catalog() {
        let registry = registry(indoc! {r#"
            namespace ns
            template .t { param name msg desc="greeting" { "Hello " $name } }
        "#});
        let set = compile(&registry).unwrap();
        let id = match &registry.get("ns.t").unwrap().body[0] {
            crate::tree::Node::Msg(msg) => msg.id,
            other => panic!("expected msg, got {:?}", other),
        };
        let catalog = MessageCatalog::new(Some("fr")).with_message(id, "Bonjour {NAME}");
        let data = Record::new().with("name", "Ann");
        assert_eq!(
            render_with(&set, &registry, "ns.t", data.clone(), None).unwrap(),
            "Hello Ann"
        );
        assert_eq!(
            render_with(&set, &registry, "ns.t", data, Some(&catalog)).unwrap(),
            "Bonjour Ann"
        );
    }

    #[test]
    fn test_unsupported_features_fail_the_whole_set() {
        let registry = registry(indoc! {r#"
            namespace ns
            template .ok { "fine" }
            template .bad { print nope(1) }
            template .legacy autoescape="deprecated-noncontextual" { "x" }
        "#});
        let errors = match compile(&registry) {
            Err(errors) => errors,
            Ok(_) => panic!("expected compile errors"),
        };
        let features: Vec<_> = errors
            .iter()
            .map(|e| match &e.kind {
                CompileErrorKind::UnsupportedFeature { template, .. } => template.clone(),
                other => panic!("unexpected error {:?}", other),
            })
            .collect();
        assert_eq!(features, vec!["ns.bad", "ns.legacy"]);
    }

    #[test]
    fn test_missing_factory_is_internal() {
        let registry = registry(r#"namespace ns template .t { "x" }"#);
        let set = compile(&registry).unwrap();
        assert!(set.instantiate("ns.t").is_ok());
        assert!(set.instantiate("ns.missing").is_err());
    }
}

//! Per-render execution context
//!
//! Everything here lives for exactly one render call. Both execution backends
//! share these helpers so they agree on call data, required parameters and
//! recursion limits.

use std::collections::HashSet;

use tracing::trace;

use crate::data::{Record, Value};
use crate::eval::EvalError;
use crate::msgs::MessageCatalog;
use crate::renaming::{CssRenamingMap, IdRenamingMap};
use crate::tree::Param;
use crate::RenderError;

/// Nested calls allowed before a render is abandoned
pub const MAX_CALL_DEPTH: usize = 256;

/// Stack that must remain before a nested call runs in place
const STACK_RED_ZONE: usize = 128 * 1024;
/// Size of each stack segment added once the red zone is reached
const STACK_SEGMENT: usize = 2 * 1024 * 1024;

const RTL_LANGUAGES: &[&str] = &["ar", "dv", "fa", "he", "iw", "ps", "sd", "ug", "ur", "yi"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BidiDir {
    #[default]
    Ltr,
    Rtl,
}

impl BidiDir {
    /// Direction of a BCP 47 locale such as `he-IL`
    pub fn for_locale(locale: &str) -> Self {
        let language = locale
            .split(['-', '_'])
            .next()
            .unwrap_or(locale)
            .to_ascii_lowercase();
        if RTL_LANGUAGES.contains(&language.as_str()) {
            BidiDir::Rtl
        } else {
            BidiDir::Ltr
        }
    }
}

/// Request-scoped ambient parameters
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SharedParams {
    pub bidi: BidiDir,
    pub locale: Option<String>,
}

impl SharedParams {
    /// Derive the shared params implied by a message catalog
    pub fn seed(catalog: Option<&MessageCatalog>) -> Self {
        let locale = catalog.and_then(|c| c.locale()).map(str::to_string);
        Self {
            bidi: locale
                .as_deref()
                .map(BidiDir::for_locale)
                .unwrap_or_default(),
            locale,
        }
    }
}

/// Render-call state handed to an executor
///
/// `msgs` and `css_map` are only set when substitution did not happen ahead of
/// time; a cached tree already carries translated messages and renamed
/// selectors.
pub struct RenderContext<'r> {
    pub ij: &'r Record,
    pub active_packages: &'r HashSet<String>,
    pub msgs: Option<&'r MessageCatalog>,
    pub css_map: Option<&'r dyn CssRenamingMap>,
    pub id_map: Option<&'r dyn IdRenamingMap>,
    pub shared: SharedParams,
    depth: usize,
}

impl<'r> RenderContext<'r> {
    pub fn new(ij: &'r Record, active_packages: &'r HashSet<String>, shared: SharedParams) -> Self {
        Self {
            ij,
            active_packages,
            msgs: None,
            css_map: None,
            id_map: None,
            shared,
            depth: 0,
        }
    }

    pub fn with_live_substitution(
        mut self,
        msgs: Option<&'r MessageCatalog>,
        css_map: Option<&'r dyn CssRenamingMap>,
    ) -> Self {
        self.msgs = msgs;
        self.css_map = css_map;
        self
    }

    pub fn with_id_map(mut self, id_map: Option<&'r dyn IdRenamingMap>) -> Self {
        self.id_map = id_map;
        self
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Enter a template; fails past [`MAX_CALL_DEPTH`]
    pub fn enter(&mut self, template: &str) -> Result<(), RenderError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RenderError::CallDepthExceeded {
                template: template.to_string(),
                limit: MAX_CALL_DEPTH,
            });
        }
        self.depth += 1;
        trace!(template, depth = self.depth, "enter template");
        Ok(())
    }

    pub fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn ij_value(&self, key: &str) -> Option<Value> {
        self.ij.get(key).cloned()
    }
}

/// Run a nested template call, moving to a fresh stack segment when the
/// current one runs low. Deep recursion then ends in
/// [`RenderError::CallDepthExceeded`] whatever the caller's thread stack.
pub fn nested_call<R>(call: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_SEGMENT, call)
}

/// Fail when `data` lacks one of the required `params` of `template`
pub fn check_required_params(template: &str, params: &[Param], data: &Record) -> Result<(), RenderError> {
    match params
        .iter()
        .find(|p| p.required && !data.contains_key(&p.name))
    {
        Some(param) => Err(RenderError::MissingRequiredParam {
            template: template.to_string(),
            param: param.name.clone(),
        }),
        None => Ok(()),
    }
}

/// Output of `css $component, "selector"`; an empty component leaves the selector alone
pub fn css_class(component: Option<&Value>, selector: &str) -> String {
    match component.filter(|c| !c.is_null()).map(Value::coerce_to_string) {
        Some(prefix) if !prefix.is_empty() => format!("{}-{}", prefix, selector),
        _ => selector.to_string(),
    }
}

/// Base record a call passes on, before explicit params are added
pub enum CallBase<'a> {
    Empty,
    All(&'a Record),
    Value(Value),
}

/// Assemble the callee's data record
pub fn call_record(base: CallBase<'_>, params: Vec<(String, Value)>) -> Result<Record, RenderError> {
    let mut record = match base {
        CallBase::Empty => Record::new(),
        CallBase::All(data) => data.clone(),
        CallBase::Value(Value::Record(record)) => record,
        CallBase::Value(Value::Null) => Record::new(),
        CallBase::Value(other) => {
            return Err(EvalError::TypeMismatch {
                op: "data=",
                found: other.type_name().to_string(),
            }
            .into())
        }
    };
    for (name, value) in params {
        record.insert(name, value);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bidi_for_locale() {
        assert_eq!(BidiDir::for_locale("he-IL"), BidiDir::Rtl);
        assert_eq!(BidiDir::for_locale("AR"), BidiDir::Rtl);
        assert_eq!(BidiDir::for_locale("fr_CA"), BidiDir::Ltr);
    }

    #[test]
    fn test_seed_from_catalog() {
        let catalog = MessageCatalog::new(Some("fa"));
        let shared = SharedParams::seed(Some(&catalog));
        assert_eq!(shared.bidi, BidiDir::Rtl);
        assert_eq!(shared.locale.as_deref(), Some("fa"));
        assert_eq!(SharedParams::seed(None), SharedParams::default());
    }

    #[test]
    fn test_call_depth_limit() {
        let ij = Record::new();
        let packages = HashSet::new();
        let mut ctx = RenderContext::new(&ij, &packages, SharedParams::default());
        for _ in 0..MAX_CALL_DEPTH {
            ctx.enter("ns.loop").unwrap();
        }
        assert!(matches!(
            ctx.enter("ns.loop"),
            Err(RenderError::CallDepthExceeded { limit: 256, .. })
        ));
        ctx.exit();
        assert_eq!(ctx.depth(), MAX_CALL_DEPTH - 1);
    }

    #[test]
    fn test_required_params() {
        let params = vec![
            Param {
                name: "name".to_string(),
                required: true,
            },
            Param {
                name: "title".to_string(),
                required: false,
            },
        ];
        assert!(check_required_params("ns.t", &params, &Record::new().with("name", "Ed")).is_ok());
        let err = check_required_params("ns.t", &params, &Record::new().with("title", "x")).unwrap_err();
        assert_eq!(err.to_string(), "template ns.t requires parameter 'name'");
    }

    #[test]
    fn test_css_class() {
        assert_eq!(css_class(Some(&Value::from("goo")), "a"), "goo-a");
        assert_eq!(css_class(Some(&Value::Null), "a"), "a");
        assert_eq!(css_class(None, "a"), "a");
    }

    #[test]
    fn test_call_record_merges_params() {
        let data = Record::new().with("a", 1i64).with("b", 2i64);
        let record = call_record(
            CallBase::All(&data),
            vec![("b".to_string(), Value::Int(3))],
        )
        .unwrap();
        assert_eq!(record.get("a"), Some(&Value::Int(1)));
        assert_eq!(record.get("b"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_call_record_rejects_non_record_data() {
        let err = call_record(CallBase::Value(Value::Int(1)), vec![]).unwrap_err();
        assert!(matches!(err, RenderError::Eval(_)));
    }
}

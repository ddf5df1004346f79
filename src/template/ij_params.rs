//! Injected-data analysis

use std::collections::{BTreeSet, HashSet};

use crate::tree::{walk_nodes, Expr, Node, TemplateNode};
use crate::RenderError;

use super::registry::TemplateRegistry;

/// `$ij` keys read by `name` and every template it may call
///
/// Delegate calls count every implementation, since the one that runs depends
/// on the packages active at render time.
pub fn used_ij_params(registry: &TemplateRegistry, name: &str) -> Result<BTreeSet<String>, RenderError> {
    let root = registry
        .get(name)
        .ok_or_else(|| RenderError::UndefinedTemplate {
            name: name.to_string(),
        })?;

    let mut params = BTreeSet::new();
    let mut visited = HashSet::new();
    let mut pending = vec![root];

    while let Some(template) = pending.pop() {
        if !visited.insert(template.unique_name()) {
            continue;
        }
        collect(template, registry, &mut params, &mut pending);
    }
    Ok(params)
}

fn collect<'r>(
    template: &'r TemplateNode,
    registry: &'r TemplateRegistry,
    params: &mut BTreeSet<String>,
    pending: &mut Vec<&'r TemplateNode>,
) {
    walk_nodes(&template.body, &mut |node| {
        for expr in node.exprs() {
            expr.walk(&mut |e| {
                if let Expr::Ij(key) = e {
                    params.insert(key.clone());
                }
            });
        }
        match node {
            Node::Call(call) => pending.extend(registry.get(&call.callee)),
            Node::DelCall(call) => pending.extend(registry.delegate_candidates(&call.name)),
            _ => {}
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::build_file_set;
    use indoc::indoc;

    #[test]
    fn test_ij_params_follow_calls_and_delegates() {
        let source = indoc! {r#"
            namespace ns
            template .main {
                $ij.locale
                call .helper
                delcall ns.Slot
            }
            template .helper {
                if $ij.debug { "d" }
                call .main
            }
            deltemplate ns.Slot { $ij.slotName }
        "#};
        let set = build_file_set(&[("a.tpl".to_string(), source.to_string())]).unwrap();
        let registry = TemplateRegistry::build(set).unwrap();
        let params = used_ij_params(&registry, "ns.main").unwrap();
        assert_eq!(
            params.into_iter().collect::<Vec<_>>(),
            vec!["debug", "locale", "slotName"]
        );
    }

    #[test]
    fn test_unknown_template() {
        let set = build_file_set(&[("a.tpl".to_string(), "namespace ns".to_string())]).unwrap();
        let registry = TemplateRegistry::build(set).unwrap();
        assert!(matches!(
            used_ij_params(&registry, "ns.missing"),
            Err(RenderError::UndefinedTemplate { .. })
        ));
    }
}

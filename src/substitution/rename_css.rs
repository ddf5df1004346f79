//! Rename style selectors

use std::convert::Infallible;

use crate::renaming::{rename_selector, CssRenamingMap};
use crate::tree::{FileSet, Node};

use super::flat_map_nodes;

/// Rewrite every selector through `css_map`
///
/// A selector without a component expression becomes plain text. One with a
/// component keeps its node so the component is still evaluated per render.
pub fn rename_css(tree: &mut FileSet, css_map: Option<&dyn CssRenamingMap>) {
    for template in tree.templates_mut() {
        let renamed: Result<(), Infallible> = flat_map_nodes(&mut template.body, &mut |node| {
            Ok(match node {
                Node::Css {
                    component: None,
                    selector,
                } => vec![Node::Text(rename_selector(css_map, &selector))],
                Node::Css {
                    component: Some(component),
                    selector,
                } => vec![Node::Css {
                    component: Some(component),
                    selector: rename_selector(css_map, &selector),
                }],
                other => vec![other],
            })
        });
        if let Err(never) = renamed {
            match never {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renaming::RenamingMap;
    use crate::tree::{build_file_set, Expr};

    #[test]
    fn test_rename_with_and_without_component() {
        let mut tree = build_file_set(&[(
            "a.tpl".to_string(),
            r#"namespace ns template .t { css "header" css $c, "body" css "unmapped" }"#.to_string(),
        )])
        .unwrap();
        let map = RenamingMap::new().with("header", "a").with("body", "b");
        rename_css(&mut tree, Some(&map));
        assert_eq!(
            tree.files[0].templates[0].body,
            vec![
                Node::Text("a".to_string()),
                Node::Css {
                    component: Some(Expr::Var("c".to_string())),
                    selector: "b".to_string(),
                },
                Node::Text("unmapped".to_string()),
            ]
        );
    }
}

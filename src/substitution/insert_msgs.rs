//! Replace messages with their translated text

use crate::msgs::{resolve_parts, MessageCatalog, ResolvedPart};
use crate::tree::{FileSet, Node};

use super::{flat_map_nodes, SubstitutionError};

/// Inline every message, translated through `catalog` when it has one
///
/// Text becomes `Text` nodes and placeholders become `Print` nodes, so the
/// result renders exactly as the message would with the catalog supplied live.
pub fn insert_msgs(tree: &mut FileSet, catalog: Option<&MessageCatalog>) -> Result<(), SubstitutionError> {
    for template in tree.templates_mut() {
        flat_map_nodes(&mut template.body, &mut |node| match node {
            Node::Msg(msg) => Ok(resolve_parts(&msg, catalog)?
                .into_iter()
                .map(|part| match part {
                    ResolvedPart::Text(text) => Node::Text(text.into_owned()),
                    ResolvedPart::Placeholder { expr, directives } => Node::Print {
                        expr: expr.clone(),
                        directives: directives.to_vec(),
                    },
                })
                .collect()),
            other => Ok(vec![other]),
        })?;
    }
    Ok(())
}

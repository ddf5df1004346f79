//! Substitution pipeline
//!
//! Bakes one message catalog and one selector-renaming map into a private
//! copy of a file set, then simplifies what became constant. The input tree
//! is never modified, and the same inputs always produce the same output
//! tree.

mod insert_msgs;
mod rename_css;
mod simplify;

use thiserror::Error;
use tracing::debug;

use crate::msgs::MessageCatalog;
use crate::renaming::CssRenamingMap;
use crate::runtime::SharedParams;
use crate::tree::{FileSet, Node};

pub use insert_msgs::insert_msgs;
pub use rename_css::rename_css;
pub use simplify::{fold_expr, simplify};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubstitutionError {
    #[error("translation of message {id} refers to unknown placeholder '{{{placeholder}}}'")]
    UnknownPlaceholder { id: u64, placeholder: String },
}

/// Run every stage on a clone of `tree`
pub fn apply(
    tree: &FileSet,
    catalog: Option<&MessageCatalog>,
    css_map: Option<&dyn CssRenamingMap>,
) -> Result<FileSet, SubstitutionError> {
    let mut tree = tree.clone();
    let shared = SharedParams::seed(catalog);
    insert_msgs(&mut tree, catalog)?;
    rename_css(&mut tree, css_map);
    simplify(&mut tree, &shared);
    debug!(
        files = tree.files.len(),
        locale = shared.locale.as_deref().unwrap_or("-"),
        "applied substitutions"
    );
    Ok(tree)
}

/// Replace every node of `body`, children first, with what `f` returns for it
fn flat_map_nodes<E>(
    body: &mut Vec<Node>,
    f: &mut dyn FnMut(Node) -> Result<Vec<Node>, E>,
) -> Result<(), E> {
    let nodes = std::mem::take(body);
    for mut node in nodes {
        for child in node.bodies_mut() {
            flat_map_nodes(child, f)?;
        }
        body.extend(f(node)?);
    }
    Ok(())
}

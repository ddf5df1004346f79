//! Template registry and call-graph analysis
//!
//! A [`TemplateRegistry`] indexes one file set by fully-qualified name and
//! resolves delegate templates against the packages active for a render.
//!
//! # Example
//!
//! ```text
//! delpackage fancy
//! namespace shop.pages
//!
//! deltemplate shop.Banner variant="wide" { "fancy wide banner" }
//! ```
//!
//! With `fancy` active, `delcall shop.Banner variant="wide"` runs the template
//! above instead of the package-less default.

mod delegates;
mod ij_params;
mod registry;

pub use delegates::DelegateTable;
pub use ij_params::used_ij_params;
pub use registry::{qualify, TemplateId, TemplateRegistry};

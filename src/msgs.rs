//! Message catalogs
//!
//! A [`MessageCatalog`] maps message ids to translated text. Ids are 63-bit
//! fingerprints of a message's meaning and source text, so a catalog built
//! for one version of a file keeps matching as long as the message itself is
//! unchanged. Placeholders are written `{NAME}` in both the fingerprinted text
//! and translations.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use xxhash_rust::xxh64::xxh64;

use crate::escape::PrintDirective;
use crate::substitution::SubstitutionError;
use crate::tree::{Expr, MsgNode, MsgPart};

const FINGERPRINT_MASK: u64 = 0x7fff_ffff_ffff_ffff;

/// Errors that can occur when loading or parsing message catalogs
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read message catalog: {0}")]
    IoError(#[from] std::io::Error),
    #[error("failed to parse message catalog TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("invalid message id '{0}', expected an unsigned integer")]
    InvalidId(String),
}

/// One piece of a translation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogPart {
    Text(String),
    Placeholder(String),
}

/// Translated messages for one locale
#[derive(Debug, Clone, Default)]
pub struct MessageCatalog {
    locale: Option<String>,
    messages: HashMap<u64, Vec<CatalogPart>>,
}

#[derive(Deserialize)]
struct TomlCatalog {
    metadata: Option<TomlMetadata>,
    #[serde(default)]
    messages: HashMap<String, String>,
}

#[derive(Deserialize)]
struct TomlMetadata {
    locale: Option<String>,
}

impl MessageCatalog {
    pub fn new(locale: Option<&str>) -> Self {
        Self {
            locale: locale.map(str::to_string),
            messages: HashMap::new(),
        }
    }

    /// Load a catalog from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse a catalog from TOML text
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, CatalogError> {
        let parsed: TomlCatalog = toml::from_str(content)?;
        let mut catalog = Self::new(parsed.metadata.and_then(|m| m.locale).as_deref());
        for (id, text) in parsed.messages {
            let id = id
                .trim()
                .parse::<u64>()
                .map_err(|_| CatalogError::InvalidId(id.clone()))?;
            catalog.insert(id, &text);
        }
        Ok(catalog)
    }

    /// Add a translation; `{NAME}` marks a placeholder
    pub fn insert(&mut self, id: u64, text: &str) {
        self.messages.insert(id, parse_translation(text));
    }

    pub fn with_message(mut self, id: u64, text: &str) -> Self {
        self.insert(id, text);
        self
    }

    pub fn get(&self, id: u64) -> Option<&[CatalogPart]> {
        self.messages.get(&id).map(Vec::as_slice)
    }

    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn parse_translation(text: &str) -> Vec<CatalogPart> {
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if is_placeholder_name(&after[..close]) => {
                literal.push_str(&rest[..open]);
                if !literal.is_empty() {
                    parts.push(CatalogPart::Text(std::mem::take(&mut literal)));
                }
                parts.push(CatalogPart::Placeholder(after[..close].to_string()));
                rest = &after[close + 1..];
            }
            _ => {
                literal.push_str(&rest[..=open]);
                rest = after;
            }
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        parts.push(CatalogPart::Text(literal));
    }
    parts
}

/// Convert `userName` or `user_name` to `USER_NAME`
pub fn to_upper_underscore(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        out.push(c.to_ascii_uppercase());
    }
    out
}

/// Base placeholder name for a printed expression
pub fn placeholder_base_name(expr: &Expr) -> String {
    match expr {
        Expr::Var(name) | Expr::Ij(name) | Expr::Field(_, name) => to_upper_underscore(name),
        _ => "XXX".to_string(),
    }
}

/// Name the placeholders of a message
///
/// Equal expressions share a name; distinct expressions whose base names
/// collide are numbered `_1`, `_2`, ... in order of first appearance.
pub fn name_placeholders(placeholders: &[(Expr, Vec<PrintDirective>)]) -> Vec<String> {
    let mut distinct: Vec<&(Expr, Vec<PrintDirective>)> = Vec::new();
    for placeholder in placeholders {
        if !distinct.contains(&placeholder) {
            distinct.push(placeholder);
        }
    }

    let bases: Vec<String> = distinct.iter().map(|(e, _)| placeholder_base_name(e)).collect();
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut names = Vec::with_capacity(distinct.len());
    for base in &bases {
        let total = bases.iter().filter(|b| *b == base).count();
        if total == 1 {
            names.push(base.clone());
        } else {
            let n = seen.entry(base.as_str()).or_insert(0);
            *n += 1;
            names.push(format!("{}_{}", base, n));
        }
    }

    placeholders
        .iter()
        .map(|p| {
            let index = distinct.iter().position(|d| *d == p).unwrap_or(0);
            names[index].clone()
        })
        .collect()
}

/// Fingerprint of a message: meaning plus text with `{NAME}` placeholders
pub fn message_id(meaning: Option<&str>, parts: &[MsgPart]) -> u64 {
    let mut key = String::new();
    if let Some(meaning) = meaning {
        key.push_str(meaning);
        key.push('\u{1f}');
    }
    for part in parts {
        match part {
            MsgPart::Text(text) => key.push_str(text),
            MsgPart::Placeholder { name, .. } => {
                key.push('{');
                key.push_str(name);
                key.push('}');
            }
        }
    }
    xxh64(key.as_bytes(), 0) & FINGERPRINT_MASK
}

/// A message part ready to render
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedPart<'a> {
    Text(Cow<'a, str>),
    Placeholder {
        expr: &'a Expr,
        directives: &'a [PrintDirective],
    },
}

/// Select the parts to render for `msg`
///
/// A missing catalog or a message the catalog does not know falls back to the
/// source text. A translation naming a placeholder the message does not have
/// is an error.
pub fn resolve_parts<'a>(
    msg: &'a MsgNode,
    catalog: Option<&'a MessageCatalog>,
) -> Result<Vec<ResolvedPart<'a>>, SubstitutionError> {
    let source_parts = || -> Vec<ResolvedPart<'a>> {
        msg.parts
            .iter()
            .map(|part| match part {
                MsgPart::Text(text) => ResolvedPart::Text(Cow::Borrowed(text.as_str())),
                MsgPart::Placeholder {
                    expr, directives, ..
                } => ResolvedPart::Placeholder { expr, directives },
            })
            .collect()
    };

    let Some(translation) = catalog.and_then(|c| c.get(msg.id)) else {
        return Ok(source_parts());
    };

    translation
        .iter()
        .map(|part| match part {
            CatalogPart::Text(text) => Ok(ResolvedPart::Text(Cow::Borrowed(text.as_str()))),
            CatalogPart::Placeholder(wanted) => msg
                .parts
                .iter()
                .find_map(|p| match p {
                    MsgPart::Placeholder {
                        name,
                        expr,
                        directives,
                    } if name == wanted => Some(ResolvedPart::Placeholder { expr, directives }),
                    _ => None,
                })
                .ok_or_else(|| SubstitutionError::UnknownPlaceholder {
                    id: msg.id,
                    placeholder: wanted.clone(),
                }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn greeting() -> MsgNode {
        let parts = vec![
            MsgPart::Text("Hello, ".to_string()),
            MsgPart::Placeholder {
                name: "NAME".to_string(),
                expr: Expr::Var("name".to_string()),
                directives: vec![],
            },
            MsgPart::Text("!".to_string()),
        ];
        MsgNode {
            id: message_id(None, &parts),
            meaning: None,
            desc: None,
            parts,
        }
    }

    #[test]
    fn test_upper_underscore() {
        assert_eq!(to_upper_underscore("userName"), "USER_NAME");
        assert_eq!(to_upper_underscore("name"), "NAME");
        assert_eq!(to_upper_underscore("url2Go"), "URL2_GO");
    }

    #[test]
    fn test_placeholder_names_number_collisions() {
        let user_name = Expr::Field(Box::new(Expr::Var("user".into())), "name".into());
        let names = name_placeholders(&[
            (Expr::Var("name".into()), vec![]),
            (user_name, vec![]),
            (Expr::Var("name".into()), vec![]),
            (Expr::Int(3), vec![]),
        ]);
        assert_eq!(names, vec!["NAME_1", "NAME_2", "NAME_1", "XXX"]);
    }

    #[test]
    fn test_message_id_depends_on_meaning() {
        let parts = vec![MsgPart::Text("Save".to_string())];
        let plain = message_id(None, &parts);
        assert_eq!(plain, message_id(None, &parts));
        assert_ne!(plain, message_id(Some("verb"), &parts));
        assert_eq!(plain >> 63, 0);
    }

    #[test]
    fn test_parse_translation() {
        assert_eq!(
            parse_translation("Bonjour, {NAME} {x}!"),
            vec![
                CatalogPart::Text("Bonjour, ".to_string()),
                CatalogPart::Placeholder("NAME".to_string()),
                CatalogPart::Text(" {x}!".to_string()),
            ]
        );
    }

    #[test]
    fn test_resolve_falls_back_to_source() {
        let msg = greeting();
        let catalog = MessageCatalog::new(Some("fr"));
        let parts = resolve_parts(&msg, Some(&catalog)).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], ResolvedPart::Text(Cow::Borrowed("Hello, ")));
    }

    #[test]
    fn test_resolve_uses_translation() {
        let msg = greeting();
        let catalog = MessageCatalog::new(Some("fr")).with_message(msg.id, "Salut {NAME}");
        let parts = resolve_parts(&msg, Some(&catalog)).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], ResolvedPart::Text(Cow::Borrowed("Salut ")));
        assert!(matches!(parts[1], ResolvedPart::Placeholder { .. }));
    }

    #[test]
    fn test_resolve_rejects_unknown_placeholder() {
        let msg = greeting();
        let catalog = MessageCatalog::new(None).with_message(msg.id, "Salut {WHO}");
        let err = resolve_parts(&msg, Some(&catalog)).unwrap_err();
        assert!(matches!(
            err,
            SubstitutionError::UnknownPlaceholder { placeholder, .. } if placeholder == "WHO"
        ));
    }

    #[test]
    fn test_catalog_from_toml() {
        let catalog = MessageCatalog::from_str(
            r#"
            [metadata]
            locale = "he"

            [messages]
            "42" = "shalom {NAME}"
            "#,
        )
        .unwrap();
        assert_eq!(catalog.locale(), Some("he"));
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get(42).is_some());
    }

    #[test]
    fn test_catalog_rejects_bad_id() {
        let err = MessageCatalog::from_str("[messages]\nabc = \"x\"\n").unwrap_err();
        assert!(matches!(err, CatalogError::InvalidId(id) if id == "abc"));
    }
}

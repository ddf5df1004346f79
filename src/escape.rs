//! Autoescaping and print directives

use base64::Engine;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::data::{ContentKind, SanitizedContent, Value};
use crate::tree::AutoescapeMode;

/// Replacement for values rejected by a filter
pub const INNOCUOUS_OUTPUT: &str = "zQuirez";

const INNOCUOUS_IMAGE_URI: &str = "data:image/gif;base64,zQuirez";
const INNOCUOUS_URI: &str = "about:invalid#zQuirez";

/// `|name` after a printed expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrintDirective {
    NoAutoescape,
    Id,
    EscapeHtml,
    EscapeUri,
    EscapeJsString,
    FilterImageDataUri,
}

impl PrintDirective {
    pub const ALL: [PrintDirective; 6] = [
        PrintDirective::NoAutoescape,
        PrintDirective::Id,
        PrintDirective::EscapeHtml,
        PrintDirective::EscapeUri,
        PrintDirective::EscapeJsString,
        PrintDirective::FilterImageDataUri,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PrintDirective::NoAutoescape => "noAutoescape",
            PrintDirective::Id => "id",
            PrintDirective::EscapeHtml => "escapeHtml",
            PrintDirective::EscapeUri => "escapeUri",
            PrintDirective::EscapeJsString => "escapeJsString",
            PrintDirective::FilterImageDataUri => "filterImageDataUri",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.name() == name)
    }

    /// Output of this directive is written without further escaping
    pub fn cancels_autoescape(self) -> bool {
        matches!(self, PrintDirective::NoAutoescape | PrintDirective::Id)
    }

    pub fn apply(self, value: Value) -> Value {
        match self {
            PrintDirective::NoAutoescape | PrintDirective::Id => value,
            PrintDirective::EscapeHtml => match value {
                Value::Sanitized(s) if s.kind() == ContentKind::Html => Value::Sanitized(s),
                other => SanitizedContent::ordain(
                    escape_html(&other.coerce_to_string()),
                    ContentKind::Html,
                )
                .into(),
            },
            PrintDirective::EscapeUri => {
                SanitizedContent::ordain(escape_uri(&value.coerce_to_string()), ContentKind::Uri)
                    .into()
            }
            PrintDirective::EscapeJsString => SanitizedContent::ordain(
                escape_js_string(&value.coerce_to_string()),
                ContentKind::Js,
            )
            .into(),
            PrintDirective::FilterImageDataUri => SanitizedContent::ordain(
                filter_image_data_uri(&value.coerce_to_string()),
                ContentKind::Uri,
            )
            .into(),
        }
    }
}

/// Escaping in effect where a value is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscapeContext {
    pub mode: AutoescapeMode,
    /// Set for strict contexts
    pub kind: Option<ContentKind>,
}

impl EscapeContext {
    pub fn new(mode: AutoescapeMode, kind: Option<ContentKind>) -> Self {
        Self { mode, kind }
    }

    pub fn strict(kind: ContentKind) -> Self {
        Self {
            mode: AutoescapeMode::Strict,
            kind: Some(kind),
        }
    }

    /// Context for a call-param block; a kinded block is strict in its own kind
    pub fn for_block(self, kind: Option<ContentKind>) -> Self {
        kind.map(Self::strict).unwrap_or(self)
    }

    /// Escape `value` for this context
    pub fn escape(&self, value: &Value) -> String {
        match self.mode {
            AutoescapeMode::NoAutoescape => value.coerce_to_string(),
            AutoescapeMode::Contextual | AutoescapeMode::NonContextual => match value {
                Value::Sanitized(s) if s.kind() == ContentKind::Html => s.content().to_string(),
                other => escape_html(&other.coerce_to_string()),
            },
            AutoescapeMode::Strict => {
                let kind = self.kind.unwrap_or(ContentKind::Html);
                if let Value::Sanitized(s) = value {
                    if s.kind() == kind {
                        return s.content().to_string();
                    }
                }
                match kind {
                    ContentKind::Html => escape_html(&value.coerce_to_string()),
                    ContentKind::Attributes => filter_html_attributes(&value.coerce_to_string()),
                    ContentKind::Js => js_value(value),
                    ContentKind::Css => filter_css_value(&value.coerce_to_string()),
                    ContentKind::Uri => filter_normalize_uri(&value.coerce_to_string()),
                    ContentKind::Text => value.coerce_to_string(),
                }
            }
        }
    }
}

/// Apply `directives` then autoescape, producing the printed text
pub fn print_value(ctx: EscapeContext, value: Value, directives: &[PrintDirective]) -> String {
    let cancelled = directives.iter().any(|d| d.cancels_autoescape());
    let value = directives.iter().fold(value, |acc, d| d.apply(acc));
    if cancelled {
        value.coerce_to_string()
    } else {
        ctx.escape(&value)
    }
}

pub fn escape_html(s: &str) -> String {
    html_escape::encode_quoted_attribute(s).into_owned()
}

pub fn escape_js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\x27"),
            '"' => out.push_str("\\x22"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '<' => out.push_str("\\x3c"),
            '>' => out.push_str("\\x3e"),
            '&' => out.push_str("\\x26"),
            '=' => out.push_str("\\x3d"),
            '/' => out.push_str("\\/"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(c),
        }
    }
    out
}

/// Everything but the unreserved characters
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Characters that keep their meaning inside a normalized URI
const NORMALIZED_URI: &AsciiSet = &URI_COMPONENT
    .remove(b':')
    .remove(b'/')
    .remove(b'?')
    .remove(b'#')
    .remove(b'[')
    .remove(b']')
    .remove(b'@')
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b'%');

pub fn escape_uri(s: &str) -> String {
    utf8_percent_encode(s, URI_COMPONENT).to_string()
}

fn has_safe_scheme(uri: &str) -> bool {
    match uri.find(':') {
        None => true,
        Some(colon) => {
            // A colon after the first '/', '?' or '#' is not a scheme separator
            if uri[..colon].contains(['/', '?', '#']) {
                return true;
            }
            let scheme = uri[..colon].to_ascii_lowercase();
            matches!(scheme.as_str(), "http" | "https" | "mailto")
        }
    }
}

/// Reject dangerous schemes and percent-encode characters unsafe in attributes
pub fn filter_normalize_uri(s: &str) -> String {
    if !has_safe_scheme(s) {
        return INNOCUOUS_URI.to_string();
    }
    utf8_percent_encode(s, NORMALIZED_URI).to_string()
}

pub fn filter_css_value(s: &str) -> String {
    let ok = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '#' | '.' | ',' | '%' | ' '));
    if ok {
        s.to_string()
    } else {
        INNOCUOUS_OUTPUT.to_string()
    }
}

pub fn filter_html_attributes(s: &str) -> String {
    let mut chars = s.chars();
    let ok = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'));
    if ok {
        s.to_string()
    } else {
        INNOCUOUS_OUTPUT.to_string()
    }
}

/// Accept only base64 image data URIs whose payload decodes
pub fn filter_image_data_uri(s: &str) -> String {
    let payload = ["png", "gif", "jpeg", "webp"]
        .iter()
        .find_map(|ty| s.strip_prefix(&format!("data:image/{};base64,", ty)));
    match payload {
        Some(data) if base64::engine::general_purpose::STANDARD.decode(data).is_ok() => {
            s.to_string()
        }
        _ => INNOCUOUS_IMAGE_URI.to_string(),
    }
}

/// A value written into JavaScript
fn js_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) | Value::Int(_) | Value::Float(_) => value.coerce_to_string(),
        other => format!("'{}'", escape_js_string(&other.coerce_to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & 'Jerry'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; &#x27;Jerry&#x27;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_escape_uri_encodes_utf8_bytes() {
        assert_eq!(escape_uri("a b/é~"), "a%20b%2F%C3%A9~");
        assert_eq!(filter_normalize_uri("/p?q=é&r=1#top"), "/p?q=%C3%A9&r=1#top");
    }

    #[test]
    fn test_strict_html_passes_matching_sanitized_content() {
        let ctx = EscapeContext::strict(ContentKind::Html);
        let safe = Value::from(SanitizedContent::ordain("<b>x</b>", ContentKind::Html));
        assert_eq!(ctx.escape(&safe), "<b>x</b>");
        let uri = Value::from(SanitizedContent::ordain("<u>", ContentKind::Uri));
        assert_eq!(ctx.escape(&uri), "&lt;u&gt;");
    }

    #[test]
    fn test_strict_text_is_raw() {
        let ctx = EscapeContext::strict(ContentKind::Text);
        assert_eq!(ctx.escape(&Value::from("<x>")), "<x>");
    }

    #[test]
    fn test_strict_js_quotes_strings() {
        let ctx = EscapeContext::strict(ContentKind::Js);
        assert_eq!(ctx.escape(&Value::from("a'b")), r"'a\x27b'");
        assert_eq!(ctx.escape(&Value::Int(3)), "3");
    }

    #[test]
    fn test_no_autoescape_mode() {
        let ctx = EscapeContext::new(AutoescapeMode::NoAutoescape, None);
        assert_eq!(ctx.escape(&Value::from("<x>")), "<x>");
    }

    #[test]
    fn test_uri_filter_rejects_javascript_scheme() {
        assert_eq!(filter_normalize_uri("javascript:alert(1)"), INNOCUOUS_URI);
        assert_eq!(filter_normalize_uri("/a b?c=d"), "/a%20b?c=d");
        assert_eq!(filter_normalize_uri("https://x.org/"), "https://x.org/");
    }

    #[test]
    fn test_directives_cancel_autoescape() {
        let ctx = EscapeContext::strict(ContentKind::Html);
        assert_eq!(
            print_value(ctx, Value::from("<b>"), &[PrintDirective::NoAutoescape]),
            "<b>"
        );
        assert_eq!(print_value(ctx, Value::from("<b>"), &[]), "&lt;b&gt;");
    }

    #[test]
    fn test_escape_uri_directive_output_is_html_escaped_once() {
        let ctx = EscapeContext::strict(ContentKind::Html);
        assert_eq!(
            print_value(ctx, Value::from("a&b c"), &[PrintDirective::EscapeUri]),
            "a%26b%20c"
        );
    }

    #[test]
    fn test_escape_html_directive_is_idempotent() {
        let ctx = EscapeContext::strict(ContentKind::Html);
        assert_eq!(
            print_value(
                ctx,
                Value::from("<"),
                &[PrintDirective::EscapeHtml, PrintDirective::EscapeHtml]
            ),
            "&lt;"
        );
    }

    #[test]
    fn test_filter_image_data_uri() {
        assert_eq!(
            filter_image_data_uri("data:image/png;base64,aGVsbG8="),
            "data:image/png;base64,aGVsbG8="
        );
        assert_eq!(
            filter_image_data_uri("data:image/png;base64,@@@"),
            INNOCUOUS_IMAGE_URI
        );
        assert_eq!(
            filter_image_data_uri("data:text/html;base64,aGVsbG8="),
            INNOCUOUS_IMAGE_URI
        );
    }

    #[test]
    fn test_directive_names() {
        for directive in PrintDirective::ALL {
            assert_eq!(PrintDirective::from_name(directive.name()), Some(directive));
        }
        assert_eq!(PrintDirective::from_name("changeNewlineToBr"), None);
    }
}

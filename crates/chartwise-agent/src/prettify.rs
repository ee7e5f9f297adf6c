//! Final answer formatting.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::text::strip_code_fences;

const NEW_TAB_ATTRS: &str = r#"target="_blank" rel="noopener noreferrer""#;

static MARKDOWN_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\[\]]+)\]\((https?://[^\s)]+)\)").expect("valid markdown link regex")
});

static ANCHOR_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<a\s+([^>]*)>").expect("valid anchor regex"));

static EXTERNAL_HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*["']https?://"#).expect("valid href regex")
});

static TARGET_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\btarget\s*=").expect("valid target regex"));

/// Strip surrounding code fences and make external links open in a new tab.
///
/// Everything else passes through unchanged, citations included.
pub fn prettify(answer: &str) -> String {
    let text = strip_code_fences(answer);

    let linked = MARKDOWN_LINK.replace_all(text, |caps: &Captures| {
        format!(r#"<a href="{}" {}>{}</a>"#, &caps[2], NEW_TAB_ATTRS, &caps[1])
    });

    ANCHOR_TAG
        .replace_all(&linked, |caps: &Captures| {
            let attrs = caps[1].trim_end_matches('/').trim_end();
            if EXTERNAL_HREF.is_match(attrs) && !TARGET_ATTR.is_match(attrs) {
                format!("<a {} {}>", attrs, NEW_TAB_ATTRS)
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

//! Whitelist sanitizer for inline markup in section data.
//!
//! Rules are declared per data field:
//!
//! | Field rule          | Effect                                   |
//! |---------------------|------------------------------------------|
//! | `true`              | value left untouched                     |
//! | `false`             | every tag stripped, text kept            |
//! | `{tag: rule, ...}`  | listed tags kept per tag rule            |
//!
//! and per tag: `true` keeps the tag with all attributes, a map keeps only
//! the attributes mapped to `true`, `false` or absence unwraps the tag.
//! `script` and `style` elements are dropped together with their content.
//! Fields without a rule fall back to the editor's inline base rules.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use folio_types::SectionData;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rule for one tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagRule {
    Allow(bool),
    Attributes(BTreeMap<String, bool>),
}

/// Allowed tags keyed by lowercase tag name.
pub type TagRules = BTreeMap<String, TagRule>;

/// Rule for one data field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SanitizeRule {
    Allow(bool),
    Tags(TagRules),
}

/// Field rules keyed by data field name.
pub type SanitizeConfig = BTreeMap<String, SanitizeRule>;

static COMMENT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("static regex"));
// Attribute text up to the closing `>`, skipping over quoted values.
static SCRIPT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script\b(?:"[^"]*"|'[^']*'|[^'">])*>.*?</script\s*>"#).expect("static regex")
});
static STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<style\b(?:"[^"]*"|'[^']*'|[^'">])*>.*?</style\s*>"#).expect("static regex")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(/?)([a-zA-Z][a-zA-Z0-9-]*)((?:"[^"]*"|'[^']*'|[^'">])*)>"#).expect("static regex")
});
static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>/]+)))?"#)
        .expect("static regex")
});

/// Sanitize one markup string against tag rules.
pub fn sanitize_str(html: &str, rules: &TagRules) -> String {
    let cleaned = COMMENT.replace_all(html, "");
    let cleaned = SCRIPT.replace_all(&cleaned, "");
    let cleaned = STYLE.replace_all(&cleaned, "");

    let mut out = String::with_capacity(cleaned.len());
    let mut last = 0;
    for caps in TAG.captures_iter(&cleaned) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&cleaned[last..whole.start()]);
        last = whole.end();

        let closing = !caps[1].is_empty();
        let name = caps[2].to_ascii_lowercase();
        let rule = match rules.get(&name) {
            None | Some(TagRule::Allow(false)) => continue,
            Some(rule) => rule,
        };

        if closing {
            out.push_str("</");
            out.push_str(&name);
            out.push('>');
            continue;
        }

        out.push('<');
        out.push_str(&name);
        let raw_attrs = caps.get(3).map(|m| m.as_str()).unwrap_or("");
        for attr in ATTR.captures_iter(raw_attrs) {
            let attr_name = attr[1].to_ascii_lowercase();
            let keep = match rule {
                TagRule::Allow(_) => true,
                TagRule::Attributes(allowed) => allowed.get(&attr_name).copied().unwrap_or(false),
            };
            if !keep {
                continue;
            }
            let value = attr
                .get(2)
                .or_else(|| attr.get(3))
                .or_else(|| attr.get(4))
                .map(|m| m.as_str());
            out.push(' ');
            out.push_str(&attr_name);
            if let Some(value) = value {
                out.push_str("=\"");
                out.push_str(&value.replace('"', "&quot;"));
                out.push('"');
            }
        }
        out.push('>');
    }
    out.push_str(&cleaned[last..]);
    out
}

/// Apply a field rule to one value. Arrays and nested mappings are walked.
fn sanitize_value(value: &Value, rule: Option<&SanitizeRule>, config: &SanitizeConfig, base: &TagRules) -> Value {
    match value {
        Value::String(s) => match rule {
            Some(SanitizeRule::Allow(true)) => value.clone(),
            Some(SanitizeRule::Allow(false)) => Value::String(sanitize_str(s, &TagRules::new())),
            Some(SanitizeRule::Tags(tags)) => Value::String(sanitize_str(s, tags)),
            None => Value::String(sanitize_str(s, base)),
        },
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| sanitize_value(item, rule, config, base))
                .collect(),
        ),
        Value::Object(map) => Value::Object(sanitize_data(map, config, base)),
        other => other.clone(),
    }
}

/// Sanitize every string in `data` with its field's rule, or `base` when
/// the field has none.
pub fn sanitize_data(data: &SectionData, config: &SanitizeConfig, base: &TagRules) -> SectionData {
    data.iter()
        .map(|(key, value)| (key.clone(), sanitize_value(value, config.get(key), config, base)))
        .collect()
}

/// Fold the inline base tags into every tag-map field rule. Field entries win.
pub fn with_base(config: &SanitizeConfig, base: &TagRules) -> SanitizeConfig {
    config
        .iter()
        .map(|(field, rule)| {
            let merged = match rule {
                SanitizeRule::Tags(tags) => {
                    let mut all = base.clone();
                    all.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
                    SanitizeRule::Tags(all)
                }
                other => other.clone(),
            };
            (field.clone(), merged)
        })
        .collect()
}

//! `{{source.path}}` placeholder resolution.
//!
//! A placeholder names a source (`trigger` or a node id) followed by a dot
//! path into that source's value:
//!
//! ```text
//! Hi {{trigger.contact.first_name}}, your score is {{score-node.output.score}}
//! ```
//!
//! Resolution never fails. Anything that cannot be found becomes the empty
//! string, and an unterminated `{{` is copied through unchanged.

use crate::node::NodeId;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Source name that addresses the trigger payload.
pub const TRIGGER_SOURCE: &str = "trigger";

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// The values placeholders can refer to.
#[derive(Debug, Clone, Copy)]
pub struct TemplateContext<'a> {
    pub trigger_data: &'a JsonValue,
    pub node_outputs: &'a BTreeMap<NodeId, JsonValue>,
}

impl<'a> TemplateContext<'a> {
    #[must_use]
    pub fn new(
        trigger_data: &'a JsonValue,
        node_outputs: &'a BTreeMap<NodeId, JsonValue>,
    ) -> Self {
        Self {
            trigger_data,
            node_outputs,
        }
    }

    /// Looks up `source.path...` where `source` is `trigger` or a node id.
    ///
    /// For node sources a leading `output` segment is skipped when the node's
    /// output has no `output` key, so `node.output.x` and `node.x` agree.
    #[must_use]
    pub fn lookup(&self, reference: &str) -> Option<&'a JsonValue> {
        let mut segments = reference.split('.');
        let source = segments.next()?;
        if source == TRIGGER_SOURCE {
            return walk(self.trigger_data, segments);
        }

        let output = self.node_outputs.get(source)?;
        let mut segments = segments.peekable();
        if segments.peek() == Some(&"output") && output.get("output").is_none() {
            segments.next();
        }
        walk(output, segments)
    }

    /// Looks up a bare condition field.
    ///
    /// `trigger.x` and `<node>.x` behave as in [`lookup`](Self::lookup); any
    /// other path is walked from the root of the trigger data.
    #[must_use]
    pub fn lookup_field(&self, path: &str) -> Option<&'a JsonValue> {
        let path = path.trim();
        let source = path.split('.').next().unwrap_or_default();
        if source == TRIGGER_SOURCE || self.node_outputs.contains_key(source) {
            return self.lookup(path);
        }
        walk(self.trigger_data, path.split('.'))
    }

    /// Replaces every placeholder in `template`.
    ///
    /// Single pass: substituted text is not scanned again.
    #[must_use]
    pub fn resolve(&self, template: &str) -> String {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find(OPEN) {
            let after_open = &rest[start + OPEN.len()..];
            let Some(end) = after_open.find(CLOSE) else {
                break;
            };
            out.push_str(&rest[..start]);
            let reference = after_open[..end].trim();
            if let Some(value) = self.lookup(reference) {
                out.push_str(&stringify(value));
            }
            rest = &after_open[end + CLOSE.len()..];
        }

        out.push_str(rest);
        out
    }

    /// Applies [`resolve`](Self::resolve) to every string inside `value`.
    ///
    /// Object keys and non-string scalars are kept as they are.
    #[must_use]
    pub fn resolve_value(&self, value: &JsonValue) -> JsonValue {
        match value {
            JsonValue::String(s) => JsonValue::String(self.resolve(s)),
            JsonValue::Array(items) => {
                JsonValue::Array(items.iter().map(|v| self.resolve_value(v)).collect())
            }
            JsonValue::Object(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

/// Returns whether `text` contains a placeholder opener.
#[must_use]
pub fn has_placeholder(text: &str) -> bool {
    text.contains(OPEN)
}

/// Renders a JSON value the way placeholders substitute it.
///
/// Strings are verbatim, null is empty, everything else is compact JSON.
#[must_use]
pub fn stringify(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn walk<'v, 's>(
    root: &'v JsonValue,
    segments: impl IntoIterator<Item = &'s str>,
) -> Option<&'v JsonValue> {
    segments.into_iter().try_fold(root, |value, segment| {
        if segment.is_empty() {
            return None;
        }
        match value {
            JsonValue::Object(map) => map.get(segment),
            JsonValue::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    })
}

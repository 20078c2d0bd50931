//! Entity label templates.
//!
//! A template is plain text with `{...}` placeholders:
//!
//! - `{id}` and `{type}` render the entity id and type name.
//! - `{field}` renders a field's value.
//! - `{field/pointer}` renders the part of a field's value selected by a JSON
//!   pointer, e.g. `{stats/name}`.
//!
//! Strings render without quotes, missing values render as an empty string.

use ovl_diff::Document;
use regex::Regex;
use std::sync::OnceLock;

pub const DEFAULT_TEMPLATE: &str = "{type} #{id}";

fn placeholder_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^{}]+)\}").ok()).as_ref()
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Id,
    Type,
    Field { name: String, pointer: String },
}

/// A parsed label template.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelFormat {
    segments: Vec<Segment>,
}

impl Default for LabelFormat {
    fn default() -> Self {
        Self::parse(DEFAULT_TEMPLATE)
    }
}

impl LabelFormat {
    pub fn parse(template: &str) -> Self {
        let mut segments = Vec::new();
        let mut last = 0;

        let Some(re) = placeholder_regex() else {
            return Self {
                segments: vec![Segment::Text(template.to_string())],
            };
        };

        for caps in re.captures_iter(template) {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                segments.push(Segment::Text(template[last..whole.start()].to_string()));
            }
            segments.push(match inner.as_str() {
                "id" => Segment::Id,
                "type" => Segment::Type,
                other => match other.split_once('/') {
                    Some((name, rest)) => Segment::Field {
                        name: name.to_string(),
                        pointer: format!("/{rest}"),
                    },
                    None => Segment::Field {
                        name: other.to_string(),
                        pointer: String::new(),
                    },
                },
            });
            last = whole.end();
        }
        if last < template.len() {
            segments.push(Segment::Text(template[last..].to_string()));
        }

        Self { segments }
    }

    /// Field names referenced by the template.
    pub fn referenced_fields(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Field { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Render the label. `lookup` returns a field's current value.
    pub fn render<'a, F>(&self, type_name: &str, id: i64, lookup: F) -> String
    where
        F: Fn(&str) -> Option<&'a Document>,
    {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Id => out.push_str(&id.to_string()),
                Segment::Type => out.push_str(type_name),
                Segment::Field { name, pointer } => {
                    let value = lookup(name).and_then(|doc| {
                        if pointer.is_empty() {
                            Some(doc)
                        } else {
                            doc.pointer(pointer)
                        }
                    });
                    match value {
                        Some(Document::String(s)) => out.push_str(s),
                        Some(Document::Null) | None => {}
                        Some(other) => out.push_str(&other.to_string()),
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_template() {
        let label = LabelFormat::default().render("Item", 7, |_| None);
        assert_eq!(label, "Item #7");
    }

    #[test]
    fn test_field_and_pointer() {
        let stats = json!({ "name": "Sword", "power": 10 });
        let format = LabelFormat::parse("{stats/name} [{stats/power}] ({id})");
        let label = format.render("Item", 7, |field| (field == "stats").then_some(&stats));
        assert_eq!(label, "Sword [10] (7)");
    }

    #[test]
    fn test_missing_values_render_empty() {
        let format = LabelFormat::parse("<{missing}>{type}");
        assert_eq!(format.render("Item", 1, |_| None), "<>Item");
    }

    #[test]
    fn test_referenced_fields() {
        let format = LabelFormat::parse("{a} {b/c} {id} {type}");
        assert_eq!(format.referenced_fields().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}

//! Structured brief document co-edited during a session
//!
//! The schema is fixed: named sections holding scalar fields and bounded list
//! fields. Partial updates are merged shallowly per section; anything the
//! schema does not know is dropped rather than rejected.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Maximum entries kept in a list field
pub const MAX_LIST_ITEMS: usize = 5;

/// Field shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Single text value
    Scalar,
    /// Up to [`MAX_LIST_ITEMS`] text values
    List,
}

/// One section of the schema
#[derive(Debug)]
pub struct SectionSchema {
    pub name: &'static str,
    pub fields: &'static [(&'static str, FieldKind)],
}

impl SectionSchema {
    fn field(&self, name: &str) -> Option<(&'static str, FieldKind)> {
        self.fields
            .iter()
            .find(|(field, _)| field.eq_ignore_ascii_case(name))
            .copied()
    }
}

use FieldKind::{List, Scalar};

/// Document schema
pub const SCHEMA: &[SectionSchema] = &[
    SectionSchema {
        name: "project",
        fields: &[("title", Scalar), ("summary", Scalar), ("goals", List)],
    },
    SectionSchema {
        name: "audience",
        fields: &[("primary", Scalar), ("description", Scalar), ("segments", List)],
    },
    SectionSchema {
        name: "messaging",
        fields: &[
            ("key_message", Scalar),
            ("call_to_action", Scalar),
            ("supporting_messages", List),
        ],
    },
    SectionSchema {
        name: "style",
        fields: &[("tone", Scalar), ("visual_style", Scalar), ("references", List)],
    },
    SectionSchema {
        name: "format",
        fields: &[("duration", Scalar), ("aspect_ratio", Scalar), ("platforms", List)],
    },
    SectionSchema {
        name: "schedule",
        fields: &[("deadline", Scalar), ("milestones", List)],
    },
    SectionSchema {
        name: "budget",
        fields: &[("range", Scalar), ("currency", Scalar), ("notes", Scalar)],
    },
    SectionSchema {
        name: "success",
        fields: &[("metrics", List)],
    },
];

/// Look up a section of the schema (ASCII case-insensitive)
#[must_use]
pub fn section_schema(name: &str) -> Option<&'static SectionSchema> {
    SCHEMA.iter().find(|s| s.name.eq_ignore_ascii_case(name))
}

/// Stored value of one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

type Fields = BTreeMap<&'static str, FieldValue>;

/// The brief document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Document {
    sections: BTreeMap<&'static str, Fields>,
}

/// Changes a merge actually applied, keyed like the document
///
/// `None` marks a cleared field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DocumentPatch {
    sections: BTreeMap<&'static str, BTreeMap<&'static str, Option<FieldValue>>>,
}

impl DocumentPatch {
    /// Whether the merge changed nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Number of fields changed
    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.values().map(BTreeMap::len).sum()
    }

    fn record(&mut self, section: &'static str, field: &'static str, value: Option<FieldValue>) {
        self.sections.entry(section).or_default().insert(field, value);
    }
}

/// Coerced update for one field
enum Update {
    Set(FieldValue),
    Clear,
}

impl Document {
    /// Value of `section.field`, if set
    #[must_use]
    pub fn get(&self, section: &str, field: &str) -> Option<&FieldValue> {
        self.sections.get(section)?.get(field)
    }

    /// Whether no field is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Merge a partial update, returning what changed
    ///
    /// For each known section in `partial`, known fields overwrite the stored
    /// value; fields absent from the update are untouched. Unknown sections,
    /// unknown fields and values of the wrong shape are dropped.
    pub fn merge(&mut self, partial: &Value) -> DocumentPatch {
        let mut patch = DocumentPatch::default();

        let Some(sections) = partial.as_object() else {
            tracing::debug!("document update is not an object, ignoring");
            return patch;
        };

        for (section_name, fields) in sections {
            let Some(schema) = section_schema(section_name) else {
                tracing::debug!(section = %section_name, "dropping unknown document section");
                continue;
            };
            let Some(fields) = fields.as_object() else {
                tracing::debug!(section = %section_name, "section update is not an object, ignoring");
                continue;
            };

            for (field_name, value) in fields {
                let Some((field, kind)) = schema.field(field_name) else {
                    tracing::debug!(
                        section = schema.name,
                        field = %field_name,
                        "dropping unknown document field"
                    );
                    continue;
                };
                let Some(update) = coerce(kind, value) else {
                    tracing::debug!(
                        section = schema.name,
                        field,
                        "dropping document value of the wrong shape"
                    );
                    continue;
                };

                if let Some(change) = self.apply(schema.name, field, update) {
                    patch.record(schema.name, field, change);
                }
            }
        }

        patch
    }

    /// Apply one update; returns the recorded change, or `None` if nothing changed
    fn apply(
        &mut self,
        section: &'static str,
        field: &'static str,
        update: Update,
    ) -> Option<Option<FieldValue>> {
        match update {
            Update::Set(value) => {
                let fields = self.sections.entry(section).or_default();
                if fields.get(field) == Some(&value) {
                    return None;
                }
                fields.insert(field, value.clone());
                Some(Some(value))
            }
            Update::Clear => {
                let fields = self.sections.get_mut(section)?;
                fields.remove(field)?;
                if fields.is_empty() {
                    self.sections.remove(section);
                }
                Some(None)
            }
        }
    }
}

/// Coerce a JSON value to the field's shape; `None` means the value is unusable
fn coerce(kind: FieldKind, value: &Value) -> Option<Update> {
    if value.is_null() {
        return Some(Update::Clear);
    }

    match kind {
        Scalar => scalar_text(value).map(|text| {
            if text.is_empty() {
                Update::Clear
            } else {
                Update::Set(FieldValue::Text(text))
            }
        }),
        List => {
            let items: Vec<String> = match value {
                Value::Array(entries) => entries
                    .iter()
                    .filter_map(scalar_text)
                    .filter(|s| !s.is_empty())
                    .take(MAX_LIST_ITEMS)
                    .collect(),
                other => vec![scalar_text(other)?]
                    .into_iter()
                    .filter(|s| !s.is_empty())
                    .collect(),
            };
            if items.is_empty() {
                Some(Update::Clear)
            } else {
                Some(Update::Set(FieldValue::List(items)))
            }
        }
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

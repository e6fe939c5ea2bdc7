//! Document updates carried inside assistant replies
//!
//! The backend can attach an update as a fenced block:
//!
//! ````text
//! Great, a young audience then!
//! ```document
//! {"audience": {"primary": "Students"}}
//! ```
//! ````
//!
//! The block is cut out of the reply before it is broadcast or spoken.

use serde_json::Value;

use super::document::section_schema;

/// Reply split into its spoken text and an optional document update
#[derive(Debug, Clone, PartialEq)]
pub struct InferredReply {
    pub text: String,
    pub update: Option<Value>,
}

/// Extract the first document block from `reply`
///
/// Blocks labelled `document` are always taken; blocks labelled `json` only
/// when they name at least one document section. Blocks that do not parse as
/// a JSON object stay in the text.
#[must_use]
pub fn extract_document_update(reply: &str) -> InferredReply {
    let mut search_from = 0;

    while let Some(rel) = reply[search_from..].find("```") {
        let open = search_from + rel;
        let label_start = open + 3;
        let label_end = reply[label_start..]
            .find('\n')
            .map_or(reply.len(), |i| label_start + i);
        let label = reply[label_start..label_end].trim();

        let body_start = (label_end + 1).min(reply.len());
        let Some(close_rel) = reply[body_start..].find("```") else {
            break;
        };
        let close = body_start + close_rel;
        let block_end = close + 3;

        if let Some(update) = parse_block(label, &reply[body_start..close]) {
            return InferredReply {
                text: join(&reply[..open], &reply[block_end..]),
                update: Some(update),
            };
        }

        search_from = block_end;
    }

    InferredReply {
        text: reply.trim().to_string(),
        update: None,
    }
}

fn parse_block(label: &str, body: &str) -> Option<Value> {
    let is_document = label.eq_ignore_ascii_case("document");
    if !is_document && !label.eq_ignore_ascii_case("json") {
        return None;
    }

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) if is_document || map.keys().any(|k| section_schema(k).is_some()) => {
            Some(Value::Object(map))
        }
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "reply carries an unparsable document block");
            None
        }
    }
}

fn join(before: &str, after: &str) -> String {
    let before = before.trim_end();
    let after = after.trim_start();
    match (before.is_empty(), after.is_empty()) {
        (true, _) => after.trim_end().to_string(),
        (false, true) => before.trim_start().to_string(),
        (false, false) => format!("{} {}", before.trim_start(), after.trim_end()),
    }
}

//! Decoding of the backend's newline-delimited event stream
//!
//! Each line is a frame: blank lines and `:` comments carry nothing, anything
//! else is a data frame whose payload is either a JSON object holding a text
//! fragment or, failing that, the fragment itself.

use serde_json::Value;

/// Keys probed for a fragment, in priority order
const FRAGMENT_KEYS: [&str; 4] = ["token", "content", "text", "delta"];

/// Prefix stripped from data frames
const DATA_PREFIX: &str = "data: ";

/// Reassembles lines from arbitrarily split byte chunks
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    /// Feed a chunk and return every line it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            lines.push(to_line(&line[..line.len() - 1]));
        }
        lines
    }

    /// Flush a trailing line that was not newline-terminated
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(to_line(&rest))
    }
}

fn to_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Extract the text fragment carried by one frame, if any
///
/// A payload that is not a JSON object is a malformed frame; it is recovered
/// by using the payload verbatim as the fragment.
#[must_use]
pub fn decode_frame(line: &str) -> Option<String> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    let payload = line.strip_prefix(DATA_PREFIX).unwrap_or(line);
    if payload.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(event)) => FRAGMENT_KEYS
            .iter()
            .find_map(|key| event.get(*key).and_then(fragment_text)),
        Ok(_) | Err(_) => {
            tracing::trace!(frame = %payload, "non-object frame, using raw payload");
            Some(payload.to_string())
        }
    }
}

/// Render a fragment value; empty and zero-like values carry no text
fn fragment_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Array(a) if a.is_empty() => None,
        Value::Object(o) if o.is_empty() => None,
        other => Some(other.to_string()),
    }
}

/// Accumulates one attempt's stream into reply text
#[derive(Debug, Default)]
pub struct ReplyAssembler {
    decoder: LineDecoder,
    text: String,
    fragments: usize,
}

impl ReplyAssembler {
    /// Feed a network chunk
    pub fn feed(&mut self, chunk: &[u8]) {
        for line in self.decoder.push(chunk) {
            self.accept(&line);
        }
    }

    /// Finish the stream, returning the text and the number of fragments
    #[must_use]
    pub fn finish(mut self) -> (String, usize) {
        if let Some(line) = self.decoder.finish() {
            self.accept(&line);
        }
        (self.text, self.fragments)
    }

    fn accept(&mut self, line: &str) {
        if let Some(fragment) = decode_frame(line) {
            self.text.push_str(&fragment);
            self.fragments += 1;
        }
    }
}

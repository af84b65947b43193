//! Server-sent event parsing for OpenAI-compatible chat-completion streams.
//!
//! The wire format is one `data: {json}` line per chunk, blank-line
//! separated, terminated by `data: [DONE]`. Each JSON chunk carries the next
//! piece of text at `choices[0].delta.content`.

use serde::Deserialize;
use tracing::warn;

use netarch_core::CompletionError;

/// What a single `data:` payload means for the text stream.
#[derive(Clone, Debug, PartialEq)]
pub enum ChunkEvent {
    /// Next piece of generated text.
    Text(String),
    /// End-of-stream marker.
    Done,
    /// The service reported a failure in-band.
    Failed(CompletionError),
    /// Role preambles, keep-alives, usage-only chunks.
    Skip,
}

/// Extract the payload of a `data:` line. Comments, other fields and blank
/// lines yield `None`.
pub fn extract_data(line: &str) -> Option<&str> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    (!data.trim().is_empty()).then_some(data)
}

/// Interpret one data payload.
pub fn parse_chunk(data: &str) -> ChunkEvent {
    let data = data.trim();
    if data == "[DONE]" {
        return ChunkEvent::Done;
    }

    let chunk: StreamChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!(error = %e, "failed to parse completion chunk, skipping");
            return ChunkEvent::Skip;
        }
    };

    if let Some(err) = chunk.error {
        let message = err.message.unwrap_or_else(|| "unknown error".into());
        return ChunkEvent::Failed(CompletionError::StreamInterrupted(message));
    }

    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content)
        .filter(|text| !text.is_empty())
        .map_or(ChunkEvent::Skip, ChunkEvent::Text)
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ChunkError>,
}

#[derive(Deserialize)]
struct Choice {
    delta: Option<Delta>,
}

#[derive(Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChunkError {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_data_variants() {
        assert_eq!(extract_data("data: {\"a\":1}"), Some("{\"a\":1}"));
        assert_eq!(extract_data("data:{\"a\":1}\r"), Some("{\"a\":1}"));
        assert_eq!(extract_data(": keep-alive"), None);
        assert_eq!(extract_data("event: message"), None);
        assert_eq!(extract_data(""), None);
        assert_eq!(extract_data("data: "), None);
    }

    #[test]
    fn text_delta() {
        let data = r#"{"id":"c1","choices":[{"index":0,"delta":{"content":"Check the "},"finish_reason":null}]}"#;
        assert_eq!(parse_chunk(data), ChunkEvent::Text("Check the ".into()));
    }

    #[test]
    fn leading_whitespace_in_text_is_kept() {
        let data = r#"{"choices":[{"delta":{"content":"  area 0"}}]}"#;
        assert_eq!(parse_chunk(data), ChunkEvent::Text("  area 0".into()));
    }

    #[test]
    fn role_preamble_and_finish_are_skipped() {
        let role = r#"{"choices":[{"delta":{"role":"assistant","content":""}}]}"#;
        let finish = r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        let usage = r#"{"choices":[],"usage":{"total_tokens":12}}"#;
        assert_eq!(parse_chunk(role), ChunkEvent::Skip);
        assert_eq!(parse_chunk(finish), ChunkEvent::Skip);
        assert_eq!(parse_chunk(usage), ChunkEvent::Skip);
    }

    #[test]
    fn done_marker() {
        assert_eq!(parse_chunk("[DONE]"), ChunkEvent::Done);
        assert_eq!(parse_chunk(" [DONE] "), ChunkEvent::Done);
    }

    #[test]
    fn in_band_error() {
        let data = r#"{"error":{"message":"model overloaded","type":"server_error"}}"#;
        assert!(matches!(
            parse_chunk(data),
            ChunkEvent::Failed(CompletionError::StreamInterrupted(msg)) if msg == "model overloaded"
        ));
    }

    #[test]
    fn garbage_is_skipped() {
        assert_eq!(parse_chunk("not json"), ChunkEvent::Skip);
    }
}

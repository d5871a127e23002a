//! Decoding of the upstream `text/event-stream` body.
//!
//! Network reads do not line up with frame boundaries, so bytes are
//! buffered until a full line is available. Lines are only decoded as
//! UTF-8 once complete, which keeps multi-byte characters split across
//! reads intact.

use super::text::strip_asterisks;
use serde::Deserialize;

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";

/// Reassembles complete lines from arbitrarily split chunks.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completed, without the
    /// trailing `\n` / `\r\n`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(decode_line(&line[..line.len() - 1]));
        }
        lines
    }

    /// Return whatever is left once the input is exhausted.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// What a single upstream line means for the relayed stream.
#[derive(Debug)]
pub enum FrameEvent {
    /// Cleaned text to forward.
    Delta(String),
    /// The upstream signalled the end of generation.
    Done,
    /// A `data:` payload that was not valid chunk JSON.
    Malformed(serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Interpret one line. Returns `None` for anything that produces no
/// output: blank keep-alives, `event:`/comment lines, and chunks without
/// text (role announcements, finish markers, text that was all asterisks).
pub fn parse_line(line: &str) -> Option<FrameEvent> {
    let payload = line.strip_prefix(DATA_PREFIX)?;

    if payload.trim() == DONE_SENTINEL {
        return Some(FrameEvent::Done);
    }

    let chunk: ChatCompletionChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => return Some(FrameEvent::Malformed(e)),
    };

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)?;

    let cleaned = strip_asterisks(&content);
    if cleaned.is_empty() {
        None
    } else {
        Some(FrameEvent::Delta(cleaned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(content: &str) -> String {
        serde_json::json!({ "choices": [{ "index": 0, "delta": { "content": content } }] })
            .to_string()
    }

    #[test]
    fn reassembles_lines_split_across_chunks() {
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(b"data: {\"cho").is_empty());
        let lines = decoder.push(b"ices\":[]}\r\ndata: [DONE]\n");
        assert_eq!(lines, vec!["data: {\"choices\":[]}", "data: [DONE]"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn keeps_multibyte_characters_split_across_chunks() {
        let mut decoder = LineDecoder::new();
        let bytes = "data: trésor\n".as_bytes();
        let split = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        assert!(decoder.push(&bytes[..split]).is_empty());
        assert_eq!(decoder.push(&bytes[split..]), vec!["data: trésor"]);
    }

    #[test]
    fn finish_returns_unterminated_tail() {
        let mut decoder = LineDecoder::new();
        decoder.push(b"data: [DONE]");
        assert_eq!(decoder.finish().as_deref(), Some("data: [DONE]"));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn delta_is_cleaned() {
        let line = format!("data: {}", frame("**Captain** Nebula"));
        match parse_line(&line) {
            Some(FrameEvent::Delta(text)) => assert_eq!(text, "Captain Nebula"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn done_sentinel_is_recognised() {
        assert!(matches!(parse_line("data: [DONE]"), Some(FrameEvent::Done)));
    }

    #[test]
    fn malformed_json_is_reported_not_fatal() {
        assert!(matches!(
            parse_line("data: {not json"),
            Some(FrameEvent::Malformed(_))
        ));
    }

    #[test]
    fn non_data_and_empty_lines_are_ignored() {
        assert!(parse_line("").is_none());
        assert!(parse_line(": keep-alive").is_none());
        assert!(parse_line("event: message").is_none());
        assert!(parse_line(&format!("data: {}", frame("**"))).is_none());
        assert!(parse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#).is_none());
    }
}

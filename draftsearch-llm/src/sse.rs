// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Decoding of `text/event-stream` chat-completion replies.
//!
//! Both OpenAI and Ollama's OpenAI-compatible endpoint answer a
//! `"stream": true` request with lines of the form
//! `data: {"choices":[{"delta":{"content":"..."}}]}`, terminated by
//! `data: [DONE]`. Network chunks do not respect line boundaries, so the
//! decoder buffers raw bytes until a full line is available.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// Payload of a `data:` line
    Data(String),
    /// The `[DONE]` terminator
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk, returning every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(frame) = parse_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&rest)
    }
}

fn parse_line(line: &[u8]) -> Option<SseFrame> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();

    if text.is_empty() || text.starts_with(':') {
        return None;
    }

    let payload = match text.strip_prefix("data:") {
        Some(rest) => rest.trim(),
        None if is_non_data_field(text) => return None,
        None => text,
    };

    match payload {
        "" => None,
        "[DONE]" => Some(SseFrame::Done),
        other => Some(SseFrame::Data(other.to_string())),
    }
}

fn is_non_data_field(text: &str) -> bool {
    ["event:", "id:", "retry:"]
        .iter()
        .any(|prefix| text.starts_with(prefix))
}

/// Extract `choices[0].delta.content` from one streamed chunk.
///
/// Returns `Ok(None)` for chunks that carry no text (role announcements,
/// finish markers).
pub fn delta_content(payload: &str) -> Result<Option<String>, serde_json::Error> {
    let chunk: Value = serde_json::from_str(payload)?;
    Ok(chunk["choices"][0]["delta"]["content"]
        .as_str()
        .map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_handles_split_lines() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\"").is_empty());
        let frames = decoder.push(b":1}\n\ndata: [DONE]\n\n");
        assert_eq!(
            frames,
            vec![SseFrame::Data("{\"a\":1}".to_string()), SseFrame::Done]
        );
    }

    #[test]
    fn test_decoder_skips_comments_and_fields() {
        let mut decoder = SseDecoder::new();
        let frames = decoder.push(b": keep-alive\nevent: message\nid: 7\ndata: x\n");
        assert_eq!(frames, vec![SseFrame::Data("x".to_string())]);
    }

    #[test]
    fn test_decoder_keeps_multibyte_chars_intact() {
        let text = "data: héllo\n".as_bytes();
        // Split inside the two-byte 'é'
        let split = text.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut decoder = SseDecoder::new();
        assert!(decoder.push(&text[..split]).is_empty());
        assert_eq!(
            decoder.push(&text[split..]),
            vec![SseFrame::Data("héllo".to_string())]
        );
    }

    #[test]
    fn test_decoder_finish_flushes_tail() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), Some(SseFrame::Done));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_delta_content() {
        let payload = r#"{"choices":[{"delta":{"content":"Hi"}}]}"#;
        assert_eq!(delta_content(payload).unwrap(), Some("Hi".to_string()));

        let role_only = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(delta_content(role_only).unwrap(), None);

        assert!(delta_content("not json").is_err());
    }
}

//! Wire framing for streamed chat responses.
//!
//! Network chunks are split into lines by [`LineBuffer`], and each line is
//! handed to a [`FrameDecoder`] chosen by the provider's [`WireProtocol`].
//! [`FrameFeeder`] ties the two together and is shared by every HTTP
//! transport.

use std::collections::VecDeque;

use memchr::memchr;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::{ChatResponse, OllamaChatResponse};
use crate::core::errors::StreamFault;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireProtocol {
    /// `data: {json}` lines terminated by `data: [DONE]`.
    Sse,
    /// One JSON object per line; the stream ends when the connection closes.
    Ndjson,
}

static SSE_DECODER: SseDecoder = SseDecoder;
static NDJSON_DECODER: NdjsonDecoder = NdjsonDecoder;

impl WireProtocol {
    pub fn decoder(self) -> &'static dyn FrameDecoder {
        match self {
            WireProtocol::Sse => &SSE_DECODER,
            WireProtocol::Ndjson => &NDJSON_DECODER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// The frame could not be parsed. Skipped by the caller.
    Malformed(String),
    /// The provider sent an error object instead of a delta.
    Provider(String),
}

/// Turns one raw line of a response body into a text delta.
pub trait FrameDecoder: Send + Sync {
    /// Decode one line (without its newline). `Ok(None)` means the line
    /// carries no text: keep-alives, metadata, role-only deltas.
    fn decode_frame(&self, raw: &[u8]) -> Result<Option<String>, FrameError>;

    /// Whether this line signals the end of the stream.
    fn is_terminal(&self, raw_line: &str) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SseDecoder;

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

impl FrameDecoder for SseDecoder {
    fn decode_frame(&self, raw: &[u8]) -> Result<Option<String>, FrameError> {
        let line = std::str::from_utf8(raw)
            .map_err(|err| FrameError::Malformed(format!("invalid UTF-8 in stream: {err}")))?
            .trim();

        // Blank lines separate events; `:` lines are comments; `event:`,
        // `id:` and `retry:` carry no text.
        let Some(payload) = extract_data_payload(line) else {
            return Ok(None);
        };
        let payload = payload.trim_end();
        if payload.is_empty() || payload == "[DONE]" {
            return Ok(None);
        }

        match serde_json::from_str::<ChatResponse>(payload) {
            Ok(response) => Ok(response
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta.content)),
            Err(parse_err) => match serde_json::from_str::<serde_json::Value>(payload) {
                Ok(value) if value.get("error").is_some() => Err(FrameError::Provider(
                    extract_error_summary(&value).unwrap_or_else(|| payload.to_string()),
                )),
                _ => Err(FrameError::Malformed(parse_err.to_string())),
            },
        }
    }

    fn is_terminal(&self, raw_line: &str) -> bool {
        extract_data_payload(raw_line.trim()).is_some_and(|payload| payload.trim() == "[DONE]")
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NdjsonDecoder;

impl FrameDecoder for NdjsonDecoder {
    fn decode_frame(&self, raw: &[u8]) -> Result<Option<String>, FrameError> {
        let line = std::str::from_utf8(raw)
            .map_err(|err| FrameError::Malformed(format!("invalid UTF-8 in stream: {err}")))?
            .trim();
        if line.is_empty() {
            return Ok(None);
        }

        let response: OllamaChatResponse =
            serde_json::from_str(line).map_err(|err| FrameError::Malformed(err.to_string()))?;
        if let Some(error) = response.error {
            return Err(FrameError::Provider(error));
        }

        Ok(response
            .message
            .map(|message| message.content)
            .filter(|content| !content.is_empty()))
    }

    fn is_terminal(&self, _raw_line: &str) -> bool {
        false
    }
}

/// Reassembles newline-terminated lines across network chunk boundaries.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete line, without the trailing `\n` or `\r\n`.
    pub fn next_line(&mut self) -> Option<Vec<u8>> {
        let newline_pos = memchr(b'\n', &self.buffer)?;
        let mut line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }

    /// Whatever is left once the stream closed, if it is more than
    /// whitespace.
    pub fn take_remainder(&mut self) -> Option<Vec<u8>> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.iter().all(u8::is_ascii_whitespace) {
            None
        } else {
            Some(rest)
        }
    }
}

/// Drives a [`FrameDecoder`] over raw body chunks and collects the decoded
/// deltas, in order.
pub struct FrameFeeder {
    decoder: &'static dyn FrameDecoder,
    lines: LineBuffer,
    finished: bool,
    skipped_frames: usize,
}

impl FrameFeeder {
    pub fn new(protocol: WireProtocol) -> Self {
        Self {
            decoder: protocol.decoder(),
            lines: LineBuffer::new(),
            finished: false,
            skipped_frames: 0,
        }
    }

    /// True once a terminal line or a provider error was seen. Later input
    /// is ignored.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn skipped_frames(&self) -> usize {
        self.skipped_frames
    }

    pub fn push(&mut self, chunk: &[u8], out: &mut VecDeque<Result<String, StreamFault>>) {
        if self.finished {
            return;
        }
        self.lines.extend(chunk);
        while let Some(line) = self.lines.next_line() {
            self.feed_line(&line, out);
            if self.finished {
                break;
            }
        }
    }

    /// Flush a final unterminated line once the body closed.
    pub fn finish(&mut self, out: &mut VecDeque<Result<String, StreamFault>>) {
        if self.finished {
            return;
        }
        if let Some(rest) = self.lines.take_remainder() {
            self.feed_line(&rest, out);
        }
        self.finished = true;
    }

    fn feed_line(&mut self, line: &[u8], out: &mut VecDeque<Result<String, StreamFault>>) {
        if self.decoder.is_terminal(&String::from_utf8_lossy(line)) {
            debug!("Stream terminator received");
            self.finished = true;
            return;
        }

        match self.decoder.decode_frame(line) {
            Ok(Some(delta)) => out.push_back(Ok(delta)),
            Ok(None) => {}
            Err(FrameError::Malformed(reason)) => {
                self.skipped_frames += 1;
                warn!(
                    frame = %String::from_utf8_lossy(line),
                    %reason,
                    "Skipping malformed stream frame"
                );
            }
            Err(FrameError::Provider(message)) => {
                warn!(%message, "Provider reported an error mid-stream");
                out.push_back(Err(StreamFault::Provider(message)));
                self.finished = true;
            }
        }
    }
}

pub(crate) fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                serde_json::Value::Object(map) => map
                    .get("message")
                    .and_then(|message| message.as_str().map(str::to_owned)),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| {
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        collapsed.trim().to_string()
    })
}

/// One-line description of a raw error body for the logs.
pub(crate) fn summarize_error_body(error_text: &str) -> String {
    let trimmed = error_text.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&json_value) {
            if !summary.is_empty() {
                return summary;
            }
        }
        return json_value.to_string();
    }

    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

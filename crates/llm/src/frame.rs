//! Pull-based decoding of streamed provider responses.
//!
//! Providers stream line-oriented frames (NDJSON for Ollama, SSE `data:` lines
//! for OpenAI-compatible APIs). Network reads do not line up with frame
//! boundaries, so bytes are buffered until a full line is available and only
//! then handed to the provider's frame parser.

use crate::client::{LlmStream, LlmStreamChunk};
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use taxguide_core::{AppError, AppResult};

/// Unparsable fragments longer than this are logged; shorter ones are
/// keep-alives or split noise and are dropped silently.
pub const OVERSIZED_FRAGMENT_BYTES: usize = 1024;

/// Outcome of parsing one complete line.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A decoded delta (possibly the final one)
    Chunk(LlmStreamChunk),
    /// A well-formed frame with nothing to emit (role headers, comments)
    Ignore,
    /// End-of-stream sentinel
    Done,
}

/// Accumulates raw bytes and yields complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes from one network read and drain every complete line.
    ///
    /// Lines are split on `\n`; a trailing `\r` is stripped. Bytes after the
    /// last newline stay buffered for the next read.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Take whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    /// Bytes currently waiting for a newline.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

struct DecodeState<S, F> {
    body: Pin<Box<S>>,
    lines: LineBuffer,
    pending: VecDeque<LlmStreamChunk>,
    parse: F,
    finished: bool,
}

impl<S, F> DecodeState<S, F>
where
    F: FnMut(&str) -> AppResult<Frame>,
{
    fn handle_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() || self.finished {
            return;
        }

        match (self.parse)(line) {
            Ok(Frame::Chunk(chunk)) => {
                let done = chunk.done;
                self.pending.push_back(chunk);
                if done {
                    self.finished = true;
                }
            }
            Ok(Frame::Ignore) => {}
            Ok(Frame::Done) => self.finished = true,
            Err(e) => {
                if line.len() > OVERSIZED_FRAGMENT_BYTES {
                    tracing::warn!(
                        "Skipping unparsable {}-byte stream fragment: {}",
                        line.len(),
                        e
                    );
                }
            }
        }
    }
}

/// Turn a raw byte stream into a stream of decoded chunks.
///
/// `parse` is called once per complete, non-empty line. Lines it cannot parse
/// are skipped. The returned stream ends after a `Done` frame, a chunk marked
/// `done`, or the end of the body; a transport error is yielded once and then
/// the stream ends. Dropping the returned stream drops the body.
pub fn decode_stream<S, B, E, F>(body: S, parse: F) -> LlmStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
    F: FnMut(&str) -> AppResult<Frame> + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        lines: LineBuffer::new(),
        pending: VecDeque::new(),
        parse,
        finished: false,
    };

    let stream = futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.pending.pop_front() {
                return Some((Ok(chunk), state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    for line in state.lines.push(bytes.as_ref()) {
                        state.handle_line(&line);
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    let err = AppError::Llm(format!("Stream error: {}", e));
                    return Some((Err(err), state));
                }
                None => {
                    if let Some(rest) = state.lines.finish() {
                        state.handle_line(&rest);
                    }
                    state.finished = true;
                }
            }
        }
    });

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_plain(line: &str) -> AppResult<Frame> {
        match line {
            "END" => Ok(Frame::Done),
            "#" => Ok(Frame::Ignore),
            l if l.starts_with('{') => {
                let value: serde_json::Value = serde_json::from_str(l)?;
                let text = value["t"].as_str().unwrap_or_default().to_string();
                Ok(Frame::Chunk(LlmStreamChunk::delta(text)))
            }
            _ => Err(AppError::Llm("bad frame".to_string())),
        }
    }

    fn body(parts: Vec<&'static str>) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> {
        futures::stream::iter(parts.into_iter().map(|p| Ok(p.as_bytes().to_vec())))
    }

    async fn collect(stream: LlmStream) -> Vec<AppResult<LlmStreamChunk>> {
        stream.collect().await
    }

    #[test]
    fn test_line_buffer_holds_partial_lines() {
        let mut lines = LineBuffer::new();
        assert!(lines.push(b"{\"t\":\"he").is_empty());
        assert_eq!(lines.pending_len(), 8);

        let out = lines.push(b"llo\"}\r\n{\"t\"");
        assert_eq!(out, vec!["{\"t\":\"hello\"}".to_string()]);
        assert_eq!(lines.finish(), Some("{\"t\"".to_string()));
        assert_eq!(lines.finish(), None);
    }

    #[tokio::test]
    async fn test_frames_split_across_reads() {
        let stream = decode_stream(
            body(vec!["{\"t\":\"Fi", "le by\"}\n{\"t\":", "\" April 30\"}\n"]),
            parse_plain,
        );

        let chunks: Vec<String> = collect(stream)
            .await
            .into_iter()
            .map(|c| c.unwrap().content)
            .collect();
        assert_eq!(chunks, vec!["File by", " April 30"]);
    }

    #[tokio::test]
    async fn test_unparsable_frames_are_skipped() {
        let stream = decode_stream(
            body(vec!["garbage\n#\n{\"t\":\"ok\"}\n{broken json\n"]),
            parse_plain,
        );

        let chunks = collect(stream).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().content, "ok");
    }

    #[tokio::test]
    async fn test_done_sentinel_stops_reading() {
        let stream = decode_stream(
            body(vec!["{\"t\":\"a\"}\nEND\n{\"t\":\"never\"}\n"]),
            parse_plain,
        );

        let chunks = collect(stream).await;
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_trailing_frame_without_newline_is_decoded() {
        let stream = decode_stream(body(vec!["{\"t\":\"tail\"}"]), parse_plain);

        let chunks = collect(stream).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref().unwrap().content, "tail");
    }

    #[tokio::test]
    async fn test_transport_error_ends_stream() {
        let parts: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(b"{\"t\":\"partial\"}\n".to_vec()),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            )),
            Ok(b"{\"t\":\"unreachable\"}\n".to_vec()),
        ];
        let stream = decode_stream(futures::stream::iter(parts), parse_plain);

        let chunks = collect(stream).await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].is_ok());
        assert!(matches!(chunks[1], Err(AppError::Llm(_))));
    }
}

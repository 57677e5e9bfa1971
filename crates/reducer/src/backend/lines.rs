//! Line framing for streamed HTTP bodies.
//!
//! Both backends stream text over a chunked body: Ollama sends one JSON
//! object per line, OpenAI-compatible servers send Server-Sent Events. Body
//! chunks do not respect line boundaries, so bytes are buffered and split on
//! `\n` before any parsing happens.

use crate::error::GenerationError;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

/// Split a byte stream into non-empty lines (without `\r\n`).
///
/// A trailing line without a newline is yielded when the body ends. The
/// first read error is yielded and ends the stream.
pub fn byte_lines<S, E>(byte_stream: S) -> impl Stream<Item = Result<String, GenerationError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<GenerationError> + Send + 'static,
{
    futures::stream::unfold(
        (Box::pin(byte_stream), BytesMut::with_capacity(8192), false),
        |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line = buffer.split_to(newline_pos + 1);
                    line.truncate(line.len() - 1);
                    if line.last() == Some(&b'\r') {
                        line.truncate(line.len() - 1);
                    }
                    match decode(&line) {
                        Ok(text) if text.trim().is_empty() => continue,
                        Ok(text) => return Some((Ok(text), (stream, buffer, false))),
                        Err(e) => return Some((Err(e), (stream, buffer, true))),
                    }
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        let err: GenerationError = e.into();
                        log::warn!("Stream read error: {err}");
                        return Some((Err(err), (stream, buffer, true)));
                    }
                    None => {
                        if buffer.iter().all(u8::is_ascii_whitespace) {
                            return None;
                        }
                        let tail = decode(&buffer).map(|text| text.trim().to_string());
                        buffer.clear();
                        return Some((tail, (stream, buffer, true)));
                    }
                }
            }
        },
    )
}

fn decode(bytes: &[u8]) -> Result<String, GenerationError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| GenerationError::Stream(format!("invalid UTF-8 in stream: {e}")))
}

/// Payload of an SSE `data:` line; `None` for comments, other fields and
/// the `[DONE]` marker.
#[must_use]
pub fn sse_data(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.starts_with(':') {
        return None;
    }

    let data = trimmed
        .strip_prefix("data: ")
        .or_else(|| trimmed.strip_prefix("data:"))?
        .trim();

    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data)
}

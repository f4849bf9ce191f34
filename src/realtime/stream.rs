use futures::{Stream, StreamExt};
use std::pin::Pin;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream request failed: {0}")]
    Request(#[from] reqwest::Error),
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<bytes::Bytes>> + Send>>;

/// Server-sent-events reader over a reqwest byte stream.
///
/// Owns the connection and hands raw `data:` payloads to the caller; it never
/// interprets them. Reconnection is the caller's concern.
pub struct EventStream {
    inner: ByteStream,
    buffer: String,
    ended: bool,
}

impl EventStream {
    pub async fn connect(client: &reqwest::Client, url: &str) -> Result<Self, StreamError> {
        let response = client.get(url).send().await?.error_for_status()?;
        Ok(Self {
            inner: Box::pin(response.bytes_stream()),
            buffer: String::new(),
            ended: false,
        })
    }

    /// The next event payload, or `None` once the stream is exhausted.
    pub async fn next_event(&mut self) -> Option<String> {
        loop {
            while let Some(frame) = drain_frame(&mut self.buffer) {
                if let Some(data) = parse_frame(&frame) {
                    return Some(data);
                }
            }

            if self.ended {
                return None;
            }

            match self.inner.next().await {
                Some(Ok(chunk)) => {
                    self.buffer.push_str(&String::from_utf8_lossy(&chunk));
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "stream read failed, treating as disconnect");
                    self.ended = true;
                    self.promote_trailing_frame();
                }
                None => {
                    self.ended = true;
                    self.promote_trailing_frame();
                }
            }
        }
    }

    // A final frame may arrive without its blank-line terminator.
    fn promote_trailing_frame(&mut self) {
        if !self.buffer.is_empty() && !self.buffer.ends_with("\n\n") {
            self.buffer.push_str("\n\n");
        }
    }
}

/// Remove and return the first complete frame (terminated by a blank line).
fn drain_frame(buffer: &mut String) -> Option<String> {
    let end = buffer.find("\n\n")?;
    let frame: String = buffer.drain(..end + 2).collect();
    Some(frame)
}

/// Extract the payload from one SSE frame: the `data:` lines joined with
/// newlines. Comment and keepalive frames yield `None`.
fn parse_frame(frame: &str) -> Option<String> {
    let mut data_lines = Vec::new();
    for line in frame.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_one_frame_at_a_time() {
        let mut buffer = "data: one\n\ndata: two\n\npartial".to_string();
        assert_eq!(drain_frame(&mut buffer).as_deref(), Some("data: one\n\n"));
        assert_eq!(drain_frame(&mut buffer).as_deref(), Some("data: two\n\n"));
        assert_eq!(drain_frame(&mut buffer), None);
        assert_eq!(buffer, "partial");
    }

    #[test]
    fn parses_data_payload() {
        assert_eq!(
            parse_frame("data: {\"data\":[]}\n\n").as_deref(),
            Some("{\"data\":[]}")
        );
    }

    #[test]
    fn ignores_comment_and_keepalive_frames() {
        assert_eq!(parse_frame(": keepalive\n\n"), None);
        assert_eq!(parse_frame("event: ping\n\n"), None);
    }

    #[test]
    fn joins_multiline_data() {
        assert_eq!(
            parse_frame("data: abc\ndata: def\n\n").as_deref(),
            Some("abc\ndef")
        );
    }
}

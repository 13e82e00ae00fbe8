//! Newline-delimited JSON framing for streaming responses.
//!
//! This module turns the raw byte stream of an HTTP response into a stream of lines.  It does no
//! JSON parsing; that is left to [`crate::StreamRecord::parse`] so that noise lines can be
//! skipped by the consumer.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::Result;
use crate::observability::{STREAM_BYTES, STREAM_SKIPPED_LINES};

/// Split a stream of byte chunks into non-blank text lines.
///
/// Lines may be split across chunks arbitrarily, including in the middle of a multi-byte
/// character.  Trailing `\r` is removed, blank lines are dropped, and lines that are not valid
/// UTF-8 are dropped.  A final line without a terminating newline is still yielded.  An error
/// from the underlying stream is passed through and ends the line stream.
pub fn process_ndjson<S>(byte_stream: S) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    let state = LineState {
        stream: byte_stream,
        buffer: Vec::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            // First check if we have a complete line in the buffer
            if let Some(line) = state.next_line() {
                if let Some(line) = decode_line(line) {
                    return Some((Ok(line), state));
                }
                continue;
            }

            if state.finished {
                return None;
            }

            // Read more data
            match state.stream.next().await {
                Some(Ok(bytes)) => {
                    STREAM_BYTES.count(bytes.len() as u64);
                    state.buffer.extend_from_slice(&bytes);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    state.buffer.clear();
                    return Some((Err(e), state));
                }
                None => {
                    state.finished = true;
                }
            }
        }
    })
}

struct LineState<S> {
    stream: S,
    buffer: Vec<u8>,
    finished: bool,
}

impl<S> LineState<S> {
    fn next_line(&mut self) -> Option<Vec<u8>> {
        if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            Some(line)
        } else if self.finished && !self.buffer.is_empty() {
            Some(std::mem::take(&mut self.buffer))
        } else {
            None
        }
    }
}

fn decode_line(mut line: Vec<u8>) -> Option<String> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    match String::from_utf8(line) {
        Ok(text) if text.trim().is_empty() => None,
        Ok(text) => Some(text),
        Err(err) => {
            STREAM_SKIPPED_LINES.click();
            tracing::debug!(error = %err, "skipping line that is not UTF-8");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    async fn collect(chunks: Vec<Result<Bytes>>) -> Vec<Result<String>> {
        let stream = stream::iter(chunks);
        process_ndjson(stream).collect().await
    }

    fn ok_lines(results: Vec<Result<String>>) -> Vec<String> {
        results.into_iter().map(|line| line.unwrap()).collect()
    }

    #[tokio::test]
    async fn splits_lines() {
        let lines = collect(vec![Ok(Bytes::from_static(b"{\"a\":1}\n{\"b\":2}\n"))]).await;
        assert_eq!(ok_lines(lines), vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[tokio::test]
    async fn handles_split_lines() {
        let lines = collect(vec![
            Ok(Bytes::from_static(b"{\"response\":")),
            Ok(Bytes::from_static(b"\"hi\"}\n{\"do")),
            Ok(Bytes::from_static(b"ne\":true}\n")),
        ])
        .await;
        assert_eq!(
            ok_lines(lines),
            vec!["{\"response\":\"hi\"}", "{\"done\":true}"]
        );
    }

    #[tokio::test]
    async fn handles_split_multibyte_character() {
        let text = "{\"response\":\"é\"}\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let lines = collect(vec![
            Ok(Bytes::copy_from_slice(&text[..split])),
            Ok(Bytes::copy_from_slice(&text[split..])),
        ])
        .await;
        assert_eq!(ok_lines(lines), vec!["{\"response\":\"é\"}"]);
    }

    #[tokio::test]
    async fn skips_blank_lines_and_strips_carriage_returns() {
        let lines = collect(vec![Ok(Bytes::from_static(b"\n\r\n  \none\r\n\ntwo\n"))]).await;
        assert_eq!(ok_lines(lines), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn yields_unterminated_final_line() {
        let lines = collect(vec![Ok(Bytes::from_static(b"one\ntwo"))]).await;
        assert_eq!(ok_lines(lines), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn skips_invalid_utf8_lines() {
        let lines = collect(vec![Ok(Bytes::from_static(b"\xff\xfe\nok\n"))]).await;
        assert_eq!(ok_lines(lines), vec!["ok"]);
    }

    #[tokio::test]
    async fn passes_through_errors_and_stops() {
        let lines = collect(vec![
            Ok(Bytes::from_static(b"one\ntw")),
            Err(Error::streaming("connection reset", None)),
            Ok(Bytes::from_static(b"o\n")),
        ])
        .await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].as_ref().unwrap(), "one");
        assert!(lines[1].is_err());
    }

    #[tokio::test]
    async fn empty_stream() {
        assert!(collect(Vec::new()).await.is_empty());
    }
}

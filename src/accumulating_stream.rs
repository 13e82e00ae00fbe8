//! Accumulates streamed records into a complete reply while passing fragments through.

use std::time::Instant;

use futures::{Stream, StreamExt};

use crate::observability::{
    STREAM_ERRORS, STREAM_FRAGMENTS, STREAM_LINES, STREAM_SKIPPED_LINES, STREAM_TTFF,
};
use crate::{Error, Renderer, Result, StreamRecord};

/// Builds the assistant's reply from the lines of a response stream.
///
/// Each line is parsed as a [`StreamRecord`]; noise lines are counted and skipped.  Every
/// non-empty fragment is handed to the renderer as soon as it is accepted and appended to the
/// reply.
#[derive(Debug, Default)]
pub struct Accumulator {
    text: String,
    fragments: usize,
    skipped: usize,
    done: bool,
}

impl Accumulator {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts one line of the stream.
    ///
    /// Returns true once a record carrying the `done` marker has been seen; later lines must not
    /// be fed in.
    pub fn push_line(&mut self, line: &str, renderer: &mut dyn Renderer) -> bool {
        STREAM_LINES.click();
        let Some(record) = StreamRecord::parse(line) else {
            STREAM_SKIPPED_LINES.click();
            self.skipped += 1;
            tracing::debug!(line, "skipping unparseable stream line");
            return false;
        };
        if let Some(fragment) = record.fragment() {
            STREAM_FRAGMENTS.click();
            renderer.print_text(fragment);
            self.text.push_str(fragment);
            self.fragments += 1;
        }
        self.done = record.done;
        self.done
    }

    /// The reply accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Number of fragments emitted.
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// Number of lines skipped because they did not parse.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// True if the stream ended with a `done` marker.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Consumes the accumulator, returning the reply.
    pub fn into_text(self) -> String {
        self.text
    }
}

/// Drains `lines` into a complete reply, emitting fragments to `renderer` as they arrive.
///
/// Reading stops at end of stream or at the first record with a truthy `done` marker.  A
/// stream that carries no fragments yields the empty string.  A transport error or timeout
/// mid-stream is returned as-is; fragments already emitted stay emitted.  If the renderer's
/// [`Interrupt`](crate::Interrupt) is raised, the reply is abandoned with [`Error::Abort`],
/// even while waiting on a stream that has stopped sending.
pub async fn consume_stream<S>(lines: S, renderer: &mut dyn Renderer) -> Result<String>
where
    S: Stream<Item = Result<String>>,
{
    futures::pin_mut!(lines);
    let interrupt = renderer.interrupt();
    let start = Instant::now();
    let mut accumulator = Accumulator::new();
    loop {
        let next = match &interrupt {
            Some(interrupt) => {
                tokio::select! {
                    biased;
                    () = interrupt.triggered() => None,
                    line = lines.next() => Some(line),
                }
            }
            None => Some(lines.next().await),
        };
        let Some(line) = next else {
            renderer.print_interrupted();
            return Err(Error::abort("interrupted while streaming"));
        };
        let Some(line) = line else {
            break;
        };
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                STREAM_ERRORS.click();
                return Err(err);
            }
        };
        let had_fragments = accumulator.fragments() > 0;
        let done = accumulator.push_line(&line, renderer);
        if !had_fragments && accumulator.fragments() > 0 {
            STREAM_TTFF.add(start.elapsed().as_secs_f64());
        }
        if done {
            break;
        }
    }
    tracing::debug!(
        fragments = accumulator.fragments(),
        skipped = accumulator.skipped(),
        done = accumulator.is_done(),
        "stream finished"
    );
    Ok(accumulator.into_text())
}

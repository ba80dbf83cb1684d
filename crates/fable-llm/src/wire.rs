use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;

use fable_core::errors::BackendError;
use fable_core::stream::StreamEvent;

/// Protocol-specific line decoder. Both backends stream newline-delimited
/// frames; only the per-line grammar differs (NDJSON vs SSE `data:` lines).
pub(crate) trait LineParser: Send {
    fn parse_line(&mut self, line: &str) -> Vec<StreamEvent>;

    /// Called when the transport closes. A parser that has not seen its
    /// terminal frame reports the interruption here.
    fn end_of_stream(&mut self) -> Vec<StreamEvent>;
}

/// Wraps a byte stream from reqwest and yields StreamEvents, splitting on
/// newlines and delegating each complete line to the parser. Includes an idle
/// timeout — if no bytes arrive within `idle_duration`, emits an error and
/// ends the stream.
pub(crate) struct LineStream {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, BackendError>> + Send>>,
    parser: Box<dyn LineParser>,
    buffer: String,
    pending: Vec<StreamEvent>,
    finished: bool,
    idle_deadline: Pin<Box<tokio::time::Sleep>>,
    idle_duration: Duration,
}

impl LineStream {
    pub(crate) fn new(
        byte_stream: impl Stream<Item = Result<Bytes, BackendError>> + Send + 'static,
        parser: impl LineParser + 'static,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            parser: Box::new(parser),
            buffer: String::new(),
            // The HTTP response already succeeded by the time we get here.
            pending: vec![StreamEvent::Start],
            finished: false,
            idle_deadline: Box::pin(tokio::time::sleep(idle_timeout)),
            idle_duration: idle_timeout,
        }
    }

    fn pop_pending(&mut self) -> Option<StreamEvent> {
        if self.pending.is_empty() {
            return None;
        }
        let event = self.pending.remove(0);
        if event.is_terminal() {
            self.finished = true;
            self.pending.clear();
        }
        Some(event)
    }

    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.find('\n') {
            let line = self.buffer[..pos].trim_end_matches('\r').to_string();
            self.buffer.drain(..=pos);
            if !line.trim().is_empty() {
                let events = self.parser.parse_line(&line);
                self.pending.extend(events);
            }
        }
    }
}

impl Stream for LineStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if let Some(event) = self.pop_pending() {
            return Poll::Ready(Some(event));
        }
        if self.finished {
            return Poll::Ready(None);
        }

        loop {
            match self.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let new_deadline = tokio::time::Instant::now() + self.idle_duration;
                    self.idle_deadline.as_mut().reset(new_deadline);

                    let text = String::from_utf8_lossy(&bytes).into_owned();
                    self.buffer.push_str(&text);
                    self.drain_lines();

                    if let Some(event) = self.pop_pending() {
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(Some(Err(error))) => {
                    self.pending.push(StreamEvent::Error { error });
                    if let Some(event) = self.pop_pending() {
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(None) => {
                    // Flush a trailing line without a newline, then let the
                    // parser report whether it saw its terminal frame.
                    if !self.buffer.trim().is_empty() {
                        let line = std::mem::take(&mut self.buffer);
                        let events = self.parser.parse_line(line.trim_end_matches('\r'));
                        self.pending.extend(events);
                    }
                    let tail = self.parser.end_of_stream();
                    self.pending.extend(tail);
                    return match self.pop_pending() {
                        Some(event) => Poll::Ready(Some(event)),
                        None => {
                            self.finished = true;
                            Poll::Ready(None)
                        }
                    };
                }
                Poll::Pending => {
                    if self.idle_deadline.as_mut().poll(cx).is_ready() {
                        let timeout = self.idle_duration;
                        self.pending.push(StreamEvent::Error {
                            error: BackendError::Timeout(timeout),
                        });
                        return Poll::Ready(self.pop_pending());
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}

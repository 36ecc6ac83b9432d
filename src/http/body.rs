//! Bridges between HTTP bodies and content streams.
//!
//! ```text
//! Body ──pump task──▶ BodySource ──▶ ContentStream ──▶ BodyConsumer ──▶ Body
//!          ▲  one chunk per on_pull                      one pull per poll
//! ```
//! The pump only reads from the network when the consumer asks for a frame,
//! so a slow reader holds back the socket instead of growing a buffer.

use axum::body::Body;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::stream::{
    CallbackResult, ContentStream, ContentStreamConsumer, ContentStreamSource, Reader,
    StreamError, Writer,
};

/// Feed `body` into a new stream. The body is read lazily, on demand.
pub fn source_from_body(body: Body, capacity: usize) -> ContentStream {
    let stream = ContentStream::with_capacity(capacity);
    stream.source(BodySource {
        body: Some(body),
        pulls: None,
    });
    stream
}

/// Expose the consumer side of `stream` as a body.
///
/// Dropping the body before it is exhausted releases the stream.
pub fn body_from_stream(stream: ContentStream) -> Body {
    let (tx, rx) = mpsc::unbounded_channel();
    stream.consume(BodyConsumer { events: tx });

    let state = BodyReader {
        events: rx,
        reader: None,
    };
    Body::from_stream(futures_util::stream::unfold(state, |mut state| async move {
        let item = state.next_chunk().await?;
        Some((item, state))
    }))
}

struct BodySource {
    body: Option<Body>,
    pulls: Option<mpsc::UnboundedSender<()>>,
}

impl ContentStreamSource for BodySource {
    fn on_attached(&mut self, writer: Writer) -> CallbackResult {
        let Some(body) = self.body.take() else {
            return Ok(());
        };
        if writer.is_inert() {
            return Ok(());
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.pulls = Some(tx);
        tokio::spawn(pump(body, writer, rx));
        Ok(())
    }

    fn on_pull(&mut self) -> CallbackResult {
        if let Some(pulls) = &self.pulls {
            pulls.send(())?;
        }
        Ok(())
    }

    fn on_close(&mut self, error: Option<StreamError>) -> CallbackResult {
        if let Some(e) = error {
            tracing::debug!(error = %e, "Body source closed");
        }
        // Dropping the sender stops the pump and with it the body.
        self.pulls = None;
        Ok(())
    }
}

async fn pump(body: Body, writer: Writer, mut pulls: mpsc::UnboundedReceiver<()>) {
    let mut data = body.into_data_stream();
    while pulls.recv().await.is_some() {
        loop {
            match data.next().await {
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => {
                    if let Err(e) = writer.write(chunk) {
                        tracing::debug!(error = %e, "Body chunk refused");
                        writer.end(Some(e.into()));
                        return;
                    }
                    break;
                }
                Some(Err(e)) => {
                    writer.end(Some(e.into()));
                    return;
                }
                None => {
                    writer.end(None);
                    return;
                }
            }
        }
    }
}

enum Event {
    Attached(Reader),
    Chunk(Bytes),
    Closed(Option<StreamError>),
}

struct BodyConsumer {
    events: mpsc::UnboundedSender<Event>,
}

impl ContentStreamConsumer for BodyConsumer {
    fn on_attached(&mut self, reader: Reader) -> CallbackResult {
        self.events.send(Event::Attached(reader))?;
        Ok(())
    }

    fn on_read(&mut self, chunk: Bytes) -> CallbackResult {
        self.events.send(Event::Chunk(chunk))?;
        Ok(())
    }

    fn on_close(&mut self, error: Option<StreamError>) -> CallbackResult {
        // The body may already be gone; nothing left to tell.
        let _ = self.events.send(Event::Closed(error));
        Ok(())
    }
}

struct BodyReader {
    events: mpsc::UnboundedReceiver<Event>,
    reader: Option<Reader>,
}

impl BodyReader {
    /// `None` once the stream has closed; a terminal error is yielded once first.
    async fn next_chunk(&mut self) -> Option<Result<Bytes, StreamError>> {
        if self.reader.is_none() {
            match self.events.recv().await? {
                Event::Attached(reader) => self.reader = Some(reader),
                Event::Closed(error) => return error.map(Err),
                Event::Chunk(chunk) => return Some(Ok(chunk)),
            }
        }
        if let Some(reader) = &self.reader {
            reader.pull();
        }
        match self.events.recv().await? {
            Event::Chunk(chunk) => Some(Ok(chunk)),
            Event::Closed(error) => {
                self.reader = None;
                error.map(Err)
            }
            Event::Attached(_) => None,
        }
    }
}

impl Drop for BodyReader {
    fn drop(&mut self) {
        if let Some(reader) = &self.reader {
            reader.release();
        }
    }
}

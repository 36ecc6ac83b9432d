//! Boundary contracts for the two parties attached to a content stream.
//!
//! Callbacks run on the stream's owning task and return a result instead of
//! panicking: an `Err` is caught at the boundary and force-closes the stream
//! with the error as cause.

use bytes::Bytes;

use crate::stream::engine::{Reader, Writer};
use crate::stream::error::{BoxError, StreamError};

/// Result of a stream callback.
pub type CallbackResult = Result<(), BoxError>;

/// Read side of a content stream.
pub trait ContentStreamConsumer: Send + 'static {
    /// Called once with the handle used to request frames.
    ///
    /// A consumer that lost the attachment race receives an inert reader,
    /// immediately followed by `on_close(Some(StreamError::Busy(_)))`.
    fn on_attached(&mut self, reader: Reader) -> CallbackResult;

    /// One chunk, delivered in response to one `Reader::pull`.
    fn on_read(&mut self, chunk: Bytes) -> CallbackResult;

    /// Terminal notification; `None` means a clean end of stream.
    fn on_close(&mut self, error: Option<StreamError>) -> CallbackResult;
}

/// Write side of a content stream.
pub trait ContentStreamSource: Send + 'static {
    fn on_attached(&mut self, writer: Writer) -> CallbackResult;

    /// The consumer wants another chunk and nothing is buffered.
    fn on_pull(&mut self) -> CallbackResult;

    fn on_close(&mut self, error: Option<StreamError>) -> CallbackResult;
}

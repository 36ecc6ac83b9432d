//! Content stream subsystem.
//!
//! # Data Flow
//! ```text
//! network body ──▶ ContentStreamSource ──▶ Writer::write ──┐
//!                                                          ▼
//!                                        frame queue (bounded, FIFO)
//!                                                          │
//! application ◀── ContentStreamConsumer::on_read ◀── Reader::pull
//! ```
//!
//! # Design Decisions
//! - One producer and one consumer per stream; attachment is first-caller-wins
//! - Demand-driven: nothing is delivered without an outstanding pull
//! - State is confined to a single owning task; handles marshal commands to it
//! - Callback failures close the stream and never escape into the engine

pub mod contract;
pub mod engine;
pub mod error;
pub mod frame;

pub use contract::{CallbackResult, ContentStreamConsumer, ContentStreamSource};
pub use engine::{ContentStream, Reader, StreamId, Writer, DEFAULT_MAX_BUFFERED_FRAMES};
pub use error::{BoxError, Side, StreamError};
pub use frame::{Frame, StreamState};

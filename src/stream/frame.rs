//! Frames and lifecycle states of a content stream.

use bytes::Bytes;

use crate::stream::error::StreamError;

/// A unit buffered in the frame queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(Bytes),
    /// End-of-stream sentinel; drains after every data frame queued before it.
    End,
}

/// Stream lifecycle. Transitions only move forward.
///
/// ```text
/// Open → Closing → Closed(error?)
/// Open → Closed(error?)
/// ```
#[derive(Debug, Clone)]
pub enum StreamState {
    /// Accepts pushes and pulls.
    Open,
    /// An `End` sentinel is queued; pulls drain towards it, pushes are discarded.
    Closing,
    /// Terminal.
    Closed(Option<StreamError>),
}

impl StreamState {
    pub fn is_open(&self) -> bool {
        matches!(self, StreamState::Open)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, StreamState::Closed(_))
    }

    /// Terminal error, if the stream closed with one.
    pub fn error(&self) -> Option<&StreamError> {
        match self {
            StreamState::Closed(error) => error.as_ref(),
            _ => None,
        }
    }
}

//! Content stream error definitions.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error returned by stream callbacks and producers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which end of a stream an error or attachment refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Consumer,
    Producer,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Consumer => f.write_str("consumer"),
            Side::Producer => f.write_str("producer"),
        }
    }
}

/// Errors surfaced by a content stream.
///
/// Cloneable because a single terminal error is delivered to both the
/// consumer and the producer.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// A second consumer or producer tried to attach.
    #[error("stream busy: a {0} is already attached")]
    Busy(Side),

    /// The stream had already closed when the caller attached or wrote.
    #[error("stream closed")]
    Closed {
        #[source]
        cause: Option<Box<StreamError>>,
    },

    /// A consumer or producer callback failed; the stream was force-closed.
    #[error("{side} callback failed: {source}")]
    Callback {
        side: Side,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// The producer ended the stream with an error, or the stream was cancelled with one.
    #[error("stream aborted: {0}")]
    Aborted(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// The frame queue is full; the producer must wait for demand.
    #[error("frame queue full ({capacity} frames buffered)")]
    Saturated { capacity: usize },
}

impl StreamError {
    pub fn callback(side: Side, error: BoxError) -> Self {
        StreamError::Callback {
            side,
            source: Arc::from(error),
        }
    }

    pub fn aborted(error: impl Into<BoxError>) -> Self {
        StreamError::Aborted(Arc::from(error.into()))
    }

    pub(crate) fn closed(cause: Option<&StreamError>) -> Self {
        StreamError::Closed {
            cause: cause.cloned().map(Box::new),
        }
    }

    /// Short label used in logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            StreamError::Busy(_) => "busy",
            StreamError::Closed { .. } => "closed",
            StreamError::Callback { .. } => "callback",
            StreamError::Aborted(_) => "aborted",
            StreamError::Saturated { .. } => "saturated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn closed_keeps_cause_chain() {
        let cause = StreamError::aborted("peer reset");
        let closed = StreamError::closed(Some(&cause));
        assert_eq!(closed.to_string(), "stream closed");
        let source = closed.source().expect("cause");
        assert_eq!(source.to_string(), "stream aborted: peer reset");
    }

    #[test]
    fn callback_names_the_side() {
        let err = StreamError::callback(Side::Producer, "disk gone".into());
        assert_eq!(err.to_string(), "producer callback failed: disk gone");
        assert_eq!(err.reason(), "callback");
    }
}

//! Execution groups backing bound services.
//!
//! A group is a runtime handle plus an optional connection limit. Stream
//! services get two: the acceptor (`label:parent`) that runs the accept loop
//! and the worker group (`label:child`) that runs each connection, bounded by
//! `server.max_connections`. Datagram services get a single group.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct ExecutionGroup {
    name: Arc<str>,
    handle: Handle,
    limit: Option<Arc<Semaphore>>,
    max: Option<usize>,
}

impl ExecutionGroup {
    pub fn new(name: impl Into<Arc<str>>, handle: Handle) -> Self {
        Self {
            name: name.into(),
            handle,
            limit: None,
            max: None,
        }
    }

    /// Bound the number of concurrently held permits.
    pub fn with_limit(mut self, max: usize) -> Self {
        let max = max.max(1);
        self.limit = Some(Arc::new(Semaphore::new(max)));
        self.max = Some(max);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Wait for a free slot. Unlimited groups hand out permits immediately.
    ///
    /// Returns `None` only if the limit was closed.
    pub async fn acquire(&self) -> Option<ConnectionPermit> {
        match &self.limit {
            None => Some(ConnectionPermit { _permit: None }),
            Some(limit) => {
                let permit = Arc::clone(limit).acquire_owned().await.ok()?;
                Some(ConnectionPermit {
                    _permit: Some(permit),
                })
            }
        }
    }

    pub fn available_permits(&self) -> Option<usize> {
        self.limit.as_ref().map(|limit| limit.available_permits())
    }

    pub fn max_permits(&self) -> Option<usize> {
        self.max
    }
}

impl fmt::Debug for ExecutionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionGroup")
            .field("name", &self.name)
            .field("max", &self.max)
            .field("available", &self.available_permits())
            .finish()
    }
}

/// A connection slot. Dropping it frees the slot, even if the handler panics.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: Option<OwnedSemaphorePermit>,
}

/// The groups provisioned for one service.
#[derive(Debug, Clone)]
pub enum ServiceGroups {
    /// Connection-oriented: acceptor and per-connection workers.
    Split {
        acceptor: ExecutionGroup,
        workers: ExecutionGroup,
    },
    Single(ExecutionGroup),
}

impl ServiceGroups {
    /// Group running the accept or receive loop.
    pub fn acceptor(&self) -> &ExecutionGroup {
        match self {
            ServiceGroups::Split { acceptor, .. } => acceptor,
            ServiceGroups::Single(group) => group,
        }
    }

    /// Group running individual connections.
    pub fn workers(&self) -> &ExecutionGroup {
        match self {
            ServiceGroups::Split { workers, .. } => workers,
            ServiceGroups::Single(group) => group,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limited_group_hands_out_bounded_permits() {
        let group = ExecutionGroup::new("http:child", Handle::current()).with_limit(2);
        let first = group.acquire().await.unwrap();
        let _second = group.acquire().await.unwrap();
        assert_eq!(group.available_permits(), Some(0));

        drop(first);
        assert_eq!(group.available_permits(), Some(1));
        assert_eq!(group.max_permits(), Some(2));
    }

    #[tokio::test]
    async fn unlimited_group_never_waits() {
        let group = ExecutionGroup::new("http3", Handle::current());
        for _ in 0..100 {
            assert!(group.acquire().await.is_some());
        }
        assert_eq!(group.available_permits(), None);
        let value = group.spawn(async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }
}

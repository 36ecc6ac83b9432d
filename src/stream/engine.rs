//! The content stream engine.
//!
//! Each stream is confined to one Tokio task that owns all of its state: the
//! frame queue, the demand counter and the attached parties. Handles
//! ([`ContentStream`], [`Reader`], [`Writer`]) never touch that state; they
//! send commands to the owning task. A command issued from inside a callback
//! already running on the owning task skips the channel and is applied as soon
//! as the current command returns.
//!
//! # Flow control
//! ```text
//! Reader::pull ──▶ demand += 1 ──▶ drain queue ──▶ on_read (demand -= 1)
//!                                      │ empty
//!                                      ▼
//!                         producer.on_pull ──▶ Writer::write ──▶ on_read
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::observability::metrics;
use crate::stream::contract::{ContentStreamConsumer, ContentStreamSource};
use crate::stream::error::{BoxError, Side, StreamError};
use crate::stream::frame::{Frame, StreamState};

/// Frames buffered before `Writer::write` starts refusing chunks.
pub const DEFAULT_MAX_BUFFERED_FRAMES: usize = 64;

static STREAM_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a content stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(u64);

impl StreamId {
    fn next() -> Self {
        Self(STREAM_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

enum Command {
    Consume(Box<dyn ContentStreamConsumer>),
    Source(Box<dyn ContentStreamSource>),
    Pull,
    Push(Bytes),
    End(Option<StreamError>),
    Close(Option<StreamError>),
    Settle(oneshot::Sender<()>),
}

/// Marks the task currently applying commands for a stream.
struct Owner {
    id: StreamId,
    pending: RefCell<VecDeque<Command>>,
}

tokio::task_local! {
    static OWNER: Owner;
}

/// Attachment guards and queue accounting shared by every handle of one stream.
struct Shared {
    consumer_claimed: AtomicBool,
    producer_claimed: AtomicBool,
    buffered: AtomicUsize,
    capacity: usize,
}

/// Addressing data behind every handle of one stream.
#[derive(Clone)]
struct Link {
    id: StreamId,
    tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl Link {
    /// Apply inline when already on the owning task, otherwise marshal to it.
    fn dispatch(&self, command: Command) {
        let on_owner = OWNER.try_with(|owner| owner.id == self.id).unwrap_or(false);
        if on_owner {
            let _ = OWNER.try_with(|owner| owner.pending.borrow_mut().push_back(command));
            return;
        }
        if self.tx.send(command).is_err() {
            tracing::trace!(stream = %self.id, "Command dropped, owning task is gone");
        }
    }
}

/// Handle to a content stream.
///
/// Cloning the handle does not create a new stream.
#[derive(Clone)]
pub struct ContentStream {
    link: Link,
}

impl ContentStream {
    /// Create a stream with the default queue bound.
    ///
    /// Must be called within a Tokio runtime: the owning task is spawned here.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_BUFFERED_FRAMES)
    }

    /// Create a stream that buffers at most `capacity` frames.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = StreamId::next();
        let shared = Arc::new(Shared {
            consumer_claimed: AtomicBool::new(false),
            producer_claimed: AtomicBool::new(false),
            buffered: AtomicUsize::new(0),
            capacity: capacity.max(1),
        });
        let core = Core {
            id,
            weak: tx.downgrade(),
            state: StreamState::Open,
            demand: 0,
            queue: VecDeque::new(),
            consumer: None,
            producer: None,
            shared: Arc::clone(&shared),
        };
        let link = Link { id, tx, shared };
        tokio::spawn(run(core, rx));
        tracing::trace!(stream = %id, capacity, "Content stream created");
        Self { link }
    }

    pub fn id(&self) -> StreamId {
        self.link.id
    }

    /// Attach the consumer. The first caller wins; later callers are told the
    /// stream is busy and are never stored.
    pub fn consume<C: ContentStreamConsumer>(&self, consumer: C) {
        self.consume_boxed(Box::new(consumer))
    }

    pub fn consume_boxed(&self, mut consumer: Box<dyn ContentStreamConsumer>) {
        if self
            .link
            .shared
            .consumer_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(stream = %self.link.id, "Consumer rejected, stream busy");
            reject_consumer(&mut consumer, StreamError::Busy(Side::Consumer));
            return;
        }
        self.link.dispatch(Command::Consume(consumer));
    }

    /// Attach the producer. Same first-caller-wins rule as [`consume`](Self::consume).
    pub fn source<P: ContentStreamSource>(&self, producer: P) {
        self.source_boxed(Box::new(producer))
    }

    pub fn source_boxed(&self, mut producer: Box<dyn ContentStreamSource>) {
        if self
            .link
            .shared
            .producer_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(stream = %self.link.id, "Producer rejected, stream busy");
            reject_producer(&mut producer, StreamError::Busy(Side::Producer));
            return;
        }
        self.link.dispatch(Command::Source(producer));
    }

    /// Cancel the stream. Idempotent: the first call's error wins and
    /// unflushed frames are discarded.
    pub fn close(&self, error: Option<BoxError>) {
        self.link
            .dispatch(Command::Close(error.map(StreamError::aborted)));
    }

    /// Frames written but not yet delivered or discarded.
    pub fn buffered(&self) -> usize {
        self.link.shared.buffered.load(Ordering::Acquire)
    }

    /// Resolves once every command issued before this call has been applied.
    pub async fn settled(&self) {
        let (tx, rx) = oneshot::channel();
        self.link.dispatch(Command::Settle(tx));
        let _ = rx.await;
    }
}

impl Default for ContentStream {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ContentStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentStream")
            .field("id", &self.link.id)
            .field("buffered", &self.buffered())
            .finish()
    }
}

/// Consumer-side handle passed to [`ContentStreamConsumer::on_attached`].
#[derive(Clone)]
pub struct Reader {
    link: Option<Link>,
}

impl Reader {
    fn inert() -> Self {
        Self { link: None }
    }

    /// Request one more frame.
    pub fn pull(&self) {
        if let Some(link) = &self.link {
            link.dispatch(Command::Pull);
        }
    }

    /// Give up the stream; same as an unsolicited close without error.
    pub fn release(&self) {
        if let Some(link) = &self.link {
            link.dispatch(Command::Close(None));
        }
    }

    /// Handed to a consumer that lost the attachment race.
    pub fn is_inert(&self) -> bool {
        self.link.is_none()
    }
}

/// Producer-side handle passed to [`ContentStreamSource::on_attached`].
#[derive(Clone)]
pub struct Writer {
    link: Option<Link>,
}

impl Writer {
    fn inert() -> Self {
        Self { link: None }
    }

    /// Push one chunk.
    ///
    /// Refused with [`StreamError::Saturated`] while the queue bound is reached;
    /// a producer that only writes in response to `on_pull` never hits it.
    pub fn write(&self, chunk: Bytes) -> Result<(), StreamError> {
        let Some(link) = &self.link else {
            return Err(StreamError::closed(None));
        };
        let shared = &link.shared;
        let previous = shared.buffered.fetch_add(1, Ordering::AcqRel);
        if previous >= shared.capacity {
            shared.buffered.fetch_sub(1, Ordering::AcqRel);
            return Err(StreamError::Saturated {
                capacity: shared.capacity,
            });
        }
        link.dispatch(Command::Push(chunk));
        Ok(())
    }

    /// Finish the stream, cleanly or with an error.
    pub fn end(&self, error: Option<BoxError>) {
        if let Some(link) = &self.link {
            link.dispatch(Command::End(error.map(StreamError::aborted)));
        }
    }

    pub fn is_inert(&self) -> bool {
        self.link.is_none()
    }
}

fn reject_consumer(consumer: &mut Box<dyn ContentStreamConsumer>, error: StreamError) {
    if let Err(e) = consumer.on_attached(Reader::inert()) {
        tracing::debug!(error = %e, "Rejected consumer failed on attach");
    }
    if let Err(e) = consumer.on_close(Some(error)) {
        tracing::warn!(error = %e, "Rejected consumer failed on close");
    }
}

fn reject_producer(producer: &mut Box<dyn ContentStreamSource>, error: StreamError) {
    if let Err(e) = producer.on_attached(Writer::inert()) {
        tracing::debug!(error = %e, "Rejected producer failed on attach");
    }
    if let Err(e) = producer.on_close(Some(error)) {
        tracing::warn!(error = %e, "Rejected producer failed on close");
    }
}

async fn run(mut core: Core, mut rx: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = rx.recv().await {
        let owner = Owner {
            id: core.id,
            pending: RefCell::new(VecDeque::new()),
        };
        OWNER.sync_scope(owner, || core.run(command));
    }
    tracing::trace!(stream = %core.id, "Content stream released");
}

/// State owned by the stream's task.
struct Core {
    id: StreamId,
    weak: mpsc::WeakUnboundedSender<Command>,
    state: StreamState,
    demand: u64,
    queue: VecDeque<Frame>,
    consumer: Option<Box<dyn ContentStreamConsumer>>,
    producer: Option<Box<dyn ContentStreamSource>>,
    shared: Arc<Shared>,
}

impl Core {
    fn run(&mut self, command: Command) {
        self.apply(command);
        while let Some(next) = OWNER
            .try_with(|owner| owner.pending.borrow_mut().pop_front())
            .ok()
            .flatten()
        {
            self.apply(next);
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Consume(consumer) => self.attach_consumer(consumer),
            Command::Source(producer) => self.attach_producer(producer),
            Command::Pull => self.pull(),
            Command::Push(chunk) => self.push(chunk),
            Command::End(error) => self.end(error),
            Command::Close(error) => self.close(error),
            Command::Settle(tx) => {
                let _ = tx.send(());
            }
        }
    }

    /// A fresh handle for an attached party; the owning task keeps only a weak sender.
    fn link(&self) -> Option<Link> {
        let tx = self.weak.upgrade()?;
        Some(Link {
            id: self.id,
            tx,
            shared: Arc::clone(&self.shared),
        })
    }

    fn attach_consumer(&mut self, mut consumer: Box<dyn ContentStreamConsumer>) {
        if let StreamState::Closed(error) = &self.state {
            reject_consumer(&mut consumer, StreamError::closed(error.as_ref()));
            return;
        }
        let reader = Reader { link: self.link() };
        let attached = consumer.on_attached(reader);
        self.consumer = Some(consumer);
        if let Err(e) = attached {
            self.close(Some(StreamError::callback(Side::Consumer, e)));
        }
    }

    fn attach_producer(&mut self, mut producer: Box<dyn ContentStreamSource>) {
        if let StreamState::Closed(error) = &self.state {
            reject_producer(&mut producer, StreamError::closed(error.as_ref()));
            return;
        }
        let writer = Writer { link: self.link() };
        let attached = producer.on_attached(writer);
        self.producer = Some(producer);
        if let Err(e) = attached {
            self.close(Some(StreamError::callback(Side::Producer, e)));
        }
    }

    fn pull(&mut self) {
        self.demand += 1;
        if let StreamState::Closed(error) = &self.state {
            // Late pull from a consumer that has not been told yet.
            let error = error.clone();
            if let Some(mut consumer) = self.consumer.take() {
                notify_close(self.id, Side::Consumer, consumer.on_close(error));
            }
            return;
        }
        self.drain();
    }

    fn drain(&mut self) {
        while self.demand > 0 {
            match self.queue.pop_front() {
                Some(Frame::Data(chunk)) => {
                    self.release_frames(1);
                    self.demand -= 1;
                    if !self.deliver(chunk) {
                        return;
                    }
                }
                Some(Frame::End) => {
                    self.close(None);
                    return;
                }
                None => {
                    if self.producer.is_some() {
                        self.request_upstream();
                    } else {
                        self.close(None);
                    }
                    return;
                }
            }
        }
    }

    fn push(&mut self, chunk: Bytes) {
        if !self.state.is_open() {
            // Lost a race with closure; drop the buffer.
            self.release_frames(1);
            tracing::trace!(stream = %self.id, bytes = chunk.len(), "Discarded write after close");
            return;
        }
        if self.consumer.is_some() && self.demand > 0 && self.queue.is_empty() {
            self.release_frames(1);
            self.demand -= 1;
            if !self.deliver(chunk) {
                return;
            }
            if self.demand > 0 && self.state.is_open() {
                self.request_upstream();
            }
        } else {
            self.queue.push_back(Frame::Data(chunk));
        }
    }

    fn end(&mut self, error: Option<StreamError>) {
        if !self.state.is_open() {
            return;
        }
        match error {
            None if self.demand == 0 => {
                self.queue.push_back(Frame::End);
                self.state = StreamState::Closing;
            }
            error => self.close(error),
        }
    }

    fn close(&mut self, error: Option<StreamError>) {
        if self.state.is_closed() {
            return;
        }
        let reason = error.as_ref().map_or("end", StreamError::reason);
        self.state = StreamState::Closed(error.clone());

        let discarded = self
            .queue
            .drain(..)
            .filter(|frame| matches!(frame, Frame::Data(_)))
            .count();
        self.release_frames(discarded);
        metrics::record_stream_closed(reason);
        tracing::trace!(stream = %self.id, reason, discarded, "Content stream closed");

        if let Some(mut consumer) = self.consumer.take() {
            notify_close(self.id, Side::Consumer, consumer.on_close(error.clone()));
        }
        if let Some(mut producer) = self.producer.take() {
            notify_close(self.id, Side::Producer, producer.on_close(error));
        }
    }

    /// Hand one chunk to the consumer; a failing callback force-closes the stream.
    fn deliver(&mut self, chunk: Bytes) -> bool {
        let Some(consumer) = self.consumer.as_mut() else {
            return false;
        };
        metrics::record_stream_frame("delivered");
        match consumer.on_read(chunk) {
            Ok(()) => true,
            Err(e) => {
                self.close(Some(StreamError::callback(Side::Consumer, e)));
                false
            }
        }
    }

    fn request_upstream(&mut self) {
        let Some(producer) = self.producer.as_mut() else {
            return;
        };
        if let Err(e) = producer.on_pull() {
            self.close(Some(StreamError::callback(Side::Producer, e)));
        }
    }

    fn release_frames(&self, count: usize) {
        if count > 0 {
            self.shared.buffered.fetch_sub(count, Ordering::AcqRel);
        }
    }
}

fn notify_close(id: StreamId, side: Side, result: Result<(), BoxError>) {
    if let Err(e) = result {
        tracing::warn!(stream = %id, %side, error = %e, "Close notification failed");
    }
}

//! Message queues
use core::fmt;
use std::{
    collections::VecDeque,
    sync::{Condvar, Mutex},
};

use crate::{
    cfg::{Ticks, MAX_QUEUE_LENGTH},
    error::{CreateQueueError, ReceiveError, ResultCode},
    timeout,
};

/// A fixed-capacity FIFO queue of `T`.
///
/// [`send`](Self::send) waits while the queue is full and
/// [`receive`](Self::receive) waits while it's empty, each for up to a
/// caller-supplied number of ticks.
pub struct Queue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    not_empty: Condvar,
    not_full: Condvar,
}

/// Error type for [`Queue::send`]. Gives back the item that couldn't be
/// sent.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SendError<T>(pub T);

impl<T> SendError<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("SendError { .. }")
    }
}

impl<T> From<SendError<T>> for ResultCode {
    #[inline]
    fn from(_: SendError<T>) -> Self {
        Self::QueueOverflow
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Queue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<T> Queue<T> {
    /// Construct a queue holding up to `capacity` items.
    ///
    /// `capacity` must be in `1..=`[`MAX_QUEUE_LENGTH`].
    pub fn new(capacity: usize) -> Result<Self, CreateQueueError> {
        if capacity == 0 || capacity > MAX_QUEUE_LENGTH {
            return Err(CreateQueueError::BadParam);
        }
        Ok(Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        })
    }

    /// Append `item`, waiting up to `timeout_ticks` ticks for space. Zero
    /// ticks means a single non-blocking attempt.
    pub fn send(&self, item: T, timeout_ticks: Ticks) -> Result<(), SendError<T>> {
        let guard = timeout::lock(&self.items);
        let (mut items, _) = timeout::wait_while(&self.not_full, guard, timeout_ticks, |items| {
            items.len() >= self.capacity
        });
        if items.len() >= self.capacity {
            return Err(SendError(item));
        }
        items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the oldest item, waiting up to `timeout_ticks` ticks for one to
    /// arrive. Zero ticks means a single non-blocking attempt.
    pub fn receive(&self, timeout_ticks: Ticks) -> Result<T, ReceiveError> {
        let guard = timeout::lock(&self.items);
        let (mut items, _) =
            timeout::wait_while(&self.not_empty, guard, timeout_ticks, |items| items.is_empty());
        let item = items.pop_front().ok_or(ReceiveError::Timeout)?;
        self.not_full.notify_one();
        Ok(item)
    }

    /// Get the number of items in the queue.
    pub fn messages_waiting(&self) -> usize {
        timeout::lock(&self.items).len()
    }

    /// An alias of [`messages_waiting`](Self::messages_waiting).
    pub fn len(&self) -> usize {
        self.messages_waiting()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }
}

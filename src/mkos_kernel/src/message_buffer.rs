//! Message buffers
use core::fmt;
use std::sync::{Condvar, Mutex};

use crate::{
    cfg::Ticks,
    error::CreateMessageBufferError,
    timeout::{self, Deadline},
};

/// A byte-oriented ring buffer for passing a stream of bytes between
/// threads.
///
/// The ring has one slot more than the requested capacity, so that "full"
/// (`head + 1 == tail`) and "empty" (`head == tail`) can be told apart.
pub struct MessageBuffer {
    ring: Mutex<Ring>,
    not_empty: Condvar,
    not_full: Condvar,
}

struct Ring {
    buf: Box<[u8]>,
    /// The next slot to write
    head: usize,
    /// The next slot to read
    tail: usize,
}

impl Ring {
    #[inline]
    fn next(&self, i: usize) -> usize {
        (i + 1) % self.buf.len()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.next(self.head) == self.tail
    }

    fn available(&self) -> usize {
        if self.head >= self.tail {
            self.head - self.tail
        } else {
            self.buf.len() - (self.tail - self.head)
        }
    }

    fn push(&mut self, byte: u8) {
        self.buf[self.head] = byte;
        self.head = self.next(self.head);
    }

    fn pop(&mut self) -> u8 {
        let byte = self.buf[self.tail];
        self.tail = self.next(self.tail);
        byte
    }
}

impl fmt::Debug for MessageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ring = timeout::lock(&self.ring);
        f.debug_struct("MessageBuffer")
            .field("available", &ring.available())
            .field("capacity", &(ring.buf.len() - 1))
            .finish()
    }
}

impl MessageBuffer {
    /// Construct a buffer that holds up to `size` bytes.
    ///
    /// Fails if `size + 1` bytes can't be represented or allocated.
    pub fn new(size: usize) -> Result<Self, CreateMessageBufferError> {
        let len = size
            .checked_add(1)
            .ok_or(CreateMessageBufferError::BadParam)?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| CreateMessageBufferError::OutOfMemory)?;
        buf.resize(len, 0u8);

        Ok(Self {
            ring: Mutex::new(Ring {
                buf: buf.into_boxed_slice(),
                head: 0,
                tail: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        })
    }

    /// Copy bytes from `data` into the buffer, one at a time. While the buffer
    /// is full, waits for space in one-tick intervals until `timeout_ticks`
    /// ticks have passed.
    ///
    /// Returns the number of bytes written, which is less than `data.len()` if
    /// the timeout expired.
    pub fn send(&self, data: &[u8], timeout_ticks: Ticks) -> usize {
        let deadline = Deadline::after(timeout_ticks);
        let mut ring = timeout::lock(&self.ring);
        let mut written = 0;

        for &byte in data {
            while ring.is_full() {
                if written > 0 {
                    // Let the receiver drain what's already there
                    self.not_empty.notify_one();
                }
                let (guard, waited) = timeout::wait_one_tick(&self.not_full, ring, &deadline);
                ring = guard;
                if !waited {
                    break;
                }
            }
            if ring.is_full() {
                break;
            }
            ring.push(byte);
            written += 1;
        }

        if written > 0 {
            self.not_empty.notify_one();
        }
        written
    }

    /// Copy up to `buffer.len()` bytes out of the buffer. If it's empty, waits
    /// up to `timeout_ticks` ticks for data to arrive, then drains whatever is
    /// available.
    ///
    /// Returns the number of bytes read.
    pub fn receive(&self, buffer: &mut [u8], timeout_ticks: Ticks) -> usize {
        let guard = timeout::lock(&self.ring);
        let (mut ring, _) =
            timeout::wait_while(&self.not_empty, guard, timeout_ticks, |ring| ring.is_empty());

        let mut read = 0;
        for slot in buffer.iter_mut() {
            if ring.is_empty() {
                break;
            }
            *slot = ring.pop();
            read += 1;
        }

        if read > 0 {
            self.not_full.notify_one();
        }
        read
    }

    pub fn is_empty(&self) -> bool {
        timeout::lock(&self.ring).is_empty()
    }

    pub fn is_full(&self) -> bool {
        timeout::lock(&self.ring).is_full()
    }

    /// Get the number of bytes that can be received right now.
    pub fn available(&self) -> usize {
        timeout::lock(&self.ring).available()
    }

    /// Get the maximum number of bytes the buffer holds.
    pub fn capacity(&self) -> usize {
        timeout::lock(&self.ring).buf.len() - 1
    }
}

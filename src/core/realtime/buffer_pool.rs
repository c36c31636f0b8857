//! Reusable send buffers.
//!
//! The pool is an arena of fixed-capacity byte buffers allocated up front
//! and handed out through a free-list. A borrowed buffer is a
//! [`PooledBuffer`] guard which goes back to the pool when dropped, so every
//! borrow is returned exactly once no matter how the send ends.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::base::{RealtimeError, RealtimeResult};

/// Default size of a single send buffer (64 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default number of pooled buffers.
pub const DEFAULT_POOL_CAPACITY: usize = 100;

/// What to do when every pooled buffer is borrowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolExhaustion {
    /// Hand out a transient buffer that is freed instead of pooled on return
    #[default]
    Allocate,
    /// Fail the borrow with [`RealtimeError::PoolExhausted`]
    Reject,
}

/// Point-in-time pool statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolStats {
    pub capacity: usize,
    pub available: usize,
    pub borrowed: usize,
    pub transient_allocations: u64,
}

pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    buffer_size: usize,
    capacity: usize,
    policy: PoolExhaustion,
    borrowed: AtomicUsize,
    transient: AtomicU64,
}

impl BufferPool {
    /// Create a pool pre-filled with `capacity` buffers of `buffer_size` bytes.
    pub fn new(buffer_size: usize, capacity: usize, policy: PoolExhaustion) -> Self {
        let free = (0..capacity)
            .map(|_| Vec::with_capacity(buffer_size))
            .collect();
        Self {
            free: Mutex::new(free),
            buffer_size,
            capacity,
            policy,
            borrowed: AtomicUsize::new(0),
            transient: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Borrow a cleared buffer.
    pub fn acquire(&self) -> RealtimeResult<PooledBuffer<'_>> {
        let pooled = self.free.lock().pop();
        match pooled {
            Some(buf) => {
                self.borrowed.fetch_add(1, Ordering::Relaxed);
                Ok(PooledBuffer {
                    pool: self,
                    buf,
                    pooled: true,
                })
            }
            None => match self.policy {
                PoolExhaustion::Allocate => {
                    self.transient.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("Buffer pool empty, allocating transient buffer");
                    Ok(PooledBuffer {
                        pool: self,
                        buf: Vec::with_capacity(self.buffer_size),
                        pooled: false,
                    })
                }
                PoolExhaustion::Reject => Err(RealtimeError::PoolExhausted),
            },
        }
    }

    fn release(&self, mut buf: Vec<u8>, pooled: bool) {
        if !pooled {
            return;
        }
        self.borrowed.fetch_sub(1, Ordering::Relaxed);
        buf.clear();
        if buf.capacity() > self.buffer_size {
            buf.shrink_to(self.buffer_size);
        }
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(buf);
        }
    }

    /// Drop every idle buffer. Buffers still borrowed are returned normally.
    pub fn clear(&self) {
        self.free.lock().clear();
    }

    pub fn stats(&self) -> BufferPoolStats {
        BufferPoolStats {
            capacity: self.capacity,
            available: self.free.lock().len(),
            borrowed: self.borrowed.load(Ordering::Relaxed),
            transient_allocations: self.transient.load(Ordering::Relaxed),
        }
    }
}

/// A borrowed buffer; returns itself to the pool on drop.
pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buf: Vec<u8>,
    pooled: bool,
}

impl PooledBuffer<'_> {
    /// Whether this buffer came from the arena rather than a fallback allocation.
    pub fn is_pooled(&self) -> bool {
        self.pooled
    }

    /// Fixed capacity every payload must fit into.
    pub fn limit(&self) -> usize {
        self.pool.buffer_size
    }
}

impl Deref for PooledBuffer<'_> {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.buf
    }
}

impl DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for PooledBuffer<'_> {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.release(buf, self.pooled);
    }
}

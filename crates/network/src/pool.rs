//! Recycled message storage.
//!
//! Buffers move by value: `acquire` hands out an exclusively owned
//! `Vec<u8>` and `release` takes it back, so nothing can keep using a
//! buffer once it has been returned.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use peerwire_common::{NetworkError, PeerwireError};
use thiserror::Error;
use tracing::{trace, warn};

use crate::config::PoolConfig;

/// Errors raised by a buffer pool
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("requested {requested} bytes exceeds the {limit} byte buffer limit")]
    Exhausted { requested: usize, limit: usize },
}

impl From<PoolError> for PeerwireError {
    fn from(err: PoolError) -> Self {
        PeerwireError::Network(NetworkError::PoolExhausted(err.to_string()))
    }
}

/// Source of reusable byte buffers.
pub trait BufferPool: Send + Sync {
    /// Returns a buffer of at least `min_size` bytes. Its contents are
    /// unspecified.
    fn acquire(&self, min_size: usize) -> Result<Vec<u8>, PoolError>;

    /// Takes a buffer back for reuse.
    fn release(&self, buffer: Vec<u8>);
}

impl<P: BufferPool + ?Sized> BufferPool for Arc<P> {
    fn acquire(&self, min_size: usize) -> Result<Vec<u8>, PoolError> {
        (**self).acquire(min_size)
    }

    fn release(&self, buffer: Vec<u8>) {
        (**self).release(buffer)
    }
}

/// Snapshot of pool usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub pooled_buffers: usize,
    pub pooled_bytes: usize,
    pub hits: u64,
    pub misses: u64,
}

struct PoolState {
    buffers: Vec<Vec<u8>>,
    pooled_bytes: usize,
}

/// Thread-safe pool keeping released buffers up to a byte budget.
pub struct StoragePool {
    state: Mutex<PoolState>,
    max_pooled_bytes: usize,
    max_buffer_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl StoragePool {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            state: Mutex::new(PoolState { buffers: Vec::new(), pooled_bytes: 0 }),
            max_pooled_bytes: config.max_pooled_bytes,
            max_buffer_size: config.max_buffer_size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.lock();
        PoolStats {
            pooled_buffers: state.buffers.len(),
            pooled_bytes: state.pooled_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    // A panic while holding the lock cannot leave the free list half-updated,
    // so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for StoragePool {
    fn default() -> Self {
        Self::new(&PoolConfig::default())
    }
}

impl BufferPool for StoragePool {
    fn acquire(&self, min_size: usize) -> Result<Vec<u8>, PoolError> {
        if min_size > self.max_buffer_size {
            warn!("Refusing {} byte buffer (limit {})", min_size, self.max_buffer_size);
            return Err(PoolError::Exhausted {
                requested: min_size,
                limit: self.max_buffer_size,
            });
        }

        {
            let mut state = self.lock();
            if let Some(index) = state.buffers.iter().position(|b| b.len() >= min_size) {
                let buffer = state.buffers.swap_remove(index);
                state.pooled_bytes -= buffer.len();
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!("Reusing {} byte buffer for {} byte request", buffer.len(), min_size);
                return Ok(buffer);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(vec![0; min_size])
    }

    fn release(&self, buffer: Vec<u8>) {
        if buffer.is_empty() {
            return;
        }
        let mut state = self.lock();
        if state.pooled_bytes + buffer.len() > self.max_pooled_bytes {
            trace!("Pool full, dropping {} byte buffer", buffer.len());
            return;
        }
        state.pooled_bytes += buffer.len();
        state.buffers.push(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_pool() -> StoragePool {
        StoragePool::new(&PoolConfig {
            max_pooled_bytes: 64,
            max_buffer_size: 128,
        })
    }

    #[test]
    fn test_acquire_allocates_on_miss() {
        let pool = small_pool();
        let buffer = pool.acquire(10).unwrap();
        assert_eq!(buffer.len(), 10);
        assert_eq!(pool.stats().misses, 1);
    }

    #[test]
    fn test_release_then_reuse() {
        let pool = small_pool();
        pool.release(vec![0; 40]);
        assert_eq!(pool.stats().pooled_bytes, 40);

        // too small to satisfy, allocates instead
        assert_eq!(pool.acquire(41).unwrap().len(), 41);

        let reused = pool.acquire(16).unwrap();
        assert_eq!(reused.len(), 40);

        let stats = pool.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.pooled_buffers, 0);
        assert_eq!(stats.pooled_bytes, 0);
    }

    #[test]
    fn test_release_respects_budget() {
        let pool = small_pool();
        pool.release(vec![0; 40]);
        pool.release(vec![0; 40]);
        pool.release(Vec::new());

        let stats = pool.stats();
        assert_eq!(stats.pooled_buffers, 1);
        assert_eq!(stats.pooled_bytes, 40);
    }

    #[test]
    fn test_oversized_request_is_exhausted() {
        let pool = small_pool();
        assert_eq!(
            pool.acquire(129),
            Err(PoolError::Exhausted { requested: 129, limit: 128 })
        );
    }

    #[test]
    fn test_shared_through_arc() {
        let pool = Arc::new(small_pool());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        let buffer = pool.acquire(8 + i).unwrap();
                        assert!(buffer.len() >= 8 + i);
                        pool.release(buffer);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stats = pool.stats();
        assert_eq!(stats.hits + stats.misses, 400);
        assert!(stats.pooled_bytes <= 64);
    }
}

//! Bounded task dispatcher.
//!
//! Work is spawned onto the tokio runtime immediately and waits for one of
//! `pool_size` semaphore permits before it runs, so submitting never blocks the
//! caller and no more than `pool_size` units run at once.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

/// `min(instrument_count, 2 * cores)`, and never zero.
pub fn pool_size_for(instrument_count: usize, cores: usize) -> usize {
    instrument_count.min(cores.saturating_mul(2)).max(1)
}

pub fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

#[derive(Debug, Clone)]
pub struct Dispatcher {
    permits: Arc<Semaphore>,
    pool_size: usize,
    busy: Arc<AtomicUsize>,
}

impl Dispatcher {
    pub fn new(pool_size: usize) -> Self {
        let pool_size = pool_size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(pool_size)),
            pool_size,
            busy: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Pool sized for `instrument_count` instruments on this machine.
    pub fn for_instruments(instrument_count: usize) -> Self {
        Self::new(pool_size_for(instrument_count, available_cores()))
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Units currently holding a worker slot.
    pub fn busy(&self) -> usize {
        self.busy.load(Ordering::SeqCst)
    }

    /// Queues `work` and returns at once. Must be called from within a tokio
    /// runtime.
    pub fn submit<F>(&self, work: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let busy = Arc::clone(&self.busy);

        tokio::spawn(async move {
            // Never closed: the semaphore lives as long as any dispatcher clone.
            let _permit = permits.acquire_owned().await.ok();
            let _slot = BusySlot::enter(&busy);
            work.await
        })
    }
}

struct BusySlot<'a>(&'a AtomicUsize);

impl<'a> BusySlot<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for BusySlot<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

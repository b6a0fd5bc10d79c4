use std::time::Duration;

use super::{PendingWrite, RepairStore, StoreError};

/// How often and how patiently a batch commit is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub attempts: u32,
    /// Delay before the second attempt; grows linearly after that.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Buffers writes and commits them to the store in fixed-size batches.
///
/// Each commit is atomic. A failed commit leaves earlier batches in place,
/// so a rerun of the job picks up where it stopped.
pub struct WriteBatch<'a> {
    store: &'a dyn RepairStore,
    pending: Vec<PendingWrite>,
    capacity: usize,
    retry: RetryPolicy,
    committed: usize,
}

impl<'a> WriteBatch<'a> {
    pub fn new(store: &'a dyn RepairStore, capacity: usize, retry: RetryPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            store,
            pending: Vec::with_capacity(capacity),
            capacity,
            retry,
            committed: 0,
        }
    }

    /// Queue a write, committing once the batch is full.
    pub fn push(&mut self, write: PendingWrite) -> Result<(), StoreError> {
        self.pending.push(write);
        if self.pending.len() >= self.capacity {
            self.commit()?;
        }
        Ok(())
    }

    /// Commit queued writes, retrying transient failures.
    pub fn commit(&mut self) -> Result<(), StoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut attempt = 1;
        loop {
            match self.store.apply(&self.pending) {
                Ok(()) => {
                    self.committed += self.pending.len();
                    self.pending.clear();
                    return Ok(());
                }
                Err(err) if err.is_transient() && attempt < self.retry.attempts => {
                    let delay = self.retry.backoff * attempt;
                    log::warn!(
                        "commit of {} writes failed (attempt {}/{}): {}; retrying in {:?}",
                        self.pending.len(),
                        attempt,
                        self.retry.attempts,
                        err,
                        delay
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Commit whatever is left and return the number of writes committed.
    pub fn finish(mut self) -> Result<usize, StoreError> {
        self.commit()?;
        Ok(self.committed)
    }
}

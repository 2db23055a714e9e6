use std::thread;

use tracing::{debug, warn};

use dyntree_store::{TableStore, WriteRequest};

use crate::config::RetryPolicy;
use crate::error::{Result, TreeError};

/// Outcome of a fully drained [`BatchWriter::apply`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Requests written.
    pub requests: usize,
    /// Store calls made, resubmissions included.
    pub calls: usize,
    /// Resubmissions of unprocessed requests.
    pub retries: usize,
}

/// Applies ordered write requests in store-sized chunks.
///
/// Each chunk is resubmitted until the store reports nothing unprocessed.
/// A hard store error aborts immediately; chunks already applied stay
/// applied, so a failed multi-chunk write can leave a partial tree behind.
pub struct BatchWriter<'a, S: TableStore + ?Sized> {
    store: &'a S,
    table: &'a str,
    max_batch_items: usize,
    retry: &'a RetryPolicy,
}

impl<'a, S: TableStore + ?Sized> BatchWriter<'a, S> {
    pub fn new(store: &'a S, table: &'a str, max_batch_items: usize, retry: &'a RetryPolicy) -> Self {
        Self {
            store,
            table,
            max_batch_items: max_batch_items.max(1),
            retry,
        }
    }

    /// Write every request, in order, chunk by chunk.
    pub fn apply(&self, mut requests: Vec<WriteRequest>) -> Result<BatchReport> {
        let mut report = BatchReport {
            requests: requests.len(),
            ..Default::default()
        };

        while !requests.is_empty() {
            let rest = requests.split_off(requests.len().min(self.max_batch_items));
            let chunk = std::mem::replace(&mut requests, rest);
            self.drain_chunk(chunk, &mut report)?;
        }

        debug!(
            table = self.table,
            requests = report.requests,
            calls = report.calls,
            retries = report.retries,
            "batch applied"
        );
        Ok(report)
    }

    fn drain_chunk(&self, mut pending: Vec<WriteRequest>, report: &mut BatchReport) -> Result<()> {
        let mut backoff = self.retry.backoff();
        let mut attempts: u32 = 0;
        loop {
            report.calls += 1;
            pending = self.store.batch_write(self.table, pending)?;
            if pending.is_empty() {
                return Ok(());
            }

            if self.retry.max_attempts.is_some_and(|max| attempts >= max) {
                warn!(
                    table = self.table,
                    pending = pending.len(),
                    attempts,
                    "giving up on unprocessed batch requests"
                );
                return Err(TreeError::RetriesExhausted {
                    pending: pending.len(),
                });
            }
            attempts += 1;
            report.retries += 1;

            let delay = backoff.next_delay();
            warn!(
                table = self.table,
                pending = pending.len(),
                attempt = attempts,
                delay = ?delay,
                "resubmitting unprocessed batch requests"
            );
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
    }
}

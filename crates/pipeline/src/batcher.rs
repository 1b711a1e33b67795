//! Groups input lines into batches and publishes them onto the worker queue.

use crate::error::PipelineError;
use crate::record::{Batch, Record};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Single producer feeding the bounded batch queue.
///
/// Publishing waits while the queue is full, which is how slow workers hold the
/// reader back. Dropping the batcher (which [`Batcher::scan`] does on return)
/// closes the queue.
pub struct Batcher {
    capacity: usize,
    queue: mpsc::Sender<Batch>,
    cancel: CancellationToken,
}

impl Batcher {
    pub fn new(
        capacity: usize,
        queue: mpsc::Sender<Batch>,
        cancel: CancellationToken,
    ) -> Result<Self, PipelineError> {
        if capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "batch size must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            capacity,
            queue,
            cancel,
        })
    }

    /// Read `input` to the end, publishing full batches as they fill and the
    /// remainder at end of input. Returns the number of lines read.
    pub async fn scan<R>(self, input: R) -> Result<u64, PipelineError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        let mut rows = Vec::with_capacity(self.capacity);
        let mut lines_read: u64 = 0;
        let mut sequence: u64 = 0;

        while let Some(text) = lines
            .next_line()
            .await
            .map_err(|source| PipelineError::Input {
                line: lines_read,
                source,
            })?
        {
            lines_read += 1;
            rows.push(Record::new(lines_read, text));

            if rows.len() >= self.capacity {
                let full = std::mem::replace(&mut rows, Vec::with_capacity(self.capacity));
                self.publish(Batch::new(sequence, full)).await?;
                sequence += 1;
            }
        }

        // Finished reading input, make sure the last batch goes out.
        if !rows.is_empty() {
            self.publish(Batch::new(sequence, rows)).await?;
            sequence += 1;
        }

        debug!("Scanned {lines_read} lines into {sequence} batches");
        Ok(lines_read)
    }

    async fn publish(&self, batch: Batch) -> Result<(), PipelineError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PipelineError::Aborted),
            sent = self.queue.send(batch) => sent.map_err(|_| PipelineError::QueueClosed),
        }
    }
}

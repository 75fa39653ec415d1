use std::num::NonZeroUsize;
use std::thread;

use crate::error::ScanError;
use crate::parse::MAX_LINE_LEN;

/// Default byte length of one chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Default bytes read past the end of a chunk to finish its last line.
pub const DEFAULT_PADDING: usize = 128;

/// Default queue slots per worker.
pub const DEFAULT_QUEUE_DEPTH: usize = 10;

/// Knobs for one scan.
#[derive(Clone, Copy, Debug)]
pub struct ScanConfig {
    /// Nominal byte length of each chunk handed to a worker.
    pub chunk_size: usize,
    /// Extra bytes each worker reads past its chunk so it can finish the line
    /// that straddles the chunk end. Must exceed [`MAX_LINE_LEN`].
    pub padding: usize,
    /// Number of worker threads.
    pub workers: NonZeroUsize,
    /// Chunk offsets buffered per worker; the job queue holds
    /// `workers * queue_depth` offsets before the dispatcher blocks.
    pub queue_depth: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            padding: DEFAULT_PADDING,
            workers: default_workers(),
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl ScanConfig {
    /// Checks the preconditions the chunk boundary rule depends on.
    ///
    /// If the padding could end inside a valid line, the worker owning that
    /// line would never see its newline and the address would be lost.
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.chunk_size == 0 {
            return Err(ScanError::invalid_config("chunk size must be non-zero"));
        }
        if self.padding <= MAX_LINE_LEN as usize {
            return Err(ScanError::invalid_config(format!(
                "padding of {} bytes must exceed the longest valid line ({MAX_LINE_LEN} bytes)",
                self.padding
            )));
        }
        if self.queue_depth == 0 {
            return Err(ScanError::invalid_config("queue depth must be non-zero"));
        }
        if self.chunk_size.checked_add(self.padding).is_none() {
            return Err(ScanError::invalid_config(
                "chunk size plus padding overflows the address space",
            ));
        }
        Ok(())
    }

    /// Capacity of the bounded job queue.
    pub fn queue_capacity(&self) -> usize {
        self.workers.get().saturating_mul(self.queue_depth)
    }

    /// Bytes each worker reads per job.
    pub fn window_len(&self) -> usize {
        self.chunk_size + self.padding
    }
}

/// Host parallelism, or a single worker if it cannot be queried.
pub fn default_workers() -> NonZeroUsize {
    match thread::available_parallelism() {
        Ok(n) => n,
        Err(e) => {
            log::warn!("couldn't query the available parallelism ({e}), going single-threaded");
            NonZeroUsize::MIN
        }
    }
}

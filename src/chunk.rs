//! Splitting the input into chunks, and deciding which lines a chunk owns.

use std::ops::Range;

use memchr::memchr;

/// Offsets `0, C, 2C, …` strictly below the input length.
#[derive(Clone, Debug)]
pub struct ChunkPlan {
    next: u64,
    len: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    pub fn new(len: u64, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be non-zero");
        Self {
            next: 0,
            len,
            chunk_size: chunk_size as u64,
        }
    }
}

impl Iterator for ChunkPlan {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.next >= self.len {
            return None;
        }
        let offset = self.next;
        self.next = self.next.saturating_add(self.chunk_size);
        Some(offset)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.len.saturating_sub(self.next).div_ceil(self.chunk_size);
        let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

/// Returns the part of `window` the chunk at `offset` is responsible for.
///
/// `window` holds the bytes read from `offset` onwards: the chunk itself plus
/// its padding, or less at the end of the input. A line is owned by the chunk
/// that holds the byte just before it (its preceding newline); the very first
/// line of the input belongs to the chunk at offset 0. So the range starts one
/// past the first newline of the chunk, and ends one past the first newline at
/// or after `chunk_size`, which may lie in the padding.
///
/// If the returned range reaches `window.len()` the last line in it has no
/// newline inside the window: either the input ends there or the line is
/// longer than the padding.
pub fn owned_range(window: &[u8], offset: u64, chunk_size: usize) -> Range<usize> {
    let len = window.len();

    let start = if offset == 0 {
        0
    } else if let Some(newline) = memchr(b'\n', &window[..len.min(chunk_size)]) {
        newline + 1
    } else {
        // no line begins in this chunk; the previous chunk carries them all
        return len..len;
    };

    let end = if len <= chunk_size {
        len
    } else if let Some(newline) = memchr(b'\n', &window[chunk_size..]) {
        chunk_size + newline + 1
    } else {
        len
    };
    debug_assert!(
        start <= end,
        "owned range should never be reversed: {start}..{end}"
    );
    debug_assert!(
        start == 0 || window[start - 1] == b'\n',
        "owned range should begin at the input start or one after a newline"
    );

    start..end
}

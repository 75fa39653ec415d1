//! Dense presence bitmap over the whole IPv4 address space.
//!
//! One bit per address, `2^32` bits in `2^26` atomic words (512 MiB). Bits are
//! only ever set, so concurrent writers commute and the final population count
//! does not depend on how the work was scheduled.

use std::alloc::{self, Layout};
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of 64-bit words needed for one bit per IPv4 address.
pub const WORDS: usize = 1 << (32 - 6);

/// Shared, append-only set of observed addresses.
///
/// Writers only get [`set`](Self::set); there is no way to clear a bit or to
/// reach an individual word from outside this type.
pub struct PresenceBitmap {
    words: Box<[AtomicU64]>,
}

impl std::fmt::Debug for PresenceBitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceBitmap")
            .field("words_len", &self.words.len())
            .finish()
    }
}

impl Default for PresenceBitmap {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceBitmap {
    /// Allocates a zeroed bitmap.
    ///
    /// The allocation goes through `alloc_zeroed`, so on most platforms the
    /// pages are only committed once a bit in them is set.
    pub fn new() -> Self {
        let layout = match Layout::array::<AtomicU64>(WORDS) {
            Ok(layout) => layout,
            Err(_) => panic!("bitmap layout overflows the address space"),
        };
        // SAFETY: the layout is non-zero sized. All-zero bytes are a valid
        // `AtomicU64` holding 0, and the box is built from the same layout the
        // global allocator will be asked to free.
        let words = unsafe {
            let ptr = alloc::alloc_zeroed(layout) as *mut AtomicU64;
            if ptr.is_null() {
                alloc::handle_alloc_error(layout);
            }
            Box::from_raw(std::ptr::slice_from_raw_parts_mut(ptr, WORDS))
        };
        Self { words }
    }

    /// Records `address`, returning `true` if it had not been seen before.
    ///
    /// Optimistic read, early exit when the bit is already set, otherwise a
    /// compare-and-swap retried against the freshly observed word. A retry only
    /// happens when another writer changed the same 64-bit word in between, so
    /// the loop is bounded by the number of workers racing on that word.
    #[inline(always)]
    pub fn set(&self, address: u32) -> bool {
        let word = &self.words[(address >> 6) as usize];
        let mask = 1u64 << (address & 63);

        let mut current = word.load(Ordering::Relaxed);
        loop {
            if current & mask != 0 {
                return false;
            }
            match word.compare_exchange_weak(
                current,
                current | mask,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Whether `address` has been recorded.
    #[cfg(test)]
    pub(crate) fn contains(&self, address: u32) -> bool {
        let mask = 1u64 << (address & 63);
        self.words[(address >> 6) as usize].load(Ordering::Relaxed) & mask != 0
    }

    /// Sums the population count of every word.
    ///
    /// Only meaningful once every writer has been joined; the scan pipeline
    /// calls it after its thread scope closes.
    pub fn count(&self) -> u64 {
        self.words
            .iter()
            .map(|word| word.load(Ordering::Relaxed).count_ones() as u64)
            .sum()
    }
}

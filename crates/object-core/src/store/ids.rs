use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::ObjectId;

/// Odd multiplier, so the mapping from sequence numbers is a bijection
const SCRAMBLE: u64 = 0x9E37_79B9_7F4A_7C15;

/// Largest integer a JSON number carries exactly (2^53 - 1)
pub const MAX_ID: u64 = (1 << 53) - 1;

/// Process-wide identifier source.
///
/// Draws from a monotonically increasing sequence and scrambles each value
/// with a per-process key, keeping the low 53 bits. Values are never reused
/// and zero is never issued. Identifiers and subscription handles both come
/// from here.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
    key: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::with_key(rand::random())
    }

    /// Allocator with a fixed scramble key
    pub fn with_key(key: u64) -> Self {
        Self {
            next: AtomicU64::new(1),
            key,
        }
    }

    /// Next fresh identifier
    pub fn allocate(&self) -> ObjectId {
        ObjectId(self.next_value())
    }

    /// Next fresh raw value in `1..=MAX_ID`
    pub fn next_value(&self) -> u64 {
        loop {
            let seq = self.next.fetch_add(1, Ordering::Relaxed);
            let value = (seq.wrapping_mul(SCRAMBLE) ^ self.key) & MAX_ID;
            if value != 0 {
                return value;
            }
        }
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

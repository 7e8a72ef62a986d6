use crate::mmap::ShmSafe;
use crate::ring_buffer::{RingChannel, DEFAULT_CAPACITY};

/// Alignment of the shared layout. The whole structure, not a pointer to
/// it, is what both domains map.
pub const PAGE_ALIGN: usize = 4096;

/// Two fixed-role rings laid out back to back in one page-aligned block.
///
/// - `to_consumer` carries bytes from the privileged side to the
///   unprivileged side (its "in" ring).
/// - `to_producer` carries bytes from the unprivileged side back to the
///   privileged side (its "out" ring).
///
/// No other topology exists; the roles are fields, not a runtime choice.
#[derive(Debug, Default)]
#[repr(C, align(4096))]
pub struct DuplexChannel<const CAPACITY: usize = DEFAULT_CAPACITY> {
    pub to_consumer: RingChannel<CAPACITY>,
    pub to_producer: RingChannel<CAPACITY>,
}

impl<const CAPACITY: usize> DuplexChannel<CAPACITY> {
    /// Zeroes both rings' indices.
    ///
    /// Call once per region lifetime, before either side starts on it.
    pub fn init(&self) {
        self.to_consumer.reset();
        self.to_producer.reset();
    }

    /// Poisons all four indices. See [`RingChannel::poison`].
    pub fn poison(&self) {
        self.to_consumer.poison();
        self.to_producer.poison();
    }

    pub fn is_poisoned(&self) -> bool {
        self.to_consumer.is_poisoned() || self.to_producer.is_poisoned()
    }
}

// Atomics only; all-zero bytes are two empty rings.
unsafe impl<const CAPACITY: usize> ShmSafe for DuplexChannel<CAPACITY> {}

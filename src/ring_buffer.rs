use std::fmt::Debug;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

/// Default ring capacity, 64 KiB per direction.
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

/// Index value written into a ring at teardown.
///
/// It lies outside `[0, capacity)` for every valid capacity, so a ring
/// carrying it can never be mistaken for a live one.
pub const POISON: u32 = u32::MAX;

const ZERO_BYTE: AtomicU8 = AtomicU8::new(0);

/// Single-producer, single-consumer byte ring.
///
/// The layout is fixed and shared verbatim between both domains:
///
/// ```text
/// [ write_index: u32 | read_index: u32 | buffer: [u8; CAPACITY] ]
/// ```
///
/// # Full / empty
///
/// - **empty** iff `read_index == write_index`
/// - **full** iff `(write_index + 1) % CAPACITY == read_index`
///
/// One slot is always sacrificed, so at most `CAPACITY - 1` bytes are
/// pending at any time.
///
/// # Ownership of indices
///
/// `write_index` is only ever stored by the producing domain and
/// `read_index` only by the consuming domain. Each side publishes its own
/// index with `Release` and observes the other one with `Acquire`, which
/// orders the byte store before the index that makes it visible.
///
/// An index is published with a compare-exchange against the value its
/// owner last read. This never fails in normal operation and makes a
/// concurrent [`poison`](Self::poison) stick.
///
/// The ring itself has no lock. Two actors of the same domain touching the
/// same index must be serialized by the caller.
#[repr(C)]
pub struct RingChannel<const CAPACITY: usize = DEFAULT_CAPACITY> {
    write_index: AtomicU32,
    read_index: AtomicU32,
    buffer: [AtomicU8; CAPACITY],
}

impl<const CAPACITY: usize> RingChannel<CAPACITY> {
    const VALID_CAPACITY: () = assert!(
        CAPACITY >= 2 && CAPACITY < POISON as usize,
        "ring capacity must be in [2, u32::MAX)"
    );

    /// Creates an empty ring with both indices at zero.
    ///
    /// Rings that live in a mapped region are not built with this; they
    /// start out as zeroed memory, which is an equally valid empty ring.
    pub fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_CAPACITY;
        Self {
            write_index: AtomicU32::new(0),
            read_index: AtomicU32::new(0),
            buffer: [ZERO_BYTE; CAPACITY],
        }
    }

    /// Total number of slots, including the sacrificed one.
    #[inline(always)]
    pub const fn capacity(&self) -> usize {
        CAPACITY
    }

    /// Maximum number of bytes that can be pending at once.
    #[inline(always)]
    pub const fn usable_capacity(&self) -> usize {
        CAPACITY - 1
    }

    /// Resets both indices to zero.
    ///
    /// Only valid while neither domain is operating on the ring.
    pub fn reset(&self) {
        #[allow(clippy::let_unit_value)]
        let () = Self::VALID_CAPACITY;
        self.write_index.store(0, Ordering::Release);
        self.read_index.store(0, Ordering::Release);
    }

    /// Writes [`POISON`] into both indices.
    ///
    /// Every later push or pop sees the ring as dead and touches nothing.
    pub fn poison(&self) {
        self.write_index.store(POISON, Ordering::SeqCst);
        self.read_index.store(POISON, Ordering::SeqCst);
    }

    /// Returns `true` if either index is outside `[0, CAPACITY)`.
    #[inline(always)]
    pub fn is_poisoned(&self) -> bool {
        let (write, read) = self.indices();
        !Self::in_range(write) || !Self::in_range(read)
    }

    /// Returns `(write_index, read_index)` as currently published.
    #[inline(always)]
    pub fn indices(&self) -> (u32, u32) {
        (
            self.write_index.load(Ordering::Acquire),
            self.read_index.load(Ordering::Acquire),
        )
    }

    /// Number of bytes currently pending.
    pub fn len(&self) -> usize {
        let (write, read) = self.indices();
        if !Self::in_range(write) || !Self::in_range(read) {
            return 0;
        }
        (write as usize + CAPACITY - read as usize) % CAPACITY
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        let (write, read) = self.indices();
        write == read
    }

    /// Readiness view of the ring: `true` while at least one byte is pending.
    #[inline(always)]
    pub fn is_readable(&self) -> bool {
        !self.is_empty() && !self.is_poisoned()
    }

    pub fn is_full(&self) -> bool {
        let (write, read) = self.indices();
        Self::in_range(write) && Self::in_range(read) && Self::advance(write) == read
    }

    /// Appends one byte.
    ///
    /// Returns `false` and leaves the ring untouched when it is full (or
    /// poisoned). The caller owns the drop-on-full decision; nothing here
    /// blocks or retries.
    #[inline(always)]
    pub fn try_push(&self, byte: u8) -> bool {
        let write = self.write_index.load(Ordering::Relaxed);
        let read = self.read_index.load(Ordering::Acquire);
        if !Self::in_range(write) || !Self::in_range(read) {
            return false;
        }
        let next = Self::advance(write);
        if next == read {
            return false;
        }
        self.buffer[write as usize].store(byte, Ordering::Relaxed);
        Self::publish(&self.write_index, write, next)
    }

    /// Removes the oldest byte, or returns `None` when there is nothing to read.
    #[inline(always)]
    pub fn try_pop(&self) -> Option<u8> {
        let read = self.read_index.load(Ordering::Relaxed);
        let write = self.write_index.load(Ordering::Acquire);
        if read == write || !Self::in_range(write) || !Self::in_range(read) {
            return None;
        }
        let byte = self.buffer[read as usize].load(Ordering::Relaxed);
        Self::publish(&self.read_index, read, Self::advance(read)).then_some(byte)
    }

    /// Pushes bytes from `src` in order until it is exhausted or the ring
    /// fills up. Returns the number of bytes accepted.
    pub fn push_from(&self, src: &[u8]) -> usize {
        let mut pushed = 0;
        for &byte in src {
            if !self.try_push(byte) {
                break;
            }
            pushed += 1;
        }
        pushed
    }

    /// Drains up to `dst.len()` bytes against a single snapshot of the write
    /// index and publishes the read index once.
    ///
    /// The pending range is copied as at most two contiguous segments: from
    /// `read_index` towards the end of the buffer, then from slot zero when
    /// the data wraps around. Bytes pushed after the snapshot stay in the
    /// ring for the next call.
    pub fn pop_into(&self, dst: &mut [u8]) -> usize {
        let read = self.read_index.load(Ordering::Relaxed);
        let write = self.write_index.load(Ordering::Acquire);
        if read == write || !Self::in_range(write) || !Self::in_range(read) {
            return 0;
        }
        let (read, write) = (read as usize, write as usize);

        let (first, second) = if read < write {
            (read..write, 0..0)
        } else {
            (read..CAPACITY, 0..write)
        };

        let mut copied = 0;
        for segment in [first, second] {
            let take = segment.len().min(dst.len() - copied);
            for (slot, out) in self.buffer[segment.start..segment.start + take]
                .iter()
                .zip(&mut dst[copied..copied + take])
            {
                *out = slot.load(Ordering::Relaxed);
            }
            copied += take;
        }

        let next = ((read + copied) % CAPACITY) as u32;
        if copied == 0 || !Self::publish(&self.read_index, read as u32, next) {
            return 0;
        }
        copied
    }

    /// Moves an owned index from `current` to `next`.
    ///
    /// The owner is the only regular writer, so this fails only if the ring
    /// was poisoned in between; the poison then stays in place.
    #[inline(always)]
    fn publish(index: &AtomicU32, current: u32, next: u32) -> bool {
        index
            .compare_exchange(current, next, Ordering::Release, Ordering::Relaxed)
            .is_ok()
    }

    #[inline(always)]
    fn advance(index: u32) -> u32 {
        ((index as usize + 1) % CAPACITY) as u32
    }

    #[inline(always)]
    fn in_range(index: u32) -> bool {
        (index as usize) < CAPACITY
    }
}

impl<const CAPACITY: usize> Default for RingChannel<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAPACITY: usize> Debug for RingChannel<CAPACITY> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (write_index, read_index) = self.indices();
        f.debug_struct("RingChannel")
            .field("capacity", &CAPACITY)
            .field("write_index", &write_index)
            .field("read_index", &read_index)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::VecDeque;

    #[test]
    fn layout_is_two_indices_then_bytes() {
        assert_eq!(std::mem::size_of::<RingChannel<4>>(), 8 + 4);
        assert_eq!(std::mem::size_of::<RingChannel<DEFAULT_CAPACITY>>(), 8 + DEFAULT_CAPACITY);
        assert_eq!(std::mem::align_of::<RingChannel<4>>(), 4);
    }

    #[test]
    fn capacity_four_scenario() {
        let ring = RingChannel::<4>::new();
        assert_eq!(ring.usable_capacity(), 3);

        assert!(ring.try_push(b'A'));
        assert!(ring.try_push(b'B'));
        assert!(ring.try_push(b'C'));
        assert!(ring.is_full());
        assert!(!ring.try_push(b'D'), "fourth push must fail on a 4-slot ring");

        assert_eq!(ring.try_pop(), Some(b'A'));
        assert!(ring.try_push(b'D'), "one slot freed, push must succeed");

        assert_eq!(ring.try_pop(), Some(b'B'));
        assert_eq!(ring.try_pop(), Some(b'C'));
        assert_eq!(ring.try_pop(), Some(b'D'));
        assert_eq!(ring.try_pop(), None);
        assert!(ring.is_empty());
    }

    #[test]
    fn push_on_full_leaves_ring_unchanged() {
        let ring = RingChannel::<8>::new();
        for b in 0..7 {
            assert!(ring.try_push(b));
        }
        let before = ring.indices();
        for _ in 0..3 {
            assert!(!ring.try_push(0xEE));
            assert_eq!(ring.indices(), before);
        }
        assert_eq!(ring.len(), 7);
        for b in 0..7 {
            assert_eq!(ring.try_pop(), Some(b));
        }
    }

    #[test]
    fn pop_on_empty_leaves_indices_unchanged() {
        let ring = RingChannel::<8>::new();
        assert!(ring.try_push(1));
        assert!(ring.try_push(2));
        ring.try_pop();
        ring.try_pop();
        let before = ring.indices();
        assert_eq!(ring.try_pop(), None);
        assert_eq!(ring.try_pop(), None);
        assert_eq!(ring.indices(), before);
        assert!(!ring.is_readable());
    }

    #[test]
    fn sequence_tags_roundtrip_through_wrap() {
        let ring = RingChannel::<512>::new();
        let tags: Vec<u8> = (1..=254u8).chain(1..=254u8).collect();
        assert_eq!(tags.len(), 508);

        for &t in &tags {
            assert!(ring.try_push(t));
        }
        let popped: Vec<u8> = std::iter::from_fn(|| ring.try_pop()).collect();
        assert_eq!(popped, tags);
    }

    #[test]
    fn indices_wrap_modulo_capacity() {
        let ring = RingChannel::<5>::new();
        for round in 0..20u8 {
            assert!(ring.try_push(round));
            assert!(ring.try_push(round.wrapping_add(100)));
            assert_eq!(ring.try_pop(), Some(round));
            assert_eq!(ring.try_pop(), Some(round.wrapping_add(100)));
            let (write, read) = ring.indices();
            assert!(write < 5 && read < 5);
            assert_eq!(write, read);
        }
    }

    #[test]
    fn push_from_stops_at_full() {
        let ring = RingChannel::<4>::new();
        assert_eq!(ring.push_from(&[9, 8, 7, 6, 5]), 3);
        assert!(ring.is_full());
    }

    #[test]
    fn pop_into_reads_both_segments_after_wrap() {
        let ring = RingChannel::<8>::new();
        // Move both indices near the end so the next batch wraps.
        assert_eq!(ring.push_from(&[0; 6]), 6);
        let mut sink = [0u8; 6];
        assert_eq!(ring.pop_into(&mut sink), 6);
        assert_eq!(ring.indices(), (6, 6));

        assert_eq!(ring.push_from(&[1, 2, 3, 4, 5]), 5);
        let (write, read) = ring.indices();
        assert!(write < read, "data must straddle the end of the buffer");

        let mut out = [0u8; 16];
        assert_eq!(ring.pop_into(&mut out), 5);
        assert_eq!(&out[..5], &[1, 2, 3, 4, 5]);
        assert!(ring.is_empty());
    }

    #[test]
    fn pop_into_respects_destination_length() {
        let ring = RingChannel::<8>::new();
        ring.push_from(&[10, 11, 12, 13]);
        let mut out = [0u8; 3];
        assert_eq!(ring.pop_into(&mut out), 3);
        assert_eq!(out, [10, 11, 12]);
        assert_eq!(ring.try_pop(), Some(13));
        assert_eq!(ring.pop_into(&mut out), 0);
    }

    #[test]
    fn poisoned_ring_refuses_all_access() {
        let ring = RingChannel::<8>::new();
        ring.push_from(&[1, 2, 3]);
        ring.poison();
        assert!(ring.is_poisoned());
        assert!(!ring.try_push(4));
        assert_eq!(ring.try_pop(), None);
        assert_eq!(ring.pop_into(&mut [0u8; 4]), 0);
        assert!(!ring.is_readable());
        assert_eq!(ring.indices(), (POISON, POISON));

        ring.reset();
        assert!(!ring.is_poisoned());
        assert!(ring.is_empty());
    }

    #[test]
    fn poison_cannot_be_overwritten_by_a_stale_owner() {
        let ring = RingChannel::<8>::new();
        ring.push_from(&[1, 2]);
        let (write, read) = ring.indices();
        ring.poison();
        assert!(!RingChannel::<8>::publish(&ring.read_index, read, read + 1));
        assert!(!RingChannel::<8>::publish(&ring.write_index, write, write + 1));
        assert_eq!(ring.indices(), (POISON, POISON));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push(u8),
        Pop,
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![any::<u8>().prop_map(Op::Push), Just(Op::Pop)]
    }

    proptest! {
        #[test]
        fn behaves_like_a_bounded_fifo(ops in proptest::collection::vec(arb_op(), 0..400)) {
            let ring = RingChannel::<16>::new();
            let mut model = VecDeque::new();

            for op in ops {
                match op {
                    Op::Push(b) => {
                        let accepted = ring.try_push(b);
                        prop_assert_eq!(accepted, model.len() < 15);
                        if accepted {
                            model.push_back(b);
                        }
                    }
                    Op::Pop => prop_assert_eq!(ring.try_pop(), model.pop_front()),
                }
                prop_assert_eq!(ring.len(), model.len());
            }

            let rest: Vec<u8> = std::iter::from_fn(|| ring.try_pop()).collect();
            prop_assert_eq!(rest, Vec::from(model));
        }
    }
}

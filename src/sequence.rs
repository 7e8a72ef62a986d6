//! Cyclic sequence tags embedded in the byte stream.
//!
//! Every transmitted byte is the sender's next tag. Tags run `1..=254` and
//! wrap back to `1`; `0` and `255` never appear on the wire. The receiver
//! advances its own copy of the counter with the same rule and compares.
//!
//! There is no resynchronization: after one lost or corrupted byte the two
//! counters stay out of phase and every following byte is reported too,
//! until one side is restarted.

use crate::error::SequenceMismatch;

/// First tag value emitted after a reset.
pub const FIRST_TAG: u8 = 1;
/// Last tag value before wrapping back to [`FIRST_TAG`].
pub const LAST_TAG: u8 = 254;

/// Running tag counter for one direction.
///
/// Starts at the conceptual value `0`, so the first emitted tag is `1`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequenceTag(u8);

impl SequenceTag {
    pub const fn new() -> Self {
        Self(0)
    }

    /// The most recently emitted tag, or `0` if none has been emitted.
    #[inline(always)]
    pub const fn current(self) -> u8 {
        self.0
    }

    /// The tag [`advance`](Self::advance) would produce, without advancing.
    #[inline(always)]
    pub const fn peek(self) -> u8 {
        if self.0 >= LAST_TAG {
            FIRST_TAG
        } else {
            self.0 + 1
        }
    }

    /// Moves to the next tag and returns it.
    #[inline(always)]
    pub fn advance(&mut self) -> u8 {
        self.0 = self.peek();
        self.0
    }
}

/// Receiver-side predictor for the peer's tag stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct SequenceChecker {
    expected: SequenceTag,
    received: u64,
    mismatches: u64,
}

impl SequenceChecker {
    pub const fn new() -> Self {
        Self {
            expected: SequenceTag::new(),
            received: 0,
            mismatches: 0,
        }
    }

    /// Advances the prediction by one and compares it with `byte`.
    ///
    /// The prediction advances whether or not the byte matches.
    #[inline]
    pub fn check(&mut self, byte: u8) -> Result<(), SequenceMismatch> {
        let expected = self.expected.advance();
        self.received += 1;
        if byte == expected {
            Ok(())
        } else {
            self.mismatches += 1;
            Err(SequenceMismatch {
                expected,
                received: byte,
            })
        }
    }

    /// Number of bytes checked so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Number of bytes that did not match the prediction.
    pub fn mismatches(&self) -> u64 {
        self.mismatches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tag_is_one() {
        let mut tag = SequenceTag::new();
        assert_eq!(tag.current(), 0);
        assert_eq!(tag.advance(), 1);
        assert_eq!(tag.advance(), 2);
    }

    #[test]
    fn wraps_from_254_to_1() {
        let mut tag = SequenceTag::new();
        let emitted: Vec<u8> = (0..256).map(|_| tag.advance()).collect();
        assert_eq!(emitted[253], 254);
        assert_eq!(emitted[254], 1);
        assert_eq!(emitted[255], 2);
        assert!(emitted.iter().all(|&t| t != 0 && t != 255));
    }

    #[test]
    fn peek_does_not_advance() {
        let mut tag = SequenceTag::new();
        for _ in 0..254 {
            tag.advance();
        }
        assert_eq!(tag.peek(), 1);
        assert_eq!(tag.current(), 254);
    }

    #[test]
    fn checker_accepts_matching_stream() {
        let mut sender = SequenceTag::new();
        let mut checker = SequenceChecker::new();
        for _ in 0..1000 {
            assert!(checker.check(sender.advance()).is_ok());
        }
        assert_eq!(checker.received(), 1000);
        assert_eq!(checker.mismatches(), 0);
    }

    #[test]
    fn one_lost_byte_keeps_the_stream_out_of_phase() {
        let mut sender = SequenceTag::new();
        let mut checker = SequenceChecker::new();

        assert!(checker.check(sender.advance()).is_ok());
        sender.advance(); // lost in transit

        let err = checker.check(sender.advance()).unwrap_err();
        assert_eq!(err, SequenceMismatch { expected: 2, received: 3 });

        for _ in 0..10 {
            assert!(checker.check(sender.advance()).is_err());
        }
        assert_eq!(checker.mismatches(), 11);
    }
}

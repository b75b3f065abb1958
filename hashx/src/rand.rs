//! The keyed random source driving program generation.
use crate::siphash::{SipState, siphash13_ctr};

/// A stream of 64-bit values from SipHash-1-3 in counter mode.
#[derive(Debug, Clone)]
pub(crate) struct SipRand {
    key: SipState,
    counter: u64,
}

impl SipRand {
    /// Creates a stream for `key`.
    ///
    /// `salt` selects a disjoint part of the counter space, generation attempt `n` uses salt `n`.
    pub(crate) fn new(key: SipState, salt: u32) -> Self {
        Self {
            key,
            counter: u64::from(salt) << 32,
        }
    }

    pub(crate) const fn next_u64(&mut self) -> u64 {
        let value = siphash13_ctr(self.key, self.counter);
        self.counter = self.counter.wrapping_add(1);
        value
    }
}

/// Leftover parts of a 64-bit word, handed out low part first.
#[derive(Debug, Default, Clone)]
struct RngBuffer {
    word: u64,
    remaining: u32,
}

impl RngBuffer {
    const fn next(&mut self, rng: &mut SipRand, bits: u32) -> u64 {
        if self.remaining == 0 {
            self.word = rng.next_u64();
            self.remaining = u64::BITS / bits;
        }

        let value = self.word & ((1 << bits) - 1);
        self.word >>= bits;
        self.remaining -= 1;
        value
    }
}

/// Byte and 32-bit word source used by the program generator.
///
/// Bytes and words are buffered separately, so drawing one never disturbs the other.
#[derive(Debug, Clone)]
pub(crate) struct RandomSource {
    rng: SipRand,
    u8_buffer: RngBuffer,
    u32_buffer: RngBuffer,
}

impl RandomSource {
    pub(crate) fn new(key: SipState, salt: u32) -> Self {
        Self {
            rng: SipRand::new(key, salt),
            u8_buffer: RngBuffer::default(),
            u32_buffer: RngBuffer::default(),
        }
    }

    #[expect(clippy::cast_possible_truncation, reason = "masked to 8 bits")]
    pub(crate) const fn next_u8(&mut self) -> u8 {
        self.u8_buffer.next(&mut self.rng, u8::BITS) as u8
    }

    #[expect(clippy::cast_possible_truncation, reason = "masked to 32 bits")]
    pub(crate) const fn next_u32(&mut self) -> u32 {
        self.u32_buffer.next(&mut self.rng, u32::BITS) as u32
    }

    /// Picks one item from `options` with `next_u8`.
    pub(crate) fn select_u8<T: Copy>(&mut self, options: &[T]) -> T {
        options[usize::from(self.next_u8()) % options.len()]
    }

    /// Draws `next_u32` values until one is nonzero after `mask`.
    pub(crate) const fn select_nonzero_u32(&mut self, mask: u32) -> u32 {
        loop {
            let value = self.next_u32() & mask;
            if value != 0 {
                return value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const KEY: SipState = SipState::from_words([1, 2, 3, 4]);

    #[test]
    fn bytes_come_low_first() {
        let word = SipRand::new(KEY, 0).next_u64();
        let mut source = RandomSource::new(KEY, 0);

        let bytes: Vec<u8> = (0..8).map(|_| source.next_u8()).collect();
        assert_eq!(bytes, word.to_le_bytes());
    }

    #[test]
    fn words_and_bytes_are_buffered_separately() {
        let mut rng = SipRand::new(KEY, 0);
        let first = rng.next_u64();
        let second = rng.next_u64();

        let mut source = RandomSource::new(KEY, 0);
        assert_eq!(source.next_u8(), first.to_le_bytes()[0]);
        // The word buffer is empty, so it pulls a fresh value from the stream.
        assert_eq!(u64::from(source.next_u32()), second & 0xffff_ffff);
        assert_eq!(u64::from(source.next_u32()), second >> 32);
        assert_eq!(source.next_u8(), first.to_le_bytes()[1]);
    }

    #[test]
    fn salt_changes_stream() {
        let mut a = RandomSource::new(KEY, 0);
        let mut b = RandomSource::new(KEY, 1);
        let a: Vec<u32> = (0..4).map(|_| a.next_u32()).collect();
        let b: Vec<u32> = (0..4).map(|_| b.next_u32()).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn nonzero_selection() {
        let mut source = RandomSource::new(KEY, 0);
        for _ in 0..1000 {
            let value = source.select_nonzero_u32(63);
            assert!((1..64).contains(&value));
        }
    }
}

//! The `SipHash` permutation and the two counter-mode constructions built on it.
//!
//! Neither construction is the standard `SipHash` MAC: the key is used directly as
//! the internal state and the input is a single 64-bit counter.

use blake2::{Blake2b512, Digest};

use crate::config::{INIT_TWEAK_HIGH, INIT_TWEAK_LOW, NUM_REGISTERS, RNG_TWEAK};

/// Internal state of one `SipHash` instance, also used as a 256-bit key.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct SipState {
    pub(crate) v0: u64,
    pub(crate) v1: u64,
    pub(crate) v2: u64,
    pub(crate) v3: u64,
}

impl SipState {
    /// Builds a state directly from four key words.
    pub const fn from_words(words: [u64; 4]) -> Self {
        Self {
            v0: words[0],
            v1: words[1],
            v2: words[2],
            v3: words[3],
        }
    }

    /// Returns the four key words of this state.
    pub const fn to_words(self) -> [u64; 4] {
        [self.v0, self.v1, self.v2, self.v3]
    }

    /// Builds a state from 32 little endian bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let word = |i: usize| {
            let mut w = [0; 8];
            w.copy_from_slice(&bytes[i * 8..(i + 1) * 8]);
            u64::from_le_bytes(w)
        };

        Self::from_words([word(0), word(1), word(2), word(3)])
    }

    /// Derives the program key and the register key from an arbitrary seed.
    ///
    /// The seed is hashed with BLAKE2b-512, the first half of the digest keys the program
    /// generator and the second half keys the register file init and digest.
    pub fn pair_from_seed(seed: &[u8]) -> (Self, Self) {
        let digest = Blake2b512::digest(seed);

        let mut program_key = [0; 32];
        let mut register_key = [0; 32];
        program_key.copy_from_slice(&digest[..32]);
        register_key.copy_from_slice(&digest[32..]);

        (
            Self::from_bytes(&program_key),
            Self::from_bytes(&register_key),
        )
    }

    /// One SipRound.
    #[inline(always)]
    pub(crate) const fn sip_round(&mut self) {
        self.v0 = self.v0.wrapping_add(self.v1);
        self.v2 = self.v2.wrapping_add(self.v3);
        self.v1 = self.v1.rotate_left(13);
        self.v3 = self.v3.rotate_left(16);
        self.v1 ^= self.v0;
        self.v3 ^= self.v2;
        self.v0 = self.v0.rotate_left(32);

        self.v2 = self.v2.wrapping_add(self.v1);
        self.v0 = self.v0.wrapping_add(self.v3);
        self.v1 = self.v1.rotate_left(17);
        self.v3 = self.v3.rotate_left(21);
        self.v1 ^= self.v2;
        self.v3 ^= self.v0;
        self.v2 = self.v2.rotate_left(32);
    }

    const fn rounds(&mut self, n: usize) {
        let mut i = 0;
        while i < n {
            self.sip_round();
            i += 1;
        }
    }
}

/// SipHash-1-3 style counter mode, one 64-bit output per counter value.
///
/// This is the stream behind [`crate::rand::SipRand`].
pub(crate) const fn siphash13_ctr(key: SipState, counter: u64) -> u64 {
    let mut s = key;
    s.v3 ^= counter;
    s.sip_round();
    s.v0 ^= counter;
    s.v2 ^= RNG_TWEAK;
    s.rounds(3);
    s.v0 ^ s.v1 ^ s.v2 ^ s.v3
}

/// SipHash-2-4 style counter mode expanded to the full 512-bit register file.
///
/// The lower half is the state after the usual 2 + 4 rounds, the upper half is
/// four more rounds after a second tweak.
pub(crate) const fn siphash24_ctr_state512(key: SipState, input: u64) -> [u64; NUM_REGISTERS] {
    let mut s = key;
    s.v1 ^= INIT_TWEAK_LOW;
    s.v3 ^= input;
    s.rounds(2);
    s.v0 ^= input;
    s.v2 ^= INIT_TWEAK_LOW;
    s.rounds(4);

    let low = s;

    s.v1 ^= INIT_TWEAK_HIGH;
    s.rounds(4);

    [low.v0, low.v1, low.v2, low.v3, s.v0, s.v1, s.v2, s.v3]
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    /// Plain SipHash-2-4 of the empty message, the permutation must match the reference vectors.
    fn siphash24_empty(k0: u64, k1: u64) -> u64 {
        let mut s = SipState::from_words([
            k0 ^ 0x736f_6d65_7073_6575,
            k1 ^ 0x646f_7261_6e64_6f6d,
            k0 ^ 0x6c79_6765_6e65_7261,
            k1 ^ 0x7465_6462_7974_6573,
        ]);
        let b = 0_u64;
        s.v3 ^= b;
        s.rounds(2);
        s.v0 ^= b;
        s.v2 ^= 0xff;
        s.rounds(4);
        s.v0 ^ s.v1 ^ s.v2 ^ s.v3
    }

    #[test]
    fn sip_round_reference_vector() {
        let k0 = u64::from_le_bytes(hex_literal::hex!("0001020304050607"));
        let k1 = u64::from_le_bytes(hex_literal::hex!("08090a0b0c0d0e0f"));

        assert_eq!(
            siphash24_empty(k0, k1).to_le_bytes(),
            hex_literal::hex!("310e0edd47db6f72")
        );
    }

    #[test]
    fn state512_halves_are_chained() {
        let key = SipState::from_words([1, 2, 3, 4]);
        let regs = siphash24_ctr_state512(key, 99);

        let mut s = key;
        s.v1 ^= 0xee;
        s.v3 ^= 99;
        s.rounds(2);
        s.v0 ^= 99;
        s.v2 ^= 0xee;
        s.rounds(4);
        assert_eq!(regs[..4], s.to_words());

        s.v1 ^= 0xdd;
        s.rounds(4);
        assert_eq!(regs[4..], s.to_words());
    }

    #[test]
    fn counter_modes_depend_on_input() {
        let key = SipState::from_words([0; 4]);

        assert_ne!(siphash13_ctr(key, 0), siphash13_ctr(key, 1));
        assert_ne!(
            siphash24_ctr_state512(key, 0),
            siphash24_ctr_state512(key, 1)
        );
        assert_eq!(siphash13_ctr(key, 7), siphash13_ctr(key, 7));
    }

    #[test]
    fn seed_pair_is_split_digest() {
        let (program, register) = SipState::pair_from_seed(b"hashx seed");
        let digest = Blake2b512::digest(b"hashx seed");

        assert_eq!(program.v0.to_le_bytes(), digest[0..8]);
        assert_eq!(register.v3.to_le_bytes(), digest[56..64]);
        assert_ne!(program, register);
    }
}

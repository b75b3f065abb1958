//! Registers of the virtual CPU.
use std::fmt;

use crate::{
    config::{NUM_REGISTERS, VECTOR_LANES},
    siphash::{SipState, siphash24_ctr_state512},
};

/// One of the 8 general purpose registers.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RegisterId {
    R0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
}

impl RegisterId {
    /// Every register, in index order.
    pub const ALL: [Self; NUM_REGISTERS] = [
        Self::R0,
        Self::R1,
        Self::R2,
        Self::R3,
        Self::R4,
        Self::R5,
        Self::R6,
        Self::R7,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub(crate) const fn bit(self) -> u8 {
        1 << self.index()
    }
}

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.index())
    }
}

/// A set of registers, used to narrow down register choices during generation.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub(crate) struct RegisterSet(u8);

impl RegisterSet {
    pub(crate) const fn all() -> Self {
        Self(u8::MAX)
    }

    /// Keeps only the registers for which `f` returns `true`.
    pub(crate) fn filter(self, mut f: impl FnMut(RegisterId) -> bool) -> Self {
        let mut bits = 0;
        for reg in RegisterId::ALL {
            if self.contains(reg) && f(reg) {
                bits |= reg.bit();
            }
        }
        Self(bits)
    }

    pub(crate) const fn contains(self, reg: RegisterId) -> bool {
        self.0 & reg.bit() != 0
    }

    pub(crate) const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Returns the `n`th register of the set in index order.
    pub(crate) fn nth(self, n: usize) -> Option<RegisterId> {
        RegisterId::ALL
            .into_iter()
            .filter(|reg| self.contains(*reg))
            .nth(n)
    }
}

/// The register file of one lane.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
#[repr(C)]
pub struct RegisterFile(pub [u64; NUM_REGISTERS]);

impl RegisterFile {
    /// Initializes the registers for `input` under `key`.
    pub const fn new(key: SipState, input: u64) -> Self {
        Self(siphash24_ctr_state512(key, input))
    }

    pub const fn get(&self, reg: RegisterId) -> u64 {
        self.0[reg.index()]
    }

    pub const fn set(&mut self, reg: RegisterId, value: u64) {
        self.0[reg.index()] = value;
    }

    /// Applies `op` to the value of `dst`.
    pub(crate) fn apply_to_dst(&mut self, dst: RegisterId, op: impl FnOnce(u64) -> u64) {
        self.set(dst, op(self.get(dst)));
    }

    /// Applies `op` to the values of `dst` and `src`, writing the result to `dst`.
    pub(crate) fn apply_to_dst_with_src(
        &mut self,
        dst: RegisterId,
        src: RegisterId,
        op: impl FnOnce(u64, u64) -> u64,
    ) {
        self.set(dst, op(self.get(dst), self.get(src)));
    }

    /// Folds the registers back down to a 64-bit digest.
    pub const fn digest(&self, key: SipState) -> u64 {
        let r = &self.0;
        let mut x = SipState::from_words([
            r[0].wrapping_add(key.v0),
            r[1].wrapping_add(key.v1),
            r[2],
            r[3],
        ]);
        let mut y = SipState::from_words([
            r[4],
            r[5],
            r[6].wrapping_add(key.v2),
            r[7].wrapping_add(key.v3),
        ]);
        x.sip_round();
        y.sip_round();
        x.v0 ^ y.v0
    }
}

/// Register files of all vector lanes, interleaved register-major.
///
/// Word `reg * VECTOR_LANES + lane` holds register `reg` of `lane`, so one 512-bit load
/// picks up a register across every lane.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(C, align(64))]
pub struct VectorRegisterFile(pub [u64; NUM_REGISTERS * VECTOR_LANES]);

impl Default for VectorRegisterFile {
    fn default() -> Self {
        Self([0; NUM_REGISTERS * VECTOR_LANES])
    }
}

impl VectorRegisterFile {
    /// Packs one register file per lane.
    pub fn from_lanes(lanes: &[RegisterFile; VECTOR_LANES]) -> Self {
        let mut file = Self::default();
        for (lane, regs) in lanes.iter().enumerate() {
            file.set_lane(lane, regs);
        }
        file
    }

    pub fn set_lane(&mut self, lane: usize, regs: &RegisterFile) {
        for (reg, value) in regs.0.iter().enumerate() {
            self.0[reg * VECTOR_LANES + lane] = *value;
        }
    }

    pub fn lane(&self, lane: usize) -> RegisterFile {
        let mut regs = RegisterFile::default();
        for (reg, value) in regs.0.iter_mut().enumerate() {
            *value = self.0[reg * VECTOR_LANES + lane];
        }
        regs
    }
}

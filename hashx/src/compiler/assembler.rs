//! A code buffer with relative jumps and a trailing constant pool.
use indexmap::IndexSet;

/// Filler between the code and the constant pool, `int3`.
const PADDING: u8 = 0xcc;

/// A rel32 field waiting for its target.
#[must_use = "an unbound jump lands on its own displacement"]
#[derive(Debug, Copy, Clone)]
pub(crate) struct ForwardJump(usize);

/// Accumulates machine code, then appends the constants it referenced.
///
/// Every pool entry holds its constant `lanes` times over and is aligned to its own size,
/// so vector code can use an entry as a full width memory operand.
#[derive(Debug)]
pub(crate) struct Assembler {
    code: Vec<u8>,
    constants: IndexSet<u64>,
    lanes: usize,
    /// `(rel32 position, constant index)`
    pool_refs: Vec<(usize, usize)>,
}

impl Assembler {
    pub(crate) fn new(lanes: usize) -> Self {
        debug_assert!(lanes.is_power_of_two());
        Self {
            code: Vec::new(),
            constants: IndexSet::new(),
            lanes,
            pool_refs: Vec::new(),
        }
    }

    /// The offset the next instruction will be emitted at.
    pub(crate) const fn offset(&self) -> usize {
        self.code.len()
    }

    pub(crate) fn emit(&mut self, bytes: &[u8]) {
        self.code.extend_from_slice(bytes);
    }

    /// Emits an instruction whose last four bytes address the pool entry for `value`.
    pub(crate) fn emit_with_constant(&mut self, bytes: &[u8], value: u64) {
        self.emit(bytes);
        let (index, _) = self.constants.insert_full(value);
        self.pool_refs.push((self.rel32_field(), index));
    }

    /// Emits a jump whose last four bytes are its displacement, to an already emitted `target`.
    pub(crate) fn emit_jump_to(&mut self, bytes: &[u8], target: usize) {
        self.emit(bytes);
        self.patch_rel32(self.rel32_field(), target);
    }

    /// Emits a jump to a location that does not exist yet, see [`Self::bind`].
    pub(crate) fn emit_forward_jump(&mut self, bytes: &[u8]) -> ForwardJump {
        self.emit(bytes);
        ForwardJump(self.rel32_field())
    }

    /// Points `jump` at the current offset.
    pub(crate) fn bind(&mut self, jump: ForwardJump) {
        self.patch_rel32(jump.0, self.offset());
    }

    const fn rel32_field(&self) -> usize {
        self.code.len() - size_of::<i32>()
    }

    fn patch_rel32(&mut self, at: usize, target: usize) {
        let rel = rel32(at + size_of::<i32>(), target);
        self.code[at..at + size_of::<i32>()].copy_from_slice(&rel.to_le_bytes());
    }

    /// Appends the constant pool and resolves every reference to it.
    pub(crate) fn finish(mut self) -> Vec<u8> {
        let entry_size = self.lanes * size_of::<u64>();
        let pool_start = self.code.len().next_multiple_of(entry_size);
        self.code.resize(pool_start, PADDING);

        for (at, index) in std::mem::take(&mut self.pool_refs) {
            self.patch_rel32(at, pool_start + index * entry_size);
        }

        for value in &self.constants {
            for _ in 0..self.lanes {
                self.code.extend_from_slice(&value.to_le_bytes());
            }
        }

        self.code
    }
}

/// The displacement from the end of an instruction at `from` to `to`.
fn rel32(from: usize, to: usize) -> i32 {
    let rel = if to >= from {
        i32::try_from(to - from)
    } else {
        i32::try_from(from - to).map(|distance| -distance)
    };

    rel.expect("generated code is far smaller than 2 GiB")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn rel_at(code: &[u8], at: usize) -> i32 {
        i32::from_le_bytes(code[at..at + 4].try_into().unwrap())
    }

    #[test]
    fn constants_are_shared() {
        let mut asm = Assembler::new(1);
        asm.emit_with_constant(&[0x90, 0, 0, 0, 0], 7);
        asm.emit_with_constant(&[0x90, 0, 0, 0, 0], 9);
        asm.emit_with_constant(&[0x90, 0, 0, 0, 0], 7);
        let code = asm.finish();

        // 15 bytes of code padded to 16, then two entries.
        assert_eq!(code.len(), 16 + 16);
        assert_eq!(code[15], PADDING);
        assert_eq!(rel_at(&code, 1), 16 - 5);
        assert_eq!(rel_at(&code, 6), 24 - 10);
        assert_eq!(rel_at(&code, 11), 16 - 15);
        assert_eq!(&code[16..24], &7_u64.to_le_bytes());
        assert_eq!(&code[24..32], &9_u64.to_le_bytes());
    }

    #[test]
    fn vector_entries_are_broadcast_and_aligned() {
        let mut asm = Assembler::new(8);
        asm.emit_with_constant(&[0x90, 0, 0, 0, 0], u64::MAX);
        let code = asm.finish();

        assert_eq!(code.len(), 64 + 64);
        assert_eq!(rel_at(&code, 1), 64 - 5);
        assert!(code[64..].iter().all(|&b| b == 0xff));
    }

    #[test]
    fn jumps() {
        let mut asm = Assembler::new(1);
        let start = asm.offset();
        asm.emit(&[0x90]);
        let forward = asm.emit_forward_jump(&[0x0f, 0x84, 0, 0, 0, 0]);
        asm.emit(&[0x90, 0x90]);
        asm.bind(forward);
        asm.emit_jump_to(&[0xe9, 0, 0, 0, 0], start);
        let code = asm.finish();

        assert_eq!(rel_at(&code, 3), 2);
        assert_eq!(rel_at(&code, 10), -14);
    }
}

//! x86-64 instruction encoders.
//!
//! Every encoder is a pure function from operands to bytes. Encoders taking a constant pool
//! operand emit a RIP-relative memory operand whose displacement is the last four bytes of
//! the instruction, left as zero for the assembler to patch.
use arrayvec::ArrayVec;

/// One encoded instruction, x86 instructions are at most 15 bytes long.
pub(crate) type Encoded = ArrayVec<u8, 15>;

/// General purpose registers, by hardware number.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Gpr {
    Rax = 0,
    Rcx,
    Rdx,
    Rbx,
    Rsp,
    Rbp,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

impl Gpr {
    /// The 3 bits that go into `ModRM` or SIB.
    const fn low(self) -> u8 {
        self as u8 & 7
    }

    /// The 4th bit, carried in a REX or VEX/EVEX prefix.
    const fn ext(self) -> u8 {
        (self as u8 >> 3) & 1
    }
}

/// A 512-bit vector register.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct Zmm(pub(crate) u8);

/// An AVX-512 opmask register.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct KReg(pub(crate) u8);

/// Two operand integer ALU operations, `dst = dst op src`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum AluOp {
    Add,
    Sub,
    Xor,
}

impl AluOp {
    /// The `r64, r/m64` form of the opcode.
    const fn opcode(self) -> u8 {
        match self {
            Self::Add => 0x03,
            Self::Sub => 0x2b,
            Self::Xor => 0x33,
        }
    }
}

const fn rex_w(r: u8, x: u8, b: u8) -> u8 {
    0x48 | (r << 2) | (x << 1) | b
}

const fn modrm(md: u8, reg: u8, rm: u8) -> u8 {
    (md << 6) | ((reg & 7) << 3) | (rm & 7)
}

/// `ModRM.rm` value selecting a RIP-relative disp32 operand when mod is 0.
const RM_RIP: u8 = 0b101;

/// `ModRM.rm` value announcing a SIB byte.
const RM_SIB: u8 = 0b100;

const RIP_PLACEHOLDER: [u8; 4] = [0; 4];

fn encoded(bytes: &[u8]) -> Encoded {
    bytes.iter().copied().collect()
}

/// Only needed for registers 8 and up in 32-bit operations.
fn optional_rex(r: Gpr, b: Gpr, out: &mut Encoded) {
    if r.ext() | b.ext() != 0 {
        out.push(0x40 | (r.ext() << 2) | b.ext());
    }
}

pub(crate) fn push(reg: Gpr) -> Encoded {
    let mut out = Encoded::new();
    optional_rex(Gpr::Rax, reg, &mut out);
    out.push(0x50 + reg.low());
    out
}

pub(crate) fn pop(reg: Gpr) -> Encoded {
    let mut out = Encoded::new();
    optional_rex(Gpr::Rax, reg, &mut out);
    out.push(0x58 + reg.low());
    out
}

pub(crate) fn ret() -> Encoded {
    encoded(&[0xc3])
}

/// `mov dst, src`
pub(crate) fn mov_rr(dst: Gpr, src: Gpr) -> Encoded {
    encoded(&[
        rex_w(dst.ext(), 0, src.ext()),
        0x8b,
        modrm(0b11, dst.low(), src.low()),
    ])
}

/// `mov dst, [base + disp]`
pub(crate) fn load(dst: Gpr, base: Gpr, disp: i8) -> Encoded {
    debug_assert_ne!(base.low(), RM_SIB, "base would need a SIB byte");
    encoded(&[
        rex_w(dst.ext(), 0, base.ext()),
        0x8b,
        modrm(0b01, dst.low(), base.low()),
        disp.to_le_bytes()[0],
    ])
}

/// `mov [base + disp], src`
pub(crate) fn store(base: Gpr, disp: i8, src: Gpr) -> Encoded {
    debug_assert_ne!(base.low(), RM_SIB, "base would need a SIB byte");
    encoded(&[
        rex_w(src.ext(), 0, base.ext()),
        0x89,
        modrm(0b01, src.low(), base.low()),
        disp.to_le_bytes()[0],
    ])
}

/// `op dst, src`
pub(crate) fn alu_rr(op: AluOp, dst: Gpr, src: Gpr) -> Encoded {
    encoded(&[
        rex_w(dst.ext(), 0, src.ext()),
        op.opcode(),
        modrm(0b11, dst.low(), src.low()),
    ])
}

/// `op dst, qword [rip + pool]`
pub(crate) fn alu_rip(op: AluOp, dst: Gpr) -> Encoded {
    let mut out = encoded(&[
        rex_w(dst.ext(), 0, 0),
        op.opcode(),
        modrm(0b00, dst.low(), RM_RIP),
    ]);
    out.extend(RIP_PLACEHOLDER);
    out
}

/// `imul dst, src`, the low half of the product.
pub(crate) fn imul_rr(dst: Gpr, src: Gpr) -> Encoded {
    encoded(&[
        rex_w(dst.ext(), 0, src.ext()),
        0x0f,
        0xaf,
        modrm(0b11, dst.low(), src.low()),
    ])
}

/// `mul src`, `rdx:rax = rax * src` unsigned.
pub(crate) fn mul(src: Gpr) -> Encoded {
    encoded(&[rex_w(0, 0, src.ext()), 0xf7, modrm(0b11, 4, src.low())])
}

/// `imul src`, `rdx:rax = rax * src` signed.
pub(crate) fn imul(src: Gpr) -> Encoded {
    encoded(&[rex_w(0, 0, src.ext()), 0xf7, modrm(0b11, 5, src.low())])
}

/// `lea dst, [dst + src * (1 << shift)]`
pub(crate) fn lea_shift(dst: Gpr, src: Gpr, shift: u8) -> Encoded {
    // rbp and r13 as a base with mod 0 would mean "no base".
    debug_assert_ne!(dst.low(), RM_RIP, "dst cannot be a SIB base");
    debug_assert_ne!(src, Gpr::Rsp, "rsp cannot be an index");
    debug_assert!(shift < 4);
    encoded(&[
        rex_w(dst.ext(), src.ext(), dst.ext()),
        0x8d,
        modrm(0b00, dst.low(), RM_SIB),
        modrm(shift, src.low(), dst.low()),
    ])
}

/// `ror dst, imm`
pub(crate) fn ror_imm(dst: Gpr, imm: u8) -> Encoded {
    encoded(&[
        rex_w(0, 0, dst.ext()),
        0xc1,
        modrm(0b11, 1, dst.low()),
        imm,
    ])
}

/// `xor dst32, src32`
pub(crate) fn xor32_rr(dst: Gpr, src: Gpr) -> Encoded {
    let mut out = Encoded::new();
    optional_rex(src, dst, &mut out);
    out.extend([0x31, modrm(0b11, src.low(), dst.low())]);
    out
}

/// `or dst32, src32`
pub(crate) fn or32_rr(dst: Gpr, src: Gpr) -> Encoded {
    let mut out = Encoded::new();
    optional_rex(src, dst, &mut out);
    out.extend([0x09, modrm(0b11, src.low(), dst.low())]);
    out
}

/// `or dst32, imm8` (sign extended)
pub(crate) fn or32_imm8(dst: Gpr, imm: i8) -> Encoded {
    let mut out = Encoded::new();
    optional_rex(Gpr::Rax, dst, &mut out);
    out.extend([0x83, modrm(0b11, 1, dst.low()), imm.to_le_bytes()[0]]);
    out
}

/// `test dword [rip + pool], src32`
pub(crate) fn test32_rip(src: Gpr) -> Encoded {
    let mut out = Encoded::new();
    optional_rex(src, Gpr::Rax, &mut out);
    out.extend([0x85, modrm(0b00, src.low(), RM_RIP)]);
    out.extend(RIP_PLACEHOLDER);
    out
}

/// `jnz rel8`
pub(crate) fn jnz_rel8(rel: i8) -> Encoded {
    encoded(&[0x75, rel.to_le_bytes()[0]])
}

/// `jz rel32`, the displacement is the last four bytes.
pub(crate) fn jz_rel32(rel: i32) -> Encoded {
    let mut out = encoded(&[0x0f, 0x84]);
    out.extend(rel.to_le_bytes());
    out
}

/// `jmp rel32`, the displacement is the last four bytes.
pub(crate) fn jmp_rel32(rel: i32) -> Encoded {
    let mut out = encoded(&[0xe9]);
    out.extend(rel.to_le_bytes());
    out
}

pub(crate) fn vzeroupper() -> Encoded {
    encoded(&[0xc5, 0xf8, 0x77])
}

/// Memory or register operand of a vector instruction.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum VecOperand {
    Reg(Zmm),
    /// A constant pool entry.
    Rip,
    /// `[base + disp32]`
    Mem(Gpr, i32),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum OpMap {
    Of = 0b01,
    Of38 = 0b10,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Prefix {
    P66 = 0b01,
    Pf3 = 0b10,
}

/// The fixed part of an EVEX encoded instruction, always 512 bits wide with `W1`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct EvexOp {
    map: OpMap,
    prefix: Prefix,
    opcode: u8,
}

const fn evex_op(map: OpMap, prefix: Prefix, opcode: u8) -> EvexOp {
    EvexOp {
        map,
        prefix,
        opcode,
    }
}

const VMOVDQA64: EvexOp = evex_op(OpMap::Of, Prefix::P66, 0x6f);
const VMOVDQU64_LOAD: EvexOp = evex_op(OpMap::Of, Prefix::Pf3, 0x6f);
const VMOVDQU64_STORE: EvexOp = evex_op(OpMap::Of, Prefix::Pf3, 0x7f);
const VPTESTNMQ: EvexOp = evex_op(OpMap::Of38, Prefix::Pf3, 0x27);

/// `dst = a op b` vector operations on 64-bit lanes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum VecBinOp {
    Addq,
    Subq,
    Xorq,
    Andq,
    /// Low 64 bits of the product.
    Mullq,
    /// Full product of the low 32 bits of each lane.
    Muludq,
}

impl VecBinOp {
    const fn evex(self) -> EvexOp {
        match self {
            Self::Addq => evex_op(OpMap::Of, Prefix::P66, 0xd4),
            Self::Subq => evex_op(OpMap::Of, Prefix::P66, 0xfb),
            Self::Xorq => evex_op(OpMap::Of, Prefix::P66, 0xef),
            Self::Andq => evex_op(OpMap::Of, Prefix::P66, 0xdb),
            Self::Mullq => evex_op(OpMap::Of38, Prefix::P66, 0x40),
            Self::Muludq => evex_op(OpMap::Of, Prefix::P66, 0xf4),
        }
    }
}

/// Shifts and rotates of 64-bit lanes by an immediate.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum VecShift {
    Sllq,
    Srlq,
    Sraq,
    Rorq,
}

impl VecShift {
    /// Opcode and the `ModRM.reg` extension.
    const fn evex(self) -> (EvexOp, u8) {
        match self {
            Self::Sllq => (evex_op(OpMap::Of, Prefix::P66, 0x73), 6),
            Self::Srlq => (evex_op(OpMap::Of, Prefix::P66, 0x73), 2),
            Self::Sraq => (evex_op(OpMap::Of, Prefix::P66, 0x72), 4),
            Self::Rorq => (evex_op(OpMap::Of, Prefix::P66, 0x72), 0),
        }
    }
}

/// Encodes an EVEX.512.W1 instruction.
///
/// `reg` is the full `ModRM.reg` operand number, `vvvv` the full second source number.
/// Masking always merges.
fn evex(
    op: EvexOp,
    reg: u8,
    vvvv: u8,
    rm: VecOperand,
    mask: Option<KReg>,
    imm: Option<u8>,
) -> Encoded {
    let (x, b) = match rm {
        VecOperand::Reg(zmm) => ((zmm.0 >> 4) & 1, (zmm.0 >> 3) & 1),
        VecOperand::Rip => (0, 0),
        VecOperand::Mem(base, _) => (0, base.ext()),
    };
    let r = (reg >> 3) & 1;
    let r_hi = (reg >> 4) & 1;
    let v_hi = (vvvv >> 4) & 1;

    let p0 =
        ((!r & 1) << 7) | ((!x & 1) << 6) | ((!b & 1) << 5) | ((!r_hi & 1) << 4) | op.map as u8;
    let p1 = 0x80 | ((!vvvv & 0xf) << 3) | 0b100 | op.prefix as u8;
    let p2 = (0b10 << 5) | ((!v_hi & 1) << 3) | mask.map_or(0, |k| k.0 & 7);

    let mut out = encoded(&[0x62, p0, p1, p2, op.opcode]);
    match rm {
        VecOperand::Reg(zmm) => out.push(modrm(0b11, reg, zmm.0)),
        VecOperand::Rip => {
            debug_assert!(imm.is_none(), "pool displacement must come last");
            out.push(modrm(0b00, reg, RM_RIP));
            out.extend(RIP_PLACEHOLDER);
        }
        VecOperand::Mem(base, disp) => {
            debug_assert_ne!(base.low(), RM_SIB, "base would need a SIB byte");
            out.push(modrm(0b10, reg, base.low()));
            out.extend(disp.to_le_bytes());
        }
    }
    if let Some(imm) = imm {
        out.push(imm);
    }
    out
}

/// `op dst{mask}, a, b`
pub(crate) fn vp_binary(
    op: VecBinOp,
    dst: Zmm,
    a: Zmm,
    b: VecOperand,
    mask: Option<KReg>,
) -> Encoded {
    evex(op.evex(), dst.0, a.0, b, mask, None)
}

/// `op dst{mask}, src, imm`
pub(crate) fn vp_shift_imm(
    op: VecShift,
    dst: Zmm,
    src: Zmm,
    imm: u8,
    mask: Option<KReg>,
) -> Encoded {
    let (evex_op, ext) = op.evex();
    evex(evex_op, ext, dst.0, VecOperand::Reg(src), mask, Some(imm))
}

/// `vmovdqa64 dst{mask}, src`
pub(crate) fn vmovdqa64(dst: Zmm, src: VecOperand, mask: Option<KReg>) -> Encoded {
    evex(VMOVDQA64, dst.0, 0, src, mask, None)
}

/// `vmovdqu64 dst, [base + disp]`
pub(crate) fn vmovdqu64_load(dst: Zmm, base: Gpr, disp: i32) -> Encoded {
    evex(
        VMOVDQU64_LOAD,
        dst.0,
        0,
        VecOperand::Mem(base, disp),
        None,
        None,
    )
}

/// `vmovdqu64 [base + disp], src`
pub(crate) fn vmovdqu64_store(base: Gpr, disp: i32, src: Zmm) -> Encoded {
    evex(
        VMOVDQU64_STORE,
        src.0,
        0,
        VecOperand::Mem(base, disp),
        None,
        None,
    )
}

/// `vptestnmq dst{mask}, a, b`, a lane bit is set where `a & b == 0`.
pub(crate) fn vptestnmq(dst: KReg, a: Zmm, b: VecOperand, mask: Option<KReg>) -> Encoded {
    evex(VPTESTNMQ, dst.0, a.0, b, mask, None)
}

/// Two byte VEX prefix payload for opmask instructions.
const fn vex2(vvvv: u8, l: u8) -> u8 {
    0x80 | ((!vvvv & 0xf) << 3) | (l << 2)
}

/// `kxnorw dst, a, b`
pub(crate) fn kxnorw(dst: KReg, a: KReg, b: KReg) -> Encoded {
    encoded(&[0xc5, vex2(a.0, 1), 0x46, modrm(0b11, dst.0, b.0)])
}

/// `kandnw dst, a, b`, `dst = !a & b`.
pub(crate) fn kandnw(dst: KReg, a: KReg, b: KReg) -> Encoded {
    encoded(&[0xc5, vex2(a.0, 1), 0x42, modrm(0b11, dst.0, b.0)])
}

/// `kortestw a, b`, ZF is set if `a | b == 0`.
pub(crate) fn kortestw(a: KReg, b: KReg) -> Encoded {
    encoded(&[0xc5, vex2(0, 0), 0x98, modrm(0b11, a.0, b.0)])
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use pretty_assertions::assert_eq;

    use super::*;

    #[track_caller]
    fn check(encoded: &Encoded, expected: &[u8]) {
        assert_eq!(encoded.as_slice(), expected);
    }

    #[test]
    fn general_purpose() {
        check(&push(Gpr::R12), &hex!("4154"));
        check(&pop(Gpr::R15), &hex!("415f"));
        check(&push(Gpr::Rbx), &hex!("53"));
        check(&ret(), &hex!("c3"));
        check(&mov_rr(Gpr::Rax, Gpr::R8), &hex!("498bc0"));
        check(&mov_rr(Gpr::R8, Gpr::Rdx), &hex!("4c8bc2"));
        check(&load(Gpr::R8, Gpr::Rdi, 0), &hex!("4c8b4700"));
        check(&store(Gpr::Rdi, 8, Gpr::R9), &hex!("4c894f08"));
        check(&alu_rr(AluOp::Add, Gpr::R8, Gpr::R9), &hex!("4d03c1"));
        check(&alu_rr(AluOp::Sub, Gpr::R10, Gpr::R15), &hex!("4d2bd7"));
        check(&alu_rr(AluOp::Xor, Gpr::Rax, Gpr::Rcx), &hex!("4833c1"));
        check(&imul_rr(Gpr::R10, Gpr::R11), &hex!("4d0fafd3"));
        check(&mul(Gpr::R9), &hex!("49f7e1"));
        check(&imul(Gpr::R9), &hex!("49f7e9"));
        check(&lea_shift(Gpr::R8, Gpr::R9, 3), &hex!("4f8d04c8"));
        check(&lea_shift(Gpr::R14, Gpr::R12, 0), &hex!("4f8d3426"));
        check(&ror_imm(Gpr::R15, 7), &hex!("49c1cf07"));
    }

    #[test]
    fn branch_helpers() {
        check(&xor32_rr(Gpr::Rdx, Gpr::Rdx), &hex!("31d2"));
        check(&or32_rr(Gpr::Rdx, Gpr::Rsi), &hex!("09f2"));
        check(&or32_imm8(Gpr::Rsi, -1), &hex!("83ceff"));
        check(&test32_rip(Gpr::Rdx), &hex!("851500000000"));
        check(&alu_rip(AluOp::Add, Gpr::R8), &hex!("4c030500000000"));
        check(&alu_rip(AluOp::Xor, Gpr::R13), &hex!("4c332d00000000"));
        check(&jnz_rel8(8), &hex!("7508"));
        check(&jz_rel32(0x10), &hex!("0f8410000000"));
        check(&jmp_rel32(-5), &hex!("e9fbffffff"));
        check(&vzeroupper(), &hex!("c5f877"));
    }

    #[test]
    fn evex() {
        let (z0, z1, z2, z9) = (Zmm(0), Zmm(1), Zmm(2), Zmm(9));
        let k1 = KReg(1);

        check(
            &vp_binary(VecBinOp::Addq, z0, z1, VecOperand::Reg(z2), None),
            &hex!("62f1f548d4c2"),
        );
        check(
            &vp_binary(VecBinOp::Addq, z0, z1, VecOperand::Reg(z2), Some(k1)),
            &hex!("62f1f549d4c2"),
        );
        check(
            &vp_binary(VecBinOp::Mullq, z0, z0, VecOperand::Reg(z1), None),
            &hex!("62f2fd4840c1"),
        );
        // Extended rm register clears EVEX.B.
        check(
            &vp_binary(VecBinOp::Xorq, z0, z0, VecOperand::Reg(z9), None),
            &hex!("62d1fd48efc1"),
        );
        // Extended destination clears EVEX.R.
        check(
            &vp_binary(VecBinOp::Subq, z9, z9, VecOperand::Reg(z0), None),
            &hex!("6271b548fbc8"),
        );
        check(
            &vp_shift_imm(VecShift::Srlq, z9, z0, 32, None),
            &hex!("62f1b54873d020"),
        );
        check(
            &vp_shift_imm(VecShift::Rorq, z0, z0, 5, None),
            &hex!("62f1fd4872c005"),
        );
        check(
            &vmovdqu64_load(z0, Gpr::Rdi, 0),
            &hex!("62f1fe486f8700000000"),
        );
        check(
            &vmovdqu64_store(Gpr::Rdi, 64, z1),
            &hex!("62f1fe487f8f40000000"),
        );
        check(
            &vptestnmq(k1, Zmm(8), VecOperand::Rip, Some(KReg(2))),
            &hex!("62f2be4a270d00000000"),
        );
    }

    #[test]
    fn opmask() {
        check(&kxnorw(KReg(1), KReg(1), KReg(1)), &hex!("c5f446c9"));
        check(&kxnorw(KReg(2), KReg(2), KReg(2)), &hex!("c5ec46d2"));
        check(&kortestw(KReg(1), KReg(1)), &hex!("c5f898c9"));
        check(&kandnw(KReg(2), KReg(1), KReg(2)), &hex!("c5f442d2"));
    }
}

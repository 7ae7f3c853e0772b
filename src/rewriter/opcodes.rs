//! CIL opcode constants and operand-kind classification.
//!
//! Opcodes are carried as `u16`: one-byte opcodes as their raw value, `0xFE`-prefixed
//! opcodes as `0xFE00 | second_byte`. The [`operand_kind`] table drives both decoding
//! of existing bodies and sizing/encoding on export.

/// Prefix byte introducing the two-byte opcode space.
pub const EXTENDED_PREFIX: u8 = 0xFE;

/// Opcode constants for the instructions the rewriter emits or treats specially.
#[allow(missing_docs)]
pub mod opcode {
    pub const NOP: u16 = 0x00;
    pub const LDARG_0: u16 = 0x02;
    pub const LDARG_1: u16 = 0x03;
    pub const LDARG_2: u16 = 0x04;
    pub const LDARG_3: u16 = 0x05;
    pub const LDARG_S: u16 = 0x0E;
    pub const LDNULL: u16 = 0x14;
    pub const LDC_I4: u16 = 0x20;
    pub const DUP: u16 = 0x25;
    pub const POP: u16 = 0x26;
    pub const CALL: u16 = 0x28;
    pub const RET: u16 = 0x2A;
    pub const BR_S: u16 = 0x2B;
    pub const BR: u16 = 0x38;
    pub const BRFALSE: u16 = 0x39;
    pub const SWITCH: u16 = 0x45;
    pub const LDIND_I1: u16 = 0x46;
    pub const LDIND_U1: u16 = 0x47;
    pub const LDIND_I2: u16 = 0x48;
    pub const LDIND_U2: u16 = 0x49;
    pub const LDIND_I4: u16 = 0x4A;
    pub const LDIND_U4: u16 = 0x4B;
    pub const LDIND_I8: u16 = 0x4C;
    pub const LDIND_I: u16 = 0x4D;
    pub const LDIND_R4: u16 = 0x4E;
    pub const LDIND_R8: u16 = 0x4F;
    pub const LDIND_REF: u16 = 0x50;
    pub const CALLVIRT: u16 = 0x6F;
    pub const LDOBJ: u16 = 0x71;
    pub const LDSTR: u16 = 0x72;
    pub const CASTCLASS: u16 = 0x74;
    pub const BOX: u16 = 0x8C;
    pub const NEWARR: u16 = 0x8D;
    pub const STELEM_REF: u16 = 0xA2;
    pub const UNBOX_ANY: u16 = 0xA5;
    pub const ENDFINALLY: u16 = 0xDC;
    pub const LEAVE: u16 = 0xDD;
    pub const LEAVE_S: u16 = 0xDE;
    pub const LDARG: u16 = 0xFE09;
    pub const LDLOC: u16 = 0xFE0C;
    pub const STLOC: u16 = 0xFE0E;
    pub const RETHROW: u16 = 0xFE1A;
}

/// The inline operand shape of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No inline operand
    None,
    /// 1-byte variable/argument index (`ldarg.s` family) or alignment (`unaligned.`)
    ShortVar,
    /// 2-byte variable/argument index (wide `ldarg` family)
    Var,
    /// 1-byte signed immediate (`ldc.i4.s`)
    ShortI,
    /// 4-byte signed immediate (`ldc.i4`)
    I,
    /// 8-byte signed immediate (`ldc.i8`)
    I8,
    /// 4-byte float immediate (`ldc.r4`)
    ShortR,
    /// 8-byte float immediate (`ldc.r8`)
    R,
    /// 4-byte metadata token
    Token,
    /// 1-byte relative branch target
    ShortBranch,
    /// 4-byte relative branch target
    Branch,
    /// `switch`: 4-byte count followed by that many 4-byte relative targets
    Switch,
}

/// Classifies the operand shape of `op`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for byte values that are not valid CIL
/// opcodes.
pub fn operand_kind(op: u16) -> crate::Result<OperandKind> {
    Ok(match op {
        // nop .. stloc.3, ldnull, ldc.i4.m1 .. ldc.i4.8, dup, pop, ret
        0x00..=0x0D | 0x14..=0x1E | 0x25 | 0x26 | 0x2A => OperandKind::None,
        // ldind/stind family, arithmetic, conversions, conv.r.un
        0x46..=0x66 | 0x67..=0x6E | 0x76 => OperandKind::None,
        // throw, ldlen, ldelem.*/stelem.* shorthand, conv.ovf family
        0x7A | 0x82..=0x8B | 0x8E | 0x90..=0xA2 | 0xB3..=0xBA => OperandKind::None,
        // ckfinite, conv.u2 .. sub.ovf.un, endfinally, stind.i, conv.u
        0xC3 | 0xD1..=0xDB | 0xDC | 0xDF | 0xE0 => OperandKind::None,

        // ldarg.s, ldarga.s, starg.s, ldloc.s, ldloca.s, stloc.s
        0x0E..=0x13 => OperandKind::ShortVar,

        0x1F => OperandKind::ShortI,
        0x20 => OperandKind::I,
        0x21 => OperandKind::I8,
        0x22 => OperandKind::ShortR,
        0x23 => OperandKind::R,

        // jmp, call, calli, callvirt, cpobj, ldobj, ldstr, newobj, castclass, isinst
        0x27..=0x29 | 0x6F..=0x75 => OperandKind::Token,
        // unbox, ldfld .. stobj, box, newarr, ldelema, ldelem, stelem, unbox.any
        0x79 | 0x7B..=0x81 | 0x8C | 0x8D | 0x8F | 0xA3..=0xA5 => OperandKind::Token,
        // refanyval, mkrefany, ldtoken
        0xC2 | 0xC6 | 0xD0 => OperandKind::Token,

        // br.s .. blt.un.s, leave.s
        0x2B..=0x37 | 0xDE => OperandKind::ShortBranch,
        // br .. blt.un, leave
        0x38..=0x44 | 0xDD => OperandKind::Branch,
        0x45 => OperandKind::Switch,

        // 0xFE-prefixed space
        // arglist, ceq .. clt.un, localloc, endfilter, volatile., tail.,
        // cpblk, initblk, rethrow, refanytype, readonly.
        0xFE00..=0xFE05 | 0xFE0F | 0xFE11 | 0xFE13 | 0xFE14 => OperandKind::None,
        0xFE17 | 0xFE18 | 0xFE1A | 0xFE1D | 0xFE1E => OperandKind::None,
        // ldftn, ldvirtftn, initobj, constrained., sizeof
        0xFE06 | 0xFE07 | 0xFE15 | 0xFE16 | 0xFE1C => OperandKind::Token,
        // ldarg .. stloc wide forms
        0xFE09..=0xFE0E => OperandKind::Var,
        // unaligned., no.
        0xFE12 | 0xFE19 => OperandKind::ShortVar,

        _ => return Err(malformed_error!("Invalid CIL opcode - {:#06x}", op)),
    })
}

/// Maps a short-form branch opcode to its 4-byte-target equivalent.
///
/// The importer widens every branch so that inserting instructions can never
/// overflow a 1-byte displacement.
#[must_use]
pub fn widen_branch(op: u16) -> u16 {
    match op {
        // br.s .. blt.un.s sit 13 below their long forms
        0x2B..=0x37 => op + 0x0D,
        opcode::LEAVE_S => opcode::LEAVE,
        _ => op,
    }
}

/// Encoded size of an opcode in bytes (1, or 2 for the `0xFE`-prefixed space).
#[must_use]
pub fn opcode_len(op: u16) -> usize {
    if op > 0xFF {
        2
    } else {
        1
    }
}

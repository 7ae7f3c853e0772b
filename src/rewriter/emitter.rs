//! Typed emission helpers over an [`IlRewriter`].
//!
//! An [`Emitter`] holds a cursor (either "before instruction X" or "append at
//! end") and provides one method per instruction shape the engine emits, picking
//! the shortest valid encoding where the instruction set offers several.

use crate::{
    metadata::{element::ELEMENT_TYPE, token::Token},
    rewriter::{
        ilrewriter::{IlRewriter, InstrId, Operand},
        opcodes::opcode,
    },
};

/// Where new instructions land.
#[derive(Debug, Clone, Copy)]
enum Cursor {
    /// Insert before the given instruction, preserving its id
    Before(InstrId),
    /// Append after the current last instruction
    End,
}

/// Instruction emitter with a fixed cursor.
pub struct Emitter<'r> {
    rewriter: &'r mut IlRewriter,
    cursor: Cursor,
}

impl<'r> Emitter<'r> {
    /// Emits before `before`; every emitted instruction precedes it in order.
    pub fn before(rewriter: &'r mut IlRewriter, before: InstrId) -> Self {
        Emitter {
            rewriter,
            cursor: Cursor::Before(before),
        }
    }

    /// Emits at the end of the instruction list.
    pub fn at_end(rewriter: &'r mut IlRewriter) -> Self {
        Emitter {
            rewriter,
            cursor: Cursor::End,
        }
    }

    /// Emits one instruction at the cursor.
    pub fn emit(&mut self, op: u16, operand: Operand) -> InstrId {
        match self.cursor {
            Cursor::Before(id) => self.rewriter.insert_before(id, op, operand),
            Cursor::End => self.rewriter.push_back(op, operand),
        }
    }

    /// `ldnull`
    pub fn load_null(&mut self) -> InstrId {
        self.emit(opcode::LDNULL, Operand::None)
    }

    /// `ldstr` of a user-string token
    pub fn load_str(&mut self, token: Token) -> InstrId {
        self.emit(opcode::LDSTR, Operand::Token(token))
    }

    /// `ldc.i4` (the widening importer means the long form is always safe)
    pub fn load_i4(&mut self, value: i32) -> InstrId {
        self.emit(opcode::LDC_I4, Operand::I32(value))
    }

    /// Argument load in its shortest encoding: `ldarg.0`-`ldarg.3`, `ldarg.s`,
    /// or wide `ldarg`.
    pub fn load_arg(&mut self, index: u16) -> InstrId {
        match index {
            0..=3 => self.emit(opcode::LDARG_0 + index, Operand::None),
            4..=255 => self.emit(opcode::LDARG_S, Operand::Var(index)),
            _ => self.emit(opcode::LDARG, Operand::Var(index)),
        }
    }

    /// Wide `ldloc`
    pub fn load_local(&mut self, index: u16) -> InstrId {
        self.emit(opcode::LDLOC, Operand::Var(index))
    }

    /// Wide `stloc`
    pub fn store_local(&mut self, index: u16) -> InstrId {
        self.emit(opcode::STLOC, Operand::Var(index))
    }

    /// `box` of a type token
    pub fn box_type(&mut self, token: Token) -> InstrId {
        self.emit(opcode::BOX, Operand::Token(token))
    }

    /// `unbox.any` of a type token
    pub fn unbox_any(&mut self, token: Token) -> InstrId {
        self.emit(opcode::UNBOX_ANY, Operand::Token(token))
    }

    /// `castclass` of a type token
    pub fn cast_class(&mut self, token: Token) -> InstrId {
        self.emit(opcode::CASTCLASS, Operand::Token(token))
    }

    /// `newarr` of an element type token
    pub fn new_array(&mut self, token: Token) -> InstrId {
        self.emit(opcode::NEWARR, Operand::Token(token))
    }

    /// `call` of a method token
    pub fn call(&mut self, token: Token) -> InstrId {
        self.emit(opcode::CALL, Operand::Token(token))
    }

    /// `callvirt` of a method token
    pub fn call_virt(&mut self, token: Token) -> InstrId {
        self.emit(opcode::CALLVIRT, Operand::Token(token))
    }

    /// `dup`
    pub fn dup(&mut self) -> InstrId {
        self.emit(opcode::DUP, Operand::None)
    }

    /// `stelem.ref`
    pub fn store_element_ref(&mut self) -> InstrId {
        self.emit(opcode::STELEM_REF, Operand::None)
    }

    /// `rethrow`
    pub fn rethrow(&mut self) -> InstrId {
        self.emit(opcode::RETHROW, Operand::None)
    }

    /// `endfinally`
    pub fn end_finally(&mut self) -> InstrId {
        self.emit(opcode::ENDFINALLY, Operand::None)
    }

    /// Dereference of a managed pointer: `ldind.*` for primitive kinds,
    /// `ldobj` when a value-type token is supplied, `ldind.ref` otherwise.
    pub fn load_indirect(&mut self, element_type: u8, value_token: Option<Token>) -> InstrId {
        let op = match element_type {
            ELEMENT_TYPE::BOOLEAN | ELEMENT_TYPE::I1 => opcode::LDIND_I1,
            ELEMENT_TYPE::U1 => opcode::LDIND_U1,
            ELEMENT_TYPE::I2 => opcode::LDIND_I2,
            ELEMENT_TYPE::CHAR | ELEMENT_TYPE::U2 => opcode::LDIND_U2,
            ELEMENT_TYPE::I4 => opcode::LDIND_I4,
            ELEMENT_TYPE::U4 => opcode::LDIND_U4,
            ELEMENT_TYPE::I8 | ELEMENT_TYPE::U8 => opcode::LDIND_I8,
            ELEMENT_TYPE::I | ELEMENT_TYPE::U => opcode::LDIND_I,
            ELEMENT_TYPE::R4 => opcode::LDIND_R4,
            ELEMENT_TYPE::R8 => opcode::LDIND_R8,
            _ => {
                return match value_token {
                    Some(token) => self.emit(opcode::LDOBJ, Operand::Token(token)),
                    None => self.emit(opcode::LDIND_REF, Operand::None),
                }
            }
        };
        self.emit(op, Operand::None)
    }
}

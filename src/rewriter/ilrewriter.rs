//! Instruction-list representation of a method body.
//!
//! [`IlRewriter`] imports a body into a list of instructions with symbolic branch
//! targets, lets callers insert and replace instructions anywhere without
//! invalidating targets or exception clauses, and exports back to bytes with all
//! offsets recomputed.
//!
//! Two normalizations happen on import:
//!
//! - every short-form branch is widened to its 4-byte-target form, so inserted
//!   code can never overflow a 1-byte displacement on export;
//! - exception-clause boundaries are converted from byte offsets to instruction
//!   references (first and last instruction of each region, inclusive).
//!
//! Export always produces a fat header; a rewritten body gains locals and
//! exception clauses, which the tiny format cannot carry.

use crate::{
    metadata::token::Token,
    parser::Parser,
    rewriter::{
        body::{write_fat_body, BodyFlags, ClauseFlags, ExceptionClause, MethodBody},
        opcodes::{opcode_len, operand_kind, widen_branch, OperandKind, EXTENDED_PREFIX},
    },
    Result,
};

/// Stable identity of one instruction inside an [`IlRewriter`].
///
/// Ids survive arbitrary insertions; they are only meaningful within the rewriter
/// that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstrId(u32);

/// An instruction operand with symbolic branch targets.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// Variable or argument index (re-encoded at the width the opcode demands)
    Var(u16),
    /// 32-bit immediate (also holds `ldc.i4.s` values)
    I32(i32),
    /// 64-bit immediate
    I64(i64),
    /// 32-bit float immediate
    F32(f32),
    /// 64-bit float immediate
    F64(f64),
    /// Metadata token
    Token(Token),
    /// Branch target
    Target(InstrId),
    /// Switch targets
    Switch(Vec<InstrId>),
}

/// One instruction in the list.
#[derive(Debug, Clone)]
pub struct Instr {
    /// Stable id
    pub id: InstrId,
    /// Opcode (`0xFE00 | x` for the two-byte space)
    pub opcode: u16,
    /// Decoded operand
    pub operand: Operand,
}

/// An exception-handling clause over instruction references.
///
/// Regions are inclusive on both ends: `try_last` is the last instruction still
/// inside the protected region, `handler_last` the last instruction of the
/// handler.
#[derive(Debug, Clone)]
pub struct EhClause {
    /// Clause kind
    pub flags: ClauseFlags,
    /// Exception class token for typed clauses, nil otherwise
    pub class_token: Token,
    /// First instruction of the protected region
    pub try_start: InstrId,
    /// Last instruction of the protected region
    pub try_last: InstrId,
    /// First instruction of the handler
    pub handler_start: InstrId,
    /// Last instruction of the handler
    pub handler_last: InstrId,
}

/// A method body as an editable instruction list.
pub struct IlRewriter {
    instrs: Vec<Instr>,
    next_id: u32,
    clauses: Vec<EhClause>,
    /// Declared operand stack depth for export
    pub max_stack: u32,
    /// Whether locals are zero-initialized on entry
    pub init_locals: bool,
    /// Local-variable signature token, nil for none
    pub local_var_sig: Token,
}

impl IlRewriter {
    /// Imports a method body, header included.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for undecodable code, branch targets
    /// or clause boundaries that do not land on instruction boundaries, and
    /// propagates header parse failures.
    pub fn import(data: &[u8]) -> Result<Self> {
        let body = MethodBody::parse(data)?;

        let mut instrs = Vec::new();
        let mut offsets = Vec::new();
        let mut pending_branches = Vec::new();
        let mut pending_switches = Vec::new();

        let mut parser = Parser::new(body.code);
        while parser.has_more_data() {
            let offset = parser.pos();
            let first = parser.read_le::<u8>()?;
            let opcode = if first == EXTENDED_PREFIX {
                0xFE00 | u16::from(parser.read_le::<u8>()?)
            } else {
                u16::from(first)
            };

            let index = instrs.len();
            let (opcode, operand) = match operand_kind(opcode)? {
                OperandKind::None => (opcode, Operand::None),
                OperandKind::ShortVar => (opcode, Operand::Var(u16::from(parser.read_le::<u8>()?))),
                OperandKind::Var => (opcode, Operand::Var(parser.read_le::<u16>()?)),
                OperandKind::ShortI => (opcode, Operand::I32(i32::from(parser.read_le::<i8>()?))),
                OperandKind::I => (opcode, Operand::I32(parser.read_le::<i32>()?)),
                OperandKind::I8 => (opcode, Operand::I64(parser.read_le::<i64>()?)),
                OperandKind::ShortR => (opcode, Operand::F32(parser.read_le::<f32>()?)),
                OperandKind::R => (opcode, Operand::F64(parser.read_le::<f64>()?)),
                OperandKind::Token => (
                    opcode,
                    Operand::Token(Token::new(parser.read_le::<u32>()?)),
                ),
                OperandKind::ShortBranch => {
                    let rel = i64::from(parser.read_le::<i8>()?);
                    pending_branches.push((index, parser.pos() as i64 + rel));
                    (widen_branch(opcode), Operand::None)
                }
                OperandKind::Branch => {
                    let rel = i64::from(parser.read_le::<i32>()?);
                    pending_branches.push((index, parser.pos() as i64 + rel));
                    (opcode, Operand::None)
                }
                OperandKind::Switch => {
                    let count = parser.read_le::<u32>()? as usize;
                    let mut rels = Vec::with_capacity(count);
                    for _ in 0..count {
                        rels.push(i64::from(parser.read_le::<i32>()?));
                    }
                    let base = parser.pos() as i64;
                    pending_switches.push((index, rels.iter().map(|rel| base + rel).collect()));
                    (opcode, Operand::None)
                }
            };

            instrs.push(Instr {
                id: InstrId(index as u32),
                opcode,
                operand,
            });
            offsets.push(offset);
        }

        let index_at = |target: i64| -> Result<usize> {
            usize::try_from(target)
                .ok()
                .and_then(|t| offsets.binary_search(&t).ok())
                .ok_or_else(|| malformed_error!("Branch target not on instruction boundary - {}", target))
        };

        for (index, target) in pending_branches {
            let id = instrs[index_at(target)?].id;
            instrs[index].operand = Operand::Target(id);
        }
        for (index, targets) in pending_switches {
            let targets: Vec<i64> = targets;
            let mut ids = Vec::with_capacity(targets.len());
            for target in targets {
                ids.push(instrs[index_at(target)?].id);
            }
            instrs[index].operand = Operand::Switch(ids);
        }

        // Clause boundaries: region ends are exclusive byte offsets, mapped to the
        // last instruction inside the region.
        let region = |offset: u32, length: u32| -> Result<(InstrId, InstrId)> {
            let start = index_at(i64::from(offset))?;
            let end = offset as usize + length as usize;
            let end_index = if end == body.code.len() {
                instrs.len()
            } else {
                index_at(end as i64)?
            };
            if end_index <= start {
                return Err(malformed_error!("Empty exception region at {}", offset));
            }
            Ok((instrs[start].id, instrs[end_index - 1].id))
        };

        let mut clauses = Vec::with_capacity(body.clauses.len());
        for clause in &body.clauses {
            let (try_start, try_last) = region(clause.try_offset, clause.try_length)?;
            let (handler_start, handler_last) =
                region(clause.handler_offset, clause.handler_length)?;
            clauses.push(EhClause {
                flags: clause.flags,
                class_token: Token::new(clause.class_token_or_filter),
                try_start,
                try_last,
                handler_start,
                handler_last,
            });
        }

        let next_id = instrs.len() as u32;
        Ok(IlRewriter {
            instrs,
            next_id,
            clauses,
            max_stack: body.max_stack,
            init_locals: body.flags.contains(BodyFlags::INIT_LOCALS),
            local_var_sig: body.local_var_sig,
        })
    }

    /// Creates an empty rewriter (used when assembling a body from scratch).
    #[must_use]
    pub fn empty() -> Self {
        IlRewriter {
            instrs: Vec::new(),
            next_id: 0,
            clauses: Vec::new(),
            max_stack: 8,
            init_locals: false,
            local_var_sig: Token::nil(),
        }
    }

    /// Id of the first instruction.
    #[must_use]
    pub fn first_id(&self) -> Option<InstrId> {
        self.instrs.first().map(|instr| instr.id)
    }

    /// Id of the last instruction.
    #[must_use]
    pub fn last_id(&self) -> Option<InstrId> {
        self.instrs.last().map(|instr| instr.id)
    }

    /// Snapshot of all instruction ids in program order.
    #[must_use]
    pub fn ids(&self) -> Vec<InstrId> {
        self.instrs.iter().map(|instr| instr.id).collect()
    }

    /// The opcode of an instruction.
    #[must_use]
    pub fn opcode_of(&self, id: InstrId) -> u16 {
        self.instrs[self.index_of(id)].opcode
    }

    /// The instruction after `id`, if any.
    #[must_use]
    pub fn id_after(&self, id: InstrId) -> Option<InstrId> {
        self.instrs
            .get(self.index_of(id) + 1)
            .map(|instr| instr.id)
    }

    /// Replaces opcode and operand of an instruction in place.
    pub fn replace(&mut self, id: InstrId, opcode: u16, operand: Operand) {
        let index = self.index_of(id);
        self.instrs[index].opcode = opcode;
        self.instrs[index].operand = operand;
    }

    /// Inserts a new instruction before `before`, returning its id.
    pub fn insert_before(&mut self, before: InstrId, opcode: u16, operand: Operand) -> InstrId {
        let index = self.index_of(before);
        let id = self.alloc_id();
        self.instrs.insert(
            index,
            Instr {
                id,
                opcode,
                operand,
            },
        );
        id
    }

    /// Appends a new instruction at the end, returning its id.
    pub fn push_back(&mut self, opcode: u16, operand: Operand) -> InstrId {
        let id = self.alloc_id();
        self.instrs.push(Instr {
            id,
            opcode,
            operand,
        });
        id
    }

    /// Adds an exception clause. Clauses are emitted in insertion order, which for
    /// nested regions must be innermost first.
    pub fn add_clause(&mut self, clause: EhClause) {
        self.clauses.push(clause);
    }

    /// The current clauses.
    #[must_use]
    pub fn clauses(&self) -> &[EhClause] {
        &self.clauses
    }

    /// The instructions in program order.
    #[must_use]
    pub fn instructions(&self) -> &[Instr] {
        &self.instrs
    }

    /// Exports the body to bytes with a fat header, recomputing all offsets.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if an operand does not fit its
    /// opcode's encoding or a branch target no longer exists.
    pub fn export(&self) -> Result<Vec<u8>> {
        let mut sizes = Vec::with_capacity(self.instrs.len());
        for instr in &self.instrs {
            let operand_size = match operand_kind(instr.opcode)? {
                OperandKind::None => 0,
                OperandKind::ShortVar | OperandKind::ShortI | OperandKind::ShortBranch => 1,
                OperandKind::Var => 2,
                OperandKind::I | OperandKind::ShortR | OperandKind::Token | OperandKind::Branch => {
                    4
                }
                OperandKind::I8 | OperandKind::R => 8,
                OperandKind::Switch => match &instr.operand {
                    Operand::Switch(targets) => 4 + 4 * targets.len(),
                    _ => return Err(malformed_error!("switch without target list")),
                },
            };
            sizes.push(opcode_len(instr.opcode) + operand_size);
        }

        let mut offsets = Vec::with_capacity(self.instrs.len());
        let mut offset = 0usize;
        for size in &sizes {
            offsets.push(offset);
            offset += size;
        }

        let offset_of = |id: InstrId| -> Result<usize> {
            self.instrs
                .iter()
                .position(|instr| instr.id == id)
                .map(|index| offsets[index])
                .ok_or_else(|| malformed_error!("Dangling instruction reference"))
        };

        let mut code = Vec::with_capacity(offset);
        for (index, instr) in self.instrs.iter().enumerate() {
            if instr.opcode > 0xFF {
                code.push(EXTENDED_PREFIX);
                code.push(instr.opcode as u8);
            } else {
                code.push(instr.opcode as u8);
            }

            let end = offsets[index] + sizes[index];
            match (operand_kind(instr.opcode)?, &instr.operand) {
                (OperandKind::None, Operand::None) => {}
                (OperandKind::ShortVar, Operand::Var(value)) => {
                    let value = u8::try_from(*value).map_err(|_| {
                        malformed_error!("Variable index too large for short form - {}", value)
                    })?;
                    code.push(value);
                }
                (OperandKind::Var, Operand::Var(value)) => {
                    code.extend_from_slice(&value.to_le_bytes());
                }
                (OperandKind::ShortI, Operand::I32(value)) => {
                    let value = i8::try_from(*value).map_err(|_| {
                        malformed_error!("Immediate too large for short form - {}", value)
                    })?;
                    code.push(value as u8);
                }
                (OperandKind::I, Operand::I32(value)) => {
                    code.extend_from_slice(&value.to_le_bytes());
                }
                (OperandKind::I8, Operand::I64(value)) => {
                    code.extend_from_slice(&value.to_le_bytes());
                }
                (OperandKind::ShortR, Operand::F32(value)) => {
                    code.extend_from_slice(&value.to_le_bytes());
                }
                (OperandKind::R, Operand::F64(value)) => {
                    code.extend_from_slice(&value.to_le_bytes());
                }
                (OperandKind::Token, Operand::Token(token)) => {
                    code.extend_from_slice(&token.value().to_le_bytes());
                }
                (OperandKind::Branch, Operand::Target(target)) => {
                    let rel = offset_of(*target)? as i64 - end as i64;
                    let rel = i32::try_from(rel)
                        .map_err(|_| malformed_error!("Branch displacement overflow"))?;
                    code.extend_from_slice(&rel.to_le_bytes());
                }
                (OperandKind::ShortBranch, Operand::Target(target)) => {
                    let rel = offset_of(*target)? as i64 - end as i64;
                    let rel = i8::try_from(rel)
                        .map_err(|_| malformed_error!("Short branch displacement overflow"))?;
                    code.push(rel as u8);
                }
                (OperandKind::Switch, Operand::Switch(targets)) => {
                    code.extend_from_slice(&(targets.len() as u32).to_le_bytes());
                    for target in targets {
                        let rel = offset_of(*target)? as i64 - end as i64;
                        let rel = i32::try_from(rel)
                            .map_err(|_| malformed_error!("Switch displacement overflow"))?;
                        code.extend_from_slice(&rel.to_le_bytes());
                    }
                }
                _ => {
                    return Err(malformed_error!(
                        "Operand mismatch for opcode {:#06x}",
                        instr.opcode
                    ))
                }
            }
        }

        let mut clauses = Vec::with_capacity(self.clauses.len());
        for clause in &self.clauses {
            let region = |start: InstrId, last: InstrId| -> Result<(u32, u32)> {
                let start_off = offset_of(start)?;
                let last_index = self
                    .instrs
                    .iter()
                    .position(|instr| instr.id == last)
                    .ok_or_else(|| malformed_error!("Dangling clause reference"))?;
                let end_off = offsets[last_index] + sizes[last_index];
                Ok((start_off as u32, (end_off - start_off) as u32))
            };

            let (try_offset, try_length) = region(clause.try_start, clause.try_last)?;
            let (handler_offset, handler_length) =
                region(clause.handler_start, clause.handler_last)?;
            clauses.push(ExceptionClause {
                flags: clause.flags,
                try_offset,
                try_length,
                handler_offset,
                handler_length,
                class_token_or_filter: clause.class_token.value(),
            });
        }

        Ok(write_fat_body(
            self.max_stack,
            self.local_var_sig,
            self.init_locals,
            &code,
            &clauses,
        ))
    }

    fn index_of(&self, id: InstrId) -> usize {
        self.instrs
            .iter()
            .position(|instr| instr.id == id)
            .unwrap_or_else(|| panic!("unknown instruction id {id:?}"))
    }

    fn alloc_id(&mut self) -> InstrId {
        let id = InstrId(self.next_id);
        self.next_id += 1;
        id
    }
}

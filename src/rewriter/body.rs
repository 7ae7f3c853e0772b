//! Method-body headers and exception-handling sections (ECMA-335 II.25.4).
//!
//! A body is either *tiny* (single header byte, code under 64 bytes, no locals, no
//! exception handlers) or *fat* (12-byte header, optional data sections appended
//! after the code on a 4-byte boundary). Exception-handling sections come in a
//! small 12-byte-clause format and a fat 24-byte-clause format; this module reads
//! both and always writes the fat one.

use bitflags::bitflags;

use crate::{metadata::token::Token, parser::Parser, Result};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Flags that a method body can have
    pub struct BodyFlags: u16 {
        /// Tiny method header format
        const TINY_FORMAT = 0x2;
        /// Fat method header format
        const FAT_FORMAT = 0x3;
        /// More data sections are appended after the code
        const MORE_SECTS = 0x8;
        /// Zero-initialize all local variables on entry
        const INIT_LOCALS = 0x10;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Flags that a method body data section can have
    pub struct SectionFlags: u8 {
        /// Section contains exception handling data
        const EHTABLE = 0x1;
        /// Reserved, shall be 0
        const OPT_ILTABLE = 0x2;
        /// Section uses the fat format
        const FAT_FORMAT = 0x40;
        /// Another section follows this one
        const MORE_SECTS = 0x80;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    /// Kind of an exception-handling clause
    pub struct ClauseFlags: u32 {
        /// Typed exception handler
        const EXCEPTION = 0x0000;
        /// Filter-based handler
        const FILTER = 0x0001;
        /// Finally handler
        const FINALLY = 0x0002;
        /// Fault handler (finally that runs only on exception)
        const FAULT = 0x0004;
    }
}

/// One exception-handling clause, in code byte offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionClause {
    /// Clause kind
    pub flags: ClauseFlags,
    /// Offset of the first instruction of the protected region
    pub try_offset: u32,
    /// Byte length of the protected region
    pub try_length: u32,
    /// Offset of the first handler instruction
    pub handler_offset: u32,
    /// Byte length of the handler
    pub handler_length: u32,
    /// Exception class token (typed clauses) or filter offset (filter clauses)
    pub class_token_or_filter: u32,
}

/// A parsed method body: header fields, the raw code bytes, and any
/// exception-handling clauses.
#[derive(Debug)]
pub struct MethodBody<'a> {
    /// Header flags; tiny bodies report `TINY_FORMAT` only
    pub flags: BodyFlags,
    /// Declared operand stack depth
    pub max_stack: u32,
    /// Local-variable signature token, nil when there are no locals
    pub local_var_sig: Token,
    /// The raw instruction stream
    pub code: &'a [u8],
    /// Exception-handling clauses, in section order
    pub clauses: Vec<ExceptionClause>,
}

impl<'a> MethodBody<'a> {
    /// Parses a method body, header included.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for invalid header formats or section
    /// layouts and [`crate::Error::OutOfBounds`] on truncation.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        let first = parser.read_le::<u8>()?;

        match first & 0x3 {
            0x2 => {
                // Tiny: code size in the upper 6 bits, defaults everywhere else
                let code_size = usize::from(first >> 2);
                let code = parser.read_bytes(code_size)?;
                Ok(MethodBody {
                    flags: BodyFlags::TINY_FORMAT,
                    max_stack: 8,
                    local_var_sig: Token::nil(),
                    code,
                    clauses: Vec::new(),
                })
            }
            0x3 => {
                let second = parser.read_le::<u8>()?;
                let flags_raw = u16::from_le_bytes([first, second]) & 0x0FFF;
                let flags = BodyFlags::from_bits_truncate(flags_raw);
                let header_size = usize::from(second >> 4) * 4;
                if header_size != 12 {
                    return Err(malformed_error!(
                        "Invalid fat header size - {} bytes",
                        header_size
                    ));
                }

                let max_stack = u32::from(parser.read_le::<u16>()?);
                let code_size = parser.read_le::<u32>()? as usize;
                let local_var_sig = Token::new(parser.read_le::<u32>()?);
                let code = parser.read_bytes(code_size)?;

                let mut clauses = Vec::new();
                if flags.contains(BodyFlags::MORE_SECTS) {
                    parser.align(4)?;
                    read_eh_sections(&mut parser, &mut clauses)?;
                }

                Ok(MethodBody {
                    flags,
                    max_stack,
                    local_var_sig,
                    code,
                    clauses,
                })
            }
            _ => Err(malformed_error!(
                "Invalid method header format - {:#04x}",
                first
            )),
        }
    }
}

fn read_eh_sections(parser: &mut Parser<'_>, clauses: &mut Vec<ExceptionClause>) -> Result<()> {
    loop {
        let kind = SectionFlags::from_bits_truncate(parser.read_le::<u8>()?);
        if !kind.contains(SectionFlags::EHTABLE) {
            return Err(malformed_error!(
                "Unsupported method data section - {:#04x}",
                kind.bits()
            ));
        }

        if kind.contains(SectionFlags::FAT_FORMAT) {
            let b0 = u32::from(parser.read_le::<u8>()?);
            let b1 = u32::from(parser.read_le::<u8>()?);
            let b2 = u32::from(parser.read_le::<u8>()?);
            let length = b0 | (b1 << 8) | (b2 << 16);
            let count = (length as usize).saturating_sub(4) / 24;

            for _ in 0..count {
                clauses.push(ExceptionClause {
                    flags: ClauseFlags::from_bits_truncate(parser.read_le::<u32>()?),
                    try_offset: parser.read_le::<u32>()?,
                    try_length: parser.read_le::<u32>()?,
                    handler_offset: parser.read_le::<u32>()?,
                    handler_length: parser.read_le::<u32>()?,
                    class_token_or_filter: parser.read_le::<u32>()?,
                });
            }
        } else {
            let length = usize::from(parser.read_le::<u8>()?);
            parser.read_le::<u16>()?; // padding
            let count = length.saturating_sub(4) / 12;

            for _ in 0..count {
                clauses.push(ExceptionClause {
                    flags: ClauseFlags::from_bits_truncate(u32::from(parser.read_le::<u16>()?)),
                    try_offset: u32::from(parser.read_le::<u16>()?),
                    try_length: u32::from(parser.read_le::<u8>()?),
                    handler_offset: u32::from(parser.read_le::<u16>()?),
                    handler_length: u32::from(parser.read_le::<u8>()?),
                    class_token_or_filter: parser.read_le::<u32>()?,
                });
            }
        }

        if !kind.contains(SectionFlags::MORE_SECTS) {
            return Ok(());
        }
        parser.align(4)?;
    }
}

/// Assembles a fat method body from its parts.
///
/// The exception section, when present, is always written in the fat clause
/// format on a 4-byte boundary after the code.
#[must_use]
pub fn write_fat_body(
    max_stack: u32,
    local_var_sig: Token,
    init_locals: bool,
    code: &[u8],
    clauses: &[ExceptionClause],
) -> Vec<u8> {
    let mut flags = BodyFlags::FAT_FORMAT;
    if init_locals {
        flags |= BodyFlags::INIT_LOCALS;
    }
    if !clauses.is_empty() {
        flags |= BodyFlags::MORE_SECTS;
    }

    let mut out = Vec::with_capacity(12 + code.len() + 4 + clauses.len() * 24);

    // Header size 3 dwords in the upper nibble of the second byte
    let header = flags.bits() | (3 << 12);
    out.extend_from_slice(&header.to_le_bytes());
    out.extend_from_slice(&(max_stack as u16).to_le_bytes());
    out.extend_from_slice(&(code.len() as u32).to_le_bytes());
    out.extend_from_slice(&local_var_sig.value().to_le_bytes());
    out.extend_from_slice(code);

    if !clauses.is_empty() {
        while out.len() % 4 != 0 {
            out.push(0);
        }

        let section_len = 4 + clauses.len() as u32 * 24;
        out.push((SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT).bits());
        out.push(section_len as u8);
        out.push((section_len >> 8) as u8);
        out.push((section_len >> 16) as u8);

        for clause in clauses {
            out.extend_from_slice(&clause.flags.bits().to_le_bytes());
            out.extend_from_slice(&clause.try_offset.to_le_bytes());
            out.extend_from_slice(&clause.try_length.to_le_bytes());
            out.extend_from_slice(&clause.handler_offset.to_le_bytes());
            out.extend_from_slice(&clause.handler_length.to_le_bytes());
            out.extend_from_slice(&clause.class_token_or_filter.to_le_bytes());
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tiny_body() {
        // ldarg.0, call 0x0A000001, pop, ret - 8 code bytes
        let body = [
            0x22, 0x02, 0x28, 0x01, 0x00, 0x00, 0x0A, 0x26, 0x2A,
        ];
        let parsed = MethodBody::parse(&body).unwrap();
        assert_eq!(parsed.flags, BodyFlags::TINY_FORMAT);
        assert_eq!(parsed.code.len(), 8);
        assert!(parsed.local_var_sig.is_null());
        assert!(parsed.clauses.is_empty());
    }

    #[test]
    fn parse_fat_body() {
        let mut body = vec![
            0x13, 0x30, // fat, init locals, header size 3
            0x04, 0x00, // max stack 4
            0x03, 0x00, 0x00, 0x00, // code size 3
            0x01, 0x00, 0x00, 0x11, // locals token 0x11000001
        ];
        body.extend_from_slice(&[0x00, 0x00, 0x2A]); // nop, nop, ret

        let parsed = MethodBody::parse(&body).unwrap();
        assert!(parsed.flags.contains(BodyFlags::INIT_LOCALS));
        assert_eq!(parsed.max_stack, 4);
        assert_eq!(parsed.local_var_sig, Token::new(0x1100_0001));
        assert_eq!(parsed.code, &[0x00, 0x00, 0x2A]);
    }

    #[test]
    fn parse_rejects_invalid_header() {
        assert!(MethodBody::parse(&[0x00]).is_err());
        assert!(MethodBody::parse(&[]).is_err());
        // Fat header claiming a 16-byte header
        assert!(MethodBody::parse(&[0x03, 0x40, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).is_err());
    }

    #[test]
    fn fat_body_round_trip_with_clauses() {
        let code = [0x00, 0x00, 0x00, 0x00, 0xDC, 0x2A]; // nops, endfinally, ret
        let clause = ExceptionClause {
            flags: ClauseFlags::FINALLY,
            try_offset: 0,
            try_length: 4,
            handler_offset: 4,
            handler_length: 1,
            class_token_or_filter: 0,
        };

        let bytes = write_fat_body(3, Token::new(0x1100_0002), true, &code, &[clause]);
        let parsed = MethodBody::parse(&bytes).unwrap();

        assert!(parsed.flags.contains(BodyFlags::MORE_SECTS));
        assert!(parsed.flags.contains(BodyFlags::INIT_LOCALS));
        assert_eq!(parsed.max_stack, 3);
        assert_eq!(parsed.local_var_sig, Token::new(0x1100_0002));
        assert_eq!(parsed.code, &code);
        assert_eq!(parsed.clauses, vec![clause]);
    }

    #[test]
    fn parse_small_eh_section() {
        let mut body = vec![
            0x0B, 0x30, // fat, MORE_SECTS, header size 3
            0x02, 0x00, // max stack
            0x08, 0x00, 0x00, 0x00, // code size 8
            0x00, 0x00, 0x00, 0x00, // no locals
        ];
        body.extend_from_slice(&[0x00; 8]); // 8 nops, already 4-aligned
        body.push(0x01); // EHTABLE, small
        body.push(16); // length: 4 + 1 clause * 12
        body.extend_from_slice(&[0x00, 0x00]); // padding
        body.extend_from_slice(&0u16.to_le_bytes()); // EXCEPTION
        body.extend_from_slice(&0u16.to_le_bytes()); // try offset
        body.push(4); // try length
        body.extend_from_slice(&4u16.to_le_bytes()); // handler offset
        body.push(4); // handler length
        body.extend_from_slice(&0x0100_0001u32.to_le_bytes()); // class token

        let parsed = MethodBody::parse(&body).unwrap();
        assert_eq!(parsed.clauses.len(), 1);
        let clause = parsed.clauses[0];
        assert_eq!(clause.flags, ClauseFlags::EXCEPTION);
        assert_eq!(clause.try_length, 4);
        assert_eq!(clause.handler_offset, 4);
        assert_eq!(clause.class_token_or_filter, 0x0100_0001);
    }
}

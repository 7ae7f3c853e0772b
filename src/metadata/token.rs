//! Metadata token representation.
//!
//! A token is a 32-bit value: the high byte identifies the metadata table, the low
//! 24 bits the 1-based row within it. Tokens are how the metadata store names types,
//! methods, member references, signatures, and user strings.

use std::fmt;

/// Metadata table identifiers for the tables this crate references.
pub mod table {
    /// `TypeRef` table
    pub const TYPE_REF: u8 = 0x01;
    /// `TypeDef` table
    pub const TYPE_DEF: u8 = 0x02;
    /// `MethodDef` table
    pub const METHOD_DEF: u8 = 0x06;
    /// `MemberRef` table
    pub const MEMBER_REF: u8 = 0x0A;
    /// `StandAloneSig` table (local variable signatures)
    pub const STANDALONE_SIG: u8 = 0x11;
    /// `TypeSpec` table
    pub const TYPE_SPEC: u8 = 0x1B;
    /// `AssemblyRef` table
    pub const ASSEMBLY_REF: u8 = 0x23;
    /// `MethodSpec` table (instantiated generic methods)
    pub const METHOD_SPEC: u8 = 0x2B;
    /// User-string heap pseudo-table
    pub const USER_STRING: u8 = 0x70;
}

/// A metadata token combining a table tag and a row index.
///
/// # Examples
///
/// ```rust
/// use clrtrace::metadata::token::{table, Token};
///
/// let token = Token::new(0x0600_0001);
/// assert_eq!(token.table(), table::METHOD_DEF);
/// assert_eq!(token.row(), 1);
/// assert!(!token.is_null());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(u32);

impl Token {
    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// The nil token (table 0, row 0).
    #[must_use]
    pub fn nil() -> Self {
        Token(0)
    }

    /// Builds a token from a table tag and a row index.
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns `true` if this token has a zero row, regardless of table.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.row() == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts() {
        let token = Token::new(0x0200_0012);
        assert_eq!(token.table(), table::TYPE_DEF);
        assert_eq!(token.row(), 0x12);
        assert_eq!(Token::from_parts(table::TYPE_DEF, 0x12), token);
    }

    #[test]
    fn null() {
        assert!(Token::nil().is_null());
        assert!(Token::new(0x0600_0000).is_null());
        assert!(!Token::new(0x0600_0001).is_null());
    }

    #[test]
    fn display() {
        assert_eq!(Token::new(0x0A00_00FF).to_string(), "0x0A0000FF");
    }
}

//! ECMA-335 element-type and calling-convention constants.
//!
//! These are the raw byte codes that appear inside signature blobs (ECMA-335 II.23.1.16
//! and II.23.2). The decoder in [`crate::metadata::signatures`] consumes them; the
//! resolver maps the primitive codes to their canonical `System.*` type names.

/// Element type constants from ECMA-335 II.23.1.16.
#[allow(non_snake_case, missing_docs)]
pub mod ELEMENT_TYPE {
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0A;
    pub const U8: u8 = 0x0B;
    pub const R4: u8 = 0x0C;
    pub const R8: u8 = 0x0D;
    pub const STRING: u8 = 0x0E;
    pub const PTR: u8 = 0x0F;
    pub const BYREF: u8 = 0x10;
    pub const VALUETYPE: u8 = 0x11;
    pub const CLASS: u8 = 0x12;
    pub const VAR: u8 = 0x13;
    pub const ARRAY: u8 = 0x14;
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    pub const I: u8 = 0x18;
    pub const U: u8 = 0x19;
    pub const FNPTR: u8 = 0x1B;
    pub const OBJECT: u8 = 0x1C;
    pub const SZARRAY: u8 = 0x1D;
    pub const MVAR: u8 = 0x1E;
    pub const CMOD_REQD: u8 = 0x1F;
    pub const CMOD_OPT: u8 = 0x20;
    pub const INTERNAL: u8 = 0x21;
    pub const MODIFIER: u8 = 0x40;
    pub const SENTINEL: u8 = 0x41;
    pub const PINNED: u8 = 0x45;
}

/// Calling convention bytes and flags from ECMA-335 II.23.2.3.
#[allow(non_snake_case, missing_docs)]
pub mod CALLING_CONVENTION {
    pub const DEFAULT: u8 = 0x00;
    pub const VARARG: u8 = 0x05;
    pub const FIELD: u8 = 0x06;
    pub const LOCAL_SIG: u8 = 0x07;
    pub const PROPERTY: u8 = 0x08;
    pub const GENERICINST: u8 = 0x0A;
    /// The low nibble mask separating the kind from the modifier flags
    pub const MASK: u8 = 0x0F;
    /// Set when the signature carries a generic parameter count
    pub const GENERIC: u8 = 0x10;
    /// Set when the method has a `this` receiver
    pub const HAS_THIS: u8 = 0x20;
    /// Set when the `this` type is explicitly in the parameter list
    pub const EXPLICIT_THIS: u8 = 0x40;
}

/// Returns the canonical core-library type name for a primitive element code.
///
/// Covers the 14 primitive value kinds plus `STRING` and `OBJECT`; everything else
/// yields `None`.
#[must_use]
pub fn primitive_name(code: u8) -> Option<&'static str> {
    match code {
        ELEMENT_TYPE::BOOLEAN => Some("System.Boolean"),
        ELEMENT_TYPE::CHAR => Some("System.Char"),
        ELEMENT_TYPE::I1 => Some("System.SByte"),
        ELEMENT_TYPE::U1 => Some("System.Byte"),
        ELEMENT_TYPE::I2 => Some("System.Int16"),
        ELEMENT_TYPE::U2 => Some("System.UInt16"),
        ELEMENT_TYPE::I4 => Some("System.Int32"),
        ELEMENT_TYPE::U4 => Some("System.UInt32"),
        ELEMENT_TYPE::I8 => Some("System.Int64"),
        ELEMENT_TYPE::U8 => Some("System.UInt64"),
        ELEMENT_TYPE::R4 => Some("System.Single"),
        ELEMENT_TYPE::R8 => Some("System.Double"),
        ELEMENT_TYPE::I => Some("System.IntPtr"),
        ELEMENT_TYPE::U => Some("System.UIntPtr"),
        ELEMENT_TYPE::STRING => Some("System.String"),
        ELEMENT_TYPE::OBJECT => Some("System.Object"),
        _ => None,
    }
}

/// Returns `true` for the 14 primitive element codes with value semantics.
///
/// `STRING` and `OBJECT` resolve as primitives but carry reference semantics and are
/// deliberately excluded.
#[must_use]
pub fn is_primitive_value_kind(code: u8) -> bool {
    matches!(
        code,
        ELEMENT_TYPE::BOOLEAN
            | ELEMENT_TYPE::CHAR
            | ELEMENT_TYPE::I1
            | ELEMENT_TYPE::U1
            | ELEMENT_TYPE::I2
            | ELEMENT_TYPE::U2
            | ELEMENT_TYPE::I4
            | ELEMENT_TYPE::U4
            | ELEMENT_TYPE::I8
            | ELEMENT_TYPE::U8
            | ELEMENT_TYPE::R4
            | ELEMENT_TYPE::R8
            | ELEMENT_TYPE::I
            | ELEMENT_TYPE::U
    )
}

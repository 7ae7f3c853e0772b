//! Signature encoders for the blobs this crate must emit.
//!
//! Three families of blobs get built during a rewrite:
//!
//! - spliced local-variable signatures that append the tracing slots to a method's
//!   existing locals,
//! - the fixed call-site signatures of the tracing hooks (resolved into member
//!   refs against the managed trace assembly),
//! - method-spec instantiation blobs with generic-parameter placeholders, used by
//!   the call-forwarding stub for generic targets.

use crate::{
    metadata::{
        element::{CALLING_CONVENTION, ELEMENT_TYPE},
        token::{table, Token},
    },
    parser::{write_compressed_uint, Parser},
    Result,
};

/// Encodes a token as a `TypeDefOrRefEncoded` compressed value (ECMA-335 II.23.2.8).
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for tokens outside the `TypeDef`/`TypeRef`/
/// `TypeSpec` tables or with rows too large to compress.
pub fn write_compressed_token(out: &mut Vec<u8>, token: Token) -> Result<()> {
    let tag = match token.table() {
        table::TYPE_DEF => 0,
        table::TYPE_REF => 1,
        table::TYPE_SPEC => 2,
        _ => {
            return Err(malformed_error!(
                "Token table cannot be coded as TypeDefOrRef - {}",
                token
            ))
        }
    };

    let coded = token
        .row()
        .checked_shl(2)
        .filter(|v| *v <= 0x1FFF_FFFF)
        .ok_or_else(|| malformed_error!("Token row too large to compress - {}", token))?;

    write_compressed_uint(out, coded | tag)
}

/// The result of splicing tracing slots into a local-variable signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalsPatch {
    /// The signature already ends with the trace-context slot; the method was
    /// rewritten before.
    AlreadyPatched,
    /// A fresh signature with three appended slots.
    Patched {
        /// The complete new `LocalVarSig` blob
        signature: Vec<u8>,
        /// Total local count after splicing
        count: u32,
    },
}

/// Splices the three tracing slots (`object`, the exception class, the trace-context
/// class) onto an existing `LocalVarSig`, preserving every original slot.
///
/// The trailing-slot check doubles as the idempotence guard: if the signature
/// already ends with the context class, the method body was patched by an earlier
/// invocation and [`LocalsPatch::AlreadyPatched`] is returned.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `original` is not a local-variable
/// signature or a referenced token cannot be compressed.
pub fn splice_trace_locals(
    original: Option<&[u8]>,
    exception_type: Token,
    context_type: Token,
) -> Result<LocalsPatch> {
    let mut context_slot = vec![ELEMENT_TYPE::CLASS];
    write_compressed_token(&mut context_slot, context_type)?;

    let (count, body) = match original {
        Some(data) => {
            let mut parser = Parser::new(data);
            let header = parser.read_le::<u8>()?;
            if header != CALLING_CONVENTION::LOCAL_SIG {
                return Err(malformed_error!(
                    "Not a local variable signature - header {:#04x}",
                    header
                ));
            }
            let count = parser.read_compressed_uint()?;
            let body = parser.read_bytes(parser.remaining())?;

            if body.ends_with(&context_slot) {
                return Ok(LocalsPatch::AlreadyPatched);
            }
            (count, body)
        }
        None => (0, &[][..]),
    };

    let mut signature = vec![CALLING_CONVENTION::LOCAL_SIG];
    write_compressed_uint(&mut signature, count + 3)?;
    signature.extend_from_slice(body);
    signature.push(ELEMENT_TYPE::OBJECT);
    signature.push(ELEMENT_TYPE::CLASS);
    write_compressed_token(&mut signature, exception_type)?;
    signature.extend_from_slice(&context_slot);

    Ok(LocalsPatch::Patched {
        signature,
        count: count + 3,
    })
}

/// `static object GetInstance()` - the trace-agent accessor.
#[must_use]
pub fn get_instance_sig() -> &'static [u8] {
    &[
        CALLING_CONVENTION::DEFAULT,
        0x00,
        ELEMENT_TYPE::OBJECT,
    ]
}

/// `instance object BeforeMethod(string, string, object, object[], uint32)` -
/// the entry hook on the trace agent.
#[must_use]
pub fn before_method_sig() -> &'static [u8] {
    &[
        CALLING_CONVENTION::HAS_THIS,
        0x05,
        ELEMENT_TYPE::OBJECT,
        ELEMENT_TYPE::STRING,
        ELEMENT_TYPE::STRING,
        ELEMENT_TYPE::OBJECT,
        ELEMENT_TYPE::SZARRAY,
        ELEMENT_TYPE::OBJECT,
        ELEMENT_TYPE::U4,
    ]
}

/// `instance void EndMethod(object, object)` - the exit hook on the trace context.
#[must_use]
pub fn end_method_sig() -> &'static [u8] {
    &[
        CALLING_CONVENTION::HAS_THIS,
        0x02,
        ELEMENT_TYPE::VOID,
        ELEMENT_TYPE::OBJECT,
        ELEMENT_TYPE::OBJECT,
    ]
}

/// `static void CustomLoadFrom(string)` - the assembly-load helper defined on the
/// core library's `Assembly` type.
#[must_use]
pub fn assembly_load_sig() -> &'static [u8] {
    &[
        CALLING_CONVENTION::DEFAULT,
        0x01,
        ELEMENT_TYPE::VOID,
        ELEMENT_TYPE::STRING,
    ]
}

/// Builds a `MethodSpec` instantiation blob of `count` method generic-parameter
/// placeholders (`!!0`, `!!1`, ...).
///
/// The forwarding stub uses this to call a generic target with the copy's own
/// generic parameters threaded through unchanged.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `count` exceeds the compressed-uint range.
pub fn method_spec_placeholder_sig(count: u32) -> Result<Vec<u8>> {
    let mut out = vec![CALLING_CONVENTION::GENERICINST];
    write_compressed_uint(&mut out, count)?;
    for index in 0..count {
        out.push(ELEMENT_TYPE::MVAR);
        write_compressed_uint(&mut out, index)?;
    }
    Ok(out)
}

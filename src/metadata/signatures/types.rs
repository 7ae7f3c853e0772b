//! Decoded signature representations.
//!
//! A parsed method signature does not build an owned type tree. Each return and
//! parameter type is kept as a [`TypeSpan`] — a borrowed view of the exact byte
//! range inside the original blob that encodes that type. Classification questions
//! (void, by-ref, boxing) are answered by inspecting the span head bytes on demand,
//! and the raw bytes are reusable verbatim when building type-spec blobs.

use crate::metadata::element::{is_primitive_value_kind, CALLING_CONVENTION, ELEMENT_TYPE};

/// A borrowed view of one encoded type inside a signature blob.
///
/// The span covers the full encoding of a single return or parameter type,
/// including a leading `BYREF` modifier when present. Spans are only produced by
/// the signature parser, so they are never empty and always hold a complete,
/// well-formed type encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeSpan<'a> {
    data: &'a [u8],
}

impl<'a> TypeSpan<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        debug_assert!(!data.is_empty());
        TypeSpan { data }
    }

    /// The raw encoded bytes of this type, including any `BYREF` prefix.
    #[must_use]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// The encoded bytes with any leading `BYREF` stripped.
    #[must_use]
    pub fn base_bytes(&self) -> &'a [u8] {
        if self.is_by_ref() {
            &self.data[1..]
        } else {
            self.data
        }
    }

    /// Returns `true` if this span encodes `void` (return types only).
    #[must_use]
    pub fn is_void(&self) -> bool {
        self.data[0] == ELEMENT_TYPE::VOID
    }

    /// Returns `true` if the type is passed by reference.
    #[must_use]
    pub fn is_by_ref(&self) -> bool {
        self.data[0] == ELEMENT_TYPE::BYREF
    }

    /// The element code of the underlying type, past any `BYREF` prefix.
    #[must_use]
    pub fn element_type(&self) -> u8 {
        self.base_bytes()[0]
    }

    /// Whether a value of this type must be boxed before it can be stored into an
    /// `object` slot.
    ///
    /// True for the 14 primitive value kinds, value types, generic instantiations
    /// over value types, generic parameters (whose instantiation may be a value
    /// type), and `typedref`. False for classes, strings, objects, and arrays.
    #[must_use]
    pub fn needs_boxing(&self) -> bool {
        let base = self.base_bytes();
        match base[0] {
            code if is_primitive_value_kind(code) => true,
            ELEMENT_TYPE::VALUETYPE | ELEMENT_TYPE::TYPEDBYREF => true,
            ELEMENT_TYPE::VAR | ELEMENT_TYPE::MVAR => true,
            ELEMENT_TYPE::GENERICINST => base.len() > 1 && base[1] == ELEMENT_TYPE::VALUETYPE,
            _ => false,
        }
    }
}

/// A decoded `MethodDefSig` (ECMA-335 II.23.2.1).
///
/// Holds the convention byte, the generic and positional parameter counts, and a
/// [`TypeSpan`] per return and parameter type, in declaration order. The spans
/// borrow the blob the signature was parsed from.
#[derive(Debug, Clone)]
pub struct MethodSignature<'a> {
    /// The raw calling-convention byte, flags included
    pub convention: u8,
    /// Number of generic parameters, 0 when the `GENERIC` flag is absent
    pub generic_param_count: u32,
    /// The declared positional parameter count
    pub param_count: u32,
    /// The return type
    pub ret: TypeSpan<'a>,
    /// One span per parameter, in order
    pub params: Vec<TypeSpan<'a>>,
}

impl MethodSignature<'_> {
    /// Returns `true` if the method has a `this` receiver.
    #[must_use]
    pub fn has_this(&self) -> bool {
        self.convention & CALLING_CONVENTION::HAS_THIS != 0
    }

    /// Returns `true` if the method declares generic parameters.
    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.generic_param_count > 0
    }
}

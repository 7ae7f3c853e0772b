use crate::{
    metadata::{
        element::{primitive_name, CALLING_CONVENTION, ELEMENT_TYPE},
        signatures::{MethodSignature, TypeSpan},
    },
    parser::Parser,
    Result,
};

/// Maximum recursion depth for type parsing to prevent stack overflow on nested
/// generic instantiations and array element types.
const MAX_RECURSION_DEPTH: usize = 50;

/// Parse a method signature blob into a [`MethodSignature`] (ECMA-335 II.23.2.1).
///
/// The blob must be consumed exactly: trailing bytes after the final parameter
/// fail the parse, as does truncation anywhere inside it.
///
/// # Errors
/// Returns [`crate::Error::Empty`] for an empty blob, [`crate::Error::OutOfBounds`]
/// on truncation, and [`crate::Error::Malformed`] for unsupported or invalid
/// encodings (pointers, function pointers, custom modifiers, `typedref` returns,
/// repeated sentinels, trailing bytes).
///
/// # Examples
///
/// ```rust
/// use clrtrace::metadata::signatures::parse_method_signature;
///
/// // instance string (int32)
/// let blob = [0x20, 0x01, 0x0E, 0x08];
/// let sig = parse_method_signature(&blob)?;
/// assert!(sig.has_this());
/// assert_eq!(sig.param_count, 1);
/// # Ok::<(), clrtrace::Error>(())
/// ```
pub fn parse_method_signature(data: &[u8]) -> Result<MethodSignature<'_>> {
    let mut parser = SignatureParser::new(data);
    parser.parse_method_signature()
}

/// Stateful parser for signature blobs.
///
/// Wraps a [`Parser`] cursor and tracks recursion depth while walking nested type
/// encodings. Produces borrowed [`TypeSpan`] views instead of an owned type tree.
pub struct SignatureParser<'a> {
    parser: Parser<'a>,
    recursion_depth: usize,
}

impl<'a> SignatureParser<'a> {
    /// Creates a new parser over the given blob.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        SignatureParser {
            parser: Parser::new(data),
            recursion_depth: 0,
        }
    }

    /// Parse a complete `MethodDefSig`, enforcing exact consumption of the blob.
    ///
    /// # Errors
    /// See [`parse_method_signature`].
    pub fn parse_method_signature(&mut self) -> Result<MethodSignature<'a>> {
        if self.parser.is_empty() {
            return Err(crate::Error::Empty);
        }

        let convention = self.parser.read_le::<u8>()?;

        let generic_param_count = if convention & CALLING_CONVENTION::GENERIC != 0 {
            self.parser.read_compressed_uint()?
        } else {
            0
        };

        let param_count = self.parser.read_compressed_uint()?;
        // Each parameter takes at least one byte, which bounds the declared count.
        if param_count as usize > self.parser.remaining() {
            return Err(malformed_error!(
                "Declared parameter count exceeds signature size - {}",
                param_count
            ));
        }

        let ret = self.parse_return_span()?;

        let vararg = convention & CALLING_CONVENTION::MASK == CALLING_CONVENTION::VARARG;
        let mut sentinel_seen = false;
        let mut params = Vec::with_capacity(param_count as usize);
        for _ in 0..param_count {
            if self.parser.peek_byte()? == ELEMENT_TYPE::SENTINEL {
                if !vararg {
                    return Err(malformed_error!(
                        "Sentinel in non-vararg signature - convention {:#04x}",
                        convention
                    ));
                }
                if sentinel_seen {
                    return Err(malformed_error!("Multiple sentinels in signature"));
                }
                sentinel_seen = true;
                self.parser.advance()?;
            }
            params.push(self.parse_param_span()?);
        }

        if self.parser.has_more_data() {
            return Err(malformed_error!(
                "Trailing bytes after signature - {} remaining",
                self.parser.remaining()
            ));
        }

        Ok(MethodSignature {
            convention,
            generic_param_count,
            param_count,
            ret,
            params,
        })
    }

    /// Parse a return type: optional `BYREF`, then `VOID` or a type encoding.
    fn parse_return_span(&mut self) -> Result<TypeSpan<'a>> {
        let start = self.parser.pos();

        let by_ref = self.parser.peek_byte()? == ELEMENT_TYPE::BYREF;
        if by_ref {
            self.parser.advance()?;
        }

        match self.parser.peek_byte()? {
            ELEMENT_TYPE::VOID => {
                if by_ref {
                    return Err(malformed_error!("BYREF void return type"));
                }
                self.parser.advance()?;
            }
            ELEMENT_TYPE::TYPEDBYREF => {
                return Err(malformed_error!("typedref return type is not supported"));
            }
            _ => self.parse_type()?,
        }

        Ok(TypeSpan::new(&self.parser.data()[start..self.parser.pos()]))
    }

    /// Parse a parameter type: optional `BYREF`, then a type encoding.
    fn parse_param_span(&mut self) -> Result<TypeSpan<'a>> {
        let start = self.parser.pos();

        if self.parser.peek_byte()? == ELEMENT_TYPE::BYREF {
            self.parser.advance()?;
        }
        self.parse_type()?;

        Ok(TypeSpan::new(&self.parser.data()[start..self.parser.pos()]))
    }

    /// Walk one type encoding, advancing the cursor past it.
    ///
    /// The walker validates structure without building a tree; the byte range it
    /// consumed becomes the span.
    fn parse_type(&mut self) -> Result<()> {
        self.recursion_depth += 1;
        if self.recursion_depth > MAX_RECURSION_DEPTH {
            return Err(crate::Error::RecursionLimit(MAX_RECURSION_DEPTH));
        }

        let result = self.parse_type_inner();
        self.recursion_depth -= 1;
        result
    }

    fn parse_type_inner(&mut self) -> Result<()> {
        let code = self.parser.read_le::<u8>()?;
        match code {
            _ if primitive_name(code).is_some() => Ok(()),
            ELEMENT_TYPE::CLASS | ELEMENT_TYPE::VALUETYPE => {
                self.parser.read_compressed_token()?;
                Ok(())
            }
            ELEMENT_TYPE::SZARRAY => self.parse_type(),
            ELEMENT_TYPE::ARRAY => {
                self.parse_type()?;

                let _rank = self.parser.read_compressed_uint()?;
                let num_sizes = self.parser.read_compressed_uint()?;
                for _ in 0..num_sizes {
                    self.parser.read_compressed_uint()?;
                }
                let num_lo_bounds = self.parser.read_compressed_uint()?;
                for _ in 0..num_lo_bounds {
                    // Lower bounds are compressed signed ints; the byte layout is
                    // identical to the unsigned form, and only the extent matters here.
                    self.parser.read_compressed_uint()?;
                }
                Ok(())
            }
            ELEMENT_TYPE::GENERICINST => {
                let head = self.parser.read_le::<u8>()?;
                if head != ELEMENT_TYPE::CLASS && head != ELEMENT_TYPE::VALUETYPE {
                    return Err(malformed_error!(
                        "Invalid GENERICINST head byte - {:#04x}",
                        head
                    ));
                }
                self.parser.read_compressed_token()?;

                let arg_count = self.parser.read_compressed_uint()?;
                if arg_count as usize > self.parser.remaining() {
                    return Err(malformed_error!(
                        "Generic argument count exceeds signature size - {}",
                        arg_count
                    ));
                }
                for _ in 0..arg_count {
                    self.parse_type()?;
                }
                Ok(())
            }
            ELEMENT_TYPE::VAR | ELEMENT_TYPE::MVAR => {
                self.parser.read_compressed_uint()?;
                Ok(())
            }
            // Valid in parameter position; the return-type walker rejects it
            // before reaching here.
            ELEMENT_TYPE::TYPEDBYREF => Ok(()),
            ELEMENT_TYPE::PTR | ELEMENT_TYPE::FNPTR => Err(malformed_error!(
                "Pointer types are not supported - {:#04x}",
                code
            )),
            ELEMENT_TYPE::CMOD_REQD | ELEMENT_TYPE::CMOD_OPT => Err(malformed_error!(
                "Custom modifiers are not supported - {:#04x}",
                code
            )),
            _ => Err(malformed_error!("Invalid element type - {:#04x}", code)),
        }
    }
}

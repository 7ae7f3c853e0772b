//! Type and token resolution for decoded signature spans.
//!
//! Two questions come up while assembling instrumentation code: "what token names
//! this type in the current module" (needed for `box`, `unbox.any`, `castclass`,
//! and `ldobj` operands) and "what is this type called" (needed for matching
//! configured parameter-type names). [`TypeResolver`] answers both from a
//! [`TypeSpan`] against the [`MetadataStore`].
//!
//! Primitive kinds resolve to type refs against the core library and are memoized
//! per module in the [`RewriteCache`]; token-carrying kinds reuse the token
//! embedded in the span; composite kinds are interned as type specs from the
//! span's own bytes.

use crate::{
    cache::RewriteCache,
    metadata::{
        element::{primitive_name, ELEMENT_TYPE},
        signatures::TypeSpan,
        store::{MetadataStore, ModuleId},
        token::Token,
    },
    parser::Parser,
    Result,
};

/// Resolves [`TypeSpan`]s to tokens and names within one module.
pub struct TypeResolver<'c> {
    module: ModuleId,
    /// Resolution scope for primitive type refs (the core-library assembly ref)
    corlib: Token,
    cache: &'c RewriteCache,
}

impl<'c> TypeResolver<'c> {
    /// Creates a resolver for a module, resolving primitives against the given
    /// core-library assembly ref.
    #[must_use]
    pub fn new(module: ModuleId, corlib: Token, cache: &'c RewriteCache) -> Self {
        TypeResolver {
            module,
            corlib,
            cache,
        }
    }

    /// Resolves the span to a type token usable as an instruction operand.
    ///
    /// Returns `None` for kinds that have no token representation here (`void`,
    /// `typedref`).
    ///
    /// # Errors
    /// Propagates store failures; returns [`crate::Error::Malformed`] for spans
    /// with corrupt embedded tokens.
    pub fn type_token(
        &self,
        store: &mut dyn MetadataStore,
        span: &TypeSpan<'_>,
    ) -> Result<Option<Token>> {
        let base = span.base_bytes();
        let code = base[0];

        if primitive_name(code).is_some() {
            return Ok(Some(self.primitive_ref(store, code)?));
        }

        match code {
            ELEMENT_TYPE::CLASS | ELEMENT_TYPE::VALUETYPE => {
                let mut parser = Parser::new(&base[1..]);
                Ok(Some(parser.read_compressed_token()?))
            }
            ELEMENT_TYPE::ARRAY
            | ELEMENT_TYPE::SZARRAY
            | ELEMENT_TYPE::GENERICINST
            | ELEMENT_TYPE::VAR
            | ELEMENT_TYPE::MVAR => Ok(Some(store.token_from_type_spec(base)?)),
            _ => Ok(None),
        }
    }

    /// Renders the span as a namespace-qualified type name, when one exists.
    ///
    /// Primitives render their canonical `System.*` names; class and value types
    /// ask the store for the name behind the embedded token. Composite kinds
    /// (arrays, instantiations, generic parameters) have no stable rendering and
    /// yield `None`.
    ///
    /// # Errors
    /// Propagates store failures; returns [`crate::Error::Malformed`] for spans
    /// with corrupt embedded tokens.
    pub fn type_name(
        &self,
        store: &dyn MetadataStore,
        span: &TypeSpan<'_>,
    ) -> Result<Option<String>> {
        let base = span.base_bytes();
        let code = base[0];

        if let Some(name) = primitive_name(code) {
            return Ok(Some(name.to_string()));
        }

        match code {
            ELEMENT_TYPE::CLASS | ELEMENT_TYPE::VALUETYPE => {
                let mut parser = Parser::new(&base[1..]);
                let token = parser.read_compressed_token()?;
                Ok(Some(store.type_name(token)?))
            }
            _ => Ok(None),
        }
    }

    fn primitive_ref(&self, store: &mut dyn MetadataStore, code: u8) -> Result<Token> {
        if let Some(token) = self.cache.primitive_ref(self.module, code) {
            return Ok(token);
        }

        // primitive_name() covers every code routed here
        let name = primitive_name(code)
            .ok_or_else(|| malformed_error!("Not a primitive element type - {:#04x}", code))?;
        let token = store.define_type_ref(self.corlib, name)?;
        self.cache.memoize_primitive_ref(self.module, code, token);
        Ok(token)
    }
}

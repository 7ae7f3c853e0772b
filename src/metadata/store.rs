//! Abstract metadata store interface.
//!
//! The rewriting engine never touches module images directly. Every metadata query
//! and mutation goes through [`MetadataStore`], implemented by the host embedding
//! this crate (in production a thin shim over the runtime's metadata import/emit
//! interfaces, in tests an in-memory fake).
//!
//! All mutations are definitions: existing rows are never rewritten, with the
//! single exception of [`MetadataStore::set_method_body`], which swaps a method's
//! IL body for a freshly assembled one.

use std::fmt;

use crate::{metadata::token::Token, Result};

/// Opaque identifier of a loaded module, assigned by the host runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(pub u64);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// Properties of a method definition as the store reports them.
#[derive(Debug, Clone)]
pub struct MethodProps {
    /// Token of the declaring type
    pub owner: Token,
    /// Simple method name
    pub name: String,
    /// Raw method attribute flags
    pub attributes: u32,
    /// The method signature blob
    pub signature: Vec<u8>,
    /// Relative virtual address of the body
    pub rva: u32,
    /// Raw implementation flags
    pub impl_flags: u32,
}

/// Properties of one positional parameter row.
#[derive(Debug, Clone)]
pub struct ParamProps {
    /// 1-based sequence number (0 is the return parameter)
    pub sequence: u32,
    /// Parameter name
    pub name: String,
    /// Raw parameter attribute flags
    pub attributes: u32,
}

/// Properties of one generic parameter row.
#[derive(Debug, Clone)]
pub struct GenericParamProps {
    /// 0-based position in the generic parameter list
    pub sequence: u32,
    /// Generic parameter name
    pub name: String,
    /// Raw generic parameter attribute flags
    pub attributes: u32,
    /// Constraint type tokens, in declaration order
    pub constraints: Vec<Token>,
}

/// Metadata queries and definitions against one loaded module.
///
/// Query failures for tokens the engine obtained from the store itself are hard
/// errors ([`crate::Error::Store`] or [`crate::Error::TypeNotFound`]); the engine
/// treats them as an abort of the current rewrite only.
pub trait MetadataStore {
    /// Properties of a method definition.
    fn method_props(&self, method: Token) -> Result<MethodProps>;

    /// The namespace-qualified name of a type definition or reference.
    fn type_name(&self, type_token: Token) -> Result<String>;

    /// Looks up a type definition by namespace-qualified name.
    fn find_type_def(&self, name: &str) -> Result<Option<Token>>;

    /// Enumerates the members of a type definition with the given simple name.
    fn find_members(&self, type_def: Token, name: &str) -> Result<Vec<Token>>;

    /// The blob of a standalone (local variable) signature token.
    fn standalone_signature(&self, sig_token: Token) -> Result<Vec<u8>>;

    /// The complete IL body of a method, header included.
    fn method_body(&self, method: Token) -> Result<Vec<u8>>;

    /// Parameter rows of a method, in sequence order.
    fn params(&self, method: Token) -> Result<Vec<ParamProps>>;

    /// Generic parameter rows of a method, in sequence order.
    fn generic_params(&self, method: Token) -> Result<Vec<GenericParamProps>>;

    /// Finds or defines an assembly reference with the given simple name.
    fn assembly_ref(&mut self, name: &str) -> Result<Token>;

    /// Defines (or finds an existing) type reference in the given resolution scope.
    fn define_type_ref(&mut self, scope: Token, name: &str) -> Result<Token>;

    /// Defines a member reference on the given parent with the given signature.
    fn define_member_ref(&mut self, parent: Token, name: &str, signature: &[u8]) -> Result<Token>;

    /// Defines a new method on the given type.
    fn define_method(
        &mut self,
        owner: Token,
        name: &str,
        attributes: u32,
        signature: &[u8],
        rva: u32,
        impl_flags: u32,
    ) -> Result<Token>;

    /// Defines a method-spec instantiation of a (generic) method.
    fn define_method_spec(&mut self, method: Token, instantiation: &[u8]) -> Result<Token>;

    /// Defines a parameter row on a method.
    fn define_param(&mut self, method: Token, props: &ParamProps) -> Result<Token>;

    /// Defines a generic parameter row on a method.
    fn define_generic_param(&mut self, method: Token, props: &GenericParamProps) -> Result<Token>;

    /// Interns a user string and returns its token.
    fn define_user_string(&mut self, value: &str) -> Result<Token>;

    /// Interns a local-variable signature blob and returns its standalone-sig token.
    fn token_from_local_sig(&mut self, signature: &[u8]) -> Result<Token>;

    /// Interns a type-spec blob and returns its token.
    fn token_from_type_spec(&mut self, signature: &[u8]) -> Result<Token>;

    /// Replaces the IL body of a method.
    fn set_method_body(&mut self, method: Token, body: &[u8]) -> Result<()>;
}

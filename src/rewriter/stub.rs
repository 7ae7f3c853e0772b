//! The call-forwarding stub transformation.
//!
//! [`relocate_and_forward`] clones a method (attributes, signature, parameters,
//! generic parameters, body bytes) under a new name on the same type, then
//! replaces the original body with a minimal stub that forwards every argument
//! to the clone and returns its result. Generic methods are forwarded through a
//! `MethodSpec` that re-instantiates the clone with the stub's own method type
//! parameters.
//!
//! The stub body length is computed analytically before a single byte is
//! written, so the emitted buffer is allocated at exactly its final size.

use crate::{
    metadata::{
        signatures::{method_spec_placeholder_sig, parse_method_signature},
        store::MetadataStore,
        token::Token,
    },
    rewriter::opcodes::{opcode, EXTENDED_PREFIX},
    Result,
};

/// Methods with this many arguments (receiver included) or more are left alone.
pub const MAX_FORWARDED_ARGS: u32 = 8;
/// Methods with this many generic parameters or more are left alone.
pub const MAX_FORWARDED_TYPE_ARGS: u32 = 8;

/// Encoded length of the shortest argument load for `index`.
///
/// Indices 0-3 have dedicated one-byte opcodes, 4-255 use the two-byte
/// `ldarg.s`, everything above the four-byte wide `ldarg`.
#[must_use]
pub fn ldarg_len(index: u16) -> usize {
    match index {
        0..=3 => 1,
        4..=255 => 2,
        _ => 4,
    }
}

/// A forwarding stub body, sized before emission.
#[derive(Debug, Clone, Copy)]
pub struct ForwardingStub {
    /// Method (or method-spec) token the stub calls
    pub target: Token,
    /// Number of arguments to forward, receiver included
    pub arg_slots: u16,
}

impl ForwardingStub {
    /// Length in bytes of the stub's instruction stream.
    #[must_use]
    pub fn code_len(&self) -> usize {
        let loads: usize = (0..self.arg_slots).map(ldarg_len).sum();
        loads + 5 + 1 // call <token>, ret
    }

    /// Length in bytes of the complete body, header included.
    ///
    /// Bodies under 64 bytes of code with the default stack depth fit the
    /// one-byte tiny header; larger ones take the 12-byte fat header.
    #[must_use]
    pub fn body_len(&self) -> usize {
        let code = self.code_len();
        if code < 64 {
            1 + code
        } else {
            12 + code
        }
    }

    /// Emits the stub body. The returned buffer's length always equals
    /// [`ForwardingStub::body_len`].
    #[must_use]
    pub fn emit(&self) -> Vec<u8> {
        let code_len = self.code_len();
        let mut body = Vec::with_capacity(self.body_len());

        if code_len < 64 {
            body.push(0x02 | ((code_len as u8) << 2));
        } else {
            let max_stack = u16::from(self.arg_slots.max(1));
            body.extend_from_slice(&0x3003u16.to_le_bytes()); // fat, header size 3 dwords
            body.extend_from_slice(&max_stack.to_le_bytes());
            body.extend_from_slice(&(code_len as u32).to_le_bytes());
            body.extend_from_slice(&0u32.to_le_bytes()); // no locals
        }

        for index in 0..self.arg_slots {
            match index {
                0..=3 => body.push((opcode::LDARG_0 + index) as u8),
                4..=255 => {
                    body.push(opcode::LDARG_S as u8);
                    body.push(index as u8);
                }
                _ => {
                    body.push(EXTENDED_PREFIX);
                    body.push(opcode::LDARG as u8);
                    body.extend_from_slice(&index.to_le_bytes());
                }
            }
        }
        body.push(opcode::CALL as u8);
        body.extend_from_slice(&self.target.value().to_le_bytes());
        body.push(opcode::RET as u8);

        body
    }
}

/// Clones `method` as `new_name` on its declaring type and turns the original
/// into a forwarding stub calling the clone.
///
/// Returns the clone's token, or `None` when the method is out of shape for
/// forwarding (argument or generic-parameter count at or above the caps).
///
/// # Errors
/// Propagates store failures and signature decode errors.
pub fn relocate_and_forward(
    store: &mut dyn MetadataStore,
    method: Token,
    new_name: &str,
) -> Result<Option<Token>> {
    let props = store.method_props(method)?;
    let signature = parse_method_signature(&props.signature)?;

    let arg_slots = signature.param_count + u32::from(signature.has_this());
    if arg_slots >= MAX_FORWARDED_ARGS
        || signature.generic_param_count >= MAX_FORWARDED_TYPE_ARGS
    {
        return Ok(None);
    }

    let clone = store.define_method(
        props.owner,
        new_name,
        props.attributes,
        &props.signature,
        props.rva,
        props.impl_flags,
    )?;

    for generic_param in store.generic_params(method)? {
        store.define_generic_param(clone, &generic_param)?;
    }
    for param in store.params(method)? {
        store.define_param(clone, &param)?;
    }

    let body = store.method_body(method)?;
    store.set_method_body(clone, &body)?;

    // A generic clone is called through a MethodSpec re-instantiating it with
    // the stub's own method type parameters.
    let target = if signature.is_generic() {
        let instantiation = method_spec_placeholder_sig(signature.generic_param_count)?;
        store.define_method_spec(clone, &instantiation)?
    } else {
        clone
    };

    let stub = ForwardingStub {
        target,
        arg_slots: arg_slots as u16,
    };
    store.set_method_body(method, &stub.emit())?;

    Ok(Some(clone))
}

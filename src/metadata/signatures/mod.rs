//! Method signature parsing and encoding for ECMA-335 blobs.
//!
//! Signatures encode type information, parameter lists, and calling conventions in
//! the compact binary format of ECMA-335 II.23.2. This module decodes method
//! signatures into borrowed [`TypeSpan`] descriptors and encodes the handful of
//! blobs a rewrite must produce (spliced local signatures, hook call-site
//! signatures, method-spec instantiations).
//!
//! # Binary Format
//!
//! - Calling conventions encoded as single bytes
//! - Parameter counts using compressed integers
//! - Type references using element type codes plus compressed tokens
//! - Generic parameters encoded with positional indices
//!
//! # Examples
//!
//! ```rust
//! use clrtrace::metadata::signatures::parse_method_signature;
//!
//! // instance string M(int32)
//! let signature_data = &[0x20, 0x01, 0x0E, 0x08];
//! let method_sig = parse_method_signature(signature_data)?;
//! assert!(method_sig.has_this());
//! # Ok::<(), clrtrace::Error>(())
//! ```

mod encoders;
mod parser;
mod types;

pub use encoders::{
    assembly_load_sig, before_method_sig, end_method_sig, get_instance_sig,
    method_spec_placeholder_sig, splice_trace_locals, write_compressed_token, LocalsPatch,
};
pub use parser::{parse_method_signature, SignatureParser};
pub use types::{MethodSignature, TypeSpan};

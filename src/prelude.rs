//! # clrtrace Prelude
//!
//! Convenient re-exports of the most commonly used types. A host adapter
//! typically only needs this module:
//!
//! ```rust,no_run
//! use clrtrace::prelude::*;
//!
//! let profiler = Profiler::new()?;
//! # Ok::<(), clrtrace::Error>(())
//! ```

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all clrtrace operations
pub use crate::Error;

/// The result type used throughout clrtrace
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// The callback-level tracing engine
pub use crate::profiler::Profiler;

/// The trace-target document
pub use crate::config::TraceConfig;

// ================================================================================================
// Metadata
// ================================================================================================

/// Metadata tokens
pub use crate::metadata::token::Token;

/// The abstract metadata store a host adapter implements
pub use crate::metadata::store::{MetadataStore, ModuleId};

/// Module identity captured at load time
pub use crate::cache::{ModuleIdentity, RewriteCache};

/// Signature decoding
pub use crate::metadata::signatures::{parse_method_signature, MethodSignature, TypeSpan};

// ================================================================================================
// Rewriting
// ================================================================================================

/// The IL rewriter and transformation outcomes
pub use crate::rewriter::{IlRewriter, RewriteOutcome, SkipReason, TraceRefs};

/// Low-level blob parsing utilities
pub use crate::Parser;

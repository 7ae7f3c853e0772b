//! CIL method-body rewriting.
//!
//! The pipeline is layered bottom-up: [`opcodes`] classifies the instruction
//! set, [`body`] parses and serializes body headers and exception sections,
//! [`ilrewriter`] turns a body into an editable instruction list with symbolic
//! branch targets, [`emitter`] provides typed emission over it, and [`wrapper`]
//! and [`stub`] are the two transformations built on top.

pub mod body;
pub mod emitter;
pub mod ilrewriter;
pub mod opcodes;
pub mod stub;
pub mod wrapper;

use strum::Display;

/// Why a candidate method was left uninstrumented.
///
/// Skips are expected outcomes, not failures; the method simply runs with its
/// original body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum SkipReason {
    /// The module was never announced through the load callback
    UnknownModule,
    /// The method was rewritten before (cache hit or locals guard)
    AlreadyRewritten,
    /// No configuration entry selects the method
    NotSelected,
    /// The method has no receiver; this wrapper variant needs one
    StaticMethod,
    /// By-reference return types are unsupported
    ByRefReturn,
    /// The signature blob did not decode
    UndecodableSignature,
}

/// Outcome of one rewrite request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// The new body was committed to the store
    Committed,
    /// The method was left untouched
    Skipped(SkipReason),
}

pub use body::{ClauseFlags, ExceptionClause, MethodBody};
pub use emitter::Emitter;
pub use ilrewriter::{EhClause, IlRewriter, InstrId, Operand};
pub use stub::{relocate_and_forward, ForwardingStub};
pub use wrapper::{insert_assembly_bootstrap, instrument, TraceRefs};

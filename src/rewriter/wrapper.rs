//! The tracing wrapper transformation.
//!
//! [`instrument`] rewrites a method body in place so that the original logic runs
//! inside a try/catch/finally region with entry and exit hooks around it:
//!
//! ```text
//! .locals (..original.., object captured, object exception, class ctx)
//!   ctx = TraceAgent.GetInstance().BeforeMethod(type, method, this, args[], token)
//!   try {
//!     try {
//!       ..original body, every ret turned into capture + leave..
//!     } catch (Exception e) { exception = e; rethrow }
//!   } finally { if (ctx != null) ctx.EndMethod(captured, exception) }
//!   return (T)captured   // unbox.any for value kinds
//! ```
//!
//! The whole new body and exception table are assembled in memory first; the
//! store sees a single body replacement, so a failure anywhere leaves the
//! original method untouched.
//!
//! [`insert_assembly_bootstrap`] is the lighter entry-point variant: one
//! `ldstr`/`call` pair prepended to load the managed trace agent, with no locals
//! or exception-table changes.

use crate::{
    metadata::{
        resolver::TypeResolver,
        signatures::{splice_trace_locals, LocalsPatch, MethodSignature, TypeSpan},
        store::MetadataStore,
        token::Token,
    },
    rewriter::{
        body::ClauseFlags,
        emitter::Emitter,
        ilrewriter::{EhClause, IlRewriter, Operand},
        opcodes::opcode,
        RewriteOutcome, SkipReason,
    },
    Result,
};

/// Stack depth of the entry-hook sequence (array store at its deepest).
const ENTRY_HOOK_STACK: u32 = 8;

/// Tokens of the tracing surface, defined once per module before instrumenting.
#[derive(Debug, Clone)]
pub struct TraceRefs {
    /// Type ref of the trace agent class
    pub agent_type: Token,
    /// Type ref of the per-invocation trace context class
    pub context_type: Token,
    /// Type ref of the runtime's base exception class
    pub exception_type: Token,
    /// Type ref of `System.Object` (array element for captured arguments)
    pub object_type: Token,
    /// `static object GetInstance()` on the agent
    pub get_instance: Token,
    /// `instance object BeforeMethod(string, string, object, object[], uint32)`
    pub before_method: Token,
    /// `instance void EndMethod(object, object)` on the context
    pub end_method: Token,
}

/// How one argument is captured into the `object[]`.
struct ArgCapture {
    by_ref: bool,
    element_type: u8,
    needs_box: bool,
    type_token: Option<Token>,
}

/// Applies the tracing wrapper to a method.
///
/// Shape rejections (static methods, by-reference returns, an already patched
/// local signature) come back as [`RewriteOutcome::Skipped`]; real failures
/// abort with the original body untouched.
///
/// # Errors
/// Propagates store failures and body/signature decode errors.
pub fn instrument(
    store: &mut dyn MetadataStore,
    resolver: &TypeResolver<'_>,
    refs: &TraceRefs,
    method: Token,
    type_name: &str,
    method_name: &str,
    signature: &MethodSignature<'_>,
) -> Result<RewriteOutcome> {
    if !signature.has_this() {
        return Ok(RewriteOutcome::Skipped(SkipReason::StaticMethod));
    }
    if signature.ret.is_by_ref() {
        return Ok(RewriteOutcome::Skipped(SkipReason::ByRefReturn));
    }

    let body = store.method_body(method)?;
    let mut rewriter = IlRewriter::import(&body)?;
    let first = rewriter
        .first_id()
        .ok_or_else(|| malformed_error!("Method body has no instructions"))?;
    let last_original = rewriter
        .last_id()
        .ok_or_else(|| malformed_error!("Method body has no instructions"))?;
    let original_ids = rewriter.ids();

    // Locals patch; the trailing-context-slot guard makes a second pass a no-op.
    let original_locals = if rewriter.local_var_sig.is_null() {
        None
    } else {
        Some(store.standalone_signature(rewriter.local_var_sig)?)
    };
    let patch = splice_trace_locals(
        original_locals.as_deref(),
        refs.exception_type,
        refs.context_type,
    )?;
    let LocalsPatch::Patched {
        signature: locals_sig,
        count,
    } = patch
    else {
        return Ok(RewriteOutcome::Skipped(SkipReason::AlreadyRewritten));
    };
    let captured_slot = (count - 3) as u16;
    let exception_slot = (count - 2) as u16;
    let context_slot = (count - 1) as u16;

    rewriter.local_var_sig = store.token_from_local_sig(&locals_sig)?;
    rewriter.init_locals = true;

    let type_name_str = store.define_user_string(type_name)?;
    let method_name_str = store.define_user_string(method_name)?;

    // Resolve argument and return tokens up front; emission below is infallible.
    let mut captures = Vec::with_capacity(signature.params.len());
    for span in &signature.params {
        captures.push(plan_capture(store, resolver, span)?);
    }
    let return_token = if signature.ret.is_void() {
        None
    } else {
        Some(
            resolver
                .type_token(store, &signature.ret)?
                .ok_or_else(|| malformed_error!("Return type has no token representation"))?,
        )
    };
    let return_needs_box = signature.ret.needs_boxing();

    // Entry hook, inserted at the position of the original first instruction.
    let mut entry = Emitter::before(&mut rewriter, first);
    let hook_first = entry.load_null();
    entry.store_local(captured_slot);
    entry.load_null();
    entry.store_local(exception_slot);
    entry.load_null();
    entry.store_local(context_slot);

    entry.call(refs.get_instance);
    entry.cast_class(refs.agent_type);
    entry.load_str(type_name_str);
    entry.load_str(method_name_str);
    entry.load_arg(0);
    entry.load_i4(captures.len() as i32);
    entry.new_array(refs.object_type);
    for (index, capture) in captures.iter().enumerate() {
        entry.dup();
        entry.load_i4(index as i32);
        entry.load_arg((index + 1) as u16);
        if capture.by_ref {
            let value_token = if capture.needs_box {
                capture.type_token
            } else {
                None
            };
            entry.load_indirect(capture.element_type, value_token);
        }
        if capture.needs_box {
            if let Some(token) = capture.type_token {
                entry.box_type(token);
            }
        }
        entry.store_element_ref();
    }
    entry.load_i4(method.value() as i32);
    entry.call_virt(refs.before_method);
    entry.cast_class(refs.context_type);
    entry.store_local(context_slot);

    // Catch handler: capture and rethrow.
    let mut tail = Emitter::at_end(&mut rewriter);
    let catch_first = tail.store_local(exception_slot);
    let rethrow_id = tail.rethrow();

    // Finally handler: fire the exit hook if the entry hook completed.
    let finally_first = tail.load_local(context_slot);
    let guard_target_anchor = tail.load_local(context_slot);
    tail.load_local(captured_slot);
    tail.load_local(exception_slot);
    tail.call_virt(refs.end_method);
    let end_finally = tail.end_finally();
    rewriter.insert_before(
        guard_target_anchor,
        opcode::BRFALSE,
        Operand::Target(end_finally),
    );

    // Resume point after the finally: recover the captured return value.
    let resume = match return_token {
        Some(token) => {
            let mut resume = Emitter::at_end(&mut rewriter);
            let resume_first = resume.load_local(captured_slot);
            if return_needs_box {
                resume.unbox_any(token);
            } else {
                resume.cast_class(token);
            }
            resume.emit(opcode::RET, Operand::None);
            resume_first
        }
        None => rewriter.push_back(opcode::RET, Operand::None),
    };

    // Every original ret becomes capture-and-leave.
    for id in original_ids {
        if rewriter.opcode_of(id) != opcode::RET {
            continue;
        }
        if let Some(token) = return_token {
            if return_needs_box {
                rewriter.insert_before(id, opcode::BOX, Operand::Token(token));
            }
            rewriter.insert_before(id, opcode::STLOC, Operand::Var(captured_slot));
        }
        rewriter.replace(id, opcode::LEAVE, Operand::Target(resume));
    }

    // Original clauses stay first (they are innermost), then catch, then finally.
    rewriter.add_clause(EhClause {
        flags: ClauseFlags::EXCEPTION,
        class_token: refs.exception_type,
        try_start: hook_first,
        try_last: last_original,
        handler_start: catch_first,
        handler_last: rethrow_id,
    });
    rewriter.add_clause(EhClause {
        flags: ClauseFlags::FINALLY,
        class_token: Token::nil(),
        try_start: hook_first,
        try_last: rethrow_id,
        handler_start: finally_first,
        handler_last: end_finally,
    });

    rewriter.max_stack = rewriter.max_stack.max(ENTRY_HOOK_STACK);
    store.set_method_body(method, &rewriter.export()?)?;
    Ok(RewriteOutcome::Committed)
}

fn plan_capture(
    store: &mut dyn MetadataStore,
    resolver: &TypeResolver<'_>,
    span: &TypeSpan<'_>,
) -> Result<ArgCapture> {
    let needs_box = span.needs_boxing();
    let type_token = if needs_box {
        resolver.type_token(store, span)?
    } else {
        None
    };
    Ok(ArgCapture {
        by_ref: span.is_by_ref(),
        element_type: span.element_type(),
        needs_box,
        type_token,
    })
}

/// Prepends a call to the assembly-load helper at the entry point.
///
/// Inserts `ldstr agent_path; call load_from` as the first two instructions.
/// Locals and exception clauses are untouched.
///
/// # Errors
/// Propagates store failures and body decode errors.
pub fn insert_assembly_bootstrap(
    store: &mut dyn MetadataStore,
    method: Token,
    load_from: Token,
    agent_path: &str,
) -> Result<()> {
    let body = store.method_body(method)?;
    let mut rewriter = IlRewriter::import(&body)?;
    let first = rewriter
        .first_id()
        .ok_or_else(|| malformed_error!("Entry point body has no instructions"))?;

    let path = store.define_user_string(agent_path)?;
    let mut entry = Emitter::before(&mut rewriter, first);
    entry.load_str(path);
    entry.call(load_from);

    rewriter.max_stack = rewriter.max_stack.max(1);
    store.set_method_body(method, &rewriter.export()?)
}

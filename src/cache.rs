//! Process-wide rewrite bookkeeping.
//!
//! JIT-compilation callbacks arrive concurrently and can repeat for the same
//! method (tiered compilation, re-JIT). [`RewriteCache`] is the shared state that
//! keeps the engine idempotent: module identities captured at load time, the set
//! of already-rewritten methods, the memoized primitive type refs, and the
//! process-wide one-time flags.
//!
//! All collections are [`dashmap`] maps with atomic entry operations; the one-time
//! flags are claimed with `compare_exchange`, so "at most once" holds strictly
//! even under concurrent callbacks.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    OnceLock,
};

use dashmap::DashMap;

use crate::metadata::{store::ModuleId, token::Token};

/// Simple names under which the core library shows up.
const CORE_LIBRARY_NAMES: [&str; 2] = ["mscorlib", "System.Private.CoreLib"];

/// Facts about a loaded module, captured once at module-load time.
#[derive(Debug, Clone)]
pub struct ModuleIdentity {
    /// Simple name of the owning assembly
    pub assembly_name: String,
    /// Token of the module entry-point method, nil when the module has none
    pub entry_point: Token,
}

/// Key of one method within one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MethodKey {
    module: ModuleId,
    method: Token,
}

/// Shared, thread-safe rewrite state.
#[derive(Debug, Default)]
pub struct RewriteCache {
    modules: DashMap<ModuleId, ModuleIdentity>,
    rewritten: DashMap<MethodKey, ()>,
    primitive_refs: DashMap<(ModuleId, u8), Token>,
    entry_point_claimed: AtomicBool,
    core_library: OnceLock<String>,
}

impl RewriteCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        RewriteCache::default()
    }

    /// Records a module identity. The first registration wins; repeated
    /// load callbacks for the same module are no-ops.
    pub fn register_module(&self, module: ModuleId, identity: ModuleIdentity) {
        self.modules.entry(module).or_insert(identity);
    }

    /// The identity captured for a module, if its load callback was seen.
    #[must_use]
    pub fn module_identity(&self, module: ModuleId) -> Option<ModuleIdentity> {
        self.modules.get(&module).map(|entry| entry.clone())
    }

    /// Returns `true` if the method was already rewritten.
    #[must_use]
    pub fn is_rewritten(&self, module: ModuleId, method: Token) -> bool {
        self.rewritten.contains_key(&MethodKey { module, method })
    }

    /// Marks a method as rewritten. Returns `false` if it was already marked.
    pub fn mark_rewritten(&self, module: ModuleId, method: Token) -> bool {
        self.rewritten
            .insert(MethodKey { module, method }, ())
            .is_none()
    }

    /// Claims the one-time entry-point rewrite. Exactly one caller ever
    /// receives `true`.
    pub fn try_claim_entry_point(&self) -> bool {
        self.entry_point_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Releases a taken entry-point claim so a later callback can retry after
    /// a failed rewrite.
    pub fn release_entry_point_claim(&self) {
        self.entry_point_claimed.store(false, Ordering::Release);
    }

    /// Returns `true` once the entry-point rewrite has been claimed.
    #[must_use]
    pub fn entry_point_claimed(&self) -> bool {
        self.entry_point_claimed.load(Ordering::Acquire)
    }

    /// Returns `true` if the name is one the core library loads under.
    #[must_use]
    pub fn is_core_library_name(name: &str) -> bool {
        CORE_LIBRARY_NAMES.contains(&name)
    }

    /// Records the core-library identity. Exactly one caller ever receives
    /// `true`; later calls (a second core-library flavor loading) are ignored.
    pub fn try_record_core_library(&self, name: &str) -> bool {
        self.core_library.set(name.to_string()).is_ok()
    }

    /// The recorded core-library name, if one was observed.
    #[must_use]
    pub fn core_library(&self) -> Option<&str> {
        self.core_library.get().map(String::as_str)
    }

    /// The memoized type-ref token for a primitive element code in a module.
    #[must_use]
    pub fn primitive_ref(&self, module: ModuleId, code: u8) -> Option<Token> {
        self.primitive_refs.get(&(module, code)).map(|entry| *entry)
    }

    /// Memoizes a primitive type-ref token for the lifetime of the module.
    pub fn memoize_primitive_ref(&self, module: ModuleId, code: u8, token: Token) {
        self.primitive_refs.entry((module, code)).or_insert(token);
    }
}

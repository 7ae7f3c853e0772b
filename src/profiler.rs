//! Callback-level orchestration.
//!
//! [`Profiler`] is the piece the host adapter talks to. It receives the two
//! callbacks that carry real logic - module load completion and JIT compilation
//! start - and drives configuration matching, metadata definition, and the
//! wrapper rewrite. Everything it touches goes through the [`MetadataStore`]
//! the adapter passes in; the profiler itself owns only the configuration and
//! the process-wide [`RewriteCache`].
//!
//! Both callbacks run concurrently on JIT worker threads; the cache makes
//! repeated or racing requests for the same method settle on a single rewrite.

use std::path::{Path, PathBuf};

use crate::{
    cache::{ModuleIdentity, RewriteCache},
    config::TraceConfig,
    metadata::{
        resolver::TypeResolver,
        signatures::{
            assembly_load_sig, before_method_sig, end_method_sig, get_instance_sig,
            parse_method_signature,
        },
        store::{MetadataStore, ModuleId},
        token::Token,
    },
    rewriter::{
        wrapper::{self, TraceRefs},
        RewriteOutcome, SkipReason,
    },
    selector, Error, Result,
};

/// Environment variable naming the directory with `trace.json` and the managed agent.
pub const HOME_ENV: &str = "CLRTRACE_HOME";

/// Simple name of the managed agent assembly.
const MANAGED_ASSEMBLY: &str = "ClrTrace.Managed";
/// File name of the managed agent, loaded from the configuration home.
const MANAGED_DLL: &str = "ClrTrace.Managed.dll";
/// The trace-agent class inside the managed assembly.
const AGENT_TYPE: &str = "ClrTrace.TraceAgent";
/// The per-invocation trace-context class inside the managed assembly.
const CONTEXT_TYPE: &str = "ClrTrace.MethodTrace";

const EXCEPTION_TYPE: &str = "System.Exception";
const OBJECT_TYPE: &str = "System.Object";
const ASSEMBLY_TYPE: &str = "System.Reflection.Assembly";
const LOAD_FROM: &str = "LoadFrom";
const CUSTOM_LOAD_FROM: &str = "CustomLoadFrom";

/// Name the core library falls back to before its load callback was seen.
const DEFAULT_CORE_LIBRARY: &str = "mscorlib";

/// `public static hidebysig` method attributes for the assembly-load helper.
const CUSTOM_LOAD_FROM_ATTRS: u32 = 0x0096;

/// The JIT-time tracing engine.
pub struct Profiler {
    config: TraceConfig,
    cache: RewriteCache,
    home: PathBuf,
}

impl Profiler {
    /// Creates a profiler from the process environment: reads `CLRTRACE_HOME`
    /// and loads `trace.json` from it.
    ///
    /// # Errors
    /// Returns [`Error::Config`] when `CLRTRACE_HOME` is unset.
    pub fn new() -> Result<Self> {
        let home = std::env::var_os(HOME_ENV)
            .map(PathBuf::from)
            .ok_or_else(|| Error::Config(format!("{HOME_ENV} is not set")))?;
        let config = TraceConfig::load(&home);
        tracing::info!(home = %home.display(), targets = config.instrumentation.len(), "profiler initialized");
        Ok(Profiler {
            config,
            cache: RewriteCache::new(),
            home,
        })
    }

    /// Creates a profiler from explicit parts (bypasses the environment).
    #[must_use]
    pub fn from_parts(config: TraceConfig, home: impl Into<PathBuf>) -> Self {
        Profiler {
            config,
            cache: RewriteCache::new(),
            home: home.into(),
        }
    }

    /// The shared rewrite cache.
    #[must_use]
    pub fn cache(&self) -> &RewriteCache {
        &self.cache
    }

    /// Module-load-finished callback.
    ///
    /// Registers the module identity, and on the core library's own load defines
    /// the `CustomLoadFrom` helper that the entry-point bootstrap later calls.
    ///
    /// # Errors
    /// Propagates store failures.
    pub fn on_module_load_finished(
        &self,
        store: &mut dyn MetadataStore,
        module: ModuleId,
        identity: ModuleIdentity,
    ) -> Result<()> {
        let assembly_name = identity.assembly_name.clone();
        self.cache.register_module(module, identity);
        tracing::debug!(%module, assembly = %assembly_name, "module registered");

        if RewriteCache::is_core_library_name(&assembly_name)
            && self.cache.try_record_core_library(&assembly_name)
        {
            self.define_assembly_load_helper(store)?;
        }
        Ok(())
    }

    /// JIT-compilation-started callback.
    ///
    /// # Errors
    /// Propagates store failures; signature decode failures are reported as a
    /// skip, not an error.
    pub fn on_compilation_started(
        &self,
        store: &mut dyn MetadataStore,
        module: ModuleId,
        method: Token,
    ) -> Result<RewriteOutcome> {
        let Some(identity) = self.cache.module_identity(module) else {
            return Ok(RewriteOutcome::Skipped(SkipReason::UnknownModule));
        };

        // Fast path before touching the store at all.
        if self.cache.is_rewritten(module, method) {
            return Ok(RewriteOutcome::Skipped(SkipReason::AlreadyRewritten));
        }

        // One process-wide bootstrap at the first non-core entry point. The
        // claim is only spent once the new body is committed; a store failure
        // releases it so a later callback can retry.
        if identity.entry_point == method
            && !RewriteCache::is_core_library_name(&identity.assembly_name)
            && self.cache.try_claim_entry_point()
        {
            if let Err(err) = self.bootstrap_entry_point(store, method) {
                self.cache.release_entry_point_claim();
                return Err(err);
            }
            self.cache.mark_rewritten(module, method);
            tracing::info!(%module, %method, "entry point bootstrapped");
            return Ok(RewriteOutcome::Committed);
        }

        let props = store.method_props(method)?;
        let signature = match parse_method_signature(&props.signature) {
            Ok(signature) => signature,
            Err(err) => {
                tracing::debug!(%module, %method, %err, "signature did not decode, skipping");
                return Ok(RewriteOutcome::Skipped(SkipReason::UndecodableSignature));
            }
        };
        let type_name = store.type_name(props.owner)?;

        // Name rendering never needs the primitive resolution scope.
        let name_resolver = TypeResolver::new(module, Token::nil(), &self.cache);
        let selected = selector::is_in_scope(
            &self.config,
            &identity.assembly_name,
            &type_name,
            &props.name,
            &signature,
            |span| name_resolver.type_name(store, span),
        )?;
        if !selected {
            return Ok(RewriteOutcome::Skipped(SkipReason::NotSelected));
        }

        let corlib_name = self
            .cache
            .core_library()
            .unwrap_or(DEFAULT_CORE_LIBRARY)
            .to_string();
        let corlib_ref = store.assembly_ref(&corlib_name)?;
        let managed_ref = store.assembly_ref(MANAGED_ASSEMBLY)?;

        let agent_type = store.define_type_ref(managed_ref, AGENT_TYPE)?;
        let context_type = store.define_type_ref(managed_ref, CONTEXT_TYPE)?;
        let refs = TraceRefs {
            agent_type,
            context_type,
            exception_type: store.define_type_ref(corlib_ref, EXCEPTION_TYPE)?,
            object_type: store.define_type_ref(corlib_ref, OBJECT_TYPE)?,
            get_instance: store.define_member_ref(agent_type, "GetInstance", get_instance_sig())?,
            before_method: store.define_member_ref(
                agent_type,
                "BeforeMethod",
                before_method_sig(),
            )?,
            end_method: store.define_member_ref(context_type, "EndMethod", end_method_sig())?,
        };

        let resolver = TypeResolver::new(module, corlib_ref, &self.cache);
        let outcome = wrapper::instrument(
            store,
            &resolver,
            &refs,
            method,
            &type_name,
            &props.name,
            &signature,
        )?;

        match outcome {
            RewriteOutcome::Committed => {
                self.cache.mark_rewritten(module, method);
                tracing::info!(%module, %method, %type_name, method_name = %props.name, "method instrumented");
            }
            RewriteOutcome::Skipped(reason) => {
                tracing::debug!(%module, %method, %reason, "method skipped");
            }
        }
        Ok(outcome)
    }

    /// The configuration home directory.
    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Defines `Assembly.CustomLoadFrom(string)` on the core library: a thin
    /// static helper whose body is `ldarg.0; call LoadFrom; pop; ret`.
    fn define_assembly_load_helper(&self, store: &mut dyn MetadataStore) -> Result<()> {
        let Some(assembly_type) = store.find_type_def(ASSEMBLY_TYPE)? else {
            tracing::warn!("core library has no {ASSEMBLY_TYPE}, entry-point bootstrap disabled");
            return Ok(());
        };

        let Some(load_from) = self.find_load_from(store, assembly_type)? else {
            tracing::warn!("no single-argument {LOAD_FROM} overload, entry-point bootstrap disabled");
            return Ok(());
        };

        let helper = store.define_method(
            assembly_type,
            CUSTOM_LOAD_FROM,
            CUSTOM_LOAD_FROM_ATTRS,
            assembly_load_sig(),
            0,
            0,
        )?;

        // ldarg.0, call LoadFrom, pop, ret under a tiny header
        let mut body = vec![0x02 | (8 << 2), 0x02, 0x28];
        body.extend_from_slice(&load_from.value().to_le_bytes());
        body.push(0x26);
        body.push(0x2A);
        store.set_method_body(helper, &body)?;

        tracing::info!("assembly-load helper defined on the core library");
        Ok(())
    }

    /// Picks the `LoadFrom(string)` overload among the members with that name.
    fn find_load_from(
        &self,
        store: &dyn MetadataStore,
        assembly_type: Token,
    ) -> Result<Option<Token>> {
        for member in store.find_members(assembly_type, LOAD_FROM)? {
            let props = store.method_props(member)?;
            if let Ok(signature) = parse_method_signature(&props.signature) {
                if !signature.has_this() && signature.param_count == 1 {
                    return Ok(Some(member));
                }
            }
        }
        Ok(None)
    }

    /// Prepends `CustomLoadFrom(<home>/ClrTrace.Managed.dll)` to the entry point.
    fn bootstrap_entry_point(&self, store: &mut dyn MetadataStore, method: Token) -> Result<()> {
        let corlib_name = self
            .cache
            .core_library()
            .unwrap_or(DEFAULT_CORE_LIBRARY)
            .to_string();
        let corlib_ref = store.assembly_ref(&corlib_name)?;
        let assembly_type = store.define_type_ref(corlib_ref, ASSEMBLY_TYPE)?;
        let load_helper =
            store.define_member_ref(assembly_type, CUSTOM_LOAD_FROM, assembly_load_sig())?;

        let agent_path = self.home.join(MANAGED_DLL);
        wrapper::insert_assembly_bootstrap(
            store,
            method,
            load_helper,
            &agent_path.to_string_lossy(),
        )
    }
}

//! End-to-end callback tests against an in-memory metadata store.
//!
//! These walk the full path a host adapter drives: module load, JIT
//! compilation start, selection, wrapper rewrite, and the idempotence
//! guarantees around repeated callbacks.

mod common;

use clrtrace::{
    cache::ModuleIdentity,
    config::TraceConfig,
    metadata::{store::ModuleId, token::Token},
    prelude::MetadataStore,
    rewriter::{ClauseFlags, MethodBody, RewriteOutcome, SkipReason},
    Profiler,
};
use common::{tiny_body, FakeStore};

fn trace_config(json: &str) -> TraceConfig {
    TraceConfig::from_json(json).expect("test config parses")
}

fn profiler_for(json: &str) -> Profiler {
    common::init_tracing();
    Profiler::from_parts(trace_config(json), "/opt/clrtrace")
}

/// Seeds assembly `A`, class `C`, `instance int32 M(int32)` with body `ldarg.1; ret`.
fn seed_scenario(store: &mut FakeStore) -> (Token, Token) {
    let class = store.add_type_def("C");
    let method = store.add_method(class, "M", &[0x20, 0x01, 0x08, 0x08], &tiny_body(&[0x03, 0x2A]));
    (class, method)
}

const SCENARIO_CONFIG: &str =
    r#"{"instrumentation":[{"assemblyName":"A","className":"C","methods":[{"methodName":"M"}]}]}"#;

#[test]
fn configured_method_is_instrumented() {
    let mut store = FakeStore::new();
    let (_, method) = seed_scenario(&mut store);
    let module = ModuleId(1);

    let profiler = profiler_for(SCENARIO_CONFIG);
    profiler
        .on_module_load_finished(
            &mut store,
            module,
            ModuleIdentity {
                assembly_name: "A".into(),
                entry_point: Token::nil(),
            },
        )
        .unwrap();

    let outcome = profiler
        .on_compilation_started(&mut store, module, method)
        .unwrap();
    assert_eq!(outcome, RewriteOutcome::Committed);
    assert!(profiler.cache().is_rewritten(module, method));

    let body = store.method_body(method).unwrap();
    let parsed = MethodBody::parse(&body).unwrap();

    // Catch over the body, finally over body + catch handler, nothing else.
    assert_eq!(parsed.clauses.len(), 2);
    assert_eq!(parsed.clauses[0].flags, ClauseFlags::EXCEPTION);
    assert!(parsed.clauses[1].flags.contains(ClauseFlags::FINALLY));
    assert_eq!(parsed.clauses[0].try_offset, parsed.clauses[1].try_offset);
    assert!(parsed.clauses[1].try_length > parsed.clauses[0].try_length);

    // Three fresh locals spliced onto a previously local-less method.
    let locals = store.local_sig(parsed.local_var_sig).expect("locals interned");
    assert_eq!(locals[0], 0x07);
    assert_eq!(locals[1], 3);

    // The original ret became a leave, and the int32 return is recovered
    // through unbox.any before the new terminal ret.
    assert!(parsed.code.contains(&0xDD), "original ret turned into leave");
    assert!(parsed.code.contains(&0xA5), "boxed return recovered via unbox.any");
    assert_eq!(parsed.code.last(), Some(&0x2A));

    // The entry hook interned both name strings.
    assert_eq!(parsed.max_stack, 8);
}

#[test]
fn duplicate_callback_touches_nothing() {
    let mut store = FakeStore::new();
    let (_, method) = seed_scenario(&mut store);
    let module = ModuleId(1);

    let profiler = profiler_for(SCENARIO_CONFIG);
    profiler
        .on_module_load_finished(
            &mut store,
            module,
            ModuleIdentity {
                assembly_name: "A".into(),
                entry_point: Token::nil(),
            },
        )
        .unwrap();
    profiler
        .on_compilation_started(&mut store, module, method)
        .unwrap();

    let mutations_after_first = store.mutations;
    let outcome = profiler
        .on_compilation_started(&mut store, module, method)
        .unwrap();

    assert_eq!(outcome, RewriteOutcome::Skipped(SkipReason::AlreadyRewritten));
    assert_eq!(store.mutations, mutations_after_first, "second callback mutated the store");
}

#[test]
fn locals_guard_catches_rewrites_from_a_previous_session() {
    let mut store = FakeStore::new();
    let (_, method) = seed_scenario(&mut store);
    let module = ModuleId(1);
    let identity = ModuleIdentity {
        assembly_name: "A".into(),
        entry_point: Token::nil(),
    };

    let first = profiler_for(SCENARIO_CONFIG);
    first
        .on_module_load_finished(&mut store, module, identity.clone())
        .unwrap();
    first
        .on_compilation_started(&mut store, module, method)
        .unwrap();
    let body_after_first = store.method_body(method).unwrap();

    // A fresh profiler has an empty tracking cache; only the signature guard
    // can stop the second rewrite.
    let second = profiler_for(SCENARIO_CONFIG);
    second
        .on_module_load_finished(&mut store, module, identity)
        .unwrap();
    let outcome = second
        .on_compilation_started(&mut store, module, method)
        .unwrap();

    assert_eq!(outcome, RewriteOutcome::Skipped(SkipReason::AlreadyRewritten));
    assert_eq!(store.method_body(method).unwrap(), body_after_first);
}

#[test]
fn unknown_module_is_skipped() {
    let mut store = FakeStore::new();
    let (_, method) = seed_scenario(&mut store);

    let profiler = profiler_for(SCENARIO_CONFIG);
    let outcome = profiler
        .on_compilation_started(&mut store, ModuleId(9), method)
        .unwrap();
    assert_eq!(outcome, RewriteOutcome::Skipped(SkipReason::UnknownModule));
    assert_eq!(store.mutations, 0);
}

#[test]
fn unconfigured_method_is_not_selected() {
    let mut store = FakeStore::new();
    let class = store.add_type_def("C");
    let other = store.add_method(class, "Other", &[0x20, 0x00, 0x01], &tiny_body(&[0x2A]));
    let module = ModuleId(1);

    let profiler = profiler_for(SCENARIO_CONFIG);
    profiler
        .on_module_load_finished(
            &mut store,
            module,
            ModuleIdentity {
                assembly_name: "A".into(),
                entry_point: Token::nil(),
            },
        )
        .unwrap();

    let outcome = profiler
        .on_compilation_started(&mut store, module, other)
        .unwrap();
    assert_eq!(outcome, RewriteOutcome::Skipped(SkipReason::NotSelected));
}

#[test]
fn shape_rejections_leave_the_body_alone() {
    let config = r#"{"instrumentation":[{"assemblyName":"A","className":"C","methods":[
        {"methodName":"S"},{"methodName":"R"},{"methodName":"P"}]}]}"#;

    let mut store = FakeStore::new();
    let class = store.add_type_def("C");
    // static void S()
    let static_method = store.add_method(class, "S", &[0x00, 0x00, 0x01], &tiny_body(&[0x2A]));
    // instance int32& R()
    let byref_ret = store.add_method(class, "R", &[0x20, 0x00, 0x10, 0x08], &tiny_body(&[0x2A]));
    // signature with an unsupported pointer parameter
    let pointer_param = store.add_method(class, "P", &[0x20, 0x01, 0x01, 0x0F, 0x08], &tiny_body(&[0x2A]));
    let module = ModuleId(1);

    let profiler = profiler_for(config);
    profiler
        .on_module_load_finished(
            &mut store,
            module,
            ModuleIdentity {
                assembly_name: "A".into(),
                entry_point: Token::nil(),
            },
        )
        .unwrap();

    let cases = [
        (static_method, SkipReason::StaticMethod),
        (byref_ret, SkipReason::ByRefReturn),
        (pointer_param, SkipReason::UndecodableSignature),
    ];
    for (method, reason) in cases {
        let before = store.method_body(method).unwrap();
        let outcome = profiler
            .on_compilation_started(&mut store, module, method)
            .unwrap();
        assert_eq!(outcome, RewriteOutcome::Skipped(reason));
        assert_eq!(store.method_body(method).unwrap(), before);
        assert!(!profiler.cache().is_rewritten(module, method));
    }
}

#[test]
fn core_library_load_defines_the_load_helper() {
    let mut store = FakeStore::new();
    let assembly_type = store.add_type_def("System.Reflection.Assembly");
    // static Assembly LoadFrom(string), body irrelevant
    store.add_method(assembly_type, "LoadFrom", &[0x00, 0x01, 0x1C, 0x0E], &tiny_body(&[0x2A]));

    let profiler = profiler_for("{}");
    profiler
        .on_module_load_finished(
            &mut store,
            ModuleId(1),
            ModuleIdentity {
                assembly_name: "mscorlib".into(),
                entry_point: Token::nil(),
            },
        )
        .unwrap();

    let helpers = store.find_members(assembly_type, "CustomLoadFrom").unwrap();
    assert_eq!(helpers.len(), 1);

    // ldarg.0; call LoadFrom; pop; ret under a tiny header
    let body = store.method_body(helpers[0]).unwrap();
    assert_eq!(body.len(), 9);
    assert_eq!(body[0], 0x02 | (8 << 2));
    assert_eq!(body[1], 0x02);
    assert_eq!(body[2], 0x28);
    assert_eq!(body[7], 0x26);
    assert_eq!(body[8], 0x2A);
}

#[test]
fn entry_point_is_bootstrapped_once() {
    let mut store = FakeStore::new();
    let program = store.add_type_def("App.Program");
    // static void Main()
    let main = store.add_method(program, "Main", &[0x00, 0x00, 0x01], &tiny_body(&[0x00, 0x2A]));
    let module = ModuleId(1);

    let profiler = profiler_for("{}");
    profiler
        .on_module_load_finished(
            &mut store,
            module,
            ModuleIdentity {
                assembly_name: "App".into(),
                entry_point: main,
            },
        )
        .unwrap();

    let outcome = profiler
        .on_compilation_started(&mut store, module, main)
        .unwrap();
    assert_eq!(outcome, RewriteOutcome::Committed);
    assert!(profiler.cache().entry_point_claimed());

    // The new body starts with ldstr <home>/ClrTrace.Managed.dll; call helper.
    let body = store.method_body(main).unwrap();
    let parsed = MethodBody::parse(&body).unwrap();
    assert_eq!(parsed.code[0], 0x72);
    let string_token = Token::new(u32::from_le_bytes([
        parsed.code[1],
        parsed.code[2],
        parsed.code[3],
        parsed.code[4],
    ]));
    assert_eq!(
        store.user_string(string_token),
        Some("/opt/clrtrace/ClrTrace.Managed.dll")
    );
    assert_eq!(parsed.code[5], 0x28);
    assert!(parsed.clauses.is_empty());

    // The bootstrap is recorded like any rewrite, so a repeat callback for the
    // entry point stops at the fast path instead of re-entering the pipeline.
    assert!(profiler.cache().is_rewritten(module, main));
    let mutations_after_bootstrap = store.mutations;
    let repeat = profiler
        .on_compilation_started(&mut store, module, main)
        .unwrap();
    assert_eq!(repeat, RewriteOutcome::Skipped(SkipReason::AlreadyRewritten));
    assert_eq!(store.mutations, mutations_after_bootstrap);

    // A second entry point in another module falls through to normal handling.
    let module2 = ModuleId(2);
    let main2 = store.add_method(program, "Main2", &[0x00, 0x00, 0x01], &tiny_body(&[0x2A]));
    profiler
        .on_module_load_finished(
            &mut store,
            module2,
            ModuleIdentity {
                assembly_name: "App2".into(),
                entry_point: main2,
            },
        )
        .unwrap();
    let outcome = profiler
        .on_compilation_started(&mut store, module2, main2)
        .unwrap();
    assert_eq!(outcome, RewriteOutcome::Skipped(SkipReason::NotSelected));
}

#[test]
fn failed_bootstrap_releases_the_entry_point_claim() {
    let mut store = FakeStore::new();
    let program = store.add_type_def("App.Program");
    // The entry point has no body yet, so the first bootstrap attempt fails
    // when the rewrite tries to read it.
    let main = store
        .define_method(program, "Main", 0x0096, &[0x00, 0x00, 0x01], 0x2050, 0)
        .unwrap();
    let module = ModuleId(1);

    let profiler = profiler_for("{}");
    profiler
        .on_module_load_finished(
            &mut store,
            module,
            ModuleIdentity {
                assembly_name: "App".into(),
                entry_point: main,
            },
        )
        .unwrap();

    assert!(profiler
        .on_compilation_started(&mut store, module, main)
        .is_err());
    assert!(!profiler.cache().entry_point_claimed());
    assert!(!profiler.cache().is_rewritten(module, main));

    // Once the body is readable, a later callback still gets the bootstrap.
    store.set_method_body(main, &tiny_body(&[0x2A])).unwrap();
    let outcome = profiler
        .on_compilation_started(&mut store, module, main)
        .unwrap();
    assert_eq!(outcome, RewriteOutcome::Committed);
    assert!(profiler.cache().entry_point_claimed());
    let body = store.method_body(main).unwrap();
    assert_eq!(MethodBody::parse(&body).unwrap().code[0], 0x72);
}

#[test]
fn param_constrained_selection_resolves_names() {
    let config = r#"{"instrumentation":[{"assemblyName":"A","className":"C","methods":[
        {"methodName":"M","paramsName":"System.Int32"}]}]}"#;

    let mut store = FakeStore::new();
    let class = store.add_type_def("C");
    let matching = store.add_method(class, "M", &[0x20, 0x01, 0x08, 0x08], &tiny_body(&[0x03, 0x2A]));
    let module = ModuleId(1);

    let profiler = profiler_for(config);
    profiler
        .on_module_load_finished(
            &mut store,
            module,
            ModuleIdentity {
                assembly_name: "A".into(),
                entry_point: Token::nil(),
            },
        )
        .unwrap();

    let outcome = profiler
        .on_compilation_started(&mut store, module, matching)
        .unwrap();
    assert_eq!(outcome, RewriteOutcome::Committed);
}

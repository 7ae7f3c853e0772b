//! Body-structure tests for the tracing wrapper, driven directly against the
//! transformation rather than through the profiler callbacks.

mod common;

use clrtrace::{
    cache::RewriteCache,
    metadata::{
        resolver::TypeResolver,
        signatures::{
            before_method_sig, end_method_sig, get_instance_sig, parse_method_signature,
        },
        store::ModuleId,
    },
    prelude::MetadataStore,
    rewriter::{wrapper, MethodBody, RewriteOutcome, TraceRefs},
};
use common::{tiny_body, FakeStore};

fn trace_refs(store: &mut FakeStore) -> TraceRefs {
    common::init_tracing();
    let corlib = store.assembly_ref("mscorlib").unwrap();
    let managed = store.assembly_ref("ClrTrace.Managed").unwrap();
    let agent_type = store.define_type_ref(managed, "ClrTrace.TraceAgent").unwrap();
    let context_type = store.define_type_ref(managed, "ClrTrace.MethodTrace").unwrap();
    TraceRefs {
        agent_type,
        context_type,
        exception_type: store.define_type_ref(corlib, "System.Exception").unwrap(),
        object_type: store.define_type_ref(corlib, "System.Object").unwrap(),
        get_instance: store
            .define_member_ref(agent_type, "GetInstance", get_instance_sig())
            .unwrap(),
        before_method: store
            .define_member_ref(agent_type, "BeforeMethod", before_method_sig())
            .unwrap(),
        end_method: store
            .define_member_ref(context_type, "EndMethod", end_method_sig())
            .unwrap(),
    }
}

#[test]
fn every_original_ret_becomes_a_leave() {
    let mut store = FakeStore::new();
    let class = store.add_type_def("C");
    // instance void M(int32) with two returns behind a branch
    let method = store.add_method(
        class,
        "M",
        &[0x20, 0x01, 0x01, 0x08],
        &tiny_body(&[0x03, 0x2C, 0x01, 0x2A, 0x2A]),
    );
    let refs = trace_refs(&mut store);
    let corlib = store.assembly_ref("mscorlib").unwrap();
    let cache = RewriteCache::new();
    let resolver = TypeResolver::new(ModuleId(1), corlib, &cache);

    let signature = parse_method_signature(&[0x20, 0x01, 0x01, 0x08]).unwrap();
    let outcome = wrapper::instrument(
        &mut store, &resolver, &refs, method, "C", "M", &signature,
    )
    .unwrap();
    assert_eq!(outcome, RewriteOutcome::Committed);

    let parsed_body = store.method_body(method).unwrap();
    let parsed = MethodBody::parse(&parsed_body).unwrap();
    let leaves = parsed.code.iter().filter(|b| **b == 0xDD).count();
    assert_eq!(leaves, 2, "both original rets converted");
    // Void return: no capture recovery, a single fresh terminal ret.
    let rets = parsed.code.iter().filter(|b| **b == 0x2A).count();
    assert_eq!(rets, 1);
    assert!(!parsed.code.contains(&0xA5), "void methods unbox nothing");
}

#[test]
fn by_ref_arguments_are_dereferenced_before_boxing() {
    let mut store = FakeStore::new();
    let class = store.add_type_def("C");
    // instance void M(int32&)
    let method = store.add_method(
        class,
        "M",
        &[0x20, 0x01, 0x01, 0x10, 0x08],
        &tiny_body(&[0x2A]),
    );
    let refs = trace_refs(&mut store);
    let corlib = store.assembly_ref("mscorlib").unwrap();
    let cache = RewriteCache::new();
    let resolver = TypeResolver::new(ModuleId(1), corlib, &cache);

    let signature = parse_method_signature(&[0x20, 0x01, 0x01, 0x10, 0x08]).unwrap();
    wrapper::instrument(&mut store, &resolver, &refs, method, "C", "M", &signature).unwrap();

    let body = store.method_body(method).unwrap();
    let parsed = MethodBody::parse(&body).unwrap();
    assert!(parsed.code.contains(&0x4A), "ldind.i4 before capture");
    assert!(parsed.code.contains(&0x8C), "boxed after dereference");
}

#[test]
fn existing_locals_are_preserved_in_the_splice() {
    let mut store = FakeStore::new();
    let class = store.add_type_def("C");
    let locals_token = store.token_from_local_sig(&[0x07, 0x01, 0x08]).unwrap();

    // Fat body with one int32 local: ldloc.0 unused, just ret.
    let mut body = vec![0x13, 0x30, 0x02, 0x00, 0x01, 0x00, 0x00, 0x00];
    body.extend_from_slice(&locals_token.value().to_le_bytes());
    body.push(0x2A);
    let method = store.add_method(class, "M", &[0x20, 0x00, 0x01], &body);

    let refs = trace_refs(&mut store);
    let corlib = store.assembly_ref("mscorlib").unwrap();
    let cache = RewriteCache::new();
    let resolver = TypeResolver::new(ModuleId(1), corlib, &cache);

    let signature = parse_method_signature(&[0x20, 0x00, 0x01]).unwrap();
    wrapper::instrument(&mut store, &resolver, &refs, method, "C", "M", &signature).unwrap();

    let body = store.method_body(method).unwrap();
    let parsed = MethodBody::parse(&body).unwrap();
    let locals = store.local_sig(parsed.local_var_sig).unwrap();
    assert_eq!(locals[0], 0x07);
    assert_eq!(locals[1], 4, "one original plus three spliced slots");
    assert_eq!(locals[2], 0x08, "original slot kept in place");
    assert_eq!(locals[3], 0x1C, "capture slot is object");
}

#[test]
fn second_instrumentation_hits_the_signature_guard() {
    let mut store = FakeStore::new();
    let class = store.add_type_def("C");
    let method = store.add_method(class, "M", &[0x20, 0x00, 0x01], &tiny_body(&[0x2A]));

    let refs = trace_refs(&mut store);
    let corlib = store.assembly_ref("mscorlib").unwrap();
    let cache = RewriteCache::new();
    let resolver = TypeResolver::new(ModuleId(1), corlib, &cache);
    let signature = parse_method_signature(&[0x20, 0x00, 0x01]).unwrap();

    let first = wrapper::instrument(&mut store, &resolver, &refs, method, "C", "M", &signature)
        .unwrap();
    assert_eq!(first, RewriteOutcome::Committed);
    let body_after_first = store.method_body(method).unwrap();

    let second = wrapper::instrument(&mut store, &resolver, &refs, method, "C", "M", &signature)
        .unwrap();
    assert!(matches!(second, RewriteOutcome::Skipped(_)));
    assert_eq!(store.method_body(method).unwrap(), body_after_first);
}

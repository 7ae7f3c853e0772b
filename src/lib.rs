// Copyright 2026 the clrtrace contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]

//! # clrtrace
//!
//! The runtime-agnostic core of a JIT-time CLR method tracer: ECMA-335 signature
//! decoding, CIL method-body rewriting, and the orchestration that decides which
//! methods get instrumented and defines the metadata they need.
//!
//! The crate contains no runtime interop of its own. A host adapter (a native
//! profiler shim registered with the CLR) forwards two callbacks - module load
//! finished and JIT compilation started - and provides a
//! [`metadata::store::MetadataStore`] implementation over the runtime's metadata
//! import/emit interfaces. Everything else happens here, and everything here is
//! testable against an in-memory store.
//!
//! ## Features
//!
//! - **Signature decoding** - exact, bounds-checked parsing of `MethodDefSig`
//!   blobs with borrowed per-type spans and boxing classification
//! - **Body rewriting** - an instruction-list IL rewriter with symbolic branch
//!   targets, automatic short-branch widening, and exception-table editing
//! - **Tracing wrapper** - wraps method bodies in try/catch/finally with entry
//!   and exit hooks, capturing receiver, arguments, return value, and exceptions
//! - **Forwarding stubs** - clones a method and replaces the original with a
//!   minimal, analytically sized forwarding body
//! - **Concurrency-safe bookkeeping** - lock-free caches keep racing JIT
//!   callbacks idempotent
//!
//! ## Quick Start
//!
//! ```rust
//! use clrtrace::metadata::signatures::parse_method_signature;
//!
//! // instance string-returning method taking (string, int32)
//! let sig = parse_method_signature(&[0x20, 0x02, 0x0E, 0x0E, 0x08])?;
//! assert!(sig.has_this());
//! assert_eq!(sig.params.len(), 2);
//! assert!(!sig.params[0].needs_boxing()); // string is a reference type
//! assert!(sig.params[1].needs_boxing()); // int32 must be boxed for capture
//! # Ok::<(), clrtrace::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`parser`] - byte-level reader/writer for blobs and bodies, including the
//!   ECMA-335 compressed integer and token encodings
//! - [`metadata`] - tokens, element-type tables, signature decoding and
//!   encoding, the abstract metadata store, and type/token resolution
//! - [`config`] / [`selector`] - the `trace.json` document and the
//!   first-match-wins scope decision
//! - [`rewriter`] - body headers, the IL rewriter, and the wrapper and stub
//!   transformations
//! - [`cache`] - process-wide rewrite bookkeeping shared across JIT threads
//! - [`profiler`] - the callback-level entry points a host adapter drives

#[macro_use]
pub(crate) mod error;

pub mod cache;
pub mod config;
pub mod metadata;
pub mod parser;
pub mod prelude;
pub mod profiler;
pub mod rewriter;
pub mod selector;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

pub use error::Error;
pub use parser::Parser;
pub use profiler::Profiler;

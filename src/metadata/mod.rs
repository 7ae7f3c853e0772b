//! Metadata concerns: tokens, element codes, signatures, and the store seam.
//!
//! Everything the rewriting engine knows about ECMA-335 metadata lives here.
//!
//! # Key Components
//!
//! - [`token`] - Metadata table row references
//! - [`element`] - Element-type and calling-convention byte codes
//! - [`signatures`] - Method signature decoding into borrowed spans, plus the
//!   handful of signature encoders a rewrite needs
//! - [`store`] - The [`store::MetadataStore`] trait the host implements
//! - [`resolver`] - Span-to-token and span-to-name resolution

pub mod element;
pub mod resolver;
pub mod signatures;
pub mod store;
pub mod token;

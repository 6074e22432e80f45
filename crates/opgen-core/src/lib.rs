//! Generates engine-backed C++ operator implementations from annotated host
//! declarations and declarative op graphs.

pub mod classify;
pub mod diagnostics;
pub mod emit;
pub mod generator;
pub mod graph;
pub mod host;
pub mod lexer;
pub mod link;
pub mod mapping;
pub mod metadata;
pub mod options;
pub mod schema;
pub mod writer;

mod cursor;
mod util;

pub use diagnostics::{diagnostic_of, Diagnostic, DiagnosticCode};
pub use generator::{GenerationOutput, Generator};
pub use graph::{GraphBuilder, NodeId, OpGraph, Value};
pub use mapping::{Mapping, MappingFile, MappingTable};
pub use options::GeneratorOptions;

/// SHA-256 of `bytes` as lowercase hex, as written in the output prelude.
pub fn source_sha256(bytes: &[u8]) -> String {
    util::sha256_hex(bytes)
}

//! Stack manifests.
//!
//! A manifest is the evaluated result of a stack file: every declared
//! resource and every named output, ready to be validated into a graph.

mod types;

pub use types::*;

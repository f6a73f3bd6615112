//! Resource declarations and their typed specs.

mod spec;
mod types;

pub use spec::*;
pub use types::*;

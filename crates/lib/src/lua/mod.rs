//! Lua runtime for stack files.
//!
//! - [`globals`] - the `stack` table and resource constructors
//! - [`convert`] - Lua values to props and back
//! - [`runtime`] - VM creation and file loading

pub mod convert;
pub mod globals;
pub mod runtime;

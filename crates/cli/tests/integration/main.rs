//! CLI integration tests.

mod apply_tests;
mod common;
mod destroy_tests;

//! End-to-end tests of the library against the filesystem-backed provider.

mod stack_tests;

//! sitestack-lib: declare, order and reconcile a static website stack.
//!
//! A stack is a Lua file that declares resources:
//! - a public storage bucket with uploaded site content
//! - a function with its execution role
//! - an HTTP API routing every request to that function
//!
//! Evaluation produces a `Manifest`. The manifest becomes a validated
//! `ResourceGraph`, which `execute::apply` reconciles against a `Provider`
//! wave by wave before publishing the stack's outputs.

pub mod asset;
pub mod consts;
pub mod eval;
pub mod execute;
pub mod graph;
pub mod init;
pub mod lua;
pub mod manifest;
pub mod outputs;
pub mod placeholder;
pub mod platform;
pub mod policy;
pub mod provider;
pub mod resource;
pub mod snapshot;
pub mod state_lock;
pub mod util;

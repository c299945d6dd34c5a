//! Harbormaster server library
//!
//! Hosts the edge tunnel accept loop and wires the registry, environment
//! store, reconciler, and HTTP API together.

pub mod server;

pub use server::{EdgeServer, EdgeServerConfig};

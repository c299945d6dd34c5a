//! Edge agent library
//!
//! Dial-out client that maintains a persistent tunnel to the Harbormaster
//! server. The agent registers its environment on a control stream, answers
//! heartbeat pings, and reconnects with exponential backoff when the tunnel
//! drops.

pub mod agent;

pub use agent::{Agent, AgentConfig, AgentError};

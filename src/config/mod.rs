//! Configuration management
//!
//! Node settings: network addresses, mining policy, discovery and
//! connection limits.

pub mod settings;

pub use settings::{Settings, MAX_DIFFICULTY};

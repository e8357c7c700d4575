//! Sandbox containers and the manager for named scripting environments
//!
//! Each environment owns one container: the mutable global store scripts
//! write undeclared assignments into. The manager keeps a "default"
//! environment alive and tracks which one is active.

mod manager;
mod types;

pub use manager::{ContainerManager, DEFAULT_CONTAINER};
pub use types::SandboxContainer;

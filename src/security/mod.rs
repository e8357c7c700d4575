//! Name-resolution isolation for sandboxed scripts

pub mod allowlist;
pub mod isolation;

pub use allowlist::{is_global_self_reference, AllowList, Profile, GLOBAL_SELF_REFERENCES};
pub use isolation::IsolationView;

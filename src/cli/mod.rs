//! CLI command handling

pub mod context;
pub mod output;

pub use context::{material_signature, ConnectArgs, Context};
pub use output::*;

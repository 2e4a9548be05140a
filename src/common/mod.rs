//! Shared building blocks.

mod env;
mod shared;

pub(crate) use env::{env_bool_opt, env_opt, env_parse};
pub use shared::SharedCell;

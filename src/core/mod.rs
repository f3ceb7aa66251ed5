//! Escape codec and the batched output path.

pub mod escape;
pub mod output;

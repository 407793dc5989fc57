//! Small crate-internal helpers

pub mod bounded;
pub mod sync;

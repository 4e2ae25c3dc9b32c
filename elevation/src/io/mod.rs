//! Retrieval, decoding and scheduling of elevation tiles.

pub mod codec;
pub mod loader;
pub mod scheduler;
pub mod source;

//! Addressing and message types shared by every ccnsim crate.

pub mod chunk;
pub mod packets;

pub use chunk::*;
pub use packets::*;

//! Click merchant API primitives: signatures, wire types, pay links.

pub mod link;
pub mod signature;
pub mod types;

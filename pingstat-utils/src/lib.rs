//! Utility library for the pingstat project

pub mod serde;

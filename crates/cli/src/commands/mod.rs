//! Command implementations

pub mod query;
pub mod reconstruct;
pub mod validate;

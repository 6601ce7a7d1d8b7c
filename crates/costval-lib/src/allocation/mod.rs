//! Allocation API access
//!
//! The allocation API is a comparison oracle: reconstructed quantities are
//! checked against the figures it reports per aggregate.

mod client;
mod model;

pub use client::{AllocationClient, ALLOCATION_PATH};
pub use model::{Allocation, AllocationResponse};

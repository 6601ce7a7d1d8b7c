//! Query construction for the metrics engine
//!
//! A [`QuerySpec`] is a declarative description of one query. Rendering is a
//! pure function of the spec: filters are kept sorted so that equivalent specs
//! always produce byte-identical query strings and URLs.

mod builder;
mod duration;

pub use builder::{QuerySpec, QUERY_PATH};
pub use duration::{format_duration, parse_duration};

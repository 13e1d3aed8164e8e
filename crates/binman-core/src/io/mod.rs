//! Network and archive IO.

pub mod extract;
pub mod fetch;

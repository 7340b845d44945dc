//! Utility library for the commwatch project

pub mod bgp_utils;
pub mod other;
pub mod serde;

//! Data structures.

pub mod config;
pub mod target;
pub mod token;

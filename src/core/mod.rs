//! Core types: errors, configuration, diagnostic logging setup.

pub mod config;
pub mod errors;
pub mod logging;

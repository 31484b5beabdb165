//! # polyglot-core
//!
//! Core types, traits, configuration, and error handling for Polyglot.

pub mod config;
pub mod entry;
pub mod error;
pub mod lang;
pub mod message;
pub mod persist;
pub mod traits;

pub use config::shellexpand;
pub use lang::Lang;

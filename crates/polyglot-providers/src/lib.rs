//! # polyglot-providers
//!
//! External machine translation backends for Polyglot.

pub mod google;

pub use google::GoogleTranslator;

//! Core definitions shared by all namedex-* crates: the error type, the `Result` alias
//! and a couple of validation macros.

pub mod error;
pub mod macros;
pub mod result;

pub use result::Result;

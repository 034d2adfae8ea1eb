//! Command implementations for namedex-cmd

pub mod generate;
pub mod inspect;
pub mod lookup;

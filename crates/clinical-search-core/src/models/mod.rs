//! Domain models for the clinical search system.

mod code_entry;
mod drug;

pub use code_entry::*;
pub use drug::*;

//! Record types flowing through the pagination engine.

pub mod record;

pub use record::*;

//! Session credential models.

pub mod token;

pub use token::*;

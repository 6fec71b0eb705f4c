//! Architecture support.
//!
//! Only the saved-frame layout and the interrupt-mask helpers live here;
//! the exception-vector table and the mode-switch trampolines are
//! provided by the board crate that links this library.

pub mod aarch64;

pub use aarch64::context::Context;

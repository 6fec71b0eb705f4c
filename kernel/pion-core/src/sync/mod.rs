//! Synchronization primitives.

mod traplock;

pub use traplock::TrapLock;

//! Kernel tunables.

/// Maximum number of live processes and threads.
pub const PROC_MAX: usize = 128;

/// Per-process file descriptor table size.
pub const FD_MAX: usize = 32;

/// Per-address-space lock slot count.
pub const LOCK_MAX: usize = 16;

/// Upper bound on the preemption-masking critical counter.
///
/// The timer decrements the counter one tick at a time, so a critical
/// section can defer preemption for at most this many ticks.
pub const CRITICAL_MAX: u32 = 4;

/// Pipe ring-buffer capacity in bytes.
pub const PIPE_BUF_SIZE: usize = 4096;

/// Kernel event queue depth; overflow drops the oldest event.
pub const KEV_MAX: usize = 64;

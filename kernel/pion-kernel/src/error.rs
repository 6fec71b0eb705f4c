//! Kernel-internal error kinds.
//!
//! Operations inside the kernel return `Result<T, KernError>` and
//! propagate with `?`; the syscall dispatcher flattens errors to the
//! scalar ABI at the very edge.

use pion_syscall::{RET_DEAD, RET_ERR};

/// The failure kinds a core operation can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernError {
    /// Name or pid does not resolve.
    NotFound,
    /// A handle (node, fd, lock slot) is stale or out of range.
    BadHandle,
    /// The caller lacks the required privilege.
    Denied,
    /// The object is still referenced or already claimed.
    Busy,
    /// A table or slot is exhausted.
    NoSpace,
    /// The IPC peer has no entry or is unrecoverable.
    Dead,
    /// Malformed argument.
    Invalid,
}

impl KernError {
    /// Flattens the error to the scalar syscall return convention.
    pub fn to_scalar(self) -> i64 {
        match self {
            Self::Dead => RET_DEAD,
            _ => RET_ERR,
        }
    }
}

/// Shorthand for kernel-internal results.
pub type KernResult<T> = Result<T, KernError>;

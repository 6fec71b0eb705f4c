//! Blocking byte-buffer pipes.
//!
//! A pipe is one VFS node of type `Pipe` carrying a bounded ring buffer.
//! Both descriptors returned by `pipe_open` are writable; "read end" and
//! "write end" differ only in which operation the holder invokes. A
//! blocked peer observes EOF once fewer than two references remain on
//! the node.

use planck_noalloc::ringbuf::RingBuf;

use pion_core::id::Fd;

use crate::config::PIPE_BUF_SIZE;
use crate::error::{KernError, KernResult};
use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::proc::WaitToken;
use crate::vfs::{NodeHandle, NodeKind};

/// The bounded FIFO behind a pipe node.
pub struct PipeBuf {
    ring: RingBuf<u8, PIPE_BUF_SIZE>,
}

impl PipeBuf {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self {
            ring: RingBuf::new(),
        }
    }

    /// Copies out up to `out.len()` bytes; returns the count.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        for (i, slot) in out.iter_mut().enumerate() {
            match self.ring.pop() {
                Some(byte) => *slot = byte,
                None => return i,
            }
        }
        out.len()
    }

    /// Copies in up to `data.len()` bytes; returns the count.
    pub fn write(&mut self, data: &[u8]) -> usize {
        for (i, byte) in data.iter().enumerate() {
            if self.ring.try_push(*byte).is_err() {
                return i;
            }
        }
        data.len()
    }
}

impl Default for PipeBuf {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of one pipe transfer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeIo {
    /// Bytes moved.
    Data(usize),
    /// No peer remains; the stream is over.
    Eof,
    /// Nothing moved but a peer exists; retry or block.
    Retry,
}

/// Creates a pipe node and opens it twice for the running process.
///
/// # Errors
///
/// Propagates descriptor-table exhaustion; the node is rolled back.
pub fn open<P: Platform>(k: &mut Kernel<P>) -> KernResult<(Fd, Fd)> {
    let pid = k.procs.current_pid().ok_or(KernError::NotFound)?;
    let node = k.vfs.new_node("pipe", NodeKind::Pipe);
    if let Some(n) = k.vfs.node_mut(node) {
        n.pipe = Some(PipeBuf::new());
        n.data = node.pack();
    }

    let fd0 = k.with_fds(pid, |k, fds| k.vfs.open(fds, node, true));
    let fd0 = match fd0 {
        Some(Ok(fd)) => fd,
        _ => {
            let _ = k.vfs.del(node);
            return Err(KernError::NoSpace);
        }
    };
    let fd1 = k.with_fds(pid, |k, fds| k.vfs.open(fds, node, true));
    match fd1 {
        Some(Ok(fd)) => Ok((fd0, fd)),
        _ => {
            let _ = k.close_fd(pid, fd0);
            Err(KernError::NoSpace)
        }
    }
}

/// Reads from a pipe node into `out`, waking peers parked on the buffer.
///
/// # Errors
///
/// [`KernError::BadHandle`] when `node` is not a live pipe.
pub fn read<P: Platform>(
    k: &mut Kernel<P>,
    node: NodeHandle,
    out: &mut [u8],
) -> KernResult<PipeIo> {
    let (n, refs) = {
        let n = k.vfs.node_mut(node).ok_or(KernError::BadHandle)?;
        let buf = n.pipe.as_mut().ok_or(KernError::BadHandle)?;
        (buf.read(out), n.refs)
    };
    k.procs.wakeup(WaitToken::pipe(node));
    if n > 0 {
        Ok(PipeIo::Data(n))
    } else if refs < 2 {
        Ok(PipeIo::Eof)
    } else {
        Ok(PipeIo::Retry)
    }
}

/// Writes `data` into a pipe node, waking peers parked on the buffer.
///
/// # Errors
///
/// [`KernError::BadHandle`] when `node` is not a live pipe.
pub fn write<P: Platform>(
    k: &mut Kernel<P>,
    node: NodeHandle,
    data: &[u8],
) -> KernResult<PipeIo> {
    let (n, refs) = {
        let n = k.vfs.node_mut(node).ok_or(KernError::BadHandle)?;
        let buf = n.pipe.as_mut().ok_or(KernError::BadHandle)?;
        (buf.write(data), n.refs)
    };
    k.procs.wakeup(WaitToken::pipe(node));
    if n > 0 {
        Ok(PipeIo::Data(n))
    } else if refs < 2 {
        Ok(PipeIo::Eof)
    } else {
        Ok(PipeIo::Retry)
    }
}

//! Single source of truth for pion syscall definitions.
//!
//! Both the kernel dispatcher and user-space wrappers build against this
//! crate, so the opcode values, scalar result conventions and `#[repr(C)]`
//! structures here are the whole ABI. Scalar results travel in the first
//! general register of the saved frame; structured results are written
//! into user-supplied buffers passed as pointers. The `userspace`
//! feature additionally exposes the raw `stubs` that user-side
//! libraries issue traps through.
//!
//! Result conventions (per syscall, see each kernel handler):
//! - [`RET_ERR`] — not found, invalid handle, or denied;
//! - [`RET_DEAD`] — IPC channel has no entry or is unrecoverable;
//! - `0` — success, or "retry" for non-blocking pipe operations;
//! - a negative scalar stored while the caller is blocked is a retry
//!   sentinel: the caller re-executes the syscall after wakeup.

#![no_std]

/// Generic failure: not found, invalid handle, or denied.
pub const RET_ERR: i64 = -1;

/// IPC channel dead: no entry registered, or the server is unrecoverable.
pub const RET_DEAD: i64 = -2;

// ── Syscall opcodes ─────────────────────────────────────────────────────

/// Terminate the current process with an exit code.
pub const SYS_EXIT: u32 = 0;
/// Duplicate the current process; child returns 0.
pub const SYS_FORK: u32 = 1;
/// Create a thread sharing the caller's address space.
pub const SYS_THREAD: u32 = 2;
/// Detach from the parent (no zombie kept at exit).
pub const SYS_DETACH: u32 = 3;
/// Wait for a child to exit and reap it.
pub const SYS_WAIT_PID: u32 = 4;
/// Replace the current image with an ELF binary.
pub const SYS_EXEC_ELF: u32 = 5;
/// Sleep for at least the given number of microseconds.
pub const SYS_USLEEP: u32 = 6;
/// Terminate another process (owner-checked).
pub const SYS_KILL: u32 = 7;
/// Yield the CPU to the next READY process.
pub const SYS_YIELD: u32 = 8;
/// Current process id (thread's owning process).
pub const SYS_GET_PID: u32 = 9;
/// Look up a pid by registered global name.
pub const SYS_GET_PID_BY_GNAME: u32 = 10;
/// Current thread id, or -1 when not a thread.
pub const SYS_GET_THREAD_ID: u32 = 11;

/// Set the current working directory string.
pub const SYS_PROC_SET_CWD: u32 = 12;
/// Copy the current working directory into a user buffer.
pub const SYS_PROC_GET_CWD: u32 = 13;
/// Register a unique global name for the current process.
pub const SYS_PROC_SET_GNAME: u32 = 14;
/// Change the owner UID (privileged only).
pub const SYS_PROC_SET_UID: u32 = 15;
/// Current owner UID.
pub const SYS_PROC_GET_UID: u32 = 16;
/// Copy another process's command string into a user buffer.
pub const SYS_PROC_GET_CMD: u32 = 17;

/// Allocate from the process heap.
pub const SYS_MALLOC: u32 = 18;
/// Free a process heap allocation.
pub const SYS_FREE: u32 = 19;
/// Allocate a shared-memory region.
pub const SYS_PROC_SHM_ALLOC: u32 = 20;
/// Map a shared-memory region into the current process.
pub const SYS_PROC_SHM_MAP: u32 = 21;
/// Unmap a shared-memory region from the current process.
pub const SYS_PROC_SHM_UNMAP: u32 = 22;
/// Add a reference to a shared-memory region.
pub const SYS_PROC_SHM_REF: u32 = 23;
/// Map the MMIO window (privileged only).
pub const SYS_MMIO_MAP: u32 = 24;
/// Map the framebuffer (privileged only).
pub const SYS_FRAMEBUFFER_MAP: u32 = 25;

/// Resolve a path to node info.
pub const SYS_VFS_GET: u32 = 26;
/// List the children of a node.
pub const SYS_VFS_KIDS: u32 = 27;
/// Update a node's user-visible info.
pub const SYS_VFS_SET: u32 = 28;
/// Link a node under a parent.
pub const SYS_VFS_ADD: u32 = 29;
/// Delete an unreferenced node.
pub const SYS_VFS_DEL: u32 = 30;
/// Allocate a fresh unlinked node.
pub const SYS_VFS_NEW_NODE: u32 = 31;
/// Mount info for the filesystem owning a node.
pub const SYS_VFS_GET_MOUNT: u32 = 32;
/// Mount info by mount id.
pub const SYS_VFS_GET_MOUNT_BY_ID: u32 = 33;
/// Overlay a subtree onto a node.
pub const SYS_VFS_MOUNT: u32 = 34;
/// Remove an overlay, restoring the underlying node.
pub const SYS_VFS_UMOUNT: u32 = 35;
/// Open a node for a process, returning an fd.
pub const SYS_VFS_OPEN: u32 = 36;
/// Close one of the caller's fds.
pub const SYS_VFS_PROC_CLOSE: u32 = 37;
/// Reposition an fd's cursor.
pub const SYS_VFS_PROC_SEEK: u32 = 38;
/// Read an fd's cursor.
pub const SYS_VFS_PROC_TELL: u32 = 39;
/// Node info + ufid for another process's fd (privileged only).
pub const SYS_VFS_GET_BY_FD: u32 = 40;
/// Node info + ufid for one of the caller's fds.
pub const SYS_VFS_PROC_GET_BY_FD: u32 = 41;
/// Duplicate an fd into the lowest free slot.
pub const SYS_VFS_PROC_DUP: u32 = 42;
/// Duplicate an fd into a chosen slot.
pub const SYS_VFS_PROC_DUP2: u32 = 43;

/// Create a pipe; returns two writable fds.
pub const SYS_PIPE_OPEN: u32 = 44;
/// Read from a pipe node.
pub const SYS_PIPE_READ: u32 = 45;
/// Write to a pipe node.
pub const SYS_PIPE_WRITE: u32 = 46;

/// Allocate a lock slot in the caller's address space.
pub const SYS_LOCK_NEW: u32 = 47;
/// Release a lock slot.
pub const SYS_LOCK_FREE: u32 = 48;
/// Acquire a lock (blocking when contended).
pub const SYS_LOCK: u32 = 49;
/// Release a lock and wake waiters.
pub const SYS_UNLOCK: u32 = 50;

/// Set an environment variable in the caller's space.
pub const SYS_PROC_SET_ENV: u32 = 51;
/// Read an environment variable by name.
pub const SYS_PROC_GET_ENV: u32 = 52;
/// Read an environment variable name by index.
pub const SYS_PROC_GET_ENV_NAME: u32 = 53;
/// Read an environment variable value by index.
pub const SYS_PROC_GET_ENV_VALUE: u32 = 54;
/// Set a kernel-wide global string.
pub const SYS_SET_GLOBAL: u32 = 55;
/// Read a kernel-wide global string.
pub const SYS_GET_GLOBAL: u32 = 56;

/// Read from a character device.
pub const SYS_DEV_CHAR_READ: u32 = 57;
/// Write to a character device.
pub const SYS_DEV_CHAR_WRITE: u32 = 58;
/// Start a block-device read.
pub const SYS_DEV_BLOCK_READ: u32 = 59;
/// Start a block-device write.
pub const SYS_DEV_BLOCK_WRITE: u32 = 60;
/// Collect a completed block read.
pub const SYS_DEV_BLOCK_READ_DONE: u32 = 61;
/// Collect a completed block write.
pub const SYS_DEV_BLOCK_WRITE_DONE: u32 = 62;

/// Register an IPC entry for the caller's address space.
pub const SYS_IPC_SETUP: u32 = 63;
/// Invoke another process's IPC entry.
pub const SYS_IPC_CALL: u32 = 64;
/// Collect the reply of an IPC call.
pub const SYS_IPC_GET_RETURN: u32 = 65;
/// Store the reply for the current IPC call (server side).
pub const SYS_IPC_SET_RETURN: u32 = 66;
/// Finish serving the current IPC call (server side).
pub const SYS_IPC_END: u32 = 67;
/// Read the request of the current IPC call (server side).
pub const SYS_IPC_GET_ARG: u32 = 68;

/// Register the caller for a user-space interrupt id.
pub const SYS_PROC_USINT_REGISTER: u32 = 69;
/// Unregister the caller from a user-space interrupt id.
pub const SYS_PROC_USINT_UNREGISTER: u32 = 70;
/// Look up the listener pid for an interrupt id (privileged only).
pub const SYS_GET_USINT_PID: u32 = 71;
/// Mask timer preemption for a short critical section (privileged only).
pub const SYS_PROC_CRITICAL_ENTER: u32 = 72;
/// Unmask timer preemption.
pub const SYS_PROC_CRITICAL_QUIT: u32 = 73;
/// Dequeue the oldest kernel event (privileged only, blocking).
pub const SYS_GET_KEVENT: u32 = 74;

/// Machine and memory statistics.
pub const SYS_GET_SYSINFO: u32 = 75;
/// Monotonic kernel microseconds.
pub const SYS_GET_KERNEL_USEC: u32 = 76;
/// Kernel second counter.
pub const SYS_GET_KERNEL_TIC: u32 = 77;
/// Snapshot of the process table.
pub const SYS_GET_PROCS: u32 = 78;
/// Whether a process has signalled readiness.
pub const SYS_PROC_PING: u32 = 79;
/// Signal readiness of the caller's address space.
pub const SYS_PROC_READY_PING: u32 = 80;

/// Write a string to the kernel console.
pub const SYS_KPRINT: u32 = 81;

// ── Node types (fsinfo.ftype) ───────────────────────────────────────────

/// Directory node.
pub const FS_TYPE_DIR: u32 = 0;
/// Regular file node.
pub const FS_TYPE_FILE: u32 = 1;
/// Device node.
pub const FS_TYPE_DEV: u32 = 2;
/// Pipe node.
pub const FS_TYPE_PIPE: u32 = 3;
/// A node overlaid by a mount.
pub const FS_TYPE_MOUNT_POINT: u32 = 4;

// ── Kernel event and user-space interrupt ids ───────────────────────────

/// Kernel event carrying a user-space interrupt payload.
pub const KEV_US_INT: u32 = 1;
/// User-space interrupt id: PS/2 key press.
pub const US_INT_PS2_KEY: u32 = 1;

// ── Size limits shared across the ABI ───────────────────────────────────

/// Maximum node name length, including NUL padding.
pub const NODE_NAME_MAX: usize = 64;
/// Maximum command string length, including NUL padding.
pub const CMD_MAX: usize = 128;
/// Maximum machine name length in [`SysInfo`].
pub const MACHINE_MAX: usize = 32;
/// Maximum kernel event payload copied out by `SYS_GET_KEVENT`.
pub const KEV_PAYLOAD_MAX: usize = 64;

// ── ABI structures ──────────────────────────────────────────────────────

/// User-visible description of a VFS node.
///
/// `node` is a weak back-handle into the kernel node graph: valid only
/// until the node is freed, and checked (never dereferenced) by the
/// kernel. `data` carries per-type payload (for pipes, the buffer
/// handle).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FsInfo {
    /// Packed node handle (0 = none).
    pub node: u64,
    /// Per-type payload.
    pub data: u64,
    /// One of the `FS_TYPE_*` constants.
    pub ftype: u32,
    /// Size in bytes, filesystem-server maintained.
    pub size: u32,
    /// Owning mount id, -1 when not under a mount.
    pub mount_id: i32,
    /// Node name, NUL-padded.
    pub name: [u8; NODE_NAME_MAX],
}

impl FsInfo {
    /// An all-zero record (node handle 0, no mount).
    pub const fn zeroed() -> Self {
        Self {
            node: 0,
            data: 0,
            ftype: FS_TYPE_FILE,
            size: 0,
            mount_id: -1,
            name: [0; NODE_NAME_MAX],
        }
    }
}

/// Mount description returned by `SYS_VFS_GET_MOUNT`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MountInfo {
    /// Packed handle of the overlay root.
    pub root_node: u64,
    /// Pid of the filesystem server owning the mount.
    pub server_pid: i32,
    /// Mount id.
    pub id: i32,
}

/// Machine and memory statistics returned by `SYS_GET_SYSINFO`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SysInfo {
    /// Total physical memory in bytes.
    pub total_mem: u64,
    /// Free physical memory in bytes.
    pub free_mem: u64,
    /// Bytes currently allocated in the shared-memory table.
    pub shm_mem: u64,
    /// Kernel second counter.
    pub kernel_tic: u64,
    /// Machine name, NUL-padded.
    pub machine: [u8; MACHINE_MAX],
}

/// Framebuffer description returned by `SYS_FRAMEBUFFER_MAP`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FbInfo {
    /// Virtual address the framebuffer is mapped at.
    pub pointer: u64,
    /// Size in bytes.
    pub size: u64,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bits per pixel.
    pub depth: u32,
    /// Padding for alignment.
    pub _pad: u32,
}

/// A (pointer, length) pair describing a user buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawData {
    /// User virtual address of the buffer.
    pub addr: u64,
    /// Buffer length in bytes.
    pub size: u64,
}

/// One process-table entry returned by `SYS_GET_PROCS`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ProcInfo {
    /// Process id.
    pub pid: i32,
    /// Parent pid (0 = detached).
    pub father_pid: i32,
    /// Owner UID.
    pub owner: i32,
    /// Scheduler state as a small integer.
    pub state: u32,
    /// Command string, NUL-padded.
    pub cmd: [u8; CMD_MAX],
}

/// A kernel event copied out by `SYS_GET_KEVENT`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct KEventOut {
    /// Event type (`KEV_*`).
    pub ev_type: u32,
    /// Number of valid payload bytes.
    pub size: u32,
    /// Payload, truncated to [`KEV_PAYLOAD_MAX`].
    pub data: [u8; KEV_PAYLOAD_MAX],
}

impl KEventOut {
    /// An all-zero record.
    pub const fn zeroed() -> Self {
        Self {
            ev_type: 0,
            size: 0,
            data: [0; KEV_PAYLOAD_MAX],
        }
    }
}

// ── User-space trap stubs (feature `userspace`) ─────────────────────────

/// Raw trap stubs for user-space libraries.
///
/// The opcode travels in `x8`, scalar arguments in `x0..x2`, and the
/// scalar result comes back in `x0`; the kernel's exception trampolines
/// decode exactly this layout before dispatching.
#[cfg(all(feature = "userspace", target_arch = "aarch64"))]
pub mod stubs {
    /// Issues a system call with three scalar arguments.
    ///
    /// # Safety
    ///
    /// The opcode and arguments must form a valid request for the
    /// kernel's dispatcher; pointer-typed arguments must reference
    /// memory mapped in the calling process.
    #[inline]
    pub unsafe fn syscall3(code: u32, a0: u64, a1: u64, a2: u64) -> i64 {
        let ret: i64;
        // SAFETY: `svc` hands control to the kernel; the trampolines
        // save and restore the full frame, returning the scalar in x0.
        unsafe {
            core::arch::asm!(
                "svc #0",
                in("x8") u64::from(code),
                inlateout("x0") a0 => ret,
                in("x1") a1,
                in("x2") a2,
                options(nostack),
            );
        }
        ret
    }

    /// Issues a system call with two scalar arguments.
    ///
    /// # Safety
    ///
    /// See [`syscall3`].
    #[inline]
    pub unsafe fn syscall2(code: u32, a0: u64, a1: u64) -> i64 {
        // SAFETY: Forwarded; the caller upholds the contract.
        unsafe { syscall3(code, a0, a1, 0) }
    }

    /// Issues a system call with one scalar argument.
    ///
    /// # Safety
    ///
    /// See [`syscall3`].
    #[inline]
    pub unsafe fn syscall1(code: u32, a0: u64) -> i64 {
        // SAFETY: Forwarded; the caller upholds the contract.
        unsafe { syscall3(code, a0, 0, 0) }
    }

    /// Issues a system call with no arguments.
    ///
    /// # Safety
    ///
    /// See [`syscall3`].
    #[inline]
    pub unsafe fn syscall0(code: u32) -> i64 {
        // SAFETY: Forwarded; the caller upholds the contract.
        unsafe { syscall3(code, 0, 0, 0) }
    }
}

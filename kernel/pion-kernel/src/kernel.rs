//! The kernel record.
//!
//! All mutable kernel state lives in one explicit [`Kernel`] value: the
//! process table, the VFS, the event queue, the interrupt registry, the
//! global string store and the timer bookkeeping, plus the [`Platform`]
//! it drives. There is exactly one CPU and interrupts are masked inside
//! trap handlers, so the record needs no internal locking; the board
//! wraps it in a single `TrapLock` at the trap boundary.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::String;

use pion_core::id::{Fd, Pid};

use crate::arch::Context;
use crate::error::{KernError, KernResult};
use crate::kev::EventQueue;
use crate::platform::Platform;
use crate::proc::{ProcKind, ProcState, ProcTable, WaitToken};
use crate::usint::UsIntTable;
use crate::vfs::fd::FdTable;
use crate::vfs::{NodeKind, Vfs};

/// Timer bookkeeping fed by the tick handler.
#[derive(Debug, Default)]
pub struct TimerState {
    /// Monotonic microseconds at the previous tick; 0 = baseline unseeded.
    pub last_usec: u64,
    /// Microseconds accumulated toward the next second.
    pub tic_acc: u64,
    /// Kernel second counter.
    pub kernel_tic: u64,
}

/// The whole kernel: every subsystem plus the platform underneath.
pub struct Kernel<P: Platform> {
    /// The external world: memory, devices, timer, interrupt controller.
    pub platform: P,
    /// Processes, threads and address spaces.
    pub procs: ProcTable,
    /// The node graph and open-file tables.
    pub vfs: Vfs,
    /// Hardware-originated events awaiting the privileged listener.
    pub kev: EventQueue,
    /// User-space interrupt registrations.
    pub usint: UsIntTable,
    /// Kernel-wide global strings (`SYS_SET_GLOBAL`/`SYS_GET_GLOBAL`).
    pub globals: BTreeMap<String, String>,
    /// Tick bookkeeping.
    pub timer: TimerState,
    /// Set by an unrecoverable fault; the board stops scheduling.
    pub halted: bool,
}

impl<P: Platform> Kernel<P> {
    /// Creates a kernel over `platform` with an empty process table and
    /// a VFS holding only the root directory.
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            procs: ProcTable::new(),
            vfs: Vfs::new(),
            kev: EventQueue::new(),
            usint: UsIntTable::new(),
            globals: BTreeMap::new(),
            timer: TimerState::default(),
            halted: false,
        }
    }

    /// Selects the interrupt sources the core consumes and resets the
    /// timer bookkeeping. Called once by the board after the vector
    /// table is installed.
    pub fn irq_init(&mut self) {
        self.platform
            .gic_set_irqs(crate::platform::IrqBits::TIMER | crate::platform::IrqBits::KEY);
        self.timer = TimerState::default();
    }

    /// Creates a root-owned process in a fresh address space, ready to
    /// run at `entry` with stack `sp`. Used at boot for the first
    /// user-space servers.
    ///
    /// # Errors
    ///
    /// Propagates platform memory exhaustion and process-table overflow.
    pub fn spawn(&mut self, cmd: &str, entry: u64, sp: u64) -> KernResult<Pid> {
        let cookie = self.platform.create_space()?;
        let space_id = self.procs.alloc_space(cookie);
        let pid = match self.procs.alloc_proc(ProcKind::Proc, space_id) {
            Ok(pid) => pid,
            Err(e) => {
                self.platform.release_space(cookie);
                self.procs.free_space(space_id);
                return Err(e);
            }
        };
        let proc = self.procs.get_mut(pid).ok_or(KernError::NotFound)?;
        proc.cmd = String::from(cmd);
        proc.ctx.pc = entry;
        proc.ctx.gpr[Context::LR] = entry;
        proc.ctx.sp = sp;
        proc.state = ProcState::Ready;
        Ok(pid)
    }

    /// Runs `f` with the kernel and a process's descriptor table
    /// borrowed side by side (the table is detached for the duration).
    ///
    /// Returns `None` when `pid` is not live.
    pub fn with_fds<R>(
        &mut self,
        pid: Pid,
        f: impl FnOnce(&mut Self, &mut FdTable) -> R,
    ) -> Option<R> {
        let mut fds = core::mem::take(&mut self.procs.get_mut(pid)?.fds);
        let result = f(self, &mut fds);
        if let Some(p) = self.procs.get_mut(pid) {
            p.fds = fds;
        }
        Some(result)
    }

    /// Closes a descriptor in a detached table, waking pipe peers so a
    /// blocked reader or writer re-checks for EOF.
    ///
    /// # Errors
    ///
    /// [`KernError::BadHandle`] when `fd` is not open.
    pub(crate) fn close_in_table(&mut self, fds: &mut FdTable, fd: Fd) -> KernResult<()> {
        let closed = self.vfs.close(fds, fd)?;
        if closed.kind == Some(NodeKind::Pipe) {
            self.procs.wakeup(WaitToken::pipe(closed.node));
        }
        Ok(())
    }

    /// Closes one of `pid`'s descriptors.
    ///
    /// # Errors
    ///
    /// [`KernError::NotFound`] for a dead pid, [`KernError::BadHandle`]
    /// when `fd` is not open.
    pub fn close_fd(&mut self, pid: Pid, fd: Fd) -> KernResult<()> {
        self.with_fds(pid, |k, fds| k.close_in_table(fds, fd))
            .ok_or(KernError::NotFound)?
    }
}

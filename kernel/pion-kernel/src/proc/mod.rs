//! Processes, threads and the block/wakeup primitive.
//!
//! The process table is a fixed array of slots; a pid is its slot index
//! plus one, so pid 0 doubles as the "no parent" sentinel. A process
//! carries its saved register frame; switching processes is swapping
//! frames (see [`crate::sched`]).
//!
//! Every kernel wait (pipes, locks, IPC, device completion, the kernel
//! event queue) goes through one primitive: [`ProcTable::block_on`]
//! parks the caller under an opaque [`WaitToken`], and
//! [`ProcTable::wakeup`] broadcasts readiness to every process parked
//! under an equal token. A woken process re-executes its blocking
//! syscall from user space, so blocking syscalls are idempotent up to
//! the point of blocking and their callers loop on the retry sentinel.

pub mod space;

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use pion_core::id::{Pid, SpaceId};
use pion_core::{kdebug, kinfo};

use crate::arch::Context;
use crate::config::PROC_MAX;
use crate::error::{KernError, KernResult};
use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::vfs::fd::FdTable;
use crate::vfs::NodeHandle;
use space::Space;

/// Scheduler state of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcState {
    /// Allocated, not yet runnable.
    Created,
    /// Runnable, waiting for the CPU.
    Ready,
    /// Currently executing (at most one process at a time).
    Running,
    /// Parked under a wait token.
    Block,
    /// Sleeping until a deadline.
    Sleep,
    /// Waiting for a specific pid to exit.
    Wait,
    /// Exited, awaiting reap.
    Zombie,
}

impl ProcState {
    /// Small-integer encoding for the ABI.
    pub fn code(self) -> u32 {
        match self {
            Self::Created => 0,
            Self::Ready => 1,
            Self::Running => 2,
            Self::Block => 3,
            Self::Sleep => 4,
            Self::Wait => 5,
            Self::Zombie => 6,
        }
    }
}

/// What kind of schedulable entity a slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcKind {
    /// A process owning its address space.
    Proc,
    /// A thread sharing its parent's address space.
    Thread,
    /// A thread pre-forked to serve IPC calls.
    IpcWorker,
}

/// An opaque wait token: one machine word naming a waitable object.
///
/// Equality is the only operation. Constructors encode the object's
/// stable identity, so tokens stay meaningful without raw addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitToken(u64);

impl WaitToken {
    const KIND_LOCK: u64 = 1;
    const KIND_PIPE: u64 = 2;
    const KIND_IPC_STATE: u64 = 3;
    const KIND_IPC_DATA: u64 = 4;
    const KIND_KEVENT: u64 = 5;
    const KIND_DEVICE: u64 = 6;

    /// The lock word in `slot` of `space`.
    pub fn lock(space: SpaceId, slot: usize) -> Self {
        Self(Self::KIND_LOCK << 56 | u64::from(space.as_u32()) << 16 | slot as u64)
    }

    /// The byte buffer of a pipe node.
    pub fn pipe(node: NodeHandle) -> Self {
        Self(Self::KIND_PIPE << 56 | node.pack())
    }

    /// The IPC channel state of a space.
    pub fn ipc_state(space: SpaceId) -> Self {
        Self(Self::KIND_IPC_STATE << 56 | u64::from(space.as_u32()))
    }

    /// The IPC payload of a space.
    pub fn ipc_data(space: SpaceId) -> Self {
        Self(Self::KIND_IPC_DATA << 56 | u64::from(space.as_u32()))
    }

    /// The kernel event queue.
    pub fn kevent() -> Self {
        Self(Self::KIND_KEVENT << 56)
    }

    /// A device class, for completion waits.
    pub fn device(class: u32) -> Self {
        Self(Self::KIND_DEVICE << 56 | u64::from(class))
    }
}

/// One process or thread.
pub struct Process {
    /// Slot-stable identity.
    pub pid: Pid,
    /// Parent pid; 0 = detached.
    pub father_pid: Pid,
    /// Process, thread, or IPC worker.
    pub kind: ProcKind,
    /// Scheduler state.
    pub state: ProcState,
    /// Owner UID; 0 is privileged.
    pub owner: i32,
    /// Command string.
    pub cmd: String,
    /// Current working directory.
    pub cwd: String,
    /// Registered global name; empty = none.
    pub global_name: String,
    /// Saved register frame; authoritative whenever not `Running`.
    pub ctx: Context,
    /// Nonzero masks timer preemption; capped at `CRITICAL_MAX`.
    pub critical_counter: u32,
    /// The address space this process executes in.
    pub space: SpaceId,
    /// Valid while `state == Block`; `None` parks unconditionally.
    pub wait_token: Option<WaitToken>,
    /// Valid while `state == Sleep`.
    pub sleep_until_usec: u64,
    /// Valid while `state == Wait`.
    pub wait_pid: Option<Pid>,
    /// Valid while `state == Zombie`.
    pub exit_code: i32,
    /// Per-process descriptor table.
    pub fds: FdTable,
}

impl Process {
    fn new(pid: Pid, kind: ProcKind, space: SpaceId) -> Self {
        Self {
            pid,
            father_pid: Pid::new(0),
            kind,
            state: ProcState::Created,
            owner: 0,
            cmd: String::new(),
            cwd: String::from("/"),
            global_name: String::new(),
            ctx: Context::zeroed(),
            critical_counter: 0,
            space,
            wait_token: None,
            sleep_until_usec: 0,
            wait_pid: None,
            exit_code: 0,
            fds: FdTable::new(),
        }
    }
}

/// The process table: slots, spaces, and the running-process pointer.
pub struct ProcTable {
    slots: Vec<Option<Process>>,
    spaces: Vec<Option<Space>>,
    current: Option<Pid>,
    /// Round-robin scan position (slot index of the last pick).
    cursor: usize,
}

impl ProcTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(PROC_MAX);
        slots.resize_with(PROC_MAX, || None);
        Self {
            slots,
            spaces: Vec::new(),
            current: None,
            // One before slot 0, so the first pick starts at the first slot.
            cursor: PROC_MAX - 1,
        }
    }

    // ── Slot and space management ───────────────────────────────────

    /// Allocates a process slot. The new process starts `Created`.
    pub fn alloc_proc(&mut self, kind: ProcKind, space: SpaceId) -> KernResult<Pid> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(KernError::NoSpace)?;
        let pid = Pid::new(index as u32 + 1);
        self.slots[index] = Some(Process::new(pid, kind, space));
        Ok(pid)
    }

    /// Frees a slot, recycling its pid.
    pub fn reap(&mut self, pid: Pid) {
        if let Some(slot) = self.slots.get_mut(pid.as_usize().wrapping_sub(1)) {
            *slot = None;
        }
        if self.current == Some(pid) {
            self.current = None;
        }
    }

    /// Looks up a process by pid.
    pub fn get(&self, pid: Pid) -> Option<&Process> {
        self.slots.get(pid.as_usize().wrapping_sub(1))?.as_ref()
    }

    /// Mutably looks up a process by pid.
    pub fn get_mut(&mut self, pid: Pid) -> Option<&mut Process> {
        self.slots.get_mut(pid.as_usize().wrapping_sub(1))?.as_mut()
    }

    /// Registers a new address space.
    pub fn alloc_space(&mut self, cookie: u64) -> SpaceId {
        match self.spaces.iter().position(Option::is_none) {
            Some(free) => {
                let id = SpaceId::new(free as u32);
                self.spaces[free] = Some(Space::new(id, cookie));
                id
            }
            None => {
                let id = SpaceId::new(self.spaces.len() as u32);
                self.spaces.push(Some(Space::new(id, cookie)));
                id
            }
        }
    }

    /// Looks up a space.
    pub fn space(&self, id: SpaceId) -> Option<&Space> {
        self.spaces.get(id.as_usize())?.as_ref()
    }

    /// Mutably looks up a space.
    pub fn space_mut(&mut self, id: SpaceId) -> Option<&mut Space> {
        self.spaces.get_mut(id.as_usize())?.as_mut()
    }

    /// Drops a space record (after the platform released its mappings).
    pub fn free_space(&mut self, id: SpaceId) {
        if let Some(slot) = self.spaces.get_mut(id.as_usize()) {
            *slot = None;
        }
    }

    // ── Current process ─────────────────────────────────────────────

    /// The pid of the running process.
    pub fn current_pid(&self) -> Option<Pid> {
        self.current
    }

    /// Overwrites the running-process pointer.
    pub fn set_current(&mut self, pid: Option<Pid>) {
        self.current = pid;
        if let Some(pid) = pid {
            self.cursor = pid.as_usize().wrapping_sub(1);
        }
    }

    /// The running process.
    pub fn current_proc(&self) -> Option<&Process> {
        self.get(self.current?)
    }

    /// The running process, mutably.
    pub fn current_proc_mut(&mut self) -> Option<&mut Process> {
        let pid = self.current?;
        self.get_mut(pid)
    }

    /// The space of the running process.
    pub fn current_space(&self) -> Option<&Space> {
        self.space(self.current_proc()?.space)
    }

    /// The space of the running process, mutably.
    pub fn current_space_mut(&mut self) -> Option<&mut Space> {
        let id = self.current_proc()?.space;
        self.space_mut(id)
    }

    // ── Lookups ─────────────────────────────────────────────────────

    /// Looks up a process by its registered global name.
    pub fn by_global_name(&self, name: &str) -> Option<Pid> {
        self.live().find(|p| p.global_name == name).map(|p| p.pid)
    }

    /// The owning process of a thread: walks parents until a `Proc`.
    pub fn owning_proc(&self, pid: Pid) -> Option<Pid> {
        let mut current = self.get(pid)?;
        loop {
            if current.kind == ProcKind::Proc {
                return Some(current.pid);
            }
            current = self.get(current.father_pid)?;
        }
    }

    /// All occupied slots, in pid order.
    pub fn live(&self) -> impl Iterator<Item = &Process> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    fn live_mut(&mut self) -> impl Iterator<Item = &mut Process> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    // ── Round-robin pick (used by the scheduler) ────────────────────

    /// The next `Ready` slot after the cursor, round-robin.
    pub(crate) fn pick_next_ready(&mut self) -> Option<Pid> {
        let len = self.slots.len();
        for step in 1..=len {
            let index = (self.cursor + step) % len;
            if let Some(p) = self.slots[index].as_ref() {
                if p.state == ProcState::Ready {
                    self.cursor = index;
                    return Some(p.pid);
                }
            }
        }
        None
    }

    // ── Block / wakeup / sleep ──────────────────────────────────────

    /// Parks the running process under `token` and schedules away.
    ///
    /// The caller must already have stored its retry sentinel in the
    /// frame's return register; the saved frame re-executes the blocking
    /// syscall from user space after wakeup.
    pub fn block_on(&mut self, ctx: &mut Context, token: WaitToken) {
        if let Some(p) = self.current_proc_mut() {
            p.ctx = *ctx;
            p.state = ProcState::Block;
            p.wait_token = Some(token);
        }
        crate::sched::schedule(self, ctx);
    }

    /// Makes every process parked under an equal token `Ready`.
    ///
    /// Wakeup is broadcast; spurious wakeups are fine because the waiter
    /// re-checks its condition on re-execution.
    pub fn wakeup(&mut self, token: WaitToken) {
        for p in self.live_mut() {
            if p.state == ProcState::Block && p.wait_token == Some(token) {
                p.state = ProcState::Ready;
                p.wait_token = None;
            }
        }
    }

    /// Puts the running process to sleep until `now + usec`.
    ///
    /// The syscall result is set to 0 up front, so the wakeup path has
    /// nothing to write back.
    pub fn usleep(&mut self, ctx: &mut Context, now: u64, usec: u64) {
        ctx.set_ret(0);
        if let Some(p) = self.current_proc_mut() {
            p.ctx = *ctx;
            p.state = ProcState::Sleep;
            p.sleep_until_usec = now.saturating_add(usec);
        }
        crate::sched::schedule(self, ctx);
    }

    /// Wakes every sleeper whose deadline has passed.
    pub fn renew_sleep_counter(&mut self, now: u64) {
        for p in self.live_mut() {
            if p.state == ProcState::Sleep && p.sleep_until_usec <= now {
                p.state = ProcState::Ready;
            }
        }
    }
}

impl Default for ProcTable {
    fn default() -> Self {
        Self::new()
    }
}

// ── Lifecycle operations ────────────────────────────────────────────

/// Forks the running process.
///
/// The child gets a full copy of the address space, a copy of the
/// environment, empty lock slots and an unregistered IPC channel. The
/// child's frame is the caller's with 0 in the return register.
///
/// # Errors
///
/// [`KernError::NoSpace`] when the process table or platform memory is
/// exhausted.
pub fn fork<P: Platform>(k: &mut Kernel<P>, ctx: &Context) -> KernResult<Pid> {
    let parent_pid = k.procs.current_pid().ok_or(KernError::NotFound)?;
    let (parent_space_id, owner, cmd, cwd) = {
        let parent = k.procs.get(parent_pid).ok_or(KernError::NotFound)?;
        (parent.space, parent.owner, parent.cmd.clone(), parent.cwd.clone())
    };
    let (parent_cookie, envs) = {
        let space = k.procs.space(parent_space_id).ok_or(KernError::NotFound)?;
        (space.cookie, space.env_snapshot())
    };

    let cookie = k.platform.duplicate_space(parent_cookie)?;
    let space_id = k.procs.alloc_space(cookie);
    if let Some(space) = k.procs.space_mut(space_id) {
        space.env_install(envs);
    }

    let child_pid = match k.procs.alloc_proc(ProcKind::Proc, space_id) {
        Ok(pid) => pid,
        Err(e) => {
            k.platform.release_space(cookie);
            k.procs.free_space(space_id);
            return Err(e);
        }
    };
    let child_fds = match k.procs.get(parent_pid) {
        Some(parent) => k.vfs.clone_table(&parent.fds),
        None => FdTable::new(),
    };
    let child = k.procs.get_mut(child_pid).ok_or(KernError::NotFound)?;
    child.father_pid = parent_pid;
    child.owner = owner;
    child.cmd = cmd;
    child.cwd = cwd;
    child.fds = child_fds;
    child.ctx = *ctx;
    child.ctx.set_ret(0);
    child.state = ProcState::Ready;
    kdebug!("fork: {} -> {}", parent_pid, child_pid);
    Ok(child_pid)
}

/// Creates a thread sharing the caller's address space.
///
/// The thread starts at `entry` on a fresh stack with `func` and `arg`
/// seeded in its first two argument registers.
///
/// # Errors
///
/// [`KernError::NoSpace`] when the process table or platform memory is
/// exhausted.
pub fn thread<P: Platform>(
    k: &mut Kernel<P>,
    ctx: &Context,
    kind: ProcKind,
    entry: u64,
    func: u64,
    arg: u64,
) -> KernResult<Pid> {
    let parent_pid = k.procs.current_pid().ok_or(KernError::NotFound)?;
    let (space_id, owner, cmd, cwd) = {
        let parent = k.procs.get(parent_pid).ok_or(KernError::NotFound)?;
        (parent.space, parent.owner, parent.cmd.clone(), parent.cwd.clone())
    };
    let cookie = k.procs.space(space_id).ok_or(KernError::NotFound)?.cookie;
    let sp = k.platform.alloc_thread_stack(cookie)?;

    let child_pid = k.procs.alloc_proc(kind, space_id)?;
    if let Some(space) = k.procs.space_mut(space_id) {
        space.refs += 1;
    }
    let child = k.procs.get_mut(child_pid).ok_or(KernError::NotFound)?;
    child.father_pid = parent_pid;
    child.owner = owner;
    child.cmd = cmd;
    child.cwd = cwd;
    child.ctx = *ctx;
    child.ctx.sp = sp;
    child.ctx.pc = entry;
    child.ctx.gpr[Context::LR] = entry;
    child.ctx.gpr[0] = func;
    child.ctx.gpr[1] = arg;
    child.state = ProcState::Ready;
    Ok(child_pid)
}

/// Terminates a process.
///
/// Closes every descriptor, wakes WAIT-ers on this pid, releases the
/// address space with the last thread, and leaves a zombie for the
/// parent to reap (a detached process is reaped immediately). Lock
/// words held by the process are *not* released.
pub fn exit<P: Platform>(k: &mut Kernel<P>, pid: Pid, code: i32) {
    let Some(proc) = k.procs.get_mut(pid) else {
        return;
    };
    if proc.state == ProcState::Zombie {
        return;
    }
    let space_id = proc.space;
    let father = proc.father_pid;
    proc.state = ProcState::Zombie;
    proc.exit_code = code;
    proc.global_name.clear();
    proc.wait_token = None;

    // Close descriptors through a detached table so the VFS can be
    // borrowed alongside the process table.
    let mut fds = core::mem::take(&mut proc.fds);
    let open: Vec<_> = fds.iter_open().collect();
    for fd in open {
        let _ = k.close_in_table(&mut fds, fd);
    }

    // Wake anything waiting for this pid to exit.
    let waiters: Vec<Pid> = k
        .procs
        .live()
        .filter(|p| p.state == ProcState::Wait && p.wait_pid == Some(pid))
        .map(|p| p.pid)
        .collect();
    for waiter in waiters {
        if let Some(w) = k.procs.get_mut(waiter) {
            w.state = ProcState::Ready;
            w.wait_pid = None;
        }
    }

    k.usint.drop_pid(pid);

    // Last thread out tears the address space down. IPC waiters are
    // woken either way: with the space gone (or the serving thread
    // dead) their retry observes a dead channel.
    let mut destroyed = false;
    if let Some(space) = k.procs.space_mut(space_id) {
        space.refs = space.refs.saturating_sub(1);
        if space.refs == 0 {
            let cookie = space.cookie;
            k.platform.release_space(cookie);
            k.procs.free_space(space_id);
            destroyed = true;
        } else if space.ipc.serve_pid == pid {
            space.ipc.entry = 0;
            destroyed = true;
        }
    }
    if destroyed {
        k.procs.wakeup(WaitToken::ipc_state(space_id));
        k.procs.wakeup(WaitToken::ipc_data(space_id));
    }

    kinfo!("proc {} exit({})", pid, code);
    if k.procs.current_pid() == Some(pid) {
        k.procs.set_current(None);
    }
    if father == Pid::new(0) {
        k.procs.reap(pid);
    }
}

/// Waits for `pid` to exit.
///
/// A zombie target is reaped and its exit code returned immediately.
/// Otherwise the caller parks in `Wait` with the retry sentinel; exit
/// wakes it and the re-executed syscall collects the zombie.
pub fn waitpid<P: Platform>(k: &mut Kernel<P>, ctx: &mut Context, pid: Pid) {
    match k.procs.get(pid) {
        None => ctx.set_ret(-1),
        Some(target) if target.state == ProcState::Zombie => {
            let code = target.exit_code;
            k.procs.reap(pid);
            ctx.set_ret(i64::from(code));
        }
        Some(_) => {
            ctx.set_ret(-1);
            if let Some(cur) = k.procs.current_proc_mut() {
                cur.ctx = *ctx;
                cur.state = ProcState::Wait;
                cur.wait_pid = Some(pid);
            }
            crate::sched::schedule(&mut k.procs, ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pids_start_at_one_and_recycle() {
        let mut t = ProcTable::new();
        let s = t.alloc_space(0);
        let a = t.alloc_proc(ProcKind::Proc, s).unwrap();
        assert_eq!(a, Pid::new(1));
        let b = t.alloc_proc(ProcKind::Proc, s).unwrap();
        assert_eq!(b, Pid::new(2));
        t.reap(a);
        assert_eq!(t.alloc_proc(ProcKind::Proc, s).unwrap(), Pid::new(1));
    }

    #[test]
    fn wakeup_is_broadcast_and_token_scoped() {
        let mut t = ProcTable::new();
        let s = t.alloc_space(0);
        let a = t.alloc_proc(ProcKind::Proc, s).unwrap();
        let b = t.alloc_proc(ProcKind::Proc, s).unwrap();
        let c = t.alloc_proc(ProcKind::Proc, s).unwrap();
        let token = WaitToken::lock(s, 0);
        let other = WaitToken::lock(s, 1);
        for (pid, tok) in [(a, token), (b, token), (c, other)] {
            let p = t.get_mut(pid).unwrap();
            p.state = ProcState::Block;
            p.wait_token = Some(tok);
        }
        t.wakeup(token);
        assert_eq!(t.get(a).unwrap().state, ProcState::Ready);
        assert_eq!(t.get(b).unwrap().state, ProcState::Ready);
        assert_eq!(t.get(c).unwrap().state, ProcState::Block);
    }

    #[test]
    fn renew_sleep_counter_wakes_due() {
        let mut t = ProcTable::new();
        let s = t.alloc_space(0);
        let a = t.alloc_proc(ProcKind::Proc, s).unwrap();
        let p = t.get_mut(a).unwrap();
        p.state = ProcState::Sleep;
        p.sleep_until_usec = 1_000;
        t.renew_sleep_counter(999);
        assert_eq!(t.get(a).unwrap().state, ProcState::Sleep);
        t.renew_sleep_counter(1_000);
        assert_eq!(t.get(a).unwrap().state, ProcState::Ready);
    }

    #[test]
    fn owning_proc_walks_thread_parents() {
        let mut t = ProcTable::new();
        let s = t.alloc_space(0);
        let main = t.alloc_proc(ProcKind::Proc, s).unwrap();
        let th = t.alloc_proc(ProcKind::Thread, s).unwrap();
        t.get_mut(th).unwrap().father_pid = main;
        assert_eq!(t.owning_proc(th), Some(main));
        assert_eq!(t.owning_proc(main), Some(main));
    }

    #[test]
    fn global_name_lookup() {
        let mut t = ProcTable::new();
        let s = t.alloc_space(0);
        let a = t.alloc_proc(ProcKind::Proc, s).unwrap();
        t.get_mut(a).unwrap().global_name = String::from("vfsd");
        assert_eq!(t.by_global_name("vfsd"), Some(a));
        assert_eq!(t.by_global_name("xd"), None);
    }
}

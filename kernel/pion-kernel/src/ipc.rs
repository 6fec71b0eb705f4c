//! The synchronous IPC engine.
//!
//! The only cross-address-space RPC mechanism. Each address space owns
//! one three-state channel (`Idle → Busy → Return → Idle`); a program
//! registers a user-space `entry` and the kernel synthesizes a call
//! frame on a *serving thread* for every dispatched request.
//!
//! Without `prefork` the serving thread is the one that called
//! `ipc_setup`: from the first dispatch onward it is captured into the
//! serve loop: each call rebuilds its frame at `entry` on the stack
//! pointer captured at setup, and `ipc_end` parks it until the next
//! call. With `prefork` a dedicated worker thread is forked at setup
//! and captured instead, leaving the main thread free.

use pion_core::id::{Pid, SpaceId};
use pion_core::kdebug;
use pion_syscall::RET_DEAD;

use crate::arch::Context;
use crate::error::{KernError, KernResult};
use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::proc::space::IpcState;
use crate::proc::{self, ProcKind, ProcState, WaitToken};

/// Registers the caller's space as an IPC service.
///
/// `entry` is the user-space function invoked per call as
/// `entry(from_pid, call_id, extra_data)`. With `prefork` a dedicated
/// worker thread is forked to serve.
///
/// # Errors
///
/// [`KernError::Invalid`] for a zero entry, [`KernError::NoSpace`] when
/// the prefork worker cannot be created.
pub fn setup<P: Platform>(
    k: &mut Kernel<P>,
    ctx: &Context,
    entry: u64,
    extra_data: u64,
    prefork: bool,
) -> KernResult<()> {
    if entry == 0 {
        return Err(KernError::Invalid);
    }
    let cur = k.procs.current_pid().ok_or(KernError::NotFound)?;
    let space_id = k.procs.get(cur).ok_or(KernError::NotFound)?.space;

    let (serve_pid, serve_sp) = if prefork {
        let worker = proc::thread(k, ctx, ProcKind::IpcWorker, entry, 0, 0)?;
        let wp = k.procs.get_mut(worker).ok_or(KernError::NotFound)?;
        // Parked until the first dispatch builds a real frame.
        wp.state = ProcState::Block;
        wp.wait_token = None;
        (worker, wp.ctx.sp)
    } else {
        (cur, ctx.sp)
    };

    let space = k.procs.space_mut(space_id).ok_or(KernError::NotFound)?;
    space.ipc.entry = entry;
    space.ipc.state = IpcState::Idle;
    space.ipc.extra_data = extra_data;
    space.ipc.prefork = prefork;
    space.ipc.serve_pid = serve_pid;
    space.ipc.serve_sp = serve_sp;
    kdebug!("ipc: pid {} serves at {:#x} (prefork={})", serve_pid, entry, prefork);
    Ok(())
}

/// Resolves the IPC channel of a target pid, failing with `Dead` when
/// the process or its space is gone.
fn target_space<P: Platform>(k: &Kernel<P>, to_pid: Pid) -> KernResult<SpaceId> {
    let target = k.procs.get(to_pid).ok_or(KernError::Dead)?;
    if target.state == ProcState::Zombie {
        return Err(KernError::Dead);
    }
    let space_id = target.space;
    k.procs.space(space_id).ok_or(KernError::Dead)?;
    Ok(space_id)
}

/// Caller side: starts a call to `to_pid`'s service.
///
/// On a busy channel the caller blocks on the state token with the retry
/// sentinel; re-execution races for the channel again. On success the
/// request is copied into the server's channel, the serving thread gets
/// a synthesized frame, and the caller returns 0; it then collects via
/// [`get_return`].
pub fn call<P: Platform>(
    k: &mut Kernel<P>,
    ctx: &mut Context,
    to_pid: Pid,
    call_id: u32,
    req: &[u8],
) {
    ctx.set_ret(0);
    let space_id = match target_space(k, to_pid) {
        Ok(id) => id,
        Err(_) => {
            ctx.set_ret(RET_DEAD);
            return;
        }
    };
    let cur = match k.procs.current_pid() {
        Some(pid) => pid,
        None => return,
    };
    let Some(space) = k.procs.space_mut(space_id) else {
        ctx.set_ret(RET_DEAD);
        return;
    };
    if !space.ipc.registered() {
        ctx.set_ret(RET_DEAD);
        return;
    }
    if space.ipc.serve_pid == cur {
        // A thread cannot call the channel it serves.
        ctx.set_ret(RET_DEAD);
        return;
    }
    if space.ipc.state != IpcState::Idle {
        ctx.set_ret(-1);
        k.procs.block_on(ctx, WaitToken::ipc_state(space_id));
        return;
    }
    space.ipc.state = IpcState::Busy;
    space.ipc.from_pid = cur;
    space.ipc.data.copy_from(req);
    dispatch(k, space_id, call_id);
}

/// Builds the serving thread's call frame and makes it runnable.
fn dispatch<P: Platform>(k: &mut Kernel<P>, space_id: SpaceId, call_id: u32) {
    let Some(space) = k.procs.space(space_id) else {
        return;
    };
    let (serve_pid, entry, extra, from_pid, serve_sp) = (
        space.ipc.serve_pid,
        space.ipc.entry,
        space.ipc.extra_data,
        space.ipc.from_pid,
        space.ipc.serve_sp,
    );
    let Some(server) = k.procs.get_mut(serve_pid) else {
        return;
    };
    let spsr = server.ctx.spsr;
    server.ctx = Context::zeroed();
    server.ctx.spsr = spsr;
    server.ctx.pc = entry;
    server.ctx.gpr[Context::LR] = entry;
    server.ctx.sp = serve_sp;
    server.ctx.gpr[0] = u64::from(from_pid.as_u32());
    server.ctx.gpr[1] = u64::from(call_id);
    server.ctx.gpr[2] = extra;
    server.state = ProcState::Ready;
    server.wait_token = None;
    server.wait_pid = None;
}

/// Caller side: collects the reply.
///
/// Blocks on the data token until the channel reaches `Return` for this
/// caller; then copies the reply out, idles the channel and wakes the
/// next pending caller. `out` receives at most `out.len()` bytes.
///
/// Returns `Some(bytes copied)` only when the reply was collected. On
/// `None` the scalar result (dead channel, or the blocked retry
/// sentinel) has been stored and the caller may have been scheduled
/// away, so the frame must not be touched further.
pub fn get_return<P: Platform>(
    k: &mut Kernel<P>,
    ctx: &mut Context,
    to_pid: Pid,
    out: &mut [u8],
) -> Option<usize> {
    ctx.set_ret(0);
    let space_id = match target_space(k, to_pid) {
        Ok(id) => id,
        Err(_) => {
            ctx.set_ret(RET_DEAD);
            return None;
        }
    };
    let cur = k.procs.current_pid()?;
    let Some(space) = k.procs.space_mut(space_id) else {
        ctx.set_ret(RET_DEAD);
        return None;
    };
    let ipc = &mut space.ipc;
    if !ipc.registered() || ipc.from_pid != cur || ipc.state == IpcState::Idle {
        ctx.set_ret(RET_DEAD);
        return None;
    }
    if ipc.state != IpcState::Return {
        ctx.set_ret(-1);
        k.procs.block_on(ctx, WaitToken::ipc_data(space_id));
        return None;
    }

    let reply = ipc.data.as_bytes();
    let n = reply.len().min(out.len());
    out[..n].copy_from_slice(&reply[..n]);
    ipc.data.clear();
    ipc.state = IpcState::Idle;
    k.procs.wakeup(WaitToken::ipc_state(space_id));
    Some(n)
}

/// Server side: stores the reply while the channel is `Busy`.
pub fn set_return<P: Platform>(k: &mut Kernel<P>, reply: &[u8]) {
    let Some(space) = k.procs.current_space_mut() else {
        return;
    };
    if !space.ipc.registered() || space.ipc.state != IpcState::Busy {
        return;
    }
    space.ipc.data.copy_from(reply);
}

/// Server side: publishes the reply and parks until the next dispatch.
///
/// Moves the channel to `Return`, wakes the collector, and blocks the
/// serving thread without a token; only the next [`call`] makes it
/// runnable again, with a fresh frame.
pub fn end<P: Platform>(k: &mut Kernel<P>, ctx: &mut Context) {
    let Some(space) = k.procs.current_space_mut() else {
        return;
    };
    if !space.ipc.registered() || space.ipc.state != IpcState::Busy {
        return;
    }
    let space_id = space.id;
    space.ipc.state = IpcState::Return;
    k.procs.wakeup(WaitToken::ipc_data(space_id));
    if let Some(p) = k.procs.current_proc_mut() {
        p.ctx = *ctx;
        p.state = ProcState::Block;
        p.wait_token = None;
    }
    crate::sched::schedule(&mut k.procs, ctx);
}

/// Server side: copies the request into `out` while the channel is
/// `Busy`; returns the number of bytes copied.
pub fn get_arg<P: Platform>(k: &mut Kernel<P>, out: &mut [u8]) -> usize {
    let Some(space) = k.procs.current_space() else {
        return 0;
    };
    if !space.ipc.registered() || space.ipc.state != IpcState::Busy {
        return 0;
    }
    let req = space.ipc.data.as_bytes();
    let n = req.len().min(out.len());
    out[..n].copy_from_slice(&req[..n]);
    n
}

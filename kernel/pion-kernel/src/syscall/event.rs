//! Kernel event and user-space interrupt handlers.

use pion_syscall::{KEV_PAYLOAD_MAX, KEventOut, RET_ERR};

use crate::arch::Context;
use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::proc::WaitToken;
use crate::syscall::userptr;

pub(super) fn sys_usint_register<P: Platform>(k: &mut Kernel<P>, int_id: u64) -> i64 {
    let Some(pid) = k.procs.current_pid() else {
        return RET_ERR;
    };
    if k.usint.register(int_id as u32, pid) { 0 } else { RET_ERR }
}

pub(super) fn sys_usint_unregister<P: Platform>(k: &mut Kernel<P>, int_id: u64) {
    if let Some(pid) = k.procs.current_pid() {
        k.usint.unregister(int_id as u32, pid);
    }
}

pub(super) fn sys_get_usint_pid<P: Platform>(k: &mut Kernel<P>, int_id: u64) -> i64 {
    // Only the privileged owner may query the reverse mapping.
    if k.procs.current_proc().is_none_or(|p| p.owner != 0) {
        return RET_ERR;
    }
    k.usint
        .pid_for(int_id as u32)
        .map_or(RET_ERR, |p| i64::from(p.as_u32()))
}

/// Dequeues the oldest kernel event into the caller's buffer.
///
/// Empty queue: the (privileged) listener parks on the queue token with
/// the retry sentinel; the next push wakes it.
pub(super) fn sys_get_kevent<P: Platform>(k: &mut Kernel<P>, ctx: &mut Context, out_ptr: u64) {
    if k.procs.current_proc().is_none_or(|p| p.owner != 0) {
        ctx.set_ret(RET_ERR);
        return;
    }
    let Some(event) = k.kev.pop() else {
        ctx.set_ret(RET_ERR);
        k.procs.block_on(ctx, WaitToken::kevent());
        return;
    };

    let mut out = KEventOut::zeroed();
    out.ev_type = event.ev_type;
    let payload = event.data.as_bytes();
    let len = payload.len().min(KEV_PAYLOAD_MAX);
    out.size = len as u32;
    out.data[..len].copy_from_slice(&payload[..len]);
    // SAFETY: Trap contract; syscall pointers are mapped in the
    // caller's space for the duration of the trap.
    match unsafe { userptr::write_struct(out_ptr, &out) } {
        Ok(()) => ctx.set_ret(0),
        Err(e) => ctx.set_ret(e),
    }
}

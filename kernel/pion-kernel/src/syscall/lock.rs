//! In-kernel blocking mutex handlers.
//!
//! A lock is a small integer slot in the caller's address space holding
//! a kernel word. Contended acquisition parks the caller on the slot's
//! wait token; unlock wakes every waiter and the first one rescheduled
//! reacquires (the rest block again). Locks are *not* released when
//! their holder exits.

use pion_syscall::RET_ERR;

use crate::arch::Context;
use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::proc::WaitToken;

pub(super) fn sys_lock_new<P: Platform>(k: &mut Kernel<P>) -> i64 {
    k.procs
        .current_space_mut()
        .and_then(|s| s.lock_new())
        .map_or(RET_ERR, |slot| slot as i64)
}

pub(super) fn sys_lock_free<P: Platform>(k: &mut Kernel<P>, slot: u64) -> i64 {
    if let Some(space) = k.procs.current_space_mut() {
        space.lock_free(slot as usize);
    }
    0
}

pub(super) fn sys_lock<P: Platform>(k: &mut Kernel<P>, ctx: &mut Context, slot: u64) {
    let slot = slot as usize;
    let Some(space) = k.procs.current_space_mut() else {
        ctx.set_ret(RET_ERR);
        return;
    };
    let space_id = space.id;
    let Some(word) = space.lock_word(slot) else {
        ctx.set_ret(RET_ERR);
        return;
    };
    if *word == 0 {
        *word = 1;
        ctx.set_ret(0);
        return;
    }
    ctx.set_ret(-1);
    k.procs.block_on(ctx, WaitToken::lock(space_id, slot));
}

pub(super) fn sys_unlock<P: Platform>(k: &mut Kernel<P>, slot: u64) -> i64 {
    let slot = slot as usize;
    let Some(space) = k.procs.current_space_mut() else {
        return RET_ERR;
    };
    let space_id = space.id;
    let Some(word) = space.lock_word(slot) else {
        return RET_ERR;
    };
    *word = 0;
    k.procs.wakeup(WaitToken::lock(space_id, slot));
    0
}

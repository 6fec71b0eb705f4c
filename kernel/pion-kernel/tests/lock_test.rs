//! Lock behavior through the real trap path: contention, wakeup order,
//! slot exhaustion and the not-released-on-exit sharp edge.

mod common;

use common::{kernel, ret_of, run_as, spawn, TestPlatform};
use pion_core::id::Pid;
use pion_kernel::arch::Context;
use pion_kernel::config::LOCK_MAX;
use pion_kernel::kernel::Kernel;
use pion_kernel::proc::ProcState;
use pion_kernel::syscall::svc_handler;
use pion_syscall::{SYS_KILL, SYS_LOCK, SYS_LOCK_FREE, SYS_LOCK_NEW, SYS_THREAD, SYS_UNLOCK};

/// Issues a `LOCK` as `pid` (which must be running) and returns the
/// result `pid` observes (the saved-frame sentinel when it blocked).
fn lock(k: &mut Kernel<TestPlatform>, ctx: &mut Context, pid: Pid, slot: u64) -> i64 {
    svc_handler(k, SYS_LOCK, slot, 0, 0, ctx);
    ret_of(k, ctx, pid)
}

fn unlock(k: &mut Kernel<TestPlatform>, ctx: &mut Context, slot: u64) -> i64 {
    svc_handler(k, SYS_UNLOCK, slot, 0, 0, ctx);
    ctx.ret()
}

/// A process plus a thread sharing its address space (and thus its
/// lock table).
fn proc_with_thread(k: &mut Kernel<TestPlatform>, ctx: &mut Context) -> (Pid, Pid) {
    let main = spawn(k, "app");
    run_as(k, ctx, main);
    svc_handler(k, SYS_THREAD, 0x2000, 0, 0, ctx);
    let th = Pid::new(ctx.ret() as u32);
    (main, th)
}

#[test]
fn uncontended_lock_succeeds() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let a = spawn(&mut k, "a");
    run_as(&mut k, &mut ctx, a);

    svc_handler(&mut k, SYS_LOCK_NEW, 0, 0, 0, &mut ctx);
    let slot = ctx.ret();
    assert!(slot >= 0);
    assert_eq!(lock(&mut k, &mut ctx, a, slot as u64), 0);
    assert_eq!(unlock(&mut k, &mut ctx, slot as u64), 0);
    assert_eq!(lock(&mut k, &mut ctx, a, slot as u64), 0);
}

#[test]
fn contended_lock_blocks_and_unlock_wakes() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let (main, th) = proc_with_thread(&mut k, &mut ctx);

    run_as(&mut k, &mut ctx, main);
    svc_handler(&mut k, SYS_LOCK_NEW, 0, 0, 0, &mut ctx);
    let slot = ctx.ret() as u64;
    assert_eq!(lock(&mut k, &mut ctx, main, slot), 0);

    // The thread contends and parks with the retry sentinel.
    run_as(&mut k, &mut ctx, th);
    assert_eq!(lock(&mut k, &mut ctx, th, slot), -1);
    assert_eq!(k.procs.get(th).unwrap().state, ProcState::Block);

    // Unlock wakes the waiter; its re-executed lock acquires.
    run_as(&mut k, &mut ctx, main);
    assert_eq!(unlock(&mut k, &mut ctx, slot), 0);
    assert_eq!(k.procs.get(th).unwrap().state, ProcState::Ready);
    run_as(&mut k, &mut ctx, th);
    assert_eq!(ctx.ret(), -1, "woken with the retry sentinel");
    assert_eq!(lock(&mut k, &mut ctx, th, slot), 0);
}

#[test]
fn mutual_exclusion_under_interleaving() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let (main, th) = proc_with_thread(&mut k, &mut ctx);

    run_as(&mut k, &mut ctx, main);
    svc_handler(&mut k, SYS_LOCK_NEW, 0, 0, 0, &mut ctx);
    let slot = ctx.ret() as u64;

    // Ping-pong the critical section between the two threads; the lock
    // must never admit both at once.
    let mut counter = 0u32;
    for round in 0..100 {
        let (holder, rival) = if round % 2 == 0 { (main, th) } else { (th, main) };
        run_as(&mut k, &mut ctx, holder);
        assert_eq!(lock(&mut k, &mut ctx, holder, slot), 0);

        run_as(&mut k, &mut ctx, rival);
        assert_eq!(lock(&mut k, &mut ctx, rival, slot), -1, "rival must wait");

        counter += 1;

        run_as(&mut k, &mut ctx, holder);
        unlock(&mut k, &mut ctx, slot);

        // The rival's retry takes the lock, bumps, releases.
        run_as(&mut k, &mut ctx, rival);
        assert_eq!(lock(&mut k, &mut ctx, rival, slot), 0);
        counter += 1;
        unlock(&mut k, &mut ctx, slot);
    }
    assert_eq!(counter, 200);
}

#[test]
fn lock_new_exhausts_at_lock_max() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let a = spawn(&mut k, "a");
    run_as(&mut k, &mut ctx, a);

    for _ in 0..LOCK_MAX {
        svc_handler(&mut k, SYS_LOCK_NEW, 0, 0, 0, &mut ctx);
        assert!(ctx.ret() >= 0);
    }
    svc_handler(&mut k, SYS_LOCK_NEW, 0, 0, 0, &mut ctx);
    assert_eq!(ctx.ret(), -1);

    svc_handler(&mut k, SYS_LOCK_FREE, 3, 0, 0, &mut ctx);
    svc_handler(&mut k, SYS_LOCK_NEW, 0, 0, 0, &mut ctx);
    assert_eq!(ctx.ret(), 3, "freed slot is reusable");
}

#[test]
fn invalid_slot_is_an_error() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let a = spawn(&mut k, "a");
    run_as(&mut k, &mut ctx, a);

    assert_eq!(lock(&mut k, &mut ctx, a, 5), -1);
    assert_eq!(k.procs.get(a).unwrap().state, ProcState::Running, "no block");
    assert_eq!(unlock(&mut k, &mut ctx, 5), -1);
}

// Documented sharp edge: killing a process holding a lock does not
// release it.
#[test]
fn exit_does_not_release_held_locks() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let (main, th) = proc_with_thread(&mut k, &mut ctx);

    run_as(&mut k, &mut ctx, th);
    svc_handler(&mut k, SYS_LOCK_NEW, 0, 0, 0, &mut ctx);
    let slot = ctx.ret() as u64;
    assert_eq!(lock(&mut k, &mut ctx, th, slot), 0);

    // The holder dies; the space lives on through the main thread.
    run_as(&mut k, &mut ctx, main);
    svc_handler(&mut k, SYS_KILL, th.as_u32() as u64, 0, 0, &mut ctx);
    assert_eq!(ctx.ret(), 0);

    // The word is still set: the survivor contends forever.
    assert_eq!(lock(&mut k, &mut ctx, main, slot), -1);
    assert_eq!(k.procs.get(main).unwrap().state, ProcState::Block);
}

//! Scheduler and timer behavior through the real trap path.

mod common;

use common::{kernel, run_as, spawn, tick};
use pion_kernel::arch::Context;
use pion_kernel::config::CRITICAL_MAX;
use pion_kernel::proc::ProcState;
use pion_kernel::syscall::svc_handler;
use pion_syscall::{SYS_PROC_CRITICAL_ENTER, SYS_USLEEP, SYS_YIELD};

#[test]
fn timer_preempts_round_robin() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let a = spawn(&mut k, "a");
    let b = spawn(&mut k, "b");

    tick(&mut k, &mut ctx, 1_000); // seeds the baseline, schedules a
    assert_eq!(k.procs.current_pid(), Some(a));
    tick(&mut k, &mut ctx, 1_000);
    assert_eq!(k.procs.current_pid(), Some(b));
    tick(&mut k, &mut ctx, 1_000);
    assert_eq!(k.procs.current_pid(), Some(a));
}

#[test]
fn yield_rotates_without_timer() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let a = spawn(&mut k, "a");
    let b = spawn(&mut k, "b");

    run_as(&mut k, &mut ctx, a);
    svc_handler(&mut k, SYS_YIELD, 0, 0, 0, &mut ctx);
    assert_eq!(k.procs.current_pid(), Some(b));
}

// Scenario: usleep(50_000), then 51 simulated 1000-usec ticks. The
// sleeper must be READY again and resume with 0 in its return register.
#[test]
fn usleep_wakes_on_deadline_with_zero_result() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let sleeper = spawn(&mut k, "sleeper");
    let other = spawn(&mut k, "other");

    tick(&mut k, &mut ctx, 1_000); // baseline
    run_as(&mut k, &mut ctx, sleeper);
    svc_handler(&mut k, SYS_USLEEP, 50_000, 0, 0, &mut ctx);
    assert_eq!(k.procs.get(sleeper).unwrap().state, ProcState::Sleep);
    assert_eq!(k.procs.current_pid(), Some(other));

    for _ in 0..51 {
        tick(&mut k, &mut ctx, 1_000);
    }
    let state = k.procs.get(sleeper).unwrap().state;
    assert!(
        state == ProcState::Ready || state == ProcState::Running,
        "sleeper should be runnable, is {state:?}"
    );
    run_as(&mut k, &mut ctx, sleeper);
    assert_eq!(ctx.ret(), 0);
}

#[test]
fn usleep_does_not_wake_early() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let sleeper = spawn(&mut k, "sleeper");
    let _other = spawn(&mut k, "other");

    tick(&mut k, &mut ctx, 1_000);
    run_as(&mut k, &mut ctx, sleeper);
    svc_handler(&mut k, SYS_USLEEP, 50_000, 0, 0, &mut ctx);

    for _ in 0..49 {
        tick(&mut k, &mut ctx, 1_000);
    }
    assert_eq!(k.procs.get(sleeper).unwrap().state, ProcState::Sleep);
}

#[test]
fn critical_section_masks_ticks_until_cap() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let a = spawn(&mut k, "a");
    let _b = spawn(&mut k, "b");

    tick(&mut k, &mut ctx, 1_000);
    run_as(&mut k, &mut ctx, a);
    svc_handler(&mut k, SYS_PROC_CRITICAL_ENTER, 0, 0, 0, &mut ctx);
    assert_eq!(k.procs.get(a).unwrap().critical_counter, CRITICAL_MAX);

    // Masked ticks are consumed by the counter, not the scheduler.
    for i in 0..CRITICAL_MAX {
        tick(&mut k, &mut ctx, 1_000);
        assert_eq!(k.procs.current_pid(), Some(a), "tick {i} should not preempt");
    }
    assert_eq!(k.procs.get(a).unwrap().critical_counter, 0);

    // The counter is spent; the next tick preempts.
    tick(&mut k, &mut ctx, 1_000);
    assert_ne!(k.procs.current_pid(), Some(a));
}

#[test]
fn critical_enter_refused_for_unprivileged() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let a = spawn(&mut k, "a");
    run_as(&mut k, &mut ctx, a);
    k.procs.get_mut(a).unwrap().owner = 7;

    svc_handler(&mut k, SYS_PROC_CRITICAL_ENTER, 0, 0, 0, &mut ctx);
    assert_eq!(k.procs.get(a).unwrap().critical_counter, 0);
}

#[test]
fn kernel_tic_counts_seconds() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let _a = spawn(&mut k, "a");

    tick(&mut k, &mut ctx, 1_000); // baseline
    for _ in 0..2_500 {
        tick(&mut k, &mut ctx, 1_000);
    }
    assert_eq!(k.timer.kernel_tic, 2);
}

#[test]
fn idle_when_nothing_runnable() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let a = spawn(&mut k, "a");

    tick(&mut k, &mut ctx, 1_000);
    run_as(&mut k, &mut ctx, a);
    svc_handler(&mut k, SYS_USLEEP, 10_000, 0, 0, &mut ctx);
    assert_eq!(k.procs.current_pid(), None);

    tick(&mut k, &mut ctx, 20_000);
    assert_eq!(k.procs.current_pid(), Some(a));
}

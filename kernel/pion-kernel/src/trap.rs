//! Typed trap handlers.
//!
//! The exception-vector trampolines save the register frame, mask IRQs,
//! and land here: [`irq_handler`] for external interrupts, the abort
//! handlers for faults, and [`crate::syscall::svc_handler`] for system
//! calls. On return the trampolines restore whatever frame the handler
//! left behind; scheduling is nothing more than rewriting it.

use pion_core::proto::Proto;
use pion_core::{kerr, kfatal};
use pion_syscall::{KEV_US_INT, US_INT_PS2_KEY};

use crate::arch::Context;
use crate::kernel::Kernel;
use crate::platform::{IrqBits, Platform};
use crate::proc::WaitToken;
use crate::sched;

/// External interrupt entry.
///
/// A running process inside a critical section consumes the tick: its
/// counter is decremented and nothing is scheduled, which lets a
/// privileged process finish a short atomic section. The cap on the
/// counter bounds how long that can defer preemption.
pub fn irq_handler<P: Platform>(k: &mut Kernel<P>, ctx: &mut Context) {
    if let Some(p) = k.procs.current_proc_mut() {
        if p.critical_counter > 0 {
            p.critical_counter -= 1;
            return;
        }
    }

    let pending = k.platform.gic_get_irqs();

    if pending.bits.contains(IrqBits::KEY) {
        let mut data = Proto::new();
        data.add_int(US_INT_PS2_KEY as i32);
        data.add_int(pending.key_code as i32);
        k.kev.push(KEV_US_INT, data);
        k.procs.wakeup(WaitToken::kevent());
    }

    if pending.bits.contains(IrqBits::TIMER) {
        let now = k.platform.timer_usec();
        if k.timer.last_usec == 0 {
            // First tick seeds the baseline; no interval to account.
            k.timer.last_usec = now;
        } else {
            let gap = now - k.timer.last_usec;
            k.timer.last_usec = now;
            k.timer.tic_acc += gap;
            while k.timer.tic_acc >= 1_000_000 {
                k.timer.tic_acc -= 1_000_000;
                k.timer.kernel_tic += 1;
            }
            k.procs.renew_sleep_counter(now);
        }
        k.platform.timer_clear_interrupt();
        sched::schedule(&mut k.procs, ctx);
    }
}

/// Data abort: the faulting process exits with -1 and the scheduler
/// moves on. A fault with no current process is fatal.
pub fn data_abort_handler<P: Platform>(k: &mut Kernel<P>, ctx: &mut Context) {
    let Some(pid) = k.procs.current_pid() else {
        kfatal!("kernel data abort");
        k.halted = true;
        return;
    };
    let cmd = k
        .procs
        .get(pid)
        .map(|p| p.cmd.clone())
        .unwrap_or_default();
    kerr!("pid: {}({}), data abort", pid, cmd);
    crate::proc::exit(k, pid, -1);
    sched::schedule(&mut k.procs, ctx);
}

/// Prefetch abort: not recoverable; log the culprit and halt.
pub fn prefetch_abort_handler<P: Platform>(k: &mut Kernel<P>, _ctx: &mut Context) {
    match k.procs.current_pid() {
        Some(pid) => {
            let cmd = k
                .procs
                .get(pid)
                .map(|p| p.cmd.clone())
                .unwrap_or_default();
            kfatal!("pid: {}({}), prefetch abort", pid, cmd);
        }
        None => kfatal!("kernel prefetch abort"),
    }
    k.halted = true;
}

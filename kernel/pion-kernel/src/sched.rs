//! The scheduler.
//!
//! Round-robin over `Ready` processes, one `Running` at a time. The
//! kernel itself is never preempted: a process runs until it traps
//! (SVC, fault) or the timer tick calls [`schedule`]. Switching is a
//! frame swap: the outgoing frame is saved into the process record,
//! the incoming record's frame is loaded into the trap frame, and the
//! exception return resumes the chosen process.

use crate::arch::Context;
use crate::proc::{ProcState, ProcTable};

/// Picks the next `Ready` process and swaps frames.
///
/// The outgoing process (if still `Running`) is saved and demoted to
/// `Ready`, so a lone process is simply rescheduled. With nothing
/// runnable the running-process pointer clears and the frame is left
/// untouched; the board idles until the next interrupt.
pub fn schedule(procs: &mut ProcTable, ctx: &mut Context) {
    if let Some(p) = procs.current_proc_mut() {
        if p.state == ProcState::Running {
            p.ctx = *ctx;
            p.state = ProcState::Ready;
        }
    }

    match procs.pick_next_ready() {
        Some(next) => {
            if let Some(p) = procs.get_mut(next) {
                p.state = ProcState::Running;
                *ctx = p.ctx;
            }
            procs.set_current(Some(next));
        }
        None => procs.set_current(None),
    }
}

//! Process, identity, environment and critical-section handlers.

extern crate alloc;

use alloc::borrow::ToOwned;

use pion_core::id::Pid;
use pion_syscall::{CMD_MAX, RET_ERR};

use crate::arch::Context;
use crate::config::CRITICAL_MAX;
use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::proc::{self, ProcKind};
use crate::sched;
use crate::syscall::userptr;

pub(super) fn sys_exit<P: Platform>(k: &mut Kernel<P>, ctx: &mut Context, code: i32) {
    let Some(pid) = k.procs.current_pid() else {
        return;
    };
    proc::exit(k, pid, code);
    sched::schedule(&mut k.procs, ctx);
}

pub(super) fn sys_fork<P: Platform>(k: &mut Kernel<P>, ctx: &Context) -> i64 {
    match proc::fork(k, ctx) {
        Ok(pid) => i64::from(pid.as_u32()),
        Err(e) => e.to_scalar(),
    }
}

pub(super) fn sys_thread<P: Platform>(
    k: &mut Kernel<P>,
    ctx: &Context,
    entry: u64,
    func: u64,
    arg: u64,
) -> i64 {
    match proc::thread(k, ctx, ProcKind::Thread, entry, func, arg) {
        Ok(pid) => i64::from(pid.as_u32()),
        Err(e) => e.to_scalar(),
    }
}

pub(super) fn sys_detach<P: Platform>(k: &mut Kernel<P>) {
    if let Some(p) = k.procs.current_proc_mut() {
        p.father_pid = Pid::new(0);
    }
}

pub(super) fn sys_waitpid<P: Platform>(k: &mut Kernel<P>, ctx: &mut Context, pid: u64) {
    proc::waitpid(k, ctx, Pid::new(pid as u32));
}

pub(super) fn sys_exec_elf<P: Platform>(
    k: &mut Kernel<P>,
    ctx: &mut Context,
    cmd_ptr: u64,
    image_ptr: u64,
    image_size: u64,
) {
    // SAFETY: Both pointers come from the trapping process and are
    // mapped while the trap executes.
    let (cmd, image) = unsafe {
        let cmd = userptr::read_cstr(cmd_ptr);
        let image = userptr::read_bytes(image_ptr, image_size as usize);
        match (cmd, image) {
            (Ok(c), Ok(i)) => (c, i),
            _ => {
                ctx.set_ret(RET_ERR);
                return;
            }
        }
    };

    let Some(cookie) = k.procs.current_space().map(|s| s.cookie) else {
        ctx.set_ret(RET_ERR);
        return;
    };
    match k.platform.load_elf(cookie, &image) {
        Ok(loaded) => {
            if let Some(p) = k.procs.current_proc_mut() {
                p.cmd = cmd;
            }
            let spsr = ctx.spsr;
            *ctx = Context::zeroed();
            ctx.spsr = spsr;
            ctx.pc = loaded.entry;
            ctx.gpr[Context::LR] = loaded.entry;
            ctx.sp = loaded.sp;
        }
        Err(e) => ctx.set_ret(e.to_scalar()),
    }
}

pub(super) fn sys_usleep<P: Platform>(k: &mut Kernel<P>, ctx: &mut Context, usec: u64) {
    let now = k.platform.timer_usec();
    k.procs.usleep(ctx, now, usec);
}

pub(super) fn sys_kill<P: Platform>(k: &mut Kernel<P>, ctx: &mut Context, pid: u64) {
    let target = Pid::new(pid as u32);
    let Some(cur) = k.procs.current_proc() else {
        return;
    };
    let cur_pid = cur.pid;
    let cur_owner = cur.owner;
    let Some(victim) = k.procs.get(target) else {
        ctx.set_ret(RET_ERR);
        return;
    };
    if cur_owner != 0 && victim.owner != cur_owner {
        ctx.set_ret(RET_ERR);
        return;
    }
    ctx.set_ret(0);
    proc::exit(k, target, 0);
    if target == cur_pid {
        sched::schedule(&mut k.procs, ctx);
    }
}

pub(super) fn sys_getpid<P: Platform>(k: &mut Kernel<P>) -> i64 {
    let Some(pid) = k.procs.current_pid() else {
        return RET_ERR;
    };
    k.procs
        .owning_proc(pid)
        .map_or(RET_ERR, |p| i64::from(p.as_u32()))
}

pub(super) fn sys_getpid_by_gname<P: Platform>(k: &mut Kernel<P>, name_ptr: u64) -> i64 {
    // SAFETY: Trap contract; the pointer is mapped in the caller's space.
    let Ok(name) = (unsafe { userptr::read_cstr(name_ptr) }) else {
        return RET_ERR;
    };
    k.procs
        .by_global_name(&name)
        .map_or(RET_ERR, |p| i64::from(p.as_u32()))
}

pub(super) fn sys_get_threadid<P: Platform>(k: &mut Kernel<P>) -> i64 {
    match k.procs.current_proc() {
        Some(p) if p.kind == ProcKind::Thread => i64::from(p.pid.as_u32()),
        _ => RET_ERR,
    }
}

// ── Identity ────────────────────────────────────────────────────────

pub(super) fn sys_set_cwd<P: Platform>(k: &mut Kernel<P>, cwd_ptr: u64) -> i64 {
    // SAFETY: Trap contract.
    let Ok(cwd) = (unsafe { userptr::read_cstr(cwd_ptr) }) else {
        return RET_ERR;
    };
    match k.procs.current_proc_mut() {
        Some(p) => {
            p.cwd = cwd;
            0
        }
        None => RET_ERR,
    }
}

pub(super) fn sys_get_cwd<P: Platform>(k: &mut Kernel<P>, out_ptr: u64, size: u64) -> i64 {
    let Some(p) = k.procs.current_proc() else {
        return RET_ERR;
    };
    // SAFETY: Trap contract.
    match unsafe { userptr::write_cstr(out_ptr, &p.cwd, size as usize) } {
        Ok(()) => 0,
        Err(e) => e,
    }
}

pub(super) fn sys_set_gname<P: Platform>(k: &mut Kernel<P>, name_ptr: u64) -> i64 {
    // SAFETY: Trap contract.
    let Ok(name) = (unsafe { userptr::read_cstr(name_ptr) }) else {
        return RET_ERR;
    };
    if name.is_empty() || k.procs.by_global_name(&name).is_some() {
        return RET_ERR;
    }
    match k.procs.current_proc_mut() {
        Some(p) => {
            p.global_name = name;
            0
        }
        None => RET_ERR,
    }
}

pub(super) fn sys_set_uid<P: Platform>(k: &mut Kernel<P>, uid: u64) -> i64 {
    match k.procs.current_proc_mut() {
        Some(p) if p.owner == 0 => {
            p.owner = uid as i64 as i32;
            0
        }
        _ => RET_ERR,
    }
}

pub(super) fn sys_get_uid<P: Platform>(k: &mut Kernel<P>) -> i64 {
    k.procs
        .current_proc()
        .map_or(RET_ERR, |p| i64::from(p.owner))
}

pub(super) fn sys_get_cmd<P: Platform>(
    k: &mut Kernel<P>,
    pid: u64,
    out_ptr: u64,
    size: u64,
) -> i64 {
    let Some(p) = k.procs.get(Pid::new(pid as u32)) else {
        return RET_ERR;
    };
    let size = (size as usize).min(CMD_MAX);
    // SAFETY: Trap contract.
    match unsafe { userptr::write_cstr(out_ptr, &p.cmd, size) } {
        Ok(()) => 0,
        Err(e) => e,
    }
}

// ── Environment ─────────────────────────────────────────────────────

pub(super) fn sys_set_env<P: Platform>(k: &mut Kernel<P>, name_ptr: u64, value_ptr: u64) -> i64 {
    // SAFETY: Trap contract.
    let (name, value) = unsafe {
        match (userptr::read_cstr(name_ptr), userptr::read_cstr(value_ptr)) {
            (Ok(n), Ok(v)) => (n, v),
            _ => return RET_ERR,
        }
    };
    match k.procs.current_space_mut() {
        Some(space) => {
            space.env_set(&name, &value);
            0
        }
        None => RET_ERR,
    }
}

pub(super) fn sys_get_env<P: Platform>(
    k: &mut Kernel<P>,
    name_ptr: u64,
    out_ptr: u64,
    size: u64,
) -> i64 {
    // SAFETY: Trap contract.
    let Ok(name) = (unsafe { userptr::read_cstr(name_ptr) }) else {
        return RET_ERR;
    };
    let value = k
        .procs
        .current_space()
        .and_then(|s| s.env_get(&name))
        .unwrap_or("");
    // SAFETY: Trap contract. A missing variable reads back as "".
    match unsafe { userptr::write_cstr(out_ptr, value, size as usize) } {
        Ok(()) => 0,
        Err(e) => e,
    }
}

pub(super) fn sys_get_env_name<P: Platform>(
    k: &mut Kernel<P>,
    index: u64,
    out_ptr: u64,
    size: u64,
) -> i64 {
    let Some(name) = k
        .procs
        .current_space()
        .and_then(|s| s.env_name_at(index as usize))
    else {
        return RET_ERR;
    };
    let name = name.to_owned();
    // SAFETY: Trap contract.
    match unsafe { userptr::write_cstr(out_ptr, &name, size as usize) } {
        Ok(()) => 0,
        Err(e) => e,
    }
}

pub(super) fn sys_get_env_value<P: Platform>(
    k: &mut Kernel<P>,
    index: u64,
    out_ptr: u64,
    size: u64,
) -> i64 {
    let value = k
        .procs
        .current_space()
        .and_then(|s| s.env_value_at(index as usize))
        .unwrap_or("")
        .to_owned();
    // SAFETY: Trap contract.
    match unsafe { userptr::write_cstr(out_ptr, &value, size as usize) } {
        Ok(()) => 0,
        Err(e) => e,
    }
}

// ── Critical sections ───────────────────────────────────────────────

pub(super) fn sys_critical_enter<P: Platform>(k: &mut Kernel<P>) {
    // Only a privileged process may mask preemption; the cap bounds
    // starvation either way.
    if let Some(p) = k.procs.current_proc_mut() {
        if p.owner == 0 {
            p.critical_counter = CRITICAL_MAX;
        }
    }
}

pub(super) fn sys_critical_quit<P: Platform>(k: &mut Kernel<P>) {
    if let Some(p) = k.procs.current_proc_mut() {
        p.critical_counter = 0;
    }
}

// ── Readiness ───────────────────────────────────────────────────────

pub(super) fn sys_proc_ping<P: Platform>(k: &mut Kernel<P>, pid: u64) -> i64 {
    let ready = k
        .procs
        .get(Pid::new(pid as u32))
        .and_then(|p| k.procs.space(p.space))
        .is_some_and(|s| s.ready_ping);
    if ready { 0 } else { RET_ERR }
}

pub(super) fn sys_proc_ready_ping<P: Platform>(k: &mut Kernel<P>) {
    if let Some(space) = k.procs.current_space_mut() {
        space.ready_ping = true;
    }
}

//! Introspection handlers: sysinfo, clocks, the process list and
//! kernel-wide globals.

extern crate alloc;

use alloc::borrow::ToOwned;
use alloc::string::String;

use pion_syscall::{CMD_MAX, MACHINE_MAX, ProcInfo, RET_ERR, SysInfo};

use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::syscall::userptr;

fn fill_fixed(dst: &mut [u8], src: &str) {
    let bytes = src.as_bytes();
    let len = bytes.len().min(dst.len() - 1);
    dst[..len].copy_from_slice(&bytes[..len]);
}

pub(super) fn sys_get_sysinfo<P: Platform>(k: &mut Kernel<P>, info_ptr: u64) -> i64 {
    let mut info = SysInfo {
        total_mem: k.platform.total_mem_size(),
        free_mem: k.platform.free_mem_size(),
        shm_mem: k.platform.shm_alloced_size(),
        kernel_tic: k.timer.kernel_tic,
        machine: [0; MACHINE_MAX],
    };
    fill_fixed(&mut info.machine, k.platform.machine_name());
    // SAFETY: Trap contract; syscall pointers are mapped in the
    // caller's space for the duration of the trap.
    match unsafe { userptr::write_struct(info_ptr, &info) } {
        Ok(()) => 0,
        Err(e) => e,
    }
}

pub(super) fn sys_get_kernel_usec<P: Platform>(k: &mut Kernel<P>, out_ptr: u64) -> i64 {
    let usec = k.platform.timer_usec();
    // SAFETY: Trap contract.
    match unsafe { userptr::write_struct(out_ptr, &usec) } {
        Ok(()) => 0,
        Err(e) => e,
    }
}

pub(super) fn sys_get_kernel_tic<P: Platform>(k: &mut Kernel<P>) -> i64 {
    k.timer.kernel_tic as i64
}

pub(super) fn sys_get_procs<P: Platform>(k: &mut Kernel<P>, out_ptr: u64, max: u64) -> i64 {
    let mut written = 0u64;
    for p in k.procs.live() {
        if written >= max {
            break;
        }
        let mut info = ProcInfo {
            pid: p.pid.as_u32() as i32,
            father_pid: p.father_pid.as_u32() as i32,
            owner: p.owner,
            state: p.state.code(),
            cmd: [0; CMD_MAX],
        };
        fill_fixed(&mut info.cmd, &p.cmd);
        let slot = out_ptr + written * core::mem::size_of::<ProcInfo>() as u64;
        // SAFETY: Trap contract; the caller sized the array via `max`.
        if unsafe { userptr::write_struct(slot, &info) }.is_err() {
            break;
        }
        written += 1;
    }
    written as i64
}

pub(super) fn sys_set_global<P: Platform>(k: &mut Kernel<P>, name_ptr: u64, value_ptr: u64) -> i64 {
    // SAFETY: Trap contract.
    let (name, value) = unsafe {
        match (userptr::read_cstr(name_ptr), userptr::read_cstr(value_ptr)) {
            (Ok(n), Ok(v)) => (n, v),
            _ => return RET_ERR,
        }
    };
    if name.is_empty() {
        return RET_ERR;
    }
    k.globals.insert(name, value);
    0
}

pub(super) fn sys_get_global<P: Platform>(
    k: &mut Kernel<P>,
    name_ptr: u64,
    out_ptr: u64,
    size: u64,
) -> i64 {
    // SAFETY: Trap contract.
    let Ok(name) = (unsafe { userptr::read_cstr(name_ptr) }) else {
        return RET_ERR;
    };
    let Some(value) = k.globals.get(&name).map(String::as_str) else {
        return RET_ERR;
    };
    let value = value.to_owned();
    // SAFETY: Trap contract.
    match unsafe { userptr::write_cstr(out_ptr, &value, size as usize) } {
        Ok(()) => 0,
        Err(e) => e,
    }
}

//! Memory handlers: process heap, shared memory, MMIO and framebuffer.
//!
//! All of these delegate to the external memory manager through the
//! platform; the kernel contributes only the privilege checks and the
//! current-process scoping.

use pion_syscall::RET_ERR;

use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::syscall::userptr;

pub(super) fn sys_malloc<P: Platform>(k: &mut Kernel<P>, size: u64) -> i64 {
    let Some(cookie) = k.procs.current_space().map(|s| s.cookie) else {
        return 0;
    };
    k.platform.proc_malloc(cookie, size as usize) as i64
}

pub(super) fn sys_free<P: Platform>(k: &mut Kernel<P>, addr: u64) {
    if addr == 0 {
        return;
    }
    if let Some(cookie) = k.procs.current_space().map(|s| s.cookie) {
        k.platform.proc_free(cookie, addr);
    }
}

pub(super) fn sys_shm_alloc<P: Platform>(k: &mut Kernel<P>, size: u64, flag: u64) -> i64 {
    k.platform.shm_alloc(size as usize, flag as u32)
}

pub(super) fn sys_shm_map<P: Platform>(k: &mut Kernel<P>, id: u64) -> i64 {
    let Some(pid) = k.procs.current_pid() else {
        return 0;
    };
    k.platform.shm_map(pid, id as i64) as i64
}

pub(super) fn sys_shm_unmap<P: Platform>(k: &mut Kernel<P>, id: u64) -> i64 {
    let Some(pid) = k.procs.current_pid() else {
        return RET_ERR;
    };
    k.platform.shm_unmap(pid, id as i64)
}

pub(super) fn sys_shm_ref<P: Platform>(k: &mut Kernel<P>, id: u64) -> i64 {
    let Some(pid) = k.procs.current_pid() else {
        return RET_ERR;
    };
    k.platform.shm_ref(pid, id as i64)
}

pub(super) fn sys_mmio_map<P: Platform>(k: &mut Kernel<P>) -> i64 {
    let Some(p) = k.procs.current_proc() else {
        return RET_ERR;
    };
    if p.owner != 0 {
        return RET_ERR;
    }
    let cookie = match k.procs.current_space() {
        Some(s) => s.cookie,
        None => return RET_ERR,
    };
    k.platform.map_mmio(cookie) as i64
}

pub(super) fn sys_framebuffer_map<P: Platform>(k: &mut Kernel<P>, info_ptr: u64) -> i64 {
    let Some(p) = k.procs.current_proc() else {
        return RET_ERR;
    };
    if p.owner != 0 {
        return RET_ERR;
    }
    let cookie = match k.procs.current_space() {
        Some(s) => s.cookie,
        None => return RET_ERR,
    };
    match k.platform.map_framebuffer(cookie) {
        Ok(info) => {
            // SAFETY: Trap contract; the pointer is mapped in the
            // caller's space for the duration of the trap.
            match unsafe { userptr::write_struct(info_ptr, &info) } {
                Ok(()) => 0,
                Err(e) => e,
            }
        }
        Err(e) => e.to_scalar(),
    }
}

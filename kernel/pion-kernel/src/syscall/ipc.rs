//! IPC handlers: thin marshalling over [`crate::ipc`].

extern crate alloc;

use alloc::vec;

use pion_core::id::Pid;
use pion_syscall::{RET_ERR, RawData};

use crate::arch::Context;
use crate::ipc;
use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::syscall::userptr;

pub(super) fn sys_ipc_setup<P: Platform>(
    k: &mut Kernel<P>,
    ctx: &Context,
    entry: u64,
    extra_data: u64,
    prefork: u64,
) -> i64 {
    match ipc::setup(k, ctx, entry, extra_data, prefork != 0) {
        Ok(()) => 0,
        Err(e) => e.to_scalar(),
    }
}

pub(super) fn sys_ipc_call<P: Platform>(
    k: &mut Kernel<P>,
    ctx: &mut Context,
    to_pid: u64,
    call_id: u64,
    data_ptr: u64,
) {
    // A null descriptor means an empty request.
    let req = if data_ptr == 0 {
        vec![]
    } else {
        // SAFETY: Trap contract; syscall pointers are mapped in the
        // caller's space for the duration of the trap.
        match unsafe {
            userptr::read_struct::<RawData>(data_ptr)
                .and_then(|d| userptr::read_bytes(d.addr, d.size as usize))
        } {
            Ok(b) => b,
            Err(e) => {
                ctx.set_ret(e);
                return;
            }
        }
    };
    ipc::call(k, ctx, Pid::new(to_pid as u32), call_id as u32, &req);
}

pub(super) fn sys_ipc_get_return<P: Platform>(
    k: &mut Kernel<P>,
    ctx: &mut Context,
    to_pid: u64,
    data_ptr: u64,
) {
    if data_ptr == 0 {
        // Collect and discard the reply.
        let _ = ipc::get_return(k, ctx, Pid::new(to_pid as u32), &mut []);
        return;
    }
    // SAFETY: Trap contract.
    let data = match unsafe { userptr::read_struct::<RawData>(data_ptr) } {
        Ok(d) => d,
        Err(e) => {
            ctx.set_ret(e);
            return;
        }
    };
    let mut buf = vec![0u8; data.size as usize];
    let Some(n) = ipc::get_return(k, ctx, Pid::new(to_pid as u32), &mut buf) else {
        return; // blocked or dead; the frame may already be someone else's
    };
    let out = RawData {
        addr: data.addr,
        size: n as u64,
    };
    // SAFETY: Trap contract; `n` never exceeds the caller's capacity.
    let written = unsafe {
        userptr::write_bytes(data.addr, &buf[..n])
            .and_then(|()| userptr::write_struct(data_ptr, &out))
    };
    if let Err(e) = written {
        ctx.set_ret(e);
    }
}

pub(super) fn sys_ipc_set_return<P: Platform>(k: &mut Kernel<P>, data_ptr: u64) -> i64 {
    let reply = if data_ptr == 0 {
        vec![]
    } else {
        // SAFETY: Trap contract.
        match unsafe {
            userptr::read_struct::<RawData>(data_ptr)
                .and_then(|d| userptr::read_bytes(d.addr, d.size as usize))
        } {
            Ok(b) => b,
            Err(e) => return e,
        }
    };
    ipc::set_return(k, &reply);
    0
}

pub(super) fn sys_ipc_end<P: Platform>(k: &mut Kernel<P>, ctx: &mut Context) {
    ipc::end(k, ctx);
}

pub(super) fn sys_ipc_get_arg<P: Platform>(k: &mut Kernel<P>, out_ptr: u64, max: u64) -> i64 {
    if out_ptr == 0 {
        return RET_ERR;
    }
    let mut buf = vec![0u8; max as usize];
    let n = ipc::get_arg(k, &mut buf);
    if n == 0 {
        return 0;
    }
    // SAFETY: Trap contract.
    match unsafe { userptr::write_bytes(out_ptr, &buf[..n]) } {
        Ok(()) => n as i64,
        Err(e) => e,
    }
}

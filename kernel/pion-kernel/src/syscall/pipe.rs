//! Pipe handlers.
//!
//! Sentinels follow the pipe convention: a positive count for data, -1
//! for EOF, 0 for "nothing yet, retry". The blocking variants park the
//! caller on the buffer token with 0 in the return register, so the
//! woken caller re-invokes and cannot mistake the sentinel for EOF.

extern crate alloc;

use alloc::vec;

use pion_syscall::{FS_TYPE_PIPE, FsInfo, RET_ERR, RawData};

use crate::arch::Context;
use crate::kernel::Kernel;
use crate::pipe::{self, PipeIo};
use crate::platform::Platform;
use crate::proc::WaitToken;
use crate::syscall::userptr;
use crate::vfs::NodeHandle;

pub(super) fn sys_pipe_open<P: Platform>(k: &mut Kernel<P>, fd0_ptr: u64, fd1_ptr: u64) -> i64 {
    if fd0_ptr == 0 || fd1_ptr == 0 {
        return RET_ERR;
    }
    let (fd0, fd1) = match pipe::open(k) {
        Ok(pair) => pair,
        Err(e) => return e.to_scalar(),
    };
    // SAFETY: Trap contract; syscall pointers are mapped in the
    // caller's space for the duration of the trap.
    let written = unsafe {
        userptr::write_struct(fd0_ptr, &(fd0.as_u32() as i32))
            .and_then(|()| userptr::write_struct(fd1_ptr, &(fd1.as_u32() as i32)))
    };
    match written {
        Ok(()) => 0,
        Err(e) => e,
    }
}

fn pipe_node(info_ptr: u64) -> Result<NodeHandle, i64> {
    // SAFETY: Trap contract.
    let info = unsafe { userptr::read_struct::<FsInfo>(info_ptr)? };
    if info.ftype != FS_TYPE_PIPE {
        return Err(RET_ERR);
    }
    NodeHandle::unpack(info.node).ok_or(RET_ERR)
}

pub(super) fn sys_pipe_read<P: Platform>(
    k: &mut Kernel<P>,
    ctx: &mut Context,
    info_ptr: u64,
    data_ptr: u64,
    block: u64,
) {
    let node = match pipe_node(info_ptr) {
        Ok(n) => n,
        Err(e) => {
            ctx.set_ret(e);
            return;
        }
    };
    // SAFETY: Trap contract.
    let data = match unsafe { userptr::read_struct::<RawData>(data_ptr) } {
        Ok(d) => d,
        Err(e) => {
            ctx.set_ret(e);
            return;
        }
    };

    let mut buf = vec![0u8; data.size as usize];
    match pipe::read(k, node, &mut buf) {
        Ok(PipeIo::Data(n)) => {
            // SAFETY: Trap contract; `n` never exceeds the caller's size.
            match unsafe { userptr::write_bytes(data.addr, &buf[..n]) } {
                Ok(()) => ctx.set_ret(n as i64),
                Err(e) => ctx.set_ret(e),
            }
        }
        Ok(PipeIo::Eof) => ctx.set_ret(RET_ERR),
        Ok(PipeIo::Retry) => {
            ctx.set_ret(0);
            if block != 0 {
                k.procs.block_on(ctx, WaitToken::pipe(node));
            }
        }
        Err(e) => ctx.set_ret(e.to_scalar()),
    }
}

pub(super) fn sys_pipe_write<P: Platform>(
    k: &mut Kernel<P>,
    ctx: &mut Context,
    info_ptr: u64,
    data_ptr: u64,
    block: u64,
) {
    let node = match pipe_node(info_ptr) {
        Ok(n) => n,
        Err(e) => {
            ctx.set_ret(e);
            return;
        }
    };
    // SAFETY: Trap contract.
    let bytes = unsafe {
        match userptr::read_struct::<RawData>(data_ptr)
            .and_then(|d| userptr::read_bytes(d.addr, d.size as usize))
        {
            Ok(b) => b,
            Err(e) => {
                ctx.set_ret(e);
                return;
            }
        }
    };

    match pipe::write(k, node, &bytes) {
        Ok(PipeIo::Data(n)) => ctx.set_ret(n as i64),
        Ok(PipeIo::Eof) => ctx.set_ret(RET_ERR),
        Ok(PipeIo::Retry) => {
            ctx.set_ret(0);
            if block != 0 {
                k.procs.block_on(ctx, WaitToken::pipe(node));
            }
        }
        Err(e) => ctx.set_ret(e.to_scalar()),
    }
}

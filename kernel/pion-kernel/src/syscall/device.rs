//! Device delegation and console output.
//!
//! The kernel owns no driver state: character and block transfers go
//! straight to the platform. Completion paths wake the device-class
//! token so a process parked on an in-flight transfer re-checks.

extern crate alloc;

use alloc::vec;

use pion_core::kinfo;
use pion_syscall::RET_ERR;

use crate::arch::Context;
use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::proc::WaitToken;
use crate::syscall::userptr;

/// Bytes moved per block transfer.
const BLOCK_SIZE: usize = 512;

pub(super) fn sys_dev_ch_read<P: Platform>(
    k: &mut Kernel<P>,
    class: u64,
    buf_ptr: u64,
    size: u64,
) -> i64 {
    let class = class as u32;
    if !k.platform.has_dev(class) {
        return RET_ERR;
    }
    let mut buf = vec![0u8; size as usize];
    let res = k.platform.dev_ch_read(class, &mut buf);
    if res > 0 {
        // SAFETY: Trap contract; syscall pointers are mapped in the
        // caller's space for the duration of the trap.
        if unsafe { userptr::write_bytes(buf_ptr, &buf[..res as usize]) }.is_err() {
            return RET_ERR;
        }
    }
    if res != 0 {
        k.procs.wakeup(WaitToken::device(class));
    }
    res
}

pub(super) fn sys_dev_ch_write<P: Platform>(
    k: &mut Kernel<P>,
    class: u64,
    buf_ptr: u64,
    size: u64,
) -> i64 {
    let class = class as u32;
    if !k.platform.has_dev(class) {
        return RET_ERR;
    }
    // SAFETY: Trap contract.
    let Ok(buf) = (unsafe { userptr::read_bytes(buf_ptr, size as usize) }) else {
        return RET_ERR;
    };
    let res = k.platform.dev_ch_write(class, &buf);
    if res != 0 {
        k.procs.wakeup(WaitToken::device(class));
    }
    res
}

pub(super) fn sys_dev_block_read<P: Platform>(k: &mut Kernel<P>, class: u64, block: u64) -> i64 {
    let class = class as u32;
    if !k.platform.has_dev(class) {
        return RET_ERR;
    }
    k.platform.dev_block_read(class, block as i64)
}

pub(super) fn sys_dev_block_write<P: Platform>(
    k: &mut Kernel<P>,
    class: u64,
    block: u64,
    buf_ptr: u64,
) -> i64 {
    let class = class as u32;
    if !k.platform.has_dev(class) {
        return RET_ERR;
    }
    // SAFETY: Trap contract; block writes move exactly one block.
    let Ok(buf) = (unsafe { userptr::read_bytes(buf_ptr, BLOCK_SIZE) }) else {
        return RET_ERR;
    };
    k.platform.dev_block_write(class, block as i64, &buf)
}

pub(super) fn sys_dev_block_read_done<P: Platform>(
    k: &mut Kernel<P>,
    ctx: &mut Context,
    class: u64,
    buf_ptr: u64,
) {
    let class = class as u32;
    if !k.platform.has_dev(class) {
        ctx.set_ret(RET_ERR);
        return;
    }
    let mut buf = [0u8; BLOCK_SIZE];
    let res = k.platform.dev_block_read_done(class, &mut buf);
    if res == 0 {
        // SAFETY: Trap contract.
        if unsafe { userptr::write_bytes(buf_ptr, &buf) }.is_err() {
            ctx.set_ret(RET_ERR);
            return;
        }
        ctx.set_ret(0);
        k.procs.wakeup(WaitToken::device(class));
        return;
    }
    // Not complete yet; the caller loops on the retry sentinel.
    ctx.set_ret(RET_ERR);
}

pub(super) fn sys_dev_block_write_done<P: Platform>(
    k: &mut Kernel<P>,
    ctx: &mut Context,
    class: u64,
) {
    let class = class as u32;
    if !k.platform.has_dev(class) {
        ctx.set_ret(RET_ERR);
        return;
    }
    let res = k.platform.dev_block_write_done(class);
    if res == 0 {
        ctx.set_ret(0);
        k.procs.wakeup(WaitToken::device(class));
        return;
    }
    ctx.set_ret(RET_ERR);
}

pub(super) fn sys_kprint<P: Platform>(k: &mut Kernel<P>, msg_ptr: u64, _len: u64, tty_only: u64) {
    // SAFETY: Trap contract.
    let Ok(msg) = (unsafe { userptr::read_cstr(msg_ptr) }) else {
        return;
    };
    if tty_only != 0 {
        k.platform.uart_write(msg.as_bytes());
    } else {
        kinfo!("{}", msg);
    }
}

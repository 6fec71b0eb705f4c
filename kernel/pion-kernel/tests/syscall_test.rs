//! Cross-cutting syscall behavior: kernel events, user-space
//! interrupts, devices, sysinfo, globals and dispatch edges.

mod common;

use common::{cstr, kernel, press_key, run_as, spawn, DEV_BLK, DEV_CHR};
use pion_kernel::arch::Context;
use pion_kernel::proc::ProcState;
use pion_kernel::syscall::svc_handler;
use pion_syscall::{
    KEV_US_INT, KEventOut, SYS_DEV_BLOCK_READ, SYS_DEV_BLOCK_READ_DONE, SYS_DEV_BLOCK_WRITE,
    SYS_DEV_BLOCK_WRITE_DONE, SYS_DEV_CHAR_READ, SYS_DEV_CHAR_WRITE, SYS_GET_GLOBAL,
    SYS_GET_KERNEL_TIC, SYS_GET_KERNEL_USEC, SYS_GET_KEVENT, SYS_GET_SYSINFO, SYS_GET_USINT_PID,
    SYS_KPRINT, SYS_MALLOC, SYS_MMIO_MAP, SYS_PROC_SHM_ALLOC, SYS_PROC_SHM_MAP,
    SYS_PROC_USINT_REGISTER, SYS_PROC_USINT_UNREGISTER, SYS_SET_GLOBAL, SysInfo, US_INT_PS2_KEY,
};

#[test]
fn keypress_becomes_a_kernel_event() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let listener = spawn(&mut k, "inputd");
    run_as(&mut k, &mut ctx, listener);

    press_key(&mut k, &mut ctx, 0x41);

    let mut out = KEventOut::zeroed();
    svc_handler(
        &mut k,
        SYS_GET_KEVENT,
        core::ptr::from_mut(&mut out) as u64,
        0,
        0,
        &mut ctx,
    );
    assert_eq!(ctx.ret(), 0);
    assert_eq!(out.ev_type, KEV_US_INT);
    // Payload: the interrupt id then the key code, as two ints.
    assert_eq!(out.size, 8);
    assert_eq!(&out.data[..4], &(US_INT_PS2_KEY as i32).to_le_bytes());
    assert_eq!(&out.data[4..8], &0x41i32.to_le_bytes());
}

#[test]
fn empty_event_queue_blocks_listener_until_push() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let listener = spawn(&mut k, "inputd");
    let _other = spawn(&mut k, "other");
    run_as(&mut k, &mut ctx, listener);

    let mut out = KEventOut::zeroed();
    svc_handler(
        &mut k,
        SYS_GET_KEVENT,
        core::ptr::from_mut(&mut out) as u64,
        0,
        0,
        &mut ctx,
    );
    assert_eq!(k.procs.get(listener).unwrap().state, ProcState::Block);

    press_key(&mut k, &mut ctx, 0x20);
    assert_eq!(k.procs.get(listener).unwrap().state, ProcState::Ready);

    run_as(&mut k, &mut ctx, listener);
    svc_handler(
        &mut k,
        SYS_GET_KEVENT,
        core::ptr::from_mut(&mut out) as u64,
        0,
        0,
        &mut ctx,
    );
    assert_eq!(ctx.ret(), 0);
}

#[test]
fn get_kevent_requires_privilege() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let p = spawn(&mut k, "app");
    run_as(&mut k, &mut ctx, p);
    k.procs.get_mut(p).unwrap().owner = 3;

    let mut out = KEventOut::zeroed();
    svc_handler(
        &mut k,
        SYS_GET_KEVENT,
        core::ptr::from_mut(&mut out) as u64,
        0,
        0,
        &mut ctx,
    );
    assert_eq!(ctx.ret(), -1);
    assert_eq!(k.procs.get(p).unwrap().state, ProcState::Running, "no block");
}

#[test]
fn usint_registry_is_exclusive_and_privileged() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let a = spawn(&mut k, "a");
    let b = spawn(&mut k, "b");

    run_as(&mut k, &mut ctx, a);
    svc_handler(&mut k, SYS_PROC_USINT_REGISTER, US_INT_PS2_KEY as u64, 0, 0, &mut ctx);
    assert_eq!(ctx.ret(), 0);

    run_as(&mut k, &mut ctx, b);
    svc_handler(&mut k, SYS_PROC_USINT_REGISTER, US_INT_PS2_KEY as u64, 0, 0, &mut ctx);
    assert_eq!(ctx.ret(), -1, "id already registered");

    // Privileged reverse lookup.
    svc_handler(&mut k, SYS_GET_USINT_PID, US_INT_PS2_KEY as u64, 0, 0, &mut ctx);
    assert_eq!(ctx.ret() as u32, a.as_u32());
    k.procs.get_mut(b).unwrap().owner = 4;
    svc_handler(&mut k, SYS_GET_USINT_PID, US_INT_PS2_KEY as u64, 0, 0, &mut ctx);
    assert_eq!(ctx.ret(), -1);

    run_as(&mut k, &mut ctx, a);
    svc_handler(&mut k, SYS_PROC_USINT_UNREGISTER, US_INT_PS2_KEY as u64, 0, 0, &mut ctx);
    k.procs.get_mut(b).unwrap().owner = 0;
    run_as(&mut k, &mut ctx, b);
    svc_handler(&mut k, SYS_GET_USINT_PID, US_INT_PS2_KEY as u64, 0, 0, &mut ctx);
    assert_eq!(ctx.ret(), -1, "registration removed");
}

#[test]
fn char_device_roundtrip() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let p = spawn(&mut k, "ttyd");
    run_as(&mut k, &mut ctx, p);

    k.platform.chr_in.extend(b"ok");
    let mut buf = [0u8; 8];
    svc_handler(
        &mut k,
        SYS_DEV_CHAR_READ,
        DEV_CHR as u64,
        buf.as_mut_ptr() as u64,
        buf.len() as u64,
        &mut ctx,
    );
    assert_eq!(ctx.ret(), 2);
    assert_eq!(&buf[..2], b"ok");

    svc_handler(
        &mut k,
        SYS_DEV_CHAR_WRITE,
        DEV_CHR as u64,
        b"hello".as_ptr() as u64,
        5,
        &mut ctx,
    );
    assert_eq!(ctx.ret(), 5);
    assert_eq!(&k.platform.chr_out, b"hello");

    // Unknown device class.
    svc_handler(&mut k, SYS_DEV_CHAR_READ, 99, buf.as_mut_ptr() as u64, 1, &mut ctx);
    assert_eq!(ctx.ret(), -1);
}

#[test]
fn block_device_write_then_read_back() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let p = spawn(&mut k, "sdd");
    run_as(&mut k, &mut ctx, p);

    let mut sector = [0u8; 512];
    sector[..4].copy_from_slice(b"boot");
    svc_handler(
        &mut k,
        SYS_DEV_BLOCK_WRITE,
        DEV_BLK as u64,
        3,
        sector.as_ptr() as u64,
        &mut ctx,
    );
    assert_eq!(ctx.ret(), 0);
    svc_handler(&mut k, SYS_DEV_BLOCK_WRITE_DONE, DEV_BLK as u64, 0, 0, &mut ctx);
    assert_eq!(ctx.ret(), 0);

    svc_handler(&mut k, SYS_DEV_BLOCK_READ, DEV_BLK as u64, 3, 0, &mut ctx);
    assert_eq!(ctx.ret(), 0);
    let mut out = [0u8; 512];
    svc_handler(
        &mut k,
        SYS_DEV_BLOCK_READ_DONE,
        DEV_BLK as u64,
        out.as_mut_ptr() as u64,
        0,
        &mut ctx,
    );
    assert_eq!(ctx.ret(), 0);
    assert_eq!(&out[..4], b"boot");

    // Nothing in flight: completion reports not-ready.
    svc_handler(
        &mut k,
        SYS_DEV_BLOCK_READ_DONE,
        DEV_BLK as u64,
        out.as_mut_ptr() as u64,
        0,
        &mut ctx,
    );
    assert_eq!(ctx.ret(), -1);
}

#[test]
fn sysinfo_reports_machine_and_memory() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let p = spawn(&mut k, "top");
    run_as(&mut k, &mut ctx, p);

    let mut info = SysInfo {
        total_mem: 0,
        free_mem: 0,
        shm_mem: 0,
        kernel_tic: 0,
        machine: [0; 32],
    };
    svc_handler(
        &mut k,
        SYS_GET_SYSINFO,
        core::ptr::from_mut(&mut info) as u64,
        0,
        0,
        &mut ctx,
    );
    assert_eq!(ctx.ret(), 0);
    assert_eq!(info.total_mem, 128 << 20);
    assert_eq!(&info.machine[..5], b"virt\0");
}

#[test]
fn kernel_clock_is_readable() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let p = spawn(&mut k, "clock");
    run_as(&mut k, &mut ctx, p);
    k.platform.now_usec = 123_456;

    let mut usec: u64 = 0;
    svc_handler(
        &mut k,
        SYS_GET_KERNEL_USEC,
        core::ptr::from_mut(&mut usec) as u64,
        0,
        0,
        &mut ctx,
    );
    assert_eq!(ctx.ret(), 0);
    assert_eq!(usec, 123_456);

    svc_handler(&mut k, SYS_GET_KERNEL_TIC, 0, 0, 0, &mut ctx);
    assert_eq!(ctx.ret(), 0);
}

#[test]
fn globals_roundtrip_and_replace() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let a = spawn(&mut k, "a");
    let b = spawn(&mut k, "b");

    run_as(&mut k, &mut ctx, a);
    let name = cstr("boot.stage");
    let v1 = cstr("early");
    let v2 = cstr("late");
    svc_handler(
        &mut k,
        SYS_SET_GLOBAL,
        name.as_ptr() as u64,
        v1.as_ptr() as u64,
        0,
        &mut ctx,
    );
    assert_eq!(ctx.ret(), 0);
    svc_handler(
        &mut k,
        SYS_SET_GLOBAL,
        name.as_ptr() as u64,
        v2.as_ptr() as u64,
        0,
        &mut ctx,
    );

    // Globals are kernel-wide: another process reads the replacement.
    run_as(&mut k, &mut ctx, b);
    let mut out = [0u8; 16];
    svc_handler(
        &mut k,
        SYS_GET_GLOBAL,
        name.as_ptr() as u64,
        out.as_mut_ptr() as u64,
        out.len() as u64,
        &mut ctx,
    );
    assert_eq!(ctx.ret(), 0);
    assert_eq!(&out[..5], b"late\0");
}

#[test]
fn malloc_and_shm_are_scoped_to_the_caller() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let p = spawn(&mut k, "app");
    run_as(&mut k, &mut ctx, p);

    svc_handler(&mut k, SYS_MALLOC, 256, 0, 0, &mut ctx);
    assert!(ctx.ret() > 0);

    svc_handler(&mut k, SYS_PROC_SHM_ALLOC, 4096, 0, 0, &mut ctx);
    let id = ctx.ret();
    assert!(id >= 0);
    svc_handler(&mut k, SYS_PROC_SHM_MAP, id as u64, 0, 0, &mut ctx);
    assert!(ctx.ret() > 0);
}

#[test]
fn mmio_map_requires_privilege() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let p = spawn(&mut k, "driver");
    run_as(&mut k, &mut ctx, p);

    svc_handler(&mut k, SYS_MMIO_MAP, 0, 0, 0, &mut ctx);
    assert_eq!(ctx.ret(), 0xF000_0000);

    k.procs.get_mut(p).unwrap().owner = 2;
    svc_handler(&mut k, SYS_MMIO_MAP, 0, 0, 0, &mut ctx);
    assert_eq!(ctx.ret(), -1);
}

#[test]
fn kprint_tty_only_goes_to_the_uart() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let p = spawn(&mut k, "dbg");
    run_as(&mut k, &mut ctx, p);

    let msg = cstr("panic soon");
    svc_handler(&mut k, SYS_KPRINT, msg.as_ptr() as u64, 10, 1, &mut ctx);
    assert_eq!(&k.platform.uart, b"panic soon");
}

#[test]
fn unknown_opcode_leaves_state_alone() {
    let mut k = kernel();
    let mut ctx = Context::zeroed();
    let p = spawn(&mut k, "app");
    run_as(&mut k, &mut ctx, p);

    ctx.set_ret(7777);
    svc_handler(&mut k, 9999, 0, 0, 0, &mut ctx);
    assert_eq!(ctx.ret(), 7777);
    assert_eq!(k.procs.get(p).unwrap().state, ProcState::Running);
}

//! System-call dispatch.
//!
//! One entry point routes a numeric opcode plus up to three scalar
//! arguments to the grouped handler modules. Scalar results land in the
//! frame's first general register; blocking handlers store a retry
//! sentinel there and park the caller instead.

mod device;
mod event;
mod info;
mod ipc;
mod lock;
mod memory;
mod pipe;
mod process;
pub mod userptr;
mod vfs;

use pion_core::kerr;
use pion_syscall as abi;

use crate::arch::Context;
use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::sched;

/// SVC trap entry: decode and dispatch one system call.
///
/// The vector trampoline has already masked interrupts and published
/// the saved frame; `a0..a2` are the first three argument registers at
/// trap time.
pub fn svc_handler<P: Platform>(
    k: &mut Kernel<P>,
    code: u32,
    a0: u64,
    a1: u64,
    a2: u64,
    ctx: &mut Context,
) {
    let Some(pid) = k.procs.current_pid() else {
        kerr!("svc code({}) with no current process", code);
        return;
    };

    match code {
        abi::SYS_EXIT => process::sys_exit(k, ctx, a0 as i64 as i32),
        abi::SYS_FORK => {
            let res = process::sys_fork(k, ctx);
            ctx.set_ret(res);
        }
        abi::SYS_THREAD => {
            let res = process::sys_thread(k, ctx, a0, a1, a2);
            ctx.set_ret(res);
        }
        abi::SYS_DETACH => process::sys_detach(k),
        abi::SYS_WAIT_PID => process::sys_waitpid(k, ctx, a0),
        abi::SYS_EXEC_ELF => process::sys_exec_elf(k, ctx, a0, a1, a2),
        abi::SYS_USLEEP => process::sys_usleep(k, ctx, a0),
        abi::SYS_KILL => process::sys_kill(k, ctx, a0),
        abi::SYS_YIELD => sched::schedule(&mut k.procs, ctx),
        abi::SYS_GET_PID => ctx.set_ret(process::sys_getpid(k)),
        abi::SYS_GET_PID_BY_GNAME => ctx.set_ret(process::sys_getpid_by_gname(k, a0)),
        abi::SYS_GET_THREAD_ID => ctx.set_ret(process::sys_get_threadid(k)),

        abi::SYS_PROC_SET_CWD => ctx.set_ret(process::sys_set_cwd(k, a0)),
        abi::SYS_PROC_GET_CWD => ctx.set_ret(process::sys_get_cwd(k, a0, a1)),
        abi::SYS_PROC_SET_GNAME => ctx.set_ret(process::sys_set_gname(k, a0)),
        abi::SYS_PROC_SET_UID => ctx.set_ret(process::sys_set_uid(k, a0)),
        abi::SYS_PROC_GET_UID => ctx.set_ret(process::sys_get_uid(k)),
        abi::SYS_PROC_GET_CMD => ctx.set_ret(process::sys_get_cmd(k, a0, a1, a2)),

        abi::SYS_MALLOC => ctx.set_ret(memory::sys_malloc(k, a0)),
        abi::SYS_FREE => memory::sys_free(k, a0),
        abi::SYS_PROC_SHM_ALLOC => ctx.set_ret(memory::sys_shm_alloc(k, a0, a1)),
        abi::SYS_PROC_SHM_MAP => ctx.set_ret(memory::sys_shm_map(k, a0)),
        abi::SYS_PROC_SHM_UNMAP => ctx.set_ret(memory::sys_shm_unmap(k, a0)),
        abi::SYS_PROC_SHM_REF => ctx.set_ret(memory::sys_shm_ref(k, a0)),
        abi::SYS_MMIO_MAP => ctx.set_ret(memory::sys_mmio_map(k)),
        abi::SYS_FRAMEBUFFER_MAP => ctx.set_ret(memory::sys_framebuffer_map(k, a0)),

        abi::SYS_VFS_GET => ctx.set_ret(vfs::sys_vfs_get(k, a0, a1)),
        abi::SYS_VFS_KIDS => ctx.set_ret(vfs::sys_vfs_kids(k, a0, a1, a2)),
        abi::SYS_VFS_SET => ctx.set_ret(vfs::sys_vfs_set(k, a0)),
        abi::SYS_VFS_ADD => ctx.set_ret(vfs::sys_vfs_add(k, a0, a1)),
        abi::SYS_VFS_DEL => ctx.set_ret(vfs::sys_vfs_del(k, a0)),
        abi::SYS_VFS_NEW_NODE => ctx.set_ret(vfs::sys_vfs_new_node(k, a0)),
        abi::SYS_VFS_GET_MOUNT => ctx.set_ret(vfs::sys_vfs_get_mount(k, a0, a1)),
        abi::SYS_VFS_GET_MOUNT_BY_ID => ctx.set_ret(vfs::sys_vfs_get_mount_by_id(k, a0, a1)),
        abi::SYS_VFS_MOUNT => ctx.set_ret(vfs::sys_vfs_mount(k, a0, a1)),
        abi::SYS_VFS_UMOUNT => ctx.set_ret(vfs::sys_vfs_umount(k, a0)),
        abi::SYS_VFS_OPEN => ctx.set_ret(vfs::sys_vfs_open(k, a0, a1, a2)),
        abi::SYS_VFS_PROC_CLOSE => ctx.set_ret(vfs::sys_vfs_close(k, a0)),
        abi::SYS_VFS_PROC_SEEK => ctx.set_ret(vfs::sys_vfs_seek(k, a0, a1)),
        abi::SYS_VFS_PROC_TELL => ctx.set_ret(vfs::sys_vfs_tell(k, a0)),
        abi::SYS_VFS_GET_BY_FD => ctx.set_ret(vfs::sys_vfs_get_by_fd(k, a0, a1, a2)),
        abi::SYS_VFS_PROC_GET_BY_FD => ctx.set_ret(vfs::sys_vfs_proc_get_by_fd(k, a0, a1, a2)),
        abi::SYS_VFS_PROC_DUP => ctx.set_ret(vfs::sys_vfs_dup(k, a0)),
        abi::SYS_VFS_PROC_DUP2 => ctx.set_ret(vfs::sys_vfs_dup2(k, a0, a1)),

        abi::SYS_PIPE_OPEN => ctx.set_ret(pipe::sys_pipe_open(k, a0, a1)),
        abi::SYS_PIPE_READ => pipe::sys_pipe_read(k, ctx, a0, a1, a2),
        abi::SYS_PIPE_WRITE => pipe::sys_pipe_write(k, ctx, a0, a1, a2),

        abi::SYS_LOCK_NEW => ctx.set_ret(lock::sys_lock_new(k)),
        abi::SYS_LOCK_FREE => ctx.set_ret(lock::sys_lock_free(k, a0)),
        abi::SYS_LOCK => lock::sys_lock(k, ctx, a0),
        abi::SYS_UNLOCK => ctx.set_ret(lock::sys_unlock(k, a0)),

        abi::SYS_PROC_SET_ENV => ctx.set_ret(process::sys_set_env(k, a0, a1)),
        abi::SYS_PROC_GET_ENV => ctx.set_ret(process::sys_get_env(k, a0, a1, a2)),
        abi::SYS_PROC_GET_ENV_NAME => ctx.set_ret(process::sys_get_env_name(k, a0, a1, a2)),
        abi::SYS_PROC_GET_ENV_VALUE => ctx.set_ret(process::sys_get_env_value(k, a0, a1, a2)),
        abi::SYS_SET_GLOBAL => ctx.set_ret(info::sys_set_global(k, a0, a1)),
        abi::SYS_GET_GLOBAL => ctx.set_ret(info::sys_get_global(k, a0, a1, a2)),

        abi::SYS_DEV_CHAR_READ => ctx.set_ret(device::sys_dev_ch_read(k, a0, a1, a2)),
        abi::SYS_DEV_CHAR_WRITE => ctx.set_ret(device::sys_dev_ch_write(k, a0, a1, a2)),
        abi::SYS_DEV_BLOCK_READ => ctx.set_ret(device::sys_dev_block_read(k, a0, a1)),
        abi::SYS_DEV_BLOCK_WRITE => ctx.set_ret(device::sys_dev_block_write(k, a0, a1, a2)),
        abi::SYS_DEV_BLOCK_READ_DONE => device::sys_dev_block_read_done(k, ctx, a0, a1),
        abi::SYS_DEV_BLOCK_WRITE_DONE => device::sys_dev_block_write_done(k, ctx, a0),

        abi::SYS_IPC_SETUP => {
            let res = ipc::sys_ipc_setup(k, ctx, a0, a1, a2);
            ctx.set_ret(res);
        }
        abi::SYS_IPC_CALL => ipc::sys_ipc_call(k, ctx, a0, a1, a2),
        abi::SYS_IPC_GET_RETURN => ipc::sys_ipc_get_return(k, ctx, a0, a1),
        abi::SYS_IPC_SET_RETURN => ctx.set_ret(ipc::sys_ipc_set_return(k, a0)),
        abi::SYS_IPC_END => ipc::sys_ipc_end(k, ctx),
        abi::SYS_IPC_GET_ARG => ctx.set_ret(ipc::sys_ipc_get_arg(k, a0, a1)),

        abi::SYS_PROC_USINT_REGISTER => ctx.set_ret(event::sys_usint_register(k, a0)),
        abi::SYS_PROC_USINT_UNREGISTER => event::sys_usint_unregister(k, a0),
        abi::SYS_GET_USINT_PID => ctx.set_ret(event::sys_get_usint_pid(k, a0)),
        abi::SYS_PROC_CRITICAL_ENTER => process::sys_critical_enter(k),
        abi::SYS_PROC_CRITICAL_QUIT => process::sys_critical_quit(k),
        abi::SYS_GET_KEVENT => event::sys_get_kevent(k, ctx, a0),

        abi::SYS_GET_SYSINFO => ctx.set_ret(info::sys_get_sysinfo(k, a0)),
        abi::SYS_GET_KERNEL_USEC => ctx.set_ret(info::sys_get_kernel_usec(k, a0)),
        abi::SYS_GET_KERNEL_TIC => ctx.set_ret(info::sys_get_kernel_tic(k)),
        abi::SYS_GET_PROCS => ctx.set_ret(info::sys_get_procs(k, a0, a1)),
        abi::SYS_PROC_PING => ctx.set_ret(process::sys_proc_ping(k, a0)),
        abi::SYS_PROC_READY_PING => process::sys_proc_ready_ping(k),

        abi::SYS_KPRINT => device::sys_kprint(k, a0, a1, a2),

        _ => kerr!("pid:{}, code({}) error!", pid.as_u32(), code),
    }
}

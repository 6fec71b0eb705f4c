//! VFS handlers: resolution, node surgery, mounts and descriptors.

use pion_core::id::{Fd, MountId, Pid};
use pion_syscall::{FsInfo, MountInfo, RET_ERR};

use crate::kernel::Kernel;
use crate::platform::Platform;
use crate::syscall::userptr;
use crate::vfs::{cstr_field, NodeHandle, NodeKind};

fn unpack(word: u64) -> Result<NodeHandle, i64> {
    NodeHandle::unpack(word).ok_or(RET_ERR)
}

pub(super) fn sys_vfs_get<P: Platform>(k: &mut Kernel<P>, path_ptr: u64, info_ptr: u64) -> i64 {
    // SAFETY: Trap contract; syscall pointers are mapped in the
    // caller's space for the duration of the trap.
    let Ok(path) = (unsafe { userptr::read_cstr(path_ptr) }) else {
        return RET_ERR;
    };
    let root = k.vfs.root();
    let Some(node) = k.vfs.get(root, &path) else {
        return RET_ERR;
    };
    let Some(info) = k.vfs.fill_info(node) else {
        return RET_ERR;
    };
    // SAFETY: Trap contract.
    match unsafe { userptr::write_struct(info_ptr, &info) } {
        Ok(()) => 0,
        Err(e) => e,
    }
}

pub(super) fn sys_vfs_kids<P: Platform>(
    k: &mut Kernel<P>,
    info_ptr: u64,
    out_ptr: u64,
    max: u64,
) -> i64 {
    // SAFETY: Trap contract.
    let Ok(info) = (unsafe { userptr::read_struct::<FsInfo>(info_ptr) }) else {
        return 0;
    };
    let Ok(node) = unpack(info.node) else {
        return 0;
    };
    let kids = k.vfs.kids(node);
    let mut written = 0u64;
    for kid in kids.into_iter().take(max as usize) {
        let Some(kid_info) = k.vfs.fill_info(kid) else {
            continue;
        };
        let slot = out_ptr + written * core::mem::size_of::<FsInfo>() as u64;
        // SAFETY: Trap contract; the caller sized the array via `max`.
        if unsafe { userptr::write_struct(slot, &kid_info) }.is_err() {
            break;
        }
        written += 1;
    }
    written as i64
}

pub(super) fn sys_vfs_set<P: Platform>(k: &mut Kernel<P>, info_ptr: u64) -> i64 {
    // SAFETY: Trap contract.
    let Ok(info) = (unsafe { userptr::read_struct::<FsInfo>(info_ptr) }) else {
        return RET_ERR;
    };
    let Ok(node) = unpack(info.node) else {
        return RET_ERR;
    };
    match k.vfs.set_info(node, &info) {
        Ok(()) => 0,
        Err(e) => e.to_scalar(),
    }
}

pub(super) fn sys_vfs_add<P: Platform>(k: &mut Kernel<P>, to_ptr: u64, info_ptr: u64) -> i64 {
    // SAFETY: Trap contract.
    let (to, info) = unsafe {
        match (
            userptr::read_struct::<FsInfo>(to_ptr),
            userptr::read_struct::<FsInfo>(info_ptr),
        ) {
            (Ok(t), Ok(i)) => (t, i),
            _ => return RET_ERR,
        }
    };
    let (Ok(parent), Ok(child)) = (unpack(to.node), unpack(info.node)) else {
        return RET_ERR;
    };
    let linked = match k.vfs.add(parent, child) {
        Ok(n) => n,
        Err(e) => return e.to_scalar(),
    };
    // Write back the record actually linked; on a name collision that
    // is the existing child, not the caller's node.
    let Some(out) = k.vfs.fill_info(linked) else {
        return RET_ERR;
    };
    // SAFETY: Trap contract.
    match unsafe { userptr::write_struct(info_ptr, &out) } {
        Ok(()) => 0,
        Err(e) => e,
    }
}

pub(super) fn sys_vfs_del<P: Platform>(k: &mut Kernel<P>, info_ptr: u64) -> i64 {
    // SAFETY: Trap contract.
    let Ok(info) = (unsafe { userptr::read_struct::<FsInfo>(info_ptr) }) else {
        return RET_ERR;
    };
    let Ok(node) = unpack(info.node) else {
        return RET_ERR;
    };
    match k.vfs.del(node) {
        Ok(()) => 0,
        Err(e) => e.to_scalar(),
    }
}

pub(super) fn sys_vfs_new_node<P: Platform>(k: &mut Kernel<P>, info_ptr: u64) -> i64 {
    // SAFETY: Trap contract.
    let Ok(mut info) = (unsafe { userptr::read_struct::<FsInfo>(info_ptr) }) else {
        return RET_ERR;
    };
    let name = cstr_field(&info.name);
    if name.is_empty() {
        return RET_ERR;
    }
    let node = k.vfs.new_node(name, NodeKind::File);
    info.node = node.pack();
    info.mount_id = -1;
    if k.vfs.set_info(node, &info).is_err() {
        return RET_ERR;
    }
    // SAFETY: Trap contract.
    match unsafe { userptr::write_struct(info_ptr, &info) } {
        Ok(()) => 0,
        Err(e) => e,
    }
}

fn mount_info<P: Platform>(k: &Kernel<P>, id: MountId) -> Option<MountInfo> {
    let mount = k.vfs.mount_by_id(id)?;
    Some(MountInfo {
        root_node: mount.root.pack(),
        server_pid: mount.server_pid.as_u32() as i32,
        id: id.as_i32(),
    })
}

pub(super) fn sys_vfs_get_mount<P: Platform>(
    k: &mut Kernel<P>,
    info_ptr: u64,
    mount_ptr: u64,
) -> i64 {
    // SAFETY: Trap contract.
    let Ok(info) = (unsafe { userptr::read_struct::<FsInfo>(info_ptr) }) else {
        return RET_ERR;
    };
    let Ok(node) = unpack(info.node) else {
        return RET_ERR;
    };
    let Some((id, _)) = k.vfs.owning_mount(node) else {
        return RET_ERR;
    };
    let Some(out) = mount_info(k, id) else {
        return RET_ERR;
    };
    // SAFETY: Trap contract.
    match unsafe { userptr::write_struct(mount_ptr, &out) } {
        Ok(()) => 0,
        Err(e) => e,
    }
}

pub(super) fn sys_vfs_get_mount_by_id<P: Platform>(
    k: &mut Kernel<P>,
    id: u64,
    mount_ptr: u64,
) -> i64 {
    let Some(out) = mount_info(k, MountId::new(id as i64 as i32)) else {
        return RET_ERR;
    };
    // SAFETY: Trap contract.
    match unsafe { userptr::write_struct(mount_ptr, &out) } {
        Ok(()) => 0,
        Err(e) => e,
    }
}

pub(super) fn sys_vfs_mount<P: Platform>(k: &mut Kernel<P>, to_ptr: u64, info_ptr: u64) -> i64 {
    // SAFETY: Trap contract.
    let (to, info) = unsafe {
        match (
            userptr::read_struct::<FsInfo>(to_ptr),
            userptr::read_struct::<FsInfo>(info_ptr),
        ) {
            (Ok(t), Ok(i)) => (t, i),
            _ => return RET_ERR,
        }
    };
    let (Ok(at), Ok(overlay)) = (unpack(to.node), unpack(info.node)) else {
        return RET_ERR;
    };
    let Some(server) = k.procs.current_pid() else {
        return RET_ERR;
    };
    match k.vfs.mount(at, overlay, server) {
        Ok(_) => 0,
        Err(e) => e.to_scalar(),
    }
}

pub(super) fn sys_vfs_umount<P: Platform>(k: &mut Kernel<P>, info_ptr: u64) -> i64 {
    // SAFETY: Trap contract.
    let Ok(info) = (unsafe { userptr::read_struct::<FsInfo>(info_ptr) }) else {
        return RET_ERR;
    };
    let Ok(at) = unpack(info.node) else {
        return RET_ERR;
    };
    match k.vfs.umount(at) {
        Ok(()) => 0,
        Err(e) => e.to_scalar(),
    }
}

pub(super) fn sys_vfs_open<P: Platform>(
    k: &mut Kernel<P>,
    pid: u64,
    info_ptr: u64,
    writable: u64,
) -> i64 {
    // SAFETY: Trap contract.
    let Ok(info) = (unsafe { userptr::read_struct::<FsInfo>(info_ptr) }) else {
        return RET_ERR;
    };
    let Ok(node) = unpack(info.node) else {
        return RET_ERR;
    };
    let pid = Pid::new(pid as u32);
    match k.with_fds(pid, |k, fds| k.vfs.open(fds, node, writable != 0)) {
        Some(Ok(fd)) => i64::from(fd.as_u32()),
        Some(Err(e)) => e.to_scalar(),
        None => RET_ERR,
    }
}

pub(super) fn sys_vfs_close<P: Platform>(k: &mut Kernel<P>, fd: u64) -> i64 {
    let Some(pid) = k.procs.current_pid() else {
        return RET_ERR;
    };
    match k.close_fd(pid, Fd::new(fd as u32)) {
        Ok(()) => 0,
        Err(e) => e.to_scalar(),
    }
}

pub(super) fn sys_vfs_seek<P: Platform>(k: &mut Kernel<P>, fd: u64, offset: u64) -> i64 {
    let Some(pid) = k.procs.current_pid() else {
        return RET_ERR;
    };
    k.with_fds(pid, |k, fds| {
        k.vfs
            .seek(fds, Fd::new(fd as u32), offset as u32)
            .unwrap_or(RET_ERR)
    })
    .unwrap_or(RET_ERR)
}

pub(super) fn sys_vfs_tell<P: Platform>(k: &mut Kernel<P>, fd: u64) -> i64 {
    let Some(pid) = k.procs.current_pid() else {
        return RET_ERR;
    };
    k.with_fds(pid, |k, fds| {
        k.vfs.tell(fds, Fd::new(fd as u32)).unwrap_or(RET_ERR)
    })
    .unwrap_or(RET_ERR)
}

pub(super) fn sys_vfs_dup<P: Platform>(k: &mut Kernel<P>, fd: u64) -> i64 {
    let Some(pid) = k.procs.current_pid() else {
        return RET_ERR;
    };
    k.with_fds(pid, |k, fds| match k.vfs.dup(fds, Fd::new(fd as u32)) {
        Ok(new_fd) => i64::from(new_fd.as_u32()),
        Err(e) => e.to_scalar(),
    })
    .unwrap_or(RET_ERR)
}

pub(super) fn sys_vfs_dup2<P: Platform>(k: &mut Kernel<P>, fd: u64, new_fd: u64) -> i64 {
    let Some(pid) = k.procs.current_pid() else {
        return RET_ERR;
    };
    let fd = Fd::new(fd as u32);
    let new_fd = Fd::new(new_fd as u32);
    if fd == new_fd {
        return i64::from(new_fd.as_u32());
    }
    // An occupied target slot is closed first, waking pipe peers.
    let _ = k.close_fd(pid, new_fd);
    k.with_fds(pid, |k, fds| match k.vfs.dup2(fds, fd, new_fd) {
        Ok(out) => i64::from(out.as_u32()),
        Err(e) => e.to_scalar(),
    })
    .unwrap_or(RET_ERR)
}

pub(super) fn sys_vfs_get_by_fd<P: Platform>(
    k: &mut Kernel<P>,
    fd: u64,
    pid: u64,
    info_ptr: u64,
) -> i64 {
    // Only the privileged owner may inspect another process's table.
    if k.procs.current_proc().is_none_or(|p| p.owner != 0) {
        return 0;
    }
    let Some(target) = k.procs.get(Pid::new(pid as u32)) else {
        return 0;
    };
    let Some((node, ufid)) = k.vfs.node_by_fd(&target.fds, Fd::new(fd as u32)) else {
        return 0;
    };
    if info_ptr != 0 {
        if let Some(info) = k.vfs.fill_info(node) {
            // SAFETY: Trap contract.
            let _ = unsafe { userptr::write_struct(info_ptr, &info) };
        }
    }
    i64::from(ufid.as_u32())
}

pub(super) fn sys_vfs_proc_get_by_fd<P: Platform>(
    k: &mut Kernel<P>,
    fd: u64,
    info_ptr: u64,
    ufid_ptr: u64,
) -> i64 {
    let Some(p) = k.procs.current_proc() else {
        return RET_ERR;
    };
    let Some((node, ufid)) = k.vfs.node_by_fd(&p.fds, Fd::new(fd as u32)) else {
        return RET_ERR;
    };
    if info_ptr != 0 {
        let Some(info) = k.vfs.fill_info(node) else {
            return RET_ERR;
        };
        // SAFETY: Trap contract.
        if unsafe { userptr::write_struct(info_ptr, &info) }.is_err() {
            return RET_ERR;
        }
    }
    if ufid_ptr != 0 {
        // SAFETY: Trap contract.
        if unsafe { userptr::write_struct(ufid_ptr, &ufid.as_u32()) }.is_err() {
            return RET_ERR;
        }
    }
    0
}

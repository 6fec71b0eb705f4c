//! The VFS node graph.
//!
//! The kernel keeps names and reference counts only; file content lives
//! in user-space filesystem servers. Nodes form a tree with parent /
//! children links; mounts overlay one subtree onto another node and are
//! followed transparently during resolution.
//!
//! Nodes live in a generation-tagged arena. The ABI still carries a node
//! reference as one opaque machine word ([`NodeHandle::pack`]), but a
//! stale word no longer dereferences freed memory; it simply fails the
//! generation check.

pub mod fd;

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use pion_core::id::{MountId, Pid, Ufid};
use pion_syscall::{
    FS_TYPE_DEV, FS_TYPE_DIR, FS_TYPE_FILE, FS_TYPE_MOUNT_POINT, FS_TYPE_PIPE, FsInfo,
    NODE_NAME_MAX,
};

use crate::error::{KernError, KernResult};
use crate::pipe::PipeBuf;
use fd::{FdTable, OpenFile};
use pion_core::id::Fd;

/// A generation-tagged reference into the node arena.
///
/// Packs into one machine word for the ABI; 0 is never a valid packed
/// handle, so it doubles as the "no node" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHandle {
    index: u32,
    generation: u32,
}

impl NodeHandle {
    /// Packs the handle into one nonzero machine word.
    pub fn pack(self) -> u64 {
        (u64::from(self.generation) + 1) << 32 | u64::from(self.index)
    }

    /// Unpacks a machine word; 0 yields `None`.
    pub fn unpack(word: u64) -> Option<Self> {
        let tagged = (word >> 32) as u32;
        if tagged == 0 {
            return None;
        }
        Some(Self {
            index: word as u32,
            generation: tagged - 1,
        })
    }
}

/// What a node names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Directory.
    Dir,
    /// Regular file (content held by a filesystem server).
    File,
    /// Device.
    Dev,
    /// Pipe; carries a byte buffer.
    Pipe,
}

impl NodeKind {
    fn from_ftype(ftype: u32) -> Self {
        match ftype {
            FS_TYPE_DIR | FS_TYPE_MOUNT_POINT => Self::Dir,
            FS_TYPE_DEV => Self::Dev,
            FS_TYPE_PIPE => Self::Pipe,
            _ => Self::File,
        }
    }

    fn to_ftype(self) -> u32 {
        match self {
            Self::Dir => FS_TYPE_DIR,
            Self::File => FS_TYPE_FILE,
            Self::Dev => FS_TYPE_DEV,
            Self::Pipe => FS_TYPE_PIPE,
        }
    }
}

/// One named node.
pub struct Node {
    /// Component name within the parent.
    pub name: String,
    /// Node kind.
    pub kind: NodeKind,
    /// Size in bytes, maintained by the owning filesystem server.
    pub size: u32,
    /// Per-type payload word (for pipes, the packed buffer handle).
    pub data: u64,
    /// Live open count plus child count.
    pub refs: u32,
    /// Set while a mount overlays this node.
    pub mount: Option<MountId>,
    /// Pipe buffer, present only for [`NodeKind::Pipe`].
    pub pipe: Option<PipeBuf>,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
}

impl Node {
    fn new(name: &str, kind: NodeKind) -> Self {
        Self {
            name: String::from(name),
            kind,
            size: 0,
            data: 0,
            refs: 0,
            mount: None,
            pipe: None,
            parent: None,
            children: Vec::new(),
        }
    }
}

/// An overlay of one subtree onto a node.
pub struct Mount {
    /// The node being overlaid.
    pub at: NodeHandle,
    /// Root of the overlay subtree.
    pub root: NodeHandle,
    /// Pid of the filesystem server owning the mount.
    pub server_pid: Pid,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// The node graph, mount table and open-file table.
pub struct Vfs {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeHandle,
    mounts: Vec<Option<Mount>>,
    opens: Vec<Option<OpenFile>>,
    next_ufid: u32,
}

impl Vfs {
    /// Creates a graph holding only the root directory.
    pub fn new() -> Self {
        let mut vfs = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeHandle {
                index: 0,
                generation: 0,
            },
            mounts: Vec::new(),
            opens: Vec::new(),
            next_ufid: 1,
        };
        let root = vfs.alloc_node(Node::new("/", NodeKind::Dir));
        vfs.root = root;
        vfs
    }

    /// The root directory. Never deleted.
    pub fn root(&self) -> NodeHandle {
        self.root
    }

    fn alloc_node(&mut self, node: Node) -> NodeHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeHandle {
                index,
                generation: slot.generation,
            }
        } else {
            let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeHandle {
                index,
                generation: 0,
            }
        }
    }

    fn free_node(&mut self, handle: NodeHandle) {
        if let Some(slot) = self.slots.get_mut(handle.index as usize) {
            if slot.generation == handle.generation && slot.node.is_some() {
                slot.node = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(handle.index);
            }
        }
    }

    /// Borrows a node, failing the generation check on stale handles.
    pub fn node(&self, handle: NodeHandle) -> Option<&Node> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.node.as_ref()
    }

    /// Mutably borrows a node, failing the generation check on stale handles.
    pub fn node_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.node.as_mut()
    }

    /// Allocates a fresh unlinked node.
    pub fn new_node(&mut self, name: &str, kind: NodeKind) -> NodeHandle {
        self.alloc_node(Node::new(name, kind))
    }

    /// Links `child` under `parent`.
    ///
    /// A name collision with an existing child is not an error: the
    /// existing child is returned instead and `child` is left unlinked.
    ///
    /// # Errors
    ///
    /// [`KernError::BadHandle`] on stale handles, [`KernError::Invalid`]
    /// when `child` is already linked.
    pub fn add(&mut self, parent: NodeHandle, child: NodeHandle) -> KernResult<NodeHandle> {
        let child_name = {
            let node = self.node(child).ok_or(KernError::BadHandle)?;
            if node.parent.is_some() {
                return Err(KernError::Invalid);
            }
            node.name.clone()
        };
        self.node(parent).ok_or(KernError::BadHandle)?;
        if let Some(existing) = self.child_by_name(parent, &child_name) {
            return Ok(existing);
        }

        // node_mut re-borrows; both handles were just validated.
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.node_mut(parent) {
            node.children.push(child);
            node.refs += 1;
        }
        Ok(child)
    }

    /// Deletes a node.
    ///
    /// # Errors
    ///
    /// [`KernError::Denied`] for the root or a mount point,
    /// [`KernError::Busy`] while references remain.
    pub fn del(&mut self, handle: NodeHandle) -> KernResult<()> {
        if handle == self.root {
            return Err(KernError::Denied);
        }
        let parent = {
            let node = self.node(handle).ok_or(KernError::BadHandle)?;
            if node.mount.is_some() {
                return Err(KernError::Denied);
            }
            if node.refs > 0 {
                return Err(KernError::Busy);
            }
            node.parent
        };
        if let Some(parent) = parent {
            if let Some(pnode) = self.node_mut(parent) {
                pnode.children.retain(|c| *c != handle);
                pnode.refs = pnode.refs.saturating_sub(1);
            }
        }
        self.free_node(handle);
        Ok(())
    }

    fn child_by_name(&self, parent: NodeHandle, name: &str) -> Option<NodeHandle> {
        let node = self.node(parent)?;
        node.children
            .iter()
            .copied()
            .find(|c| self.node(*c).is_some_and(|n| n.name == name))
    }

    /// Follows mount overlays until reaching an unmounted node.
    pub fn resolve_mount(&self, handle: NodeHandle) -> NodeHandle {
        let mut current = handle;
        // Overlay chains are short; bail out rather than loop on a cycle.
        for _ in 0..self.mounts.len() + 1 {
            let Some(node) = self.node(current) else {
                return current;
            };
            let Some(mid) = node.mount else {
                return current;
            };
            match self.mount_by_id(mid) {
                Some(mount) => current = mount.root,
                None => return current,
            }
        }
        current
    }

    /// Resolves a `/`-separated path from `from`, descending into mount
    /// overlays transparently. Empty components are skipped.
    pub fn get(&self, from: NodeHandle, path: &str) -> Option<NodeHandle> {
        let mut current = self.resolve_mount(from);
        self.node(current)?;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let next = self.child_by_name(current, component)?;
            current = self.resolve_mount(next);
        }
        Some(current)
    }

    /// The children of a node (of its overlay when mounted).
    pub fn kids(&self, handle: NodeHandle) -> Vec<NodeHandle> {
        let resolved = self.resolve_mount(handle);
        self.node(resolved)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Overlays the subtree rooted at `overlay` onto `at`.
    ///
    /// # Errors
    ///
    /// [`KernError::BadHandle`] on stale handles, [`KernError::Busy`]
    /// when `at` is already mounted over.
    pub fn mount(
        &mut self,
        at: NodeHandle,
        overlay: NodeHandle,
        server_pid: Pid,
    ) -> KernResult<MountId> {
        self.node(overlay).ok_or(KernError::BadHandle)?;
        if self.node(at).ok_or(KernError::BadHandle)?.mount.is_some() {
            return Err(KernError::Busy);
        }

        let id = match self.mounts.iter().position(Option::is_none) {
            Some(free) => free,
            None => {
                self.mounts.push(None);
                self.mounts.len() - 1
            }
        };
        let mid = MountId::new(i32::try_from(id).unwrap_or(i32::MAX));
        self.mounts[id] = Some(Mount {
            at,
            root: overlay,
            server_pid,
        });
        if let Some(node) = self.node_mut(at) {
            node.mount = Some(mid);
        }
        Ok(mid)
    }

    /// Removes the overlay on `at`, restoring the underlying node.
    ///
    /// # Errors
    ///
    /// [`KernError::NotFound`] when `at` is not a mount point.
    pub fn umount(&mut self, at: NodeHandle) -> KernResult<()> {
        let mid = self
            .node(at)
            .and_then(|n| n.mount)
            .ok_or(KernError::NotFound)?;
        if let Some(entry) = self.mounts.get_mut(mid.as_i32() as usize) {
            *entry = None;
        }
        if let Some(node) = self.node_mut(at) {
            node.mount = None;
        }
        Ok(())
    }

    /// Looks up a mount by id.
    pub fn mount_by_id(&self, id: MountId) -> Option<&Mount> {
        let index = usize::try_from(id.as_i32()).ok()?;
        self.mounts.get(index)?.as_ref()
    }

    /// The mount owning `handle`: the nearest enclosing overlay, found by
    /// climbing parent links until a node that is some overlay's root.
    pub fn owning_mount(&self, handle: NodeHandle) -> Option<(MountId, &Mount)> {
        let mut current = handle;
        loop {
            for (id, entry) in self.mounts.iter().enumerate() {
                if let Some(mount) = entry {
                    if mount.root == current {
                        let mid = MountId::new(i32::try_from(id).unwrap_or(i32::MAX));
                        return Some((mid, mount));
                    }
                }
            }
            current = self.node(current)?.parent?;
        }
    }

    /// Composes the user-visible record for a node.
    pub fn fill_info(&self, handle: NodeHandle) -> Option<FsInfo> {
        let node = self.node(handle)?;
        let mut info = FsInfo::zeroed();
        info.node = handle.pack();
        info.data = node.data;
        info.ftype = if node.mount.is_some() {
            FS_TYPE_MOUNT_POINT
        } else {
            node.kind.to_ftype()
        };
        info.size = node.size;
        info.mount_id = self
            .owning_mount(handle)
            .map_or(-1, |(mid, _)| mid.as_i32());
        let name = node.name.as_bytes();
        let len = name.len().min(NODE_NAME_MAX - 1);
        info.name[..len].copy_from_slice(&name[..len]);
        Some(info)
    }

    /// Applies a user-supplied record to a node: name, kind, size, data.
    /// Links and reference counts stay kernel-owned.
    pub fn set_info(&mut self, handle: NodeHandle, info: &FsInfo) -> KernResult<()> {
        let name = cstr_field(&info.name);
        let node = self.node_mut(handle).ok_or(KernError::BadHandle)?;
        if !name.is_empty() {
            node.name = String::from(name);
        }
        node.kind = NodeKind::from_ftype(info.ftype);
        node.size = info.size;
        node.data = info.data;
        Ok(())
    }

    // ── Open files and descriptors ──────────────────────────────────

    /// Opens `node` into a descriptor slot of `fds`.
    ///
    /// Each open gets a fresh [`Ufid`] so filesystem servers can
    /// distinguish concurrent opens of the same node.
    ///
    /// # Errors
    ///
    /// [`KernError::BadHandle`] on a stale node,
    /// [`KernError::NoSpace`] when the descriptor table is full.
    pub fn open(
        &mut self,
        fds: &mut FdTable,
        node: NodeHandle,
        writable: bool,
    ) -> KernResult<Fd> {
        self.node(node).ok_or(KernError::BadHandle)?;
        let open = OpenFile {
            node,
            seek: 0,
            writable,
            ufid: Ufid::new(self.next_ufid),
            refs: 1,
        };
        let open_idx = match self.opens.iter().position(Option::is_none) {
            Some(free) => {
                self.opens[free] = Some(open);
                free
            }
            None => {
                self.opens.push(Some(open));
                self.opens.len() - 1
            }
        };
        let Some(fd) = fds.alloc_slot(open_idx) else {
            self.opens[open_idx] = None;
            return Err(KernError::NoSpace);
        };
        self.next_ufid = self.next_ufid.wrapping_add(1).max(1);
        if let Some(n) = self.node_mut(node) {
            n.refs += 1;
        }
        Ok(fd)
    }

    /// Closes a descriptor, releasing its open file when this was the
    /// last duplicate. Returns the affected node and whether the node
    /// itself was freed (unlinked node whose last reference dropped).
    ///
    /// # Errors
    ///
    /// [`KernError::BadHandle`] when `fd` is not open.
    pub fn close(&mut self, fds: &mut FdTable, fd: Fd) -> KernResult<ClosedFd> {
        let open_idx = fds.take(fd).ok_or(KernError::BadHandle)?;
        let entry = self
            .opens
            .get_mut(open_idx)
            .and_then(Option::as_mut)
            .ok_or(KernError::BadHandle)?;
        let node = entry.node;
        entry.refs -= 1;
        if entry.refs == 0 {
            self.opens[open_idx] = None;
        }

        let mut freed = false;
        let mut kind = None;
        if let Some(n) = self.node_mut(node) {
            n.refs = n.refs.saturating_sub(1);
            kind = Some(n.kind);
            // An unlinked node (a pipe, or one removed from the tree)
            // with no references left has no owner to reclaim it.
            if n.refs == 0 && n.parent.is_none() && node != self.root {
                freed = true;
            }
        }
        if freed {
            self.free_node(node);
        }
        Ok(ClosedFd { node, kind, freed })
    }

    /// Duplicates `fd` into the lowest free descriptor slot.
    ///
    /// Both descriptors share one open file: cursor, mode and ufid.
    pub fn dup(&mut self, fds: &mut FdTable, fd: Fd) -> KernResult<Fd> {
        let open_idx = fds.get(fd).ok_or(KernError::BadHandle)?;
        let new_fd = fds.alloc_slot(open_idx).ok_or(KernError::NoSpace)?;
        self.ref_open(open_idx);
        Ok(new_fd)
    }

    /// Duplicates `fd` into slot `new_fd`. The caller must have closed
    /// any previous occupant.
    pub fn dup2(&mut self, fds: &mut FdTable, fd: Fd, new_fd: Fd) -> KernResult<Fd> {
        let open_idx = fds.get(fd).ok_or(KernError::BadHandle)?;
        if fds.get(new_fd).is_some() {
            return Err(KernError::Busy);
        }
        fds.set(new_fd, open_idx).ok_or(KernError::BadHandle)?;
        self.ref_open(open_idx);
        Ok(new_fd)
    }

    /// Duplicates a descriptor table for a forked child.
    ///
    /// Child descriptors share the parent's open files (cursor and
    /// mode), exactly like `dup` within one process.
    pub fn clone_table(&mut self, src: &FdTable) -> FdTable {
        let mut out = FdTable::new();
        for fd in src.iter_open() {
            if let Some(open_idx) = src.get(fd) {
                out.set(fd, open_idx);
                self.ref_open(open_idx);
            }
        }
        out
    }

    fn ref_open(&mut self, open_idx: usize) {
        let node = if let Some(open) = self.opens.get_mut(open_idx).and_then(Option::as_mut) {
            open.refs += 1;
            Some(open.node)
        } else {
            None
        };
        if let Some(node) = node {
            if let Some(n) = self.node_mut(node) {
                n.refs += 1;
            }
        }
    }

    /// Repositions an fd's cursor; returns the new position.
    pub fn seek(&mut self, fds: &FdTable, fd: Fd, offset: u32) -> KernResult<i64> {
        let open = self.open_mut(fds, fd)?;
        open.seek = offset;
        Ok(i64::from(offset))
    }

    /// Reads an fd's cursor.
    pub fn tell(&self, fds: &FdTable, fd: Fd) -> KernResult<i64> {
        let open_idx = fds.get(fd).ok_or(KernError::BadHandle)?;
        let open = self
            .opens
            .get(open_idx)
            .and_then(Option::as_ref)
            .ok_or(KernError::BadHandle)?;
        Ok(i64::from(open.seek))
    }

    /// The node and ufid behind a descriptor.
    pub fn node_by_fd(&self, fds: &FdTable, fd: Fd) -> Option<(NodeHandle, Ufid)> {
        let open_idx = fds.get(fd)?;
        let open = self.opens.get(open_idx)?.as_ref()?;
        Some((open.node, open.ufid))
    }

    fn open_mut(&mut self, fds: &FdTable, fd: Fd) -> KernResult<&mut OpenFile> {
        let open_idx = fds.get(fd).ok_or(KernError::BadHandle)?;
        self.opens
            .get_mut(open_idx)
            .and_then(Option::as_mut)
            .ok_or(KernError::BadHandle)
    }
}

impl Default for Vfs {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of closing a descriptor.
pub struct ClosedFd {
    /// The node the descriptor referenced.
    pub node: NodeHandle,
    /// Its kind, when the node still existed.
    pub kind: Option<NodeKind>,
    /// Whether the close also freed the node.
    pub freed: bool,
}

/// Decodes a NUL-padded fixed-size name field.
pub fn cstr_field(field: &[u8]) -> &str {
    let len = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    core::str::from_utf8(&field[..len]).unwrap_or("")
}

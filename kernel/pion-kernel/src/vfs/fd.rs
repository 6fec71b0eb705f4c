//! Open files and per-process descriptor tables.
//!
//! Descriptors are indices into a fixed per-process table whose slots
//! point at shared [`OpenFile`] records owned by the VFS. Duplicated
//! descriptors share one record, so they advance the same cursor.

use pion_core::id::{Fd, Ufid};

use crate::config::FD_MAX;
use crate::vfs::NodeHandle;

/// One open of a node: the cursor, the mode, and the unique open id.
#[derive(Debug, Clone, Copy)]
pub struct OpenFile {
    /// The node this open references.
    pub node: NodeHandle,
    /// Cursor position.
    pub seek: u32,
    /// Whether writes are permitted.
    pub writable: bool,
    /// Unique open id, for filesystem servers.
    pub ufid: Ufid,
    /// Descriptor references (grows with `dup`).
    pub refs: u32,
}

/// A per-process descriptor table.
///
/// Slots hold indices into the VFS open-file table.
#[derive(Debug)]
pub struct FdTable {
    slots: [Option<usize>; FD_MAX],
}

impl FdTable {
    /// Creates an empty table.
    pub const fn new() -> Self {
        Self {
            slots: [None; FD_MAX],
        }
    }

    /// Stores `open_idx` in the lowest free slot.
    pub fn alloc_slot(&mut self, open_idx: usize) -> Option<Fd> {
        let free = self.slots.iter().position(Option::is_none)?;
        self.slots[free] = Some(open_idx);
        Some(Fd::new(free as u32))
    }

    /// Stores `open_idx` in a specific free slot.
    pub fn set(&mut self, fd: Fd, open_idx: usize) -> Option<Fd> {
        let slot = self.slots.get_mut(fd.as_usize())?;
        if slot.is_some() {
            return None;
        }
        *slot = Some(open_idx);
        Some(fd)
    }

    /// The open-file index behind a descriptor.
    pub fn get(&self, fd: Fd) -> Option<usize> {
        *self.slots.get(fd.as_usize())?
    }

    /// Releases a descriptor slot, returning its open-file index.
    pub fn take(&mut self, fd: Fd) -> Option<usize> {
        self.slots.get_mut(fd.as_usize())?.take()
    }

    /// All open descriptors, lowest first.
    pub fn iter_open(&self) -> impl Iterator<Item = Fd> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| Fd::new(i as u32))
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

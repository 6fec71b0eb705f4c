//! User-space interrupt registry.
//!
//! Maps numeric interrupt ids to the process that wants to hear about
//! them. Only a privileged process may query the reverse mapping.

extern crate alloc;

use alloc::collections::BTreeMap;

use pion_core::id::Pid;

/// The interrupt-id to listener-pid mapping.
#[derive(Debug, Default)]
pub struct UsIntTable {
    listeners: BTreeMap<u32, Pid>,
}

impl UsIntTable {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            listeners: BTreeMap::new(),
        }
    }

    /// Registers `pid` for `int_id`. Fails when another process holds it.
    pub fn register(&mut self, int_id: u32, pid: Pid) -> bool {
        match self.listeners.get(&int_id) {
            Some(existing) if *existing != pid => false,
            _ => {
                self.listeners.insert(int_id, pid);
                true
            }
        }
    }

    /// Removes the registration, if owned by `pid`.
    pub fn unregister(&mut self, int_id: u32, pid: Pid) {
        if self.listeners.get(&int_id) == Some(&pid) {
            self.listeners.remove(&int_id);
        }
    }

    /// The listener for `int_id`.
    pub fn pid_for(&self, int_id: u32) -> Option<Pid> {
        self.listeners.get(&int_id).copied()
    }

    /// Drops every registration owned by an exiting process.
    pub fn drop_pid(&mut self, pid: Pid) {
        self.listeners.retain(|_, p| *p != pid);
    }
}

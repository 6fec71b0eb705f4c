//! Address-space records.
//!
//! A [`Space`] is the kernel-visible half of an address space: the
//! platform cookie for its page tables, the lock slot table, the IPC
//! channel (a space is the service endpoint for its program), the
//! environment dictionary, and the readiness flag. All threads of a
//! process share one `Space`; it is destroyed with the last live thread.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::String;

use pion_core::id::{Pid, SpaceId};
use pion_core::proto::Proto;

use crate::config::LOCK_MAX;

/// IPC channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcState {
    /// No call in flight.
    Idle,
    /// A request has been copied in and the server dispatched.
    Busy,
    /// The reply is ready for the recorded caller.
    Return,
}

/// The synchronous IPC endpoint of an address space.
///
/// At most one call is in flight per channel; further callers block on
/// the state token until the collector returns the channel to idle.
#[derive(Debug)]
pub struct IpcChannel {
    /// User-space entry invoked per call; 0 = no service registered.
    pub entry: u64,
    /// Three-state protocol position.
    pub state: IpcState,
    /// Caller identity while `Busy` or `Return`.
    pub from_pid: Pid,
    /// Request/reply payload, owned by the server's space.
    pub data: Proto,
    /// Opaque word handed to `entry` with every call.
    pub extra_data: u64,
    /// Whether a dedicated worker thread serves calls.
    pub prefork: bool,
    /// The thread captured for serving (setup caller or worker).
    pub serve_pid: Pid,
    /// Stack top the serving frame is rebuilt on for each dispatch.
    pub serve_sp: u64,
}

impl IpcChannel {
    /// An unregistered channel.
    pub const fn new() -> Self {
        Self {
            entry: 0,
            state: IpcState::Idle,
            from_pid: Pid::new(0),
            data: Proto::new(),
            extra_data: 0,
            prefork: false,
            serve_pid: Pid::new(0),
            serve_sp: 0,
        }
    }

    /// Whether a service entry is registered.
    pub fn registered(&self) -> bool {
        self.entry != 0
    }
}

impl Default for IpcChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Kernel-visible per-address-space state.
#[derive(Debug)]
pub struct Space {
    /// This space's id.
    pub id: SpaceId,
    /// Opaque page-table cookie minted by the platform.
    pub cookie: u64,
    /// Number of threads sharing the space.
    pub refs: u32,
    /// Lock words; `None` = free slot, `Some(0)` = unlocked, `Some(1)` = held.
    pub locks: [Option<u32>; LOCK_MAX],
    /// The space's IPC endpoint.
    pub ipc: IpcChannel,
    /// Environment dictionary.
    envs: BTreeMap<String, String>,
    /// Set once the program signals it is ready to serve.
    pub ready_ping: bool,
}

impl Space {
    /// Creates a space with one thread reference.
    pub fn new(id: SpaceId, cookie: u64) -> Self {
        Self {
            id,
            cookie,
            refs: 1,
            locks: [None; LOCK_MAX],
            ipc: IpcChannel::new(),
            envs: BTreeMap::new(),
            ready_ping: false,
        }
    }

    /// Allocates a lock slot, or `None` when all slots are live.
    pub fn lock_new(&mut self) -> Option<usize> {
        let slot = self.locks.iter().position(Option::is_none)?;
        self.locks[slot] = Some(0);
        Some(slot)
    }

    /// Releases a lock slot. Freeing an unallocated slot is a no-op.
    pub fn lock_free(&mut self, slot: usize) {
        if let Some(entry) = self.locks.get_mut(slot) {
            *entry = None;
        }
    }

    /// The lock word of a slot, if allocated.
    pub fn lock_word(&mut self, slot: usize) -> Option<&mut u32> {
        self.locks.get_mut(slot)?.as_mut()
    }

    /// Sets an environment variable, replacing any previous value.
    pub fn env_set(&mut self, name: &str, value: &str) {
        self.envs.insert(String::from(name), String::from(value));
    }

    /// Reads an environment variable.
    pub fn env_get(&self, name: &str) -> Option<&str> {
        self.envs.get(name).map(String::as_str)
    }

    /// The name of the `index`-th variable, in iteration order.
    pub fn env_name_at(&self, index: usize) -> Option<&str> {
        self.envs.keys().nth(index).map(String::as_str)
    }

    /// The value of the `index`-th variable, in iteration order.
    pub fn env_value_at(&self, index: usize) -> Option<&str> {
        self.envs.values().nth(index).map(String::as_str)
    }

    /// Snapshots the environment (used by fork).
    pub fn env_snapshot(&self) -> BTreeMap<String, String> {
        self.envs.clone()
    }

    /// Replaces the environment wholesale (used by fork).
    pub fn env_install(&mut self, envs: BTreeMap<String, String>) {
        self.envs = envs;
    }
}

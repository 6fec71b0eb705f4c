//! The boundary between the kernel core and everything it consumes.
//!
//! Physical/virtual memory, the shared-memory table, device drivers, the
//! timer, the interrupt controller and the ELF loader are external
//! collaborators. The core calls them exclusively through [`Platform`],
//! which keeps every subsystem host-testable: the integration suites
//! implement this trait with scripted fakes.

use bitflags::bitflags;

use crate::error::KernResult;
use pion_core::id::Pid;
use pion_syscall::FbInfo;

bitflags! {
    /// Pending interrupt sources reported by the interrupt controller.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqBits: u32 {
        /// System timer tick.
        const TIMER = 1 << 0;
        /// Keyboard input.
        const KEY = 1 << 1;
    }
}

/// One interrupt-controller poll: which lines fired, plus the key code
/// latched by the input controller when [`IrqBits::KEY`] is set.
#[derive(Debug, Clone, Copy)]
pub struct PendingIrqs {
    /// Lines that fired since the last poll.
    pub bits: IrqBits,
    /// Key code, valid only when `bits` contains [`IrqBits::KEY`].
    pub key_code: u32,
}

/// Result of loading an ELF image into an address space.
#[derive(Debug, Clone, Copy)]
pub struct ElfImage {
    /// Program entry point.
    pub entry: u64,
    /// Initial user stack top.
    pub sp: u64,
}

/// Everything the kernel core consumes from the outside world.
///
/// An address space is identified by an opaque `cookie` minted by
/// [`Platform::create_space`]; the core never interprets it.
pub trait Platform {
    // ── Address spaces and process memory ───────────────────────────

    /// Creates an empty address space, returning its cookie.
    fn create_space(&mut self) -> KernResult<u64>;

    /// Duplicates an address space, copying all private mappings.
    fn duplicate_space(&mut self, cookie: u64) -> KernResult<u64>;

    /// Tears down an address space and frees its private mappings.
    fn release_space(&mut self, cookie: u64);

    /// Allocates a fresh thread stack in the space; returns the stack top.
    fn alloc_thread_stack(&mut self, cookie: u64) -> KernResult<u64>;

    /// Allocates from the process heap; returns 0 on exhaustion.
    fn proc_malloc(&mut self, cookie: u64, size: usize) -> u64;

    /// Frees a process heap allocation.
    fn proc_free(&mut self, cookie: u64, addr: u64);

    /// Maps the MMIO window into the space; returns the virtual base.
    fn map_mmio(&mut self, cookie: u64) -> u64;

    /// Maps the framebuffer into the space.
    fn map_framebuffer(&mut self, cookie: u64) -> KernResult<FbInfo>;

    // ── Shared-memory table ─────────────────────────────────────────

    /// Allocates a shared-memory region; returns its id or -1.
    fn shm_alloc(&mut self, size: usize, flag: u32) -> i64;

    /// Maps a region into the process; returns the address or 0.
    fn shm_map(&mut self, pid: Pid, id: i64) -> u64;

    /// Unmaps a region from the process.
    fn shm_unmap(&mut self, pid: Pid, id: i64) -> i64;

    /// Adds a process reference to a region.
    fn shm_ref(&mut self, pid: Pid, id: i64) -> i64;

    /// Total bytes currently allocated in the shared-memory table.
    fn shm_alloced_size(&self) -> u64;

    // ── Machine statistics ──────────────────────────────────────────

    /// Free physical memory in bytes.
    fn free_mem_size(&self) -> u64;

    /// Total physical memory in bytes.
    fn total_mem_size(&self) -> u64;

    /// Machine name for `SYS_GET_SYSINFO`.
    fn machine_name(&self) -> &str;

    // ── Devices ─────────────────────────────────────────────────────

    /// Whether a device of this class exists.
    fn has_dev(&self, class: u32) -> bool;

    /// Reads from a character device; bytes read, 0 = retry, <0 = error.
    fn dev_ch_read(&mut self, class: u32, buf: &mut [u8]) -> i64;

    /// Writes to a character device; bytes written, 0 = retry, <0 = error.
    fn dev_ch_write(&mut self, class: u32, buf: &[u8]) -> i64;

    /// Starts a block read.
    fn dev_block_read(&mut self, class: u32, block: i64) -> i64;

    /// Starts a block write.
    fn dev_block_write(&mut self, class: u32, block: i64, data: &[u8]) -> i64;

    /// Collects a completed block read; 0 = done, <0 = not ready.
    fn dev_block_read_done(&mut self, class: u32, buf: &mut [u8]) -> i64;

    /// Collects a completed block write; 0 = done, <0 = not ready.
    fn dev_block_write_done(&mut self, class: u32) -> i64;

    // ── Timer and interrupt controller ──────────────────────────────

    /// Monotonic microseconds since boot.
    fn timer_usec(&self) -> u64;

    /// Acknowledges the pending timer interrupt.
    fn timer_clear_interrupt(&mut self);

    /// Polls and clears the pending interrupt lines.
    fn gic_get_irqs(&mut self) -> PendingIrqs;

    /// Selects which interrupt lines are delivered.
    fn gic_set_irqs(&mut self, bits: IrqBits);

    // ── Console ─────────────────────────────────────────────────────

    /// Writes bytes directly to the UART (bypassing the kernel log).
    fn uart_write(&mut self, bytes: &[u8]);

    // ── Program loading ─────────────────────────────────────────────

    /// Replaces the space's image with the given ELF binary.
    fn load_elf(&mut self, cookie: u64, image: &[u8]) -> KernResult<ElfImage>;
}

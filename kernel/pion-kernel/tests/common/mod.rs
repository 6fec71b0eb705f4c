//! Shared test fixture: a scripted platform and trap-driving helpers.
//!
//! The suites exercise the real trap handlers, `svc_handler` and
//! `irq_handler`, against this platform, playing the single CPU by
//! hand: one `Context` is the live trap frame, and scheduling decides
//! whose syscalls run next, exactly as on hardware.

// Not every suite uses every helper.
#![allow(dead_code)]

use std::collections::{BTreeMap, VecDeque};

use pion_core::id::Pid;
use pion_kernel::arch::Context;
use pion_kernel::config::PROC_MAX;
use pion_kernel::error::{KernError, KernResult};
use pion_kernel::kernel::Kernel;
use pion_kernel::platform::{ElfImage, IrqBits, PendingIrqs, Platform};
use pion_kernel::{sched, trap};
use pion_syscall::FbInfo;

/// Character device class used by the device tests.
pub const DEV_CHR: u32 = 0;
/// Block device class used by the device tests.
pub const DEV_BLK: u32 = 1;

struct ShmRegion {
    size: usize,
    refs: u32,
}

/// A scripted stand-in for memory management, devices and the timer.
pub struct TestPlatform {
    next_cookie: u64,
    next_stack: u64,
    next_heap: u64,
    /// Cookies handed to `release_space`.
    pub released: Vec<u64>,
    /// Monotonic clock, advanced by the test.
    pub now_usec: u64,
    /// Interrupt lines raised by the test; cleared when polled.
    pub pending: IrqBits,
    /// Key code latched alongside [`IrqBits::KEY`].
    pub key_code: u32,
    enabled: IrqBits,
    /// Bytes written through `uart_write`.
    pub uart: Vec<u8>,
    /// Bytes the character device will yield.
    pub chr_in: VecDeque<u8>,
    /// Bytes written to the character device.
    pub chr_out: Vec<u8>,
    blocks: BTreeMap<i64, [u8; 512]>,
    pending_read: Option<[u8; 512]>,
    pending_write: bool,
    shm: Vec<ShmRegion>,
    /// Entry point reported for every loaded ELF image.
    pub elf_entry: u64,
    /// Images passed to `load_elf`.
    pub loaded: Vec<Vec<u8>>,
}

impl TestPlatform {
    pub fn new() -> Self {
        Self {
            next_cookie: 1,
            next_stack: 0x8000_0000,
            next_heap: 0x4000_0000,
            released: Vec::new(),
            now_usec: 0,
            pending: IrqBits::empty(),
            key_code: 0,
            enabled: IrqBits::empty(),
            uart: Vec::new(),
            chr_in: VecDeque::new(),
            chr_out: Vec::new(),
            blocks: BTreeMap::new(),
            pending_read: None,
            pending_write: false,
            shm: Vec::new(),
            elf_entry: 0x40_0000,
            loaded: Vec::new(),
        }
    }
}

impl Platform for TestPlatform {
    fn create_space(&mut self) -> KernResult<u64> {
        let cookie = self.next_cookie;
        self.next_cookie += 1;
        Ok(cookie)
    }

    fn duplicate_space(&mut self, _cookie: u64) -> KernResult<u64> {
        self.create_space()
    }

    fn release_space(&mut self, cookie: u64) {
        self.released.push(cookie);
    }

    fn alloc_thread_stack(&mut self, _cookie: u64) -> KernResult<u64> {
        self.next_stack += 0x1_0000;
        Ok(self.next_stack)
    }

    fn proc_malloc(&mut self, _cookie: u64, size: usize) -> u64 {
        let addr = self.next_heap;
        self.next_heap += (size as u64 + 15) & !15;
        addr
    }

    fn proc_free(&mut self, _cookie: u64, _addr: u64) {}

    fn map_mmio(&mut self, _cookie: u64) -> u64 {
        0xF000_0000
    }

    fn map_framebuffer(&mut self, _cookie: u64) -> KernResult<FbInfo> {
        Ok(FbInfo {
            pointer: 0xE000_0000,
            size: 640 * 480 * 4,
            width: 640,
            height: 480,
            depth: 32,
            _pad: 0,
        })
    }

    fn shm_alloc(&mut self, size: usize, _flag: u32) -> i64 {
        self.shm.push(ShmRegion { size, refs: 1 });
        self.shm.len() as i64 - 1
    }

    fn shm_map(&mut self, _pid: Pid, id: i64) -> u64 {
        match self.shm.get(id as usize) {
            Some(_) => 0xA000_0000 + ((id as u64) << 20),
            None => 0,
        }
    }

    fn shm_unmap(&mut self, _pid: Pid, id: i64) -> i64 {
        match self.shm.get_mut(id as usize) {
            Some(region) => {
                region.refs = region.refs.saturating_sub(1);
                0
            }
            None => -1,
        }
    }

    fn shm_ref(&mut self, _pid: Pid, id: i64) -> i64 {
        match self.shm.get_mut(id as usize) {
            Some(region) => {
                region.refs += 1;
                0
            }
            None => -1,
        }
    }

    fn shm_alloced_size(&self) -> u64 {
        self.shm.iter().map(|r| r.size as u64).sum()
    }

    fn free_mem_size(&self) -> u64 {
        64 << 20
    }

    fn total_mem_size(&self) -> u64 {
        128 << 20
    }

    fn machine_name(&self) -> &str {
        "virt"
    }

    fn has_dev(&self, class: u32) -> bool {
        class == DEV_CHR || class == DEV_BLK
    }

    fn dev_ch_read(&mut self, _class: u32, buf: &mut [u8]) -> i64 {
        let mut n = 0;
        for slot in buf.iter_mut() {
            match self.chr_in.pop_front() {
                Some(b) => {
                    *slot = b;
                    n += 1;
                }
                None => break,
            }
        }
        n
    }

    fn dev_ch_write(&mut self, _class: u32, buf: &[u8]) -> i64 {
        self.chr_out.extend_from_slice(buf);
        buf.len() as i64
    }

    fn dev_block_read(&mut self, _class: u32, block: i64) -> i64 {
        self.pending_read = Some(self.blocks.get(&block).copied().unwrap_or([0; 512]));
        0
    }

    fn dev_block_write(&mut self, _class: u32, block: i64, data: &[u8]) -> i64 {
        let mut sector = [0u8; 512];
        let n = data.len().min(512);
        sector[..n].copy_from_slice(&data[..n]);
        self.blocks.insert(block, sector);
        self.pending_write = true;
        0
    }

    fn dev_block_read_done(&mut self, _class: u32, buf: &mut [u8]) -> i64 {
        match self.pending_read.take() {
            Some(sector) => {
                let n = buf.len().min(512);
                buf[..n].copy_from_slice(&sector[..n]);
                0
            }
            None => -1,
        }
    }

    fn dev_block_write_done(&mut self, _class: u32) -> i64 {
        if self.pending_write {
            self.pending_write = false;
            0
        } else {
            -1
        }
    }

    fn timer_usec(&self) -> u64 {
        self.now_usec
    }

    fn timer_clear_interrupt(&mut self) {}

    fn gic_get_irqs(&mut self) -> PendingIrqs {
        let fired = PendingIrqs {
            bits: self.pending & self.enabled,
            key_code: self.key_code,
        };
        self.pending = IrqBits::empty();
        fired
    }

    fn gic_set_irqs(&mut self, bits: IrqBits) {
        self.enabled = bits;
    }

    fn uart_write(&mut self, bytes: &[u8]) {
        self.uart.extend_from_slice(bytes);
    }

    fn load_elf(&mut self, _cookie: u64, image: &[u8]) -> KernResult<ElfImage> {
        if image.is_empty() {
            return Err(KernError::Invalid);
        }
        self.loaded.push(image.to_vec());
        self.next_stack += 0x1_0000;
        Ok(ElfImage {
            entry: self.elf_entry,
            sp: self.next_stack,
        })
    }
}

/// A kernel over a fresh [`TestPlatform`] with both IRQ lines enabled.
pub fn kernel() -> Kernel<TestPlatform> {
    let mut k = Kernel::new(TestPlatform::new());
    k.irq_init();
    k
}

/// Spawns a ready root-owned process and returns its pid.
pub fn spawn(k: &mut Kernel<TestPlatform>, cmd: &str) -> Pid {
    k.spawn(cmd, 0x1000, 0x7000_0000).expect("spawn")
}

/// Advances the clock and fires a timer interrupt.
pub fn tick(k: &mut Kernel<TestPlatform>, ctx: &mut Context, usec: u64) {
    k.platform.now_usec += usec;
    k.platform.pending |= IrqBits::TIMER;
    trap::irq_handler(k, ctx);
}

/// Fires a keyboard interrupt carrying `key_code`.
pub fn press_key(k: &mut Kernel<TestPlatform>, ctx: &mut Context, key_code: u32) {
    k.platform.pending |= IrqBits::KEY;
    k.platform.key_code = key_code;
    trap::irq_handler(k, ctx);
}

/// The syscall result as observed by `pid`.
///
/// For a running process that is the live trap frame; for a process
/// that blocked (and was scheduled away) it is the saved frame, which
/// carries the retry sentinel its user code will see on wakeup.
pub fn ret_of(k: &Kernel<TestPlatform>, ctx: &Context, pid: Pid) -> i64 {
    if k.procs.current_pid() == Some(pid) {
        ctx.ret()
    } else {
        k.procs.get(pid).expect("live pid").ctx.ret()
    }
}

/// A NUL-terminated byte string for C-string syscall arguments.
pub fn cstr(s: &str) -> Vec<u8> {
    let mut v = s.as_bytes().to_vec();
    v.push(0);
    v
}

/// Schedules until `pid` is the running process.
///
/// Panics when `pid` never becomes runnable; the test's interleaving
/// is wrong in that case, not the kernel.
pub fn run_as(k: &mut Kernel<TestPlatform>, ctx: &mut Context, pid: Pid) {
    for _ in 0..PROC_MAX * 2 {
        if k.procs.current_pid() == Some(pid) {
            return;
        }
        sched::schedule(&mut k.procs, ctx);
    }
    panic!("pid {pid} never scheduled (state: {:?})", k.procs.get(pid).map(|p| p.state));
}

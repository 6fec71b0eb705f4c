//! AArch64 specifics: the trap frame layout and interrupt masking.

pub mod context;

/// Masks IRQs on the current CPU.
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn irq_disable() {
    // SAFETY: Setting DAIF.I only masks interrupts; no memory effects.
    unsafe {
        core::arch::asm!("msr daifset, #2", options(nomem, nostack));
    }
}

/// Unmasks IRQs on the current CPU.
#[cfg(target_arch = "aarch64")]
#[inline]
pub fn irq_enable() {
    // SAFETY: Clearing DAIF.I only unmasks interrupts; no memory effects.
    unsafe {
        core::arch::asm!("msr daifclr, #2", options(nomem, nostack));
    }
}

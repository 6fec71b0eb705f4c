//! Leveled kernel logging.
//!
//! The kernel never prints directly. Diagnostics go through the
//! [`klog!`] family, which drops records above the global level filter
//! before formatting, then hands the survivors to whatever [`LogSink`]
//! the embedder registered (an early UART first, a full console once
//! drivers are up). Until registration every record is dropped, so
//! logging is safe from the first instruction and silent under host
//! tests unless a test installs a sink.
//!
//! The sink slot sits behind a [`TrapLock`]; a sink that logs while
//! writing re-enters the slot and that inner record is dropped rather
//! than wedging the CPU.

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

use crate::sync::TrapLock;

/// Log severity, lowest value = most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Unrecoverable kernel state.
    Fatal = 0,
    /// An operation failed.
    Error = 1,
    /// Suspicious but tolerated.
    Warn = 2,
    /// Lifecycle events.
    Info = 3,
    /// Verbose diagnostics.
    Debug = 4,
}

/// Receives records that pass the level filter.
pub trait LogSink: Sync {
    /// Writes one record.
    fn write(&self, level: LogLevel, msg: fmt::Arguments<'_>);
}

static MAX_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);
static SINK: TrapLock<Option<&'static dyn LogSink>> = TrapLock::new(None);

/// Registers the sink records are delivered to.
///
/// May be called again to swap sinks as richer output becomes
/// available during boot.
pub fn set_sink(sink: &'static dyn LogSink) {
    SINK.enter(|slot| *slot = Some(sink));
}

/// Sets the most verbose level that still passes the filter.
pub fn set_max_level(level: LogLevel) {
    MAX_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Whether records at `level` currently pass the filter.
#[inline]
pub fn enabled(level: LogLevel) -> bool {
    level as u8 <= MAX_LEVEL.load(Ordering::Relaxed)
}

/// Implementation detail for [`klog!`]. Not public API.
#[doc(hidden)]
pub fn _log(level: LogLevel, msg: fmt::Arguments<'_>) {
    let _ = SINK.try_enter(|slot| {
        if let Some(sink) = slot {
            sink.write(level, msg);
        }
    });
}

/// Logs a message at the given level, skipping the formatting work
/// entirely when the level filter would drop it.
#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {
        if $crate::log::enabled($level) {
            $crate::log::_log($level, format_args!($($arg)*));
        }
    };
}

/// Logs a fatal-level message (level 0).
#[macro_export]
macro_rules! kfatal {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Fatal, $($arg)*) };
}

/// Logs an error-level message (level 1).
#[macro_export]
macro_rules! kerr {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Error, $($arg)*) };
}

/// Logs a warning-level message (level 2).
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Warn, $($arg)*) };
}

/// Logs an info-level message (level 3).
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Info, $($arg)*) };
}

/// Logs a debug-level message (level 4).
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::klog!($crate::log::LogLevel::Debug, $($arg)*) };
}

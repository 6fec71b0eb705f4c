//! User-pointer marshalling.
//!
//! Syscall arguments that are pointers refer to the current process's
//! address space, which is mapped while the trap executes. These helpers
//! copy values across the boundary; a wild user pointer faults in user
//! mode long before it reaches a handler, so validation here is limited
//! to null and range arithmetic.

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

use pion_syscall::RET_ERR;

/// Largest string a syscall will copy in.
const STR_MAX: usize = 4096;

fn checked_ptr(addr: u64, len: usize) -> Result<usize, i64> {
    if addr == 0 {
        return Err(RET_ERR);
    }
    let addr = usize::try_from(addr).map_err(|_| RET_ERR)?;
    addr.checked_add(len).ok_or(RET_ERR)?;
    Ok(addr)
}

/// Reads a `#[repr(C)]` value from user memory.
///
/// # Safety
///
/// `addr` must point at a readable, live `T` in the current address
/// space for the duration of the call.
pub unsafe fn read_struct<T: Copy>(addr: u64) -> Result<T, i64> {
    let ptr = checked_ptr(addr, core::mem::size_of::<T>())? as *const T;
    // SAFETY: Caller contract; unaligned user pointers are tolerated.
    Ok(unsafe { core::ptr::read_unaligned(ptr) })
}

/// Writes a `#[repr(C)]` value into user memory.
///
/// # Safety
///
/// `addr` must point at writable memory for a `T` in the current
/// address space for the duration of the call.
pub unsafe fn write_struct<T: Copy>(addr: u64, value: &T) -> Result<(), i64> {
    let ptr = checked_ptr(addr, core::mem::size_of::<T>())? as *mut T;
    // SAFETY: Caller contract; unaligned user pointers are tolerated.
    unsafe { core::ptr::write_unaligned(ptr, *value) };
    Ok(())
}

/// Copies `len` bytes out of user memory.
///
/// # Safety
///
/// `addr..addr+len` must be readable in the current address space for
/// the duration of the call.
pub unsafe fn read_bytes(addr: u64, len: usize) -> Result<Vec<u8>, i64> {
    if len == 0 {
        return Ok(Vec::new());
    }
    let ptr = checked_ptr(addr, len)? as *const u8;
    // SAFETY: Caller contract.
    let slice = unsafe { core::slice::from_raw_parts(ptr, len) };
    Ok(slice.to_vec())
}

/// Copies bytes into user memory.
///
/// # Safety
///
/// `addr..addr+bytes.len()` must be writable in the current address
/// space for the duration of the call.
pub unsafe fn write_bytes(addr: u64, bytes: &[u8]) -> Result<(), i64> {
    if bytes.is_empty() {
        return Ok(());
    }
    let ptr = checked_ptr(addr, bytes.len())? as *mut u8;
    // SAFETY: Caller contract.
    unsafe { core::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len()) };
    Ok(())
}

/// Reads a NUL-terminated string from user memory (at most [`STR_MAX`]
/// bytes are scanned).
///
/// # Safety
///
/// `addr` must point at a readable NUL-terminated byte string in the
/// current address space.
pub unsafe fn read_cstr(addr: u64) -> Result<String, i64> {
    let ptr = checked_ptr(addr, STR_MAX)? as *const u8;
    let mut bytes = Vec::new();
    for i in 0..STR_MAX {
        // SAFETY: Caller contract; we stop at the terminator.
        let byte = unsafe { ptr.add(i).read() };
        if byte == 0 {
            break;
        }
        bytes.push(byte);
    }
    String::from_utf8(bytes).map_err(|_| RET_ERR)
}

/// Writes a string into user memory as a NUL-terminated C string,
/// truncating to `max` bytes including the terminator.
///
/// # Safety
///
/// `addr..addr+max` must be writable in the current address space.
pub unsafe fn write_cstr(addr: u64, s: &str, max: usize) -> Result<(), i64> {
    if max == 0 {
        return Err(RET_ERR);
    }
    let bytes = s.as_bytes();
    let len = bytes.len().min(max - 1);
    // SAFETY: Caller contract.
    unsafe {
        write_bytes(addr, &bytes[..len])?;
        write_bytes(addr + len as u64, &[0])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_roundtrip() {
        #[repr(C)]
        #[derive(Clone, Copy, PartialEq, Debug)]
        struct Pair {
            a: u32,
            b: u64,
        }
        let mut target = Pair { a: 0, b: 0 };
        let addr = core::ptr::from_mut(&mut target) as u64;
        // SAFETY: addr points at a live Pair on this stack frame.
        unsafe {
            write_struct(addr, &Pair { a: 7, b: 9 }).unwrap();
            assert_eq!(read_struct::<Pair>(addr).unwrap(), Pair { a: 7, b: 9 });
        }
    }

    #[test]
    fn null_rejected() {
        // SAFETY: A null address is rejected before any dereference.
        unsafe {
            assert!(read_struct::<u32>(0).is_err());
            assert!(write_bytes(0, b"x").is_err());
        }
    }

    #[test]
    fn cstr_roundtrip_truncates() {
        let mut buf = [0xffu8; 8];
        let addr = buf.as_mut_ptr() as u64;
        // SAFETY: addr covers an 8-byte live buffer.
        unsafe {
            write_cstr(addr, "abcdefghij", buf.len()).unwrap();
            assert_eq!(read_cstr(addr).unwrap(), "abcdefg");
        }
    }
}

// This module owns the executable-memory lifecycle for a compiled program: a single
// anonymous read-write-execute mapping sized exactly to the code buffer, created with
// libc mmap, filled with one copy of the finished machine code, and released with munmap
// when the owning value drops. The function-pointer cast over the mapped region is the
// only unsafe boundary in the crate; invoke() performs it behind a narrow contract
// (one pointer-sized argument, no return value) and refuses on hosts that cannot run
// A32 code.

//! Executable memory manager.

use std::io;
use std::ptr;

use crate::error::{JitError, JitResult};

/// Signature of a compiled program: takes the data-memory base pointer.
pub type EntryPoint = extern "C" fn(*mut u8);

/// One read-write-execute mapping holding a compiled program.
///
/// The mapping lives exactly as long as this value; dropping it unmaps the
/// region and the code must never be entered again.
#[derive(Debug)]
pub struct ExecutableRegion {
    ptr: *mut u8,
    len: usize,
}

impl ExecutableRegion {
    /// Map a region sized to `code` and copy the machine code into it.
    pub fn new(code: &[u8]) -> JitResult<ExecutableRegion> {
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                code.len(),
                libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(JitError::Map(io::Error::last_os_error()));
        }
        let ptr = ptr as *mut u8;
        unsafe {
            ptr::copy_nonoverlapping(code.as_ptr(), ptr, code.len());
        }
        log::debug!("Mapped {} code bytes at {ptr:p}", code.len());
        Ok(ExecutableRegion { ptr, len: code.len() })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base address of the mapped code; the program's entry point.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Run the compiled program against the given data-memory base.
    ///
    /// The region holds A32 machine code, so the call is only made when
    /// this process itself runs on 32-bit ARM; anywhere else the handle
    /// refuses rather than jumping into foreign instructions.
    pub fn invoke(&self, data: *mut u8) -> JitResult<()> {
        #[cfg(target_arch = "arm")]
        {
            let entry: EntryPoint = unsafe { std::mem::transmute::<*mut u8, EntryPoint>(self.ptr) };
            entry(data);
            Ok(())
        }
        #[cfg(not(target_arch = "arm"))]
        {
            let _ = data;
            Err(JitError::UnsupportedHost { target: "A32" })
        }
    }
}

impl Drop for ExecutableRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.len);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_holds_copy_of_code() {
        let code = [0x00, 0xf0, 0x20, 0xe3, 0x1e, 0xff, 0x2f, 0xe1];
        let region = ExecutableRegion::new(&code).unwrap();
        assert_eq!(region.len(), code.len());
        let copied = unsafe { std::slice::from_raw_parts(region.as_ptr(), code.len()) };
        assert_eq!(copied, &code);
    }

    #[cfg(not(target_arch = "arm"))]
    #[test]
    fn test_invoke_refuses_on_foreign_host() {
        let code = [0x1e, 0xff, 0x2f, 0xe1]; // BX lr
        let region = ExecutableRegion::new(&code).unwrap();
        let mut data = [0u8; 4];
        let err = region.invoke(data.as_mut_ptr()).unwrap_err();
        assert!(matches!(err, JitError::UnsupportedHost { .. }));
    }
}

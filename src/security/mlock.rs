//! Memory locking utilities
//!
//! Locks the pages holding decrypted vault plaintext so that serialized
//! mnemonics and private keys are not written to swap. Uses mlock/munlock.

use crate::errors::{KeyringError, Result};
use nix::libc;
use tracing::{debug, warn};

/// Check if we can lock memory (requires appropriate privileges or rlimits)
pub fn can_lock_memory() -> bool {
    #[cfg(target_os = "linux")]
    {
        use nix::sys::resource::{getrlimit, Resource};

        match getrlimit(Resource::RLIMIT_MEMLOCK) {
            Ok((soft, _hard)) => soft > 0,
            Err(_) => false,
        }
    }

    #[cfg(not(target_os = "linux"))]
    {
        true
    }
}

#[cfg(target_os = "linux")]
fn page_span(ptr: *const u8, len: usize) -> (usize, usize) {
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
    let addr = ptr as usize;
    let aligned_addr = addr & !(page_size - 1);
    let offset = addr - aligned_addr;
    let aligned_len = (len + offset + page_size - 1) & !(page_size - 1);
    (aligned_addr, aligned_len)
}

/// Lock a memory region to prevent it from being swapped
///
/// # Safety
/// The memory region must be valid for `len` bytes
pub unsafe fn lock_memory(ptr: *const u8, len: usize) -> Result<()> {
    if ptr.is_null() || len == 0 {
        return Ok(());
    }

    #[cfg(target_os = "linux")]
    {
        use nix::sys::mman::mlock;

        let (aligned_addr, aligned_len) = page_span(ptr, len);
        match mlock(aligned_addr as *const libc::c_void, aligned_len) {
            Ok(_) => {
                debug!("Locked {} bytes of vault memory", aligned_len);
                Ok(())
            }
            Err(e) => Err(KeyringError::MemoryLockFailed(e.to_string())),
        }
    }

    #[cfg(target_os = "macos")]
    {
        if libc::mlock(ptr as *const libc::c_void, len) == 0 {
            debug!("Locked {} bytes of vault memory", len);
            Ok(())
        } else {
            let err = std::io::Error::last_os_error();
            Err(KeyringError::MemoryLockFailed(err.to_string()))
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Ok(())
    }
}

/// Unlock a previously locked memory region
///
/// # Safety
/// The memory region must have been previously locked with lock_memory
pub unsafe fn unlock_memory(ptr: *const u8, len: usize) -> Result<()> {
    if ptr.is_null() || len == 0 {
        return Ok(());
    }

    #[cfg(target_os = "linux")]
    {
        use nix::sys::mman::munlock;

        let (aligned_addr, aligned_len) = page_span(ptr, len);
        munlock(aligned_addr as *const libc::c_void, aligned_len)
            .map_err(|e| KeyringError::MemoryLockFailed(e.to_string()))
    }

    #[cfg(target_os = "macos")]
    {
        if libc::munlock(ptr as *const libc::c_void, len) == 0 {
            Ok(())
        } else {
            let err = std::io::Error::last_os_error();
            Err(KeyringError::MemoryLockFailed(err.to_string()))
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        Ok(())
    }
}

/// Buffer for decrypted vault contents.
/// Unlocks and zeros on drop; locking is best effort.
pub struct LockedMemory {
    data: Vec<u8>,
    locked: bool,
}

impl LockedMemory {
    /// Take ownership of `data`, locking its pages when `lock` is set
    pub fn from_vec(data: Vec<u8>, lock: bool) -> Self {
        let locked = lock
            && unsafe {
                match lock_memory(data.as_ptr(), data.len()) {
                    Ok(_) => true,
                    Err(e) => {
                        warn!("Could not lock vault memory, continuing without: {}", e);
                        false
                    }
                }
            };

        Self { data, locked }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Drop for LockedMemory {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        let ptr = self.data.as_ptr();
        let len = self.data.capacity();
        self.data.zeroize();

        if self.locked {
            unsafe {
                let _ = unlock_memory(ptr, len);
            }
        }
    }
}

/// Set up memory protection for the process. Call early in main().
pub fn setup_memory_protection(disable_core_dumps: bool) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        use nix::sys::resource::{setrlimit, Resource};

        if disable_core_dumps {
            if let Err(e) = setrlimit(Resource::RLIMIT_CORE, 0, 0) {
                warn!("Could not disable core dumps: {}", e);
            } else {
                debug!("Core dumps disabled");
            }
        }
    }

    #[cfg(not(target_os = "linux"))]
    let _ = disable_core_dumps;

    if can_lock_memory() {
        debug!("Memory locking is available");
    } else {
        warn!("Memory locking may not be available - consider increasing RLIMIT_MEMLOCK");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_memory_keeps_contents() {
        let memory = LockedMemory::from_vec(b"{\"vault\":true}".to_vec(), true);
        assert_eq!(memory.as_slice(), b"{\"vault\":true}");
        assert_eq!(memory.len(), 14);
    }

    #[test]
    fn test_unlocked_when_disabled() {
        let memory = LockedMemory::from_vec(vec![1, 2, 3], false);
        assert!(!memory.is_locked());
        assert!(!memory.is_empty());
    }
}

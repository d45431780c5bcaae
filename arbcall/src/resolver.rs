use std::ffi::{CStr, c_void};
use std::ptr::NonNull;

/// Address of a process-resident native function.
///
/// A symbol is only ever called through, never read as data.
#[repr(transparent)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Symbol(NonNull<c_void>);

// SAFETY: code addresses are process-global and carry no thread affinity
unsafe impl Send for Symbol {}
// SAFETY: see above
unsafe impl Sync for Symbol {}

impl Symbol {
    /// Wraps a raw code address. Returns `None` for null.
    ///
    /// # Safety
    ///
    /// `ptr` must be the entry point of a function using the platform's C
    /// calling convention that stays loaded for as long as the symbol is
    /// used.
    pub unsafe fn from_raw(ptr: *const c_void) -> Option<Self> {
        NonNull::new(ptr as *mut c_void).map(Self)
    }

    #[inline]
    pub fn as_ptr(self) -> *const c_void {
        self.0.as_ptr()
    }

    #[inline]
    pub fn address(self) -> usize {
        self.0.as_ptr() as usize
    }
}

/// Looks `name` up in the global symbol scope of the process.
///
/// Nothing is loaded and nothing is cached; every call asks the dynamic
/// loader again. A miss is not an error at this layer.
#[cfg(unix)]
pub fn resolve(name: &CStr) -> Option<Symbol> {
    // SAFETY: RTLD_DEFAULT is a valid pseudo-handle and `name` is NUL
    // terminated
    let address = unsafe { libc::dlsym(libc::RTLD_DEFAULT, name.as_ptr()) };
    // SAFETY: dlsym returns either null or the address of a loaded symbol
    let symbol = unsafe { Symbol::from_raw(address) };
    match symbol {
        Some(symbol) => {
            log::debug!("resolved {name:?} at {:#x}", symbol.address());
        }
        None => log::debug!("symbol {name:?} not found"),
    }
    symbol
}

#[cfg(not(unix))]
pub fn resolve(name: &CStr) -> Option<Symbol> {
    log::warn!("no global symbol scope on this platform, {name:?} not found");
    None
}

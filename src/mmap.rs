use std::ffi::CString;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::NonNull;

use crate::error::{Error, Result};

/// Types that may be placed directly in a shared mapping.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]`, contain no pointers, accept the
/// all-zero bit pattern as a valid value, and be safe to access from two
/// address spaces at once (i.e. built from atomics).
pub unsafe trait ShmSafe: Sync {}

/// A typed, page-aligned shared mapping holding exactly one `T`.
///
/// The mapping is `MAP_SHARED`, so a named region is visible to every
/// process that opens the same name, and an anonymous one to every thread
/// (and forked child) of the creator. Freshly created regions are zero
/// filled. The region is unmapped when the `SharedRegion` is dropped.
pub struct SharedRegion<T: ShmSafe> {
    ptr: NonNull<T>,
    len: usize,
    _marker: PhantomData<T>,
}

unsafe impl<T: ShmSafe> Send for SharedRegion<T> {}
unsafe impl<T: ShmSafe> Sync for SharedRegion<T> {}

impl<T: ShmSafe> SharedRegion<T> {
    /// Maps a fresh anonymous shared region.
    pub fn anonymous() -> Result<Self> {
        let len = mapping_len::<T>();
        let ptr = map_anonymous(len)?;
        Self::from_raw(ptr, len)
    }

    /// Creates (or reuses) a POSIX shared-memory object and maps it.
    ///
    /// The name must start with `'/'` and contain no other `'/'`. On Linux
    /// the object shows up under `/dev/shm`. A reused object keeps its old
    /// contents; the owner is expected to initialize it.
    pub fn create(shm_name: &str) -> Result<Self> {
        let len = mapping_len::<T>();
        let ptr = map_shared_memory(shm_name, len, true)?;
        Self::from_raw(ptr, len)
    }

    /// Maps an existing POSIX shared-memory object.
    pub fn open(shm_name: &str) -> Result<Self> {
        let len = mapping_len::<T>();
        let ptr = map_shared_memory(shm_name, len, false)?;
        Self::from_raw(ptr, len)
    }

    /// Size of the mapping in bytes (a whole number of pages).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    fn from_raw(ptr: NonNull<u8>, len: usize) -> Result<Self> {
        if ptr.as_ptr() as usize % std::mem::align_of::<T>() != 0 {
            unsafe { unmap_shared_memory(ptr, len)? };
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "mapping is not aligned for the shared layout",
            )
            .into());
        }
        Ok(Self {
            ptr: ptr.cast(),
            len,
            _marker: PhantomData,
        })
    }
}

impl<T: ShmSafe> Deref for SharedRegion<T> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: ShmSafe> Debug for SharedRegion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .finish()
    }
}

impl<T: ShmSafe> Drop for SharedRegion<T> {
    /// # Panics
    ///
    /// Panics if `munmap` fails. A half-torn-down mapping shared with
    /// another domain is not something to continue from.
    fn drop(&mut self) {
        unsafe {
            unmap_shared_memory(self.ptr.cast(), self.len).expect("SharedRegion::drop failed");
        }
    }
}

/// Removes a POSIX shared-memory name. Existing mappings stay valid.
pub fn unlink(shm_name: &str) -> Result<()> {
    let name = shm_cstring(shm_name)?;
    if unsafe { libc::shm_unlink(name.as_ptr()) } == -1 {
        return Err(std::io::Error::last_os_error().into());
    }
    Ok(())
}

fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        4096
    } else {
        size as usize
    }
}

fn mapping_len<T>() -> usize {
    let page = page_size();
    std::mem::size_of::<T>().max(1).div_ceil(page) * page
}

fn shm_cstring(shm_name: &str) -> Result<CString> {
    let valid = shm_name.len() > 1
        && shm_name.starts_with('/')
        && !shm_name[1..].contains('/');
    if !valid {
        return Err(Error::InvalidShmName(shm_name.to_owned()));
    }
    CString::new(shm_name).map_err(|_| Error::InvalidShmName(shm_name.to_owned()))
}

fn map_shared_memory(shm_name: &str, size: usize, create: bool) -> Result<NonNull<u8>> {
    let name = shm_cstring(shm_name)?;
    let addr = unsafe {
        let flags = if create {
            libc::O_CREAT | libc::O_RDWR
        } else {
            libc::O_RDWR
        };
        let fd = libc::shm_open(name.as_ptr(), flags, 0o600);
        if fd == -1 {
            return Err(std::io::Error::last_os_error().into());
        }

        if create && libc::ftruncate(fd, size as libc::off_t) == -1 {
            let err = std::io::Error::last_os_error();
            libc::close(fd);
            return Err(err.into());
        }

        let addr = libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            fd,
            0,
        );

        if addr == libc::MAP_FAILED {
            let err = std::io::Error::last_os_error();
            libc::close(fd);
            return Err(err.into());
        } else {
            libc::close(fd); // mapping stays valid
        }

        addr
    };

    NonNull::new(addr as *mut u8)
        .ok_or_else(|| std::io::Error::other("mmap returned a null mapping").into())
}

fn map_anonymous(size: usize) -> Result<NonNull<u8>> {
    let addr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if addr == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error().into());
    }
    NonNull::new(addr as *mut u8)
        .ok_or_else(|| std::io::Error::other("mmap returned a null mapping").into())
}

unsafe fn unmap_shared_memory(ptr: NonNull<u8>, size: usize) -> std::io::Result<()> {
    if libc::munmap(ptr.as_ptr().cast(), size) == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! POSIX shared-memory regions.
//!
//! A [`ShmRegion`] is a `MAP_SHARED` mapping of a named `shm_open` object.
//! Any process that knows the name can attach; parent/child relationship is
//! irrelevant. The mapping is released on [`ShmRegion::detach`] or on drop, and
//! the name outlives every mapping until [`ShmRegion::destroy`] unlinks it.

use super::error::ResourceError;
use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::ptr::NonNull;
use tracing::{trace, warn};

/// Validated name of a POSIX shared object (`/something`, no further slashes).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShmName {
    name: String,
    c_name: CString,
}

impl ShmName {
    pub fn new(name: impl Into<String>) -> Result<Self, ResourceError> {
        let name = name.into();
        let body = name.strip_prefix('/').unwrap_or_default();
        if body.is_empty() || body.contains('/') || name.len() > 255 {
            return Err(ResourceError::InvalidName(name));
        }
        let c_name =
            CString::new(name.as_bytes()).map_err(|_| ResourceError::InvalidName(name.clone()))?;
        Ok(Self { name, c_name })
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub(crate) fn as_c_str(&self) -> &std::ffi::CStr {
        &self.c_name
    }
}

impl std::fmt::Display for ShmName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// A mapped shared-memory object.
#[derive(Debug)]
pub struct ShmRegion {
    name: ShmName,
    ptr: NonNull<u8>,
    len: usize,
}

// The mapping is plain memory shared with other processes; all typed access
// goes through atomics or process-shared pthread objects.
unsafe impl Send for ShmRegion {}
unsafe impl Sync for ShmRegion {}

impl ShmRegion {
    /// Create a new, zero-filled object of `len` bytes and map it.
    ///
    /// Fails with [`ResourceError::InUse`] if the name already exists.
    pub fn create(name: &ShmName, len: usize) -> Result<Self, ResourceError> {
        let create_err = |source| ResourceError::from_create(name.as_str(), source);

        let fd = unsafe {
            libc::shm_open(
                name.as_c_str().as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o600 as libc::mode_t,
            )
        };
        if fd < 0 {
            return Err(create_err(io::Error::last_os_error()));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        if unsafe { libc::ftruncate(fd.as_raw_fd(), len as libc::off_t) } != 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::shm_unlink(name.as_c_str().as_ptr()) };
            return Err(create_err(err));
        }

        match Self::map(name, &fd, len) {
            Ok(region) => {
                trace!("Created shared region {} ({} bytes)", name, len);
                Ok(region)
            }
            Err(err) => {
                unsafe { libc::shm_unlink(name.as_c_str().as_ptr()) };
                Err(create_err(err))
            }
        }
    }

    /// Map an existing object, checking it holds at least `min_len` bytes.
    pub fn attach(name: &ShmName, min_len: usize) -> Result<Self, ResourceError> {
        let attach_err = |source: io::Error| {
            if source.raw_os_error() == Some(libc::ENOENT) {
                ResourceError::NotFound(name.to_string())
            } else {
                ResourceError::Attach {
                    name: name.to_string(),
                    source,
                }
            }
        };

        let fd = unsafe { libc::shm_open(name.as_c_str().as_ptr(), libc::O_RDWR, 0) };
        if fd < 0 {
            return Err(attach_err(io::Error::last_os_error()));
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        let mut stat: libc::stat = unsafe { std::mem::zeroed() };
        if unsafe { libc::fstat(fd.as_raw_fd(), &mut stat) } != 0 {
            return Err(attach_err(io::Error::last_os_error()));
        }
        let actual = stat.st_size as usize;
        if actual < min_len || actual == 0 {
            return Err(ResourceError::SizeMismatch {
                name: name.to_string(),
                expected: min_len,
                actual,
            });
        }

        Self::map(name, &fd, actual).map_err(attach_err)
    }

    fn map(name: &ShmName, fd: &OwnedFd, len: usize) -> io::Result<Self> {
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let ptr = NonNull::new(addr.cast::<u8>())
            .ok_or_else(|| io::Error::other("mmap returned null"))?;

        Ok(Self {
            name: name.clone(),
            ptr,
            len,
        })
    }

    pub fn name(&self) -> &ShmName {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base address of the mapping. Page aligned.
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Unmap, reporting failure. Dropping unmaps too but swallows errors.
    pub fn detach(self) -> Result<(), ResourceError> {
        let this = std::mem::ManuallyDrop::new(self);
        let rc = unsafe { libc::munmap(this.ptr.as_ptr().cast(), this.len) };
        let unmap_err = (rc != 0).then(io::Error::last_os_error);
        // Drop is skipped; move the name out so it is still freed.
        let name = unsafe { std::ptr::read(&this.name) };
        if let Some(source) = unmap_err {
            return Err(ResourceError::Detach {
                name: name.to_string(),
                source,
            });
        }
        trace!("Detached shared region {}", name);
        Ok(())
    }

    /// Unlink `name`. Existing mappings stay valid until detached.
    pub fn destroy(name: &ShmName) -> Result<(), ResourceError> {
        if unsafe { libc::shm_unlink(name.as_c_str().as_ptr()) } != 0 {
            return Err(ResourceError::from_unlink(
                name.as_str(),
                io::Error::last_os_error(),
            ));
        }
        trace!("Unlinked shared region {}", name);
        Ok(())
    }
}

impl Drop for ShmRegion {
    fn drop(&mut self) {
        if unsafe { libc::munmap(self.ptr.as_ptr().cast(), self.len) } != 0 {
            warn!(
                "Failed to unmap shared region {}: {}",
                self.name,
                io::Error::last_os_error()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn unique_name(tag: &str) -> ShmName {
        let id = uuid::Uuid::new_v4().simple().to_string();
        ShmName::new(format!("/wst-{}-{}", tag, &id[..12])).unwrap()
    }

    #[test]
    fn test_name_validation() {
        assert!(ShmName::new("/ok.name").is_ok());
        assert!(ShmName::new("missing-slash").is_err());
        assert!(ShmName::new("/").is_err());
        assert!(ShmName::new("/nested/name").is_err());
        assert!(ShmName::new("/nul\0byte").is_err());
    }

    #[test]
    fn test_create_attach_share_memory() {
        let name = unique_name("share");
        let owner = ShmRegion::create(&name, 64).unwrap();
        let peer = ShmRegion::attach(&name, 8).unwrap();
        assert_eq!(peer.len(), 64);

        let write = unsafe { &*(owner.as_ptr() as *const AtomicU64) };
        let read = unsafe { &*(peer.as_ptr() as *const AtomicU64) };
        assert_eq!(read.load(Ordering::SeqCst), 0);
        write.store(0xDEAD_BEEF, Ordering::SeqCst);
        assert_eq!(read.load(Ordering::SeqCst), 0xDEAD_BEEF);

        peer.detach().unwrap();
        owner.detach().unwrap();
        ShmRegion::destroy(&name).unwrap();
    }

    #[test]
    fn test_create_refuses_existing_name() {
        let name = unique_name("dup");
        let _first = ShmRegion::create(&name, 16).unwrap();
        assert!(matches!(
            ShmRegion::create(&name, 16),
            Err(ResourceError::InUse(_))
        ));
        ShmRegion::destroy(&name).unwrap();
    }

    #[test]
    fn test_attach_checks_size() {
        let name = unique_name("size");
        let _owner = ShmRegion::create(&name, 16).unwrap();
        assert!(matches!(
            ShmRegion::attach(&name, 4096),
            Err(ResourceError::SizeMismatch { actual: 16, .. })
        ));
        ShmRegion::destroy(&name).unwrap();
    }

    #[test]
    fn test_attach_missing_region() {
        let name = unique_name("missing");
        assert!(matches!(
            ShmRegion::attach(&name, 8),
            Err(ResourceError::NotFound(_))
        ));
    }

    #[test]
    fn test_destroy_twice_is_an_error() {
        let name = unique_name("twice");
        let region = ShmRegion::create(&name, 8).unwrap();
        region.detach().unwrap();

        ShmRegion::destroy(&name).unwrap();
        assert!(matches!(
            ShmRegion::destroy(&name),
            Err(ResourceError::NotFound(_))
        ));
    }
}

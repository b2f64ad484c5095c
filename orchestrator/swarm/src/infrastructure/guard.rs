// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Reduction guard: a named POSIX semaphore used as a process-shared binary
//! lock around the global accumulator update.

use super::error::ResourceError;
use super::shm::ShmName;
use std::io;
use std::ptr::NonNull;
use tracing::{trace, warn};

#[derive(Debug)]
pub struct ReductionGuard {
    name: ShmName,
    sem: NonNull<libc::sem_t>,
}

// A named semaphore handle is usable from any thread.
unsafe impl Send for ReductionGuard {}
unsafe impl Sync for ReductionGuard {}

/// Proof that the caller holds the reduction guard. Releases it on drop.
#[derive(Debug)]
pub struct ReductionPermit<'a> {
    guard: &'a ReductionGuard,
}

impl Drop for ReductionPermit<'_> {
    fn drop(&mut self) {
        if unsafe { libc::sem_post(self.guard.sem.as_ptr()) } != 0 {
            warn!(
                "Failed to release reduction guard {}: {}",
                self.guard.name,
                io::Error::last_os_error()
            );
        }
    }
}

impl ReductionGuard {
    /// Create the semaphore in the available state. Fails if it already exists.
    pub fn create(name: &ShmName) -> Result<Self, ResourceError> {
        let sem = unsafe {
            libc::sem_open(
                name.as_c_str().as_ptr(),
                libc::O_CREAT | libc::O_EXCL,
                0o600 as libc::c_uint,
                1 as libc::c_uint,
            )
        };
        let sem = Self::check(sem)
            .map_err(|source| ResourceError::from_create(name.as_str(), source))?;
        trace!("Created reduction guard {}", name);
        Ok(Self {
            name: name.clone(),
            sem,
        })
    }

    /// Open a guard created by another process.
    pub fn open(name: &ShmName) -> Result<Self, ResourceError> {
        let sem = unsafe { libc::sem_open(name.as_c_str().as_ptr(), 0) };
        let sem = Self::check(sem).map_err(|source| {
            if source.raw_os_error() == Some(libc::ENOENT) {
                ResourceError::NotFound(name.to_string())
            } else {
                ResourceError::Attach {
                    name: name.to_string(),
                    source,
                }
            }
        })?;
        Ok(Self {
            name: name.clone(),
            sem,
        })
    }

    fn check(sem: *mut libc::sem_t) -> io::Result<NonNull<libc::sem_t>> {
        if sem == libc::SEM_FAILED {
            return Err(io::Error::last_os_error());
        }
        NonNull::new(sem).ok_or_else(|| io::Error::other("sem_open returned null"))
    }

    pub fn name(&self) -> &ShmName {
        &self.name
    }

    /// Block until the guard is free and take it.
    pub fn acquire(&self) -> Result<ReductionPermit<'_>, ResourceError> {
        loop {
            if unsafe { libc::sem_wait(self.sem.as_ptr()) } == 0 {
                return Ok(ReductionPermit { guard: self });
            }
            let err = io::Error::last_os_error();
            // Interrupted by a signal before acquiring; wait again.
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(ResourceError::Sync {
                    op: "sem_wait",
                    name: self.name.to_string(),
                    source: err,
                });
            }
        }
    }

    /// Take the guard only if it is free right now.
    pub fn try_acquire(&self) -> Result<Option<ReductionPermit<'_>>, ResourceError> {
        if unsafe { libc::sem_trywait(self.sem.as_ptr()) } == 0 {
            return Ok(Some(ReductionPermit { guard: self }));
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EAGAIN) {
            return Ok(None);
        }
        Err(ResourceError::Sync {
            op: "sem_trywait",
            name: self.name.to_string(),
            source: err,
        })
    }

    /// Close this handle, reporting failure.
    pub fn close(self) -> Result<(), ResourceError> {
        let this = std::mem::ManuallyDrop::new(self);
        let rc = unsafe { libc::sem_close(this.sem.as_ptr()) };
        let close_err = (rc != 0).then(io::Error::last_os_error);
        let name = unsafe { std::ptr::read(&this.name) };
        match close_err {
            Some(source) => Err(ResourceError::Detach {
                name: name.to_string(),
                source,
            }),
            None => Ok(()),
        }
    }

    /// Unlink the semaphore name. Open handles stay usable until closed.
    pub fn destroy(name: &ShmName) -> Result<(), ResourceError> {
        if unsafe { libc::sem_unlink(name.as_c_str().as_ptr()) } != 0 {
            return Err(ResourceError::from_unlink(
                name.as_str(),
                io::Error::last_os_error(),
            ));
        }
        trace!("Unlinked reduction guard {}", name);
        Ok(())
    }
}

impl Drop for ReductionGuard {
    fn drop(&mut self) {
        unsafe { libc::sem_close(self.sem.as_ptr()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;
    use std::thread;

    fn unique_name() -> ShmName {
        let id = uuid::Uuid::new_v4().simple().to_string();
        ShmName::new(format!("/wst-guard-{}", &id[..12])).unwrap()
    }

    #[test]
    fn test_guard_is_exclusive() {
        let name = unique_name();
        let guard = ReductionGuard::create(&name).unwrap();

        let permit = guard.acquire().unwrap();
        let other = ReductionGuard::open(&name).unwrap();
        assert!(other.try_acquire().unwrap().is_none());

        drop(permit);
        assert!(other.try_acquire().unwrap().is_some());

        other.close().unwrap();
        guard.close().unwrap();
        ReductionGuard::destroy(&name).unwrap();
    }

    #[test]
    fn test_guarded_read_modify_write_loses_no_updates() {
        let name = unique_name();
        let guard = ReductionGuard::create(&name).unwrap();
        let total = Arc::new(AtomicI64::new(0));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let name = name.clone();
                let total = Arc::clone(&total);
                thread::spawn(move || {
                    let guard = ReductionGuard::open(&name).unwrap();
                    for _ in 0..500 {
                        let _permit = guard.acquire().unwrap();
                        let seen = total.load(Ordering::Relaxed);
                        thread::yield_now();
                        total.store(seen + 1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(total.load(Ordering::SeqCst), 4_000);
        drop(guard);
        ReductionGuard::destroy(&name).unwrap();
    }

    #[test]
    fn test_destroy_twice_is_an_error() {
        let name = unique_name();
        ReductionGuard::create(&name).unwrap().close().unwrap();
        ReductionGuard::destroy(&name).unwrap();
        assert!(matches!(
            ReductionGuard::destroy(&name),
            Err(ResourceError::NotFound(_))
        ));
        assert!(matches!(
            ReductionGuard::open(&name),
            Err(ResourceError::NotFound(_))
        ));
    }

    #[test]
    fn test_create_refuses_a_guard_in_use() {
        let name = unique_name();
        let guard = ReductionGuard::create(&name).unwrap();
        assert!(matches!(
            ReductionGuard::create(&name),
            Err(ResourceError::InUse(_))
        ));
        guard.close().unwrap();
        ReductionGuard::destroy(&name).unwrap();
    }
}

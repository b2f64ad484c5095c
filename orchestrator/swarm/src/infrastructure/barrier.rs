// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Process-shared counting barrier.
//!
//! The barrier is a named shared-memory object holding a process-shared
//! pthread mutex, a process-shared condition variable and an arrival counter.
//! Agents [`arrive`](ProcessBarrier::arrive) after publishing their record and
//! then block in [`wait_until_all_arrived`](ProcessBarrier::wait_until_all_arrived)
//! until the counter reaches the swarm size.
//!
//! There is no timeout. If fewer agents than expected ever arrive, every
//! waiter blocks forever.

use super::error::{ResourceError, TeardownError};
use super::shm::{ShmName, ShmRegion};
use std::mem::size_of;
use std::ptr::addr_of_mut;
use tracing::trace;

#[repr(C)]
struct BarrierCell {
    mutex: libc::pthread_mutex_t,
    cond: libc::pthread_cond_t,
    arrived: u32,
}

#[derive(Debug)]
pub struct ProcessBarrier {
    region: ShmRegion,
}

/// Holds the barrier mutex; unlocks on drop.
struct CellLock<'a> {
    barrier: &'a ProcessBarrier,
}

impl Drop for CellLock<'_> {
    fn drop(&mut self) {
        unsafe { libc::pthread_mutex_unlock(self.barrier.mutex()) };
    }
}

impl ProcessBarrier {
    /// Create the barrier object with an arrival count of zero.
    pub fn create(name: &ShmName) -> Result<Self, ResourceError> {
        let region = ShmRegion::create(name, size_of::<BarrierCell>())?;
        let barrier = Self { region };

        if let Err(err) = unsafe { barrier.init() } {
            drop(barrier);
            let _ = ShmRegion::destroy(name);
            return Err(err);
        }
        trace!("Created barrier {}", name);
        Ok(barrier)
    }

    /// Attach to a barrier created by another process.
    pub fn open(name: &ShmName) -> Result<Self, ResourceError> {
        let region = ShmRegion::attach(name, size_of::<BarrierCell>())?;
        Ok(Self { region })
    }

    unsafe fn init(&self) -> Result<(), ResourceError> {
        let name = self.region.name().as_str();

        let mut mutex_attr: libc::pthread_mutexattr_t = std::mem::zeroed();
        let mut rc = libc::pthread_mutexattr_init(&mut mutex_attr);
        if rc != 0 {
            return Err(ResourceError::sync("pthread_mutexattr_init", name, rc));
        }
        rc = libc::pthread_mutexattr_setpshared(&mut mutex_attr, libc::PTHREAD_PROCESS_SHARED);
        if rc == 0 {
            rc = libc::pthread_mutex_init(self.mutex(), &mutex_attr);
        }
        libc::pthread_mutexattr_destroy(&mut mutex_attr);
        if rc != 0 {
            return Err(ResourceError::sync("pthread_mutex_init", name, rc));
        }

        let mut cond_attr: libc::pthread_condattr_t = std::mem::zeroed();
        rc = libc::pthread_condattr_init(&mut cond_attr);
        if rc != 0 {
            libc::pthread_mutex_destroy(self.mutex());
            return Err(ResourceError::sync("pthread_condattr_init", name, rc));
        }
        rc = libc::pthread_condattr_setpshared(&mut cond_attr, libc::PTHREAD_PROCESS_SHARED);
        if rc == 0 {
            rc = libc::pthread_cond_init(self.cond(), &cond_attr);
        }
        libc::pthread_condattr_destroy(&mut cond_attr);
        if rc != 0 {
            libc::pthread_mutex_destroy(self.mutex());
            return Err(ResourceError::sync("pthread_cond_init", name, rc));
        }

        self.counter().write(0);
        Ok(())
    }

    fn cell(&self) -> *mut BarrierCell {
        self.region.as_ptr().cast()
    }

    fn mutex(&self) -> *mut libc::pthread_mutex_t {
        unsafe { addr_of_mut!((*self.cell()).mutex) }
    }

    fn cond(&self) -> *mut libc::pthread_cond_t {
        unsafe { addr_of_mut!((*self.cell()).cond) }
    }

    fn counter(&self) -> *mut u32 {
        unsafe { addr_of_mut!((*self.cell()).arrived) }
    }

    fn lock(&self) -> Result<CellLock<'_>, ResourceError> {
        let rc = unsafe { libc::pthread_mutex_lock(self.mutex()) };
        if rc != 0 {
            return Err(ResourceError::sync(
                "pthread_mutex_lock",
                self.region.name().as_str(),
                rc,
            ));
        }
        Ok(CellLock { barrier: self })
    }

    pub fn name(&self) -> &ShmName {
        self.region.name()
    }

    /// Record one arrival and wake every waiter. Returns the new count.
    pub fn arrive(&self) -> Result<u32, ResourceError> {
        let _lock = self.lock()?;
        let arrived = unsafe {
            let next = self.counter().read() + 1;
            self.counter().write(next);
            next
        };
        let rc = unsafe { libc::pthread_cond_broadcast(self.cond()) };
        if rc != 0 {
            return Err(ResourceError::sync(
                "pthread_cond_broadcast",
                self.region.name().as_str(),
                rc,
            ));
        }
        trace!("Barrier {} arrival {}", self.region.name(), arrived);
        Ok(arrived)
    }

    /// Block until at least `expected` arrivals have been recorded.
    pub fn wait_until_all_arrived(&self, expected: u32) -> Result<(), ResourceError> {
        let _lock = self.lock()?;
        while unsafe { self.counter().read() } < expected {
            let rc = unsafe { libc::pthread_cond_wait(self.cond(), self.mutex()) };
            if rc != 0 {
                return Err(ResourceError::sync(
                    "pthread_cond_wait",
                    self.region.name().as_str(),
                    rc,
                ));
            }
        }
        Ok(())
    }

    /// Current arrival count.
    pub fn arrived(&self) -> Result<u32, ResourceError> {
        let _lock = self.lock()?;
        Ok(unsafe { self.counter().read() })
    }

    pub fn detach(self) -> Result<(), ResourceError> {
        self.region.detach()
    }

    /// Detach and unlink the name. The unlink is attempted even when the
    /// detach fails, and both failures are returned.
    ///
    /// Only the creator calls this, after every agent has terminated. The
    /// process-shared pthread objects own no kernel resources and vanish with
    /// the last mapping. `pthread_cond_destroy` is not called: it blocks on
    /// waiters that a killed agent never unregistered.
    pub fn destroy(self) -> Result<(), TeardownError> {
        let name = self.region.name().clone();
        let detached = self.region.detach();
        TeardownError::from_results([detached, Self::unlink(&name)])
    }

    /// Unlink a barrier by name without touching its contents.
    pub fn unlink(name: &ShmName) -> Result<(), ResourceError> {
        ShmRegion::destroy(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn unique_name() -> ShmName {
        let id = uuid::Uuid::new_v4().simple().to_string();
        ShmName::new(format!("/wst-barrier-{}", &id[..12])).unwrap()
    }

    #[test]
    fn test_opens_only_after_last_arrival() {
        let name = unique_name();
        let barrier = ProcessBarrier::create(&name).unwrap();
        let (tx, rx) = mpsc::channel();

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let name = name.clone();
                let tx = tx.clone();
                thread::spawn(move || {
                    let barrier = ProcessBarrier::open(&name).unwrap();
                    barrier.wait_until_all_arrived(3).unwrap();
                    tx.send(barrier.arrived().unwrap()).unwrap();
                    barrier.detach().unwrap();
                })
            })
            .collect();

        assert_eq!(barrier.arrive().unwrap(), 1);
        assert_eq!(barrier.arrive().unwrap(), 2);
        thread::sleep(Duration::from_millis(100));
        assert!(rx.try_recv().is_err(), "barrier opened before the last arrival");

        assert_eq!(barrier.arrive().unwrap(), 3);
        for _ in 0..3 {
            let seen = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert!(seen >= 3);
        }
        for waiter in waiters {
            waiter.join().unwrap();
        }

        barrier.destroy().unwrap();
    }

    #[test]
    fn test_late_waiter_passes_immediately() {
        let name = unique_name();
        let barrier = ProcessBarrier::create(&name).unwrap();
        barrier.arrive().unwrap();
        barrier.arrive().unwrap();

        barrier.wait_until_all_arrived(2).unwrap();
        assert_eq!(barrier.arrived().unwrap(), 2);
        barrier.destroy().unwrap();
    }

    #[test]
    fn test_destroy_twice_is_an_error() {
        let name = unique_name();
        ProcessBarrier::create(&name).unwrap().destroy().unwrap();
        assert!(matches!(
            ProcessBarrier::unlink(&name),
            Err(ResourceError::NotFound(_))
        ));
        assert!(matches!(
            ProcessBarrier::open(&name),
            Err(ResourceError::NotFound(_))
        ));
    }

    #[test]
    fn test_destroy_still_reports_a_missing_name() {
        let name = unique_name();
        let barrier = ProcessBarrier::create(&name).unwrap();
        ProcessBarrier::unlink(&name).unwrap();

        let err = barrier.destroy().unwrap_err();
        assert_eq!(err.failures.len(), 1);
        assert!(matches!(err.failures[0], ResourceError::NotFound(_)));
    }
}

//! Wait-if-equals and wake on a 32-bit cell.
//!
//! The blocking contract of the FIFO is layered on one abstract primitive:
//! park while a cell still holds an expected value, wake when a peer
//! advances it. The primitive may return on wake, on timeout, when the
//! value already differs, or spuriously; callers re-read the cell and
//! decide.
//!
//! Linux provides the primitive directly as `futex(2)`, and the index cell
//! is 32 bits precisely so it can double as the futex word. Other platforms
//! fall back to a process-local condvar parking table, which is sufficient
//! while reader and writer share one address space.

use std::sync::atomic::AtomicU32;
use std::time::Duration;

pub(crate) const WAKE_ONE: i32 = 1;
pub(crate) const WAKE_ALL: i32 = i32::MAX;

#[cfg(target_os = "linux")]
mod sys {
    use super::*;
    use std::{mem, ptr};

    fn op(base: libc::c_int, private: bool) -> libc::c_int {
        if private { base | libc::FUTEX_PRIVATE_FLAG } else { base }
    }

    /// Park until `cell` no longer holds `expected`, a wake arrives, the
    /// timeout expires, or spuriously.
    pub(crate) fn wait(cell: &AtomicU32, expected: u32, timeout: Option<Duration>, private: bool) {
        let mut ts: libc::timespec = unsafe { mem::zeroed() };
        let ts_ptr = match timeout {
            Some(d) => {
                ts.tv_sec = d.as_secs() as _;
                ts.tv_nsec = d.subsec_nanos() as _;
                &raw const ts
            }
            None => ptr::null(),
        };
        // EAGAIN (value already changed), EINTR, and ETIMEDOUT all fall out
        // as an ordinary return; the caller re-reads the cell.
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                cell.as_ptr(),
                op(libc::FUTEX_WAIT, private),
                expected,
                ts_ptr,
                ptr::null::<u32>(),
                0,
            );
        }
    }

    /// Wake up to `count` waiters parked on `cell`.
    pub(crate) fn wake(cell: &AtomicU32, count: i32, private: bool) {
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                cell.as_ptr(),
                op(libc::FUTEX_WAKE, private),
                count,
                ptr::null::<libc::timespec>(),
                ptr::null::<u32>(),
                0,
            );
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod sys {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::{Condvar, Mutex};

    struct Parker {
        lock: Mutex<()>,
        cond: Condvar,
    }

    const BUCKETS: usize = 16;

    static PARKERS: [Parker; BUCKETS] = [const {
        Parker {
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }; BUCKETS];

    fn parker(cell: &AtomicU32) -> &'static Parker {
        let addr = cell as *const AtomicU32 as usize;
        &PARKERS[(addr >> 2) % BUCKETS]
    }

    pub(crate) fn wait(cell: &AtomicU32, expected: u32, timeout: Option<Duration>, _private: bool) {
        let p = parker(cell);
        let guard = p.lock.lock().unwrap_or_else(|e| e.into_inner());
        // The value check happens under the lock: a waker stores the new
        // value before taking the lock to notify, so either this load sees
        // it or the notification reaches the parked thread.
        if cell.load(Ordering::Acquire) != expected {
            return;
        }
        match timeout {
            Some(d) => {
                let _ = p.cond.wait_timeout(guard, d);
            }
            None => {
                let _ = p.cond.wait(guard);
            }
        }
    }

    pub(crate) fn wake(cell: &AtomicU32, _count: i32, _private: bool) {
        let p = parker(cell);
        drop(p.lock.lock().unwrap_or_else(|e| e.into_inner()));
        // Buckets are shared between cells, so waking more threads than
        // asked for is possible; waiters tolerate spurious returns.
        p.cond.notify_all();
    }
}

pub(crate) use sys::{wait, wake};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    #[test]
    fn wait_returns_immediately_when_value_differs() {
        let cell = AtomicU32::new(7);
        let start = Instant::now();
        wait(&cell, 3, Some(Duration::from_secs(5)), true);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn wait_observes_timeout() {
        let cell = AtomicU32::new(0);
        wait(&cell, 0, Some(Duration::from_millis(10)), true);
        assert_eq!(cell.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn wake_releases_a_parked_waiter() {
        let cell = std::sync::Arc::new(AtomicU32::new(0));
        let waiter = {
            let cell = std::sync::Arc::clone(&cell);
            std::thread::spawn(move || {
                while cell.load(Ordering::Acquire) == 0 {
                    wait(&cell, 0, Some(Duration::from_secs(10)), true);
                }
            })
        };
        std::thread::sleep(Duration::from_millis(20));
        cell.store(1, Ordering::Release);
        wake(&cell, WAKE_ALL, true);
        waiter.join().unwrap();
        assert_eq!(cell.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn wake_with_no_waiters_is_harmless() {
        let cell = AtomicU32::new(0);
        wake(&cell, WAKE_ONE, true);
        wake(&cell, WAKE_ALL, false);
    }
}

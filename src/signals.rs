//! Shell signal setup and the asynchronous child-event path.
//!
//! The `SIGCHLD` handler does the minimum an interrupt context allows: it
//! copies `(si_pid, si_code)` into a lock-free ring of atomics and returns.
//! The registry itself is only touched by [`drain_child_events`], which the
//! main loop and the foreground wait call at known safe points. The handler
//! is installed without `SA_RESTART`, so a blocked `read` or `waitpid`
//! returns with `EINTR` and reaches a drain point promptly.

use std::io;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use crate::job_control;
use crate::jobs::JobRegistry;

/// One queued `SIGCHLD` delivery.
#[derive(Debug, Clone, Copy)]
pub struct ChildEvent {
    pub pid: i32,
    pub code: i32,
}

const QUEUE_CAPACITY: usize = 128;

static EVENT_PIDS: [AtomicI32; QUEUE_CAPACITY] =
    [const { AtomicI32::new(0) }; QUEUE_CAPACITY];
static EVENT_CODES: [AtomicI32; QUEUE_CAPACITY] =
    [const { AtomicI32::new(0) }; QUEUE_CAPACITY];
static HEAD: AtomicUsize = AtomicUsize::new(0);
static TAIL: AtomicUsize = AtomicUsize::new(0);

extern "C" fn on_sigchld(
    _signal: libc::c_int,
    info: *mut libc::siginfo_t,
    _context: *mut libc::c_void,
) {
    // Async-signal-safe: atomics only, no allocation, no locks.
    let (pid, code) = unsafe { ((*info).si_pid(), (*info).si_code) };
    let head = HEAD.load(Ordering::Relaxed);
    let tail = TAIL.load(Ordering::Acquire);
    if head.wrapping_sub(tail) >= QUEUE_CAPACITY {
        // Queue full; the foreground wait's own waitpid still reaps.
        return;
    }
    let slot = head % QUEUE_CAPACITY;
    EVENT_PIDS[slot].store(pid, Ordering::Relaxed);
    EVENT_CODES[slot].store(code, Ordering::Relaxed);
    HEAD.store(head.wrapping_add(1), Ordering::Release);
}

fn pop_event() -> Option<ChildEvent> {
    let tail = TAIL.load(Ordering::Relaxed);
    let head = HEAD.load(Ordering::Acquire);
    if tail == head {
        return None;
    }
    let slot = tail % QUEUE_CAPACITY;
    let pid = EVENT_PIDS[slot].load(Ordering::Relaxed);
    let code = EVENT_CODES[slot].load(Ordering::Relaxed);
    TAIL.store(tail.wrapping_add(1), Ordering::Release);
    Some(ChildEvent { pid, code })
}

/// Install the shell's signal dispositions: the queueing `SIGCHLD` handler,
/// and `SIG_IGN` for the terminal-generated signals the shell must survive
/// (`tcsetpgrp` from a non-foreground shell raises `SIGTTOU`).
pub fn install_shell_handlers() -> io::Result<()> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        let handler: extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void) =
            on_sigchld;
        action.sa_sigaction = handler as usize;
        // SA_SIGINFO for si_pid/si_code; no SA_RESTART so blocked reads and
        // waits return with EINTR.
        action.sa_flags = libc::SA_SIGINFO;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(libc::SIGCHLD, &action, std::ptr::null_mut()) < 0 {
            return Err(io::Error::last_os_error());
        }

        for signal in [
            libc::SIGINT,
            libc::SIGQUIT,
            libc::SIGTSTP,
            libc::SIGTTIN,
            libc::SIGTTOU,
        ] {
            if libc::signal(signal, libc::SIG_IGN) == libc::SIG_ERR {
                return Err(io::Error::last_os_error());
            }
        }
    }
    Ok(())
}

/// Apply every queued child event to the registry.
///
/// Exits and kills of background jobs are reaped here and the job is erased
/// once its last stage is gone. The foreground job is never reaped here —
/// `fg_wait` owns that — and a stop flips its `blocking` flag so the
/// foreground wait releases it to the background.
pub fn drain_child_events(registry: &mut JobRegistry) {
    while let Some(event) = pop_event() {
        let Some(index) = registry.find_by_pid(event.pid) else {
            // Stray child, or a job already erased.
            continue;
        };
        match event.code {
            libc::CLD_EXITED | libc::CLD_KILLED => {
                let foreground = registry.get(index).is_some_and(|job| job.blocking);
                if foreground {
                    continue;
                }
                if job_control::reap_if_done(event.pid) {
                    let done = match registry.get_mut(index) {
                        Some(job) => {
                            job.note_reaped(event.pid);
                            job.run_count == 0
                        }
                        None => false,
                    };
                    if done {
                        registry.erase(index);
                    }
                }
            }
            libc::CLD_STOPPED => {
                if let Some(job) = registry.get_mut(index) {
                    job.blocking = false;
                }
            }
            _ => {}
        }
    }
}

//! Foreground/background transitions: process groups, controlling-terminal
//! ownership, and the foreground wait loop.

use std::io;

use crate::jobs::JobRegistry;
use crate::signals;

pub(crate) fn set_process_group(pid: libc::pid_t, pgid: libc::pid_t) -> io::Result<()> {
    loop {
        let rc = unsafe { libc::setpgid(pid, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(code) if code == libc::EINTR => continue,
            // Already exec'd or gone; the child-side setpgid won the race.
            Some(code) if code == libc::EACCES || code == libc::ESRCH => return Ok(()),
            _ => return Err(err),
        }
    }
}

/// `SIGCONT` to every process in the group.
pub fn send_continue_to_group(pgid: libc::pid_t) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    loop {
        let rc = unsafe { libc::kill(-pgid, libc::SIGCONT) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

/// Reap `pid` without blocking. True when the zombie was collected; false
/// when the process is still running or was already reaped elsewhere.
pub(crate) fn reap_if_done(pid: libc::pid_t) -> bool {
    let mut raw_status: libc::c_int = 0;
    loop {
        let rc = unsafe { libc::waitpid(pid, &mut raw_status, libc::WNOHANG) };
        if rc == pid {
            return true;
        }
        if rc == 0 {
            return false;
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return false;
    }
}

/// RAII hand-off of the controlling terminal to a job's process group; the
/// shell's own group gets it back on drop. A no-op when stdin is not a tty
/// (script mode, test harnesses).
pub(crate) struct ForegroundTerminalGuard {
    tty_fd: Option<libc::c_int>,
    shell_pgid: libc::pid_t,
}

impl ForegroundTerminalGuard {
    pub(crate) fn new(target_pgid: libc::pid_t) -> io::Result<Self> {
        let tty_fd = if unsafe { libc::isatty(libc::STDIN_FILENO) } == 1 {
            Some(libc::STDIN_FILENO)
        } else {
            None
        };

        let shell_pgid = unsafe { libc::getpgrp() };
        let guard = Self { tty_fd, shell_pgid };

        if let Some(fd) = guard.tty_fd {
            set_terminal_foreground(fd, target_pgid)?;
        }

        Ok(guard)
    }
}

impl Drop for ForegroundTerminalGuard {
    fn drop(&mut self) {
        if let Some(fd) = self.tty_fd {
            let _ = set_terminal_foreground(fd, self.shell_pgid);
        }
    }
}

// The shell ignores SIGTTOU at startup, so tcsetpgrp from a background
// shell cannot stop it.
fn set_terminal_foreground(fd: libc::c_int, pgid: libc::pid_t) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    loop {
        let rc = unsafe { libc::tcsetpgrp(fd, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

/// Wait for the job in `index` to finish in the foreground.
///
/// The job's group owns the terminal for the duration. Each stage pid is
/// waited on in turn; `EINTR` drains the child-event queue and re-checks
/// whether a kernel-delivered stop flipped the job to the background, in
/// which case the wait ends and the job stays in the registry. `ECHILD`
/// means the stage was already collected elsewhere and is skipped. A job
/// that is still `blocking` when the waits finish has terminated and is
/// erased.
pub fn fg_wait(registry: &mut JobRegistry, index: usize) {
    let (pgid, pids) = match registry.get(index) {
        Some(job) => (job.pgid, job.pids.clone()),
        None => return,
    };

    let terminal_guard = if pgid > 0 {
        match ForegroundTerminalGuard::new(pgid) {
            Ok(guard) => Some(guard),
            Err(err) => {
                eprintln!("solosh: failed to move terminal to job group {pgid}: {err}");
                None
            }
        }
    } else {
        None
    };

    'stages: for pid in pids {
        if pid <= 0 {
            continue;
        }
        loop {
            if !registry.get(index).is_some_and(|job| job.blocking) {
                break 'stages;
            }

            let mut raw_status: libc::c_int = 0;
            let rc = unsafe { libc::waitpid(pid, &mut raw_status, 0) };
            if rc == pid {
                if let Some(job) = registry.get_mut(index) {
                    job.note_reaped(pid);
                }
                break;
            }

            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(code) if code == libc::EINTR => {
                    signals::drain_child_events(registry);
                }
                // Already reaped by the event path; move on.
                Some(code) if code == libc::ECHILD => break,
                _ => break,
            }
        }
    }

    drop(terminal_guard);

    if registry.get(index).is_some_and(|job| job.blocking) {
        registry.erase(index);
    }
}

//! One-shot execution of a single external command, with optional stdio
//! replacement and optional non-blocking completion.
//!
//! This is the standalone sibling of the shell's launcher: no pipelines,
//! no job table, just "run this command and tell me exactly how it ended".
//! Callers get a structured [`RunStatus`]; the packed integer of the
//! original C interface is available through [`RunStatus::packed`] and is
//! bit-exact with it:
//!
//! | bits | meaning                                  |
//! |------|------------------------------------------|
//! | 0–7  | child's exit status low byte             |
//! | 8    | `NORMTERM` — child exited normally       |
//! | 9    | `EXECOK` — `execvp` succeeded            |
//! | 10   | `NONBLOCK` — returned before completion  |
//!
//! Non-blocking mode (a trailing lone `&`) installs a process-wide
//! `SIGCHLD` reaper on first use. Programs that manage `SIGCHLD` themselves
//! (the `solosh` binary does) must not use non-blocking mode.

use std::fs::File;
use std::io;
use std::os::fd::OwnedFd;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};

use crate::status::{self, WaitStatus};

/// Exit status a child reports when `execvp` fails.
pub const EXEC_FAIL_STATUS: i32 = 127;
pub const EXIT_STATUS_BYTE: i32 = 0xff;
pub const NORMTERM: i32 = 1 << 8;
pub const EXECOK: i32 = 1 << 9;
pub const NONBLOCK: i32 = 1 << 10;

const MAX_ARGS: usize = 20;
const MAX_PENDING: usize = 64;

/// File descriptors to install as the child's stdin, stdout and stderr.
pub struct IoTriple {
    pub stdin: OwnedFd,
    pub stdout: OwnedFd,
    pub stderr: OwnedFd,
}

impl From<(File, File, File)> for IoTriple {
    fn from((stdin, stdout, stderr): (File, File, File)) -> IoTriple {
        IoTriple {
            stdin: stdin.into(),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

/// How the command ended — or that it has not, yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Normal termination via `exit`.
    Exited { code: u8 },
    /// Killed by a signal.
    Signaled { signal: i32 },
    /// `execvp` never succeeded.
    ExecFailed,
    /// Non-blocking launch; the async reaper will collect the child.
    Pending,
}

/// Structured completion value; the wire-format integer is derived, not
/// stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStatus {
    pub completion: Completion,
    pub nonblocking: bool,
}

impl RunStatus {
    /// The packed status word of the original interface.
    pub fn packed(&self) -> i32 {
        let mut word = if self.nonblocking { NONBLOCK } else { 0 };
        match self.completion {
            Completion::Exited { code } => word |= NORMTERM | EXECOK | i32::from(code),
            Completion::ExecFailed => word |= NORMTERM | EXEC_FAIL_STATUS,
            Completion::Signaled { .. } | Completion::Pending => {}
        }
        word
    }

    pub fn exit_status(&self) -> i32 {
        self.packed() & EXIT_STATUS_BYTE
    }

    pub fn is_normterm(&self) -> bool {
        self.packed() & NORMTERM != 0
    }

    pub fn is_execok(&self) -> bool {
        self.packed() & EXECOK != 0
    }

    pub fn is_nonblock(&self) -> bool {
        self.packed() & NONBLOCK != 0
    }
}

/// A launched command.
#[derive(Debug, Clone, Copy)]
pub struct Run {
    /// The child's pid; `None` when the program could not be executed (no
    /// child survives a failed exec).
    pub pid: Option<u32>,
    pub status: RunStatus,
}

/// Run one external command.
///
/// `command` is split on whitespace into at most 20 argv slots; a trailing
/// lone `&` requests non-blocking mode. `io`, when given, replaces the
/// child's three standard streams.
pub fn run(command: &str, io: Option<IoTriple>) -> io::Result<Run> {
    let mut argv: Vec<&str> = command.split_whitespace().collect();
    let nonblocking = argv.last() == Some(&"&");
    if nonblocking {
        argv.pop();
    }
    if argv.is_empty() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "empty command"));
    }
    if argv.len() > MAX_ARGS {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("too many arguments: runcmd handles at most {MAX_ARGS}"),
        ));
    }

    let mut cmd = Command::new(argv[0]);
    cmd.args(&argv[1..]);
    if let Some(triple) = io {
        cmd.stdin(Stdio::from(triple.stdin))
            .stdout(Stdio::from(triple.stdout))
            .stderr(Stdio::from(triple.stderr));
    }

    if nonblocking {
        return run_nonblocking(cmd);
    }

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) if is_exec_failure(&err) => {
            return Ok(Run {
                pid: None,
                status: RunStatus {
                    completion: Completion::ExecFailed,
                    nonblocking: false,
                },
            });
        }
        Err(err) => return Err(err),
    };

    let pid = child.id();
    drop(child);

    let completion = match wait_blocking(pid as i32)? {
        WaitStatus::Exited(code) => Completion::Exited { code: code as u8 },
        WaitStatus::Signaled(signal) => Completion::Signaled { signal },
        // Only exit and signal terminations reach a plain waitpid.
        WaitStatus::Stopped(_) | WaitStatus::Unknown => Completion::Signaled { signal: 0 },
    };

    Ok(Run {
        pid: Some(pid),
        status: RunStatus {
            completion,
            nonblocking: false,
        },
    })
}

/// Install or replace the hook the async reaper invokes after collecting a
/// non-blocking child. The hook runs in signal context: it must be
/// async-signal-safe, which is why only a plain `fn()` is accepted.
pub fn set_onexit(hook: Option<fn()>) {
    ONEXIT.store(hook.map_or(0, |f| f as usize), Ordering::SeqCst);
}

// ── Non-blocking machinery ──

/// Pids of non-blocking children the reaper owns. 0 = free slot, -1 =
/// reserved while a spawn is in flight. Sized for active children, not for
/// the system pid space.
static PENDING: [AtomicI32; MAX_PENDING] = [const { AtomicI32::new(0) }; MAX_PENDING];
static ONEXIT: AtomicUsize = AtomicUsize::new(0);
static REAPER_INSTALLED: AtomicBool = AtomicBool::new(false);

fn run_nonblocking(mut cmd: Command) -> io::Result<Run> {
    install_reaper()?;

    let Some(slot) = reserve_slot() else {
        return Err(io::Error::new(
            io::ErrorKind::WouldBlock,
            format!("too many pending non-blocking commands (limit {MAX_PENDING})"),
        ));
    };

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            PENDING[slot].store(0, Ordering::Release);
            if is_exec_failure(&err) {
                return Ok(Run {
                    pid: None,
                    status: RunStatus {
                        completion: Completion::ExecFailed,
                        nonblocking: true,
                    },
                });
            }
            return Err(err);
        }
    };

    let pid = child.id();
    drop(child);

    PENDING[slot].store(pid as i32, Ordering::Release);
    // The child may have exited before its pid landed in the table, in
    // which case that SIGCHLD found nothing to claim; collect it now.
    try_reap(pid as i32);

    Ok(Run {
        pid: Some(pid),
        status: RunStatus {
            completion: Completion::Pending,
            nonblocking: true,
        },
    })
}

fn reserve_slot() -> Option<usize> {
    (0..MAX_PENDING).find(|&slot| {
        PENDING[slot]
            .compare_exchange(0, -1, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    })
}

fn install_reaper() -> io::Result<()> {
    if REAPER_INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        let handler: extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void) =
            on_sigchld;
        action.sa_sigaction = handler as usize;
        action.sa_flags = libc::SA_SIGINFO;
        libc::sigemptyset(&mut action.sa_mask);
        if libc::sigaction(libc::SIGCHLD, &action, std::ptr::null_mut()) < 0 {
            REAPER_INSTALLED.store(false, Ordering::SeqCst);
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

extern "C" fn on_sigchld(
    _signal: libc::c_int,
    info: *mut libc::siginfo_t,
    _context: *mut libc::c_void,
) {
    // Async-signal-safe: atomics and waitpid only. si_pid is the only way
    // to tell our non-blocking children from any other child the process
    // might have.
    let pid = unsafe { (*info).si_pid() };
    try_reap(pid);
}

/// Claim `pid` from the pending table and reap it if it is gone. Returns
/// the slot to the table when the child turns out to still be alive (a
/// stop, not an exit).
fn try_reap(pid: i32) -> bool {
    for slot in &PENDING {
        if slot
            .compare_exchange(pid, 0, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            continue;
        }

        let mut raw_status: libc::c_int = 0;
        loop {
            let rc = unsafe { libc::waitpid(pid, &mut raw_status, libc::WNOHANG) };
            if rc == pid {
                invoke_onexit();
                return true;
            }
            if rc == 0 {
                slot.store(pid, Ordering::Release);
                return false;
            }
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            // ECHILD: someone else collected it; the slot stays free.
            return false;
        }
    }
    false
}

fn invoke_onexit() {
    let raw = ONEXIT.load(Ordering::SeqCst);
    if raw != 0 {
        // SAFETY: raw was stored from a valid fn() pointer in set_onexit.
        let hook: fn() = unsafe { std::mem::transmute(raw) };
        hook();
    }
}

// ── Blocking wait ──

fn wait_blocking(pid: i32) -> io::Result<WaitStatus> {
    let mut raw_status: libc::c_int = 0;
    loop {
        let rc = unsafe { libc::waitpid(pid, &mut raw_status, 0) };
        if rc == pid {
            return Ok(status::decode(raw_status));
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

fn is_exec_failure(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
    )
}

//! Pipeline launch: forks the stages of a job, wires the pipe and
//! redirection fds, and places every stage in one process group.

use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use os_pipe::{PipeReader, PipeWriter, pipe};

use crate::builtins::{self, BuiltinAction};
use crate::job_control;
use crate::jobs::{Job, JobRegistry};

/// What the main loop should do after a job has been launched (and, for
/// foreground jobs, waited on).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchAction {
    Continue,
    Exit,
}

/// Launch every stage of `job` and drive it per its blocking flag.
///
/// The job enters the registry before anything spawns, so a `SIGCHLD`
/// arriving mid-launch can already be matched to it. Stage `k` reads from
/// pipe `k-1` and writes to pipe `k`; the first and last stages use the
/// job's redirections, falling back to the shell's own stdio. All pipe fds
/// are close-on-exec, so a child only ever holds the two ends dup'ed onto
/// its stdio and the parent's copies drop as each stage is wired.
pub fn run_job(registry: &mut JobRegistry, mut job: Job) -> LaunchAction {
    let stages = job.spec.stages.clone();
    let nstages = stages.len();

    let mut readers: Vec<Option<PipeReader>> = Vec::with_capacity(nstages.saturating_sub(1));
    let mut writers: Vec<Option<PipeWriter>> = Vec::with_capacity(nstages.saturating_sub(1));
    for _ in 1..nstages {
        match pipe() {
            Ok((reader, writer)) => {
                readers.push(Some(reader));
                writers.push(Some(writer));
            }
            Err(err) => {
                eprintln!("solosh: failed to create pipe: {err}");
                return LaunchAction::Continue;
            }
        }
    }

    job.run_count = nstages;
    job.pgid = 0;
    let mut input_file = job.stdin_redirect.take();
    let mut output_file = job.stdout_redirect.take();
    let index = registry.push(job);

    let mut exit_requested = false;

    for (k, stage) in stages.iter().enumerate() {
        // Taking the stage's pipe ends here means they close even when the
        // stage turns out to be a builtin or fails to spawn, so neighboring
        // stages still see EOF.
        let stage_stdin = if k == 0 {
            input_file.take().map(Stdio::from)
        } else {
            readers[k - 1].take().map(Stdio::from)
        };
        let stage_stdout = if k + 1 == nstages {
            output_file.take().map(Stdio::from)
        } else {
            writers[k].take().map(Stdio::from)
        };

        if let Some(builtin) = builtins::lookup(stage.program()) {
            // Builtins run in the shell itself with default stdio;
            // redirections and pipes do not apply to them.
            drop(stage_stdin);
            drop(stage_stdout);
            if builtins::run(builtin, &stage.argv[1..], registry) == BuiltinAction::Exit {
                exit_requested = true;
            }
            if let Some(job) = registry.get_mut(index) {
                job.run_count = job.run_count.saturating_sub(1);
            }
            continue;
        }

        let pgid = match registry.get(index) {
            Some(job) => job.pgid,
            // A reentrant fg/bg erased the job mid-launch; nothing left to
            // bookkeep against.
            None => break,
        };

        let mut command = Command::new(stage.program());
        command.args(&stage.argv[1..]);
        command.stdin(stage_stdin.unwrap_or_else(Stdio::inherit));
        command.stdout(stage_stdout.unwrap_or_else(Stdio::inherit));

        unsafe {
            command.pre_exec(move || {
                // The first stage (pgid 0) becomes leader of a fresh group;
                // later stages join it. The parent repeats the setpgid after
                // spawn because either side can win the race, and tcsetpgrp
                // must not run before the group exists.
                if libc::setpgid(0, pgid) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
                // SIG_IGN survives exec; give the children the default
                // dispositions the shell suppressed for itself.
                for signal in [
                    libc::SIGINT,
                    libc::SIGQUIT,
                    libc::SIGTSTP,
                    libc::SIGTTIN,
                    libc::SIGTTOU,
                    libc::SIGCHLD,
                ] {
                    if libc::signal(signal, libc::SIG_DFL) == libc::SIG_ERR {
                        return Err(std::io::Error::last_os_error());
                    }
                }
                Ok(())
            });
        }

        match command.spawn() {
            Ok(child) => {
                let pid = child.id() as i32;
                // No Child::wait here, ever: reaping belongs to fg_wait and
                // the SIGCHLD drain.
                drop(child);

                if let Some(job) = registry.get_mut(index) {
                    job.pids[k] = pid;
                    if job.pgid == 0 {
                        job.pgid = pid;
                        job.touch();
                    }
                    let pgid = job.pgid;
                    if let Err(err) = job_control::set_process_group(pid, pgid) {
                        eprintln!(
                            "solosh: {}: failed to set process group: {err}",
                            stage.program()
                        );
                    }
                }
            }
            Err(err) => {
                report_spawn_error(stage.program(), &err);
                if let Some(job) = registry.get_mut(index) {
                    job.run_count = job.run_count.saturating_sub(1);
                }
            }
        }
    }

    let (still_blocking, run_count) = match registry.get(index) {
        Some(job) => (job.blocking, job.run_count),
        None => (false, 1),
    };
    if still_blocking {
        job_control::fg_wait(registry, index);
    } else if run_count == 0 {
        // Nothing is running and nothing will wait on it: a background line
        // of builtins or failed spawns must not linger.
        registry.erase(index);
    }

    if exit_requested {
        LaunchAction::Exit
    } else {
        LaunchAction::Continue
    }
}

/// `execvp` failure is detected per stage through the spawn error (the
/// standard library reports the child-side errno over a close-on-exec
/// pipe). The stage's pid slot stays 0 and the 127 convention applies.
fn report_spawn_error(program: &str, err: &std::io::Error) {
    if err.kind() == std::io::ErrorKind::NotFound {
        eprintln!("solosh: command not found: {program}");
    } else {
        eprintln!("solosh: {program}: {err}");
    }
}

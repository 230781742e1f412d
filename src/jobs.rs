//! The job model and the shell's job registry.
//!
//! A job is one input line's pipeline, tracked collectively under a common
//! process-group id. The registry is a slot vector with tombstones: erasing
//! a job leaves a hole so the display indices of later jobs stay stable,
//! and the numbering only resets once every slot is empty.

use std::fs::File;
use std::time::Instant;

use crate::parser::{self, JobSpec};

/// A launched (or launching) pipeline.
pub struct Job {
    pub spec: JobSpec,
    /// One pid per stage. A slot is 0 when the stage was a builtin, failed
    /// to launch, or has already been reaped.
    pub pids: Vec<i32>,
    /// Process-group id shared by every stage; the pid of the first stage
    /// that spawned. 0 until then.
    pub pgid: i32,
    /// Stages still alive.
    pub run_count: usize,
    /// True while the job occupies the foreground.
    pub blocking: bool,
    /// Stamped at first spawn and on every fg/bg transition; `fg` and `bg`
    /// with no argument target the most recently stamped job.
    pub last_modified: Option<Instant>,
    /// Redirection targets, opened at job creation and handed to the
    /// launcher exactly once.
    pub stdin_redirect: Option<File>,
    pub stdout_redirect: Option<File>,
}

impl Job {
    /// Build a job from a parsed line, opening its redirection targets.
    /// A target that fails to open is reported and the stage falls back to
    /// default stdio.
    pub fn new(spec: JobSpec) -> Job {
        let stdin_redirect = spec.input_redirect.as_deref().and_then(|path| {
            match parser::open_input_redirect(path) {
                Ok(file) => Some(file),
                Err(err) => {
                    eprintln!("solosh: {path}: {err}");
                    None
                }
            }
        });
        let stdout_redirect = spec.output_redirect.as_deref().and_then(|path| {
            match parser::open_output_redirect(path) {
                Ok(file) => Some(file),
                Err(err) => {
                    eprintln!("solosh: {path}: {err}");
                    None
                }
            }
        });

        let nstages = spec.stages.len();
        Job {
            blocking: spec.blocking,
            spec,
            pids: vec![0; nstages],
            pgid: 0,
            run_count: 0,
            last_modified: None,
            stdin_redirect,
            stdout_redirect,
        }
    }

    pub fn touch(&mut self) {
        self.last_modified = Some(Instant::now());
    }

    pub fn contains_pid(&self, pid: i32) -> bool {
        pid > 0 && self.pids.contains(&pid)
    }

    /// Record that `pid` has been reaped: clear its slot and drop the live
    /// count.
    pub fn note_reaped(&mut self, pid: i32) {
        if let Some(slot) = self.pids.iter_mut().find(|p| **p == pid) {
            *slot = 0;
        }
        self.run_count = self.run_count.saturating_sub(1);
    }
}

/// The in-memory table of live jobs.
#[derive(Default)]
pub struct JobRegistry {
    slots: Vec<Option<Job>>,
    live: usize,
}

impl JobRegistry {
    pub fn new() -> JobRegistry {
        JobRegistry::default()
    }

    /// Insert a job and return its slot index. The final slot is reused if
    /// it is a tombstone; otherwise the table grows.
    pub fn push(&mut self, job: Job) -> usize {
        self.live += 1;
        if let Some(last) = self.slots.last_mut() {
            if last.is_none() {
                *last = Some(job);
                return self.slots.len() - 1;
            }
        }
        self.slots.push(Some(job));
        self.slots.len() - 1
    }

    /// Clear a slot. Indices of other jobs are unaffected; once the last
    /// live job is erased the table resets and numbering restarts at 0.
    pub fn erase(&mut self, index: usize) -> Option<Job> {
        let job = self.slots.get_mut(index)?.take();
        if job.is_some() {
            self.live -= 1;
            if self.live == 0 {
                self.slots.clear();
            }
        }
        job
    }

    pub fn get(&self, index: usize) -> Option<&Job> {
        self.slots.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Job> {
        self.slots.get_mut(index)?.as_mut()
    }

    /// Index of the job owning `pid`, searching every stage of every live
    /// slot.
    pub fn find_by_pid(&self, pid: i32) -> Option<usize> {
        self.iter()
            .find(|(_, job)| job.contains_pid(pid))
            .map(|(index, _)| index)
    }

    /// Index of the live job with the greatest `last_modified` stamp; jobs
    /// that never spawned a process are not candidates.
    pub fn find_last_modified(&self) -> Option<usize> {
        self.iter()
            .filter_map(|(index, job)| job.last_modified.map(|at| (index, at)))
            .max_by_key(|(_, at)| *at)
            .map(|(index, _)| index)
    }

    /// Live slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Job)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|job| (index, job)))
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

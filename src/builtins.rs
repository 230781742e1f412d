//! Commands executed in the shell process itself.

use std::env;

use crate::job_control;
use crate::jobs::JobRegistry;

/// The shell's builtin commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Bg,
    Cd,
    Exit,
    Fg,
    Jobs,
    Quit,
}

pub fn lookup(name: &str) -> Option<Builtin> {
    match name {
        "bg" => Some(Builtin::Bg),
        "cd" => Some(Builtin::Cd),
        "exit" => Some(Builtin::Exit),
        "fg" => Some(Builtin::Fg),
        "jobs" => Some(Builtin::Jobs),
        "quit" => Some(Builtin::Quit),
        _ => None,
    }
}

/// What the main loop should do after a builtin runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinAction {
    Continue,
    Exit,
}

pub fn run(builtin: Builtin, args: &[String], registry: &mut JobRegistry) -> BuiltinAction {
    match builtin {
        Builtin::Bg => builtin_bg(args, registry),
        Builtin::Cd => builtin_cd(args),
        Builtin::Fg => builtin_fg(args, registry),
        Builtin::Jobs => builtin_jobs(registry),
        Builtin::Exit | Builtin::Quit => return BuiltinAction::Exit,
    }
    BuiltinAction::Continue
}

/// Resolve the job targeted by `fg`/`bg`: an explicit decimal index, or the
/// most recently modified job when no argument is given. Only jobs that own
/// at least one process qualify.
fn resolve_target(args: &[String], registry: &JobRegistry) -> Option<usize> {
    let index = match args.first() {
        Some(arg) => arg.parse::<usize>().ok()?,
        None => registry.find_last_modified()?,
    };
    registry.get(index).filter(|job| job.pgid > 0)?;
    Some(index)
}

fn builtin_bg(args: &[String], registry: &mut JobRegistry) {
    let Some(index) = resolve_target(args, registry) else {
        println!("No such job.");
        return;
    };

    let pgid = {
        let job = registry.get_mut(index).expect("resolved job");
        job.touch();
        job.pgid
    };
    if let Err(err) = job_control::send_continue_to_group(pgid) {
        eprintln!("solosh: bg: {err}");
    }
}

fn builtin_fg(args: &[String], registry: &mut JobRegistry) {
    let Some(index) = resolve_target(args, registry) else {
        println!("No such job.");
        return;
    };

    let pgid = {
        let job = registry.get_mut(index).expect("resolved job");
        job.touch();
        job.blocking = true;
        job.pgid
    };
    if let Err(err) = job_control::send_continue_to_group(pgid) {
        eprintln!("solosh: fg: {err}");
    }
    job_control::fg_wait(registry, index);
}

fn builtin_jobs(registry: &JobRegistry) {
    for (index, job) in registry.iter() {
        // Slots without a process (a job mid-launch whose stages were all
        // builtins) are not jobs the user can act on.
        if job.pgid > 0 {
            println!("[{index}] {}", job.spec.name);
        }
    }
}

fn builtin_cd(args: &[String]) {
    let Some(target) = args.first() else {
        eprintln!("solosh: cd: missing operand");
        return;
    };

    if let Err(err) = env::set_current_dir(target) {
        eprintln!("solosh: cd: {target}: {err}");
        return;
    }

    match env::current_dir() {
        // SAFETY: the shell is single-threaded and its signal handler does
        // not read the environment.
        Ok(cwd) => unsafe { env::set_var("PWD", &cwd) },
        Err(err) => eprintln!("solosh: cd: {err}"),
    }
}

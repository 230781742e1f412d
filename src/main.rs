use std::env;
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::AsRawFd;

use solosh::executor::{self, LaunchAction};
use solosh::jobs::{Job, JobRegistry};
use solosh::parser::{self, ReadLine};
use solosh::signals;

const BANNER: &str = concat!(
    "SoloSH ",
    env!("CARGO_PKG_VERSION"),
    "\nAn interactive shell with job control.",
    "\nType 'exit' or 'quit' to leave.\n\n",
);

fn main() {
    std::process::exit(run());
}

enum Invocation {
    Interactive,
    Version,
    Command(String),
    Script(String),
}

fn run() -> i32 {
    let invocation = match parse_args() {
        Ok(invocation) => invocation,
        Err(message) => {
            println!("{message}");
            return 255;
        }
    };

    if let Invocation::Version = invocation {
        print!("{BANNER}");
        return 0;
    }

    // The shell leads its own process group so terminal hand-off has a
    // group to come back to.
    unsafe {
        libc::setpgid(0, 0);
    }
    if let Err(err) = signals::install_shell_handlers() {
        eprintln!("solosh: failed to install signal handlers: {err}");
        return 255;
    }

    let mut registry = JobRegistry::new();

    match invocation {
        Invocation::Command(line) => {
            run_line(&mut registry, &line);
            0
        }
        Invocation::Script(path) => {
            if let Err(err) = redirect_stdin_from(&path) {
                eprintln!("solosh: {path}: {err}");
                return 255;
            }
            main_loop(&mut registry, false)
        }
        Invocation::Interactive => {
            print!("{BANNER}");
            main_loop(&mut registry, true)
        }
        // Handled before signal setup.
        Invocation::Version => 0,
    }
}

fn parse_args() -> Result<Invocation, String> {
    let mut script: Option<String> = None;
    let mut args = env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" => return Ok(Invocation::Version),
            "-c" | "--command" => {
                let Some(command) = args.next() else {
                    return Err(format!("solosh: option '{arg}' requires an argument"));
                };
                return Ok(Invocation::Command(command));
            }
            _ => {
                if let Some(command) = arg.strip_prefix("--command=") {
                    return Ok(Invocation::Command(command.to_string()));
                }
                if arg.starts_with('-') {
                    return Err(format!("solosh: unrecognized option '{arg}'"));
                }
                if script.is_some() {
                    return Err("Too many arguments.".to_string());
                }
                script = Some(arg);
            }
        }
    }

    Ok(match script {
        Some(path) => Invocation::Script(path),
        None => Invocation::Interactive,
    })
}

/// Replace the shell's stdin with the script file, so the read loop runs
/// unchanged and prompt-less until EOF.
fn redirect_stdin_from(path: &str) -> io::Result<()> {
    let file = File::open(path)?;
    let rc = unsafe { libc::dup2(file.as_raw_fd(), libc::STDIN_FILENO) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn main_loop(registry: &mut JobRegistry, interactive: bool) -> i32 {
    loop {
        signals::drain_child_events(registry);
        if interactive {
            print_prompt();
        }

        let line = loop {
            match parser::read_line() {
                ReadLine::Line(line) => break Some(line),
                ReadLine::Empty => {
                    // Either an empty line or a read interrupted by
                    // SIGCHLD; apply whatever the children did and ask
                    // again.
                    signals::drain_child_events(registry);
                    if interactive {
                        print_prompt();
                    }
                }
                ReadLine::Eof => {
                    if interactive {
                        println!();
                    }
                    break None;
                }
            }
        };

        let Some(line) = line else {
            return 0;
        };
        if run_line(registry, &line) == LaunchAction::Exit {
            return 0;
        }
    }
}

fn run_line(registry: &mut JobRegistry, line: &str) -> LaunchAction {
    match parser::parse(line) {
        Ok(Some(spec)) => executor::run_job(registry, Job::new(spec)),
        Ok(None) => LaunchAction::Continue,
        Err(message) => {
            eprintln!("{message}");
            LaunchAction::Continue
        }
    }
}

fn print_prompt() {
    let cwd = env::current_dir()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|_| "?".to_string());
    print!("@ {cwd}: ");
    let _ = io::stdout().flush();
}

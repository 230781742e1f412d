//! Command-line driver for the `runcmd` library: run the given command and
//! print the decoded status word.

use std::env;

use solosh::runcmd;

fn main() {
    let command = env::args().skip(1).collect::<Vec<_>>().join(" ");
    if command.trim().is_empty() {
        eprintln!("usage: runcmd COMMAND [ARG]...");
        std::process::exit(1);
    }

    match runcmd::run(&command, None) {
        Ok(run) => {
            let status = run.status;
            println!("EXITSTATUS = {}", status.exit_status());
            println!("IS_EXECOK = {}", status.is_execok() as i32);
            println!("IS_NORMTERM = {}", status.is_normterm() as i32);
            println!("IS_NONBLOCK = {}", status.is_nonblock() as i32);
        }
        Err(err) => {
            eprintln!("runcmd: {err}");
            std::process::exit(1);
        }
    }
}

//! The shell's grammar: one line is a pipeline, optionally followed by
//! redirections and a trailing `&` background marker.
//!
//! ```text
//! line     := pipeline [ redirect ]* [ '&' ]
//! pipeline := command ('|' command)*
//! command  := token (WS token)*
//! redirect := ('<' WS path) | ('>' WS path)
//! ```
//!
//! Tokens are separated by spaces and tabs; `<`, `>`, `|` and `&` are the
//! only metacharacters. There is no quoting or escaping.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;

/// One pipeline stage: `argv[0]` is the program name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub argv: Vec<String>,
}

impl CommandSpec {
    pub fn program(&self) -> &str {
        &self.argv[0]
    }
}

/// Parsed form of one input line, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    /// The original command text, used by the `jobs` listing.
    pub name: String,
    /// Pipeline stages, left to right. Never empty.
    pub stages: Vec<CommandSpec>,
    /// Path named after the first `<`, applied to the first stage's stdin.
    pub input_redirect: Option<String>,
    /// Path named after the first `>`, applied to the last stage's stdout.
    pub output_redirect: Option<String>,
    /// False only when the line ends in a lone `&` token.
    pub blocking: bool,
}

/// Parse one input line.
///
/// Returns `Ok(None)` for a line with no command in it (empty, whitespace,
/// or nothing but redirections), and `Err` for grammar errors such as an
/// empty pipeline stage.
pub fn parse(line: &str) -> Result<Option<JobSpec>, String> {
    if line.trim().is_empty() {
        return Ok(None);
    }

    let blocking = is_blocking(line);
    let clean = clean_command(line);

    let mut stages = Vec::new();
    for part in clean.split('|') {
        let argv: Vec<String> = part.split_whitespace().map(str::to_string).collect();
        if argv.is_empty() {
            if clean.contains('|') {
                return Err("solosh: syntax error near `|'".to_string());
            }
            continue;
        }
        stages.push(CommandSpec { argv });
    }

    if stages.is_empty() {
        return Ok(None);
    }

    Ok(Some(JobSpec {
        name: line.to_string(),
        stages,
        input_redirect: redirect_path(line, '<'),
        output_redirect: redirect_path(line, '>'),
        blocking,
    }))
}

/// True unless the last non-whitespace character is a `&` preceded by
/// whitespace. A `&` glued to the previous token (`foo&`) is not a
/// background marker.
pub fn is_blocking(line: &str) -> bool {
    let trimmed = line.trim_end();
    if !trimmed.ends_with('&') {
        return true;
    }
    // `&` is ASCII, so the slice below ends on a char boundary.
    !matches!(
        trimmed[..trimmed.len() - 1].chars().last(),
        Some(' ') | Some('\t')
    )
}

/// The line with the redirection suffix (everything from the first `<` or
/// `>`) removed and the trailing background marker stripped. What remains
/// is what splits into pipeline stages.
pub fn clean_command(line: &str) -> String {
    let cut = line.find(['<', '>']).unwrap_or(line.len());
    let mut clean = &line[..cut];
    if !is_blocking(line) {
        let trimmed = clean.trim_end();
        if let Some(stripped) = trimmed.strip_suffix('&') {
            clean = stripped;
        }
    }
    clean.to_string()
}

/// Path following the first occurrence of `op` (`<` or `>`): blanks are
/// skipped, then characters are taken up to the next blank. Returns
/// `Some("")` when the operator is present with no target, so the caller's
/// open fails with the underlying OS error.
pub fn redirect_path(line: &str, op: char) -> Option<String> {
    let pos = line.find(op)?;
    let rest = line[pos + op.len_utf8()..].trim_start_matches([' ', '\t']);
    let path: String = rest
        .chars()
        .take_while(|c| *c != ' ' && *c != '\t')
        .collect();
    Some(path)
}

/// Open an input redirection target read-only.
pub fn open_input_redirect(path: &str) -> io::Result<File> {
    File::open(path)
}

/// Open an output redirection target: read-write, create, truncate, 0600.
pub fn open_output_redirect(path: &str) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

/// Result of one [`read_line`] call.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadLine {
    /// A complete line, without the newline.
    Line(String),
    /// Nothing to run: an empty line, or a read interrupted before any
    /// input arrived. The caller should drain pending child events and try
    /// again.
    Empty,
    /// End of input.
    Eof,
}

/// Read one line from fd 0.
///
/// Reads byte-at-a-time so a `SIGCHLD` arriving mid-wait surfaces as
/// `EINTR` instead of being swallowed by stdio buffering. An interrupt
/// before the first byte returns [`ReadLine::Empty`]; once input has been
/// buffered the read is retried so typed characters survive a background
/// job's exit.
pub fn read_line() -> ReadLine {
    let mut buf: Vec<u8> = Vec::new();
    loop {
        let mut byte = 0u8;
        let n = unsafe { libc::read(0, (&raw mut byte).cast::<libc::c_void>(), 1) };
        match n {
            1 => {
                if byte == b'\n' {
                    break;
                }
                buf.push(byte);
            }
            0 => {
                if buf.is_empty() {
                    return ReadLine::Eof;
                }
                // An unterminated final line still runs; the next call
                // reports EOF.
                break;
            }
            _ => {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    if buf.is_empty() {
                        return ReadLine::Empty;
                    }
                    continue;
                }
                return ReadLine::Eof;
            }
        }
    }

    if buf.is_empty() {
        return ReadLine::Empty;
    }
    ReadLine::Line(String::from_utf8_lossy(&buf).into_owned())
}

// Copyright (c) 2025 ETH Zurich

//! External compiler invocation.
//!
//! The driver is the only place that touches subprocesses. It builds the
//! command line, merges stdout and stderr, streams lines to the operator as
//! they arrive, enforces a wall-clock timeout, and hands the captured text
//! and return code to everyone else.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use indexmap::IndexSet;

use crate::diagnostic::Warnings;
use crate::error::*;
use crate::flavor::Flavor;

/// The default per-invocation wall-clock timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// One compile attempt: what was asked of the compiler.
#[derive(Clone, Debug)]
pub struct Attempt {
    /// The selected top unit.
    pub top: Option<String>,
    /// The ordered source files, repo-relative.
    pub files: Vec<PathBuf>,
    /// The include search directories, repo-relative.
    pub include_dirs: IndexSet<PathBuf>,
    /// The flavor being compiled.
    pub flavor: Flavor,
    /// Additional compiler flags, including any conditional-compile defines
    /// selected during resolution.
    pub extra_flags: Vec<String>,
}

/// The outcome of one compiler invocation.
#[derive(Clone, Debug)]
pub struct Outcome {
    /// The child's return code; nonzero for failures and timeouts.
    pub returncode: i32,
    /// The merged stdout and stderr text.
    pub log: String,
    /// Whether the invocation was terminated by the timeout.
    pub timed_out: bool,
}

impl Outcome {
    /// Whether the compile came back clean.
    pub fn is_clean(&self) -> bool {
        self.returncode == 0 && !self.timed_out
    }
}

/// Check that the compiler binary for a flavor is on the PATH.
///
/// A missing compiler is a setup error; nothing downstream can run.
pub fn check_compiler(flavor: Flavor) -> Result<PathBuf> {
    which::which(flavor.compiler()).map_err(|cause| {
        Error::chain(
            format!(
                "Compiler `{}` for flavor {} not found on PATH.",
                flavor.compiler(),
                flavor
            ),
            cause,
        )
    })
}

/// Run a command from the repository root, streaming output.
///
/// stdout and stderr are merged into one pipe. A reader thread forwards
/// lines over a channel; the caller side enforces the deadline, echoes each
/// line to stdout when `stream` is set, and kills the child once the
/// deadline passes. After a kill the remaining buffered output is drained so
/// the log is complete.
pub fn run(
    program: &str,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
    stream: bool,
) -> Result<Outcome> {
    log::debug!("run: {} {} (cwd {:?})", program, args.join(" "), cwd);
    let (reader, writer) = std::io::pipe()
        .map_err(|cause| Error::chain("Failed to create output pipe.", cause))?;
    let writer_err = writer
        .try_clone()
        .map_err(|cause| Error::chain("Failed to clone output pipe.", cause))?;

    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(writer)
        .stderr(writer_err)
        .spawn()
        .map_err(|cause| {
            Error::chain(format!("Failed to spawn `{}` subprocess.", program), cause)
        })?;

    // The child holds the only write ends now; the reader thread sees EOF
    // once it exits.
    let (tx, rx) = mpsc::channel::<String>();
    let reader_thread = std::thread::spawn(move || {
        let buf = BufReader::new(reader);
        for line in buf.lines().map_while(|l| l.ok()) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let start = Instant::now();
    let mut log_text = String::new();
    let mut timed_out = false;
    loop {
        let remaining = timeout.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            let _ = child.kill();
            timed_out = true;
            break;
        }
        match rx.recv_timeout(remaining.min(Duration::from_millis(200))) {
            Ok(line) => {
                if stream {
                    println!("{}", line);
                }
                log_text.push_str(&line);
                log_text.push('\n');
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // Deadline not necessarily reached; re-check via the loop.
                if let Ok(Some(_)) = child.try_wait() {
                    // Child exited; drain whatever the reader still holds.
                    while let Ok(line) = rx.recv_timeout(Duration::from_millis(50)) {
                        if stream {
                            println!("{}", line);
                        }
                        log_text.push_str(&line);
                        log_text.push('\n');
                    }
                    break;
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    // Reap the child, then give the reader a bounded window to hand over
    // whatever the pipe still held. The thread is left detached: an
    // orphaned grandchild can keep the write end open indefinitely, and
    // joining would hang on it.
    let status = child
        .wait()
        .map_err(|cause| Error::chain("Failed to await subprocess.", cause))?;
    while let Ok(line) = rx.recv_timeout(Duration::from_millis(100)) {
        log_text.push_str(&line);
        log_text.push('\n');
    }
    drop(reader_thread);

    if timed_out {
        Warnings::CompileTimeout(timeout.as_secs()).emit();
        return Ok(Outcome {
            returncode: 124,
            log: log_text,
            timed_out: true,
        });
    }
    Ok(Outcome {
        returncode: status.code().unwrap_or(1),
        log: log_text,
        timed_out: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_merged_output_and_code() {
        let out = run(
            "sh",
            &["-c".into(), "echo out; echo err >&2; exit 3".into()],
            Path::new("."),
            Duration::from_secs(10),
            false,
        )
        .unwrap();
        assert_eq!(out.returncode, 3);
        assert!(out.log.contains("out"));
        assert!(out.log.contains("err"));
        assert!(!out.timed_out);
    }

    #[test]
    fn clean_exit_is_clean() {
        let out = run(
            "sh",
            &["-c".into(), "true".into()],
            Path::new("."),
            Duration::from_secs(10),
            false,
        )
        .unwrap();
        assert!(out.is_clean());
    }

    #[test]
    fn timeout_produces_synthetic_outcome() {
        let out = run(
            "sh",
            &["-c".into(), "echo started; sleep 30".into()],
            Path::new("."),
            Duration::from_millis(400),
            false,
        )
        .unwrap();
        assert!(out.timed_out);
        assert!(!out.is_clean());
        assert!(out.log.contains("started"));
    }

    #[test]
    fn missing_program_is_an_error() {
        let res = run(
            "definitely-not-a-compiler-binary",
            &[],
            Path::new("."),
            Duration::from_secs(1),
            false,
        );
        assert!(res.is_err());
    }
}

// Copyright (c) 2025 ETH Zurich

//! Candidate orchestration.
//!
//! For each ranked top candidate, a state machine runs
//! Seeded → Resolving → Minimizing → Verifying → Accepted, falling back to
//! Failed on a stall and to Rolled-Back when minimization breaks the
//! compile. The blacklist is shared across candidates: a file that is toxic
//! for one top is toxic for every top, since the repository text is
//! unchanged. The first accepted outcome wins.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexSet;

use crate::config::Config;
use crate::diag::Diagnostic;
use crate::diagnostic::Warnings;
use crate::error::*;
use crate::flavor::{self, Flavor};
use crate::minimize;
use crate::resolve::{CompileFn, Resolver};
use crate::sess::Session;

/// The per-candidate state machine states.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum State {
    /// Top selected, initial sets loaded.
    Seeded,
    /// The resolver loop is running.
    Resolving,
    /// One file pass plus one include pass.
    Minimizing,
    /// The final compile over the minimized sets.
    Verifying,
    /// Terminal success.
    Accepted,
    /// Minimization broke the compile; reverted to the pre-minimize set.
    RolledBack,
    /// Terminal failure for this top.
    Failed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            State::Seeded => "seeded",
            State::Resolving => "resolving",
            State::Minimizing => "minimizing",
            State::Verifying => "verifying",
            State::Accepted => "accepted",
            State::RolledBack => "rolled-back",
            State::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// The result of driving all candidates.
#[derive(Clone, Debug)]
pub struct DriveOutcome {
    /// The selected (or best-ranked) top unit.
    pub top: String,
    /// The final ordered file set.
    pub files: Vec<PathBuf>,
    /// The final include-dir set.
    pub include_dirs: IndexSet<PathBuf>,
    /// Extra compiler flags accumulated during resolution.
    pub extra_flags: Vec<String>,
    /// The last compiler log, retained as the audit trail.
    pub last_log: String,
    /// Whether any candidate was accepted.
    pub accepted: bool,
}

/// Shared inputs for the candidate loop.
pub struct Drive<'a> {
    /// The repository root.
    pub root: &'a Path,
    /// The flavor being driven.
    pub flavor: Flavor,
    /// Testbench files, exempt from minimization.
    pub tb_files: &'a [PathBuf],
    /// The initial include-dir set.
    pub include_dirs: IndexSet<PathBuf>,
    /// Initial extra compiler flags.
    pub extra_flags: Vec<String>,
    /// The cap on candidates to attempt.
    pub candidate_cap: usize,
    /// Files excluded before the first attempt (vendor-library sources and
    /// other known-toxic paths). The candidate loop's blacklist starts from
    /// these.
    pub pre_blacklist: BTreeSet<PathBuf>,
}

impl<'a> Drive<'a> {
    /// Run the candidate loop.
    ///
    /// `seed` yields the initial file set for a given top; `compile` is the
    /// flavor's compiler invocation; `parse` its diagnostic parser.
    pub fn run(
        &self,
        candidates: &[String],
        seed: impl Fn(&str) -> Vec<PathBuf>,
        compile: &mut CompileFn,
        parse: fn(&str) -> Vec<Diagnostic>,
    ) -> Result<DriveOutcome> {
        let mut blacklist: BTreeSet<PathBuf> = self.pre_blacklist.clone();
        let mut last_log = String::new();
        let attempts = candidates.iter().take(self.candidate_cap);
        for top in attempts {
            let mut state = State::Seeded;
            log::info!("orchestrate: candidate `{}` {}", top, state);
            let seeded = seed(top);
            if seeded.is_empty() {
                log::info!("orchestrate: no declaring file for `{}`, skipping", top);
                continue;
            }

            state = State::Resolving;
            log::info!("orchestrate: candidate `{}` {}", top, state);
            let mut resolver = Resolver::new(
                self.root,
                self.flavor,
                top,
                seeded,
                self.include_dirs.clone(),
                self.extra_flags.clone(),
                &mut blacklist,
            );
            let resolution = resolver.run(compile, parse)?;
            last_log = resolution.last_log.clone();
            if !resolution.clean {
                state = State::Failed;
                log::info!("orchestrate: candidate `{}` {}", top, state);
                continue;
            }

            state = State::Minimizing;
            log::info!("orchestrate: candidate `{}` {}", top, state);
            let pre_minimize = (resolution.files.clone(), resolution.include_dirs.clone());
            let minimized = minimize::minimize(
                self.root,
                self.flavor,
                top,
                resolution.files,
                resolution.include_dirs,
                resolution.extra_flags.clone(),
                self.tb_files,
                compile,
            )?;
            last_log = minimized.last_log.clone();

            state = State::Verifying;
            log::info!("orchestrate: candidate `{}` {}", top, state);
            let verify = compile(&crate::driver::Attempt {
                top: Some(top.clone()),
                files: minimized.files.clone(),
                include_dirs: minimized.include_dirs.clone(),
                flavor: self.flavor,
                extra_flags: resolution.extra_flags.clone(),
            })?;
            last_log = verify.log.clone();
            let (files, include_dirs) = if verify.is_clean() {
                (minimized.files, minimized.include_dirs)
            } else {
                state = State::RolledBack;
                log::info!("orchestrate: candidate `{}` {}", top, state);
                Warnings::MinimizeRolledBack.emit();
                pre_minimize
            };

            state = State::Accepted;
            log::info!("orchestrate: candidate `{}` {}", top, state);
            return Ok(DriveOutcome {
                top: top.clone(),
                files,
                include_dirs,
                extra_flags: resolution.extra_flags,
                last_log,
                accepted: true,
            });
        }

        // No candidate was accepted: the result still names the best-ranked
        // top and carries the final log of the last attempt.
        Ok(DriveOutcome {
            top: candidates.first().cloned().unwrap_or_default(),
            files: Vec::new(),
            include_dirs: self.include_dirs.clone(),
            extra_flags: self.extra_flags.clone(),
            last_log,
            accepted: false,
        })
    }
}

/// Run the full pipeline for a repository and emit the configuration.
pub fn configure(sess: &Session) -> Result<Config> {
    let flavor = match sess.flavor {
        Some(f) => f,
        None => flavor::detect(sess.root)?,
    };
    log::info!("orchestrate: flavor {} for {:?}", flavor, sess.root);
    match flavor {
        Flavor::Verilog => flavor::verilog::configure(sess),
        Flavor::Vhdl => flavor::vhdl::configure(sess),
        Flavor::Chisel => flavor::chisel::configure(sess),
        Flavor::Bluespec => flavor::bluespec::configure(sess),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{Attempt, Outcome};
    use pretty_assertions::assert_eq;
    use std::fs;

    fn touch(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn outcome(rc: i32) -> Outcome {
        Outcome {
            returncode: rc,
            log: String::new(),
            timed_out: false,
        }
    }

    fn drive<'a>(root: &'a Path, tb: &'a [PathBuf]) -> Drive<'a> {
        Drive {
            root,
            flavor: Flavor::Verilog,
            tb_files: tb,
            include_dirs: IndexSet::new(),
            extra_flags: vec![],
            candidate_cap: 10,
            pre_blacklist: BTreeSet::new(),
        }
    }

    #[test]
    fn first_working_candidate_wins() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "rtl/cpu.v", "module cpu; endmodule\n");
        let candidates = vec!["broken_top".to_string(), "cpu".to_string()];
        let files = vec![PathBuf::from("rtl/cpu.v")];
        let outcome = drive(dir.path(), &[])
            .run(
                &candidates,
                |_| files.clone(),
                &mut |attempt: &Attempt| {
                    if attempt.top.as_deref() == Some("cpu") {
                        Ok(outcome(0))
                    } else {
                        Ok(outcome(1))
                    }
                },
                crate::diag::parse_verilator,
            )
            .unwrap();
        assert!(outcome.accepted);
        assert_eq!(outcome.top, "cpu");
    }

    #[test]
    fn candidate_cap_limits_attempts() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "rtl/a.v", "module a; endmodule\n");
        let candidates: Vec<String> = (0..20).map(|i| format!("cand{}", i)).collect();
        let mut tops_seen = BTreeSet::new();
        let result = drive(dir.path(), &[])
            .run(
                &candidates,
                |_| vec![PathBuf::from("rtl/a.v")],
                &mut |attempt: &Attempt| {
                    tops_seen.insert(attempt.top.clone().unwrap());
                    Ok(outcome(1))
                },
                crate::diag::parse_verilator,
            )
            .unwrap();
        assert!(!result.accepted);
        assert_eq!(tops_seen.len(), 10);
        // The failure result still names the best-ranked candidate.
        assert_eq!(result.top, "cand0");
    }

    #[test]
    fn minimization_failure_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "rtl/cpu.v", "module cpu; endmodule\n");
        touch(dir.path(), "rtl/alu.v", "module alu; endmodule\n");
        let files = vec![PathBuf::from("rtl/cpu.v"), PathBuf::from("rtl/alu.v")];
        let mut calls = 0;
        let result = drive(dir.path(), &[])
            .run(
                &["cpu".to_string()],
                |_| files.clone(),
                &mut |attempt: &Attempt| {
                    calls += 1;
                    // The resolver's compile and the minimizer's removal
                    // trials succeed, but the final verification fails;
                    // the pre-minimize set must come back.
                    let full = attempt.files.len() == 2;
                    let verifying = calls > 3;
                    if full || !verifying {
                        Ok(outcome(0))
                    } else {
                        Ok(outcome(1))
                    }
                },
                crate::diag::parse_verilator,
            )
            .unwrap();
        assert!(result.accepted);
        assert_eq!(result.files.len(), 2);
    }
}

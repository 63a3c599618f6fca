// Copyright (c) 2025 ETH Zurich

//! Greedy minimization of a clean-compile set.
//!
//! Removal candidates are files that neither sit in the testbench list nor
//! declare a package or interface. One pass removes files one at a time,
//! keeping each removal only if the compile stays clean; a symmetric pass
//! then does the same over include directories. The invariant "the set
//! compiles cleanly" holds at every step.

use std::path::{Path, PathBuf};

use indexmap::IndexSet;

use crate::driver::{Attempt, Outcome};
use crate::error::*;
use crate::extract::{self, UnitKind};
use crate::flavor::Flavor;
use crate::resolve::CompileFn;
use crate::util;

/// A minimized set plus the last compiler log.
#[derive(Clone, Debug)]
pub struct Minimized {
    /// The surviving files, in their compile order.
    pub files: Vec<PathBuf>,
    /// The surviving include directories.
    pub include_dirs: IndexSet<PathBuf>,
    /// The log of the last trial compile.
    pub last_log: String,
}

/// Whether a file declares a package or interface.
///
/// Such providers are never removal candidates: other files reference the
/// symbols they declare, and removing them produces avoidable churn.
fn declares_foundation(root: &Path, rel: &Path, flavor: Flavor) -> bool {
    let text = util::read_file(&root.join(rel)).unwrap_or_default();
    let (units, _) = extract::extract_file(flavor, rel, &text);
    units
        .iter()
        .any(|u| matches!(u.kind, UnitKind::Package | UnitKind::Interface))
}

/// Greedily minimize the file set, then the include-dir set.
///
/// `compile` must be the same invocation used by the resolver; the input
/// set is assumed to compile cleanly.
pub fn minimize(
    root: &Path,
    flavor: Flavor,
    top: &str,
    files: Vec<PathBuf>,
    include_dirs: IndexSet<PathBuf>,
    extra_flags: Vec<String>,
    tb_files: &[PathBuf],
    compile: &mut CompileFn,
) -> Result<Minimized> {
    let mut keep = files;
    let mut last_log = String::new();

    let attempt = |files: &[PathBuf], dirs: &IndexSet<PathBuf>| Attempt {
        top: Some(top.to_string()),
        files: files.to_vec(),
        include_dirs: dirs.clone(),
        flavor,
        extra_flags: extra_flags.clone(),
    };

    // One pass over the removal candidates.
    let candidates: Vec<PathBuf> = keep
        .iter()
        .filter(|f| !tb_files.contains(f))
        .filter(|f| !declares_foundation(root, f, flavor))
        .cloned()
        .collect();
    log::info!(
        "minimize: {} candidates of {} files",
        candidates.len(),
        keep.len()
    );
    for candidate in candidates {
        let trial: Vec<PathBuf> = keep.iter().filter(|f| **f != candidate).cloned().collect();
        let outcome: Outcome = compile(&attempt(&trial, &include_dirs))?;
        let is_clean = outcome.is_clean();
        last_log = outcome.log;
        if is_clean {
            log::info!("minimize: removed {:?}", candidate);
            keep = trial;
        }
    }

    // The symmetric pass over include directories.
    let mut keep_dirs = include_dirs;
    for dir in keep_dirs.clone() {
        let trial: IndexSet<PathBuf> = keep_dirs.iter().filter(|d| **d != dir).cloned().collect();
        let outcome = compile(&attempt(&keep, &trial))?;
        let is_clean = outcome.is_clean();
        last_log = outcome.log;
        if is_clean {
            log::info!("minimize: removed include dir {:?}", dir);
            keep_dirs = trial;
        }
    }

    Ok(Minimized {
        files: keep,
        include_dirs: keep_dirs,
        last_log,
    })
}

// Copyright (c) 2025 ETH Zurich

//! The Bluespec backend.
//!
//! Compiles the top module to Verilog with the BSV compiler. Dependencies
//! are resolved through the `-p` search path rather than by listing files;
//! the resolver grows the path directory by directory from the compiler's
//! unbound-package, unbound-type and unbound-variable errors. Multiple
//! files may declare the same `mk` top, so each declaring file is attempted
//! in scored order.

use std::path::{Path, PathBuf};

use itertools::Itertools;
use regex::Regex;

use crate::config::Config;
use crate::dedupe;
use crate::diag;
use crate::driver::{self, Attempt, Outcome};
use crate::error::*;
use crate::extract::{self, UnitKind};
use crate::flavor::Flavor;
use crate::graph::UnitGraph;
use crate::orchestrate::Drive;
use crate::rank;
use crate::scan;
use crate::sess::Session;
use crate::util;

/// Build-artifact directories specific to BSV projects.
const BSV_ARTIFACT_DIRS: &[&str] = &["build", "obj", "bdir", "simdir", "verilog"];

/// Detect which `ifdef` defines gate a type definition.
///
/// `typedef` declarations for fabric widths and similar knobs commonly sit
/// inside `ifdef` blocks; the resolver selects one of the returned defines
/// when the type's directory is already on the search path.
pub fn detect_required_defines(path: &Path, type_name: &str) -> Vec<String> {
    let Ok(text) = util::read_file(path) else {
        return Vec::new();
    };
    let pattern = Regex::new(&format!(
        r"(?s)`ifdef\s+(\w+).*?typedef\s+.*?\s+{}\s*[;#].*?`endif",
        regex::escape(type_name)
    ))
    .expect("static pattern");
    let mut defines = Vec::new();
    for c in pattern.captures_iter(&text) {
        let define = c[1].to_string();
        if !defines.contains(&define) {
            defines.push(define);
        }
    }
    defines
}

/// Build the bsc command arguments for one attempt.
///
/// The first file in the attempt is the file declaring the top; `-u` makes
/// the compiler chase the rest through the search path.
pub fn build_command(attempt: &Attempt) -> Vec<String> {
    let mut args = vec!["-verilog".to_string()];
    if let Some(top) = &attempt.top {
        args.push("-g".to_string());
        args.push(top.clone());
    }
    args.push("-u".to_string());
    args.push("-aggressive-conditions".to_string());
    args.extend(attempt.extra_flags.iter().cloned());
    let path = attempt
        .include_dirs
        .iter()
        .map(|d| d.display().to_string())
        .chain(std::iter::once("%/Libraries".to_string()))
        .join(":");
    args.push("-p".to_string());
    args.push(path);
    if let Some(file) = attempt.files.first() {
        args.push(file.display().to_string());
    }
    args
}

/// Run the full Bluespec pipeline for a session.
pub fn configure(sess: &Session) -> Result<Config> {
    driver::check_compiler(Flavor::Bluespec)?;
    let mut scanned = scan::scan(sess.root, Flavor::Bluespec)?;
    scanned.files.retain(|f| {
        !f.components().any(|c| {
            BSV_ARTIFACT_DIRS.contains(&c.as_os_str().to_string_lossy().to_lowercase().as_str())
        })
    });
    if scanned.files.is_empty() {
        return Err(Error::new(format!(
            "No bluespec sources found in {:?}.",
            sess.root
        )));
    }
    let extraction = extract::extract(sess.root, Flavor::Bluespec, &scanned.files);
    let graph = UnitGraph::from_extraction(&extraction);
    let mut candidates: Vec<String> = rank::rank(&graph, &extraction, &sess.name)
        .into_iter()
        .filter(|r| r.name.starts_with("mk"))
        .map(|r| r.name)
        .collect();
    if let Some(hint) = sess.hints.suggested_top() {
        if graph.contains(hint) {
            candidates.retain(|c| c != hint);
            candidates.insert(0, hint.to_string());
        }
    }
    if candidates.is_empty() {
        return Err(Error::new(format!(
            "No top candidates found in {:?}.",
            sess.root
        )));
    }

    let root = sess.root;
    let timeout = sess.timeout;
    let stream = sess.stream;
    let mut compile = move |attempt: &Attempt| -> Result<Outcome> {
        let args = build_command(attempt);
        driver::run("bsc", &args, root, timeout, stream)
    };

    // Multiple files may declare the same top name; try each in scored
    // order until one is accepted.
    let mut last_outcome: Option<crate::orchestrate::DriveOutcome> = None;
    let mut attempts_left = sess.candidate_cap;
    'candidates: for top in &candidates {
        let mut declaring: Vec<PathBuf> = extraction
            .units
            .iter()
            .filter(|u| u.kind == UnitKind::BluespecModule && u.name == *top)
            .map(|u| u.file.clone())
            .collect();
        declaring.sort_by(|a, b| {
            dedupe::path_quality(b)
                .cmp(&dedupe::path_quality(a))
                .then(a.cmp(b))
        });
        declaring.dedup();
        for file in declaring {
            if attempts_left == 0 {
                break 'candidates;
            }
            attempts_left -= 1;
            let mut include_dirs = indexmap::IndexSet::new();
            include_dirs.insert(match file.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            });
            let drive = Drive {
                root: sess.root,
                flavor: Flavor::Bluespec,
                tb_files: &scanned.tb_files,
                include_dirs,
                extra_flags: vec![],
                candidate_cap: 1,
                pre_blacklist: Default::default(),
            };
            let seed_file = file.clone();
            let outcome = drive.run(
                std::slice::from_ref(top),
                move |_| vec![seed_file.clone()],
                &mut compile,
                diag::parse_bsc,
            )?;
            let accepted = outcome.accepted;
            last_outcome = Some(outcome);
            if accepted {
                break 'candidates;
            }
        }
    }

    let outcome = last_outcome.ok_or_else(|| {
        Error::new(format!(
            "No declaring file found for any top candidate in {:?}.",
            sess.root
        ))
    })?;

    // The code-generation command downstream tooling must run first.
    let pre_script = {
        let attempt = Attempt {
            top: Some(outcome.top.clone()),
            files: outcome.files.clone(),
            include_dirs: outcome.include_dirs.clone(),
            flavor: Flavor::Bluespec,
            extra_flags: outcome.extra_flags.clone(),
        };
        format!("bsc {}", build_command(&attempt).join(" "))
    };

    let mut config = Config::new(
        &sess.name,
        &sess.name,
        &outcome.top,
        &outcome.files,
        &scanned.tb_files,
        &outcome.include_dirs,
        &outcome.extra_flags,
        Flavor::Bluespec.language_version(&scanned.predominant_ext),
        outcome.accepted,
    );
    config.pre_script = Some(pre_script);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn touch(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn command_shape() {
        let mut include_dirs = indexmap::IndexSet::new();
        include_dirs.insert(PathBuf::from("src"));
        include_dirs.insert(PathBuf::from("src/lib"));
        let attempt = Attempt {
            top: Some("mkCore".to_string()),
            files: vec![PathBuf::from("src/Core.bsv")],
            include_dirs,
            flavor: Flavor::Bluespec,
            extra_flags: vec!["-D".to_string(), "FABRIC64".to_string()],
        };
        let args = build_command(&attempt);
        assert_eq!(args[0], "-verilog");
        assert!(args.windows(2).any(|w| w == ["-g", "mkCore"]));
        assert!(args.contains(&"-u".to_string()));
        assert!(args.contains(&"-aggressive-conditions".to_string()));
        assert!(args.windows(2).any(|w| w == ["-D", "FABRIC64"]));
        let p = args.iter().position(|a| a == "-p").unwrap();
        assert_eq!(args[p + 1], "src:src/lib:%/Libraries");
        assert_eq!(args.last().unwrap(), "src/Core.bsv");
    }

    #[test]
    fn required_defines_detected() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            "Params.bsv",
            "`ifdef FABRIC64\ntypedef 64 Wd_Addr;\n`endif\n`ifdef FABRIC32\ntypedef 32 Wd_Addr;\n`endif\n",
        );
        let defines = detect_required_defines(&dir.path().join("Params.bsv"), "Wd_Addr");
        assert_eq!(defines, vec!["FABRIC64".to_string(), "FABRIC32".to_string()]);
    }

    #[test]
    fn ungated_types_need_no_defines() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Plain.bsv", "typedef 32 Word;\n");
        assert!(detect_required_defines(&dir.path().join("Plain.bsv"), "Word").is_empty());
    }
}

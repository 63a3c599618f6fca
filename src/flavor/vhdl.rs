// Copyright (c) 2025 ETH Zurich

//! The VHDL backend.
//!
//! Analyzes sources with GHDL into a temporary work library, then
//! elaborates the top entity. Analysis is position-sensitive: the resolver
//! grows the file set from the top entity's file, and ordering constraints
//! derived from the error log move providers ahead of their consumers.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::config::Config;
use crate::diag;
use crate::dedupe;
use crate::diagnostic::Warnings;
use crate::driver::{self, Attempt, Outcome};
use crate::error::*;
use crate::flavor::Flavor;
use crate::orchestrate::Drive;
use crate::rank;
use crate::resolve::{find_providers, ProviderKind};
use crate::scan;
use crate::sess::Session;
use crate::util;
use crate::{extract, graph::UnitGraph};

static LIBRARY_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^\s*library\s+(\w+)\s*;").unwrap());
static VENDOR_LIBRARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:library\s+(?:altera_mf|altera|xilinx|unisim|unimacro)\b|use\s+(?:altera_mf|xilinx|unisim|unimacro)\.)")
        .unwrap()
});
static SYNOPSYS_USE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\buse\s+ieee\.(?:std_logic_unsigned|std_logic_signed|std_logic_arith)\.")
        .unwrap()
});

/// Detect a custom work-library name.
///
/// Scans leading files for `library <name>;` declarations other than
/// ieee/std/work; when exactly one custom name is used consistently, the
/// analyzer is invoked with `--work=<name>`.
pub fn detect_custom_library(root: &Path, files: &[PathBuf]) -> Option<String> {
    let mut custom: BTreeSet<String> = BTreeSet::new();
    for rel in files.iter().take(5) {
        let text = util::read_file(&root.join(rel)).unwrap_or_default();
        for c in LIBRARY_DECL.captures_iter(&text) {
            let lib = c[1].to_lowercase();
            if !matches!(lib.as_str(), "ieee" | "std" | "work") {
                custom.insert(lib);
            }
        }
    }
    if custom.len() == 1 {
        custom.into_iter().next()
    } else {
        None
    }
}

/// Files referencing vendor simulation libraries the analyzer cannot
/// provide. These are excluded before the first attempt.
pub fn vendor_library_files(root: &Path, files: &[PathBuf]) -> Vec<PathBuf> {
    files
        .iter()
        .filter(|rel| {
            let text = util::read_file(&root.join(rel)).unwrap_or_default();
            VENDOR_LIBRARY.is_match(&text)
        })
        .cloned()
        .collect()
}

/// Whether any file uses the Synopsys non-standard arithmetic packages.
pub fn uses_synopsys_packages(root: &Path, files: &[PathBuf]) -> bool {
    files.iter().any(|rel| {
        let text = util::read_file(&root.join(rel)).unwrap_or_default();
        SYNOPSYS_USE.is_match(&text)
    })
}

/// The always-on validation flags for analyze and elaborate calls.
///
/// Binding warnings become errors so missing entities surface during
/// validation, and hide warnings are disabled to tolerate the signal/port
/// shadowing common in VHDL designs.
pub fn validation_flags(synopsys: bool) -> Vec<String> {
    let mut flags = vec!["--warn-error=binding".to_string(), "-Wno-hide".to_string()];
    if synopsys {
        flags.push("-fsynopsys".to_string());
    }
    flags
}

/// Build the analyze command arguments.
pub fn build_analyze(attempt: &Attempt, workdir: &Path, library: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "-a".to_string(),
        "--std=08".to_string(),
        format!("--workdir={}", workdir.display()),
    ];
    if let Some(lib) = library {
        args.push(format!("--work={}", lib));
    }
    args.extend(attempt.extra_flags.iter().cloned());
    args.extend(attempt.files.iter().map(|f| f.display().to_string()));
    args
}

/// Build the elaborate command arguments.
pub fn build_elaborate(top: &str, workdir: &Path, library: Option<&str>, flags: &[String]) -> Vec<String> {
    let mut args = vec![
        "-e".to_string(),
        "--std=08".to_string(),
        format!("--workdir={}", workdir.display()),
    ];
    if let Some(lib) = library {
        args.push(format!("--work={}", lib));
    }
    args.extend(flags.iter().cloned());
    args.push(top.to_string());
    args
}

/// Remove the work-library cache between iterations.
///
/// GHDL stores analyzed units in `<library>-obj08.cf`; stale entries from a
/// failed iteration would mask ordering problems in the next one.
fn clean_work_library(workdir: &Path, library: Option<&str>) {
    let lib = library.unwrap_or("work");
    for name in [format!("{}-obj08.cf", lib), "work-obj08.cf".to_string()] {
        let path = workdir.join(&name);
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Run the full VHDL pipeline for a session.
pub fn configure(sess: &Session) -> Result<Config> {
    driver::check_compiler(Flavor::Vhdl)?;
    let scanned = scan::scan(sess.root, Flavor::Vhdl)?;
    let extraction = extract::extract(sess.root, Flavor::Vhdl, &scanned.files);
    let graph = UnitGraph::from_extraction(&extraction);
    let mut candidates: Vec<String> = rank::rank(&graph, &extraction, &sess.name)
        .into_iter()
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

    // Vendor-library sources can never analyze; exclude them up front.
    let vendor = vendor_library_files(sess.root, &scanned.files);
    for file in &vendor {
        Warnings::VendorLibraryFile(file.clone()).emit();
    }
    let library = detect_custom_library(sess.root, &scanned.files);
    let extra_flags = validation_flags(uses_synopsys_packages(sess.root, &scanned.files));

    // The work directory lives under a system-temporary prefix owned by the
    // driver side of this closure; it is cleaned up on drop.
    let workdir = tempfile::Builder::new()
        .prefix("hdlscout-ghdl-")
        .tempdir()
        .map_err(|cause| Error::chain("Failed to create GHDL work directory.", cause))?;

    let root = sess.root;
    let timeout = sess.timeout;
    let stream = sess.stream;
    let library_ref = library.clone();
    let workdir_path = workdir.path().to_path_buf();
    let mut compile = move |attempt: &Attempt| -> Result<Outcome> {
        clean_work_library(&workdir_path, library_ref.as_deref());
        let args = build_analyze(attempt, &workdir_path, library_ref.as_deref());
        let analyze = driver::run("ghdl", &args, root, timeout, stream)?;
        if !analyze.is_clean() {
            return Ok(analyze);
        }
        let Some(top) = &attempt.top else {
            return Ok(analyze);
        };
        let args =
            build_elaborate(top, &workdir_path, library_ref.as_deref(), &attempt.extra_flags);
        let elaborate = driver::run("ghdl", &args, root, timeout, stream)?;
        Ok(Outcome {
            returncode: elaborate.returncode,
            log: format!("{}\n{}", analyze.log, elaborate.log),
            timed_out: elaborate.timed_out,
        })
    };

    // Analysis grows bottom-up from the file declaring the top entity.
    let extraction_ref = &extraction;
    let seed = move |top: &str| -> Vec<PathBuf> {
        let mut declaring: Vec<PathBuf> = extraction_ref
            .units
            .iter()
            .filter(|u| u.name.eq_ignore_ascii_case(top))
            .map(|u| u.file.clone())
            .collect();
        if declaring.is_empty() {
            declaring = find_providers(sess.root, Flavor::Vhdl, top, ProviderKind::Module);
        }
        declaring.sort_by(|a, b| {
            dedupe::path_quality(b)
                .cmp(&dedupe::path_quality(a))
                .then(a.cmp(b))
        });
        declaring.truncate(1);
        declaring
    };

    let drive = Drive {
        root: sess.root,
        flavor: Flavor::Vhdl,
        tb_files: &scanned.tb_files,
        include_dirs: Default::default(),
        extra_flags,
        candidate_cap: sess.candidate_cap,
        pre_blacklist: vendor.into_iter().collect(),
    };
    let outcome = drive.run(&candidates, seed, &mut compile, diag::parse_ghdl)?;

    Ok(Config::new(
        &sess.name,
        &sess.name,
        &outcome.top,
        &outcome.files,
        &scanned.tb_files,
        &outcome.include_dirs,
        &outcome.extra_flags,
        "08",
        outcome.accepted,
    ))
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
    fn custom_library_detected_when_consistent() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            "rtl/cpu.vhd",
            "library neorv32;\nuse neorv32.neorv32_package.all;\nentity cpu is\nend;\n",
        );
        let files = vec![PathBuf::from("rtl/cpu.vhd")];
        assert_eq!(
            detect_custom_library(dir.path(), &files),
            Some("neorv32".to_string())
        );
    }

    #[test]
    fn standard_libraries_are_not_custom() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            "a.vhd",
            "library ieee;\nuse ieee.std_logic_1164.all;\nentity a is\nend;\n",
        );
        assert_eq!(detect_custom_library(dir.path(), &[PathBuf::from("a.vhd")]), None);
    }

    #[test]
    fn vendor_files_are_flagged() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.vhd", "library unisim;\nuse unisim.vcomponents.all;\n");
        touch(dir.path(), "b.vhd", "library ieee;\n");
        let files = vec![PathBuf::from("a.vhd"), PathBuf::from("b.vhd")];
        assert_eq!(vendor_library_files(dir.path(), &files), vec![PathBuf::from("a.vhd")]);
    }

    #[test]
    fn synopsys_packages_add_flag() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.vhd", "use ieee.std_logic_unsigned.all;\n");
        assert!(uses_synopsys_packages(dir.path(), &[PathBuf::from("a.vhd")]));
        let flags = validation_flags(true);
        assert!(flags.contains(&"-fsynopsys".to_string()));
        assert!(flags.contains(&"--warn-error=binding".to_string()));
    }

    #[test]
    fn analyze_command_shape() {
        let attempt = Attempt {
            top: Some("potato".to_string()),
            files: vec![PathBuf::from("src/pp_types.vhd"), PathBuf::from("src/potato.vhd")],
            include_dirs: Default::default(),
            flavor: Flavor::Vhdl,
            extra_flags: vec!["--warn-error=binding".to_string()],
        };
        let args = build_analyze(&attempt, Path::new("/tmp/work"), Some("mylib"));
        assert_eq!(args[0], "-a");
        assert!(args.contains(&"--std=08".to_string()));
        assert!(args.contains(&"--workdir=/tmp/work".to_string()));
        assert!(args.contains(&"--work=mylib".to_string()));
        assert_eq!(args[args.len() - 1], "src/potato.vhd");
    }

    #[test]
    fn elaborate_command_ends_with_top() {
        let args = build_elaborate("pp_potato", Path::new("/tmp/w"), None, &[]);
        assert_eq!(args[0], "-e");
        assert_eq!(args.last().unwrap(), "pp_potato");
    }
}

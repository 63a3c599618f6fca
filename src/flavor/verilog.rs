// Copyright (c) 2025 ETH Zurich

//! The Verilog/SystemVerilog backend.
//!
//! Lints with Verilator. The resolver drives `--lint-only` invocations; a
//! clean lint is the acceptance criterion.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use indexmap::IndexSet;
use regex::Regex;

use crate::config::Config;
use crate::diag;
use crate::driver::{self, Attempt};
use crate::error::*;
use crate::flavor::Flavor;
use crate::orchestrate::Drive;
use crate::rank;
use crate::scan;
use crate::sess::Session;
use crate::util;
use crate::{extract, graph::UnitGraph};

/// The effective language mode for a lint invocation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Dialect {
    /// SystemVerilog, IEEE 1800-2017.
    Sv2017,
    /// Classic Verilog, IEEE 1364-2005.
    V2005,
}

impl Dialect {
    /// Pick the dialect from the file set: any `.sv`/`.svh` source selects
    /// SystemVerilog.
    pub fn from_files(files: &[PathBuf]) -> Dialect {
        let has_sv = files.iter().any(|f| {
            matches!(
                f.extension().map(|e| e.to_string_lossy().to_lowercase()),
                Some(ref e) if e == "sv" || e == "svh"
            )
        });
        if has_sv { Dialect::Sv2017 } else { Dialect::V2005 }
    }

    /// The `language_version` string for the output record.
    pub fn language_version(self) -> &'static str {
        match self {
            Dialect::Sv2017 => "2012",
            Dialect::V2005 => "2005",
        }
    }
}

/// Build the Verilator lint command for one attempt.
pub fn build_command(attempt: &Attempt, dialect: Dialect) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--lint-only".into(),
        "-Wall".into(),
        "--no-timing".into(),
        "-Wno-PROCASSWIRE".into(),
        "--relative-includes".into(),
    ];
    match dialect {
        Dialect::Sv2017 => {
            args.push("--sv".into());
            args.push("--language".into());
            args.push("1800-2017".into());
        }
        Dialect::V2005 => {
            args.push("--language".into());
            args.push("1364-2005".into());
        }
    }
    if let Some(top) = &attempt.top {
        args.push("--top-module".into());
        args.push(top.clone());
    }
    // Verilator expects -I<dir> without a space.
    for dir in &attempt.include_dirs {
        args.push(format!("-I{}", dir.display()));
    }
    args.extend(attempt.extra_flags.iter().cloned());
    args.extend(attempt.files.iter().map(|f| f.display().to_string()));
    args
}

static INCLUDE_DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?mi)^\s*`include\s+["<]([^">]+)[">]"#).unwrap());

/// Scan the selected files for `include` directives and pre-seed the
/// include-dir set with directories containing the included basenames.
///
/// Covers projects that use bare includes placed in sibling folders.
pub fn preseed_include_dirs(root: &Path, files: &[PathBuf], include_dirs: &mut IndexSet<PathBuf>) {
    let mut basenames: IndexSet<String> = IndexSet::new();
    for rel in files {
        let text = util::read_file(&root.join(rel)).unwrap_or_default();
        for c in INCLUDE_DIRECTIVE.captures_iter(&text) {
            let name = Path::new(&c[1])
                .file_name()
                .map(|b| b.to_string_lossy().to_string());
            if let Some(name) = name {
                basenames.insert(name);
            }
        }
    }
    for basename in basenames {
        for hit in scan::find_by_basename(root, &basename) {
            let dir = match hit.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            include_dirs.insert(dir);
        }
    }
}

/// Run the full Verilog pipeline for a session.
pub fn configure(sess: &Session) -> Result<Config> {
    let scanned = scan::scan(sess.root, Flavor::Verilog)?;
    configure_scanned(sess, scanned, None)
}

/// Run the Verilog pipeline over an already-scanned file set.
///
/// The Chisel backend re-enters here with the emitted Verilog; `pre_script`
/// carries the build-tool command that produced it.
pub fn configure_scanned(
    sess: &Session,
    scanned: scan::Scan,
    pre_script: Option<String>,
) -> Result<Config> {
    driver::check_compiler(Flavor::Verilog)?;
    let extraction = extract::extract(sess.root, Flavor::Verilog, &scanned.files);
    let graph = UnitGraph::from_extraction(&extraction);
    let mut candidates: Vec<String> = rank::rank(&graph, &extraction, &sess.name)
        .into_iter()
        .map(|r| r.name)
        .collect();
    // A hinted top joins the front of the queue when it names a real unit;
    // it still has to survive resolution like everyone else.
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

    let mut include_dirs = scanned.include_dirs.clone();
    preseed_include_dirs(sess.root, &scanned.files, &mut include_dirs);

    // The dialect can be downgraded once: a first failure caused by
    // SystemVerilog keywords used as identifiers retries in 2005 mode. The
    // cell survives the compile closure so the downgrade reaches the
    // emitted language_version.
    let dialect = std::cell::Cell::new(match scanned.predominant_ext.as_str() {
        "sv" | "svh" => Dialect::Sv2017,
        _ => Dialect::from_files(&scanned.files),
    });
    let root = sess.root;
    let timeout = sess.timeout;
    let stream = sess.stream;
    let dialect_ref = &dialect;
    let mut compile = move |attempt: &Attempt| -> Result<crate::driver::Outcome> {
        let args = build_command(attempt, dialect_ref.get());
        let outcome = driver::run("verilator", &args, root, timeout, stream)?;
        if !outcome.is_clean()
            && dialect_ref.get() == Dialect::Sv2017
            && diag::detect_sv_keyword_conflict(&outcome.log)
        {
            crate::diagnostic::Warnings::KeywordConflictFallback.emit();
            dialect_ref.set(Dialect::V2005);
            let args = build_command(attempt, dialect_ref.get());
            return driver::run("verilator", &args, root, timeout, stream);
        }
        Ok(outcome)
    };

    let drive = Drive {
        root: sess.root,
        flavor: Flavor::Verilog,
        tb_files: &scanned.tb_files,
        include_dirs,
        extra_flags: vec![],
        candidate_cap: sess.candidate_cap,
        pre_blacklist: Default::default(),
    };
    let outcome = drive.run(
        &candidates,
        |_| scanned.files.clone(),
        &mut compile,
        diag::parse_verilator,
    )?;

    let language_version = dialect.get().language_version();
    let mut config = Config::new(
        &sess.name,
        &sess.name,
        &outcome.top,
        &outcome.files,
        &scanned.tb_files,
        &outcome.include_dirs,
        &outcome.extra_flags,
        language_version,
        outcome.accepted,
    );
    config.pre_script = pre_script;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn command_shape_for_sv() {
        let attempt = Attempt {
            top: Some("core".to_string()),
            files: vec![PathBuf::from("rtl/pkg.sv"), PathBuf::from("rtl/core.sv")],
            include_dirs: IndexSet::from([PathBuf::from("rtl/inc")]),
            flavor: Flavor::Verilog,
            extra_flags: vec![],
        };
        let args = build_command(&attempt, Dialect::Sv2017);
        assert_eq!(args[0], "--lint-only");
        assert!(args.contains(&"--sv".to_string()));
        assert!(args.contains(&"1800-2017".to_string()));
        assert!(args.contains(&"--top-module".to_string()));
        assert!(args.contains(&"-Irtl/inc".to_string()));
        // Files come last, in order.
        assert_eq!(args[args.len() - 2], "rtl/pkg.sv");
        assert_eq!(args[args.len() - 1], "rtl/core.sv");
    }

    #[test]
    fn command_shape_for_2005() {
        let attempt = Attempt {
            top: None,
            files: vec![PathBuf::from("cpu.v")],
            include_dirs: IndexSet::new(),
            flavor: Flavor::Verilog,
            extra_flags: vec![],
        };
        let args = build_command(&attempt, Dialect::V2005);
        assert!(args.contains(&"1364-2005".to_string()));
        assert!(!args.contains(&"--sv".to_string()));
        assert!(!args.contains(&"--top-module".to_string()));
    }

    #[test]
    fn dialect_from_files() {
        assert_eq!(
            Dialect::from_files(&[PathBuf::from("a.v"), PathBuf::from("b.sv")]),
            Dialect::Sv2017
        );
        assert_eq!(Dialect::from_files(&[PathBuf::from("a.v")]), Dialect::V2005);
    }

    #[test]
    fn preseed_finds_sibling_headers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("rtl")).unwrap();
        std::fs::create_dir_all(dir.path().join("inc")).unwrap();
        std::fs::write(
            dir.path().join("rtl/cpu.v"),
            "`include \"macros.vh\"\nmodule cpu; endmodule\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("inc/macros.vh"), "`define W 32\n").unwrap();
        let mut dirs = IndexSet::new();
        preseed_include_dirs(dir.path(), &[PathBuf::from("rtl/cpu.v")], &mut dirs);
        assert!(dirs.contains(&PathBuf::from("inc")));
    }
}

// Copyright (c) 2025 ETH Zurich

//! Source tree scanning.
//!
//! Walks a repository, selects HDL sources by extension, sets aside
//! verification artifacts, and seeds the include-directory set.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use indexmap::IndexSet;
use regex::Regex;
use walkdir::WalkDir;

use crate::error::*;
use crate::flavor::Flavor;
use crate::util;

/// Directory tokens commonly used for verification artifacts.
///
/// Any path containing one of these as a component is excluded from the
/// compile set and, where it looks like a bench, set aside as a testbench.
const EXCLUDE_DIRS: &[&str] = &[
    "dv",
    "fpv",
    "formal",
    "uvm",
    "verification",
    "verif",
    "testbench",
    "testbenches",
    "tb",
    "test",
    "tests",
    "sim",
    "simulation",
    "compliance",
    "coverage",
    "boards",
    "board",
    "fpga",
];

/// Basename patterns that mark verification sources.
static EXCLUDE_BASENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(^|[_\-])(uvm|dv|tb|testbench|test|verif)([_\-]|$)|_tb\.|^tb_|_test\.|^test_",
    )
    .unwrap()
});

/// Basenames that suggest a `.v` file is really a header or definition file.
const HEADERISH_STEMS: &[&str] = &["define", "param", "config", "include", "const"];

/// The outcome of scanning a repository.
#[derive(Debug, Clone)]
pub struct Scan {
    /// Compile candidates, repo-relative, in walk order.
    pub files: Vec<PathBuf>,
    /// Testbench files set aside, never compiled.
    pub tb_files: Vec<PathBuf>,
    /// Directories seeded into the include search set.
    pub include_dirs: IndexSet<PathBuf>,
    /// The predominant source extension, used to choose the dialect.
    pub predominant_ext: String,
}

/// Check whether a repo-relative path hits one of the exclusion rules.
pub fn is_excluded(rel: &Path) -> bool {
    for comp in rel.components() {
        let comp = comp.as_os_str().to_string_lossy().to_lowercase();
        if EXCLUDE_DIRS.contains(&comp.as_str()) {
            return true;
        }
    }
    let base = rel
        .file_name()
        .map(|b| b.to_string_lossy().to_string())
        .unwrap_or_default();
    EXCLUDE_BASENAME.is_match(&base)
}

/// Check whether a path looks like a testbench by name or location.
pub fn is_testbench(rel: &Path) -> bool {
    static TB_NAME: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?i)\b(tb|testbench|tests?|bench|verif)\b").unwrap());
    let base = util::file_stem_lower(rel);
    if TB_NAME.is_match(&base) || base.starts_with("tb_") || base.ends_with("_tb") {
        return true;
    }
    rel.components().any(|c| {
        let c = c.as_os_str().to_string_lossy().to_lowercase();
        matches!(
            c.as_str(),
            "tb" | "testbench" | "testbenches" | "test" | "tests" | "sim" | "simulation" | "verif"
        )
    })
}

/// Scan a repository for sources of the given flavor.
///
/// Returns the selected compile candidates, the set-aside testbenches, the
/// seeded include directories, and the predominant extension. Fails when the
/// selection is empty. Walk order is sorted by file name so results are
/// deterministic across runs.
pub fn scan(root: &Path, flavor: Flavor) -> Result<Scan> {
    let mut files = Vec::new();
    let mut tb_files = Vec::new();
    let mut include_dirs = IndexSet::new();
    let mut ext_counts: Vec<(String, usize)> = Vec::new();

    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            // The root itself may be spelled `.`; only prune hidden entries
            // below it.
            e.depth() == 0
                || e.file_name()
                    .to_str()
                    .map(|n| !n.starts_with('.'))
                    .unwrap_or(true)
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let ext = match entry.path().extension() {
            Some(e) => e.to_string_lossy().to_lowercase(),
            None => continue,
        };
        if !flavor.extensions().contains(&ext.as_str()) {
            continue;
        }
        let rel = util::normalize_path(entry.path(), root);

        // Header-extension files seed the include-dir set instead of the
        // compile set; so do definition-style `.v` files.
        let is_header = matches!(ext.as_str(), "svh" | "vh");
        let headerish_stem = ext == "v"
            && HEADERISH_STEMS
                .iter()
                .any(|p| util::file_stem_lower(&rel).contains(p));
        if is_header || headerish_stem {
            let dir = rel.parent().unwrap_or(Path::new(".")).to_path_buf();
            include_dirs.insert(if dir.as_os_str().is_empty() {
                PathBuf::from(".")
            } else {
                dir
            });
            if is_header {
                continue;
            }
        }

        if is_excluded(&rel) {
            if is_testbench(&rel) {
                tb_files.push(rel);
            }
            continue;
        }

        match ext_counts.iter_mut().find(|(e, _)| *e == ext) {
            Some((_, n)) => *n += 1,
            None => ext_counts.push((ext.clone(), 1)),
        }
        files.push(rel);
    }

    if files.is_empty() {
        return Err(Error::new(format!(
            "No {} sources found in {:?}.",
            flavor, root
        )));
    }

    // Predominant extension: highest count, first-seen wins ties.
    let mut predominant_ext = flavor.extensions()[0].to_string();
    let mut best_count = 0;
    for (ext, count) in &ext_counts {
        if *count > best_count {
            best_count = *count;
            predominant_ext = ext.clone();
        }
    }

    Ok(Scan {
        files,
        tb_files,
        include_dirs,
        predominant_ext,
    })
}

/// Search the tree for files with the given basename.
///
/// Used by the resolver to locate missing includes and providers. Results
/// are repo-relative and sorted by walk order.
pub fn find_by_basename(root: &Path, basename: &str) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.file_name().to_string_lossy() == basename)
        .map(|e| util::normalize_path(e.path(), root))
        .collect()
}

/// All files under the tree with one of the given extensions, unfiltered.
///
/// Provider searches must look beyond the initial selection, since packages
/// sometimes live in directories the exclusion rules skip.
pub fn all_with_extensions(root: &Path, extensions: &[&str]) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .map(|x| extensions.contains(&x.to_string_lossy().to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .map(|e| util::normalize_path(e.path(), root))
        .collect()
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
    fn scan_selects_and_excludes() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "rtl/cpu.v", "module cpu; endmodule\n");
        touch(dir.path(), "rtl/alu.v", "module alu; endmodule\n");
        touch(dir.path(), "tb/cpu_tb.v", "module cpu_tb; endmodule\n");
        touch(dir.path(), "fpga/top_board.v", "module top_board; endmodule\n");
        touch(dir.path(), "docs/readme.md", "nothing\n");

        let scan = scan(dir.path(), Flavor::Verilog).unwrap();
        assert_eq!(
            scan.files,
            vec![PathBuf::from("rtl/alu.v"), PathBuf::from("rtl/cpu.v")]
        );
        assert_eq!(scan.tb_files, vec![PathBuf::from("tb/cpu_tb.v")]);
        assert_eq!(scan.predominant_ext, "v");
    }

    #[test]
    fn scan_seeds_include_dirs_from_headers() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "rtl/core.sv", "module core; endmodule\n");
        touch(dir.path(), "rtl/inc/defines.svh", "`define WIDTH 32\n");
        let scan = scan(dir.path(), Flavor::Verilog).unwrap();
        assert!(scan.include_dirs.contains(&PathBuf::from("rtl/inc")));
        assert_eq!(scan.files, vec![PathBuf::from("rtl/core.sv")]);
        assert_eq!(scan.predominant_ext, "sv");
    }

    #[test]
    fn scan_empty_repo_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan(dir.path(), Flavor::Verilog).is_err());
    }

    #[test]
    fn find_by_basename_walks_tree() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a/defines.vh", "`define A\n");
        touch(dir.path(), "b/c/defines.vh", "`define B\n");
        let hits = find_by_basename(dir.path(), "defines.vh");
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn testbench_classification() {
        assert!(is_testbench(Path::new("tb/core_tb.sv")));
        assert!(is_testbench(Path::new("rtl/tb_cpu.v")));
        assert!(!is_testbench(Path::new("rtl/cpu.v")));
    }
}

// Copyright (c) 2025 ETH Zurich

//! Deduplication of files providing the same symbols.
//!
//! When multiple files declare the same symbol, the one with the highest
//! path-quality score is kept. Path quality is a token heuristic: real RTL
//! lives under `src`/`rtl`/`core`, duplicates tend to live under
//! `test`/`vendor`/`board` trees.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::extract::{self, UnitKind};
use crate::flavor::Flavor;
use crate::util;

const DESIRED_TOKENS: &[&str] = &["src", "rtl", "core", "cpu", "hdl", "ip", "lib"];
const UNDESIRED_TOKENS: &[&str] = &[
    "sim",
    "simulation",
    "tb",
    "test",
    "tests",
    "testing",
    "verification",
    "verif",
    "bench",
    "example",
    "examples",
    "sample",
    "vivado",
    "quartus",
    "fpga",
    "board",
    "boards",
    "platform",
    "syn",
    "synth",
    "asic",
    "modelsim",
    "questa",
    "vendor",
    "third",
    "thirdparty",
    "doc",
    "docs",
    "scripts",
    "build",
    "out",
    "obj",
    "work",
];

/// Score a path for source quality; higher is better.
///
/// Token hits dominate, a source extension beats a header extension, and
/// shorter paths win close calls.
pub fn path_quality(path: &Path) -> i64 {
    let p = path.to_string_lossy().to_lowercase();
    let tokens = util::path_tokens(&p);
    let desired = tokens.iter().filter(|t| DESIRED_TOKENS.contains(&t.as_str())).count() as i64;
    let undesired = tokens
        .iter()
        .filter(|t| UNDESIRED_TOKENS.contains(&t.as_str()))
        .count() as i64;
    let mut score = desired * 3 - undesired * 4;
    if p.ends_with(".sv") || p.ends_with(".v") || p.ends_with(".vhd") || p.ends_with(".vhdl") {
        score += 1;
    }
    score -= p.len() as i64 / 80;
    score
}

/// Order two paths by quality, best first; path length then the path itself
/// break ties so the outcome is total.
fn better(a: &Path, b: &Path) -> std::cmp::Ordering {
    path_quality(b)
        .cmp(&path_quality(a))
        .then(a.as_os_str().len().cmp(&b.as_os_str().len()))
        .then(a.cmp(b))
}

/// Deduplicate a file list by declared symbols.
///
/// For each symbol with more than one provider, only the best-scored file
/// is kept. Files declaring no symbols fall back to basename deduplication
/// with the same scoring. The input order of survivors is preserved, which
/// makes the operation idempotent.
pub fn dedupe(files: &[PathBuf], root: &Path, flavor: Flavor) -> Vec<PathBuf> {
    if files.len() <= 1 {
        return files.to_vec();
    }

    // symbol -> providers, in input order
    let mut providers: BTreeMap<String, Vec<&PathBuf>> = BTreeMap::new();
    let mut has_symbols: BTreeMap<&PathBuf, bool> = BTreeMap::new();
    for file in files {
        let text = util::read_file(&root.join(file)).unwrap_or_default();
        let (units, _) = extract::extract_file(flavor, file, &text);
        has_symbols.insert(file, !units.is_empty());
        for unit in units {
            let key = match unit.kind {
                UnitKind::Package => format!("pkg::{}", unit.name),
                UnitKind::Interface => format!("if::{}", unit.name),
                _ => format!("mod::{}", unit.name),
            };
            providers.entry(key).or_default().push(file);
        }
    }

    let mut dropped: Vec<&PathBuf> = Vec::new();
    for (symbol, mut paths) in providers {
        if paths.len() <= 1 {
            continue;
        }
        crate::diagnostic::Warnings::DuplicateProvider(
            symbol.split("::").nth(1).unwrap_or(&symbol).to_string(),
        )
        .emit();
        paths.sort_by(|a, b| better(a, b));
        dropped.extend(paths.into_iter().skip(1));
    }

    // Basename fallback for symbol-free files (headers, utility snippets).
    let mut by_base: BTreeMap<String, Vec<&PathBuf>> = BTreeMap::new();
    for file in files {
        if has_symbols.get(&file).copied().unwrap_or(false) {
            continue;
        }
        let base = file
            .file_name()
            .map(|b| b.to_string_lossy().to_string())
            .unwrap_or_default();
        by_base.entry(base).or_default().push(file);
    }
    for (_, mut paths) in by_base {
        if paths.len() <= 1 {
            continue;
        }
        paths.sort_by(|a, b| better(a, b));
        dropped.extend(paths.into_iter().skip(1));
    }

    files
        .iter()
        .filter(|f| !dropped.contains(f))
        .cloned()
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

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn rtl_copy_beats_vendor_copy() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "rtl/fifo.v", "module fifo; endmodule\n");
        touch(dir.path(), "vendor/fifo.v", "module fifo; endmodule\n");
        let kept = dedupe(
            &paths(&["vendor/fifo.v", "rtl/fifo.v"]),
            dir.path(),
            Flavor::Verilog,
        );
        assert_eq!(kept, paths(&["rtl/fifo.v"]));
    }

    #[test]
    fn distinct_symbols_all_survive() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "rtl/cpu.v", "module cpu; endmodule\n");
        touch(dir.path(), "rtl/alu.v", "module alu; endmodule\n");
        let files = paths(&["rtl/cpu.v", "rtl/alu.v"]);
        assert_eq!(dedupe(&files, dir.path(), Flavor::Verilog), files);
    }

    #[test]
    fn dedupe_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "src/alu.v", "module alu; endmodule\n");
        touch(dir.path(), "test/alu.v", "module alu; endmodule\n");
        touch(dir.path(), "src/cpu.v", "module cpu; endmodule\n");
        let files = paths(&["test/alu.v", "src/alu.v", "src/cpu.v"]);
        let once = dedupe(&files, dir.path(), Flavor::Verilog);
        let twice = dedupe(&once, dir.path(), Flavor::Verilog);
        assert_eq!(once, twice);
        assert_eq!(once, paths(&["src/alu.v", "src/cpu.v"]));
    }

    #[test]
    fn path_quality_prefers_source_dirs() {
        assert!(path_quality(Path::new("rtl/core/alu.sv")) > path_quality(Path::new("tb/alu.sv")));
        assert!(
            path_quality(Path::new("src/fifo.v"))
                > path_quality(Path::new("third_party/boards/fifo.v"))
        );
    }
}

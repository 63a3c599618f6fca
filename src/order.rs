// Copyright (c) 2025 ETH Zurich

//! Compile-order computation.
//!
//! Verilog/SystemVerilog files are topologically ordered so that package
//! providers compile before their importers, with explicit ordering
//! constraints honored. VHDL analysis is position-sensitive: packages go
//! first, and error-driven constraints move providers ahead of their
//! consumers without reshuffling the rest.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::util;

static PKG_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^\s*package\s+(\w+)\s*;").unwrap());
static IMPORT_STAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^\s*import\s+([A-Za-z_]\w*)\s*::\s*\*\s*;").unwrap());
static IMPORT_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^\s*import\s+([^;]+);").unwrap());
static QUALIFIED_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z_]\w+)::[A-Za-z_]\w+").unwrap());
static IFDEF_ERROR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^\s*`ifdef\s+(\w+)\s*\r?\n\s*`error").unwrap());
static DEFINE_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^\s*`define\s+(\w+)").unwrap());
static VHDL_PKG_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^\s*package\s+(\w+)\s+is\b").unwrap());

/// Qualified-reference prefixes that are not package names.
const NOT_PACKAGES: &[&str] = &["std", "this", "super", "local"];

/// Heuristic: does the basename look like a package file?
///
/// Used as the ordering fallback when file contents cannot be read.
pub fn looks_like_package_file(path: &Path) -> bool {
    let base = path
        .file_name()
        .map(|b| b.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let p = path.to_string_lossy().to_lowercase();
    ["_pkg.sv", "_pkg.svh", "_types.sv", "types.sv", "_types.svh", "_config.sv", "_config.svh"]
        .iter()
        .any(|s| base.ends_with(s))
        || p.contains("/pkg/")
}

/// Packages each file declares and imports, read from disk.
struct VerilogFileFacts {
    packages: Vec<String>,
    imports: BTreeSet<String>,
    defines: Vec<String>,
    must_precede_definers_of: BTreeSet<String>,
}

fn read_verilog_facts(root: &Path, file: &Path) -> VerilogFileFacts {
    let text = util::read_file(&root.join(file)).unwrap_or_default();
    let mut facts = VerilogFileFacts {
        packages: Vec::new(),
        imports: BTreeSet::new(),
        defines: Vec::new(),
        must_precede_definers_of: BTreeSet::new(),
    };
    for c in PKG_DECL.captures_iter(&text) {
        facts.packages.push(c[1].to_string());
    }
    for c in IMPORT_STAR.captures_iter(&text) {
        facts.imports.insert(c[1].to_string());
    }
    // Bulk imports: `import a::*, b::c;`
    for c in IMPORT_LIST.captures_iter(&text) {
        for seg in c[1].split(',') {
            if let Some((pkg, _)) = seg.trim().split_once("::") {
                let pkg = pkg.trim();
                if pkg.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
                    && pkg.chars().all(|c| c.is_alphanumeric() || c == '_')
                {
                    facts.imports.insert(pkg.to_string());
                }
            }
        }
    }
    for c in QUALIFIED_REF.captures_iter(&text) {
        let pkg = c[1].to_string();
        if !NOT_PACKAGES.contains(&pkg.as_str()) {
            facts.imports.insert(pkg);
        }
    }
    for c in DEFINE_DECL.captures_iter(&text) {
        facts.defines.push(c[1].to_string());
    }
    // `ifdef DEFINE immediately followed by `error declares "this file must
    // precede the file that defines DEFINE".
    for c in IFDEF_ERROR.captures_iter(&text) {
        facts.must_precede_definers_of.insert(c[1].to_string());
    }
    facts
}

/// Order Verilog/SystemVerilog files so providers precede consumers.
///
/// Builds a DAG with edges provider → importer plus the explicit
/// `ifdef`/`error` constraints, then runs Kahn's algorithm with a stable
/// tie-break by original position. On a cycle the remaining nodes are
/// appended in original order. Finally, package-declaring files are
/// stable-partitioned to the front.
pub fn order_verilog(files: &[PathBuf], root: &Path) -> Vec<PathBuf> {
    if files.len() <= 1 {
        return files.to_vec();
    }
    let facts: Vec<VerilogFileFacts> =
        files.iter().map(|f| read_verilog_facts(root, f)).collect();

    // package name -> declaring file index (first declaration wins)
    let mut pkg_to_idx: BTreeMap<&str, usize> = BTreeMap::new();
    let mut define_to_idx: BTreeMap<&str, usize> = BTreeMap::new();
    for (i, f) in facts.iter().enumerate() {
        for pkg in &f.packages {
            pkg_to_idx.entry(pkg).or_insert(i);
        }
        for def in &f.defines {
            define_to_idx.entry(def).or_insert(i);
        }
    }

    let n = files.len();
    let mut adj: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    let mut indeg = vec![0usize; n];
    let add_edge = |adj: &mut Vec<BTreeSet<usize>>, indeg: &mut Vec<usize>, from: usize, to: usize| {
        if from != to && adj[from].insert(to) {
            indeg[to] += 1;
        }
    };
    for (i, f) in facts.iter().enumerate() {
        // provider -> importer
        for pkg in &f.imports {
            if let Some(&provider) = pkg_to_idx.get(pkg.as_str()) {
                add_edge(&mut adj, &mut indeg, provider, i);
            }
        }
        // constraint-source -> constraint-target
        for def in &f.must_precede_definers_of {
            if let Some(&definer) = define_to_idx.get(def.as_str()) {
                add_edge(&mut adj, &mut indeg, i, definer);
            }
        }
    }

    // Kahn's algorithm, stable by original index.
    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indeg[i] == 0).collect();
    let mut ordered: Vec<usize> = Vec::with_capacity(n);
    while let Some(&i) = ready.iter().next() {
        ready.remove(&i);
        ordered.push(i);
        for &j in &adj[i] {
            indeg[j] -= 1;
            if indeg[j] == 0 {
                ready.insert(j);
            }
        }
    }
    if ordered.len() != n {
        // Cycle: append the remainder in original order.
        let placed: BTreeSet<usize> = ordered.iter().copied().collect();
        ordered.extend((0..n).filter(|i| !placed.contains(i)));
    }

    // Stable partition: package providers first.
    let is_provider: Vec<bool> = facts.iter().map(|f| !f.packages.is_empty()).collect();
    let any_provider = is_provider.iter().any(|&p| p);
    let front: Vec<usize>;
    let back: Vec<usize>;
    if any_provider {
        front = ordered.iter().copied().filter(|&i| is_provider[i]).collect();
        back = ordered.iter().copied().filter(|&i| !is_provider[i]).collect();
    } else {
        // Unreadable contents: fall back to the basename heuristic.
        front = ordered
            .iter()
            .copied()
            .filter(|&i| looks_like_package_file(&files[i]))
            .collect();
        back = ordered
            .iter()
            .copied()
            .filter(|&i| !looks_like_package_file(&files[i]))
            .collect();
    }
    front
        .into_iter()
        .chain(back)
        .map(|i| files[i].clone())
        .collect()
}

/// Order VHDL files: package-defining files first, entities after.
pub fn order_vhdl(files: &[PathBuf], root: &Path) -> Vec<PathBuf> {
    let mut packages = Vec::new();
    let mut entities = Vec::new();
    for f in files {
        let text = util::read_file(&root.join(f)).unwrap_or_default();
        if VHDL_PKG_DECL.is_match(&text) {
            packages.push(f.clone());
        } else {
            entities.push(f.clone());
        }
    }
    packages.into_iter().chain(entities).collect()
}

/// Apply an analysis-order constraint: `provider` must precede `consumer`.
///
/// The provider is removed from its current position and inserted just
/// before the earliest occurrence of the consumer. Everything else keeps
/// its position; VHDL analysis is position-sensitive and a full re-sort
/// would undo the solver's progress.
pub fn move_before(files: &[PathBuf], provider: &Path, consumer: &Path) -> Vec<PathBuf> {
    let Some(provider_idx) = files.iter().position(|f| f == provider) else {
        return files.to_vec();
    };
    let Some(consumer_idx) = files.iter().position(|f| f == consumer) else {
        return files.to_vec();
    };
    if provider_idx < consumer_idx {
        return files.to_vec();
    }
    let mut out = files.to_vec();
    let moved = out.remove(provider_idx);
    out.insert(consumer_idx, moved);
    out
}

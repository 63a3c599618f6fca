// Copyright (c) 2025 ETH Zurich

//! Top-unit candidate ranking.
//!
//! The ranker returns unit names in decreasing priority. It gathers
//! candidates by structural position and name heuristics, scores them with a
//! pipeline of pure rules, and filters heavily penalized results. The score
//! scale is policy; the contract is the total ordering it induces:
//! exact-repo-name matches outrank contains-matches, core names outrank SoC
//! wrappers, SoC wrappers outrank a bare `top`, and functional units,
//! pipeline stages and verification names sink to the bottom.

use std::collections::HashMap;
use std::path::Path;

use crate::extract::{Extraction, UnitKind};
use crate::graph::UnitGraph;
use crate::util;

/// Candidates scoring at or below this value are rejected outright.
const REJECTION_THRESHOLD: i64 = -2000;

/// Basename prefixes and infixes of utility modules.
const UTILITY_PATTERNS: &[&str] = &[
    "gen_",
    "dff",
    "buf",
    "full_handshake",
    "fifo",
    "mux",
    "regfile",
];

/// Peripheral names that disqualify a unit as a design top.
const PERIPHERAL_TOKENS: &[&str] = &[
    "uart", "spi", "i2c", "gpio", "timer", "ram", "rom", "dma", "cache", "plic", "clint",
];

/// Single functional-unit names.
const FUNCTIONAL_UNIT_TOKENS: &[&str] = &[
    "alu", "adder", "mul", "mult", "multiplier", "div", "divider", "fadd", "fmul", "fdiv",
    "fsqrt", "fpu", "shifter", "barrel", "encoder", "decoder_unit",
];

/// Micro-architectural pipeline-stage names.
const MICRO_STAGE_TOKENS: &[&str] = &[
    "fetch", "decode", "rename", "dispatch", "issue", "execute", "commit", "rob", "lsu",
    "scoreboard", "hazard", "forward", "btb", "bpu", "predictor", "scheduler", "writeback",
];

/// Check whether a name denotes a peripheral block.
pub fn is_peripheral_name(name: &str) -> bool {
    let n = name.to_lowercase();
    PERIPHERAL_TOKENS.iter().any(|t| n.contains(t))
}

/// Check whether a name denotes a single functional unit.
pub fn is_functional_unit_name(name: &str) -> bool {
    let n = name.to_lowercase();
    FUNCTIONAL_UNIT_TOKENS.iter().any(|t| n.contains(t))
}

/// Check whether a name denotes a micro-pipeline stage.
pub fn is_micro_stage_name(name: &str) -> bool {
    let n = name.to_lowercase();
    MICRO_STAGE_TOKENS.iter().any(|t| n.contains(t))
}

/// Check whether a name looks like a testbench or simulation wrapper.
pub fn is_bench_name(name: &str) -> bool {
    let n = name.to_lowercase();
    n == "main"
        || n == "tb"
        || n.starts_with("tb_")
        || n.ends_with("_tb")
        || ["test", "bench", "sim_", "_sim"].iter().any(|t| n.contains(t))
}

/// Normalize a name for fuzzy repository matching: strip non-alphanumerics
/// and the common `cpu`/`core`/`top` affixes.
pub fn normalize_name(name: &str) -> String {
    let mut n: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    for affix in ["cpu", "core", "top"] {
        if n.len() > affix.len() {
            if let Some(stripped) = n.strip_suffix(affix) {
                n = stripped.to_string();
            } else if let Some(stripped) = n.strip_prefix(affix) {
                n = stripped.to_string();
            }
        }
    }
    n
}

/// A scoring candidate with its precomputed context.
#[derive(Debug)]
pub struct Candidate<'a> {
    /// The unit name.
    pub name: &'a str,
    /// Lowercased name, shared by the rules.
    pub name_lower: String,
    /// Number of units reachable from this one.
    pub reach: usize,
    /// Number of parents in the graph.
    pub parents: usize,
    /// The declaring file, when known.
    pub file: Option<&'a Path>,
}

/// Shared context for the scoring rules.
pub struct RankContext<'a> {
    /// The instantiation graph.
    pub graph: &'a UnitGraph,
    /// Lowercased repository name.
    pub repo_lower: String,
    /// Normalized repository name for fuzzy matching.
    pub repo_normalized: String,
    /// Unit name to declared kind.
    pub kinds: HashMap<&'a str, UnitKind>,
}

/// One scoring rule: a pure function from candidate and context to a delta.
///
/// The list of rules is the policy; the summation is the mechanism. Each
/// rule is independently testable.
pub type Rule = fn(&Candidate, &RankContext) -> i64;

/// Reachability is the structural backbone of the score.
fn rule_reach(c: &Candidate, _: &RankContext) -> i64 {
    c.reach as i64 * 100
}

/// Exact and partial repository-name matches.
fn rule_repo_match(c: &Candidate, ctx: &RankContext) -> i64 {
    if ctx.repo_lower.is_empty() {
        return 0;
    }
    if c.name_lower == ctx.repo_lower || normalize_name(c.name) == ctx.repo_normalized {
        6000
    } else if c.name_lower.contains(&ctx.repo_lower) {
        4000
    } else {
        0
    }
}

/// Architectural core names outrank everything but repo matches.
fn rule_core_tokens(c: &Candidate, _: &RankContext) -> i64 {
    let n = &c.name_lower;
    if n.contains("soc") {
        return 0;
    }
    if ["core", "cpu", "processor"].iter().any(|t| n.contains(t)) {
        5000
    } else if ["riscv", "risc"].iter().any(|t| n.contains(t)) {
        4500
    } else {
        0
    }
}

/// SoC and system wrappers rank below cores but above leaves.
fn rule_soc_tokens(c: &Candidate, _: &RankContext) -> i64 {
    let n = &c.name_lower;
    if n.contains("soc") {
        3000
    } else if n.contains("chip_top") || n.contains("system_top") || n.contains("system") {
        2500
    } else if n.contains("top") {
        1500
    } else {
        0
    }
}

/// Testbench and simulation names are strongly penalized.
fn rule_bench(c: &Candidate, _: &RankContext) -> i64 {
    if is_bench_name(c.name) {
        -5000
    } else {
        0
    }
}

/// Peripherals are not design tops.
fn rule_peripheral(c: &Candidate, _: &RankContext) -> i64 {
    if is_peripheral_name(c.name) {
        -3000
    } else {
        0
    }
}

/// Debug infrastructure.
fn rule_debug(c: &Candidate, _: &RankContext) -> i64 {
    let n = &c.name_lower;
    if n.contains("debug") || n.contains("jtag") {
        -2000
    } else {
        0
    }
}

/// Utility blocks and functional units.
fn rule_utility(c: &Candidate, _: &RankContext) -> i64 {
    let n = &c.name_lower;
    let utility = UTILITY_PATTERNS
        .iter()
        .any(|p| n.starts_with(p) || n.contains(p));
    if utility || is_functional_unit_name(c.name) {
        -4000
    } else {
        0
    }
}

/// Micro-pipeline stages never make sense as a top.
fn rule_micro_stage(c: &Candidate, _: &RankContext) -> i64 {
    if is_micro_stage_name(c.name) {
        -6000
    } else {
        0
    }
}

/// Units with a shallow subtree are unlikely hierarchy roots.
fn rule_shallow(c: &Candidate, _: &RankContext) -> i64 {
    if c.reach < 5 { -2000 } else { 0 }
}

/// Declaring-file path tokens.
fn rule_path(c: &Candidate, _: &RankContext) -> i64 {
    let Some(file) = c.file else { return 0 };
    let tokens = util::path_tokens(&file.to_string_lossy());
    let mut delta = 0;
    for t in ["rtl", "src", "core"] {
        if tokens.contains(t) {
            delta += 500;
        }
    }
    for t in ["test", "bench", "sim", "fpga", "board", "vendor"] {
        if tokens.contains(t) {
            delta -= 1500;
        }
    }
    delta
}

/// Long names are mildly penalized as a final separator.
fn rule_name_length(c: &Candidate, _: &RankContext) -> i64 {
    -(c.name_lower.len() as i64 / 2)
}

/// The scoring policy, applied in order and summed.
pub const RULES: &[(&str, Rule)] = &[
    ("reach", rule_reach),
    ("repo-match", rule_repo_match),
    ("core-tokens", rule_core_tokens),
    ("soc-tokens", rule_soc_tokens),
    ("bench", rule_bench),
    ("peripheral", rule_peripheral),
    ("debug", rule_debug),
    ("utility", rule_utility),
    ("micro-stage", rule_micro_stage),
    ("shallow", rule_shallow),
    ("path", rule_path),
    ("name-length", rule_name_length),
];

/// Score a single candidate by summing all rules.
pub fn score(candidate: &Candidate, ctx: &RankContext) -> i64 {
    RULES.iter().map(|(_, rule)| rule(candidate, ctx)).sum()
}

/// A ranked candidate with its score, for listing commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranked {
    /// The unit name.
    pub name: String,
    /// The summed score.
    pub score: i64,
    /// The reachable-set size used for tie-breaking.
    pub reach: usize,
}

/// Rank top-unit candidates for a repository.
///
/// Phase 1 gathers candidates (zero parents, one or two parents, fuzzy
/// repo-name matches, CPU-token names with few parents); phase 2 scores
/// them; phase 3 drops rejects and non-instantiable kinds. Ties break on
/// reachable-count, then name. Duplicates are removed preserving first
/// occurrence.
pub fn rank(graph: &UnitGraph, extraction: &Extraction, repo_name: &str) -> Vec<Ranked> {
    let repo_lower = repo_name.to_lowercase();
    let ctx = RankContext {
        graph,
        repo_normalized: normalize_name(&repo_lower),
        repo_lower,
        kinds: extraction
            .units
            .iter()
            .map(|u| (u.name.as_str(), u.kind))
            .collect(),
    };

    // Phase 1: candidate gathering.
    let mut candidates: Vec<&str> = Vec::new();
    for name in graph.names() {
        let parents = graph.parents_of(name).len();
        let fuzzy = !ctx.repo_normalized.is_empty()
            && normalize_name(name) == ctx.repo_normalized;
        let cpuish = ["core", "cpu", "processor", "soc"]
            .iter()
            .any(|t| name.to_lowercase().contains(t))
            && parents <= 3
            && !is_bench_name(name)
            && !is_functional_unit_name(name);
        if (parents <= 2 || fuzzy || cpuish) && !candidates.contains(&name) {
            candidates.push(name);
        }
    }
    if candidates.is_empty() {
        // Fall back to the units with the fewest parents.
        let min_par = graph
            .names()
            .map(|n| graph.parents_of(n).len())
            .min()
            .unwrap_or(0);
        for name in graph.names() {
            if graph.parents_of(name).len() <= min_par + 2 && !candidates.contains(&name) {
                candidates.push(name);
            }
        }
    }

    // Phase 2: scoring.
    let mut scored: Vec<Ranked> = candidates
        .into_iter()
        .map(|name| {
            let candidate = Candidate {
                name,
                name_lower: name.to_lowercase(),
                reach: graph.reachable_count(name),
                parents: graph.parents_of(name).len(),
                file: extraction.file_of(name),
            };
            Ranked {
                name: name.to_string(),
                score: score(&candidate, &ctx),
                reach: candidate.reach,
            }
        })
        .collect();

    // Phase 3: filtering. Pure interfaces and packages cannot be
    // elaborated, and micro-stage names are dropped outright unless that
    // would empty the list.
    scored.retain(|r| {
        if r.score <= REJECTION_THRESHOLD {
            return false;
        }
        !matches!(
            ctx.kinds.get(r.name.as_str()),
            Some(UnitKind::Interface) | Some(UnitKind::Package)
        )
    });
    if scored.iter().any(|r| !is_micro_stage_name(&r.name)) {
        scored.retain(|r| !is_micro_stage_name(&r.name));
    }

    scored.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(b.reach.cmp(&a.reach))
            .then(a.name.cmp(&b.name))
    });
    scored
}

// Copyright (c) 2025 ETH Zurich

//! Error-driven dependency resolution.
//!
//! The central loop: order and dedupe the file set, invoke the compiler,
//! parse its diagnostics, and apply fixes in priority order until the
//! compile is clean or no fix makes progress. The compiler itself is a
//! callback, so the loop is shared by all flavor backends and fully
//! testable without external binaries.

use std::collections::BTreeSet;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use indexmap::IndexSet;
use regex::Regex;

use crate::dedupe;
use crate::diag::Diagnostic;
use crate::diagnostic::Warnings;
use crate::driver::{Attempt, Outcome};
use crate::error::*;
use crate::flavor::{bluespec, Flavor};
use crate::order;
use crate::scan;
use crate::util;

/// The result of applying one fix handler.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FixOutcome {
    /// A directory was added to the include-search set.
    AddedInclude,
    /// A provider file was added to the source list.
    AddedProvider,
    /// An offending file was excluded for the rest of the run.
    Blacklisted,
    /// The file order changed (VHDL analysis constraints).
    Reordered,
    /// Nothing could be done for this diagnostic.
    NoProgress,
}

/// The outcome of a resolver run.
#[derive(Clone, Debug)]
pub struct Resolution {
    /// Whether the final compile came back clean.
    pub clean: bool,
    /// The final ordered file set.
    pub files: Vec<PathBuf>,
    /// The final include-dir set.
    pub include_dirs: IndexSet<PathBuf>,
    /// Extra compiler flags, including any defines selected during
    /// resolution.
    pub extra_flags: Vec<String>,
    /// The last compiler log.
    pub last_log: String,
}

/// A compile callback: runs the flavor's compiler over one attempt.
pub type CompileFn<'f> = dyn FnMut(&Attempt) -> Result<Outcome> + 'f;

/// The dependency resolver for one top candidate.
pub struct Resolver<'a> {
    root: &'a Path,
    flavor: Flavor,
    top: String,
    files: Vec<PathBuf>,
    include_dirs: IndexSet<PathBuf>,
    extra_flags: Vec<String>,
    /// Shared across candidates; owned by the orchestrator.
    blacklist: &'a mut BTreeSet<PathBuf>,
    /// The full candidate pool, for the all-sources stall fallback.
    all_candidates: Vec<PathBuf>,
    /// When false, the next iteration re-runs ordering and dedupe.
    ordered: bool,
    /// Syntax offenders that declare packages get one iteration of grace.
    deferred_syntax: BTreeSet<PathBuf>,
    /// Whether the all-sources fallback has been spent.
    fallback_spent: bool,
    /// Whether a terminal is available for define disambiguation.
    interactive: bool,
    /// Fixes applied this iteration; a file never enters both the source
    /// list and the blacklist in the same iteration.
    added_this_iteration: BTreeSet<PathBuf>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver over an initial file and include-dir set.
    pub fn new(
        root: &'a Path,
        flavor: Flavor,
        top: &str,
        files: Vec<PathBuf>,
        include_dirs: IndexSet<PathBuf>,
        extra_flags: Vec<String>,
        blacklist: &'a mut BTreeSet<PathBuf>,
    ) -> Self {
        let files: Vec<PathBuf> = files
            .into_iter()
            .filter(|f| !blacklist.contains(f))
            .collect();
        Resolver {
            root,
            flavor,
            top: top.to_string(),
            all_candidates: files.clone(),
            files,
            include_dirs,
            extra_flags,
            blacklist,
            ordered: false,
            deferred_syntax: BTreeSet::new(),
            fallback_spent: false,
            interactive: std::io::stdin().is_terminal(),
            added_this_iteration: BTreeSet::new(),
        }
    }

    /// Force headless define selection; used by tests.
    pub fn headless(mut self) -> Self {
        self.interactive = false;
        self
    }

    /// The attempt the next compiler invocation will see.
    fn attempt(&self) -> Attempt {
        Attempt {
            top: Some(self.top.clone()),
            files: self.files.clone(),
            include_dirs: self.include_dirs.clone(),
            flavor: self.flavor,
            extra_flags: self.extra_flags.clone(),
        }
    }

    /// Run the loop, bounded by the flavor's iteration cap.
    pub fn run(
        &mut self,
        compile: &mut CompileFn,
        parse: fn(&str) -> Vec<Diagnostic>,
    ) -> Result<Resolution> {
        let max_iterations = self.flavor.max_iterations();
        let mut last_log = String::new();
        for iteration in 1..=max_iterations {
            if !self.ordered {
                self.order_and_dedupe();
                self.ordered = true;
            }
            self.added_this_iteration.clear();
            log::info!(
                "resolve: iteration {}/{} files={} includes={} top={}",
                iteration,
                max_iterations,
                self.files.len(),
                self.include_dirs.len(),
                self.top
            );
            let outcome = compile(&self.attempt())?;
            last_log = outcome.log.clone();
            if outcome.is_clean() {
                return Ok(self.resolution(true, last_log));
            }
            if outcome.timed_out {
                // A timeout carries no actionable diagnostics; stall.
                break;
            }

            let mut diagnostics = parse(&outcome.log);
            diagnostics.sort_by(|a, b| a.priority().cmp(&b.priority()).then(a.cmp(b)));
            let before = self.progress_marker();
            let mut reordered = false;
            for diagnostic in &diagnostics {
                match self.apply_fix(diagnostic) {
                    FixOutcome::Reordered => reordered = true,
                    FixOutcome::NoProgress => {}
                    _ => {}
                }
            }
            let progressed = self.progress_marker() != before || reordered;
            if !progressed {
                if self.try_all_sources_fallback() {
                    continue;
                }
                break;
            }
        }
        Warnings::ResolverStalled {
            top: self.top.clone(),
        }
        .emit();
        Ok(self.resolution(false, last_log))
    }

    fn resolution(&self, clean: bool, last_log: String) -> Resolution {
        Resolution {
            clean,
            files: self.files.clone(),
            include_dirs: self.include_dirs.clone(),
            extra_flags: self.extra_flags.clone(),
            last_log,
        }
    }

    /// The progress metric: either the blacklist grows, or the include-dir
    /// set grows, or the source list grows, or a define was added.
    fn progress_marker(&self) -> (usize, usize, usize, usize) {
        (
            self.blacklist.len(),
            self.include_dirs.len(),
            self.files.len(),
            self.extra_flags.len(),
        )
    }

    fn order_and_dedupe(&mut self) {
        match self.flavor {
            Flavor::Verilog => {
                self.files = dedupe::dedupe(&self.files, self.root, self.flavor);
                self.files = order::order_verilog(&self.files, self.root);
            }
            Flavor::Vhdl => {
                self.files = dedupe::dedupe(&self.files, self.root, self.flavor);
                self.files = order::order_vhdl(&self.files, self.root);
            }
            // Bluespec and Chisel compile from the top file; the search
            // path carries the dependencies.
            Flavor::Bluespec | Flavor::Chisel => {}
        }
    }

    /// Dispatch one diagnostic to its fix handler.
    pub fn apply_fix(&mut self, diagnostic: &Diagnostic) -> FixOutcome {
        match diagnostic {
            Diagnostic::MissingInclude { file, include } => self.fix_missing_include(file, include),
            Diagnostic::MissingPackage { name, file } => {
                self.fix_missing_provider(name, file.as_deref(), ProviderKind::Package)
            }
            Diagnostic::MissingModule { name, file } => {
                self.fix_missing_provider(name, file.as_deref(), ProviderKind::Module)
            }
            Diagnostic::MissingInterface { name } => {
                self.fix_missing_provider(name, None, ProviderKind::Interface)
            }
            Diagnostic::MissingType { name, file } => self.fix_missing_type(name, file.as_deref()),
            Diagnostic::MissingVariable { name } => {
                self.fix_missing_provider(name, None, ProviderKind::Variable)
            }
            Diagnostic::DuplicateDeclaration { file } => self.fix_duplicate(file),
            Diagnostic::SyntaxError { file } => self.fix_syntax_error(file),
            Diagnostic::ParamMismatch { file, parent } => {
                self.fix_blame_consumer(file, parent.as_deref(), "parameter mismatch")
            }
            Diagnostic::UndefinedMacro { file } => {
                self.fix_blame_consumer(file, None, "undefined macro")
            }
            Diagnostic::UnresolvedImport { file, package } => self.fix_blame_consumer(
                file,
                None,
                &format!("import of non-existent package `{}`", package),
            ),
        }
    }

    /// Missing include: search the tree for the basename and add its
    /// directory. An include that exists nowhere is unsatisfiable, and the
    /// file containing the directive is excluded.
    fn fix_missing_include(&mut self, file: &Path, include: &str) -> FixOutcome {
        let basename = Path::new(include)
            .file_name()
            .map(|b| b.to_string_lossy().to_string())
            .unwrap_or_else(|| include.to_string());
        // Relative include paths resolve against the including file first.
        let relative_ok = (include.contains('/') || include.contains('\\')) && {
            let rel = util::normalize_path(file, self.root);
            let candidate = rel.parent().unwrap_or(Path::new(".")).join(include);
            self.root.join(&candidate).is_file()
        };
        let hits = scan::find_by_basename(self.root, &basename);
        if hits.is_empty() && !relative_ok {
            return self.fix_blame_consumer(file, None, "unsatisfiable include");
        }
        let mut added = false;
        for hit in hits {
            let dir = parent_dir(&hit);
            if self.include_dirs.insert(dir.clone()) {
                log::info!("resolve: added include dir {:?}", dir);
                added = true;
            }
        }
        if added {
            FixOutcome::AddedInclude
        } else {
            FixOutcome::NoProgress
        }
    }

    /// Missing provider: search the tree for a file declaring the symbol
    /// and add it (plus its directory, for flavors that resolve through
    /// search paths). When the provider is already in the set, the
    /// diagnostic is an ordering problem and the provider is moved ahead of
    /// its consumer.
    fn fix_missing_provider(
        &mut self,
        name: &str,
        consumer: Option<&Path>,
        kind: ProviderKind,
    ) -> FixOutcome {
        let providers = find_providers(self.root, self.flavor, name, kind);
        let providers: Vec<PathBuf> = providers
            .into_iter()
            .filter(|p| !self.blacklist.contains(p))
            .filter(|p| !scan::is_testbench(p))
            .collect();
        if providers.is_empty() {
            Warnings::NoProviderFound(kind.to_string(), name.to_string()).emit();
            // A dangling reference with a known consumer blames the
            // consumer; without one there is nothing to do.
            return match consumer {
                Some(file) => self.fix_blame_consumer(
                    file,
                    None,
                    &format!("dangling reference to `{}`", name),
                ),
                None => FixOutcome::NoProgress,
            };
        }
        // Already-present provider: an ordering constraint, not a missing
        // file. Move it ahead of the consumer and pin the order.
        if let Some(consumer) = consumer {
            let consumer = util::normalize_path(consumer, self.root);
            if let Some(present) = providers.iter().find(|p| self.files.contains(p)) {
                let moved = order::move_before(&self.files, present, &consumer);
                if moved != self.files {
                    self.files = moved;
                    self.ordered = true;
                    return FixOutcome::Reordered;
                }
            }
        }
        let provider = providers
            .into_iter()
            .max_by(|a, b| {
                dedupe::path_quality(a)
                    .cmp(&dedupe::path_quality(b))
                    .then(b.cmp(a))
            })
            .unwrap();
        let mut outcome = FixOutcome::NoProgress;
        if !self.files.contains(&provider) {
            log::info!("resolve: added provider {:?} for {} `{}`", provider, kind, name);
            self.files.push(provider.clone());
            self.added_this_iteration.insert(provider.clone());
            // The list grew; re-run ordering next iteration.
            self.ordered = false;
            outcome = FixOutcome::AddedProvider;
        }
        if self.include_dirs.insert(parent_dir(&provider)) && outcome == FixOutcome::NoProgress {
            outcome = FixOutcome::AddedInclude;
        }
        outcome
    }

    /// Bluespec unbound type: add the defining directory to the search
    /// path, or, when the definition is gated behind `ifdef` blocks, select
    /// one of the gating defines and add it to the compiler flags.
    fn fix_missing_type(&mut self, name: &str, _consumer: Option<&Path>) -> FixOutcome {
        let Some(provider) = find_providers(self.root, self.flavor, name, ProviderKind::Type)
            .into_iter()
            .find(|p| !self.blacklist.contains(p))
        else {
            Warnings::NoProviderFound("type".to_string(), name.to_string()).emit();
            return FixOutcome::NoProgress;
        };
        let dir = parent_dir(&provider);
        if self.include_dirs.insert(dir.clone()) {
            log::info!("resolve: added search dir {:?} for type `{}`", dir, name);
            return FixOutcome::AddedInclude;
        }
        // The directory is already searched; the type must be gated behind
        // a conditional-compile define.
        let defines = bluespec::detect_required_defines(&self.root.join(&provider), name);
        if defines.is_empty() {
            return FixOutcome::NoProgress;
        }
        let choice = self.select_define(&defines);
        let flag_pair = ["-D".to_string(), choice.clone()];
        if self.extra_flags.windows(2).any(|w| w == flag_pair) {
            return FixOutcome::NoProgress;
        }
        log::info!("resolve: selected define {} for type `{}`", choice, name);
        self.extra_flags.extend(flag_pair);
        FixOutcome::AddedProvider
    }

    /// Choose one of the defines that gate a required declaration.
    ///
    /// Interactive mode prompts the operator; headless mode picks the first
    /// candidate deterministically and records the choice.
    fn select_define(&self, candidates: &[String]) -> String {
        if self.interactive {
            eprintln!(
                "Type requires one of these defines: [{}]",
                candidates.join("/")
            );
            let mut line = String::new();
            if std::io::stdin().read_line(&mut line).is_ok() {
                let choice = line.trim();
                if candidates.iter().any(|c| c == choice) {
                    return choice.to_string();
                }
            }
        } else {
            Warnings::HeadlessDefineChoice(candidates.join("/"), candidates[0].clone()).emit();
        }
        candidates[0].clone()
    }

    /// Duplicate declaration: keep the best-scored provider of the
    /// duplicated symbols, blacklist the rest.
    fn fix_duplicate(&mut self, file: &Path) -> FixOutcome {
        let rel = util::normalize_path(file, self.root);
        let text = util::read_file(&self.root.join(&rel)).unwrap_or_default();
        let (units, _) = crate::extract::extract_file(self.flavor, &rel, &text);
        let mut outcome = FixOutcome::NoProgress;
        for unit in units {
            // All current files declaring the same symbol.
            let mut rivals: Vec<PathBuf> = Vec::new();
            for candidate in &self.files {
                let text = util::read_file(&self.root.join(candidate)).unwrap_or_default();
                let (decls, _) = crate::extract::extract_file(self.flavor, candidate, &text);
                if decls.iter().any(|d| d.name == unit.name && d.kind == unit.kind) {
                    rivals.push(candidate.clone());
                }
            }
            if rivals.len() <= 1 {
                continue;
            }
            rivals.sort_by(|a, b| {
                dedupe::path_quality(b)
                    .cmp(&dedupe::path_quality(a))
                    .then(a.cmp(b))
            });
            for loser in rivals.into_iter().skip(1) {
                if self.exclude(&loser, "duplicate declaration") {
                    outcome = FixOutcome::Blacklisted;
                }
            }
        }
        outcome
    }

    /// Syntax error: exclude the offender, unless it provides a package.
    /// Package files often fail transitively on unresolved imports, so
    /// their exclusion is deferred one iteration.
    fn fix_syntax_error(&mut self, file: &Path) -> FixOutcome {
        let rel = util::normalize_path(file, self.root);
        let text = util::read_file(&self.root.join(&rel)).unwrap_or_default();
        let (units, _) = crate::extract::extract_file(self.flavor, &rel, &text);
        let declares_package = units
            .iter()
            .any(|u| u.kind == crate::extract::UnitKind::Package);
        if declares_package && self.deferred_syntax.insert(rel.clone()) {
            log::info!("resolve: deferring exclusion of package provider {:?}", rel);
            return FixOutcome::NoProgress;
        }
        if self.exclude(&rel, "syntax error") {
            FixOutcome::Blacklisted
        } else {
            FixOutcome::NoProgress
        }
    }

    /// Blacklist the consuming file; when a parent file is also named, the
    /// parent is the true cause and is excluded instead.
    fn fix_blame_consumer(
        &mut self,
        file: &Path,
        parent: Option<&Path>,
        reason: &str,
    ) -> FixOutcome {
        let target = match parent {
            Some(parent) => self.resolve_log_path(parent),
            None => self.resolve_log_path(file),
        };
        if self.exclude(&target, reason) {
            FixOutcome::Blacklisted
        } else {
            FixOutcome::NoProgress
        }
    }

    /// Compiler logs sometimes reference files by basename only; resolve
    /// against the current file set first, then against the tree
    /// (first match wins after path-quality scoring).
    fn resolve_log_path(&self, path: &Path) -> PathBuf {
        let rel = util::normalize_path(path, self.root);
        if self.root.join(&rel).is_file() {
            return rel;
        }
        let basename = match rel.file_name() {
            Some(b) => b.to_string_lossy().to_string(),
            None => return rel,
        };
        if let Some(hit) = self
            .files
            .iter()
            .find(|f| f.file_name().map(|b| b.to_string_lossy() == *basename).unwrap_or(false))
        {
            return hit.clone();
        }
        let mut hits = scan::find_by_basename(self.root, &basename);
        hits.sort_by(|a, b| {
            dedupe::path_quality(b)
                .cmp(&dedupe::path_quality(a))
                .then(a.cmp(b))
        });
        hits.into_iter().next().unwrap_or(rel)
    }

    /// Add a file to the blacklist and drop it from the source list.
    ///
    /// Files added in the same iteration are never blacklisted in it, and
    /// the blacklist is monotone: nothing ever leaves it within a run.
    fn exclude(&mut self, rel: &Path, reason: &str) -> bool {
        if self.added_this_iteration.contains(rel) {
            return false;
        }
        if !self.blacklist.insert(rel.to_path_buf()) {
            // Already blacklisted; still drop it from the set if present.
            let before = self.files.len();
            self.files.retain(|f| f != rel);
            return self.files.len() != before;
        }
        Warnings::BlacklistedFile {
            path: rel.to_path_buf(),
            reason: reason.to_string(),
        }
        .emit();
        self.files.retain(|f| f != rel);
        true
    }

    /// On a stall, try once with every remaining candidate source added.
    /// Lint-style flavors only.
    fn try_all_sources_fallback(&mut self) -> bool {
        if self.flavor != Flavor::Verilog || self.fallback_spent {
            return false;
        }
        self.fallback_spent = true;
        let mut added = false;
        for candidate in self.all_candidates.clone() {
            if !self.blacklist.contains(&candidate) && !self.files.contains(&candidate) {
                self.files.push(candidate);
                added = true;
            }
        }
        if added {
            log::info!("resolve: stall fallback, added all remaining candidates");
            self.ordered = false;
        }
        added
    }
}

/// The directory containing a repo-relative path, `.` for root-level files.
fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// What kind of provider a symbol search looks for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    /// A module or entity declaration.
    Module,
    /// A package declaration.
    Package,
    /// An interface declaration.
    Interface,
    /// A type definition (Bluespec).
    Type,
    /// A variable or function definition (Bluespec).
    Variable,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s = match self {
            ProviderKind::Module => "module",
            ProviderKind::Package => "package",
            ProviderKind::Interface => "interface",
            ProviderKind::Type => "type",
            ProviderKind::Variable => "variable",
        };
        write!(f, "{}", s)
    }
}

static BSV_TYPEDEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*typedef\s+.*?\s+(\w+)\s*(?:#\(.*?\))?\s*;|^\s*type\s+(\w+)\s*=").unwrap()
});
static BSV_FUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*function\s+.*?\s+(\w+)\s*\(").unwrap());

/// Search the tree for files declaring a symbol of the given kind.
///
/// Results are in deterministic walk order; callers pick the best by
/// path-quality score.
pub fn find_providers(root: &Path, flavor: Flavor, name: &str, kind: ProviderKind) -> Vec<PathBuf> {
    let files = scan::all_with_extensions(root, flavor.unit_extensions());
    let mut out = Vec::new();
    for rel in files {
        let text = match util::read_file(&root.join(&rel)) {
            Ok(t) => t,
            Err(_) => continue,
        };
        let hit = match kind {
            ProviderKind::Module | ProviderKind::Package | ProviderKind::Interface => {
                let (units, _) = crate::extract::extract_file(flavor, &rel, &text);
                units.iter().any(|u| {
                    let kind_ok = match kind {
                        ProviderKind::Module => matches!(
                            u.kind,
                            crate::extract::UnitKind::Module
                                | crate::extract::UnitKind::Entity
                                | crate::extract::UnitKind::ChiselModule
                                | crate::extract::UnitKind::BluespecModule
                        ),
                        ProviderKind::Package => u.kind == crate::extract::UnitKind::Package,
                        ProviderKind::Interface => u.kind == crate::extract::UnitKind::Interface,
                        _ => false,
                    };
                    let name_ok = if flavor == Flavor::Vhdl {
                        u.name.eq_ignore_ascii_case(name)
                    } else {
                        u.name == name
                            || (kind == ProviderKind::Package
                                && u.name == format!("{}_pkg", name))
                    };
                    kind_ok && name_ok
                })
            }
            ProviderKind::Type => BSV_TYPEDEF.captures_iter(&text).any(|c| {
                c.get(1).map(|m| m.as_str() == name).unwrap_or(false)
                    || c.get(2).map(|m| m.as_str() == name).unwrap_or(false)
            }),
            ProviderKind::Variable => BSV_FUNCTION
                .captures_iter(&text)
                .any(|c| &c[1] == name),
        };
        if hit {
            out.push(rel);
        }
    }
    out
}

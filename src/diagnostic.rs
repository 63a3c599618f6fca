// Copyright (c) 2025 ETH Zurich
// Tim Fischer <fischeti@iis.ee.ethz.ch>

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use miette::{Diagnostic, ReportHandler};
use owo_colors::Style;
use thiserror::Error;

use crate::{fmt_dim, fmt_field, fmt_path, fmt_unit, fmt_with_style};

static GLOBAL_DIAGNOSTICS: OnceLock<Diagnostics> = OnceLock::new();

/// A diagnostics manager that handles warnings (and errors).
#[derive(Debug)]
pub struct Diagnostics {
    /// A set of suppressed warnings.
    suppressed: HashSet<String>,
    /// Whether all warnings are suppressed.
    all_suppressed: bool,
    /// A set of already emitted warnings.
    emitted: Mutex<HashSet<Warnings>>,
}

impl Diagnostics {
    /// Create a new diagnostics manager.
    pub fn init(suppressed: HashSet<String>) {
        // Set up miette with our custom renderer
        miette::set_hook(Box::new(|_| Box::new(DiagnosticRenderer))).unwrap();
        let diag = Diagnostics {
            all_suppressed: suppressed.contains("all") || suppressed.contains("Wall"),
            suppressed,
            emitted: Mutex::new(HashSet::new()),
        };

        GLOBAL_DIAGNOSTICS
            .set(diag)
            .expect("Diagnostics already initialized!");
    }

    /// Get the global diagnostics manager.
    fn get() -> &'static Diagnostics {
        GLOBAL_DIAGNOSTICS
            .get()
            .expect("Diagnostics not initialized!")
    }

    /// Check whether a warning/error code is suppressed.
    pub fn is_suppressed(code: &str) -> bool {
        let diag = Diagnostics::get();
        diag.all_suppressed || diag.suppressed.contains(code)
    }
}

impl Warnings {
    /// Checks suppression, deduplicates, and emits the warning to stderr.
    pub fn emit(self) {
        // Warnings raised before the manager is set up (or from unit tests)
        // are printed without suppression or deduplication.
        let Some(diag) = GLOBAL_DIAGNOSTICS.get() else {
            eprintln!("{:?}", miette::Report::new(self));
            return;
        };

        // Check whether the warning is suppressed
        if let Some(code) = self.code() {
            if diag.all_suppressed || diag.suppressed.contains(&code.to_string()) {
                return;
            }
        }

        // Check whether the warning was already emitted
        let mut emitted = diag.emitted.lock().unwrap();
        if emitted.contains(&self) {
            return;
        }
        emitted.insert(self.clone());
        drop(emitted);

        // Prepare and emit the report
        let report = miette::Report::new(self.clone());
        eprintln!("{report:?}");
    }
}

pub struct DiagnosticRenderer;

impl ReportHandler for DiagnosticRenderer {
    fn debug(&self, diagnostic: &dyn Diagnostic, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Determine severity and the resulting style
        let (severity, style) = match diagnostic.severity().unwrap_or_default() {
            miette::Severity::Error => ("error", Style::new().red().bold()),
            miette::Severity::Warning => ("warning", Style::new().yellow().bold()),
            miette::Severity::Advice => ("advice", Style::new().cyan().bold()),
        };

        // Write the severity prefix
        write!(f, "{}", fmt_with_style!(severity, style))?;

        // Write the code, if any
        if let Some(code) = diagnostic.code() {
            write!(f, "{}", fmt_with_style!(format!("[{}]", code), style))?;
        }

        // Write the main diagnostic message
        write!(f, ": {}", diagnostic)?;

        // We collect all footer lines into a vector.
        let mut annotations: Vec<String> = Vec::new();

        // First, we write the help message(s) if any
        if let Some(help) = diagnostic.help() {
            let help_str = help.to_string();
            for line in help_str.lines() {
                annotations.push(format!(
                    "{} {}",
                    fmt_with_style!("help:", Style::new().bold()),
                    fmt_dim!(line.replace("\x1b[0m", "\x1b[0m\x1b[2m"))
                ));
            }
        }

        // Prepare tree characters
        let branch = " ├─›";
        let corner = " ╰─›";

        // Iterate over the annotations and print them
        for (i, note) in annotations.iter().enumerate() {
            // The last item gets the corner, everyone else gets a branch
            let is_last = i == annotations.len() - 1;
            let prefix = if is_last { corner } else { branch };
            write!(f, "\n{} {}", fmt_dim!(prefix), note)?;
        }

        Ok(())
    }
}

// Note(fischeti): The enum variants should preferably use struct style
// variants for better readability, but this is not possible due to a current
// issue in `miette` that causes `unused` warnings when the help message does
// not use all fields of a struct variant. The workaround for the moment is to
// use tuple style variants for variants where the help message does not use
// all fields.
#[derive(Error, Diagnostic, Hash, Eq, PartialEq, Debug, Clone)]
#[diagnostic(severity(Warning))]
pub enum Warnings {
    #[error("Skipping unreadable source file {}.", fmt_path!(.0.display()))]
    #[diagnostic(
        code(W01),
        help("Check the file encoding and permissions. The run continues without it.")
    )]
    SkippingUnreadableFile(PathBuf),

    #[error("No {} sources found under {}.", fmt_field!(.0), fmt_path!(.1.display()))]
    #[diagnostic(code(W02))]
    NoSourcesForFlavor(String, PathBuf),

    #[error("Excluding file {} for the rest of this run.", fmt_path!(path.display()))]
    #[diagnostic(code(W03), help("Reason: {}.", reason))]
    BlacklistedFile { path: PathBuf, reason: String },

    #[error("Multiple files declare {}.", fmt_unit!(.0))]
    #[diagnostic(
        code(W04),
        help("Keeping the highest-scored path, dropping the rest from the file set.")
    )]
    DuplicateProvider(String),

    #[error("No provider found for {} {}.", fmt_field!(.0), fmt_unit!(.1))]
    #[diagnostic(code(W05))]
    NoProviderFound(String, String),

    #[error("Dependency resolution stalled for top {}.", fmt_unit!(top))]
    #[diagnostic(
        code(W06),
        help("No fix rule made progress. The last compiler log is carried in the result.")
    )]
    ResolverStalled { top: String },

    #[error("Compiler invocation timed out after {}s.", .0)]
    #[diagnostic(code(W07))]
    CompileTimeout(u64),

    #[error("File {} uses a vendor-specific library and is excluded.", fmt_path!(.0.display()))]
    #[diagnostic(
        code(W08),
        help("Vendor simulation libraries (unisim, altera_mf, ...) cannot be analyzed.")
    )]
    VendorLibraryFile(PathBuf),

    #[error("No terminal available to choose between defines {}; using {}.", fmt_field!(.0), fmt_field!(.1))]
    #[diagnostic(code(W09))]
    HeadlessDefineChoice(String, String),

    #[error("Retrying in Verilog-2005 mode after SystemVerilog keyword conflict.")]
    #[diagnostic(
        code(W10),
        help("The sources use SystemVerilog reserved words as identifiers.")
    )]
    KeywordConflictFallback,

    #[error("Hint service at {} is configured but unreachable; continuing with heuristics.", fmt_path!(.0))]
    #[diagnostic(code(W11))]
    HintServiceUnavailable(String),

    #[error("Minimized set no longer compiles; reverting to the pre-minimize set.")]
    #[diagnostic(code(W12))]
    MinimizeRolledBack,
}
